//! End-to-end pipeline scenarios against a scripted marketplace

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use product_harvest_lib::crawling::{
    OrchestratorError, PersistenceSink, PipelineSettings, SearchOrchestrator,
};
use product_harvest_lib::domain::{MAX_RESULTS, PlanRequest, SoldSource, Window};
use product_harvest_lib::infrastructure::MarketplaceClient;
use product_harvest_lib::infrastructure::config::{MarketplaceConfig, PipelineConfig};
use product_harvest_lib::test_utils::{
    FailingStore, MockTransport, TestDatabase, search_page, search_record,
};

fn settings() -> PipelineSettings {
    PipelineSettings {
        enrichment_delay: Duration::ZERO,
        use_item_api: false,
        ..PipelineSettings::from(&PipelineConfig::default())
    }
}

fn client(transport: &MockTransport) -> MarketplaceClient {
    MarketplaceClient::new(
        Arc::new(transport.clone()),
        &MarketplaceConfig::default(),
        Duration::from_secs(5),
    )
}

fn records(prefix: &str, range: std::ops::Range<u64>) -> Vec<Value> {
    range
        .map(|i| {
            search_record(
                &format!("MLM{i}"),
                &format!("{prefix} {i}"),
                &format!("https://articulo.test/{prefix}-{i}"),
            )
        })
        .collect()
}

/// Scripts the probe call plus one response per window
fn script_search(transport: &MockTransport, client: &MarketplaceClient, term: &str, total: u64, windows: &[Window]) {
    let all = records(term, 0..total.min(MAX_RESULTS));
    transport.respond_json(
        &client.search_url(term, 0, 1),
        &search_page(total, all.iter().take(1).cloned().collect()),
    );
    for window in windows {
        let start = window.offset as usize;
        let end = (window.offset + window.size) as usize;
        transport.respond_json(
            &client.search_url(term, window.offset, window.size),
            &search_page(total, all[start..end.min(all.len())].to_vec()),
        );
    }
}

#[tokio::test]
async fn laptop_search_with_120_results_fetches_three_windows() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let windows = [Window::new(0, 50), Window::new(50, 50), Window::new(100, 20)];
    script_search(&transport, &client, "laptop", 120, &windows);
    let orchestrator = SearchOrchestrator::new(client.clone(), None, settings());

    let outcome = orchestrator.run("laptop", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.plan.windows, windows);
    assert_eq!(outcome.products.len(), 120);
    assert!(outcome.products.iter().all(|p| !p.url().is_empty()));
    assert_eq!(outcome.stats.windows_fetched, 3);
    for window in windows {
        assert_eq!(
            transport.call_count(&client.search_url("laptop", window.offset, window.size)),
            1
        );
    }
}

#[tokio::test]
async fn result_count_never_exceeds_the_capped_total() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let windows: Vec<Window> = (0..40).map(|i| Window::new(i * 50, 50)).collect();
    script_search(&transport, &client, "celular", 25_000, &windows);
    let orchestrator = SearchOrchestrator::new(client.clone(), None, settings());

    let outcome = orchestrator.run("celular", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.plan.capped_total, MAX_RESULTS);
    assert!(outcome.products.len() as u64 <= MAX_RESULTS);
    assert_eq!(transport.calls_starting_with(&client.search_url("celular", 2000, 50)), 0);
}

#[tokio::test]
async fn malformed_record_is_dropped_and_the_rest_survive() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let mut batch = records("tablet", 0..10);
    batch[4].as_object_mut().unwrap().remove("permalink");
    transport.respond_json(&client.search_url("tablet", 0, 1), &search_page(10, batch[..1].to_vec()));
    transport.respond_json(&client.search_url("tablet", 0, 10), &search_page(10, batch));
    let orchestrator = SearchOrchestrator::new(client, None, settings());

    let outcome = orchestrator.run("tablet", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 9);
    assert_eq!(outcome.stats.decode_failures, 1);
    assert!(outcome.products.iter().all(|p| p.url() != "https://articulo.test/tablet-4"));
}

#[tokio::test]
async fn page_text_and_probe_failures_shape_units_sold() {
    let transport = MockTransport::new();
    let client = client(&transport);
    script_search(&transport, &client, "audifonos", 3, &[Window::new(0, 3)]);
    transport.respond(
        "https://articulo.test/audifonos-0",
        200,
        "<html><body><span>Nuevo | 1.234 vendidos</span></body></html>",
    );
    transport.respond("https://articulo.test/audifonos-1", 200, "<html><body>Sin ventas</body></html>");
    transport.panic_on("https://articulo.test/audifonos-2");
    let orchestrator = SearchOrchestrator::new(client, None, settings());

    let outcome = orchestrator.run("audifonos", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 3);
    let by_url = |url: &str| {
        outcome
            .products
            .iter()
            .find(|p| p.url() == url)
            .cloned()
            .unwrap()
    };
    let matched = by_url("https://articulo.test/audifonos-0");
    assert_eq!(matched.units_sold, 1234);
    assert_eq!(matched.units_sold_source, Some(SoldSource::PageText));
    assert_eq!(by_url("https://articulo.test/audifonos-1").units_sold, 0);
    let panicked = by_url("https://articulo.test/audifonos-2");
    assert_eq!(panicked.units_sold, 0);
    assert_eq!(panicked.units_sold_source, None);
    assert_eq!(outcome.stats.probe_panics, 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_calls_stay_within_stage_limits() {
    let transport = MockTransport::new();
    transport.set_default_delay(Duration::from_millis(40));
    let client = client(&transport);
    let windows: Vec<Window> = (0..6).map(|i| Window::new(i * 10, 10)).collect();
    script_search(&transport, &client, "monitor", 60, &windows);
    let orchestrator = SearchOrchestrator::new(
        client,
        None,
        PipelineSettings {
            batch_size: 10,
            fetch_concurrency: 2,
            enrichment_concurrency: 3,
            ..settings()
        },
    );

    let outcome = orchestrator.run("monitor", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 60);
    assert!(outcome.stats.peak_fetch_in_flight <= 2);
    assert!(outcome.stats.peak_enrich_in_flight <= 3);
    assert!(outcome.stats.peak_enrich_in_flight >= 2);
    assert!(transport.peak_in_flight() <= 5);
}

#[tokio::test(start_paused = true)]
async fn global_ceiling_bounds_both_stages_together() {
    let transport = MockTransport::new();
    transport.set_default_delay(Duration::from_millis(25));
    let client = client(&transport);
    let windows: Vec<Window> = (0..4).map(|i| Window::new(i * 5, 5)).collect();
    script_search(&transport, &client, "teclado", 20, &windows);
    let orchestrator = SearchOrchestrator::new(
        client,
        None,
        PipelineSettings {
            batch_size: 5,
            fetch_concurrency: 4,
            enrichment_concurrency: 4,
            global_max_in_flight: Some(2),
            ..settings()
        },
    );

    let outcome = orchestrator.run("teclado", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 20);
    assert!(transport.peak_in_flight() <= 2);
}

#[tokio::test]
async fn explicit_limit_and_batches_shape_the_windows() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let windows = [Window::new(10, 15), Window::new(25, 15)];
    script_search(&transport, &client, "silla", 500, &windows);
    let orchestrator = SearchOrchestrator::new(client, None, settings());
    let request = PlanRequest {
        offset: Some(10),
        limit: Some(30),
        num_batches: Some(2),
    };

    let outcome = orchestrator.run("silla", &request).await.unwrap();

    assert_eq!(outcome.plan.windows, windows);
    assert_eq!(outcome.products.len(), 30);
}

#[tokio::test]
async fn failed_window_degrades_to_fewer_products() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let all = records("mesa", 0..60);
    transport.respond_json(&client.search_url("mesa", 0, 1), &search_page(60, all[..1].to_vec()));
    transport.respond_json(&client.search_url("mesa", 0, 50), &search_page(60, all[..50].to_vec()));
    transport.respond(&client.search_url("mesa", 50, 10), 503, "unavailable");
    let orchestrator = SearchOrchestrator::new(client, None, settings());

    let outcome = orchestrator.run("mesa", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 50);
    assert_eq!(outcome.stats.windows_failed, 1);
}

#[tokio::test]
async fn zero_results_is_reported_as_no_results() {
    let transport = MockTransport::new();
    let client = client(&transport);
    transport.respond_json(&client.search_url("zzzz", 0, 1), &search_page(0, vec![]));
    let orchestrator = SearchOrchestrator::new(client, None, settings());

    let err = orchestrator.run("zzzz", &PlanRequest::default()).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::NoResults(_)));
}

#[tokio::test]
async fn finished_job_persists_every_product() {
    let db = TestDatabase::new().await.unwrap();
    let repository = db.repository();
    let transport = MockTransport::new();
    let client = client(&transport);
    script_search(&transport, &client, "camara", 7, &[Window::new(0, 7)]);
    let sink = PersistenceSink::new(Arc::new(db.repository()), 3);
    let orchestrator = SearchOrchestrator::new(client, Some(sink), settings());

    let outcome = orchestrator.run("camara", &PlanRequest::default()).await.unwrap();

    assert!(outcome.db_saved());
    let report = outcome.persisted.unwrap();
    assert_eq!(report.upserted, 7);
    assert_eq!(report.modified, 0);
    assert_eq!(repository.count().await.unwrap(), 7);
}

#[tokio::test]
async fn store_failure_still_returns_in_memory_results() {
    let transport = MockTransport::new();
    let client = client(&transport);
    script_search(&transport, &client, "parlante", 4, &[Window::new(0, 4)]);
    let sink = PersistenceSink::new(Arc::new(FailingStore), 2);
    let orchestrator = SearchOrchestrator::new(client, Some(sink), settings());

    let outcome = orchestrator.run("parlante", &PlanRequest::default()).await.unwrap();

    assert_eq!(outcome.products.len(), 4);
    assert!(outcome.persisted.is_none());
    assert!(!outcome.db_saved());
}
