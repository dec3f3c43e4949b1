//! Upsert semantics of the persistence sink over SQLite

use std::sync::Arc;

use product_harvest_lib::crawling::{PersistReport, PersistenceError, PersistenceSink};
use product_harvest_lib::domain::SoldSource;
use product_harvest_lib::infrastructure::{DatabaseConnection, ProductRepository, ProductStore};
use product_harvest_lib::test_utils::{FailingStore, TestDatabase, sample_product};
use tempfile::TempDir;

#[tokio::test]
async fn persisting_the_same_records_twice_inserts_nothing_new() {
    let db = TestDatabase::new().await.unwrap();
    let sink = PersistenceSink::new(Arc::new(db.repository()), 2);
    let records: Vec<_> = (0..5)
        .map(|i| sample_product(&format!("https://articulo.test/{i}"), "Laptop", i * 10))
        .collect();

    let first = sink.persist(&records).await.unwrap();
    let second = sink.persist(&records).await.unwrap();

    assert_eq!(first, PersistReport { upserted: 5, modified: 0 });
    assert_eq!(second, PersistReport { upserted: 0, modified: 5 });
    assert_eq!(db.repository().count().await.unwrap(), 5);
}

#[tokio::test]
async fn duplicate_urls_keep_the_later_record() {
    let db = TestDatabase::new().await.unwrap();
    let repository = db.repository();
    let sink = PersistenceSink::new(Arc::new(db.repository()), 100);
    let url = "https://articulo.test/duplicado";
    let mut later = sample_product(url, "Laptop Gamer v2", 77);
    later.product.discounted_price = 850.0;
    let records = vec![
        sample_product(url, "Laptop Gamer", 5),
        sample_product("https://articulo.test/otro", "Mouse", 0),
        later,
    ];

    let report = sink.persist(&records).await.unwrap();

    assert_eq!(report.upserted, 2);
    assert_eq!(repository.count().await.unwrap(), 2);
    let stored = repository.find_by_url(url).await.unwrap().unwrap();
    assert_eq!(stored.product.title, "Laptop Gamer v2");
    assert_eq!(stored.units_sold, 77);
    assert!((stored.product.discounted_price - 850.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn update_preserves_first_seen_timestamp() {
    let db = TestDatabase::new().await.unwrap();
    let repository = db.repository();
    let sink = PersistenceSink::new(Arc::new(db.repository()), 10);
    let url = "https://articulo.test/estable";

    sink.persist(&[sample_product(url, "Monitor", 3)]).await.unwrap();
    let created = repository.created_at(url).await.unwrap();
    sink.persist(&[sample_product(url, "Monitor 27", 9)]).await.unwrap();

    assert!(created.is_some());
    assert_eq!(repository.created_at(url).await.unwrap(), created);
    let stored = repository.find_by_url(url).await.unwrap().unwrap();
    assert_eq!(stored.product.title, "Monitor 27");
}

#[tokio::test]
async fn unknown_and_confirmed_sold_counts_survive_storage() {
    let db = TestDatabase::new().await.unwrap();
    let repository = db.repository();
    let records = vec![
        sample_product("https://articulo.test/sin-dato", "Silla", 0),
        sample_product("https://articulo.test/con-dato", "Silla", 40),
    ];

    repository.upsert_batch(&records).await.unwrap();

    let unknown = repository.find_by_url("https://articulo.test/sin-dato").await.unwrap().unwrap();
    assert_eq!(unknown.units_sold, 0);
    assert_eq!(unknown.units_sold_source, None);
    let known = repository.find_by_url("https://articulo.test/con-dato").await.unwrap().unwrap();
    assert_eq!(known.units_sold, 40);
    assert_eq!(known.units_sold_source, Some(SoldSource::PageText));
}

#[tokio::test]
async fn title_search_is_case_insensitive_and_literal() {
    let db = TestDatabase::new().await.unwrap();
    let repository = db.repository();
    repository
        .upsert_batch(&[
            sample_product("https://articulo.test/a", "Laptop GAMER 15", 1),
            sample_product("https://articulo.test/b", "Teclado 100% mecánico", 2),
            sample_product("https://articulo.test/c", "Mouse", 3),
        ])
        .await
        .unwrap();

    assert_eq!(repository.find_by_title("gamer").await.unwrap().len(), 1);
    assert_eq!(repository.find_by_title("100%").await.unwrap().len(), 1);
    assert_eq!(repository.find_by_title("%").await.unwrap().len(), 1);
    assert!(repository.find_by_title("cámara").await.unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_is_reported_not_swallowed() {
    let sink = PersistenceSink::new(Arc::new(FailingStore), 10);

    let err = sink
        .persist(&[sample_product("https://articulo.test/x", "Mesa", 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::Database(_)));
}

#[tokio::test]
async fn file_database_keeps_records_across_connections() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("nested").join("products.db").display());

    {
        let connection = DatabaseConnection::new(&url, 2).await.unwrap();
        connection.migrate().await.unwrap();
        let repository = ProductRepository::new(connection.pool().clone());
        repository
            .upsert_batch(&[sample_product("https://articulo.test/persistente", "Router", 8)])
            .await
            .unwrap();
        connection.pool().close().await;
    }

    let connection = DatabaseConnection::new(&url, 2).await.unwrap();
    connection.migrate().await.unwrap();
    let repository = ProductRepository::new(connection.pool().clone());
    assert_eq!(repository.count().await.unwrap(), 1);
}
