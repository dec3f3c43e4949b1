//! Units-sold extraction benchmark
//!
//! Measures the page-based probe path on a product page of realistic size:
//! visible-text collection, the text pattern chain, and the badge fallback.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use product_harvest_lib::crawling::sold_probe::{document_text, extract_from_badges, extract_from_text};

fn product_page(sold_markup: &str) -> String {
    let mut html = String::from("<html><head><style>.x{color:red}</style>");
    html.push_str("<script>window.__STATE__ = {\"sold\": 999999};</script></head><body>");
    for i in 0..400 {
        html.push_str(&format!(
            "<div class=\"ui-pdp-description\"><p>Característica {i}: pantalla, batería, memoria.</p></div>"
        ));
    }
    html.push_str(sold_markup);
    html.push_str("</body></html>");
    html
}

fn extraction_chain(c: &mut Criterion) {
    let text_page = product_page("<span class=\"ui-pdp-subtitle\">Nuevo | +1.234 vendidos</span>");
    let badge_page = product_page(
        "<span class=\"ui-pdp-color--GREEN ui-pdp-family--REGULAR\">Más de 5 mil</span>",
    );
    let empty_page = product_page("");

    c.bench_function("page text - matching phrase", |b| {
        b.iter(|| extract_from_text(&document_text(black_box(&text_page))));
    });

    c.bench_function("badge markup fallback", |b| {
        b.iter(|| extract_from_badges(black_box(&badge_page)));
    });

    c.bench_function("full chain - no signal", |b| {
        b.iter(|| {
            let text = document_text(black_box(&empty_page));
            extract_from_text(&text).or_else(|| extract_from_badges(&empty_page))
        });
    });
}

criterion_group!(benches, extraction_chain);
criterion_main!(benches);
