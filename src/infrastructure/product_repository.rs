//! Repository for persisted product records
//!
//! One row per canonical product URL. Upserts keep `created_at` and refresh
//! every other column.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::domain::{Condition, EnrichedProduct, Platform, ProductDraft, SoldSource};

/// New vs already-present keys written by one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// "Upsert by unique key" plus lookup, the persistence capability the
/// pipeline and the export endpoint need
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Writes all records in a single transaction
    async fn upsert_batch(&self, records: &[EnrichedProduct]) -> Result<UpsertOutcome, sqlx::Error>;

    /// Records whose title contains `term`, case-insensitively
    async fn find_by_title(&self, term: &str) -> Result<Vec<EnrichedProduct>, sqlx::Error>;
}

#[derive(Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<EnrichedProduct>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM products WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    /// `created_at` of a stored record
    pub async fn created_at(&self, url: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar("SELECT created_at FROM products WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn upsert_batch(&self, records: &[EnrichedProduct]) -> Result<UpsertOutcome, sqlx::Error> {
        let mut outcome = UpsertOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE url = ?)")
                .bind(record.url())
                .fetch_one(&mut *tx)
                .await?;

            let p = &record.product;
            sqlx::query(
                r#"
                INSERT INTO products (
                    url, title, platform, original_price, discounted_price, discount_percentage,
                    seller, seller_id, installments, interest_free_months, free_shipping, condition,
                    available_quantity, thumbnail_url, category_id, item_id, units_sold,
                    units_sold_source, extracted_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    platform = excluded.platform,
                    original_price = excluded.original_price,
                    discounted_price = excluded.discounted_price,
                    discount_percentage = excluded.discount_percentage,
                    seller = excluded.seller,
                    seller_id = excluded.seller_id,
                    installments = excluded.installments,
                    interest_free_months = excluded.interest_free_months,
                    free_shipping = excluded.free_shipping,
                    condition = excluded.condition,
                    available_quantity = excluded.available_quantity,
                    thumbnail_url = excluded.thumbnail_url,
                    category_id = excluded.category_id,
                    item_id = excluded.item_id,
                    units_sold = excluded.units_sold,
                    units_sold_source = excluded.units_sold_source,
                    extracted_at = excluded.extracted_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&p.url)
            .bind(&p.title)
            .bind(p.platform.as_str())
            .bind(p.original_price)
            .bind(p.discounted_price)
            .bind(p.discount_percentage)
            .bind(&p.seller)
            .bind(p.seller_id.map(saturating_i64))
            .bind(i64::from(p.installments))
            .bind(i64::from(p.interest_free_months))
            .bind(p.free_shipping)
            .bind(p.condition.as_str())
            .bind(saturating_i64(p.available_quantity))
            .bind(&p.thumbnail_url)
            .bind(&p.category_id)
            .bind(p.item_id.as_deref())
            .bind(saturating_i64(record.units_sold))
            .bind(record.units_sold_source.map(SoldSource::as_str))
            .bind(p.extracted_at)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if exists {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_by_title(&self, term: &str) -> Result<Vec<EnrichedProduct>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(term));
        let rows = sqlx::query(
            "SELECT * FROM products WHERE title LIKE ? ESCAPE '\\' ORDER BY updated_at DESC, title",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }
}

/// SQLite integers are signed; oversized counts are clamped instead of wrapping
fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_row(row: &SqliteRow) -> Result<EnrichedProduct, sqlx::Error> {
    let seller_id: Option<i64> = row.try_get("seller_id")?;
    let installments: i64 = row.try_get("installments")?;
    let interest_free_months: i64 = row.try_get("interest_free_months")?;
    let available_quantity: i64 = row.try_get("available_quantity")?;
    let units_sold: i64 = row.try_get("units_sold")?;
    let condition: String = row.try_get("condition")?;
    let units_sold_source: Option<String> = row.try_get("units_sold_source")?;

    let product = ProductDraft {
        title: row.try_get("title")?,
        platform: Platform::MercadoLibre,
        original_price: row.try_get("original_price")?,
        discounted_price: row.try_get("discounted_price")?,
        discount_percentage: row.try_get("discount_percentage")?,
        seller: row.try_get("seller")?,
        seller_id: seller_id.and_then(|id| u64::try_from(id).ok()),
        installments: u32::try_from(installments).unwrap_or(0),
        interest_free_months: u32::try_from(interest_free_months).unwrap_or(0),
        free_shipping: row.try_get("free_shipping")?,
        condition: Condition::from_stored(&condition),
        available_quantity: u64::try_from(available_quantity).unwrap_or(0),
        url: row.try_get("url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        category_id: row.try_get("category_id")?,
        item_id: row.try_get("item_id")?,
        extracted_at: row.try_get("extracted_at")?,
    };

    Ok(EnrichedProduct {
        product,
        units_sold: u64::try_from(units_sold).unwrap_or(0),
        units_sold_source: units_sold_source.as_deref().and_then(SoldSource::from_stored),
    })
}
