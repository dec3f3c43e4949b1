//! Item decoder
//!
//! Maps one raw upstream search record into a [`ProductDraft`]. Every field
//! is validated explicitly; fields that fall back to a default are reported
//! by name so callers can log how lossy a page was.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::domain::{Condition, Platform, ProductDraft};

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Search record is not a JSON object")]
    NotAnObject,

    #[error("Search record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Search record field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A decoded draft plus the fields that were defaulted
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedItem {
    pub draft: ProductDraft,
    pub defaulted: Vec<&'static str>,
}

/// Decodes a single search record.
///
/// Only `permalink` is required; it must be an absolute http(s) URL.
pub fn decode_item(raw: &Value, extracted_at: DateTime<Utc>) -> Result<DecodedItem, DecodeError> {
    let record = raw.as_object().ok_or(DecodeError::NotAnObject)?;
    let url = canonical_url(record)?;

    let mut defaulted = Vec::new();

    let title = text(record.get("title")).unwrap_or_else(|| {
        defaulted.push("title");
        NOT_AVAILABLE.to_string()
    });

    let listed_price = amount(record.get("price"));
    let original_price = amount(record.get("original_price"))
        .or(listed_price)
        .unwrap_or_else(|| {
            defaulted.push("original_price");
            0.0
        });
    let discounted_price = listed_price.unwrap_or_else(|| {
        defaulted.push("price");
        original_price
    });

    let discount_percentage = amount(record.get("discount_percentage"))
        .filter(|pct| *pct <= 100.0)
        .unwrap_or_else(|| {
            defaulted.push("discount_percentage");
            0.0
        });

    let seller = record.get("seller");
    let seller_name = text(seller.and_then(|s| s.get("nickname"))).unwrap_or_else(|| {
        defaulted.push("seller");
        NOT_AVAILABLE.to_string()
    });
    let seller_id = count(seller.and_then(|s| s.get("id")));

    let installments = record.get("installments");
    let installment_count = count(installments.and_then(|i| i.get("quantity")));
    let interest_free_months = count(installments.and_then(|i| i.get("months"))).or_else(|| {
        let rate = amount(installments.and_then(|i| i.get("rate")))?;
        if rate == 0.0 { installment_count } else { Some(0) }
    });
    if installment_count.is_none() {
        defaulted.push("installments");
    }
    if interest_free_months.is_none() {
        defaulted.push("interest_free_months");
    }

    let free_shipping = record
        .get("shipping")
        .and_then(|s| s.get("free_shipping"))
        .and_then(Value::as_bool);
    if free_shipping.is_none() {
        defaulted.push("free_shipping");
    }

    let condition = Condition::from_upstream(record.get("condition").and_then(Value::as_str));
    if condition == Condition::Unknown {
        defaulted.push("condition");
    }

    let available_quantity = count(record.get("available_quantity")).unwrap_or_else(|| {
        defaulted.push("available_quantity");
        0
    });

    let thumbnail_url = text(record.get("thumbnail")).unwrap_or_else(|| {
        defaulted.push("thumbnail");
        NOT_AVAILABLE.to_string()
    });
    let category_id = text(record.get("category_id")).unwrap_or_else(|| {
        defaulted.push("category_id");
        NOT_AVAILABLE.to_string()
    });

    let item_id = text(record.get("id"));

    let draft = ProductDraft {
        title,
        platform: Platform::MercadoLibre,
        original_price,
        discounted_price,
        discount_percentage,
        seller: seller_name,
        seller_id,
        installments: clamp_u32(installment_count.unwrap_or(0)),
        interest_free_months: clamp_u32(interest_free_months.unwrap_or(0)),
        free_shipping,
        condition,
        available_quantity,
        url,
        thumbnail_url,
        category_id,
        item_id,
        extracted_at,
    };

    Ok(DecodedItem { draft, defaulted })
}

fn canonical_url(record: &Map<String, Value>) -> Result<String, DecodeError> {
    let raw = match record.get("permalink") {
        None | Some(Value::Null) => return Err(DecodeError::MissingField("permalink")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(DecodeError::MissingField("permalink"));
        }
        Some(Value::String(s)) => s.trim(),
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "permalink",
                reason: format!("expected a string, got {other}"),
            });
        }
    };

    let parsed = Url::parse(raw).map_err(|e| DecodeError::InvalidField {
        field: "permalink",
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DecodeError::InvalidField {
            field: "permalink",
            reason: format!("unsupported scheme `{}`", parsed.scheme()),
        });
    }
    Ok(raw.to_string())
}

/// Non-empty trimmed string, or a number rendered as text
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative finite decimal from a number or numeric string
fn amount(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

/// Non-negative integer; integral floats are accepted, fractions truncated
fn count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
