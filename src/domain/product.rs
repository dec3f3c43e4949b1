use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace a listing was harvested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    #[serde(rename = "mercadolibre")]
    MercadoLibre,
}

impl Platform {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MercadoLibre => "mercadolibre",
        }
    }
}

/// Item condition as reported by the upstream listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "nuevo", alias = "new")]
    New,
    #[serde(rename = "usado", alias = "used")]
    Used,
    #[default]
    #[serde(rename = "N/A", alias = "unknown")]
    Unknown,
}

impl Condition {
    /// Maps the upstream `condition` string
    #[must_use]
    pub fn from_upstream(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("new") => Self::New,
            Some(value) if value.eq_ignore_ascii_case("used") => Self::Used,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "nuevo",
            Self::Used => "usado",
            Self::Unknown => "N/A",
        }
    }

    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_stored(raw: &str) -> Self {
        Self::from_upstream(Some(raw))
    }
}

/// Decoded-but-not-yet-enriched product listing.
///
/// Wire keys keep the names the browser front end and the spreadsheet
/// exporter already consume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductDraft {
    #[serde(rename = "producto")]
    pub title: String,
    #[serde(rename = "plataforma")]
    pub platform: Platform,
    #[serde(rename = "precio_original")]
    pub original_price: f64,
    #[serde(rename = "precio_con_descuento")]
    pub discounted_price: f64,
    #[serde(rename = "descuento")]
    pub discount_percentage: f64,
    #[serde(rename = "vendedor")]
    pub seller: String,
    #[serde(rename = "vendedor_id", skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<u64>,
    #[serde(rename = "cuotas")]
    pub installments: u32,
    #[serde(rename = "meses_intereses")]
    pub interest_free_months: u32,
    /// `None` is the "N/A" state: upstream said nothing about shipping
    #[serde(rename = "envio_gratis")]
    pub free_shipping: Option<bool>,
    #[serde(rename = "estado_producto")]
    pub condition: Condition,
    #[serde(rename = "cantidad_disponible")]
    pub available_quantity: u64,
    /// Canonical product URL, also the persistence key
    #[serde(rename = "url_producto")]
    pub url: String,
    #[serde(rename = "imagen_url")]
    pub thumbnail_url: String,
    #[serde(rename = "categoria")]
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(rename = "fecha_extraccion")]
    pub extracted_at: DateTime<Utc>,
}

/// Which probe strategy produced a units-sold figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoldSource {
    ItemApi,
    PageText,
    BadgeMarkup,
}

impl SoldSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ItemApi => "item_api",
            Self::PageText => "page_text",
            Self::BadgeMarkup => "badge_markup",
        }
    }

    #[must_use]
    pub fn from_stored(raw: &str) -> Option<Self> {
        match raw {
            "item_api" => Some(Self::ItemApi),
            "page_text" => Some(Self::PageText),
            "badge_markup" => Some(Self::BadgeMarkup),
            _ => None,
        }
    }
}

/// Result of the enrichment probe.
///
/// `Unknown` is kept distinct from `Confirmed(0)` internally; on the wire both
/// become `cantida_vendido = 0` and only `fuente_vendidos` tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoldCount {
    #[default]
    Unknown,
    Confirmed { units: u64, source: SoldSource },
}

impl SoldCount {
    #[must_use]
    pub const fn confirmed(units: u64, source: SoldSource) -> Self {
        Self::Confirmed { units, source }
    }

    #[must_use]
    pub const fn units(self) -> u64 {
        match self {
            Self::Unknown => 0,
            Self::Confirmed { units, .. } => units,
        }
    }

    #[must_use]
    pub const fn source(self) -> Option<SoldSource> {
        match self {
            Self::Unknown => None,
            Self::Confirmed { source, .. } => Some(source),
        }
    }

    #[must_use]
    pub const fn is_known(self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// A draft with its units-sold signal attached
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichedProduct {
    #[serde(flatten)]
    pub product: ProductDraft,
    #[serde(rename = "cantida_vendido", default)]
    pub units_sold: u64,
    #[serde(rename = "fuente_vendidos", default)]
    pub units_sold_source: Option<SoldSource>,
}

impl EnrichedProduct {
    #[must_use]
    pub fn new(product: ProductDraft, sold: SoldCount) -> Self {
        Self {
            product,
            units_sold: sold.units(),
            units_sold_source: sold.source(),
        }
    }

    /// Enrichment failed or found nothing
    #[must_use]
    pub fn unenriched(product: ProductDraft) -> Self {
        Self::new(product, SoldCount::Unknown)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.product.url
    }

    #[must_use]
    pub fn sold_count(&self) -> SoldCount {
        match self.units_sold_source {
            Some(source) => SoldCount::confirmed(self.units_sold, source),
            None => SoldCount::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> ProductDraft {
        ProductDraft {
            title: "Laptop Gamer".to_string(),
            original_price: 25_000.0,
            discounted_price: 21_999.0,
            discount_percentage: 12.0,
            seller: "TIENDA_OFICIAL".to_string(),
            condition: Condition::New,
            url: "https://articulo.mercadolibre.com.mx/MLM-123-laptop".to_string(),
            ..ProductDraft::default()
        }
    }

    #[test]
    fn wire_keys_match_front_end_contract() {
        let product = EnrichedProduct::new(
            sample_draft(),
            SoldCount::confirmed(1234, SoldSource::PageText),
        );
        let value = serde_json::to_value(&product).unwrap();

        assert_eq!(value["producto"], "Laptop Gamer");
        assert_eq!(value["plataforma"], "mercadolibre");
        assert_eq!(value["estado_producto"], "nuevo");
        assert_eq!(value["cantida_vendido"], 1234);
        assert_eq!(value["fuente_vendidos"], "page_text");
        assert_eq!(
            value["url_producto"],
            "https://articulo.mercadolibre.com.mx/MLM-123-laptop"
        );
        assert!(value.get("item_id").is_none());
    }

    #[test]
    fn partial_client_rows_deserialize_with_defaults() {
        let raw = serde_json::json!({
            "producto": "Mouse",
            "url_producto": "https://example.com/mouse",
            "estado_producto": "used",
            "cantida_vendido": 7
        });
        let product: EnrichedProduct = serde_json::from_value(raw).unwrap();

        assert_eq!(product.product.title, "Mouse");
        assert_eq!(product.product.condition, Condition::Used);
        assert_eq!(product.units_sold, 7);
        assert_eq!(product.units_sold_source, None);
        assert_eq!(product.sold_count(), SoldCount::Unknown);
    }

    #[test]
    fn unknown_and_confirmed_zero_are_distinct() {
        let unknown = EnrichedProduct::unenriched(sample_draft());
        let zero = EnrichedProduct::new(sample_draft(), SoldCount::confirmed(0, SoldSource::ItemApi));

        assert_eq!(unknown.units_sold, zero.units_sold);
        assert!(!unknown.sold_count().is_known());
        assert!(zero.sold_count().is_known());
    }

    #[test]
    fn condition_maps_upstream_values() {
        assert_eq!(Condition::from_upstream(Some("new")), Condition::New);
        assert_eq!(Condition::from_upstream(Some("USED")), Condition::Used);
        assert_eq!(Condition::from_upstream(Some("refurbished")), Condition::Unknown);
        assert_eq!(Condition::from_upstream(None), Condition::Unknown);
    }
}
