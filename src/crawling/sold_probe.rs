//! Units-sold probe
//!
//! An ordered chain of strategies; the first one that yields a count wins.
//! 1. Item API `sold_quantity`
//! 2. Localized "sold" phrasings in the page text
//! 3. Sold-count badge markup
//!
//! The product page is fetched at most once per probe and shared by the
//! page-based strategies. `scraper::Html` is not `Send`, so parsing and
//! extraction happen in plain functions that never cross an await.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::domain::{ProductDraft, SoldCount, SoldSource};
use crate::infrastructure::MarketplaceClient;

/// Patterns tried in order against the page text, with their multiplier.
/// Each count must start at a non-digit boundary so a separator group is
/// never matched on its own.
const TEXT_PATTERNS: &[(&str, u64)] = &[
    (r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d+)*)\s*mil\s+vendidos", 1000),
    (r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d{3})*)\s*vendidos?", 1),
    (r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d{3})*)\s*sold", 1),
    (r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d{3})*)\s*(?:vendido|ventas)", 1),
];

const BADGE_SELECTORS: &[&str] = &[
    "span.ui-pdp-color--GREEN.ui-pdp-family--REGULAR",
    "div.ui-pdp-color--GREEN.ui-pdp-family--REGULAR",
    ".ui-pdp-subtitle",
];

static TEXT_REGEXES: Lazy<Vec<(Regex, u64)>> = Lazy::new(|| {
    TEXT_PATTERNS
        .iter()
        .filter_map(|(pattern, multiplier)| Regex::new(pattern).ok().map(|re| (re, *multiplier)))
        .collect()
});

static BADGE_SELECTORS_COMPILED: Lazy<Vec<Selector>> = Lazy::new(|| {
    BADGE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static DIGIT_GROUP: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d{3})*").ok());

/// Parses a count where `.` and `,` are thousands separators ("1.234" → 1234)
#[must_use]
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// First matching pattern in the document text
#[must_use]
pub fn extract_from_text(text: &str) -> Option<u64> {
    TEXT_REGEXES.iter().find_map(|(re, multiplier)| {
        let captures = re.captures(text)?;
        parse_scaled(captures.get(1)?.as_str(), *multiplier)
    })
}

/// Applies a "mil" style multiplier. A trailing group that is not exactly
/// three digits is a decimal fraction ("1.5 mil" → 1500); otherwise the
/// separators are thousands separators ("1.000 mil" → 1 000 000).
fn parse_scaled(raw: &str, multiplier: u64) -> Option<u64> {
    if multiplier == 1 {
        return parse_count(raw);
    }
    match raw.rfind(['.', ',']) {
        Some(split) if raw.len() - split - 1 != 3 => {
            let whole = parse_count(&raw[..split])?;
            let fraction = &raw[split + 1..];
            let scale = 10u64.checked_pow(u32::try_from(fraction.len()).ok()?)?;
            let fraction = parse_count(fraction)?;
            whole
                .checked_mul(multiplier)?
                .checked_add(fraction.checked_mul(multiplier)? / scale)
        }
        _ => parse_count(raw)?.checked_mul(multiplier),
    }
}

/// Visible text of an HTML document, script and style content excluded
#[must_use]
pub fn document_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::with_capacity(html.len() / 4);
    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

/// First digit group inside the known sold-count badge regions
#[must_use]
pub fn extract_from_badges(html: &str) -> Option<u64> {
    let digit_group = DIGIT_GROUP.as_ref()?;
    let document = Html::parse_document(html);
    BADGE_SELECTORS_COMPILED.iter().find_map(|selector| {
        document.select(selector).find_map(|element| {
            let text = element.text().collect::<String>();
            digit_group
                .find(&text)
                .and_then(|m| parse_count(m.as_str()))
        })
    })
}

/// What a strategy sees: the draft's keys and the lazily fetched page
pub struct ProbeContext<'a> {
    client: &'a MarketplaceClient,
    url: &'a str,
    item_id: Option<&'a str>,
    page: Option<Option<String>>,
}

impl<'a> ProbeContext<'a> {
    #[must_use]
    pub fn new(client: &'a MarketplaceClient, draft: &'a ProductDraft) -> Self {
        Self {
            client,
            url: &draft.url,
            item_id: draft.item_id.as_deref(),
            page: None,
        }
    }

    #[must_use]
    pub const fn url(&self) -> &str {
        self.url
    }

    #[must_use]
    pub const fn item_id(&self) -> Option<&str> {
        self.item_id
    }

    #[must_use]
    pub const fn client(&self) -> &MarketplaceClient {
        self.client
    }

    /// Product page HTML, fetched on first use
    pub async fn page(&mut self) -> Option<&str> {
        if self.page.is_none() {
            let fetched = match self.client.fetch_page(self.url).await {
                Ok(body) => Some(body),
                Err(e) => {
                    debug!(url = self.url, error = %e, "Product page unavailable");
                    None
                }
            };
            self.page = Some(fetched);
        }
        self.page.as_ref().and_then(|page| page.as_deref())
    }
}

/// One way of finding a units-sold figure
#[async_trait]
pub trait SoldStrategy: Send + Sync {
    fn source(&self) -> SoldSource;

    async fn extract(&self, ctx: &mut ProbeContext<'_>) -> Option<u64>;
}

/// `GET /items/{id}` → `sold_quantity`
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemApiStrategy;

#[async_trait]
impl SoldStrategy for ItemApiStrategy {
    fn source(&self) -> SoldSource {
        SoldSource::ItemApi
    }

    async fn extract(&self, ctx: &mut ProbeContext<'_>) -> Option<u64> {
        let item_id = ctx.item_id()?;
        match ctx.client().item_sold_quantity(item_id).await {
            Ok(sold) => sold,
            Err(e) => {
                debug!(url = ctx.url(), item_id, error = %e, "Item API lookup failed");
                None
            }
        }
    }
}

/// Regex scan of the page text
#[derive(Debug, Clone, Copy, Default)]
pub struct PageTextStrategy;

#[async_trait]
impl SoldStrategy for PageTextStrategy {
    fn source(&self) -> SoldSource {
        SoldSource::PageText
    }

    async fn extract(&self, ctx: &mut ProbeContext<'_>) -> Option<u64> {
        let html = ctx.page().await?;
        extract_from_text(&document_text(html))
    }
}

/// Digit group inside the sold badge markup
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeMarkupStrategy;

#[async_trait]
impl SoldStrategy for BadgeMarkupStrategy {
    fn source(&self) -> SoldSource {
        SoldSource::BadgeMarkup
    }

    async fn extract(&self, ctx: &mut ProbeContext<'_>) -> Option<u64> {
        let html = ctx.page().await?;
        extract_from_badges(html)
    }
}

pub struct SoldProbe {
    client: MarketplaceClient,
    strategies: Vec<Box<dyn SoldStrategy>>,
}

impl std::fmt::Debug for SoldProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<_> = self.strategies.iter().map(|s| s.source()).collect();
        f.debug_struct("SoldProbe").field("strategies", &sources).finish()
    }
}

impl SoldProbe {
    /// The standard chain; the item API step is optional
    #[must_use]
    pub fn new(client: MarketplaceClient, use_item_api: bool) -> Self {
        let mut strategies: Vec<Box<dyn SoldStrategy>> = Vec::with_capacity(3);
        if use_item_api {
            strategies.push(Box::new(ItemApiStrategy));
        }
        strategies.push(Box::new(PageTextStrategy));
        strategies.push(Box::new(BadgeMarkupStrategy));
        Self::with_strategies(client, strategies)
    }

    #[must_use]
    pub fn with_strategies(client: MarketplaceClient, strategies: Vec<Box<dyn SoldStrategy>>) -> Self {
        Self { client, strategies }
    }

    /// Runs the chain; `Unknown` when no strategy produced a count
    pub async fn probe(&self, draft: &ProductDraft) -> SoldCount {
        let mut ctx = ProbeContext::new(&self.client, draft);
        for strategy in &self.strategies {
            if let Some(units) = strategy.extract(&mut ctx).await {
                debug!(url = %draft.url, units, source = strategy.source().as_str(), "Units sold found");
                return SoldCount::confirmed(units, strategy.source());
            }
        }
        debug!(url = %draft.url, "No units-sold signal found");
        SoldCount::Unknown
    }
}
