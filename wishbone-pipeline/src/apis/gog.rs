use super::{price_token_to_pence, Storefront};
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};
use wishbone_core::common::error::{PipelineError, Result};
use wishbone_core::domain::RawListing;

const PRODUCT_DATA_BASE: &str = "https://www.gogdb.org/data/products";
const CATALOG_SEARCH_URL: &str = "https://catalog.gog.com/v1/catalog";
const FX_RATE_URL: &str = "https://api.frankfurter.app/latest?from=USD&to=GBP";

const CONCURRENCY: usize = 100;
const TIMEOUT_SECS: u64 = 600;
// default in case the FX service is down
const DEFAULT_USD_TO_GBP: f64 = 0.77;

pub struct GogStore {
    client: reqwest::Client,
}

impl Default for GogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GogStore {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent("Mozilla/5.0")
            .build()
            .expect("static client configuration");
        Self { client }
    }

    /// Fetch JSON, logging and swallowing per-item failures: a miss on one
    /// product must not sink the whole batch.
    async fn fetch_json(&self, url: &str) -> Option<Value> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Error fetching {url}: {e}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("{}: error for {url}", status.as_u16());
            return None;
        }

        match response.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Unparseable JSON from {url}: {e}");
                None
            }
        }
    }

    /// Scrape the product directory listing for every product id.
    async fn get_all_product_ids(&self) -> Result<Vec<u64>> {
        let url = format!("{PRODUCT_DATA_BASE}/");
        let html = self.client.get(&url).send().await?.text().await?;
        Ok(Self::parse_product_ids(&html))
    }

    fn parse_product_ids(html: &str) -> Vec<u64> {
        let document = Html::parse_document(html);
        let anchor_selector = Selector::parse("a").unwrap();

        let mut ids: Vec<u64> = document
            .select(&anchor_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| href.strip_suffix('/'))
            .filter_map(|stem| stem.parse::<u64>().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Extract product.json + prices.json for a single product folder.
    async fn extract_product(&self, product_id: u64, usd_to_gbp: f64) -> Option<RawListing> {
        let product_url = format!("{PRODUCT_DATA_BASE}/{product_id}/product.json");
        let prices_url = format!("{PRODUCT_DATA_BASE}/{product_id}/prices.json");

        let (product, prices) =
            tokio::join!(self.fetch_json(&product_url), self.fetch_json(&prices_url));

        let product = product?;
        let name = product.get("title")?.as_str()?.to_string();

        let (base, final_price) = prices
            .as_ref()
            .map(|p| Self::latest_usd_prices(p))
            .unwrap_or((None, None));

        Some(RawListing {
            name,
            base_price_gbp_pence: base.map(|cents| Self::cents_to_pence(cents, usd_to_gbp)),
            final_price_gbp_pence: final_price.map(|cents| Self::cents_to_pence(cents, usd_to_gbp)),
        })
    }

    /// Latest (base, final) USD cents from a price-history document.
    fn latest_usd_prices(prices: &Value) -> (Option<i64>, Option<i64>) {
        let history = prices
            .get("US")
            .and_then(|us| us.get("USD"))
            .and_then(|h| h.as_array());

        let Some(history) = history else {
            return (None, None);
        };

        let latest = history
            .iter()
            .max_by_key(|entry| entry.get("date").and_then(|d| d.as_str()).unwrap_or(""));

        match latest {
            Some(entry) => (
                entry.get("price_base").and_then(|v| v.as_i64()),
                entry.get("price_final").and_then(|v| v.as_i64()),
            ),
            None => (None, None),
        }
    }

    fn cents_to_pence(cents: i64, usd_to_gbp: f64) -> i64 {
        (cents as f64 * usd_to_gbp).round() as i64
    }

    async fn usd_to_gbp_rate(&self) -> f64 {
        if let Ok(raw) = std::env::var("WISHBONE_USD_TO_GBP") {
            if let Ok(rate) = raw.parse::<f64>() {
                return rate;
            }
        }

        let rate = self
            .fetch_json(FX_RATE_URL)
            .await
            .and_then(|v| v.get("rates")?.get("GBP")?.as_f64());

        match rate {
            Some(rate) => rate,
            None => {
                warn!("FX rate service unavailable, using default USD->GBP rate");
                DEFAULT_USD_TO_GBP
            }
        }
    }
}

#[async_trait::async_trait]
impl Storefront for GogStore {
    fn platform_name(&self) -> &'static str {
        "gog"
    }

    async fn fetch_catalog(&self) -> Result<Vec<RawListing>> {
        info!("Fetching all product ids...");
        let product_ids = self.get_all_product_ids().await?;
        info!("Found {} products", product_ids.len());

        let usd_to_gbp = self.usd_to_gbp_rate().await;
        info!("Current USD -> GBP rate: {usd_to_gbp}");

        // Bounded fan-out against one host; results land in completion order.
        let results: Vec<RawListing> = stream::iter(product_ids)
            .map(|id| self.extract_product(id, usd_to_gbp))
            .buffer_unordered(CONCURRENCY)
            .filter_map(|item| async move { item })
            .collect()
            .await;

        info!("Extracted {} products", results.len());
        Ok(results)
    }

    async fn search_listing(&self, query: &str) -> Result<RawListing> {
        let body: Value = self
            .client
            .get(CATALOG_SEARCH_URL)
            .query(&[
                ("limit", "48"),
                ("countryCode", "GB"),
                ("query", &format!("like:{query}")),
            ])
            .send()
            .await?
            .json()
            .await?;

        let product = body
            .get("products")
            .and_then(|p| p.as_array())
            .and_then(|p| p.first())
            .ok_or_else(|| PipelineError::Parse {
                message: format!("{query} is invalid and leads to no match"),
            })?;

        let name = product
            .get("title")
            .and_then(|t| t.as_str())
            .ok_or_else(|| PipelineError::MissingField("title".to_string()))?
            .to_string();

        let base = product
            .pointer("/price/base")
            .and_then(|v| v.as_str())
            .map(price_token_to_pence)
            .transpose()?;
        let final_price = product
            .pointer("/price/final")
            .and_then(|v| v.as_str())
            .map(price_token_to_pence)
            .transpose()?;

        Ok(RawListing {
            name,
            base_price_gbp_pence: base,
            final_price_gbp_pence: final_price,
        })
    }
}
