use super::Storefront;
use serde_json::{json, Value};
use tracing::{debug, info};
use wishbone_core::common::error::{PipelineError, Result};
use wishbone_core::domain::RawListing;

const GRAPHQL_ENDPOINT: &str = "https://graphql.epicgames.com/graphql";

const BATCH_SIZE: usize = 1000;
// backstop against a runaway paging loop
const SAFETY_LIMIT: usize = 50_000;

const STORE_QUERY: &str = r#"
query searchStoreQuery(
  $allowCountries: String
  $category: String
  $count: Int
  $country: String!
  $keywords: String
  $locale: String
  $sortBy: String
  $sortDir: String
  $start: Int
  $withPrice: Boolean = true
) {
  Catalog {
    searchStore(
      allowCountries: $allowCountries
      category: $category
      count: $count
      country: $country
      keywords: $keywords
      locale: $locale
      sortBy: $sortBy
      sortDir: $sortDir
      start: $start
    ) {
      elements {
        title
        price(country: $country) @include(if: $withPrice) {
          totalPrice {
            discountPrice
            originalPrice
          }
        }
      }
      paging {
        count
        total
      }
    }
  }
}
"#;

pub struct EpicStore {
    client: reqwest::Client,
    country: &'static str,
    locale: &'static str,
}

impl Default for EpicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EpicStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            country: "GB",
            locale: "en-GB",
        }
    }

    async fn query_store(&self, keywords: &str, count: usize, start: usize) -> Result<Value> {
        let variables = json!({
            "allowCountries": self.country,
            "category": "games/edition/base|bundles/games|editors|software/edition/base",
            "count": count,
            "country": self.country,
            "keywords": keywords,
            "locale": self.locale,
            "sortBy": "title",
            "sortDir": "ASC",
            "start": start,
            "withPrice": true,
        });

        let body: Value = self
            .client
            .post(GRAPHQL_ENDPOINT)
            .json(&json!({ "query": STORE_QUERY, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    fn elements(body: &Value) -> Vec<&Value> {
        body.pointer("/data/Catalog/searchStore/elements")
            .and_then(|e| e.as_array())
            .map(|e| e.iter().collect())
            .unwrap_or_default()
    }

    /// Map one catalogue element; GBP prices arrive in pence already.
    fn element_to_listing(element: &Value) -> Option<RawListing> {
        let title = element.get("title")?.as_str()?.to_string();
        let total = element.pointer("/price/totalPrice");

        Some(RawListing {
            name: title,
            base_price_gbp_pence: total
                .and_then(|t| t.get("originalPrice"))
                .and_then(|v| v.as_i64()),
            final_price_gbp_pence: total
                .and_then(|t| t.get("discountPrice"))
                .and_then(|v| v.as_i64()),
        })
    }
}

#[async_trait::async_trait]
impl Storefront for EpicStore {
    fn platform_name(&self) -> &'static str {
        "epic"
    }

    async fn fetch_catalog(&self) -> Result<Vec<RawListing>> {
        let mut all_listings = Vec::new();
        let mut start = 0;

        loop {
            let body = self.query_store("", BATCH_SIZE, start).await?;
            let elements = Self::elements(&body);
            if elements.is_empty() {
                debug!("No more games found");
                break;
            }

            let page_len = elements.len();
            all_listings.extend(elements.iter().filter_map(|e| Self::element_to_listing(e)));
            debug!("Fetched {page_len} games (total: {})", all_listings.len());

            start += BATCH_SIZE;
            if page_len < BATCH_SIZE {
                debug!("Reached end of catalog");
                break;
            }
            if start > SAFETY_LIMIT {
                info!("Reached catalog safety limit");
                break;
            }
        }

        info!("Fetched {} epic listings", all_listings.len());
        Ok(all_listings)
    }

    async fn search_listing(&self, query: &str) -> Result<RawListing> {
        let body = self.query_store(query, 1, 0).await?;
        Self::elements(&body)
            .first()
            .and_then(|e| Self::element_to_listing(e))
            .ok_or_else(|| PipelineError::Parse {
                message: format!("No search results found for {query}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_catalogue_elements() {
        let body = json!({
            "data": {"Catalog": {"searchStore": {"elements": [
                {"title": "Alan Wake 2", "price": {"totalPrice": {"discountPrice": 2499, "originalPrice": 4999}}},
                {"title": "Free Weekend Thing", "price": {"totalPrice": {"discountPrice": 0, "originalPrice": 0}}},
                {"title": "No Price Entry"}
            ]}}}
        });

        let elements = EpicStore::elements(&body);
        assert_eq!(elements.len(), 3);

        let listing = EpicStore::element_to_listing(elements[0]).unwrap();
        assert_eq!(listing.base_price_gbp_pence, Some(4999));
        assert_eq!(listing.final_price_gbp_pence, Some(2499));

        // price block absent: listing survives with unknown prices
        let unpriced = EpicStore::element_to_listing(elements[2]).unwrap();
        assert_eq!(unpriced.base_price_gbp_pence, None);
        assert_eq!(unpriced.final_price_gbp_pence, None);
    }

    #[test]
    fn malformed_body_yields_no_elements() {
        assert!(EpicStore::elements(&json!({"data": null})).is_empty());
    }
}
