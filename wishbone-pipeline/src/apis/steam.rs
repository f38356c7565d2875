use super::{price_token_to_pence, Storefront};
use scraper::{Html, Selector};
use tracing::{debug, info};
use wishbone_core::common::error::{PipelineError, Result};
use wishbone_core::domain::RawListing;

const SEARCH_RESULTS_URL: &str =
    "https://store.steampowered.com/search/results/?query&start={start}&filter=topsellers&infinite=1";
const SEARCH_PAGE_URL: &str = "https://store.steampowered.com/search/?term={term}";

// Top-seller pages come back 50 results at a time; total_count covers the
// whole catalogue when scaling up.
const PAGE_SIZE: usize = 50;
const MAX_SEARCH: usize = 500;

pub struct SteamStore {
    client: reqwest::Client,
}

impl Default for SteamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SteamStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_results_html(&self, start: usize) -> Result<String> {
        let url = SEARCH_RESULTS_URL.replace("{start}", &start.to_string());
        let body: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        body.get("results_html")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::Parse {
                message: format!("{url} returned no results_html field"),
            })
    }

    /// Scrape one page of top-seller anchors into raw listings.
    fn parse_results(&self, html: &str) -> Result<Vec<RawListing>> {
        let document = Html::parse_fragment(html);
        let anchor_selector = Selector::parse("a").unwrap();
        let title_selector = Selector::parse("span.title").unwrap();
        let final_selector = Selector::parse("div.discount_final_price").unwrap();
        let original_selector = Selector::parse("div.discount_original_price").unwrap();

        let anchors: Vec<_> = document.select(&anchor_selector).collect();
        if anchors.is_empty() {
            return Err(PipelineError::Parse {
                message: "Results page contains no product anchors".to_string(),
            });
        }

        let mut listings = Vec::new();
        for anchor in anchors {
            let title = anchor
                .select(&title_selector)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
                .ok_or_else(|| PipelineError::Parse {
                    message: "Product anchor is missing a title span".to_string(),
                })?;

            let final_price = match anchor.select(&final_selector).next() {
                Some(el) => el.text().collect::<String>().trim().to_string(),
                // skip this game if no listed price
                None => continue,
            };

            // No original-price div means the game is not on discount
            let base_price = anchor
                .select(&original_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_else(|| final_price.clone());

            listings.push(RawListing {
                name: title,
                base_price_gbp_pence: Some(price_token_to_pence(&base_price)?),
                final_price_gbp_pence: Some(price_token_to_pence(&final_price)?),
            });
        }

        Ok(listings)
    }

    /// First result of the storefront search page for a single title.
    fn parse_search_page(&self, html: &str, query: &str) -> Result<RawListing> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("a.search_result_row").unwrap();
        let title_selector = Selector::parse("span.title").unwrap();
        let final_selector = Selector::parse("div.discount_final_price").unwrap();
        let original_selector = Selector::parse("div.discount_original_price").unwrap();

        let row = document
            .select(&row_selector)
            .next()
            .ok_or_else(|| PipelineError::Parse {
                message: format!("No search results found for {query}"),
            })?;

        let title = row
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .ok_or_else(|| PipelineError::Parse {
                message: format!("No search results found for {query}"),
            })?;

        let final_price = row
            .select(&final_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or_else(|| PipelineError::Parse {
                message: "Storefront changed how it labels discount prices".to_string(),
            })?;

        // if on discount the original price is present; otherwise final is base
        let base_price = row
            .select(&original_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_else(|| final_price.clone());

        Ok(RawListing {
            name: title,
            base_price_gbp_pence: Some(price_token_to_pence(&base_price)?),
            final_price_gbp_pence: Some(price_token_to_pence(&final_price)?),
        })
    }
}

#[async_trait::async_trait]
impl Storefront for SteamStore {
    fn platform_name(&self) -> &'static str {
        "steam"
    }

    async fn fetch_catalog(&self) -> Result<Vec<RawListing>> {
        let mut results = Vec::new();

        for start in (0..MAX_SEARCH).step_by(PAGE_SIZE) {
            let html = self.fetch_results_html(start).await?;
            let page = self.parse_results(&html)?;
            debug!("Results scraped: {}", start);
            results.extend(page);
        }

        info!("Fetched {} steam listings", results.len());
        Ok(results)
    }

    async fn search_listing(&self, query: &str) -> Result<RawListing> {
        let url = SEARCH_PAGE_URL.replace("{term}", query);
        let html = self.client.get(&url).send().await?.text().await?;
        if html.is_empty() {
            return Err(PipelineError::Parse {
                message: format!("{query} is invalid and leads to no match"),
            });
        }
        self.parse_search_page(&html, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_FIXTURE: &str = r#"
        <a href="/app/1"><span class="title">Discounted Game</span>
          <div class="discount_original_price">£20.00</div>
          <div class="discount_final_price">£10.00</div></a>
        <a href="/app/2"><span class="title">Full Price Game</span>
          <div class="discount_final_price">£42.99</div></a>
        <a href="/app/3"><span class="title">Unpriced Bundle</span></a>
    "#;

    #[test]
    fn parses_discounted_and_full_price_rows() {
        let store = SteamStore::new();
        let listings = store.parse_results(RESULTS_FIXTURE).unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(
            listings[0],
            RawListing {
                name: "Discounted Game".to_string(),
                base_price_gbp_pence: Some(2000),
                final_price_gbp_pence: Some(1000),
            }
        );
        // no original-price div: base falls back to final
        assert_eq!(listings[1].base_price_gbp_pence, Some(4299));
        assert_eq!(listings[1].final_price_gbp_pence, Some(4299));
    }

    #[test]
    fn unpriced_rows_are_skipped() {
        let store = SteamStore::new();
        let listings = store.parse_results(RESULTS_FIXTURE).unwrap();
        assert!(!listings.iter().any(|l| l.name == "Unpriced Bundle"));
    }

    #[test]
    fn empty_results_page_is_a_parse_error() {
        let store = SteamStore::new();
        assert!(store.parse_results("<div>nothing here</div>").is_err());
    }

    #[test]
    fn search_page_takes_the_first_row() {
        let store = SteamStore::new();
        let html = r#"
            <html><body>
            <a class="search_result_row" href="/app/413150">
              <span class="title">Stardew Valley</span>
              <div class="discount_final_price">£8.99</div>
            </a>
            <a class="search_result_row" href="/app/999">
              <span class="title">Stardew Valley Soundtrack</span>
              <div class="discount_final_price">£4.29</div>
            </a>
            </body></html>
        "#;
        let listing = store.parse_search_page(html, "stardew valley").unwrap();
        assert_eq!(listing.name, "Stardew Valley");
        assert_eq!(listing.base_price_gbp_pence, Some(899));
    }

    #[test]
    fn search_page_without_rows_is_an_error() {
        let store = SteamStore::new();
        assert!(store.parse_search_page("<html></html>", "nope").is_err());
    }
}
