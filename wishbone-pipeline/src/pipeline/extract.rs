//! Extraction stage: pulls raw listings from storefront adapters and stages
//! them as per-source JSON files for the transform step.

use crate::apis::Storefront;
use crate::observability::metrics::{self, MetricName};
use crate::pipeline::transform::source_file_name;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use wishbone_core::common::error::Result;
use wishbone_core::domain::RawListing;

/// Run one storefront's bulk catalog extract and stage it to
/// `<data_dir>/<source>_products.json`. Returns the listing count.
pub async fn export_catalog(store: &dyn Storefront, data_dir: &Path) -> Result<usize> {
    let listings = match store.fetch_catalog().await {
        Ok(listings) => {
            metrics::increment(MetricName::ExtractRequestsSuccess);
            listings
        }
        Err(e) => {
            metrics::increment(MetricName::ExtractRequestsError);
            return Err(e);
        }
    };

    write_staged_listings(&listings, store.platform_name(), data_dir)?;
    metrics::increment_by(MetricName::ExtractListingsScraped, listings.len() as u64);

    info!(
        "Staged {} {} listings to {}",
        listings.len(),
        store.platform_name(),
        data_dir.display()
    );
    Ok(listings.len())
}

pub fn write_staged_listings(
    listings: &[RawListing],
    platform_name: &str,
    data_dir: &Path,
) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let file = File::create(data_dir.join(source_file_name(platform_name)))?;
    serde_json::to_writer_pretty(file, listings)?;
    Ok(())
}

/// Search every storefront for one title, best-effort: a miss on one store
/// is logged and skipped, never propagated.
pub async fn search_stores(
    stores: &[Arc<dyn Storefront>],
    query: &str,
) -> Vec<(&'static str, RawListing)> {
    let mut found = Vec::new();
    for store in stores {
        match store.search_listing(query).await {
            Ok(listing) => {
                metrics::increment(MetricName::ExtractRequestsSuccess);
                found.push((store.platform_name(), listing));
            }
            Err(e) => {
                metrics::increment(MetricName::ExtractRequestsError);
                warn!("No {} result for '{query}': {e}", store.platform_name());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use wishbone_core::common::error::PipelineError;

    struct FakeStore {
        name: &'static str,
        result: std::result::Result<RawListing, &'static str>,
    }

    #[async_trait::async_trait]
    impl Storefront for FakeStore {
        fn platform_name(&self) -> &'static str {
            self.name
        }

        async fn fetch_catalog(&self) -> Result<Vec<RawListing>> {
            match &self.result {
                Ok(listing) => Ok(vec![listing.clone()]),
                Err(msg) => Err(PipelineError::Parse {
                    message: msg.to_string(),
                }),
            }
        }

        async fn search_listing(&self, _query: &str) -> Result<RawListing> {
            match &self.result {
                Ok(listing) => Ok(listing.clone()),
                Err(msg) => Err(PipelineError::Parse {
                    message: msg.to_string(),
                }),
            }
        }
    }

    fn listing(name: &str) -> RawListing {
        RawListing {
            name: name.to_string(),
            base_price_gbp_pence: Some(1000),
            final_price_gbp_pence: Some(750),
        }
    }

    #[tokio::test]
    async fn export_catalog_stages_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore {
            name: "steam",
            result: Ok(listing("Game A")),
        };

        let count = export_catalog(&store, dir.path()).await.unwrap();
        assert_eq!(count, 1);

        let staged = std::fs::read_to_string(dir.path().join("steam_products.json")).unwrap();
        let reparsed: Vec<RawListing> = serde_json::from_str(&staged).unwrap();
        assert_eq!(reparsed, vec![listing("Game A")]);
    }

    #[tokio::test]
    async fn search_is_best_effort_across_stores() {
        let stores: Vec<Arc<dyn Storefront>> = vec![
            Arc::new(FakeStore {
                name: "steam",
                result: Ok(listing("Game A")),
            }),
            Arc::new(FakeStore {
                name: "gog",
                result: Err("layout changed"),
            }),
        ];

        let found = search_stores(&stores, "game a").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "steam");
    }
}
