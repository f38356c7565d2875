//! Daily batch entry point: extract each enabled source, transform, load.

use crate::apis::Storefront;
use crate::pipeline::{extract, load::Loader, transform};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use wishbone_core::domain::discount::DiscountPolicy;
use wishbone_core::storage::Storage;

/// Structured batch status, the shape returned to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub status: String,
    pub msg: String,
}

impl PipelineReport {
    fn success() -> Self {
        Self {
            status: "success".to_string(),
            msg: "store updated, pipeline successfully run".to_string(),
        }
    }

    fn stage_error(stage: &str, err: impl std::fmt::Display) -> Self {
        Self {
            status: "error".to_string(),
            msg: format!("{err} occurred in {stage}"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Run extract -> transform -> load. Each stage is wrapped individually;
/// the first failing stage short-circuits the run and is named in the
/// report. No stage is retried.
pub async fn run_daily_pipeline(
    storage: &dyn Storage,
    stores: &[Arc<dyn Storefront>],
    data_dir: &Path,
    policy: DiscountPolicy,
) -> PipelineReport {
    for store in stores {
        let stage = format!("extract_{}", store.platform_name());
        match extract::export_catalog(store.as_ref(), data_dir).await {
            Ok(count) => info!("{stage}: staged {count} listings"),
            Err(e) => {
                error!("{stage} failed: {e}");
                return PipelineReport::stage_error(&stage, e);
            }
        }
    }

    let source_ids: Vec<String> = stores
        .iter()
        .map(|s| s.platform_name().to_string())
        .collect();
    let records = match transform::transform_all(data_dir, &source_ids, policy) {
        Ok(records) => records,
        Err(e) => {
            error!("transform failed: {e}");
            return PipelineReport::stage_error("transform", e);
        }
    };

    match Loader::new(storage).load(&records).await {
        Ok(summary) => {
            info!("load: {} records committed", summary.records_loaded);
            PipelineReport::success()
        }
        Err(e) => {
            error!("load failed: {e}");
            PipelineReport::stage_error("load", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wishbone_core::common::error::{PipelineError, Result as CoreResult};
    use wishbone_core::domain::RawListing;
    use wishbone_core::storage::InMemoryStorage;

    struct ScriptedStore {
        name: &'static str,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Storefront for ScriptedStore {
        fn platform_name(&self) -> &'static str {
            self.name
        }

        async fn fetch_catalog(&self) -> CoreResult<Vec<RawListing>> {
            if self.fail {
                return Err(PipelineError::Api {
                    message: "endpoint down".to_string(),
                });
            }
            Ok(vec![RawListing {
                name: format!("{} Game", self.name),
                base_price_gbp_pence: Some(1000),
                final_price_gbp_pence: Some(800),
            }])
        }

        async fn search_listing(&self, _query: &str) -> CoreResult<RawListing> {
            Err(PipelineError::Api {
                message: "not used".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn full_run_loads_every_source() {
        let storage = InMemoryStorage::new();
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Arc<dyn Storefront>> = vec![
            Arc::new(ScriptedStore {
                name: "gog",
                fail: false,
            }),
            Arc::new(ScriptedStore {
                name: "steam",
                fail: false,
            }),
        ];

        let report =
            run_daily_pipeline(&storage, &stores, dir.path(), DiscountPolicy::Signed).await;
        assert!(report.is_success(), "unexpected report: {report:?}");

        assert_eq!(storage.get_all_listings().await.unwrap().len(), 2);
        assert_eq!(storage.get_all_platforms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_extract_names_its_stage_and_short_circuits() {
        let storage = InMemoryStorage::new();
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Arc<dyn Storefront>> = vec![
            Arc::new(ScriptedStore {
                name: "gog",
                fail: true,
            }),
            Arc::new(ScriptedStore {
                name: "steam",
                fail: false,
            }),
        ];

        let report =
            run_daily_pipeline(&storage, &stores, dir.path(), DiscountPolicy::Signed).await;
        assert_eq!(report.status, "error");
        assert!(report.msg.contains("extract_gog"), "msg: {}", report.msg);

        // nothing reached the store
        assert!(storage.get_all_listings().await.unwrap().is_empty());
    }

    #[test]
    fn stage_errors_name_the_failing_stage() {
        let report = PipelineReport::stage_error("transform", "boom");
        assert_eq!(report.status, "error");
        assert_eq!(report.msg, "boom occurred in transform");
        assert!(!report.is_success());
    }
}
