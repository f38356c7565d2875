//! Loads canonical listing records into the relational store.

use crate::observability::metrics::{self, MetricName};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, error, info};
use wishbone_core::common::error::{PipelineError, Result};
use wishbone_core::domain::{CanonicalListing, Game, Listing, Platform};
use wishbone_core::storage::Storage;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub records_loaded: usize,
}

/// Record-by-record loader.
///
/// Owns the get-or-create path for the game and platform dimensions;
/// callers never construct surrogate keys themselves. Each record commits
/// on its own: a failure on record N keeps records 1..N-1, aborts the rest,
/// and surfaces the error unretried.
pub struct Loader<'a> {
    storage: &'a dyn Storage,
}

impl<'a> Loader<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    pub async fn load(&self, records: &[CanonicalListing]) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        for record in records {
            if let Err(e) = self.load_record(record).await {
                error!("Error loading '{}': {e}", record.game_name);
                metrics::increment(MetricName::LoadErrors);
                return Err(e);
            }
            summary.records_loaded += 1;
            metrics::increment(MetricName::LoadRecordsLoaded);
        }

        info!("Load completed successfully: {} records", summary.records_loaded);
        Ok(summary)
    }

    async fn load_record(&self, record: &CanonicalListing) -> Result<()> {
        let game_id = self
            .resolve_game(&record.game_name, record.retail_price)
            .await?;
        let platform_id = self.resolve_platform(&record.platform_name).await?;

        let mut listing = Listing {
            listing_id: None,
            game_id,
            platform_id,
            price: record.final_price,
            discount_percent: Some(record.discount_percent),
            recording_date: record.listing_date,
        };
        self.storage.create_listing(&mut listing).await?;

        debug!(
            "Loaded listing {:?} for '{}' on '{}'",
            listing.listing_id, record.game_name, record.platform_name
        );
        Ok(())
    }

    /// Return the game id, inserting the game on first sighting. A losing
    /// insert under a concurrent creator re-fetches the winner's row.
    async fn resolve_game(&self, game_name: &str, retail_price: i64) -> Result<i64> {
        if let Some(game) = self.storage.get_game_by_name(game_name).await? {
            return require_id(game.game_id, "game.game_id");
        }

        let mut game = Game {
            game_id: None,
            game_name: game_name.to_string(),
            retail_price,
        };
        match self.storage.create_game(&mut game).await {
            Ok(()) => require_id(game.game_id, "game.game_id"),
            Err(e) if e.is_unique_violation() => {
                let winner = self
                    .storage
                    .get_game_by_name(game_name)
                    .await?
                    .ok_or_else(|| PipelineError::Api {
                        message: format!("game '{game_name}' vanished after unique violation"),
                    })?;
                require_id(winner.game_id, "game.game_id")
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_platform(&self, platform_name: &str) -> Result<i64> {
        if let Some(platform) = self.storage.get_platform_by_name(platform_name).await? {
            return require_id(platform.platform_id, "platform.platform_id");
        }

        let mut platform = Platform {
            platform_id: None,
            platform_name: platform_name.to_string(),
        };
        match self.storage.create_platform(&mut platform).await {
            Ok(()) => require_id(platform.platform_id, "platform.platform_id"),
            Err(e) if e.is_unique_violation() => {
                let winner = self
                    .storage
                    .get_platform_by_name(platform_name)
                    .await?
                    .ok_or_else(|| PipelineError::Api {
                        message: format!(
                            "platform '{platform_name}' vanished after unique violation"
                        ),
                    })?;
                require_id(winner.platform_id, "platform.platform_id")
            }
            Err(e) => Err(e),
        }
    }
}

fn require_id(id: Option<i64>, field: &str) -> Result<i64> {
    id.ok_or_else(|| PipelineError::MissingField(field.to_string()))
}

/// Read the merged canonical records written by the transform stage.
pub fn read_clean_data(path: &Path) -> Result<Vec<CanonicalListing>> {
    let file = File::open(path)?;
    let records = serde_json::from_reader(BufReader::new(file))?;
    Ok(records)
}
