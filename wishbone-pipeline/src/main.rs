use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use wishbone_core::domain::discount::DiscountPolicy;
use wishbone_core::storage::DatabaseStorage;

use wishbone_pipeline::apis::factory::create_storefronts;
use wishbone_pipeline::apis::Storefront;
use wishbone_pipeline::observability::{logging, metrics};
use wishbone_pipeline::pipeline::archive::Archiver;
use wishbone_pipeline::pipeline::daily::run_daily_pipeline;
use wishbone_pipeline::pipeline::extract;
use wishbone_pipeline::pipeline::load::{read_clean_data, Loader};
use wishbone_pipeline::pipeline::orchestrator::run_tracked_extract;
use wishbone_pipeline::pipeline::transform::{transform_all, CLEAN_DATA_FILE};
use wishbone_pipeline::registry::SourceRegistry;

#[derive(Parser)]
#[command(name = "wishbone-pipeline")]
#[command(about = "Wishbone price pipeline: storefront extraction, transform, load, and archival")]
#[command(version = "0.1.0")]
struct Cli {
    /// Staging directory for raw and clean JSON files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Source registry TOML (defaults to config/sources.toml when present)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full extract -> transform -> load pipeline
    Daily {
        /// Clamp price increases to a 0% discount instead of storing them negative
        #[arg(long)]
        clamp_discounts: bool,
    },
    /// Run one source's bulk catalog extract
    Extract {
        /// Source id to extract (steam, gog, epic)
        #[arg(long)]
        source: String,
    },
    /// Transform staged raw files into clean_data.json
    Transform {
        #[arg(long)]
        clamp_discounts: bool,
    },
    /// Load clean_data.json into the relational store
    Load,
    /// Search every storefront for a single title
    Search {
        #[arg(short, long, default_value = "stardew valley")]
        search_input: String,
    },
    /// Fan extraction out across the tracked game names
    TrackedExtract,
    /// Export relational tables to parquet and prune stale listings
    Archive {
        /// Archive root directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn resolve_dir(flag: Option<PathBuf>, env_key: &str, default: &str) -> PathBuf {
    flag.or_else(|| std::env::var(env_key).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

fn load_registry(flag: Option<PathBuf>) -> anyhow::Result<SourceRegistry> {
    if let Some(path) = flag {
        return Ok(SourceRegistry::load_from_file(path)?);
    }
    if let Ok(path) = std::env::var("WISHBONE_SOURCE_REGISTRY") {
        return Ok(SourceRegistry::load_from_file(path)?);
    }
    let default_path = Path::new("config/sources.toml");
    if default_path.exists() {
        return Ok(SourceRegistry::load_from_file(default_path)?);
    }
    Ok(SourceRegistry::all_enabled())
}

fn discount_policy(clamp: bool) -> DiscountPolicy {
    if clamp {
        DiscountPolicy::ClampNonNegative
    } else {
        DiscountPolicy::Signed
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging and metrics
    logging::init_logging();
    if let Err(e) = metrics::init() {
        warn!("Metrics disabled: {e}");
    }

    let cli = Cli::parse();
    let data_dir = resolve_dir(cli.data_dir.clone(), "WISHBONE_DATA_DIR", "data");
    let registry = load_registry(cli.registry.clone())?;
    let stores: Vec<Arc<dyn Storefront>> = create_storefronts(&registry.enabled_source_ids());

    match cli.command {
        Commands::Daily { clamp_discounts } => {
            let storage = DatabaseStorage::new().await?;
            let report = run_daily_pipeline(
                &storage,
                &stores,
                &data_dir,
                discount_policy(clamp_discounts),
            )
            .await;
            println!("{}", serde_json::to_string(&report)?);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Extract { source } => {
            let Some(store) = stores.iter().find(|s| s.platform_name() == source) else {
                anyhow::bail!("unknown or disabled source: {source}");
            };
            let count = extract::export_catalog(store.as_ref(), &data_dir).await?;
            info!("Extracted {count} {source} listings");
        }
        Commands::Transform { clamp_discounts } => {
            let source_ids = registry.enabled_source_ids();
            let records = transform_all(
                &data_dir,
                &source_ids,
                discount_policy(clamp_discounts),
            )?;
            info!("Transformed {} records", records.len());
        }
        Commands::Load => {
            let storage = DatabaseStorage::new().await?;
            let records = read_clean_data(&data_dir.join(CLEAN_DATA_FILE))?;
            let summary = Loader::new(&storage).load(&records).await?;
            info!("Loaded {} records", summary.records_loaded);
        }
        Commands::Search { search_input } => {
            let found = extract::search_stores(&stores, &search_input).await;
            let listings: Vec<_> = found
                .iter()
                .map(|(platform, listing)| {
                    serde_json::json!({ "platform": platform, "listing": listing })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listings)?);
        }
        Commands::TrackedExtract => {
            let storage = DatabaseStorage::new().await?;
            let report = run_tracked_extract(&storage, stores, &data_dir).await?;
            info!(
                "Tracked extract: {} games searched, {} listings staged",
                report.games_searched, report.listings_found
            );
        }
        Commands::Archive { out_dir } => {
            let storage = DatabaseStorage::new().await?;
            let out_root = resolve_dir(out_dir, "WISHBONE_ARCHIVE_DIR", "archive");
            let report = Archiver::new(&storage, out_root).archive().await?;
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}
