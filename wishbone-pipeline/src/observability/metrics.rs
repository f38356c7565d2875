//! Metrics for the Wishbone pipeline, exported in Prometheus format.

use metrics_exporter_prometheus::PrometheusHandle;
use once_cell::sync::OnceCell;
use tracing::info;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Extraction
    ExtractRequestsSuccess,
    ExtractRequestsError,
    ExtractListingsScraped,

    // Transform
    TransformRecordsProcessed,
    TransformRecordsDropped,

    // Load
    LoadRecordsLoaded,
    LoadErrors,

    // Archive
    ArchiveRowsExported,
    ArchiveRowsDeleted,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ExtractRequestsSuccess => "wishbone_extract_requests_success_total",
            MetricName::ExtractRequestsError => "wishbone_extract_requests_error_total",
            MetricName::ExtractListingsScraped => "wishbone_extract_listings_scraped_total",
            MetricName::TransformRecordsProcessed => "wishbone_transform_records_processed_total",
            MetricName::TransformRecordsDropped => "wishbone_transform_records_dropped_total",
            MetricName::LoadRecordsLoaded => "wishbone_load_records_loaded_total",
            MetricName::LoadErrors => "wishbone_load_errors_total",
            MetricName::ArchiveRowsExported => "wishbone_archive_rows_exported_total",
            MetricName::ArchiveRowsDeleted => "wishbone_archive_rows_deleted_total",
        }
    }
}

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call once per process; batch
/// subcommands call this from main.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;

    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current metrics in Prometheus exposition format.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|h| h.render())
}

pub fn increment(name: MetricName) {
    ::metrics::counter!(name.as_str()).increment(1);
}

pub fn increment_by(name: MetricName, count: u64) {
    ::metrics::counter!(name.as_str()).increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        let names = [
            MetricName::ExtractRequestsSuccess,
            MetricName::TransformRecordsDropped,
            MetricName::LoadRecordsLoaded,
            MetricName::ArchiveRowsDeleted,
        ];
        for name in names {
            assert!(name.as_str().starts_with("wishbone_"));
            assert!(name.as_str().ends_with("_total"));
        }
    }
}
