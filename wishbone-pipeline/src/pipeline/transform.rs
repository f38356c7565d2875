//! Normalizes raw storefront listings into the canonical record shape
//! consumed by the loader.

use crate::observability::metrics::{self, MetricName};
use chrono::{NaiveDate, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};
use wishbone_core::common::error::Result;
use wishbone_core::domain::discount::{discount_percent, DiscountPolicy};
use wishbone_core::domain::{CanonicalListing, RawListing};

pub const CLEAN_DATA_FILE: &str = "clean_data.json";

/// Per-source raw extract file, e.g. `gog_products.json`.
pub fn source_file_name(source_id: &str) -> String {
    format!("{source_id}_products.json")
}

/// Read one source's raw extract. A non-numeric price in the file is a
/// deserialization error that fails the whole batch.
pub fn read_raw_listings(path: &Path) -> Result<Vec<RawListing>> {
    let file = File::open(path)?;
    let listings = serde_json::from_reader(BufReader::new(file))?;
    Ok(listings)
}

/// Normalize one source's raw listings.
///
/// Rows without a base price are dropped (they cannot be priced). An unknown
/// discount is stored as zero. The platform tag and listing date come from
/// the caller, never from row data.
pub fn normalize_source(
    raw: Vec<RawListing>,
    platform_name: &str,
    listing_date: NaiveDate,
    policy: DiscountPolicy,
) -> Vec<CanonicalListing> {
    let input_len = raw.len();

    let records: Vec<CanonicalListing> = raw
        .into_iter()
        .filter_map(|listing| {
            // Drop rows that cannot be priced
            let retail_price = listing.base_price_gbp_pence?;

            let discount = discount_percent(Some(retail_price), listing.final_price_gbp_pence)
                .map(|pct| policy.apply(pct))
                // unknown discount is stored as "no discount"
                .unwrap_or(0);

            Some(CanonicalListing {
                game_name: listing.name,
                retail_price,
                platform_name: platform_name.to_string(),
                listing_date,
                discount_percent: discount,
                final_price: listing.final_price_gbp_pence,
            })
        })
        .collect();

    let dropped = input_len - records.len();
    if dropped > 0 {
        debug!("Dropped {dropped} unpriced {platform_name} rows");
    }
    metrics::increment_by(MetricName::TransformRecordsProcessed, records.len() as u64);
    metrics::increment_by(MetricName::TransformRecordsDropped, dropped as u64);

    records
}

/// Transform every source's raw extract file, stamp records with today's
/// date (UTC), and write the merged `clean_data.json`.
pub fn transform_all(
    data_dir: &Path,
    source_ids: &[String],
    policy: DiscountPolicy,
) -> Result<Vec<CanonicalListing>> {
    let today = Utc::now().date_naive();

    let mut all_records = Vec::new();
    for source_id in source_ids {
        let path = data_dir.join(source_file_name(source_id));
        let raw = read_raw_listings(&path)?;
        let records = normalize_source(raw, source_id, today, policy);
        info!("Transformed {} {} records", records.len(), source_id);
        all_records.extend(records);
    }

    let output = File::create(data_dir.join(CLEAN_DATA_FILE))?;
    serde_json::to_writer_pretty(output, &all_records)?;

    Ok(all_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    #[test]
    fn normalizes_a_discounted_listing() {
        let raw = vec![RawListing {
            name: "Game A".to_string(),
            base_price_gbp_pence: Some(1000),
            final_price_gbp_pence: Some(500),
        }];

        let records = normalize_source(raw, "steam", day(), DiscountPolicy::Signed);

        assert_eq!(
            records,
            vec![CanonicalListing {
                game_name: "Game A".to_string(),
                retail_price: 1000,
                platform_name: "steam".to_string(),
                listing_date: day(),
                discount_percent: 50,
                final_price: Some(500),
            }]
        );
    }

    #[test]
    fn drops_rows_without_a_base_price_and_keeps_the_rest() {
        let raw = vec![
            RawListing {
                name: "Unpriced".to_string(),
                base_price_gbp_pence: None,
                final_price_gbp_pence: Some(100),
            },
            RawListing {
                name: "Priced".to_string(),
                base_price_gbp_pence: Some(2000),
                final_price_gbp_pence: Some(2000),
            },
        ];

        let records = normalize_source(raw, "gog", day(), DiscountPolicy::Signed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].game_name, "Priced");
    }

    #[test]
    fn unknown_discount_is_stored_as_zero() {
        // Free game: base price zero makes the discount unknowable
        let raw = vec![
            RawListing {
                name: "Free Game".to_string(),
                base_price_gbp_pence: Some(0),
                final_price_gbp_pence: Some(0),
            },
            RawListing {
                name: "No Final".to_string(),
                base_price_gbp_pence: Some(1500),
                final_price_gbp_pence: None,
            },
        ];

        let records = normalize_source(raw, "steam", day(), DiscountPolicy::Signed);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.discount_percent == 0));
    }

    #[test]
    fn clamp_policy_zeroes_price_increases() {
        let raw = vec![RawListing {
            name: "Went Up".to_string(),
            base_price_gbp_pence: Some(1000),
            final_price_gbp_pence: Some(1500),
        }];

        let signed = normalize_source(raw.clone(), "gog", day(), DiscountPolicy::Signed);
        assert_eq!(signed[0].discount_percent, -50);

        let clamped = normalize_source(raw, "gog", day(), DiscountPolicy::ClampNonNegative);
        assert_eq!(clamped[0].discount_percent, 0);
    }

    #[test]
    fn non_numeric_price_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steam_products.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"name": "Bad", "base_price_gbp_pence": "ten pounds", "final_price_gbp_pence": 100}}]"#
        )
        .unwrap();

        assert!(read_raw_listings(&path).is_err());
    }

    #[test]
    fn transform_all_merges_sources_into_clean_data() {
        let dir = tempfile::tempdir().unwrap();

        for (source, body) in [
            (
                "gog",
                r#"[{"name": "A", "base_price_gbp_pence": 1000, "final_price_gbp_pence": 750}]"#,
            ),
            (
                "steam",
                r#"[{"name": "B", "base_price_gbp_pence": 2000, "final_price_gbp_pence": 2000},
                    {"name": "C", "base_price_gbp_pence": null, "final_price_gbp_pence": 5}]"#,
            ),
        ] {
            std::fs::write(dir.path().join(source_file_name(source)), body).unwrap();
        }

        let sources = vec!["gog".to_string(), "steam".to_string()];
        let records =
            transform_all(dir.path(), &sources, DiscountPolicy::Signed).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].platform_name, "gog");
        assert_eq!(records[0].discount_percent, 25);
        assert_eq!(records[1].platform_name, "steam");

        let written = std::fs::read_to_string(dir.path().join(CLEAN_DATA_FILE)).unwrap();
        let reparsed: Vec<CanonicalListing> = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed, records);
    }

    #[test]
    fn missing_source_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec!["gog".to_string()];
        assert!(transform_all(dir.path(), &sources, DiscountPolicy::Signed).is_err());
    }
}
