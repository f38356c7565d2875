//! Historical archiver: exports the relational tables to partitioned
//! parquet and prunes the listing table down to today's rows.

use crate::observability::metrics::{self, MetricName};
use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::{Type, TypePtr};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use wishbone_core::domain::{Game, Listing, Platform};
use wishbone_core::storage::Storage;

#[derive(Debug, Serialize)]
pub struct ArchiveReport {
    pub status: String,
    pub games_exported: usize,
    pub platforms_exported: usize,
    pub listings_exported: usize,
    pub listings_deleted: u64,
}

pub struct Archiver<'a> {
    storage: &'a dyn Storage,
    out_root: PathBuf,
}

impl<'a> Archiver<'a> {
    pub fn new(storage: &'a dyn Storage, out_root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            out_root: out_root.into(),
        }
    }

    /// Export everything, then enforce the rolling one-day window on the
    /// listing table. Deletion runs unconditionally after export, even when
    /// the export produced zero rows.
    pub async fn archive(&self) -> Result<ArchiveReport> {
        info!("Starting historical pipeline");

        let games = self.storage.get_all_games().await?;
        info!("Extracted data from game: {} rows", games.len());
        let platforms = self.storage.get_all_platforms().await?;
        info!("Extracted data from platform: {} rows", platforms.len());
        let listings = self.storage.get_all_listings().await?;
        info!("Extracted data from listing: {} rows", listings.len());

        self.write_dimension_part(&games, "game", write_game_part)?;
        self.write_dimension_part(&platforms, "platform", write_platform_part)?;

        let partitions = write_listing_partitions(&listings, &self.out_root.join("listing"))?;
        info!(
            "Partitioned {} listing rows into {} day partitions",
            listings.len(),
            partitions.len()
        );

        let exported = games.len() + platforms.len() + listings.len();
        metrics::increment_by(MetricName::ArchiveRowsExported, exported as u64);

        let today = Utc::now().date_naive();
        let deleted = self.storage.delete_listings_not_on(today).await?;
        info!("Cleanup, deleted {deleted} outdated listing rows");
        metrics::increment_by(MetricName::ArchiveRowsDeleted, deleted);

        Ok(ArchiveReport {
            status: "Historical pipeline completed".to_string(),
            games_exported: games.len(),
            platforms_exported: platforms.len(),
            listings_exported: listings.len(),
            listings_deleted: deleted,
        })
    }

    fn write_dimension_part<T>(
        &self,
        rows: &[T],
        table: &str,
        write: impl Fn(&[T], &Path) -> Result<PathBuf>,
    ) -> Result<()> {
        let dir = self.out_root.join(table);
        let action = if dir.exists() { "appended to" } else { "created" };
        write(rows, &dir)?;
        info!("Dimension {action}: {}", dir.display());
        Ok(())
    }
}

fn int64_field(name: &str, repetition: Repetition) -> TypePtr {
    Arc::new(
        Type::primitive_type_builder(name, PhysicalType::INT64)
            .with_repetition(repetition)
            .build()
            .unwrap(),
    )
}

fn utf8_field(name: &str) -> TypePtr {
    Arc::new(
        Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_logical_type(Some(LogicalType::String))
            .with_repetition(Repetition::REQUIRED)
            .build()
            .unwrap(),
    )
}

fn file_schema(fields: Vec<TypePtr>) -> TypePtr {
    Arc::new(
        Type::group_type_builder("schema")
            .with_fields(fields)
            .build()
            .unwrap(),
    )
}

fn writer_props() -> Arc<WriterProperties> {
    Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build(),
    )
}

fn part_path(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let ts = Utc::now().format("%Y%m%d_%H%M%S%.9f");
    Ok(dir.join(format!("part-{ts}.parquet")))
}

/// Split an optional column into the (values, definition levels) pair the
/// column writer expects.
fn optional_i64_column(values: impl Iterator<Item = Option<i64>>) -> (Vec<i64>, Vec<i16>) {
    let mut present = Vec::new();
    let mut def_levels = Vec::new();
    for value in values {
        match value {
            Some(v) => {
                present.push(v);
                def_levels.push(1);
            }
            None => def_levels.push(0),
        }
    }
    (present, def_levels)
}

fn write_game_part(games: &[Game], dir: &Path) -> Result<PathBuf> {
    let schema = file_schema(vec![
        int64_field("game_id", Repetition::REQUIRED),
        utf8_field("game_name"),
        int64_field("retail_price", Repetition::REQUIRED),
    ]);

    let ids: Vec<i64> = games.iter().map(|g| g.game_id.unwrap_or_default()).collect();
    let names: Vec<ByteArray> = games
        .iter()
        .map(|g| ByteArray::from(g.game_name.as_str()))
        .collect();
    let prices: Vec<i64> = games.iter().map(|g| g.retail_price).collect();

    let path = part_path(dir)?;
    let file = File::create(&path)?;
    let mut writer = SerializedFileWriter::new(file, schema, writer_props())?;
    let mut row_group = writer.next_row_group()?;

    let mut col_index = 0;
    while let Some(mut column) = row_group.next_column()? {
        match col_index {
            0 => column.typed::<Int64Type>().write_batch(&ids, None, None)?,
            1 => column
                .typed::<ByteArrayType>()
                .write_batch(&names, None, None)?,
            2 => column
                .typed::<Int64Type>()
                .write_batch(&prices, None, None)?,
            _ => unreachable!("schema mismatch"),
        };
        column.close()?;
        col_index += 1;
    }
    row_group.close()?;
    writer.close()?;

    Ok(path)
}

fn write_platform_part(platforms: &[Platform], dir: &Path) -> Result<PathBuf> {
    let schema = file_schema(vec![
        int64_field("platform_id", Repetition::REQUIRED),
        utf8_field("platform_name"),
    ]);

    let ids: Vec<i64> = platforms
        .iter()
        .map(|p| p.platform_id.unwrap_or_default())
        .collect();
    let names: Vec<ByteArray> = platforms
        .iter()
        .map(|p| ByteArray::from(p.platform_name.as_str()))
        .collect();

    let path = part_path(dir)?;
    let file = File::create(&path)?;
    let mut writer = SerializedFileWriter::new(file, schema, writer_props())?;
    let mut row_group = writer.next_row_group()?;

    let mut col_index = 0;
    while let Some(mut column) = row_group.next_column()? {
        match col_index {
            0 => column.typed::<Int64Type>().write_batch(&ids, None, None)?,
            1 => column
                .typed::<ByteArrayType>()
                .write_batch(&names, None, None)?,
            _ => unreachable!("schema mismatch"),
        };
        column.close()?;
        col_index += 1;
    }
    row_group.close()?;
    writer.close()?;

    Ok(path)
}

/// Write listing rows under `year=Y/month=M/day=D/` partitions derived from
/// the recording date.
fn write_listing_partitions(listings: &[Listing], root: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if listings.is_empty() {
        return Ok(written);
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&Listing>> = BTreeMap::new();
    for listing in listings {
        by_day.entry(listing.recording_date).or_default().push(listing);
    }

    let schema = file_schema(vec![
        int64_field("listing_id", Repetition::REQUIRED),
        int64_field("game_id", Repetition::REQUIRED),
        int64_field("platform_id", Repetition::REQUIRED),
        int64_field("price", Repetition::OPTIONAL),
        int64_field("discount_percent", Repetition::OPTIONAL),
        utf8_field("recording_date"),
    ]);

    for (day, rows) in by_day {
        let dir = root
            .join(format!("year={}", day.year()))
            .join(format!("month={}", day.month()))
            .join(format!("day={}", day.day()));

        let listing_ids: Vec<i64> = rows
            .iter()
            .map(|l| l.listing_id.unwrap_or_default())
            .collect();
        let game_ids: Vec<i64> = rows.iter().map(|l| l.game_id).collect();
        let platform_ids: Vec<i64> = rows.iter().map(|l| l.platform_id).collect();
        let (prices, price_defs) = optional_i64_column(rows.iter().map(|l| l.price));
        let (discounts, discount_defs) =
            optional_i64_column(rows.iter().map(|l| l.discount_percent));
        let dates: Vec<ByteArray> = rows
            .iter()
            .map(|l| ByteArray::from(l.recording_date.format("%Y-%m-%d").to_string().as_str()))
            .collect();

        let path = part_path(&dir)?;
        let file = File::create(&path)?;
        let mut writer = SerializedFileWriter::new(file, schema.clone(), writer_props())?;
        let mut row_group = writer.next_row_group()?;

        let mut col_index = 0;
        while let Some(mut column) = row_group.next_column()? {
            match col_index {
                0 => column
                    .typed::<Int64Type>()
                    .write_batch(&listing_ids, None, None)?,
                1 => column
                    .typed::<Int64Type>()
                    .write_batch(&game_ids, None, None)?,
                2 => column
                    .typed::<Int64Type>()
                    .write_batch(&platform_ids, None, None)?,
                3 => column
                    .typed::<Int64Type>()
                    .write_batch(&prices, Some(&price_defs), None)?,
                4 => column
                    .typed::<Int64Type>()
                    .write_batch(&discounts, Some(&discount_defs), None)?,
                5 => column
                    .typed::<ByteArrayType>()
                    .write_batch(&dates, None, None)?,
                _ => unreachable!("schema mismatch"),
            };
            column.close()?;
            col_index += 1;
        }
        row_group.close()?;
        writer.close()?;

        written.push(path);
    }

    Ok(written)
}
