use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod discount;

/// One raw price observation as emitted by a storefront adapter.
///
/// Prices are GBP pence; either may be absent when the storefront did not
/// report one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub name: String,
    pub base_price_gbp_pence: Option<i64>,
    pub final_price_gbp_pence: Option<i64>,
}

/// The normalized record consumed by the loader (the `clean_data.json` shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalListing {
    pub game_name: String,
    pub retail_price: i64,
    pub platform_name: String,
    pub listing_date: NaiveDate,
    pub discount_percent: i64,
    pub final_price: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: Option<i64>,
    pub game_name: String,
    pub retail_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub platform_id: Option<i64>,
    pub platform_name: String,
}

/// Append-only fact row. Never updated once written; a new recording date
/// produces a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: Option<i64>,
    pub game_id: i64,
    pub platform_id: i64,
    pub price: Option<i64>,
    pub discount_percent: Option<i64>,
    pub recording_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub email: String,
    pub game_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Option<i64>,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
