use crate::common::error::Result;
use crate::domain::*;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Storage trait for the relational store (dimension tables, the listing
/// fact table, tracking subscriptions, and user rows).
///
/// Name lookups are case-sensitive exact match. Implementations must enforce
/// name uniqueness at the store so that concurrent get-or-create callers
/// cannot insert duplicates; a losing insert surfaces as
/// `PipelineError::UniqueViolation`.
#[async_trait]
pub trait Storage: Send + Sync {
    // Game dimension
    async fn create_game(&self, game: &mut Game) -> Result<()>;
    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>>;
    async fn get_all_games(&self) -> Result<Vec<Game>>;

    // Platform dimension
    async fn create_platform(&self, platform: &mut Platform) -> Result<()>;
    async fn get_platform_by_name(&self, name: &str) -> Result<Option<Platform>>;
    async fn get_all_platforms(&self) -> Result<Vec<Platform>>;

    // Listing facts
    async fn create_listing(&self, listing: &mut Listing) -> Result<()>;
    async fn get_all_listings(&self) -> Result<Vec<Listing>>;
    async fn get_listings_for_game(&self, game_id: i64) -> Result<Vec<Listing>>;

    /// Most recently listed distinct game names, newest first.
    async fn get_recent_game_names(&self, limit: usize) -> Result<Vec<String>>;

    /// Delete every listing whose recording date is not `day`. Returns the
    /// number of rows removed.
    async fn delete_listings_not_on(&self, day: NaiveDate) -> Result<u64>;

    // Tracking subscriptions
    async fn create_tracking(&self, entry: &TrackingEntry) -> Result<()>;
    async fn delete_tracking(&self, email: &str, game_id: i64) -> Result<()>;
    async fn delete_tracking_for_email(&self, email: &str) -> Result<u64>;
    async fn get_tracked_emails_for_game(&self, game_id: i64) -> Result<Vec<String>>;

    // Users
    async fn create_user(&self, user: &mut User) -> Result<()>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Removes the user and, via cascade, their tracking subscriptions.
    async fn delete_user(&self, user_id: i64) -> Result<()>;
}
