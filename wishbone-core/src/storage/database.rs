use crate::common::error::{PipelineError, Result};
use crate::database::DatabaseManager;
use crate::domain::*;
use crate::storage::traits::Storage;
use async_trait::async_trait;
use chrono::NaiveDate;
use libsql::Row;
use std::sync::Arc;
use tracing::debug;

/// Database storage implementation over libSQL.
pub struct DatabaseStorage {
    db: Arc<DatabaseManager>,
}

impl DatabaseStorage {
    pub async fn new() -> Result<Self> {
        let db_manager = DatabaseManager::new().await?;
        db_manager.run_migrations().await?;

        Ok(Self {
            db: Arc::new(db_manager),
        })
    }

    pub fn with_manager(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Map a driver error, surfacing uniqueness violations as their own
    /// variant so get-or-create callers can re-fetch.
    fn db_error(context: &str, e: libsql::Error) -> PipelineError {
        let message = e.to_string();
        if let Some(idx) = message.find("UNIQUE constraint failed: ") {
            let constraint = message[idx + "UNIQUE constraint failed: ".len()..]
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .trim_end_matches(',')
                .to_string();
            return PipelineError::UniqueViolation { constraint };
        }
        PipelineError::Database {
            message: format!("{context}: {message}"),
        }
    }

    /// Lenient date decode: accepts a plain date or a timestamp-ish string
    /// whose first ten characters are the date.
    fn decode_date(raw: &str) -> Result<NaiveDate> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }
        if raw.len() >= 10 {
            if let Ok(date) = NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d") {
                return Ok(date);
            }
        }
        Err(PipelineError::Database {
            message: format!("Unparseable recording_date: {raw}"),
        })
    }

    fn nullable_i64(row: &Row, idx: i32) -> Result<Option<i64>> {
        let value = row.get_value(idx).map_err(|e| PipelineError::Database {
            message: format!("Failed to read column {idx}: {e}"),
        })?;
        match value {
            libsql::Value::Integer(v) => Ok(Some(v)),
            libsql::Value::Null => Ok(None),
            other => Err(PipelineError::Database {
                message: format!("Unexpected value in integer column {idx}: {other:?}"),
            }),
        }
    }

    fn row_to_game(row: &Row) -> Result<Game> {
        Ok(Game {
            game_id: Some(row.get(0).map_err(|e| PipelineError::Database {
                message: format!("Failed to read game_id: {e}"),
            })?),
            game_name: row.get(1).map_err(|e| PipelineError::Database {
                message: format!("Failed to read game_name: {e}"),
            })?,
            retail_price: row.get(2).map_err(|e| PipelineError::Database {
                message: format!("Failed to read retail_price: {e}"),
            })?,
        })
    }

    fn row_to_platform(row: &Row) -> Result<Platform> {
        Ok(Platform {
            platform_id: Some(row.get(0).map_err(|e| PipelineError::Database {
                message: format!("Failed to read platform_id: {e}"),
            })?),
            platform_name: row.get(1).map_err(|e| PipelineError::Database {
                message: format!("Failed to read platform_name: {e}"),
            })?,
        })
    }

    fn row_to_listing(row: &Row) -> Result<Listing> {
        let raw_date: String = row.get(5).map_err(|e| PipelineError::Database {
            message: format!("Failed to read recording_date: {e}"),
        })?;
        Ok(Listing {
            listing_id: Some(row.get(0).map_err(|e| PipelineError::Database {
                message: format!("Failed to read listing_id: {e}"),
            })?),
            game_id: row.get(1).map_err(|e| PipelineError::Database {
                message: format!("Failed to read game_id: {e}"),
            })?,
            platform_id: row.get(2).map_err(|e| PipelineError::Database {
                message: format!("Failed to read platform_id: {e}"),
            })?,
            price: Self::nullable_i64(row, 3)?,
            discount_percent: Self::nullable_i64(row, 4)?,
            recording_date: Self::decode_date(&raw_date)?,
        })
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn create_game(&self, game: &mut Game) -> Result<()> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "INSERT INTO game (game_name, retail_price)
                 VALUES (?1, ?2)
                 RETURNING game_id",
                libsql::params![game.game_name.clone(), game.retail_price],
            )
            .await
            .map_err(|e| Self::db_error("Failed to insert game", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read inserted game_id", e))?
            .ok_or_else(|| PipelineError::Database {
                message: "INSERT INTO game returned no row".to_string(),
            })?;
        game.game_id = Some(row.get(0).map_err(|e| PipelineError::Database {
            message: format!("Failed to read game_id: {e}"),
        })?);

        debug!("Created game: {} with id {:?}", game.game_name, game.game_id);
        Ok(())
    }

    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT game_id, game_name, retail_price FROM game WHERE game_name = ?1",
                libsql::params![name],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query game", e))?;

        match rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read game row", e))?
        {
            Some(row) => Ok(Some(Self::row_to_game(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_all_games(&self) -> Result<Vec<Game>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT game_id, game_name, retail_price FROM game ORDER BY game_id",
                (),
            )
            .await
            .map_err(|e| Self::db_error("Failed to query games", e))?;

        let mut games = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read game row", e))?
        {
            games.push(Self::row_to_game(&row)?);
        }
        Ok(games)
    }

    async fn create_platform(&self, platform: &mut Platform) -> Result<()> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "INSERT INTO platform (platform_name)
                 VALUES (?1)
                 RETURNING platform_id",
                libsql::params![platform.platform_name.clone()],
            )
            .await
            .map_err(|e| Self::db_error("Failed to insert platform", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read inserted platform_id", e))?
            .ok_or_else(|| PipelineError::Database {
                message: "INSERT INTO platform returned no row".to_string(),
            })?;
        platform.platform_id = Some(row.get(0).map_err(|e| PipelineError::Database {
            message: format!("Failed to read platform_id: {e}"),
        })?);

        debug!(
            "Created platform: {} with id {:?}",
            platform.platform_name, platform.platform_id
        );
        Ok(())
    }

    async fn get_platform_by_name(&self, name: &str) -> Result<Option<Platform>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT platform_id, platform_name FROM platform WHERE platform_name = ?1",
                libsql::params![name],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query platform", e))?;

        match rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read platform row", e))?
        {
            Some(row) => Ok(Some(Self::row_to_platform(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_all_platforms(&self) -> Result<Vec<Platform>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT platform_id, platform_name FROM platform ORDER BY platform_id",
                (),
            )
            .await
            .map_err(|e| Self::db_error("Failed to query platforms", e))?;

        let mut platforms = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read platform row", e))?
        {
            platforms.push(Self::row_to_platform(&row)?);
        }
        Ok(platforms)
    }

    async fn create_listing(&self, listing: &mut Listing) -> Result<()> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "INSERT INTO listing (game_id, platform_id, price, discount_percent, recording_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING listing_id",
                libsql::params![
                    listing.game_id,
                    listing.platform_id,
                    listing.price,
                    listing.discount_percent,
                    listing.recording_date.format("%Y-%m-%d").to_string()
                ],
            )
            .await
            .map_err(|e| Self::db_error("Failed to insert listing", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read inserted listing_id", e))?
            .ok_or_else(|| PipelineError::Database {
                message: "INSERT INTO listing returned no row".to_string(),
            })?;
        listing.listing_id = Some(row.get(0).map_err(|e| PipelineError::Database {
            message: format!("Failed to read listing_id: {e}"),
        })?);

        Ok(())
    }

    async fn get_all_listings(&self) -> Result<Vec<Listing>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT listing_id, game_id, platform_id, price, discount_percent, recording_date
                 FROM listing ORDER BY listing_id",
                (),
            )
            .await
            .map_err(|e| Self::db_error("Failed to query listings", e))?;

        let mut listings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read listing row", e))?
        {
            listings.push(Self::row_to_listing(&row)?);
        }
        Ok(listings)
    }

    async fn get_listings_for_game(&self, game_id: i64) -> Result<Vec<Listing>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT listing_id, game_id, platform_id, price, discount_percent, recording_date
                 FROM listing WHERE game_id = ?1 ORDER BY listing_id",
                libsql::params![game_id],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query listings for game", e))?;

        let mut listings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read listing row", e))?
        {
            listings.push(Self::row_to_listing(&row)?);
        }
        Ok(listings)
    }

    async fn get_recent_game_names(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT g.game_name
                 FROM game g
                 JOIN listing l ON g.game_id = l.game_id
                 GROUP BY g.game_name
                 ORDER BY MAX(l.recording_date) DESC
                 LIMIT ?1",
                libsql::params![limit as i64],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query recent game names", e))?;

        let mut names = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read game name row", e))?
        {
            names.push(row.get(0).map_err(|e| PipelineError::Database {
                message: format!("Failed to read game_name: {e}"),
            })?);
        }
        Ok(names)
    }

    async fn delete_listings_not_on(&self, day: NaiveDate) -> Result<u64> {
        let conn = self.db.get_connection().await?;

        let deleted = conn
            .execute(
                "DELETE FROM listing WHERE substr(recording_date, 1, 10) <> ?1",
                libsql::params![day.format("%Y-%m-%d").to_string()],
            )
            .await
            .map_err(|e| Self::db_error("Failed to delete stale listings", e))?;

        Ok(deleted)
    }

    async fn create_tracking(&self, entry: &TrackingEntry) -> Result<()> {
        let conn = self.db.get_connection().await?;

        conn.execute(
            "INSERT INTO tracking (email, game_id) VALUES (?1, ?2)",
            libsql::params![entry.email.clone(), entry.game_id],
        )
        .await
        .map_err(|e| Self::db_error("Failed to insert tracking entry", e))?;

        Ok(())
    }

    async fn delete_tracking(&self, email: &str, game_id: i64) -> Result<()> {
        let conn = self.db.get_connection().await?;

        conn.execute(
            "DELETE FROM tracking WHERE email = ?1 AND game_id = ?2",
            libsql::params![email, game_id],
        )
        .await
        .map_err(|e| Self::db_error("Failed to delete tracking entry", e))?;

        Ok(())
    }

    async fn delete_tracking_for_email(&self, email: &str) -> Result<u64> {
        let conn = self.db.get_connection().await?;

        let deleted = conn
            .execute(
                "DELETE FROM tracking WHERE email = ?1",
                libsql::params![email],
            )
            .await
            .map_err(|e| Self::db_error("Failed to delete tracking entries", e))?;

        Ok(deleted)
    }

    async fn get_tracked_emails_for_game(&self, game_id: i64) -> Result<Vec<String>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT email FROM tracking WHERE game_id = ?1 ORDER BY email",
                libsql::params![game_id],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query tracked emails", e))?;

        let mut emails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read tracking row", e))?
        {
            emails.push(row.get(0).map_err(|e| PipelineError::Database {
                message: format!("Failed to read email: {e}"),
            })?);
        }
        Ok(emails)
    }

    async fn create_user(&self, user: &mut User) -> Result<()> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "INSERT INTO users (username, email, password_hash)
                 VALUES (?1, ?2, ?3)
                 RETURNING user_id",
                libsql::params![
                    user.username.clone(),
                    user.email.clone(),
                    user.password_hash.clone()
                ],
            )
            .await
            .map_err(|e| Self::db_error("Failed to insert user", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read inserted user_id", e))?
            .ok_or_else(|| PipelineError::Database {
                message: "INSERT INTO users returned no row".to_string(),
            })?;
        user.user_id = Some(row.get(0).map_err(|e| PipelineError::Database {
            message: format!("Failed to read user_id: {e}"),
        })?);

        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.db.get_connection().await?;

        let mut rows = conn
            .query(
                "SELECT user_id, username, email, password_hash FROM users WHERE username = ?1",
                libsql::params![username],
            )
            .await
            .map_err(|e| Self::db_error("Failed to query user", e))?;

        match rows
            .next()
            .await
            .map_err(|e| Self::db_error("Failed to read user row", e))?
        {
            Some(row) => Ok(Some(User {
                user_id: Some(row.get(0).map_err(|e| PipelineError::Database {
                    message: format!("Failed to read user_id: {e}"),
                })?),
                username: row.get(1).map_err(|e| PipelineError::Database {
                    message: format!("Failed to read username: {e}"),
                })?,
                email: row.get(2).map_err(|e| PipelineError::Database {
                    message: format!("Failed to read email: {e}"),
                })?,
                password_hash: row.get(3).map_err(|e| PipelineError::Database {
                    message: format!("Failed to read password_hash: {e}"),
                })?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_user(&self, user_id: i64) -> Result<()> {
        let conn = self.db.get_connection().await?;

        conn.execute(
            "DELETE FROM users WHERE user_id = ?1",
            libsql::params![user_id],
        )
        .await
        .map_err(|e| Self::db_error("Failed to delete user", e))?;

        Ok(())
    }
}
