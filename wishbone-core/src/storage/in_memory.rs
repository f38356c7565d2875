use crate::common::error::{PipelineError, Result};
use crate::domain::*;
use crate::storage::traits::Storage;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory storage implementation for development/testing.
///
/// Enforces the same name-uniqueness rules as the database schema so loader
/// behavior can be exercised without a live store.
pub struct InMemoryStorage {
    games: Arc<Mutex<HashMap<i64, Game>>>,
    platforms: Arc<Mutex<HashMap<i64, Platform>>>,
    listings: Arc<Mutex<HashMap<i64, Listing>>>,
    tracking: Arc<Mutex<Vec<TrackingEntry>>>,
    users: Arc<Mutex<HashMap<i64, User>>>,
    next_id: Arc<Mutex<i64>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            games: Arc::new(Mutex::new(HashMap::new())),
            platforms: Arc::new(Mutex::new(HashMap::new())),
            listings: Arc::new(Mutex::new(HashMap::new())),
            tracking: Arc::new(Mutex::new(Vec::new())),
            users: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    fn allocate_id(&self) -> i64 {
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        id
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_game(&self, game: &mut Game) -> Result<()> {
        let mut games = self.games.lock().unwrap();
        if games.values().any(|g| g.game_name == game.game_name) {
            return Err(PipelineError::UniqueViolation {
                constraint: "game.game_name".to_string(),
            });
        }
        let id = self.allocate_id();
        game.game_id = Some(id);
        games.insert(id, game.clone());

        debug!("Created game: {} with id {}", game.game_name, id);
        Ok(())
    }

    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>> {
        let games = self.games.lock().unwrap();
        Ok(games.values().find(|g| g.game_name == name).cloned())
    }

    async fn get_all_games(&self) -> Result<Vec<Game>> {
        let games = self.games.lock().unwrap();
        let mut all: Vec<Game> = games.values().cloned().collect();
        all.sort_by_key(|g| g.game_id);
        Ok(all)
    }

    async fn create_platform(&self, platform: &mut Platform) -> Result<()> {
        let mut platforms = self.platforms.lock().unwrap();
        if platforms
            .values()
            .any(|p| p.platform_name == platform.platform_name)
        {
            return Err(PipelineError::UniqueViolation {
                constraint: "platform.platform_name".to_string(),
            });
        }
        let id = self.allocate_id();
        platform.platform_id = Some(id);
        platforms.insert(id, platform.clone());

        debug!("Created platform: {} with id {}", platform.platform_name, id);
        Ok(())
    }

    async fn get_platform_by_name(&self, name: &str) -> Result<Option<Platform>> {
        let platforms = self.platforms.lock().unwrap();
        Ok(platforms
            .values()
            .find(|p| p.platform_name == name)
            .cloned())
    }

    async fn get_all_platforms(&self) -> Result<Vec<Platform>> {
        let platforms = self.platforms.lock().unwrap();
        let mut all: Vec<Platform> = platforms.values().cloned().collect();
        all.sort_by_key(|p| p.platform_id);
        Ok(all)
    }

    async fn create_listing(&self, listing: &mut Listing) -> Result<()> {
        let id = self.allocate_id();
        listing.listing_id = Some(id);

        let mut listings = self.listings.lock().unwrap();
        listings.insert(id, listing.clone());

        debug!(
            "Created listing {} for game {} on platform {}",
            id, listing.game_id, listing.platform_id
        );
        Ok(())
    }

    async fn get_all_listings(&self) -> Result<Vec<Listing>> {
        let listings = self.listings.lock().unwrap();
        let mut all: Vec<Listing> = listings.values().cloned().collect();
        all.sort_by_key(|l| l.listing_id);
        Ok(all)
    }

    async fn get_listings_for_game(&self, game_id: i64) -> Result<Vec<Listing>> {
        let listings = self.listings.lock().unwrap();
        let mut matching: Vec<Listing> = listings
            .values()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect();
        matching.sort_by_key(|l| l.listing_id);
        Ok(matching)
    }

    async fn get_recent_game_names(&self, limit: usize) -> Result<Vec<String>> {
        let listings = self.listings.lock().unwrap();
        let games = self.games.lock().unwrap();

        let mut latest: HashMap<i64, NaiveDate> = HashMap::new();
        for listing in listings.values() {
            let entry = latest.entry(listing.game_id).or_insert(listing.recording_date);
            if listing.recording_date > *entry {
                *entry = listing.recording_date;
            }
        }

        let mut ranked: Vec<(NaiveDate, String)> = latest
            .iter()
            .filter_map(|(game_id, date)| {
                games.get(game_id).map(|g| (*date, g.game_name.clone()))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        Ok(ranked.into_iter().take(limit).map(|(_, name)| name).collect())
    }

    async fn delete_listings_not_on(&self, day: NaiveDate) -> Result<u64> {
        let mut listings = self.listings.lock().unwrap();
        let before = listings.len();
        listings.retain(|_, l| l.recording_date == day);
        Ok((before - listings.len()) as u64)
    }

    async fn create_tracking(&self, entry: &TrackingEntry) -> Result<()> {
        let mut tracking = self.tracking.lock().unwrap();
        if tracking
            .iter()
            .any(|t| t.email == entry.email && t.game_id == entry.game_id)
        {
            return Err(PipelineError::UniqueViolation {
                constraint: "tracking.email_game_id".to_string(),
            });
        }
        tracking.push(entry.clone());
        Ok(())
    }

    async fn delete_tracking(&self, email: &str, game_id: i64) -> Result<()> {
        let mut tracking = self.tracking.lock().unwrap();
        tracking.retain(|t| !(t.email == email && t.game_id == game_id));
        Ok(())
    }

    async fn delete_tracking_for_email(&self, email: &str) -> Result<u64> {
        let mut tracking = self.tracking.lock().unwrap();
        let before = tracking.len();
        tracking.retain(|t| t.email != email);
        Ok((before - tracking.len()) as u64)
    }

    async fn get_tracked_emails_for_game(&self, game_id: i64) -> Result<Vec<String>> {
        let tracking = self.tracking.lock().unwrap();
        Ok(tracking
            .iter()
            .filter(|t| t.game_id == game_id)
            .map(|t| t.email.clone())
            .collect())
    }

    async fn create_user(&self, user: &mut User) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.username == user.username) {
            return Err(PipelineError::UniqueViolation {
                constraint: "users.username".to_string(),
            });
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(PipelineError::UniqueViolation {
                constraint: "users.email".to_string(),
            });
        }
        let id = self.allocate_id();
        user.user_id = Some(id);
        users.insert(id, user.clone());
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn delete_user(&self, user_id: i64) -> Result<()> {
        let removed = {
            let mut users = self.users.lock().unwrap();
            users.remove(&user_id)
        };
        if let Some(user) = removed {
            // Mirror the ON DELETE CASCADE on tracking rows
            self.delete_tracking_for_email(&user.email).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn game_names_are_unique() {
        let storage = InMemoryStorage::new();
        let mut first = Game {
            game_id: None,
            game_name: "Hades".to_string(),
            retail_price: 1999,
        };
        storage.create_game(&mut first).await.unwrap();

        let mut dup = first.clone();
        dup.game_id = None;
        let err = storage.create_game(&mut dup).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn name_lookup_is_case_sensitive() {
        let storage = InMemoryStorage::new();
        let mut game = Game {
            game_id: None,
            game_name: "Celeste".to_string(),
            retail_price: 1499,
        };
        storage.create_game(&mut game).await.unwrap();

        assert!(storage.get_game_by_name("Celeste").await.unwrap().is_some());
        assert!(storage.get_game_by_name("celeste").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_game_names_ranks_by_latest_listing() {
        let storage = InMemoryStorage::new();
        let mut old_game = Game {
            game_id: None,
            game_name: "Old".to_string(),
            retail_price: 100,
        };
        let mut new_game = Game {
            game_id: None,
            game_name: "New".to_string(),
            retail_price: 100,
        };
        storage.create_game(&mut old_game).await.unwrap();
        storage.create_game(&mut new_game).await.unwrap();

        let mut platform = Platform {
            platform_id: None,
            platform_name: "steam".to_string(),
        };
        storage.create_platform(&mut platform).await.unwrap();
        let platform_id = platform.platform_id.unwrap();

        for (game, day) in [
            (&old_game, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            (&new_game, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()),
        ] {
            let mut listing = Listing {
                listing_id: None,
                game_id: game.game_id.unwrap(),
                platform_id,
                price: Some(100),
                discount_percent: Some(0),
                recording_date: day,
            };
            storage.create_listing(&mut listing).await.unwrap();
        }

        let names = storage.get_recent_game_names(10).await.unwrap();
        assert_eq!(names, vec!["New".to_string(), "Old".to_string()]);
        assert_eq!(storage.get_recent_game_names(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_tracking_rows() {
        let storage = InMemoryStorage::new();
        let mut game = Game {
            game_id: None,
            game_name: "Factorio".to_string(),
            retail_price: 3000,
        };
        storage.create_game(&mut game).await.unwrap();
        let game_id = game.game_id.unwrap();

        let mut user = User {
            user_id: None,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
        };
        storage.create_user(&mut user).await.unwrap();
        storage
            .create_tracking(&TrackingEntry {
                email: user.email.clone(),
                game_id,
            })
            .await
            .unwrap();

        storage.delete_user(user.user_id.unwrap()).await.unwrap();
        let emails = storage.get_tracked_emails_for_game(game_id).await.unwrap();
        assert!(emails.is_empty());
    }
}
