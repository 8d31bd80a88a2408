use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Listing, ListingKind, MatchPreferences, TenantId, UserId, UserLocationProfile};

/// Errors that can occur when loading listings or profiles
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Source of listings for matching
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Active listings of a kind in a tenant, optionally excluding one owner
    async fn list_active_listings(
        &self,
        tenant: TenantId,
        kind: ListingKind,
        excluding_user: Option<UserId>,
    ) -> Result<Vec<Listing>, RepositoryError>;

    /// Active listings owned by a user
    async fn get_user_listings(&self, tenant: TenantId, user_id: UserId) -> Result<Vec<Listing>, RepositoryError>;

    /// Users with at least one active listing, most recently active first
    async fn active_user_ids(&self, tenant: TenantId, limit: usize) -> Result<Vec<UserId>, RepositoryError>;
}

/// Source of user locations, skills, preferences and blocks
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_location_profile(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserLocationProfile>, RepositoryError>;

    /// Stored matching preferences, if the user saved any
    async fn get_match_preferences(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<MatchPreferences>, RepositoryError>;

    /// Users the user blocked or was blocked by
    async fn blocked_user_ids(&self, tenant: TenantId, user_id: UserId) -> Result<HashSet<UserId>, RepositoryError>;
}

#[derive(Debug, Default)]
struct Tables {
    listings: HashMap<TenantId, Vec<Listing>>,
    profiles: HashMap<(TenantId, UserId), UserLocationProfile>,
    preferences: HashMap<(TenantId, UserId), MatchPreferences>,
    // (tenant, blocker, blocked)
    blocks: HashSet<(TenantId, UserId, UserId)>,
}

/// Repository holding listings and profiles in memory
///
/// Every stored listing counts as active.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing by id
    pub async fn upsert_listing(&self, tenant: TenantId, listing: Listing) {
        let mut tables = self.tables.write().await;
        let listings = tables.listings.entry(tenant).or_default();
        listings.retain(|existing| existing.id != listing.id);
        listings.push(listing);
    }

    pub async fn remove_listing(&self, tenant: TenantId, listing_id: i64) -> bool {
        let mut tables = self.tables.write().await;
        let Some(listings) = tables.listings.get_mut(&tenant) else {
            return false;
        };
        let before = listings.len();
        listings.retain(|existing| existing.id != listing_id);
        listings.len() != before
    }

    pub async fn upsert_profile(&self, tenant: TenantId, profile: UserLocationProfile) {
        let mut tables = self.tables.write().await;
        tables.profiles.insert((tenant, profile.user_id), profile);
    }

    pub async fn upsert_preferences(&self, tenant: TenantId, user_id: UserId, preferences: MatchPreferences) {
        let mut tables = self.tables.write().await;
        tables.preferences.insert((tenant, user_id), preferences);
    }

    pub async fn block_user(&self, tenant: TenantId, user_id: UserId, blocked_user_id: UserId) {
        let mut tables = self.tables.write().await;
        tables.blocks.insert((tenant, user_id, blocked_user_id));
    }

    pub async fn unblock_user(&self, tenant: TenantId, user_id: UserId, blocked_user_id: UserId) -> bool {
        let mut tables = self.tables.write().await;
        tables.blocks.remove(&(tenant, user_id, blocked_user_id))
    }
}

#[async_trait]
impl ListingRepository for InMemoryRepository {
    async fn list_active_listings(
        &self,
        tenant: TenantId,
        kind: ListingKind,
        excluding_user: Option<UserId>,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .get(&tenant)
            .map(|listings| {
                listings
                    .iter()
                    .filter(|l| l.kind == kind)
                    .filter(|l| excluding_user != Some(l.user_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_user_listings(&self, tenant: TenantId, user_id: UserId) -> Result<Vec<Listing>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .get(&tenant)
            .map(|listings| listings.iter().filter(|l| l.user_id == user_id).cloned().collect())
            .unwrap_or_default())
    }

    async fn active_user_ids(&self, tenant: TenantId, limit: usize) -> Result<Vec<UserId>, RepositoryError> {
        let tables = self.tables.read().await;
        let Some(listings) = tables.listings.get(&tenant) else {
            return Ok(Vec::new());
        };

        let mut latest: HashMap<UserId, chrono::DateTime<chrono::Utc>> = HashMap::new();
        for listing in listings {
            latest
                .entry(listing.user_id)
                .and_modify(|at| *at = (*at).max(listing.created_at))
                .or_insert(listing.created_at);
        }

        let mut users: Vec<(UserId, chrono::DateTime<chrono::Utc>)> = latest.into_iter().collect();
        users.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(users.into_iter().take(limit).map(|(id, _)| id).collect())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_location_profile(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserLocationProfile>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.profiles.get(&(tenant, user_id)).cloned())
    }

    async fn get_match_preferences(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<MatchPreferences>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.preferences.get(&(tenant, user_id)).cloned())
    }

    async fn blocked_user_ids(&self, tenant: TenantId, user_id: UserId) -> Result<HashSet<UserId>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .blocks
            .iter()
            .filter(|(t, _, _)| *t == tenant)
            .filter_map(|&(_, blocker, blocked)| {
                if blocker == user_id {
                    Some(blocked)
                } else if blocked == user_id {
                    Some(blocker)
                } else {
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn create_listing(id: i64, user_id: i64, kind: ListingKind, age_days: i64) -> Listing {
        Listing {
            id,
            user_id,
            kind,
            category_id: None,
            category_name: None,
            title: format!("Listing {}", id),
            description: None,
            latitude: None,
            longitude: None,
            image_url: None,
            author_latitude: None,
            author_longitude: None,
            author_verified: false,
            author_rating: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_listings_are_tenant_scoped() {
        let repo = InMemoryRepository::new();
        repo.upsert_listing(1, create_listing(1, 10, ListingKind::Offer, 0)).await;
        repo.upsert_listing(2, create_listing(2, 10, ListingKind::Offer, 0)).await;

        let offers = repo.list_active_listings(1, ListingKind::Offer, None).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].id, 1);

        assert!(repo.list_active_listings(1, ListingKind::Request, None).await.unwrap().is_empty());
        assert!(repo.list_active_listings(1, ListingKind::Offer, Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_users_most_recent_first() {
        let repo = InMemoryRepository::new();
        repo.upsert_listing(1, create_listing(1, 10, ListingKind::Offer, 5)).await;
        repo.upsert_listing(1, create_listing(2, 11, ListingKind::Request, 1)).await;
        repo.upsert_listing(1, create_listing(3, 12, ListingKind::Offer, 3)).await;
        repo.upsert_listing(1, create_listing(4, 10, ListingKind::Request, 9)).await;

        assert_eq!(repo.active_user_ids(1, 10).await.unwrap(), vec![11, 12, 10]);
        assert_eq!(repo.active_user_ids(1, 2).await.unwrap(), vec![11, 12]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_remove() {
        let repo = InMemoryRepository::new();
        repo.upsert_listing(1, create_listing(1, 10, ListingKind::Offer, 0)).await;
        repo.upsert_listing(1, create_listing(1, 10, ListingKind::Request, 0)).await;

        let mine = repo.get_user_listings(1, 10).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].kind, ListingKind::Request);

        assert!(repo.remove_listing(1, 1).await);
        assert!(!repo.remove_listing(1, 1).await);
    }

    #[tokio::test]
    async fn test_blocks_apply_both_ways() {
        let repo = InMemoryRepository::new();
        repo.block_user(1, 10, 11).await;
        repo.block_user(1, 12, 10).await;
        repo.block_user(2, 10, 13).await;

        let blocked = repo.blocked_user_ids(1, 10).await.unwrap();
        assert_eq!(blocked, HashSet::from([11, 12]));
        assert_eq!(repo.blocked_user_ids(1, 11).await.unwrap(), HashSet::from([10]));

        assert!(repo.unblock_user(1, 10, 11).await);
        assert_eq!(repo.blocked_user_ids(1, 10).await.unwrap(), HashSet::from([12]));
    }

    #[tokio::test]
    async fn test_preferences_are_tenant_scoped() {
        let repo = InMemoryRepository::new();
        let preferences = MatchPreferences {
            max_distance_km: Some(5.0),
            ..Default::default()
        };
        repo.upsert_preferences(1, 10, preferences.clone()).await;

        assert_eq!(repo.get_match_preferences(1, 10).await.unwrap(), Some(preferences));
        assert_eq!(repo.get_match_preferences(2, 10).await.unwrap(), None);
    }
}
