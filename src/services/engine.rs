use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use crate::clock::Clock;
use crate::core::{MatchClassifier, MatchContext, Matcher, OwnerContext, ScoreCalculator};
use crate::models::{
    CacheStats, CategoryId, ConfigError, FindMatchesOptions, Listing, ListingKind, MatchResult, MatchesByType,
    ScoringConfig, TenantId, UserId, UserLocationProfile, WarmUpReport, DEFAULT_LIMIT,
};
use crate::services::cache::{CategoryDeps, MatchCache, MatchScope};
use crate::services::repository::{ListingRepository, ProfileRepository, RepositoryError};

/// Candidate pool scanned before keeping only mutual matches
pub const MUTUAL_POOL_SIZE: usize = 50;

/// Errors surfaced by the matching engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid scoring configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A freshly computed match set and the categories it depends on
struct Computed {
    matches: Vec<MatchResult>,
    categories: CategoryDeps,
}

impl Computed {
    fn empty() -> Self {
        Self {
            matches: Vec::new(),
            categories: CategoryDeps::none(),
        }
    }
}

/// Matching service: ranks, classifies and caches matches per tenant and user
///
/// Holds its configuration and collaborators explicitly; every call takes the
/// tenant it operates on.
pub struct MatchingEngine {
    matcher: Matcher,
    classifier: MatchClassifier,
    listings: Arc<dyn ListingRepository>,
    profiles: Arc<dyn ProfileRepository>,
    cache: Arc<MatchCache>,
    clock: Arc<dyn Clock>,
}

impl MatchingEngine {
    /// Build the engine, refusing an invalid scoring configuration
    pub fn new(
        config: ScoringConfig,
        listings: Arc<dyn ListingRepository>,
        profiles: Arc<dyn ProfileRepository>,
        cache: Arc<MatchCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let calculator = ScoreCalculator::new(config)?;
        let classifier = MatchClassifier::from_calculator(&calculator);

        Ok(Self {
            matcher: Matcher::new(calculator),
            classifier,
            listings,
            profiles,
            cache,
            clock,
        })
    }

    pub fn get_config(&self) -> &ScoringConfig {
        self.matcher.config()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Ranked matches for a user, served from cache when possible
    ///
    /// Unset options fall back to the user's stored preferences, then to the
    /// scoring configuration. A user without listings (or unknown to the
    /// repositories) gets an empty list. Changing a user's preferences or
    /// blocks requires `invalidate_cache_for_user` for everyone involved.
    pub async fn find_matches_for_user(
        &self,
        tenant: TenantId,
        user_id: UserId,
        options: &FindMatchesOptions,
    ) -> Result<Vec<MatchResult>, EngineError> {
        options
            .validate()
            .map_err(|e| EngineError::InvalidOptions(e.to_string()))?;

        if !self.get_config().enabled {
            return Ok(Vec::new());
        }

        let scope = MatchScope::Find(options.clone());
        self.cached_or_compute(tenant, user_id, &scope, options).await
    }

    /// Matches at or above the hot threshold within the local distance tier
    pub async fn get_hot_matches(
        &self,
        tenant: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MatchResult>, EngineError> {
        if !self.get_config().enabled {
            return Ok(Vec::new());
        }

        let config = self.get_config();
        let options = FindMatchesOptions {
            max_distance_km: Some(config.proximity_tiers.local_km),
            min_score: Some(config.hot_match_threshold),
            limit: Some(limit),
            categories: None,
        };
        let scope = MatchScope::Hot { limit: options.limit() };

        self.cached_or_compute(tenant, user_id, &scope, &options).await
    }

    /// Matches where the candidate's owner also matches the user back
    pub async fn get_mutual_matches(
        &self,
        tenant: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MatchResult>, EngineError> {
        if !self.get_config().enabled {
            return Ok(Vec::new());
        }

        let limit = FindMatchesOptions::with_limit(limit).limit();
        let scope = MatchScope::Mutual { limit };
        if let Some(cached) = self.cache.get::<Vec<MatchResult>>(tenant, user_id, &scope).await {
            return Ok(cached);
        }

        let computed = self
            .compute(tenant, user_id, &FindMatchesOptions::with_limit(MUTUAL_POOL_SIZE))
            .await?;
        let mutual: Vec<MatchResult> = computed
            .matches
            .into_iter()
            .filter(MatchResult::is_mutual)
            .take(limit)
            .collect();

        self.cache
            .put(tenant, user_id, &scope, &mutual, &computed.categories, None)
            .await;
        Ok(mutual)
    }

    /// All matches of a user grouped into hot, good and mutual tiers
    pub async fn get_matches_by_type(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<MatchesByType, EngineError> {
        if !self.get_config().enabled {
            return Ok(MatchesByType::default());
        }

        let scope = MatchScope::ByType;
        if let Some(cached) = self.cache.get::<MatchesByType>(tenant, user_id, &scope).await {
            return Ok(cached);
        }

        let computed = self
            .compute(tenant, user_id, &FindMatchesOptions::with_limit(DEFAULT_LIMIT))
            .await?;
        let grouped = self.classifier.group(computed.matches);

        self.cache
            .put(tenant, user_id, &scope, &grouped, &computed.categories, None)
            .await;
        Ok(grouped)
    }

    /// Drop every cached match set of a tenant, returning how many were removed
    pub async fn clear_cache(&self, tenant: TenantId) -> usize {
        self.cache.clear(tenant).await
    }

    pub async fn invalidate_cache_for_user(&self, tenant: TenantId, user_id: UserId) -> usize {
        self.cache.invalidate_for_user(tenant, user_id).await
    }

    pub async fn invalidate_cache_for_category(&self, tenant: TenantId, category_id: CategoryId) -> usize {
        self.cache.invalidate_for_category(tenant, category_id).await
    }

    pub async fn clear_expired_cache(&self) -> usize {
        self.cache.clear_expired().await
    }

    /// Precompute default match sets for up to `batch_size` active users
    ///
    /// Users whose default set is already cached are skipped and do not count
    /// as processed. A failure for one user is logged and the batch moves on.
    pub async fn warm_up_cache(&self, tenant: TenantId, batch_size: usize) -> Result<WarmUpReport, EngineError> {
        let mut report = WarmUpReport::default();
        if batch_size == 0 || !self.get_config().enabled {
            return Ok(report);
        }

        let options = FindMatchesOptions::default();
        let scope = MatchScope::Find(options.clone());
        let users = self
            .listings
            .active_user_ids(tenant, batch_size.saturating_mul(2))
            .await?;

        for user_id in users {
            if report.processed >= batch_size {
                break;
            }
            if self.cache.get::<Vec<MatchResult>>(tenant, user_id, &scope).await.is_some() {
                continue;
            }

            report.processed += 1;
            match self.compute(tenant, user_id, &options).await {
                Ok(computed) => {
                    let stored = self
                        .cache
                        .put(tenant, user_id, &scope, &computed.matches, &computed.categories, None)
                        .await;
                    if stored {
                        report.cached += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Warm-up failed for user {} in tenant {}: {}", user_id, tenant, e);
                }
            }
        }

        tracing::info!(
            tenant,
            processed = report.processed,
            cached = report.cached,
            "cache warm-up finished"
        );
        Ok(report)
    }

    async fn cached_or_compute(
        &self,
        tenant: TenantId,
        user_id: UserId,
        scope: &MatchScope,
        options: &FindMatchesOptions,
    ) -> Result<Vec<MatchResult>, EngineError> {
        if let Some(cached) = self.cache.get::<Vec<MatchResult>>(tenant, user_id, scope).await {
            return Ok(cached);
        }

        let computed = self.compute(tenant, user_id, options).await?;
        self.cache
            .put(tenant, user_id, scope, &computed.matches, &computed.categories, None)
            .await;

        Ok(computed.matches)
    }

    async fn compute(
        &self,
        tenant: TenantId,
        user_id: UserId,
        options: &FindMatchesOptions,
    ) -> Result<Computed, EngineError> {
        let user_listings = self.listings.get_user_listings(tenant, user_id).await?;
        if user_listings.is_empty() {
            tracing::debug!("User {} has no active listings in tenant {}", user_id, tenant);
            return Ok(Computed::empty());
        }

        let profile = self
            .profiles
            .get_location_profile(tenant, user_id)
            .await?
            .unwrap_or_else(|| UserLocationProfile {
                user_id,
                ..Default::default()
            });
        let options = match self.profiles.get_match_preferences(tenant, user_id).await? {
            Some(preferences) => options.with_preferences(&preferences),
            None => options.clone(),
        };
        let blocked = self.profiles.blocked_user_ids(tenant, user_id).await?;

        let wanted: BTreeSet<ListingKind> = user_listings.iter().map(|l| l.kind.opposite()).collect();
        let mut candidates = Vec::new();
        for kind in wanted {
            candidates.extend(
                self.listings
                    .list_active_listings(tenant, kind, Some(user_id))
                    .await?
                    .into_iter()
                    .filter(|listing| !blocked.contains(&listing.user_id)),
            );
        }

        let now = self.clock.now();
        let context = MatchContext {
            user_id,
            profile: &profile,
            listings: &user_listings,
        };
        let mut matches = self.matcher.find_matches(context, &candidates, &options, now).matches;

        let owners = self.load_owners(tenant, &matches).await?;
        self.classifier
            .mark_mutual(self.matcher.calculator(), &user_listings, &mut matches, &owners, now);

        let categories = dependent_categories(&user_listings, &matches, &options);
        Ok(Computed { matches, categories })
    }

    async fn load_owners(
        &self,
        tenant: TenantId,
        matches: &[MatchResult],
    ) -> Result<HashMap<UserId, OwnerContext>, EngineError> {
        let owner_ids: BTreeSet<UserId> = matches.iter().map(|m| m.candidate_user_id).collect();
        let mut owners = HashMap::with_capacity(owner_ids.len());

        for owner_id in owner_ids {
            let listings = self.listings.get_user_listings(tenant, owner_id).await?;
            let profile = self
                .profiles
                .get_location_profile(tenant, owner_id)
                .await?
                .unwrap_or_else(|| UserLocationProfile {
                    user_id: owner_id,
                    ..Default::default()
                });
            owners.insert(owner_id, OwnerContext { profile, listings });
        }

        Ok(owners)
    }
}

/// Categories whose listing changes may alter a cached match set
///
/// Candidates of any category can qualify, and the mutual flag of every match
/// depends on its owner's listings in any category. Only an empty set under a
/// category filter is limited to the filtered categories.
fn dependent_categories(
    user_listings: &[Listing],
    matches: &[MatchResult],
    options: &FindMatchesOptions,
) -> CategoryDeps {
    match &options.categories {
        Some(filter) if !filter.is_empty() && matches.is_empty() => {
            let mut categories: BTreeSet<CategoryId> = user_listings.iter().filter_map(|l| l.category_id).collect();
            categories.extend(filter.iter().copied());
            CategoryDeps::Only(categories.into_iter().collect())
        }
        _ => CategoryDeps::Any,
    }
}
