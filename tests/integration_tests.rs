// Integration tests for Exchange Match

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use exchange_match::clock::{Clock, ManualClock};
use exchange_match::models::{
    FindMatchesOptions, Listing, ListingKind, MatchPreferences, MatchResult, MatchType, ScoringConfig,
    UserLocationProfile,
};
use exchange_match::services::{
    CacheError, CacheStore, EngineError, InMemoryRepository, MatchCache, MatchingEngine,
};
use std::sync::Arc;

const TENANT: i64 = 1;
const LONDON: (f64, f64) = (51.5074, -0.1278);
// Roughly 0.5 km and 10 km north of LONDON
const HALF_KM: f64 = 0.0045;
const TEN_KM: f64 = 0.09;

const GARDENING: i64 = 7;
const COOKING: i64 = 9;
const CRAFTS: i64 = 12;

struct Fixture {
    engine: MatchingEngine,
    repo: Arc<InMemoryRepository>,
    clock: Arc<ManualClock>,
}

fn create_listing(
    id: i64,
    user_id: i64,
    kind: ListingKind,
    category: i64,
    lat_offset: f64,
    created_at: DateTime<Utc>,
) -> Listing {
    Listing {
        id,
        user_id,
        kind,
        category_id: Some(category),
        category_name: Some(if category == GARDENING { "Gardening" } else { "Cooking" }.to_string()),
        title: format!("Listing {}", id),
        description: None,
        latitude: Some(LONDON.0 + lat_offset),
        longitude: Some(LONDON.1),
        image_url: None,
        author_latitude: None,
        author_longitude: None,
        author_verified: false,
        author_rating: None,
        created_at,
    }
}

fn create_profile(user_id: i64, lat_offset: f64) -> UserLocationProfile {
    UserLocationProfile {
        user_id,
        latitude: Some(LONDON.0 + lat_offset),
        longitude: Some(LONDON.1),
        skills: String::new(),
    }
}

fn build_engine(config: ScoringConfig, repo: Arc<InMemoryRepository>, cache: MatchCache, clock: Arc<ManualClock>) -> MatchingEngine {
    let clock: Arc<dyn Clock> = clock;
    MatchingEngine::new(config, repo.clone(), repo, Arc::new(cache), clock).unwrap()
}

/// User 1 offers gardening and requests cooking.
/// User 2 is the mirror image, 0.5 km away and freshly posted.
/// User 3 requests gardening 10 km away with a month-old listing.
/// User 4 offers gardening, the wrong category for user 1's request.
/// User 9 has a profile but no listings.
async fn seed(repo: &InMemoryRepository, now: DateTime<Utc>) {
    let month_ago = now - Duration::days(30);

    repo.upsert_profile(TENANT, create_profile(1, 0.0)).await;
    repo.upsert_listing(TENANT, create_listing(1, 1, ListingKind::Offer, GARDENING, 0.0, now)).await;
    repo.upsert_listing(TENANT, create_listing(2, 1, ListingKind::Request, COOKING, 0.0, now)).await;

    repo.upsert_profile(TENANT, create_profile(2, HALF_KM)).await;
    repo.upsert_listing(TENANT, create_listing(10, 2, ListingKind::Request, GARDENING, HALF_KM, now)).await;
    repo.upsert_listing(TENANT, create_listing(11, 2, ListingKind::Offer, COOKING, HALF_KM, now)).await;

    repo.upsert_profile(TENANT, create_profile(3, TEN_KM)).await;
    repo.upsert_listing(TENANT, create_listing(20, 3, ListingKind::Request, GARDENING, TEN_KM, month_ago)).await;

    repo.upsert_profile(TENANT, create_profile(4, 0.0)).await;
    repo.upsert_listing(TENANT, create_listing(30, 4, ListingKind::Offer, GARDENING, 0.0, now)).await;

    repo.upsert_profile(TENANT, create_profile(9, 0.0)).await;
}

async fn fixture() -> Fixture {
    fixture_with(ScoringConfig::default()).await
}

async fn fixture_with(config: ScoringConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = Arc::new(InMemoryRepository::new());
    seed(&repo, clock.now()).await;

    let cache = MatchCache::in_memory(clock.clone(), 100, std::time::Duration::from_secs(3600));
    let engine = build_engine(config, repo.clone(), cache, clock.clone());

    Fixture { engine, repo, clock }
}

fn ids(matches: &[MatchResult]) -> Vec<i64> {
    matches.iter().map(|m| m.candidate_listing_id).collect()
}

/// A cache backend that is always down
struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: std::time::Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn index_add(&self, _index: &str, _member: &str, _ttl: std::time::Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn index_members(&self, _index: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_integration_end_to_end_matching() {
    let f = fixture().await;

    let matches = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();

    // Every opposite-kind listing of other users qualifies
    let found = ids(&matches);
    assert_eq!(found.len(), 4, "got {:?}", found);
    for id in [10, 11, 20, 30] {
        assert!(found.contains(&id), "missing listing {}", id);
    }

    // Sorted by score, own listings never included
    for pair in matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(matches.iter().all(|m| m.candidate_user_id != 1));
}

#[tokio::test]
async fn test_close_fresh_same_category_is_hot_and_mutual() {
    let f = fixture().await;

    let matches = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    let garden = matches.iter().find(|m| m.candidate_listing_id == 10).unwrap();

    assert!((garden.breakdown.proximity - 1.0).abs() < 1e-9);
    assert_eq!(garden.breakdown.category, 1.0);
    assert_eq!(garden.breakdown.freshness, 1.0);
    assert!(garden.score >= 80.0, "score was {}", garden.score);
    assert_eq!(garden.source_listing_id, 1);
    assert_eq!(garden.match_type, MatchType::Mutual);
    assert!(garden.reasons.iter().any(|r| r == "Mutual exchange possible!"));
}

#[tokio::test]
async fn test_one_way_when_owner_has_nothing_to_give_back() {
    let f = fixture().await;

    let matches = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();

    let old = matches.iter().find(|m| m.candidate_listing_id == 20).unwrap();
    assert_eq!(old.match_type, MatchType::OneWay);
    assert!(old.breakdown.freshness < 1.0);
    assert!(old.breakdown.freshness >= 0.3);
}

#[tokio::test]
async fn test_unknown_or_listingless_user_gets_nothing() {
    let f = fixture().await;

    let unknown = f
        .engine
        .find_matches_for_user(TENANT, 404, &FindMatchesOptions::default())
        .await
        .unwrap();
    assert!(unknown.is_empty());

    let no_listings = f
        .engine
        .find_matches_for_user(TENANT, 9, &FindMatchesOptions::default())
        .await
        .unwrap();
    assert!(no_listings.is_empty());

    let grouped = f.engine.get_matches_by_type(TENANT, 9).await.unwrap();
    assert!(grouped.all.is_empty());
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let f = fixture().await;
    let now = f.clock.now();
    f.repo
        .upsert_listing(2, create_listing(100, 50, ListingKind::Offer, GARDENING, 0.0, now))
        .await;

    let matches = f
        .engine
        .find_matches_for_user(2, 50, &FindMatchesOptions::default())
        .await
        .unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn test_options_filters() {
    let f = fixture().await;

    let near = f
        .engine
        .find_matches_for_user(
            TENANT,
            1,
            &FindMatchesOptions {
                max_distance_km: Some(5.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!ids(&near).contains(&20));

    let cooking = f
        .engine
        .find_matches_for_user(
            TENANT,
            1,
            &FindMatchesOptions {
                categories: Some(vec![COOKING]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&cooking), vec![11]);

    let capped = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::with_limit(2))
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let f = fixture().await;

    let result = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::with_limit(0))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidOptions(_))));

    let result = f
        .engine
        .find_matches_for_user(
            TENANT,
            1,
            &FindMatchesOptions {
                min_score: Some(140.0),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(EngineError::InvalidOptions(_))));
}

#[tokio::test]
async fn test_hot_matches() {
    let f = fixture().await;

    let hot = f.engine.get_hot_matches(TENANT, 1, 10).await.unwrap();

    assert!(!hot.is_empty());
    for m in &hot {
        assert!(m.score >= 80.0);
        assert!(m.distance_km.map_or(true, |d| d <= 15.0));
    }
    assert!(!ids(&hot).contains(&20));
}

#[tokio::test]
async fn test_mutual_matches() {
    let f = fixture().await;

    let mutual = f.engine.get_mutual_matches(TENANT, 1, 10).await.unwrap();

    let mut found = ids(&mutual);
    found.sort_unstable();
    assert_eq!(found, vec![10, 11]);
    assert!(mutual.iter().all(|m| m.match_type == MatchType::Mutual));

    let one = f.engine.get_mutual_matches(TENANT, 1, 1).await.unwrap();
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn test_matches_by_type() {
    let f = fixture().await;
    let config = f.engine.get_config().clone();

    let grouped = f.engine.get_matches_by_type(TENANT, 1).await.unwrap();

    assert_eq!(grouped.all.len(), 4);
    assert_eq!(grouped.hot.len() + grouped.good.len(), grouped.all.len());
    assert!(grouped.hot.iter().all(|m| m.score >= config.hot_match_threshold));
    assert!(grouped
        .good
        .iter()
        .all(|m| m.score >= config.min_match_score && m.score < config.hot_match_threshold));
    assert!(grouped.mutual.iter().all(|m| m.match_type == MatchType::Mutual));
    assert_eq!(grouped.mutual.len(), 2);
}

#[tokio::test]
async fn test_results_are_cached_until_category_invalidation() {
    let f = fixture().await;
    let options = FindMatchesOptions::default();
    let now = f.clock.now();

    let before = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();

    // A new gardening request is not visible while the cached set lives
    f.repo
        .upsert_listing(TENANT, create_listing(40, 5, ListingKind::Request, GARDENING, 0.0, now))
        .await;
    let cached = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    assert_eq!(ids(&cached), ids(&before));

    assert!(f.engine.invalidate_cache_for_category(TENANT, GARDENING).await >= 1);

    let fresh = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    assert!(ids(&fresh).contains(&40));
}

#[tokio::test]
async fn test_category_invalidation_reaches_untouched_categories() {
    let f = fixture().await;
    let options = FindMatchesOptions::default();
    let now = f.clock.now();

    let before = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    assert!(!ids(&before).contains(&60));

    // Nobody in the tenant had a crafts listing when the set was cached
    f.repo.upsert_profile(TENANT, create_profile(6, 0.0)).await;
    f.repo
        .upsert_listing(TENANT, create_listing(60, 6, ListingKind::Request, CRAFTS, 0.0, now))
        .await;

    assert!(f.engine.invalidate_cache_for_category(TENANT, CRAFTS).await >= 1);

    let fresh = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    let crafts = fresh.iter().find(|m| m.candidate_listing_id == 60).unwrap();
    assert_eq!(crafts.score, 64.0);
}

#[tokio::test]
async fn test_mutual_needs_minimum_score_even_with_lower_threshold() {
    let f = fixture().await;
    let now = f.clock.now();
    let min_match_score = f.engine.get_config().min_match_score;

    // User 7 lives next door and offers cooking back, but their request is
    // old, far away and in a category user 1 does not offer
    f.repo.upsert_profile(TENANT, create_profile(7, 0.0)).await;
    f.repo
        .upsert_listing(TENANT, create_listing(70, 7, ListingKind::Request, CRAFTS, 2.0, now - Duration::days(365)))
        .await;
    f.repo
        .upsert_listing(TENANT, create_listing(71, 7, ListingKind::Offer, COOKING, 0.0, now))
        .await;

    let options = FindMatchesOptions {
        max_distance_km: Some(500.0),
        min_score: Some(0.0),
        ..Default::default()
    };
    let matches = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();

    let weak = matches.iter().find(|m| m.candidate_listing_id == 70).unwrap();
    assert!(weak.score < min_match_score, "score was {}", weak.score);
    assert_eq!(weak.match_type, MatchType::OneWay);

    let strong = matches.iter().find(|m| m.candidate_listing_id == 71).unwrap();
    assert_eq!(strong.match_type, MatchType::Mutual);

    assert!(matches
        .iter()
        .filter(|m| m.match_type == MatchType::Mutual)
        .all(|m| m.score >= min_match_score));
}

#[tokio::test]
async fn test_blocked_users_are_never_matched() {
    let f = fixture().await;
    let options = FindMatchesOptions::default();

    // User 1 blocks user 2; user 3 blocks user 1
    f.repo.block_user(TENANT, 1, 2).await;
    f.repo.block_user(TENANT, 3, 1).await;

    let matches = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    assert_eq!(ids(&matches), vec![30]);

    let theirs = f.engine.find_matches_for_user(TENANT, 2, &options).await.unwrap();
    assert!(theirs.iter().all(|m| m.candidate_user_id != 1));

    let mutual = f.engine.get_mutual_matches(TENANT, 1, 10).await.unwrap();
    assert!(mutual.is_empty());
}

#[tokio::test]
async fn test_preferences_apply_between_options_and_config() {
    let f = fixture().await;
    f.repo
        .upsert_preferences(
            TENANT,
            1,
            MatchPreferences {
                max_distance_km: Some(5.0),
                categories: Some(vec![GARDENING]),
                ..Default::default()
            },
        )
        .await;

    let preferred = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    let mut found = ids(&preferred);
    found.sort_unstable();
    assert_eq!(found, vec![10, 30]);

    // Explicit options override the stored preferences
    let explicit = f
        .engine
        .find_matches_for_user(
            TENANT,
            1,
            &FindMatchesOptions {
                max_distance_km: Some(50.0),
                categories: Some(vec![GARDENING, COOKING]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(explicit.len(), 4);

    f.repo
        .upsert_preferences(
            TENANT,
            1,
            MatchPreferences {
                min_match_score: Some(80.0),
                ..Default::default()
            },
        )
        .await;
    f.engine.invalidate_cache_for_user(TENANT, 1).await;

    let strict = f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    assert!(!strict.is_empty());
    assert!(strict.iter().all(|m| m.score >= 80.0));
}

#[tokio::test]
async fn test_user_invalidation() {
    let f = fixture().await;
    let options = FindMatchesOptions::default();

    f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    f.engine.get_hot_matches(TENANT, 1, 5).await.unwrap();

    assert_eq!(f.engine.invalidate_cache_for_user(TENANT, 1).await, 2);
    assert_eq!(f.engine.invalidate_cache_for_user(TENANT, 1).await, 0);

    f.repo.remove_listing(TENANT, 10).await;
    let after = f.engine.find_matches_for_user(TENANT, 1, &options).await.unwrap();
    assert!(!ids(&after).contains(&10));
}

#[tokio::test]
async fn test_expired_entries_are_swept() {
    let f = fixture().await;

    f.engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    f.engine.get_matches_by_type(TENANT, 2).await.unwrap();

    assert_eq!(f.engine.clear_expired_cache().await, 0);

    f.clock.advance(Duration::hours(2));
    assert_eq!(f.engine.clear_expired_cache().await, 2);
    assert_eq!(f.engine.clear_expired_cache().await, 0);
}

#[tokio::test]
async fn test_clear_cache_for_tenant() {
    let f = fixture().await;

    f.engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    f.engine
        .find_matches_for_user(TENANT, 2, &FindMatchesOptions::default())
        .await
        .unwrap();

    assert_eq!(f.engine.clear_cache(TENANT).await, 2);
    assert_eq!(f.engine.clear_cache(TENANT).await, 0);
}

#[tokio::test]
async fn test_warm_up_is_bounded() {
    let f = fixture().await;
    let now = f.clock.now();
    for user in 100..110 {
        f.repo
            .upsert_listing(TENANT, create_listing(user * 10, user, ListingKind::Request, GARDENING, 0.01, now))
            .await;
    }

    let report = f.engine.warm_up_cache(TENANT, 5).await.unwrap();
    assert_eq!(report.processed, 5);
    assert!(report.cached <= report.processed);

    // Already warmed users are skipped on the next pass
    let next = f.engine.warm_up_cache(TENANT, 5).await.unwrap();
    assert!(next.processed <= 5);
    assert!(next.cached <= next.processed);

    let none = f.engine.warm_up_cache(TENANT, 0).await.unwrap();
    assert_eq!(none.processed, 0);
}

#[tokio::test]
async fn test_unavailable_cache_still_returns_results() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = Arc::new(InMemoryRepository::new());
    seed(&repo, clock.now()).await;

    let cache = MatchCache::new(
        Arc::new(UnavailableStore),
        clock.clone(),
        100,
        std::time::Duration::from_secs(3600),
    );
    let engine = build_engine(ScoringConfig::default(), repo, cache, clock);

    let matches = engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap();
    assert_eq!(matches.len(), 4);

    assert_eq!(engine.invalidate_cache_for_user(TENANT, 1).await, 0);
    assert_eq!(engine.clear_expired_cache().await, 0);

    let report = engine.warm_up_cache(TENANT, 3).await.unwrap();
    assert!(report.processed <= 3);
    assert_eq!(report.cached, 0);
}

#[tokio::test]
async fn test_disabled_engine_returns_nothing() {
    let config = ScoringConfig {
        enabled: false,
        ..Default::default()
    };
    let f = fixture_with(config).await;

    assert!(f
        .engine
        .find_matches_for_user(TENANT, 1, &FindMatchesOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert!(f.engine.get_hot_matches(TENANT, 1, 5).await.unwrap().is_empty());
    assert_eq!(f.engine.warm_up_cache(TENANT, 5).await.unwrap().processed, 0);
}

#[tokio::test]
async fn test_invalid_config_refuses_to_start() {
    let mut config = ScoringConfig::default();
    config.weights.category = 0.6;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = Arc::new(InMemoryRepository::new());
    let cache = Arc::new(MatchCache::in_memory(clock.clone(), 10, std::time::Duration::from_secs(60)));
    let clock: Arc<dyn Clock> = clock;

    let result = MatchingEngine::new(config, repo.clone(), repo, cache, clock);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}
