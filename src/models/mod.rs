// Model exports
pub mod config;
pub mod domain;
pub mod requests;
pub mod responses;

pub use config::{ConfigError, FreshnessSettings, ProximityTiers, ScoringConfig, ScoringWeights};
pub use domain::{
    CategoryId, Listing, ListingId, ListingKind, MatchResult, MatchType, ScoreBreakdown, TenantId,
    UserId, UserLocationProfile,
};
pub use requests::{FindMatchesOptions, MatchPreferences, DEFAULT_LIMIT, MAX_LIMIT};
pub use responses::{CacheStats, MatchesByType, WarmUpReport};
