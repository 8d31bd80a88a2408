//! Exchange Match - matching and scoring engine for a peer-to-peer exchange marketplace
//!
//! Given a user's offers and requests, finds and ranks counterpart listings
//! from other users, classifies them into hot, good and mutual tiers, and
//! caches the results per tenant and user.

pub mod clock;
pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::{haversine_distance, MatchClassifier, Matcher, ScoreCalculator};
pub use crate::models::{
    FindMatchesOptions, Listing, ListingKind, MatchResult, MatchType, MatchesByType, ScoringConfig,
    UserLocationProfile, WarmUpReport,
};
pub use crate::services::{EngineError, InMemoryRepository, MatchCache, MatchingEngine, MemoryStore};
