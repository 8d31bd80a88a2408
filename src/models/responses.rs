use serde::{Deserialize, Serialize};
use crate::models::domain::MatchResult;

/// Matches grouped by tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchesByType {
    pub hot: Vec<MatchResult>,
    pub good: Vec<MatchResult>,
    pub mutual: Vec<MatchResult>,
    pub all: Vec<MatchResult>,
}

/// Outcome of a cache warm-up batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmUpReport {
    pub processed: usize,
    pub cached: usize,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub backend: String,
}
