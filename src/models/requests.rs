use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::CategoryId;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Filters for a match lookup
///
/// Unset fields fall back to the engine's scoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct FindMatchesOptions {
    #[validate(range(min = 0.0))]
    #[serde(rename = "maxDistanceKm", default)]
    pub max_distance_km: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(rename = "minScore", default)]
    pub min_score: Option<f64>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryId>>,
}

impl FindMatchesOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Effective result cap, capped at 100
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Fill unset fields from a user's stored preferences
    ///
    /// Explicit options always win; whatever both leave unset falls through
    /// to the scoring configuration.
    pub fn with_preferences(&self, preferences: &MatchPreferences) -> Self {
        Self {
            max_distance_km: self
                .max_distance_km
                .or(preferences.max_distance_km.map(|d| d.max(0.0))),
            min_score: self
                .min_score
                .or(preferences.min_match_score.map(|s| s.clamp(0.0, 100.0))),
            limit: self.limit,
            categories: self.categories.clone().or_else(|| {
                preferences
                    .categories
                    .clone()
                    .filter(|ids| !ids.is_empty())
            }),
        }
    }

    /// Stable textual form, used as part of cache keys
    ///
    /// Numbers keep full precision so nearby thresholds never share a key.
    pub fn fingerprint(&self) -> String {
        let distance = self
            .max_distance_km
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let score = self
            .min_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let categories = match &self.categories {
            Some(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids.dedup();
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            }
            None => "-".to_string(),
        };

        format!("d{}:s{}:l{}:c{}", distance, score, self.limit(), categories)
    }
}

/// A user's own matching preferences, stored alongside their profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPreferences {
    #[serde(rename = "maxDistanceKm", default)]
    pub max_distance_km: Option<f64>,
    #[serde(rename = "minMatchScore", default)]
    pub min_match_score: Option<f64>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryId>>,
}
