use serde::{Deserialize, Serialize};
use thiserror::Error;

const WEIGHT_TOLERANCE: f64 = 0.001;

/// Reasons a scoring configuration is rejected at startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Scoring weights must sum to 1.0, got {0:.4}")]
    WeightsSum(f64),

    #[error("Scoring weight '{0}' must be within [0, 1], got {1}")]
    WeightOutOfRange(&'static str, f64),

    #[error("Proximity tiers must be positive and strictly increasing: {0}")]
    TiersNotIncreasing(String),

    #[error("Freshness setting '{0}' is invalid: {1}")]
    Freshness(&'static str, f64),

    #[error("Threshold '{0}' must be within [0, 100], got {1}")]
    ThresholdOutOfRange(&'static str, f64),

    #[error("Hot match threshold {hot} is below the minimum match score {min}")]
    HotBelowMinimum { hot: f64, min: f64 },

    #[error("Maximum distance must be positive, got {0}")]
    MaxDistance(f64),
}

/// Weights of the five scoring components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub proximity: f64,
    pub freshness: f64,
    pub category: f64,
    pub skill: f64,
    pub quality: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.proximity + self.freshness + self.category + self.skill + self.quality
    }

    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("proximity", self.proximity),
            ("freshness", self.freshness),
            ("category", self.category),
            ("skill", self.skill),
            ("quality", self.quality),
        ]
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            proximity: 0.30,
            freshness: 0.10,
            category: 0.30,
            skill: 0.20,
            quality: 0.10,
        }
    }
}

/// Distance brackets in kilometers shaping the proximity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityTiers {
    pub walking_km: f64,
    pub local_km: f64,
    pub city_km: f64,
    pub regional_km: f64,
    pub max_km: f64,
}

impl Default for ProximityTiers {
    fn default() -> Self {
        Self {
            walking_km: 5.0,
            local_km: 15.0,
            city_km: 30.0,
            regional_km: 50.0,
            max_km: 100.0,
        }
    }
}

impl ProximityTiers {
    fn as_array(&self) -> [f64; 5] {
        [
            self.walking_km,
            self.local_km,
            self.city_km,
            self.regional_km,
            self.max_km,
        ]
    }
}

/// Age decay of listing freshness
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreshnessSettings {
    /// Listings younger than this keep full freshness
    pub full_hours: f64,
    pub half_life_days: f64,
    pub floor: f64,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self {
            full_hours: 24.0,
            half_life_days: 14.0,
            floor: 0.3,
        }
    }
}

/// Process-wide scoring configuration, immutable once the engine is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub enabled: bool,
    #[serde(rename = "maxDistanceKm")]
    pub max_distance_km: f64,
    #[serde(rename = "minMatchScore")]
    pub min_match_score: f64,
    #[serde(rename = "hotMatchThreshold")]
    pub hot_match_threshold: f64,
    pub weights: ScoringWeights,
    #[serde(rename = "proximityTiers")]
    pub proximity_tiers: ProximityTiers,
    pub freshness: FreshnessSettings,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_distance_km: 50.0,
            min_match_score: 40.0,
            hot_match_threshold: 80.0,
            weights: ScoringWeights::default(),
            proximity_tiers: ProximityTiers::default(),
            freshness: FreshnessSettings::default(),
        }
    }
}

impl ScoringConfig {
    /// Check every invariant the scoring model relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in self.weights.named() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::WeightOutOfRange(name, weight));
            }
        }

        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightsSum(sum));
        }

        let tiers = self.proximity_tiers.as_array();
        let increasing = tiers[0] > 0.0 && tiers.windows(2).all(|pair| pair[0] < pair[1]);
        if !increasing {
            return Err(ConfigError::TiersNotIncreasing(format!("{:?}", tiers)));
        }

        let freshness = &self.freshness;
        if !(0.0..=1.0).contains(&freshness.floor) {
            return Err(ConfigError::Freshness("floor", freshness.floor));
        }
        if freshness.half_life_days <= 0.0 {
            return Err(ConfigError::Freshness("half_life_days", freshness.half_life_days));
        }
        if freshness.full_hours < 0.0 {
            return Err(ConfigError::Freshness("full_hours", freshness.full_hours));
        }

        for (name, value) in [
            ("min_match_score", self.min_match_score),
            ("hot_match_threshold", self.hot_match_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange(name, value));
            }
        }
        if self.hot_match_threshold < self.min_match_score {
            return Err(ConfigError::HotBelowMinimum {
                hot: self.hot_match_threshold,
                min: self.min_match_score,
            });
        }

        if self.max_distance_km <= 0.0 {
            return Err(ConfigError::MaxDistance(self.max_distance_km));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScoringConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!((config.weights.sum() - 1.0).abs() <= WEIGHT_TOLERANCE);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = ScoringConfig::default();
        config.weights.quality = 0.2;

        assert!(matches!(config.validate(), Err(ConfigError::WeightsSum(_))));
    }

    #[test]
    fn test_small_rounding_is_tolerated() {
        let mut config = ScoringConfig::default();
        config.weights.quality = 0.1005;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.skill = -0.1;
        config.weights.category = 0.6;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightOutOfRange("skill", _))
        ));
    }

    #[test]
    fn test_tiers_must_increase() {
        let mut config = ScoringConfig::default();
        config.proximity_tiers.city_km = 15.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::TiersNotIncreasing(_))
        ));
    }

    #[test]
    fn test_hot_threshold_below_minimum_rejected() {
        let mut config = ScoringConfig::default();
        config.hot_match_threshold = 30.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::HotBelowMinimum { .. })
        ));
    }

    #[test]
    fn test_freshness_floor_out_of_range_rejected() {
        let mut config = ScoringConfig::default();
        config.freshness.floor = 1.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Freshness("floor", _))
        ));
    }
}
