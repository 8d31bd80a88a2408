use chrono::{DateTime, Utc};

use crate::core::{
    affinity::{category_score, skill_score},
    distance::haversine_distance,
    freshness::freshness_score,
    proximity::proximity_score,
    quality::quality_score,
};
use crate::models::{
    ConfigError, Listing, MatchResult, MatchType, ScoreBreakdown, ScoringConfig, UserLocationProfile,
};

/// Sub-scores at or above these thresholds produce a reason
const CATEGORY_REASON_MIN: f64 = 0.8;
const SKILL_REASON_MIN: f64 = 0.5;
const FRESHNESS_REASON_MIN: f64 = 0.9;
const QUALITY_REASON_MIN: f64 = 0.8;

/// Combines the sub-models into a single weighted score
///
/// Scoring formula:
/// score = round(100 * (
///     proximity * w_proximity +    # Closer = higher score
///     freshness * w_freshness +    # Newer = higher, floored
///     category  * w_category +     # Exact category = 1.0
///     skill     * w_skill +        # Keyword overlap with user skills
///     quality   * w_quality        # Completeness and trust signals
/// ))
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    config: ScoringConfig,
}

impl ScoreCalculator {
    /// Build a calculator, refusing configurations that violate an invariant
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `candidate` against the user's `source` listing
    ///
    /// Distance is measured from the user's profile location, falling back to
    /// the source listing's location. Missing coordinates, skills or
    /// categories degrade the matching sub-score; they never fail the call.
    /// The result is always `OneWay`; mutual detection is the classifier's job.
    pub fn calculate_match_score(
        &self,
        profile: &UserLocationProfile,
        source: &Listing,
        candidate: &Listing,
        now: DateTime<Utc>,
    ) -> MatchResult {
        let config = &self.config;
        let mut reasons = Vec::new();

        let category = category_score(source.category_id, candidate.category_id);
        if category >= CATEGORY_REASON_MIN {
            reasons.push(format!(
                "Same category: {}",
                candidate.category_name.as_deref().unwrap_or("General")
            ));
        }

        let skill = skill_score(&profile.skills, candidate);
        if skill > SKILL_REASON_MIN {
            reasons.push("Skills match your expertise".to_string());
        }

        let distance_km = self.distance_km(profile, source, candidate);
        let proximity = proximity_score(distance_km, &config.proximity_tiers);
        if let Some(distance) = distance_km {
            if distance <= config.proximity_tiers.walking_km {
                reasons.push(format!("Very close: {:.1} km away", distance));
            } else if distance <= config.proximity_tiers.local_km {
                reasons.push(format!("Nearby: {:.1} km away", distance));
            }
        }

        let freshness = freshness_score(candidate.created_at, now, &config.freshness);
        if freshness >= FRESHNESS_REASON_MIN {
            reasons.push("Posted recently".to_string());
        }

        let quality = quality_score(candidate);
        if quality >= QUALITY_REASON_MIN {
            reasons.push("Highly rated member".to_string());
        }

        let breakdown = ScoreBreakdown {
            proximity: proximity.clamp(0.0, 1.0),
            freshness: freshness.clamp(0.0, 1.0),
            category: category.clamp(0.0, 1.0),
            skill: skill.clamp(0.0, 1.0),
            quality: quality.clamp(0.0, 1.0),
        };

        MatchResult {
            score: self.weighted_score(&breakdown),
            breakdown,
            reasons,
            distance_km: distance_km.map(|d| (d * 10.0).round() / 10.0),
            match_type: MatchType::OneWay,
            candidate_listing_id: candidate.id,
            candidate_user_id: candidate.user_id,
            candidate_category_id: candidate.category_id,
            candidate_created_at: candidate.created_at,
            source_listing_id: source.id,
            matched_listing_title: source.title.clone(),
        }
    }

    /// Unrounded distance from the user to a candidate
    ///
    /// Measured from the profile location, falling back to the source
    /// listing's location.
    pub fn distance_km(&self, profile: &UserLocationProfile, source: &Listing, candidate: &Listing) -> Option<f64> {
        let origin = profile.coordinates().or_else(|| source.coordinates());
        haversine_distance(origin, candidate.coordinates())
    }

    /// Weighted sum of the breakdown on a 0-100 scale, rounded
    #[inline]
    pub fn weighted_score(&self, breakdown: &ScoreBreakdown) -> f64 {
        let weights = &self.config.weights;
        let total = breakdown.proximity * weights.proximity
            + breakdown.freshness * weights.freshness
            + breakdown.category * weights.category
            + breakdown.skill * weights.skill
            + breakdown.quality * weights.quality;

        (total * 100.0).round().clamp(0.0, 100.0)
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }
}
