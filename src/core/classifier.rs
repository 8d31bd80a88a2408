use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::core::scoring::ScoreCalculator;
use crate::models::{Listing, MatchResult, MatchType, MatchesByType, UserId, UserLocationProfile};

pub const MUTUAL_REASON: &str = "Mutual exchange possible!";

/// Profile and listings of a candidate's owner, for reverse scoring
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub profile: UserLocationProfile,
    pub listings: Vec<Listing>,
}

/// Derives hot, good and mutual tiers from scored matches
#[derive(Debug, Clone, Copy)]
pub struct MatchClassifier {
    hot_threshold: f64,
    min_score: f64,
}

impl MatchClassifier {
    pub fn new(hot_threshold: f64, min_score: f64) -> Self {
        Self {
            hot_threshold,
            min_score,
        }
    }

    pub fn from_calculator(calculator: &ScoreCalculator) -> Self {
        let config = calculator.config();
        Self::new(config.hot_match_threshold, config.min_match_score)
    }

    #[inline]
    pub fn is_hot(&self, result: &MatchResult) -> bool {
        result.score >= self.hot_threshold
    }

    #[inline]
    pub fn is_good(&self, result: &MatchResult) -> bool {
        result.score >= self.min_score && result.score < self.hot_threshold
    }

    /// Mark matches whose owner independently matches the user back
    ///
    /// Both directions must reach the configured minimum match score, whatever
    /// threshold the forward lookup was run with. For a match of the user's
    /// listing `s` with candidate `c`, the owner of `c` must have a listing of
    /// the same kind as `s` that, scored from the owner's side against one of
    /// the user's listings, reaches that minimum. Matches whose owner is
    /// missing from `owners` stay one-way.
    pub fn mark_mutual(
        &self,
        calculator: &ScoreCalculator,
        user_listings: &[Listing],
        matches: &mut [MatchResult],
        owners: &HashMap<UserId, OwnerContext>,
        now: DateTime<Utc>,
    ) {
        for result in matches.iter_mut() {
            let Some(source) = user_listings.iter().find(|l| l.id == result.source_listing_id) else {
                continue;
            };
            let Some(owner) = owners.get(&result.candidate_user_id) else {
                continue;
            };

            if result.score >= self.min_score
                && self.reverse_match_exists(calculator, source, user_listings, owner, now)
            {
                result.match_type = MatchType::Mutual;
                if !result.reasons.iter().any(|r| r == MUTUAL_REASON) {
                    result.reasons.push(MUTUAL_REASON.to_string());
                }
            } else {
                result.match_type = MatchType::OneWay;
            }
        }
    }

    fn reverse_match_exists(
        &self,
        calculator: &ScoreCalculator,
        source: &Listing,
        user_listings: &[Listing],
        owner: &OwnerContext,
        now: DateTime<Utc>,
    ) -> bool {
        owner
            .listings
            .iter()
            .filter(|owner_listing| owner_listing.kind == source.kind)
            .any(|owner_listing| {
                let wanted = owner_listing.kind.opposite();
                user_listings
                    .iter()
                    .filter(|mine| mine.kind == wanted)
                    .any(|mine| {
                        calculator
                            .calculate_match_score(&owner.profile, owner_listing, mine, now)
                            .score
                            >= self.min_score
                    })
            })
    }

    /// Group ranked matches into tiers, preserving order within each
    pub fn group(&self, matches: Vec<MatchResult>) -> MatchesByType {
        let hot = matches.iter().filter(|m| self.is_hot(m)).cloned().collect();
        let good = matches.iter().filter(|m| self.is_good(m)).cloned().collect();
        let mutual = matches.iter().filter(|m| m.is_mutual()).cloned().collect();

        MatchesByType {
            hot,
            good,
            mutual,
            all: matches,
        }
    }
}
