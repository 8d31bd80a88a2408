use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::scoring::ScoreCalculator;
use crate::models::{FindMatchesOptions, Listing, ListingId, MatchResult, ScoringConfig, UserId, UserLocationProfile};

/// Ranked matches plus how many candidates were considered
#[derive(Debug)]
pub struct MatchSet {
    pub matches: Vec<MatchResult>,
    pub total_candidates: usize,
}

/// The user side of a match lookup
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub user_id: UserId,
    pub profile: &'a UserLocationProfile,
    pub listings: &'a [Listing],
}

/// Ranking pipeline for one user's listings against candidate listings
///
/// # Pipeline Stages
/// 1. Pair each user listing with opposite-kind candidates owned by others
/// 2. Score every pair in parallel
/// 3. Distance and score filtering
/// 4. Keep the best pair per candidate, sort and limit
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    calculator: ScoreCalculator,
}

impl Matcher {
    pub fn new(calculator: ScoreCalculator) -> Self {
        Self { calculator }
    }

    pub fn calculator(&self) -> &ScoreCalculator {
        &self.calculator
    }

    pub fn config(&self) -> &ScoringConfig {
        self.calculator.config()
    }

    /// Find and rank matches for a user
    ///
    /// # Arguments
    /// * `context` - The user's profile and own listings
    /// * `candidates` - Candidate listings from the listing repository
    /// * `options` - Filters; unset values fall back to the scoring config
    /// * `now` - Reference time for freshness
    ///
    /// # Returns
    /// MatchSet sorted by score descending, then newer candidate, then closer
    pub fn find_matches(
        &self,
        context: MatchContext<'_>,
        candidates: &[Listing],
        options: &FindMatchesOptions,
        now: DateTime<Utc>,
    ) -> MatchSet {
        let config = self.config();
        let max_distance = options.max_distance_km.unwrap_or(config.max_distance_km);
        let min_score = options.min_score.unwrap_or(config.min_match_score);
        let limit = options.limit();

        let eligible: Vec<&Listing> = candidates
            .iter()
            .filter(|candidate| candidate.user_id != context.user_id)
            .filter(|candidate| match &options.categories {
                Some(categories) if !categories.is_empty() => candidate
                    .category_id
                    .is_some_and(|id| categories.contains(&id)),
                _ => true,
            })
            .collect();
        let total_candidates = eligible.len();

        // Stage 1: pair each of the user's listings with the opposite kind
        let eligible_ref = &eligible;
        let pairs: Vec<(&Listing, &Listing)> = context
            .listings
            .iter()
            .flat_map(move |source| {
                let wanted = source.kind.opposite();
                eligible_ref
                    .iter()
                    .filter(move |candidate| candidate.kind == wanted)
                    .map(move |candidate| (source, *candidate))
            })
            .collect();

        // Stage 2 & 3: filter on exact distance, score in parallel, filter on score
        let scored: Vec<MatchResult> = pairs
            .into_par_iter()
            .filter(|(source, candidate)| {
                self.calculator
                    .distance_km(context.profile, source, candidate)
                    .map_or(true, |d| d <= max_distance)
            })
            .map(|(source, candidate)| {
                self.calculator
                    .calculate_match_score(context.profile, source, candidate, now)
            })
            .filter(|result| result.score >= min_score)
            .collect();

        // Stage 4: best pair per candidate
        let mut best: HashMap<ListingId, MatchResult> = HashMap::with_capacity(scored.len());
        for result in scored {
            match best.get(&result.candidate_listing_id) {
                Some(existing) if !is_better_pair(&result, existing) => {}
                _ => {
                    best.insert(result.candidate_listing_id, result);
                }
            }
        }

        let mut matches: Vec<MatchResult> = best.into_values().collect();
        matches.sort_by(rank_order);
        matches.truncate(limit);

        tracing::debug!(
            user_id = context.user_id,
            candidates = total_candidates,
            matches = matches.len(),
            "ranked matches"
        );

        MatchSet {
            matches,
            total_candidates,
        }
    }
}

fn is_better_pair(challenger: &MatchResult, existing: &MatchResult) -> bool {
    challenger.score > existing.score
        || (challenger.score == existing.score
            && challenger.source_listing_id < existing.source_listing_id)
}

/// Ordering of ranked matches: score descending, newer candidate first,
/// closer first with unknown distance last, then candidate id
pub fn rank_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.candidate_created_at.cmp(&a.candidate_created_at))
        .then_with(|| match (a.distance_km, b.distance_km) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.candidate_listing_id.cmp(&b.candidate_listing_id))
}
