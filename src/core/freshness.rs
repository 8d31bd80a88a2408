use chrono::{DateTime, Utc};
use crate::models::FreshnessSettings;

/// Calculate freshness score (0-1) from a listing's creation time
///
/// Full score for the first `full_hours`, then exponential decay with the
/// configured half-life, never below `floor`. Timestamps in the future count
/// as brand new.
pub fn freshness_score(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: &FreshnessSettings,
) -> f64 {
    let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
    freshness_for_age(age_hours, settings)
}

/// Freshness score for an age expressed in hours
#[inline]
pub fn freshness_for_age(age_hours: f64, settings: &FreshnessSettings) -> f64 {
    if age_hours <= settings.full_hours {
        return 1.0;
    }

    let half_life_hours = settings.half_life_days * 24.0;
    let decay = 0.5_f64.powf((age_hours - settings.full_hours) / half_life_hours);

    decay.clamp(settings.floor, 1.0)
}
