use crate::models::ProximityTiers;

/// Score given to listings whose distance cannot be computed, and the lowest
/// score any known distance can reach
pub const UNKNOWN_DISTANCE_SCORE: f64 = 0.05;

/// Scores at the outer edge of each tier
const LOCAL_EDGE: f64 = 0.9;
const CITY_EDGE: f64 = 0.7;
const REGIONAL_EDGE: f64 = 0.5;
const MAX_EDGE: f64 = 0.1;

/// Calculate proximity score (0-1)
///
/// Piecewise linear between tier boundaries:
/// walking -> 1.0, local -> 0.9, city -> 0.7, regional -> 0.5, max -> 0.1,
/// then `0.1 * max / d` beyond `max_km`, never below [`UNKNOWN_DISTANCE_SCORE`].
pub fn proximity_score(distance_km: Option<f64>, tiers: &ProximityTiers) -> f64 {
    let distance = match distance_km {
        Some(d) if d.is_finite() => d.max(0.0),
        _ => return UNKNOWN_DISTANCE_SCORE,
    };

    if distance <= tiers.walking_km {
        return 1.0;
    }

    let segments = [
        (tiers.walking_km, tiers.local_km, 1.0, LOCAL_EDGE),
        (tiers.local_km, tiers.city_km, LOCAL_EDGE, CITY_EDGE),
        (tiers.city_km, tiers.regional_km, CITY_EDGE, REGIONAL_EDGE),
        (tiers.regional_km, tiers.max_km, REGIONAL_EDGE, MAX_EDGE),
    ];

    for (start, end, high, low) in segments {
        if distance <= end {
            let ratio = (distance - start) / (end - start);
            return high - ratio * (high - low);
        }
    }

    (MAX_EDGE * tiers.max_km / distance).max(UNKNOWN_DISTANCE_SCORE)
}
