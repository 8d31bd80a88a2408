use crate::models::Listing;

const BASE_SCORE: f64 = 0.5;
const SIGNAL_BONUS: f64 = 0.1;
const MIN_DESCRIPTION_CHARS: usize = 50;
const RATING_THRESHOLD: f64 = 4.0;

/// Calculate listing quality score (0-1)
///
/// Starts at 0.5 and adds 0.1 for each signal: a description of at least 50
/// characters, one of at least 100, an image, a verified author, and an
/// author rating of 4 or more. Missing signals add nothing.
pub fn quality_score(listing: &Listing) -> f64 {
    let mut signals = 0u32;

    let description_len = listing
        .description
        .as_deref()
        .map(|d| d.trim().chars().count())
        .unwrap_or(0);
    if description_len >= MIN_DESCRIPTION_CHARS {
        signals += 1;
    }
    if description_len >= MIN_DESCRIPTION_CHARS * 2 {
        signals += 1;
    }

    if listing
        .image_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
    {
        signals += 1;
    }

    if listing.author_verified {
        signals += 1;
    }

    if listing.author_rating.is_some_and(|rating| rating >= RATING_THRESHOLD) {
        signals += 1;
    }

    (BASE_SCORE + f64::from(signals) * SIGNAL_BONUS).min(1.0)
}
