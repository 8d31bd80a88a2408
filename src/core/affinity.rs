use std::collections::BTreeSet;

use crate::models::{CategoryId, Listing};

/// Category score when the categories differ or are unknown
pub const CATEGORY_MISMATCH_SCORE: f64 = 0.3;

/// Skill score when either side has no usable keywords
pub const NEUTRAL_SKILL_SCORE: f64 = 0.5;

/// Overlap ratios are boosted by this factor before capping at 1.0
const SKILL_OVERLAP_BOOST: f64 = 1.5;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "are", "was", "were", "been", "being", "have",
    "has", "had", "does", "did", "will", "would", "could", "should", "may", "might", "must",
    "shall", "can", "need", "you", "she", "they", "your", "his", "her", "its", "our", "their",
    "this", "that", "these", "those", "help", "looking", "want", "offer", "request",
];

/// Calculate category score (0-1)
///
/// An exact match of known categories scores 1.0; anything else scores
/// [`CATEGORY_MISMATCH_SCORE`] so near-category listings can still surface.
#[inline]
pub fn category_score(source: Option<CategoryId>, candidate: Option<CategoryId>) -> f64 {
    match (source, candidate) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => CATEGORY_MISMATCH_SCORE,
    }
}

/// Extract lowercase keywords from free text
///
/// Keeps purely alphabetic tokens of at least three letters that are not
/// stop words.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= MIN_KEYWORD_LEN && token.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|token| token.to_ascii_lowercase())
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Calculate skill score (0-1) between a user's skills and a candidate listing
///
/// Returns [`NEUTRAL_SKILL_SCORE`] when either side yields no keywords.
/// Otherwise the share of candidate keywords covered by the user's skills,
/// boosted and capped at 1.0.
pub fn skill_score(user_skills: &str, candidate: &Listing) -> f64 {
    let user_keywords = extract_keywords(user_skills);
    let candidate_keywords = extract_keywords(&candidate.text());

    keyword_overlap_score(&user_keywords, &candidate_keywords)
}

/// Overlap score between two keyword sets, neutral when either is empty
pub fn keyword_overlap_score(user: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f64 {
    if user.is_empty() || candidate.is_empty() {
        return NEUTRAL_SKILL_SCORE;
    }

    let shared = user.intersection(candidate).count() as f64;
    let ratio = shared / candidate.len() as f64;

    (ratio * SKILL_OVERLAP_BOOST).min(1.0)
}
