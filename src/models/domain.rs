use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TenantId = i64;
pub type UserId = i64;
pub type ListingId = i64;
pub type CategoryId = i64;

/// Whether a listing offers something or asks for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Offer,
    Request,
}

impl ListingKind {
    /// The kind a counterpart listing must have
    pub fn opposite(self) -> Self {
        match self {
            ListingKind::Offer => ListingKind::Request,
            ListingKind::Request => ListingKind::Offer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::Offer => "offer",
            ListingKind::Request => "request",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offer" => Ok(ListingKind::Offer),
            "request" => Ok(ListingKind::Request),
            other => Err(format!("unknown listing kind: {}", other)),
        }
    }
}

/// A single offer or request posted by a user
///
/// The author fields are denormalized from the owning user so that quality
/// and proximity can be scored without another lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub kind: ListingKind,
    #[serde(rename = "categoryId", default)]
    pub category_id: Option<CategoryId>,
    #[serde(rename = "categoryName", default)]
    pub category_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(rename = "authorLatitude", default)]
    pub author_latitude: Option<f64>,
    #[serde(rename = "authorLongitude", default)]
    pub author_longitude: Option<f64>,
    #[serde(rename = "authorVerified", default)]
    pub author_verified: bool,
    #[serde(rename = "authorRating", default)]
    pub author_rating: Option<f64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Listing coordinates, falling back to the author's coordinates
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => match (self.author_latitude, self.author_longitude) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            },
        }
    }

    /// Title and description joined, for keyword extraction
    pub fn text(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {}", self.title, description),
            None => self.title.clone(),
        }
    }
}

/// Location and skills of the user matches are computed for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLocationProfile {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub skills: String,
}

impl UserLocationProfile {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    OneWay,
    Mutual,
}

/// Per-component sub-scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub proximity: f64,
    pub freshness: f64,
    pub category: f64,
    pub skill: f64,
    pub quality: f64,
}

impl ScoreBreakdown {
    /// Component name and value pairs, in weight order
    pub fn components(&self) -> [(&'static str, f64); 5] {
        [
            ("proximity", self.proximity),
            ("freshness", self.freshness),
            ("category", self.category),
            ("skill", self.skill),
            ("quality", self.quality),
        ]
    }
}

/// Outcome of scoring one candidate listing against one of the user's listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: Vec<String>,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "candidateListingId")]
    pub candidate_listing_id: ListingId,
    #[serde(rename = "candidateUserId")]
    pub candidate_user_id: UserId,
    #[serde(rename = "candidateCategoryId")]
    pub candidate_category_id: Option<CategoryId>,
    #[serde(rename = "candidateCreatedAt")]
    pub candidate_created_at: DateTime<Utc>,
    #[serde(rename = "sourceListingId")]
    pub source_listing_id: ListingId,
    #[serde(rename = "matchedListingTitle")]
    pub matched_listing_title: String,
}

impl MatchResult {
    pub fn is_mutual(&self) -> bool {
        self.match_type == MatchType::Mutual
    }
}
