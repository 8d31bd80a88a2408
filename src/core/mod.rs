// Core algorithm exports
pub mod affinity;
pub mod classifier;
pub mod distance;
pub mod freshness;
pub mod matcher;
pub mod proximity;
pub mod quality;
pub mod scoring;

pub use affinity::{category_score, extract_keywords, skill_score};
pub use classifier::{MatchClassifier, OwnerContext};
pub use distance::haversine_distance;
pub use freshness::freshness_score;
pub use matcher::{MatchContext, MatchSet, Matcher};
pub use proximity::proximity_score;
pub use quality::quality_score;
pub use scoring::ScoreCalculator;
