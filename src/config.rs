use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::{FreshnessSettings, ProximityTiers, ScoringConfig, ScoringWeights, TenantId};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    /// L2 backend; the in-process store is used when unset
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn l1_size(&self) -> u64 {
        self.l1_cache_size.unwrap_or(1000)
    }
}

/// Seven days
const DEFAULT_CACHE_TTL_SECS: u64 = 604_800;

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSettings {
    #[serde(default)]
    pub tenants: Vec<TenantId>,
    #[serde(default = "default_warm_up_batch")]
    pub warm_up_batch: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            tenants: Vec::new(),
            warm_up_batch: default_warm_up_batch(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_warm_up_batch() -> usize { 50 }
fn default_interval_secs() -> u64 { 900 }

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
    #[serde(default = "default_min_match_score")]
    pub min_match_score: f64,
    #[serde(default = "default_hot_match_threshold")]
    pub hot_match_threshold: f64,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_distance_km: default_max_distance_km(),
            min_match_score: default_min_match_score(),
            hot_match_threshold: default_hot_match_threshold(),
            weights: WeightsConfig::default(),
            proximity: ProximityConfig::default(),
            freshness: FreshnessConfig::default(),
        }
    }
}

fn default_enabled() -> bool { true }
fn default_max_distance_km() -> f64 { 50.0 }
fn default_min_match_score() -> f64 { 40.0 }
fn default_hot_match_threshold() -> f64 { 80.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_proximity_weight")]
    pub proximity: f64,
    #[serde(default = "default_freshness_weight")]
    pub freshness: f64,
    #[serde(default = "default_category_weight")]
    pub category: f64,
    #[serde(default = "default_skill_weight")]
    pub skill: f64,
    #[serde(default = "default_quality_weight")]
    pub quality: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            proximity: default_proximity_weight(),
            freshness: default_freshness_weight(),
            category: default_category_weight(),
            skill: default_skill_weight(),
            quality: default_quality_weight(),
        }
    }
}

fn default_proximity_weight() -> f64 { 0.30 }
fn default_freshness_weight() -> f64 { 0.10 }
fn default_category_weight() -> f64 { 0.30 }
fn default_skill_weight() -> f64 { 0.20 }
fn default_quality_weight() -> f64 { 0.10 }

#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_walking_km")]
    pub walking_km: f64,
    #[serde(default = "default_local_km")]
    pub local_km: f64,
    #[serde(default = "default_city_km")]
    pub city_km: f64,
    #[serde(default = "default_regional_km")]
    pub regional_km: f64,
    #[serde(default = "default_max_km")]
    pub max_km: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            walking_km: default_walking_km(),
            local_km: default_local_km(),
            city_km: default_city_km(),
            regional_km: default_regional_km(),
            max_km: default_max_km(),
        }
    }
}

fn default_walking_km() -> f64 { 5.0 }
fn default_local_km() -> f64 { 15.0 }
fn default_city_km() -> f64 { 30.0 }
fn default_regional_km() -> f64 { 50.0 }
fn default_max_km() -> f64 { 100.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct FreshnessConfig {
    #[serde(default = "default_full_hours")]
    pub full_hours: f64,
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    #[serde(default = "default_freshness_floor")]
    pub floor: f64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            full_hours: default_full_hours(),
            half_life_days: default_half_life_days(),
            floor: default_freshness_floor(),
        }
    }
}

fn default_full_hours() -> f64 { 24.0 }
fn default_half_life_days() -> f64 { 14.0 }
fn default_freshness_floor() -> f64 { 0.3 }

impl ScoringSettings {
    /// Scoring configuration for the engine; validated when the engine is built
    pub fn to_scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            enabled: self.enabled,
            max_distance_km: self.max_distance_km,
            min_match_score: self.min_match_score,
            hot_match_threshold: self.hot_match_threshold,
            weights: ScoringWeights {
                proximity: self.weights.proximity,
                freshness: self.weights.freshness,
                category: self.weights.category,
                skill: self.weights.skill,
                quality: self.weights.quality,
            },
            proximity_tiers: ProximityTiers {
                walking_km: self.proximity.walking_km,
                local_km: self.proximity.local_km,
                city_km: self.proximity.city_km,
                regional_km: self.proximity.regional_km,
                max_km: self.proximity.max_km,
            },
            freshness: FreshnessSettings {
                full_hours: self.freshness.full_hours,
                half_life_days: self.freshness.half_life_days,
                floor: self.freshness.floor,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with MATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., MATCH__CACHE__TTL_SECS -> cache.ttl_secs
            .add_source(environment())
            .build()?;

        // DATABASE_URL wins over the file, as in most deployment tooling
        let settings = match std::env::var("DATABASE_URL") {
            Ok(url) => Config::builder()
                .add_source(settings)
                .set_override("database.url", url)?
                .build()?,
            Err(_) => settings,
        };

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("MATCH")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("maintenance.tenants")
        .try_parsing(true)
}
