use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::models::{CacheStats, CategoryId, FindMatchesOptions, TenantId, UserId};

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value backend holding cache entries and their dependency indexes
///
/// Indexes are sets of entry keys, used to find every entry that depends on
/// a user or a category.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete entries or indexes, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;

    async fn index_add(&self, index: &str, member: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn index_members(&self, index: &str) -> Result<Vec<String>, CacheError>;

    /// Delete every entry and index whose key starts with `prefix`,
    /// returning the number of entries removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Drop entries past their expiry, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, CacheError>;
}

/// What a cached match set was computed for
#[derive(Debug, Clone, PartialEq)]
pub enum MatchScope {
    Find(FindMatchesOptions),
    Hot { limit: usize },
    Mutual { limit: usize },
    ByType,
}

impl MatchScope {
    pub fn key_part(&self) -> String {
        match self {
            MatchScope::Find(options) => format!("find:{}", options.fingerprint()),
            MatchScope::Hot { limit } => format!("hot:{}", limit),
            MatchScope::Mutual { limit } => format!("mutual:{}", limit),
            MatchScope::ByType => "by_type".to_string(),
        }
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for a user's match set
    pub fn matches(tenant: TenantId, user_id: UserId, scope: &MatchScope) -> String {
        format!("match:{}:{}:{}", tenant, user_id, scope.key_part())
    }

    /// Index of every match set cached for a user
    pub fn user_index(tenant: TenantId, user_id: UserId) -> String {
        format!("match-idx:user:{}:{}", tenant, user_id)
    }

    /// Index of every match set that depends on a category
    pub fn category_index(tenant: TenantId, category_id: CategoryId) -> String {
        format!("match-idx:cat:{}:{}", tenant, category_id)
    }

    /// Index of every match set that depends on all categories of a tenant
    pub fn any_category_index(tenant: TenantId) -> String {
        format!("match-idx:cat:{}:any", tenant)
    }

    /// Prefixes covering all entries and indexes of a tenant
    pub fn tenant_prefixes(tenant: TenantId) -> [String; 3] {
        [
            format!("match:{}:", tenant),
            format!("match-idx:user:{}:", tenant),
            format!("match-idx:cat:{}:", tenant),
        ]
    }
}

/// Categories whose listing changes can alter a cached match set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryDeps {
    /// Only listings in these categories can change the set
    Only(Vec<CategoryId>),
    /// A listing in any category can change the set
    Any,
}

impl CategoryDeps {
    pub fn none() -> Self {
        CategoryDeps::Only(Vec::new())
    }
}

/// A stored match set with its lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Two-tier match cache
///
/// L1 is an in-process moka cache, L2 is a shared [`CacheStore`]. Every
/// backend failure is logged and treated as a miss, so callers always get
/// a correct (if uncached) result.
pub struct MatchCache {
    store: Arc<dyn CacheStore>,
    l1_cache: moka::future::Cache<String, String>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl MatchCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        l1_size: u64,
        default_ttl: Duration,
    ) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(default_ttl)
            .build();

        Self {
            store,
            l1_cache,
            clock,
            default_ttl,
        }
    }

    /// Cache backed by a [`MemoryStore`] sharing the same clock
    pub fn in_memory(clock: Arc<dyn Clock>, l1_size: u64, default_ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(store, clock, l1_size, default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a cached match set (L1 first, then L2)
    pub async fn get<T>(&self, tenant: TenantId, user_id: UserId, scope: &MatchScope) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = CacheKey::matches(tenant, user_id, scope);
        let now = self.clock.now();

        if let Some(json) = self.l1_cache.get(&key).await {
            match self.decode::<T>(&key, &json, now) {
                Some(value) => {
                    tracing::trace!("L1 cache hit: {}", key);
                    return Some(value);
                }
                None => self.l1_cache.invalidate(&key).await,
            }
        }

        let json = match self.store.get(&key).await {
            Ok(Some(json)) => json,
            Ok(None) => {
                tracing::trace!("Cache miss: {}", key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Cache backend {} unavailable on get {}: {}", self.store.name(), key, e);
                return None;
            }
        };

        let value = self.decode::<T>(&key, &json, now)?;
        tracing::trace!("L2 cache hit: {}", key);
        self.l1_cache.insert(key, json).await;
        Some(value)
    }

    /// Store a match set, recording the categories it depends on
    ///
    /// Returns whether the entry was stored. If its dependency indexes cannot
    /// be written the entry is removed again, so invalidation never misses it.
    pub async fn put<T>(
        &self,
        tenant: TenantId,
        user_id: UserId,
        scope: &MatchScope,
        value: &T,
        categories: &CategoryDeps,
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return false;
        }

        let key = CacheKey::matches(tenant, user_id, scope);
        let json = match self.encode(&key, value, ttl) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return false;
            }
        };

        if let Err(e) = self.store.set(&key, json.clone(), ttl).await {
            tracing::warn!("Cache backend {} unavailable on set {}: {}", self.store.name(), key, e);
            return false;
        }

        let mut indexes = vec![CacheKey::user_index(tenant, user_id)];
        match categories {
            CategoryDeps::Any => indexes.push(CacheKey::any_category_index(tenant)),
            CategoryDeps::Only(ids) => {
                let mut seen = HashSet::new();
                indexes.extend(
                    ids.iter()
                        .filter(|id| seen.insert(**id))
                        .map(|id| CacheKey::category_index(tenant, *id)),
                );
            }
        }

        for index in &indexes {
            if let Err(e) = self.store.index_add(index, &key, ttl).await {
                tracing::warn!("Failed to index cache entry {} under {}: {}", key, index, e);
                if let Err(e) = self.store.delete(&[key.clone()]).await {
                    tracing::warn!("Failed to roll back cache entry {}: {}", key, e);
                }
                return false;
            }
        }

        self.l1_cache.insert(key.clone(), json).await;
        tracing::trace!("Cache set: {} ({} indexes)", key, indexes.len());
        true
    }

    /// Drop every cached match set of a user
    pub async fn invalidate_for_user(&self, tenant: TenantId, user_id: UserId) -> usize {
        let removed = self.invalidate_indexes(&[CacheKey::user_index(tenant, user_id)]).await;
        tracing::debug!("Invalidated {} cache entries for user {}", removed, user_id);
        removed
    }

    /// Drop every cached match set that depends on a category
    ///
    /// Sets that depend on every category are dropped too.
    pub async fn invalidate_for_category(&self, tenant: TenantId, category_id: CategoryId) -> usize {
        let indexes = [
            CacheKey::category_index(tenant, category_id),
            CacheKey::any_category_index(tenant),
        ];
        let removed = self.invalidate_indexes(&indexes).await;
        tracing::debug!("Invalidated {} cache entries for category {}", removed, category_id);
        removed
    }

    async fn invalidate_indexes(&self, indexes: &[String]) -> usize {
        // L1 has no dependency index, clear it all
        self.l1_cache.invalidate_all();

        let mut keys = HashSet::new();
        for index in indexes {
            match self.store.index_members(index).await {
                Ok(members) => keys.extend(members),
                Err(e) => {
                    tracing::warn!("Cache backend {} unavailable on invalidate {}: {}", self.store.name(), index, e);
                    return 0;
                }
            }
        }

        let keys: Vec<String> = keys.into_iter().collect();
        let removed = match self.store.delete(&keys).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Cache backend {} failed to delete entries of {:?}: {}", self.store.name(), indexes, e);
                return 0;
            }
        };

        if let Err(e) = self.store.delete(indexes).await {
            tracing::warn!("Cache backend {} failed to delete indexes {:?}: {}", self.store.name(), indexes, e);
        }

        removed
    }

    /// Sweep entries past their expiry
    pub async fn clear_expired(&self) -> usize {
        self.l1_cache.run_pending_tasks().await;

        match self.store.purge_expired().await {
            Ok(removed) => {
                tracing::debug!("Cleared {} expired cache entries", removed);
                removed
            }
            Err(e) => {
                tracing::warn!("Cache backend {} unavailable on expiry sweep: {}", self.store.name(), e);
                0
            }
        }
    }

    /// Drop every cached match set of a tenant
    pub async fn clear(&self, tenant: TenantId) -> usize {
        self.l1_cache.invalidate_all();

        let mut removed = 0;
        for prefix in CacheKey::tenant_prefixes(tenant) {
            match self.store.delete_prefix(&prefix).await {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::warn!("Cache backend {} unavailable on clear {}: {}", self.store.name(), prefix, e);
                }
            }
        }

        tracing::info!("Cleared {} cache entries for tenant {}", removed, tenant);
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            backend: self.store.name().to_string(),
        }
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<String, CacheError> {
        let created_at = self.clock.now();
        let lifetime = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let expires_at = created_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CacheEntry {
            key: key.to_string(),
            payload: serde_json::to_string(value)?,
            created_at,
            expires_at,
        };

        Ok(serde_json::to_string(&entry)?)
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, json: &str, now: DateTime<Utc>) -> Option<T> {
        let entry: CacheEntry = match serde_json::from_str(json) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.is_expired(now) {
            tracing::trace!("Cache entry expired: {}", key);
            return None;
        }

        match serde_json::from_str(&entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding unreadable cache payload {}: {}", key, e);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, (String, DateTime<Utc>)>,
    indexes: HashMap<String, HashSet<String>>,
}

/// In-process [`CacheStore`] with explicit expiry sweeps
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let state = self.state.read().await;

        Ok(state
            .entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let lifetime = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut state = self.state.write().await;
        state.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut state = self.state.write().await;
        let mut removed = 0;

        for key in keys {
            if state.entries.remove(key).is_some() {
                removed += 1;
            }
            if state.indexes.remove(key).is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn index_add(&self, index: &str, member: &str, _ttl: Duration) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        Ok(state
            .indexes
            .get(index)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut state = self.state.write().await;

        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        state.indexes.retain(|key, _| !key.starts_with(prefix));

        Ok(before - state.entries.len())
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let before = state.entries.len();
        state.entries.retain(|_, (_, expires_at)| *expires_at > now);
        let removed = before - state.entries.len();

        // Drop index members that point at entries which no longer exist
        let MemoryState { entries, indexes } = &mut *state;
        for members in indexes.values_mut() {
            members.retain(|key| entries.contains_key(key));
        }
        indexes.retain(|_, members| !members.is_empty());

        Ok(removed)
    }
}
