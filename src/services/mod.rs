// Service exports
pub mod cache;
pub mod engine;
pub mod postgres;
pub mod redis_store;
pub mod repository;

pub use cache::{CacheEntry, CacheError, CacheKey, CacheStore, CategoryDeps, MatchCache, MatchScope, MemoryStore};
pub use engine::{EngineError, MatchingEngine, MUTUAL_POOL_SIZE};
pub use postgres::PgRepository;
pub use redis_store::RedisStore;
pub use repository::{InMemoryRepository, ListingRepository, ProfileRepository, RepositoryError};
