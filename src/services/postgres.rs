use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;

use crate::models::{CategoryId, Listing, ListingKind, MatchPreferences, TenantId, UserId, UserLocationProfile};
use crate::services::repository::{ListingRepository, ProfileRepository, RepositoryError};

const LISTING_COLUMNS: &str = r#"
    l.id, l.user_id, l.type, l.category_id, c.name AS category_name,
    l.title, l.description, l.latitude::FLOAT8 AS latitude, l.longitude::FLOAT8 AS longitude, l.image_url,
    u.latitude::FLOAT8 AS author_latitude, u.longitude::FLOAT8 AS author_longitude,
    COALESCE(u.is_verified, FALSE) AS author_verified,
    (SELECT AVG(r.rating)::FLOAT8 FROM reviews r WHERE r.receiver_id = u.id) AS author_rating,
    l.created_at
"#;

/// PostgreSQL-backed listing and profile repository
///
/// Reads the marketplace tables directly; every query is scoped by tenant
/// and only active listings are returned.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Create a new repository from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a new repository from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self, RepositoryError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(url, max_connections.unwrap_or(10), min_connections.unwrap_or(1)).await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, RepositoryError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

/// Optional tables (`match_preferences`, `user_blocks`) may not exist yet
fn is_undefined_table(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

fn listing_from_row(row: &PgRow) -> Result<Listing, RepositoryError> {
    let kind: String = row.try_get("type")?;
    let kind = kind.parse::<ListingKind>().map_err(RepositoryError::InvalidRow)?;

    Ok(Listing {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        image_url: row.try_get("image_url")?,
        author_latitude: row.try_get("author_latitude")?,
        author_longitude: row.try_get("author_longitude")?,
        author_verified: row.try_get("author_verified")?,
        author_rating: row.try_get("author_rating")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ListingRepository for PgRepository {
    async fn list_active_listings(
        &self,
        tenant: TenantId,
        kind: ListingKind,
        excluding_user: Option<UserId>,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {}
            FROM listings l
            JOIN users u ON l.user_id = u.id
            LEFT JOIN categories c ON l.category_id = c.id
            WHERE l.tenant_id = $1
              AND l.type = $2
              AND l.status = 'active'
              AND ($3::BIGINT IS NULL OR l.user_id <> $3)
            ORDER BY l.created_at DESC
            "#,
            LISTING_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(tenant)
            .bind(kind.as_str())
            .bind(excluding_user)
            .fetch_all(&self.pool)
            .await?;

        let listings = rows.iter().map(listing_from_row).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Loaded {} active {} listings for tenant {}", listings.len(), kind, tenant);

        Ok(listings)
    }

    async fn get_user_listings(&self, tenant: TenantId, user_id: UserId) -> Result<Vec<Listing>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {}
            FROM listings l
            JOIN users u ON l.user_id = u.id
            LEFT JOIN categories c ON l.category_id = c.id
            WHERE l.tenant_id = $1
              AND l.user_id = $2
              AND l.status = 'active'
            ORDER BY l.created_at DESC
            "#,
            LISTING_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(tenant)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(listing_from_row).collect()
    }

    async fn active_user_ids(&self, tenant: TenantId, limit: usize) -> Result<Vec<UserId>, RepositoryError> {
        let query = r#"
            SELECT u.id
            FROM users u
            JOIN listings l ON l.user_id = u.id AND l.status = 'active'
            WHERE u.tenant_id = $1
              AND u.status = 'active'
            GROUP BY u.id, u.last_login_at
            ORDER BY u.last_login_at DESC NULLS LAST, u.id
            LIMIT $2
        "#;

        let rows = sqlx::query(query)
            .bind(tenant)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<UserId, _>("id").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl ProfileRepository for PgRepository {
    async fn get_location_profile(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserLocationProfile>, RepositoryError> {
        let query = r#"
            SELECT id, latitude::FLOAT8 AS latitude, longitude::FLOAT8 AS longitude, COALESCE(skills, '') AS skills
            FROM users
            WHERE id = $1 AND tenant_id = $2
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<UserLocationProfile, RepositoryError> {
            Ok(UserLocationProfile {
                user_id: row.try_get("id")?,
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
                skills: row.try_get("skills")?,
            })
        })
        .transpose()
    }

    async fn get_match_preferences(
        &self,
        tenant: TenantId,
        user_id: UserId,
    ) -> Result<Option<MatchPreferences>, RepositoryError> {
        let query = r#"
            SELECT max_distance_km::FLOAT8 AS max_distance_km,
                   min_match_score::FLOAT8 AS min_match_score,
                   categories::TEXT AS categories
            FROM match_preferences
            WHERE user_id = $1 AND tenant_id = $2
        "#;

        let row = match sqlx::query(query)
            .bind(user_id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) if is_undefined_table(&e) => {
                tracing::debug!("match_preferences table missing, using defaults");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        row.map(|row| -> Result<MatchPreferences, RepositoryError> {
            let categories: Option<String> = row.try_get("categories")?;
            let categories = categories
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| serde_json::from_str::<Vec<CategoryId>>(&raw))
                .transpose()
                .map_err(|e| RepositoryError::InvalidRow(format!("categories: {}", e)))?;

            Ok(MatchPreferences {
                max_distance_km: row.try_get("max_distance_km")?,
                min_match_score: row.try_get("min_match_score")?,
                categories,
            })
        })
        .transpose()
    }

    async fn blocked_user_ids(&self, _tenant: TenantId, user_id: UserId) -> Result<HashSet<UserId>, RepositoryError> {
        let query = r#"
            SELECT blocked_user_id AS other_id FROM user_blocks WHERE user_id = $1
            UNION
            SELECT user_id AS other_id FROM user_blocks WHERE blocked_user_id = $1
        "#;

        let rows = match sqlx::query(query).bind(user_id).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => {
                tracing::debug!("user_blocks table missing, nobody is blocked");
                return Ok(HashSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        rows.iter()
            .map(|row| row.try_get::<UserId, _>("other_id").map_err(Into::into))
            .collect()
    }
}
