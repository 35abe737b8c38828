//! Tenant lookup and creation.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::Tenant;

/// Create a new tenant.
pub async fn create_tenant(pool: &SqlitePool, slug: &str, display_name: &str) -> Result<Tenant> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO tenants (slug, display_name, is_active, created_at, updated_at)
        VALUES (?, ?, 1, ?, ?)
        "#,
    )
    .bind(slug)
    .bind(display_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Tenant",
                    id: slug.to_string(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    get_tenant(pool, result.last_insert_rowid()).await
}

/// Get a tenant by ID.
pub async fn get_tenant(pool: &SqlitePool, id: i64) -> Result<Tenant> {
    sqlx::query_as::<_, Tenant>(
        r#"
        SELECT id, slug, display_name, is_active, created_at, updated_at
        FROM tenants
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Tenant",
        id: id.to_string(),
    })
}

/// Get an active tenant by slug. Inactive tenants are invisible to the
/// dialer, so they resolve as not found.
pub async fn get_active_by_slug(pool: &SqlitePool, slug: &str) -> Result<Tenant> {
    sqlx::query_as::<_, Tenant>(
        r#"
        SELECT id, slug, display_name, is_active, created_at, updated_at
        FROM tenants
        WHERE slug = ? AND is_active = 1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Tenant",
        id: slug.to_string(),
    })
}
