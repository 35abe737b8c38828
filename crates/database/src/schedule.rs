//! Per-tenant schedule configuration and dialing windows.
//!
//! The config row is also the tenant's wallet serialization point: balance
//! writes go through [`apply_balance`] inside the same transaction that
//! appends the ledger entry.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{DatabaseError, Result};
use crate::models::{ScheduleConfig, ScheduleWindow};

const CONFIG_COLUMNS: &str = r#"
    id, tenant_id, enabled, disabled_by_dialer, skip_holidays,
    wallet_balance, cost_per_connected, version, updated_at
"#;

/// Get the schedule config for a tenant.
pub async fn get_config(pool: &SqlitePool, tenant_id: i64) -> Result<ScheduleConfig> {
    sqlx::query_as::<_, ScheduleConfig>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM schedule_configs WHERE tenant_id = ?"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "ScheduleConfig",
        id: tenant_id.to_string(),
    })
}

/// Get the schedule config for a tenant, creating a default row on first
/// use. A fresh tenant starts enabled with a zero balance, so dispatch
/// blocks on missing windows or funds rather than erroring.
pub async fn get_or_create_config(pool: &SqlitePool, tenant_id: i64) -> Result<ScheduleConfig> {
    if let Some(config) = sqlx::query_as::<_, ScheduleConfig>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM schedule_configs WHERE tenant_id = ?"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(config);
    }

    sqlx::query(
        r#"
        INSERT INTO schedule_configs (tenant_id, updated_at)
        VALUES (?, ?)
        ON CONFLICT (tenant_id) DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    get_config(pool, tenant_id).await
}

/// Partial schedule config update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub enabled: Option<bool>,
    pub skip_holidays: Option<bool>,
    pub cost_per_connected: Option<i64>,
}

/// Apply a config update, bumping `version` so polling dialers reload.
pub async fn update_config(
    pool: &SqlitePool,
    tenant_id: i64,
    update: &ScheduleUpdate,
) -> Result<ScheduleConfig> {
    let updated = sqlx::query(
        r#"
        UPDATE schedule_configs
        SET enabled = COALESCE(?, enabled),
            skip_holidays = COALESCE(?, skip_holidays),
            cost_per_connected = COALESCE(?, cost_per_connected),
            version = version + 1,
            updated_at = ?
        WHERE tenant_id = ?
        "#,
    )
    .bind(update.enabled)
    .bind(update.skip_holidays)
    .bind(update.cost_per_connected)
    .bind(Utc::now())
    .bind(tenant_id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ScheduleConfig",
            id: tenant_id.to_string(),
        });
    }

    get_config(pool, tenant_id).await
}

/// System-set override used when the dialer hardware takes a tenant
/// offline. Separate from the operator's `enabled` flag.
pub async fn set_disabled_by_dialer(
    pool: &SqlitePool,
    tenant_id: i64,
    disabled: bool,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE schedule_configs
        SET disabled_by_dialer = ?, version = version + 1, updated_at = ?
        WHERE tenant_id = ?
        "#,
    )
    .bind(disabled)
    .bind(Utc::now())
    .bind(tenant_id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ScheduleConfig",
            id: tenant_id.to_string(),
        });
    }
    Ok(())
}

/// Open a ledger transaction. IMMEDIATE takes the write lock before the
/// balance read; a deferred transaction that reads the config row and
/// then writes it deadlocks against a concurrent writer on the lock
/// upgrade, while immediate writers queue on the busy timeout.
pub async fn begin_ledger_tx(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Read the config inside a ledger transaction.
pub async fn get_config_tx(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: i64,
) -> Result<ScheduleConfig> {
    sqlx::query_as::<_, ScheduleConfig>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM schedule_configs WHERE tenant_id = ?"
    ))
    .bind(tenant_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "ScheduleConfig",
        id: tenant_id.to_string(),
    })
}

/// Write the new wallet balance inside a ledger transaction, bumping
/// `version` in the same statement.
pub async fn apply_balance(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: i64,
    new_balance: i64,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE schedule_configs
        SET wallet_balance = ?, version = version + 1, updated_at = ?
        WHERE tenant_id = ?
        "#,
    )
    .bind(new_balance)
    .bind(Utc::now())
    .bind(tenant_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ScheduleConfig",
            id: tenant_id.to_string(),
        });
    }
    Ok(())
}

/// A window to store, in minutes since local midnight.
#[derive(Debug, Clone)]
pub struct NewWindow {
    pub day_of_week: i64,
    pub start_min: i64,
    pub end_min: i64,
}

/// Replace a tenant's dialing windows wholesale.
pub async fn replace_windows(
    pool: &SqlitePool,
    tenant_id: i64,
    windows: &[NewWindow],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM schedule_windows WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    for w in windows {
        sqlx::query(
            r#"
            INSERT INTO schedule_windows (tenant_id, day_of_week, start_min, end_min)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(w.day_of_week)
        .bind(w.start_min)
        .bind(w.end_min)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// All windows for a tenant, ordered by day then start.
pub async fn list_windows(pool: &SqlitePool, tenant_id: i64) -> Result<Vec<ScheduleWindow>> {
    let windows = sqlx::query_as::<_, ScheduleWindow>(
        r#"
        SELECT id, tenant_id, day_of_week, start_min, end_min
        FROM schedule_windows
        WHERE tenant_id = ?
        ORDER BY day_of_week, start_min
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(windows)
}
