//! Shared number pool: insertion, atomic batch reservation, attempt
//! finalization, bulk maintenance.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::call_result;
use crate::error::{DatabaseError, Result};
use crate::models::{CallStatus, GlobalStatus, Number};

const NUMBER_COLUMNS: &str = r#"
    id, phone_number, status, global_status, total_attempts,
    last_attempt_at, last_status_change_at,
    assigned_batch_id, assigned_at, assigned_agent_id,
    last_called_at, last_called_tenant_id,
    note, last_user_message, created_at, updated_at
"#;

/// Insert a number into the shared pool with default state.
pub async fn insert_number(pool: &SqlitePool, phone_number: &str) -> Result<Number> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO numbers (phone_number, status, global_status, total_attempts, created_at, updated_at)
        VALUES (?, 'IN_QUEUE', 'ACTIVE', 0, ?, ?)
        "#,
    )
    .bind(phone_number)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Number",
                    id: phone_number.to_string(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    get_number(pool, result.last_insert_rowid()).await
}

/// Get a number by ID.
pub async fn get_number(pool: &SqlitePool, id: i64) -> Result<Number> {
    sqlx::query_as::<_, Number>(&format!(
        "SELECT {NUMBER_COLUMNS} FROM numbers WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Number",
        id: id.to_string(),
    })
}

/// Get a number by its phone string.
pub async fn get_by_phone(pool: &SqlitePool, phone_number: &str) -> Result<Number> {
    sqlx::query_as::<_, Number>(&format!(
        "SELECT {NUMBER_COLUMNS} FROM numbers WHERE phone_number = ?"
    ))
    .bind(phone_number)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Number",
        id: phone_number.to_string(),
    })
}

/// Atomically claim up to `max_size` unreserved active numbers for a batch.
///
/// Selection and claim happen in a single UPDATE so concurrent calls
/// partition the pool: a row claimed here is invisible to every other
/// reservation until its result is reported or it is reset. Candidates
/// are ordered least-recently-called first (never-called rows first) to
/// spread load fairly across tenants.
pub async fn reserve_batch(
    pool: &SqlitePool,
    tenant_id: i64,
    batch_id: &str,
    max_size: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Number>> {
    let claimed = sqlx::query(
        r#"
        UPDATE numbers
        SET assigned_batch_id = ?,
            assigned_at = ?,
            last_called_at = ?,
            last_called_tenant_id = ?,
            updated_at = ?
        WHERE id IN (
            SELECT id FROM numbers
            WHERE global_status = 'ACTIVE' AND assigned_batch_id IS NULL
            ORDER BY last_called_at IS NOT NULL, last_called_at ASC, id ASC
            LIMIT ?
        )
        "#,
    )
    .bind(batch_id)
    .bind(now)
    .bind(now)
    .bind(tenant_id)
    .bind(now)
    .bind(max_size)
    .execute(pool)
    .await?
    .rows_affected();

    debug!(tenant_id, batch_id, claimed, "reserved number batch");

    let numbers = sqlx::query_as::<_, Number>(&format!(
        "SELECT {NUMBER_COLUMNS} FROM numbers WHERE assigned_batch_id = ? ORDER BY id"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(numbers)
}

/// Outcome of one call attempt, applied by [`finalize_attempt`].
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub number_id: i64,
    pub tenant_id: i64,
    pub status: CallStatus,
    pub reason: Option<String>,
    pub agent_id: Option<i64>,
    pub user_message: Option<String>,
    pub scenario_id: Option<i64>,
    pub outbound_line_id: Option<i64>,
    pub attempted_at: DateTime<Utc>,
}

/// Apply a reported call outcome in one transaction: bump the attempt
/// counter, set the new status, clear the reservation so the number
/// returns to the pool, and append the immutable call-result row.
pub async fn finalize_attempt(pool: &SqlitePool, outcome: &AttemptOutcome) -> Result<Number> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE numbers
        SET status = ?,
            total_attempts = total_attempts + 1,
            last_attempt_at = ?,
            last_status_change_at = ?,
            assigned_batch_id = NULL,
            assigned_at = NULL,
            assigned_agent_id = COALESCE(?, assigned_agent_id),
            last_user_message = COALESCE(?, last_user_message),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(outcome.status)
    .bind(outcome.attempted_at)
    .bind(now)
    .bind(outcome.agent_id)
    .bind(&outcome.user_message)
    .bind(now)
    .bind(outcome.number_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Number",
            id: outcome.number_id.to_string(),
        });
    }

    call_result::append(&mut tx, outcome, now).await?;
    tx.commit().await?;

    get_number(pool, outcome.number_id).await
}

/// Reset numbers to the dial queue, clearing reservation and attempt
/// counters. Returns the number of rows touched.
pub async fn reset_numbers(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        r#"
        UPDATE numbers
        SET status = 'IN_QUEUE',
            assigned_batch_id = NULL,
            assigned_at = NULL,
            total_attempts = 0,
            last_attempt_at = NULL,
            last_status_change_at = ?,
            updated_at = ?
        WHERE id IN ({placeholders})
        "#
    );
    let now = Utc::now();
    let mut query = sqlx::query(&sql).bind(now).bind(now);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.execute(pool).await?.rows_affected())
}

/// Set one status across a set of numbers, optionally replacing the note.
pub async fn bulk_update_status(
    pool: &SqlitePool,
    ids: &[i64],
    status: CallStatus,
    note: Option<&str>,
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        r#"
        UPDATE numbers
        SET status = ?,
            last_status_change_at = ?,
            note = COALESCE(?, note),
            updated_at = ?
        WHERE id IN ({placeholders})
        "#
    );
    let now = Utc::now();
    let mut query = sqlx::query(&sql).bind(status).bind(now).bind(note).bind(now);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.execute(pool).await?.rows_affected())
}

/// Fetch a set of numbers by ID, in id order. Missing ids are skipped.
pub async fn fetch_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Number>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {NUMBER_COLUMNS} FROM numbers WHERE id IN ({placeholders}) ORDER BY id"
    );
    let mut query = sqlx::query_as::<_, Number>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Set the cross-tenant status of a number (complaint handling, dead
/// lines). A non-ACTIVE number disappears from every tenant's pool.
pub async fn set_global_status(
    pool: &SqlitePool,
    id: i64,
    global_status: GlobalStatus,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE numbers
        SET global_status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(global_status)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Number",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Administrative purge: delete a number together with its call history.
/// This is the only path that removes call-result rows.
pub async fn delete_with_history(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM call_results WHERE number_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM numbers WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Number",
            id: id.to_string(),
        });
    }

    tx.commit().await?;
    Ok(())
}
