//! Immutable call attempt log.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Result;
use crate::models::CallResult;
use crate::number::AttemptOutcome;

/// Append one attempt row inside the finalization transaction. Rows are
/// never updated afterwards.
pub(crate) async fn append(
    tx: &mut Transaction<'_, Sqlite>,
    outcome: &AttemptOutcome,
    created_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO call_results
            (number_id, tenant_id, scenario_id, outbound_line_id, agent_id,
             status, reason, user_message, attempted_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(outcome.number_id)
    .bind(outcome.tenant_id)
    .bind(outcome.scenario_id)
    .bind(outcome.outbound_line_id)
    .bind(outcome.agent_id)
    .bind(outcome.status)
    .bind(&outcome.reason)
    .bind(&outcome.user_message)
    .bind(outcome.attempted_at)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Attempt history for a number, oldest first.
pub async fn list_for_number(pool: &SqlitePool, number_id: i64) -> Result<Vec<CallResult>> {
    let rows = sqlx::query_as::<_, CallResult>(
        r#"
        SELECT id, number_id, tenant_id, scenario_id, outbound_line_id, agent_id,
               status, reason, user_message, attempted_at, created_at
        FROM call_results
        WHERE number_id = ?
        ORDER BY attempted_at, id
        "#,
    )
    .bind(number_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count attempts recorded for a tenant.
pub async fn count_for_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM call_results WHERE tenant_id = ?
        "#,
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
