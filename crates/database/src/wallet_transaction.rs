//! Append-only wallet ledger rows.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{DatabaseError, Result};
use crate::models::{TransactionSource, WalletTransaction};

const TX_COLUMNS: &str = r#"
    id, tenant_id, amount_toman, balance_after, source, note,
    transaction_at, created_by_agent_id, bank_sms_id, created_at
"#;

/// A ledger entry to append. `amount_toman` is signed; `balance_after`
/// must equal the tenant's previous balance plus it.
#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub tenant_id: i64,
    pub amount_toman: i64,
    pub balance_after: i64,
    pub source: TransactionSource,
    pub note: Option<String>,
    pub transaction_at: DateTime<Utc>,
    pub created_by_agent_id: Option<i64>,
    pub bank_sms_id: Option<i64>,
}

/// Append a ledger entry inside the charging transaction. The unique index
/// on `bank_sms_id` rejects a second entry funded by the same message.
pub async fn append(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &NewWalletTransaction,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO wallet_transactions
            (tenant_id, amount_toman, balance_after, source, note,
             transaction_at, created_by_agent_id, bank_sms_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.tenant_id)
    .bind(entry.amount_toman)
    .bind(entry.balance_after)
    .bind(entry.source)
    .bind(&entry.note)
    .bind(entry.transaction_at)
    .bind(entry.created_by_agent_id)
    .bind(entry.bank_sms_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "WalletTransaction",
                    id: entry
                        .bank_sms_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(result.last_insert_rowid())
}

/// A tenant's ledger, newest first.
pub async fn list_for_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<WalletTransaction>> {
    let rows = sqlx::query_as::<_, WalletTransaction>(&format!(
        r#"
        SELECT {TX_COLUMNS} FROM wallet_transactions
        WHERE tenant_id = ?
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// A tenant's ledger in creation order, for chaining verification.
pub async fn list_chronological(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<Vec<WalletTransaction>> {
    let rows = sqlx::query_as::<_, WalletTransaction>(&format!(
        r#"
        SELECT {TX_COLUMNS} FROM wallet_transactions
        WHERE tenant_id = ?
        ORDER BY id
        "#
    ))
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count ledger entries for a tenant.
pub async fn count_for_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM wallet_transactions WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
