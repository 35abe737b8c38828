//! Bank SMS inbox: one row per inbound message, mutated only to mark
//! consumption.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{DatabaseError, Result};
use crate::models::BankSms;

const SMS_COLUMNS: &str = r#"
    id, sender, receiver, body, is_bank_sender,
    parsed_amount_rial, parsed_amount_toman, parsed_transaction_at,
    parsed_is_credit, parse_error, consumed, consumed_at, received_at
"#;

/// A raw message with its parse results, stored in one insert.
#[derive(Debug, Clone)]
pub struct NewBankSms {
    pub sender: String,
    pub receiver: Option<String>,
    pub body: String,
    pub is_bank_sender: bool,
    pub parsed_amount_rial: Option<i64>,
    pub parsed_amount_toman: Option<i64>,
    pub parsed_transaction_at: Option<DateTime<Utc>>,
    pub parsed_is_credit: Option<bool>,
    pub parse_error: Option<String>,
}

/// Store an inbound message. Ingestion always stores the raw body, even
/// when parsing failed or the sender is not a known bank.
pub async fn insert_sms(pool: &SqlitePool, sms: &NewBankSms) -> Result<BankSms> {
    let result = sqlx::query(
        r#"
        INSERT INTO bank_incoming_sms
            (sender, receiver, body, is_bank_sender,
             parsed_amount_rial, parsed_amount_toman, parsed_transaction_at,
             parsed_is_credit, parse_error, consumed, received_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&sms.sender)
    .bind(&sms.receiver)
    .bind(&sms.body)
    .bind(sms.is_bank_sender)
    .bind(sms.parsed_amount_rial)
    .bind(sms.parsed_amount_toman)
    .bind(sms.parsed_transaction_at)
    .bind(sms.parsed_is_credit)
    .bind(&sms.parse_error)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    get_sms(pool, result.last_insert_rowid()).await
}

/// Get a stored message by ID.
pub async fn get_sms(pool: &SqlitePool, id: i64) -> Result<BankSms> {
    sqlx::query_as::<_, BankSms>(&format!(
        "SELECT {SMS_COLUMNS} FROM bank_incoming_sms WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "BankSms",
        id: id.to_string(),
    })
}

/// Unconsumed credit messages from known bank senders matching the claimed
/// amount, with a transaction time inside `[window_start, window_end]`.
pub async fn find_match_candidates(
    pool: &SqlitePool,
    amount_toman: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<BankSms>> {
    let rows = sqlx::query_as::<_, BankSms>(&format!(
        r#"
        SELECT {SMS_COLUMNS} FROM bank_incoming_sms
        WHERE consumed = 0
          AND is_bank_sender = 1
          AND parsed_is_credit = 1
          AND parsed_amount_toman = ?
          AND parsed_transaction_at >= ?
          AND parsed_transaction_at <= ?
        ORDER BY parsed_transaction_at, id
        "#
    ))
    .bind(amount_toman)
    .bind(window_start)
    .bind(window_end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Mark a message consumed inside the charging transaction. The guard on
/// `consumed = 0` means a concurrent consumer loses: the second caller
/// sees `false` and reports no match instead of double-funding.
pub async fn consume(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE bank_incoming_sms
        SET consumed = 1, consumed_at = ?
        WHERE id = ? AND consumed = 0
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(updated == 1)
}
