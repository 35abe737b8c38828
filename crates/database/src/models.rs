//! Database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-tenant call outcome for a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    InQueue,
    Missed,
    Connected,
    Failed,
    NotInterested,
    Hangup,
    Disconnected,
    Busy,
    PowerOff,
    Banned,
    Unknown,
    InboundCall,
}

/// Cross-tenant state of a number. Anything other than `Active` is never
/// handed out to any tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalStatus {
    Active,
    Complained,
    PowerOff,
}

/// Role of an operator account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Admin,
    Agent,
}

/// Origin of a wallet ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    ManualAdjust,
    BankMatch,
}

/// A tenant company sharing the number pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    /// URL-safe identifier used by the dialer (e.g. "acme").
    pub slug: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An operator account scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Agent {
    pub id: i64,
    pub tenant_id: i64,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub role: AgentRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A dialable number shared across tenants.
///
/// At most one live reservation exists at a time: a non-NULL
/// `assigned_batch_id` marks the row as claimed until the result is
/// reported or the number is reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Number {
    pub id: i64,
    pub phone_number: String,
    pub status: CallStatus,
    pub global_status: GlobalStatus,
    pub total_attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub assigned_batch_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_agent_id: Option<i64>,
    /// Fairness bookkeeping: when any tenant last dialed this number.
    pub last_called_at: Option<DateTime<Utc>>,
    pub last_called_tenant_id: Option<i64>,
    pub note: Option<String>,
    pub last_user_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable call attempt log row. Never updated after insert; deleted
/// only by the administrative purge that removes the number itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CallResult {
    pub id: i64,
    pub number_id: i64,
    pub tenant_id: i64,
    pub scenario_id: Option<i64>,
    pub outbound_line_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub status: CallStatus,
    pub reason: Option<String>,
    pub user_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant admission configuration. The row doubles as the tenant's
/// ledger serialization point: every wallet mutation updates
/// `wallet_balance` and bumps `version` in the same transaction that
/// appends the ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ScheduleConfig {
    pub id: i64,
    pub tenant_id: i64,
    pub enabled: bool,
    pub disabled_by_dialer: bool,
    pub skip_holidays: bool,
    /// Prepaid balance in toman.
    pub wallet_balance: i64,
    /// Charge per connected call in toman.
    pub cost_per_connected: i64,
    /// Bumped on every config or balance write so polling clients detect
    /// staleness.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A dialing window in local wall-clock time.
///
/// `day_of_week` is 0..=6 with 0 = Saturday (first day of the regional
/// week). Windows never wrap midnight; a window crossing midnight is
/// stored as two rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ScheduleWindow {
    pub id: i64,
    pub tenant_id: i64,
    pub day_of_week: i64,
    /// Minutes since local midnight, inclusive.
    pub start_min: i64,
    /// Minutes since local midnight, exclusive.
    pub end_min: i64,
}

/// A raw inbound SMS with parse results, stored once per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BankSms {
    pub id: i64,
    pub sender: String,
    pub receiver: Option<String>,
    pub body: String,
    pub is_bank_sender: bool,
    pub parsed_amount_rial: Option<i64>,
    pub parsed_amount_toman: Option<i64>,
    pub parsed_transaction_at: Option<DateTime<Utc>>,
    pub parsed_is_credit: Option<bool>,
    pub parse_error: Option<String>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// An append-only wallet ledger entry.
///
/// Chaining invariant: ordered by creation per tenant, each row's
/// `balance_after` equals the previous `balance_after` plus this row's
/// signed `amount_toman`, and the last row matches
/// `ScheduleConfig.wallet_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub tenant_id: i64,
    pub amount_toman: i64,
    pub balance_after: i64,
    pub source: TransactionSource,
    pub note: Option<String>,
    /// Business time of the underlying event (bank transaction instant for
    /// matches, wall-clock now for manual adjustments).
    pub transaction_at: DateTime<Utc>,
    pub created_by_agent_id: Option<i64>,
    /// Unique back-reference: a bank SMS funds at most one entry.
    pub bank_sms_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
