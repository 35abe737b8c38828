//! Immutable engine configuration, loaded once at startup and passed
//! explicitly. No ambient global state.

use chrono::FixedOffset;
use database::CallStatus;

/// How bulk operations treat rows sitting in a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPolicy {
    /// Reject the offending rows, apply the operation to the remainder,
    /// and report both sets.
    SkipOffending,
    /// Refuse the whole batch if any row is terminal.
    RejectBatch,
}

/// Engine-wide settings shared by the gate, dispatcher, and recorder.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed civil offset of the operating timezone. Window boundaries and
    /// holiday lookups are evaluated in this offset, never in UTC.
    pub tz_offset: FixedOffset,
    /// Timezone name reported to dialer clients.
    pub tz_name: String,
    /// Batch size when the dialer does not ask for one.
    pub default_batch_size: i64,
    /// Hard cap on a single reservation.
    pub max_batch_size: i64,
    /// Retry hint when no better estimate exists (disabled tenant, empty
    /// window table, insufficient balance).
    pub retry_fallback_secs: i64,
    /// Statuses that, once recorded, may never be overwritten.
    pub terminal_statuses: Vec<CallStatus>,
    pub terminal_policy: TerminalPolicy,
}

impl EngineConfig {
    /// Tehran deployment defaults (UTC+03:30, no DST since 2022).
    pub fn tehran() -> Self {
        Self {
            tz_offset: FixedOffset::east_opt(3 * 3600 + 30 * 60).expect("valid offset"),
            tz_name: "Asia/Tehran".to_string(),
            default_batch_size: 50,
            max_batch_size: 500,
            retry_fallback_secs: 3600,
            terminal_statuses: vec![CallStatus::Connected],
            terminal_policy: TerminalPolicy::SkipOffending,
        }
    }

    /// Whether a status is immutable once recorded.
    pub fn is_terminal(&self, status: CallStatus) -> bool {
        self.terminal_statuses.contains(&status)
    }

    /// Clamp a requested batch size to the configured bounds.
    pub fn clamp_batch_size(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_batch_size)
            .clamp(1, self.max_batch_size)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::tehran()
    }
}
