//! Prepaid wallet ledger reconciled from bank SMS.
//!
//! Deposit notifications arrive as raw SMS, are parsed for a signed
//! amount and a Jalali timestamp, and sit in an inbox until a customer's
//! top-up claim matches exactly one of them. Matching consumes the
//! message and appends a ledger entry in the same transaction, so a
//! message can fund at most one credit.

pub mod config;
pub mod error;
pub mod jalali;
pub mod parser;
pub mod service;

pub use config::WalletConfig;
pub use error::{Result, WalletError};
pub use parser::{ParseError, ParsedBankSms};
pub use service::{AdjustOperation, BalanceSnapshot, TopUpClaim, WalletService};
