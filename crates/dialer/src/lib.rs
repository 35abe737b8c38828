//! Call-admission and batch-dispatch engine.
//!
//! The engine decides *whether* a tenant may dial right now and *which*
//! numbers it gets; external dialer hardware performs the actual calls.
//!
//! - [`gate`]: pure admission decision over manual/system disable flags,
//!   holiday lookup, local-time windows, and wallet balance, in that order.
//! - [`dispatch`]: [`BatchDispatcher`] composes the gate with the atomic
//!   pool reservation and returns the full polling response.
//! - [`recorder`]: [`CallResultRecorder`] applies reported outcomes under
//!   ownership and terminal-status rules, appending the immutable attempt
//!   log.
//!
//! The engine is stateless: every call re-reads tenant state from the
//! store, and concurrency safety comes from the store's atomic claims.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod holiday;
pub mod phone;
pub mod recorder;

pub use config::{EngineConfig, TerminalPolicy};
pub use dispatch::{BatchDispatcher, NextBatchResponse};
pub use error::{EngineError, Result};
pub use gate::{AdmissionState, GateDecision};
pub use holiday::{HolidayCalendar, HolidayTable};
pub use recorder::{Actor, BulkOutcome, CallReport, CallResultRecorder};
