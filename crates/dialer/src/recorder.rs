//! Call result recording: ownership and terminal-state policy around the
//! immutable attempt log.

use chrono::{DateTime, Utc};
use database::{number, tenant, AgentRole, CallStatus, Database, Number};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{EngineConfig, TerminalPolicy};
use crate::error::{EngineError, Result};
use crate::phone;

/// Capability of the caller, evaluated by explicit policy checks per
/// operation.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub agent_id: Option<i64>,
    pub role: AgentRole,
}

impl Actor {
    pub fn admin() -> Self {
        Self {
            agent_id: None,
            role: AgentRole::Admin,
        }
    }

    pub fn agent(agent_id: i64) -> Self {
        Self {
            agent_id: Some(agent_id),
            role: AgentRole::Agent,
        }
    }
}

/// A reported call outcome. The number may be addressed by id or by its
/// phone string.
#[derive(Debug, Clone, Deserialize)]
pub struct CallReport {
    pub number_id: Option<i64>,
    pub phone_number: Option<String>,
    pub status: CallStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<i64>,
    #[serde(default)]
    pub outbound_line_id: Option<i64>,
    pub attempted_at: DateTime<Utc>,
}

/// Result of a bulk operation under `TerminalPolicy::SkipOffending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub updated: u64,
    /// Ids refused because the row is in a terminal status.
    pub rejected: Vec<i64>,
}

/// Applies reported outcomes and maintenance operations to the pool.
pub struct CallResultRecorder {
    db: Database,
    config: EngineConfig,
}

impl CallResultRecorder {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self { db, config }
    }

    /// Record one call outcome: permission and terminal checks, then the
    /// transactional status update + attempt append.
    pub async fn record_result(
        &self,
        tenant_slug: &str,
        report: &CallReport,
        actor: &Actor,
    ) -> Result<Number> {
        let tenant = tenant::get_active_by_slug(self.db.pool(), tenant_slug).await?;
        let number = self.resolve_number(report).await?;

        self.ensure_owner(actor, &number)?;
        self.ensure_mutable(&number)?;

        let updated = number::finalize_attempt(
            self.db.pool(),
            &number::AttemptOutcome {
                number_id: number.id,
                tenant_id: tenant.id,
                status: report.status,
                reason: report.reason.clone(),
                agent_id: report.agent_id,
                user_message: report.user_message.clone(),
                scenario_id: report.scenario_id,
                outbound_line_id: report.outbound_line_id,
                attempted_at: report.attempted_at,
            },
        )
        .await?;

        info!(
            tenant = tenant_slug,
            number_id = number.id,
            status = ?report.status,
            "recorded call result"
        );

        Ok(updated)
    }

    /// Return a number to the dial queue, clearing its counters.
    pub async fn reset_number(&self, number_id: i64, actor: &Actor) -> Result<Number> {
        let number = number::get_number(self.db.pool(), number_id).await?;
        self.ensure_owner(actor, &number)?;
        self.ensure_mutable(&number)?;

        number::reset_numbers(self.db.pool(), &[number_id]).await?;
        Ok(number::get_number(self.db.pool(), number_id).await?)
    }

    /// Reset a set of numbers, honoring the terminal policy. Admin only.
    pub async fn bulk_reset(&self, ids: &[i64], actor: &Actor) -> Result<BulkOutcome> {
        self.ensure_admin(actor)?;
        let (allowed, rejected) = self.partition_terminal(ids).await?;
        let updated = number::reset_numbers(self.db.pool(), &allowed).await?;
        Ok(BulkOutcome { updated, rejected })
    }

    /// Apply one status across a set of numbers, honoring the terminal
    /// policy. Admin only.
    pub async fn bulk_update_status(
        &self,
        ids: &[i64],
        status: CallStatus,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<BulkOutcome> {
        self.ensure_admin(actor)?;
        let (allowed, rejected) = self.partition_terminal(ids).await?;
        let updated = number::bulk_update_status(self.db.pool(), &allowed, status, note).await?;
        Ok(BulkOutcome { updated, rejected })
    }

    /// Administrative purge: remove a number and its attempt history.
    pub async fn delete_number(&self, number_id: i64, actor: &Actor) -> Result<()> {
        self.ensure_admin(actor)?;
        number::delete_with_history(self.db.pool(), number_id).await?;
        info!(number_id, "purged number with history");
        Ok(())
    }

    async fn resolve_number(&self, report: &CallReport) -> Result<Number> {
        if let Some(id) = report.number_id {
            return Ok(number::get_number(self.db.pool(), id).await?);
        }
        let raw = report
            .phone_number
            .as_deref()
            .ok_or_else(|| {
                EngineError::Validation("number_id or phone_number is required".to_string())
            })?;
        let normalized = phone::normalize_phone(raw)
            .ok_or_else(|| EngineError::Validation(format!("invalid phone number: {raw}")))?;
        Ok(number::get_by_phone(self.db.pool(), &normalized).await?)
    }

    /// Agents may only touch numbers reserved to them; denial is explicit,
    /// never masked as NotFound.
    fn ensure_owner(&self, actor: &Actor, number: &Number) -> Result<()> {
        if actor.role == AgentRole::Agent && number.assigned_agent_id != actor.agent_id {
            return Err(EngineError::PermissionDenied(format!(
                "number {} is not assigned to this agent",
                number.id
            )));
        }
        Ok(())
    }

    fn ensure_admin(&self, actor: &Actor) -> Result<()> {
        if actor.role != AgentRole::Admin {
            return Err(EngineError::PermissionDenied(
                "bulk operations require an admin".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_mutable(&self, number: &Number) -> Result<()> {
        if self.config.is_terminal(number.status) {
            return Err(EngineError::InvalidState(format!(
                "number {} is in terminal status {:?}",
                number.id, number.status
            )));
        }
        Ok(())
    }

    /// Split ids into mutable rows and terminal rows; under `RejectBatch`
    /// any terminal row fails the whole call.
    async fn partition_terminal(&self, ids: &[i64]) -> Result<(Vec<i64>, Vec<i64>)> {
        let numbers = number::fetch_by_ids(self.db.pool(), ids).await?;
        let mut allowed = Vec::new();
        let mut rejected = Vec::new();
        for n in numbers {
            if self.config.is_terminal(n.status) {
                rejected.push(n.id);
            } else {
                allowed.push(n.id);
            }
        }
        if self.config.terminal_policy == TerminalPolicy::RejectBatch && !rejected.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "{} numbers are in a terminal status",
                rejected.len()
            )));
        }
        Ok((allowed, rejected))
    }
}
