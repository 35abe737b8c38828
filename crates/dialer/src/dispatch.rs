//! Batch dispatcher: composes the schedule gate and the number pool to
//! answer "give me up to N numbers to dial now".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use database::{number, schedule, tenant, Database};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::gate::{self, AdmissionState};
use crate::holiday::HolidayCalendar;

/// One reserved number handed to the dialer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialerNumber {
    pub id: i64,
    pub phone_number: String,
}

/// The reserved batch, present only when admission was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOut {
    pub batch_id: String,
    pub size_requested: i64,
    pub size_returned: i64,
    pub numbers: Vec<DialerNumber>,
}

/// Roster entry for an active agent of the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveAgent {
    pub id: i64,
    pub full_name: String,
    pub phone_number: Option<String>,
}

/// Full dispatch response. `call_allowed` with an empty batch means the
/// pool is exhausted, which is distinct from every blocked state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextBatchResponse {
    pub call_allowed: bool,
    pub state: AdmissionState,
    pub timezone: String,
    pub server_time: DateTime<Utc>,
    pub schedule_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchOut>,
    pub active_agents: Vec<ActiveAgent>,
}

/// Stateless dispatch service; every call re-reads tenant state from the
/// store.
pub struct BatchDispatcher {
    db: Database,
    config: EngineConfig,
    holidays: Arc<dyn HolidayCalendar + Send + Sync>,
}

impl BatchDispatcher {
    pub fn new(
        db: Database,
        config: EngineConfig,
        holidays: Arc<dyn HolidayCalendar + Send + Sync>,
    ) -> Self {
        Self {
            db,
            config,
            holidays,
        }
    }

    /// Evaluate admission for the tenant and, when allowed, atomically
    /// reserve up to `size` numbers from the shared pool.
    pub async fn fetch_next_batch(
        &self,
        tenant_slug: &str,
        size: Option<i64>,
    ) -> Result<NextBatchResponse> {
        let now = Utc::now();
        let tenant = tenant::get_active_by_slug(self.db.pool(), tenant_slug).await?;
        let config = schedule::get_or_create_config(self.db.pool(), tenant.id).await?;
        let windows = schedule::list_windows(self.db.pool(), tenant.id).await?;

        let decision = gate::evaluate(
            &config,
            &windows,
            self.holidays.as_ref(),
            &self.config,
            now,
        );

        let agents = database::agent::list_active_for_tenant(self.db.pool(), tenant.id)
            .await?
            .into_iter()
            .map(|a| ActiveAgent {
                id: a.id,
                full_name: a.full_name,
                phone_number: a.phone_number,
            })
            .collect();

        if !decision.allowed() {
            info!(
                tenant = tenant_slug,
                state = decision.state.as_str(),
                retry_after = ?decision.retry_after_secs,
                "dispatch blocked"
            );
            return Ok(NextBatchResponse {
                call_allowed: false,
                state: decision.state,
                timezone: self.config.tz_name.clone(),
                server_time: now,
                schedule_version: config.version,
                reason: Some(decision.state.as_str().to_string()),
                retry_after_seconds: decision.retry_after_secs,
                batch: None,
                active_agents: agents,
            });
        }

        let size_requested = self.config.clamp_batch_size(size);
        let batch_id = Uuid::new_v4().to_string();
        let numbers =
            number::reserve_batch(self.db.pool(), tenant.id, &batch_id, size_requested, now)
                .await?;

        info!(
            tenant = tenant_slug,
            batch_id = %batch_id,
            size_requested,
            size_returned = numbers.len(),
            "dispatched batch"
        );

        Ok(NextBatchResponse {
            call_allowed: true,
            state: AdmissionState::Allowed,
            timezone: self.config.tz_name.clone(),
            server_time: now,
            schedule_version: config.version,
            reason: None,
            retry_after_seconds: None,
            batch: Some(BatchOut {
                batch_id,
                size_requested,
                size_returned: numbers.len() as i64,
                numbers: numbers
                    .into_iter()
                    .map(|n| DialerNumber {
                        id: n.id,
                        phone_number: n.phone_number,
                    })
                    .collect(),
            }),
            active_agents: agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::schedule::NewWindow;
    use database::AgentRole;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn all_day_windows() -> Vec<NewWindow> {
        (0..7)
            .map(|d| NewWindow {
                day_of_week: d,
                start_min: 0,
                end_min: 24 * 60,
            })
            .collect()
    }

    async fn dispatcher(db: &Database) -> BatchDispatcher {
        BatchDispatcher::new(
            db.clone(),
            EngineConfig::tehran(),
            Arc::new(crate::holiday::HolidayTable::default()),
        )
    }

    async fn funded_tenant(db: &Database, slug: &str) -> database::Tenant {
        let tenant = tenant::create_tenant(db.pool(), slug, slug).await.unwrap();
        schedule::get_or_create_config(db.pool(), tenant.id).await.unwrap();
        schedule::replace_windows(db.pool(), tenant.id, &all_day_windows())
            .await
            .unwrap();
        tenant
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let db = test_db().await;
        let d = dispatcher(&db).await;
        let err = d.fetch_next_batch("nope", None).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blocked_response_carries_state_and_version() {
        let db = test_db().await;
        let tenant = tenant::create_tenant(db.pool(), "acme", "Acme").await.unwrap();
        schedule::get_or_create_config(db.pool(), tenant.id).await.unwrap();
        // No windows configured: always outside.
        let d = dispatcher(&db).await;

        let resp = d.fetch_next_batch("acme", None).await.unwrap();
        assert!(!resp.call_allowed);
        assert_eq!(resp.state, AdmissionState::OutsideWindow);
        assert_eq!(resp.reason.as_deref(), Some("OUTSIDE_WINDOW"));
        assert_eq!(resp.retry_after_seconds, Some(3600));
        assert_eq!(resp.schedule_version, 1);
        assert!(resp.batch.is_none());
    }

    #[tokio::test]
    async fn test_allowed_with_empty_pool_is_distinct_from_blocked() {
        let db = test_db().await;
        funded_tenant(&db, "acme").await;
        let d = dispatcher(&db).await;

        let resp = d.fetch_next_batch("acme", Some(10)).await.unwrap();
        assert!(resp.call_allowed);
        assert_eq!(resp.state, AdmissionState::Allowed);
        let batch = resp.batch.unwrap();
        assert_eq!(batch.size_returned, 0);
        assert!(batch.numbers.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reserves_and_reports_roster() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "acme").await;
        database::agent::create_agent(
            db.pool(),
            &database::agent::NewAgent {
                tenant_id: tenant.id,
                full_name: "Sara".to_string(),
                phone_number: Some("09120000001".to_string()),
                role: AgentRole::Agent,
                is_active: true,
            },
        )
        .await
        .unwrap();

        for i in 0..3 {
            number::insert_number(db.pool(), &format!("0912000000{i}"))
                .await
                .unwrap();
        }

        let d = dispatcher(&db).await;
        let resp = d.fetch_next_batch("acme", Some(2)).await.unwrap();
        let batch = resp.batch.unwrap();
        assert_eq!(batch.size_requested, 2);
        assert_eq!(batch.size_returned, 2);
        assert_eq!(resp.active_agents.len(), 1);
        assert_eq!(resp.active_agents[0].full_name, "Sara");

        // The claimed rows are gone from the pool.
        let resp = d.fetch_next_batch("acme", Some(10)).await.unwrap();
        assert_eq!(resp.batch.unwrap().size_returned, 1);
    }

    #[tokio::test]
    async fn test_batch_size_is_clamped() {
        let db = test_db().await;
        funded_tenant(&db, "acme").await;
        let d = dispatcher(&db).await;

        let resp = d.fetch_next_batch("acme", Some(9999)).await.unwrap();
        assert_eq!(resp.batch.unwrap().size_requested, 500);

        let resp = d.fetch_next_batch("acme", None).await.unwrap();
        assert_eq!(resp.batch.unwrap().size_requested, 50);
    }

    #[tokio::test]
    async fn test_dialer_disabled_tenant_is_blocked() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "acme").await;
        schedule::set_disabled_by_dialer(db.pool(), tenant.id, true)
            .await
            .unwrap();

        let d = dispatcher(&db).await;
        let resp = d.fetch_next_batch("acme", None).await.unwrap();
        assert_eq!(resp.state, AdmissionState::DisabledByDialer);
        // The override bumped the config version.
        assert_eq!(resp.schedule_version, 2);
    }
}
