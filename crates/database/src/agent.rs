//! Agent accounts: creation and the active roster handed to the dialer.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Agent, AgentRole};

/// Fields for a new agent account.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub tenant_id: i64,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub role: AgentRole,
    pub is_active: bool,
}

/// Create an agent account.
pub async fn create_agent(pool: &SqlitePool, agent: &NewAgent) -> Result<Agent> {
    let result = sqlx::query(
        r#"
        INSERT INTO agents (tenant_id, full_name, phone_number, role, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(agent.tenant_id)
    .bind(&agent.full_name)
    .bind(&agent.phone_number)
    .bind(agent.role)
    .bind(agent.is_active)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Agent",
                    id: agent.phone_number.clone().unwrap_or_default(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    get_agent(pool, result.last_insert_rowid()).await
}

/// Get an agent by ID.
pub async fn get_agent(pool: &SqlitePool, id: i64) -> Result<Agent> {
    sqlx::query_as::<_, Agent>(
        r#"
        SELECT id, tenant_id, full_name, phone_number, role, is_active, created_at
        FROM agents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Agent",
        id: id.to_string(),
    })
}

/// Active agents for a tenant, as returned in every dispatch response.
pub async fn list_active_for_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<Vec<Agent>> {
    let agents = sqlx::query_as::<_, Agent>(
        r#"
        SELECT id, tenant_id, full_name, phone_number, role, is_active, created_at
        FROM agents
        WHERE tenant_id = ? AND is_active = 1
        ORDER BY full_name
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(agents)
}
