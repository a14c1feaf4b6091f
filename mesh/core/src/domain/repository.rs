// Repository traits - storage backend abstraction.
//
// One trait per aggregate: registry rows (agents + KBs), the append-only
// audit table, and the policy store. SQLite implementations live in
// infrastructure; tests may substitute their own.

use crate::domain::agent::{AgentRecord, HealthStatus};
use crate::domain::audit::{AuditEvent, AuditQuery, AuditRecord};
use crate::domain::kb::KbRecord;
use crate::domain::policy::PolicyRecord;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
                RepositoryError::Duplicate(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Filters for registry lookups. Unset fields match everything; `limit`
/// truncates the result when set.
#[derive(Debug, Clone, Default)]
pub struct RegistryQuery {
    pub identity: Option<String>,
    pub kb_id: Option<String>,
    pub capability: Option<String>,
    pub kb_type: Option<String>,
    pub status: Option<HealthStatus>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait RegistryRepository: Send + Sync {
    async fn insert_agent(&self, record: &AgentRecord) -> Result<(), RepositoryError>;

    async fn get_agent(&self, identity: &str) -> Result<Option<AgentRecord>, RepositoryError>;

    async fn list_agents(&self, query: &RegistryQuery) -> Result<Vec<AgentRecord>, RepositoryError>;

    async fn update_agent_status(
        &self,
        identity: &str,
        status: HealthStatus,
    ) -> Result<(), RepositoryError>;

    async fn update_agent_capabilities(
        &self,
        identity: &str,
        capabilities: &[String],
    ) -> Result<(), RepositoryError>;

    async fn delete_agent(&self, identity: &str) -> Result<(), RepositoryError>;

    async fn insert_kb(&self, record: &KbRecord) -> Result<(), RepositoryError>;

    async fn get_kb(&self, kb_id: &str) -> Result<Option<KbRecord>, RepositoryError>;

    async fn list_kbs(&self, query: &RegistryQuery) -> Result<Vec<KbRecord>, RepositoryError>;

    async fn update_kb_status(
        &self,
        kb_id: &str,
        status: HealthStatus,
    ) -> Result<(), RepositoryError>;

    async fn delete_kb(&self, kb_id: &str) -> Result<(), RepositoryError>;
}

/// Append-only audit store. There is deliberately no update or delete.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<Uuid, RepositoryError>;

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, RepositoryError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Insert or replace; last writer wins, atomic per document.
    async fn upsert(&self, record: &PolicyRecord) -> Result<(), RepositoryError>;

    async fn get(&self, policy_id: &str) -> Result<Option<PolicyRecord>, RepositoryError>;

    async fn list(&self) -> Result<Vec<PolicyRecord>, RepositoryError>;

    /// Returns `false` when the policy did not exist.
    async fn delete(&self, policy_id: &str) -> Result<bool, RepositoryError>;
}
