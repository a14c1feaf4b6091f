use super::{decode_json, decode_opt_time, decode_time, encode_json, encode_time};
use crate::domain::agent::{AgentId, AgentRecord, HealthStatus};
use crate::domain::kb::KbRecord;
use crate::domain::repository::{RegistryQuery, RegistryRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteRegistryRepository {
    pool: SqlitePool,
}

impl SqliteRegistryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn agent_from_row(row: &SqliteRow) -> Result<AgentRecord, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let registered_at: String = row.try_get("registered_at")?;
    let last_heartbeat: Option<String> = row.try_get("last_heartbeat")?;
    let capabilities: String = row.try_get("capabilities")?;
    let operations: String = row.try_get("operations")?;
    let schemas: String = row.try_get("schemas")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(AgentRecord {
        agent_id: AgentId(
            Uuid::parse_str(&id)
                .map_err(|e| RepositoryError::Serialization(format!("bad agent id '{id}': {e}")))?,
        ),
        identity: row.try_get("identity")?,
        version: row.try_get("version")?,
        capabilities: decode_json(&capabilities)?,
        operations: decode_json(&operations)?,
        schemas: decode_json(&schemas)?,
        health_endpoint: row.try_get("health_endpoint")?,
        status: HealthStatus::parse(&status).unwrap_or(HealthStatus::Offline),
        registered_at: decode_time(&registered_at)?,
        last_heartbeat: decode_opt_time(last_heartbeat)?,
        metadata: decode_json(&metadata)?,
    })
}

fn kb_from_row(row: &SqliteRow) -> Result<KbRecord, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let registered_at: String = row.try_get("registered_at")?;
    let last_health_check: Option<String> = row.try_get("last_health_check")?;
    let operations: String = row.try_get("operations")?;
    let schema: String = row.try_get("schema")?;
    let credentials: Option<String> = row.try_get("credentials")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(KbRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| RepositoryError::Serialization(format!("bad kb row id '{id}': {e}")))?,
        kb_id: row.try_get("kb_id")?,
        kb_type: row.try_get("kb_type")?,
        endpoint: row.try_get("endpoint")?,
        operations: decode_json(&operations)?,
        schema: decode_json(&schema)?,
        credentials: credentials.as_deref().map(decode_json).transpose()?,
        status: HealthStatus::parse(&status).unwrap_or(HealthStatus::Offline),
        registered_at: decode_time(&registered_at)?,
        last_health_check: decode_opt_time(last_health_check)?,
        metadata: decode_json(&metadata)?,
    })
}

const AGENT_COLUMNS: &str = "id, identity, version, capabilities, operations, schemas, \
     health_endpoint, status, registered_at, last_heartbeat, metadata";

const KB_COLUMNS: &str = "id, kb_id, kb_type, endpoint, operations, schema, credentials, \
     status, registered_at, last_health_check, metadata";

#[async_trait]
impl RegistryRepository for SqliteRegistryRepository {
    async fn insert_agent(&self, record: &AgentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agents (id, identity, version, capabilities, operations, schemas, \
             health_endpoint, status, registered_at, last_heartbeat, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(record.agent_id.0.to_string())
        .bind(&record.identity)
        .bind(&record.version)
        .bind(encode_json(&record.capabilities)?)
        .bind(encode_json(&record.operations)?)
        .bind(encode_json(&record.schemas)?)
        .bind(&record.health_endpoint)
        .bind(record.status.as_str())
        .bind(encode_time(&record.registered_at))
        .bind(record.last_heartbeat.as_ref().map(encode_time))
        .bind(encode_json(&record.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, identity: &str) -> Result<Option<AgentRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE identity = ?1"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(
        &self,
        query: &RegistryQuery,
    ) -> Result<Vec<AgentRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents \
             WHERE (?1 IS NULL OR identity = ?1) AND (?2 IS NULL OR status = ?2) \
             ORDER BY identity ASC"
        ))
        .bind(query.identity.as_deref())
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            let agent = agent_from_row(row)?;
            if let Some(capability) = &query.capability {
                if !agent.capabilities.contains(capability) {
                    continue;
                }
            }
            agents.push(agent);
        }
        if let Some(limit) = query.limit {
            agents.truncate(limit as usize);
        }
        Ok(agents)
    }

    async fn update_agent_status(
        &self,
        identity: &str,
        status: HealthStatus,
    ) -> Result<(), RepositoryError> {
        let heartbeat = match status {
            HealthStatus::Active => Some(encode_time(&chrono::Utc::now())),
            _ => None,
        };
        let result = sqlx::query(
            "UPDATE agents SET status = ?1, \
             last_heartbeat = COALESCE(?2, last_heartbeat) WHERE identity = ?3",
        )
        .bind(status.as_str())
        .bind(heartbeat)
        .bind(identity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent '{identity}'")));
        }
        Ok(())
    }

    async fn update_agent_capabilities(
        &self,
        identity: &str,
        capabilities: &[String],
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE agents SET capabilities = ?1 WHERE identity = ?2")
            .bind(encode_json(&capabilities)?)
            .bind(identity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent '{identity}'")));
        }
        Ok(())
    }

    async fn delete_agent(&self, identity: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE identity = ?1")
            .bind(identity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent '{identity}'")));
        }
        Ok(())
    }

    async fn insert_kb(&self, record: &KbRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO knowledge_bases (id, kb_id, kb_type, endpoint, operations, schema, \
             credentials, status, registered_at, last_health_check, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(record.id.to_string())
        .bind(&record.kb_id)
        .bind(&record.kb_type)
        .bind(&record.endpoint)
        .bind(encode_json(&record.operations)?)
        .bind(encode_json(&record.schema)?)
        .bind(
            record
                .credentials
                .as_ref()
                .map(encode_json)
                .transpose()?,
        )
        .bind(record.status.as_str())
        .bind(encode_time(&record.registered_at))
        .bind(record.last_health_check.as_ref().map(encode_time))
        .bind(encode_json(&record.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_kb(&self, kb_id: &str) -> Result<Option<KbRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {KB_COLUMNS} FROM knowledge_bases WHERE kb_id = ?1"
        ))
        .bind(kb_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(kb_from_row).transpose()
    }

    async fn list_kbs(&self, query: &RegistryQuery) -> Result<Vec<KbRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {KB_COLUMNS} FROM knowledge_bases \
             WHERE (?1 IS NULL OR kb_id = ?1) AND (?2 IS NULL OR kb_type = ?2) \
             AND (?3 IS NULL OR status = ?3) \
             ORDER BY kb_id ASC"
        ))
        .bind(query.kb_id.as_deref())
        .bind(query.kb_type.as_deref())
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut kbs = Vec::with_capacity(rows.len());
        for row in &rows {
            kbs.push(kb_from_row(row)?);
        }
        if let Some(limit) = query.limit {
            kbs.truncate(limit as usize);
        }
        Ok(kbs)
    }

    async fn update_kb_status(
        &self,
        kb_id: &str,
        status: HealthStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE knowledge_bases SET status = ?1, last_health_check = ?2 WHERE kb_id = ?3",
        )
        .bind(status.as_str())
        .bind(encode_time(&chrono::Utc::now()))
        .bind(kb_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("kb '{kb_id}'")));
        }
        Ok(())
    }

    async fn delete_kb(&self, kb_id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE kb_id = ?1")
            .bind(kb_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("kb '{kb_id}'")));
        }
        Ok(())
    }
}
