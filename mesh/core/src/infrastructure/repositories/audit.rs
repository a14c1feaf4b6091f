use super::{decode_json, decode_time, encode_json, encode_time};
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditQuery, AuditRecord};
use crate::domain::repository::{AuditRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

/// Append-only audit store. Rows are inserted once and never touched again;
/// the trait exposes no update or delete and neither does the SQL here.
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<AuditRecord, RepositoryError> {
    let id: String = row.try_get("id")?;
    let event_type: String = row.try_get("event_type")?;
    let outcome: String = row.try_get("outcome")?;
    let timestamp: String = row.try_get("timestamp")?;
    let request_metadata: Option<String> = row.try_get("request_metadata")?;
    let policy_decision: Option<String> = row.try_get("policy_decision")?;
    let masked_fields: Option<String> = row.try_get("masked_fields")?;
    let full_request: Option<String> = row.try_get("full_request")?;
    let full_response: Option<String> = row.try_get("full_response")?;
    let provenance_chain: Option<String> = row.try_get("provenance_chain")?;

    Ok(AuditRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| RepositoryError::Serialization(format!("bad audit id '{id}': {e}")))?,
        event: AuditEvent {
            event_type: AuditEventType::parse(&event_type).ok_or_else(|| {
                RepositoryError::Serialization(format!("unknown event type '{event_type}'"))
            })?,
            source_id: row.try_get("source_id")?,
            target_id: row.try_get("target_id")?,
            outcome: AuditOutcome::parse(&outcome).ok_or_else(|| {
                RepositoryError::Serialization(format!("unknown outcome '{outcome}'"))
            })?,
            timestamp: decode_time(&timestamp)?,
            request_metadata: request_metadata.as_deref().map(decode_json).transpose()?,
            policy_decision: policy_decision.as_deref().map(decode_json).transpose()?,
            masked_fields: masked_fields.as_deref().map(decode_json).transpose()?,
            full_request: full_request.as_deref().map(decode_json).transpose()?,
            full_response: full_response.as_deref().map(decode_json).transpose()?,
            provenance_chain: provenance_chain.as_deref().map(decode_json).transpose()?,
        },
    })
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, event: &AuditEvent) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO audit_logs (id, event_type, source_id, target_id, outcome, timestamp, \
             request_metadata, policy_decision, masked_fields, full_request, full_response, \
             provenance_chain) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(id.to_string())
        .bind(event.event_type.as_str())
        .bind(&event.source_id)
        .bind(event.target_id.as_deref())
        .bind(event.outcome.as_str())
        .bind(encode_time(&event.timestamp))
        .bind(event.request_metadata.as_ref().map(encode_json).transpose()?)
        .bind(event.policy_decision.as_ref().map(encode_json).transpose()?)
        .bind(event.masked_fields.as_ref().map(encode_json).transpose()?)
        .bind(event.full_request.as_ref().map(encode_json).transpose()?)
        .bind(event.full_response.as_ref().map(encode_json).transpose()?)
        .bind(event.provenance_chain.as_ref().map(encode_json).transpose()?)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, event_type, source_id, target_id, outcome, timestamp, \
             request_metadata, policy_decision, masked_fields, full_request, full_response, \
             provenance_chain \
             FROM audit_logs \
             WHERE (?1 IS NULL OR event_type = ?1) \
               AND (?2 IS NULL OR source_id = ?2) \
               AND (?3 IS NULL OR target_id = ?3) \
               AND (?4 IS NULL OR outcome = ?4) \
               AND (?5 IS NULL OR timestamp >= ?5) \
               AND (?6 IS NULL OR timestamp <= ?6) \
             ORDER BY timestamp DESC, id ASC \
             LIMIT CASE WHEN ?7 IS NULL THEN -1 ELSE ?7 END",
        )
        .bind(query.event_type.map(|t| t.as_str()))
        .bind(query.source_id.as_deref())
        .bind(query.target_id.as_deref())
        .bind(query.outcome.map(|o| o.as_str()))
        .bind(query.start_time.as_ref().map(encode_time))
        .bind(query.end_time.as_ref().map(encode_time))
        .bind(query.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }
}
