use super::{decode_json, decode_time, encode_json, encode_time};
use crate::domain::policy::PolicyRecord;
use crate::domain::repository::{PolicyRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

pub struct SqlitePolicyRepository {
    pool: SqlitePool,
}

impl SqlitePolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PolicyRecord, RepositoryError> {
    let active: i64 = row.try_get("active")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(PolicyRecord {
        policy_id: row.try_get("policy_id")?,
        body: row.try_get("body")?,
        precedence: row.try_get("precedence")?,
        active: active != 0,
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
        metadata: decode_json(&metadata)?,
    })
}

#[async_trait]
impl PolicyRepository for SqlitePolicyRepository {
    async fn upsert(&self, record: &PolicyRecord) -> Result<(), RepositoryError> {
        // Last writer wins; the original created_at survives re-uploads.
        sqlx::query(
            "INSERT INTO policies (policy_id, body, precedence, active, created_at, updated_at, \
             metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (policy_id) DO UPDATE SET \
                 body = excluded.body, \
                 precedence = excluded.precedence, \
                 active = excluded.active, \
                 updated_at = excluded.updated_at, \
                 metadata = excluded.metadata",
        )
        .bind(&record.policy_id)
        .bind(&record.body)
        .bind(record.precedence)
        .bind(record.active as i64)
        .bind(encode_time(&record.created_at))
        .bind(encode_time(&record.updated_at))
        .bind(encode_json(&record.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, policy_id: &str) -> Result<Option<PolicyRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT policy_id, body, precedence, active, created_at, updated_at, metadata \
             FROM policies WHERE policy_id = ?1",
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<PolicyRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT policy_id, body, precedence, active, created_at, updated_at, metadata \
             FROM policies ORDER BY precedence ASC, policy_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn delete(&self, policy_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM policies WHERE policy_id = ?1")
            .bind(policy_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
