// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy administration - upload, list, inspect, delete policy documents.
//
// A document lives in three places: the evaluator (authoritative for
// decisions), the policy store row, and the on-disk `{policy_id}.rego`
// mirror. Uploads write the evaluator first, then the row, then the mirror;
// mirror writes go through a temp file + rename so a document is atomic on
// disk. Concurrent uploads of the same id are last-writer-wins.

use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome};
use crate::domain::error::MeshError;
use crate::domain::policy::{PolicyError, PolicyEvaluator, PolicyRecord};
use crate::domain::repository::{AuditRepository, PolicyRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_PRECEDENCE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUploaded {
    pub policy_id: String,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

pub struct PolicyAdminService {
    policies: Arc<dyn PolicyRepository>,
    audit: Arc<dyn AuditRepository>,
    evaluator: Arc<dyn PolicyEvaluator>,
    mirror_dir: PathBuf,
}

impl PolicyAdminService {
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        audit: Arc<dyn AuditRepository>,
        evaluator: Arc<dyn PolicyEvaluator>,
        mirror_dir: PathBuf,
    ) -> Self {
        Self {
            policies,
            audit,
            evaluator,
            mirror_dir,
        }
    }

    pub async fn upload_policy(
        &self,
        policy_id: &str,
        body: &str,
        persist: bool,
    ) -> Result<PolicyUploaded, MeshError> {
        validate_policy_id(policy_id)?;

        self.evaluator
            .upload(policy_id, body)
            .await
            .map_err(map_policy_error)?;

        let now = Utc::now();
        let created_at = match self.policies.get(policy_id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        self.policies
            .upsert(&PolicyRecord {
                policy_id: policy_id.to_string(),
                body: body.to_string(),
                precedence: DEFAULT_PRECEDENCE,
                active: true,
                created_at,
                updated_at: now,
                metadata: HashMap::new(),
            })
            .await?;

        let file_path = if persist {
            match self.write_mirror(policy_id, body).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    // The evaluator and store already have the document; a
                    // missing mirror only costs restart resync.
                    warn!(policy_id, error = %e, "failed to mirror policy to disk");
                    None
                }
            }
        } else {
            None
        };

        info!(policy_id, persisted = file_path.is_some(), "policy uploaded");
        self.append_audit(policy_id, "upload", file_path.is_some()).await;

        Ok(PolicyUploaded {
            policy_id: policy_id.to_string(),
            persisted: file_path.is_some(),
            file_path,
        })
    }

    pub async fn list_policies(&self) -> Result<Vec<PolicyRecord>, MeshError> {
        Ok(self.policies.list().await?)
    }

    pub async fn get_policy(&self, policy_id: &str) -> Result<PolicyRecord, MeshError> {
        self.policies
            .get(policy_id)
            .await?
            .ok_or_else(|| MeshError::UnknownResource {
                kind: "Policy",
                id: policy_id.to_string(),
            })
    }

    /// Raw policy-language text of one document.
    pub async fn get_policy_content(&self, policy_id: &str) -> Result<String, MeshError> {
        Ok(self.get_policy(policy_id).await?.body)
    }

    pub async fn delete_policy(&self, policy_id: &str) -> Result<(), MeshError> {
        validate_policy_id(policy_id)?;

        self.evaluator
            .remove(policy_id)
            .await
            .map_err(map_policy_error)?;

        if !self.policies.delete(policy_id).await? {
            return Err(MeshError::UnknownResource {
                kind: "Policy",
                id: policy_id.to_string(),
            });
        }

        let mirror = self.mirror_path(policy_id);
        if let Err(e) = tokio::fs::remove_file(&mirror).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(policy_id, error = %e, "failed to remove policy mirror file");
            }
        }

        info!(policy_id, "policy deleted");
        self.append_audit(policy_id, "delete", false).await;
        Ok(())
    }

    fn mirror_path(&self, policy_id: &str) -> PathBuf {
        self.mirror_dir.join(format!("{policy_id}.rego"))
    }

    async fn write_mirror(&self, policy_id: &str, body: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.mirror_dir).await?;
        let path = self.mirror_path(policy_id);
        let staging = self.mirror_dir.join(format!("{policy_id}.rego.tmp"));
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(path)
    }

    async fn append_audit(&self, policy_id: &str, action: &str, persisted: bool) {
        let event = AuditEvent::new(
            AuditEventType::PolicyDecision,
            "policy-admin",
            Some(policy_id.to_string()),
            AuditOutcome::Success,
        )
        .with_metadata(json!({"action": action, "persisted": persisted}));
        if let Err(e) = self.audit.append(&event).await {
            warn!(policy_id, error = %e, "failed to append policy audit event");
        }
    }
}

fn validate_policy_id(policy_id: &str) -> Result<(), MeshError> {
    let valid = !policy_id.is_empty()
        && policy_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(MeshError::validation(
            "policy_id",
            format!("invalid policy id '{policy_id}'"),
            "use letters, digits, '-' and '_' only",
        ));
    }
    Ok(())
}

fn map_policy_error(err: PolicyError) -> MeshError {
    match err {
        PolicyError::Status { status, body } if (400..500).contains(&status) => {
            MeshError::validation("body", format!("evaluator rejected policy: {body}"), "fix the policy source and retry")
        }
        other => MeshError::EvaluatorUnavailable(other.to_string()),
    }
}
