// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit query surface for `mesh.audit.query`.

use crate::domain::audit::{AuditQuery, AuditRecord};
use crate::domain::error::MeshError;
use crate::domain::repository::AuditRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditQueryResponse {
    pub audit_logs: Vec<AuditRecord>,
    pub total_count: usize,
    pub filters_applied: serde_json::Value,
}

pub struct AuditQueryService {
    audit: Arc<dyn AuditRepository>,
}

impl AuditQueryService {
    pub fn new(audit: Arc<dyn AuditRepository>) -> Self {
        Self { audit }
    }

    pub async fn query(&self, query: AuditQuery) -> Result<AuditQueryResponse, MeshError> {
        let filters_applied = query.filters_applied();

        // Inverted time ranges match nothing; that is a successful empty
        // result, not an error.
        if let (Some(start), Some(end)) = (query.start_time, query.end_time) {
            if start > end {
                return Ok(AuditQueryResponse {
                    audit_logs: Vec::new(),
                    total_count: 0,
                    filters_applied,
                });
            }
        }

        // total_count reflects the filter result; limit only truncates the
        // returned page.
        let unlimited = AuditQuery {
            limit: None,
            ..query.clone()
        };
        let mut audit_logs = self.audit.query(&unlimited).await.map_err(MeshError::from)?;
        let total_count = audit_logs.len();
        let limit = query.limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
        audit_logs.truncate(limit);

        Ok(AuditQueryResponse {
            audit_logs,
            total_count,
            filters_applied,
        })
    }
}
