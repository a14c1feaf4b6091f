// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Directory - the read-only, filterable view over the registry.
//
// `total_count` reflects the filtered result before the advisory `limit`
// truncates the returned lists.

use crate::domain::agent::{AgentRecord, HealthStatus};
use crate::domain::error::MeshError;
use crate::domain::kb::KbRecord;
use crate::domain::repository::{RegistryQuery, RegistryRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 100;

/// Request shape for `mesh.directory.query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryRequest {
    /// `"agents"`, `"kbs"`, or absent for both.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_type_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectoryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kbs: Option<Vec<KbRecord>>,
    pub total_count: usize,
    pub filters_applied: serde_json::Value,
}

pub struct DirectoryService {
    registry: Arc<dyn RegistryRepository>,
}

impl DirectoryService {
    pub fn new(registry: Arc<dyn RegistryRepository>) -> Self {
        Self { registry }
    }

    pub async fn query(&self, request: DirectoryRequest) -> Result<DirectoryResponse, MeshError> {
        let (include_agents, include_kbs) = match request.entity_type.as_deref() {
            None => (true, true),
            Some("agents") => (true, false),
            Some("kbs") => (false, true),
            Some(other) => {
                return Err(MeshError::validation(
                    "type",
                    format!("unknown directory type '{other}'"),
                    "use 'agents' or 'kbs', or omit for both",
                ))
            }
        };

        let status = request
            .status_filter
            .as_deref()
            .map(|s| {
                HealthStatus::parse(s).ok_or_else(|| {
                    MeshError::validation(
                        "status_filter",
                        format!("unknown status '{s}'"),
                        "use 'active', 'degraded' or 'offline'",
                    )
                })
            })
            .transpose()?;

        let query = RegistryQuery {
            capability: request.capability_filter.clone(),
            kb_type: request.kb_type_filter.clone(),
            status,
            ..Default::default()
        };
        let limit = request.limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);

        let mut total_count = 0;
        let agents = if include_agents {
            let mut agents = self.registry.list_agents(&query).await?;
            total_count += agents.len();
            agents.truncate(limit);
            Some(agents)
        } else {
            None
        };
        let kbs = if include_kbs {
            let mut kbs = self.registry.list_kbs(&query).await?;
            total_count += kbs.len();
            kbs.truncate(limit);
            Some(kbs)
        } else {
            None
        };

        Ok(DirectoryResponse {
            agents,
            kbs,
            total_count,
            filters_applied: filters_applied(&request),
        })
    }

    /// Counts by status and kb_type, used by the `mesh.health` components
    /// block.
    pub async fn summary(&self) -> Result<serde_json::Value, MeshError> {
        let query = RegistryQuery::default();
        let agents = self.registry.list_agents(&query).await?;
        let kbs = self.registry.list_kbs(&query).await?;

        let mut agent_status_counts: HashMap<&'static str, usize> = HashMap::new();
        for agent in &agents {
            *agent_status_counts.entry(agent.status.as_str()).or_default() += 1;
        }
        let mut kb_status_counts: HashMap<&'static str, usize> = HashMap::new();
        let mut kb_type_counts: HashMap<String, usize> = HashMap::new();
        for kb in &kbs {
            *kb_status_counts.entry(kb.status.as_str()).or_default() += 1;
            *kb_type_counts.entry(kb.kb_type.clone()).or_default() += 1;
        }

        Ok(json!({
            "total_agents": agents.len(),
            "total_kbs": kbs.len(),
            "agent_status_counts": agent_status_counts,
            "kb_status_counts": kb_status_counts,
            "kb_type_counts": kb_type_counts,
        }))
    }
}

fn filters_applied(request: &DirectoryRequest) -> serde_json::Value {
    let mut filters = serde_json::Map::new();
    if let Some(entity_type) = &request.entity_type {
        filters.insert("type".into(), entity_type.as_str().into());
    }
    if let Some(capability) = &request.capability_filter {
        filters.insert("capability".into(), capability.as_str().into());
    }
    if let Some(kb_type) = &request.kb_type_filter {
        filters.insert("kb_type".into(), kb_type.as_str().into());
    }
    if let Some(status) = &request.status_filter {
        filters.insert("status".into(), status.as_str().into());
    }
    if let Some(limit) = request.limit {
        filters.insert("limit".into(), limit.into());
    }
    serde_json::Value::Object(filters)
}
