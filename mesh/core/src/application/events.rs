// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Directory update events published on `mesh.directory.updates`.
//
// Wire shape: `{type, timestamp, data}`. Event payloads go through the
// records' serde views, so KB credentials can never appear in `data`.

use crate::domain::agent::{AgentRecord, HealthStatus};
use crate::domain::kb::KbRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    AgentRegistered {
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    },
    KbRegistered {
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    },
    StatusChanged {
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    },
    AgentCapabilityUpdated {
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    },
}

impl DirectoryEvent {
    pub fn agent_registered(record: &AgentRecord) -> Self {
        DirectoryEvent::AgentRegistered {
            timestamp: Utc::now(),
            data: json!({
                "identity": record.identity,
                "version": record.version,
                "capabilities": record.capabilities,
                "operations": record.operations,
                "status": record.status,
            }),
        }
    }

    pub fn kb_registered(record: &KbRecord) -> Self {
        DirectoryEvent::KbRegistered {
            timestamp: Utc::now(),
            data: json!({
                "kb_id": record.kb_id,
                "kb_type": record.kb_type,
                "operations": record.operations,
                "status": record.status,
            }),
        }
    }

    pub fn status_changed(
        entity_kind: &str,
        entity_id: &str,
        old_status: HealthStatus,
        new_status: HealthStatus,
    ) -> Self {
        DirectoryEvent::StatusChanged {
            timestamp: Utc::now(),
            data: json!({
                "entity_kind": entity_kind,
                "entity_id": entity_id,
                "old_status": old_status,
                "status": new_status,
            }),
        }
    }

    pub fn capability_updated(
        identity: &str,
        version: &str,
        old_capabilities: &[String],
        new_capabilities: &[String],
    ) -> Self {
        DirectoryEvent::AgentCapabilityUpdated {
            timestamp: Utc::now(),
            data: json!({
                "identity": identity,
                "version": version,
                "old_capabilities": old_capabilities,
                "capabilities": new_capabilities,
            }),
        }
    }
}
