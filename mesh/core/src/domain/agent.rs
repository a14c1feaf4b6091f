use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Health status shared by agents and knowledge bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Active,
    Degraded,
    Offline,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Active => "active",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(HealthStatus::Active),
            "degraded" => Some(HealthStatus::Degraded),
            "offline" => Some(HealthStatus::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration payload received on `mesh.registry.agent.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub identity: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub operations: Vec<String>,
    #[serde(default)]
    pub schemas: HashMap<String, serde_json::Value>,
    pub health_endpoint: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Agent row in the registry. `identity` is the stable unique key agents
/// address each other by; `agent_id` is the system-generated row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub identity: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub operations: Vec<String>,
    pub schemas: HashMap<String, serde_json::Value>,
    pub health_endpoint: String,
    pub status: HealthStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentRecord {
    pub fn new(registration: AgentRegistration) -> Self {
        Self {
            agent_id: AgentId::new(),
            identity: registration.identity,
            version: registration.version,
            capabilities: registration.capabilities,
            operations: registration.operations,
            schemas: registration.schemas,
            health_endpoint: registration.health_endpoint,
            status: HealthStatus::Offline,
            registered_at: Utc::now(),
            last_heartbeat: None,
            metadata: registration.metadata,
        }
    }
}
