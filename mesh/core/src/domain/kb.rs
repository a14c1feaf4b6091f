use crate::domain::agent::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// KB types the mesh ships adapter vocabularies for.
pub const SUPPORTED_KB_TYPES: &[&str] = &["postgres", "neo4j"];

/// Registration payload received on `mesh.registry.kb.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRegistration {
    pub kb_id: String,
    pub kb_type: String,
    pub endpoint: String,
    pub operations: Vec<String>,
    #[serde(default)]
    pub kb_schema: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// KB row in the registry. `credentials` never leaves the process: the field
/// is skipped by serde so no wire payload or directory event can carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRecord {
    pub id: Uuid,
    pub kb_id: String,
    pub kb_type: String,
    pub endpoint: String,
    pub operations: Vec<String>,
    pub schema: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    pub credentials: Option<HashMap<String, serde_json::Value>>,
    pub status: HealthStatus,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl KbRecord {
    pub fn new(registration: KbRegistration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kb_id: registration.kb_id,
            kb_type: registration.kb_type,
            endpoint: registration.endpoint,
            operations: registration.operations,
            schema: registration.kb_schema,
            credentials: registration.credentials,
            status: HealthStatus::Offline,
            registered_at: Utc::now(),
            last_health_check: None,
            metadata: registration.metadata,
        }
    }
}
