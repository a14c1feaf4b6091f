use crate::domain::policy::PolicyDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Register,
    Query,
    Invoke,
    PolicyDecision,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Register => "register",
            AuditEventType::Query => "query",
            AuditEventType::Invoke => "invoke",
            AuditEventType::PolicyDecision => "policy_decision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "register" => Some(AuditEventType::Register),
            "query" => Some(AuditEventType::Query),
            "invoke" => Some(AuditEventType::Invoke),
            "policy_decision" => Some(AuditEventType::PolicyDecision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditOutcome::Success),
            "denied" => Some(AuditOutcome::Denied),
            "error" => Some(AuditOutcome::Error),
            _ => None,
        }
    }
}

/// One immutable audit event. Medium-weight fields are attached where the
/// request path has them; heavy fields only when heavy logging is enabled,
/// and `full_response` only after masking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_decision: Option<PolicyDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_request: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_chain: Option<Vec<String>>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        source_id: impl Into<String>,
        target_id: Option<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_type,
            source_id: source_id.into(),
            target_id,
            outcome,
            timestamp: Utc::now(),
            request_metadata: None,
            policy_decision: None,
            masked_fields: None,
            full_request: None,
            full_response: None,
            provenance_chain: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.request_metadata = Some(metadata);
        self
    }

    pub fn with_decision(mut self, decision: PolicyDecision) -> Self {
        self.policy_decision = Some(decision);
        self
    }

    pub fn with_masked_fields(mut self, fields: Vec<String>) -> Self {
        self.masked_fields = Some(fields);
        self
    }

    pub fn with_full_request(mut self, request: serde_json::Value) -> Self {
        self.full_request = Some(request);
        self
    }

    /// Heavy response capture. Callers must pass the masked value (the
    /// cleartext never reaches the audit store).
    pub fn with_full_response(mut self, response: serde_json::Value) -> Self {
        self.full_response = Some(response);
        self
    }
}

/// Stored audit row: the event plus its system-generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Filters for `mesh.audit.query`. `limit` is advisory and defaults to 100.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<AuditEventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AuditOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl AuditQuery {
    /// The `filters_applied` echo for query replies.
    pub fn filters_applied(&self) -> serde_json::Value {
        let mut filters = serde_json::Map::new();
        if let Some(event_type) = &self.event_type {
            filters.insert("event_type".into(), event_type.as_str().into());
        }
        if let Some(source_id) = &self.source_id {
            filters.insert("source_id".into(), source_id.as_str().into());
        }
        if let Some(target_id) = &self.target_id {
            filters.insert("target_id".into(), target_id.as_str().into());
        }
        if let Some(outcome) = &self.outcome {
            filters.insert("outcome".into(), outcome.as_str().into());
        }
        if let Some(start_time) = &self.start_time {
            filters.insert("start_time".into(), start_time.to_rfc3339().into());
        }
        if let Some(end_time) = &self.end_time {
            filters.insert("end_time".into(), end_time.to_rfc3339().into());
        }
        if let Some(limit) = self.limit {
            filters.insert("limit".into(), limit.into());
        }
        serde_json::Value::Object(filters)
    }
}
