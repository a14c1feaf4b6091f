use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one agent-to-agent invocation:
///
/// ```text
/// [queued] --ack--> [processing] --done--> [completed]
///                        |
///                        +--error/timeout--> [error]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Queued => "queued",
            InvocationStatus::Processing => "processing",
            InvocationStatus::Completed => "completed",
            InvocationStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationStatus::Completed | InvocationStatus::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub tracking_id: Uuid,
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub operation: String,
    pub payload: serde_json::Value,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl InvocationRecord {
    pub fn new(
        source_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        operation: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tracking_id: Uuid::new_v4(),
            source_agent_id: source_agent_id.into(),
            target_agent_id: target_agent_id.into(),
            operation: operation.into(),
            payload,
            status: InvocationStatus::Queued,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn begin_processing(&mut self) {
        self.status = InvocationStatus::Processing;
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = InvocationStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = InvocationStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_microseconds().unwrap_or(0) as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InvocationRecord {
        InvocationRecord::new("agent-a", "agent-b", "summarize", serde_json::json!({"text": "hi"}))
    }

    #[test]
    fn test_new_invocation_is_queued() {
        let invocation = record();
        assert_eq!(invocation.status, InvocationStatus::Queued);
        assert!(!invocation.status.is_terminal());
        assert!(invocation.completed_at.is_none());
    }

    #[test]
    fn test_complete_transition() {
        let mut invocation = record();
        invocation.begin_processing();
        assert_eq!(invocation.status, InvocationStatus::Processing);
        invocation.complete(serde_json::json!({"summary": "ok"}));
        assert_eq!(invocation.status, InvocationStatus::Completed);
        assert!(invocation.status.is_terminal());
        assert!(invocation.completed_at.is_some());
        assert!(invocation.latency_ms().is_some());
    }

    #[test]
    fn test_error_transition() {
        let mut invocation = record();
        invocation.begin_processing();
        invocation.fail("target unreachable");
        assert_eq!(invocation.status, InvocationStatus::Error);
        assert_eq!(invocation.error.as_deref(), Some("target unreachable"));
        assert!(invocation.result.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(InvocationStatus::Processing).unwrap();
        assert_eq!(json, serde_json::json!("processing"));
    }
}
