use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Input document sent to the policy evaluator for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub principal_type: String,
    pub principal_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl DecisionInput {
    /// Decision input for an agent querying a KB.
    pub fn kb_query(requester_id: &str, kb_id: &str, operation: &str, kb_type: &str) -> Self {
        Self {
            principal_type: "agent".to_string(),
            principal_id: requester_id.to_string(),
            resource_type: "kb".to_string(),
            resource_id: kb_id.to_string(),
            action: operation.to_string(),
            context: Some(HashMap::from([(
                "kb_type".to_string(),
                serde_json::Value::String(kb_type.to_string()),
            )])),
        }
    }

    /// Decision input for an agent invoking another agent.
    pub fn agent_invoke(source_agent_id: &str, target_agent_id: &str, operation: &str) -> Self {
        Self {
            principal_type: "agent".to_string(),
            principal_id: source_agent_id.to_string(),
            resource_type: "agent".to_string(),
            resource_id: target_agent_id.to_string(),
            action: "invoke".to_string(),
            context: Some(HashMap::from([(
                "operation".to_string(),
                serde_json::Value::String(operation.to_string()),
            )])),
        }
    }
}

/// Decision document returned by the evaluator. Default deny: an absent or
/// empty result deserializes to `allow = false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDecision {
    #[serde(default)]
    pub allow: bool,
    #[serde(default)]
    pub masking_rules: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub policy_version: String,
}

impl PolicyDecision {
    pub fn default_deny() -> Self {
        Self {
            allow: false,
            masking_rules: Vec::new(),
            reason: "no matching policy (default deny)".to_string(),
            policy_version: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("evaluator unreachable: {0}")]
    Unavailable(String),

    #[error("evaluator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed evaluator response: {0}")]
    Malformed(String),
}

/// The policy evaluator surface the mesh consumes: decision evaluation plus
/// policy document lifecycle. Implemented over HTTP by the OPA client;
/// swapped for a stub in tests.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, input: &DecisionInput) -> Result<PolicyDecision, PolicyError>;

    async fn upload(&self, policy_id: &str, body: &str) -> Result<(), PolicyError>;

    async fn remove(&self, policy_id: &str) -> Result<(), PolicyError>;

    /// Evaluator liveness, surfaced in the `mesh.health` components block.
    async fn healthy(&self) -> bool {
        true
    }
}

/// Policy document row in the policy store. The body is opaque policy-language
/// text, mirrored to `{policy_id}.rego` on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_id: String,
    pub body: String,
    pub precedence: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kb_query_input_carries_kb_type_context() {
        let input = DecisionInput::kb_query("marketing-agent-2", "sales-kb-1", "sql_query", "postgres");
        assert_eq!(input.principal_type, "agent");
        assert_eq!(input.resource_type, "kb");
        assert_eq!(input.action, "sql_query");
        let context = input.context.unwrap();
        assert_eq!(context["kb_type"], serde_json::json!("postgres"));
    }

    #[test]
    fn test_agent_invoke_input_action_is_invoke() {
        let input = DecisionInput::agent_invoke("a", "b", "summarize");
        assert_eq!(input.action, "invoke");
        assert_eq!(input.resource_id, "b");
        let context = input.context.unwrap();
        assert_eq!(context["operation"], serde_json::json!("summarize"));
    }

    #[test]
    fn test_empty_decision_is_deny() {
        let decision: PolicyDecision = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!decision.allow);
        assert!(decision.masking_rules.is_empty());
    }

    #[test]
    fn test_decision_deserializes_masking_rules() {
        let decision: PolicyDecision = serde_json::from_value(serde_json::json!({
            "allow": true,
            "masking_rules": ["customer_email", "customer_phone"],
            "reason": "marketing may read sales",
            "policy_version": "v3"
        }))
        .unwrap();
        assert!(decision.allow);
        assert_eq!(decision.masking_rules.len(), 2);
        assert_eq!(decision.policy_version, "v3");
    }
}
