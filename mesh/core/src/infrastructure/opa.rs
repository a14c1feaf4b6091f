// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OPA (Open Policy Agent) client.
//
// Anti-Corruption Layer for the external policy evaluator: decisions are
// fetched from the data API, policy documents are managed through the policy
// API. Evaluator failures are errors, never decisions - the mesh fails
// closed at the enforcement layer.

use crate::domain::policy::{DecisionInput, PolicyDecision, PolicyError, PolicyEvaluator};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Package path of the decision document queried for every request.
pub const DECISION_PATH: &str = "agentmesh/decision";

pub struct OpaClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct DecisionEnvelope {
    #[serde(default)]
    result: Option<PolicyDecision>,
}

#[derive(Deserialize)]
struct PolicyEnvelope {
    #[serde(default)]
    result: Option<PolicyDocument>,
}

#[derive(Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    raw: String,
}

impl OpaClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path)
    }

    /// Liveness probe of the evaluator itself, used by `mesh.health`.
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint("health");
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Raw policy module text as stored by the evaluator, `None` on 404.
    pub async fn fetch_raw(&self, policy_id: &str) -> Result<Option<String>, PolicyError> {
        let url = self.endpoint(&format!("v1/policies/{policy_id}"));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let envelope: PolicyEnvelope = response
            .json()
            .await
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;
        Ok(envelope.result.map(|doc| doc.raw))
    }
}

async fn status_error(response: reqwest::Response) -> PolicyError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PolicyError::Status { status, body }
}

#[async_trait]
impl PolicyEvaluator for OpaClient {
    async fn evaluate(&self, input: &DecisionInput) -> Result<PolicyDecision, PolicyError> {
        let url = self.endpoint(&format!("v1/data/{DECISION_PATH}"));
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let envelope: DecisionEnvelope = response
            .json()
            .await
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;

        // An undefined decision document means no policy matched: default deny.
        let decision = envelope.result.unwrap_or_else(PolicyDecision::default_deny);
        debug!(
            principal = %input.principal_id,
            resource = %input.resource_id,
            action = %input.action,
            allow = decision.allow,
            "policy decision"
        );
        Ok(decision)
    }

    async fn upload(&self, policy_id: &str, body: &str) -> Result<(), PolicyError> {
        let url = self.endpoint(&format!("v1/policies/{policy_id}"));
        let response = self
            .client
            .put(&url)
            .timeout(self.timeout)
            .header("Content-Type", "text/plain")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn remove(&self, policy_id: &str) -> Result<(), PolicyError> {
        let url = self.endpoint(&format!("v1/policies/{policy_id}"));
        let response = self
            .client
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PolicyError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn healthy(&self) -> bool {
        self.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_envelope_with_result() {
        let envelope: DecisionEnvelope = serde_json::from_value(serde_json::json!({
            "result": {"allow": true, "masking_rules": ["customer_email"], "reason": "ok"}
        }))
        .unwrap();
        let decision = envelope.result.unwrap();
        assert!(decision.allow);
        assert_eq!(decision.masking_rules, vec!["customer_email"]);
    }

    #[test]
    fn test_undefined_decision_defaults_to_deny() {
        let envelope: DecisionEnvelope =
            serde_json::from_value(serde_json::json!({})).unwrap();
        let decision = envelope.result.unwrap_or_else(PolicyDecision::default_deny);
        assert!(!decision.allow);
        assert!(decision.reason.contains("default deny"));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = OpaClient::new("http://localhost:8181/", Duration::from_secs(5));
        assert_eq!(
            client.endpoint("v1/data/agentmesh/decision"),
            "http://localhost:8181/v1/data/agentmesh/decision"
        );
    }

    #[test]
    fn test_policy_envelope_extracts_raw() {
        let envelope: PolicyEnvelope = serde_json::from_value(serde_json::json!({
            "result": {"id": "kb-access", "raw": "package agentmesh\n"}
        }))
        .unwrap();
        assert_eq!(envelope.result.unwrap().raw, "package agentmesh\n");
    }
}
