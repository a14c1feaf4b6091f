// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Request router - thin demux over `mesh.routing.*`.
//
// Parses the JSON, enforces required fields, attaches a request_id when the
// caller sent none, delegates to enforcement, and serializes the reply. No
// policy work happens here.

use crate::application::enforcement::{EnforcementService, Governed};
use crate::domain::error::MeshError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct KbQueryRequest {
    pub requester_id: String,
    pub kb_id: String,
    pub operation: String,
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AgentInvokeRequest {
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub operation: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct InvocationStatusRequest {
    pub tracking_id: Uuid,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

pub struct RequestRouter {
    enforcement: Arc<EnforcementService>,
}

impl RequestRouter {
    pub fn new(enforcement: Arc<EnforcementService>) -> Self {
        Self { enforcement }
    }

    pub async fn handle_kb_query(&self, payload: Value) -> Value {
        let request: KbQueryRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => return error_reply(None, &malformed(&e)),
        };
        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        if let Err(e) = require_non_empty(&[
            ("requester_id", &request.requester_id),
            ("kb_id", &request.kb_id),
            ("operation", &request.operation),
        ]) {
            return error_reply(Some(request_id), &e);
        }

        match self
            .enforcement
            .query_kb_governed(
                &request.requester_id,
                &request.kb_id,
                &request.operation,
                request.params,
            )
            .await
        {
            Ok(Governed::Allowed(outcome)) => json!({
                "status": "success",
                "request_id": request_id,
                "data": outcome.data,
                "audit": outcome.audit,
            }),
            Ok(Governed::Denied { reason }) => json!({
                "status": "denied",
                "request_id": request_id,
                "reason": reason,
            }),
            Err(e) => error_reply(Some(request_id), &e),
        }
    }

    pub async fn handle_agent_invoke(&self, payload: Value) -> Value {
        let request: AgentInvokeRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => return error_reply(None, &malformed(&e)),
        };
        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        if let Err(e) = require_non_empty(&[
            ("source_agent_id", &request.source_agent_id),
            ("target_agent_id", &request.target_agent_id),
            ("operation", &request.operation),
        ]) {
            return error_reply(Some(request_id), &e);
        }

        match self
            .enforcement
            .invoke_agent_governed(
                &request.source_agent_id,
                &request.target_agent_id,
                &request.operation,
                request.payload,
            )
            .await
        {
            Ok(Governed::Allowed(outcome)) => json!({
                "status": outcome.status,
                "request_id": request_id,
                "tracking_id": outcome.tracking_id,
            }),
            Ok(Governed::Denied { reason }) => json!({
                "status": "denied",
                "request_id": request_id,
                "reason": reason,
            }),
            Err(e) => error_reply(Some(request_id), &e),
        }
    }

    pub async fn handle_invocation_status(&self, payload: Value) -> Value {
        let request: InvocationStatusRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => return error_reply(None, &malformed(&e)),
        };
        match self.enforcement.invocation_status(request.tracking_id).await {
            Some(record) => match serde_json::to_value(&record) {
                Ok(body) => body,
                Err(e) => error_reply(None, &MeshError::from(e)),
            },
            None => error_reply(
                None,
                &MeshError::UnknownResource {
                    kind: "Invocation",
                    id: request.tracking_id.to_string(),
                },
            ),
        }
    }
}

fn malformed(e: &serde_json::Error) -> MeshError {
    MeshError::validation("request", e.to_string(), "fix the request shape and retry")
}

fn require_non_empty(fields: &[(&str, &str)]) -> Result<(), MeshError> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(MeshError::validation(
                *name,
                format!("{name} cannot be empty"),
                "provide a non-empty identifier",
            ));
        }
    }
    Ok(())
}

pub(crate) fn error_reply(request_id: Option<Uuid>, err: &MeshError) -> Value {
    let mut body = json!({
        "status": "error",
        "error": err.to_string(),
        "code": err.code(),
    });
    if let Some(request_id) = request_id {
        body["request_id"] = json!(request_id);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kb_query_request_defaults() {
        let request: KbQueryRequest = serde_json::from_value(json!({
            "requester_id": "marketing-agent-2",
            "kb_id": "sales-kb-1",
            "operation": "sql_query"
        }))
        .unwrap();
        assert!(request.params.is_object());
        assert!(request.request_id.is_none());
    }

    #[test]
    fn test_missing_required_field_fails_deserialization() {
        let result: Result<KbQueryRequest, _> =
            serde_json::from_value(json!({"requester_id": "a"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty(&[("kb_id", "sales-kb-1")]).is_ok());
        let err = require_non_empty(&[("kb_id", "  ")]).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_error_reply_shape() {
        let err = MeshError::Adapter("boom".to_string());
        let request_id = Uuid::new_v4();
        let reply = error_reply(Some(request_id), &err);
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["code"], "ADAPTER_ERROR");
        assert_eq!(reply["request_id"], json!(request_id));
    }
}
