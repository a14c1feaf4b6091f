// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Enforcement - authorize, dispatch, mask, audit.
//
// Both governed operations follow the same discipline: the policy decision
// comes first and a deny means the adapter is never contacted; the audit
// event commits before any reply leaves; masking is applied to the reply and
// to the heavy `full_response` capture, so cleartext never reaches the audit
// store. Evaluator failures are errors - the mesh fails closed.

use crate::config::AuditConfig;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome};
use crate::domain::error::MeshError;
use crate::domain::invocation::{InvocationRecord, InvocationStatus};
use crate::domain::kb::KbRecord;
use crate::domain::masking::mask;
use crate::domain::policy::{DecisionInput, PolicyEvaluator};
use crate::domain::repository::{AuditRepository, RegistryRepository};
use crate::infrastructure::transport::{subjects, Transport, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    pub dispatch_timeout: Duration,
    pub audit: AuditConfig,
}

/// Audit block echoed on successful governed replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyAudit {
    pub fields_masked: Vec<String>,
    pub policy_version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub data: Value,
    pub audit: ReplyAudit,
}

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub tracking_id: Uuid,
    pub status: InvocationStatus,
}

/// A governed request either passes enforcement or is denied with a reason.
/// Everything else is a `MeshError`.
#[derive(Debug, Clone)]
pub enum Governed<T> {
    Allowed(T),
    Denied { reason: String },
}

pub struct EnforcementService {
    registry: Arc<dyn RegistryRepository>,
    audit: Arc<dyn AuditRepository>,
    evaluator: Arc<dyn PolicyEvaluator>,
    transport: Arc<dyn Transport>,
    config: EnforcementConfig,
    invocations: Arc<RwLock<HashMap<Uuid, InvocationRecord>>>,
}

impl EnforcementService {
    pub fn new(
        registry: Arc<dyn RegistryRepository>,
        audit: Arc<dyn AuditRepository>,
        evaluator: Arc<dyn PolicyEvaluator>,
        transport: Arc<dyn Transport>,
        config: EnforcementConfig,
    ) -> Self {
        Self {
            registry,
            audit,
            evaluator,
            transport,
            config,
            invocations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Governed KB query: resolve, authorize, dispatch, mask, audit, reply.
    pub async fn query_kb_governed(
        &self,
        requester_id: &str,
        kb_id: &str,
        operation: &str,
        params: Value,
    ) -> Result<Governed<QueryOutcome>, MeshError> {
        let started = Instant::now();

        let kb = match self.registry.get_kb(kb_id).await {
            Ok(Some(kb)) => kb,
            Ok(None) => {
                let err = MeshError::UnknownResource {
                    kind: "KB",
                    id: kb_id.to_string(),
                };
                self.audit_query_error(requester_id, kb_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
            Err(e) => {
                let err = MeshError::from(e);
                self.audit_query_error(requester_id, kb_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        let input = DecisionInput::kb_query(requester_id, kb_id, operation, &kb.kb_type);
        let decision = match self.evaluator.evaluate(&input).await {
            Ok(decision) => decision,
            Err(e) => {
                let err = MeshError::EvaluatorUnavailable(e.to_string());
                self.audit_query_error(requester_id, kb_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        if !decision.allow {
            let reason = if decision.reason.is_empty() {
                "policy denied access".to_string()
            } else {
                decision.reason.clone()
            };
            warn!(requester_id, kb_id, operation, %reason, "kb query denied");
            self.append_audit(
                AuditEvent::new(
                    AuditEventType::Query,
                    requester_id,
                    Some(kb_id.to_string()),
                    AuditOutcome::Denied,
                )
                .with_metadata(json!({"operation": operation, "reason": reason}))
                .with_decision(decision),
            )
            .await?;
            return Ok(Governed::Denied { reason });
        }

        let request_body = json!({"operation": operation, "params": params});
        let timeout = kb_dispatch_timeout(&kb, self.config.dispatch_timeout);
        let reply = match self
            .transport
            .request(&subjects::adapter_query(kb_id), request_body.clone(), timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                let err = match e {
                    TransportError::Timeout(_) => {
                        MeshError::Adapter("adapter request timed out".to_string())
                    }
                    TransportError::NoResponders(subject) => {
                        MeshError::Adapter(format!("no adapter worker on '{subject}'"))
                    }
                    other => MeshError::Adapter(other.to_string()),
                };
                self.audit_query_error(requester_id, kb_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        if reply.get("status").and_then(Value::as_str) != Some("success") {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("adapter returned an error")
                .to_string();
            let err = MeshError::Adapter(message);
            self.audit_query_error(requester_id, kb_id, operation, &err.to_string())
                .await?;
            return Err(err);
        }
        let raw = reply.get("data").cloned().unwrap_or(Value::Null);

        let masked = mask(&raw, &decision.masking_rules);
        let timestamp = Utc::now();
        let mut event = AuditEvent::new(
            AuditEventType::Query,
            requester_id,
            Some(kb_id.to_string()),
            AuditOutcome::Success,
        )
        .with_metadata(json!({
            "operation": operation,
            "latency_ms": started.elapsed().as_secs_f64() * 1000.0,
        }))
        .with_decision(decision.clone())
        .with_masked_fields(decision.masking_rules.clone());
        if self.config.audit.log_full_request {
            event = event.with_full_request(request_body);
        }
        if self.config.audit.log_full_response {
            event = event.with_full_response(masked.clone());
        }
        self.append_audit(event).await?;

        info!(requester_id, kb_id, operation, masked = decision.masking_rules.len(), "kb query served");
        Ok(Governed::Allowed(QueryOutcome {
            data: masked,
            audit: ReplyAudit {
                fields_masked: decision.masking_rules,
                policy_version: decision.policy_version,
                timestamp,
            },
        }))
    }

    /// Governed agent invocation. Authorization and the `queued` audit event
    /// happen before the reply; the dispatch itself runs as its own task and
    /// drives the invocation through `processing` to a terminal state,
    /// publishing that terminal state on `mesh.routing.completion`.
    pub async fn invoke_agent_governed(
        &self,
        source_agent_id: &str,
        target_agent_id: &str,
        operation: &str,
        payload: Value,
    ) -> Result<Governed<InvokeOutcome>, MeshError> {
        match self.registry.get_agent(target_agent_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let err = MeshError::UnknownResource {
                    kind: "Agent",
                    id: target_agent_id.to_string(),
                };
                self.audit_invoke_error(source_agent_id, target_agent_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
            Err(e) => {
                let err = MeshError::from(e);
                self.audit_invoke_error(source_agent_id, target_agent_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
        }

        let input = DecisionInput::agent_invoke(source_agent_id, target_agent_id, operation);
        let decision = match self.evaluator.evaluate(&input).await {
            Ok(decision) => decision,
            Err(e) => {
                let err = MeshError::EvaluatorUnavailable(e.to_string());
                self.audit_invoke_error(source_agent_id, target_agent_id, operation, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        if !decision.allow {
            let reason = if decision.reason.is_empty() {
                "policy denied invocation".to_string()
            } else {
                decision.reason.clone()
            };
            warn!(source_agent_id, target_agent_id, operation, %reason, "invocation denied");
            self.append_audit(
                AuditEvent::new(
                    AuditEventType::Invoke,
                    source_agent_id,
                    Some(target_agent_id.to_string()),
                    AuditOutcome::Denied,
                )
                .with_metadata(json!({"operation": operation, "reason": reason}))
                .with_decision(decision),
            )
            .await?;
            return Ok(Governed::Denied { reason });
        }

        let record = InvocationRecord::new(source_agent_id, target_agent_id, operation, payload);
        let tracking_id = record.tracking_id;

        self.append_audit(
            AuditEvent::new(
                AuditEventType::Invoke,
                source_agent_id,
                Some(target_agent_id.to_string()),
                AuditOutcome::Success,
            )
            .with_metadata(json!({
                "operation": operation,
                "tracking_id": tracking_id,
                "status": InvocationStatus::Queued,
                "authorization": "granted",
            }))
            .with_decision(decision),
        )
        .await?;

        self.invocations
            .write()
            .await
            .insert(tracking_id, record.clone());
        self.spawn_dispatch(record);

        Ok(Governed::Allowed(InvokeOutcome {
            tracking_id,
            status: InvocationStatus::Queued,
        }))
    }

    pub async fn invocation_status(&self, tracking_id: Uuid) -> Option<InvocationRecord> {
        self.invocations.read().await.get(&tracking_id).cloned()
    }

    fn spawn_dispatch(&self, record: InvocationRecord) {
        let transport = Arc::clone(&self.transport);
        let audit = Arc::clone(&self.audit);
        let invocations = Arc::clone(&self.invocations);
        let timeout = self.config.dispatch_timeout;

        tokio::spawn(async move {
            let tracking_id = record.tracking_id;
            let subject = subjects::agent_inbox(&record.target_agent_id);

            if let Some(invocation) = invocations.write().await.get_mut(&tracking_id) {
                invocation.begin_processing();
            }
            append_lifecycle(&audit, &record, InvocationStatus::Processing, None).await;

            let request = json!({
                "tracking_id": tracking_id,
                "source": record.source_agent_id,
                "operation": record.operation,
                "payload": record.payload,
            });
            let outcome = transport.request(&subject, request, timeout).await;

            let (status, result, error_text) = match outcome {
                Ok(reply) if reply.get("status").and_then(Value::as_str) == Some("error") => {
                    let message = reply
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("target agent returned an error")
                        .to_string();
                    (InvocationStatus::Error, None, Some(message))
                }
                Ok(reply) => (InvocationStatus::Completed, Some(reply), None),
                Err(e) => (InvocationStatus::Error, None, Some(e.to_string())),
            };

            {
                let mut invocations = invocations.write().await;
                if let Some(invocation) = invocations.get_mut(&tracking_id) {
                    match (&status, &result, &error_text) {
                        (InvocationStatus::Completed, Some(result), _) => {
                            invocation.complete(result.clone())
                        }
                        (_, _, Some(error_text)) => invocation.fail(error_text.clone()),
                        _ => invocation.fail("dispatch failed"),
                    }
                }
            }
            append_lifecycle(&audit, &record, status, error_text.clone()).await;

            let completion = json!({
                "tracking_id": tracking_id,
                "status": status,
                "result": result,
                "error": error_text,
            });
            if let Err(e) = transport.publish(subjects::COMPLETION, completion).await {
                warn!(%tracking_id, error = %e, "failed to publish completion");
            }
            info!(%tracking_id, status = status.as_str(), "invocation finished");
        });
    }

    async fn audit_query_error(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
        error_text: &str,
    ) -> Result<(), MeshError> {
        self.append_audit(
            AuditEvent::new(
                AuditEventType::Query,
                source_id,
                Some(target_id.to_string()),
                AuditOutcome::Error,
            )
            .with_metadata(json!({"operation": operation, "error": error_text})),
        )
        .await
    }

    async fn audit_invoke_error(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
        error_text: &str,
    ) -> Result<(), MeshError> {
        self.append_audit(
            AuditEvent::new(
                AuditEventType::Invoke,
                source_id,
                Some(target_id.to_string()),
                AuditOutcome::Error,
            )
            .with_metadata(json!({"operation": operation, "error": error_text})),
        )
        .await
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), MeshError> {
        self.audit
            .append(&event)
            .await
            .map(|_| ())
            .map_err(|e| MeshError::AuditFailure(e.to_string()))
    }
}

/// Per-invocation transition events appended after the reply. A failure here
/// can only be logged; the row for the governed request itself is already
/// committed.
async fn append_lifecycle(
    audit: &Arc<dyn AuditRepository>,
    record: &InvocationRecord,
    status: InvocationStatus,
    error_text: Option<String>,
) {
    let outcome = match status {
        InvocationStatus::Error => AuditOutcome::Error,
        _ => AuditOutcome::Success,
    };
    let event = AuditEvent::new(
        AuditEventType::Invoke,
        record.source_agent_id.clone(),
        Some(record.target_agent_id.clone()),
        outcome,
    )
    .with_metadata(json!({
        "operation": record.operation,
        "tracking_id": record.tracking_id,
        "status": status,
        "error": error_text,
    }));
    if let Err(e) = audit.append(&event).await {
        error!(tracking_id = %record.tracking_id, error = %e, "failed to append lifecycle audit event");
    }
}

fn kb_dispatch_timeout(kb: &KbRecord, default: Duration) -> Duration {
    kb.metadata
        .get("dispatch_timeout_secs")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(default)
}
