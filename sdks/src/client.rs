use anyhow::{bail, Context, Result};
use mesh_core::application::audit_query::AuditQueryResponse;
use mesh_core::application::directory::{DirectoryRequest, DirectoryResponse};
use mesh_core::application::enforcement::ReplyAudit;
use mesh_core::application::registry::{AgentRegistered, KbRegistered};
use mesh_core::domain::agent::AgentRegistration;
use mesh_core::domain::audit::AuditQuery;
use mesh_core::domain::invocation::InvocationRecord;
use mesh_core::domain::kb::KbRegistration;
use mesh_core::infrastructure::transport::{subjects, Subscription, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Reply of a governed KB query.
#[derive(Debug, Deserialize)]
pub struct KbQueryReply {
    pub status: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub audit: Option<ReplyAudit>,
}

/// Reply of a governed agent invocation.
#[derive(Debug, Deserialize)]
pub struct InvokeReply {
    pub status: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub tracking_id: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Client for the mesh subjects.
pub struct MeshClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl MeshClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-request deadline (default 5 s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn register_agent(&self, registration: &AgentRegistration) -> Result<AgentRegistered> {
        let reply = self
            .request(subjects::AGENT_REGISTER, serde_json::to_value(registration)?)
            .await?;
        decode(reply)
    }

    pub async fn register_kb(&self, registration: &KbRegistration) -> Result<KbRegistered> {
        let reply = self
            .request(subjects::KB_REGISTER, serde_json::to_value(registration)?)
            .await?;
        decode(reply)
    }

    pub async fn query_directory(&self, request: &DirectoryRequest) -> Result<DirectoryResponse> {
        let reply = self
            .request(subjects::DIRECTORY_QUERY, serde_json::to_value(request)?)
            .await?;
        decode(reply)
    }

    /// Governed KB query. A `denied` or `error` status comes back in the
    /// reply, not as an `Err`; transport failures are errors.
    pub async fn query_kb(
        &self,
        requester_id: &str,
        kb_id: &str,
        operation: &str,
        params: Value,
    ) -> Result<KbQueryReply> {
        let reply = self
            .request(
                subjects::KB_QUERY,
                json!({
                    "requester_id": requester_id,
                    "kb_id": kb_id,
                    "operation": operation,
                    "params": params,
                }),
            )
            .await?;
        serde_json::from_value(reply).context("malformed kb query reply")
    }

    pub async fn invoke_agent(
        &self,
        source_agent_id: &str,
        target_agent_id: &str,
        operation: &str,
        payload: Value,
    ) -> Result<InvokeReply> {
        let reply = self
            .request(
                subjects::AGENT_INVOKE,
                json!({
                    "source_agent_id": source_agent_id,
                    "target_agent_id": target_agent_id,
                    "operation": operation,
                    "payload": payload,
                }),
            )
            .await?;
        serde_json::from_value(reply).context("malformed invoke reply")
    }

    pub async fn invocation_status(&self, tracking_id: Uuid) -> Result<InvocationRecord> {
        let reply = self
            .request(subjects::INVOKE_STATUS, json!({"tracking_id": tracking_id}))
            .await?;
        decode(reply)
    }

    pub async fn query_audit(&self, query: &AuditQuery) -> Result<AuditQueryResponse> {
        let reply = self
            .request(subjects::AUDIT_QUERY, serde_json::to_value(query)?)
            .await?;
        decode(reply)
    }

    pub async fn health(&self) -> Result<Value> {
        self.request(subjects::HEALTH, json!({})).await
    }

    /// Live stream of `mesh.directory.updates`.
    pub async fn subscribe_directory_updates(&self) -> Result<Subscription> {
        Ok(self.transport.subscribe(subjects::DIRECTORY_UPDATES).await?)
    }

    /// Live stream of invocation terminal states.
    pub async fn subscribe_completions(&self) -> Result<Subscription> {
        Ok(self.transport.subscribe(subjects::COMPLETION).await?)
    }

    async fn request(&self, subject: &str, payload: Value) -> Result<Value> {
        self.transport
            .request(subject, payload, self.timeout)
            .await
            .with_context(|| format!("request on '{subject}' failed"))
    }
}

/// Registry-style replies carry `{error, code}` on failure.
fn decode<T: DeserializeOwned>(reply: Value) -> Result<T> {
    if let (Some(error), Some(code)) = (
        reply.get("error").and_then(Value::as_str),
        reply.get("code").and_then(Value::as_str),
    ) {
        bail!("{code}: {error}");
    }
    serde_json::from_value(reply).context("malformed reply")
}
