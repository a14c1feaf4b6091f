// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Shared harness for the end-to-end tests: a full mesh server over the
// in-process transport, an in-memory SQLite store, a programmable policy
// evaluator, and stubbed probes so nothing touches the network.

#![allow(dead_code)]

use async_trait::async_trait;
use mesh_core::config::{AuditConfig, MeshConfig};
use mesh_core::domain::policy::{DecisionInput, PolicyDecision, PolicyError, PolicyEvaluator};
use mesh_core::infrastructure::adapter::{AdapterError, AdapterWorker, KbDriver};
use mesh_core::infrastructure::probe::{EndpointProbe, ProbeResult};
use mesh_core::infrastructure::transport::{InProcessTransport, Transport};
use mesh_core::presentation::server::MeshServer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct StubEvaluator {
    decisions: Mutex<HashMap<(String, String, String), PolicyDecision>>,
    unavailable: AtomicBool,
    pub uploaded: Mutex<Vec<String>>,
}

impl StubEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            uploaded: Mutex::new(Vec::new()),
        })
    }

    pub async fn allow(
        &self,
        principal: &str,
        resource: &str,
        action: &str,
        masking_rules: &[&str],
    ) {
        self.decisions.lock().await.insert(
            (principal.to_string(), resource.to_string(), action.to_string()),
            PolicyDecision {
                allow: true,
                masking_rules: masking_rules.iter().map(|s| s.to_string()).collect(),
                reason: format!("{principal} may {action} {resource}"),
                policy_version: "v1".to_string(),
            },
        );
    }

    pub async fn deny(&self, principal: &str, resource: &str, action: &str, reason: &str) {
        self.decisions.lock().await.insert(
            (principal.to_string(), resource.to_string(), action.to_string()),
            PolicyDecision {
                allow: false,
                masking_rules: Vec::new(),
                reason: reason.to_string(),
                policy_version: "v1".to_string(),
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyEvaluator for StubEvaluator {
    async fn evaluate(&self, input: &DecisionInput) -> Result<PolicyDecision, PolicyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PolicyError::Unavailable("connection refused".to_string()));
        }
        let key = (
            input.principal_id.clone(),
            input.resource_id.clone(),
            input.action.clone(),
        );
        Ok(self
            .decisions
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_else(PolicyDecision::default_deny))
    }

    async fn upload(&self, policy_id: &str, _body: &str) -> Result<(), PolicyError> {
        self.uploaded.lock().await.push(policy_id.to_string());
        Ok(())
    }

    async fn remove(&self, _policy_id: &str) -> Result<(), PolicyError> {
        Ok(())
    }
}

pub struct StubProbe {
    ok: AtomicBool,
}

impl StubProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ok: AtomicBool::new(true),
        })
    }

    pub fn set_ok(&self, ok: bool) {
        self.ok.store(ok, Ordering::SeqCst);
    }

    fn result(&self) -> ProbeResult {
        if self.ok.load(Ordering::SeqCst) {
            ProbeResult {
                status: mesh_core::domain::agent::HealthStatus::Active,
                latency_ms: 1.0,
                error: None,
            }
        } else {
            ProbeResult {
                status: mesh_core::domain::agent::HealthStatus::Offline,
                latency_ms: 1.0,
                error: Some("probe failed".to_string()),
            }
        }
    }
}

#[async_trait]
impl EndpointProbe for StubProbe {
    async fn probe_agent(&self, _health_endpoint: &str) -> ProbeResult {
        self.result()
    }

    async fn probe_kb(&self, _endpoint: &str) -> ProbeResult {
        self.result()
    }
}

/// Driver returning a canned payload; counts executions so tests can assert
/// a denied request never reached the adapter.
pub struct StaticDriver {
    pub response: Value,
    pub calls: AtomicUsize,
}

impl StaticDriver {
    pub fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KbDriver for StaticDriver {
    async fn execute(&self, _operation: &str, _params: Value) -> Result<Value, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Driver whose backend is down.
pub struct FailingDriver;

#[async_trait]
impl KbDriver for FailingDriver {
    async fn execute(&self, _operation: &str, _params: Value) -> Result<Value, AdapterError> {
        Err(AdapterError::Backend("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        Err(AdapterError::Backend("connection refused".to_string()))
    }
}

pub struct TestMesh {
    pub server: MeshServer,
    pub transport: Arc<InProcessTransport>,
    pub evaluator: Arc<StubEvaluator>,
    pub probe: Arc<StubProbe>,
    pub policy_dir: tempfile::TempDir,
}

pub async fn start_mesh() -> TestMesh {
    let policy_dir = tempfile::tempdir().expect("tempdir");
    let config = MeshConfig {
        database_url: "sqlite::memory:".to_string(),
        policy_dir: policy_dir.path().to_path_buf(),
        // long interval: tests drive sweeps by hand
        health_interval: Duration::from_secs(3600),
        health_failure_threshold: 3,
        dispatch_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        audit: AuditConfig::default(),
        ..Default::default()
    };

    let transport = InProcessTransport::with_default_capacity();
    let evaluator = StubEvaluator::new();
    let probe = StubProbe::new();

    let server = MeshServer::build(
        config,
        transport.clone() as Arc<dyn Transport>,
        evaluator.clone() as Arc<dyn PolicyEvaluator>,
        probe.clone() as Arc<dyn EndpointProbe>,
    )
    .await
    .expect("mesh server builds");
    server.start().await.expect("mesh server starts");

    TestMesh {
        server,
        transport,
        evaluator,
        probe,
        policy_dir,
    }
}

impl TestMesh {
    pub async fn request(&self, subject: &str, payload: Value) -> Value {
        self.transport
            .request(subject, payload, Duration::from_secs(2))
            .await
            .expect("request succeeds at the transport level")
    }

    pub async fn register_agent(&self, identity: &str) -> Value {
        self.request(
            "mesh.registry.agent.register",
            json!({
                "identity": identity,
                "version": "1.0.0",
                "capabilities": ["analytics"],
                "operations": ["query", "invoke"],
                "health_endpoint": format!("http://localhost:9000/{identity}/health"),
            }),
        )
        .await
    }

    pub async fn register_kb(&self, kb_id: &str) -> Value {
        self.request(
            "mesh.registry.kb.register",
            json!({
                "kb_id": kb_id,
                "kb_type": "postgres",
                "endpoint": "postgres://localhost:5432/sales",
                "operations": ["sql_query", "execute_sql", "get_schema"],
            }),
        )
        .await
    }

    /// Register an adapter worker on `{kb_id}.adapter.query` returning a
    /// canned payload.
    pub async fn attach_adapter(&self, kb_id: &str, response: Value) -> Arc<StaticDriver> {
        let driver = StaticDriver::new(response);
        let worker = Arc::new(
            AdapterWorker::for_driver(
                kb_id,
                "postgres",
                driver.clone() as Arc<dyn KbDriver>,
                Duration::from_secs(1),
            )
            .expect("postgres vocabulary exists"),
        );
        worker
            .attach(self.transport.as_ref())
            .await
            .expect("adapter attaches");
        driver
    }

    /// Register an adapter worker whose driver always fails.
    pub async fn attach_failing_adapter(&self, kb_id: &str) {
        let worker = Arc::new(
            AdapterWorker::for_driver(
                kb_id,
                "postgres",
                Arc::new(FailingDriver) as Arc<dyn KbDriver>,
                Duration::from_secs(1),
            )
            .expect("postgres vocabulary exists"),
        );
        worker
            .attach(self.transport.as_ref())
            .await
            .expect("adapter attaches");
    }

    pub async fn audit_rows(&self, filter: Value) -> Value {
        self.request("mesh.audit.query", filter).await
    }
}
