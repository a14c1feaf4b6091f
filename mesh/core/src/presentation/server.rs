// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Mesh server - boot wiring and subject bindings.
//
// Constructs the store, repositories, and services once at boot (no
// module-level singletons), binds every mesh subject on the transport, and
// runs the health monitor in the background. Agents only ever see the
// subjects bound here.

use crate::application::audit_query::AuditQueryService;
use crate::application::directory::DirectoryService;
use crate::application::enforcement::{EnforcementConfig, EnforcementService};
use crate::application::health::HealthMonitor;
use crate::application::policy_admin::PolicyAdminService;
use crate::application::registry::RegistryService;
use crate::config::MeshConfig;
use crate::domain::agent::AgentRegistration;
use crate::domain::audit::AuditQuery;
use crate::domain::error::MeshError;
use crate::domain::kb::KbRegistration;
use crate::domain::policy::PolicyEvaluator;
use crate::domain::repository::{AuditRepository, PolicyRepository, RegistryRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::migrations;
use crate::infrastructure::opa::OpaClient;
use crate::infrastructure::probe::{EndpointProbe, NetworkProbe};
use crate::infrastructure::repositories::{
    SqliteAuditRepository, SqlitePolicyRepository, SqliteRegistryRepository,
};
use crate::infrastructure::transport::{handler, subjects, InProcessTransport, Transport};
use crate::presentation::router::{error_reply, RequestRouter};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub struct MeshServer {
    config: MeshConfig,
    transport: Arc<dyn Transport>,
    evaluator: Arc<dyn PolicyEvaluator>,
    registry_service: Arc<RegistryService>,
    directory_service: Arc<DirectoryService>,
    enforcement: Arc<EnforcementService>,
    router: Arc<RequestRouter>,
    audit_query: Arc<AuditQueryService>,
    policy_admin: Arc<PolicyAdminService>,
    health_monitor: Arc<HealthMonitor>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl MeshServer {
    /// Wire every service against the given collaborators. Tests inject
    /// their own transport, evaluator, and probe here.
    pub async fn build(
        config: MeshConfig,
        transport: Arc<dyn Transport>,
        evaluator: Arc<dyn PolicyEvaluator>,
        probe: Arc<dyn EndpointProbe>,
    ) -> Result<Self> {
        let database = Database::connect(&config.database_url).await?;
        migrations::run(database.pool()).await?;

        let registry_repo: Arc<dyn RegistryRepository> =
            Arc::new(SqliteRegistryRepository::new(database.pool().clone()));
        let audit_repo: Arc<dyn AuditRepository> =
            Arc::new(SqliteAuditRepository::new(database.pool().clone()));
        let policy_repo: Arc<dyn PolicyRepository> =
            Arc::new(SqlitePolicyRepository::new(database.pool().clone()));

        let registry_service = Arc::new(RegistryService::new(
            Arc::clone(&registry_repo),
            Arc::clone(&audit_repo),
            Arc::clone(&transport),
            Arc::clone(&probe),
        ));
        let directory_service = Arc::new(DirectoryService::new(Arc::clone(&registry_repo)));
        let enforcement = Arc::new(EnforcementService::new(
            Arc::clone(&registry_repo),
            Arc::clone(&audit_repo),
            Arc::clone(&evaluator),
            Arc::clone(&transport),
            EnforcementConfig {
                dispatch_timeout: config.dispatch_timeout,
                audit: config.audit,
            },
        ));
        let router = Arc::new(RequestRouter::new(Arc::clone(&enforcement)));
        let audit_query = Arc::new(AuditQueryService::new(Arc::clone(&audit_repo)));
        let policy_admin = Arc::new(PolicyAdminService::new(
            policy_repo,
            Arc::clone(&audit_repo),
            Arc::clone(&evaluator),
            config.policy_dir.clone(),
        ));
        let health_monitor = HealthMonitor::new(
            Arc::clone(&registry_service),
            audit_repo,
            probe,
            config.health_interval,
            config.health_failure_threshold,
        );

        Ok(Self {
            config,
            transport,
            evaluator,
            registry_service,
            directory_service,
            enforcement,
            router,
            audit_query,
            policy_admin,
            health_monitor,
            health_task: Mutex::new(None),
        })
    }

    /// Production wiring for the daemon: in-process broker, OPA over HTTP,
    /// network probes.
    pub async fn launch(config: MeshConfig) -> Result<Self> {
        let transport = InProcessTransport::with_default_capacity();
        let evaluator = Arc::new(OpaClient::new(
            config.policy_url.clone(),
            config.request_timeout,
        ));
        let probe = Arc::new(NetworkProbe::new(config.request_timeout));
        let server = Self::build(config, transport, evaluator, probe).await?;
        server.start().await?;
        Ok(server)
    }

    /// Bind all subjects and start the health monitor.
    pub async fn start(&self) -> Result<()> {
        self.bind_registry().await?;
        self.bind_directory().await?;
        self.bind_routing().await?;
        self.bind_audit().await?;
        self.bind_health().await?;

        let mut task = self.health_task.lock().await;
        if task.is_none() {
            *task = Some(Arc::clone(&self.health_monitor).spawn());
        }

        info!(
            subjects = ?[
                subjects::AGENT_REGISTER,
                subjects::KB_REGISTER,
                subjects::DIRECTORY_QUERY,
                subjects::KB_QUERY,
                subjects::AGENT_INVOKE,
                subjects::AUDIT_QUERY,
                subjects::HEALTH,
            ],
            "mesh server ready"
        );
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.health_task.lock().await.take() {
            task.abort();
        }
        info!("mesh server stopped");
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<RegistryService> {
        &self.registry_service
    }

    pub fn enforcement(&self) -> &Arc<EnforcementService> {
        &self.enforcement
    }

    pub fn policy_admin(&self) -> &Arc<PolicyAdminService> {
        &self.policy_admin
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health_monitor
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    async fn bind_registry(&self) -> Result<()> {
        let registry = Arc::clone(&self.registry_service);
        self.transport
            .serve(
                subjects::AGENT_REGISTER,
                handler(move |payload| {
                    let registry = Arc::clone(&registry);
                    async move {
                        match parse::<AgentRegistration>(payload) {
                            Ok(registration) => match registry.register_agent(registration).await {
                                Ok(reply) => to_json(&reply),
                                Err(e) => registry_error(&e),
                            },
                            Err(e) => registry_error(&e),
                        }
                    }
                }),
            )
            .await?;

        let registry = Arc::clone(&self.registry_service);
        self.transport
            .serve(
                subjects::KB_REGISTER,
                handler(move |payload| {
                    let registry = Arc::clone(&registry);
                    async move {
                        match parse::<KbRegistration>(payload) {
                            Ok(registration) => match registry.register_kb(registration).await {
                                Ok(reply) => to_json(&reply),
                                Err(e) => registry_error(&e),
                            },
                            Err(e) => registry_error(&e),
                        }
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn bind_directory(&self) -> Result<()> {
        let directory = Arc::clone(&self.directory_service);
        self.transport
            .serve(
                subjects::DIRECTORY_QUERY,
                handler(move |payload| {
                    let directory = Arc::clone(&directory);
                    async move {
                        match parse(payload) {
                            Ok(request) => match directory.query(request).await {
                                Ok(reply) => to_json(&reply),
                                Err(e) => registry_error(&e),
                            },
                            Err(e) => registry_error(&e),
                        }
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn bind_routing(&self) -> Result<()> {
        let router = Arc::clone(&self.router);
        self.transport
            .serve(
                subjects::KB_QUERY,
                handler(move |payload| {
                    let router = Arc::clone(&router);
                    async move { router.handle_kb_query(payload).await }
                }),
            )
            .await?;

        let router = Arc::clone(&self.router);
        self.transport
            .serve(
                subjects::AGENT_INVOKE,
                handler(move |payload| {
                    let router = Arc::clone(&router);
                    async move { router.handle_agent_invoke(payload).await }
                }),
            )
            .await?;

        let router = Arc::clone(&self.router);
        self.transport
            .serve(
                subjects::INVOKE_STATUS,
                handler(move |payload| {
                    let router = Arc::clone(&router);
                    async move { router.handle_invocation_status(payload).await }
                }),
            )
            .await?;
        Ok(())
    }

    async fn bind_audit(&self) -> Result<()> {
        let audit = Arc::clone(&self.audit_query);
        self.transport
            .serve(
                subjects::AUDIT_QUERY,
                handler(move |payload| {
                    let audit = Arc::clone(&audit);
                    async move {
                        match parse::<AuditQuery>(payload) {
                            Ok(query) => match audit.query(query).await {
                                Ok(reply) => to_json(&reply),
                                Err(e) => registry_error(&e),
                            },
                            Err(e) => registry_error(&e),
                        }
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn bind_health(&self) -> Result<()> {
        let directory = Arc::clone(&self.directory_service);
        let evaluator = Arc::clone(&self.evaluator);
        self.transport
            .serve(
                subjects::HEALTH,
                handler(move |_payload| {
                    let directory = Arc::clone(&directory);
                    let evaluator = Arc::clone(&evaluator);
                    async move {
                        let evaluator_ok = evaluator.healthy().await;
                        let (directory_summary, store_ok) = match directory.summary().await {
                            Ok(summary) => (summary, true),
                            Err(_) => (Value::Null, false),
                        };
                        let status = if evaluator_ok && store_ok {
                            "healthy"
                        } else {
                            "degraded"
                        };
                        json!({
                            "status": status,
                            "components": {
                                "persistence": if store_ok { "ok" } else { "unavailable" },
                                "policy_evaluator": if evaluator_ok { "ok" } else { "unreachable" },
                                "directory": directory_summary,
                            },
                        })
                    }
                }),
            )
            .await?;
        Ok(())
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, MeshError> {
    serde_json::from_value(payload).map_err(|e| {
        MeshError::validation("request", e.to_string(), "fix the request shape and retry")
    })
}

fn to_json<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(body) => body,
        Err(e) => error_reply(None, &MeshError::Internal(e.to_string())),
    }
}

/// Registry-style error body: `{error, code}`.
fn registry_error(err: &MeshError) -> Value {
    json!({"error": err.to_string(), "code": err.code()})
}
