// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Registry - the authoritative catalog of agents and knowledge bases.
//
// Registration validates the request, rejects duplicates, runs a one-shot
// connectivity probe, commits the row, writes the audit event, and then
// publishes the directory update. A failed publish is logged but never rolls
// the row back; late subscribers resync via `mesh.directory.query`.

use crate::application::events::DirectoryEvent;
use crate::domain::agent::{AgentId, AgentRecord, AgentRegistration, HealthStatus};
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome};
use crate::domain::error::MeshError;
use crate::domain::kb::{KbRecord, KbRegistration, SUPPORTED_KB_TYPES};
use crate::domain::operations;
use crate::domain::repository::{
    AuditRepository, RegistryQuery, RegistryRepository, RepositoryError,
};
use crate::infrastructure::probe::EndpointProbe;
use crate::infrastructure::transport::{subjects, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Reply for `mesh.registry.agent.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistered {
    pub agent_id: AgentId,
    pub identity: String,
    pub version: String,
    pub status: HealthStatus,
    pub registered_at: DateTime<Utc>,
}

/// Reply for `mesh.registry.kb.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRegistered {
    pub kb_id: String,
    pub status: HealthStatus,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct RegistryService {
    registry: Arc<dyn RegistryRepository>,
    audit: Arc<dyn AuditRepository>,
    transport: Arc<dyn Transport>,
    probe: Arc<dyn EndpointProbe>,
}

impl RegistryService {
    pub fn new(
        registry: Arc<dyn RegistryRepository>,
        audit: Arc<dyn AuditRepository>,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn EndpointProbe>,
    ) -> Self {
        Self {
            registry,
            audit,
            transport,
            probe,
        }
    }

    pub async fn register_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentRegistered, MeshError> {
        validate_agent_registration(&registration)?;

        if self.registry.get_agent(&registration.identity).await?.is_some() {
            return Err(MeshError::Duplicate {
                kind: "Agent",
                id: registration.identity,
            });
        }

        // One-shot probe; failure records the agent as offline but never
        // rejects the registration.
        let probe = self.probe.probe_agent(&registration.health_endpoint).await;
        let mut record = AgentRecord::new(registration);
        record.status = if probe.is_ok() {
            HealthStatus::Active
        } else {
            HealthStatus::Offline
        };
        if record.status == HealthStatus::Active {
            record.last_heartbeat = Some(Utc::now());
        }

        match self.registry.insert_agent(&record).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(_)) => {
                return Err(MeshError::Duplicate {
                    kind: "Agent",
                    id: record.identity,
                })
            }
            Err(e) => return Err(e.into()),
        }
        info!(identity = %record.identity, status = %record.status, "agent registered");

        self.append_audit(
            AuditEvent::new(
                AuditEventType::Register,
                record.identity.clone(),
                None,
                AuditOutcome::Success,
            )
            .with_metadata(json!({
                "agent_id": record.agent_id,
                "version": record.version,
                "capabilities": record.capabilities,
                "operations": record.operations,
            })),
        )
        .await?;

        self.publish_event(DirectoryEvent::agent_registered(&record)).await;

        Ok(AgentRegistered {
            agent_id: record.agent_id,
            identity: record.identity,
            version: record.version,
            status: record.status,
            registered_at: record.registered_at,
        })
    }

    pub async fn register_kb(
        &self,
        registration: KbRegistration,
    ) -> Result<KbRegistered, MeshError> {
        validate_kb_registration(&registration)?;

        if self.registry.get_kb(&registration.kb_id).await?.is_some() {
            return Err(MeshError::Duplicate {
                kind: "KB",
                id: registration.kb_id,
            });
        }

        // Initial connectivity handshake; failure downgrades status only.
        let probe = self.probe.probe_kb(&registration.endpoint).await;
        let mut record = KbRecord::new(registration);
        record.status = if probe.is_ok() {
            HealthStatus::Active
        } else {
            HealthStatus::Offline
        };
        record.last_health_check = Some(Utc::now());
        record
            .metadata
            .insert("probe_latency_ms".to_string(), json!(probe.latency_ms));

        match self.registry.insert_kb(&record).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(_)) => {
                return Err(MeshError::Duplicate {
                    kind: "KB",
                    id: record.kb_id,
                })
            }
            Err(e) => return Err(e.into()),
        }
        info!(kb_id = %record.kb_id, kb_type = %record.kb_type, status = %record.status, "kb registered");

        self.append_audit(
            AuditEvent::new(
                AuditEventType::Register,
                "system",
                Some(record.kb_id.clone()),
                AuditOutcome::Success,
            )
            .with_metadata(json!({
                "kb_type": record.kb_type,
                "operations": record.operations,
                "status": record.status,
            })),
        )
        .await?;

        self.publish_event(DirectoryEvent::kb_registered(&record)).await;

        let message = probe
            .error
            .map(|error| format!("registered, connectivity check failed: {error}"));
        Ok(KbRegistered {
            kb_id: record.kb_id,
            status: record.status,
            registered_at: record.registered_at,
            message,
        })
    }

    pub async fn get_agent(&self, identity: &str) -> Result<AgentRecord, MeshError> {
        self.registry
            .get_agent(identity)
            .await?
            .ok_or_else(|| MeshError::UnknownResource {
                kind: "Agent",
                id: identity.to_string(),
            })
    }

    pub async fn get_kb(&self, kb_id: &str) -> Result<KbRecord, MeshError> {
        self.registry
            .get_kb(kb_id)
            .await?
            .ok_or_else(|| MeshError::UnknownResource {
                kind: "KB",
                id: kb_id.to_string(),
            })
    }

    pub async fn list_agents(&self, query: &RegistryQuery) -> Result<Vec<AgentRecord>, MeshError> {
        Ok(self.registry.list_agents(query).await?)
    }

    pub async fn list_kbs(&self, query: &RegistryQuery) -> Result<Vec<KbRecord>, MeshError> {
        Ok(self.registry.list_kbs(query).await?)
    }

    /// Status mutation used by the health monitor; publishes the
    /// `status_changed` directory event after the row commits.
    pub async fn update_agent_status(
        &self,
        identity: &str,
        status: HealthStatus,
    ) -> Result<(), MeshError> {
        let current = self.get_agent(identity).await?;
        self.registry.update_agent_status(identity, status).await?;
        if current.status != status {
            self.publish_event(DirectoryEvent::status_changed(
                "agent",
                identity,
                current.status,
                status,
            ))
            .await;
        }
        Ok(())
    }

    pub async fn update_kb_status(
        &self,
        kb_id: &str,
        status: HealthStatus,
    ) -> Result<(), MeshError> {
        let current = self.get_kb(kb_id).await?;
        self.registry.update_kb_status(kb_id, status).await?;
        if current.status != status {
            self.publish_event(DirectoryEvent::status_changed(
                "kb", kb_id, current.status, status,
            ))
            .await;
        }
        Ok(())
    }

    pub async fn update_agent_capabilities(
        &self,
        identity: &str,
        capabilities: Vec<String>,
    ) -> Result<AgentRecord, MeshError> {
        let before = self.get_agent(identity).await?;
        self.registry
            .update_agent_capabilities(identity, &capabilities)
            .await?;
        info!(identity, old = ?before.capabilities, new = ?capabilities, "agent capabilities updated");

        self.publish_event(DirectoryEvent::capability_updated(
            identity,
            &before.version,
            &before.capabilities,
            &capabilities,
        ))
        .await;

        self.get_agent(identity).await
    }

    pub async fn deregister_agent(&self, identity: &str) -> Result<(), MeshError> {
        self.get_agent(identity).await?;
        self.registry.delete_agent(identity).await?;
        info!(identity, "agent deregistered");
        Ok(())
    }

    pub async fn deregister_kb(&self, kb_id: &str) -> Result<(), MeshError> {
        self.get_kb(kb_id).await?;
        self.registry.delete_kb(kb_id).await?;
        info!(kb_id, "kb deregistered");
        Ok(())
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), MeshError> {
        self.audit
            .append(&event)
            .await
            .map(|_| ())
            .map_err(|e| MeshError::AuditFailure(e.to_string()))
    }

    async fn publish_event(&self, event: DirectoryEvent) {
        match serde_json::to_value(&event) {
            Ok(payload) => {
                if let Err(e) = self
                    .transport
                    .publish(subjects::DIRECTORY_UPDATES, payload)
                    .await
                {
                    warn!(error = %e, "failed to publish directory update");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode directory update"),
        }
    }
}

fn validate_agent_registration(registration: &AgentRegistration) -> Result<(), MeshError> {
    if registration.identity.trim().is_empty() {
        return Err(MeshError::validation(
            "identity",
            "identity cannot be empty",
            "provide a unique identifier like 'sales-agent-1'",
        ));
    }
    if semver::Version::parse(&registration.version).is_err() {
        return Err(MeshError::validation(
            "version",
            format!("invalid semantic version '{}'", registration.version),
            "use a version like '1.0.0' or '2.1.3-beta.1'",
        ));
    }
    if registration.capabilities.is_empty() {
        return Err(MeshError::validation(
            "capabilities",
            "capabilities list cannot be empty",
            "declare at least one capability",
        ));
    }
    if registration.operations.is_empty() {
        return Err(MeshError::validation(
            "operations",
            "operations list cannot be empty",
            format!("valid operations: {}", operations::AGENT_OPERATIONS.join(", ")),
        ));
    }
    operations::validate_agent_operations(&registration.operations)?;

    let url = Url::parse(&registration.health_endpoint).map_err(|e| {
        MeshError::validation(
            "health_endpoint",
            format!("invalid URL '{}': {e}", registration.health_endpoint),
            "use a URL like 'http://localhost:8001/health'",
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MeshError::validation(
            "health_endpoint",
            format!("unsupported scheme '{}'", url.scheme()),
            "health endpoints are probed over HTTP(S)",
        ));
    }
    Ok(())
}

fn validate_kb_registration(registration: &KbRegistration) -> Result<(), MeshError> {
    if registration.kb_id.trim().is_empty() {
        return Err(MeshError::validation(
            "kb_id",
            "kb_id cannot be empty",
            "provide a unique identifier like 'sales-kb-1'",
        ));
    }
    if !SUPPORTED_KB_TYPES.contains(&registration.kb_type.as_str()) {
        return Err(MeshError::validation(
            "kb_type",
            format!("unsupported kb_type '{}'", registration.kb_type),
            format!("supported types: {}", SUPPORTED_KB_TYPES.join(", ")),
        ));
    }
    if registration.operations.is_empty() {
        return Err(MeshError::validation(
            "operations",
            "operations list cannot be empty",
            "declare the operations this KB serves",
        ));
    }
    operations::validate_kb_operations(&registration.kb_type, &registration.operations)?;

    Url::parse(&registration.endpoint).map_err(|e| {
        MeshError::validation(
            "endpoint",
            format!("invalid endpoint URI '{}': {e}", registration.endpoint),
            "use a driver URI like 'postgres://host:5432/db'",
        )
    })?;
    Ok(())
}
