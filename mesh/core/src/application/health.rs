// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Health monitor - periodic probes over every registered agent and KB.
//
// Each entity carries a consecutive-failure counter. After `threshold`
// failures the status moves one step down (active -> degraded -> offline);
// a single successful probe returns it to active and clears the counter.
// Every transition publishes `status_changed` and appends an audit event.

use crate::application::registry::RegistryService;
use crate::domain::agent::HealthStatus;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome};
use crate::domain::error::MeshError;
use crate::domain::repository::{AuditRepository, RegistryQuery};
use crate::infrastructure::probe::EndpointProbe;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct HealthMonitor {
    registry: Arc<RegistryService>,
    audit: Arc<dyn AuditRepository>,
    probe: Arc<dyn EndpointProbe>,
    interval: Duration,
    threshold: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<RegistryService>,
        audit: Arc<dyn AuditRepository>,
        probe: Arc<dyn EndpointProbe>,
        interval: Duration,
        threshold: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            audit,
            probe,
            interval,
            threshold: threshold.max(1),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Run the probe loop until the returned handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let monitor = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = monitor.sweep().await {
                    warn!(error = %e, "health sweep failed");
                }
            }
        })
    }

    /// One full probe pass. Public so tests can drive it without the timer.
    pub async fn sweep(&self) -> Result<(), MeshError> {
        let query = RegistryQuery::default();
        for agent in self.registry.list_agents(&query).await? {
            let result = self.probe.probe_agent(&agent.health_endpoint).await;
            self.apply("agent", &agent.identity, agent.status, result.is_ok())
                .await;
        }
        for kb in self.registry.list_kbs(&query).await? {
            let result = self.probe.probe_kb(&kb.endpoint).await;
            self.apply("kb", &kb.kb_id, kb.status, result.is_ok()).await;
        }
        Ok(())
    }

    async fn apply(&self, kind: &str, id: &str, current: HealthStatus, ok: bool) {
        let key = format!("{kind}:{id}");
        let next = {
            let mut failures = self.failures.lock().await;
            if ok {
                failures.remove(&key);
                if current == HealthStatus::Active {
                    return;
                }
                HealthStatus::Active
            } else {
                let count = failures.entry(key).or_insert(0);
                *count += 1;
                if *count < self.threshold {
                    return;
                }
                *count = 0;
                match current {
                    HealthStatus::Active => HealthStatus::Degraded,
                    HealthStatus::Degraded | HealthStatus::Offline => HealthStatus::Offline,
                }
            }
        };
        if next == current {
            return;
        }

        self.transition(kind, id, current, next).await;
    }

    async fn transition(&self, kind: &str, id: &str, from: HealthStatus, to: HealthStatus) {
        let updated = match kind {
            "agent" => self.registry.update_agent_status(id, to).await,
            _ => self.registry.update_kb_status(id, to).await,
        };
        if let Err(e) = updated {
            warn!(kind, id, error = %e, "failed to update health status");
            return;
        }
        info!(kind, id, from = %from, to = %to, "health status changed");

        let event = AuditEvent::new(AuditEventType::Register, "health-monitor", Some(id.to_string()), AuditOutcome::Success)
            .with_metadata(json!({
                "entity_kind": kind,
                "transition": format!("{from}->{to}"),
            }));
        if let Err(e) = self.audit.append(&event).await {
            warn!(kind, id, error = %e, "failed to append health audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Transition table logic without I/O: mirror of apply()'s decision.
    fn step(current: HealthStatus, count: u32, threshold: u32, ok: bool) -> Option<HealthStatus> {
        if ok {
            return (current != HealthStatus::Active).then_some(HealthStatus::Active);
        }
        if count < threshold {
            return None;
        }
        let next = match current {
            HealthStatus::Active => HealthStatus::Degraded,
            HealthStatus::Degraded | HealthStatus::Offline => HealthStatus::Offline,
        };
        (next != current).then_some(next)
    }

    #[test]
    fn test_three_failures_degrade_active() {
        assert_eq!(step(HealthStatus::Active, 1, 3, false), None);
        assert_eq!(step(HealthStatus::Active, 2, 3, false), None);
        assert_eq!(step(HealthStatus::Active, 3, 3, false), Some(HealthStatus::Degraded));
    }

    #[test]
    fn test_degraded_falls_offline_after_threshold() {
        assert_eq!(step(HealthStatus::Degraded, 3, 3, false), Some(HealthStatus::Offline));
        assert_eq!(step(HealthStatus::Offline, 3, 3, false), None);
    }

    #[test]
    fn test_single_success_recovers() {
        assert_eq!(step(HealthStatus::Offline, 0, 3, true), Some(HealthStatus::Active));
        assert_eq!(step(HealthStatus::Degraded, 0, 3, true), Some(HealthStatus::Active));
        assert_eq!(step(HealthStatus::Active, 0, 3, true), None);
    }
}
