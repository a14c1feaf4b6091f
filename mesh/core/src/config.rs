// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process configuration.
//!
//! Exactly the contract surface: transport URL, policy evaluator URL,
//! persistence DSN, policy mirror directory, health-probe interval, default
//! dispatch timeout, default request timeout - plus the opt-in heavy audit
//! switches. The CLI populates this from flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Broker URL the deployment connects agents through.
    pub transport_url: String,
    /// Policy evaluator base URL.
    pub policy_url: String,
    /// Persistence DSN, e.g. `sqlite:mesh.db`.
    pub database_url: String,
    /// Directory the policy store mirrors `{policy_id}.rego` files into.
    pub policy_dir: PathBuf,
    /// Interval between health-monitor sweeps.
    pub health_interval: Duration,
    /// Consecutive probe failures per status downgrade step.
    pub health_failure_threshold: u32,
    /// Default adapter dispatch deadline; overridable per KB via its
    /// `dispatch_timeout_secs` metadata key.
    pub dispatch_timeout: Duration,
    /// Default registry/directory request deadline.
    pub request_timeout: Duration,
    pub audit: AuditConfig,
}

/// Heavy audit capture is off by default; `full_response` is stored only
/// after masking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditConfig {
    pub log_full_request: bool,
    pub log_full_response: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            transport_url: "nats://localhost:4222".to_string(),
            policy_url: "http://localhost:8181".to_string(),
            database_url: "sqlite:mesh.db".to_string(),
            policy_dir: PathBuf::from("policies"),
            health_interval: Duration::from_secs(30),
            health_failure_threshold: 3,
            dispatch_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            audit: AuditConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = MeshConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(30));
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert!(!config.audit.log_full_request);
        assert!(!config.audit.log_full_response);
    }
}
