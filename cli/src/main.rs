// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # meshd
//!
//! The AgentMesh daemon: starts the governed broker (registry, directory,
//! enforcement, audit, health monitor) and serves the mesh subjects until
//! interrupted. All configuration comes from flags or `MESH_*` environment
//! variables; nothing else is part of the contract.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use mesh_core::config::{AuditConfig, MeshConfig};
use mesh_core::presentation::server::MeshServer;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// AgentMesh governed broker daemon
#[derive(Parser)]
#[command(name = "meshd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Transport broker URL agents connect through
    #[arg(long, env = "MESH_TRANSPORT_URL", default_value = "nats://localhost:4222")]
    transport_url: String,

    /// Policy evaluator base URL
    #[arg(long, env = "MESH_POLICY_URL", default_value = "http://localhost:8181")]
    policy_url: String,

    /// Persistence DSN
    #[arg(long, env = "MESH_DATABASE_URL", default_value = "sqlite:mesh.db")]
    database_url: String,

    /// Directory for `{policy_id}.rego` mirror files
    #[arg(long, env = "MESH_POLICY_DIR", default_value = "policies")]
    policy_dir: PathBuf,

    /// Seconds between health-probe sweeps
    #[arg(long, env = "MESH_HEALTH_INTERVAL", default_value = "30")]
    health_interval_secs: u64,

    /// Consecutive probe failures per status downgrade
    #[arg(long, env = "MESH_HEALTH_FAILURE_THRESHOLD", default_value = "3")]
    health_failure_threshold: u32,

    /// Default adapter dispatch timeout in seconds
    #[arg(long, env = "MESH_DISPATCH_TIMEOUT", default_value = "30")]
    dispatch_timeout_secs: u64,

    /// Default registry/directory request timeout in seconds
    #[arg(long, env = "MESH_REQUEST_TIMEOUT", default_value = "5")]
    request_timeout_secs: u64,

    /// Capture full request payloads on audit rows (heavy)
    #[arg(long, env = "MESH_AUDIT_FULL_REQUEST")]
    audit_full_request: bool,

    /// Capture masked response payloads on audit rows (heavy)
    #[arg(long, env = "MESH_AUDIT_FULL_RESPONSE")]
    audit_full_response: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MESH_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> MeshConfig {
        MeshConfig {
            transport_url: self.transport_url,
            policy_url: self.policy_url,
            database_url: self.database_url,
            policy_dir: self.policy_dir,
            health_interval: Duration::from_secs(self.health_interval_secs),
            health_failure_threshold: self.health_failure_threshold,
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            audit: AuditConfig {
                log_full_request: self.audit_full_request,
                log_full_response: self.audit_full_response,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("{}", "AgentMesh".bold().green());
    println!("  transport:  {}", cli.transport_url.cyan());
    println!("  evaluator:  {}", cli.policy_url.cyan());
    println!("  store:      {}", cli.database_url.cyan());

    let config = cli.into_config();
    let server = MeshServer::launch(config)
        .await
        .context("failed to start mesh server")?;

    info!("meshd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    server.shutdown().await;
    Ok(())
}
