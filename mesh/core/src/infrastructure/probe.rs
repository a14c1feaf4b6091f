// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Connectivity probes for registered agents and KBs.
//
// Agents expose an HTTP health endpoint; KBs get a driver-agnostic TCP
// handshake against their endpoint URI. Both are used at registration time
// (one-shot) and by the periodic health monitor.

use crate::domain::agent::HealthStatus;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub latency_ms: f64,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Active
    }
}

#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// HTTP GET of an agent's health endpoint.
    async fn probe_agent(&self, health_endpoint: &str) -> ProbeResult;

    /// One-shot handshake against a KB endpoint URI.
    async fn probe_kb(&self, endpoint: &str) -> ProbeResult;
}

pub struct NetworkProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "neo4j" | "bolt" => Some(7687),
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

#[async_trait]
impl EndpointProbe for NetworkProbe {
    async fn probe_agent(&self, health_endpoint: &str) -> ProbeResult {
        let started = std::time::Instant::now();
        let outcome = self
            .client
            .get(health_endpoint)
            .timeout(self.timeout)
            .send()
            .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(response) if response.status().is_success() => ProbeResult {
                status: HealthStatus::Active,
                latency_ms,
                error: None,
            },
            Ok(response) => ProbeResult {
                status: HealthStatus::Degraded,
                latency_ms,
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => ProbeResult {
                status: HealthStatus::Offline,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }

    async fn probe_kb(&self, endpoint: &str) -> ProbeResult {
        let started = std::time::Instant::now();
        let failed = |error: String, started: std::time::Instant| ProbeResult {
            status: HealthStatus::Offline,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: Some(error),
        };

        let url = match Url::parse(endpoint) {
            Ok(url) => url,
            Err(e) => return failed(format!("unparseable endpoint: {e}"), started),
        };
        let host = match url.host_str() {
            Some(host) => host.to_string(),
            None => return failed("endpoint has no host".to_string(), started),
        };
        let port = match url.port().or_else(|| default_port(url.scheme())) {
            Some(port) => port,
            None => {
                return failed(
                    format!("no port and no default for scheme '{}'", url.scheme()),
                    started,
                )
            }
        };

        match tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => ProbeResult {
                status: HealthStatus::Active,
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                error: None,
            },
            Ok(Err(e)) => failed(e.to_string(), started),
            Err(_) => failed(format!("timeout after {:?}", self.timeout), started),
        }
    }
}
