// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Adapter worker - the ungoverned edge of the mesh.
//
// One worker serves `{kb_id}.adapter.query` for one KB. Requests are
// `{operation, params}`; dispatch goes through an operation registry built
// at startup from the KB type's vocabulary, so an unknown name is rejected
// before it reaches the driver. The worker knows nothing about policies and
// never hangs past its hard timeout.

use crate::domain::operations;
use crate::infrastructure::transport::{handler, subjects, Transport, TransportError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unsupported operation '{operation}', allowed: {}", .allowed.join(", "))]
    UnsupportedOperation {
        operation: String,
        allowed: Vec<String>,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend timed out")]
    Timeout,
}

/// A concrete backend driver (SQL, graph, ...). Owns its own connection
/// pool; read operations must be idempotent.
#[async_trait]
pub trait KbDriver: Send + Sync {
    async fn execute(&self, operation: &str, params: Value) -> Result<Value, AdapterError>;

    async fn ping(&self) -> Result<(), AdapterError>;
}

pub type OperationHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, AdapterError>> + Send + Sync>;

/// Name -> handler table, fixed after construction.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: HashMap<String, OperationHandler>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: OperationHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn handler(&self, name: &str) -> Option<OperationHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct AdapterWorker {
    kb_id: String,
    registry: OperationRegistry,
    hard_timeout: Duration,
}

impl AdapterWorker {
    /// Build a worker whose registry covers the full vocabulary of
    /// `kb_type`, every entry dispatching into `driver`.
    pub fn for_driver(
        kb_id: impl Into<String>,
        kb_type: &str,
        driver: Arc<dyn KbDriver>,
        hard_timeout: Duration,
    ) -> Option<Self> {
        let allowed = operations::allowed_kb_operations(kb_type)?;
        let mut registry = OperationRegistry::new();
        for name in allowed {
            let driver = Arc::clone(&driver);
            let operation = name.to_string();
            registry.register(
                *name,
                Arc::new(move |params| {
                    let driver = Arc::clone(&driver);
                    let operation = operation.clone();
                    Box::pin(async move { driver.execute(&operation, params).await })
                }),
            );
        }
        Some(Self {
            kb_id: kb_id.into(),
            registry,
            hard_timeout,
        })
    }

    pub fn kb_id(&self) -> &str {
        &self.kb_id
    }

    /// Handle one `{operation, params}` request and produce the wire reply.
    pub async fn handle(&self, request: Value) -> Value {
        let operation = match request.get("operation").and_then(Value::as_str) {
            Some(operation) => operation.to_string(),
            None => return error_reply("request is missing 'operation'"),
        };
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        let handler = match self.registry.handler(&operation) {
            Some(handler) => handler,
            None => {
                let err = AdapterError::UnsupportedOperation {
                    operation,
                    allowed: self.registry.names(),
                };
                return error_reply(&err.to_string());
            }
        };

        debug!(kb_id = %self.kb_id, %operation, "adapter dispatch");
        match tokio::time::timeout(self.hard_timeout, handler(params)).await {
            Ok(Ok(data)) => json!({"status": "success", "data": data}),
            Ok(Err(e)) => {
                warn!(kb_id = %self.kb_id, %operation, error = %e, "adapter operation failed");
                error_reply(&e.to_string())
            }
            Err(_) => {
                warn!(kb_id = %self.kb_id, %operation, "adapter operation timed out");
                error_reply(&AdapterError::Timeout.to_string())
            }
        }
    }

    /// Bind the worker to its subject on the transport.
    pub async fn attach(self: Arc<Self>, transport: &dyn Transport) -> Result<(), TransportError> {
        let subject = subjects::adapter_query(&self.kb_id);
        let worker = Arc::clone(&self);
        transport
            .serve(
                &subject,
                handler(move |request| {
                    let worker = Arc::clone(&worker);
                    async move { worker.handle(request).await }
                }),
            )
            .await
    }
}

fn error_reply(error: &str) -> Value {
    json!({"status": "error", "error": error})
}
