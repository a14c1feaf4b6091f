// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Named-subject transport - pub/sub and request/reply.
//
// The mesh programs against the `Transport` trait; `InProcessTransport` is
// the in-process broker built on tokio broadcast channels (pub/sub fan-out)
// and registered per-subject handlers with oneshot replies (request/reply).
// Delivery is at-most-once: a request to a subject with no responder fails
// fast, and a lagging subscriber drops messages rather than blocking the
// publisher.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, RwLock};
use tracing::warn;

/// Well-known mesh subjects.
pub mod subjects {
    pub const AGENT_REGISTER: &str = "mesh.registry.agent.register";
    pub const KB_REGISTER: &str = "mesh.registry.kb.register";
    pub const DIRECTORY_QUERY: &str = "mesh.directory.query";
    pub const DIRECTORY_UPDATES: &str = "mesh.directory.updates";
    pub const AUDIT_QUERY: &str = "mesh.audit.query";
    pub const HEALTH: &str = "mesh.health";
    pub const KB_QUERY: &str = "mesh.routing.kb_query";
    pub const AGENT_INVOKE: &str = "mesh.routing.agent_invoke";
    pub const INVOKE_STATUS: &str = "mesh.routing.status";
    pub const COMPLETION: &str = "mesh.routing.completion";

    /// Subject one adapter worker serves for its KB.
    pub fn adapter_query(kb_id: &str) -> String {
        format!("{kb_id}.adapter.query")
    }

    /// Private request subject for a registered agent.
    pub fn agent_inbox(agent_identity: &str) -> String {
        format!("agent.{agent_identity}")
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no responders on subject '{0}'")]
    NoResponders(String),

    #[error("request on '{0}' timed out")]
    Timeout(String),

    #[error("subject '{0}' already has a responder")]
    SubjectTaken(String),

    #[error("transport closed")]
    Closed,

    #[error("subscriber lagged by {0} messages")]
    Lagged(u64),
}

#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub payload: Value,
}

/// A request handler bound to one subject. Each incoming request runs as its
/// own task; the returned value is the reply.
pub type RequestHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

/// Wrap an async closure as a [`RequestHandler`].
pub fn handler<F, Fut>(f: F) -> RequestHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Value> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget publish to every matching subscriber.
    async fn publish(&self, subject: &str, payload: Value) -> Result<(), TransportError>;

    /// Request/reply with an explicit per-call deadline.
    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// Bind a request handler to a subject. One responder per subject.
    async fn serve(&self, subject: &str, handler: RequestHandler) -> Result<(), TransportError>;

    /// Subscribe to published messages. `*` matches one dot-delimited token,
    /// `>` matches one or more trailing tokens.
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;
}

/// Does `subject` match a NATS-style `pattern`?
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some(">"), None) => return false,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

pub struct InProcessTransport {
    responders: RwLock<HashMap<String, RequestHandler>>,
    events: broadcast::Sender<Message>,
}

impl InProcessTransport {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(capacity);
        Arc::new(Self {
            responders: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn with_default_capacity() -> Arc<Self> {
        Self::new(1024)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn publish(&self, subject: &str, payload: Value) -> Result<(), TransportError> {
        // send() only errors when nobody is subscribed; publishing into the
        // void is fine for at-most-once semantics.
        let _ = self.events.send(Message {
            subject: subject.to_string(),
            payload,
        });
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let handler = self
            .responders
            .read()
            .await
            .get(subject)
            .cloned()
            .ok_or_else(|| TransportError::NoResponders(subject.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = handler(payload);
        tokio::spawn(async move {
            // Receiver may be gone if the caller's deadline expired; the
            // computed reply is then discarded.
            let _ = reply_tx.send(pending.await);
        });

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(subject.to_string())),
        }
    }

    async fn serve(&self, subject: &str, handler: RequestHandler) -> Result<(), TransportError> {
        let mut responders = self.responders.write().await;
        if responders.contains_key(subject) {
            return Err(TransportError::SubjectTaken(subject.to_string()));
        }
        responders.insert(subject.to_string(), handler);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        Ok(Subscription {
            receiver: self.events.subscribe(),
            pattern: pattern.to_string(),
        })
    }
}

/// Pattern-filtered receiver over the broadcast stream.
pub struct Subscription {
    receiver: broadcast::Receiver<Message>,
    pattern: String,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<Message, TransportError> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if subject_matches(&self.pattern, &message.subject) => {
                    return Ok(message)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(pattern = %self.pattern, lagged = n, "subscriber lagged, messages dropped");
                    return Err(TransportError::Lagged(n));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_matching() {
        assert!(subject_matches("mesh.directory.updates", "mesh.directory.updates"));
        assert!(subject_matches("mesh.*.updates", "mesh.directory.updates"));
        assert!(subject_matches("mesh.>", "mesh.routing.kb_query"));
        assert!(subject_matches("*.adapter.query", "sales-kb-1.adapter.query"));
        assert!(!subject_matches("mesh.>", "mesh"));
        assert!(!subject_matches("mesh.*", "mesh.directory.updates"));
        assert!(!subject_matches("mesh.directory.updates", "mesh.directory.query"));
    }

    #[tokio::test]
    async fn test_publish_subscribe_round_trip() {
        let transport = InProcessTransport::with_default_capacity();
        let mut subscription = transport.subscribe("mesh.directory.updates").await.unwrap();

        transport
            .publish("mesh.directory.updates", json!({"type": "agent_registered"}))
            .await
            .unwrap();

        let message = subscription.recv().await.unwrap();
        assert_eq!(message.subject, "mesh.directory.updates");
        assert_eq!(message.payload["type"], "agent_registered");
    }

    #[tokio::test]
    async fn test_wildcard_subscription_filters_other_subjects() {
        let transport = InProcessTransport::with_default_capacity();
        let mut subscription = transport.subscribe("mesh.routing.>").await.unwrap();

        transport.publish("mesh.directory.updates", json!(1)).await.unwrap();
        transport.publish("mesh.routing.completion", json!(2)).await.unwrap();

        let message = subscription.recv().await.unwrap();
        assert_eq!(message.subject, "mesh.routing.completion");
    }

    #[tokio::test]
    async fn test_request_reply() {
        let transport = InProcessTransport::with_default_capacity();
        transport
            .serve(
                "echo",
                handler(|payload| async move { json!({"echo": payload}) }),
            )
            .await
            .unwrap();

        let reply = transport
            .request("echo", json!("hello"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply["echo"], json!("hello"));
    }

    #[tokio::test]
    async fn test_request_without_responder_fails_fast() {
        let transport = InProcessTransport::with_default_capacity();
        let err = transport
            .request("nobody.home", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders(_)));
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let transport = InProcessTransport::with_default_capacity();
        transport
            .serve(
                "slow",
                handler(|_| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    json!({})
                }),
            )
            .await
            .unwrap();

        let err = transport
            .request("slow", json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_second_responder_rejected() {
        let transport = InProcessTransport::with_default_capacity();
        transport
            .serve("solo", handler(|_| async move { json!(1) }))
            .await
            .unwrap();
        let err = transport
            .serve("solo", handler(|_| async move { json!(2) }))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::SubjectTaken(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_independent_replies() {
        let transport = InProcessTransport::with_default_capacity();
        transport
            .serve(
                "double",
                handler(|payload| async move {
                    let n = payload.as_i64().unwrap_or(0);
                    json!(n * 2)
                }),
            )
            .await
            .unwrap();

        let (a, b, c) = tokio::join!(
            transport.request("double", json!(1), Duration::from_secs(1)),
            transport.request("double", json!(2), Duration::from_secs(1)),
            transport.request("double", json!(3), Duration::from_secs(1)),
        );
        assert_eq!(a.unwrap(), json!(2));
        assert_eq!(b.unwrap(), json!(4));
        assert_eq!(c.unwrap(), json!(6));
    }
}
