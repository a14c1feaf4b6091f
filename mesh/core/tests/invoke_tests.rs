// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Governed agent-to-agent invocations: authorization, lifecycle tracking,
//! completion publishing.

mod common;

use common::start_mesh;
use mesh_core::infrastructure::transport::{handler, Transport};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Serve `agent.{identity}` echoing the payload back, counting deliveries.
async fn serve_target(mesh: &common::TestMesh, identity: &str) -> Arc<AtomicUsize> {
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deliveries);
    mesh.transport
        .serve(
            &format!("agent.{identity}"),
            handler(move |request| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    json!({"status": "success", "result": {"echo": request["payload"]}})
                }
            }),
        )
        .await
        .unwrap();
    deliveries
}

#[tokio::test]
async fn test_authorized_invocation_completes_and_publishes() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.evaluator.allow("agent-a", "agent-b", "invoke", &[]).await;
    let deliveries = serve_target(&mesh, "agent-b").await;

    let mut completions = mesh
        .transport
        .subscribe("mesh.routing.completion")
        .await
        .unwrap();

    let reply = mesh
        .request(
            "mesh.routing.agent_invoke",
            json!({
                "source_agent_id": "agent-a",
                "target_agent_id": "agent-b",
                "operation": "summarize",
                "payload": {"text": "governed mesh"},
            }),
        )
        .await;

    assert_eq!(reply["status"], "queued");
    let tracking_id: Uuid =
        serde_json::from_value(reply["tracking_id"].clone()).expect("tracking id is a uuid");

    let completion = tokio::time::timeout(Duration::from_secs(2), completions.recv())
        .await
        .expect("terminal state published")
        .unwrap();
    assert_eq!(completion.payload["tracking_id"], json!(tracking_id));
    assert_eq!(completion.payload["status"], "completed");
    assert_eq!(
        completion.payload["result"]["result"]["echo"]["text"],
        "governed mesh"
    );
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);

    // status lookup reflects the terminal record
    let status = mesh
        .request("mesh.routing.status", json!({"tracking_id": tracking_id}))
        .await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["source_agent_id"], "agent-a");
    assert!(status["completed_at"].is_string());

    // authorization row precedes the reply; lifecycle transitions follow
    let audit = mesh
        .audit_rows(json!({"source_id": "agent-a", "event_type": "invoke"}))
        .await;
    assert!(audit["total_count"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_denied_invocation_never_dispatches() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.evaluator
        .deny("agent-a", "agent-b", "invoke", "a may not invoke b")
        .await;
    let deliveries = serve_target(&mesh, "agent-b").await;

    let reply = mesh
        .request(
            "mesh.routing.agent_invoke",
            json!({
                "source_agent_id": "agent-a",
                "target_agent_id": "agent-b",
                "operation": "summarize",
                "payload": {},
            }),
        )
        .await;

    assert_eq!(reply["status"], "denied");
    assert_eq!(reply["reason"], "a may not invoke b");
    assert_eq!(deliveries.load(Ordering::SeqCst), 0);

    let audit = mesh
        .audit_rows(json!({"source_id": "agent-a", "outcome": "denied"}))
        .await;
    assert_eq!(audit["total_count"], 1);
    assert_eq!(audit["audit_logs"][0]["event_type"], "invoke");
}

#[tokio::test]
async fn test_unknown_target_agent_is_error() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;

    let reply = mesh
        .request(
            "mesh.routing.agent_invoke",
            json!({
                "source_agent_id": "agent-a",
                "target_agent_id": "ghost-agent",
                "operation": "summarize",
            }),
        )
        .await;

    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "UNKNOWN_RESOURCE");
    assert_eq!(reply["error"], "Agent ghost-agent not found in registry");
}

#[tokio::test]
async fn test_unresponsive_target_ends_in_error_state() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.evaluator.allow("agent-a", "agent-b", "invoke", &[]).await;
    // no responder on agent.agent-b

    let mut completions = mesh
        .transport
        .subscribe("mesh.routing.completion")
        .await
        .unwrap();

    let reply = mesh
        .request(
            "mesh.routing.agent_invoke",
            json!({
                "source_agent_id": "agent-a",
                "target_agent_id": "agent-b",
                "operation": "summarize",
            }),
        )
        .await;
    assert_eq!(reply["status"], "queued");

    let completion = tokio::time::timeout(Duration::from_secs(5), completions.recv())
        .await
        .expect("terminal state published")
        .unwrap();
    assert_eq!(completion.payload["status"], "error");
    assert!(completion.payload["result"].is_null());

    let tracking_id: Uuid =
        serde_json::from_value(reply["tracking_id"].clone()).unwrap();
    let status = mesh
        .request("mesh.routing.status", json!({"tracking_id": tracking_id}))
        .await;
    assert_eq!(status["status"], "error");
}

#[tokio::test]
async fn test_malformed_invoke_request_is_validation_error() {
    let mesh = start_mesh().await;
    let reply = mesh
        .request("mesh.routing.agent_invoke", json!({"source_agent_id": "a"}))
        .await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "VALIDATION");
}

#[tokio::test]
async fn test_unknown_tracking_id_status_lookup() {
    let mesh = start_mesh().await;
    let reply = mesh
        .request(
            "mesh.routing.status",
            json!({"tracking_id": Uuid::new_v4()}),
        )
        .await;
    assert_eq!(reply["code"], "UNKNOWN_RESOURCE");
}

#[tokio::test]
async fn test_target_error_reply_fails_invocation() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.evaluator.allow("agent-a", "agent-b", "invoke", &[]).await;
    mesh.transport
        .serve(
            "agent.agent-b",
            handler(|_request| async move {
                json!({"status": "error", "error": "unsupported payload"})
            }),
        )
        .await
        .unwrap();

    let mut completions = mesh
        .transport
        .subscribe("mesh.routing.completion")
        .await
        .unwrap();

    mesh.request(
        "mesh.routing.agent_invoke",
        json!({
            "source_agent_id": "agent-a",
            "target_agent_id": "agent-b",
            "operation": "summarize",
        }),
    )
    .await;

    let completion = tokio::time::timeout(Duration::from_secs(2), completions.recv())
        .await
        .expect("terminal state published")
        .unwrap();
    assert_eq!(completion.payload["status"], "error");
    assert_eq!(completion.payload["error"], "unsupported payload");
}

#[tokio::test]
async fn test_invoke_payload_defaults_to_empty_object() {
    let mesh = start_mesh().await;
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.evaluator.allow("agent-a", "agent-b", "invoke", &[]).await;
    serve_target(&mesh, "agent-b").await;

    let reply = mesh
        .request(
            "mesh.routing.agent_invoke",
            json!({
                "source_agent_id": "agent-a",
                "target_agent_id": "agent-b",
                "operation": "ping",
            }),
        )
        .await;
    assert_eq!(reply["status"], "queued");
    assert!(reply["tracking_id"].is_string());
}
