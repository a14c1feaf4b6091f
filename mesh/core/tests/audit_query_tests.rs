// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit query surface: structured filters, time ranges, limits.

mod common;

use common::start_mesh;
use serde_json::json;

/// Drive a few governed requests so the audit table has mixed rows.
async fn seed(mesh: &common::TestMesh) {
    mesh.register_agent("agent-a").await;
    mesh.register_agent("agent-b").await;
    mesh.register_kb("sales-kb-1").await;
    mesh.attach_adapter("sales-kb-1", json!({"rows": []})).await;

    mesh.evaluator
        .allow("agent-a", "sales-kb-1", "sql_query", &[])
        .await;
    mesh.evaluator
        .deny("agent-b", "sales-kb-1", "sql_query", "b may not read sales")
        .await;

    for requester in ["agent-a", "agent-b"] {
        mesh.request(
            "mesh.routing.kb_query",
            json!({
                "requester_id": requester,
                "kb_id": "sales-kb-1",
                "operation": "sql_query",
            }),
        )
        .await;
    }
}

#[tokio::test]
async fn test_filter_by_outcome_and_source() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    let denied = mesh.audit_rows(json!({"outcome": "denied"})).await;
    assert_eq!(denied["total_count"], 1);
    assert_eq!(denied["audit_logs"][0]["source_id"], "agent-b");
    assert_eq!(denied["filters_applied"]["outcome"], "denied");

    let for_a = mesh
        .audit_rows(json!({"source_id": "agent-a", "event_type": "query"}))
        .await;
    assert_eq!(for_a["total_count"], 1);
    assert_eq!(for_a["audit_logs"][0]["outcome"], "success");
}

#[tokio::test]
async fn test_each_terminated_request_has_exactly_one_query_row() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    for (source, expected_outcome) in [("agent-a", "success"), ("agent-b", "denied")] {
        let rows = mesh
            .audit_rows(json!({"source_id": source, "event_type": "query"}))
            .await;
        assert_eq!(rows["total_count"], 1, "one row for {source}");
        assert_eq!(rows["audit_logs"][0]["outcome"], expected_outcome);
    }
}

#[tokio::test]
async fn test_limit_zero_returns_empty_page_with_total() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    let reply = mesh
        .audit_rows(json!({"event_type": "query", "limit": 0}))
        .await;
    assert_eq!(reply["audit_logs"].as_array().unwrap().len(), 0);
    assert_eq!(reply["total_count"], 2);
}

#[tokio::test]
async fn test_inverted_time_range_is_empty_success() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    let reply = mesh
        .audit_rows(json!({
            "start_time": "2030-01-01T00:00:00Z",
            "end_time": "2020-01-01T00:00:00Z",
        }))
        .await;
    assert!(reply.get("code").is_none(), "no error code on inverted range");
    assert_eq!(reply["total_count"], 0);
    assert_eq!(reply["audit_logs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_time_range_covering_now_finds_rows() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    let reply = mesh
        .audit_rows(json!({
            "event_type": "query",
            "start_time": "2020-01-01T00:00:00Z",
            "end_time": "2100-01-01T00:00:00Z",
        }))
        .await;
    assert_eq!(reply["total_count"], 2);
}

#[tokio::test]
async fn test_rows_ordered_newest_first() {
    let mesh = start_mesh().await;
    seed(&mesh).await;

    let reply = mesh.audit_rows(json!({})).await;
    let logs = reply["audit_logs"].as_array().unwrap();
    assert!(logs.len() >= 4, "registrations plus governed requests");
    let timestamps: Vec<&str> = logs
        .iter()
        .map(|row| row["timestamp"].as_str().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(timestamps, sorted);
}

#[tokio::test]
async fn test_unknown_filter_enum_is_validation_error() {
    let mesh = start_mesh().await;
    let reply = mesh.audit_rows(json!({"outcome": "mysterious"})).await;
    assert_eq!(reply["code"], "VALIDATION");
}
