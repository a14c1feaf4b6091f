// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Versioned schema migrations over a `schema_migrations` table.
//
// JSON-valued columns are stored as TEXT; timestamps are fixed-width
// RFC-3339 UTC text so range filters compare lexicographically.

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &[&str])] = &[
    (
        1,
        "agents",
        &[
            "CREATE TABLE agents (
                id TEXT PRIMARY KEY,
                identity TEXT UNIQUE NOT NULL,
                version TEXT NOT NULL,
                capabilities TEXT NOT NULL,
                operations TEXT NOT NULL,
                schemas TEXT NOT NULL,
                health_endpoint TEXT NOT NULL,
                status TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                last_heartbeat TEXT,
                metadata TEXT NOT NULL
            )",
            "CREATE INDEX idx_agents_identity ON agents(identity)",
            "CREATE INDEX idx_agents_status ON agents(status)",
        ],
    ),
    (
        2,
        "knowledge_bases",
        &[
            "CREATE TABLE knowledge_bases (
                id TEXT PRIMARY KEY,
                kb_id TEXT UNIQUE NOT NULL,
                kb_type TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                operations TEXT NOT NULL,
                schema TEXT NOT NULL,
                credentials TEXT,
                status TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                last_health_check TEXT,
                metadata TEXT NOT NULL
            )",
            "CREATE INDEX idx_kbs_kb_id ON knowledge_bases(kb_id)",
            "CREATE INDEX idx_kbs_type ON knowledge_bases(kb_type)",
        ],
    ),
    (
        3,
        "policies",
        &[
            "CREATE TABLE policies (
                policy_id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                precedence INTEGER NOT NULL,
                active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT NOT NULL
            )",
            "CREATE INDEX idx_policies_active ON policies(active)",
        ],
    ),
    (
        4,
        "audit_logs",
        &[
            "CREATE TABLE audit_logs (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT,
                outcome TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                request_metadata TEXT,
                policy_decision TEXT,
                masked_fields TEXT,
                full_request TEXT,
                full_response TEXT,
                provenance_chain TEXT
            )",
            "CREATE INDEX idx_audit_event_type ON audit_logs(event_type)",
            "CREATE INDEX idx_audit_source ON audit_logs(source_id)",
            "CREATE INDEX idx_audit_target ON audit_logs(target_id)",
            "CREATE INDEX idx_audit_timestamp ON audit_logs(timestamp)",
            "CREATE INDEX idx_audit_outcome ON audit_logs(outcome)",
        ],
    ),
];

pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT MAX(version) AS version FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    let current: i64 = row.try_get::<Option<i64>, _>("version")?.unwrap_or(0);

    for (version, name, statements) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        for statement in *statements {
            sqlx::query(statement).execute(pool).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(*version)
            .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(pool)
            .await?;
        info!(version, name, "applied migration");
    }

    Ok(())
}
