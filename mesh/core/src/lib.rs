// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AgentMesh Core
//!
//! Policy-enforcing message broker for knowledge-base and agent traffic.
//!
//! External agents never touch storage or the policy engine directly: they
//! exchange JSON messages with the mesh over named transport subjects. Every
//! governed request is authorized against the policy evaluator, forwarded to
//! an adapter worker, masked field-by-field, and written to the append-only
//! audit log before the reply leaves the process.
//!
//! # Architecture
//!
//! - **domain** - records, masking, invariants, error taxonomy
//! - **application** - registry, directory, enforcement, health, policy admin
//! - **infrastructure** - SQLite store, OPA client, transport, adapter worker
//! - **presentation** - request router and subject bindings

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
