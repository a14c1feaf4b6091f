// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AgentMesh SDK
//!
//! Agent-side client for the mesh. Agents hold a [`MeshClient`] over a
//! transport handle and never talk to storage or the policy engine directly.

mod client;

pub use client::{InvokeReply, KbQueryReply, MeshClient};
