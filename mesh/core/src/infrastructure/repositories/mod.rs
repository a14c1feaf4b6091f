// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// SQLite repository implementations.
//
// Columns holding JSON are TEXT; timestamps are fixed-width RFC-3339 UTC
// text (see migrations.rs). All decode failures surface as
// `RepositoryError::Serialization` rather than panicking.

mod audit;
mod policy;
mod registry;

pub use audit::SqliteAuditRepository;
pub use policy::SqlitePolicyRepository;
pub use registry::SqliteRegistryRepository;

use crate::domain::repository::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(text: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Serialization(format!("bad timestamp '{text}': {e}")))
}

pub(crate) fn decode_opt_time(
    text: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    text.as_deref().map(decode_time).transpose()
}

pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(RepositoryError::from)
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    text: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(text).map_err(RepositoryError::from)
}
