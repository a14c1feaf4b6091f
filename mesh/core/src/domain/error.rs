use crate::domain::repository::RepositoryError;
use thiserror::Error;

/// Wire-visible error taxonomy. `code()` is what goes out in the `code`
/// field of error replies; `Display` is the human-readable `error` text.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("{field}: {problem} ({hint})")]
    Validation {
        field: String,
        problem: String,
        hint: String,
    },

    #[error("invalid operation '{operation}', allowed: {}", .allowed.join(", "))]
    InvalidOperation {
        operation: String,
        allowed: Vec<String>,
    },

    #[error("{kind} '{id}' is already registered")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} {id} not found in registry")]
    UnknownResource { kind: &'static str, id: String },

    #[error("policy evaluator unavailable: {0}")]
    EvaluatorUnavailable(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("audit write failed: {0}")]
    AuditFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MeshError {
    pub fn validation(
        field: impl Into<String>,
        problem: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        MeshError::Validation {
            field: field.into(),
            problem: problem.into(),
            hint: hint.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MeshError::Validation { .. } => "VALIDATION",
            MeshError::InvalidOperation { .. } => "INVALID_OPERATION",
            MeshError::Duplicate { .. } => "DUPLICATE",
            MeshError::UnknownResource { .. } => "UNKNOWN_RESOURCE",
            MeshError::EvaluatorUnavailable(_) => "EVALUATOR_UNAVAILABLE",
            MeshError::Adapter(_) => "ADAPTER_ERROR",
            MeshError::AuditFailure(_) => "AUDIT_FAILURE",
            MeshError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<RepositoryError> for MeshError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => MeshError::UnknownResource {
                kind: "Record",
                id: what,
            },
            RepositoryError::Duplicate(what) => MeshError::Duplicate {
                kind: "Record",
                id: what,
            },
            other => MeshError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Internal(err.to_string())
    }
}
