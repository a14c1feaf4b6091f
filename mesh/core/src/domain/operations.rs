//! Static operation vocabularies.
//!
//! One enumerated set per adapter type, built once and used both by the
//! registry (to reject unknown operations at registration time) and by the
//! adapter worker (to build its dispatch table at startup).

use crate::domain::error::MeshError;

pub const POSTGRES_OPERATIONS: &[&str] = &["sql_query", "execute_sql", "get_schema"];

pub const NEO4J_OPERATIONS: &[&str] = &[
    "cypher_query",
    "create_node",
    "create_relationship",
    "find_node",
];

pub const AGENT_OPERATIONS: &[&str] = &["publish", "query", "subscribe", "invoke", "execute"];

/// Vocabulary for a KB type, or `None` when the type has no adapter.
pub fn allowed_kb_operations(kb_type: &str) -> Option<&'static [&'static str]> {
    match kb_type {
        "postgres" => Some(POSTGRES_OPERATIONS),
        "neo4j" => Some(NEO4J_OPERATIONS),
        _ => None,
    }
}

pub fn validate_kb_operations(kb_type: &str, operations: &[String]) -> Result<(), MeshError> {
    let allowed = allowed_kb_operations(kb_type).unwrap_or(&[]);
    validate_against(operations, allowed)
}

pub fn validate_agent_operations(operations: &[String]) -> Result<(), MeshError> {
    validate_against(operations, AGENT_OPERATIONS)
}

fn validate_against(operations: &[String], allowed: &'static [&'static str]) -> Result<(), MeshError> {
    for operation in operations {
        if !allowed.contains(&operation.as_str()) {
            return Err(MeshError::InvalidOperation {
                operation: operation.clone(),
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_vocabulary_accepts_known_operations() {
        let ops = vec!["sql_query".to_string(), "get_schema".to_string()];
        assert!(validate_kb_operations("postgres", &ops).is_ok());
    }

    #[test]
    fn test_unknown_operation_echoes_allowed_set() {
        let ops = vec!["drop_table".to_string()];
        let err = validate_kb_operations("postgres", &ops).unwrap_err();
        match err {
            MeshError::InvalidOperation { operation, allowed } => {
                assert_eq!(operation, "drop_table");
                assert_eq!(allowed, vec!["sql_query", "execute_sql", "get_schema"]);
            }
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_neo4j_vocabulary() {
        let ops = vec!["find_node".to_string()];
        assert!(validate_kb_operations("neo4j", &ops).is_ok());
        let bad = vec!["match_nodes".to_string()];
        assert!(validate_kb_operations("neo4j", &bad).is_err());
    }

    #[test]
    fn test_agent_vocabulary() {
        let ops = vec!["publish".to_string(), "invoke".to_string()];
        assert!(validate_agent_operations(&ops).is_ok());
        let bad = vec!["teleport".to_string()];
        assert!(validate_agent_operations(&bad).is_err());
    }

    #[test]
    fn test_unsupported_kb_type_has_no_vocabulary() {
        assert!(allowed_kb_operations("mongodb").is_none());
        let ops = vec!["sql_query".to_string()];
        assert!(validate_kb_operations("mongodb", &ops).is_err());
    }
}
