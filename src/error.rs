// Error taxonomy shared by indexing and refactoring

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// A symbol that matched an ambiguous query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub kind: String,
    pub qualified_name: String,
    pub file: Option<String>,
}

/// Errors raised by the graph builder and the refactoring operations.
///
/// Only `Ambiguous` and `Persistence` are propagated as errors by the
/// operations themselves; the remaining variants are folded into a failed
/// `RefactorResult` so callers always get a readable message.
#[derive(Debug, Error)]
pub enum RefactorError {
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("'{name}' is ambiguous ({} candidates); supply containing_type or file_path", candidates.len())]
    Ambiguous {
        name: String,
        candidates: Vec<Candidate>,
    },

    #[error("{count} reference(s) to '{name}' remain")]
    ReferencesRemain { name: String, count: usize },

    #[error("compilation unavailable for project '{project}'")]
    CompilationUnavailable { project: String },

    #[error("failed to persist graph for workspace '{workspace}'")]
    Persistence {
        workspace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} changed on disk after it was read; re-run the operation", path.display())]
    StaleDocument { path: PathBuf },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RefactorError {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_counts_candidates() {
        let err = RefactorError::Ambiguous {
            name: "Order".to_string(),
            candidates: vec![
                Candidate {
                    kind: "class".to_string(),
                    qualified_name: "Shop.Order".to_string(),
                    file: None,
                },
                Candidate {
                    kind: "class".to_string(),
                    qualified_name: "Billing.Order".to_string(),
                    file: None,
                },
            ],
        };
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn test_not_found_message() {
        let err = RefactorError::not_found("symbol", "Missing");
        assert_eq!(err.to_string(), "symbol not found: Missing");
    }
}
