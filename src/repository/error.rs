use crate::utils::IsTransient;

// ============================================================================
// Repository Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on {id}: expected {expected}, found {actual:?}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: Option<i64>,
    },

    /// Transient: timeouts, unreachable nodes, overloaded coordinator
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Permanent: malformed keys, undecodable rows
    #[error("Store rejected request: {0}")]
    Rejected(String),
}

impl IsTransient for RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}
