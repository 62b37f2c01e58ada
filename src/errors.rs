use thiserror::Error;

/// Error type for lineage graph operations.
///
/// Capacity conditions (node caps, path caps, deadlines) are not errors; they are
/// reported through `TraversalMetadata::truncated` on an otherwise valid result.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("edge not found: {0}")]
    EdgeNotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("load error: {0}")]
    Load(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LineageError {
    pub fn node_not_found<T: Into<String>>(id: T) -> Self {
        LineageError::NodeNotFound(id.into())
    }

    pub fn edge_not_found<T: Into<String>>(id: T) -> Self {
        LineageError::EdgeNotFound(id.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LineageError::Validation(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        LineageError::Conflict(msg.into())
    }

    pub fn concurrency<T: Into<String>>(msg: T) -> Self {
        LineageError::ConcurrencyConflict(msg.into())
    }

    pub fn load<T: Into<String>>(msg: T) -> Self {
        LineageError::Load(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        LineageError::Storage(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        LineageError::InvalidInput(msg.into())
    }

    /// True when a delta was refused for integrity reasons and the graph is unchanged.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LineageError::NodeNotFound(_)
                | LineageError::EdgeNotFound(_)
                | LineageError::Validation(_)
                | LineageError::Conflict(_)
                | LineageError::ConcurrencyConflict(_)
        )
    }
}

impl From<rusqlite::Error> for LineageError {
    fn from(err: rusqlite::Error) -> Self {
        LineageError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LineageError {
    fn from(err: serde_json::Error) -> Self {
        LineageError::InvalidInput(err.to_string())
    }
}
