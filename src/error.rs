use thiserror::Error;

/// Errors raised by the storage and resolver layers.
///
/// Shape problems in stored or submitted records never end up here: they are
/// absorbed by normalization. What remains are transport failures and a few
/// caller mistakes at the resolver boundary.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("lmdb error: {0}")]
    Lmdb(#[from] lmdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("issue service error: {0}")]
    Remote(String),

    #[error("unknown resolver function: {0}")]
    UnknownFunction(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl DirectoryError {
    /// True for failures that come from the storage backend itself.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            DirectoryError::Lmdb(_) | DirectoryError::Io(_) | DirectoryError::Unavailable(_)
        )
    }
}
