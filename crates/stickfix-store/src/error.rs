//! Error types for the stickfix-store crate.
//!
//! All engine operations return [`StoreError`] via [`StoreResult`].
//! Lookup misses never surface here for queries: they are resolved by the
//! public fallback in [`crate::scope`]. Corruption and I/O failures are kept
//! apart so the save path can branch on them.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the sticker engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A durable file exists but could not be parsed.
    #[error("corrupt data in {}: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Disk or permission failure while touching durable storage.
    #[error("storage unavailable at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An invalid argument was provided to an engine operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The primary file is unusable and no backup generation can replace it.
    #[error("registry at {} is unusable and no backup generation can replace it", path.display())]
    RecoveryExhausted { path: PathBuf },

    /// The registry lock was poisoned by a panicking holder.
    #[error("registry lock poisoned: {0}")]
    LockPoisoned(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Build an [`StoreError::Unavailable`] for `path`.
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unavailable {
            path: path.into(),
            source,
        }
    }

    /// Build a [`StoreError::CorruptData`] for `path`.
    pub(crate) fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::CorruptData {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "the file is there but unparsable".
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptData { .. })
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_is_distinguishable_from_unavailable() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let corrupt = StoreError::corrupt("users.json", json_err);
        assert!(corrupt.is_corrupt());

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let unavailable = StoreError::unavailable("users.json", io_err);
        assert!(!unavailable.is_corrupt());
        assert!(unavailable.to_string().contains("users.json"));
    }

    #[test]
    fn not_found_message() {
        let err = StoreError::NotFound {
            entity: "user",
            id: "42".into(),
        };
        assert_eq!(err.to_string(), "user not found: 42");
    }
}
