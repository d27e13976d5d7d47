//! Error types for the storage engine.

/// Storage error type.
///
/// Every fallible public operation returns `Result<T, StorageError>`. Variants
/// map onto the error kinds a caller needs to branch on; anything else
/// collapses into `Database`/`Io`/`Json`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error from the content store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Content-store record failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Node, edge, version, lesson, quirk, or embedding not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create called against an id that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An operation would violate a data-model invariant (e.g. update on an
    /// absent node, non-monotonic version write).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Malformed input (bad id shape, empty required field).
    #[error("validation error: {0}")]
    Validation(String),

    /// The deterministic node id collided across two distinct fingerprints.
    #[error(
        "identity conflict for node {id}: existing session {existing_session}, incoming session {incoming_session}"
    )]
    IdentityConflict {
        id: String,
        existing_session: String,
        incoming_session: String,
    },

    /// A content-store record failed structural validation on read.
    #[error("corrupt content-store record at {0}")]
    Corrupt(String),

    /// Embedding vector length did not match the configured table dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed; isolated per-node during backfill.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// A storage-internal mutex was poisoned by a panicking holder.
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Could not determine a platform default data directory.
    #[error("initialization error: {0}")]
    Init(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StorageError::LockPoisoned(e.to_string())
    }
}
