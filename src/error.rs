use thiserror::Error;

/// Central error type for the shortener storage layer
#[derive(Error, Debug)]
pub enum ShortenerError {
    // ============================================================================
    // Uniqueness Errors
    // ============================================================================
    /// The caller already shortened this URL. Carries the existing key so the
    /// transport layer can answer with the prior short URL instead of failing.
    #[error("URL already shortened as {existing_key}")]
    Conflict { existing_key: String },

    #[error("Value already exists: {0}")]
    ValueAlreadyExists(String),

    #[error("Could not allocate a free short key after re-roll: {0}")]
    KeyCollision(String),

    // ============================================================================
    // Lookup Errors
    // ============================================================================
    #[error("Short URL not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ============================================================================
    // Deadline Errors
    // ============================================================================
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Operation canceled")]
    Canceled,

    // ============================================================================
    // Backend Errors
    // ============================================================================
    #[error("Schema bootstrap failed: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Storage not initialized")]
    StorageNotInitialized,

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A store broke its own contract, e.g. returned the wrong number of keys
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`ShortenerError`] for transport collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    IoError,
    DeadlineExceeded,
    Canceled,
    SchemaError,
    Unsupported,
    InvalidInput,
    Internal,
}

impl ShortenerError {
    /// Map this error onto the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShortenerError::Conflict { .. } | ShortenerError::ValueAlreadyExists(_) => {
                ErrorKind::Conflict
            }
            ShortenerError::NotFound(_) => ErrorKind::NotFound,
            ShortenerError::Io(_) | ShortenerError::StorageNotInitialized => ErrorKind::IoError,
            ShortenerError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            ShortenerError::Canceled => ErrorKind::Canceled,
            ShortenerError::Schema(_) => ErrorKind::SchemaError,
            ShortenerError::Unsupported { .. } => ErrorKind::Unsupported,
            ShortenerError::InvalidUrl(_) | ShortenerError::ConfigError(_) => {
                ErrorKind::InvalidInput
            }
            ShortenerError::KeyCollision(_)
            | ShortenerError::Database(_)
            | ShortenerError::Json(_)
            | ShortenerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The previously issued key, if this is a conflict on add
    pub fn existing_key(&self) -> Option<&str> {
        match self {
            ShortenerError::Conflict { existing_key } => Some(existing_key),
            _ => None,
        }
    }
}

// Translate driver errors into the shared taxonomy. Pool exhaustion is a
// backend fault; `DeadlineExceeded` is reserved for the caller's context.
impl From<sqlx::Error> for ShortenerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ShortenerError::NotFound("no matching row".to_string()),
            sqlx::Error::Io(e) => ShortenerError::Io(e),
            other => ShortenerError::Database(other.to_string()),
        }
    }
}

impl From<url::ParseError> for ShortenerError {
    fn from(err: url::ParseError) -> Self {
        ShortenerError::InvalidUrl(err.to_string())
    }
}

// Helper type alias for Results
pub type ShortenerResult<T> = Result<T, ShortenerError>;
