use crate::auth::AuthError;
use crate::policy::{PolicyError, ValidationError};
use thiserror::Error;

/// Errors surfaced by reads and writes against an initialized vault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A unique index refused the write. Kept apart from [`StoreError::Validation`]
    /// so callers can answer "already registered" instead of "invalid form".
    #[error("duplicate value for `{field}` in `{collection}` (index `{index}`)")]
    Conflict {
        collection: String,
        index: String,
        field: String,
    },

    #[error("no document `{id}` in `{collection}`")]
    NotFound { collection: String, id: String },

    #[error("unknown collection `{0}`")]
    UnknownCollection(String),

    #[error("field `{field}` is not declared for `{collection}`")]
    UnknownField { collection: String, field: String },

    #[error("collection `{0}` has no text index")]
    NoTextIndex(String),

    #[error("`{field}` must reference an existing {expected} account, got `{id}`")]
    InvalidReference {
        field: String,
        id: String,
        expected: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

/// Errors raised while opening a vault, applying its policy or provisioning
/// the bootstrap account. Every one of them is fatal to startup.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("failed to build index `{index}` on `{collection}`: {source}")]
    IndexBuild {
        collection: String,
        index: String,
        source: rusqlite::Error,
    },

    #[error("{count} existing document(s) in `{collection}` violate its validator; first: {first}")]
    InvalidExisting {
        collection: String,
        count: usize,
        first: ValidationError,
    },

    /// The bootstrap email is registered to an account that is not an
    /// administrator, so no administrator would exist after startup.
    #[error("bootstrap email `{email}` belongs to a `{role}` account, not an admin")]
    BootstrapEmailTaken { email: String, role: String },

    #[error("failed to provision bootstrap account: {0}")]
    Provision(#[from] StoreError),

    #[error("failed to hash bootstrap credential: {0}")]
    Credential(#[from] AuthError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
