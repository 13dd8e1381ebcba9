use thiserror::Error;

use fieldops_core::domain::meta::EntityKind;
use fieldops_core::store::StoreError;

pub mod audit;
pub mod entity;

pub use audit::SqlAuditLog;
pub use entity::SqlEntityStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate {key} `{value}` in {kind} collection")]
    Duplicate { kind: EntityKind, key: String, value: String },
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Duplicate { kind, key, value } => {
                StoreError::DuplicateKey { kind, key, value }
            }
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
        }
    }
}
