use spendmap_core::{CategoryId, IntegrityError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// Deleting a category could not complete. The write transaction was
    /// rolled back; callers must treat the operation as failed.
    #[error("Cascade for category {category} failed: {reason}")]
    InconsistentCascade { category: CategoryId, reason: String },
    #[error("Corrupt {table} row {id}: {detail}")]
    Corrupt {
        table: &'static str,
        id: String,
        detail: String,
    },
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
