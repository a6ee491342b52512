//! Mapping of sqlx failures onto [`StorageError`].

use meetpoint_appointments::StorageError;

/// Classify a sqlx error. `context` names the failed operation.
pub(crate) fn storage_error(context: &str, error: sqlx::Error) -> StorageError {
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Duplicate(format!("{context}: {}", db.message()))
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StorageError::Unavailable(format!("{context}: {error}"))
        },
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::Corrupt(format!("{context}: {error}")),
        other => StorageError::Backend(format!("{context}: {other}")),
    }
}

/// A column value that doesn't map onto the domain.
pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(format!("{what}: {detail}"))
}
