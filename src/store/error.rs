//! Store Errors
//!
//! Infrastructure failures raised by a store backend.

/// Errors that can occur in a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row lock could not be acquired within the lock timeout
    #[error("Lock acquisition timed out")]
    LockTimeout,

    /// Serialization failure, deadlock or uniqueness race lost
    #[error("Concurrent modification conflict: {0}")]
    Conflict(String),

    /// Persisted row violates a domain invariant
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout | StoreError::Conflict(_) | StoreError::Database(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // lock_not_available
                Some("55P03") => return StoreError::LockTimeout,
                // serialization_failure, deadlock_detected, unique_violation
                Some("40001") | Some("40P01") | Some("23505") => {
                    return StoreError::Conflict(db_err.message().to_string())
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::LockTimeout.is_retryable());
        assert!(StoreError::Conflict("race".into()).is_retryable());
        assert!(!StoreError::Corrupt("bad status".into()).is_retryable());
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }
}
