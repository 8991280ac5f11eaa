//! Error types for Tungsten
//!
//! This module defines:
//! - `RegistryError`: the error taxonomy shared by the store, registries,
//!   and placement engine
//! - `Result`: the crate-wide result alias

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// The record does not exist. For deletes this usually means "nothing
    /// to do"; for direct lookups it is a hard error.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// A record with the same id already exists. The reconciler converts
    /// this into an update path; direct callers surface it.
    #[error("resource '{0}' already exists")]
    ResourceConflict(String),

    /// The generation token no longer matches the stored record. The caller
    /// must re-read and recompute its patch before writing again.
    #[error("resource '{0}' is out of date")]
    ResourceOutOfDate(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Transient store or transport failure. Sweeps log and skip the
    /// affected item; the next scheduled pass self-heals.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    /// Whether a retried read-modify-write can make progress on this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::ResourceOutOfDate(_))
    }
}

/// Result type used throughout Tungsten
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::NotFound("app-1".to_string());
        assert_eq!(format!("{}", err), "resource 'app-1' not found");

        let err = RegistryError::ResourceOutOfDate("ep-2".to_string());
        assert_eq!(format!("{}", err), "resource 'ep-2' is out of date");

        let err = RegistryError::InvalidArgument("empty site id".to_string());
        assert_eq!(format!("{}", err), "invalid argument: empty site id");
    }

    #[test]
    fn test_retryable() {
        assert!(RegistryError::ResourceOutOfDate("x".to_string()).is_retryable());
        assert!(!RegistryError::NotFound("x".to_string()).is_retryable());
        assert!(!RegistryError::ResourceConflict("x".to_string()).is_retryable());
    }

    #[test]
    fn test_from_anyhow() {
        let err: RegistryError = anyhow::anyhow!("store unavailable").into();
        assert_eq!(format!("{}", err), "internal error: store unavailable");
    }
}
