//! Error types for DocMigrate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Batch commit rejected ({lost} writes lost): {reason}")]
    BatchRejected { lost: usize, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came from the document store rather than the input.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Backend(_) | Error::BatchRejected { .. } | Error::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(Error::Backend("down".into()).is_backend());
        assert!(Error::Database("locked".into()).is_backend());
        assert!(Error::BatchRejected {
            lost: 3,
            reason: "permission denied".into()
        }
        .is_backend());
        assert!(!Error::Config("empty".into()).is_backend());
        assert!(!Error::Cancelled.is_backend());
    }

    #[test]
    fn test_batch_rejected_message() {
        let e = Error::BatchRejected {
            lost: 150,
            reason: "oversized batch".into(),
        };
        assert_eq!(
            e.to_string(),
            "Batch commit rejected (150 writes lost): oversized batch"
        );
    }
}
