use thiserror::Error;

/// Error type for repors operations
#[derive(Debug, Error)]
pub enum ReporsError {
    /// Transport-level failure while reaching the backend.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Raw backend error text, exactly as the database driver reported it.
    /// Classification (connection-level, retriable) matches on this text.
    #[error("{0}")]
    Backend(String),

    /// A backend error wrapped with the short code of the operation that
    /// surfaced it.
    #[error("{tag}- {message}")]
    Tagged {
        tag: &'static str,
        message: String,
    },

    #[error("Record not found")]
    NotFound,

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: u64, actual: u64 },

    #[error("Expected {expected} column(s), got {actual}")]
    UnexpectedColumnCount { expected: usize, actual: usize },

    #[error("Cannot scan {found} into {wanted}")]
    Scan {
        wanted: &'static str,
        found: &'static str,
    },

    /// Caller misuse detected before any backend call. Never retried.
    #[error("Invalid arguments to {operation}: {reason}")]
    Usage {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("Max allowed retries exceeded {attempts}/{limit}: {message}")]
    RetriesExceeded {
        attempts: u32,
        limit: u32,
        message: String,
    },

    /// Two or more errors folded into one, e.g. an operation failure plus
    /// the failure of its rollback.
    #[error("{0}")]
    Merged(String),
}

/// Result type alias for repors operations
pub type Result<T> = std::result::Result<T, ReporsError>;

/// Merges a sequence of optional errors into at most one error.
///
/// No errors, or only `None`s, merge to `None`. A single error is returned
/// unchanged. Two or more become `Merged` with a message of the form
/// `"<n> errors: <msg1>, <msg2>, ..."`.
pub fn merge<I>(errs: I) -> Option<ReporsError>
where
    I: IntoIterator<Item = Option<ReporsError>>,
{
    let mut present: Vec<ReporsError> = errs.into_iter().flatten().collect();
    match present.len() {
        0 => None,
        1 => present.pop(),
        n => {
            let joined = present
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Some(ReporsError::Merged(format!("{} errors: {}", n, joined)))
        }
    }
}

/// Folds a secondary error (if any) into a primary one.
/// Used when a rollback fails on top of the error that triggered it.
pub(crate) fn merge_into(primary: ReporsError, secondary: Option<ReporsError>) -> ReporsError {
    match secondary {
        None => primary,
        Some(extra) => ReporsError::Merged(format!("2 errors: {}, {}", primary, extra)),
    }
}
