//! The error taxonomy shared by every step of the print pipeline.

use dropshot::HttpError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the print pipeline. Every variant is terminal for
/// the job that raised it; the server never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The incoming request's form fields failed validation. Each entry
    /// names one violated field.
    #[error("invalid print request: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A printer, configuration directory, or configuration file is
    /// absent. Messages never contain the configuration-store root.
    #[error("{0} not found")]
    NotFound(String),

    /// The slicer subprocess could not be run or exited nonzero.
    #[error("slicing failed: {0}")]
    Process(String),

    /// Delivering the sliced output to the printer failed.
    #[error("transfer to printer failed: {0}")]
    Transport(String),

    /// The printer's connection entry carries a `type` tag this server
    /// has no transport for.
    #[error("unsupported printer connection type")]
    UnsupportedConnection,

    /// Filesystem error while handling temporary artifacts.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A configuration file or printer definition is not valid JSON.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Validation(_) => HttpError::for_bad_request(None, err.to_string()),
            Error::NotFound(_) => HttpError::for_not_found(None, err.to_string()),
            Error::UnsupportedConnection => HttpError::for_bad_request(None, err.to_string()),
            _ => HttpError::for_internal_error(err.to_string()),
        }
    }
}
