//! Error types for image capture operations.

use crate::step::CaptureStep;
use thiserror::Error;

/// Result type alias using [`CaptureError`].
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors that can occur while resolving configuration or capturing an image.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
/// None of them are retried: the first one ends the invocation.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// One or more service principal credentials are absent.
    #[error("client_id, client_secret and tenant_id are required (missing: {})", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    /// A required, non-credential parameter is absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A parameter is present but unusable.
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter {
        /// Parameter name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The compute provider was not compiled into this build.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Could not obtain a token for the management endpoint.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A remote step failed; carries which one.
    #[error("{step} failed: {source}")]
    RemoteOperation {
        /// Step that failed
        step: CaptureStep,
        /// Underlying error
        #[source]
        source: Box<CaptureError>,
    },

    /// The capture result did not contain an image URI.
    #[error("could not extract image uri from capture result: {0}")]
    Extraction(String),

    /// The management API answered with a non-success status.
    #[error("request failed with status code: {status} and message: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// ARM error code, when the body carried one
        code: Option<String>,
        /// ARM error message or raw body
        message: String,
    },

    /// A long-running operation finished in a terminal, non-success state.
    #[error("operation ended with status {status}: {message}")]
    OperationFailed {
        /// Final status reported by the service (`Failed`, `Canceled`)
        status: String,
        /// Error message reported by the service
        message: String,
    },

    /// A long-running operation did not finish in time.
    #[error("operation did not complete within {0:?}")]
    Timeout(std::time::Duration),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaptureError {
    /// Wraps an error with the remote step that produced it.
    ///
    /// # Example
    ///
    /// ```
    /// use azure_image_capture::{CaptureError, CaptureStep};
    ///
    /// let err = CaptureError::Transport("connection reset".to_string());
    /// let wrapped = CaptureError::remote(CaptureStep::Generalize, err);
    ///
    /// assert_eq!(
    ///     wrapped.to_string(),
    ///     "generalize failed: transport error: connection reset"
    /// );
    /// ```
    pub fn remote(step: CaptureStep, err: CaptureError) -> Self {
        Self::RemoteOperation {
            step,
            source: Box::new(err),
        }
    }

    /// Returns the failing step for [`CaptureError::RemoteOperation`].
    pub fn step(&self) -> Option<CaptureStep> {
        match self {
            Self::RemoteOperation { step, .. } => Some(*step),
            _ => None,
        }
    }
}
