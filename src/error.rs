use crate::validate::Violation;
use crate::web::urlencoded::UrlEncodedError;

/// Errors that can terminate a binding pipeline.
///
/// Every kind stops the pipeline immediately; none are retried. Only
/// validation failures carry a non-zero status code.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The request could not be read or parsed.
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// The validator rejected the parameters.
    #[error("validation failed: {0}")]
    Validation(#[from] Violation),
    /// Validated parameters did not fit the destination type.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl BindError {
    /// Status code reported to the caller: the validator's code for
    /// validation failures, `0` for every other kind.
    pub fn status_code(&self) -> i32 {
        match self {
            BindError::Validation(violation) => violation.code(),
            BindError::Extract(_) | BindError::Decode(_) => 0,
        }
    }

    /// Returns the violation if validation failed.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            BindError::Validation(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Failures while reading or parsing a request source.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The body stream could not be read.
    #[error("failed to read request body: {0}")]
    Body(#[from] std::io::Error),
    /// The body is longer than the configured bound.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// The configured bound.
        limit: usize,
    },
    /// The body is not a single JSON object.
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
    /// The url-encoded form body could not be parsed.
    #[error("malformed form body: {0}")]
    Form(#[from] UrlEncodedError),
}

/// Failures while decoding validated parameters into a destination type.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A value did not fit its destination field, or the destination is not
    /// a structured type.
    #[error("failed to decode parameters: {0}")]
    Shape(#[from] serde_json::Error),
    /// A string could not be read as a date or timestamp.
    #[error("invalid time value, expected {expected}")]
    Time {
        /// The accepted formats.
        expected: String,
    },
}
