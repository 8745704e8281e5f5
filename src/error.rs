use thiserror::Error;

/// Type alias for Result with MoverError
pub type Result<T> = std::result::Result<T, MoverError>;

/// Error types for the message transfer engine and its surrounding plumbing
#[derive(Error, Debug)]
pub enum MoverError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Operator or signal driven abort
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label lookup or creation failed
    #[error("Label error: {0}")]
    LabelError(String),

    /// Malformed or incomplete transfer request, detected before any remote call
    #[error("Invalid transfer request: {0}")]
    ValidationError(String),

    /// Reading from the approval input channel failed
    #[error("Approval input failed: {0}")]
    ApprovalInput(#[source] std::io::Error),

    /// Operator typed something that is not a valid approval choice
    #[error("Invalid approval input: {0}")]
    InvalidApprovalInput(String),

    /// Job file could not be loaded or saved
    #[error("Job file error: {0}")]
    JobError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// How the orchestrator must react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No further approvals can be collected; the whole run is invalid
    Terminal,
    /// Intentional stop requested by the operator or a signal
    Cancelled,
    /// Only the current message is affected
    Recoverable,
}

#[cfg(unix)]
const ENOTTY: Option<i32> = Some(25);
#[cfg(not(unix))]
const ENOTTY: Option<i32> = None;

impl MoverError {
    pub fn cancelled() -> Self {
        MoverError::OperationCancelled("cancelled by user".to_string())
    }

    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MoverError::RateLimitExceeded { .. }
                | MoverError::ServerError { .. }
                | MoverError::NetworkError(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MoverError::OperationCancelled(_))
    }

    /// Classify the error for the transfer orchestrator.
    ///
    /// End-of-file on the approval channel counts as terminal along with
    /// ENOTTY anywhere in the source chain: in both cases nobody is left to
    /// answer the next prompt.
    pub fn class(&self) -> ErrorClass {
        match self {
            MoverError::OperationCancelled(_) => ErrorClass::Cancelled,
            MoverError::ApprovalInput(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                ErrorClass::Terminal
            }
            _ if is_terminal_error(self) => ErrorClass::Terminal,
            _ => ErrorClass::Recoverable,
        }
    }
}

/// Walk an error and its sources looking for an "inappropriate ioctl for
/// device" failure, either raw or wrapped inside another io::Error.
pub fn is_terminal_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            if is_terminal_io_error(io_err) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn is_terminal_io_error(err: &std::io::Error) -> bool {
    if ENOTTY.is_some() && err.raw_os_error() == ENOTTY {
        return true;
    }
    // io::Error::source() skips the wrapped error itself, so look at it directly
    match err.get_ref() {
        Some(inner) => is_terminal_error(inner),
        None => false,
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Only the delay-seconds form is honoured; anything else falls back to
/// 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for MoverError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        MoverError::RateLimitExceeded { retry_after }
                    }
                    404 => MoverError::MessageNotFound("Resource not found".to_string()),
                    400 => MoverError::BadRequest(message),
                    401 => MoverError::AuthError(message),
                    403 => MoverError::Forbidden(message),
                    500..=599 => MoverError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => MoverError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => MoverError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                MoverError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => MoverError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(ref err) => {
                MoverError::AuthError(format!("Missing token: {}", err))
            }
            _ => MoverError::ApiError(error.to_string()),
        }
    }
}
