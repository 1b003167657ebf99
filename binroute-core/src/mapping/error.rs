use thiserror::Error;

/// Errors from [`crate::mapping::MappingService`] calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// No positions were provided.
    ///
    /// Callers should pre-filter input to avoid this condition.
    #[error("at least one origin and one destination are required")]
    EmptyInput,

    /// The provider asked the caller to slow down.
    ///
    /// This is the only error the adapter retries.
    #[error("mapping service rate limit exceeded")]
    RateLimited,

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Request URL with the credential removed.
        url: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// The provider responded with a non-success HTTP status.
    #[error("HTTP {status} from {url}: {message}")]
    HttpError {
        /// Request URL with the credential removed.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error detail.
        message: String,
    },

    /// The request failed before a response arrived.
    #[error("network error contacting {url}: {message}")]
    NetworkError {
        /// Request URL with the credential removed.
        url: String,
        /// Error detail.
        message: String,
    },

    /// The provider answered with an error status in its payload.
    #[error("mapping service returned {status}: {message}")]
    ServiceError {
        /// Provider status string, such as `"INVALID_REQUEST"`.
        status: String,
        /// Provider error message, empty when absent.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to parse mapping response: {message}")]
    ParseError {
        /// Error detail.
        message: String,
    },

    /// The provider returned a matrix whose shape does not match the request.
    #[error("expected a {rows}x{columns} matrix from the mapping service")]
    ShapeMismatch {
        /// Requested number of origins.
        rows: usize,
        /// Requested number of destinations.
        columns: usize,
    },
}
