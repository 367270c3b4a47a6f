//! Error types for data API calls.
//!
//! Every failure keeps enough context to tell "the server kept rejecting us"
//! apart from "the network never answered": HTTP failures carry the status and
//! raw body, transport failures carry the underlying `reqwest` error, and retry
//! exhaustion wraps whichever of the two was seen last.

use http::{HeaderMap, StatusCode};

/// The main error type for data API calls.
///
/// # Examples
///
/// ```no_run
/// use bubble_api::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://myapp.bubbleapps.io")?
///     .build()?;
///
/// match client.get_by_id::<serde_json::Value>("User", "1700000000000x1").await {
///     Ok(user) => println!("Found: {}", user),
///     Err(e) if e.is_not_found() => println!("No such user"),
///     Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
///         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection refused, DNS failure, reset...).
    #[error("Network error: {0}")]
    Network(reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    ///
    /// 4xx responses surface as this variant immediately. 5xx responses only
    /// surface directly when wrapped in [`Error::MaxRetriesExceeded`].
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// All attempts failed with transient errors.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made, including the first one
        attempts: usize,
        /// The error returned by the final attempt
        last_error: Box<Error>,
    },

    /// A 2xx response did not have the expected shape.
    #[error("Malformed response (status {status}): {message}")]
    MalformedResponse {
        /// The raw response body
        raw_response: String,
        /// What was wrong with it
        message: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// A lookup by a secondary column matched nothing.
    #[error("No {thing_type} found with {column} = {value}")]
    NotFound {
        /// Normalized thing type
        thing_type: String,
        /// Column used for the lookup
        column: String,
        /// Value searched for
        value: String,
    },

    /// A lookup that must be unique matched several things.
    #[error("{count} {thing_type} things found with {column} = {value}, expected one")]
    MultipleResults {
        /// Normalized thing type
        thing_type: String,
        /// Column used for the lookup
        column: String,
        /// Value searched for
        value: String,
        /// Number of matching things
        count: u64,
    },

    /// The operation was called with an invalid combination of arguments.
    ///
    /// No request is sent when this is returned.
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Writing records to a CSV sink failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error while writing to a sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A concurrent page worker did not finish.
    #[error("Page worker failed: {0}")]
    Worker(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

impl Error {
    /// Returns `true` if this error is transient and the request may be retried.
    ///
    /// Network errors, timeouts and 5xx responses are transient. Every 4xx,
    /// 429 included, is treated as a client error and never retried.
    ///
    /// # Examples
    ///
    /// ```
    /// use bubble_api::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     raw_response: "upstream down".to_string(),
    ///     headers: http::HeaderMap::new(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::TOO_MANY_REQUESTS,
    ///     raw_response: "slow down".to_string(),
    ///     headers: http::HeaderMap::new(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::HttpError { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    ///
    /// For [`Error::MaxRetriesExceeded`] this is the status of the last attempt,
    /// or `None` if the last attempt never got a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::MalformedResponse { status, .. } => Some(*status),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::MalformedResponse { raw_response, .. } => Some(raw_response),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.raw_response(),
            _ => None,
        }
    }

    /// Returns `true` for a 4xx response.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::HttpError { status, .. } if status.is_client_error())
    }

    /// Returns `true` if the addressed thing does not exist.
    ///
    /// Covers both a 404 from the server and an empty secondary-column lookup,
    /// so deleting an already deleted id classifies the same way every time.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::HttpError { status, .. } => *status == StatusCode::NOT_FOUND,
            Error::NotFound { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn malformed(
        raw_response: impl Into<String>,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Error::MalformedResponse {
            raw_response: raw_response.into(),
            message: message.into(),
            status,
        }
    }
}

/// A specialized `Result` type for data API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http_error(status: StatusCode) -> Error {
        Error::HttpError {
            status,
            raw_response: "body".to_string(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_only_transport_failures_and_5xx_are_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(http_error(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(http_error(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(!http_error(StatusCode::NOT_FOUND).is_retryable());
        assert!(!http_error(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!Error::Usage("both".to_string()).is_retryable());
        assert!(!Error::malformed("x", StatusCode::OK, "bad").is_retryable());
    }

    #[test]
    fn test_exhaustion_reports_last_status() {
        let err = Error::MaxRetriesExceeded {
            attempts: 4,
            last_error: Box::new(http_error(StatusCode::BAD_GATEWAY)),
        };
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.raw_response(), Some("body"));

        let err = Error::MaxRetriesExceeded {
            attempts: 2,
            last_error: Box::new(Error::Timeout),
        };
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(http_error(StatusCode::NOT_FOUND).is_not_found());
        assert!(http_error(StatusCode::NOT_FOUND).is_client_error());
        assert!(Error::NotFound {
            thing_type: "user".to_string(),
            column: "email".to_string(),
            value: "a@b.c".to_string(),
        }
        .is_not_found());
        assert!(!http_error(StatusCode::BAD_REQUEST).is_not_found());
    }
}
