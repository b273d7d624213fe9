//! Error types surfaced to callers of the client.
//!
//! Every error carries enough context (URL, path, status) to be reported
//! without the request that produced it. Callers that need a stable,
//! language-neutral identity use [`ClientError::domain`] and
//! [`ClientError::code`].

use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

use crate::response::{ResponseHead, ResponseValue};

/// Stable error domain reported by [`ClientError::domain`].
pub const ERROR_DOMAIN: &str = "fetcher.client";

/// Code reported for bodies that failed to decode.
pub const PARSE_ERROR_CODE: i64 = -1;
/// Code reported for transport-level failures.
pub const TRANSPORT_ERROR_CODE: i64 = -2;
/// Code reported when the pre-flight authorization step failed.
pub const AUTHORIZATION_ERROR_CODE: i64 = -3;
/// Code reported when a download could not be placed on disk.
pub const FILESYSTEM_ERROR_CODE: i64 = -4;
/// Code reported for requests cancelled by the caller.
pub const CANCELLED_ERROR_CODE: i64 = -5;
/// Code reported for requests abandoned because the client was closed.
pub const CLOSED_ERROR_CODE: i64 = -6;
/// Code reported for requests that could not be built.
pub const INVALID_REQUEST_ERROR_CODE: i64 = -7;
/// Code reported when the client could not be constructed from its configuration.
pub const CONFIGURATION_ERROR_CODE: i64 = -8;

/// Low-level failure reported by a transport, before any status validation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS or TLS failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The task was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The redirect chain exceeded the configured limit.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects {
        /// Configured redirect limit.
        limit: usize,
    },

    /// A redirect response carried no usable `Location`.
    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    /// Reading the request body (file or stream) failed.
    #[error("request body failed: {0}")]
    Body(String),

    /// Writing the temporary download file failed.
    #[error("temporary file error at {path}: {source}")]
    Io {
        /// Temporary file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Any other failure reported by the HTTP stack.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Maps a reqwest error onto the transport error kinds.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_body() {
            Self::Body(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

/// Errors delivered as the final result of a logical request.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connectivity, timeout or other transport failure.
    #[error("transport error for {url}: {source}")]
    Transport {
        /// The request URL.
        url: String,
        /// The transport-level cause.
        #[source]
        source: TransportError,
    },

    /// Response status outside `200..300`.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Response head as received.
        response: Box<ResponseHead>,
        /// Raw response body.
        body: Bytes,
        /// Best-effort decoding of the body, when it decoded.
        value: Option<Box<ResponseValue>>,
    },

    /// The body could not be decoded in the expected format.
    #[error("failed to decode response from {url}: {message}")]
    Parse {
        /// The request URL.
        url: String,
        /// Decoder message.
        message: String,
        /// Response head as received.
        response: Box<ResponseHead>,
    },

    /// The pre-flight authorization step failed or was denied.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Message from the authorization collaborator.
        message: String,
    },

    /// A downloaded file could not be moved to its destination.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The caller cancelled the request.
    #[error("request cancelled: {url}")]
    Cancelled {
        /// The request URL.
        url: String,
    },

    /// The client was closed before the request completed.
    #[error("client closed before {url} completed")]
    Closed {
        /// The request URL.
        url: String,
    },

    /// The client configuration could not be applied.
    #[error("invalid client configuration: {message}")]
    Configuration {
        /// What was rejected.
        message: String,
    },

    /// The request could not be built (bad URL, unreadable file parameter).
    #[error("invalid request {url}: {message}")]
    InvalidRequest {
        /// The URL or path as given.
        url: String,
        /// What was wrong with it.
        message: String,
    },
}

impl ClientError {
    /// Creates a transport error, folding cancellation into [`ClientError::Cancelled`].
    pub fn transport(url: impl Into<String>, source: TransportError) -> Self {
        match source {
            TransportError::Cancelled => Self::Cancelled { url: url.into() },
            source => Self::Transport {
                url: url.into(),
                source,
            },
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(
        url: impl Into<String>,
        response: ResponseHead,
        body: Bytes,
        value: Option<ResponseValue>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status: response.status,
            response: Box::new(response),
            body,
            value: value.map(Box::new),
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, message: impl Into<String>, response: ResponseHead) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
            response: Box::new(response),
        }
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a filesystem error.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Stable error domain shared by every variant.
    #[must_use]
    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    /// Numeric code: the HTTP status for status errors, a negative sentinel otherwise.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::HttpStatus { status, .. } => i64::from(*status),
            Self::Parse { .. } => PARSE_ERROR_CODE,
            Self::Transport { .. } => TRANSPORT_ERROR_CODE,
            Self::Authorization { .. } => AUTHORIZATION_ERROR_CODE,
            Self::Filesystem { .. } => FILESYSTEM_ERROR_CODE,
            Self::Cancelled { .. } => CANCELLED_ERROR_CODE,
            Self::Closed { .. } => CLOSED_ERROR_CODE,
            Self::InvalidRequest { .. } => INVALID_REQUEST_ERROR_CODE,
            Self::Configuration { .. } => CONFIGURATION_ERROR_CODE,
        }
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error should trigger the single authorization retry.
    #[must_use]
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self.status(), Some(400 | 401 | 403))
    }
}
