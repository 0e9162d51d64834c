//! Error types shared by every store backend.
//!
//! Backends translate their native failures (HTTP status, RPC status names,
//! transport errors) into an [`ErrorCode`]. The code is the only thing the
//! retry layer looks at, so a new backend only has to get the mapping right.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

/// Canonical classification of a remote failure (gRPC-style status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Caller is not allowed to perform the operation.
    PermissionDenied,
    /// The request itself is malformed.
    InvalidArgument,
    /// Target entity does not exist.
    NotFound,
    /// Create targeted an entity that already exists.
    AlreadyExists,
    /// Quota or rate limit hit.
    ResourceExhausted,
    /// Backend temporarily unreachable.
    Unavailable,
    /// Request timed out.
    DeadlineExceeded,
    /// Concurrency conflict (e.g. transaction contention).
    Aborted,
    /// Backend-side bug or unreadable response.
    Internal,
    /// Anything not covered above.
    Unknown,
}

impl ErrorCode {
    /// Kebab-case name, e.g. `permission-denied`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::ResourceExhausted => "resource-exhausted",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DeadlineExceeded => "deadline-exceeded",
            ErrorCode::Aborted => "aborted",
            ErrorCode::Internal => "internal",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Map an HTTP status to a code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 411 | 413 | 422 => ErrorCode::InvalidArgument,
            401 | 403 => ErrorCode::PermissionDenied,
            404 => ErrorCode::NotFound,
            408 | 504 => ErrorCode::DeadlineExceeded,
            409 => ErrorCode::Aborted,
            429 => ErrorCode::ResourceExhausted,
            500 => ErrorCode::Internal,
            502 | 503 => ErrorCode::Unavailable,
            _ => ErrorCode::Unknown,
        }
    }

    /// Map a Google API status name (`"PERMISSION_DENIED"`) to a code.
    ///
    /// Returns `None` for names we do not recognise so the caller can fall
    /// back to the HTTP status.
    pub fn from_status_name(name: &str) -> Option<Self> {
        let code = match name {
            "PERMISSION_DENIED" | "UNAUTHENTICATED" => ErrorCode::PermissionDenied,
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
                ErrorCode::InvalidArgument
            }
            "NOT_FOUND" => ErrorCode::NotFound,
            "ALREADY_EXISTS" => ErrorCode::AlreadyExists,
            "RESOURCE_EXHAUSTED" => ErrorCode::ResourceExhausted,
            "UNAVAILABLE" => ErrorCode::Unavailable,
            "DEADLINE_EXCEEDED" => ErrorCode::DeadlineExceeded,
            "ABORTED" => ErrorCode::Aborted,
            "INTERNAL" | "DATA_LOSS" => ErrorCode::Internal,
            "UNKNOWN" | "CANCELLED" => ErrorCode::Unknown,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while constructing a store client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreInitError {
    /// A required environment variable is missing.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// Access token contains characters not allowed in a header.
    #[snafu(display("Invalid access token format: {source}"))]
    InvalidToken {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors returned by [`IdentityProvider`](crate::identity::IdentityProvider)
/// and [`DocumentStore`](crate::documents::DocumentStore) calls.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The backend answered and rejected the request.
    #[snafu(display("{operation} failed ({code}): {message}"))]
    Remote {
        operation: String,
        code: ErrorCode,
        message: String,
        backtrace: Backtrace,
    },

    /// The request never got a usable answer (connect, TLS, timeout, ...).
    #[snafu(display("{operation} transport error: {source}"))]
    Transport {
        operation: String,
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The backend answered with a body we could not interpret.
    #[snafu(display("{operation} returned an unreadable response: {message}"))]
    Decode {
        operation: String,
        message: String,
        backtrace: Backtrace,
    },
}

impl StoreError {
    /// Classification used by the retry layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Remote { code, .. } => *code,
            StoreError::Transport { source, .. } if source.is_timeout() => {
                ErrorCode::DeadlineExceeded
            }
            StoreError::Transport { .. } => ErrorCode::Unavailable,
            StoreError::Decode { .. } => ErrorCode::Internal,
        }
    }

    /// Shorthand for building a [`StoreError::Remote`].
    pub fn remote(
        operation: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        RemoteSnafu {
            operation: operation.into(),
            code,
            message: message.into(),
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_map_to_codes() {
        assert_eq!(ErrorCode::from_http_status(403), ErrorCode::PermissionDenied);
        assert_eq!(ErrorCode::from_http_status(401), ErrorCode::PermissionDenied);
        assert_eq!(ErrorCode::from_http_status(400), ErrorCode::InvalidArgument);
        assert_eq!(ErrorCode::from_http_status(429), ErrorCode::ResourceExhausted);
        assert_eq!(ErrorCode::from_http_status(503), ErrorCode::Unavailable);
        assert_eq!(ErrorCode::from_http_status(418), ErrorCode::Unknown);
    }

    #[test]
    fn status_names_take_precedence_when_known() {
        assert_eq!(
            ErrorCode::from_status_name("FAILED_PRECONDITION"),
            Some(ErrorCode::InvalidArgument)
        );
        assert_eq!(ErrorCode::from_status_name("SOMETHING_NEW"), None);
    }

    #[test]
    fn remote_error_reports_its_code() {
        let err = StoreError::remote("commit", ErrorCode::Aborted, "contention");
        assert_eq!(err.code(), ErrorCode::Aborted);
        assert_eq!(err.to_string(), "commit failed (aborted): contention");
    }
}
