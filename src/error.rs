use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Fixed set of error codes reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing credentials or an invalid base URL. Raised at construction.
    #[serde(rename = "CONFIG_ERROR")]
    Config,
    /// The request did not complete within the configured timeout.
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    /// The server rejected the agent credentials.
    #[serde(rename = "AUTH_ERROR")]
    Auth,
    /// The server could not be reached.
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// Anything not matched by the other codes.
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
    /// Connection verification failed. Only reported through connection status and callbacks.
    VerificationFailed,
    /// Background health check failed. Only reported through connection status.
    HealthCheckFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG_ERROR",
            ErrorCode::Timeout => "TIMEOUT_ERROR",
            ErrorCode::Auth => "AUTH_ERROR",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
            ErrorCode::VerificationFailed => "VERIFICATION_FAILED",
            ErrorCode::HealthCheckFailed => "HEALTH_CHECK_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`Client`](crate::Client) operations.
///
/// `details` holds the underlying failure verbatim. It is wrapped in an `Arc` so that the error
/// stays `Clone` and can be stored in [`ConnectionStatus`](crate::ConnectionStatus).
#[derive(thiserror::Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[source]
    details: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub(crate) fn new(code: ErrorCode, message: impl Into<String>) -> Error {
        Error {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn with_details(
        mut self,
        details: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        self.details = Some(Arc::new(details));
        self
    }

    pub(crate) fn config(message: impl Into<String>) -> Error {
        Error::new(ErrorCode::Config, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying failure this error was classified from, if any.
    pub fn details(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.details.as_deref()
    }
}

/// A non-2xx response from the API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    /// The `error` field of the response body, or `HTTP <status>: <reason>` if there was none.
    pub message: String,
}

/// The request did not complete within `timeout_ms`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Request timeout after {timeout_ms}ms")]
pub struct TimeoutError {
    pub timeout_ms: u128,
}

/// Failures produced while talking to the API, before classification.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Failure {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Failure {
    /// Turn the failure into a structured [`Error`] with message `"<context>: <failure>"`.
    ///
    /// The code is picked from the failure's message first, in this order: "timeout", then
    /// "401"/"Unauthorized", then "network"/"fetch". Only when none of them matches is the
    /// structured information (status code, reqwest error kind) consulted.
    ///
    /// reqwest errors are matched without their request URL, so a host, port or path that
    /// happens to contain one of the keywords does not affect the code.
    pub(crate) fn classify(self, context: &str) -> Error {
        let underlying = self.to_string();
        let structured_code = self.structured_code();
        let (wording, details): (String, Arc<dyn std::error::Error + Send + Sync>) = match self {
            Failure::Api(err) => (underlying.clone(), Arc::new(err)),
            Failure::Timeout(err) => (underlying.clone(), Arc::new(err)),
            Failure::Http(err) => {
                let err = err.without_url();
                (err.to_string(), Arc::new(err))
            }
        };

        Error {
            code: classify_message(&wording).unwrap_or(structured_code),
            message: format!("{context}: {underlying}"),
            details: Some(details),
        }
    }

    fn structured_code(&self) -> ErrorCode {
        match self {
            Failure::Timeout(_) => ErrorCode::Timeout,
            Failure::Api(ApiError { status, .. }) => match *status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::Auth,
                _ => ErrorCode::Unknown,
            },
            Failure::Http(err) if err.is_timeout() => ErrorCode::Timeout,
            Failure::Http(err) if err.status() == Some(StatusCode::UNAUTHORIZED) => ErrorCode::Auth,
            Failure::Http(err) if err.is_connect() || err.is_request() => ErrorCode::Network,
            Failure::Http(_) => ErrorCode::Unknown,
        }
    }
}

fn classify_message(message: &str) -> Option<ErrorCode> {
    if message.contains("timeout") {
        Some(ErrorCode::Timeout)
    } else if message.contains("401") || message.contains("Unauthorized") {
        Some(ErrorCode::Auth)
    } else if message.contains("network") || message.contains("fetch") {
        Some(ErrorCode::Network)
    } else {
        None
    }
}
