use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use std::fmt;

/// Broad category of a failure, used to pick an HTTP status and to decide
/// how loudly a failure is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected user input, never reaches any external process.
    Invalid,
    /// Connectivity probes and upstream join failures.
    Network,
    /// An external command failed.
    System,
    /// Local file or socket I/O.
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::Network => "network",
            ErrorKind::System => "system",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error surfaced at component boundaries: agent construction, config
/// updates and HTTP handlers.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {message}")]
pub struct AgentError {
    pub op: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AgentError {
    pub fn new(op: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            op,
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Invalid, message)
    }

    pub fn network(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Network, message)
    }

    /// Wraps an operational error, keeping its full context chain as message.
    pub fn from_anyhow(op: &'static str, kind: ErrorKind, err: anyhow::Error) -> Self {
        Self {
            op,
            kind,
            message: format!("{err:#}"),
            source: Some(err.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl ResponseError for AgentError {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::System | ErrorKind::Io | ErrorKind::Other => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_status() {
        let cases = [
            (ErrorKind::Invalid, StatusCode::BAD_REQUEST),
            (ErrorKind::Network, StatusCode::SERVICE_UNAVAILABLE),
            (ErrorKind::System, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::Io, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::Other, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (kind, status) in cases {
            assert_eq!(AgentError::new("test", kind, "x").status_code(), status);
        }
    }

    #[test]
    fn from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("exit status 1").context("iptables failed");
        let err = AgentError::from_anyhow("wifi.apply", ErrorKind::System, err);

        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(err.to_string(), "wifi.apply: iptables failed: exit status 1");
        assert!(std::error::Error::source(&err).is_some());
    }
}
