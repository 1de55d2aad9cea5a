use std::time::Duration;

use reqwest::StatusCode;

use crate::config::ConfigError;

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("status {status}{}", body_suffix(.body))]
    Status { status: StatusCode, body: String },
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("stream ended without success")]
    StreamEnded,
    #[error("cancelled")]
    Cancelled,
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl BackendError {
    /// Whether the call failed because the backend could not be reached or
    /// answered too slowly, as opposed to answering with something unusable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Transport(_) | BackendError::Timeout(_))
    }
}

/// How the readiness loop should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing to retry.
    ConfigurationInvalid,
    /// Backend unreachable, slow or answering with an error status.
    Transient,
    /// The current ensure cycle cannot finish, but a later cycle may.
    Terminal,
    /// Caller-requested shutdown.
    Cancelled,
    /// The startup deadline elapsed.
    DeadlineExceeded,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Terminal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigurationInvalid => "configuration_invalid",
            ErrorKind::Transient => "transient",
            ErrorKind::Terminal => "terminal",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Engine error tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backend not responding: {0}")]
    Probe(BackendError),
    #[error("list models: {0}")]
    Inventory(BackendError),
    #[error("pull {model}: {source}")]
    Pull { model: String, source: BackendError },
    #[error("startup deadline of {limit:?} exceeded: {}", last_cause(.last))]
    DeadlineExceeded {
        limit: Duration,
        last: Option<Box<GateError>>,
    },
    #[error("cancelled")]
    Cancelled,
}

fn last_cause(last: &Option<Box<GateError>>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => "startup timeout".to_string(),
    }
}

impl GateError {
    pub fn pull(model: impl Into<String>, source: BackendError) -> Self {
        GateError::Pull {
            model: model.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Config(_) => ErrorKind::ConfigurationInvalid,
            GateError::Probe(BackendError::Cancelled)
            | GateError::Inventory(BackendError::Cancelled)
            | GateError::Pull {
                source: BackendError::Cancelled,
                ..
            }
            | GateError::Cancelled => ErrorKind::Cancelled,
            GateError::Probe(_) | GateError::Inventory(_) => ErrorKind::Transient,
            GateError::Pull { source, .. } if source.is_unreachable() => ErrorKind::Transient,
            GateError::Pull { .. } => ErrorKind::Terminal,
            GateError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }

    /// The most recent attempt error carried by a deadline failure.
    pub fn last_attempt(&self) -> Option<&GateError> {
        match self {
            GateError::DeadlineExceeded { last, .. } => last.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    #[test]
    fn kinds_follow_stage_and_cause() {
        assert_eq!(GateError::Probe(unavailable()).kind(), ErrorKind::Transient);
        assert_eq!(
            GateError::Inventory(BackendError::Timeout(Duration::from_secs(1))).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            GateError::pull("a", BackendError::StreamEnded).kind(),
            ErrorKind::Terminal
        );
        assert_eq!(
            GateError::pull("a", BackendError::Rejected("manifest unknown".into())).kind(),
            ErrorKind::Terminal
        );
        assert_eq!(
            GateError::pull("a", BackendError::Timeout(Duration::from_secs(1))).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            GateError::pull("a", BackendError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            GateError::Config(ConfigError::Missing("X")).kind(),
            ErrorKind::ConfigurationInvalid
        );
    }

    #[test]
    fn only_transient_and_terminal_are_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Terminal.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::ConfigurationInvalid.is_retryable());
        assert!(!ErrorKind::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn deadline_message_carries_last_error() {
        let err = GateError::DeadlineExceeded {
            limit: Duration::from_secs(5),
            last: Some(Box::new(GateError::Probe(unavailable()))),
        };
        let text = err.to_string();
        assert!(text.contains("backend not responding"), "{text}");
        assert!(text.contains("503"), "{text}");
        assert!(err.last_attempt().is_some());

        let bare = GateError::DeadlineExceeded {
            limit: Duration::from_secs(5),
            last: None,
        };
        assert!(bare.to_string().ends_with("startup timeout"));
    }

    #[test]
    fn status_errors_include_body_prefix_when_present() {
        let err = BackendError::Status {
            status: StatusCode::NOT_FOUND,
            body: "model not found".into(),
        };
        assert_eq!(err.to_string(), "status 404 Not Found: model not found");
        assert_eq!(unavailable().to_string(), "status 503 Service Unavailable");
    }
}
