use hyper::StatusCode;
use std::fmt;
use std::time::Duration;

use super::AttemptFailure;

#[derive(Debug, Clone)]
pub enum FetchError {
    InvalidTarget(String),
    NetworkFailure(String),
    Timeout(Duration),
    UpstreamStatus(StatusCode),
    ParseFailure {
        message: String,
        preview: String,
    },
    /// Every attempt failed. `terminal` is set when the status policy stopped
    /// the sequence early on a definitive upstream answer.
    AllAttemptsExhausted {
        failures: Vec<AttemptFailure>,
        terminal: Option<StatusCode>,
    },
    Configuration(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidTarget(_) => "invalid_target",
            FetchError::NetworkFailure(_) => "network_failure",
            FetchError::Timeout(_) => "timeout",
            FetchError::UpstreamStatus(_) => "upstream_status",
            FetchError::ParseFailure { .. } => "parse_failure",
            FetchError::AllAttemptsExhausted { .. } => "all_attempts_exhausted",
            FetchError::Configuration(_) => "configuration",
        }
    }

    /// Most recent attempt-level error of an exhausted fetch.
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            FetchError::AllAttemptsExhausted { failures, .. } => failures.last(),
            _ => None,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
            FetchError::NetworkFailure(msg) => write!(f, "Network failure: {}", msg),
            FetchError::Timeout(budget) => write!(f, "Attempt timed out after {}ms", budget.as_millis()),
            FetchError::UpstreamStatus(status) => write!(f, "Upstream returned {}", status.as_u16()),
            FetchError::ParseFailure { message, .. } => write!(f, "Response is not valid JSON: {}", message),
            FetchError::AllAttemptsExhausted { failures, terminal } => {
                if let Some(status) = terminal {
                    return write!(f, "Upstream answered {} definitively", status.as_u16());
                }
                match self.last_failure() {
                    Some(last) => write!(
                        f,
                        "All {} attempts failed, last via {}: {}",
                        failures.len(),
                        last.route,
                        last.error
                    ),
                    None => write!(f, "All attempts failed"),
                }
            }
            FetchError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

pub type Result<T> = std::result::Result<T, FetchError>;
