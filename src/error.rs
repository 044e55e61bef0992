//! Error types and call outcome classification.
//!
//! # Design Decisions
//! - Parse errors are fatal to a connection attempt and never retried
//! - Resolution errors are absorbed by the watcher (logged, empty address set)
//! - Call errors carry a structured [`OutcomeKind`] consumed by both the
//!   circuit breaker's success classifier and the retry policy

use std::time::Duration;
use thiserror::Error;

use crate::config::ValidationError;

/// Errors produced while parsing a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("resolver: missing address")]
    MissingTarget,

    /// Target ends with the host/port separator but carries no port, e.g. `"[::1]:"`.
    #[error("resolver: missing port after port-separator colon")]
    TrailingSeparator,

    #[error("invalid target address {target}: {cause}")]
    InvalidTarget { target: String, cause: String },
}

/// Errors from a resolution backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup failed: {0}")]
    Backend(String),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl From<std::io::Error> for LookupError {
    fn from(err: std::io::Error) -> Self {
        LookupError::Backend(err.to_string())
    }
}

/// Invalid backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    #[error("backoff base delay must be positive")]
    ZeroBase,

    #[error("backoff max delay must be positive")]
    ZeroMax,

    #[error("backoff max delay {max:?} is smaller than base delay {base:?}")]
    MaxBelowBase { base: Duration, max: Duration },
}

/// Errors returned when establishing a client connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no resolver registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("invalid connection settings: {0}")]
    Config(#[from] BackoffError),

    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Invalid(Vec<ValidationError>),
}

/// Coarse classification of a call outcome.
///
/// Produced by the call layer, consumed by the circuit breaker and the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// An ordinary failure; counts against the breaker and is retryable.
    Failure,
    /// The underlying transport is shutting down; retrying is pointless.
    TransportClosing,
    /// The transport reported an error that actually encodes a successful status.
    SuccessShaped,
    /// The call was rejected by an open (or saturated half-open) circuit.
    CircuitOpen,
}

impl OutcomeKind {
    /// Whether the retry policy must stop on this outcome.
    pub fn is_terminal(self) -> bool {
        !matches!(self, OutcomeKind::Failure)
    }
}

/// Errors surfaced on the call path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("circuit breaker '{name}' rejected call: too many half-open requests")]
    TooManyRequests { name: String },

    #[error("transport is closing: {0}")]
    TransportClosing(String),

    #[error("call returned a success status as error: {0}")]
    SuccessShaped(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("call failed: {0}")]
    Failed(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CallError>,
    },

    #[error("call cancelled")]
    Cancelled,
}

/// Status text an upstream uses when a transport is torn down.
const TRANSPORT_CLOSING_MESSAGE: &str = "transport is closing";

/// Status text some HTTP/2 gateways attach to an error that is really a 200.
const SUCCESS_STATUS_MESSAGE: &str = "OK: HTTP status code 200";

impl CallError {
    /// Structured outcome kind of this error.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CallError::CircuitOpen { .. } | CallError::TooManyRequests { .. } => {
                OutcomeKind::CircuitOpen
            }
            CallError::TransportClosing(_) => OutcomeKind::TransportClosing,
            CallError::SuccessShaped(_) => OutcomeKind::SuccessShaped,
            CallError::RetriesExhausted { last, .. } => last.kind(),
            CallError::Timeout(_) | CallError::Failed(_) | CallError::Cancelled => {
                OutcomeKind::Failure
            }
        }
    }

    /// Map a textual transport status into a structured error.
    ///
    /// Only meant for adapters at the transport edge that receive nothing but a message.
    pub fn from_status_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(TRANSPORT_CLOSING_MESSAGE) {
            CallError::TransportClosing(message)
        } else if message.contains(SUCCESS_STATUS_MESSAGE) {
            CallError::SuccessShaped(message)
        } else {
            CallError::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            CallError::CircuitOpen { name: "svc".into() }.kind(),
            OutcomeKind::CircuitOpen
        );
        assert_eq!(
            CallError::TooManyRequests { name: "svc".into() }.kind(),
            OutcomeKind::CircuitOpen
        );
        assert_eq!(CallError::Timeout(Duration::from_secs(1)).kind(), OutcomeKind::Failure);
        assert!(!CallError::Failed("boom".into()).kind().is_terminal());
    }

    #[test]
    fn test_exhausted_inherits_inner_kind() {
        let err = CallError::RetriesExhausted {
            attempts: 3,
            last: Box::new(CallError::Failed("boom".into())),
        };
        assert_eq!(err.kind(), OutcomeKind::Failure);
    }

    #[test]
    fn test_from_status_message() {
        let closing = CallError::from_status_message("rpc error: code = Unavailable desc = transport is closing");
        assert_eq!(closing.kind(), OutcomeKind::TransportClosing);

        let ok = CallError::from_status_message("rpc error: code = Unknown desc = OK: HTTP status code 200; transport: missing content-type field");
        assert_eq!(ok.kind(), OutcomeKind::SuccessShaped);

        let other = CallError::from_status_message("connection refused");
        assert_eq!(other, CallError::Failed("connection refused".into()));
    }
}
