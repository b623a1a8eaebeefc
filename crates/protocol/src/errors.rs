//! Error taxonomy and retry-policy types for the client protocol.
//!
//! [`FabricError`] is the one error type that crosses crate boundaries. Each
//! variant family maps to one failure category of the protocol:
//!
//! | Category | Surfaced by | Round-trip? |
//! |----------|-------------|-------------|
//! | scheduling | `Begin` (synchronously, no context exists) | no |
//! | remote | `End` | yes |
//! | timeout | `End` | no |
//! | protocol misuse | `End` | no |
//! | capability mismatch | construction / query-interface | no |
//!
//! [`RetryPolicy`] is advisory only. The client never retries on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ContextId, InterfaceId, OperationName, SubsystemName, Timeout};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Produced by [`FabricError::retry_policy`] so callers can decide whether to
/// re-issue an operation. Non-idempotent operations may still need external
/// serialisation before a retry is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried without changing its inputs.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Remote error classification
// ---------------------------------------------------------------------------

/// Engine-defined classification of a remote operation failure.
///
/// Only the codes the client itself reasons about are named; everything else
/// is carried through as [`RemoteErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorCode {
    /// The addressed name does not exist.
    NameNotFound,
    /// A name with the same value already exists.
    NameAlreadyExists,
    /// The name still has properties or sub-names.
    NameNotEmpty,
    /// The addressed property does not exist.
    PropertyNotFound,
    /// The addressed node does not exist.
    NodeNotFound,
    /// The addressed service, partition or notification filter does not exist.
    ServiceNotFound,
    /// The request was well-formed but rejected by the engine.
    InvalidArgument,
    /// The caller's role does not permit this operation.
    AccessDenied,
    /// No gateway could be reached.
    GatewayNotReachable,
    /// A transport-level failure occurred mid-operation.
    CommunicationError,
    /// The engine is not ready to serve this operation yet.
    NotReady,
    /// The engine released the operation without completing it.
    ObjectClosed,
    /// Any other engine-specific code.
    Other(i32),
}

impl RemoteErrorCode {
    /// Returns `true` for codes describing a transient condition.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::GatewayNotReachable | Self::CommunicationError | Self::NotReady
        )
    }
}

impl std::fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameNotFound => write!(f, "NameNotFound"),
            Self::NameAlreadyExists => write!(f, "NameAlreadyExists"),
            Self::NameNotEmpty => write!(f, "NameNotEmpty"),
            Self::PropertyNotFound => write!(f, "PropertyNotFound"),
            Self::NodeNotFound => write!(f, "NodeNotFound"),
            Self::ServiceNotFound => write!(f, "ServiceNotFound"),
            Self::InvalidArgument => write!(f, "InvalidArgument"),
            Self::AccessDenied => write!(f, "AccessDenied"),
            Self::GatewayNotReachable => write!(f, "GatewayNotReachable"),
            Self::CommunicationError => write!(f, "CommunicationError"),
            Self::NotReady => write!(f, "NotReady"),
            Self::ObjectClosed => write!(f, "ObjectClosed"),
            Self::Other(code) => write!(f, "Other({code:#x})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol misuse
// ---------------------------------------------------------------------------

/// The ways a caller can misuse an operation context.
///
/// Always a programming error on the caller's side; never the engine's.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MisuseKind {
    /// `End` was already called on this context.
    #[error("context {context} was already consumed by an earlier End call")]
    AlreadyConsumed {
        /// The context passed to the second `End`.
        context: ContextId,
    },

    /// `End` was called with a context issued by a different operation.
    #[error("context {context} belongs to '{actual}', not '{expected}'")]
    ForeignContext {
        /// The context that was passed in.
        context: ContextId,
        /// Qualified operation the `End` call expected (`Subsystem.Operation`).
        expected: String,
        /// Qualified operation the context was issued for.
        actual: String,
    },

    /// `End` was called through a client that never issued this context
    /// (e.g. a context from another client instance).
    #[error("context {context} was not issued by this client")]
    UnknownContext {
        /// The unrecognised context.
        context: ContextId,
    },

    /// A non-blocking `End` was attempted before the context reached a
    /// terminal state. The context is not consumed.
    #[error("context {context} has not completed yet")]
    NotCompleted {
        /// The context that was still in flight.
        context: ContextId,
    },
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Coarse failure category of a [`FabricError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// `Begin` could not accept the request.
    Scheduling,
    /// The engine completed the operation with an error.
    Remote,
    /// The caller-specified timeout expired first.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// The caller violated the Begin/End contract.
    ProtocolMisuse,
    /// The requested interface identity is not implemented.
    CapabilityMismatch,
    /// Client settings are invalid.
    Configuration,
    /// A payload could not be translated at the boundary.
    Payload,
}

/// Errors surfaced by the client protocol.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FabricError {
    /// `Begin` could not accept the request (bad input, no connection, client
    /// closed). Raised before any context exists.
    #[error("Could not schedule '{target}': {reason}")]
    Scheduling {
        /// What was being scheduled (qualified operation or entry point).
        target: String,
        /// Human-readable description of why scheduling failed.
        reason: String,
        /// Whether the condition is expected to clear on its own.
        transient: bool,
    },

    /// The engine completed the operation, but the outcome is an error.
    #[error("Operation '{operation}' failed with {code}: {message}")]
    Remote {
        /// Operation that failed.
        operation: OperationName,
        /// Engine-defined classification.
        code: RemoteErrorCode,
        /// Engine-supplied detail.
        message: String,
    },

    /// The operation did not reach a terminal state within its timeout.
    ///
    /// The remote work may still be running; only the local wait ended.
    #[error("Operation '{operation}' timed out after {timeout}")]
    Timeout {
        /// Operation that timed out.
        operation: OperationName,
        /// The timeout that expired.
        timeout: Timeout,
    },

    /// The caller cancelled the operation before it completed.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// Operation that was cancelled.
        operation: OperationName,
    },

    /// The caller violated the Begin/End contract.
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(MisuseKind),

    /// The requested interface identity is unknown, or the connected engine
    /// implements a lower version of its subsystem.
    #[error("Interface {requested} is not supported{}", mismatch_detail(.subsystem, .requested_version, .highest_supported))]
    CapabilityMismatch {
        /// Identity token that was requested.
        requested: InterfaceId,
        /// Subsystem the token belongs to, if the token is known at all.
        subsystem: Option<SubsystemName>,
        /// Version the token denotes, if known.
        requested_version: Option<u32>,
        /// Highest version of the subsystem the engine implements.
        highest_supported: Option<u32>,
    },

    /// Client settings are invalid.
    ///
    /// Produced at construction or `update_settings`; the previous settings
    /// stay in effect.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A request or result payload could not be translated.
    #[error("Payload error in '{operation}': {message}")]
    Payload {
        /// Operation whose payload failed translation.
        operation: OperationName,
        /// Description of the translation failure.
        message: String,
    },
}

fn mismatch_detail(
    subsystem: &Option<SubsystemName>,
    requested: &Option<u32>,
    highest: &Option<u32>,
) -> String {
    match (subsystem, requested, highest) {
        (Some(s), Some(r), Some(h)) => {
            format!(" ({s} v{r} requested, engine implements up to v{h})")
        }
        (Some(s), Some(r), None) => format!(" ({s} v{r} requested, engine lacks {s})"),
        _ => " (unknown interface identity)".to_string(),
    }
}

impl FabricError {
    /// Returns the coarse category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Scheduling { .. } => ErrorCategory::Scheduling,
            Self::Remote { .. } => ErrorCategory::Remote,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::ProtocolMisuse(_) => ErrorCategory::ProtocolMisuse,
            Self::CapabilityMismatch { .. } => ErrorCategory::CapabilityMismatch,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Payload { .. } => ErrorCategory::Payload,
        }
    }

    /// Advises whether re-issuing the failed operation is reasonable.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Timeout { .. } => RetryPolicy::Retryable { after: None },
            Self::Remote { code, .. } if code.is_transient() => {
                RetryPolicy::Retryable { after: None }
            }
            Self::Scheduling { transient: true, .. } => RetryPolicy::Retryable {
                after: Some(Duration::from_secs(1)),
            },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Returns the remote error code, if this is a remote failure.
    pub fn remote_code(&self) -> Option<RemoteErrorCode> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<MisuseKind> for FabricError {
    fn from(kind: MisuseKind) -> Self {
        Self::ProtocolMisuse(kind)
    }
}
