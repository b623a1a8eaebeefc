//! In-process fabric engine.
//!
//! Implements the engine port defined in the [`protocol`] crate
//! (`FabricEngine`, `EngineSession`) over an in-memory naming store and a
//! simulated cluster. It is what the CLI and the integration tests run
//! against.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain protocol rules. Context
//! lifecycle, timeouts and version gating belong to [`protocol`]; the engine
//! only decides *how* each accepted operation runs and reports its outcome
//! through the completer it was handed.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`engine`] | `LocalEngine`, its sessions, and operation execution |
//! | [`store`] | Names and properties |
//! | [`cluster`] | Nodes, applications, services and health reports |
//! | [`service`] | Partition endpoints and notification filters |
//! | [`script`] | Per-operation delays, hangs and injected failures |

pub mod cluster;
pub mod engine;
pub mod script;
pub mod service;
pub mod store;

pub use engine::{LocalEngine, LocalSession, DEFAULT_NODE_COUNT};
pub use script::{Behavior, EngineScript};

use protocol::RemoteErrorCode;
use thiserror::Error;

/// An operation the engine ran and that failed remotely.
///
/// Reported to the caller as [`protocol::FabricError::Remote`] with the same
/// code and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct OperationFailure {
    /// Code the caller sees on `End`.
    pub code: RemoteErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl OperationFailure {
    /// Creates a failure with `code`.
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
