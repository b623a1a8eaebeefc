//! Shared value types for the client protocol.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. a timeout of `u32::MAX` means
//! "never expires") and participate in protocol decisions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NodeName;

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Per-operation timeout, expressed in whole milliseconds.
///
/// Every `Begin` call accepts one. [`Timeout::INFINITE`] disables the timer;
/// [`Timeout::ZERO`] is already expired when the operation is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeout(u32);

impl Timeout {
    /// A timeout that never expires.
    pub const INFINITE: Timeout = Timeout(u32::MAX);

    /// A timeout that has already expired.
    pub const ZERO: Timeout = Timeout(0);

    /// Creates a [`Timeout`] from milliseconds.
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Creates a [`Timeout`] from a [`Duration`], saturating at
    /// [`Timeout::INFINITE`].
    pub fn from_duration(duration: Duration) -> Self {
        Self(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX))
    }

    /// Returns the timeout as milliseconds.
    pub fn as_millis(self) -> u32 {
        self.0
    }

    /// Returns the timeout as a [`Duration`], or `None` for [`Timeout::INFINITE`].
    pub fn as_duration(self) -> Option<Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(Duration::from_millis(u64::from(self.0)))
        }
    }

    /// Returns `true` if this timeout never expires.
    pub fn is_infinite(self) -> bool {
        self.0 == u32::MAX
    }

    /// Returns `true` if this timeout is already expired.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_infinite() {
            write!(f, "infinite")
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Permission indicator passed to the local construction entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Read-only and self-service operations.
    #[default]
    User,
    /// All operations, including cluster administration.
    Admin,
}

impl std::fmt::Display for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// The gateway a client is (or was) connected to.
///
/// Attached to every connection-lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatewayInformation {
    /// Address the client reached the gateway on.
    pub address: String,
    /// Node hosting the gateway.
    pub node_name: NodeName,
    /// Instance id of the hosting node; changes when the node restarts.
    pub node_instance_id: u64,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_duration_saturates() {
        let t = Timeout::from_duration(Duration::from_secs(u64::from(u32::MAX)));
        assert!(t.is_infinite());
        assert_eq!(t.as_duration(), None);
    }

    #[test]
    fn test_timeout_as_duration() {
        assert_eq!(
            Timeout::from_millis(5000).as_duration(),
            Some(Duration::from_secs(5))
        );
        assert!(Timeout::ZERO.is_zero());
        assert_eq!(Timeout::from_millis(250).to_string(), "250ms");
    }
}
