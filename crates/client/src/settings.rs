//! Client settings.
//!
//! Every field has a default, so a settings file only needs the values it
//! overrides. Durations are milliseconds. Fields documented as "zero
//! disables" accept any value; the others must be positive.

use std::time::Duration;

use protocol::{FabricError, Timeout};
use serde::{Deserialize, Serialize};

/// Tunables of one [`FabricClient`](crate::FabricClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Timeout used by callers that do not pick one per operation.
    pub default_operation_timeout_ms: u32,
    /// How long the engine may take to establish the first gateway
    /// connection.
    pub connection_initialization_timeout_ms: u64,
    /// Gateway keep-alive ping interval. Zero disables keep-alive.
    pub keep_alive_interval_ms: u64,
    /// Idle time after which the engine may drop the gateway connection. Zero
    /// keeps it open.
    pub connection_idle_timeout_ms: u64,
    /// Poll interval for service endpoint change notifications.
    pub service_change_poll_interval_ms: u64,
    /// Maximum number of cached partition locations.
    pub partition_location_cache_limit: u64,
    /// Bucket count of the partition location cache. Zero lets the engine
    /// choose.
    pub partition_location_cache_bucket_count: u64,
    /// Timeout the engine applies to health reporting round-trips.
    pub health_operation_timeout_ms: u64,
    /// Batching delay before health reports are sent. Zero sends at once.
    pub health_report_send_interval_ms: u64,
    /// Retry interval for health reports that were not acknowledged.
    pub health_report_retry_send_interval_ms: u64,
    /// Buffer size for claims tokens. Zero lets the engine choose.
    pub auth_token_buffer_size: u64,
    /// Label attached to the client's diagnostics.
    pub client_friendly_name: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 60_000,
            connection_initialization_timeout_ms: 2_000,
            keep_alive_interval_ms: 0,
            connection_idle_timeout_ms: 0,
            service_change_poll_interval_ms: 120_000,
            partition_location_cache_limit: 100_000,
            partition_location_cache_bucket_count: 0,
            health_operation_timeout_ms: 120_000,
            health_report_send_interval_ms: 30_000,
            health_report_retry_send_interval_ms: 30_000,
            auth_token_buffer_size: 4_096,
            client_friendly_name: String::new(),
        }
    }
}

impl ClientSettings {
    /// Checks every field is in range.
    pub fn validate(&self) -> Result<(), FabricError> {
        let positive = [
            (
                "connection_initialization_timeout_ms",
                self.connection_initialization_timeout_ms,
            ),
            (
                "service_change_poll_interval_ms",
                self.service_change_poll_interval_ms,
            ),
            (
                "partition_location_cache_limit",
                self.partition_location_cache_limit,
            ),
            ("health_operation_timeout_ms", self.health_operation_timeout_ms),
            (
                "health_report_retry_send_interval_ms",
                self.health_report_retry_send_interval_ms,
            ),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(FabricError::Configuration {
                message: format!("{field} must be positive"),
            });
        }
        if self.default_operation_timeout_ms == 0 {
            return Err(FabricError::Configuration {
                message: "default_operation_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The default operation timeout.
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from_millis(self.default_operation_timeout_ms)
    }

    /// Keep-alive interval, or `None` when disabled.
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        (self.keep_alive_interval_ms > 0).then(|| Duration::from_millis(self.keep_alive_interval_ms))
    }

    /// Connection initialisation timeout.
    pub fn connection_initialization_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_initialization_timeout_ms)
    }
}
