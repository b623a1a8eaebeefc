//! Service partition endpoints and per-session notification filters.

use std::collections::BTreeMap;

use protocol::payloads::{
    NotificationFilterId, ResolvePartitionRequest, ResolvedServicePartition,
    ServiceNotificationFilter,
};
use protocol::{FabricName, RemoteErrorCode, ServiceNotification};

use crate::OperationFailure;

type PartitionKey = (FabricName, Option<String>);

/// The newest known endpoint set of every service partition.
#[derive(Debug, Default)]
pub struct PartitionTable {
    partitions: BTreeMap<PartitionKey, ResolvedServicePartition>,
}

impl PartitionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the endpoints carried by `notification`.
    ///
    /// Returns `false`, leaving the table unchanged, when the table already
    /// holds the same or a newer version of that partition.
    pub fn apply(&mut self, notification: &ServiceNotification) -> bool {
        let key = (
            notification.service_name.clone(),
            notification.partition_key.clone(),
        );
        if let Some(current) = self.partitions.get(&key) {
            if current.version >= notification.version {
                return false;
            }
        }
        self.partitions.insert(
            key,
            ResolvedServicePartition {
                service_name: notification.service_name.clone(),
                partition_key: notification.partition_key.clone(),
                endpoints: notification.endpoints.clone(),
                version: notification.version,
            },
        );
        true
    }

    /// Resolves one partition.
    ///
    /// A `previous` result must name the same partition and must not be newer
    /// than what the table knows; the current entry is returned either way.
    pub fn resolve(
        &self,
        request: &ResolvePartitionRequest,
    ) -> Result<ResolvedServicePartition, OperationFailure> {
        let key = (request.service_name.clone(), request.partition_key.clone());
        let current = self.partitions.get(&key).ok_or_else(|| {
            OperationFailure::new(
                RemoteErrorCode::ServiceNotFound,
                format!("no endpoints are known for {}", request.service_name),
            )
        })?;
        if let Some(previous) = &request.previous {
            if previous.service_name != current.service_name
                || previous.partition_key != current.partition_key
            {
                return Err(OperationFailure::new(
                    RemoteErrorCode::InvalidArgument,
                    "previous result belongs to another partition",
                ));
            }
            if previous.version > current.version {
                return Err(OperationFailure::new(
                    RemoteErrorCode::InvalidArgument,
                    format!(
                        "previous result has version {} but the newest known is {}",
                        previous.version, current.version
                    ),
                ));
            }
        }
        Ok(current.clone())
    }
}

/// Notification filters registered by one session.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: BTreeMap<NotificationFilterId, ServiceNotificationFilter>,
}

impl FilterSet {
    /// Adds `filter` under `id`.
    pub fn register(&mut self, id: NotificationFilterId, filter: ServiceNotificationFilter) {
        self.filters.insert(id, filter);
    }

    /// Removes the filter registered under `id`.
    pub fn unregister(&mut self, id: NotificationFilterId) -> Result<(), OperationFailure> {
        self.filters.remove(&id).map(drop).ok_or_else(|| {
            OperationFailure::new(
                RemoteErrorCode::ServiceNotFound,
                format!("notification filter {id} is not registered"),
            )
        })
    }

    /// Returns `true` if any filter passes changes to `service_name`.
    pub fn matches(&self, service_name: &FabricName) -> bool {
        self.filters.values().any(|f| f.matches(service_name))
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(value: &str) -> FabricName {
        FabricName::new(value).unwrap()
    }

    fn notification(version: u64, endpoint: &str) -> ServiceNotification {
        ServiceNotification {
            service_name: name("fabric:/app/svc"),
            partition_key: None,
            endpoints: vec![endpoint.to_string()],
            version,
        }
    }

    fn request(previous: Option<ResolvedServicePartition>) -> ResolvePartitionRequest {
        ResolvePartitionRequest {
            service_name: name("fabric:/app/svc"),
            partition_key: None,
            previous,
        }
    }

    #[test]
    fn test_stale_notifications_do_not_replace_endpoints() {
        let mut table = PartitionTable::new();
        assert!(table.apply(&notification(2, "10.0.0.2:80")));
        assert!(!table.apply(&notification(1, "10.0.0.1:80")));
        assert!(!table.apply(&notification(2, "10.0.0.9:80")));

        let resolved = table.resolve(&request(None)).unwrap();
        assert_eq!(resolved.version, 2);
        assert_eq!(resolved.endpoints, ["10.0.0.2:80"]);
    }

    #[test]
    fn test_refresh_returns_newer_or_same_version() {
        let mut table = PartitionTable::new();
        table.apply(&notification(1, "10.0.0.1:80"));
        let first = table.resolve(&request(None)).unwrap();

        let same = table.resolve(&request(Some(first.clone()))).unwrap();
        assert_eq!(same, first);

        table.apply(&notification(3, "10.0.0.3:80"));
        let refreshed = table.resolve(&request(Some(first))).unwrap();
        assert_eq!(refreshed.version, 3);
    }

    #[test]
    fn test_previous_from_the_future_is_rejected() {
        let mut table = PartitionTable::new();
        table.apply(&notification(1, "10.0.0.1:80"));
        let mut previous = table.resolve(&request(None)).unwrap();
        previous.version = 7;
        let err = table.resolve(&request(Some(previous))).unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::InvalidArgument);
    }

    #[test]
    fn test_unknown_partition_is_service_not_found() {
        let err = PartitionTable::new().resolve(&request(None)).unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::ServiceNotFound);
    }

    #[test]
    fn test_filter_set_registration() {
        let mut filters = FilterSet::default();
        filters.register(
            NotificationFilterId(1),
            ServiceNotificationFilter {
                name: name("fabric:/app"),
                match_name_prefix: true,
            },
        );
        assert!(filters.matches(&name("fabric:/app/svc")));
        assert!(!filters.matches(&name("fabric:/other")));

        filters.unregister(NotificationFilterId(1)).unwrap();
        assert!(filters.is_empty());
        let err = filters.unregister(NotificationFilterId(1)).unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::ServiceNotFound);
    }
}
