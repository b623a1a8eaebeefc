//! In-memory naming and property store.

use std::collections::BTreeMap;

use protocol::payloads::{
    EnumeratePropertiesRequest, EnumeratedProperty, EnumerateSubNamesRequest, NameEnumeration,
    NamedProperty, PropertyEnumeration, PropertyMetadata, PropertyRequest, PutPropertyRequest,
};
use protocol::{FabricName, PropertyName, RemoteErrorCode, Timestamp};

use crate::OperationFailure;

/// Page size used when a request does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Default)]
struct NameEntry {
    properties: BTreeMap<PropertyName, NamedProperty>,
}

/// Names and their properties.
#[derive(Debug, Default)]
pub struct NamingStore {
    names: BTreeMap<FabricName, NameEntry>,
    sequence: u64,
}

impl NamingStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `name`. Parents need not exist.
    pub fn create_name(&mut self, name: &FabricName) -> Result<(), OperationFailure> {
        if self.names.contains_key(name) {
            return Err(OperationFailure::new(
                RemoteErrorCode::NameAlreadyExists,
                format!("{name} already exists"),
            ));
        }
        self.names.insert(name.clone(), NameEntry::default());
        Ok(())
    }

    /// Deletes `name` if it has no properties and no sub-names.
    pub fn delete_name(&mut self, name: &FabricName) -> Result<(), OperationFailure> {
        let entry = self.entry(name)?;
        if !entry.properties.is_empty() {
            return Err(OperationFailure::new(
                RemoteErrorCode::NameNotEmpty,
                format!("{name} still has {} properties", entry.properties.len()),
            ));
        }
        if self.names.keys().any(|n| n.is_descendant_of(name)) {
            return Err(OperationFailure::new(
                RemoteErrorCode::NameNotEmpty,
                format!("{name} still has sub-names"),
            ));
        }
        self.names.remove(name);
        Ok(())
    }

    /// Returns `true` if `name` was created and not deleted.
    pub fn name_exists(&self, name: &FabricName) -> bool {
        self.names.contains_key(name)
    }

    /// Lists the children (or, recursively, all descendants) of a name in
    /// name order, one page at a time. The continuation is the last name
    /// returned.
    pub fn enumerate_sub_names(
        &self,
        request: &EnumerateSubNamesRequest,
    ) -> Result<NameEnumeration, OperationFailure> {
        self.entry(&request.name)?;
        let page_size = page_size(request.max_results);
        let mut matching = self
            .names
            .keys()
            .filter(|n| {
                if request.recursive {
                    n.is_descendant_of(&request.name)
                } else {
                    n.is_child_of(&request.name)
                }
            })
            .filter(|n| {
                request
                    .continuation
                    .as_deref()
                    .map_or(true, |after| n.as_str() > after)
            });
        let names: Vec<FabricName> = matching.by_ref().take(page_size).cloned().collect();
        let continuation = match (matching.next(), names.last()) {
            (Some(_), Some(last)) => Some(last.as_str().to_string()),
            _ => None,
        };
        Ok(NameEnumeration {
            names,
            continuation,
        })
    }

    /// Writes a property, replacing any previous value and bumping the
    /// store-wide sequence number.
    pub fn put_property(&mut self, request: &PutPropertyRequest) -> Result<(), OperationFailure> {
        self.sequence += 1;
        let sequence = self.sequence;
        let entry = self.entry_mut(&request.name)?;
        let metadata = PropertyMetadata {
            name: request.name.clone(),
            property: request.property.clone(),
            type_id: request.value.type_id().to_string(),
            value_size: request.value.size(),
            sequence_number: sequence,
            last_modified: Timestamp::now(),
            custom_type_id: request.custom_type_id.clone(),
        };
        entry.properties.insert(
            request.property.clone(),
            NamedProperty {
                metadata,
                value: request.value.clone(),
            },
        );
        Ok(())
    }

    /// Reads a property and its metadata.
    pub fn get_property(&self, request: &PropertyRequest) -> Result<NamedProperty, OperationFailure> {
        self.entry(&request.name)?
            .properties
            .get(&request.property)
            .cloned()
            .ok_or_else(|| property_not_found(request))
    }

    /// Reads a property's metadata only.
    pub fn get_property_metadata(
        &self,
        request: &PropertyRequest,
    ) -> Result<PropertyMetadata, OperationFailure> {
        self.get_property(request).map(|p| p.metadata)
    }

    /// Removes a property.
    pub fn delete_property(&mut self, request: &PropertyRequest) -> Result<(), OperationFailure> {
        self.entry_mut(&request.name)?
            .properties
            .remove(&request.property)
            .map(|_| ())
            .ok_or_else(|| property_not_found(request))
    }

    /// Lists the properties of a name in property order, one page at a time.
    pub fn enumerate_properties(
        &self,
        request: &EnumeratePropertiesRequest,
    ) -> Result<PropertyEnumeration, OperationFailure> {
        let entry = self.entry(&request.name)?;
        let mut matching = entry.properties.iter().filter(|(property, _)| {
            request
                .continuation
                .as_deref()
                .map_or(true, |after| property.as_str() > after)
        });
        let properties: Vec<EnumeratedProperty> = matching
            .by_ref()
            .take(DEFAULT_PAGE_SIZE)
            .map(|(_, stored)| EnumeratedProperty {
                metadata: stored.metadata.clone(),
                value: request.include_values.then(|| stored.value.clone()),
            })
            .collect();
        let continuation = match (matching.next(), properties.last()) {
            (Some(_), Some(last)) => Some(last.metadata.property.as_str().to_string()),
            _ => None,
        };
        Ok(PropertyEnumeration {
            properties,
            continuation,
        })
    }

    fn entry(&self, name: &FabricName) -> Result<&NameEntry, OperationFailure> {
        self.names.get(name).ok_or_else(|| name_not_found(name))
    }

    fn entry_mut(&mut self, name: &FabricName) -> Result<&mut NameEntry, OperationFailure> {
        self.names.get_mut(name).ok_or_else(|| name_not_found(name))
    }
}

fn page_size(max_results: Option<u32>) -> usize {
    match max_results {
        Some(0) | None => DEFAULT_PAGE_SIZE,
        Some(n) => n as usize,
    }
}

fn name_not_found(name: &FabricName) -> OperationFailure {
    OperationFailure::new(RemoteErrorCode::NameNotFound, format!("{name} does not exist"))
}

fn property_not_found(request: &PropertyRequest) -> OperationFailure {
    OperationFailure::new(
        RemoteErrorCode::PropertyNotFound,
        format!("{} has no property '{}'", request.name, request.property),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::payloads::PropertyValue;

    fn name(value: &str) -> FabricName {
        FabricName::new(value).unwrap()
    }

    fn put(store: &mut NamingStore, n: &str, p: &str, v: i64) {
        store
            .put_property(&PutPropertyRequest {
                name: name(n),
                property: PropertyName::new(p).unwrap(),
                value: PropertyValue::Int64(v),
                custom_type_id: None,
            })
            .unwrap();
    }

    #[test]
    fn test_create_twice_fails_with_already_exists() {
        let mut store = NamingStore::new();
        store.create_name(&name("fabric:/a")).unwrap();
        let err = store.create_name(&name("fabric:/a")).unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::NameAlreadyExists);
    }

    #[test]
    fn test_delete_requires_empty_name() {
        let mut store = NamingStore::new();
        store.create_name(&name("fabric:/a")).unwrap();
        store.create_name(&name("fabric:/a/b")).unwrap();
        assert_eq!(
            store.delete_name(&name("fabric:/a")).unwrap_err().code,
            RemoteErrorCode::NameNotEmpty
        );
        store.delete_name(&name("fabric:/a/b")).unwrap();
        put(&mut store, "fabric:/a", "p", 1);
        assert_eq!(
            store.delete_name(&name("fabric:/a")).unwrap_err().code,
            RemoteErrorCode::NameNotEmpty
        );
    }

    #[test]
    fn test_sub_name_paging() {
        let mut store = NamingStore::new();
        store.create_name(&name("fabric:/app")).unwrap();
        for child in ["a", "b", "c"] {
            store
                .create_name(&name(&format!("fabric:/app/{child}")))
                .unwrap();
        }
        store.create_name(&name("fabric:/app/a/deep")).unwrap();

        let mut request = EnumerateSubNamesRequest {
            name: name("fabric:/app"),
            recursive: false,
            continuation: None,
            max_results: Some(2),
        };
        let first = store.enumerate_sub_names(&request).unwrap();
        assert_eq!(first.names.len(), 2);
        assert_eq!(first.continuation.as_deref(), Some("fabric:/app/b"));

        request.continuation = first.continuation;
        let second = store.enumerate_sub_names(&request).unwrap();
        assert_eq!(second.names, vec![name("fabric:/app/c")]);
        assert!(second.continuation.is_none());

        request.recursive = true;
        request.continuation = None;
        request.max_results = None;
        assert_eq!(store.enumerate_sub_names(&request).unwrap().names.len(), 4);
    }

    #[test]
    fn test_property_sequence_numbers_increase() {
        let mut store = NamingStore::new();
        store.create_name(&name("fabric:/a")).unwrap();
        put(&mut store, "fabric:/a", "x", 1);
        put(&mut store, "fabric:/a", "y", 2);
        let request = EnumeratePropertiesRequest {
            name: name("fabric:/a"),
            include_values: false,
            continuation: None,
        };
        let page = store.enumerate_properties(&request).unwrap();
        assert_eq!(page.properties.len(), 2);
        assert!(page.properties[0].metadata.sequence_number < page.properties[1].metadata.sequence_number);
        assert!(page.properties.iter().all(|p| p.value.is_none()));
    }

    #[test]
    fn test_missing_property_is_reported() {
        let mut store = NamingStore::new();
        store.create_name(&name("fabric:/a")).unwrap();
        let request = PropertyRequest {
            name: name("fabric:/a"),
            property: PropertyName::new("missing").unwrap(),
        };
        assert_eq!(
            store.get_property(&request).unwrap_err().code,
            RemoteErrorCode::PropertyNotFound
        );
        assert_eq!(
            store.delete_property(&request).unwrap_err().code,
            RemoteErrorCode::PropertyNotFound
        );
    }
}
