//! Property management: hierarchical names and the typed properties stored
//! under them.
//!
//! Every operation comes as a `begin_*` / `end_*` pair plus an async method
//! that issues and awaits in one call. Operations appended in version 2
//! (`GetPropertyMetadata`, `PutCustomProperty`) fail from `begin_*` with a
//! capability mismatch on a version-1 handle.

use std::sync::Arc;

use protocol::interfaces::ops;
use protocol::payloads::{
    EnumeratePropertiesRequest, EnumerateSubNamesRequest, NameEnumeration, NameRequest,
    NamedProperty, PropertyEnumeration, PropertyMetadata, PropertyRequest, PropertyValue,
    PutPropertyRequest,
};
use protocol::{
    CompletionCallback, FabricError, FabricName, OperationContext, PropertyName, Timeout,
};

use crate::capability::InterfaceHandle;
use crate::results::{NameEnumerationResult, PropertyEnumerationResult, PropertyResult};

type Callback = Option<Arc<dyn CompletionCallback>>;

/// Handle to the property management subsystem at one version.
#[derive(Debug, Clone)]
pub struct PropertyManagementClient {
    handle: InterfaceHandle,
}

impl PropertyManagementClient {
    pub(crate) fn new(handle: InterfaceHandle) -> Self {
        Self { handle }
    }

    /// The negotiated interface handle.
    pub fn handle(&self) -> &InterfaceHandle {
        &self.handle
    }

    /// Version within the subsystem's ladder.
    pub fn version(&self) -> u32 {
        self.handle.version()
    }

    /// The same subsystem at an older (or equal) version.
    pub fn upcast(&self, version: u32) -> Result<Self, FabricError> {
        self.handle.upcast(version).map(Self::new)
    }

    // -- CreateName ---------------------------------------------------------

    /// Issues `CreateName`.
    pub fn begin_create_name(
        &self,
        name: &FabricName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = NameRequest { name: name.clone() };
        self.handle
            .begin(ops::CREATE_NAME, &request, timeout, callback)
    }

    /// Completes `CreateName`; fails with `NameAlreadyExists` if the name exists.
    pub async fn end_create_name(&self, context: &OperationContext) -> Result<(), FabricError> {
        self.handle.end(context, ops::CREATE_NAME).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_name(&self, name: &FabricName, timeout: Timeout) -> Result<(), FabricError> {
        let context = self.begin_create_name(name, timeout, None)?;
        self.end_create_name(&context).await
    }

    // -- DeleteName ---------------------------------------------------------

    /// Issues `DeleteName`.
    pub fn begin_delete_name(
        &self,
        name: &FabricName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = NameRequest { name: name.clone() };
        self.handle
            .begin(ops::DELETE_NAME, &request, timeout, callback)
    }

    /// Completes `DeleteName`; a name with properties or sub-names fails with `NameNotEmpty`.
    pub async fn end_delete_name(&self, context: &OperationContext) -> Result<(), FabricError> {
        self.handle.end(context, ops::DELETE_NAME).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_name(&self, name: &FabricName, timeout: Timeout) -> Result<(), FabricError> {
        let context = self.begin_delete_name(name, timeout, None)?;
        self.end_delete_name(&context).await
    }

    // -- NameExists ---------------------------------------------------------

    /// Issues `NameExists`.
    pub fn begin_name_exists(
        &self,
        name: &FabricName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = NameRequest { name: name.clone() };
        self.handle
            .begin(ops::NAME_EXISTS, &request, timeout, callback)
    }

    /// Returns whether the name exists.
    pub async fn end_name_exists(&self, context: &OperationContext) -> Result<bool, FabricError> {
        self.handle.end(context, ops::NAME_EXISTS).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn name_exists(&self, name: &FabricName, timeout: Timeout) -> Result<bool, FabricError> {
        let context = self.begin_name_exists(name, timeout, None)?;
        self.end_name_exists(&context).await
    }

    // -- EnumerateSubNames --------------------------------------------------

    /// Issues `EnumerateSubNames` for one page.
    pub fn begin_enumerate_sub_names(
        &self,
        request: &EnumerateSubNamesRequest,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::ENUMERATE_SUB_NAMES, request, timeout, callback)
    }

    /// Returns one page of sub-names.
    pub async fn end_enumerate_sub_names(
        &self,
        context: &OperationContext,
    ) -> Result<NameEnumerationResult, FabricError> {
        self.handle
            .end::<NameEnumeration>(context, ops::ENUMERATE_SUB_NAMES)
            .await
            .map(NameEnumerationResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn enumerate_sub_names(
        &self,
        request: &EnumerateSubNamesRequest,
        timeout: Timeout,
    ) -> Result<NameEnumerationResult, FabricError> {
        let context = self.begin_enumerate_sub_names(request, timeout, None)?;
        self.end_enumerate_sub_names(&context).await
    }

    // -- PutProperty --------------------------------------------------------

    /// Issues `PutProperty`. The name must already exist.
    pub fn begin_put_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        value: PropertyValue,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = PutPropertyRequest {
            name: name.clone(),
            property: property.clone(),
            value,
            custom_type_id: None,
        };
        self.handle
            .begin(ops::PUT_PROPERTY, &request, timeout, callback)
    }

    /// Completes `PutProperty`.
    pub async fn end_put_property(&self, context: &OperationContext) -> Result<(), FabricError> {
        self.handle.end(context, ops::PUT_PROPERTY).await
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn put_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        value: PropertyValue,
        timeout: Timeout,
    ) -> Result<(), FabricError> {
        let context = self.begin_put_property(name, property, value, timeout, None)?;
        self.end_put_property(&context).await
    }

    // -- GetProperty --------------------------------------------------------

    /// Issues `GetProperty`.
    pub fn begin_get_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = PropertyRequest {
            name: name.clone(),
            property: property.clone(),
        };
        self.handle
            .begin(ops::GET_PROPERTY, &request, timeout, callback)
    }

    /// Returns the stored value and its metadata.
    pub async fn end_get_property(
        &self,
        context: &OperationContext,
    ) -> Result<PropertyResult, FabricError> {
        self.handle
            .end::<NamedProperty>(context, ops::GET_PROPERTY)
            .await
            .map(PropertyResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
    ) -> Result<PropertyResult, FabricError> {
        let context = self.begin_get_property(name, property, timeout, None)?;
        self.end_get_property(&context).await
    }

    // -- DeleteProperty -----------------------------------------------------

    /// Issues `DeleteProperty`.
    pub fn begin_delete_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = PropertyRequest {
            name: name.clone(),
            property: property.clone(),
        };
        self.handle
            .begin(ops::DELETE_PROPERTY, &request, timeout, callback)
    }

    /// Completes `DeleteProperty`.
    pub async fn end_delete_property(&self, context: &OperationContext) -> Result<(), FabricError> {
        self.handle.end(context, ops::DELETE_PROPERTY).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
    ) -> Result<(), FabricError> {
        let context = self.begin_delete_property(name, property, timeout, None)?;
        self.end_delete_property(&context).await
    }

    // -- EnumerateProperties ------------------------------------------------

    /// Issues `EnumerateProperties` for one page.
    pub fn begin_enumerate_properties(
        &self,
        request: &EnumeratePropertiesRequest,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        self.handle
            .begin(ops::ENUMERATE_PROPERTIES, request, timeout, callback)
    }

    /// Returns one page of properties.
    pub async fn end_enumerate_properties(
        &self,
        context: &OperationContext,
    ) -> Result<PropertyEnumerationResult, FabricError> {
        self.handle
            .end::<PropertyEnumeration>(context, ops::ENUMERATE_PROPERTIES)
            .await
            .map(PropertyEnumerationResult::new)
    }

    #[tracing::instrument(skip(self))]
    pub async fn enumerate_properties(
        &self,
        request: &EnumeratePropertiesRequest,
        timeout: Timeout,
    ) -> Result<PropertyEnumerationResult, FabricError> {
        let context = self.begin_enumerate_properties(request, timeout, None)?;
        self.end_enumerate_properties(&context).await
    }

    // -- GetPropertyMetadata (v2) -------------------------------------------

    /// Issues `GetPropertyMetadata`. Requires version 2.
    pub fn begin_get_property_metadata(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = PropertyRequest {
            name: name.clone(),
            property: property.clone(),
        };
        self.handle
            .begin(ops::GET_PROPERTY_METADATA, &request, timeout, callback)
    }

    /// Returns the property metadata without its value.
    pub async fn end_get_property_metadata(
        &self,
        context: &OperationContext,
    ) -> Result<PropertyMetadata, FabricError> {
        self.handle.end(context, ops::GET_PROPERTY_METADATA).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_property_metadata(
        &self,
        name: &FabricName,
        property: &PropertyName,
        timeout: Timeout,
    ) -> Result<PropertyMetadata, FabricError> {
        let context = self.begin_get_property_metadata(name, property, timeout, None)?;
        self.end_get_property_metadata(&context).await
    }

    // -- PutCustomProperty (v2) ---------------------------------------------

    /// Issues `PutCustomProperty` with a caller-defined type tag. Requires version 2.
    pub fn begin_put_custom_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        value: PropertyValue,
        custom_type_id: &str,
        timeout: Timeout,
        callback: Callback,
    ) -> Result<OperationContext, FabricError> {
        let request = PutPropertyRequest {
            name: name.clone(),
            property: property.clone(),
            value,
            custom_type_id: Some(custom_type_id.to_string()),
        };
        self.handle
            .begin(ops::PUT_CUSTOM_PROPERTY, &request, timeout, callback)
    }

    /// Completes `PutCustomProperty`.
    pub async fn end_put_custom_property(
        &self,
        context: &OperationContext,
    ) -> Result<(), FabricError> {
        self.handle.end(context, ops::PUT_CUSTOM_PROPERTY).await
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn put_custom_property(
        &self,
        name: &FabricName,
        property: &PropertyName,
        value: PropertyValue,
        custom_type_id: &str,
        timeout: Timeout,
    ) -> Result<(), FabricError> {
        let context =
            self.begin_put_custom_property(name, property, value, custom_type_id, timeout, None)?;
        self.end_put_custom_property(&context).await
    }
}
