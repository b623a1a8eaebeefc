//! The built-in capability interfaces.
//!
//! Four subsystems ship with the client, each as a ladder of versions. New
//! operations are only ever appended in a new version with a new identity
//! token; existing slot lists never change.
//!
//! | Interface | Appends |
//! |-----------|---------|
//! | `PropertyManagementClient` | name and property CRUD, enumeration |
//! | `PropertyManagementClient2` | `GetPropertyMetadata`, `PutCustomProperty` |
//! | `HealthClient` | `ReportHealth`, `GetClusterHealth` |
//! | `HealthClient2` | `GetNodeHealth` |
//! | `QueryClient` | `GetNodeList` |
//! | `QueryClient2` | `GetApplicationList` |
//! | `QueryClient3` | `GetServiceList` |
//! | `ServiceManagementClient` | `ResolveServicePartition` |
//! | `ServiceManagementClient2` | notification filter registration |

use crate::catalog::CapabilityCatalog;
use crate::ladder::{InterfaceLadder, LadderError};
use crate::{InterfaceId, SubsystemName};

/// Identity tokens of every built-in interface version.
pub mod iid {
    use crate::InterfaceId;

    pub const PROPERTY_MANAGEMENT_CLIENT: InterfaceId =
        InterfaceId::from_u128(0x1612_1469_5b3d_4cde_9925_6dd3_58a1_ea54);
    pub const PROPERTY_MANAGEMENT_CLIENT2: InterfaceId =
        InterfaceId::from_u128(0xe7d0_8625_dc98_44ed_a4e3_91bf_c875_1313);
    pub const HEALTH_CLIENT: InterfaceId =
        InterfaceId::from_u128(0x792b_c4e0_2c41_4e9a_a1f4_a47a_5d8d_bc4e);
    pub const HEALTH_CLIENT2: InterfaceId =
        InterfaceId::from_u128(0xdb8e_5e38_009f_42ac_80f2_05e3_a17d_cc60);
    pub const QUERY_CLIENT: InterfaceId =
        InterfaceId::from_u128(0xbe36_9ce5_e84b_4505_86e8_b2e1_5e4c_2b5d);
    pub const QUERY_CLIENT2: InterfaceId =
        InterfaceId::from_u128(0xa324_e28e_895e_4c52_a1b0_7203_a2f9_57d3);
    pub const QUERY_CLIENT3: InterfaceId =
        InterfaceId::from_u128(0x6120_ef08_24aa_43ab_876d_fe1b_0143_88ee);
    pub const SERVICE_MANAGEMENT_CLIENT: InterfaceId =
        InterfaceId::from_u128(0x8180_db27_7d0b_43b0_82e0_4a8e_022f_c238);
    pub const SERVICE_MANAGEMENT_CLIENT2: InterfaceId =
        InterfaceId::from_u128(0x4e3f_b9a4_6d52_4c8f_9a1e_c7d2_3b05_f611);
}

/// Subsystem names.
pub mod subsystem {
    pub const PROPERTY_MANAGEMENT: &str = "PropertyManagementClient";
    pub const HEALTH: &str = "HealthClient";
    pub const QUERY: &str = "QueryClient";
    pub const SERVICE_MANAGEMENT: &str = "ServiceManagementClient";
}

/// Operation slot names.
pub mod ops {
    pub const CREATE_NAME: &str = "CreateName";
    pub const DELETE_NAME: &str = "DeleteName";
    pub const NAME_EXISTS: &str = "NameExists";
    pub const ENUMERATE_SUB_NAMES: &str = "EnumerateSubNames";
    pub const PUT_PROPERTY: &str = "PutProperty";
    pub const GET_PROPERTY: &str = "GetProperty";
    pub const DELETE_PROPERTY: &str = "DeleteProperty";
    pub const ENUMERATE_PROPERTIES: &str = "EnumerateProperties";
    pub const GET_PROPERTY_METADATA: &str = "GetPropertyMetadata";
    pub const PUT_CUSTOM_PROPERTY: &str = "PutCustomProperty";

    pub const REPORT_HEALTH: &str = "ReportHealth";
    pub const GET_CLUSTER_HEALTH: &str = "GetClusterHealth";
    pub const GET_NODE_HEALTH: &str = "GetNodeHealth";

    pub const GET_NODE_LIST: &str = "GetNodeList";
    pub const GET_APPLICATION_LIST: &str = "GetApplicationList";
    pub const GET_SERVICE_LIST: &str = "GetServiceList";

    pub const RESOLVE_SERVICE_PARTITION: &str = "ResolveServicePartition";
    pub const REGISTER_SERVICE_NOTIFICATION_FILTER: &str = "RegisterServiceNotificationFilter";
    pub const UNREGISTER_SERVICE_NOTIFICATION_FILTER: &str = "UnregisterServiceNotificationFilter";
}

fn name(value: &str) -> Result<SubsystemName, LadderError> {
    SubsystemName::new(value).ok_or(LadderError::EmptySubsystem)
}

/// The property management ladder.
pub fn property_management() -> Result<InterfaceLadder, LadderError> {
    InterfaceLadder::new(
        name(subsystem::PROPERTY_MANAGEMENT)?,
        iid::PROPERTY_MANAGEMENT_CLIENT,
        &[
            ops::CREATE_NAME,
            ops::DELETE_NAME,
            ops::NAME_EXISTS,
            ops::ENUMERATE_SUB_NAMES,
            ops::PUT_PROPERTY,
            ops::GET_PROPERTY,
            ops::DELETE_PROPERTY,
            ops::ENUMERATE_PROPERTIES,
        ],
    )?
    .extend(
        iid::PROPERTY_MANAGEMENT_CLIENT2,
        &[ops::GET_PROPERTY_METADATA, ops::PUT_CUSTOM_PROPERTY],
    )
}

/// The health ladder.
pub fn health() -> Result<InterfaceLadder, LadderError> {
    InterfaceLadder::new(
        name(subsystem::HEALTH)?,
        iid::HEALTH_CLIENT,
        &[ops::REPORT_HEALTH, ops::GET_CLUSTER_HEALTH],
    )?
    .extend(iid::HEALTH_CLIENT2, &[ops::GET_NODE_HEALTH])
}

/// The query ladder.
pub fn query() -> Result<InterfaceLadder, LadderError> {
    InterfaceLadder::new(
        name(subsystem::QUERY)?,
        iid::QUERY_CLIENT,
        &[ops::GET_NODE_LIST],
    )?
    .extend(iid::QUERY_CLIENT2, &[ops::GET_APPLICATION_LIST])?
    .extend(iid::QUERY_CLIENT3, &[ops::GET_SERVICE_LIST])
}

/// The service management ladder.
pub fn service_management() -> Result<InterfaceLadder, LadderError> {
    InterfaceLadder::new(
        name(subsystem::SERVICE_MANAGEMENT)?,
        iid::SERVICE_MANAGEMENT_CLIENT,
        &[ops::RESOLVE_SERVICE_PARTITION],
    )?
    .extend(
        iid::SERVICE_MANAGEMENT_CLIENT2,
        &[
            ops::REGISTER_SERVICE_NOTIFICATION_FILTER,
            ops::UNREGISTER_SERVICE_NOTIFICATION_FILTER,
        ],
    )
}

/// Builds the catalog of every built-in ladder.
pub fn well_known() -> Result<CapabilityCatalog, LadderError> {
    CapabilityCatalog::new()
        .with_ladder(property_management()?)?
        .with_ladder(health()?)?
        .with_ladder(query()?)?
        .with_ladder(service_management()?)
}

/// Returns the identity token of `subsystem_name` at `version`, if built in.
pub fn interface_id(subsystem_name: &str, version: u32) -> Option<InterfaceId> {
    let id = match (subsystem_name, version) {
        (subsystem::PROPERTY_MANAGEMENT, 1) => iid::PROPERTY_MANAGEMENT_CLIENT,
        (subsystem::PROPERTY_MANAGEMENT, 2) => iid::PROPERTY_MANAGEMENT_CLIENT2,
        (subsystem::HEALTH, 1) => iid::HEALTH_CLIENT,
        (subsystem::HEALTH, 2) => iid::HEALTH_CLIENT2,
        (subsystem::QUERY, 1) => iid::QUERY_CLIENT,
        (subsystem::QUERY, 2) => iid::QUERY_CLIENT2,
        (subsystem::QUERY, 3) => iid::QUERY_CLIENT3,
        (subsystem::SERVICE_MANAGEMENT, 1) => iid::SERVICE_MANAGEMENT_CLIENT,
        (subsystem::SERVICE_MANAGEMENT, 2) => iid::SERVICE_MANAGEMENT_CLIENT2,
        _ => return None,
    };
    Some(id)
}
