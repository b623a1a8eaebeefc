//! Property management, health and query round trips through the client.

mod common;

use std::sync::Arc;

use client::{FabricClient, PagedResult};
use common::{local_client, name, property};
use local_engine::LocalEngine;
use protocol::payloads::{
    ApplicationInfo, ApplicationQueryRequest, EnumeratePropertiesRequest,
    EnumerateSubNamesRequest, HealthEntity, HealthReport, HealthState,
    NodeQueryRequest, PropertyValue, ServiceInfo, ServiceKind, ServiceQueryRequest,
};
use protocol::{ClientRole, FabricError, NodeName, RemoteErrorCode, Timeout};

const T: Timeout = Timeout::from_millis(10_000);

#[tokio::test]
async fn test_property_lifecycle() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let pm = client.property_management(2).unwrap();
    let app = name("fabric:/app");

    pm.create_name(&app, T).await.unwrap();
    let err = pm.create_name(&app, T).await.unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::NameAlreadyExists));

    pm.put_property(&app, &property("replicas"), PropertyValue::Int64(3), T)
        .await
        .unwrap();
    pm.put_property(
        &app,
        &property("owner"),
        PropertyValue::String("team-a".into()),
        T,
    )
    .await
    .unwrap();

    let replicas = pm.get_property(&app, &property("replicas"), T).await.unwrap();
    assert_eq!(replicas.as_i64(), Some(3));
    assert_eq!(replicas.metadata().type_id, "int64");

    let metadata = pm
        .get_property_metadata(&app, &property("owner"), T)
        .await
        .unwrap();
    assert!(metadata.sequence_number > replicas.metadata().sequence_number);

    let page = pm
        .enumerate_properties(
            &EnumeratePropertiesRequest {
                name: app.clone(),
                include_values: true,
                continuation: None,
            },
            T,
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert!(!page.has_more());
    assert!(page.get("owner").unwrap().value.is_some());

    let err = pm.delete_name(&app, T).await.unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::NameNotEmpty));

    pm.delete_property(&app, &property("replicas"), T).await.unwrap();
    pm.delete_property(&app, &property("owner"), T).await.unwrap();
    let err = pm
        .get_property(&app, &property("owner"), T)
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::PropertyNotFound));

    pm.delete_name(&app, T).await.unwrap();
    assert!(!pm.name_exists(&app, T).await.unwrap());
}

#[tokio::test]
async fn test_custom_property_keeps_type_id() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let pm = client.property_management(2).unwrap();
    let app = name("fabric:/app");
    pm.create_name(&app, T).await.unwrap();

    pm.put_custom_property(
        &app,
        &property("blob"),
        PropertyValue::Binary(vec![1, 2, 3]),
        "application/x-config",
        T,
    )
    .await
    .unwrap();

    let stored = pm.get_property(&app, &property("blob"), T).await.unwrap();
    assert_eq!(stored.as_bytes(), Some(&[1u8, 2, 3][..]));
    assert_eq!(
        stored.metadata().custom_type_id.as_deref(),
        Some("application/x-config")
    );
}

#[tokio::test]
async fn test_sub_names_page_through_continuations() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let pm = client.property_management(1).unwrap();
    let root = name("fabric:/root");
    pm.create_name(&root, T).await.unwrap();
    for child in ["a", "b", "c"] {
        pm.create_name(&name(&format!("fabric:/root/{child}")), T)
            .await
            .unwrap();
    }

    let mut request = EnumerateSubNamesRequest {
        name: root.clone(),
        recursive: false,
        continuation: None,
        max_results: Some(2),
    };
    let first = pm.enumerate_sub_names(&request, T).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.has_more());

    request.continuation = first.continuation().map(str::to_string);
    let second = pm.enumerate_sub_names(&request, T).await.unwrap();
    assert_eq!(second.names(), &[name("fabric:/root/c")]);
    assert!(!second.has_more());
}

#[tokio::test]
async fn test_missing_name_is_reported() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let pm = client.property_management(1).unwrap();
    let err = pm
        .put_property(
            &name("fabric:/missing"),
            &property("p"),
            PropertyValue::Double(1.5),
            T,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FabricError::Remote {
            code: RemoteErrorCode::NameNotFound,
            ..
        }
    ));
}

fn node_report(node: &str, state: HealthState, sequence_number: u64) -> HealthReport {
    HealthReport {
        entity: HealthEntity::Node {
            node_name: NodeName::new(node).unwrap(),
        },
        source_id: "Watchdog.Disk".into(),
        property: "Capacity".into(),
        state,
        description: "disk almost full".into(),
        sequence_number,
    }
}

#[tokio::test]
async fn test_health_reports_feed_cluster_health() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let health = client.health(2).unwrap();

    health
        .report_health(&node_report("_Node_2", HealthState::Warning, 1))
        .await
        .unwrap();
    let err = health
        .report_health(&node_report("_Node_2", HealthState::Error, 1))
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::InvalidArgument));

    let cluster = health.get_cluster_health(T).await.unwrap();
    assert_eq!(cluster.aggregated_state(), HealthState::Warning);
    let unhealthy: Vec<_> = cluster.unhealthy_nodes().collect();
    assert_eq!(unhealthy.len(), 1);
    assert_eq!(unhealthy[0].node_name.as_str(), "_Node_2");

    let node = health
        .get_node_health(&NodeName::new("_Node_2").unwrap(), T)
        .await
        .unwrap();
    assert_eq!(node.events().len(), 1);
    assert_eq!(node.events()[0].description, "disk almost full");
}

#[tokio::test]
async fn test_cluster_report_requires_admin_role() {
    let engine = LocalEngine::new();
    let report = HealthReport {
        entity: HealthEntity::Cluster,
        source_id: "Operator".into(),
        property: "Maintenance".into(),
        state: HealthState::Warning,
        description: String::new(),
        sequence_number: 1,
    };

    let user = local_client(&engine).health(1).unwrap();
    let err = user.report_health(&report).await.unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::AccessDenied));

    let admin = FabricClient::builder()
        .local()
        .role(ClientRole::Admin)
        .connect(Arc::new(engine.clone()))
        .unwrap()
        .health(1)
        .unwrap();
    admin.report_health(&report).await.unwrap();
    assert_eq!(
        admin.get_cluster_health(T).await.unwrap().aggregated_state(),
        HealthState::Warning
    );
}

#[tokio::test]
async fn test_queries_list_cluster_contents() {
    let engine = LocalEngine::new();
    let app = name("fabric:/shop");
    engine.add_application(ApplicationInfo {
        name: app.clone(),
        type_name: "ShopType".into(),
        type_version: "1.0.0".into(),
        health_state: HealthState::Ok,
    });
    engine
        .add_service(
            &app,
            ServiceInfo {
                name: name("fabric:/shop/cart"),
                type_name: "CartType".into(),
                kind: ServiceKind::Stateful,
                health_state: HealthState::Ok,
            },
        )
        .unwrap();

    let client = local_client(&engine);
    assert_eq!(client.best_version(protocol::interfaces::subsystem::QUERY), Some(3));
    let query = client.query(3).unwrap();

    let nodes = query
        .get_node_list(&NodeQueryRequest::default(), T)
        .await
        .unwrap();
    assert_eq!(nodes.len(), local_engine::DEFAULT_NODE_COUNT);
    assert!(nodes.get("_Node_0").unwrap().is_seed);

    let apps = query
        .get_application_list(&ApplicationQueryRequest::default(), T)
        .await
        .unwrap();
    assert_eq!(apps.applications()[0].name, app);

    let services = query
        .get_service_list(
            &ServiceQueryRequest {
                application_name: app.clone(),
                service_name_filter: None,
                continuation: None,
            },
            T,
        )
        .await
        .unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services.services()[0].kind, ServiceKind::Stateful);

    let err = query
        .get_service_list(
            &ServiceQueryRequest {
                application_name: name("fabric:/none"),
                service_name_filter: None,
                continuation: None,
            },
            T,
        )
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::NameNotFound));
}

#[tokio::test]
async fn test_v1_query_handle_lacks_newer_operations() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let query = client.query(1).unwrap();
    let err = query
        .begin_get_application_list(&ApplicationQueryRequest::default(), T, None)
        .unwrap_err();
    assert!(matches!(
        err,
        FabricError::CapabilityMismatch {
            requested_version: Some(2),
            highest_supported: Some(1),
            ..
        }
    ));
}
