//! Begin/End behaviour of the client against the local engine.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client::{ClientHandlers, FabricClient};
use common::{counting_callback, local_client, name};
use local_engine::{Behavior, LocalEngine};
use protocol::interfaces::{iid, ops, subsystem};
use protocol::{
    ContextState, FabricError, MisuseKind, OutcomeKind, RemoteErrorCode, SubsystemName, Timeout,
};

#[tokio::test]
async fn test_create_fails_when_engine_lacks_requested_version() {
    let engine = LocalEngine::with_subsystem_version(&SubsystemName::new(subsystem::QUERY).unwrap(), 1);

    let err = FabricClient::create(
        Vec::new(),
        Arc::new(engine.clone()),
        ClientHandlers::default(),
        iid::QUERY_CLIENT3,
    )
    .unwrap_err();

    match err {
        FabricError::CapabilityMismatch {
            requested,
            requested_version,
            highest_supported,
            ..
        } => {
            assert_eq!(requested, iid::QUERY_CLIENT3);
            assert_eq!(requested_version, Some(3));
            assert_eq!(highest_supported, Some(1));
        }
        other => panic!("expected capability mismatch, got {other:?}"),
    }
    assert_eq!(engine.open_sessions(), 0);
}

#[tokio::test]
async fn test_create_returns_typed_capability() {
    let engine = LocalEngine::new();
    let capability = FabricClient::create(
        Vec::new(),
        Arc::new(engine),
        ClientHandlers::default(),
        iid::PROPERTY_MANAGEMENT_CLIENT2,
    )
    .unwrap();
    assert_eq!(capability.descriptor().version, 2);
    let property = capability.into_property_management().unwrap();
    assert_eq!(property.upcast(1).unwrap().version(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_operation_times_out_after_its_timeout() {
    let engine = LocalEngine::new();
    engine.script(ops::GET_PROPERTY, Behavior::Hang);
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();
    let (calls, callback) = counting_callback();

    let start = tokio::time::Instant::now();
    let ctx = property
        .begin_get_property(
            &name("fabric:/app"),
            &common::property("p"),
            Timeout::from_millis(5_000),
            Some(callback),
        )
        .unwrap();
    assert_eq!(ctx.state(), ContextState::Scheduled);

    let err = property.end_get_property(&ctx).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(5_000));
    assert!(elapsed < Duration::from_millis(5_100));
    assert_eq!(ctx.state(), ContextState::Completed(OutcomeKind::TimedOut));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Closing releases the hung completer; the late failure is discarded.
    client.close();
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_operations_complete_independently() {
    let engine = LocalEngine::new();
    engine.script(ops::CREATE_NAME, Behavior::Delay(Duration::from_millis(300)));
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let slow = property
        .begin_create_name(&name("fabric:/slow"), Timeout::INFINITE, None)
        .unwrap();
    let fast = property
        .begin_name_exists(&name("fabric:/slow"), Timeout::INFINITE, None)
        .unwrap();

    assert!(!property.end_name_exists(&fast).await.unwrap());
    assert!(!slow.is_completed());

    property.end_create_name(&slow).await.unwrap();
    assert!(property
        .name_exists(&name("fabric:/slow"), Timeout::INFINITE)
        .await
        .unwrap());
}

/// Waits until `calls` reaches `expected`; completions may invoke callbacks
/// on another worker thread just after `End` resolves.
async fn settle(calls: &AtomicUsize, expected: usize) -> usize {
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while calls.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    calls.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_threads_share_one_client() {
    const T: Timeout = Timeout::from_millis(5_000);
    let engine = LocalEngine::new();
    engine.script(ops::CREATE_NAME, Behavior::Delay(Duration::from_millis(200)));
    engine.script(ops::NAME_EXISTS, Behavior::Delay(Duration::from_millis(20)));
    let client = local_client(&engine);

    let creator = tokio::spawn({
        let client = client.clone();
        async move {
            let property = client.property_management(1).unwrap();
            let (calls, callback) = counting_callback();
            let ctx = property
                .begin_create_name(&name("fabric:/shared"), T, Some(callback))
                .unwrap();
            property.end_create_name(&ctx).await.unwrap();
            (ctx.id(), settle(&calls, 1).await)
        }
    });
    let checker = tokio::spawn({
        let client = client.clone();
        async move {
            let property = client.property_management(1).unwrap();
            let (calls, callback) = counting_callback();
            let ctx = property
                .begin_name_exists(&name("fabric:/other"), T, Some(callback))
                .unwrap();
            let exists = property.end_name_exists(&ctx).await.unwrap();
            (ctx.id(), settle(&calls, 1).await, exists)
        }
    });

    let (exists_id, exists_calls, exists) = checker.await.unwrap();
    let (create_id, create_calls) = creator.await.unwrap();

    assert_ne!(create_id, exists_id);
    assert_eq!(create_calls, 1);
    assert_eq!(exists_calls, 1);
    assert!(!exists);
    assert!(client
        .property_management(1)
        .unwrap()
        .name_exists(&name("fabric:/shared"), Timeout::INFINITE)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_zero_timeout_completes_without_running() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();
    let (calls, callback) = counting_callback();

    let ctx = property
        .begin_create_name(&name("fabric:/never"), Timeout::ZERO, Some(callback))
        .unwrap();
    assert!(ctx.is_completed());
    assert!(ctx.completed_synchronously());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(property.end_create_name(&ctx).await.unwrap_err().is_timeout());

    assert!(!property
        .name_exists(&name("fabric:/never"), Timeout::INFINITE)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_second_end_is_misuse() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let ctx = property
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap();
    property.end_create_name(&ctx).await.unwrap();

    let err = property.end_create_name(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        FabricError::ProtocolMisuse(MisuseKind::AlreadyConsumed { .. })
    ));
}

#[tokio::test]
async fn test_end_with_context_of_other_operation_is_misuse() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let ctx = property
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap();
    let err = property.end_get_property(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        FabricError::ProtocolMisuse(MisuseKind::ForeignContext { .. })
    ));

    // The context is untouched and can still be ended by its own operation.
    property.end_create_name(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_end_through_another_client_is_misuse() {
    let engine = LocalEngine::new();
    let first = local_client(&engine).property_management(1).unwrap();
    let second = local_client(&engine).property_management(1).unwrap();

    let ctx = first
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap();
    let err = second.end_create_name(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        FabricError::ProtocolMisuse(MisuseKind::UnknownContext { .. })
    ));
    first.end_create_name(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_newer_operation_on_older_handle_is_capability_mismatch() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let err = property
        .begin_get_property_metadata(
            &name("fabric:/a"),
            &common::property("p"),
            Timeout::INFINITE,
            None,
        )
        .unwrap_err();
    match err {
        FabricError::CapabilityMismatch {
            requested,
            requested_version,
            highest_supported,
            ..
        } => {
            assert_eq!(requested, iid::PROPERTY_MANAGEMENT_CLIENT2);
            assert_eq!(requested_version, Some(2));
            assert_eq!(highest_supported, Some(1));
        }
        other => panic!("expected capability mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_version_is_capability_mismatch() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let err = client.health(9).unwrap_err();
    assert!(matches!(
        err,
        FabricError::CapabilityMismatch {
            requested_version: Some(9),
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancel_completes_as_cancelled() {
    let engine = LocalEngine::new();
    engine.script(ops::DELETE_NAME, Behavior::Hang);
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let ctx = property
        .begin_delete_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap();
    assert!(ctx.cancel());
    assert!(!ctx.cancel());
    let err = property.end_delete_name(&ctx).await.unwrap_err();
    assert!(matches!(err, FabricError::Cancelled { .. }));
}

#[tokio::test]
async fn test_scripted_failure_surfaces_remote_code() {
    let engine = LocalEngine::new();
    engine.script(ops::CREATE_NAME, Behavior::Fail(RemoteErrorCode::NotReady));
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let err = property
        .create_name(&name("fabric:/a"), Timeout::INFINITE)
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::NotReady));

    engine.clear_script(ops::CREATE_NAME);
    property
        .create_name(&name("fabric:/a"), Timeout::INFINITE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_schedule_creates_no_context() {
    let engine = LocalEngine::new();
    engine.script(ops::CREATE_NAME, Behavior::RejectSchedule);
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();
    let (calls, callback) = counting_callback();

    let err = property
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, Some(callback))
        .unwrap_err();
    assert!(matches!(err, FabricError::Scheduling { transient: true, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_closed_client_refuses_new_operations() {
    let engine = LocalEngine::new();
    engine.script(ops::CREATE_NAME, Behavior::Hang);
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();

    let pending = property
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap();
    client.close();
    assert!(client.is_closed());

    let err = property.end_create_name(&pending).await.unwrap_err();
    assert_eq!(err.remote_code(), Some(RemoteErrorCode::ObjectClosed));

    let err = property
        .begin_name_exists(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap_err();
    assert!(matches!(err, FabricError::Scheduling { transient: false, .. }));
    assert_eq!(engine.open_sessions(), 0);
}

#[test]
fn test_begin_without_runtime_is_scheduling_error() {
    let engine = LocalEngine::new();
    let client = local_client(&engine);
    let property = client.property_management(1).unwrap();
    let err = property
        .begin_create_name(&name("fabric:/a"), Timeout::INFINITE, None)
        .unwrap_err();
    assert!(matches!(err, FabricError::Scheduling { .. }));
}
