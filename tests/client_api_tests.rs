/// Client API tests
///
/// Tests for the resource-handle interface used by admin screens
/// Run with: cargo test --test client_api_tests
use controller_sync::{
    ApiError, ClientConfig, ComponentConfig, ControllerError, ControllerServiceClient,
    InMemoryControllerServiceApi, RecordingClock,
};
use std::sync::Arc;

fn client_for(api: &InMemoryControllerServiceApi) -> ControllerServiceClient {
    ControllerServiceClient::new(Arc::new(api.clone()), ClientConfig::default())
        .with_clock(Arc::new(RecordingClock::new()))
}

fn seeded() -> InMemoryControllerServiceApi {
    InMemoryControllerServiceApi::new()
        .with_service(ComponentConfig::new("cs-1", "Cache").property("ttl", "60"), 4)
}

#[tokio::test]
async fn test_open_reads_revision_and_component() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();

    assert_eq!(service.id(), "cs-1");
    assert_eq!(service.revision().await.version, 4);
    assert_eq!(service.component().name, "Cache");
}

#[tokio::test]
async fn test_open_missing_service_fails() {
    let api = seeded();
    let err = client_for(&api).open("nope").await.err().unwrap();

    assert!(matches!(err, ControllerError::Api(ref inner) if inner.status == Some(404)));
}

#[tokio::test]
async fn test_apply_update_refreshes_local_state() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();
    let before = service.revision().await;

    let mut component = service.component();
    component.name = "Cache (EU)".to_string();
    component.properties.insert("ttl".to_string(), Some("120".to_string()));
    service.apply_update(component).await.unwrap();

    let after = service.revision().await;
    assert_eq!(after.version, 5);
    assert_ne!(after.client_id, before.client_id);
    assert_eq!(service.component().name, "Cache (EU)");
    assert_eq!(
        api.component("cs-1").unwrap().properties.get("ttl"),
        Some(&Some("120".to_string()))
    );
}

#[tokio::test]
async fn test_sequential_saves_reuse_adopted_revision() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();

    for comment in ["first", "second", "third"] {
        let component = service.component().comments(comment);
        service.apply_update(component).await.unwrap();
    }

    // no conflicts, so no refresh fetches beyond the initial open
    assert_eq!(api.calls().fetch_resource, 1);
    assert_eq!(api.calls().mutate_resource, 3);
    assert_eq!(api.version("cs-1"), Some(7));
}

#[tokio::test]
async fn test_apply_update_rejects_foreign_component() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();

    let err = service
        .apply_update(ComponentConfig::new("cs-2", "Other"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Validation(_)));
    assert_eq!(api.calls().mutate_resource, 0);
}

#[tokio::test]
async fn test_failed_update_keeps_last_known_component() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();
    api.fail_next_mutations([ApiError::with_status(403, "")]);

    let err = service
        .apply_update(service.component().comments("denied"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), controller_sync::core::UPDATE_FAILED_FALLBACK);
    assert_eq!(service.component().comments, None);
    assert_eq!(service.revision().await.version, 4);
}

#[tokio::test]
async fn test_concurrent_saves_on_one_handle_serialize() {
    let api = seeded();
    let service = client_for(&api).open("cs-1").await.unwrap();

    let (a, b) = tokio::join!(
        service.apply_update(service.component().comments("a")),
        service.apply_update(service.component().comments("b")),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    // the revision lock keeps the second save from sending a stale version
    assert_eq!(api.calls().mutate_resource, 2);
    assert_eq!(api.version("cs-1"), Some(6));
}
