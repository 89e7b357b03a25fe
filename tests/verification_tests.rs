/// Verification workflow tests
///
/// Run with: cargo test --test verification_tests
use controller_sync::{
    ApiError, ClientConfig, ComponentConfig, ControllerError, ControllerServiceClient,
    ControllerServiceResource, InMemoryControllerServiceApi, JobCompletion, NO_ISSUES, PollPolicy,
    RecordingClock, VerificationPoller, VerificationResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const SERVICE_ID: &str = "cs-http";

fn component() -> ComponentConfig {
    ComponentConfig::new(SERVICE_ID, "REST lookup").property("endpoint", "https://api.internal")
}

fn failed_step() -> VerificationResult {
    VerificationResult {
        outcome: Some("FAILED".to_string()),
        explanation: Some("Connection refused".to_string()),
        step_name: Some("Perform HTTP request".to_string()),
        reason: None,
    }
}

fn backend(completion: JobCompletion) -> InMemoryControllerServiceApi {
    InMemoryControllerServiceApi::new()
        .with_service(component(), 2)
        .with_job_completion(completion)
}

async fn open(api: &InMemoryControllerServiceApi) -> (ControllerServiceResource, RecordingClock) {
    let clock = RecordingClock::new();
    let client = ControllerServiceClient::new(Arc::new(api.clone()), ClientConfig::default())
        .with_clock(Arc::new(clock.clone()));
    let resource = client.open(SERVICE_ID).await.unwrap();
    (resource, clock)
}

#[tokio::test]
async fn completed_job_is_returned_and_cleaned_up() {
    let api = backend(JobCompletion::AfterPolls(3)).with_results(vec![failed_step()]);
    let (resource, clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert!(job.is_complete());
    assert_eq!(job.results, vec![failed_step()]);
    let calls = api.calls();
    assert_eq!(calls.analyze_config, 1);
    assert_eq!(calls.create_verification_job, 1);
    assert_eq!(calls.fetch_verification_job, 3);
    assert_eq!(calls.delete_verification_job, 1);
    assert_eq!(api.live_jobs(), 0);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);

    assert!(!resource.is_verifying());
    assert_eq!(resource.last_verification_result(), Some(job));
    assert!(resource.last_verification_error().is_none());
    assert_eq!(
        resource.last_verification_report().unwrap(),
        "Result 1:\nOutcome: FAILED\nExplanation: Connection refused\nStep: Perform HTTP request"
    );
}

#[tokio::test]
async fn vanished_job_after_snapshot_returns_snapshot() {
    let api = backend(JobCompletion::VanishAfterPolls(1)).with_results(vec![failed_step()]);
    let (resource, _clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert!(!job.is_complete());
    assert_eq!(job.results, vec![failed_step()]);
    assert_eq!(api.calls().fetch_verification_job, 2);
    assert_eq!(api.calls().delete_verification_job, 1);
}

#[tokio::test]
async fn missing_job_without_snapshot_is_deleted_after_one_grace_retry() {
    let api = backend(JobCompletion::Vanish);
    let (resource, clock) = open(&api).await;

    let err = resource.start_verification().await.unwrap_err();

    assert!(matches!(err, ControllerError::Deleted));
    assert_eq!(api.calls().fetch_verification_job, 2);
    assert_eq!(api.calls().delete_verification_job, 1);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_millis(500)]
    );
    assert!(matches!(
        resource.last_verification_error(),
        Some(ControllerError::Deleted)
    ));
    assert!(resource.last_verification_result().is_none());
}

#[tokio::test]
async fn grace_retry_success_resumes_polling() {
    let api = backend(JobCompletion::AfterPolls(2));
    api.fail_next_job_fetches([ApiError::with_status(404, "Unable to find request")]);
    let (resource, _clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert!(job.is_complete());
    assert_eq!(api.calls().fetch_verification_job, 3);
}

#[tokio::test]
async fn transient_failures_do_not_consume_grace() {
    let api = backend(JobCompletion::Vanish);
    api.fail_next_job_fetches([
        ApiError::with_status(503, "Service Unavailable"),
        ApiError::transport("connection reset"),
    ]);
    let (resource, _clock) = open(&api).await;

    let err = resource.start_verification().await.unwrap_err();

    assert!(matches!(err, ControllerError::Deleted));
    // two transient failures, the first "not found", and its grace retry
    assert_eq!(api.calls().fetch_verification_job, 4);
}

#[tokio::test]
async fn never_succeeding_poll_times_out() {
    let api = backend(JobCompletion::Never);
    api.fail_all_job_fetches(Some(ApiError::with_status(503, "Service Unavailable")));
    let (resource, clock) = open(&api).await;

    let err = resource.start_verification().await.unwrap_err();

    assert!(matches!(err, ControllerError::Timeout { cycles: 30 }));
    assert_eq!(api.calls().fetch_verification_job, 30);
    assert_eq!(api.calls().delete_verification_job, 1);
    assert_eq!(clock.total(), Duration::from_secs(30));
}

#[tokio::test]
async fn incomplete_snapshot_is_returned_at_cycle_cap() {
    let api = backend(JobCompletion::Never).with_results(vec![failed_step()]);
    let (resource, _clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert!(!job.is_complete());
    assert_eq!(job.results.len(), 1);
    assert_eq!(api.calls().fetch_verification_job, 30);
    assert_eq!(api.calls().delete_verification_job, 1);
}

#[tokio::test]
async fn second_verification_while_running_is_a_no_op() {
    let api = backend(JobCompletion::AfterPolls(2));
    let (resource, _clock) = open(&api).await;

    let (first, second) = tokio::join!(resource.start_verification(), async {
        tokio::task::yield_now().await;
        resource.start_verification().await
    });

    assert!(assert_ok!(first).is_some());
    assert!(assert_ok!(second).is_none());
    assert_eq!(api.calls().create_verification_job, 1);
    assert_eq!(api.calls().delete_verification_job, 1);
}

#[tokio::test]
async fn held_session_rejects_new_verification() {
    let api = backend(JobCompletion::AfterPolls(1));
    let (resource, _clock) = open(&api).await;

    let guard = resource.session().try_begin().unwrap();
    assert!(resource.is_verifying());
    assert!(resource.start_verification().await.unwrap().is_none());
    assert_eq!(api.calls().analyze_config, 0);
    assert_eq!(api.calls().create_verification_job, 0);

    drop(guard);
    assert!(resource.start_verification().await.unwrap().is_some());
}

#[tokio::test]
async fn abandoned_verification_still_deletes_job() {
    let api = backend(JobCompletion::Never);
    // real clock, so the timeout fires during the first poll interval
    let resource = ControllerServiceClient::new(Arc::new(api.clone()), ClientConfig::default())
        .open(SERVICE_ID)
        .await
        .unwrap();

    let outcome =
        tokio::time::timeout(Duration::from_millis(50), resource.start_verification()).await;
    assert!(outcome.is_err());
    assert!(!resource.is_verifying());

    for _ in 0..50 {
        if api.calls().delete_verification_job > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(api.calls().create_verification_job, 1);
    assert_eq!(api.calls().delete_verification_job, 1);
    assert_eq!(api.live_jobs(), 0);
}

#[tokio::test]
async fn cleanup_failure_does_not_mask_result() {
    let api = backend(JobCompletion::AfterPolls(1));
    api.fail_job_deletion(Some(ApiError::with_status(500, "delete exploded")));
    let (resource, _clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert!(job.is_complete());
    assert_eq!(api.calls().delete_verification_job, 1);
    assert_eq!(resource.last_verification_report().as_deref(), Some(NO_ISSUES));
}

#[tokio::test]
async fn unresolvable_creation_response_reports_raw_body() {
    let api = backend(JobCompletion::AfterPolls(1))
        .with_create_response(|_| json!({"status": "accepted"}));
    let (resource, _clock) = open(&api).await;

    let err = resource.start_verification().await.unwrap_err();

    match err {
        ControllerError::RequestIdUnresolved { raw } => assert!(raw.contains("accepted")),
        other => panic!("expected unresolved id, got {other:?}"),
    }
    assert_eq!(api.calls().fetch_verification_job, 0);
    assert_eq!(api.calls().delete_verification_job, 0);
}

#[tokio::test]
async fn array_wrapped_creation_response_is_accepted() {
    let api = backend(JobCompletion::AfterPolls(1))
        .with_create_response(|job_id| json!([{"verificationRequest": {"id": job_id}}]));
    let (resource, _clock) = open(&api).await;

    let job = resource.start_verification().await.unwrap().unwrap();

    assert_eq!(job.id, "verify-1");
    assert_eq!(api.deleted_jobs(), vec!["verify-1".to_string()]);
}

#[tokio::test]
async fn analysis_failure_stops_before_job_creation() {
    let api = backend(JobCompletion::AfterPolls(1));
    api.fail_analysis(Some(ApiError::with_status(403, "Forbidden")));
    let (resource, _clock) = open(&api).await;

    let err = resource.start_verification().await.unwrap_err();

    assert!(matches!(err, ControllerError::Api(ref api_err) if api_err.status == Some(403)));
    assert_eq!(api.calls().create_verification_job, 0);
    assert!(!resource.is_verifying());
}

#[tokio::test]
async fn poller_honours_custom_policy() {
    let api = backend(JobCompletion::Never);
    api.fail_all_job_fetches(Some(ApiError::transport("timed out")));
    let clock = RecordingClock::new();
    let policy = PollPolicy {
        interval: Duration::from_millis(250),
        max_cycles: 4,
        not_found_grace: Duration::from_millis(10),
    };

    let err = VerificationPoller::new(&api, &clock, &policy)
        .poll(SERVICE_ID, "verify-9")
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Timeout { cycles: 4 }));
    assert_eq!(clock.total(), Duration::from_secs(1));
}
