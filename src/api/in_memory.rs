use super::ControllerServiceApi;
use crate::core::{
    ApiError, ApiResult, CompletionFlag, ComponentConfig, ConfigParams, ControllerServiceEntity,
    RawRevision, UpdatePayload, VerificationJob, VerificationOptions, VerificationResult,
};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::{Value as JsonValue, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How verification jobs created by [`InMemoryControllerServiceApi`] behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCompletion {
    /// Reports complete on the `n`th fetch.
    AfterPolls(u32),
    /// Never reports complete.
    Never,
    /// Is gone before the first fetch.
    Vanish,
    /// Answers `n` fetches incomplete, then disappears.
    VanishAfterPolls(u32),
}

/// Number of calls per collaborator operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiCallCounts {
    pub fetch_resource: u32,
    pub mutate_resource: u32,
    pub analyze_config: u32,
    pub create_verification_job: u32,
    pub fetch_verification_job: u32,
    pub delete_verification_job: u32,
}

type CreateResponseShape = Arc<dyn Fn(&str) -> JsonValue + Send + Sync>;

struct StoredService {
    component: ComponentConfig,
    version: u64,
}

struct StoredJob {
    fetches: u32,
}

struct State {
    services: HashMap<String, StoredService>,
    jobs: HashMap<String, StoredJob>,
    next_job: u64,
    completion: JobCompletion,
    results: Vec<VerificationResult>,
    create_shape: CreateResponseShape,
    fetch_faults: VecDeque<ApiError>,
    mutate_faults: VecDeque<ApiError>,
    job_fetch_faults: VecDeque<ApiError>,
    sticky_job_fetch_fault: Option<ApiError>,
    analyze_fault: Option<ApiError>,
    delete_fault: Option<ApiError>,
    mutations: Vec<UpdatePayload>,
    deleted_jobs: Vec<String>,
    counts: ApiCallCounts,
}

/// In-process controller-service backend.
///
/// Enforces revision checks like a real server, so stale versions fail with
/// 409. Faults can be queued per operation to script failure sequences.
#[derive(Clone)]
pub struct InMemoryControllerServiceApi {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryControllerServiceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControllerServiceApi {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                services: HashMap::new(),
                jobs: HashMap::new(),
                next_job: 1,
                completion: JobCompletion::AfterPolls(1),
                results: Vec::new(),
                create_shape: Arc::new(|job_id| {
                    json!({"request": {"requestId": job_id, "complete": false}})
                }),
                fetch_faults: VecDeque::new(),
                mutate_faults: VecDeque::new(),
                job_fetch_faults: VecDeque::new(),
                sticky_job_fetch_fault: None,
                analyze_fault: None,
                delete_fault: None,
                mutations: Vec::new(),
                deleted_jobs: Vec::new(),
                counts: ApiCallCounts::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_service(self, component: ComponentConfig, version: u64) -> Self {
        self.insert_service(component, version);
        self
    }

    pub fn with_job_completion(self, completion: JobCompletion) -> Self {
        self.state().completion = completion;
        self
    }

    pub fn with_results(self, results: Vec<VerificationResult>) -> Self {
        self.state().results = results;
        self
    }

    /// Overrides the body returned by job creation; receives the new job id.
    pub fn with_create_response(
        self,
        shape: impl Fn(&str) -> JsonValue + Send + Sync + 'static,
    ) -> Self {
        self.state().create_shape = Arc::new(shape);
        self
    }

    pub fn insert_service(&self, component: ComponentConfig, version: u64) {
        self.state()
            .services
            .insert(component.id.clone(), StoredService { component, version });
    }

    /// Simulates another writer committing a change.
    pub fn bump_version(&self, id: &str) -> Option<u64> {
        let mut state = self.state();
        let service = state.services.get_mut(id)?;
        service.version += 1;
        Some(service.version)
    }

    pub fn version(&self, id: &str) -> Option<u64> {
        self.state().services.get(id).map(|service| service.version)
    }

    pub fn component(&self, id: &str) -> Option<ComponentConfig> {
        self.state()
            .services
            .get(id)
            .map(|service| service.component.clone())
    }

    /// Queues failures returned by the next service fetches, in order.
    pub fn fail_next_fetches(&self, errors: impl IntoIterator<Item = ApiError>) {
        self.state().fetch_faults.extend(errors);
    }

    /// Queues failures returned by the next mutation calls, in order.
    pub fn fail_next_mutations(&self, errors: impl IntoIterator<Item = ApiError>) {
        self.state().mutate_faults.extend(errors);
    }

    /// Queues failures returned by the next job fetches, in order.
    pub fn fail_next_job_fetches(&self, errors: impl IntoIterator<Item = ApiError>) {
        self.state().job_fetch_faults.extend(errors);
    }

    /// Every job fetch fails with `error` until cleared.
    pub fn fail_all_job_fetches(&self, error: Option<ApiError>) {
        self.state().sticky_job_fetch_fault = error;
    }

    pub fn fail_analysis(&self, error: Option<ApiError>) {
        self.state().analyze_fault = error;
    }

    pub fn fail_job_deletion(&self, error: Option<ApiError>) {
        self.state().delete_fault = error;
    }

    pub fn calls(&self) -> ApiCallCounts {
        self.state().counts
    }

    /// Payloads received by the mutation endpoint, failed attempts included.
    pub fn mutations(&self) -> Vec<UpdatePayload> {
        self.state().mutations.clone()
    }

    pub fn deleted_jobs(&self) -> Vec<String> {
        self.state().deleted_jobs.clone()
    }

    pub fn live_jobs(&self) -> usize {
        self.state().jobs.len()
    }
}

fn entity(
    component: &ComponentConfig,
    version: u64,
    client_id: Option<String>,
) -> ControllerServiceEntity {
    ControllerServiceEntity {
        revision: RawRevision {
            version: json!(version),
            client_id,
        },
        component: component.clone(),
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::with_status(
        StatusCode::NOT_FOUND.as_u16(),
        format!("Unable to find {what} with id '{id}'"),
    )
}

#[async_trait]
impl ControllerServiceApi for InMemoryControllerServiceApi {
    async fn fetch_resource(&self, id: &str) -> ApiResult<ControllerServiceEntity> {
        let mut state = self.state();
        state.counts.fetch_resource += 1;
        if let Some(fault) = state.fetch_faults.pop_front() {
            return Err(fault);
        }
        state
            .services
            .get(id)
            .map(|service| entity(&service.component, service.version, None))
            .ok_or_else(|| not_found("controller service", id))
    }

    async fn mutate_resource(
        &self,
        id: &str,
        payload: &UpdatePayload,
    ) -> ApiResult<ControllerServiceEntity> {
        let mut state = self.state();
        state.counts.mutate_resource += 1;
        state.mutations.push(payload.clone());

        if let Some(fault) = state.mutate_faults.pop_front() {
            return Err(fault);
        }

        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| not_found("controller service", id))?;

        if payload.revision.version != service.version {
            return Err(ApiError::with_status(
                StatusCode::CONFLICT.as_u16(),
                format!(
                    "Version {} is not the most up-to-date revision (current {}) for controller service '{}'",
                    payload.revision.version, service.version, id
                ),
            ));
        }
        if payload.component.name.trim().is_empty() {
            return Err(ApiError::with_status(
                StatusCode::BAD_REQUEST.as_u16(),
                "Controller service name is required",
            )
            .body(json!({"message": "Controller service name is required"})));
        }

        service.component = payload.component.clone();
        service.version += 1;
        Ok(entity(
            &service.component,
            service.version,
            Some(payload.revision.client_id.clone()),
        ))
    }

    async fn analyze_config(&self, id: &str, params: &ConfigParams) -> ApiResult<JsonValue> {
        let mut state = self.state();
        state.counts.analyze_config += 1;
        if let Some(fault) = state.analyze_fault.clone() {
            return Err(fault);
        }
        if !state.services.contains_key(id) {
            return Err(not_found("controller service", id));
        }
        Ok(json!({
            "configurationAnalysis": {
                "componentId": id,
                "properties": params.properties,
                "supportsVerification": true
            }
        }))
    }

    async fn create_verification_job(
        &self,
        id: &str,
        _params: &ConfigParams,
        _options: &VerificationOptions,
    ) -> ApiResult<JsonValue> {
        let mut state = self.state();
        state.counts.create_verification_job += 1;
        if !state.services.contains_key(id) {
            return Err(not_found("controller service", id));
        }

        let job_id = format!("verify-{}", state.next_job);
        state.next_job += 1;
        if state.completion != JobCompletion::Vanish {
            state.jobs.insert(job_id.clone(), StoredJob { fetches: 0 });
        }
        Ok((state.create_shape)(&job_id))
    }

    async fn fetch_verification_job(&self, _id: &str, job_id: &str) -> ApiResult<VerificationJob> {
        let mut state = self.state();
        state.counts.fetch_verification_job += 1;

        if let Some(fault) = state.sticky_job_fetch_fault.clone() {
            return Err(fault);
        }
        if let Some(fault) = state.job_fetch_faults.pop_front() {
            return Err(fault);
        }

        let completion = state.completion;
        let results = state.results.clone();
        let Some(previous) = state.jobs.get(job_id).map(|job| job.fetches) else {
            return Err(not_found("verification request", job_id));
        };

        if matches!(completion, JobCompletion::VanishAfterPolls(limit) if previous >= limit) {
            state.jobs.remove(job_id);
            return Err(not_found("verification request", job_id));
        }

        let fetches = previous + 1;
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.fetches = fetches;
        }
        let complete = matches!(completion, JobCompletion::AfterPolls(n) if fetches >= n);
        Ok(VerificationJob {
            id: job_id.to_string(),
            complete: Some(CompletionFlag::Bool(complete)),
            percent_completed: Some(if complete { 100.0 } else { 50.0 }),
            state: Some(if complete { "Completed" } else { "Running" }.to_string()),
            results,
            ..VerificationJob::default()
        })
    }

    async fn delete_verification_job(&self, _id: &str, job_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.counts.delete_verification_job += 1;
        if let Some(fault) = state.delete_fault.clone() {
            return Err(fault);
        }
        state.deleted_jobs.push(job_id.to_string());
        state
            .jobs
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| not_found("verification request", job_id))
    }
}
