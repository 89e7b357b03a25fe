use crate::api::{ControllerServiceApi, HttpControllerServiceApi};
use crate::clock::{Clock, TokioClock};
use crate::config::ClientConfig;
use crate::core::{
    ComponentConfig, ConfigParams, ControllerError, ControllerServiceEntity, Result, Revision,
    VerificationJob, VerificationOptions,
};
use crate::retry::RetryOrchestrator;
use crate::revision::RevisionStore;
use crate::verification::{
    CleanupGuard, VerificationPoller, VerificationRequestManager, VerificationSession,
    format_results,
};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};

/// Entry point for working with controller services.
///
/// # Examples
///
/// ```no_run
/// use controller_sync::{ClientConfig, ComponentConfig, ControllerServiceClient};
///
/// # async fn run() -> controller_sync::Result<()> {
/// let client = ControllerServiceClient::connect(ClientConfig::new("http://localhost:8080/nifi-api"))?;
/// let service = client.open("2f1c6a3e-0191-1000-ffff-ffffd1d1c0de").await?;
///
/// let mut component = service.component();
/// component.name = "Primary DB pool".to_string();
/// service.apply_update(component).await?;
///
/// if let Some(job) = service.start_verification().await? {
///     println!("{}", controller_sync::format_results(&job.results));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ControllerServiceClient {
    api: Arc<dyn ControllerServiceApi>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
}

impl ControllerServiceClient {
    pub fn new(api: Arc<dyn ControllerServiceApi>, config: ClientConfig) -> Self {
        Self {
            api,
            clock: Arc::new(TokioClock),
            config,
        }
    }

    /// Builds a client backed by the REST API at `config.base_url`.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let api = HttpControllerServiceApi::new(&config)?;
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches the service and returns a handle holding its revision.
    pub async fn open(&self, resource_id: &str) -> Result<ControllerServiceResource> {
        let entity = self.api.fetch_resource(resource_id).await?;
        let store = RevisionStore::new(resource_id, &entity.revision);
        event!(
            Level::DEBUG,
            resource_id,
            version = store.version(),
            "controller service opened"
        );

        Ok(ControllerServiceResource {
            api: Arc::clone(&self.api),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            resource_id: resource_id.to_string(),
            revision: Mutex::new(store),
            component: StdMutex::new(entity.component),
            session: VerificationSession::new(),
        })
    }
}

/// One controller service with its revision and verification session.
///
/// Updates on the same handle run one at a time.
pub struct ControllerServiceResource {
    api: Arc<dyn ControllerServiceApi>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    resource_id: String,
    revision: Mutex<RevisionStore>,
    component: StdMutex<ComponentConfig>,
    session: VerificationSession,
}

impl ControllerServiceResource {
    pub fn id(&self) -> &str {
        &self.resource_id
    }

    pub async fn revision(&self) -> Revision {
        self.revision.lock().await.revision().clone()
    }

    /// Last component state seen from the server.
    pub fn component(&self) -> ComponentConfig {
        self.component
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Saves `component`, retrying on revision conflicts.
    pub async fn apply_update(&self, component: ComponentConfig) -> Result<ControllerServiceEntity> {
        if component.id != self.resource_id {
            return Err(ControllerError::Validation(format!(
                "component id '{}' does not match controller service '{}'",
                component.id, self.resource_id
            )));
        }

        let mut store = self.revision.lock().await;
        let updated = RetryOrchestrator::new(self.api.as_ref(), self.clock.as_ref(), &self.config.retry)
            .disconnected_node_acknowledged(self.config.disconnected_node_acknowledged)
            .apply_update(&mut store, &component)
            .await?;

        *self.component.lock().unwrap_or_else(PoisonError::into_inner) = updated.component.clone();
        Ok(updated)
    }

    /// Verifies the last known component properties.
    pub async fn start_verification(&self) -> Result<Option<VerificationJob>> {
        let params = ConfigParams::from_component(&self.component());
        self.start_verification_with(params, VerificationOptions::default())
            .await
    }

    /// Runs one verification end to end.
    ///
    /// Returns `Ok(None)` without contacting the server when a verification is
    /// already running on this handle. Once a job exists it is deleted exactly
    /// once, whatever the polling outcome.
    pub async fn start_verification_with(
        &self,
        params: ConfigParams,
        options: VerificationOptions,
    ) -> Result<Option<VerificationJob>> {
        let Some(_guard) = self.session.try_begin() else {
            event!(Level::INFO, resource_id = %self.resource_id, "verification already running");
            return Ok(None);
        };

        let span = info_span!("controller.verification", resource_id = %self.resource_id);
        let outcome = self.verify(&params, &options).instrument(span).await;

        match outcome {
            Ok(job) => {
                self.session.record_result(job.clone());
                Ok(Some(job))
            }
            Err(err) => {
                self.session.record_error(err.clone());
                Err(err)
            }
        }
    }

    async fn verify(
        &self,
        params: &ConfigParams,
        options: &VerificationOptions,
    ) -> Result<VerificationJob> {
        let api = self.api.as_ref();
        let job_id = VerificationRequestManager::new(api)
            .start(&self.resource_id, params, options)
            .await?;

        // deletes the job even if this future is dropped while polling
        let cleanup = CleanupGuard::new(
            Arc::clone(&self.api),
            self.resource_id.as_str(),
            job_id.as_str(),
        );

        let outcome = VerificationPoller::new(api, self.clock.as_ref(), &self.config.poll)
            .poll(&self.resource_id, &job_id)
            .await;

        cleanup.finish().await;
        outcome
    }

    pub fn is_verifying(&self) -> bool {
        self.session.is_verifying()
    }

    pub fn last_verification_result(&self) -> Option<VerificationJob> {
        self.session.last_result()
    }

    pub fn last_verification_error(&self) -> Option<ControllerError> {
        self.session.last_error()
    }

    /// Display text for the last completed verification.
    pub fn last_verification_report(&self) -> Option<String> {
        self.session
            .last_result()
            .map(|job| format_results(&job.results))
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }
}
