//! Collaborator seam for the controller-service backend.
//!
//! The update and verification flows only talk to [`ControllerServiceApi`].
//! [`HttpControllerServiceApi`] speaks the REST API; [`InMemoryControllerServiceApi`]
//! keeps everything in process for tests and local experiments.

pub mod http;
pub mod in_memory;

use crate::core::{
    ApiResult, ConfigParams, ControllerServiceEntity, UpdatePayload, VerificationJob,
    VerificationOptions,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

pub use http::HttpControllerServiceApi;
pub use in_memory::{ApiCallCounts, InMemoryControllerServiceApi, JobCompletion};

#[async_trait]
pub trait ControllerServiceApi: Send + Sync {
    /// Idempotent read of the service and its current revision.
    async fn fetch_resource(&self, id: &str) -> ApiResult<ControllerServiceEntity>;

    /// Applies `payload`; fails with status 409 when the revision is stale.
    async fn mutate_resource(
        &self,
        id: &str,
        payload: &UpdatePayload,
    ) -> ApiResult<ControllerServiceEntity>;

    /// Precondition call some backends require before verification.
    async fn analyze_config(&self, id: &str, params: &ConfigParams) -> ApiResult<JsonValue>;

    /// Starts a verification job. The response shape varies between versions.
    async fn create_verification_job(
        &self,
        id: &str,
        params: &ConfigParams,
        options: &VerificationOptions,
    ) -> ApiResult<JsonValue>;

    async fn fetch_verification_job(&self, id: &str, job_id: &str) -> ApiResult<VerificationJob>;

    async fn delete_verification_job(&self, id: &str, job_id: &str) -> ApiResult<()>;
}
