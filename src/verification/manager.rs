use super::request_id::{self, CreateResponse};
use crate::api::ControllerServiceApi;
use crate::core::{ConfigParams, ControllerError, Result, VerificationOptions};
use tracing::{Level, event};

/// Creates server-side verification jobs.
pub struct VerificationRequestManager<'a> {
    api: &'a dyn ControllerServiceApi,
}

impl<'a> VerificationRequestManager<'a> {
    pub fn new(api: &'a dyn ControllerServiceApi) -> Self {
        Self { api }
    }

    /// Runs the analysis precondition, creates the job and returns its id.
    ///
    /// The analysis response is not inspected; only its failure stops the flow.
    pub async fn start(
        &self,
        resource_id: &str,
        params: &ConfigParams,
        options: &VerificationOptions,
    ) -> Result<String> {
        self.api.analyze_config(resource_id, params).await?;

        let response = self
            .api
            .create_verification_job(resource_id, params, options)
            .await?;

        match request_id::classify(&response) {
            CreateResponse::Unresolved => {
                event!(Level::ERROR, %response, "verification request id missing from response");
                Err(ControllerError::RequestIdUnresolved {
                    raw: response.to_string(),
                })
            }
            resolved => {
                let job_id = resolved.request_id().unwrap_or_default().to_string();
                event!(Level::DEBUG, job_id = %job_id, shape = ?resolved, "verification request created");
                Ok(job_id)
            }
        }
    }
}
