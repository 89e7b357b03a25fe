use crate::api::ControllerServiceApi;
use std::sync::Arc;
use tracing::{Instrument, Level, event};

/// Deletes a verification job, logging and discarding any failure.
pub async fn cleanup(api: &dyn ControllerServiceApi, resource_id: &str, job_id: &str) {
    match api.delete_verification_job(resource_id, job_id).await {
        Ok(()) => event!(Level::DEBUG, resource_id, job_id, "verification request deleted"),
        Err(err) => event!(
            Level::WARN,
            resource_id,
            job_id,
            error = %err,
            "failed to delete verification request"
        ),
    }
}

struct PendingJob {
    api: Arc<dyn ControllerServiceApi>,
    resource_id: String,
    job_id: String,
}

/// Owns the deletion of one created job.
///
/// [`CleanupGuard::finish`] deletes inline. If the guard is dropped first,
/// for example because the caller abandoned the verification future, the
/// delete is spawned on the current runtime instead.
pub struct CleanupGuard {
    pending: Option<PendingJob>,
}

impl CleanupGuard {
    pub fn new(
        api: Arc<dyn ControllerServiceApi>,
        resource_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            pending: Some(PendingJob {
                api,
                resource_id: resource_id.into(),
                job_id: job_id.into(),
            }),
        }
    }

    pub async fn finish(mut self) {
        if let Some(job) = self.pending.take() {
            cleanup(job.api.as_ref(), &job.resource_id, &job.job_id).await;
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(job) = self.pending.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                event!(
                    Level::INFO,
                    resource_id = %job.resource_id,
                    job_id = %job.job_id,
                    "verification abandoned, deleting request in background"
                );
                handle.spawn(
                    async move {
                        cleanup(job.api.as_ref(), &job.resource_id, &job.job_id).await;
                    }
                    .in_current_span(),
                );
            }
            Err(_) => event!(
                Level::WARN,
                resource_id = %job.resource_id,
                job_id = %job.job_id,
                "verification abandoned outside a runtime, request left on server"
            ),
        }
    }
}
