use crate::api::ControllerServiceApi;
use crate::clock::Clock;
use crate::config::PollPolicy;
use crate::core::{ApiError, ControllerError, Result, VerificationJob};
use tracing::{Instrument, Level, event, info_span};

/// Outcome of one fetch inside the polling loop.
enum Step {
    Done(VerificationJob),
    Continue,
}

/// Polls a verification job until it completes, disappears or runs out of cycles.
///
/// - each cycle waits `interval`, then fetches once;
/// - a "not found" after any successful fetch returns that snapshot;
/// - a "not found" with no snapshot gets one grace re-fetch, then [`ControllerError::Deleted`];
/// - other failures are logged and polling continues;
/// - after `max_cycles` the last snapshot is returned, or [`ControllerError::Timeout`].
pub struct VerificationPoller<'a> {
    api: &'a dyn ControllerServiceApi,
    clock: &'a dyn Clock,
    policy: &'a PollPolicy,
}

impl<'a> VerificationPoller<'a> {
    pub fn new(
        api: &'a dyn ControllerServiceApi,
        clock: &'a dyn Clock,
        policy: &'a PollPolicy,
    ) -> Self {
        Self { api, clock, policy }
    }

    pub async fn poll(&self, resource_id: &str, job_id: &str) -> Result<VerificationJob> {
        let span = info_span!("controller.verification.poll", resource_id, job_id);
        self.run(resource_id, job_id).instrument(span).await
    }

    async fn run(&self, resource_id: &str, job_id: &str) -> Result<VerificationJob> {
        let mut last_good: Option<VerificationJob> = None;

        for cycle in 1..=self.policy.max_cycles {
            self.clock.sleep(self.policy.interval).await;

            let step = match self.api.fetch_verification_job(resource_id, job_id).await {
                Ok(job) => observe(job, &mut last_good),
                Err(err) if err.is_not_found() => match last_good.take() {
                    Some(snapshot) => {
                        event!(
                            Level::INFO,
                            cycle,
                            "verification request vanished, using last snapshot"
                        );
                        Step::Done(snapshot)
                    }
                    None => self.grace_refetch(resource_id, job_id, err, &mut last_good).await?,
                },
                Err(err) => {
                    event!(Level::WARN, cycle, error = %err, "verification poll failed, retrying");
                    Step::Continue
                }
            };

            if let Step::Done(job) = step {
                event!(Level::DEBUG, cycle, results = job.results.len(), "verification finished");
                return Ok(job);
            }
        }

        match last_good {
            Some(snapshot) => {
                event!(
                    Level::WARN,
                    cycles = self.policy.max_cycles,
                    "verification never reported complete, returning last snapshot"
                );
                Ok(snapshot)
            }
            None => Err(ControllerError::Timeout {
                cycles: self.policy.max_cycles,
            }),
        }
    }

    /// Single retry after a "not found" seen before any snapshot.
    async fn grace_refetch(
        &self,
        resource_id: &str,
        job_id: &str,
        first: ApiError,
        last_good: &mut Option<VerificationJob>,
    ) -> Result<Step> {
        event!(Level::DEBUG, error = %first, "verification request not found, retrying once");
        self.clock.sleep(self.policy.not_found_grace).await;

        match self.api.fetch_verification_job(resource_id, job_id).await {
            Ok(job) => Ok(observe(job, last_good)),
            Err(err) => {
                event!(Level::WARN, error = %err, "verification request deleted");
                Err(ControllerError::Deleted)
            }
        }
    }
}

fn observe(job: VerificationJob, last_good: &mut Option<VerificationJob>) -> Step {
    if job.is_complete() {
        return Step::Done(job);
    }
    *last_good = Some(job);
    Step::Continue
}
