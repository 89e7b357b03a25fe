use crate::api::ControllerServiceApi;
use crate::clock::Clock;
use crate::config::RetryPolicy;
use crate::conflict::{ConflictKind, classify};
use crate::core::{
    ApiError, ComponentConfig, ControllerError, ControllerServiceEntity, Result, UpdatePayload,
};
use crate::revision::RevisionStore;
use log::warn;
use tracing::{Instrument, Level, event, info_span};

/// Rejects components the server would refuse anyway.
pub fn validate_component(component: &ComponentConfig) -> Result<()> {
    if component.id.trim().is_empty() {
        return Err(ControllerError::Validation(
            "component id must not be empty".to_string(),
        ));
    }
    if component.name.trim().is_empty() {
        return Err(ControllerError::Validation(
            "component name is required".to_string(),
        ));
    }
    Ok(())
}

/// Optimistic-concurrency update loop.
///
/// Attempt `n` sends one mutation with the current revision. A conflict with
/// `n <= max_retries` waits `settle_step * n`, re-reads the revision (new
/// client id), waits `backoff_step * n` and tries again. Any other failure, or
/// a conflict past the cap, ends the update with that attempt's error.
pub struct RetryOrchestrator<'a> {
    api: &'a dyn ControllerServiceApi,
    clock: &'a dyn Clock,
    policy: &'a RetryPolicy,
    disconnected_node_acknowledged: bool,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        api: &'a dyn ControllerServiceApi,
        clock: &'a dyn Clock,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            api,
            clock,
            policy,
            disconnected_node_acknowledged: false,
        }
    }

    pub fn disconnected_node_acknowledged(mut self, acknowledged: bool) -> Self {
        self.disconnected_node_acknowledged = acknowledged;
        self
    }

    fn payload(&self, store: &RevisionStore, component: &ComponentConfig) -> UpdatePayload {
        UpdatePayload {
            revision: store.revision().clone(),
            component: component.clone(),
            disconnected_node_acknowledged: self.disconnected_node_acknowledged,
        }
    }

    pub async fn apply_update(
        &self,
        store: &mut RevisionStore,
        component: &ComponentConfig,
    ) -> Result<ControllerServiceEntity> {
        validate_component(component)?;

        let span = info_span!("controller.update", resource_id = %store.resource_id());
        self.run_attempts(store, component).instrument(span).await
    }

    async fn run_attempts(
        &self,
        store: &mut RevisionStore,
        component: &ComponentConfig,
    ) -> Result<ControllerServiceEntity> {
        let resource_id = store.resource_id().to_string();
        let mut attempt = 1u32;
        loop {
            let payload = self.payload(store, component);
            event!(
                Level::DEBUG,
                attempt,
                version = payload.revision.version,
                "submitting update"
            );

            let err = match self.api.mutate_resource(&resource_id, &payload).await {
                Ok(updated) => {
                    store.adopt(&updated.revision);
                    event!(Level::INFO, attempt, version = store.version(), "update applied");
                    return Ok(updated);
                }
                Err(err) => err,
            };

            if classify(&err) == ConflictKind::Other {
                event!(Level::WARN, attempt, error = %err, "update failed");
                return Err(update_failure(err));
            }
            let Some(next) = next_attempt(attempt, self.policy.max_retries) else {
                event!(Level::WARN, attempt, error = %err, "update conflict retries exhausted");
                return Err(ControllerError::Conflict(err));
            };

            let backoff = self.policy.backoff_delay(attempt);
            warn!(
                "controller service {} update conflict (attempt {} of {}): {} (backoff={}ms)",
                resource_id,
                attempt,
                self.policy.max_retries.saturating_add(1),
                err,
                backoff.as_millis()
            );

            self.clock.sleep(self.policy.settle_delay(attempt)).await;
            store.refresh(self.api).await?;
            self.clock.sleep(backoff).await;
            attempt = next;
        }
    }
}

/// Attempt number after a conflict on `attempt`, or `None` once retries are used up.
fn next_attempt(attempt: u32, max_retries: u32) -> Option<u32> {
    if attempt > max_retries {
        return None;
    }
    attempt.checked_add(1)
}

fn update_failure(err: ApiError) -> ControllerError {
    ControllerError::Update(err.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_name_and_id() {
        assert!(matches!(
            validate_component(&ComponentConfig::new("cs-1", "   ")),
            Err(ControllerError::Validation(_))
        ));
        assert!(matches!(
            validate_component(&ComponentConfig::new("", "pool")),
            Err(ControllerError::Validation(_))
        ));
        assert!(validate_component(&ComponentConfig::new("cs-1", "pool")).is_ok());
    }

    #[test]
    fn attempts_stop_at_the_retry_cap() {
        assert_eq!(next_attempt(1, 3), Some(2));
        assert_eq!(next_attempt(3, 3), Some(4));
        assert_eq!(next_attempt(4, 3), None);
        assert_eq!(next_attempt(1, 0), None);
        assert_eq!(next_attempt(u32::MAX, u32::MAX), None);
    }
}
