use crate::core::{ControllerError, VerificationJob};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct SessionState {
    started_at: Option<DateTime<Utc>>,
    last_error: Option<ControllerError>,
    result: Option<VerificationJob>,
}

/// Verification state of one resource.
///
/// At most one verification runs at a time: [`VerificationSession::try_begin`]
/// takes the flag with a compare-and-swap and the returned guard releases it.
#[derive(Debug, Default)]
pub struct VerificationSession {
    verifying: AtomicBool,
    state: Mutex<SessionState>,
}

/// Held for the duration of one verification.
#[derive(Debug)]
pub struct VerifyingGuard<'a> {
    session: &'a VerificationSession,
}

impl Drop for VerifyingGuard<'_> {
    fn drop(&mut self) {
        self.session.verifying.store(false, Ordering::Release);
    }
}

impl VerificationSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `None` when a verification is already running.
    ///
    /// A successful begin clears the previous result and error.
    pub fn try_begin(&self) -> Option<VerifyingGuard<'_>> {
        self.verifying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let mut state = self.state();
        state.started_at = Some(Utc::now());
        state.last_error = None;
        state.result = None;
        Some(VerifyingGuard { session: self })
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying.load(Ordering::Acquire)
    }

    pub fn record_result(&self, job: VerificationJob) {
        let mut state = self.state();
        state.result = Some(job);
        state.last_error = None;
    }

    pub fn record_error(&self, err: ControllerError) {
        let mut state = self.state();
        state.last_error = Some(err);
        state.result = None;
    }

    pub fn last_result(&self) -> Option<VerificationJob> {
        self.state().result.clone()
    }

    pub fn last_error(&self) -> Option<ControllerError> {
        self.state().last_error.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state().started_at
    }
}
