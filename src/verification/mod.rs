//! Verification-request workflow: create a job, poll it, always delete it.

pub mod cleanup;
pub mod manager;
pub mod poller;
pub mod report;
pub mod request_id;
pub mod session;

pub use cleanup::{CleanupGuard, cleanup};
pub use manager::VerificationRequestManager;
pub use poller::VerificationPoller;
pub use report::{NO_ISSUES, format_results};
pub use request_id::{CreateResponse, resolve_request_id};
pub use session::{VerificationSession, VerifyingGuard};
