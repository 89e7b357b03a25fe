// ============================================================================
// controller_sync Library
// ============================================================================

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod core;
pub mod retry;
pub mod revision;
pub mod verification;

// Re-export main types for convenience
pub use api::{
    ApiCallCounts, ControllerServiceApi, HttpControllerServiceApi, InMemoryControllerServiceApi,
    JobCompletion,
};
pub use client::{ControllerServiceClient, ControllerServiceResource};
pub use clock::{Clock, RecordingClock, TokioClock};
pub use config::{ClientConfig, PollPolicy, RetryPolicy};
pub use conflict::{ConflictKind, classify, is_conflict};
pub use self::core::{
    ApiError, ApiResult, CompletionFlag, ComponentConfig, ConfigParams, ControllerError,
    ControllerServiceEntity, RawRevision, Result, Revision, UpdatePayload, VerificationJob,
    VerificationOptions, VerificationResult,
};
pub use retry::{RetryOrchestrator, validate_component};
pub use revision::{RevisionStore, normalize_version};
pub use verification::{
    CleanupGuard, CreateResponse, NO_ISSUES, VerificationPoller, VerificationRequestManager,
    VerificationSession, cleanup, format_results, resolve_request_id,
};
