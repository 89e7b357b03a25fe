pub mod error;
pub mod types;

pub use error::{ApiError, ApiResult, ControllerError, Result, UPDATE_FAILED_FALLBACK};
pub use types::{
    CompletionFlag, ComponentConfig, ConfigParams, ControllerServiceEntity, RawRevision, Revision,
    UpdatePayload, VerificationJob, VerificationOptions, VerificationResult,
};
