use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

/// Fallback shown when a failed update carries no usable message.
pub const UPDATE_FAILED_FALLBACK: &str = "Failed to update controller service";

/// Failure reported by a collaborator call.
///
/// `status` is the HTTP-like response status when one exists; transport
/// failures leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
    pub details: Option<String>,
    pub error_field: Option<String>,
    /// Decoded response body, when the backend sent one.
    pub body: Option<JsonValue>,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            error_field: None,
            body: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn error_field(mut self, field: impl Into<String>) -> Self {
        self.error_field = Some(field.into());
        self
    }

    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` when the backend reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.message.to_lowercase().contains("not found")
    }

    /// Free-text fields in the order they are inspected by the classifier.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.message.as_str())
            .chain(self.details.as_deref())
            .chain(self.error_field.as_deref())
    }

    /// Best-effort human-readable message.
    ///
    /// Looks at `body.message`, then `body.error`, then `message`.
    pub fn user_message(&self) -> String {
        let from_body = |key: &str| {
            self.body
                .as_ref()
                .and_then(|body| body.get(key))
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };

        from_body("message")
            .or_else(|| from_body("error"))
            .or_else(|| {
                let message = self.message.trim();
                (!message.is_empty()).then(|| message.to_string())
            })
            .unwrap_or_else(|| UPDATE_FAILED_FALLBACK.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    #[error("Revision conflict persisted after retries: {0}")]
    Conflict(ApiError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Verification request was deleted before results could be retrieved")]
    Deleted,

    #[error("Verification did not complete within {cycles} polling cycles")]
    Timeout { cycles: u32 },

    #[error("{0}")]
    Update(String),

    #[error("Could not determine verification request id from response: {raw}")]
    RequestIdUnresolved { raw: String },

    #[error("Controller service API error: {0}")]
    Api(ApiError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

impl From<ApiError> for ControllerError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_prefers_body_message_then_error() {
        let err = ApiError::with_status(400, "Bad Request").body(json!({
            "message": "Property 'url' is invalid",
            "error": "validation"
        }));
        assert_eq!(err.user_message(), "Property 'url' is invalid");

        let err = ApiError::with_status(400, "Bad Request").body(json!({"error": "nope"}));
        assert_eq!(err.user_message(), "nope");

        let err = ApiError::with_status(400, "Bad Request").body(json!({"message": "  "}));
        assert_eq!(err.user_message(), "Bad Request");
    }

    #[test]
    fn user_message_falls_back_when_nothing_usable() {
        let err = ApiError::transport("");
        assert_eq!(err.user_message(), UPDATE_FAILED_FALLBACK);
    }

    #[test]
    fn not_found_detected_from_status_or_text() {
        assert!(ApiError::with_status(404, "gone").is_not_found());
        assert!(ApiError::with_status(400, "Request Not Found").is_not_found());
        assert!(!ApiError::with_status(503, "unavailable").is_not_found());
    }
}
