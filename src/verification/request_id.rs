//! Resolves a verification job id from a creation response.
//!
//! The creation endpoint has returned several shapes over time: a bare job,
//! a job wrapped in `request` or `verificationRequest`, a flat id field, or an
//! array of any of these. [`classify`] tries the extractors in
//! [`EXTRACTORS`] order and the first match wins.

use serde_json::Value as JsonValue;

/// Interpreted shape of a creation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResponse {
    /// Object carrying `id` and no `request` field.
    DirectId(String),
    /// Id found under one of the known nested or flat paths.
    NestedRequest { path: &'static str, id: String },
    /// Array whose first element resolved.
    ArrayWrapped(Box<CreateResponse>),
    Unresolved,
}

impl CreateResponse {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::DirectId(id) | Self::NestedRequest { id, .. } => Some(id),
            Self::ArrayWrapped(inner) => inner.request_id(),
            Self::Unresolved => None,
        }
    }
}

pub type Extractor = fn(&JsonValue) -> Option<CreateResponse>;

/// Resolution priority; order matters.
pub const EXTRACTORS: &[Extractor] = &[direct_id, known_paths, array_wrapped, request_object];

/// Nested and flat paths tried by [`known_paths`], highest priority first.
pub const KNOWN_PATHS: &[&str] = &[
    "request.id",
    "request.requestId",
    "verificationRequest.id",
    "verificationRequest.requestId",
    "verificationRequestId",
    "id",
    "requestId",
];

const REQUEST_OBJECT_PATHS: &[&str] = &[
    "request.id",
    "request.requestId",
    "request.verificationRequestId",
];

pub fn classify(response: &JsonValue) -> CreateResponse {
    EXTRACTORS
        .iter()
        .find_map(|extract| extract(response))
        .unwrap_or(CreateResponse::Unresolved)
}

pub fn resolve_request_id(response: &JsonValue) -> Option<String> {
    classify(response).request_id().map(str::to_string)
}

/// Ids are accepted as non-empty strings or as numbers.
fn id_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) if !text.trim().is_empty() => Some(text.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lookup<'v>(value: &'v JsonValue, path: &str) -> Option<&'v JsonValue> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn first_path(value: &JsonValue, paths: &[&'static str]) -> Option<CreateResponse> {
    paths.iter().find_map(|&path| {
        lookup(value, path)
            .and_then(id_value)
            .map(|id| CreateResponse::NestedRequest { path, id })
    })
}

pub fn direct_id(value: &JsonValue) -> Option<CreateResponse> {
    let object = value.as_object()?;
    if object.contains_key("request") {
        return None;
    }
    object
        .get("id")
        .and_then(id_value)
        .map(CreateResponse::DirectId)
}

pub fn known_paths(value: &JsonValue) -> Option<CreateResponse> {
    value.as_object()?;
    first_path(value, KNOWN_PATHS)
}

pub fn array_wrapped(value: &JsonValue) -> Option<CreateResponse> {
    let first = value.as_array()?.first()?;
    direct_id(first)
        .or_else(|| known_paths(first))
        .map(|inner| CreateResponse::ArrayWrapped(Box::new(inner)))
}

pub fn request_object(value: &JsonValue) -> Option<CreateResponse> {
    value.get("request")?.as_object()?;
    first_path(value, REQUEST_OBJECT_PATHS)
}
