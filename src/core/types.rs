use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Optimistic-concurrency token sent with every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub version: u64,
    pub client_id: String,
}

/// Revision exactly as the server reported it.
///
/// The version is kept as raw JSON because backends have been seen sending
/// nulls, strings and floats; use [`crate::revision::normalize_version`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRevision {
    #[serde(default)]
    pub version: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Mutable configuration of a controller service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Fields this client does not model; round-tripped untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ComponentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), Some(value.into()));
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// Body of a single mutation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    pub revision: Revision,
    pub component: ComponentConfig,
    #[serde(default)]
    pub disconnected_node_acknowledged: bool,
}

/// Controller service as returned by fetch and mutate calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerServiceEntity {
    #[serde(default)]
    pub revision: RawRevision,
    pub component: ComponentConfig,
}

/// Configuration values submitted for analysis and verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigParams {
    pub properties: BTreeMap<String, Option<String>>,
}

impl ConfigParams {
    pub fn from_component(component: &ComponentConfig) -> Self {
        Self {
            properties: component.properties.clone(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), Some(value.into()));
        self
    }
}

/// Extra verification inputs that are not component properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOptions {
    pub attributes: BTreeMap<String, String>,
}

/// `complete` flag of a verification job; backends send booleans or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionFlag {
    Bool(bool),
    Text(String),
    Other(JsonValue),
}

impl CompletionFlag {
    pub fn is_true(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(text) => text == "true",
            Self::Other(_) => false,
        }
    }
}

/// One step outcome of a verification job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(
        default,
        alias = "verificationStepName",
        skip_serializing_if = "Option::is_none"
    )]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Snapshot of a server-side verification job.
///
/// Decoding is lenient: numeric ids become strings, `null` results are empty
/// and status fields of the wrong type are dropped rather than failing the poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationJob {
    #[serde(default, alias = "requestId", deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<CompletionFlag>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub percent_completed: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub results: Vec<VerificationResult>,
}

impl VerificationJob {
    /// All three completion encodings count: `true`, `"true"` and status `COMPLETE`.
    pub fn is_complete(&self) -> bool {
        self.complete.as_ref().is_some_and(CompletionFlag::is_true)
            || self.status.as_deref() == Some("COMPLETE")
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value as JsonValue;

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match JsonValue::deserialize(deserializer)? {
            JsonValue::String(text) => text,
            JsonValue::Number(number) => number.to_string(),
            _ => String::new(),
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match JsonValue::deserialize(deserializer)? {
            JsonValue::String(text) => Some(text),
            JsonValue::Number(number) => Some(number.to_string()),
            JsonValue::Bool(flag) => Some(flag.to_string()),
            _ => None,
        })
    }

    pub fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match JsonValue::deserialize(deserializer)? {
            JsonValue::Number(number) => number.as_f64(),
            JsonValue::String(text) => text.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
    }
}
