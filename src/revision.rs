use crate::api::ControllerServiceApi;
use crate::core::{ControllerServiceEntity, RawRevision, Result, Revision};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{Level, event};
use uuid::Uuid;

/// Coerces a server-reported version into a non-negative integer.
///
/// Missing, null, negative, non-finite and non-numeric values become `0`.
/// Numeric strings are parsed, fractional numbers are truncated.
pub fn normalize_version(raw: &JsonValue) -> u64 {
    match raw {
        JsonValue::Number(number) => {
            if let Some(value) = number.as_u64() {
                value
            } else if let Some(value) = number.as_f64() {
                float_version(value)
            } else {
                0
            }
        }
        JsonValue::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(float_version))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn float_version(value: f64) -> u64 {
    if value.is_finite() && value >= 0.0 {
        value.trunc().min(u64::MAX as f64) as u64
    } else {
        0
    }
}

pub fn new_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Last known revision of one controller service.
///
/// Only the update path writes to it. Every refresh issues a new client id.
#[derive(Debug, Clone)]
pub struct RevisionStore {
    resource_id: String,
    revision: Revision,
    refreshed_at: DateTime<Utc>,
}

impl RevisionStore {
    pub fn new(resource_id: impl Into<String>, raw: &RawRevision) -> Self {
        Self {
            resource_id: resource_id.into(),
            revision: Revision {
                version: normalize_version(&raw.version),
                client_id: new_client_id(),
            },
            refreshed_at: Utc::now(),
        }
    }

    pub fn from_entity(entity: &ControllerServiceEntity) -> Self {
        Self::new(entity.component.id.clone(), &entity.revision)
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn version(&self) -> u64 {
        self.revision.version
    }

    pub fn client_id(&self) -> &str {
        &self.revision.client_id
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// Adopts a revision the server just reported.
    pub fn adopt(&mut self, raw: &RawRevision) {
        self.revision = Revision {
            version: normalize_version(&raw.version),
            client_id: new_client_id(),
        };
        self.refreshed_at = Utc::now();
    }

    /// Re-reads the authoritative revision from the server.
    pub async fn refresh(&mut self, api: &dyn ControllerServiceApi) -> Result<&Revision> {
        let entity = api.fetch_resource(&self.resource_id).await?;
        let previous = self.revision.version;
        self.adopt(&entity.revision);
        event!(
            Level::DEBUG,
            resource_id = %self.resource_id,
            previous,
            version = self.revision.version,
            "revision refreshed"
        );
        Ok(&self.revision)
    }
}
