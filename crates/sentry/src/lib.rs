pub mod normalize;
pub mod signature;

use serde::{Deserialize, Serialize};

/// Lifecycle actions that produce a job. Every other action is accepted (for
/// idempotent webhook retries) but ignored.
pub fn should_process(action: &str) -> bool { matches!(action, "created" | "triggered") }

/// The inbound Sentry webhook payload. Sentry's schema drifts between event
/// kinds, so every nested field is optional or defaulted; a mismatch reads as
/// "field absent", never as a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub issue: Option<Issue>,
    #[serde(default)]
    pub event: Option<Event>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "shortId")]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub culprit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub function: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, rename = "eventID")]
    pub event_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// One event entry ("exception", "breadcrumbs", ...). The payload shape
/// differs per entry type, so the data is kept raw until the normalizer
/// drills into the entries it understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
