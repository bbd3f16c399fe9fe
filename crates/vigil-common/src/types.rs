use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// Event severity level, ordered from lowest to highest.
///
/// The `Ord` impl defines the escalation ranking used by alarm
/// correlation: a new event whose severity outranks the alarm's
/// current severity escalates the alarm.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Origin of a detection event: producing pipeline and device identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSource {
    /// Source category (e.g., `"camera"`, `"audio"`, `"drone"`).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMedia {
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub clip_url: Option<String>,
}

/// One entry of the dispatcher's webhook delivery audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAudit {
    pub url: String,
    pub status: u16,
    /// Response body, truncated to the first 500 characters.
    pub body: String,
}

/// Canonical detection event produced by the camera/inference pipeline.
///
/// Events are immutable once ingested; the single sanctioned mutation
/// point is the append-only `webhook_responses` audit trail, which is
/// guarded by a mutex so concurrent dispatches for the same event
/// synchronize on append. Use [`Event::record_webhook_response`] and
/// [`Event::webhook_responses`] rather than touching the lock directly.
#[derive(Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub source: EventSource,
    /// Timestamp of real-world occurrence.
    pub observed: DateTime<Utc>,
    /// Timestamp of arrival at the platform.
    pub ingested: DateTime<Utc>,
    #[serde(default)]
    pub location: EventLocation,
    /// Optional shape payload (polygon, bounding box, ...).
    #[serde(default)]
    pub geometry: Option<Value>,
    /// Open key-value map: detection classes, counts, scores, etc.
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    #[serde(default)]
    pub media: EventMedia,
    /// Opaque passthrough from the producing pipeline.
    #[serde(default)]
    pub raw: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    /// Legacy alias for `source.device_id`.
    #[serde(default)]
    pub camera_id: Option<String>,
    /// Legacy reference into the external workflow subsystem.
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default, with = "audit_serde")]
    pub webhook_responses: Mutex<Vec<WebhookAudit>>,
}

impl Event {
    /// Device identity, preferring `source.device_id` over the legacy
    /// `camera_id` field.
    pub fn device_id(&self) -> Option<&str> {
        self.source
            .device_id
            .as_deref()
            .or(self.camera_id.as_deref())
    }

    /// Append a delivery record to the webhook audit trail.
    pub fn record_webhook_response(&self, audit: WebhookAudit) {
        self.webhook_responses.lock().unwrap().push(audit);
    }

    /// Snapshot of the webhook audit trail.
    pub fn webhook_responses(&self) -> Vec<WebhookAudit> {
        self.webhook_responses.lock().unwrap().clone()
    }
}

mod audit_serde {
    use super::WebhookAudit;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::sync::Mutex;

    pub fn serialize<S>(v: &Mutex<Vec<WebhookAudit>>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let guard = v
            .lock()
            .map_err(|_| serde::ser::Error::custom("webhook audit lock poisoned"))?;
        guard.serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Mutex<Vec<WebhookAudit>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Mutex::new(Vec::<WebhookAudit>::deserialize(d)?))
    }
}

/// Alarm lifecycle state.
///
/// `New` is transient (assigned on creation, immediately promoted to
/// `Active`). `Resolved` is terminal; a resolved alarm's correlation
/// key becomes free for a new alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmState {
    New,
    Active,
    Escalated,
    Resolved,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::New => write!(f, "NEW"),
            AlarmState::Active => write!(f, "ACTIVE"),
            AlarmState::Escalated => write!(f, "ESCALATED"),
            AlarmState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Stateful aggregate of correlated events with a lifecycle and SLA
/// deadline. Owned exclusively by the alarm correlation engine;
/// subscribers receive value snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub correlation_key: String,
    pub severity: Severity,
    pub state: AlarmState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Time budget after which an unresolved alarm escalates.
    pub sla_deadline: DateTime<Utc>,
    /// Contributing event ids, in correlation order.
    pub event_ids: Vec<String>,
    pub tenant: Option<String>,
    pub site: Option<String>,
    pub runbook_id: Option<String>,
}

/// Kind of alarm lifecycle transition delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionAction {
    Created,
    Updated,
    Escalated,
    Resolved,
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionAction::Created => write!(f, "created"),
            TransitionAction::Updated => write!(f, "updated"),
            TransitionAction::Escalated => write!(f, "escalated"),
            TransitionAction::Resolved => write!(f, "resolved"),
        }
    }
}

/// Alarm transition event consumed by live-update broadcast and metrics.
#[derive(Debug, Clone, Serialize)]
pub struct AlarmTransition {
    pub alarm: Alarm,
    pub action: TransitionAction,
}
