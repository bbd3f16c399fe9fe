use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use vigil_common::types::Severity;

/// Cooldown configuration: minimum time between successive triggers of
/// the same rule, as a duration string (`"30s"`, `"2m"`, `"1h"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suppress {
    pub cooldown: String,
}

/// Config of an `alarm.create_or_update` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlarmActionConfig {
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub runbook: Option<String>,
    /// Explicit correlation key override; the engine derives one from
    /// the event when absent.
    #[serde(default)]
    pub correlation_key: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Config of a `notify` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyActionConfig {
    /// Channel tokens, `"type"` or `"type:target"`.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Message template with `{{dot.path}}` placeholders.
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_message() -> String {
    "Alert triggered".to_string()
}

/// Config of an `automation` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationActionConfig {
    pub action: String,
    #[serde(default = "default_params")]
    pub params: Value,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_params() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One action of a matched rule, tagged by kind.
#[derive(Debug, Clone)]
pub enum RuleAction {
    Alarm(AlarmActionConfig),
    Notify(NotifyActionConfig),
    Automation(AutomationActionConfig),
}

/// A declarative condition → action binding evaluated per event.
///
/// `id` is globally unique in the registry; re-adding an existing id
/// replaces the rule atomically. `priority` (lower first) orders
/// evaluation for readability only; all enabled rules are evaluated
/// regardless of earlier matches.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub conditions: Condition,
    pub actions: Vec<RuleAction>,
    pub suppress: Option<Suppress>,
    pub metadata: BTreeMap<String, Value>,
}
