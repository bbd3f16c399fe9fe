//! Parser for the YAML rule definition language.
//!
//! Document shape:
//!
//! ```yaml
//! rule: high-confidence-intrusion
//! enabled: true
//! priority: 10
//! when:
//!   all:
//!     - "attributes.confidence >= 0.9"
//!     - source.type: camera
//! then:
//!   - alarm.create_or_update:
//!       severity: critical
//!   - notify:
//!       channels: [console]
//!       message: "Intrusion at {{site}}"
//! suppress:
//!   cooldown: 60s
//! ```
//!
//! A malformed document is rejected with a [`RuleError`] and never
//! admitted to the registry.

use crate::condition::{parse_condition, Condition};
use crate::error::RuleError;
use crate::rule::{
    AlarmActionConfig, AutomationActionConfig, NotifyActionConfig, Rule, RuleAction, Suppress,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct RuleDoc {
    rule: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    when: Option<Value>,
    #[serde(default)]
    then: Vec<Value>,
    #[serde(default)]
    suppress: Option<Suppress>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    10
}

/// Parse a YAML rule document into a [`Rule`].
pub fn parse_rule(yaml: &str) -> Result<Rule, RuleError> {
    let doc: RuleDoc = serde_yaml::from_str(yaml)?;

    let conditions = match &doc.when {
        None | Some(Value::Null) => Condition::All(Vec::new()),
        Some(when) => {
            let is_tree = when
                .as_object()
                .is_some_and(|o| o.contains_key("all") || o.contains_key("any"));
            if is_tree {
                parse_condition(when)?
            } else {
                // Bare single condition: wrap as {all: [cond]}
                Condition::All(vec![parse_condition(when)?])
            }
        }
    };

    let mut actions = Vec::new();
    for entry in &doc.then {
        let Some(obj) = entry.as_object() else {
            return Err(RuleError::InvalidCondition(format!(
                "'then' entries must be single-key maps, got {entry}"
            )));
        };
        for (key, config) in obj {
            actions.extend(parse_action(key, config)?);
        }
    }

    Ok(Rule {
        id: doc.rule.clone(),
        name: doc.rule,
        enabled: doc.enabled,
        priority: doc.priority,
        conditions,
        actions,
        suppress: doc.suppress,
        metadata: doc.metadata,
    })
}

fn parse_action(key: &str, config: &Value) -> Result<Vec<RuleAction>, RuleError> {
    match key {
        // Correlation keys are derived inside the alarm engine.
        "correlate.by" => Ok(Vec::new()),
        "alarm.create_or_update" | "alarm" => {
            let cfg: AlarmActionConfig = from_config(config, "alarm")?;
            Ok(vec![RuleAction::Alarm(cfg)])
        }
        "notify" => {
            let cfg: NotifyActionConfig = from_config(config, "notify")?;
            Ok(vec![RuleAction::Notify(cfg)])
        }
        "automation" => parse_automation(config),
        other => Err(RuleError::UnknownAction(other.to_string())),
    }
}

/// `automation` accepts either a direct `{action, params}` config or
/// the shorthand list of `{action_name: params}` maps.
fn parse_automation(config: &Value) -> Result<Vec<RuleAction>, RuleError> {
    if let Some(list) = config.as_array() {
        let mut actions = Vec::new();
        for item in list {
            let Some(obj) = item.as_object() else {
                return Err(RuleError::InvalidCondition(format!(
                    "automation list entries must be single-key maps, got {item}"
                )));
            };
            for (name, params) in obj {
                actions.push(RuleAction::Automation(AutomationActionConfig {
                    action: name.clone(),
                    params: params.clone(),
                    extra: BTreeMap::new(),
                }));
            }
        }
        return Ok(actions);
    }
    let cfg: AutomationActionConfig = from_config(config, "automation")?;
    Ok(vec![RuleAction::Automation(cfg)])
}

fn from_config<T: serde::de::DeserializeOwned>(
    config: &Value,
    kind: &'static str,
) -> Result<T, RuleError> {
    // A bare action key with no body gets an empty config.
    let config = match config {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|source| RuleError::InvalidAction { kind, source })
}

/// Render a rule back into its YAML DSL form, for the export surface.
pub fn to_yaml(rule: &Rule) -> Result<String, RuleError> {
    let then: Vec<Value> = rule
        .actions
        .iter()
        .map(|action| match action {
            RuleAction::Alarm(cfg) => {
                serde_json::json!({ "alarm.create_or_update": config_value(cfg) })
            }
            RuleAction::Notify(cfg) => serde_json::json!({ "notify": config_value(cfg) }),
            RuleAction::Automation(cfg) => serde_json::json!({ "automation": config_value(cfg) }),
        })
        .collect();

    let mut doc = serde_json::Map::new();
    doc.insert("rule".into(), Value::String(rule.id.clone()));
    doc.insert("enabled".into(), Value::Bool(rule.enabled));
    doc.insert("priority".into(), Value::from(rule.priority));
    doc.insert("when".into(), rule.conditions.to_value());
    doc.insert("then".into(), Value::Array(then));
    if let Some(suppress) = &rule.suppress {
        doc.insert("suppress".into(), config_value(suppress));
    }
    Ok(serde_yaml::to_string(&Value::Object(doc))?)
}

fn config_value<T: serde::Serialize>(config: &T) -> Value {
    serde_json::to_value(config).unwrap_or(Value::Null)
}
