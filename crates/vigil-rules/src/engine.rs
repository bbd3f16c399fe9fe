use crate::cooldown::{parse_duration, CooldownTracker};
use crate::rule::{Rule, RuleAction};
use crate::template;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use vigil_alarm::engine::{AlarmEngine, CorrelateOptions};
use vigil_common::types::Event;
use vigil_notify::{AutomationHandler, Dispatcher, Notifier};

/// Evaluates every enabled rule against each incoming event and runs
/// the actions of the rules that match.
///
/// Evaluation is independent per rule: a match does not stop later
/// rules, and a failure inside one rule's conditions or actions never
/// reaches the others. The engine holds no per-event state; all
/// throttling state lives in the [`CooldownTracker`].
pub struct RulesEngine {
    rules: RwLock<HashMap<String, Arc<Rule>>>,
    cooldowns: CooldownTracker,
    dispatcher: Arc<Dispatcher>,
    alarms: Option<Arc<AlarmEngine>>,
}

impl RulesEngine {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            cooldowns: CooldownTracker::new(),
            dispatcher,
            alarms: None,
        }
    }

    /// Wire in the alarm correlation engine so `alarm` actions have a
    /// destination. Without it they are logged and skipped.
    pub fn with_alarms(dispatcher: Arc<Dispatcher>, alarms: Arc<AlarmEngine>) -> Self {
        Self {
            alarms: Some(alarms),
            ..Self::new(dispatcher)
        }
    }

    /// Insert or replace a rule. Replacement is atomic: concurrent
    /// evaluations see either the old or the new rule, never a mix.
    pub fn add_rule(&self, rule: Rule) {
        tracing::info!(rule_id = %rule.id, name = %rule.name, enabled = rule.enabled, "rule loaded");
        self.rules
            .write()
            .unwrap()
            .insert(rule.id.clone(), Arc::new(rule));
    }

    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let removed = self.rules.write().unwrap().remove(rule_id).is_some();
        if removed {
            tracing::info!(rule_id, "rule removed");
        }
        removed
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.rules.read().unwrap().get(rule_id).cloned()
    }

    /// All rules, ordered by (priority, id).
    pub fn list_rules(&self) -> Vec<Arc<Rule>> {
        let mut rules: Vec<_> = self.rules.read().unwrap().values().cloned().collect();
        rules.sort_by(|a, b| (a.priority, &a.id).cmp(&(b.priority, &b.id)));
        rules
    }

    pub fn register_notifier(&self, channel: &str, handler: Arc<dyn Notifier>) {
        self.dispatcher.register_notifier(channel, handler);
    }

    pub fn register_automation(&self, action: &str, handler: Arc<dyn AutomationHandler>) {
        self.dispatcher.register_automation(action, handler);
    }

    /// Evaluate one event against the registry. Returns the ids of the
    /// rules that matched and fired.
    pub async fn evaluate_event(&self, event: &Arc<Event>) -> Vec<String> {
        self.evaluate_event_at(event, Utc::now()).await
    }

    /// Same as [`evaluate_event`](Self::evaluate_event) with an
    /// explicit clock, so cooldown windows are testable.
    pub async fn evaluate_event_at(&self, event: &Arc<Event>, now: DateTime<Utc>) -> Vec<String> {
        let rules = self.list_rules();
        let payload = match serde_json::to_value(&**event) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "event not serializable, skipping evaluation");
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            let cooldown_secs = rule
                .suppress
                .as_ref()
                .map(|s| parse_duration(&s.cooldown))
                .unwrap_or(0);
            if self.cooldowns.suppressed(&rule.id, cooldown_secs, now) {
                tracing::debug!(rule_id = %rule.id, event_id = %event.id, "rule in cooldown, suppressed");
                continue;
            }
            if !rule.conditions.matches(&payload) {
                continue;
            }
            tracing::info!(rule_id = %rule.id, name = %rule.name, event_id = %event.id, "rule matched");
            self.execute_actions(&rule, event, &payload).await;
            // The cooldown window only refreshes for rules that ask
            // for suppression; un-throttled rules stay un-throttled.
            if rule.suppress.is_some() {
                self.cooldowns.touch(&rule.id, now);
            }
            fired.push(rule.id.clone());
        }
        fired
    }

    async fn execute_actions(&self, rule: &Rule, event: &Arc<Event>, payload: &Value) {
        for action in &rule.actions {
            match action {
                RuleAction::Alarm(cfg) => {
                    let Some(alarms) = &self.alarms else {
                        tracing::warn!(rule_id = %rule.id, "alarm action without alarm engine, skipping");
                        continue;
                    };
                    let opts = CorrelateOptions {
                        severity: cfg.severity,
                        runbook: cfg.runbook.clone(),
                        correlation_key: cfg.correlation_key.clone(),
                    };
                    let alarm = alarms.correlate(event, opts).await;
                    tracing::debug!(rule_id = %rule.id, alarm_id = %alarm.id, "alarm action correlated");
                }
                RuleAction::Notify(cfg) => {
                    let message = template::render(&cfg.message, payload);
                    self.dispatcher.notify(&cfg.channels, &message, event);
                }
                RuleAction::Automation(cfg) => {
                    self.dispatcher.automation(&cfg.action, &cfg.params, event);
                }
            }
        }
    }
}
