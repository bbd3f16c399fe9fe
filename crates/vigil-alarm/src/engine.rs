use crate::state::{can_transition, SlaPolicy};
use crate::AlarmSubscriber;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use vigil_common::id;
use vigil_common::types::{
    Alarm, AlarmState, AlarmTransition, Event, Severity, TransitionAction,
};

/// Per-correlation overrides carried by an `alarm` rule action.
#[derive(Debug, Clone, Default)]
pub struct CorrelateOptions {
    pub severity: Option<Severity>,
    pub runbook: Option<String>,
    pub correlation_key: Option<String>,
}

/// Maintains alarm lifecycle state keyed by correlation key.
///
/// Active alarms live in a sharded map keyed by correlation key; the
/// map's entry lock serializes all updates for one key, so two events
/// arriving concurrently for the same key can never create two alarms.
/// Updates for different keys proceed in parallel.
pub struct AlarmEngine {
    /// Active (non-resolved) alarms, by correlation key.
    active: DashMap<String, Alarm>,
    /// Alarm id → correlation key, for lookup of active alarms by id.
    index: DashMap<String, String>,
    /// Terminal archive, by alarm id.
    resolved: DashMap<String, Alarm>,
    subscribers: RwLock<Vec<Arc<dyn AlarmSubscriber>>>,
    sla: SlaPolicy,
}

impl AlarmEngine {
    pub fn new(sla: SlaPolicy) -> Self {
        Self {
            active: DashMap::new(),
            index: DashMap::new(),
            resolved: DashMap::new(),
            subscribers: RwLock::new(Vec::new()),
            sla,
        }
    }

    /// Register a transition subscriber. Subscribers are invoked
    /// at-least-once, best-effort; failures are logged, never
    /// propagated.
    pub fn subscribe(&self, subscriber: Arc<dyn AlarmSubscriber>) {
        self.subscribers.write().unwrap().push(subscriber);
    }

    /// Correlate an event using its own severity and the default key
    /// derivation.
    pub async fn process_event(&self, event: &Event) -> Alarm {
        self.correlate(event, CorrelateOptions::default()).await
    }

    /// Correlate an event into a new or existing active alarm.
    ///
    /// Creates an `Active` alarm when no active alarm exists for the
    /// key; otherwise appends the event id, refreshes `updated_at`,
    /// and escalates severity if the event outranks the alarm. Exact
    /// re-delivery of an already-correlated event id is a no-op.
    pub async fn correlate(&self, event: &Event, opts: CorrelateOptions) -> Alarm {
        let now = Utc::now();
        let key = opts
            .correlation_key
            .clone()
            .unwrap_or_else(|| correlation_key(event));

        // All mutation happens under the entry lock for this key; the
        // transition is emitted only after the lock is released.
        let (snapshot, transition) = match self.active.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let alarm = occupied.get_mut();
                if alarm.event_ids.iter().any(|id| id == &event.id) {
                    tracing::debug!(
                        alarm_id = %alarm.id,
                        event_id = %event.id,
                        "event already correlated, ignoring re-delivery"
                    );
                    (alarm.clone(), None)
                } else {
                    alarm.event_ids.push(event.id.clone());
                    alarm.updated_at = now;
                    let severity = opts.severity.unwrap_or(event.severity);
                    if severity > alarm.severity {
                        tracing::info!(
                            alarm_id = %alarm.id,
                            from = %alarm.severity,
                            to = %severity,
                            "alarm severity escalated by new event"
                        );
                        alarm.severity = severity;
                    }
                    if alarm.runbook_id.is_none() {
                        alarm.runbook_id = opts.runbook.clone();
                    }
                    let snapshot = alarm.clone();
                    let transition = AlarmTransition {
                        alarm: snapshot.clone(),
                        action: TransitionAction::Updated,
                    };
                    (snapshot, Some(transition))
                }
            }
            Entry::Vacant(vacant) => {
                let severity = opts.severity.unwrap_or(event.severity);
                let mut alarm = Alarm {
                    id: id::alarm_id(),
                    correlation_key: key.clone(),
                    severity,
                    state: AlarmState::New,
                    created_at: now,
                    updated_at: now,
                    sla_deadline: now + self.sla.deadline(severity),
                    event_ids: vec![event.id.clone()],
                    tenant: event.tenant.clone(),
                    site: event.site.clone(),
                    runbook_id: opts.runbook.clone(),
                };
                // NEW is transient: promoted before the alarm is visible.
                alarm.state = AlarmState::Active;
                tracing::info!(
                    alarm_id = %alarm.id,
                    key = %key,
                    severity = %severity,
                    event_id = %event.id,
                    "alarm created"
                );
                self.index.insert(alarm.id.clone(), key.clone());
                let snapshot = alarm.clone();
                vacant.insert(alarm);
                let transition = AlarmTransition {
                    alarm: snapshot.clone(),
                    action: TransitionAction::Created,
                };
                (snapshot, Some(transition))
            }
        };

        if let Some(transition) = transition {
            self.emit(&transition).await;
        }
        snapshot
    }

    /// Manually resolve an alarm, freeing its correlation key.
    /// Resolving an already-resolved alarm is a no-op.
    pub async fn resolve(&self, alarm_id: &str) -> Option<Alarm> {
        let Some(key) = self.index.get(alarm_id).map(|k| k.clone()) else {
            if let Some(alarm) = self.resolved.get(alarm_id) {
                tracing::debug!(alarm_id, "alarm already resolved, no-op");
                return Some(alarm.clone());
            }
            tracing::warn!(alarm_id, "resolve: unknown alarm");
            return None;
        };

        // The id is re-checked under the same shard lock correlate()
        // takes for this key: the index read may be stale when a
        // concurrent resolve freed the key and a new alarm took it
        // over, and that alarm must be left untouched.
        let removed = self.active.remove_if(&key, |_, alarm| alarm.id == alarm_id);
        let Some((_, mut alarm)) = removed else {
            return self.resolved.get(alarm_id).map(|a| a.clone());
        };
        if !can_transition(alarm.state, AlarmState::Resolved) {
            tracing::warn!(alarm_id = %alarm.id, state = %alarm.state, "invalid resolve transition");
            self.active.insert(key, alarm);
            return None;
        }
        alarm.state = AlarmState::Resolved;
        alarm.updated_at = Utc::now();
        self.index.remove(alarm_id);
        self.resolved.insert(alarm.id.clone(), alarm.clone());
        tracing::info!(alarm_id = %alarm.id, key = %alarm.correlation_key, "alarm resolved");

        self.emit(&AlarmTransition {
            alarm: alarm.clone(),
            action: TransitionAction::Resolved,
        })
        .await;
        Some(alarm)
    }

    /// Manually override an active alarm's severity. The SLA deadline
    /// is left untouched; only events and the sweep change lifecycle.
    pub async fn set_severity(&self, alarm_id: &str, severity: Severity) -> Option<Alarm> {
        let key = self.index.get(alarm_id).map(|k| k.clone())?;
        let snapshot = {
            let mut alarm = self.active.get_mut(&key)?;
            if alarm.id != alarm_id {
                // Stale index read; the key now belongs to a newer alarm.
                return None;
            }
            alarm.severity = severity;
            alarm.updated_at = Utc::now();
            alarm.clone()
        };
        self.emit(&AlarmTransition {
            alarm: snapshot.clone(),
            action: TransitionAction::Updated,
        })
        .await;
        Some(snapshot)
    }

    /// Escalate every active alarm past its SLA deadline. Idempotent:
    /// an already-escalated alarm is skipped. Returns the number of
    /// alarms escalated by this pass.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let mut transitions = Vec::new();
        for mut entry in self.active.iter_mut() {
            let alarm = entry.value_mut();
            if alarm.state == AlarmState::Active && alarm.sla_deadline < now {
                alarm.state = AlarmState::Escalated;
                alarm.updated_at = now;
                tracing::warn!(
                    alarm_id = %alarm.id,
                    severity = %alarm.severity,
                    deadline = %alarm.sla_deadline,
                    "alarm breached SLA deadline, escalating"
                );
                transitions.push(AlarmTransition {
                    alarm: alarm.clone(),
                    action: TransitionAction::Escalated,
                });
            }
        }
        for transition in &transitions {
            self.emit(transition).await;
        }
        transitions.len()
    }

    /// Alarm by id, active or resolved.
    pub fn get_alarm(&self, alarm_id: &str) -> Option<Alarm> {
        // Clone the key out so no index guard is held while the active
        // map's shard lock is taken; correlate() locks in the opposite
        // order.
        let key = self.index.get(alarm_id).map(|k| k.clone());
        if let Some(key) = key {
            if let Some(alarm) = self.active.get(&key) {
                return Some(alarm.clone());
            }
        }
        self.resolved.get(alarm_id).map(|a| a.clone())
    }

    /// Active alarm for a correlation key, if any.
    pub fn active_alarm(&self, correlation_key: &str) -> Option<Alarm> {
        self.active.get(correlation_key).map(|a| a.clone())
    }

    /// Snapshot of all active (non-resolved) alarms.
    pub fn active_alarms(&self) -> Vec<Alarm> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    async fn emit(&self, transition: &AlarmTransition) {
        let subscribers = self.subscribers.read().unwrap().clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_transition(transition).await {
                tracing::error!(
                    alarm_id = %transition.alarm.id,
                    action = %transition.action,
                    error = %e,
                    "alarm subscriber callback failed"
                );
            }
        }
    }
}

/// Default correlation key: `tenant|site|area|type`, with the source
/// subtype preferred over the broad type when present.
fn correlation_key(event: &Event) -> String {
    let tenant = event.tenant.as_deref().unwrap_or("default");
    let site = event.site.as_deref().unwrap_or("default");
    let area = event
        .location
        .area_id
        .as_deref()
        .or(event.location.floor.as_deref())
        .unwrap_or("unknown");
    let kind = event
        .source
        .subtype
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(if event.source.kind.is_empty() {
            "unknown"
        } else {
            event.source.kind.as_str()
        });
    format!("{tenant}|{site}|{area}|{kind}")
}
