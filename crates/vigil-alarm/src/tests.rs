use crate::engine::{AlarmEngine, CorrelateOptions};
use crate::state::SlaPolicy;
use crate::AlarmSubscriber;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use vigil_common::types::{
    AlarmState, AlarmTransition, Event, EventLocation, EventMedia, EventSource, Severity,
    TransitionAction,
};

fn make_event(id: &str, severity: Severity) -> Event {
    Event {
        id: id.to_string(),
        tenant: Some("acme".to_string()),
        site: Some("hq".to_string()),
        source: EventSource {
            kind: "camera".to_string(),
            subtype: Some("intrusion".to_string()),
            ..Default::default()
        },
        observed: Utc::now(),
        ingested: Utc::now(),
        location: EventLocation {
            area_id: Some("lobby".to_string()),
            ..Default::default()
        },
        geometry: None,
        attributes: serde_json::Map::new(),
        media: EventMedia::default(),
        raw: None,
        tags: Vec::new(),
        severity,
        camera_id: None,
        workflow_id: None,
        webhook_responses: Mutex::new(Vec::new()),
    }
}

struct RecordingSubscriber {
    actions: Mutex<Vec<TransitionAction>>,
}

impl RecordingSubscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            actions: Mutex::new(Vec::new()),
        })
    }

    fn actions(&self) -> Vec<TransitionAction> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlarmSubscriber for RecordingSubscriber {
    async fn on_transition(&self, transition: &AlarmTransition) -> anyhow::Result<()> {
        self.actions.lock().unwrap().push(transition.action);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_burst_creates_single_alarm() {
    let engine = Arc::new(AlarmEngine::new(SlaPolicy::default()));
    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let event = make_event(&format!("evt-{i}"), Severity::Warning);
            engine.process_event(&event).await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1, "all events must correlate into one alarm");

    let active = engine.active_alarms();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].event_ids.len(), 16);
    assert_eq!(active[0].state, AlarmState::Active);
}

#[tokio::test]
async fn redelivered_event_is_ignored() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let recording = RecordingSubscriber::new();
    engine.subscribe(recording.clone());

    let event = make_event("evt-1", Severity::Info);
    let first = engine.process_event(&event).await;
    let second = engine.process_event(&event).await;

    assert_eq!(first.id, second.id);
    assert_eq!(second.event_ids, vec!["evt-1".to_string()]);
    assert_eq!(recording.actions(), vec![TransitionAction::Created]);
}

#[tokio::test]
async fn outranking_event_escalates_severity() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let alarm = engine.process_event(&make_event("evt-1", Severity::Info)).await;
    assert_eq!(alarm.severity, Severity::Info);

    let alarm = engine
        .process_event(&make_event("evt-2", Severity::Critical))
        .await;
    assert_eq!(alarm.severity, Severity::Critical);

    // Lower severity never downgrades.
    let alarm = engine
        .process_event(&make_event("evt-3", Severity::Warning))
        .await;
    assert_eq!(alarm.severity, Severity::Critical);
    assert_eq!(alarm.event_ids.len(), 3);
}

#[tokio::test]
async fn resolve_is_idempotent_and_frees_key() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let recording = RecordingSubscriber::new();
    engine.subscribe(recording.clone());

    let alarm = engine.process_event(&make_event("evt-1", Severity::Warning)).await;
    let resolved = engine.resolve(&alarm.id).await.unwrap();
    assert_eq!(resolved.state, AlarmState::Resolved);

    // Second resolve is a no-op, no extra transition.
    let again = engine.resolve(&alarm.id).await.unwrap();
    assert_eq!(again.state, AlarmState::Resolved);
    let resolves = recording
        .actions()
        .into_iter()
        .filter(|a| *a == TransitionAction::Resolved)
        .count();
    assert_eq!(resolves, 1);

    // The key is free again: a new event opens a fresh alarm.
    let fresh = engine.process_event(&make_event("evt-2", Severity::Warning)).await;
    assert_ne!(fresh.id, alarm.id);
    assert_eq!(fresh.event_ids, vec!["evt-2".to_string()]);

    // Both remain queryable by id.
    assert_eq!(engine.get_alarm(&alarm.id).unwrap().state, AlarmState::Resolved);
    assert_eq!(engine.get_alarm(&fresh.id).unwrap().state, AlarmState::Active);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_resolve_never_touches_recycled_key() {
    // Two racing resolves of the same alarm while a new event reclaims
    // the freed key: the replacement alarm must never be resolved by
    // the loser's stale index read.
    for _ in 0..50 {
        let engine = Arc::new(AlarmEngine::new(SlaPolicy::default()));
        let first = engine.process_event(&make_event("evt-1", Severity::Info)).await;
        let key = first.correlation_key.clone();

        let resolve_a = {
            let engine = Arc::clone(&engine);
            let id = first.id.clone();
            tokio::spawn(async move { engine.resolve(&id).await })
        };
        let resolve_b = {
            let engine = Arc::clone(&engine);
            let id = first.id.clone();
            tokio::spawn(async move { engine.resolve(&id).await })
        };
        let correlate = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine.process_event(&make_event("evt-2", Severity::Info)).await
            })
        };

        resolve_a.await.unwrap();
        resolve_b.await.unwrap();
        let second = correlate.await.unwrap();

        assert_eq!(engine.get_alarm(&first.id).unwrap().state, AlarmState::Resolved);
        if second.id != first.id {
            // The key was recycled: the replacement stays active.
            let current = engine
                .active_alarm(&key)
                .expect("replacement alarm must survive the racing resolve");
            assert_eq!(current.id, second.id);
            assert_eq!(current.state, AlarmState::Active);
        }
    }
}

#[tokio::test]
async fn sweep_escalates_breached_alarms_once() {
    let sla = SlaPolicy {
        critical_secs: 0,
        warning_secs: 0,
        info_secs: 0,
    };
    let engine = AlarmEngine::new(sla);
    let recording = RecordingSubscriber::new();
    engine.subscribe(recording.clone());

    let alarm = engine.process_event(&make_event("evt-1", Severity::Critical)).await;
    let later = Utc::now() + ChronoDuration::seconds(1);

    assert_eq!(engine.sweep_once(later).await, 1);
    assert_eq!(engine.sweep_once(later).await, 0, "sweep must be idempotent");

    let escalated = engine.get_alarm(&alarm.id).unwrap();
    assert_eq!(escalated.state, AlarmState::Escalated);

    // An escalated alarm still resolves.
    let resolved = engine.resolve(&alarm.id).await.unwrap();
    assert_eq!(resolved.state, AlarmState::Resolved);
    assert_eq!(
        recording.actions(),
        vec![
            TransitionAction::Created,
            TransitionAction::Escalated,
            TransitionAction::Resolved
        ]
    );
}

#[tokio::test]
async fn sweep_leaves_alarms_within_deadline_alone() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let alarm = engine.process_event(&make_event("evt-1", Severity::Info)).await;
    assert_eq!(engine.sweep_once(Utc::now()).await, 0);
    assert_eq!(engine.get_alarm(&alarm.id).unwrap().state, AlarmState::Active);
}

#[tokio::test]
async fn explicit_correlation_key_overrides_derivation() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let opts = CorrelateOptions {
        correlation_key: Some("custom-key".to_string()),
        ..Default::default()
    };
    let alarm = engine
        .correlate(&make_event("evt-1", Severity::Info), opts)
        .await;
    assert_eq!(alarm.correlation_key, "custom-key");
    assert!(engine.active_alarm("custom-key").is_some());
}

#[tokio::test]
async fn distinct_areas_open_distinct_alarms() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let a = engine.process_event(&make_event("evt-1", Severity::Info)).await;

    let mut other = make_event("evt-2", Severity::Info);
    other.location.area_id = Some("garage".to_string());
    let b = engine.process_event(&other).await;

    assert_ne!(a.id, b.id);
    assert_eq!(engine.active_alarms().len(), 2);
}

#[tokio::test]
async fn correlate_options_override_severity_and_runbook() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let opts = CorrelateOptions {
        severity: Some(Severity::Critical),
        runbook: Some("rb-intrusion".to_string()),
        correlation_key: None,
    };
    let alarm = engine
        .correlate(&make_event("evt-1", Severity::Info), opts)
        .await;
    assert_eq!(alarm.severity, Severity::Critical);
    assert_eq!(alarm.runbook_id.as_deref(), Some("rb-intrusion"));
    // Critical SLA budget is the tightest.
    assert!(alarm.sla_deadline - alarm.created_at <= ChronoDuration::seconds(120));
}

#[tokio::test]
async fn set_severity_overrides_and_notifies() {
    let engine = AlarmEngine::new(SlaPolicy::default());
    let recording = RecordingSubscriber::new();
    engine.subscribe(recording.clone());

    let alarm = engine.process_event(&make_event("evt-1", Severity::Info)).await;
    let updated = engine.set_severity(&alarm.id, Severity::Critical).await.unwrap();
    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(
        recording.actions(),
        vec![TransitionAction::Created, TransitionAction::Updated]
    );

    assert!(engine.set_severity("alm_missing", Severity::Info).await.is_none());
}
