use crate::engine::AlarmEngine;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background task that periodically escalates active alarms past
/// their SLA deadline.
pub struct SlaSweeper {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SlaSweeper {
    /// Spawn the sweep loop. Ticks missed while a sweep runs long are
    /// skipped rather than bursted.
    pub fn start(engine: Arc<AlarmEngine>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("sla sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let escalated = engine.sweep_once(Utc::now()).await;
                        if escalated > 0 {
                            tracing::info!(escalated, "sla sweep escalated alarms");
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sla sweeper task join failed");
            }
        }
    }
}
