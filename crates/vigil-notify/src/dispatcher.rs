use crate::pool::DispatchPool;
use crate::{AutomationHandler, Notifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use vigil_common::types::Event;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum handler invocations running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Pending dispatches beyond this bound drop the oldest entry.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Hard cap on a single handler invocation. The default leaves
    /// room for the webhook handler's full retry envelope (three 10s
    /// requests plus 1s+2s backoff).
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// How long in-flight dispatches may finish during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    256
}

fn default_handler_timeout_secs() -> u64 {
    45
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
            handler_timeout_secs: default_handler_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Fans matched rule actions out to registered handlers.
///
/// Handler invocations run on the bounded [`DispatchPool`], off the
/// rule-evaluation path: `notify` and `automation` only enqueue and
/// return immediately. Handler errors are logged, never propagated.
pub struct Dispatcher {
    notifiers: RwLock<HashMap<String, Arc<dyn Notifier>>>,
    automations: RwLock<HashMap<String, Arc<dyn AutomationHandler>>>,
    pool: DispatchPool,
}

impl Dispatcher {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            notifiers: RwLock::new(HashMap::new()),
            automations: RwLock::new(HashMap::new()),
            pool: DispatchPool::new(
                config.max_concurrent,
                config.queue_capacity,
                Duration::from_secs(config.handler_timeout_secs),
                Duration::from_secs(config.shutdown_grace_secs),
            ),
        }
    }

    /// Binds a notification handler to a channel type name.
    /// The last registration for a name wins.
    pub fn register_notifier(&self, channel: &str, handler: Arc<dyn Notifier>) {
        tracing::info!(channel, "registered notifier");
        self.notifiers
            .write()
            .unwrap()
            .insert(channel.to_string(), handler);
    }

    /// Binds an automation handler to an action name.
    /// The last registration for a name wins.
    pub fn register_automation(&self, action: &str, handler: Arc<dyn AutomationHandler>) {
        tracing::info!(action, "registered automation");
        self.automations
            .write()
            .unwrap()
            .insert(action.to_string(), handler);
    }

    /// Enqueues one delivery per channel token, in order.
    ///
    /// Tokens split on `:` into `(channel_type, target)`. Unknown
    /// channel types are logged and skipped.
    pub fn notify(&self, channels: &[String], message: &str, event: &Arc<Event>) {
        for token in channels {
            let (kind, target) = match token.split_once(':') {
                Some((kind, target)) => (kind.to_string(), Some(target.to_string())),
                None => (token.clone(), None),
            };
            let handler = self.notifiers.read().unwrap().get(&kind).cloned();
            let Some(handler) = handler else {
                tracing::warn!(channel = %kind, "unknown notification channel, skipping");
                continue;
            };
            let message = message.to_string();
            let event = Arc::clone(event);
            self.pool.submit(format!("notify:{kind}"), async move {
                if let Err(e) = handler.send(&message, target.as_deref(), &event).await {
                    tracing::warn!(
                        channel = handler.name(),
                        event_id = %event.id,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            });
        }
    }

    /// Enqueues an automation invocation. Unknown action names are
    /// logged and skipped.
    pub fn automation(&self, action: &str, params: &Value, event: &Arc<Event>) {
        let handler = self.automations.read().unwrap().get(action).cloned();
        let Some(handler) = handler else {
            tracing::warn!(action, "unknown automation action, skipping");
            return;
        };
        let params = params.clone();
        let event = Arc::clone(event);
        self.pool.submit(format!("automation:{action}"), async move {
            if let Err(e) = handler.run(&params, &event).await {
                tracing::warn!(
                    action = handler.name(),
                    event_id = %event.id,
                    error = %e,
                    "automation failed"
                );
            }
        });
    }

    /// Waits until all enqueued dispatches have completed.
    pub async fn drain(&self) {
        self.pool.idle().await;
    }

    /// Stops the pool, giving in-flight dispatches the configured
    /// grace period before force-cancelling them.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
