//! Action dispatch framework with pluggable notification and automation
//! handlers.
//!
//! Matched rule actions are fanned out to registered [`Notifier`] and
//! [`AutomationHandler`] implementations through a bounded-concurrency
//! [`dispatcher::Dispatcher`]. Networked handlers (webhooks) own their
//! retry/backoff policy; a slow or hung handler never stalls the rule
//! evaluation path.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod pool;


use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use vigil_common::types::Event;

pub use dispatcher::{Dispatcher, DispatcherConfig};

/// A notification delivery handler bound to a channel type name
/// (e.g., `"console"`, `"email"`, `"sms"`).
///
/// Handlers are registered in the [`dispatcher::Dispatcher`] at startup;
/// the last registration for a name wins.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the rendered message to `target` (the part of the
    /// channel token after `:`, if any).
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after any handler-internal
    /// retries. Errors are logged by the dispatcher, never propagated
    /// to rule evaluation.
    async fn send(&self, message: &str, target: Option<&str>, event: &Event) -> Result<()>;

    /// Returns the channel type name this handler serves.
    fn name(&self) -> &str;
}

/// A device/automation handler bound to an action name
/// (e.g., `"webhook.send"`, `"ptz.move_to_preset"`).
#[async_trait]
pub trait AutomationHandler: Send + Sync {
    /// Runs the automation with the action's `params` config.
    ///
    /// # Errors
    ///
    /// Returns an error if the automation fails; logged by the
    /// dispatcher, never propagated.
    async fn run(&self, params: &Value, event: &Event) -> Result<()>;

    /// Returns the automation action name this handler serves.
    fn name(&self) -> &str;
}
