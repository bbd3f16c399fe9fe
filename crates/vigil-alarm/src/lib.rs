//! Alarm correlation engine.
//!
//! Consumes canonical detection events (directly, or via an `alarm`
//! rule action) and groups them into stateful alarms keyed by a
//! correlation key derived from event attributes. Guarantees at most
//! one active alarm per key under arbitrary interleaving, tracks
//! per-severity SLA deadlines, and broadcasts lifecycle transitions to
//! subscribers.

pub mod engine;
pub mod state;
pub mod sweep;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::AlarmTransition;

/// Receives alarm lifecycle transitions, at-least-once, best-effort.
///
/// Used by the surrounding system for live-update broadcast and
/// metrics recording. Callback failures are logged by the engine and
/// never propagated.
#[async_trait]
pub trait AlarmSubscriber: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the subscriber could not consume the
    /// transition; the engine logs it and continues.
    async fn on_transition(&self, transition: &AlarmTransition) -> Result<()>;
}
