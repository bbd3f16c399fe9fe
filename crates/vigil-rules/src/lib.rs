//! Event rule engine: evaluates canonical detection events against a
//! registry of declarative rules and triggers their actions.
//!
//! Rules are loaded from a YAML definition language ([`dsl`]), matched
//! through a pure condition tree ([`condition`]), throttled per rule by
//! cooldown windows ([`cooldown`]), and on match fan their actions out
//! to the alarm correlation engine and the action dispatcher
//! ([`engine`]). Nothing raised by condition evaluation or action
//! execution ever propagates out of `evaluate_event`.

pub mod condition;
pub mod cooldown;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod rule;
pub mod template;
