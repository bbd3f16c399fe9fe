use chrono::Duration;
use serde::{Deserialize, Serialize};
use vigil_common::types::{AlarmState, Severity};

/// Valid lifecycle transitions.
///
/// `NEW → ACTIVE → (ESCALATED) → RESOLVED`. `New` is transient: it is
/// assigned on creation and promoted to `Active` before the alarm
/// becomes visible. `Resolved` is terminal.
pub fn can_transition(from: AlarmState, to: AlarmState) -> bool {
    use AlarmState::{Active, Escalated, New, Resolved};
    matches!(
        (from, to),
        (New, Active) | (Active, Escalated) | (Active, Resolved) | (Escalated, Resolved)
    )
}

/// Per-severity SLA budget: how long an alarm may stay unresolved
/// before the sweep escalates it. Policy, not constant — override per
/// deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPolicy {
    #[serde(default = "default_critical_secs")]
    pub critical_secs: u64,
    #[serde(default = "default_warning_secs")]
    pub warning_secs: u64,
    #[serde(default = "default_info_secs")]
    pub info_secs: u64,
}

fn default_critical_secs() -> u64 {
    120
}

fn default_warning_secs() -> u64 {
    900
}

fn default_info_secs() -> u64 {
    3600
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            critical_secs: default_critical_secs(),
            warning_secs: default_warning_secs(),
            info_secs: default_info_secs(),
        }
    }
}

impl SlaPolicy {
    pub fn deadline(&self, severity: Severity) -> Duration {
        let secs = match severity {
            Severity::Critical => self.critical_secs,
            Severity::Warning => self.warning_secs,
            Severity::Info => self.info_secs,
        };
        Duration::seconds(secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_is_terminal() {
        for to in [
            AlarmState::New,
            AlarmState::Active,
            AlarmState::Escalated,
            AlarmState::Resolved,
        ] {
            assert!(!can_transition(AlarmState::Resolved, to));
        }
    }

    #[test]
    fn escalated_can_only_resolve() {
        assert!(can_transition(AlarmState::Escalated, AlarmState::Resolved));
        assert!(!can_transition(AlarmState::Escalated, AlarmState::Active));
        assert!(!can_transition(AlarmState::Escalated, AlarmState::Escalated));
    }

    #[test]
    fn sla_deadline_scales_with_severity() {
        let policy = SlaPolicy::default();
        assert!(policy.deadline(Severity::Critical) < policy.deadline(Severity::Warning));
        assert!(policy.deadline(Severity::Warning) < policy.deadline(Severity::Info));
    }
}
