use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-rule last-trigger timestamps.
///
/// Entries are created on first trigger, refreshed on each subsequent
/// trigger, and never deleted (bounded by rule count). The whole map is
/// guarded by one mutex; the critical sections are lookups only.
pub struct CooldownTracker {
    last_triggered: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            last_triggered: Mutex::new(HashMap::new()),
        }
    }

    /// True when the rule triggered less than `cooldown_secs` ago.
    pub fn suppressed(&self, rule_id: &str, cooldown_secs: u64, now: DateTime<Utc>) -> bool {
        if cooldown_secs == 0 {
            return false;
        }
        self.last_triggered
            .lock()
            .unwrap()
            .get(rule_id)
            .is_some_and(|last| now - *last < Duration::seconds(cooldown_secs as i64))
    }

    /// Record a trigger at `now`.
    pub fn touch(&self, rule_id: &str, now: DateTime<Utc>) {
        self.last_triggered
            .lock()
            .unwrap()
            .insert(rule_id.to_string(), now);
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a duration string `<integer><s|m|h>` into seconds.
/// Unparseable strings yield a zero-length cooldown (never block).
pub fn parse_duration(s: &str) -> u64 {
    let s = s.trim();
    let parsed = s.char_indices().last().and_then(|(idx, unit)| {
        let value: u64 = s[..idx].parse().ok()?;
        match unit {
            's' => Some(value),
            'm' => Some(value * 60),
            'h' => Some(value * 3600),
            _ => None,
        }
    });
    match parsed {
        Some(secs) => secs,
        None => {
            tracing::warn!(duration = s, "unparseable cooldown duration, using 0s");
            0
        }
    }
}
