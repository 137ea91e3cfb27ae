//! Lifecycle phases and reason-coded status conditions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse lifecycle state of a parent or child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Init,
    Pending,
    Progressing,
    Succeeded,
    Failed,
    Aborted,
}

impl Phase {
    pub fn is_progressing(&self) -> bool {
        matches!(self, Self::Progressing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Init => "Init",
            Self::Pending => "Pending",
            Self::Progressing => "Progressing",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
        };
        f.write_str(text)
    }
}

/// Tri-state health of a condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// Reason-coded condition attached to a parent's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl Condition {
    /// A fresh condition of the given type with status `Unknown`.
    pub fn unknown(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: kind.into(),
            status: ConditionStatus::Unknown,
            reason: String::new(),
            message: String::new(),
            last_transition_time: now,
            last_update_time: now,
        }
    }

    /// Return the condition with a new status, reason and message.
    ///
    /// Timestamps only move when something actually changed, so re-applying the
    /// same outcome yields an identical condition.
    #[must_use]
    pub fn updated(
        mut self,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let message = message.into();
        if self.status == status && self.reason == reason && self.message == message {
            return self;
        }

        let now = Utc::now();
        if self.status != status {
            self.last_transition_time = now;
        }
        self.last_update_time = now;
        self.status = status;
        self.reason = reason;
        self.message = message;
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Find the condition of the given type or initialise an `Unknown` one.
pub fn get_or_init_condition(conditions: &[Condition], kind: &str) -> Condition {
    conditions
        .iter()
        .find(|c| c.kind == kind)
        .cloned()
        .unwrap_or_else(|| Condition::unknown(kind))
}

/// Insert or replace the condition with the same type.
pub fn merge_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_init_returns_unknown() {
        let cond = get_or_init_condition(&[], "EnsureChildren");
        assert_eq!(cond.kind, "EnsureChildren");
        assert_eq!(cond.status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_updated_is_stable_for_same_outcome() {
        let cond = Condition::unknown("EnsureChildren").updated(
            ConditionStatus::True,
            "InstallationsInstalled",
            "ok",
        );
        let again = cond
            .clone()
            .updated(ConditionStatus::True, "InstallationsInstalled", "ok");
        assert_eq!(cond, again);
    }

    #[test]
    fn test_updated_moves_transition_time_on_status_change() {
        let mut cond = Condition::unknown("EnsureChildren");
        let epoch = DateTime::<Utc>::default();
        cond.last_transition_time = epoch;
        cond.last_update_time = epoch;

        let cond = cond.updated(ConditionStatus::False, "ChildNotFound", "gone");
        assert!(cond.last_transition_time > epoch);
        assert_eq!(cond.reason, "ChildNotFound");
    }

    #[test]
    fn test_merge_replaces_by_type() {
        let mut conditions = vec![Condition::unknown("A"), Condition::unknown("B")];
        merge_condition(
            &mut conditions,
            Condition::unknown("B").updated(ConditionStatus::True, "Done", ""),
        );
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().any(|c| c.kind == "B" && c.is_true()));

        merge_condition(&mut conditions, Condition::unknown("C"));
        assert_eq!(conditions.len(), 3);
    }
}
