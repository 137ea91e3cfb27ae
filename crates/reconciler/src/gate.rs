//! Safety gate: no mutation while any child is deleting or progressing.

use crate::types::{ChildSet, WaitReason};

/// First child that forbids mutation this pass, with the reason.
///
/// Scans in tracked order and stops at the first hit.
pub fn blocking_child(children: &ChildSet) -> Option<(&str, WaitReason)> {
    children
        .all()
        .map(|(_, child)| child)
        .find(|child| child.is_busy())
        .map(|child| {
            let reason = if child.meta.is_deleting() {
                WaitReason::Deleting
            } else {
                WaitReason::Progressing
            };
            (child.name(), reason)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{ChildResource, ObjectMeta, Phase};
    use chrono::Utc;

    fn child(name: &str, phase: Phase) -> ChildResource {
        let mut child = ChildResource::new(ObjectMeta::named("ns", name));
        child.status.phase = phase;
        child
    }

    #[test]
    fn test_idle_children_pass() {
        let mut set = ChildSet::new();
        set.insert("a", child("root-a-1", Phase::Succeeded));
        set.insert("b", child("root-b-1", Phase::Failed));
        assert_eq!(blocking_child(&set), None);
    }

    #[test]
    fn test_progressing_child_blocks() {
        let mut set = ChildSet::new();
        set.insert("a", child("root-a-1", Phase::Succeeded));
        set.insert("b", child("root-b-1", Phase::Progressing));
        assert_eq!(
            blocking_child(&set),
            Some(("root-b-1", WaitReason::Progressing))
        );
    }

    #[test]
    fn test_first_blocker_wins() {
        let mut deleting = child("root-a-1", Phase::Succeeded);
        deleting.meta.deletion_timestamp = Some(Utc::now());

        let mut set = ChildSet::new();
        set.insert("a", deleting);
        set.insert("b", child("root-b-1", Phase::Progressing));
        assert_eq!(blocking_child(&set), Some(("root-a-1", WaitReason::Deleting)));
    }

    #[test]
    fn test_empty_set_passes() {
        assert_eq!(blocking_child(&ChildSet::new()), None);
    }
}
