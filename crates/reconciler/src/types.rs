//! Core types for the reconciler.

use std::collections::HashMap;
use std::fmt;

use canopy_core::{ChildResource, ParentStatus};

/// Live children of a parent keyed by declared name, in tracked-list order.
///
/// A declared name tracked more than once keeps its first child here; later, different
/// objects under that name are kept aside as surplus so they can be removed. A second
/// reference to an object already in the set is not a child at all and is rejected.
#[derive(Debug, Clone, Default)]
pub struct ChildSet {
    order: Vec<String>,
    by_name: HashMap<String, ChildResource>,
    surplus: Vec<(String, ChildResource)>,
}

impl ChildSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child under its declared name.
    ///
    /// Returns `false`, leaving the set unchanged, if the same object is already present.
    pub fn insert(&mut self, name: impl Into<String>, child: ChildResource) -> bool {
        let key = child.key();
        if self.all().any(|(_, known)| known.key() == key) {
            return false;
        }
        let name = name.into();
        if self.by_name.contains_key(&name) {
            self.surplus.push((name, child));
        } else {
            self.order.push(name.clone());
            self.by_name.insert(name, child);
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<&ChildResource> {
        self.by_name.get(name)
    }

    /// Children in tracked-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildResource)> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name).map(|child| (name.as_str(), child)))
    }

    /// Extra children found for names that were already present.
    pub fn surplus(&self) -> impl Iterator<Item = (&str, &ChildResource)> {
        self.surplus.iter().map(|(name, child)| (name.as_str(), child))
    }

    /// Every known child, primary ones first.
    pub fn all(&self) -> impl Iterator<Item = (&str, &ChildResource)> {
        self.iter().chain(self.surplus())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Why a pass stopped before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// A child has a pending-deletion marker.
    Deleting,
    /// A child is still progressing.
    Progressing,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleting => f.write_str("deleting"),
            Self::Progressing => f.write_str("progressing"),
        }
    }
}

/// How a successful pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Mutation deferred until the named child settles.
    Waiting { child: String, reason: WaitReason },
    /// Orphans were deleted, listed by declared name; creating and updating waits for
    /// the next pass.
    Pruned { deleted: Vec<String> },
    /// All declared children are in place.
    Converged {
        created: Vec<String>,
        updated: Vec<String>,
    },
}

impl PassOutcome {
    /// Whether the pass changed no children.
    pub fn is_quiescent(&self) -> bool {
        match self {
            Self::Waiting { .. } => true,
            Self::Pruned { deleted } => deleted.is_empty(),
            Self::Converged { created, updated } => created.is_empty() && updated.is_empty(),
        }
    }
}

/// Result of a successful reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub outcome: PassOutcome,
    /// Parent status as last persisted.
    pub status: ParentStatus,
    /// Parent resource version after the pass's last status write.
    pub resource_version: u64,
}

impl ReconcileReport {
    pub fn converged(&self) -> bool {
        matches!(self.outcome, PassOutcome::Converged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ObjectMeta;

    fn child(name: &str) -> ChildResource {
        ChildResource::new(ObjectMeta::named("ns", name))
    }

    #[test]
    fn test_child_set_keeps_insertion_order() {
        let mut set = ChildSet::new();
        set.insert("web", child("root-web-1"));
        set.insert("db", child("root-db-1"));
        set.insert("cache", child("root-cache-1"));

        let names: Vec<&str> = set.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["web", "db", "cache"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_child_set_keeps_surplus_aside() {
        let mut set = ChildSet::new();
        set.insert("db", child("root-db-1"));
        set.insert("db", child("root-db-2"));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("db").map(ChildResource::name), Some("root-db-1"));
        let surplus: Vec<&str> = set.surplus().map(|(_, c)| c.name()).collect();
        assert_eq!(surplus, vec!["root-db-2"]);
        assert_eq!(set.all().count(), 2);
    }

    #[test]
    fn test_child_set_rejects_second_reference_to_same_object() {
        let mut set = ChildSet::new();
        assert!(set.insert("db", child("root-db-1")));
        assert!(!set.insert("db", child("root-db-1")));
        assert!(!set.insert("cache", child("root-db-1")));

        assert_eq!(set.len(), 1);
        assert_eq!(set.surplus().count(), 0);
    }

    #[test]
    fn test_quiescent_outcomes() {
        assert!(PassOutcome::Converged {
            created: vec![],
            updated: vec![]
        }
        .is_quiescent());
        assert!(!PassOutcome::Pruned {
            deleted: vec!["x".to_string()]
        }
        .is_quiescent());
    }
}
