//! Working copy of a parent's status during one pass.

use canopy_core::{
    get_or_init_condition, merge_condition, Condition, ConditionStatus, ObjectKey, ParentResource,
    ParentStatus, Phase,
};

use crate::context::ReconcileContext;
use crate::error::StoreResult;
use crate::store::ResourceStore;

/// Parent status threaded through the stages of a pass.
///
/// Holds the working status next to the last persisted one, so a write only happens
/// when something changed, and the resource version the next write must match.
#[derive(Debug, Clone)]
pub struct StatusDraft {
    parent: ObjectKey,
    resource_version: u64,
    condition_type: String,
    persisted: ParentStatus,
    /// Working status; stages edit this and call [`StatusDraft::persist`].
    pub status: ParentStatus,
}

impl StatusDraft {
    pub fn new(parent: &ParentResource, condition_type: impl Into<String>) -> Self {
        Self {
            parent: parent.key(),
            resource_version: parent.meta.resource_version,
            condition_type: condition_type.into(),
            persisted: parent.status.clone(),
            status: parent.status.clone(),
        }
    }

    pub fn parent(&self) -> &ObjectKey {
        &self.parent
    }

    pub fn resource_version(&self) -> u64 {
        self.resource_version
    }

    /// The reconciler's condition, initialised to `Unknown` if the parent has none.
    pub fn condition(&self) -> Condition {
        get_or_init_condition(&self.status.conditions, &self.condition_type)
    }

    /// Set the phase and store the condition.
    pub fn record(&mut self, phase: Phase, condition: Condition) {
        self.status.phase = phase;
        merge_condition(&mut self.status.conditions, condition);
    }

    /// Record a `False` condition with the given reason and message.
    pub fn record_failure(&mut self, phase: Phase, reason: &str, message: impl Into<String>) {
        let condition = self
            .condition()
            .updated(ConditionStatus::False, reason, message);
        self.record(phase, condition);
    }

    /// Whether the working status differs from what was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.status != self.persisted
    }

    /// Write the working status if it changed.
    ///
    /// # Errors
    ///
    /// Returns the store error; the draft keeps its previous version in that case.
    pub async fn persist(&mut self, ctx: &ReconcileContext, store: &dyn ResourceStore) -> StoreResult<()> {
        if !self.is_dirty() {
            tracing::trace!(parent = %self.parent, "Parent status unchanged, skipping write");
            return Ok(());
        }

        let version = ctx
            .run(store.update_parent_status(ctx, &self.parent, self.resource_version, &self.status))
            .await?;
        self.resource_version = version;
        self.persisted = self.status.clone();
        Ok(())
    }

    /// The status as last persisted.
    pub fn persisted(&self) -> &ParentStatus {
        &self.persisted
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::store::{InMemoryStore, Mutation};

    #[tokio::test]
    async fn test_persist_skips_clean_status() {
        let store = InMemoryStore::new();
        let parent = store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        let mut draft = StatusDraft::new(&parent, "EnsureChildren");

        draft.persist(&ReconcileContext::new(), &store).await.unwrap();
        assert!(store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_writes_and_tracks_version() {
        let store = InMemoryStore::new();
        let parent = store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        let mut draft = StatusDraft::new(&parent, "EnsureChildren");
        draft.record_failure(Phase::Failed, "ChildNotDeleted", "boom");

        let ctx = ReconcileContext::new();
        draft.persist(&ctx, &store).await.unwrap();
        assert!(!draft.is_dirty());
        assert_eq!(
            store.journal().await,
            vec![Mutation::UpdateParentStatus(parent.key())]
        );

        // a second change must use the refreshed version
        draft.record(Phase::Succeeded, draft.condition());
        draft.persist(&ctx, &store).await.unwrap();

        let stored = store.parent(&parent.key()).await.unwrap();
        assert_eq!(stored.status.phase, Phase::Succeeded);
        assert_eq!(stored.meta.resource_version, draft.resource_version());
        let condition = stored.status.condition("EnsureChildren").unwrap();
        assert_eq!(condition.reason, "ChildNotDeleted");
    }
}
