//! Loading the children a parent tracks.

use canopy_core::Phase;
use tracing::{debug, error, info};

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::reason;
use crate::reconciler::Reconciler;
use crate::status::StatusDraft;
use crate::types::ChildSet;

impl Reconciler {
    /// Read every tracked child and drop references to children that no longer exist,
    /// as well as repeated references to a child already read.
    ///
    /// If any reference was dropped, the pruned tracked list is persisted before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChildRead`] for read failures other than absence (after a
    /// best-effort `ChildNotFound` status write), or [`Error::StatusPersist`] if the
    /// pruned list cannot be written.
    pub(crate) async fn load_children(
        &self,
        ctx: &ReconcileContext,
        draft: &mut StatusDraft,
    ) -> Result<ChildSet> {
        let tracked = draft.status.children.clone();
        let mut children = ChildSet::new();
        let mut kept = Vec::with_capacity(tracked.len());

        for entry in tracked.iter() {
            let key = entry.reference.key();
            match ctx.run(self.store.get_child(ctx, &key)).await {
                Ok(child) => {
                    if children.insert(entry.name.clone(), child) {
                        kept.push(entry.clone());
                    } else {
                        debug!(parent = %draft.parent(), name = %entry.name, child = %key, "Dropping duplicate reference to child");
                    }
                }
                Err(e) if e.is_not_found() => {
                    debug!(parent = %draft.parent(), name = %entry.name, child = %key, "Dropping reference to missing child");
                }
                Err(source) => {
                    error!(parent = %draft.parent(), child = %key, error = %source, "Unable to get child");
                    self.record_failure(
                        ctx,
                        draft,
                        Phase::Progressing,
                        reason::CHILD_NOT_FOUND,
                        format!("Child {} not available", entry.reference.name),
                    )
                    .await;
                    return Err(Error::child_read(entry.reference.clone(), source));
                }
            }
        }

        if kept.len() != tracked.len() {
            info!(
                parent = %draft.parent(),
                dropped = tracked.len().saturating_sub(kept.len()),
                "Pruning stale and duplicate child references"
            );
            draft.status.children = kept;
            draft
                .persist(ctx, self.store.as_ref())
                .await
                .map_err(|e| Error::status_persist(draft.parent().clone(), e))?;
        }

        Ok(children)
    }
}
