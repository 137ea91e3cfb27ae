//! Removing children the definition no longer declares.

use canopy_core::{Definition, Phase};
use tracing::{debug, info};

use crate::context::ReconcileContext;
use crate::error::{Error, Result, WriteOperation};
use crate::reason;
use crate::reconciler::Reconciler;
use crate::status::StatusDraft;
use crate::types::ChildSet;

impl Reconciler {
    /// Delete every live child whose declared name is gone from `definition`, plus any
    /// surplus child sharing a declared name with another.
    ///
    /// Returns the declared names of the children actually deleted; an already-missing
    /// child counts as gone, not deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] on the first failed delete, after a best-effort
    /// `ChildNotDeleted` status write with phase `Failed`.
    pub(crate) async fn prune_orphans(
        &self,
        ctx: &ReconcileContext,
        definition: &Definition,
        children: &ChildSet,
        draft: &mut StatusDraft,
    ) -> Result<Vec<String>> {
        let orphans = children
            .iter()
            .filter(|(name, _)| !definition.declares(name))
            .chain(children.surplus());

        let mut deleted = Vec::new();
        for (name, child) in orphans {
            info!(parent = %draft.parent(), name, child = %child.key(), "Deleting orphaned child");
            match ctx.run(self.store.delete_child(ctx, &child.key())).await {
                Ok(()) => deleted.push(name.to_string()),
                Err(e) if e.is_not_found() => {
                    debug!(child = %child.key(), "Orphaned child already gone");
                }
                Err(source) => {
                    self.record_failure(
                        ctx,
                        draft,
                        Phase::Failed,
                        reason::CHILD_NOT_DELETED,
                        format!("Child {} cannot be deleted", child.name()),
                    )
                    .await;
                    return Err(Error::store_write(WriteOperation::Delete, child.name(), source));
                }
            }
        }

        Ok(deleted)
    }
}
