//! Creating and updating declared children.

use canopy_core::{
    ChildDeclaration, ChildResource, ChildSpec, Definition, Mapping, ObjectMeta, ParentResource,
    Phase, TrackedChild,
};
use tracing::{debug, info};

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::reason;
use crate::reconciler::Reconciler;
use crate::status::StatusDraft;
use crate::store::{create_or_update, OperationResult};

/// Generate-name prefix for a child: `{definition}-{declared}-`, cut to `max` characters.
pub fn generate_name_prefix(definition: &str, declared: &str, max: usize) -> String {
    format!("{definition}-{declared}-").chars().take(max).collect()
}

/// Identity mappings for definition fields the declaration leaves unmapped.
///
/// An import field counts as mapped when a declared import targets it; an export
/// field when a declared export reads from it.
pub fn default_mappings(
    declaration: &ChildDeclaration,
    definition: &Definition,
) -> (Vec<Mapping>, Vec<Mapping>) {
    let imports = definition
        .imports
        .iter()
        .filter(|field| !declaration.imports.iter().any(|m| m.to == field.key))
        .map(|field| Mapping::identity(field.key.clone()))
        .collect();
    let exports = definition
        .exports
        .iter()
        .filter(|field| !declaration.exports.iter().any(|m| m.from == field.key))
        .map(|field| Mapping::identity(field.key.clone()))
        .collect();
    (imports, exports)
}

impl Reconciler {
    /// Create the child for `declaration`, or bring `existing` in line with it.
    ///
    /// A newly created child is appended to the tracked list and the parent status is
    /// persisted.
    ///
    /// # Errors
    ///
    /// - [`Error::DefinitionResolution`] if the child's definition cannot be resolved
    /// - [`Error::Upsert`] if the create-or-update call fails
    /// - [`Error::StatusPersist`] if the child was created but could not be tracked
    pub(crate) async fn upsert_child(
        &self,
        ctx: &ReconcileContext,
        parent: &ParentResource,
        definition: &Definition,
        declaration: &ChildDeclaration,
        existing: Option<&ChildResource>,
        draft: &mut StatusDraft,
    ) -> Result<(ChildResource, OperationResult)> {
        let target = match existing {
            Some(child) => ChildResource::new(ObjectMeta::named(
                child.meta.namespace.clone(),
                child.meta.name.clone(),
            )),
            None => ChildResource::new(ObjectMeta::generated(
                parent.meta.namespace.clone(),
                generate_name_prefix(
                    &definition.name,
                    &declaration.name,
                    self.config.max_generate_name_prefix,
                ),
            )),
        };

        let child_definition = match ctx
            .run(self.registry.get_definition(&declaration.definition_ref))
            .await
        {
            Ok(found) => found,
            Err(source) => {
                self.record_failure(
                    ctx,
                    draft,
                    Phase::Failed,
                    reason::DEFINITION_NOT_FOUND,
                    format!(
                        "Definition {} for {} cannot be found",
                        declaration.definition_ref, declaration.name
                    ),
                )
                .await;
                return Err(Error::definition_resolution(
                    declaration.name.clone(),
                    declaration.definition_ref.clone(),
                    source,
                ));
            }
        };

        let mut spec = ChildSpec::from_declaration(declaration);
        if self.config.default_mappings {
            let (imports, exports) = default_mappings(declaration, &child_definition);
            spec.default_imports = imports;
            spec.default_exports = exports;
        }

        let label = self.config.encompassed_by_label.clone();
        let ownership = self.ownership.as_ref();
        let result = create_or_update(ctx, self.store.as_ref(), target, |child| {
            child.meta.labels.insert(label, parent.meta.name.clone());
            ownership.set_owner(parent, child)?;
            child.spec = spec;
            Ok(())
        })
        .await;

        let (child, operation) = match result {
            Ok(done) => done,
            Err(source) => {
                self.record_failure(
                    ctx,
                    draft,
                    Phase::Failed,
                    reason::CREATING_FAILED,
                    format!("Child {} cannot be created", declaration.name),
                )
                .await;
                return Err(Error::upsert(declaration.name.clone(), source));
            }
        };

        match operation {
            OperationResult::Created => {
                info!(parent = %draft.parent(), name = %declaration.name, child = %child.key(), "Created child");
                track(&mut draft.status.children, &declaration.name, &child);
                draft
                    .persist(ctx, self.store.as_ref())
                    .await
                    .map_err(|e| Error::status_persist(draft.parent().clone(), e))?;
            }
            OperationResult::Updated => {
                info!(parent = %draft.parent(), name = %declaration.name, child = %child.key(), "Updated child");
            }
            OperationResult::Unchanged => {
                debug!(parent = %draft.parent(), name = %declaration.name, "Child already up to date");
            }
        }

        Ok((child, operation))
    }
}

/// Point the tracked entry for `name` at `child`, adding one if there is none.
fn track(tracked: &mut Vec<TrackedChild>, name: &str, child: &ChildResource) {
    let entry = TrackedChild::new(name, child);
    match tracked.iter_mut().find(|t| t.name == name) {
        Some(existing) => *existing = entry,
        None => tracked.push(entry),
    }
}
