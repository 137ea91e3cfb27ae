//! Reconciler implementation.

use std::collections::HashSet;
use std::sync::Arc;

use canopy_core::{ConditionStatus, Definition, ParentResource, Phase};
use tracing::{debug, info, warn};

use crate::compare::needs_update;
use crate::config::ReconcilerConfig;
use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::gate::blocking_child;
use crate::ownership::{OwnerReferenceService, OwnershipService};
use crate::reason;
use crate::registry::DefinitionRegistry;
use crate::status::StatusDraft;
use crate::store::{OperationResult, ResourceStore};
use crate::types::{PassOutcome, ReconcileReport};

/// Drives a parent's children toward the set its definition declares.
///
/// One call to [`Reconciler::reconcile`] is one pass: fetch, gate, prune, upsert,
/// report. A pass never retries; the caller re-runs it on error or external change.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) registry: Arc<dyn DefinitionRegistry>,
    pub(crate) ownership: Arc<dyn OwnershipService>,
    pub(crate) config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        registry: Arc<dyn DefinitionRegistry>,
        ownership: Arc<dyn OwnershipService>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            ownership,
            config,
        }
    }

    /// Start building a reconciler.
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Run one pass for `parent` against an already resolved `definition`.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the pass. The parent's condition and phase have
    /// been updated on a best-effort basis before the error is returned.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        parent: &ParentResource,
        definition: &Definition,
    ) -> Result<ReconcileReport> {
        info!(
            parent = %parent.key(),
            declared = definition.children.len(),
            tracked = parent.status.children.len(),
            "Starting reconciliation"
        );

        let mut draft = StatusDraft::new(parent, self.config.condition_type.clone());
        let children = self.load_children(ctx, &mut draft).await?;

        if let Some((child, wait)) = blocking_child(&children) {
            debug!(parent = %parent.key(), child, reason = %wait, "Not eligible for update");
            let condition = draft.condition();
            draft.record(Phase::Progressing, condition);
            self.persist(ctx, &mut draft).await?;
            let outcome = PassOutcome::Waiting {
                child: child.to_string(),
                reason: wait,
            };
            return Ok(Self::report(outcome, draft));
        }

        let deleted = self
            .prune_orphans(ctx, definition, &children, &mut draft)
            .await?;
        if !deleted.is_empty() {
            info!(parent = %parent.key(), deleted = deleted.len(), "Deleted orphaned children, deferring updates");
            return Ok(Self::report(PassOutcome::Pruned { deleted }, draft));
        }

        let mut created = Vec::new();
        let mut updated = Vec::new();
        let mut seen = HashSet::new();
        for declaration in &definition.children {
            if !seen.insert(declaration.name.as_str()) {
                warn!(parent = %parent.key(), name = %declaration.name, "Ignoring duplicate declaration");
                continue;
            }

            let existing = children.get(&declaration.name);
            if let Some(child) = existing {
                if !needs_update(declaration, &child.spec) {
                    debug!(parent = %parent.key(), name = %declaration.name, "Child up to date");
                    continue;
                }
            }

            let (_, operation) = self
                .upsert_child(ctx, parent, definition, declaration, existing, &mut draft)
                .await?;
            match operation {
                OperationResult::Created => created.push(declaration.name.clone()),
                OperationResult::Updated => updated.push(declaration.name.clone()),
                OperationResult::Unchanged => {}
            }
        }

        let condition = draft.condition().updated(
            ConditionStatus::True,
            reason::INSTALLED,
            "All children are successfully installed",
        );
        let phase = draft.status.phase;
        draft.record(phase, condition);
        self.persist(ctx, &mut draft).await?;

        if created.is_empty() && updated.is_empty() {
            info!(parent = %parent.key(), "Children converged");
        } else {
            info!(
                parent = %parent.key(),
                created = created.len(),
                updated = updated.len(),
                "Reconciliation complete"
            );
        }

        Ok(Self::report(PassOutcome::Converged { created, updated }, draft))
    }

    /// Resolve the parent's own definition, then run one pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefinitionResolution`] if the parent's definition cannot be
    /// resolved (after recording `DefinitionNotFound` with phase `Failed`), otherwise
    /// whatever [`Reconciler::reconcile`] returns.
    pub async fn reconcile_parent(
        &self,
        ctx: &ReconcileContext,
        parent: &ParentResource,
    ) -> Result<ReconcileReport> {
        let reference = &parent.spec.definition_ref;
        match ctx.run(self.registry.get_definition(reference)).await {
            Ok(definition) => self.reconcile(ctx, parent, &definition).await,
            Err(source) => {
                let mut draft = StatusDraft::new(parent, self.config.condition_type.clone());
                self.record_failure(
                    ctx,
                    &mut draft,
                    Phase::Failed,
                    reason::DEFINITION_NOT_FOUND,
                    format!(
                        "Definition {reference} for {} cannot be found",
                        parent.meta.name
                    ),
                )
                .await;
                Err(Error::definition_resolution(
                    parent.meta.name.clone(),
                    reference.clone(),
                    source,
                ))
            }
        }
    }

    /// Record a failure on the parent and try to persist it.
    ///
    /// A failing write is logged and otherwise ignored so that the caller can return
    /// the error that triggered it.
    pub(crate) async fn record_failure(
        &self,
        ctx: &ReconcileContext,
        draft: &mut StatusDraft,
        phase: Phase,
        reason: &str,
        message: String,
    ) {
        draft.record_failure(phase, reason, message);
        if let Err(e) = draft.persist(ctx, self.store.as_ref()).await {
            warn!(parent = %draft.parent(), reason, error = %e, "Unable to record failure on parent status");
        }
    }

    async fn persist(&self, ctx: &ReconcileContext, draft: &mut StatusDraft) -> Result<()> {
        draft
            .persist(ctx, self.store.as_ref())
            .await
            .map_err(|e| Error::status_persist(draft.parent().clone(), e))
    }

    fn report(outcome: PassOutcome, draft: StatusDraft) -> ReconcileReport {
        ReconcileReport {
            outcome,
            resource_version: draft.resource_version(),
            status: draft.persisted().clone(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ResourceStore>>,
    registry: Option<Arc<dyn DefinitionRegistry>>,
    ownership: Option<Arc<dyn OwnershipService>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            registry: None,
            ownership: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the resource store.
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the definition registry.
    pub fn with_registry(mut self, registry: Arc<dyn DefinitionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set a custom ownership service.
    pub fn with_ownership(mut self, ownership: Arc<dyn OwnershipService>) -> Self {
        self.ownership = Some(ownership);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable inherited default mappings.
    pub fn default_mappings(mut self, enabled: bool) -> Self {
        self.config.default_mappings = enabled;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the store or registry is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Resource store is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| Error::invalid_config("Definition registry is required"))?;
        let ownership = self
            .ownership
            .unwrap_or_else(|| Arc::new(OwnerReferenceService::new()));
        self.config.validate()?;

        Ok(Reconciler::new(store, registry, ownership, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::store::{Fault, InMemoryStore, Mutation, Operation};
    use crate::types::WaitReason;
    use canopy_core::{ChildDeclaration, DefinitionRef, Mapping, ObjectKey};

    struct Fixture {
        store: Arc<InMemoryStore>,
        registry: Arc<InMemoryRegistry>,
        reconciler: Reconciler,
    }

    async fn setup() -> Fixture {
        let store = InMemoryStore::new_arc();
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .register(DefinitionRef::new("db/v1"), Definition::new("db"))
            .await;
        registry
            .register(DefinitionRef::new("web/v1"), Definition::new("web"))
            .await;
        let reconciler = Reconciler::builder()
            .with_store(store.clone())
            .with_registry(registry.clone())
            .build()
            .unwrap();
        Fixture {
            store,
            registry,
            reconciler,
        }
    }

    fn definition() -> Definition {
        Definition::new("root")
            .with_child(ChildDeclaration::new("db", "db/v1"))
            .with_child(ChildDeclaration::new("web", "web/v1"))
    }

    async fn reload(store: &InMemoryStore, key: &ObjectKey) -> ParentResource {
        store.parent(key).await.unwrap()
    }

    #[tokio::test]
    async fn test_reconcile_creates_declared_children() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;

        let report = fx
            .reconciler
            .reconcile(&ReconcileContext::new(), &parent, &definition())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            PassOutcome::Converged {
                created: vec!["db".to_string(), "web".to_string()],
                updated: vec![],
            }
        );
        let names: Vec<&str> = report.status.children.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["db", "web"]);
        assert_eq!(fx.store.children().await.len(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_is_quiet() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        let ctx = ReconcileContext::new();
        fx.reconciler
            .reconcile(&ctx, &parent, &definition())
            .await
            .unwrap();

        fx.store.clear_journal().await;
        let parent = reload(&fx.store, &parent.key()).await;
        let report = fx
            .reconciler
            .reconcile(&ctx, &parent, &definition())
            .await
            .unwrap();

        assert!(report.outcome.is_quiescent());
        assert!(fx.store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_child_definition_fails_pass() {
        let fx = setup().await;
        fx.registry.remove(&DefinitionRef::new("web/v1")).await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;

        let err = fx
            .reconciler
            .reconcile(&ReconcileContext::new(), &parent, &definition())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DefinitionResolution { ref name, .. } if name == "web"));

        let stored = reload(&fx.store, &parent.key()).await;
        assert_eq!(stored.status.phase, Phase::Failed);
        let condition = stored.status.condition("EnsureChildren").unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, reason::DEFINITION_NOT_FOUND);
        // db was created before web failed and stays tracked
        assert_eq!(stored.status.children.len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_reports_creating_failed() {
        let fx = setup().await;
        fx.store
            .inject_fault(Fault::on(Operation::CreateChild).for_name("root-db-"))
            .await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;

        let err = fx
            .reconciler
            .reconcile(&ReconcileContext::new(), &parent, &definition())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upsert { ref name, .. } if name == "db"));

        let stored = reload(&fx.store, &parent.key()).await;
        let condition = stored.status.condition("EnsureChildren").unwrap();
        assert_eq!(condition.reason, reason::CREATING_FAILED);
        assert!(fx.store.children().await.is_empty());
    }

    #[tokio::test]
    async fn test_tracking_failure_is_returned_after_create() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        fx.store
            .inject_fault(Fault::on(Operation::UpdateParentStatus))
            .await;

        let err = fx
            .reconciler
            .reconcile(&ReconcileContext::new(), &parent, &definition())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusPersist { .. }));
        assert_eq!(fx.store.children().await.len(), 1);
    }

    #[tokio::test]
    async fn test_progressing_child_defers_pass() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        let ctx = ReconcileContext::new();
        let report = fx
            .reconciler
            .reconcile(&ctx, &parent, &definition())
            .await
            .unwrap();
        let db = report.status.tracked("db").unwrap().reference.key();
        fx.store.set_child_phase(&db, Phase::Progressing).await.unwrap();
        fx.store.clear_journal().await;

        let parent = reload(&fx.store, &parent.key()).await;
        let changed = definition().with_child(ChildDeclaration::new("cache", "db/v1"));
        let report = fx.reconciler.reconcile(&ctx, &parent, &changed).await.unwrap();

        assert_eq!(
            report.outcome,
            PassOutcome::Waiting {
                child: db.name.clone(),
                reason: WaitReason::Progressing,
            }
        );
        assert_eq!(report.status.phase, Phase::Progressing);
        assert!(fx.store.child_mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_parent_resolves_definition() {
        let fx = setup().await;
        fx.registry
            .register(DefinitionRef::new("root/v1"), definition())
            .await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;

        let report = fx
            .reconciler
            .reconcile_parent(&ReconcileContext::new(), &parent)
            .await
            .unwrap();
        assert!(report.converged());
    }

    #[tokio::test]
    async fn test_reconcile_parent_without_definition() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v9"))
            .await;

        let err = fx
            .reconciler
            .reconcile_parent(&ReconcileContext::new(), &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DefinitionResolution { .. }));
        assert_eq!(
            fx.store.journal().await,
            vec![Mutation::UpdateParentStatus(parent.key())]
        );
    }

    #[tokio::test]
    async fn test_duplicate_declarations_create_one_child() {
        let fx = setup().await;
        let parent = fx
            .store
            .insert_parent(ParentResource::new("ns", "root", "root/v1"))
            .await;
        let def = Definition::new("root")
            .with_child(ChildDeclaration::new("db", "db/v1"))
            .with_child(ChildDeclaration::new("db", "db/v1").with_import(Mapping::new("a", "b")));

        fx.reconciler
            .reconcile(&ReconcileContext::new(), &parent, &def)
            .await
            .unwrap();
        assert_eq!(fx.store.children().await.len(), 1);
    }

    #[test]
    fn test_builder_requires_store() {
        let result = ReconcilerBuilder::new()
            .with_registry(Arc::new(InMemoryRegistry::new()))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder() {
        let result = ReconcilerBuilder::new()
            .with_store(InMemoryStore::new_arc())
            .with_registry(Arc::new(InMemoryRegistry::new()))
            .default_mappings(false)
            .build();

        assert!(result.is_ok());
        assert_eq!(
            result.ok().map(|r| r.config().default_mappings),
            Some(false)
        );
    }
}
