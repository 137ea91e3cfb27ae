//! Resource store trait and implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use canopy_core::{ChildResource, ObjectKey, ParentResource, ParentStatus, Phase};
use chrono::Utc;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::context::ReconcileContext;
use crate::error::{OwnershipError, StoreError, StoreResult, UpsertError};

const PARENT: &str = "parent";
const CHILD: &str = "child";

/// Length of the random suffix appended to generated names.
const GENERATED_SUFFIX_LEN: usize = 5;

/// Attempts at finding a free generated name before giving up.
const GENERATE_ATTEMPTS: usize = 8;

/// Trait for resource storage backends.
///
/// Every call receives the pass context so that backends can stop early on
/// cancellation or deadline expiry.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read a child by key.
    async fn get_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<ChildResource>;

    /// Create a child. An empty name is completed from `generate_name`.
    async fn create_child(&self, ctx: &ReconcileContext, child: ChildResource)
        -> StoreResult<ChildResource>;

    /// Replace a child's metadata and spec, checked against its resource version.
    async fn update_child(&self, ctx: &ReconcileContext, child: ChildResource)
        -> StoreResult<ChildResource>;

    /// Request deletion of a child.
    async fn delete_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<()>;

    /// Write a parent's status if `resource_version` is still current.
    ///
    /// Returns the parent's new resource version.
    async fn update_parent_status(
        &self,
        ctx: &ReconcileContext,
        key: &ObjectKey,
        resource_version: u64,
        status: &ParentStatus,
    ) -> StoreResult<u64>;
}

/// What [`create_or_update`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Idempotently create or update a child.
///
/// A named child is re-read from the store first; `mutate` is applied to the live
/// copy and the result is written back only if it changed. An unnamed child (or one
/// that no longer exists) is mutated and created.
///
/// # Errors
///
/// Returns the mutator's error or the store error of the failing call.
pub async fn create_or_update<F>(
    ctx: &ReconcileContext,
    store: &dyn ResourceStore,
    mut child: ChildResource,
    mutate: F,
) -> Result<(ChildResource, OperationResult), UpsertError>
where
    F: FnOnce(&mut ChildResource) -> Result<(), OwnershipError> + Send,
{
    if !child.meta.is_unnamed() {
        match ctx.run(store.get_child(ctx, &child.key())).await {
            Ok(live) => {
                let mut desired = live.clone();
                mutate(&mut desired)?;
                if desired == live {
                    return Ok((live, OperationResult::Unchanged));
                }
                let updated = ctx.run(store.update_child(ctx, desired)).await?;
                return Ok((updated, OperationResult::Updated));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    mutate(&mut child)?;
    let created = ctx.run(store.create_child(ctx, child)).await?;
    Ok((created, OperationResult::Created))
}

/// Operations that can be made to fail in an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetChild,
    CreateChild,
    UpdateChild,
    DeleteChild,
    UpdateParentStatus,
}

/// A write recorded by an [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateChild(ObjectKey),
    UpdateChild(ObjectKey),
    DeleteChild(ObjectKey),
    UpdateParentStatus(ObjectKey),
}

impl Mutation {
    /// Whether the mutation touched a child rather than a parent.
    pub fn is_child_mutation(&self) -> bool {
        !matches!(self, Self::UpdateParentStatus(_))
    }
}

/// Injected failure for an [`InMemoryStore`] operation.
#[derive(Debug, Clone)]
pub struct Fault {
    operation: Operation,
    name_prefix: Option<String>,
    error: StoreError,
}

impl Fault {
    /// Fail every call of `operation` with a backend error.
    pub fn on(operation: Operation) -> Self {
        Self {
            operation,
            name_prefix: None,
            error: StoreError::backend(format!("{operation:?}"), "injected failure"),
        }
    }

    /// Only fail calls on objects whose name (or generate-name) starts with `prefix`.
    #[must_use]
    pub fn for_name(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: StoreError) -> Self {
        self.error = error;
        self
    }

    fn matches(&self, operation: Operation, name: &str) -> bool {
        self.operation == operation
            && self
                .name_prefix
                .as_deref()
                .is_none_or(|prefix| name.starts_with(prefix))
    }
}

#[derive(Default)]
struct State {
    parents: HashMap<ObjectKey, ParentResource>,
    children: BTreeMap<ObjectKey, ChildResource>,
    version: u64,
    journal: Vec<Mutation>,
    faults: Vec<Fault>,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.version = self.version.saturating_add(1);
        self.version
    }

    fn fault(&self, operation: Operation, name: &str) -> StoreResult<()> {
        self.faults
            .iter()
            .find(|f| f.matches(operation, name))
            .map_or(Ok(()), |f| Err(f.error.clone()))
    }

    fn generate_name(&self, namespace: &str, prefix: &str) -> StoreResult<String> {
        (0..GENERATE_ATTEMPTS)
            .map(|_| format!("{prefix}{}", random_suffix()))
            .find(|name| {
                !self
                    .children
                    .contains_key(&ObjectKey::new(namespace, name.as_str()))
            })
            .ok_or_else(|| StoreError::AlreadyExists {
                kind: CHILD,
                key: ObjectKey::new(namespace, prefix),
            })
    }
}

fn random_suffix() -> String {
    let id = Ulid::new().to_string().to_lowercase();
    let skip = id.len().saturating_sub(GENERATED_SUFFIX_LEN);
    id.chars().skip(skip).collect()
}

/// In-memory resource store for testing and local runs.
///
/// Records every write in a journal and supports injected failures. Children with
/// finalizers are only marked for deletion until [`InMemoryStore::finalize`] is called.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed a parent, assigning a uid and resource version.
    pub async fn insert_parent(&self, mut parent: ParentResource) -> ParentResource {
        let mut state = self.state.write().await;
        if parent.meta.uid.is_empty() {
            parent.meta.uid = Ulid::new().to_string();
        }
        parent.meta.resource_version = state.next_version();
        state.parents.insert(parent.key(), parent.clone());
        parent
    }

    /// Seed a child without journaling it.
    pub async fn insert_child(&self, mut child: ChildResource) -> ChildResource {
        let mut state = self.state.write().await;
        if child.meta.uid.is_empty() {
            child.meta.uid = Ulid::new().to_string();
        }
        child.meta.resource_version = state.next_version();
        state.children.insert(child.key(), child.clone());
        child
    }

    pub async fn parent(&self, key: &ObjectKey) -> Option<ParentResource> {
        self.state.read().await.parents.get(key).cloned()
    }

    pub async fn child(&self, key: &ObjectKey) -> Option<ChildResource> {
        self.state.read().await.children.get(key).cloned()
    }

    /// All children, ordered by key.
    pub async fn children(&self) -> Vec<ChildResource> {
        self.state.read().await.children.values().cloned().collect()
    }

    /// Children carrying `label = value`.
    pub async fn children_labelled(&self, label: &str, value: &str) -> Vec<ChildResource> {
        self.state
            .read()
            .await
            .children
            .values()
            .filter(|c| c.meta.labels.get(label).is_some_and(|v| v == value))
            .cloned()
            .collect()
    }

    /// Set a child's lifecycle phase, as the child's own controller would.
    pub async fn set_child_phase(&self, key: &ObjectKey, phase: Phase) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let child = state
            .children
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(CHILD, key.clone()))?;
        child.status.phase = phase;
        child.meta.resource_version = version;
        Ok(())
    }

    /// Complete a pending deletion by dropping finalizers and removing the child.
    pub async fn finalize(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.children.get(key).map(|c| c.meta.is_deleting()) {
            Some(true) => {
                state.children.remove(key);
                Ok(())
            }
            Some(false) => Err(StoreError::invalid(format!("child '{key}' is not being deleted"))),
            None => Err(StoreError::not_found(CHILD, key.clone())),
        }
    }

    pub async fn inject_fault(&self, fault: Fault) {
        self.state.write().await.faults.push(fault);
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Writes recorded since creation or the last [`InMemoryStore::clear_journal`].
    pub async fn journal(&self) -> Vec<Mutation> {
        self.state.read().await.journal.clone()
    }

    /// Writes that touched children.
    pub async fn child_mutations(&self) -> Vec<Mutation> {
        self.journal()
            .await
            .into_iter()
            .filter(Mutation::is_child_mutation)
            .collect()
    }

    pub async fn clear_journal(&self) {
        self.state.write().await.journal.clear();
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<ChildResource> {
        ctx.check::<StoreError>()?;
        let state = self.state.read().await;
        state.fault(Operation::GetChild, &key.name)?;
        state
            .children
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(CHILD, key.clone()))
    }

    async fn create_child(
        &self,
        ctx: &ReconcileContext,
        mut child: ChildResource,
    ) -> StoreResult<ChildResource> {
        ctx.check::<StoreError>()?;
        let mut state = self.state.write().await;

        if child.meta.is_unnamed() {
            let prefix = child
                .meta
                .generate_name
                .clone()
                .ok_or_else(|| StoreError::invalid("child has neither name nor generate_name"))?;
            state.fault(Operation::CreateChild, &prefix)?;
            child.meta.name = state.generate_name(&child.meta.namespace, &prefix)?;
        } else {
            state.fault(Operation::CreateChild, &child.meta.name)?;
        }

        let key = child.key();
        if state.children.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind: CHILD, key });
        }

        child.meta.uid = Ulid::new().to_string();
        child.meta.resource_version = state.next_version();
        child.meta.deletion_timestamp = None;
        state.children.insert(key.clone(), child.clone());
        state.journal.push(Mutation::CreateChild(key));
        Ok(child)
    }

    async fn update_child(
        &self,
        ctx: &ReconcileContext,
        mut child: ChildResource,
    ) -> StoreResult<ChildResource> {
        ctx.check::<StoreError>()?;
        let mut state = self.state.write().await;
        let key = child.key();
        state.fault(Operation::UpdateChild, &key.name)?;

        let stored = state
            .children
            .get(&key)
            .ok_or_else(|| StoreError::not_found(CHILD, key.clone()))?;
        if stored.meta.resource_version != child.meta.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: child.meta.resource_version,
                actual: stored.meta.resource_version,
            });
        }

        // Identity, deletion state and status are owned by the store.
        child.meta.uid = stored.meta.uid.clone();
        child.meta.deletion_timestamp = stored.meta.deletion_timestamp;
        child.status = stored.status.clone();
        child.meta.resource_version = state.next_version();
        state.children.insert(key.clone(), child.clone());
        state.journal.push(Mutation::UpdateChild(key));
        Ok(child)
    }

    async fn delete_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<()> {
        ctx.check::<StoreError>()?;
        let mut state = self.state.write().await;
        state.fault(Operation::DeleteChild, &key.name)?;

        let has_finalizers = match state.children.get(key) {
            Some(child) => !child.meta.finalizers.is_empty(),
            None => return Err(StoreError::not_found(CHILD, key.clone())),
        };

        if has_finalizers {
            let version = state.next_version();
            if let Some(child) = state.children.get_mut(key) {
                child.meta.deletion_timestamp.get_or_insert_with(Utc::now);
                child.meta.resource_version = version;
            }
        } else {
            state.children.remove(key);
        }
        state.journal.push(Mutation::DeleteChild(key.clone()));
        Ok(())
    }

    async fn update_parent_status(
        &self,
        ctx: &ReconcileContext,
        key: &ObjectKey,
        resource_version: u64,
        status: &ParentStatus,
    ) -> StoreResult<u64> {
        ctx.check::<StoreError>()?;
        let mut state = self.state.write().await;
        state.fault(Operation::UpdateParentStatus, &key.name)?;

        let current = state
            .parents
            .get(key)
            .map(|p| p.meta.resource_version)
            .ok_or_else(|| StoreError::not_found(PARENT, key.clone()))?;
        if current != resource_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: resource_version,
                actual: current,
            });
        }

        let version = state.next_version();
        if let Some(parent) = state.parents.get_mut(key) {
            parent.status = status.clone();
            parent.meta.resource_version = version;
        }
        state.journal.push(Mutation::UpdateParentStatus(key.clone()));
        Ok(version)
    }
}

/// A wrapper that adds tracing to a resource store.
pub struct TracingStore<S: ResourceStore> {
    inner: S,
}

impl<S: ResourceStore> TracingStore<S> {
    /// Create a new tracing store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for TracingStore<S> {
    async fn get_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<ChildResource> {
        tracing::trace!(child = %key, "Reading child");
        self.inner.get_child(ctx, key).await
    }

    async fn create_child(
        &self,
        ctx: &ReconcileContext,
        child: ChildResource,
    ) -> StoreResult<ChildResource> {
        tracing::debug!(
            namespace = %child.meta.namespace,
            name = %child.meta.name,
            generate_name = ?child.meta.generate_name,
            "Creating child"
        );
        let result = self.inner.create_child(ctx, child).await;
        if let Ok(ref created) = result {
            tracing::trace!(child = %created.key(), version = created.meta.resource_version, "Child created");
        }
        result
    }

    async fn update_child(
        &self,
        ctx: &ReconcileContext,
        child: ChildResource,
    ) -> StoreResult<ChildResource> {
        tracing::debug!(child = %child.key(), version = child.meta.resource_version, "Updating child");
        self.inner.update_child(ctx, child).await
    }

    async fn delete_child(&self, ctx: &ReconcileContext, key: &ObjectKey) -> StoreResult<()> {
        tracing::debug!(child = %key, "Deleting child");
        self.inner.delete_child(ctx, key).await
    }

    async fn update_parent_status(
        &self,
        ctx: &ReconcileContext,
        key: &ObjectKey,
        resource_version: u64,
        status: &ParentStatus,
    ) -> StoreResult<u64> {
        tracing::debug!(
            parent = %key,
            version = resource_version,
            phase = %status.phase,
            tracked = status.children.len(),
            "Updating parent status"
        );
        self.inner
            .update_parent_status(ctx, key, resource_version, status)
            .await
    }
}
