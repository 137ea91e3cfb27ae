//! Desired-state reconciliation of parent resources and their children.
//!
//! A parent names a definition; the definition declares children. Each pass of the
//! reconciler moves the children that actually exist toward the declared set:
//!
//! 1. **Fetch** the children the parent tracks, dropping references to missing ones
//! 2. **Gate**: do nothing while any child is being deleted or is still progressing
//! 3. **Prune** children no longer declared (and stop there if anything was deleted)
//! 4. **Upsert** each declared child whose spec drifted, in declaration order
//! 5. **Report** the outcome as a condition on the parent's status
//!
//! Passes never retry. Every decision is re-derived from live state, so the caller
//! can simply run the pass again after an error or an external change.
//!
//! # Example
//!
//! ```ignore
//! use canopy_reconciler::{InMemoryRegistry, InMemoryStore, ReconcileContext, Reconciler};
//! use canopy_core::{ChildDeclaration, Definition, ParentResource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryStore::new_arc();
//!     let registry = Arc::new(InMemoryRegistry::new());
//!     let reconciler = Reconciler::builder()
//!         .with_store(store.clone())
//!         .with_registry(registry)
//!         .build()?;
//!
//!     let parent = store.insert_parent(ParentResource::new("team-a", "shop", "shop/v1")).await;
//!     let definition = Definition::new("shop").with_child(ChildDeclaration::new("db", "db/v1"));
//!
//!     let report = reconciler
//!         .reconcile(&ReconcileContext::new(), &parent, &definition)
//!         .await?;
//!     println!("{:?}", report.outcome);
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod compare;
pub mod config;
pub mod context;
pub mod error;
mod fetch;
pub mod gate;
pub mod ownership;
mod prune;
pub mod reason;
pub mod reconciler;
pub mod registry;
pub mod status;
pub mod store;
pub mod types;
pub mod upsert;

// Re-export main types
pub use compare::needs_update;
pub use config::ReconcilerConfig;
pub use context::ReconcileContext;
pub use error::{
    Error, OwnershipError, RegistryError, Result, StoreError, StoreResult, UpsertError,
    WriteOperation,
};
pub use ownership::{OwnerReferenceService, OwnershipService};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use registry::{DefinitionRegistry, InMemoryRegistry};
pub use status::StatusDraft;
pub use store::{
    create_or_update, Fault, InMemoryStore, Mutation, Operation, OperationResult, ResourceStore,
    TracingStore,
};
pub use types::{ChildSet, PassOutcome, ReconcileReport, WaitReason};
pub use upsert::{default_mappings, generate_name_prefix};
