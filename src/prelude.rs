//! Prelude module - common imports for canopy
//!
//! ```rust
//! use canopy::prelude::*;
//! ```

pub use itertools::Itertools;

pub use canopy_core::{
    ChildDeclaration, ChildResource, Condition, ConditionStatus, Definition, DefinitionRef,
    Mapping, ObjectKey, ParentResource, Phase,
};
pub use canopy_reconciler::{
    DefinitionRegistry, Error, InMemoryRegistry, InMemoryStore, PassOutcome, ReconcileContext,
    ReconcileReport, Reconciler, ReconcilerConfig, ResourceStore, Result,
};

pub use crate::fixture::{Fixture, World};
