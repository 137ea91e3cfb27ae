//! Resource model for canopy.
//!
//! - **Parents** declare a definition and remember the children they created.
//! - **Definitions** list declared children with their data mappings.
//! - **Children** carry a spec derived from one declaration and a back-reference
//!   to their parent.
//! - **Conditions** report reason-coded health on the parent.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod condition;
pub mod definition;
pub mod error;
pub mod meta;
pub mod resource;

pub use condition::{get_or_init_condition, merge_condition, Condition, ConditionStatus, Phase};
pub use definition::{ChildDeclaration, Definition, DefinitionRef, FieldDeclaration, Mapping};
pub use error::{Error, Result};
pub use meta::{ObjectKey, ObjectMeta, ObjectReference, OwnerReference};
pub use resource::{
    ChildResource, ChildSpec, ChildStatus, ParentResource, ParentSpec, ParentStatus,
    TrackedChild, PARENT_KIND,
};
