#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # canopy
//!
//! Desired-state reconciliation of parent resources and the children their
//! definitions declare.
//!
//! This library re-exports the workspace crates and adds fixture worlds for local runs.

pub use canopy_core;
pub use canopy_reconciler;

pub mod cli;
pub mod fixture;
pub mod prelude;

pub use fixture::{Fixture, World};
