//! Drift detection between a declared child and its live spec.

use std::collections::HashSet;

use canopy_core::{ChildDeclaration, ChildSpec, Mapping};

/// Whether the live child must be updated to match its declaration.
///
/// Mapping lists are compared as sets of `(from, to)` pairs and by length, so order
/// never matters but a differing count always does. Inherited default mappings are
/// not part of the declared contract and are ignored.
pub fn needs_update(declared: &ChildDeclaration, live: &ChildSpec) -> bool {
    live.definition_ref.as_ref() != Some(&declared.definition_ref)
        || mappings_differ(&declared.imports, &live.imports)
        || mappings_differ(&declared.exports, &live.exports)
}

fn mappings_differ(declared: &[Mapping], live: &[Mapping]) -> bool {
    if declared.len() != live.len() {
        return true;
    }
    let declared: HashSet<&Mapping> = declared.iter().collect();
    let live: HashSet<&Mapping> = live.iter().collect();
    declared != live
}
