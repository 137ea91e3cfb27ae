//! Property tests for drift detection.

use canopy_core::{ChildDeclaration, ChildSpec, Mapping};
use canopy_reconciler::needs_update;
use proptest::prelude::*;

fn mapping() -> impl Strategy<Value = Mapping> {
    ("[a-c]{1,2}", "[a-c]{1,2}").prop_map(|(from, to)| Mapping::new(from, to))
}

fn unique_mappings() -> impl Strategy<Value = Vec<Mapping>> {
    prop::collection::hash_set(mapping(), 0..6).prop_map(|set| set.into_iter().collect())
}

fn declared(imports: Vec<Mapping>, exports: Vec<Mapping>) -> ChildDeclaration {
    let declaration = imports
        .into_iter()
        .fold(ChildDeclaration::new("x", "def/v1"), ChildDeclaration::with_import);
    exports
        .into_iter()
        .fold(declaration, ChildDeclaration::with_export)
}

proptest! {
    #[test]
    fn prop_spec_built_from_declaration_never_drifts(
        imports in unique_mappings(),
        exports in unique_mappings(),
    ) {
        let declaration = declared(imports, exports);
        let spec = ChildSpec::from_declaration(&declaration);
        prop_assert!(!needs_update(&declaration, &spec));
    }

    #[test]
    fn prop_mapping_order_is_ignored(
        imports in unique_mappings(),
        exports in unique_mappings(),
    ) {
        let declaration = declared(imports.clone(), exports.clone());
        let mut spec = ChildSpec::from_declaration(&declaration);
        spec.imports.reverse();
        spec.exports.rotate_left(exports.len().min(1));
        prop_assert!(!needs_update(&declaration, &spec));
    }

    #[test]
    fn prop_extra_mapping_is_drift(
        imports in unique_mappings(),
        extra in mapping(),
    ) {
        prop_assume!(!imports.contains(&extra));
        let declaration = declared(imports, Vec::new());
        let mut spec = ChildSpec::from_declaration(&declaration);
        spec.imports.push(extra);
        prop_assert!(needs_update(&declaration, &spec));
    }

    #[test]
    fn prop_missing_mapping_is_drift(imports in unique_mappings()) {
        prop_assume!(!imports.is_empty());
        let declaration = declared(imports, Vec::new());
        let mut spec = ChildSpec::from_declaration(&declaration);
        spec.imports.pop();
        prop_assert!(needs_update(&declaration, &spec));
    }

    #[test]
    fn prop_inherited_defaults_are_not_drift(
        imports in unique_mappings(),
        defaults in unique_mappings(),
    ) {
        let declaration = declared(imports, Vec::new());
        let mut spec = ChildSpec::from_declaration(&declaration);
        spec.default_imports = defaults;
        prop_assert!(!needs_update(&declaration, &spec));
    }
}
