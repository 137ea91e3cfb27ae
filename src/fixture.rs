//! Fixture worlds: parents, definitions and pre-existing children in one document.
//!
//! A fixture seeds the in-memory store and registry so that passes can be run
//! locally without a real backend:
//!
//! ```yaml
//! definitions:
//!   shop/v1:
//!     name: shop
//!     children:
//!       - name: db
//!         definition_ref: db/v1
//!         imports:
//!           - { from: tier, to: size }
//!   db/v1:
//!     name: db
//!     imports:
//!       - key: size
//! parents:
//!   - meta: { name: shop, namespace: team-a }
//!     spec: { definition_ref: shop/v1 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use canopy_core::{ChildResource, Definition, DefinitionRef, Error, ObjectKey, ParentResource, Result};
use canopy_reconciler::{
    InMemoryRegistry, InMemoryStore, ReconcileContext, Reconciler, ReconcilerConfig,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    /// Definitions keyed by the reference parents and declarations use.
    #[serde(default)]
    pub definitions: BTreeMap<DefinitionRef, Definition>,
    #[serde(default)]
    pub parents: Vec<ParentResource>,
    /// Children that already exist before the first pass.
    #[serde(default)]
    pub children: Vec<ChildResource>,
}

impl Fixture {
    /// Parse a YAML fixture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::YamlParseFailed`] on malformed input or
    /// [`Error::InvalidDocument`] if validation fails.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let fixture: Self =
            serde_yaml::from_str(text).map_err(|e| Error::yaml_parse_failed(e.to_string()))?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Parse a JSON fixture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonParseFailed`] on malformed input or
    /// [`Error::InvalidDocument`] if validation fails.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let fixture: Self =
            serde_json::from_str(text).map_err(|e| Error::json_parse_failed(e.to_string()))?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Load a fixture file; `.json` files are read as JSON, everything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileReadFailed`] if the file cannot be read, otherwise the
    /// parse or validation error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check definitions and that object keys are unique.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.definitions.values().try_for_each(Definition::validate)?;

        if let Some(key) = self.parents.iter().map(ParentResource::key).duplicates().next() {
            return Err(Error::invalid_document(format!("parent '{key}' appears more than once")));
        }
        if let Some(key) = self
            .children
            .iter()
            .map(ChildResource::key)
            .duplicates()
            .next()
        {
            return Err(Error::invalid_document(format!("child '{key}' appears more than once")));
        }
        if let Some(child) = self.children.iter().find(|c| c.meta.name.is_empty()) {
            return Err(Error::invalid_document(format!(
                "child in namespace '{}' has no name",
                child.meta.namespace
            )));
        }
        Ok(())
    }

    /// Seed a fresh store and registry with this fixture.
    ///
    /// Returns the keys of the seeded parents in document order.
    pub async fn seed(&self) -> (Arc<InMemoryStore>, Arc<InMemoryRegistry>, Vec<ObjectKey>) {
        let store = InMemoryStore::new_arc();
        let registry = Arc::new(InMemoryRegistry::with_definitions(
            self.definitions
                .iter()
                .map(|(reference, definition)| (reference.clone(), definition.clone())),
        ));

        for child in &self.children {
            store.insert_child(child.clone()).await;
        }
        let mut keys = Vec::with_capacity(self.parents.len());
        for parent in &self.parents {
            keys.push(store.insert_parent(parent.clone()).await.key());
        }
        (store, registry, keys)
    }

    /// Seed a world and run up to `passes` passes over every parent.
    ///
    /// Stops early once a whole round changes no child or `ctx` is cancelled. A failed
    /// pass is logged and the remaining parents still run, the same way a controller
    /// would requeue.
    ///
    /// # Errors
    ///
    /// Returns [`canopy_reconciler::Error::InvalidConfig`] if `config` is invalid.
    pub async fn run(
        &self,
        ctx: &ReconcileContext,
        config: ReconcilerConfig,
        passes: u32,
    ) -> canopy_reconciler::Result<World> {
        let (store, registry, keys) = self.seed().await;
        let reconciler = Reconciler::builder()
            .with_store(store.clone())
            .with_registry(registry)
            .with_config(config)
            .build()?;
        let mut failures = 0_usize;
        for pass in 1..=passes {
            if ctx.is_cancelled() {
                warn!(pass, "Cancelled, not starting further passes");
                break;
            }
            let mut quiescent = true;
            for key in &keys {
                let Some(parent) = store.parent(key).await else {
                    continue;
                };
                match reconciler.reconcile_parent(ctx, &parent).await {
                    Ok(report) => {
                        info!(pass, parent = %key, outcome = ?report.outcome, "Pass finished");
                        quiescent &= report.outcome.is_quiescent();
                    }
                    Err(e) => {
                        warn!(pass, parent = %key, error = %e, "Pass failed");
                        failures = failures.saturating_add(1);
                        quiescent = false;
                    }
                }
            }
            if quiescent {
                info!(pass, "World converged");
                break;
            }
        }

        let mut parents = BTreeMap::new();
        for key in &keys {
            if let Some(parent) = store.parent(key).await {
                parents.insert(key.to_string(), parent);
            }
        }
        Ok(World {
            parents,
            children: store.children().await,
            failures,
        })
    }
}

/// State of a fixture world after running passes.
#[derive(Debug, Clone, Serialize)]
pub struct World {
    /// Parents keyed by `namespace/name`.
    pub parents: BTreeMap<String, ParentResource>,
    pub children: Vec<ChildResource>,
    /// Number of passes that returned an error.
    pub failures: usize,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use canopy_core::{ConditionStatus, Phase};
    use tokio_util::sync::CancellationToken;

    const SHOP: &str = r"
definitions:
  shop/v1:
    name: shop
    children:
      - name: db
        definition_ref: db/v1
        imports:
          - { from: tier, to: size }
      - name: web
        definition_ref: web/v1
  db/v1:
    name: db
    imports:
      - key: size
      - key: region
  web/v1:
    name: web
parents:
  - meta: { name: shop, namespace: team-a }
    spec: { definition_ref: shop/v1 }
";

    #[test]
    fn test_parse_yaml_fixture() {
        let fixture = Fixture::from_yaml_str(SHOP).unwrap();
        assert_eq!(fixture.definitions.len(), 3);
        assert_eq!(fixture.parents.len(), 1);
        assert!(fixture.children.is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = Fixture::from_yaml_str("parent: []").unwrap_err();
        assert!(matches!(err, Error::YamlParseFailed { .. }));
    }

    #[test]
    fn test_duplicate_parent_is_rejected() {
        let text = r"
parents:
  - meta: { name: shop, namespace: team-a }
    spec: { definition_ref: shop/v1 }
  - meta: { name: shop, namespace: team-a }
    spec: { definition_ref: shop/v2 }
";
        let err = Fixture::from_yaml_str(text).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
    }

    #[test]
    fn test_duplicate_declaration_is_rejected() {
        let text = r"
definitions:
  shop/v1:
    name: shop
    children:
      - { name: db, definition_ref: db/v1 }
      - { name: db, definition_ref: db/v2 }
";
        assert!(Fixture::from_yaml_str(text).is_err());
    }

    #[test]
    fn test_json_fixture_from_file() {
        let fixture = Fixture::from_yaml_str(SHOP).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        std::fs::write(&path, serde_json::to_string(&fixture).unwrap()).unwrap();

        assert_eq!(Fixture::from_file(&path).unwrap(), fixture);
    }

    #[test]
    fn test_missing_file() {
        let err = Fixture::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_converges_and_stops_early() {
        let fixture = Fixture::from_yaml_str(SHOP).unwrap();
        let world = fixture.run(&ReconcileContext::new(), ReconcilerConfig::default(), 5).await.unwrap();

        assert_eq!(world.failures, 0);
        assert_eq!(world.children.len(), 2);
        let parent = world.parents.get("team-a/shop").unwrap();
        assert_eq!(parent.status.children.len(), 2);
        assert_eq!(
            parent.status.condition("EnsureChildren").map(|c| c.status),
            Some(ConditionStatus::True)
        );

        let db = world
            .children
            .iter()
            .find(|c| c.meta.name.starts_with("shop-db-"))
            .unwrap();
        assert_eq!(db.spec.default_imports.len(), 1);
    }

    #[tokio::test]
    async fn test_run_records_missing_parent_definition() {
        let text = r"
parents:
  - meta: { name: shop, namespace: team-a }
    spec: { definition_ref: shop/v1 }
";
        let world = Fixture::from_yaml_str(text)
            .unwrap()
            .run(&ReconcileContext::new(), ReconcilerConfig::default(), 2)
            .await
            .unwrap();

        assert_eq!(world.failures, 2);
        let parent = world.parents.get("team-a/shop").unwrap();
        assert_eq!(parent.status.phase, Phase::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_pass() {
        let token = CancellationToken::new();
        let ctx = ReconcileContext::with_token(token.clone());
        token.cancel();

        let world = Fixture::from_yaml_str(SHOP)
            .unwrap()
            .run(&ctx, ReconcilerConfig::default(), 3)
            .await
            .unwrap();

        assert_eq!(world.failures, 0);
        assert!(world.children.is_empty());
        let parent = world.parents.get("team-a/shop").unwrap();
        assert!(parent.status.conditions.is_empty());
    }
}
