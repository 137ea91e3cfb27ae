//! Definition registry trait and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use canopy_core::{Definition, DefinitionRef};
use tokio::sync::RwLock;

use crate::error::RegistryError;

/// Resolves definition references to definition documents.
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
    async fn get_definition(&self, reference: &DefinitionRef) -> Result<Definition, RegistryError>;
}

/// In-memory registry for testing and local runs.
#[derive(Default)]
pub struct InMemoryRegistry {
    definitions: RwLock<HashMap<DefinitionRef, Definition>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(reference, definition)` pairs.
    pub fn with_definitions(definitions: impl IntoIterator<Item = (DefinitionRef, Definition)>) -> Self {
        Self {
            definitions: RwLock::new(definitions.into_iter().collect()),
        }
    }

    /// Register or replace a definition.
    pub async fn register(&self, reference: DefinitionRef, definition: Definition) {
        self.definitions.write().await.insert(reference, definition);
    }

    pub async fn remove(&self, reference: &DefinitionRef) -> Option<Definition> {
        self.definitions.write().await.remove(reference)
    }

    pub async fn len(&self) -> usize {
        self.definitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.definitions.read().await.is_empty()
    }
}

#[async_trait]
impl DefinitionRegistry for InMemoryRegistry {
    async fn get_definition(&self, reference: &DefinitionRef) -> Result<Definition, RegistryError> {
        self.definitions
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                reference: reference.clone(),
            })
    }
}
