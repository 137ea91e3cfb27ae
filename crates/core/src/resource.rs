//! Parent and child resources.
//!
//! Parents and children are separate types; the relation between them is the
//! controller [`OwnerReference`](crate::meta::OwnerReference) on the child and the
//! [`TrackedChild`] list on the parent.

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, Phase};
use crate::definition::{ChildDeclaration, DefinitionRef, Mapping};
use crate::meta::{ObjectKey, ObjectMeta, ObjectReference};

/// Kind recorded in owner references that point at a parent.
pub const PARENT_KIND: &str = "ParentResource";

/// One entry of the parent's tracked-children list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChild {
    /// Declared name in the definition.
    pub name: String,
    pub reference: ObjectReference,
}

impl TrackedChild {
    pub fn new(name: impl Into<String>, child: &ChildResource) -> Self {
        Self {
            name: name.into(),
            reference: ObjectReference::from(&child.meta.key()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentSpec {
    pub definition_ref: DefinitionRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Children this parent created, in creation order.
    #[serde(default)]
    pub children: Vec<TrackedChild>,
}

impl ParentStatus {
    pub fn condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    pub fn tracked(&self, name: &str) -> Option<&TrackedChild> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Top-level declarative object whose definition fans out into children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentResource {
    pub meta: ObjectMeta,
    pub spec: ParentSpec,
    #[serde(default)]
    pub status: ParentStatus,
}

impl ParentResource {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        definition_ref: impl Into<DefinitionRef>,
    ) -> Self {
        Self {
            meta: ObjectMeta::named(namespace, name),
            spec: ParentSpec {
                definition_ref: definition_ref.into(),
            },
            status: ParentStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }
}

/// Declared contract of a child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSpec {
    pub definition_ref: Option<DefinitionRef>,
    #[serde(default)]
    pub imports: Vec<Mapping>,
    #[serde(default)]
    pub exports: Vec<Mapping>,
    /// Mappings inherited from the child's definition that no declaration overrides.
    #[serde(default)]
    pub default_imports: Vec<Mapping>,
    #[serde(default)]
    pub default_exports: Vec<Mapping>,
}

impl ChildSpec {
    /// Spec carrying exactly what a declaration states, without inherited defaults.
    pub fn from_declaration(declaration: &ChildDeclaration) -> Self {
        Self {
            definition_ref: Some(declaration.definition_ref.clone()),
            imports: declaration.imports.clone(),
            exports: declaration.exports.clone(),
            default_imports: Vec::new(),
            default_exports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStatus {
    #[serde(default)]
    pub phase: Phase,
}

/// Instance created to satisfy one declared child of a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildResource {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: ChildSpec,
    #[serde(default)]
    pub status: ChildStatus,
}

impl ChildResource {
    /// A child with the given metadata and empty spec.
    pub fn new(meta: ObjectMeta) -> Self {
        Self {
            meta,
            spec: ChildSpec::default(),
            status: ChildStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Deleting or still progressing: the parent must not mutate its children.
    pub fn is_busy(&self) -> bool {
        self.meta.is_deleting() || self.status.phase.is_progressing()
    }
}
