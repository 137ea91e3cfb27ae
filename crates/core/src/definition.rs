//! Definition documents and the child declarations they carry.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque reference to a definition in the registry, e.g. `db/v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionRef(String);

impl DefinitionRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DefinitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DefinitionRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single data mapping from a source key to a destination key.
///
/// Two mappings are the same mapping when both keys match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mapping {
    pub from: String,
    pub to: String,
}

impl Mapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// A mapping whose source and destination share a key.
    pub fn identity(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            from: key.clone(),
            to: key,
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// A data field a definition consumes or produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDeclaration {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
        }
    }
}

/// One declared child inside a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDeclaration {
    /// Logical name, unique within the parent.
    pub name: String,
    pub definition_ref: DefinitionRef,
    #[serde(default)]
    pub imports: Vec<Mapping>,
    #[serde(default)]
    pub exports: Vec<Mapping>,
}

impl ChildDeclaration {
    pub fn new(name: impl Into<String>, definition_ref: impl Into<DefinitionRef>) -> Self {
        Self {
            name: name.into(),
            definition_ref: definition_ref.into(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_import(mut self, mapping: Mapping) -> Self {
        self.imports.push(mapping);
        self
    }

    #[must_use]
    pub fn with_export(mut self, mapping: Mapping) -> Self {
        self.exports.push(mapping);
        self
    }
}

/// Definition document: the fields a component exchanges and the children it fans out into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(default)]
    pub imports: Vec<FieldDeclaration>,
    #[serde(default)]
    pub exports: Vec<FieldDeclaration>,
    /// Declared children, in declaration order.
    #[serde(default)]
    pub children: Vec<ChildDeclaration>,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            exports: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: ChildDeclaration) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_import_field(mut self, key: impl Into<String>) -> Self {
        self.imports.push(FieldDeclaration::new(key));
        self
    }

    #[must_use]
    pub fn with_export_field(mut self, key: impl Into<String>) -> Self {
        self.exports.push(FieldDeclaration::new(key));
        self
    }

    /// Look up a declared child by logical name.
    pub fn child(&self, name: &str) -> Option<&ChildDeclaration> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Check that declared child names are unique.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`] naming the first duplicated child.
    pub fn validate(&self) -> Result<()> {
        match self.children.iter().map(|c| c.name.as_str()).duplicates().next() {
            Some(name) => Err(Error::invalid_document(format!(
                "definition '{}' declares child '{name}' more than once",
                self.name
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_lookup() {
        let def = Definition::new("root")
            .with_child(ChildDeclaration::new("db", "db/v1"))
            .with_child(ChildDeclaration::new("web", "web/v2"));

        assert!(def.declares("db"));
        assert!(!def.declares("cache"));
        assert_eq!(
            def.child("web").map(|c| c.definition_ref.as_str()),
            Some("web/v2")
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let def = Definition::new("root")
            .with_child(ChildDeclaration::new("db", "db/v1"))
            .with_child(ChildDeclaration::new("db", "db/v2"));

        let err = def.validate();
        assert!(err.is_err());
        assert!(err
            .err()
            .map(|e| e.to_string().contains("'db'"))
            .unwrap_or(false));
    }

    #[test]
    fn test_definition_ref_serializes_as_string() {
        let json = serde_json::to_string(&DefinitionRef::new("db/v1"));
        assert_eq!(json.ok().as_deref(), Some("\"db/v1\""));
    }
}
