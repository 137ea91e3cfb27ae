//! Error types for the reconciler crate.

use std::fmt;

use canopy_core::{DefinitionRef, ObjectKey, ObjectReference};
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why a call was abandoned before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// Failures reported by a [`ResourceStore`](crate::store::ResourceStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    #[error("conflict writing '{key}': expected version {expected}, found {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("invalid object: {reason}")]
    Invalid { reason: String },

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store operation exceeded its deadline")]
    DeadlineExceeded,

    #[error("store operation '{operation}' failed: {reason}")]
    Backend { operation: String, reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(kind: &'static str, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    /// Create a backend failure.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<Interrupted> for StoreError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Failures reported by a [`DefinitionRegistry`](crate::registry::DefinitionRegistry).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("definition '{reference}' not found")]
    NotFound { reference: DefinitionRef },

    #[error("definition registry unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("definition lookup cancelled")]
    Cancelled,

    #[error("definition lookup exceeded its deadline")]
    DeadlineExceeded,
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<Interrupted> for RegistryError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Failures establishing the ownership link between a parent and a child.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("owner '{owner}' has no uid")]
    MissingUid { owner: ObjectKey },

    #[error("owner namespace '{owner_namespace}' differs from child namespace '{child_namespace}'")]
    CrossNamespace {
        owner_namespace: String,
        child_namespace: String,
    },

    #[error("child '{child}' is already controlled by '{controller}'")]
    AlreadyOwned { child: String, controller: String },
}

/// Failure of a create-or-update call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpsertError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unable to set owner reference: {0}")]
    Ownership(#[from] OwnershipError),
}

/// Store write that failed outside of create-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Delete,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A tracked child could not be read for a reason other than absence.
    #[error("unable to get child {reference}")]
    ChildRead {
        reference: ObjectReference,
        #[source]
        source: StoreError,
    },

    /// The registry could not resolve a definition.
    #[error("unable to get definition {reference} for {name}")]
    DefinitionResolution {
        name: String,
        reference: DefinitionRef,
        #[source]
        source: RegistryError,
    },

    /// A child could not be created or updated.
    #[error("unable to create child for {name}")]
    Upsert {
        name: String,
        #[source]
        source: UpsertError,
    },

    /// A store write other than create/update failed.
    #[error("unable to {operation} child {name}")]
    StoreWrite {
        operation: WriteOperation,
        name: String,
        #[source]
        source: StoreError,
    },

    /// The parent's own status could not be written.
    #[error("unable to persist status of parent {parent}")]
    StatusPersist {
        parent: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A configuration document could not be read or parsed.
    #[error(transparent)]
    Document(#[from] canopy_core::Error),
}

impl Error {
    /// Create a child read error.
    pub fn child_read(reference: ObjectReference, source: StoreError) -> Self {
        Self::ChildRead { reference, source }
    }

    /// Create a definition resolution error.
    pub fn definition_resolution(
        name: impl Into<String>,
        reference: DefinitionRef,
        source: RegistryError,
    ) -> Self {
        Self::DefinitionResolution {
            name: name.into(),
            reference,
            source,
        }
    }

    /// Create an upsert error.
    pub fn upsert(name: impl Into<String>, source: UpsertError) -> Self {
        Self::Upsert {
            name: name.into(),
            source,
        }
    }

    /// Create a store write error.
    pub fn store_write(operation: WriteOperation, name: impl Into<String>, source: StoreError) -> Self {
        Self::StoreWrite {
            operation,
            name: name.into(),
            source,
        }
    }

    /// Create a status persist error.
    pub fn status_persist(parent: ObjectKey, source: StoreError) -> Self {
        Self::StatusPersist { parent, source }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// The underlying store error, when there is one.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::ChildRead { source, .. }
            | Self::StoreWrite { source, .. }
            | Self::StatusPersist { source, .. } => Some(source),
            Self::Upsert {
                source: UpsertError::Store(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}
