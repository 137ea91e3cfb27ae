//! Reason codes written to the parent's condition.

/// A tracked child could not be read.
pub const CHILD_NOT_FOUND: &str = "ChildNotFound";

/// An orphaned child could not be deleted.
pub const CHILD_NOT_DELETED: &str = "ChildNotDeleted";

/// A definition could not be resolved through the registry.
pub const DEFINITION_NOT_FOUND: &str = "DefinitionNotFound";

/// A child could not be created or updated.
pub const CREATING_FAILED: &str = "InstallationCreatingFailed";

/// Every declared child is in place.
pub const INSTALLED: &str = "InstallationsInstalled";
