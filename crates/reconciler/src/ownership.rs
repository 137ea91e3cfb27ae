//! Ownership links between parents and their children.

use canopy_core::{ChildResource, OwnerReference, ParentResource, PARENT_KIND};

use crate::error::OwnershipError;

/// Establishes the structural parent → child link used for cascade deletion.
pub trait OwnershipService: Send + Sync {
    /// Make `owner` the controlling owner of `child`.
    ///
    /// # Errors
    ///
    /// Returns an [`OwnershipError`] when the link cannot be expressed.
    fn set_owner(&self, owner: &ParentResource, child: &mut ChildResource) -> Result<(), OwnershipError>;
}

/// Sets a controller owner reference on the child, keeping any other owners.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerReferenceService;

impl OwnerReferenceService {
    pub const fn new() -> Self {
        Self
    }
}

impl OwnershipService for OwnerReferenceService {
    fn set_owner(&self, owner: &ParentResource, child: &mut ChildResource) -> Result<(), OwnershipError> {
        if owner.meta.uid.is_empty() {
            return Err(OwnershipError::MissingUid { owner: owner.key() });
        }
        if owner.meta.namespace != child.meta.namespace {
            return Err(OwnershipError::CrossNamespace {
                owner_namespace: owner.meta.namespace.clone(),
                child_namespace: child.meta.namespace.clone(),
            });
        }
        if let Some(controller) = child.meta.controller() {
            if controller.uid != owner.meta.uid {
                return Err(OwnershipError::AlreadyOwned {
                    child: child.meta.name.clone(),
                    controller: controller.name.clone(),
                });
            }
        }

        let reference = OwnerReference {
            kind: PARENT_KIND.to_string(),
            name: owner.meta.name.clone(),
            uid: owner.meta.uid.clone(),
            controller: true,
            block_owner_deletion: true,
        };
        match child
            .meta
            .owner_references
            .iter_mut()
            .find(|r| r.uid == reference.uid)
        {
            Some(existing) => *existing = reference,
            None => child.meta.owner_references.push(reference),
        }
        Ok(())
    }
}
