// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The schema registry: by-id and by-name lookup over every registered
//! [`TypeDescriptor`], plus the parameter-GUID table shared across classes
//! (spec §4.F).

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{NmoError, Result};
use crate::guid::Guid;
use crate::schema::descriptor::TypeDescriptor;

/// Owns every registered class/struct descriptor for one codec session.
#[derive(Default)]
pub struct SchemaRegistry {
    by_id: HashMap<u32, TypeDescriptor>,
    by_name: HashMap<&'static str, u32>,
    param_guids: HashMap<&'static str, Guid>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor`, indexing it by class id and name and folding
    /// its parameter GUIDs into the shared table.
    ///
    /// # Errors
    /// Returns [`NmoError::InvalidState`] if `class_id` or `name` is already
    /// registered, or if a parameter name maps to a different GUID than one
    /// already on file — class schemas are expected to agree on shared
    /// parameter identities.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<()> {
        if self.by_id.contains_key(&descriptor.class_id) {
            return Err(NmoError::InvalidState("class id already registered"));
        }
        if self.by_name.contains_key(descriptor.name) {
            return Err(NmoError::InvalidState("class name already registered"));
        }
        for param in &descriptor.params {
            if let Some(existing) = self.param_guids.get(param.name) {
                if *existing != param.guid {
                    return Err(NmoError::ValidationFailed(format!(
                        "parameter '{}' registered with conflicting guids",
                        param.name
                    )));
                }
            } else {
                self.param_guids.insert(param.name, param.guid);
            }
        }
        self.by_name.insert(descriptor.name, descriptor.class_id);
        self.by_id.insert(descriptor.class_id, descriptor);
        Ok(())
    }

    pub fn by_id(&self, class_id: u32) -> Option<&TypeDescriptor> {
        self.by_id.get(&class_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn param_guid(&self, name: &str) -> Option<Guid> {
        self.param_guids.get(name).copied()
    }

    /// Cross-checks every descriptor's declared parents against the
    /// registry, failing loudly on a dangling reference rather than letting
    /// [`crate::schema::hierarchy`] silently treat it as a root.
    pub fn verify_consistency(&self) -> Result<()> {
        for descriptor in self.by_id.values() {
            for parent in descriptor.parents {
                if !self.by_id.contains_key(parent) {
                    return Err(NmoError::ValidationFailed(format!(
                        "class '{}' declares unknown parent class id {}",
                        descriptor.name, parent
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

static BOOTSTRAPPED: OnceLock<()> = OnceLock::new();

/// Idempotent process-wide init hook (spec §1.3's ambient "bootstrap"
/// concern): reserved for future global setup (e.g. installing a
/// `tracing` subscriber in a host application). Calling it more than once
/// is harmless.
pub fn bootstrap() {
    BOOTSTRAPPED.get_or_init(|| {
        tracing::debug!("nmo_format schema registry bootstrap");
    });
}

/// Builds the registry containing every class known to this crate (spec
/// §4.J): material, light, mesh, sprite text.
pub fn standard_registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(crate::schema::classes::material::descriptor())?;
    registry.register(crate::schema::classes::light::descriptor())?;
    registry.register(crate::schema::classes::mesh::descriptor())?;
    registry.register(crate::schema::classes::sprite_text::descriptor())?;
    registry.verify_consistency()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_all_four_classes() {
        let registry = standard_registry().unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.by_name("CKMaterial").is_some());
        assert!(registry.by_name("CKLight").is_some());
        assert!(registry.by_name("CKMesh").is_some());
        assert!(registry.by_name("CKSpriteText").is_some());
    }

    #[test]
    fn bootstrap_is_idempotent() {
        bootstrap();
        bootstrap();
    }
}
