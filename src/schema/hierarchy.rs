// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Class inheritance queries over a [`SchemaRegistry`] (spec §4.F).
//!
//! The original format discovers ancestry by walking a runtime string-keyed
//! parent chain at load time; here the parent edges are declared statically
//! on each [`TypeDescriptor`] (`parents`), so every query below is a plain
//! tree walk with no string comparisons or dynamic lookups on the hot path.

use crate::schema::registry::SchemaRegistry;

/// Read-only view over a registry's declared parent edges.
pub struct ClassHierarchy<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ClassHierarchy<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        ClassHierarchy { registry }
    }

    fn parents_of(&self, class_id: u32) -> &'static [u32] {
        self.registry.by_id(class_id).map(|d| d.parents).unwrap_or(&[])
    }

    /// True if `class_id` is `ancestor_id` or descends from it.
    pub fn is_derived_from(&self, class_id: u32, ancestor_id: u32) -> bool {
        if class_id == ancestor_id {
            return true;
        }
        self.parents_of(class_id).iter().any(|&p| self.is_derived_from(p, ancestor_id))
    }

    /// Number of edges from `class_id` up to `ancestor_id`, or `None` if
    /// `class_id` does not derive from `ancestor_id`.
    pub fn derivation_level(&self, class_id: u32, ancestor_id: u32) -> Option<u32> {
        if class_id == ancestor_id {
            return Some(0);
        }
        self.parents_of(class_id)
            .iter()
            .filter_map(|&p| self.derivation_level(p, ancestor_id))
            .min()
            .map(|level| level + 1)
    }

    fn ancestors(&self, class_id: u32) -> Vec<u32> {
        let mut out = vec![class_id];
        let mut frontier = vec![class_id];
        while let Some(current) = frontier.pop() {
            for &parent in self.parents_of(current) {
                if !out.contains(&parent) {
                    out.push(parent);
                    frontier.push(parent);
                }
            }
        }
        out
    }

    /// The nearest class id that is an ancestor (or itself) of both `a` and
    /// `b`, preferring the one closer to `a`. Returns `None` if they share
    /// no ancestor at all.
    pub fn common_ancestor(&self, a: u32, b: u32) -> Option<u32> {
        let b_ancestors = self.ancestors(b);
        self.ancestors(a).into_iter().find(|candidate| b_ancestors.contains(candidate))
    }

    /// True if `class_id`'s chain ultimately reaches `root_id` without a
    /// dangling/unknown parent (spec §9 "uses_be_object_deserializer": the
    /// original walked string-keyed parent names until it hit a known root
    /// base class; here it's the same walk over static ids).
    pub fn reaches_root(&self, class_id: u32, root_id: u32) -> bool {
        self.is_derived_from(class_id, root_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;
    use crate::schema::builder::TypeBuilder;
    use crate::schema::descriptor::FieldKind;

    fn registry_with_chain() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(TypeBuilder::new("Root", 1).field("a", 1, FieldKind::Dword).build_reflected()).unwrap();
        registry
            .register(
                TypeBuilder::new("Mid", 2)
                    .derives_from(&[1])
                    .param("p", Guid::new(1, 1))
                    .field("b", 2, FieldKind::Dword)
                    .build_reflected(),
            )
            .unwrap();
        registry
            .register(
                TypeBuilder::new("Leaf", 3)
                    .derives_from(&[2])
                    .field("c", 3, FieldKind::Dword)
                    .build_reflected(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn is_derived_from_walks_multiple_levels() {
        let registry = registry_with_chain();
        let hierarchy = ClassHierarchy::new(&registry);
        assert!(hierarchy.is_derived_from(3, 1));
        assert!(!hierarchy.is_derived_from(1, 3));
    }

    #[test]
    fn derivation_level_counts_edges() {
        let registry = registry_with_chain();
        let hierarchy = ClassHierarchy::new(&registry);
        assert_eq!(hierarchy.derivation_level(3, 1), Some(2));
        assert_eq!(hierarchy.derivation_level(3, 3), Some(0));
        assert_eq!(hierarchy.derivation_level(1, 3), None);
    }

    #[test]
    fn common_ancestor_finds_shared_root() {
        let registry = registry_with_chain();
        let hierarchy = ClassHierarchy::new(&registry);
        assert_eq!(hierarchy.common_ancestor(3, 2), Some(2));
        assert_eq!(hierarchy.common_ancestor(3, 1), Some(1));
    }
}
