// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Fluent construction of [`TypeDescriptor`]s (spec §4.F), used by the
//! `schema::classes` modules to declare their wire identity and field
//! table (or custom codec) in one place.

use crate::guid::Guid;
use crate::schema::descriptor::{Codec, Field, FieldKind, ParamMetadata, TypeDescriptor};

/// Builds a [`TypeDescriptor`] field by field, or installs a custom codec
/// in place of the field table.
pub struct TypeBuilder {
    name: &'static str,
    class_id: u32,
    parents: &'static [u32],
    params: Vec<ParamMetadata>,
    fields: Vec<Field>,
}

impl TypeBuilder {
    pub fn new(name: &'static str, class_id: u32) -> Self {
        TypeBuilder {
            name,
            class_id,
            parents: &[],
            params: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn derives_from(mut self, parents: &'static [u32]) -> Self {
        self.parents = parents;
        self
    }

    pub fn param(mut self, name: &'static str, guid: Guid) -> Self {
        self.params.push(ParamMetadata { name, guid });
        self
    }

    /// Adds a field present since `data_version` 0.
    pub fn field(self, name: &'static str, identifier: u32, kind: FieldKind) -> Self {
        self.field_since(name, identifier, kind, 0)
    }

    /// Adds a field first written starting at `since_version`.
    pub fn field_since(mut self, name: &'static str, identifier: u32, kind: FieldKind, since_version: u8) -> Self {
        self.fields.push(Field {
            name,
            identifier,
            kind,
            since_version,
        });
        self
    }

    /// Finishes the descriptor with a generic field-table codec.
    pub fn build_reflected(self) -> TypeDescriptor {
        TypeDescriptor {
            name: self.name,
            class_id: self.class_id,
            parents: self.parents,
            params: self.params,
            codec: Codec::Reflect(self.fields),
        }
    }

    /// Finishes the descriptor with a class-supplied custom codec,
    /// discarding any field table declared via [`TypeBuilder::field`].
    pub fn build_custom(
        self,
        read: fn(&crate::chunk::Chunk, &crate::chunk::IdRemap) -> crate::error::Result<crate::schema::reflect::Value>,
        write: fn(&crate::schema::reflect::Value, &crate::chunk::IdRemap) -> crate::error::Result<crate::chunk::Chunk>,
        validate: fn(&mut crate::schema::reflect::Value),
    ) -> TypeDescriptor {
        TypeDescriptor {
            name: self.name,
            class_id: self.class_id,
            parents: self.parents,
            params: self.params,
            codec: Codec::Custom { read, write, validate },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_reflected_descriptor_with_fields() {
        let descriptor = TypeBuilder::new("Sample", 1)
            .field("x", 0x01, FieldKind::Dword)
            .field_since("y", 0x02, FieldKind::Float, 3)
            .build_reflected();
        assert_eq!(descriptor.name, "Sample");
        match descriptor.codec {
            crate::schema::descriptor::Codec::Reflect(fields) => assert_eq!(fields.len(), 2),
            _ => panic!("expected a reflected codec"),
        }
    }
}
