// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Runtime type descriptors for the schema registry (spec §4.F, §4.G).
//!
//! A [`TypeDescriptor`] is either a field table walked generically by
//! [`crate::schema::reflect`], or a [`Codec::Custom`] vtable that a class
//! (spec §4.J) supplies when its layout needs bespoke clamping, versioning,
//! or identifier logic the generic walk can't express.

use crate::chunk::{Chunk, IdRemap};
use crate::error::Result;
use crate::schema::reflect::Value;

/// A single field in a generically-reflected struct.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub identifier: u32,
    pub kind: FieldKind,
    /// Field was introduced in this `data_version`; the generic walk skips
    /// it (leaving the documented default) when reading an older version.
    pub since_version: u8,
}

/// The primitive shapes the generic reflection walk knows how to read and
/// write without help from a class-specific vtable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Byte,
    Word,
    Dword,
    Int,
    Float,
    Guid,
    ObjectId,
    String,
    Vector2,
    Vector3,
    Vector4,
    Matrix,
    Quaternion,
    Color,
}

/// Free-form parameter metadata carried alongside a field table entry,
/// mirroring the original format's per-parameter GUID table (spec GLOSSARY
/// "ParamGuid").
#[derive(Debug, Clone)]
pub struct ParamMetadata {
    pub name: &'static str,
    pub guid: crate::guid::Guid,
}

/// Either a generic field table, or a class-supplied vtable that fully
/// owns (de)serialization and post-load normalization.
pub enum Codec {
    Reflect(Vec<Field>),
    Custom {
        read: fn(&Chunk, &IdRemap) -> Result<Value>,
        write: fn(&Value, &IdRemap) -> Result<Chunk>,
        validate: fn(&mut Value),
    },
}

/// A registered class or struct type: its wire identity plus how to
/// (de)serialize it.
pub struct TypeDescriptor {
    pub name: &'static str,
    pub class_id: u32,
    pub parents: &'static [u32],
    pub params: Vec<ParamMetadata>,
    pub codec: Codec,
}

impl TypeDescriptor {
    pub fn is_custom(&self) -> bool {
        matches!(self.codec, Codec::Custom { .. })
    }
}
