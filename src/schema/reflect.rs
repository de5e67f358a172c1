// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Generic reflection: walks a [`TypeDescriptor`]'s field table against a
//! [`Chunk`] using the identifier chain, producing/consuming a dynamically
//! typed [`Value`] (spec §4.G).
//!
//! Classes with bespoke layouts (spec §4.J) bypass this entirely via
//! [`Codec::Custom`] instead of describing themselves as a field table.

use std::collections::BTreeMap;

use crate::chunk::{Chunk, ChunkParser, ChunkWriter, IdRemap};
use crate::error::Result;
use crate::guid::Guid;
use crate::schema::descriptor::{Codec, Field, FieldKind, TypeDescriptor};

/// A dynamically typed value produced by generic reflection or by a class's
/// custom codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Word(u16),
    Dword(u32),
    Int(i32),
    Float(f32),
    Guid(Guid),
    ObjectId(u32),
    String(String),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
    Matrix([[f32; 4]; 4]),
    Quaternion([f32; 4]),
    Color([f32; 4]),
    /// A named field bag, used both by the generic walk and by classes that
    /// hand-roll their own codec.
    Struct(BTreeMap<&'static str, Value>),
}

impl Value {
    pub fn as_struct(&self) -> Option<&BTreeMap<&'static str, Value>> {
        match self {
            Value::Struct(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Value::Dword(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Reads one field's value via `parser`, having already sought its
/// identifier. A missing identifier is the caller's concern (spec §7): this
/// function only decodes the payload once positioned.
fn read_field(parser: &mut ChunkParser<'_>, kind: FieldKind, remap: &IdRemap) -> Result<Value> {
    Ok(match kind {
        FieldKind::Byte => Value::Byte(parser.byte()?),
        FieldKind::Word => Value::Word(parser.word()?),
        FieldKind::Dword => Value::Dword(parser.dword()?),
        FieldKind::Int => Value::Int(parser.int()?),
        FieldKind::Float => Value::Float(parser.float()?),
        FieldKind::Guid => Value::Guid(parser.guid()?),
        FieldKind::ObjectId => Value::ObjectId(parser.object_id(remap)?),
        FieldKind::String => Value::String(parser.string()?),
        FieldKind::Vector2 => Value::Vector2(parser.vector2()?),
        FieldKind::Vector3 => Value::Vector3(parser.vector3()?),
        FieldKind::Vector4 => Value::Vector4(parser.vector4()?),
        FieldKind::Matrix => Value::Matrix(parser.matrix()?),
        FieldKind::Quaternion => Value::Quaternion(parser.quaternion()?),
        FieldKind::Color => Value::Color(parser.color()?),
    })
}

fn write_field(writer: &mut ChunkWriter, value: &Value, remap: &IdRemap) -> Result<()> {
    match value {
        Value::Byte(v) => writer.byte(*v),
        Value::Word(v) => writer.word(*v),
        Value::Dword(v) => writer.dword(*v),
        Value::Int(v) => writer.int(*v),
        Value::Float(v) => writer.float(*v),
        Value::Guid(v) => writer.guid(*v),
        Value::ObjectId(v) => writer.object_id(*v, remap),
        Value::String(v) => writer.string(v),
        Value::Vector2(v) => writer.vector2(*v),
        Value::Vector3(v) => writer.vector3(*v),
        Value::Vector4(v) => writer.vector4(*v),
        Value::Matrix(v) => writer.matrix(*v),
        Value::Quaternion(v) => writer.quaternion(*v),
        Value::Color(v) => writer.color(*v),
        Value::Struct(_) => Err(crate::error::NmoError::NotSupported(
            "nested struct fields are not writable by the generic field-table codec",
        )),
    }
}

/// Deserializes `chunk` according to `descriptor`, dispatching to the
/// class's own codec when it has one.
pub fn deserialize(descriptor: &TypeDescriptor, chunk: &Chunk, remap: &IdRemap) -> Result<Value> {
    match &descriptor.codec {
        Codec::Custom { read, .. } => read(chunk, remap),
        Codec::Reflect(fields) => deserialize_fields(fields, chunk, remap),
    }
}

fn deserialize_fields(fields: &[Field], chunk: &Chunk, remap: &IdRemap) -> Result<Value> {
    let mut out = BTreeMap::new();
    for field in fields {
        if field.since_version > chunk.data_version {
            continue;
        }
        let mut parser = ChunkParser::new(chunk);
        match parser.seek_identifier(field.identifier) {
            Ok(()) => {
                out.insert(field.name, read_field(&mut parser, field.kind, remap)?);
            }
            Err(e) if e.is_missing_identifier() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Value::Struct(out))
}

/// Serializes `value` according to `descriptor`, dispatching to the class's
/// own codec when it has one.
pub fn serialize(descriptor: &TypeDescriptor, value: &Value, class_id: u32, data_version: u8, chunk_class_id: u8, remap: &IdRemap) -> Result<Chunk> {
    match &descriptor.codec {
        Codec::Custom { write, .. } => write(value, remap),
        Codec::Reflect(fields) => serialize_fields(fields, value, class_id, data_version, chunk_class_id, remap),
    }
}

fn serialize_fields(
    fields: &[Field],
    value: &Value,
    class_id: u32,
    data_version: u8,
    chunk_class_id: u8,
    remap: &IdRemap,
) -> Result<Chunk> {
    let map = value
        .as_struct()
        .ok_or_else(|| crate::error::NmoError::InvalidArgument("expected a struct value for field-table serialization".into()))?;

    let mut writer = ChunkWriter::new();
    for field in fields {
        if field.since_version > data_version {
            continue;
        }
        if let Some(field_value) = map.get(field.name) {
            writer.write_identifier(field.identifier)?;
            write_field(&mut writer, field_value, remap)?;
        }
    }
    Ok(writer.finalize(class_id, data_version, chunk_class_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::ParamMetadata;

    fn sample_descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "Sample",
            class_id: 999,
            parents: &[],
            params: vec![ParamMetadata { name: "value", guid: Guid::new(1, 1) }],
            codec: Codec::Reflect(vec![Field {
                name: "value",
                identifier: 0x01,
                kind: FieldKind::Dword,
                since_version: 0,
            }]),
        }
    }

    #[test]
    fn round_trips_a_generic_field_table() {
        let descriptor = sample_descriptor();
        let remap = IdRemap::new();
        let mut fields = BTreeMap::new();
        fields.insert("value", Value::Dword(42));
        let value = Value::Struct(fields);

        let chunk = serialize(&descriptor, &value, 999, 1, 0, &remap).unwrap();
        let decoded = deserialize(&descriptor, &chunk, &remap).unwrap();
        assert_eq!(decoded.as_struct().unwrap().get("value").unwrap().as_dword(), Some(42));
    }

    #[test]
    fn field_gated_by_since_version_is_absent_on_older_data() {
        let mut descriptor = sample_descriptor();
        if let Codec::Reflect(fields) = &mut descriptor.codec {
            fields[0].since_version = 5;
        }
        let remap = IdRemap::new();
        let mut fields = BTreeMap::new();
        fields.insert("value", Value::Dword(42));
        let value = Value::Struct(fields);

        let chunk = serialize(&descriptor, &value, 999, 1, 0, &remap).unwrap();
        let decoded = deserialize(&descriptor, &chunk, &remap).unwrap();
        assert!(decoded.as_struct().unwrap().get("value").is_none());
    }
}
