// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `CKMesh` (`data_version >= 9`): vertex/index geometry, material groups,
//! optional per-face line/channel data, vertex weights, and a progressive-mesh
//! tail preserved opaquely past the fields this crate understands.
//!
//! The spec gives no numeric class id for `CKMesh` (unlike `CKMaterial`,
//! `CKLight`, `CKSpriteText`); [`CLASS_ID`] below is this crate's own
//! assignment, chosen clear of the three documented ids (29, 30, 38). See
//! `DESIGN.md`.
//!
//! Per-section "uniform" compression (spec §4.J): a vertex-block component
//! whose values are all identical is written once and expanded back to the
//! full vertex count on load, rather than threading an explicit flag through
//! [`Value`] — `finish_loading(deserialize(serialize(s))) = s up to documented
//! normalization` (spec §8 invariant 8) already permits this kind of
//! expansion.

use std::collections::BTreeMap;

use crate::chunk::{Chunk, ChunkParser, ChunkWriter, IdRemap};
use crate::error::{NmoError, Result};
use crate::schema::descriptor::TypeDescriptor;
use crate::schema::reflect::Value;
use crate::schema::TypeBuilder;

/// Not specified by the format; see module docs.
pub const CLASS_ID: u32 = 1_000_000;
pub const MIN_DATA_VERSION: u8 = 9;

const ID_FLAGS: u32 = 0x2000;
const ID_MATERIAL_GROUPS: u32 = 0x100000;
const ID_VERTEX_BLOCK: u32 = 0x20000;
const ID_FACE_BLOCK: u32 = 0x10000;
const ID_LINES: u32 = 0x40000;
const ID_MATERIAL_CHANNELS: u32 = 0x4000;
const ID_VERTEX_WEIGHTS: u32 = 0x80000;
const ID_FACE_MASKS: u32 = 0x8000;
const ID_PROGRESSIVE: u32 = 0x800000;
/// Not part of the documented identifier catalog; carries optional LOD
/// sub-meshes as inline sub-chunks (spec §4.C/§4.D), one level past what the
/// distilled spec names. See `DESIGN.md`.
const ID_LODS: u32 = 0x1000000;

const FLAGS_MASK: u32 = 0x7FE39A;

const POS_PRESENT: u32 = 1 << 0;
const POS_UNIFORM: u32 = 1 << 1;
const COLOR1_PRESENT: u32 = 1 << 2;
const COLOR1_UNIFORM: u32 = 1 << 3;
const SPECULAR_PRESENT: u32 = 1 << 4;
const SPECULAR_UNIFORM: u32 = 1 << 5;
const NORMAL_PRESENT: u32 = 1 << 6;
const NORMAL_UNIFORM: u32 = 1 << 7;
const UV_PRESENT: u32 = 1 << 8;
const UV_UNIFORM: u32 = 1 << 9;

pub fn descriptor() -> TypeDescriptor {
    TypeBuilder::new("CKMesh", CLASS_ID).build_custom(read, write, validate)
}

// `Value::Struct` keys are `&'static str`; a per-element array index has no
// such constant to borrow, so it is deliberately leaked (decode happens once
// per loaded mesh, not in a hot allocation loop). Keys are zero-padded so
// `BTreeMap`'s lexical key order matches the array's numeric order past 9
// elements.
fn index_key(i: usize) -> &'static str {
    Box::leak(format!("{i:08}").into_boxed_str())
}

fn indexed_map(values: impl IntoIterator<Item = Value>) -> BTreeMap<&'static str, Value> {
    values.into_iter().enumerate().map(|(i, v)| (index_key(i), v)).collect()
}

fn ordered_values(map: &BTreeMap<&'static str, Value>) -> impl Iterator<Item = &Value> {
    map.values()
}

fn vec3_array(map: &BTreeMap<&'static str, Value>) -> Vec<[f32; 3]> {
    ordered_values(map)
        .filter_map(|v| match v {
            Value::Vector3(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn vec2_array(map: &BTreeMap<&'static str, Value>) -> Vec<[f32; 2]> {
    ordered_values(map)
        .filter_map(|v| match v {
            Value::Vector2(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn dword_array(map: &BTreeMap<&'static str, Value>) -> Vec<u32> {
    ordered_values(map).filter_map(Value::as_dword).collect()
}

fn float_array(map: &BTreeMap<&'static str, Value>) -> Vec<f32> {
    ordered_values(map).filter_map(Value::as_float).collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| s.get(i..i + 2))
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

/// `true` iff every element of a non-empty slice equals the first.
fn is_uniform<T: PartialEq>(values: &[T]) -> bool {
    match values.first() {
        Some(first) => values.iter().all(|v| v == first),
        None => false,
    }
}

fn read_vertex_component_f32x3(parser: &mut ChunkParser<'_>, present: bool, uniform: bool, count: usize) -> Result<Option<Vec<[f32; 3]>>> {
    if !present {
        return Ok(None);
    }
    if uniform {
        let one = parser.vector3()?;
        Ok(Some(vec![one; count]))
    } else {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(parser.vector3()?);
        }
        Ok(Some(out))
    }
}

fn read_vertex_component_f32x2(parser: &mut ChunkParser<'_>, present: bool, uniform: bool, count: usize) -> Result<Option<Vec<[f32; 2]>>> {
    if !present {
        return Ok(None);
    }
    if uniform {
        let one = parser.vector2()?;
        Ok(Some(vec![one; count]))
    } else {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(parser.vector2()?);
        }
        Ok(Some(out))
    }
}

fn read_vertex_component_dword(parser: &mut ChunkParser<'_>, present: bool, uniform: bool, count: usize) -> Result<Option<Vec<u32>>> {
    if !present {
        return Ok(None);
    }
    if uniform {
        let one = parser.dword()?;
        Ok(Some(vec![one; count]))
    } else {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(parser.dword()?);
        }
        Ok(Some(out))
    }
}

fn write_vertex_component_f32x3(writer: &mut ChunkWriter, values: &[[f32; 3]]) -> Result<bool> {
    let uniform = is_uniform(values);
    if uniform {
        writer.vector3(values[0])?;
    } else {
        for v in values {
            writer.vector3(*v)?;
        }
    }
    Ok(uniform)
}

fn write_vertex_component_f32x2(writer: &mut ChunkWriter, values: &[[f32; 2]]) -> Result<bool> {
    let uniform = is_uniform(values);
    if uniform {
        writer.vector2(values[0])?;
    } else {
        for v in values {
            writer.vector2(*v)?;
        }
    }
    Ok(uniform)
}

fn write_vertex_component_dword(writer: &mut ChunkWriter, values: &[u32]) -> Result<bool> {
    let uniform = is_uniform(values);
    if uniform {
        writer.dword(values[0])?;
    } else {
        for v in values {
            writer.dword(*v)?;
        }
    }
    Ok(uniform)
}

fn read(chunk: &Chunk, remap: &IdRemap) -> Result<Value> {
    if chunk.data_version < MIN_DATA_VERSION {
        return Err(NmoError::UnsupportedVersion {
            version: chunk.data_version as u32,
        });
    }

    let mut fields = BTreeMap::new();
    let mut face_count = 0usize;

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_FLAGS).is_ok() {
        fields.insert("flags", Value::Dword(parser.dword()? & FLAGS_MASK));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_MATERIAL_GROUPS).is_ok() {
        let count = parser.dword()? as usize;
        let mut groups = Vec::with_capacity(count);
        for _ in 0..count {
            let object_id = parser.object_id(remap)?;
            let _zero_pad = parser.dword()?;
            groups.push(Value::ObjectId(object_id));
        }
        fields.insert("material_groups", Value::Struct(indexed_map(groups)));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_VERTEX_BLOCK).is_ok() {
        let count = parser.dword()? as usize;
        let save_flags = parser.dword()?;

        if let Some(values) = read_vertex_component_f32x3(&mut parser, save_flags & POS_PRESENT != 0, save_flags & POS_UNIFORM != 0, count)? {
            fields.insert("positions", Value::Struct(indexed_map(values.into_iter().map(Value::Vector3))));
        }
        if let Some(values) = read_vertex_component_dword(&mut parser, save_flags & COLOR1_PRESENT != 0, save_flags & COLOR1_UNIFORM != 0, count)? {
            fields.insert("color1", Value::Struct(indexed_map(values.into_iter().map(Value::Dword))));
        }
        if let Some(values) = read_vertex_component_dword(&mut parser, save_flags & SPECULAR_PRESENT != 0, save_flags & SPECULAR_UNIFORM != 0, count)? {
            fields.insert("specular", Value::Struct(indexed_map(values.into_iter().map(Value::Dword))));
        }
        if let Some(values) = read_vertex_component_f32x3(&mut parser, save_flags & NORMAL_PRESENT != 0, save_flags & NORMAL_UNIFORM != 0, count)? {
            fields.insert("normals", Value::Struct(indexed_map(values.into_iter().map(Value::Vector3))));
        }
        if let Some(values) = read_vertex_component_f32x2(&mut parser, save_flags & UV_PRESENT != 0, save_flags & UV_UNIFORM != 0, count)? {
            fields.insert("uvs", Value::Struct(indexed_map(values.into_iter().map(Value::Vector2))));
        }
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_FACE_BLOCK).is_ok() {
        let count = parser.dword()? as usize;
        face_count = count;
        let mut faces = Vec::with_capacity(count);
        for _ in 0..count {
            let packed0 = parser.dword()?;
            let packed1 = parser.dword()?;
            let index0 = packed0 & 0xFFFF;
            let index1 = packed0 >> 16;
            let index2 = packed1 & 0xFFFF;
            let material_group = packed1 >> 16;
            let mut face = BTreeMap::new();
            face.insert("index0", Value::Dword(index0));
            face.insert("index1", Value::Dword(index1));
            face.insert("index2", Value::Dword(index2));
            face.insert("material_group", Value::Dword(material_group));
            faces.push(Value::Struct(face));
        }
        fields.insert("faces", Value::Struct(indexed_map(faces)));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_LINES).is_ok() {
        let line_count = parser.dword()? as usize;
        let flat = parser.buffer_nosize_lendian16(line_count * 2)?;
        let lines = flat.chunks_exact(2).map(|pair| {
            let mut line = BTreeMap::new();
            line.insert("a", Value::Dword(pair[0] as u32));
            line.insert("b", Value::Dword(pair[1] as u32));
            Value::Struct(line)
        });
        fields.insert("lines", Value::Struct(indexed_map(lines)));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_MATERIAL_CHANNELS).is_ok() {
        let count = parser.dword()? as usize;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let object_id = parser.object_id(remap)?;
            let flags = parser.dword()?;
            let src_blend = parser.dword()?;
            let dst_blend = parser.dword()?;
            let uv_count = parser.dword()? as usize;
            let mut uvs = Vec::with_capacity(uv_count);
            for _ in 0..uv_count {
                uvs.push(Value::Vector2(parser.vector2()?));
            }
            let mut channel = BTreeMap::new();
            channel.insert("object_id", Value::ObjectId(object_id));
            channel.insert("flags", Value::Dword(flags));
            channel.insert("src_blend", Value::Dword(src_blend));
            channel.insert("dst_blend", Value::Dword(dst_blend));
            channel.insert("uvs", Value::Struct(indexed_map(uvs)));
            channels.push(Value::Struct(channel));
        }
        fields.insert("channels", Value::Struct(indexed_map(channels)));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_VERTEX_WEIGHTS).is_ok() {
        let count = parser.dword()? as usize;
        let uniform = parser.dword()? != 0;
        let weights = if uniform {
            let one = parser.float()?;
            vec![one; count]
        } else {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                out.push(parser.float()?);
            }
            out
        };
        fields.insert("vertex_weights", Value::Struct(indexed_map(weights.into_iter().map(Value::Float))));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_FACE_MASKS).is_ok() {
        let masks = parser.buffer_nosize_lendian16(face_count)?;
        fields.insert("face_masks", Value::Struct(indexed_map(masks.into_iter().map(|m| Value::Dword(m as u32)))));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_PROGRESSIVE).is_ok() {
        let a = parser.int()?;
        let b = parser.int()?;
        let c = parser.int()?;
        let remaining_dwords = &chunk.data[parser.cursor()..];
        let mut tail_bytes = Vec::with_capacity(remaining_dwords.len() * 4);
        for dword in remaining_dwords {
            tail_bytes.extend_from_slice(&dword.to_le_bytes());
        }
        let mut progressive = BTreeMap::new();
        progressive.insert("a", Value::Int(a));
        progressive.insert("b", Value::Int(b));
        progressive.insert("c", Value::Int(c));
        progressive.insert("tail", Value::String(hex_encode(&tail_bytes)));
        fields.insert("progressive_mesh", Value::Struct(progressive));
    }

    if chunk.options.contains(crate::chunk::ChunkOptions::CHN) {
        let mut parser = ChunkParser::new(chunk);
        if parser.seek_identifier(ID_LODS).is_ok() {
            let lod_count = parser.dword()? as usize;
            let mut lods = Vec::with_capacity(lod_count);
            for _ in 0..lod_count {
                if let Some(sub) = parser.read_subchunk()? {
                    lods.push(read(&sub, remap)?);
                }
            }
            fields.insert("lods", Value::Struct(indexed_map(lods)));
        }
    }

    Ok(Value::Struct(fields))
}

fn write(value: &Value, remap: &IdRemap) -> Result<Chunk> {
    let map = value
        .as_struct()
        .ok_or_else(|| NmoError::InvalidArgument("CKMesh expects a struct value".into()))?;

    let mut writer = ChunkWriter::new();

    if let Some(Value::Dword(flags)) = map.get("flags") {
        writer.write_identifier(ID_FLAGS)?;
        writer.dword(flags & FLAGS_MASK)?;
    }

    if let Some(Value::Struct(groups)) = map.get("material_groups") {
        let ids = dword_array_object(groups);
        writer.write_identifier(ID_MATERIAL_GROUPS)?;
        writer.dword(ids.len() as u32)?;
        for id in ids {
            writer.object_id(id, remap)?;
            writer.dword(0)?;
        }
    }

    let positions = map.get("positions").and_then(Value::as_struct).map(vec3_array);
    let color1 = map.get("color1").and_then(Value::as_struct).map(dword_array);
    let specular = map.get("specular").and_then(Value::as_struct).map(dword_array);
    let normals = map.get("normals").and_then(Value::as_struct).map(vec3_array);
    let uvs = map.get("uvs").and_then(Value::as_struct).map(vec2_array);
    if positions.is_some() || color1.is_some() || specular.is_some() || normals.is_some() || uvs.is_some() {
        let count = [
            positions.as_ref().map(Vec::len),
            color1.as_ref().map(Vec::len),
            specular.as_ref().map(Vec::len),
            normals.as_ref().map(Vec::len),
            uvs.as_ref().map(Vec::len),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);

        let mut save_flags = 0u32;
        // Reserve the header position, then back-patch save_flags once every
        // component's uniformity has been determined.
        writer.write_identifier(ID_VERTEX_BLOCK)?;
        writer.dword(count as u32)?;
        let save_flags_dword_pos = chunk_writer_reserve(&mut writer)?;

        if let Some(values) = &positions {
            save_flags |= POS_PRESENT;
            if write_vertex_component_f32x3(&mut writer, values)? {
                save_flags |= POS_UNIFORM;
            }
        }
        if let Some(values) = &color1 {
            save_flags |= COLOR1_PRESENT;
            if write_vertex_component_dword(&mut writer, values)? {
                save_flags |= COLOR1_UNIFORM;
            }
        }
        if let Some(values) = &specular {
            save_flags |= SPECULAR_PRESENT;
            if write_vertex_component_dword(&mut writer, values)? {
                save_flags |= SPECULAR_UNIFORM;
            }
        }
        if let Some(values) = &normals {
            save_flags |= NORMAL_PRESENT;
            if write_vertex_component_f32x3(&mut writer, values)? {
                save_flags |= NORMAL_UNIFORM;
            }
        }
        if let Some(values) = &uvs {
            save_flags |= UV_PRESENT;
            if write_vertex_component_f32x2(&mut writer, values)? {
                save_flags |= UV_UNIFORM;
            }
        }
        writer.poke_dword(save_flags_dword_pos, save_flags);
    }

    let mut face_count = 0usize;
    if let Some(Value::Struct(faces)) = map.get("faces") {
        face_count = faces.len();
        writer.write_identifier(ID_FACE_BLOCK)?;
        writer.dword(faces.len() as u32)?;
        for face in ordered_values(faces) {
            let face = face.as_struct().ok_or_else(|| NmoError::InvalidArgument("mesh face must be a struct".into()))?;
            let index0 = face.get("index0").and_then(Value::as_dword).unwrap_or(0);
            let index1 = face.get("index1").and_then(Value::as_dword).unwrap_or(0);
            let index2 = face.get("index2").and_then(Value::as_dword).unwrap_or(0);
            let material_group = face.get("material_group").and_then(Value::as_dword).unwrap_or(0);
            writer.dword((index0 & 0xFFFF) | ((index1 & 0xFFFF) << 16))?;
            writer.dword((index2 & 0xFFFF) | ((material_group & 0xFFFF) << 16))?;
        }
    }

    if let Some(Value::Struct(lines)) = map.get("lines") {
        let flat: Vec<u16> = ordered_values(lines)
            .flat_map(|line| match line.as_struct() {
                Some(line) => {
                    let a = line.get("a").and_then(Value::as_dword).unwrap_or(0) as u16;
                    let b = line.get("b").and_then(Value::as_dword).unwrap_or(0) as u16;
                    [a, b]
                }
                None => [0, 0],
            })
            .collect();
        writer.write_identifier(ID_LINES)?;
        writer.dword(lines.len() as u32)?;
        writer.buffer_nosize_lendian16(&flat)?;
    }

    if let Some(Value::Struct(channels)) = map.get("channels") {
        writer.write_identifier(ID_MATERIAL_CHANNELS)?;
        writer.dword(channels.len() as u32)?;
        for channel in ordered_values(channels) {
            let channel = channel.as_struct().ok_or_else(|| NmoError::InvalidArgument("mesh channel must be a struct".into()))?;
            let object_id = match channel.get("object_id") {
                Some(Value::ObjectId(id)) => *id,
                _ => 0,
            };
            writer.object_id(object_id, remap)?;
            writer.dword(channel.get("flags").and_then(Value::as_dword).unwrap_or(0))?;
            writer.dword(channel.get("src_blend").and_then(Value::as_dword).unwrap_or(0))?;
            writer.dword(channel.get("dst_blend").and_then(Value::as_dword).unwrap_or(0))?;
            let uvs = channel.get("uvs").and_then(Value::as_struct).map(vec2_array).unwrap_or_default();
            writer.dword(uvs.len() as u32)?;
            for uv in uvs {
                writer.vector2(uv)?;
            }
        }
    }

    if let Some(Value::Struct(weights)) = map.get("vertex_weights") {
        let values = float_array(weights);
        let uniform = is_uniform(&values);
        writer.write_identifier(ID_VERTEX_WEIGHTS)?;
        writer.dword(values.len() as u32)?;
        writer.dword(uniform as u32)?;
        if uniform && !values.is_empty() {
            writer.float(values[0])?;
        } else {
            for v in &values {
                writer.float(*v)?;
            }
        }
    }

    if let Some(Value::Struct(masks)) = map.get("face_masks") {
        let values: Vec<u16> = dword_array(masks).into_iter().map(|m| m as u16).collect();
        if values.len() != face_count {
            return Err(NmoError::InvalidArgument(format!(
                "face_masks has {} entries but the face block has {face_count}",
                values.len()
            )));
        }
        writer.write_identifier(ID_FACE_MASKS)?;
        writer.buffer_nosize_lendian16(&values)?;
    }

    if let Some(Value::Struct(progressive)) = map.get("progressive_mesh") {
        let a = match progressive.get("a") {
            Some(Value::Int(v)) => *v,
            _ => 0,
        };
        let b = match progressive.get("b") {
            Some(Value::Int(v)) => *v,
            _ => 0,
        };
        let c = match progressive.get("c") {
            Some(Value::Int(v)) => *v,
            _ => 0,
        };
        let tail = match progressive.get("tail") {
            Some(Value::String(s)) => hex_decode(s),
            _ => Vec::new(),
        };
        writer.write_identifier(ID_PROGRESSIVE)?;
        writer.int(a)?;
        writer.int(b)?;
        writer.int(c)?;
        writer.bytes_nosize(&tail)?;
    }

    if let Some(Value::Struct(lods)) = map.get("lods") {
        writer.write_identifier(ID_LODS)?;
        writer.dword(lods.len() as u32)?;
        for lod in ordered_values(lods) {
            let sub = write(lod, remap)?;
            writer.write_subchunk(&sub)?;
        }
    }

    Ok(writer.finalize(CLASS_ID, MIN_DATA_VERSION, CLASS_ID as u8))
}

fn dword_array_object(map: &BTreeMap<&'static str, Value>) -> Vec<u32> {
    ordered_values(map)
        .filter_map(|v| match v {
            Value::ObjectId(id) => Some(*id),
            _ => None,
        })
        .collect()
}

/// Reserves one dword for the vertex block's `save_flags`, to be filled in
/// once every component's uniformity has been decided.
fn chunk_writer_reserve(writer: &mut ChunkWriter) -> Result<usize> {
    let pos = writer.len();
    writer.dword(0)?;
    Ok(pos)
}



fn validate(value: &mut Value) {
    let Value::Struct(map) = value else { return };
    if let Some(Value::Dword(flags)) = map.get("flags").cloned() {
        map.insert("flags", Value::Dword(flags & FLAGS_MASK));
    }
}
