// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `CKMaterial` (class id 30): shading colors, up to four texture-stage
//! references, and a render-state block.
//!
//! All three blocks are identifier-tagged and independently optional, so a
//! material written by a newer exporter that also writes a block this crate
//! doesn't model still round-trips the blocks it does: unknown identifiers
//! are simply never sought.

use std::collections::BTreeMap;

use crate::chunk::{Chunk, ChunkParser, ChunkWriter, IdRemap};
use crate::error::Result;
use crate::schema::descriptor::TypeDescriptor;
use crate::schema::reflect::Value;
use crate::schema::TypeBuilder;

pub const CLASS_ID: u32 = 30;

const ID_COLORS: u32 = 0x1000;
const ID_TEXTURES: u32 = 0x2000;
const ID_RENDERING: u32 = 0x4000;

const MAX_TEXTURE_STAGES: usize = 4;

pub fn descriptor() -> TypeDescriptor {
    TypeBuilder::new("CKMaterial", CLASS_ID).build_custom(read, write, validate)
}

fn index_key(i: usize) -> &'static str {
    Box::leak(format!("{i:08}").into_boxed_str())
}

fn indexed_map(values: impl IntoIterator<Item = Value>) -> BTreeMap<&'static str, Value> {
    values.into_iter().enumerate().map(|(i, v)| (index_key(i), v)).collect()
}

fn object_id_array(map: &BTreeMap<&'static str, Value>) -> Vec<u32> {
    map.values()
        .filter_map(|v| match v {
            Value::ObjectId(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn read(chunk: &Chunk, remap: &IdRemap) -> Result<Value> {
    let mut fields = BTreeMap::new();

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_COLORS).is_ok() {
        fields.insert("ambient", Value::Color(parser.color()?));
        fields.insert("diffuse", Value::Color(parser.color()?));
        fields.insert("specular", Value::Color(parser.color()?));
        fields.insert("emissive", Value::Color(parser.color()?));
        fields.insert("specular_power", Value::Float(parser.float()?));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_TEXTURES).is_ok() {
        let count = (parser.dword()? as usize).min(MAX_TEXTURE_STAGES);
        let mut textures = Vec::with_capacity(count);
        for _ in 0..count {
            textures.push(Value::ObjectId(parser.object_id(remap)?));
        }
        fields.insert("textures", Value::Struct(indexed_map(textures)));
        fields.insert("blend_mode", Value::Dword(parser.dword()?));
        fields.insert("min_filter", Value::Dword(parser.dword()?));
        fields.insert("mag_filter", Value::Dword(parser.dword()?));
        fields.insert("address_mode", Value::Dword(parser.dword()?));
        fields.insert("border_color", Value::Dword(parser.dword()?));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_RENDERING).is_ok() {
        fields.insert("shade", Value::Dword(parser.dword()?));
        fields.insert("fill", Value::Dword(parser.dword()?));
        fields.insert("alpha_test_enabled", Value::Dword(parser.dword()?));
        fields.insert("alpha_func", Value::Dword(parser.dword()?));
        fields.insert("alpha_ref", Value::Dword(parser.dword()?));
        fields.insert("blend_enabled", Value::Dword(parser.dword()?));
        fields.insert("src_blend", Value::Dword(parser.dword()?));
        fields.insert("dest_blend", Value::Dword(parser.dword()?));
        fields.insert("zwrite", Value::Dword(parser.dword()?));
        fields.insert("ztest", Value::Dword(parser.dword()?));
        fields.insert("two_sided", Value::Dword(parser.dword()?));
    }

    Ok(Value::Struct(fields))
}

fn write(value: &Value, remap: &IdRemap) -> Result<Chunk> {
    let map = value
        .as_struct()
        .ok_or_else(|| crate::error::NmoError::InvalidArgument("CKMaterial expects a struct value".into()))?;

    let mut writer = ChunkWriter::new();

    if let Some(Value::Color(ambient)) = map.get("ambient") {
        let diffuse = color_of(map, "diffuse");
        let specular = color_of(map, "specular");
        let emissive = color_of(map, "emissive");
        let power = match map.get("specular_power") {
            Some(Value::Float(p)) => *p,
            _ => 0.0,
        };
        writer.write_identifier(ID_COLORS)?;
        writer.color(*ambient)?;
        writer.color(diffuse)?;
        writer.color(specular)?;
        writer.color(emissive)?;
        writer.float(power)?;
    }

    if let Some(Value::Struct(textures)) = map.get("textures") {
        let ids = object_id_array(textures);
        if ids.len() > MAX_TEXTURE_STAGES {
            return Err(crate::error::NmoError::InvalidArgument(format!(
                "CKMaterial supports at most {MAX_TEXTURE_STAGES} texture stages, got {}",
                ids.len()
            )));
        }
        writer.write_identifier(ID_TEXTURES)?;
        writer.dword(ids.len() as u32)?;
        for id in ids {
            writer.object_id(id, remap)?;
        }
        writer.dword(dword_of(map, "blend_mode"))?;
        writer.dword(dword_of(map, "min_filter"))?;
        writer.dword(dword_of(map, "mag_filter"))?;
        writer.dword(dword_of(map, "address_mode"))?;
        writer.dword(dword_of(map, "border_color"))?;
    }

    if map.contains_key("shade") {
        writer.write_identifier(ID_RENDERING)?;
        writer.dword(dword_of(map, "shade"))?;
        writer.dword(dword_of(map, "fill"))?;
        writer.dword(dword_of(map, "alpha_test_enabled"))?;
        writer.dword(dword_of(map, "alpha_func"))?;
        writer.dword(dword_of(map, "alpha_ref"))?;
        writer.dword(dword_of(map, "blend_enabled"))?;
        writer.dword(dword_of(map, "src_blend"))?;
        writer.dword(dword_of(map, "dest_blend"))?;
        writer.dword(dword_of(map, "zwrite"))?;
        writer.dword(dword_of(map, "ztest"))?;
        writer.dword(dword_of(map, "two_sided"))?;
    }

    Ok(writer.finalize(CLASS_ID, 1, CLASS_ID as u8))
}

fn dword_of(map: &BTreeMap<&'static str, Value>, key: &str) -> u32 {
    map.get(key).and_then(Value::as_dword).unwrap_or(0)
}

fn color_of(map: &BTreeMap<&'static str, Value>, key: &str) -> [f32; 4] {
    match map.get(key) {
        Some(Value::Color(c)) => *c,
        _ => [0.0, 0.0, 0.0, 1.0],
    }
}

fn validate(_value: &mut Value) {
    // No clamping rules documented for this class.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors_only() -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("diffuse", Value::Color([1.0, 0.0, 0.0, 1.0]));
        fields.insert("ambient", Value::Color([0.2, 0.2, 0.2, 1.0]));
        fields.insert("specular", Value::Color([1.0, 1.0, 1.0, 1.0]));
        fields.insert("emissive", Value::Color([0.0, 0.0, 0.0, 1.0]));
        fields.insert("specular_power", Value::Float(32.0));
        Value::Struct(fields)
    }

    #[test]
    fn colors_round_trip() {
        let remap = IdRemap::new();
        let value = colors_only();
        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("diffuse"), Some(&Value::Color([1.0, 0.0, 0.0, 1.0])));
        assert_eq!(decoded.get("emissive"), Some(&Value::Color([0.0, 0.0, 0.0, 1.0])));
        assert_eq!(decoded.get("specular_power"), Some(&Value::Float(32.0)));
    }

    #[test]
    fn missing_optional_blocks_are_simply_absent() {
        let remap = IdRemap::new();
        let value = colors_only();
        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert!(decoded.get("textures").is_none());
        assert!(decoded.get("shade").is_none());
    }

    #[test]
    fn texture_stage_object_ids_round_trip_through_remap() {
        let mut remap = IdRemap::new();
        remap.extend([(3, 300), (4, 400)]);

        let mut fields = match colors_only() {
            Value::Struct(m) => m,
            _ => unreachable!(),
        };
        fields.insert("textures", Value::Struct(indexed_map(vec![Value::ObjectId(300), Value::ObjectId(400)])));
        fields.insert("blend_mode", Value::Dword(1));
        fields.insert("min_filter", Value::Dword(2));
        fields.insert("mag_filter", Value::Dword(2));
        fields.insert("address_mode", Value::Dword(0));
        fields.insert("border_color", Value::Dword(0xFFFFFFFF));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        let textures = decoded.get("textures").unwrap().as_struct().unwrap();
        assert_eq!(object_id_array(textures), vec![300, 400]);
        assert_eq!(decoded.get("border_color"), Some(&Value::Dword(0xFFFFFFFF)));
    }

    #[test]
    fn rendering_block_round_trips_all_eleven_fields() {
        let remap = IdRemap::new();
        let mut fields = match colors_only() {
            Value::Struct(m) => m,
            _ => unreachable!(),
        };
        fields.insert("shade", Value::Dword(1));
        fields.insert("fill", Value::Dword(1));
        fields.insert("alpha_test_enabled", Value::Dword(1));
        fields.insert("alpha_func", Value::Dword(7));
        fields.insert("alpha_ref", Value::Dword(128));
        fields.insert("blend_enabled", Value::Dword(1));
        fields.insert("src_blend", Value::Dword(5));
        fields.insert("dest_blend", Value::Dword(6));
        fields.insert("zwrite", Value::Dword(1));
        fields.insert("ztest", Value::Dword(1));
        fields.insert("two_sided", Value::Dword(0));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("alpha_ref"), Some(&Value::Dword(128)));
        assert_eq!(decoded.get("two_sided"), Some(&Value::Dword(0)));
    }

    #[test]
    fn too_many_texture_stages_is_rejected() {
        let remap = IdRemap::new();
        let mut fields = match colors_only() {
            Value::Struct(m) => m,
            _ => unreachable!(),
        };
        fields.insert(
            "textures",
            Value::Struct(indexed_map(vec![
                Value::ObjectId(1),
                Value::ObjectId(2),
                Value::ObjectId(3),
                Value::ObjectId(4),
                Value::ObjectId(5),
            ])),
        );
        fields.insert("blend_mode", Value::Dword(0));
        fields.insert("min_filter", Value::Dword(0));
        fields.insert("mag_filter", Value::Dword(0));
        fields.insert("address_mode", Value::Dword(0));
        fields.insert("border_color", Value::Dword(0));
        let value = Value::Struct(fields);

        assert!(write(&value, &remap).is_err());
    }
}
