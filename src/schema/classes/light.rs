// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `CKLight` (class id 38, `data_version >= 5`): point/spot/directional light
//! parameters.
//!
//! Data version gates the whole layout, not just individual fields: chunks
//! with `data_version < 5` were written before the identifier-tagged layout
//! existed and are read back positionally instead (spec §4.J). A light
//! re-saved by this crate is always written in the modern, identifier-tagged
//! layout regardless of the version it was loaded from.
//!
//! `diffuse` is stored on the wire as a single packed ARGB `u32`, which is
//! integer-lossy on round-trip (spec §8 scenario 6); this crate exposes it to
//! callers as a [`Value::Color`] and quantizes on write.

use std::collections::BTreeMap;

use crate::chunk::{Chunk, ChunkParser, ChunkWriter, IdRemap};
use crate::error::Result;
use crate::schema::descriptor::TypeDescriptor;
use crate::schema::reflect::Value;
use crate::schema::TypeBuilder;

pub const CLASS_ID: u32 = 38;

/// First `data_version` that uses the identifier-tagged layout.
const MODERN_SINCE_VERSION: u8 = 5;

const ID_BASIC: u32 = 0x400000;
const ID_POWER: u32 = 0x800000;

pub const LIGHT_TYPE_POINT: u32 = 0;
pub const LIGHT_TYPE_SPOT: u32 = 1;
pub const LIGHT_TYPE_DIRECTIONAL: u32 = 2;

const DEFAULT_POWER: f32 = 1.0;

pub fn descriptor() -> TypeDescriptor {
    TypeBuilder::new("CKLight", CLASS_ID).build_custom(read, write, validate)
}

fn pack_type_and_flags(light_type: u32, flags: u32) -> u32 {
    (light_type & 0xFF) | (flags << 8)
}

fn unpack_type_and_flags(packed: u32) -> (u32, u32) {
    (packed & 0xFF, packed >> 8)
}

/// Quantizes a float color to 8 bits per channel and packs it
/// `0xAARRGGBB`, matching the on-wire ARGB representation.
fn pack_argb(c: [f32; 4]) -> u32 {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (q(c[3]) << 24) | (q(c[0]) << 16) | (q(c[1]) << 8) | q(c[2])
}

fn unpack_argb(packed: u32) -> [f32; 4] {
    let a = ((packed >> 24) & 0xFF) as f32 / 255.0;
    let r = ((packed >> 16) & 0xFF) as f32 / 255.0;
    let g = ((packed >> 8) & 0xFF) as f32 / 255.0;
    let b = (packed & 0xFF) as f32 / 255.0;
    [r, g, b, a]
}

fn read(chunk: &Chunk, _remap: &IdRemap) -> Result<Value> {
    let mut fields = BTreeMap::new();

    if chunk.data_version < MODERN_SINCE_VERSION {
        let mut parser = ChunkParser::new(chunk);
        parser.start_read_sequence();
        fields.insert("light_type", Value::Dword(parser.dword()?));
        let r = parser.float()?;
        let g = parser.float()?;
        let b = parser.float()?;
        let _skipped_alpha = parser.float()?;
        fields.insert("diffuse", Value::Color([r, g, b, 1.0]));
        fields.insert("active", Value::Int(parser.int()?));
        fields.insert("specular_enabled", Value::Int(parser.int()?));
        fields.insert("outer_cone", Value::Float(parser.float()?));
        fields.insert("inner_cone", Value::Float(parser.float()?));
        fields.insert("falloff", Value::Float(parser.float()?));
        fields.insert("range", Value::Float(parser.float()?));
        fields.insert("constant_attenuation", Value::Float(parser.float()?));
        fields.insert("linear_attenuation", Value::Float(parser.float()?));
        fields.insert("quadratic_attenuation", Value::Float(parser.float()?));
        fields.insert("light_power", Value::Float(DEFAULT_POWER));
        return Ok(Value::Struct(fields));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_BASIC).is_ok() {
        let (light_type, flags) = unpack_type_and_flags(parser.dword()?);
        fields.insert("light_type", Value::Dword(light_type));
        fields.insert("flags", Value::Dword(flags));
        fields.insert("diffuse", Value::Color(unpack_argb(parser.dword()?)));
        fields.insert("constant_attenuation", Value::Float(parser.float()?));
        fields.insert("linear_attenuation", Value::Float(parser.float()?));
        fields.insert("quadratic_attenuation", Value::Float(parser.float()?));
        fields.insert("range", Value::Float(parser.float()?));
        if light_type == LIGHT_TYPE_SPOT {
            fields.insert("outer_cone", Value::Float(parser.float()?));
            fields.insert("inner_cone", Value::Float(parser.float()?));
            fields.insert("falloff", Value::Float(parser.float()?));
        }
    }

    let mut parser = ChunkParser::new(chunk);
    fields.insert(
        "light_power",
        Value::Float(if parser.seek_identifier(ID_POWER).is_ok() { parser.float()? } else { DEFAULT_POWER }),
    );

    Ok(Value::Struct(fields))
}

fn write(value: &Value, _remap: &IdRemap) -> Result<Chunk> {
    let map = value
        .as_struct()
        .ok_or_else(|| crate::error::NmoError::InvalidArgument("CKLight expects a struct value".into()))?;

    let light_type = dword_of(map, "light_type");
    let flags = dword_of(map, "flags");
    let power = float_of(map, "light_power").unwrap_or(DEFAULT_POWER);

    let mut writer = ChunkWriter::new();
    writer.write_identifier(ID_BASIC)?;
    writer.dword(pack_type_and_flags(light_type, flags))?;
    writer.dword(pack_argb(color_of(map, "diffuse")))?;
    writer.float(float_of(map, "constant_attenuation").unwrap_or(0.0))?;
    writer.float(float_of(map, "linear_attenuation").unwrap_or(0.0))?;
    writer.float(float_of(map, "quadratic_attenuation").unwrap_or(0.0))?;
    writer.float(float_of(map, "range").unwrap_or(0.0))?;
    if light_type == LIGHT_TYPE_SPOT {
        writer.float(float_of(map, "outer_cone").unwrap_or(0.0))?;
        writer.float(float_of(map, "inner_cone").unwrap_or(0.0))?;
        writer.float(float_of(map, "falloff").unwrap_or(0.0))?;
    }

    if power != DEFAULT_POWER {
        writer.write_identifier(ID_POWER)?;
        writer.float(power)?;
    }

    Ok(writer.finalize(CLASS_ID, MODERN_SINCE_VERSION, CLASS_ID as u8))
}

fn dword_of(map: &BTreeMap<&'static str, Value>, key: &str) -> u32 {
    map.get(key).and_then(Value::as_dword).unwrap_or(0)
}

fn float_of(map: &BTreeMap<&'static str, Value>, key: &str) -> Option<f32> {
    map.get(key).and_then(Value::as_float)
}

fn color_of(map: &BTreeMap<&'static str, Value>, key: &str) -> [f32; 4] {
    match map.get(key) {
        Some(Value::Color(c)) => *c,
        _ => [1.0, 1.0, 1.0, 1.0],
    }
}

fn validate(_value: &mut Value) {
    // No clamping documented for this class.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_light() -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("light_type", Value::Dword(LIGHT_TYPE_POINT));
        fields.insert("flags", Value::Dword(0x0100));
        fields.insert("diffuse", Value::Color([0.5, 0.25, 0.125, 1.0]));
        fields.insert("range", Value::Float(100.0));
        fields.insert("constant_attenuation", Value::Float(1.0));
        fields.insert("linear_attenuation", Value::Float(0.0));
        fields.insert("quadratic_attenuation", Value::Float(0.0));
        fields.insert("light_power", Value::Float(2.0));
        Value::Struct(fields)
    }

    #[test]
    fn modern_point_light_round_trip_matches_spec_scenario() {
        // spec §8 scenario 6
        let remap = IdRemap::new();
        let value = point_light();
        let chunk = write(&value, &remap).unwrap();

        let mut probe = ChunkParser::new(&chunk);
        assert!(probe.seek_identifier(ID_BASIC).is_ok());
        let mut probe = ChunkParser::new(&chunk);
        assert!(probe.seek_identifier(ID_POWER).is_ok());

        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("range"), Some(&Value::Float(100.0)));
        assert_eq!(decoded.get("light_power"), Some(&Value::Float(2.0)));
        assert!(decoded.get("outer_cone").is_none());
        match decoded.get("diffuse") {
            Some(Value::Color(c)) => {
                for (a, b) in c.iter().zip([0.5, 0.25, 0.125, 1.0].iter()) {
                    assert!((a - b).abs() < 1.0 / 255.0, "{a} vs {b}");
                }
            }
            other => panic!("expected a color, got {other:?}"),
        }
    }

    #[test]
    fn default_power_is_omitted_from_the_wire() {
        let remap = IdRemap::new();
        let mut fields = match point_light() {
            Value::Struct(m) => m,
            _ => unreachable!(),
        };
        fields.insert("light_power", Value::Float(DEFAULT_POWER));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let mut probe = ChunkParser::new(&chunk);
        assert!(probe.seek_identifier(ID_POWER).is_err());
    }

    #[test]
    fn spot_triplet_round_trips_only_for_spot_type() {
        let remap = IdRemap::new();
        let mut fields = match point_light() {
            Value::Struct(m) => m,
            _ => unreachable!(),
        };
        fields.insert("light_type", Value::Dword(LIGHT_TYPE_SPOT));
        fields.insert("outer_cone", Value::Float(0.6));
        fields.insert("inner_cone", Value::Float(0.3));
        fields.insert("falloff", Value::Float(1.0));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("outer_cone"), Some(&Value::Float(0.6)));
    }

    #[test]
    fn legacy_data_version_reads_positionally() {
        let mut legacy = ChunkWriter::new();
        legacy.dword(LIGHT_TYPE_POINT).unwrap();
        legacy.float(0.5).unwrap();
        legacy.float(0.5).unwrap();
        legacy.float(0.5).unwrap();
        legacy.float(1.0).unwrap(); // skipped alpha
        legacy.int(1).unwrap(); // active
        legacy.int(0).unwrap(); // specular_enabled
        legacy.float(0.0).unwrap(); // outer_cone
        legacy.float(0.0).unwrap(); // inner_cone
        legacy.float(0.0).unwrap(); // falloff
        legacy.float(50.0).unwrap(); // range
        legacy.float(1.0).unwrap();
        legacy.float(0.0).unwrap();
        legacy.float(0.0).unwrap();
        let chunk = legacy.finalize(CLASS_ID, 1, CLASS_ID as u8);

        let remap = IdRemap::new();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("light_type"), Some(&Value::Dword(LIGHT_TYPE_POINT)));
        assert_eq!(decoded.get("range"), Some(&Value::Float(50.0)));
        assert_eq!(decoded.get("light_power"), Some(&Value::Float(DEFAULT_POWER)));
    }
}
