// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `CKSpriteText` (class id 29, `data_version >= 5`): a screen-space text
//! sprite with a font description and fill color.
//!
//! [`finish_loading`] normalizes a handful of fields a malformed or
//! hand-edited file can carry out of range, matching what the generic
//! reflection path can't do on its own: clamping and defaulting, not pure
//! decoding.

use std::collections::BTreeMap;

use crate::chunk::{Chunk, ChunkParser, ChunkWriter, IdRemap};
use crate::error::{NmoError, Result};
use crate::schema::descriptor::TypeDescriptor;
use crate::schema::reflect::Value;
use crate::schema::TypeBuilder;

pub const CLASS_ID: u32 = 29;
pub const MIN_DATA_VERSION: u8 = 5;

const ID_TEXT: u32 = 0x01000000;
const ID_FONT: u32 = 0x02000000;
const ID_COLOR: u32 = 0x04000000;

const FONT_SIZE_MIN: u32 = 6;
const FONT_SIZE_MAX: u32 = 128;
const FONT_WEIGHT_MIN: u32 = 100;
const FONT_WEIGHT_MAX: u32 = 900;
const FALLBACK_FONT_NAME: &str = "Arial";

pub fn descriptor() -> TypeDescriptor {
    TypeBuilder::new("CKSpriteText", CLASS_ID).build_custom(read, write, validate)
}

fn read(chunk: &Chunk, _remap: &IdRemap) -> Result<Value> {
    if chunk.data_version < MIN_DATA_VERSION {
        return Err(NmoError::UnsupportedVersion {
            version: chunk.data_version as u32,
        });
    }

    let mut fields = BTreeMap::new();

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_TEXT).is_ok() {
        fields.insert("text", Value::String(parser.string()?));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_FONT).is_ok() {
        fields.insert("font_name", Value::String(parser.string()?));
        fields.insert("font_size", Value::Int(parser.int()?));
        fields.insert("font_weight", Value::Int(parser.int()?));
        fields.insert("font_italic", Value::Int(parser.int()?));
        fields.insert("font_charset", Value::Int(parser.int()?));
    }

    let mut parser = ChunkParser::new(chunk);
    if parser.seek_identifier(ID_COLOR).is_ok() {
        fields.insert("font_color", Value::Dword(parser.dword()?));
        fields.insert("background_color", Value::Dword(parser.dword()?));
    }

    let mut value = Value::Struct(fields);
    validate(&mut value);
    Ok(value)
}

fn write(value: &Value, _remap: &IdRemap) -> Result<Chunk> {
    let mut value = value.clone();
    validate(&mut value);
    let map = value
        .as_struct()
        .ok_or_else(|| crate::error::NmoError::InvalidArgument("CKSpriteText expects a struct value".into()))?;

    let mut writer = ChunkWriter::new();
    if let Some(Value::String(text)) = map.get("text") {
        writer.write_identifier(ID_TEXT)?;
        writer.string(text)?;
    }
    if map.contains_key("font_name") || map.contains_key("font_size") {
        let name = match map.get("font_name") {
            Some(Value::String(s)) => s.as_str(),
            _ => FALLBACK_FONT_NAME,
        };
        let size = map.get("font_size").and_then(Value::as_int).unwrap_or(FONT_SIZE_MIN as i32);
        let weight = map.get("font_weight").and_then(Value::as_int).unwrap_or(FONT_WEIGHT_MIN as i32);
        let italic = map.get("font_italic").and_then(Value::as_int).unwrap_or(0);
        let charset = map.get("font_charset").and_then(Value::as_int).unwrap_or(0);

        writer.write_identifier(ID_FONT)?;
        writer.string(name)?;
        writer.int(size)?;
        writer.int(weight)?;
        writer.int(italic)?;
        writer.int(charset)?;
    }
    if map.contains_key("font_color") || map.contains_key("background_color") {
        let font_color = map.get("font_color").and_then(Value::as_dword).unwrap_or(0);
        let background_color = map.get("background_color").and_then(Value::as_dword).unwrap_or(0);
        writer.write_identifier(ID_COLOR)?;
        writer.dword(font_color)?;
        writer.dword(background_color)?;
    }

    Ok(writer.finalize(CLASS_ID, MIN_DATA_VERSION, CLASS_ID as u8))
}

/// Clamps `font_size` to `[6, 128]`, `font_weight` to `[100, 900]`, coerces
/// `font_italic` to `{0, 1}`, and falls back to `"Arial"` for an empty or
/// absent font name. `font_charset` is carried through unclamped; no
/// normalization is documented for it.
fn validate(value: &mut Value) {
    let Value::Struct(map) = value else { return };

    let name_is_empty = matches!(map.get("font_name"), Some(Value::String(s)) if s.is_empty()) || !map.contains_key("font_name");
    if name_is_empty {
        map.insert("font_name", Value::String(FALLBACK_FONT_NAME.to_string()));
    }

    let size = map.get("font_size").and_then(Value::as_int).unwrap_or(FONT_SIZE_MIN as i32);
    map.insert("font_size", Value::Int(size.clamp(FONT_SIZE_MIN as i32, FONT_SIZE_MAX as i32)));

    let weight = map.get("font_weight").and_then(Value::as_int).unwrap_or(FONT_WEIGHT_MIN as i32);
    map.insert("font_weight", Value::Int(weight.clamp(FONT_WEIGHT_MIN as i32, FONT_WEIGHT_MAX as i32)));

    let italic = map.get("font_italic").and_then(Value::as_int).unwrap_or(0);
    map.insert("font_italic", Value::Int(if italic == 0 { 0 } else { 1 }));

    if !map.contains_key("font_charset") {
        map.insert("font_charset", Value::Int(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pre_version_5_data() {
        let chunk = Chunk::new(CLASS_ID).with_data_version(4);
        let remap = IdRemap::new();
        assert!(matches!(read(&chunk, &remap), Err(NmoError::UnsupportedVersion { .. })));
    }

    #[test]
    fn oversized_font_is_clamped_on_load() {
        let mut writer = ChunkWriter::new();
        writer.write_identifier(ID_FONT).unwrap();
        writer.string("Comic Sans").unwrap();
        writer.int(999).unwrap(); // size way above max
        writer.int(50).unwrap(); // weight way below min
        writer.int(7).unwrap(); // non-canonical italic flag
        writer.int(0).unwrap(); // charset
        let chunk = writer.finalize(CLASS_ID, MIN_DATA_VERSION, CLASS_ID as u8);

        let remap = IdRemap::new();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("font_size"), Some(&Value::Int(FONT_SIZE_MAX as i32)));
        assert_eq!(decoded.get("font_weight"), Some(&Value::Int(FONT_WEIGHT_MIN as i32)));
        assert_eq!(decoded.get("font_italic"), Some(&Value::Int(1)));
    }

    #[test]
    fn empty_font_name_falls_back_to_arial() {
        let mut writer = ChunkWriter::new();
        writer.write_identifier(ID_FONT).unwrap();
        writer.string("").unwrap();
        writer.int(12).unwrap();
        writer.int(400).unwrap();
        writer.int(0).unwrap();
        writer.int(0).unwrap(); // charset
        let chunk = writer.finalize(CLASS_ID, MIN_DATA_VERSION, CLASS_ID as u8);

        let remap = IdRemap::new();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("font_name"), Some(&Value::String(FALLBACK_FONT_NAME.to_string())));
    }

    #[test]
    fn text_and_colors_round_trip() {
        let remap = IdRemap::new();
        let mut fields = BTreeMap::new();
        fields.insert("text", Value::String("hello".to_string()));
        fields.insert("font_color", Value::Dword(0xFFFFFFFF));
        fields.insert("background_color", Value::Dword(0x00000000));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("text"), Some(&Value::String("hello".to_string())));
        assert_eq!(decoded.get("font_color"), Some(&Value::Dword(0xFFFFFFFF)));
        assert_eq!(decoded.get("background_color"), Some(&Value::Dword(0x00000000)));
    }

    #[test]
    fn charset_defaults_to_zero_when_absent() {
        let remap = IdRemap::new();
        let mut fields = BTreeMap::new();
        fields.insert("font_name", Value::String("Tahoma".to_string()));
        fields.insert("font_size", Value::Int(10));
        let value = Value::Struct(fields);

        let chunk = write(&value, &remap).unwrap();
        let decoded = read(&chunk, &remap).unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.get("font_charset"), Some(&Value::Int(0)));
    }
}
