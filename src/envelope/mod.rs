// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # File Envelope
//!
//! The outermost format: a signature/version preamble, the header-1
//! directory ([`header1::Header1`]), and a data section of manager and
//! object records, each carrying one top-level [`Chunk`] (spec §3.4, §4.K).

pub mod header1;

pub use header1::{Header1, ObjectDirectoryEntry, PLUGIN_CATEGORY_COUNT};

use crate::buffer::check_bounds;
use crate::chunk::{Chunk, IdRemap};
use crate::config::{DecodeOptions, Strictness};
use crate::error::{NmoError, Result};
use crate::guid::Guid;
use crate::schema::reflect::{deserialize, Value};
use crate::schema::SchemaRegistry;

/// 4-byte file signature every envelope begins with.
pub const SIGNATURE: [u8; 4] = *b"NMOF";

/// First file version this crate can parse.
pub const MIN_FILE_VERSION: u32 = 4;

/// Current file version this crate writes.
pub const CURRENT_FILE_VERSION: u32 = 8;

/// Manager records first appear at this file version.
const MANAGER_RECORDS_SINCE: u32 = 6;

/// Below this version, every object record carries its own `object_id`
/// inline; at and above it, the id is implied by the record's position
/// matching the header-1 object directory order.
const INLINE_OBJECT_ID_BEFORE: u32 = 7;

/// At and above this version, the object-directory entry count moves out of
/// header-1 and into the envelope preamble, shared by both the object
/// directory and the data section's object records (spec §4.K).
const OBJECT_COUNT_IN_PREAMBLE_SINCE: u32 = 8;

/// One manager's persisted state: the manager's GUID and its top-level
/// chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerRecord {
    pub guid: Guid,
    pub chunk: Chunk,
}

/// One object's persisted state.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub object_id: u32,
    pub class_id: u32,
    pub chunk: Chunk,
}

/// A fully parsed (or about-to-be-written) file.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub file_version: u32,
    pub header1: Header1,
    pub managers: Vec<ManagerRecord>,
    pub objects: Vec<ObjectRecord>,
}

impl Envelope {
    pub fn new(file_version: u32) -> Self {
        Envelope {
            file_version,
            header1: Header1::default(),
            managers: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Builds the [`IdRemap`] implied by this envelope's object directory:
    /// file id -> itself, runtime id assigned by directory order. Callers
    /// that want a different runtime numbering build their own [`IdRemap`]
    /// instead of relying on directory order.
    /// Reflects every object record against `registry`, in file order,
    /// translating object-id fields through `remap`. A record whose
    /// `class_id` has no registered descriptor is skipped when
    /// `options.skip_unknown_classes()` is set; otherwise it's a
    /// [`NmoError::NotSupported`] failure (spec §1.3).
    pub fn decode_objects(&self, registry: &SchemaRegistry, remap: &IdRemap, options: &DecodeOptions) -> Result<Vec<(u32, Value)>> {
        let mut out = Vec::with_capacity(self.objects.len());
        for record in &self.objects {
            let Some(descriptor) = registry.by_id(record.class_id) else {
                if options.skip_unknown_classes() {
                    tracing::debug!(class_id = record.class_id, "skipping unregistered class");
                    continue;
                }
                return Err(NmoError::NotSupported("unregistered class id in object record"));
            };
            let value = deserialize(descriptor, &record.chunk, remap)?;
            out.push((record.object_id, value));
        }
        Ok(out)
    }

    pub fn directory_remap(&self) -> IdRemap {
        let mut remap = IdRemap::new();
        for (index, entry) in self.header1.objects.iter().enumerate() {
            remap.insert(entry.file_id, index as u32 + 1);
        }
        remap
    }

    /// Serializes under caller-supplied `options` (spec §1.3), checking
    /// that this envelope was built at `options.file_version()` before
    /// writing anything.
    pub fn serialize_with_options(&self, options: &crate::config::EncodeOptions) -> Result<Vec<u8>> {
        if self.file_version != options.file_version() {
            return Err(NmoError::InvalidArgument(format!(
                "envelope file_version {} does not match EncodeOptions file_version {}",
                self.file_version,
                options.file_version()
            )));
        }
        self.serialize()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let external_object_count = self.file_version >= OBJECT_COUNT_IN_PREAMBLE_SINCE;
        if external_object_count && self.objects.len() != self.header1.objects.len() {
            return Err(NmoError::InvalidState(
                "object record count must match the object directory at file_version >= 8",
            ));
        }

        let mut out = Vec::new();
        out.extend_from_slice(&SIGNATURE);
        out.extend_from_slice(&self.file_version.to_le_bytes());
        if external_object_count {
            out.extend_from_slice(&(self.header1.objects.len() as u32).to_le_bytes());
        }
        out.extend_from_slice(&self.header1.serialize(external_object_count)?);

        if self.file_version >= MANAGER_RECORDS_SINCE {
            out.extend_from_slice(&(self.managers.len() as u32).to_le_bytes());
            for record in &self.managers {
                out.extend_from_slice(&record.guid.d1.to_le_bytes());
                out.extend_from_slice(&record.guid.d2.to_le_bytes());
                let chunk_bytes = record.chunk.serialize();
                out.extend_from_slice(&(chunk_bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&chunk_bytes);
            }
        } else if !self.managers.is_empty() {
            return Err(NmoError::InvalidState("manager records require file_version >= 6"));
        }

        if !external_object_count {
            out.extend_from_slice(&(self.objects.len() as u32).to_le_bytes());
        }
        for record in &self.objects {
            if self.file_version < INLINE_OBJECT_ID_BEFORE {
                out.extend_from_slice(&record.object_id.to_le_bytes());
            }
            out.extend_from_slice(&record.class_id.to_le_bytes());
            let chunk_bytes = record.chunk.serialize();
            out.extend_from_slice(&(chunk_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&chunk_bytes);
        }

        Ok(out)
    }

    /// Parses an envelope under the default, lenient [`DecodeOptions`].
    /// Use [`Envelope::parse_with_options`] to gate strictness or cap the
    /// readable file version.
    pub fn parse(bytes: &[u8]) -> Result<Envelope> {
        Envelope::parse_with_options(bytes, &DecodeOptions::default())
    }

    /// Parses an envelope under caller-supplied `options` (spec §1.3):
    /// [`Strictness::Strict`] rejects trailing bytes after the last object
    /// record that [`Strictness::Lenient`] silently drops, and
    /// `max_file_version` caps the highest file version this call accepts
    /// (which may be lower than [`CURRENT_FILE_VERSION`]).
    pub fn parse_with_options(bytes: &[u8], options: &DecodeOptions) -> Result<Envelope> {
        let total = bytes.len();
        check_bounds(0, 8, total)?;
        if bytes[0..4] != SIGNATURE {
            return Err(NmoError::InvalidSignature);
        }
        let file_version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if !(MIN_FILE_VERSION..=options.max_file_version()).contains(&file_version) {
            return Err(NmoError::UnsupportedVersion { version: file_version });
        }

        let mut pos = 8usize;
        let external_object_count = if file_version >= OBJECT_COUNT_IN_PREAMBLE_SINCE {
            check_bounds(pos, 4, total)?;
            let count = crate::buffer::read_u32_le(bytes, pos)? as usize;
            pos += 4;
            Some(count)
        } else {
            None
        };
        let header1 = Header1::parse(bytes, &mut pos, external_object_count)?;

        let mut managers = Vec::new();
        if file_version >= MANAGER_RECORDS_SINCE {
            check_bounds(pos, 4, total)?;
            let count = crate::buffer::read_u32_le(bytes, pos)? as usize;
            pos += 4;
            for _ in 0..count {
                check_bounds(pos, 8, total)?;
                let d1 = crate::buffer::read_u32_le(bytes, pos)?;
                let d2 = crate::buffer::read_u32_le(bytes, pos + 4)?;
                pos += 8;
                check_bounds(pos, 4, total)?;
                let chunk_len = crate::buffer::read_u32_le(bytes, pos)? as usize;
                pos += 4;
                check_bounds(pos, chunk_len, total)?;
                let chunk = Chunk::parse(&bytes[pos..pos + chunk_len])?;
                pos += chunk_len;
                managers.push(ManagerRecord { guid: Guid::new(d1, d2), chunk });
            }
        }

        let object_count = match external_object_count {
            Some(count) => count,
            None => {
                check_bounds(pos, 4, total)?;
                let count = crate::buffer::read_u32_le(bytes, pos)? as usize;
                pos += 4;
                count
            }
        };
        let mut objects = Vec::with_capacity(object_count);
        for index in 0..object_count {
            let object_id = if file_version < INLINE_OBJECT_ID_BEFORE {
                check_bounds(pos, 4, total)?;
                let id = crate::buffer::read_u32_le(bytes, pos)?;
                pos += 4;
                id
            } else {
                header1.objects.get(index).map(|e| e.file_id).unwrap_or(0)
            };
            check_bounds(pos, 4, total)?;
            let class_id = crate::buffer::read_u32_le(bytes, pos)?;
            pos += 4;
            check_bounds(pos, 4, total)?;
            let chunk_len = crate::buffer::read_u32_le(bytes, pos)? as usize;
            pos += 4;
            check_bounds(pos, chunk_len, total)?;
            let chunk = Chunk::parse(&bytes[pos..pos + chunk_len])?;
            pos += chunk_len;
            objects.push(ObjectRecord { object_id, class_id, chunk });
        }

        if pos != total && options.strictness() == Strictness::Strict {
            return Err(NmoError::InvalidFormat(format!("{} trailing byte(s) after envelope", total - pos)));
        }

        Ok(Envelope {
            file_version,
            header1,
            managers,
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_envelope_round_trips() {
        let envelope = Envelope::new(CURRENT_FILE_VERSION);
        let bytes = envelope.serialize().unwrap();
        let parsed = Envelope::parse(&bytes).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = Envelope::new(CURRENT_FILE_VERSION).serialize().unwrap();
        bytes[0] = b'X';
        assert!(matches!(Envelope::parse(&bytes), Err(NmoError::InvalidSignature)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Envelope::new(CURRENT_FILE_VERSION).serialize().unwrap();
        bytes[4..8].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(Envelope::parse(&bytes), Err(NmoError::UnsupportedVersion { .. })));
    }

    #[test]
    fn object_record_round_trips_with_inline_id_pre_v7() {
        let mut envelope = Envelope::new(6);
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 11, class_id: 30, file_index: 0, name: "Box01".into(), reference_only: false });
        envelope.objects.push(ObjectRecord {
            object_id: 11,
            class_id: 30,
            chunk: Chunk::new(30).with_data_version(1),
        });
        let bytes = envelope.serialize().unwrap();
        let parsed = Envelope::parse(&bytes).unwrap();
        assert_eq!(parsed.objects[0].object_id, 11);
    }

    #[test]
    fn object_id_is_implied_by_directory_order_at_v7() {
        let mut envelope = Envelope::new(7);
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 42, class_id: 30, file_index: 0, name: "Omni01".into(), reference_only: false });
        envelope.objects.push(ObjectRecord {
            object_id: 42,
            class_id: 30,
            chunk: Chunk::new(30).with_data_version(1),
        });
        let bytes = envelope.serialize().unwrap();
        let parsed = Envelope::parse(&bytes).unwrap();
        assert_eq!(parsed.objects[0].object_id, 42);
    }

    #[test]
    fn object_count_lives_in_preamble_at_v8() {
        let mut envelope = Envelope::new(8);
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 42, class_id: 30, file_index: 0, name: "Omni01".into(), reference_only: false });
        envelope.objects.push(ObjectRecord {
            object_id: 42,
            class_id: 30,
            chunk: Chunk::new(30).with_data_version(1),
        });
        let bytes = envelope.serialize().unwrap();
        let parsed = Envelope::parse(&bytes).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(parsed.objects[0].object_id, 42);
    }

    #[test]
    fn mismatched_object_count_is_rejected_at_v8() {
        let mut envelope = Envelope::new(8);
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 42, class_id: 30, file_index: 0, name: "Omni01".into(), reference_only: false });
        assert!(matches!(envelope.serialize(), Err(NmoError::InvalidState(_))));
    }

    #[test]
    fn manager_records_require_file_version_6_or_later() {
        let mut envelope = Envelope::new(5);
        envelope.managers.push(ManagerRecord { guid: Guid::new(1, 1), chunk: Chunk::new(1) });
        assert!(envelope.serialize().is_err());
    }

    #[test]
    fn directory_remap_assigns_sequential_runtime_ids() {
        let mut envelope = Envelope::new(CURRENT_FILE_VERSION);
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 100, class_id: 1, file_index: 0, name: String::new(), reference_only: false });
        envelope.header1.objects.push(ObjectDirectoryEntry { file_id: 200, class_id: 1, file_index: 0, name: String::new(), reference_only: false });
        let remap = envelope.directory_remap();
        assert_eq!(remap.to_runtime(100), 1);
        assert_eq!(remap.to_runtime(200), 2);
    }

    #[test]
    fn lenient_strictness_tolerates_trailing_bytes() {
        let mut bytes = Envelope::new(CURRENT_FILE_VERSION).serialize().unwrap();
        bytes.push(0xFF);
        let options = DecodeOptions::new().strictness(Strictness::Lenient).build().unwrap();
        assert!(Envelope::parse_with_options(&bytes, &options).is_ok());
    }

    #[test]
    fn strict_strictness_rejects_trailing_bytes() {
        let mut bytes = Envelope::new(CURRENT_FILE_VERSION).serialize().unwrap();
        bytes.push(0xFF);
        let options = DecodeOptions::new().strictness(Strictness::Strict).build().unwrap();
        assert!(matches!(Envelope::parse_with_options(&bytes, &options), Err(NmoError::InvalidFormat(_))));
    }

    #[test]
    fn max_file_version_caps_what_parse_with_options_accepts() {
        let bytes = Envelope::new(8).serialize().unwrap();
        let options = DecodeOptions::new().max_file_version(7).build().unwrap();
        assert!(matches!(Envelope::parse_with_options(&bytes, &options), Err(NmoError::UnsupportedVersion { .. })));
    }

    #[test]
    fn decode_objects_skips_unregistered_classes_when_configured() {
        let registry = crate::schema::standard_registry().unwrap();
        let remap = IdRemap::new();
        let mut envelope = Envelope::new(CURRENT_FILE_VERSION);
        envelope.objects.push(ObjectRecord {
            object_id: 1,
            class_id: 0xFFFF,
            chunk: Chunk::new(0xFFFF),
        });
        let lenient = DecodeOptions::new().skip_unknown_classes(true).build().unwrap();
        assert_eq!(envelope.decode_objects(&registry, &remap, &lenient).unwrap().len(), 0);

        let strict = DecodeOptions::new().skip_unknown_classes(false).build().unwrap();
        assert!(matches!(envelope.decode_objects(&registry, &remap, &strict), Err(NmoError::NotSupported(_))));
    }

    #[test]
    fn serialize_with_options_rejects_mismatched_file_version() {
        let envelope = Envelope::new(7);
        let options = crate::config::EncodeOptions::new().file_version(8).build().unwrap();
        assert!(matches!(envelope.serialize_with_options(&options), Err(NmoError::InvalidArgument(_))));
    }
}
