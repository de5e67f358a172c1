// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The file's "header-1" section (spec §3.4, §4.K): the object directory,
//! per-category plugin dependency lists, and the included-file table.

use crate::buffer::{align_up, check_bounds, read_u32_le};
use crate::error::{NmoError, Result};
use crate::guid::Guid;

/// Number of plugin-dependency categories carried in header-1.
pub const PLUGIN_CATEGORY_COUNT: usize = 5;

const REFERENCE_ONLY_BIT: u32 = 1 << 23;
const FILE_ID_MASK: u32 = REFERENCE_ONLY_BIT - 1;

/// One entry in the object directory: a file-scoped object id, its class,
/// the index of the included file it lives in (0 for the primary file), its
/// name, and whether it is a reference-only placeholder (an object declared
/// but whose data lives in another included file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDirectoryEntry {
    pub file_id: u32,
    pub class_id: u32,
    pub file_index: u32,
    pub name: String,
    pub reference_only: bool,
}

impl ObjectDirectoryEntry {
    /// Packs `file_id` with the reference-only flag in bit 23 (spec §4.K:
    /// "`file_id:u32` (with bit 23 = reference-only flag, masked off the
    /// id)").
    fn pack_file_id_and_flag(&self) -> Result<u32> {
        if self.file_id > FILE_ID_MASK {
            return Err(NmoError::InvalidArgument(format!(
                "file id {} does not fit the 23-bit directory field",
                self.file_id
            )));
        }
        Ok(self.file_id | if self.reference_only { REFERENCE_ONLY_BIT } else { 0 })
    }

    fn unpack_file_id_and_flag(packed: u32) -> (u32, bool) {
        (packed & FILE_ID_MASK, packed & REFERENCE_ONLY_BIT != 0)
    }
}

/// Header-1: object directory, plugin dependencies, included files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header1 {
    pub objects: Vec<ObjectDirectoryEntry>,
    /// One GUID list per plugin-dependency category (spec §4.K).
    pub plugin_dependencies: [Vec<Guid>; PLUGIN_CATEGORY_COUNT],
    pub included_files: Vec<String>,
}

impl Header1 {
    /// Serializes header-1. `external_object_count` must be `true` when the
    /// caller's file version is >= 8 (spec §4.K): the object-directory entry
    /// count then lives in the file header instead of being written here.
    pub fn serialize(&self, external_object_count: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        if !external_object_count {
            out.extend_from_slice(&(self.objects.len() as u32).to_le_bytes());
        }
        for entry in &self.objects {
            out.extend_from_slice(&entry.pack_file_id_and_flag()?.to_le_bytes());
            out.extend_from_slice(&entry.class_id.to_le_bytes());
            out.extend_from_slice(&entry.file_index.to_le_bytes());
            let name = entry.name.as_bytes();
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name);
        }

        for category in &self.plugin_dependencies {
            out.extend_from_slice(&(category.len() as u32).to_le_bytes());
            for guid in category {
                out.extend_from_slice(&guid.d1.to_le_bytes());
                out.extend_from_slice(&guid.d2.to_le_bytes());
            }
        }

        out.extend_from_slice(&(self.included_files.len() as u32).to_le_bytes());
        if !self.included_files.is_empty() {
            let mut table = Vec::new();
            for name in &self.included_files {
                let bytes = name.as_bytes();
                table.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                table.extend_from_slice(bytes);
                table.resize(table.len() + (align_up(bytes.len()) - bytes.len()), 0);
            }
            out.extend_from_slice(&(table.len() as u32).to_le_bytes());
            out.extend_from_slice(&table);
        }
        // count == 0: per spec §9, no table_size field and no table bytes
        // follow at all -- the section is wholly absent, not just empty.

        Ok(out)
    }

    /// Parses header-1. `object_count` supplies the object-directory entry
    /// count for file_version >= 8, where it moved into the file header and
    /// is no longer present in this buffer (spec §4.K). For file_version < 8
    /// pass `None` and the count is read from the buffer as before.
    pub fn parse(bytes: &[u8], pos: &mut usize, object_count: Option<usize>) -> Result<Header1> {
        let total = bytes.len();

        let object_count = match object_count {
            Some(count) => count,
            None => {
                check_bounds(*pos, 4, total)?;
                let count = read_u32_le(bytes, *pos)? as usize;
                *pos += 4;
                count
            }
        };
        let mut objects = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            check_bounds(*pos, 12, total)?;
            let packed_file_id = read_u32_le(bytes, *pos)?;
            let class_id = read_u32_le(bytes, *pos + 4)?;
            let file_index = read_u32_le(bytes, *pos + 8)?;
            *pos += 12;
            check_bounds(*pos, 4, total)?;
            let name_len = read_u32_le(bytes, *pos)? as usize;
            *pos += 4;
            check_bounds(*pos, name_len, total)?;
            let name = String::from_utf8_lossy(&bytes[*pos..*pos + name_len]).into_owned();
            *pos += name_len;

            let (file_id, reference_only) = ObjectDirectoryEntry::unpack_file_id_and_flag(packed_file_id);
            objects.push(ObjectDirectoryEntry {
                file_id,
                class_id,
                file_index,
                name,
                reference_only,
            });
        }

        let mut plugin_dependencies: [Vec<Guid>; PLUGIN_CATEGORY_COUNT] = Default::default();
        for category in &mut plugin_dependencies {
            check_bounds(*pos, 4, total)?;
            let count = read_u32_le(bytes, *pos)? as usize;
            *pos += 4;
            check_bounds(*pos, count * 8, total)?;
            for _ in 0..count {
                let d1 = read_u32_le(bytes, *pos)?;
                let d2 = read_u32_le(bytes, *pos + 4)?;
                *pos += 8;
                category.push(Guid::new(d1, d2));
            }
        }

        check_bounds(*pos, 4, total)?;
        let file_count = read_u32_le(bytes, *pos)? as usize;
        *pos += 4;
        let mut included_files = Vec::with_capacity(file_count);
        if file_count > 0 {
            check_bounds(*pos, 4, total)?;
            let table_size = read_u32_le(bytes, *pos)? as usize;
            *pos += 4;
            check_bounds(*pos, table_size, total)?;
            let table_end = *pos + table_size;
            for _ in 0..file_count {
                check_bounds(*pos, 4, total)?;
                let len = read_u32_le(bytes, *pos)? as usize;
                *pos += 4;
                check_bounds(*pos, len, total)?;
                let name = String::from_utf8_lossy(&bytes[*pos..*pos + len]).into_owned();
                *pos += align_up(len);
                included_files.push(name);
            }
            if *pos != table_end {
                return Err(NmoError::InvalidFormat("included-file table size does not match its entries".into()));
            }
        }

        Ok(Header1 {
            objects,
            plugin_dependencies,
            included_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file_id: u32, class_id: u32, file_index: u32, name: &str, reference_only: bool) -> ObjectDirectoryEntry {
        ObjectDirectoryEntry {
            file_id,
            class_id,
            file_index,
            name: name.to_string(),
            reference_only,
        }
    }

    #[test]
    fn object_directory_round_trips_reference_only_flag_and_name() {
        let header = Header1 {
            objects: vec![
                entry(1, 30, 0, "Box01", false),
                entry(2, 38, 1, "Omni01", true),
            ],
            plugin_dependencies: Default::default(),
            included_files: Vec::new(),
        };
        let bytes = header.serialize(false).unwrap();
        let mut pos = 0;
        let parsed = Header1::parse(&bytes, &mut pos, None).unwrap();
        assert_eq!(parsed, header);
        assert!(!parsed.objects[0].reference_only);
        assert!(parsed.objects[1].reference_only);
        assert_eq!(parsed.objects[1].name, "Omni01");
        assert_eq!(parsed.objects[1].file_index, 1);
    }

    #[test]
    fn external_object_count_is_not_written_or_read_from_the_buffer() {
        let header = Header1 {
            objects: vec![entry(1, 30, 0, "Box01", false)],
            plugin_dependencies: Default::default(),
            included_files: Vec::new(),
        };
        let bytes = header.serialize(true).unwrap();
        let mut pos = 0;
        let parsed = Header1::parse(&bytes, &mut pos, Some(1)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn empty_included_file_table_writes_no_table_size() {
        let header = Header1::default();
        let bytes = header.serialize(false).unwrap();
        let mut pos = 0;
        let parsed = Header1::parse(&bytes, &mut pos, None).unwrap();
        assert!(parsed.included_files.is_empty());
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn included_files_round_trip() {
        let mut header = Header1::default();
        header.included_files = vec!["tex/a.bmp".to_string(), "tex/b.bmp".to_string()];
        let bytes = header.serialize(false).unwrap();
        let mut pos = 0;
        let parsed = Header1::parse(&bytes, &mut pos, None).unwrap();
        assert_eq!(parsed.included_files, header.included_files);
    }

    #[test]
    fn oversized_file_id_is_rejected() {
        let header = Header1 {
            objects: vec![entry(1 << 24, 30, 0, "Box01", false)],
            plugin_dependencies: Default::default(),
            included_files: Vec::new(),
        };
        assert!(header.serialize(false).is_err());
    }
}
