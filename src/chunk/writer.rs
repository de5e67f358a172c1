// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Writer
//!
//! Mirrors every reader in [`super::parser::ChunkParser`] with a typed
//! writer, growing a `Vec<u32>` DWORD buffer and the side lists alongside
//! it. Option bits ([`ChunkOptions::IDS`], `MAN`, `CHN`) are raised
//! automatically and monotonically as the matching side list gains its
//! first entry; callers never set them by hand.
//!
//! The buffer starts at a 100-DWORD capacity and grows in 500-DWORD steps
//! once exceeded, rather than doubling, since chunk payloads in this format
//! tend to be many small fields rather than few huge ones.

use crate::chunk::parser::NO_IDENTIFIER;
use crate::chunk::{pack_version_info, Chunk, ChunkOptions, IdRemap, CURRENT_CHUNK_VERSION};
use crate::error::{NmoError, Result};
use crate::guid::Guid;

const INITIAL_CAPACITY_DWORDS: usize = 100;
const GROWTH_STEP_DWORDS: usize = 500;

/// Growing, append-only builder for a [`Chunk`]'s `data` and side lists.
pub struct ChunkWriter {
    data: Vec<u32>,
    ids: Vec<u32>,
    managers: Vec<u32>,
    chunk_refs: Vec<u32>,
    options: ChunkOptions,
    chunk_version: u8,
    identifier_head: Option<usize>,
    identifier_tail_next_slot: Option<usize>,
    finalized: bool,
}

impl Default for ChunkWriter {
    fn default() -> Self {
        ChunkWriter {
            data: Vec::with_capacity(INITIAL_CAPACITY_DWORDS),
            ids: Vec::new(),
            managers: Vec::new(),
            chunk_refs: Vec::new(),
            options: ChunkOptions::empty(),
            chunk_version: CURRENT_CHUNK_VERSION,
            identifier_head: None,
            identifier_tail_next_slot: None,
            finalized: false,
        }
    }
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_version(mut self, chunk_version: u8) -> Self {
        self.chunk_version = chunk_version;
        self
    }

    /// Marks this writer's object-id references as file-context ids
    /// ([`ChunkOptions::FILE`]): subsequent [`ChunkWriter::object_id`] calls
    /// translate `runtime_id` through the remap table's `runtime→file`
    /// direction instead of writing the raw runtime id (spec §4.D
    /// "Object-id encoding with file context"). Has no effect on sub-chunks
    /// decoded by [`super::parser::ChunkParser::read_subchunk`], which sets
    /// the flag itself from the encoded `has_file` byte.
    pub fn with_file_option(mut self) -> Self {
        self.options.insert(ChunkOptions::FILE);
        self
    }

    fn check_writable(&self) -> Result<()> {
        if self.finalized {
            return Err(NmoError::InvalidState("chunk writer already finalized"));
        }
        Ok(())
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed > self.data.capacity() {
            let steps = (needed - self.data.capacity()).div_ceil(GROWTH_STEP_DWORDS).max(1);
            self.data.reserve(steps * GROWTH_STEP_DWORDS);
        }
    }

    fn push_dword(&mut self, value: u32) -> Result<()> {
        self.check_writable()?;
        self.grow_for(1);
        self.data.push(value);
        Ok(())
    }

    /// Current write position, in dwords. Used by callers that reserve a
    /// dword now and back-patch it once a later value is known (e.g. a
    /// vertex block's `save_flags`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrites an already-written dword at `pos`. `pos` must be within
    /// the buffer's current length.
    pub fn poke_dword(&mut self, pos: usize, value: u32) {
        self.data[pos] = value;
    }

    // -- scalar writers ----------------------------------------------------

    pub fn byte(&mut self, value: u8) -> Result<()> {
        self.push_dword(value as u32)
    }

    pub fn word(&mut self, value: u16) -> Result<()> {
        self.push_dword(value as u32)
    }

    pub fn dword(&mut self, value: u32) -> Result<()> {
        self.push_dword(value)
    }

    pub fn int(&mut self, value: i32) -> Result<()> {
        self.push_dword(value as u32)
    }

    pub fn float(&mut self, value: f32) -> Result<()> {
        self.push_dword(value.to_bits())
    }

    pub fn guid(&mut self, value: Guid) -> Result<()> {
        self.push_dword(value.d1)?;
        self.push_dword(value.d2)
    }

    /// Writes an object id, translating it through `remap` to a file id if
    /// this chunk's ids are file ids ([`ChunkOptions::FILE`]), and records it
    /// (deduplicated) in the `ids` side list, raising [`ChunkOptions::IDS`].
    pub fn object_id(&mut self, runtime_id: u32, remap: &IdRemap) -> Result<()> {
        self.check_writable()?;
        let encoded = if self.options.contains(ChunkOptions::FILE) {
            remap.to_file(runtime_id)?
        } else {
            runtime_id
        };
        if !self.ids.contains(&encoded) {
            self.ids.push(encoded);
            self.options.insert(ChunkOptions::IDS);
        }
        self.push_dword(encoded)
    }

    // -- vectors / matrices --------------------------------------------------

    pub fn vector2(&mut self, v: [f32; 2]) -> Result<()> {
        self.float(v[0])?;
        self.float(v[1])
    }

    pub fn vector3(&mut self, v: [f32; 3]) -> Result<()> {
        self.float(v[0])?;
        self.float(v[1])?;
        self.float(v[2])
    }

    pub fn vector4(&mut self, v: [f32; 4]) -> Result<()> {
        for c in v {
            self.float(c)?;
        }
        Ok(())
    }

    pub fn quaternion(&mut self, v: [f32; 4]) -> Result<()> {
        self.vector4(v)
    }

    pub fn color(&mut self, v: [f32; 4]) -> Result<()> {
        self.vector4(v)
    }

    pub fn matrix(&mut self, m: [[f32; 4]; 4]) -> Result<()> {
        for row in m {
            self.vector4(row)?;
        }
        Ok(())
    }

    // -- strings / buffers ---------------------------------------------------

    /// Writes a DWORD byte-length followed by the string's UTF-8 bytes,
    /// zero-padded to the next DWORD boundary.
    pub fn string(&mut self, s: &str) -> Result<()> {
        self.sized_bytes(s.as_bytes())
    }

    /// Writes a DWORD byte-length followed by `bytes`, zero-padded.
    pub fn buffer(&mut self, bytes: &[u8]) -> Result<()> {
        self.sized_bytes(bytes)
    }

    fn sized_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.dword(bytes.len() as u32)?;
        self.bytes_nosize(bytes)
    }

    /// Writes `bytes` with no size prefix, zero-padded to the next DWORD
    /// boundary.
    pub fn bytes_nosize(&mut self, bytes: &[u8]) -> Result<()> {
        let padded_len = crate::buffer::align_up(bytes.len());
        let mut padded = vec![0u8; padded_len];
        padded[..bytes.len()].copy_from_slice(bytes);
        for chunk4 in padded.chunks_exact(4) {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk4);
            self.push_dword(u32::from_le_bytes(arr))?;
        }
        Ok(())
    }

    /// Alias kept for symmetry with [`super::parser::ChunkParser::buffer_nosize`].
    pub fn buffer_nosize_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes_nosize(bytes)
    }

    // -- arrays ---------------------------------------------------------------

    /// Writes a DWORD element count followed by `items` as raw dwords.
    pub fn array_lendian(&mut self, items: &[u32]) -> Result<()> {
        self.dword(items.len() as u32)?;
        for &item in items {
            self.dword(item)?;
        }
        Ok(())
    }

    /// Writes a DWORD element count followed by `items` packed two per
    /// dword and byte-swapped (spec GLOSSARY "LEndian16").
    pub fn array_lendian16(&mut self, items: &[u16]) -> Result<()> {
        self.dword(items.len() as u32)?;
        self.packed_u16s(items)
    }

    /// Like [`ChunkWriter::bytes_nosize`] but for 16-bit elements with no
    /// size prefix on the wire.
    pub fn buffer_nosize_lendian16(&mut self, items: &[u16]) -> Result<()> {
        self.packed_u16s(items)
    }

    fn packed_u16s(&mut self, items: &[u16]) -> Result<()> {
        let mut words = items.to_vec();
        crate::buffer::swap16_span(&mut words);
        if words.len() % 2 != 0 {
            words.push(0);
        }
        for pair in words.chunks_exact(2) {
            self.push_dword((pair[0] as u32) | ((pair[1] as u32) << 16))?;
        }
        Ok(())
    }

    // -- managers ---------------------------------------------------------------

    /// Writes one `(guid, value)` manager-int pair and records `guid`
    /// (deduplicated) in the `managers` side list, raising
    /// [`ChunkOptions::MAN`].
    pub fn manager_int(&mut self, guid: Guid, value: i32) -> Result<()> {
        self.check_writable()?;
        let words = guid.to_words();
        if !self.managers.chunks_exact(2).any(|pair| pair[0] == words[0] && pair[1] == words[1]) {
            self.managers.extend_from_slice(&words);
            self.options.insert(ChunkOptions::MAN);
        }
        self.guid(guid)?;
        self.int(value)
    }

    pub fn manager_int_sequence(&mut self, items: &[(Guid, i32)]) -> Result<()> {
        for &(guid, value) in items {
            self.manager_int(guid, value)?;
        }
        Ok(())
    }

    // -- sub-chunks ---------------------------------------------------------------

    /// Inlines `sub`'s full layout into this writer's `data` at the current
    /// position, recording the position in `chunk_refs` and raising
    /// [`ChunkOptions::CHN`]. Mirrors [`super::parser::ChunkParser::read_subchunk`].
    pub fn write_subchunk(&mut self, sub: &Chunk) -> Result<()> {
        self.check_writable()?;
        let record_start = self.data.len();
        self.chunk_refs.push(record_start as u32);
        self.options.insert(ChunkOptions::CHN);

        self.dword(0)?; // size_dwords placeholder, back-patched below
        self.dword(sub.class_id)?;
        let version_info = pack_version_info(sub.data_version, sub.chunk_class_id, sub.chunk_version, sub.options);
        self.dword(version_info)?;
        self.dword(sub.data.len() as u32)?;
        self.dword(sub.options.contains(ChunkOptions::FILE) as u32)?;
        self.dword(sub.ids.len() as u32)?;
        self.dword(sub.chunk_refs.len() as u32)?;
        if sub.chunk_version > 4 {
            self.dword(sub.managers.len() as u32)?;
        }
        for &d in &sub.data {
            self.dword(d)?;
        }
        for &id in &sub.ids {
            self.dword(id)?;
        }
        for &pos in &sub.chunk_refs {
            self.dword(pos)?;
        }
        for &m in &sub.managers {
            self.dword(m)?;
        }

        let consumed = (self.data.len() - record_start) as u32;
        self.data[record_start] = consumed;
        Ok(())
    }

    /// Writes a null sub-chunk slot (`size_dwords == 0`).
    pub fn write_null_subchunk(&mut self) -> Result<()> {
        self.dword(0)
    }

    // -- identifier chain ---------------------------------------------------------------

    /// Starts (or continues) an identifier-tagged record. Must be the first
    /// operation performed on a writer that uses this addressing style,
    /// since the chain's head pointer is reserved at `data[0]`.
    pub fn write_identifier(&mut self, id: u32) -> Result<()> {
        self.check_writable()?;
        if self.identifier_head.is_none() {
            if !self.data.is_empty() {
                return Err(NmoError::InvalidState(
                    "write_identifier must be the first operation on a chunk writer",
                ));
            }
            self.push_dword(NO_IDENTIFIER)?;
            self.identifier_head = Some(0);
        }

        let record_pos = self.data.len();
        self.push_dword(id)?;
        self.push_dword(NO_IDENTIFIER)?; // next_pos, back-patched by the following record (if any)

        match self.identifier_tail_next_slot {
            Some(slot) => self.data[slot] = record_pos as u32,
            None => self.data[0] = record_pos as u32,
        }
        self.identifier_tail_next_slot = Some(record_pos + 1);
        Ok(())
    }

    // -- finalize ---------------------------------------------------------------

    /// Transfers the accumulated buffer and side lists into a [`Chunk`],
    /// marking this writer finalized. Any further write call returns
    /// [`NmoError::InvalidState`].
    pub fn finalize(&mut self, class_id: u32, data_version: u8, chunk_class_id: u8) -> Chunk {
        self.finalized = true;
        Chunk {
            class_id,
            data_version,
            chunk_version: self.chunk_version,
            chunk_class_id,
            options: self.options,
            data: std::mem::take(&mut self.data),
            ids: std::mem::take(&mut self.ids),
            managers: std::mem::take(&mut self.managers),
            chunks: Vec::new(),
            chunk_refs: std::mem::take(&mut self.chunk_refs),
            uncompressed_size: 0,
            compressed_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_freezes_further_writes() {
        let mut writer = ChunkWriter::new();
        writer.dword(1).unwrap();
        let _chunk = writer.finalize(1, 1, 1);
        assert!(matches!(writer.dword(2), Err(NmoError::InvalidState(_))));
    }

    #[test]
    fn object_id_raises_ids_option_and_dedupes() {
        let mut writer = ChunkWriter::new();
        let remap = IdRemap::new();
        writer.object_id(5, &remap).unwrap();
        writer.object_id(5, &remap).unwrap();
        writer.object_id(6, &remap).unwrap();
        let chunk = writer.finalize(1, 0, 0);
        assert!(chunk.options.contains(ChunkOptions::IDS));
        assert_eq!(chunk.ids, vec![5, 6]);
    }

    #[test]
    fn object_id_with_file_option_translates_through_remap() {
        // spec §8 scenario 5
        let mut remap = IdRemap::new();
        remap.extend([(7, 100), (8, 200)]);

        let mut writer = ChunkWriter::new().with_file_option();
        writer.object_id(100, &remap).unwrap();
        writer.object_id(0, &remap).unwrap();
        writer.object_id(200, &remap).unwrap();
        let chunk = writer.finalize(1, 0, 0);
        assert_eq!(chunk.data, vec![7, 0, 8]);
        assert_eq!(chunk.ids, vec![7, 8]);
    }

    #[test]
    fn object_id_with_file_option_fails_on_unmapped_id() {
        let remap = IdRemap::new();
        let mut writer = ChunkWriter::new().with_file_option();
        assert!(matches!(writer.object_id(5, &remap), Err(NmoError::NotFound { id: 5 })));
    }

    #[test]
    fn manager_int_raises_man_option_and_dedupes() {
        let mut writer = ChunkWriter::new();
        let guid = Guid::new(1, 2);
        writer.manager_int(guid, 42).unwrap();
        writer.manager_int(guid, 43).unwrap();
        let chunk = writer.finalize(1, 0, 0);
        assert!(chunk.options.contains(ChunkOptions::MAN));
        assert_eq!(chunk.managers, vec![1, 2]);
    }

    #[test]
    fn write_subchunk_records_position_and_raises_chn() {
        let mut child_writer = ChunkWriter::new();
        child_writer.dword(0xAAAA).unwrap();
        let child = child_writer.finalize(9, 1, 9);

        let mut parent = ChunkWriter::new();
        parent.write_subchunk(&child).unwrap();
        let finalized = parent.finalize(1, 0, 0);

        assert!(finalized.options.contains(ChunkOptions::CHN));
        assert_eq!(finalized.chunk_refs, vec![0]);
    }

    #[test]
    fn write_identifier_after_other_writes_is_rejected() {
        let mut writer = ChunkWriter::new();
        writer.dword(1).unwrap();
        assert!(matches!(writer.write_identifier(1), Err(NmoError::InvalidState(_))));
    }
}
