// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Parser
//!
//! Typed, cursor-driven reading over a [`Chunk`]'s DWORD payload. Two
//! addressing styles are supported side by side:
//!
//! - **Sequential**: [`ChunkParser::start_read_sequence`] plus the typed
//!   readers, for chunks whose fields are written in a fixed order with no
//!   random access.
//! - **Keyed**: [`ChunkParser::seek_identifier`] walks the intra-chunk
//!   linked list built by [`super::writer::ChunkWriter::write_identifier`],
//!   letting a class schema read optional/versioned fields by tag instead of
//!   position. A chunk that uses this style reserves `data[0]` as the DWORD
//!   position of the first identifier record (or [`NO_IDENTIFIER`] if the
//!   chain is empty); this is the hardest sub-protocol in the format and the
//!   one most worth getting exactly right (see [`ChunkParser::seek_identifier`]).

use crate::chunk::{Chunk, ChunkOptions};
use crate::error::{NmoError, Result};
use crate::guid::Guid;

/// Sentinel marking "no next record" (end of an identifier chain) and "no
/// chain at all" (head pointer).
pub const NO_IDENTIFIER: u32 = u32::MAX;

/// Cursor-driven reader over one [`Chunk`]'s `data`. Does not mutate the
/// chunk; `cursor`/`prev_identifier_pos` are DWORD positions into `data`.
pub struct ChunkParser<'a> {
    chunk: &'a Chunk,
    cursor: usize,
    prev_identifier_pos: Option<usize>,
}

impl<'a> ChunkParser<'a> {
    pub fn new(chunk: &'a Chunk) -> Self {
        ChunkParser {
            chunk,
            cursor: 0,
            prev_identifier_pos: None,
        }
    }

    /// Resets the cursor to the start of `data`, for chunks that encode
    /// fields positionally rather than through the identifier chain.
    pub fn start_read_sequence(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn next_dword(&mut self) -> Result<u32> {
        let value = *self
            .chunk
            .data
            .get(self.cursor)
            .ok_or(NmoError::Eof { what: "chunk dword" })?;
        self.cursor += 1;
        Ok(value)
    }

    fn next_dwords(&mut self, count: usize) -> Result<&'a [u32]> {
        let end = self
            .cursor
            .checked_add(count)
            .ok_or(NmoError::Eof { what: "chunk dword span" })?;
        if end > self.chunk.data.len() {
            return Err(NmoError::Eof { what: "chunk dword span" });
        }
        let slice = &self.chunk.data[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    // -- scalar readers ----------------------------------------------------

    pub fn byte(&mut self) -> Result<u8> {
        Ok((self.next_dword()? & 0xFF) as u8)
    }

    pub fn word(&mut self) -> Result<u16> {
        Ok((self.next_dword()? & 0xFFFF) as u16)
    }

    pub fn dword(&mut self) -> Result<u32> {
        self.next_dword()
    }

    pub fn int(&mut self) -> Result<i32> {
        Ok(self.next_dword()? as i32)
    }

    pub fn float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.next_dword()?))
    }

    pub fn guid(&mut self) -> Result<Guid> {
        let d1 = self.next_dword()?;
        let d2 = self.next_dword()?;
        Ok(Guid::new(d1, d2))
    }

    /// Reads a raw object id and translates it to a runtime id if this
    /// chunk's ids are file ids ([`ChunkOptions::FILE`]).
    pub fn object_id(&mut self, remap: &crate::chunk::IdRemap) -> Result<u32> {
        let raw = self.next_dword()?;
        if self.chunk.options.contains(ChunkOptions::FILE) {
            Ok(remap.to_runtime(raw))
        } else {
            Ok(raw)
        }
    }

    // -- vectors / matrices --------------------------------------------------

    pub fn vector2(&mut self) -> Result<[f32; 2]> {
        Ok([self.float()?, self.float()?])
    }

    pub fn vector3(&mut self) -> Result<[f32; 3]> {
        Ok([self.float()?, self.float()?, self.float()?])
    }

    pub fn vector4(&mut self) -> Result<[f32; 4]> {
        Ok([self.float()?, self.float()?, self.float()?, self.float()?])
    }

    pub fn quaternion(&mut self) -> Result<[f32; 4]> {
        self.vector4()
    }

    pub fn color(&mut self) -> Result<[f32; 4]> {
        self.vector4()
    }

    pub fn matrix(&mut self) -> Result<[[f32; 4]; 4]> {
        let mut m = [[0.0f32; 4]; 4];
        for row in &mut m {
            *row = self.vector4()?;
        }
        Ok(m)
    }

    // -- strings / buffers ---------------------------------------------------

    /// Reads a DWORD byte-length followed by that many bytes (DWORD-padded
    /// on the wire), decoded as UTF-8 (lossily, matching the original
    /// format's permissive text handling).
    pub fn string(&mut self) -> Result<String> {
        let bytes = self.sized_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a DWORD byte-length followed by that many raw bytes.
    pub fn buffer(&mut self) -> Result<Vec<u8>> {
        self.sized_bytes()
    }

    fn sized_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.next_dword()? as usize;
        self.bytes(len)
    }

    /// Reads exactly `len` raw bytes with no size prefix, consuming the
    /// DWORD-aligned number of dwords and discarding padding.
    pub fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let dwords = crate::buffer::align_up(len) / 4;
        let span = self.next_dwords(dwords)?;
        let mut out = Vec::with_capacity(len);
        for dword in span {
            out.extend_from_slice(&dword.to_le_bytes());
        }
        out.truncate(len);
        Ok(out)
    }

    // -- arrays ---------------------------------------------------------------

    /// Reads a DWORD element count followed by that many raw little-endian
    /// dwords.
    pub fn array_lendian(&mut self) -> Result<Vec<u32>> {
        let count = self.next_dword()? as usize;
        Ok(self.next_dwords(count)?.to_vec())
    }

    /// Reads a DWORD element count followed by that many 16-bit elements,
    /// packed two per dword and byte-swapped (spec GLOSSARY "LEndian16").
    pub fn array_lendian16(&mut self) -> Result<Vec<u16>> {
        let count = self.next_dword()? as usize;
        self.packed_u16s(count)
    }

    /// Like [`ChunkParser::bytes`] but for a caller-known element count with
    /// no size prefix on the wire.
    pub fn buffer_nosize(&mut self, len: usize) -> Result<Vec<u8>> {
        self.bytes(len)
    }

    /// Like [`ChunkParser::array_lendian16`] but for a caller-known element
    /// count with no size prefix on the wire.
    pub fn buffer_nosize_lendian16(&mut self, count: usize) -> Result<Vec<u16>> {
        self.packed_u16s(count)
    }

    fn packed_u16s(&mut self, count: usize) -> Result<Vec<u16>> {
        let dwords = count.div_ceil(2);
        let span = self.next_dwords(dwords)?;
        let mut words = Vec::with_capacity(dwords * 2);
        for dword in span {
            words.push((dword & 0xFFFF) as u16);
            words.push((dword >> 16) as u16);
        }
        crate::buffer::swap16_span(&mut words);
        words.truncate(count);
        Ok(words)
    }

    // -- managers ---------------------------------------------------------------

    /// Reads one `(guid, value)` manager-int pair.
    pub fn manager_int(&mut self) -> Result<(Guid, i32)> {
        let guid = self.guid()?;
        let value = self.int()?;
        Ok((guid, value))
    }

    /// Reads `count` consecutive manager-int pairs.
    pub fn manager_int_sequence(&mut self, count: usize) -> Result<Vec<(Guid, i32)>> {
        (0..count).map(|_| self.manager_int()).collect()
    }

    // -- sub-chunks ---------------------------------------------------------------

    /// Reads one inline sub-chunk record written by
    /// [`super::writer::ChunkWriter::write_subchunk`]. Returns `None` for a
    /// null slot (`size_dwords == 0`).
    pub fn read_subchunk(&mut self) -> Result<Option<Chunk>> {
        let record_start = self.cursor;
        let size_dwords = self.next_dword()? as usize;
        if size_dwords == 0 {
            return Ok(None);
        }

        let class_id = self.next_dword()?;
        let version_info = self.next_dword()?;
        let chunk_size = self.next_dword()? as usize;
        let has_file = self.next_dword()? != 0;
        let id_count = self.next_dword()? as usize;
        let chunk_count = self.next_dword()? as usize;
        let (data_version, chunk_class_id, chunk_version, mut options) = super::unpack_version_info(version_info);
        let manager_count = if chunk_version > 4 { self.next_dword()? as usize } else { 0 };

        let data = self.next_dwords(chunk_size)?.to_vec();
        let ids = self.next_dwords(id_count)?.to_vec();
        let chunk_refs = self.next_dwords(chunk_count)?.to_vec();
        let managers = self.next_dwords(manager_count)?.to_vec();

        if has_file {
            options.insert(ChunkOptions::FILE);
        }

        let consumed = self.cursor - record_start;
        if consumed != size_dwords {
            return Err(NmoError::Corrupt(format!(
                "sub-chunk declared {size_dwords} dword(s) but record spans {consumed}"
            )));
        }

        Ok(Some(Chunk {
            class_id,
            data_version,
            chunk_version,
            chunk_class_id,
            options,
            data,
            ids,
            managers,
            chunks: Vec::new(),
            chunk_refs,
            uncompressed_size: 0,
            compressed_size: 0,
        }))
    }

    // -- identifier chain ---------------------------------------------------------------

    /// Walks the intra-chunk identifier linked list looking for `id`,
    /// leaving the cursor positioned right after the matching record's
    /// `(identifier, next_pos)` header so the caller's typed reads pick up
    /// the associated payload.
    ///
    /// A missing identifier is reported as [`NmoError::NotFound`], which
    /// [`NmoError::is_missing_identifier`] distinguishes from a real parse
    /// failure: callers are expected to apply a documented default and
    /// continue, not abort (spec §7).
    ///
    /// `data[0]` holds the DWORD position of the first record, or
    /// [`NO_IDENTIFIER`] if the chain is empty. Chains are bounded by
    /// `data.len()` steps; a cycle (including a record whose `next_pos`
    /// points back at the reserved head slot, position 0 — the `j == 0`
    /// case) is reported as [`NmoError::Corrupt`] rather than looping
    /// forever.
    pub fn seek_identifier(&mut self, id: u32) -> Result<()> {
        let head = *self.chunk.data.first().ok_or(NmoError::NotFound { id })?;
        if head == NO_IDENTIFIER {
            return Err(NmoError::NotFound { id });
        }

        let mut pos = head as usize;
        let max_steps = self.chunk.data.len();
        for _ in 0..=max_steps {
            let record_id = *self
                .chunk
                .data
                .get(pos)
                .ok_or_else(|| NmoError::Corrupt("identifier chain points outside chunk data".into()))?;
            let next = *self
                .chunk
                .data
                .get(pos + 1)
                .ok_or_else(|| NmoError::Corrupt("identifier record missing next_pos".into()))?;

            if record_id == id {
                self.cursor = pos + 2;
                self.prev_identifier_pos = Some(pos);
                return Ok(());
            }

            if next == NO_IDENTIFIER {
                return Err(NmoError::NotFound { id });
            }
            if next as usize == 0 {
                // j == 0: next_pos points back at the reserved head slot,
                // which is never itself a valid identifier record.
                return Err(NmoError::Corrupt("identifier chain cycles back to head slot".into()));
            }

            pos = next as usize;
        }

        Err(NmoError::Corrupt("identifier chain exceeds chunk length".into()))
    }
}
