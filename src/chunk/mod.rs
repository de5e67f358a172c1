// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Core
//!
//! [`Chunk`] is the atomic serialization unit of the format: a DWORD-indexed
//! payload plus up to three optional side lists (object ids, manager-int
//! GUIDs, owned sub-chunks) and a packed 8-bit identity/options header.
//!
//! Two independent sub-chunk mechanisms coexist, mirroring spec §3.1/§4.B-D:
//!
//! - **Inline sub-chunks**: [`writer::ChunkWriter::write_subchunk`] embeds a
//!   child chunk's full byte layout directly inside `data`, recording the
//!   emission position in [`Chunk::chunk_refs`]. These bytes already live in
//!   `data` and need no separate serialization; [`parser::ChunkParser::read_subchunk`]
//!   re-derives the child by re-parsing at a recorded position.
//! - **Owned sub-chunks**: [`Chunk::append_subchunk`] attaches a fully
//!   separate child [`Chunk`] that is *not* present in `data` at all. These
//!   are carried in [`Chunk::chunks`] and serialized as a trailing section by
//!   [`Chunk::serialize`]/[`Chunk::parse`] (the "top-level envelope" of
//!   spec §4.B), independent of whatever inline sub-chunks also happen to be
//!   baked into `data`.

pub mod options;
pub mod parser;
pub mod remap;
pub mod writer;

pub use options::ChunkOptions;
pub use parser::ChunkParser;
pub use remap::IdRemap;
pub use writer::ChunkWriter;

use crate::buffer::{check_bounds, read_u32_le, write_u32_le};
use crate::error::{NmoError, Result};

/// Current on-wire chunk format version.
pub const CURRENT_CHUNK_VERSION: u8 = 7;

/// Packs the four identity fields carried at the head of every chunk into
/// the single `version_info` DWORD (spec §4.B, §6):
/// `data_version | (chunk_class_id << 8) | (chunk_version << 16) | (chunk_options << 24)`.
pub fn pack_version_info(data_version: u8, chunk_class_id: u8, chunk_version: u8, options: ChunkOptions) -> u32 {
    (data_version as u32) | ((chunk_class_id as u32) << 8) | ((chunk_version as u32) << 16) | ((options.bits() as u32) << 24)
}

/// Inverse of [`pack_version_info`]. Each field is masked to 8 bits.
pub fn unpack_version_info(packed: u32) -> (u8, u8, u8, ChunkOptions) {
    let data_version = (packed & 0xFF) as u8;
    let chunk_class_id = ((packed >> 8) & 0xFF) as u8;
    let chunk_version = ((packed >> 16) & 0xFF) as u8;
    let options = ChunkOptions::from_bits_retain(((packed >> 24) & 0xFF) as u8);
    (data_version, chunk_class_id, chunk_version, options)
}

/// The atomic serialization unit: identity, a DWORD payload, and its side
/// lists. See the module documentation for the two sub-chunk mechanisms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub class_id: u32,
    pub data_version: u8,
    pub chunk_version: u8,
    pub chunk_class_id: u8,
    pub options: ChunkOptions,
    /// DWORD-indexed payload. Byte length is always `4 * data.len()`.
    pub data: Vec<u32>,
    pub ids: Vec<u32>,
    /// Flat GUID halves of manager GUIDs referenced from this chunk's
    /// payload, two `u32`s per GUID, deduplicated (see [`crate::schema`]
    /// reflection's manager-int handling).
    pub managers: Vec<u32>,
    /// Owned sub-chunks not present inline in `data` (see module docs).
    pub chunks: Vec<Chunk>,
    /// DWORD positions into `data` where an inline sub-chunk begins.
    pub chunk_refs: Vec<u32>,
    /// Informational only; not used to drive decoding.
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl Chunk {
    /// Creates an empty chunk with the documented defaults: current chunk
    /// version, no options, empty side lists.
    pub fn new(class_id: u32) -> Self {
        Chunk {
            class_id,
            chunk_version: CURRENT_CHUNK_VERSION,
            ..Default::default()
        }
    }

    pub fn with_data_version(mut self, data_version: u8) -> Self {
        self.data_version = data_version;
        self
    }

    pub fn with_chunk_class_id(mut self, chunk_class_id: u8) -> Self {
        self.chunk_class_id = chunk_class_id;
        self
    }

    pub fn with_chunk_version(mut self, chunk_version: u8) -> Self {
        self.chunk_version = chunk_version;
        self
    }

    /// The packed `version_info` header DWORD for this chunk's current
    /// identity/options fields.
    pub fn version_info(&self) -> u32 {
        pack_version_info(self.data_version, self.chunk_class_id, self.chunk_version, self.options)
    }

    /// Number of DWORDs in `data`.
    pub fn data_size_dwords(&self) -> u32 {
        self.data.len() as u32
    }

    /// Byte length of `data`; invariant (i) of spec §3.1.
    pub fn data_byte_len(&self) -> usize {
        self.data.len() * 4
    }

    /// Attaches a fully owned child chunk that is not present inline in
    /// `data`. Raises [`ChunkOptions::CHN`].
    pub fn append_subchunk(&mut self, sub: Chunk) {
        self.chunks.push(sub);
        self.options.insert(ChunkOptions::CHN);
    }

    /// Iterates the owned (non-inline) sub-chunks.
    pub fn subchunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Serializes this chunk to its top-level envelope byte layout
    /// (spec §4.B).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len() * 4 + 32);
        out.extend_from_slice(&self.version_info().to_le_bytes());
        out.extend_from_slice(&self.data_size_dwords().to_le_bytes());
        for dword in &self.data {
            out.extend_from_slice(&dword.to_le_bytes());
        }
        if self.options.contains(ChunkOptions::IDS) {
            out.extend_from_slice(&(self.ids.len() as u32).to_le_bytes());
            for id in &self.ids {
                out.extend_from_slice(&id.to_le_bytes());
            }
        }
        if self.options.contains(ChunkOptions::CHN) {
            out.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
            for sub in &self.chunks {
                out.extend_from_slice(&sub.serialize());
            }
        }
        if self.options.contains(ChunkOptions::MAN) {
            out.extend_from_slice(&(self.managers.len() as u32).to_le_bytes());
            for m in &self.managers {
                out.extend_from_slice(&m.to_le_bytes());
            }
        }
        out
    }

    /// Parses a chunk from its top-level envelope byte layout. Rejects with
    /// [`NmoError::InvalidFormat`] if trailing bytes remain after all
    /// declared sections, or [`NmoError::BufferOverrun`] if any declared
    /// length would read past the end of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Chunk> {
        let (chunk, consumed) = Chunk::parse_from(bytes)?;
        if consumed != bytes.len() {
            return Err(NmoError::InvalidFormat(format!(
                "{} trailing byte(s) after chunk envelope",
                bytes.len() - consumed
            )));
        }
        Ok(chunk)
    }

    /// Parses a chunk from the start of `bytes`, returning the chunk plus
    /// the number of bytes its envelope actually occupied. Unlike [`Chunk::parse`],
    /// trailing bytes after the envelope are not an error here: this is what
    /// lets an owned sub-chunk (whose envelope is embedded inside its
    /// parent's, with siblings and a MAN section possibly following it) be
    /// parsed against a shared tail slice instead of one bounded exactly to
    /// its own length.
    fn parse_from(bytes: &[u8]) -> Result<(Chunk, usize)> {
        let total = bytes.len();
        let mut pos = 0usize;

        check_bounds(pos, 8, total)?;
        let version_info = read_u32_le(bytes, pos)?;
        pos += 4;
        let data_size = read_u32_le(bytes, pos)? as usize;
        pos += 4;

        let (data_version, chunk_class_id, chunk_version, options) = unpack_version_info(version_info);

        check_bounds(pos, data_size * 4, total)?;
        let mut data = Vec::with_capacity(data_size);
        for _ in 0..data_size {
            data.push(read_u32_le(bytes, pos)?);
            pos += 4;
        }

        let mut ids = Vec::new();
        if options.contains(ChunkOptions::IDS) {
            check_bounds(pos, 4, total)?;
            let count = read_u32_le(bytes, pos)? as usize;
            pos += 4;
            check_bounds(pos, count * 4, total)?;
            for _ in 0..count {
                ids.push(read_u32_le(bytes, pos)?);
                pos += 4;
            }
        }

        let mut chunks = Vec::new();
        if options.contains(ChunkOptions::CHN) {
            check_bounds(pos, 4, total)?;
            let count = read_u32_le(bytes, pos)? as usize;
            pos += 4;
            for _ in 0..count {
                // A nested chunk's own envelope is self-describing; parse it
                // against the remaining slice (which may hold further
                // siblings and/or a trailing MAN section) and advance past
                // exactly the bytes it consumed, not the whole tail.
                let (sub, consumed) = Chunk::parse_from(&bytes[pos..])?;
                pos += consumed;
                chunks.push(sub);
            }
        }

        let mut managers = Vec::new();
        if options.contains(ChunkOptions::MAN) {
            check_bounds(pos, 4, total)?;
            let count = read_u32_le(bytes, pos)? as usize;
            pos += 4;
            check_bounds(pos, count * 4, total)?;
            for _ in 0..count {
                managers.push(read_u32_le(bytes, pos)?);
                pos += 4;
            }
        }

        Ok((
            Chunk {
                class_id: 0,
                data_version,
                chunk_version,
                chunk_class_id,
                options,
                data,
                ids,
                managers,
                chunks,
                chunk_refs: Vec::new(),
                uncompressed_size: 0,
                compressed_size: 0,
            },
            pos,
        ))
    }

    /// Writes `dword` at DWORD position `pos`, growing `data` with zeros if
    /// needed. Used by writers that pre-allocate a region and back-patch it.
    pub(crate) fn poke_dword(&mut self, pos: usize, value: u32) {
        if pos >= self.data.len() {
            self.data.resize(pos + 1, 0);
        }
        self.data[pos] = value;
    }
}

/// Writes `value` as the four little-endian bytes at `pos` in an
/// already-correctly-sized byte buffer. Small helper shared by the few call
/// sites that back-patch a byte buffer directly instead of a `Vec<u32>`.
pub(crate) fn poke_u32(buf: &mut [u8], pos: usize, value: u32) {
    write_u32_le(buf, pos, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chunk_round_trip() {
        // spec §8 scenario 1
        let chunk = Chunk::new(42).with_data_version(1).with_chunk_class_id(42);
        let bytes = chunk.serialize();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &0x0700_2A01u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());

        let parsed = Chunk::parse(&bytes).unwrap();
        assert_eq!(parsed.data_version, 1);
        assert_eq!(parsed.chunk_class_id, 42);
        assert_eq!(parsed.chunk_version, CURRENT_CHUNK_VERSION);
        assert_eq!(parsed.options, ChunkOptions::empty());
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn version_info_pack_unpack_round_trips() {
        let options = ChunkOptions::IDS | ChunkOptions::CHN;
        let packed = pack_version_info(3, 30, 7, options);
        let (dv, ccid, cv, opts) = unpack_version_info(packed);
        assert_eq!((dv, ccid, cv, opts), (3, 30, 7, options));
    }

    #[test]
    fn parse_rejects_trailing_bytes() {
        let chunk = Chunk::new(1);
        let mut bytes = chunk.serialize();
        bytes.push(0xFF);
        assert!(matches!(Chunk::parse(&bytes), Err(NmoError::InvalidFormat(_))));
    }

    #[test]
    fn parse_rejects_truncated_buffer() {
        let bytes = [0u8; 4];
        assert!(Chunk::parse(&bytes).is_err());
    }

    #[test]
    fn owned_subchunk_round_trip() {
        let mut child = Chunk::new(7);
        child.data.push(0xABCD);
        let mut parent = Chunk::new(1);
        parent.data.push(1);
        parent.append_subchunk(child.clone());

        let bytes = parent.serialize();
        let parsed = Chunk::parse(&bytes).unwrap();
        assert_eq!(parsed.chunks.len(), 1);
        assert_eq!(parsed.chunks[0].data, child.data);
    }

    #[test]
    fn multiple_owned_subchunks_with_managers_round_trip() {
        let mut first = Chunk::new(7);
        first.data.push(0xABCD);
        let mut second = Chunk::new(8);
        second.data.push(0x1234);
        second.data.push(0x5678);

        let mut parent = Chunk::new(1);
        parent.data.push(1);
        parent.append_subchunk(first.clone());
        parent.append_subchunk(second.clone());
        parent.managers.push(0xAAAA);
        parent.managers.push(0xBBBB);
        parent.options.insert(ChunkOptions::MAN);

        let bytes = parent.serialize();
        let parsed = Chunk::parse(&bytes).unwrap();
        assert_eq!(parsed.chunks.len(), 2);
        assert_eq!(parsed.chunks[0].data, first.data);
        assert_eq!(parsed.chunks[1].data, second.data);
        assert_eq!(parsed.managers, parent.managers);
    }
}
