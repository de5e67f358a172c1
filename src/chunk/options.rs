// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Chunk option bits (spec §3.1, §6).

use bitflags::bitflags;

bitflags! {
    /// The 8-bit option bitset carried in a chunk's packed `version_info`
    /// header. Presence of a side list (`ids`, `managers`, `chunks`) implies
    /// the corresponding bit; writers raise these bits monotonically as the
    /// matching typed writer is used (spec §4.D "option bits auto-raise").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct ChunkOptions: u8 {
        /// Chunk carries an `ids` side list of object-id references.
        const IDS = 0x01;
        /// Chunk carries a `managers` side list of manager-int references.
        const MAN = 0x02;
        /// Chunk carries owned sub-chunks.
        const CHN = 0x04;
        /// Object-id references in this chunk are file ids and must be
        /// translated through an [`crate::chunk::remap::IdRemap`].
        const FILE = 0x08;
        /// Legacy: allow dynamic growth. Carried for bit-compatibility only.
        const ALLOWDYN = 0x10;
        /// Legacy/unused per one header, but documented as appearing in
        /// older files (spec §9 Open Questions) — preserved on round-trip,
        /// never set by this crate's writer.
        const LISTBIG = 0x20;
        /// Legacy: suppress pointer deletion on destroy. No runtime meaning
        /// in an owned-data model; preserved on round-trip only.
        const DONTDELETE_PTR = 0x40;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_match_spec() {
        assert_eq!(ChunkOptions::IDS.bits(), 0x01);
        assert_eq!(ChunkOptions::MAN.bits(), 0x02);
        assert_eq!(ChunkOptions::CHN.bits(), 0x04);
        assert_eq!(ChunkOptions::FILE.bits(), 0x08);
        assert_eq!(ChunkOptions::ALLOWDYN.bits(), 0x10);
        assert_eq!(ChunkOptions::LISTBIG.bits(), 0x20);
        assert_eq!(ChunkOptions::DONTDELETE_PTR.bits(), 0x40);
    }

    #[test]
    fn unknown_bits_round_trip_via_from_bits_retain() {
        let raw = ChunkOptions::from_bits_retain(0xFF);
        assert_eq!(raw.bits(), 0xFF);
    }
}
