// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration
//!
//! Self-validating builder-pattern value objects for one decode or encode
//! operation (spec §1.3), in the style of the teacher's stage-parameter
//! value objects: construct with `new`, adjust fluently, call `build` to
//! get back a validated, immutable options value.

use crate::error::{NmoError, Result};

/// How strictly [`crate::envelope::Envelope::parse`] and the class codecs
/// treat recoverable anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Apply documented defaults for a missing identifier or an
    /// out-of-range value and continue (spec §7's default recovery path).
    Lenient,
    /// Surface every anomaly as an error instead of defaulting it away.
    Strict,
}

/// Options controlling one decode (load) operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    strictness: Strictness,
    max_file_version: u32,
    skip_unknown_classes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            strictness: Strictness::Lenient,
            max_file_version: crate::envelope::CURRENT_FILE_VERSION,
            skip_unknown_classes: true,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> DecodeOptionsBuilder {
        DecodeOptionsBuilder(DecodeOptions::default())
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn max_file_version(&self) -> u32 {
        self.max_file_version
    }

    pub fn skip_unknown_classes(&self) -> bool {
        self.skip_unknown_classes
    }
}

/// Fluent builder for [`DecodeOptions`].
pub struct DecodeOptionsBuilder(DecodeOptions);

impl DecodeOptionsBuilder {
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.0.strictness = strictness;
        self
    }

    pub fn max_file_version(mut self, version: u32) -> Self {
        self.0.max_file_version = version;
        self
    }

    pub fn skip_unknown_classes(mut self, skip: bool) -> Self {
        self.0.skip_unknown_classes = skip;
        self
    }

    /// Validates and finishes the options. Fails if `max_file_version` is
    /// older than the format's oldest readable version.
    pub fn build(self) -> Result<DecodeOptions> {
        if self.0.max_file_version < crate::envelope::MIN_FILE_VERSION {
            return Err(NmoError::InvalidArgument(format!(
                "max_file_version {} is older than the oldest readable version {}",
                self.0.max_file_version,
                crate::envelope::MIN_FILE_VERSION
            )));
        }
        Ok(self.0)
    }
}

/// Options controlling one encode (save) operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    file_version: u32,
    chunk_version: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            file_version: crate::envelope::CURRENT_FILE_VERSION,
            chunk_version: crate::chunk::CURRENT_CHUNK_VERSION,
        }
    }
}

impl EncodeOptions {
    pub fn new() -> EncodeOptionsBuilder {
        EncodeOptionsBuilder(EncodeOptions::default())
    }

    pub fn file_version(&self) -> u32 {
        self.file_version
    }

    pub fn chunk_version(&self) -> u8 {
        self.chunk_version
    }

    /// A [`crate::chunk::ChunkWriter`] pre-set to this session's
    /// `chunk_version`, so every chunk an encode session writes agrees on
    /// one wire version without each call site hard-coding it.
    pub fn new_writer(&self) -> crate::chunk::ChunkWriter {
        crate::chunk::ChunkWriter::new().with_chunk_version(self.chunk_version)
    }
}

/// Fluent builder for [`EncodeOptions`].
pub struct EncodeOptionsBuilder(EncodeOptions);

impl EncodeOptionsBuilder {
    pub fn file_version(mut self, version: u32) -> Self {
        self.0.file_version = version;
        self
    }

    pub fn chunk_version(mut self, version: u8) -> Self {
        self.0.chunk_version = version;
        self
    }

    /// Validates and finishes the options. Fails if `file_version` is
    /// outside the range this crate can itself read back.
    pub fn build(self) -> Result<EncodeOptions> {
        if !(crate::envelope::MIN_FILE_VERSION..=crate::envelope::CURRENT_FILE_VERSION).contains(&self.0.file_version) {
            return Err(NmoError::InvalidArgument(format!(
                "file_version {} is outside the supported range [{}, {}]",
                self.0.file_version,
                crate::envelope::MIN_FILE_VERSION,
                crate::envelope::CURRENT_FILE_VERSION
            )));
        }
        Ok(self.0)
    }
}
