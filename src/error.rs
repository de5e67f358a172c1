// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Error System
//!
//! A single, flat error enum for everything the chunk codec, the schema
//! reflection engine, and the file envelope can fail with. It mirrors the
//! failure-code taxonomy of the on-wire format's original error carrier
//! (spec §6/§7), but propagation is ordinary `Result<T, NmoError>` plus
//! `std::error::Error::source` chaining rather than a hand-rolled cause link.
//!
//! ## Categories
//!
//! - **Buffer/structural**: [`NmoError::BufferOverrun`], [`NmoError::Eof`],
//!   [`NmoError::InvalidOffset`], [`NmoError::OutOfBounds`],
//!   [`NmoError::InvalidFormat`], [`NmoError::Corrupt`]. Raised by the buffer
//!   primitives and the chunk parser/writer; never recovered locally.
//! - **Schema/semantic**: [`NmoError::ValidationFailed`], [`NmoError::NotFound`],
//!   [`NmoError::UnsupportedVersion`], [`NmoError::NotImplemented`],
//!   [`NmoError::NotSupported`]. A `NotFound` from `seek_identifier` is the one
//!   case callers are expected to match and recover from (see
//!   [`NmoError::is_missing_identifier`]); everything else is surfaced.
//! - **Resource**: [`NmoError::NoMem`], [`NmoError::InvalidArgument`],
//!   [`NmoError::InvalidState`]. Always surfaced.

use std::fmt;

/// Severity of a failure, independent of its category.
///
/// Attached for diagnostic reporting; does not change control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Errors raised by the chunk codec, schema engine, and file envelope.
#[derive(thiserror::Error, Debug)]
pub enum NmoError {
    #[error("buffer overrun at position {pos} (needed {need} more bytes, had {have})")]
    BufferOverrun { pos: usize, need: usize, have: usize },

    #[error("end of buffer reached while reading {what}")]
    Eof { what: &'static str },

    #[error("invalid offset {offset} (buffer size {size})")]
    InvalidOffset { offset: usize, size: usize },

    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("identifier 0x{id:08X} not found in chunk")]
    NotFound { id: u32 },

    #[error("unsupported file version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("out of memory")]
    NoMem,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("cannot open: {0}")]
    CantOpen(String),

    #[error("cannot read: {0}")]
    CantRead(String),

    #[error("cannot write: {0}")]
    CantWrite(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for NmoError {
    fn from(err: std::io::Error) -> Self {
        NmoError::Io(err)
    }
}

impl NmoError {
    /// True for the one error shape a class deserializer is expected to
    /// treat as "apply the documented default and continue" rather than
    /// surface: a missing identifier in `seek_identifier`.
    pub fn is_missing_identifier(&self) -> bool {
        matches!(self, NmoError::NotFound { .. })
    }

    /// Severity bucket for diagnostics/logging call sites.
    pub fn severity(&self) -> Severity {
        match self {
            NmoError::NotFound { .. } => Severity::Debug,
            NmoError::UnsupportedVersion { .. }
            | NmoError::ValidationFailed(_)
            | NmoError::InvalidArgument(_) => Severity::Warning,
            NmoError::NoMem | NmoError::Internal(_) | NmoError::Unknown(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Coarse category label, e.g. for metrics tagging.
    pub fn category(&self) -> &'static str {
        match self {
            NmoError::BufferOverrun { .. }
            | NmoError::Eof { .. }
            | NmoError::InvalidOffset { .. }
            | NmoError::OutOfBounds { .. }
            | NmoError::InvalidFormat(_)
            | NmoError::Corrupt(_) => "structural",
            NmoError::ValidationFailed(_)
            | NmoError::NotFound { .. }
            | NmoError::UnsupportedVersion { .. }
            | NmoError::NotImplemented(_)
            | NmoError::NotSupported(_) => "schema",
            NmoError::NoMem | NmoError::InvalidArgument(_) | NmoError::InvalidState(_) => "resource",
            NmoError::FileNotFound(_)
            | NmoError::CantOpen(_)
            | NmoError::CantRead(_)
            | NmoError::CantWrite(_)
            | NmoError::Io(_) => "io",
            NmoError::InvalidSignature | NmoError::ChecksumMismatch => "validation",
            NmoError::Internal(_) | NmoError::Unknown(_) => "internal",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NmoError>;
