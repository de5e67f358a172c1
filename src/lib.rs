// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # nmo_format
//!
//! A state-chunk codec and schema-driven object (de)serializer for the NMO
//! scene-graph file format: a DWORD-indexed chunk container (spec §3.1,
//! §4.B-E), a class-schema reflection layer over it (spec §4.F-J), and the
//! outer file envelope tying both together (spec §3.4, §4.K).
//!
//! ## Layout
//!
//! - [`buffer`] — endianness and DWORD-alignment primitives.
//! - [`chunk`] — the DWORD-indexed chunk container: identity/options,
//!   parser, writer, and id remapping.
//! - [`guid`] — the two-DWORD GUID value type.
//! - [`schema`] — the runtime type registry, generic reflection, class
//!   hierarchy queries, and the four concrete object classes this crate
//!   understands.
//! - [`envelope`] — the outermost file format: signature, header-1
//!   directory, and the manager/object data section.
//! - [`config`] — decode/encode options.
//! - [`error`] — the crate-wide error type.
//!
//! ## Logging
//!
//! This crate instruments itself with `tracing` spans and events but never
//! installs a subscriber; host applications wire up their own.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod envelope;
pub mod error;
pub mod guid;
pub mod schema;

pub use chunk::{Chunk, ChunkOptions, ChunkParser, ChunkWriter, IdRemap};
pub use config::{DecodeOptions, EncodeOptions, Strictness};
pub use envelope::{Envelope, Header1, ManagerRecord, ObjectRecord};
pub use error::{NmoError, Result, Severity};
pub use guid::Guid;
pub use schema::{bootstrap, standard_registry, SchemaRegistry};
