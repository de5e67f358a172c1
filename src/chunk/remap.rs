// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Object-id remapping between a file's on-disk ids and the runtime ids a
//! loader assigns when rehydrating objects (spec §3.4, §4.E).
//!
//! Built once per load/save operation and handed to the chunk parser/writer
//! so that `object_id` fields translate transparently; it is not meant to
//! outlive the operation that built it and carries no internal locking.

use std::collections::HashMap;

use crate::error::{NmoError, Result};

/// Object id 0 is the reserved "no reference" sentinel and is never looked
/// up; every lookup passes it straight through.
const NULL_ID: u32 = 0;

/// Bidirectional file-id <-> runtime-id translation table for a single load
/// or save operation.
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    runtime_to_file: HashMap<u32, u32>,
    file_to_runtime: HashMap<u32, u32>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a single file id <-> runtime id pair. Last write wins if a
    /// side is mapped twice.
    pub fn insert(&mut self, file_id: u32, runtime_id: u32) {
        self.file_to_runtime.insert(file_id, runtime_id);
        self.runtime_to_file.insert(runtime_id, file_id);
    }

    /// Bulk-loads pairs, e.g. from a header-1 object directory (spec §4.K).
    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (u32, u32)>) {
        for (file_id, runtime_id) in pairs {
            self.insert(file_id, runtime_id);
        }
    }

    /// Translates a file id encountered while parsing to its runtime id.
    /// `0` passes through unchanged. Unmapped non-zero ids also pass through
    /// unchanged — a dangling reference is a schema/validation concern, not
    /// a remap-layer error.
    pub fn to_runtime(&self, file_id: u32) -> u32 {
        if file_id == NULL_ID {
            return NULL_ID;
        }
        *self.file_to_runtime.get(&file_id).unwrap_or(&file_id)
    }

    /// Translates a runtime id to its file id when writing. `0` passes
    /// through unchanged; a non-zero id with no recorded mapping is a
    /// *NotFound* failure (spec §4.D "Object-id encoding with file context"),
    /// not a silent passthrough — unlike the read direction, the writer must
    /// not invent a file id for an object the remap table never learned about.
    pub fn to_file(&self, runtime_id: u32) -> Result<u32> {
        if runtime_id == NULL_ID {
            return Ok(NULL_ID);
        }
        self.runtime_to_file
            .get(&runtime_id)
            .copied()
            .ok_or(NmoError::NotFound { id: runtime_id })
    }

    pub fn len(&self) -> usize {
        self.file_to_runtime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_to_runtime.is_empty()
    }
}
