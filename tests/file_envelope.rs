// /////////////////////////////////////////////////////////////////////////////
// NMO format
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! File-backed envelope round trip: writes a complete envelope to disk and
//! reads it back through `std::fs`, rather than round-tripping an in-memory
//! byte buffer as the other integration tests do.

use std::fs;

use nmo_format::envelope::{CURRENT_FILE_VERSION, ObjectDirectoryEntry};
use nmo_format::{Chunk, Envelope, Guid, ManagerRecord, ObjectRecord};
use tempfile::TempDir;

#[test]
fn envelope_round_trips_through_a_real_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scene.nmo");

    let mut envelope = Envelope::new(CURRENT_FILE_VERSION);
    envelope.header1.objects.push(ObjectDirectoryEntry {
        file_id: 1,
        class_id: 30,
        file_index: 0,
        name: "Box01".to_string(),
        reference_only: false,
    });
    envelope.managers.push(ManagerRecord {
        guid: Guid::new(9, 9),
        chunk: Chunk::new(1),
    });
    envelope.objects.push(ObjectRecord {
        object_id: 1,
        class_id: 30,
        chunk: Chunk::new(30).with_data_version(1),
    });

    fs::write(&path, envelope.serialize().unwrap()).unwrap();

    let bytes = fs::read(&path).unwrap();
    let parsed = Envelope::parse(&bytes).unwrap();
    assert_eq!(parsed, envelope);
}

#[test]
fn truncated_file_fails_to_parse() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("truncated.nmo");

    let envelope = Envelope::new(CURRENT_FILE_VERSION);
    let mut bytes = envelope.serialize().unwrap();
    bytes.truncate(bytes.len() - 1);
    fs::write(&path, &bytes).unwrap();

    let read_back = fs::read(&path).unwrap();
    assert!(Envelope::parse(&read_back).is_err());
}
