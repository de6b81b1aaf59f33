//! Tests for the chunk journal backing resumable pulls.

use registry::ChunkJournal;

const MIB: u64 = 1024 * 1024;

#[test]
fn small_blob_is_one_chunk() {
    let journal = ChunkJournal::new(3);
    assert_eq!(journal.completed.len(), 1);
    assert_eq!(journal.range(0), (0, 2));
    assert_eq!(journal.pending(), vec![0]);
}

#[test]
fn chunks_split_by_size() {
    let journal = ChunkJournal::new(130 * MIB);
    assert_eq!(journal.completed.len(), 3);
    assert_eq!(journal.range(0), (0, 64 * MIB - 1));
    assert_eq!(journal.range(1), (64 * MIB, 128 * MIB - 1));
    assert_eq!(journal.range(2), (128 * MIB, 130 * MIB - 1));
}

#[test]
fn ranges_cover_exactly_once() {
    let journal = ChunkJournal::new(200 * MIB + 17);
    let mut next_expected = 0;
    for i in 0..journal.completed.len() {
        let (start, end) = journal.range(i);
        assert_eq!(start, next_expected);
        next_expected = end + 1;
    }
    assert_eq!(next_expected, journal.total);
}

#[test]
fn completed_bytes_tracks_marked_chunks() {
    let mut journal = ChunkJournal::new(130 * MIB);
    assert_eq!(journal.completed_bytes(), 0);
    journal.completed[0] = true;
    assert_eq!(journal.completed_bytes(), 64 * MIB);
    journal.completed[2] = true;
    assert_eq!(journal.completed_bytes(), 66 * MIB);
    assert!(!journal.is_complete());
    journal.completed[1] = true;
    assert!(journal.is_complete());
}

#[test]
fn journal_roundtrips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.part");

    let mut journal = ChunkJournal::new(130 * MIB);
    journal.completed[1] = true;
    journal.save(&path).unwrap();

    let loaded = ChunkJournal::load(&path).unwrap();
    assert_eq!(loaded, journal);
    assert_eq!(loaded.pending(), vec![0, 2]);
}

#[test]
fn corrupt_journal_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.part");
    std::fs::write(&path, b"{ nope").unwrap();
    assert!(ChunkJournal::load(&path).is_err());
}
