//! Integration tests for memory-mapped regions.

use poolcore::fs::{self, map_file, FileInfo, MappingType, ProtFlags};
use std::io::Write;

fn temp_file(len: usize) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("region.bin");
    let mut file = std::fs::File::create(&path).unwrap();
    let chunk = vec![0xABu8; 64 * 1024];
    let mut written = 0;
    while written < len {
        let take = chunk.len().min(len - written);
        file.write_all(&chunk[..take]).unwrap();
        written += take;
    }
    file.sync_all().unwrap();
    (dir, path.to_string_lossy().into_owned())
}

#[test]
fn test_window_into_large_file_leaves_it_intact() {
    // 10 MiB file, 4096-byte window at offset 0.
    let (_dir, path) = temp_file(10 * 1024 * 1024);
    let info = FileInfo::custom(&path);

    let region = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 4096).unwrap();
    assert_eq!(region.len(), 4096);
    assert_eq!(region.as_slice()[0], 0xAB);
    region.sync().unwrap();
    drop(region);

    // The file size is untouched by mapping, syncing, and unmapping.
    let stat = fs::native::stat(&path).unwrap();
    assert_eq!(stat.size, 10 * 1024 * 1024);
    assert!(!stat.is_dir);
}

#[test]
fn test_page_aligned_offset_window() {
    let page = fs::native::page_size();
    let (_dir, path) = temp_file(4 * page);
    let info = FileInfo::custom(&path);

    let region = map_file(
        &info,
        MappingType::Private,
        ProtFlags::MAP_READ,
        page as u64,
        page,
    )
    .unwrap();
    assert_eq!(region.len(), page);

    let misaligned = map_file(
        &info,
        MappingType::Private,
        ProtFlags::MAP_READ,
        page as u64 / 2,
        page,
    );
    assert!(misaligned.is_err());
}

#[test]
fn test_shared_mapping_writes_reach_disk() {
    let (_dir, path) = temp_file(8192);
    let info = FileInfo::custom(&path);

    let mut region = map_file(
        &info,
        MappingType::Shared,
        ProtFlags::MAP_READ | ProtFlags::MAP_WRITE,
        0,
        0,
    )
    .unwrap();
    let slice = region.as_mut_slice().unwrap();
    slice[100] = 0x5A;
    region.sync().unwrap();
    drop(region);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes[100], 0x5A);
    assert_eq!(bytes.len(), 8192);
}

#[test]
fn test_regions_are_movable() {
    let (_dir, path) = temp_file(4096);
    let info = FileInfo::custom(&path);
    let region = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 0).unwrap();

    let moved = region;
    assert_eq!(moved.len(), 4096);
    assert_eq!(moved.mapping_type(), MappingType::Private);
    assert!(moved.prot().contains(ProtFlags::MAP_READ));
}
