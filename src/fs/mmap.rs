//! Memory-mapped file regions.

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::OpenOptions;

use crate::error::{Result, Status};
use crate::fs::{native, AccessMode, FileCategory, FileFlags, FileInfo, ProtFlags};

/// Sharing mode of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MappingType {
    /// Writes stay private to this mapping (copy-on-write).
    Private,
    /// Writes go back to the file and are visible to other mappings.
    Shared,
}

enum MapVariant {
    Ro(Mmap),
    Rw(MmapMut),
}

/// An exclusive handle to a mapped file region.
///
/// Non-copyable and movable; dropping the region unmaps it. The file
/// descriptor is closed as soon as the mapping exists — the kernel keeps
/// its own reference for the mapping's lifetime.
///
/// # Examples
///
/// ```rust,no_run
/// use poolcore::fs::{map_file, FileInfo, MappingType, ProtFlags};
///
/// let info = FileInfo::custom("/var/data/archive.bin");
/// let region = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 4096).unwrap();
/// let first = region.as_slice()[0];
/// # let _ = first;
/// ```
pub struct MappedRegion {
    map: MapVariant,
    kind: MappingType,
    prot: ProtFlags,
}

impl MappedRegion {
    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.map {
            MapVariant::Ro(map) => map.len(),
            MapVariant::Rw(map) => map.len(),
        }
    }

    /// True for a zero-length mapping.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sharing mode the region was mapped with.
    #[inline]
    pub fn mapping_type(&self) -> MappingType {
        self.kind
    }

    /// Protection flags the region was mapped with.
    #[inline]
    pub fn prot(&self) -> ProtFlags {
        self.prot
    }

    /// The mapped bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match &self.map {
            MapVariant::Ro(map) => map,
            MapVariant::Rw(map) => map,
        }
    }

    /// The mapped bytes, writable. `None` for read-only mappings.
    #[inline]
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match &mut self.map {
            MapVariant::Ro(_) => None,
            MapVariant::Rw(map) => Some(&mut map[..]),
        }
    }

    /// Flushes dirty pages back to the file. A no-op for read-only and
    /// private mappings.
    pub fn sync(&self) -> Result<()> {
        match (&self.map, self.kind) {
            (MapVariant::Rw(map), MappingType::Shared) => map.flush().map_err(Status::from),
            _ => Ok(()),
        }
    }
}

/// Maps `len` bytes of the file at `info`, starting at `offset`.
///
/// `offset` must be a multiple of the platform page size; `len` is
/// clamped to the file size minus the offset (`0` maps the remainder).
/// Non-`Custom` categories resolve through the resource table; `Custom`
/// paths are taken as native absolute paths.
///
/// # Errors
///
/// `InvalidArgument` for a misaligned offset, an offset past the end of
/// the file, or a request with no `MAP_*` protection; `Declined` when the
/// category yields no existing file; `Io` for native failures.
pub fn map_file(
    info: &FileInfo<'_>,
    kind: MappingType,
    prot: ProtFlags,
    offset: u64,
    len: usize,
) -> Result<MappedRegion> {
    if !prot.intersects(ProtFlags::MAP_READ | ProtFlags::MAP_WRITE) {
        return Err(Status::invalid_arg("mapping needs MAP_READ or MAP_WRITE"));
    }
    if offset % native::page_size() as u64 != 0 {
        return Err(Status::invalid_arg("offset must be page-aligned"));
    }

    let path = resolve_path(info)?;
    let native_path = native::to_native(&path);

    let write = prot.contains(ProtFlags::MAP_WRITE) && kind == MappingType::Shared;
    let file = OpenOptions::new()
        .read(true)
        .write(write)
        .open(&*native_path)
        .map_err(Status::from)?;

    let file_len = file.metadata().map_err(Status::from)?.len();
    if offset > file_len {
        return Err(Status::invalid_arg("offset past end of file"));
    }
    let available = (file_len - offset) as usize;
    let len = if len == 0 {
        available
    } else {
        len.min(available)
    };

    let mut options = MmapOptions::new();
    options.offset(offset).len(len);

    // The fd drops at the end of this function; the kernel's reference
    // held by the mapping keeps the pages alive.
    let map = unsafe {
        if prot.contains(ProtFlags::MAP_WRITE) {
            match kind {
                MappingType::Shared => MapVariant::Rw(options.map_mut(&file).map_err(Status::from)?),
                MappingType::Private => {
                    MapVariant::Rw(options.map_copy(&file).map_err(Status::from)?)
                }
            }
        } else {
            MapVariant::Ro(options.map(&file).map_err(Status::from)?)
        }
    };

    Ok(MappedRegion { map, kind, prot })
}

/// Resolves a file info to one concrete existing path.
fn resolve_path(info: &FileInfo<'_>) -> Result<String> {
    if info.category == FileCategory::Custom {
        return Ok(info.path.to_owned());
    }
    let mut found = None;
    crate::fs::enumerate_paths(
        info.category,
        info.path,
        FileFlags::empty(),
        AccessMode::EXISTS | AccessMode::READ,
        |path, _| {
            found = Some(path.to_owned());
            false
        },
    );
    found.ok_or(Status::Declined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(bytes: &[u8]) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        file.sync_all().unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    #[test]
    fn read_only_mapping_sees_contents() {
        let (_dir, path) = temp_file(b"hello mapped world");
        let info = FileInfo::custom(&path);
        let region = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 0).unwrap();
        assert_eq!(&region.as_slice()[..5], b"hello");
        assert_eq!(region.len(), 18);
        assert!(region.sync().is_ok());
    }

    #[test]
    fn length_is_clamped_to_file_size() {
        let (_dir, path) = temp_file(&[7u8; 100]);
        let info = FileInfo::custom(&path);
        let region =
            map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 4096).unwrap();
        assert_eq!(region.len(), 100);
    }

    #[test]
    fn misaligned_offset_is_rejected() {
        let (_dir, path) = temp_file(&[0u8; 8192]);
        let info = FileInfo::custom(&path);
        let result = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 3, 0);
        assert!(matches!(result, Err(Status::InvalidArgument { .. })));
    }

    #[test]
    fn shared_write_flushes_to_file() {
        let (_dir, path) = temp_file(&[0u8; 4096]);
        let info = FileInfo::custom(&path);
        let mut region = map_file(
            &info,
            MappingType::Shared,
            ProtFlags::MAP_READ | ProtFlags::MAP_WRITE,
            0,
            0,
        )
        .unwrap();
        region.as_mut_slice().unwrap()[0] = 42;
        region.sync().unwrap();
        drop(region);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[0], 42);
        // The size is unchanged by mapping and sync.
        assert_eq!(bytes.len(), 4096);
    }

    #[test]
    fn private_write_does_not_touch_file() {
        let (_dir, path) = temp_file(&[1u8; 64]);
        let info = FileInfo::custom(&path);
        let mut region = map_file(
            &info,
            MappingType::Private,
            ProtFlags::MAP_READ | ProtFlags::MAP_WRITE,
            0,
            0,
        )
        .unwrap();
        region.as_mut_slice().unwrap()[0] = 9;
        drop(region);

        assert_eq!(std::fs::read(&path).unwrap()[0], 1);
    }

    #[test]
    fn missing_file_reports_io() {
        let info = FileInfo::custom("/no/such/poolcore/file.bin");
        let result = map_file(&info, MappingType::Private, ProtFlags::MAP_READ, 0, 0);
        assert!(matches!(result, Err(Status::Io { .. })));
    }
}
