//! Categorised filesystem resource resolution and mapped files.
//!
//! The resolver translates a logical `(path, category)` request into zero
//! or more concrete filesystem paths, honouring platform conventions
//! (XDG variables, `user-dirs.dirs`, executable-relative app directories)
//! and per-request visibility, ordering, and access policies. Paths use
//! the POSIX-style form everywhere (`/c/dir/file` on Windows); the
//! [`native`] module translates at the OS boundary.

pub mod mmap;
pub mod native;
mod resource;
mod variable;

pub use mmap::{map_file, MappedRegion, MappingType};
pub use resource::{
    category_flags, detect_resource_category, detect_resource_info, enumerate_paths,
    enumerate_prefixed_path, initialize, initialize_with, register_archive_source,
    resource_category_by_prefix, serialize_reference, ArchiveSource, ResolverSetup,
};
pub use variable::read_variable;

use bitflags::bitflags;

/// Logical classification of a filesystem path.
///
/// Every category except [`Custom`](FileCategory::Custom) has a row in the
/// resolver table and a canonical `%PREFIX%:` used in serialised
/// references; `Custom` requests fall through to native absolute-path
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum FileCategory {
    Exec,
    Library,
    Fonts,
    UserHome,
    UserDesktop,
    UserDownload,
    UserDocuments,
    UserMusic,
    UserPictures,
    UserVideos,
    CommonData,
    CommonConfig,
    CommonState,
    CommonCache,
    CommonRuntime,
    AppData,
    AppConfig,
    AppState,
    AppCache,
    AppRuntime,
    /// Resources packaged with the application binary; may be
    /// archive-backed.
    Bundled,
    /// No table row: resolution falls through to native absolute paths.
    Custom,
}

impl FileCategory {
    /// Categories with a resolver table row, in table order.
    pub const TABLE: [FileCategory; 21] = [
        FileCategory::Exec,
        FileCategory::Library,
        FileCategory::Fonts,
        FileCategory::UserHome,
        FileCategory::UserDesktop,
        FileCategory::UserDownload,
        FileCategory::UserDocuments,
        FileCategory::UserMusic,
        FileCategory::UserPictures,
        FileCategory::UserVideos,
        FileCategory::CommonData,
        FileCategory::CommonConfig,
        FileCategory::CommonState,
        FileCategory::CommonCache,
        FileCategory::CommonRuntime,
        FileCategory::AppData,
        FileCategory::AppConfig,
        FileCategory::AppState,
        FileCategory::AppCache,
        FileCategory::AppRuntime,
        FileCategory::Bundled,
    ];

    /// Canonical serialisation prefix (`""` for `Custom`).
    pub fn prefix(self) -> &'static str {
        match self {
            FileCategory::Exec => "%EXEC%:",
            FileCategory::Library => "%LIBRARY%:",
            FileCategory::Fonts => "%FONTS%:",
            FileCategory::UserHome => "%USER_HOME%:",
            FileCategory::UserDesktop => "%USER_DESKTOP%:",
            FileCategory::UserDownload => "%USER_DOWNLOAD%:",
            FileCategory::UserDocuments => "%USER_DOCUMENTS%:",
            FileCategory::UserMusic => "%USER_MUSIC%:",
            FileCategory::UserPictures => "%USER_PICTURES%:",
            FileCategory::UserVideos => "%USER_VIDEOS%:",
            FileCategory::CommonData => "%COMMON_DATA%:",
            FileCategory::CommonConfig => "%COMMON_CONFIG%:",
            FileCategory::CommonState => "%COMMON_STATE%:",
            FileCategory::CommonCache => "%COMMON_CACHE%:",
            FileCategory::CommonRuntime => "%COMMON_RUNTIME%:",
            FileCategory::AppData => "%APP_DATA%:",
            FileCategory::AppConfig => "%APP_CONFIG%:",
            FileCategory::AppState => "%APP_STATE%:",
            FileCategory::AppCache => "%APP_CACHE%:",
            FileCategory::AppRuntime => "%APP_RUNTIME%:",
            FileCategory::Bundled => "%PLATFORM%:",
            FileCategory::Custom => "",
        }
    }

    pub(crate) fn table_index(self) -> Option<usize> {
        Self::TABLE.iter().position(|c| *c == self)
    }
}

bitflags! {
    /// Visibility, ordering, and mutability bits attached to a path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct FileFlags: u32 {
        /// Visible to this application only.
        const PRIVATE = 1 << 0;
        /// Visible to the user's other applications.
        const PUBLIC = 1 << 1;
        /// Visible system-wide.
        const SHARED = 1 << 2;
        /// The location accepts writes.
        const WRITABLE = 1 << 3;

        /// Reorder so `PRIVATE` locations come first.
        const PRIVATE_FIRST = 1 << 4;
        /// Reorder so `PUBLIC` locations come first.
        const PUBLIC_FIRST = 1 << 5;
        /// Reorder so `SHARED` locations come first.
        const SHARED_FIRST = 1 << 6;

        /// Create the candidate's parent directory before reporting it.
        const MAKE_WRITABLE_DIR = 1 << 7;

        /// Bits that filter locations.
        const PATH_MASK = Self::PRIVATE.bits()
            | Self::PUBLIC.bits()
            | Self::SHARED.bits()
            | Self::WRITABLE.bits();
        /// Bits that reorder locations.
        const ORDER_MASK = Self::PRIVATE_FIRST.bits()
            | Self::PUBLIC_FIRST.bits()
            | Self::SHARED_FIRST.bits();
    }
}

bitflags! {
    /// Properties of a whole resolver category.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct CategoryFlags: u32 {
        /// At least one known path exists for the category.
        const LOCATEABLE = 1 << 0;
        /// Resolution goes through a platform backend (archive source).
        const PLATFORM_SPECIFIC = 1 << 1;
        /// The backing mount may disappear.
        const REMOVABLE = 1 << 2;
    }
}

bitflags! {
    /// Access checks requested from the native layer (empty = none).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AccessMode: u32 {
        /// The path exists.
        const EXISTS = 1 << 0;
        /// The path is readable.
        const READ = 1 << 1;
        /// The path is writable.
        const WRITE = 1 << 2;
        /// The path is executable / searchable.
        const EXECUTE = 1 << 3;
    }
}

bitflags! {
    /// POSIX-style protection bits plus mapping protections.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[allow(missing_docs)]
    pub struct ProtFlags: u32 {
        const USER_READ = 1 << 0;
        const USER_WRITE = 1 << 1;
        const USER_EXECUTE = 1 << 2;
        const GROUP_READ = 1 << 3;
        const GROUP_WRITE = 1 << 4;
        const GROUP_EXECUTE = 1 << 5;
        const ALL_READ = 1 << 6;
        const ALL_WRITE = 1 << 7;
        const ALL_EXECUTE = 1 << 8;
        const SET_UID = 1 << 9;
        const SET_GID = 1 << 10;

        /// Map pages readable.
        const MAP_READ = 1 << 16;
        /// Map pages writable.
        const MAP_WRITE = 1 << 17;
        /// Map pages executable.
        const MAP_EXECUTE = 1 << 18;
    }
}

/// A `(path, category)` pair addressing a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo<'a> {
    /// Category-relative (or, for `Custom`, absolute) path.
    pub path: &'a str,
    /// Category the path is resolved under.
    pub category: FileCategory,
}

impl<'a> FileInfo<'a> {
    /// Addresses `path` under `category`.
    pub fn new(path: &'a str, category: FileCategory) -> Self {
        FileInfo { path, category }
    }

    /// Addresses a native absolute path.
    pub fn custom(path: &'a str) -> Self {
        FileInfo {
            path,
            category: FileCategory::Custom,
        }
    }
}

/// POSIX-like file metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub struct Stat {
    pub size: u64,
    pub atime: std::time::SystemTime,
    pub ctime: std::time::SystemTime,
    pub mtime: std::time::SystemTime,
    pub is_dir: bool,
}

impl Default for Stat {
    fn default() -> Self {
        Stat {
            size: 0,
            atime: std::time::SystemTime::UNIX_EPOCH,
            ctime: std::time::SystemTime::UNIX_EPOCH,
            mtime: std::time::SystemTime::UNIX_EPOCH,
            is_dir: false,
        }
    }
}
