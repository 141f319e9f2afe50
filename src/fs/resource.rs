//! Process-wide filesystem resource resolver.
//!
//! One table row per [`FileCategory`], populated from the platform on
//! first use: XDG variables (with freedesktop defaults), `PATH`,
//! `LD_LIBRARY_PATH`, `user-dirs.dirs`, and the executable's own
//! directory. Rows are immutable after initialisation; the only
//! post-init mutation is the lazy writable probe, serialised by a mutex
//! and recorded in atomics so reads stay lock-free.
//!
//! All interned strings live in the resolver's pool for the life of the
//! process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;

use crate::fs::native;
use crate::fs::variable::{expand_value, read_env_ext, EnvSource};
use crate::fs::{AccessMode, CategoryFlags, FileCategory, FileFlags};
use crate::pool::{Pool, PoolFlags};
use crate::sync::{lock, Mutex};

/// Application identity handed to [`initialize_with`].
#[derive(Debug, Clone, Default)]
pub struct ResolverSetup {
    /// Bundle name used to derive per-application XDG subdirectories.
    pub bundle_name: Option<String>,
    /// Search roots for the `Bundled` category (value expressions).
    pub bundle_paths: Vec<String>,
    /// Place app directories under the common XDG locations instead of
    /// the executable's directory.
    pub app_path_common: bool,
}

/// An archive-backed read-only resource namespace serving a
/// platform-specific category (a pack file, an asset archive).
pub trait ArchiveSource: Send + Sync {
    /// The category this source serves.
    fn category(&self) -> FileCategory;

    /// Checks a relative path inside the archive.
    fn access(&self, path: &str, mode: AccessMode) -> bool;

    /// Reports concrete candidates for a relative path; stops when the
    /// callback returns false.
    fn enumerate(&self, path: &str, cb: &mut dyn FnMut(&str, FileFlags) -> bool);
}

struct PathEntry {
    path: &'static str,
    flags: AtomicU32,
}

impl PathEntry {
    fn new(path: &'static str, flags: FileFlags) -> Self {
        PathEntry {
            path,
            flags: AtomicU32::new(flags.bits()),
        }
    }

    #[inline]
    fn flags(&self) -> FileFlags {
        FileFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    fn demote_writable(&self) {
        self.flags
            .fetch_and(!FileFlags::WRITABLE.bits(), Ordering::AcqRel);
    }
}

struct ResourceLocation {
    category: FileCategory,
    prefix: &'static str,
    paths: Vec<PathEntry>,
    init: AtomicBool,
    flags: CategoryFlags,
    default_flags: FileFlags,
}

impl ResourceLocation {
    fn new(category: FileCategory) -> Self {
        ResourceLocation {
            category,
            prefix: category.prefix(),
            paths: Vec::new(),
            init: AtomicBool::new(false),
            flags: CategoryFlags::empty(),
            default_flags: FileFlags::empty(),
        }
    }
}

pub(crate) struct ResolverData {
    env: EnvSource,
    locations: Vec<ResourceLocation>,
    init_mutex: Mutex<()>,
    archives: Mutex<Vec<Box<dyn ArchiveSource>>>,
    /// Owns every interned string; dropped last, never cleared.
    pool: Pool,
}

static RESOLVER: OnceLock<ResolverData> = OnceLock::new();

fn data() -> &'static ResolverData {
    RESOLVER.get_or_init(|| ResolverData::build(EnvSource::Process, &ResolverSetup::default()))
}

/// Initialises the resolver from the process environment (idempotent).
pub fn initialize() {
    let _ = data();
}

/// Initialises the resolver with an application identity. Returns false
/// when the resolver was already initialised (the call is then a no-op).
pub fn initialize_with(setup: ResolverSetup) -> bool {
    RESOLVER
        .set(ResolverData::build(EnvSource::Process, &setup))
        .is_ok()
}

/// Installs an archive-backed namespace for a platform-specific category.
pub fn register_archive_source(source: Box<dyn ArchiveSource>) {
    lock(&data().archives).push(source);
}

/// Reports the concrete paths to try for `(category, filename)` under the
/// given flags and access policy; stops when the callback returns false.
pub fn enumerate_paths(
    category: FileCategory,
    filename: &str,
    flags: FileFlags,
    access: AccessMode,
    cb: impl FnMut(&str, FileFlags) -> bool,
) {
    data().enumerate_paths(category, filename, flags, access, cb)
}

/// Maps a path (prefixed or absolute) back to its category. On success
/// the callback receives `(prefixed_path, category_relative_path)` once.
pub fn detect_resource_category(
    path: &str,
    cb: impl FnMut(&str, &str),
) -> Option<FileCategory> {
    data().detect_resource_category(path, cb)
}

/// Confirms a `(path, category)` pair and reports its serialised form.
///
/// `Custom` infos are never confirmed (they carry no table row). For
/// platform-specific categories the path must exist in a registered
/// archive source.
pub fn detect_resource_info(
    info: &crate::fs::FileInfo<'_>,
    cb: impl FnMut(&str, &str),
) -> Option<FileCategory> {
    data().detect_resource_info(info, cb)
}

/// The category whose canonical prefix starts `path`.
pub fn resource_category_by_prefix(path: &str) -> Option<FileCategory> {
    data().category_by_prefix(path)
}

/// Resolves a serialised `%PREFIX%:relative/path` reference. Returns
/// false when the reference is not prefixed or is rejected.
pub fn enumerate_prefixed_path(
    path: &str,
    flags: FileFlags,
    access: AccessMode,
    cb: impl FnMut(&str, FileFlags) -> bool,
) -> bool {
    data().enumerate_prefixed_path(path, flags, access, cb)
}

/// Flags describing `category`'s resolver row.
pub fn category_flags(category: FileCategory) -> CategoryFlags {
    data().category_flags(category)
}

/// Serialises a category-relative path as `%PREFIX%:path`.
pub fn serialize_reference(category: FileCategory, path: &str) -> String {
    format!("{}{}", category.prefix(), path.trim_start_matches('/'))
}

impl ResolverData {
    pub(crate) fn build(env: EnvSource, setup: &ResolverSetup) -> ResolverData {
        let pool = Pool::create_tagged("filesystem.resources", PoolFlags::CUSTOM);
        let mut data = ResolverData {
            env,
            locations: FileCategory::TABLE.iter().map(|c| ResourceLocation::new(*c)).collect(),
            init_mutex: Mutex::new(()),
            archives: Mutex::new(Vec::new()),
            pool,
        };
        data.init_system_paths(setup);
        data
    }

    fn intern(&self, value: &str) -> &'static str {
        let trimmed = value.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() && value.starts_with('/') {
            "/"
        } else {
            trimmed
        };
        let ptr = self.pool.strdup(trimmed);
        // The backing pool lives as long as this resolver and is never
        // cleared, so the laundered lifetime holds for every reader.
        unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr.as_ptr(), trimmed.len()))
        }
    }

    fn row(&self, category: FileCategory) -> Option<&ResourceLocation> {
        category.table_index().map(|idx| &self.locations[idx])
    }

    fn row_mut(&mut self, category: FileCategory) -> &mut ResourceLocation {
        let idx = category.table_index().expect("category has a table row");
        &mut self.locations[idx]
    }

    fn category_flags(&self, category: FileCategory) -> CategoryFlags {
        self.row(category).map(|r| r.flags).unwrap_or(CategoryFlags::empty())
    }

    fn category_by_prefix(&self, path: &str) -> Option<FileCategory> {
        self.locations
            .iter()
            .find(|row| path.starts_with(row.prefix))
            .map(|row| row.category)
    }

    // ----- lazy writable initialisation --------------------------------

    /// First writable request against a row: create the writable
    /// directories and demote entries that fail the probe. Idempotent.
    fn init_resource(&self, row: &ResourceLocation) {
        if row.paths.is_empty() || row.init.load(Ordering::Acquire) {
            return;
        }
        if !row.flags.contains(CategoryFlags::PLATFORM_SPECIFIC) {
            for entry in &row.paths {
                if entry.flags().contains(FileFlags::WRITABLE) {
                    if let Err(status) = native::mkdir_recursive(entry.path) {
                        tracing::warn!(
                            target: "poolcore::fs",
                            "mkdir for {} failed: {status}; dropping writable",
                            entry.path
                        );
                        entry.demote_writable();
                        continue;
                    }
                    if native::access(entry.path, AccessMode::WRITE).is_err() {
                        tracing::warn!(
                            target: "poolcore::fs",
                            "{} is not writable; dropping writable",
                            entry.path
                        );
                        entry.demote_writable();
                    }
                }
            }
        }
        row.init.store(true, Ordering::Release);
    }

    // ----- enumeration --------------------------------------------------

    /// Ordered walk of a row's entries: the order bit's matching entries
    /// first, relative order preserved on both sides.
    fn ordered_entries<'a>(
        order: FileFlags,
        paths: &'a [PathEntry],
        mut cb: impl FnMut(&'a PathEntry) -> bool,
    ) {
        let match_bit = if order.contains(FileFlags::PRIVATE_FIRST) {
            FileFlags::PRIVATE
        } else if order.contains(FileFlags::PUBLIC_FIRST) {
            FileFlags::PUBLIC
        } else if order.contains(FileFlags::SHARED_FIRST) {
            FileFlags::SHARED
        } else {
            for entry in paths {
                if !cb(entry) {
                    return;
                }
            }
            return;
        };
        for entry in paths.iter().filter(|e| e.flags().contains(match_bit)) {
            if !cb(entry) {
                return;
            }
        }
        for entry in paths.iter().filter(|e| !e.flags().contains(match_bit)) {
            if !cb(entry) {
                return;
            }
        }
    }

    fn enumerate_row(
        &self,
        row: &ResourceLocation,
        filename: &str,
        flags: FileFlags,
        access: AccessMode,
        mut cb: impl FnMut(&str, FileFlags) -> bool,
    ) {
        let writable = flags.contains(FileFlags::WRITABLE);
        let mut path_flags = flags & FileFlags::PATH_MASK;
        let order_flags = flags & FileFlags::ORDER_MASK;

        if access.contains(AccessMode::WRITE) {
            path_flags |= FileFlags::WRITABLE;
        }

        if writable && !row.init.load(Ordering::Acquire) {
            let _guard = lock(&self.init_mutex);
            self.init_resource(row);
        }

        Self::ordered_entries(order_flags, &row.paths, |entry| {
            let loc_flags = entry.flags();
            if writable && !loc_flags.contains(FileFlags::WRITABLE) {
                return true;
            }
            if !path_flags.is_empty() && (loc_flags & path_flags).is_empty() {
                return true;
            }
            let candidate = native::merge_paths(&[entry.path, filename]);
            if !access.is_empty() && native::access(&candidate, access).is_err() {
                return true;
            }
            if flags.contains(FileFlags::MAKE_WRITABLE_DIR) {
                let _ = native::mkdir_recursive(native::parent_dir(&candidate));
            }
            cb(&candidate, loc_flags)
        });
    }

    fn enumerate_paths(
        &self,
        category: FileCategory,
        filename: &str,
        mut flags: FileFlags,
        access: AccessMode,
        mut cb: impl FnMut(&str, FileFlags) -> bool,
    ) {
        if native::is_above_root(filename) {
            return;
        }

        // Custom falls through to native absolute-path resolution.
        let Some(row) = self.row(category) else {
            if access.is_empty() || native::access(filename, access).is_ok() {
                cb(filename, FileFlags::empty());
            }
            return;
        };

        if flags.contains(FileFlags::MAKE_WRITABLE_DIR) {
            flags |= FileFlags::WRITABLE;
        }
        if flags.intersects(FileFlags::PATH_MASK) {
            flags |= row.default_flags;
        }

        if row.flags.contains(CategoryFlags::PLATFORM_SPECIFIC) {
            let archives = lock(&self.archives);
            for archive in archives.iter().filter(|a| a.category() == category) {
                let mut stopped = false;
                archive.enumerate(filename, &mut |path, entry_flags| {
                    let keep = cb(path, entry_flags);
                    stopped = !keep;
                    keep
                });
                if stopped {
                    break;
                }
            }
            return;
        }

        self.enumerate_row(row, filename, flags, access, cb);
    }

    // ----- detection -----------------------------------------------------

    fn detect_resource_category(
        &self,
        path: &str,
        mut cb: impl FnMut(&str, &str),
    ) -> Option<FileCategory> {
        if path.starts_with('%') {
            let category = self.category_by_prefix(path)?;
            let prefix = category.prefix();
            cb(path, path[prefix.len()..].trim_start_matches('/'));
            return Some(category);
        }

        let relative = path.trim_start_matches('/');
        {
            let archives = lock(&self.archives);
            for row in self
                .locations
                .iter()
                .filter(|r| r.flags.contains(CategoryFlags::PLATFORM_SPECIFIC))
            {
                let served = archives
                    .iter()
                    .any(|a| a.category() == row.category && a.access(relative, AccessMode::EXISTS));
                if served {
                    let prefixed = format!("{}{}", row.prefix, relative);
                    cb(&prefixed, relative);
                    return Some(row.category);
                }
            }
        }

        // In reverse specificity: the longest matching location wins.
        let mut target: Option<&ResourceLocation> = None;
        let mut matched = 0usize;
        for row in self.locations.iter().filter(|r| {
            !r.flags.contains(CategoryFlags::PLATFORM_SPECIFIC)
                && r.flags.contains(CategoryFlags::LOCATEABLE)
        }) {
            for entry in &row.paths {
                if path.starts_with(entry.path)
                    && path.as_bytes().get(entry.path.len()) == Some(&b'/')
                    && entry.path.len() > matched
                {
                    target = Some(row);
                    matched = entry.path.len();
                }
            }
        }

        let row = target?;
        let remainder = path[matched..].trim_start_matches('/');
        let prefixed = format!("{}{}", row.prefix, remainder);
        cb(&prefixed, remainder);
        Some(row.category)
    }

    fn detect_resource_info(
        &self,
        info: &crate::fs::FileInfo<'_>,
        mut cb: impl FnMut(&str, &str),
    ) -> Option<FileCategory> {
        let row = self.row(info.category)?;
        let relative = info.path.trim_start_matches('/');
        if row.flags.contains(CategoryFlags::PLATFORM_SPECIFIC) {
            let archives = lock(&self.archives);
            let served = archives
                .iter()
                .any(|a| a.category() == row.category && a.access(relative, AccessMode::EXISTS));
            if !served {
                return Some(row.category);
            }
        }
        let prefixed = format!("{}{}", row.prefix, relative);
        cb(&prefixed, relative);
        Some(row.category)
    }

    fn enumerate_prefixed_path(
        &self,
        path: &str,
        flags: FileFlags,
        access: AccessMode,
        cb: impl FnMut(&str, FileFlags) -> bool,
    ) -> bool {
        if !path.starts_with('%') {
            return false;
        }
        let Some(category) = self.category_by_prefix(path) else {
            return false;
        };
        let relative = path[category.prefix().len()..].trim_start_matches('/');

        if relative.is_empty() {
            // An empty reference enumerates the category's directories.
            if access.is_empty() {
                self.enumerate_paths(category, "", flags, access, cb);
                return true;
            }
            return false;
        }

        let Some(reconstructed) = native::reconstruct_path(relative) else {
            return false;
        };
        self.enumerate_paths(category, &reconstructed, flags, access, cb);
        true
    }

    // ----- platform initialisation ---------------------------------------

    #[cfg(not(windows))]
    fn init_system_paths(&mut self, setup: &ResolverSetup) {
        let env = self.env.clone();
        let Some(home) = env.home() else {
            tracing::error!(target: "poolcore::fs", "HOME envvar is not defined");
            return;
        };
        let home = home.trim_end_matches('/').to_owned();

        // Bundled search roots from the application identity.
        {
            let bundle_paths: Vec<&'static str> = setup
                .bundle_paths
                .iter()
                .map(|expr| expand_value(&env, expr))
                .filter(|v| !v.is_empty())
                .map(|v| self.intern(&v))
                .collect();
            let row = self.row_mut(FileCategory::Bundled);
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
            for path in bundle_paths {
                row.paths.push(PathEntry::new(path, FileFlags::PRIVATE));
            }
        }

        if let Some(path_env) = env.get("PATH") {
            let entries: Vec<&'static str> = path_env
                .split(':')
                .filter(|p| !p.is_empty())
                .map(|p| self.intern(p))
                .collect();
            let row = self.row_mut(FileCategory::Exec);
            for path in entries {
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            }
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        {
            let entries: Vec<&'static str> = env
                .get("LD_LIBRARY_PATH")
                .map(|ld| {
                    ld.split(':')
                        .filter(|p| !p.is_empty())
                        .map(|p| self.intern(p))
                        .collect()
                })
                .unwrap_or_default();
            let row = self.row_mut(FileCategory::Library);
            for path in entries {
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            }
            row.flags |= CategoryFlags::LOCATEABLE | CategoryFlags::PLATFORM_SPECIFIC;
        }

        // XDG base directories, with the freedesktop defaults.
        if let Some(data_home) = read_env_ext(&env, "XDG_DATA_HOME") {
            let mut paths = vec![(self.intern(&data_home), FileFlags::SHARED)];
            if let Some(dirs) = env.get("XDG_DATA_DIRS") {
                for dir in dirs.split(':').filter(|p| !p.is_empty()) {
                    paths.push((self.intern(dir), FileFlags::SHARED));
                }
            } else {
                paths.push(("/usr/local/share", FileFlags::SHARED));
                paths.push(("/usr/share", FileFlags::SHARED));
            }
            let row = self.row_mut(FileCategory::CommonData);
            for (path, flags) in paths {
                row.paths.push(PathEntry::new(path, flags));
            }
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        if let Some(config_home) = read_env_ext(&env, "XDG_CONFIG_HOME") {
            let mut paths = vec![(self.intern(&config_home), FileFlags::SHARED)];
            if let Some(dirs) = env.get("XDG_CONFIG_DIRS") {
                for dir in dirs.split(':').filter(|p| !p.is_empty()) {
                    paths.push((self.intern(dir), FileFlags::SHARED));
                }
            } else {
                paths.push(("/etc/xdg", FileFlags::SHARED));
            }
            let row = self.row_mut(FileCategory::CommonConfig);
            for (path, flags) in paths {
                row.paths.push(PathEntry::new(path, flags));
            }
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        for (key, category) in [
            ("XDG_STATE_HOME", FileCategory::CommonState),
            ("XDG_CACHE_HOME", FileCategory::CommonCache),
            ("XDG_RUNTIME_DIR", FileCategory::CommonRuntime),
        ] {
            if let Some(value) = read_env_ext(&env, key) {
                let path = self.intern(&value);
                let row = self.row_mut(category);
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
                row.init.store(true, Ordering::Release);
                row.flags |= CategoryFlags::LOCATEABLE;
            }
        }

        {
            let path = self.intern(&home);
            let row = self.row_mut(FileCategory::UserHome);
            row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        // Font directories ride on the data locations.
        {
            let data_row = self.row(FileCategory::CommonData).expect("table row");
            let font_paths: Vec<&'static str> = data_row
                .paths
                .iter()
                .map(|entry| self.intern(&native::merge_paths(&[entry.path, "fonts"])))
                .collect();
            let row = self.row_mut(FileCategory::Fonts);
            for path in font_paths {
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            }
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        self.read_user_dirs(&env, &home);

        for category in [
            FileCategory::UserHome,
            FileCategory::UserDesktop,
            FileCategory::UserDownload,
            FileCategory::UserDocuments,
            FileCategory::UserMusic,
            FileCategory::UserPictures,
            FileCategory::UserVideos,
        ] {
            let path = self.intern(&home);
            let row = self.row_mut(category);
            if row.paths.is_empty() {
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
                row.init.store(true, Ordering::Release);
            }
        }

        self.init_app_locations(setup);
    }

    /// Reads the freedesktop `user-dirs.dirs` file for the user-folder
    /// categories.
    #[cfg(not(windows))]
    fn read_user_dirs(&mut self, env: &EnvSource, home: &str) {
        let Some(config_home) = read_env_ext(env, "XDG_CONFIG_HOME") else {
            return;
        };
        let file = native::merge_paths(&[&config_home, "user-dirs.dirs"]);
        let Ok(contents) = std::fs::read_to_string(&*native::to_native(&file)) else {
            tracing::warn!(
                target: "poolcore::fs",
                "XDG defaults (user-dirs.dirs) not found, fallback to home dir"
            );
            return;
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((var, value)) = line.split_once('=') else {
                continue;
            };
            let category = match var.trim() {
                "XDG_DESKTOP_DIR" => FileCategory::UserDesktop,
                "XDG_DOWNLOAD_DIR" => FileCategory::UserDownload,
                "XDG_DOCUMENTS_DIR" => FileCategory::UserDocuments,
                "XDG_MUSIC_DIR" => FileCategory::UserMusic,
                "XDG_PICTURES_DIR" => FileCategory::UserPictures,
                "XDG_VIDEOS_DIR" => FileCategory::UserVideos,
                _ => continue,
            };
            let expanded = expand_value(env, value);
            if expanded.is_empty() {
                continue;
            }
            let locateable = expanded != home;
            let path = self.intern(&expanded);
            let row = self.row_mut(category);
            row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            row.init.store(true, Ordering::Release);
            if locateable {
                row.flags |= CategoryFlags::LOCATEABLE;
            }
        }
    }

    /// App-scoped rows: under the common XDG locations when the setup
    /// says so, otherwise beside the executable.
    fn init_app_locations(&mut self, setup: &ResolverSetup) {
        const APP_ROWS: [(FileCategory, FileCategory, &str); 5] = [
            (FileCategory::AppData, FileCategory::CommonData, "Data"),
            (FileCategory::AppConfig, FileCategory::CommonConfig, "Config"),
            (FileCategory::AppState, FileCategory::CommonState, "State"),
            (FileCategory::AppCache, FileCategory::CommonCache, "Cache"),
            (FileCategory::AppRuntime, FileCategory::CommonRuntime, "Runtime"),
        ];

        if let (Some(bundle), true) = (&setup.bundle_name, setup.app_path_common) {
            for (app, common, _) in APP_ROWS {
                let Some(base) = self
                    .row(common)
                    .and_then(|row| row.paths.first())
                    .map(|entry| entry.path)
                else {
                    continue;
                };
                let path = self.intern(&native::merge_paths(&[base, bundle]));
                let row = self.row_mut(app);
                row.paths
                    .push(PathEntry::new(path, FileFlags::PRIVATE | FileFlags::PUBLIC));
                row.flags |= CategoryFlags::LOCATEABLE;
            }
            return;
        }

        let root = match self.env.get("EXEC_DIR").or_else(|| {
            native::exec_path().map(|exe| native::parent_dir(&exe).to_owned())
        }) {
            Some(root) => root,
            None => return,
        };
        for (app, _, sub) in APP_ROWS {
            let path = self.intern(&native::merge_paths(&[&root, "AppData", sub]));
            let row = self.row_mut(app);
            row.paths.push(PathEntry::new(
                path,
                FileFlags::PRIVATE | FileFlags::PUBLIC | FileFlags::WRITABLE,
            ));
            row.flags |= CategoryFlags::LOCATEABLE;
        }
    }

    #[cfg(windows)]
    fn init_system_paths(&mut self, setup: &ResolverSetup) {
        let env = self.env.clone();
        let Some(profile) = env
            .get("USERPROFILE")
            .map(|p| native::from_native(&p).into_owned())
        else {
            tracing::error!(target: "poolcore::fs", "USERPROFILE envvar is not defined");
            return;
        };

        if let Some(path_env) = env.get("PATH") {
            let entries: Vec<&'static str> = path_env
                .split(';')
                .filter(|p| !p.is_empty())
                .map(|p| self.intern(&native::from_native(p)))
                .collect();
            let row = self.row_mut(FileCategory::Exec);
            for path in entries {
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            }
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        let roaming = env.get("APPDATA").map(|p| native::from_native(&p).into_owned());
        let local = env
            .get("LOCALAPPDATA")
            .map(|p| native::from_native(&p).into_owned());
        for (category, base) in [
            (FileCategory::CommonData, roaming.clone()),
            (FileCategory::CommonConfig, roaming.clone()),
            (FileCategory::CommonState, roaming),
            (FileCategory::CommonCache, local.clone()),
            (FileCategory::CommonRuntime, local),
        ] {
            if let Some(base) = base {
                let path = self.intern(&base);
                let row = self.row_mut(category);
                row.paths.push(PathEntry::new(path, FileFlags::SHARED));
                row.init.store(true, Ordering::Release);
                row.flags |= CategoryFlags::LOCATEABLE;
            }
        }

        for (category, sub) in [
            (FileCategory::UserHome, ""),
            (FileCategory::UserDesktop, "Desktop"),
            (FileCategory::UserDownload, "Downloads"),
            (FileCategory::UserDocuments, "Documents"),
            (FileCategory::UserMusic, "Music"),
            (FileCategory::UserPictures, "Pictures"),
            (FileCategory::UserVideos, "Videos"),
        ] {
            let path = self.intern(&native::merge_paths(&[&profile, sub]));
            let row = self.row_mut(category);
            row.paths.push(PathEntry::new(path, FileFlags::SHARED));
            row.init.store(true, Ordering::Release);
            row.flags |= CategoryFlags::LOCATEABLE;
        }

        self.init_app_locations(setup);
    }
}
