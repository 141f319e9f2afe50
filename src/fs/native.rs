//! Native filesystem helpers: access probes, recursive mkdir, page size,
//! and POSIX↔native path translation.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{Result, Status};
use crate::fs::{AccessMode, Stat};

/// Checks `path` for the requested access.
///
/// Returns `Ok(())` when every requested check passes, `Declined` when the
/// path does not exist (a soft miss), and an `Io` status for any other
/// native error.
#[cfg(unix)]
pub fn access(path: &str, mode: AccessMode) -> Result<()> {
    use std::ffi::CString;

    let cpath = CString::new(path).map_err(|_| Status::invalid_arg("path contains NUL"))?;
    let mut native_mode = libc::F_OK;
    if mode.contains(AccessMode::READ) {
        native_mode |= libc::R_OK;
    }
    if mode.contains(AccessMode::WRITE) {
        native_mode |= libc::W_OK;
    }
    if mode.contains(AccessMode::EXECUTE) {
        native_mode |= libc::X_OK;
    }
    if unsafe { libc::access(cpath.as_ptr(), native_mode) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::NotFound {
        Err(Status::Declined)
    } else {
        Err(Status::from_io(&err))
    }
}

/// Checks `path` for the requested access (metadata probe).
#[cfg(not(unix))]
pub fn access(path: &str, mode: AccessMode) -> Result<()> {
    let native = to_native(path);
    let meta = match std::fs::metadata(&*native) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(Status::Declined),
        Err(err) => return Err(Status::from_io(&err)),
    };
    if mode.contains(AccessMode::WRITE) && meta.permissions().readonly() {
        return Err(Status::Declined);
    }
    Ok(())
}

/// Creates `path` and all missing parents.
pub fn mkdir_recursive(path: &str) -> Result<()> {
    let native = to_native(path);
    std::fs::create_dir_all(native.as_ref()).map_err(Status::from)
}

/// Probes whether `dir` accepts file creation by writing and removing a
/// marker file. Used for the lazy writable-initialisation of resolver
/// rows where `access(2)` alone is not conclusive.
pub fn write_probe(dir: &str) -> bool {
    let native = to_native(dir);
    let probe = Path::new(native.as_ref()).join(".poolcore-probe");
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
    {
        Ok(file) => {
            drop(file);
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => true,
        Err(_) => false,
    }
}

/// Reads file metadata into a [`Stat`] record.
pub fn stat(path: &str) -> Result<Stat> {
    let native = to_native(path);
    let meta = std::fs::metadata(native.as_ref()).map_err(Status::from)?;
    Ok(Stat {
        size: meta.len(),
        atime: meta.accessed().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        ctime: meta.created().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        is_dir: meta.is_dir(),
    })
}

/// System page size; mapping offsets must be multiples of this.
#[cfg(unix)]
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// System page size; mapping offsets must be multiples of this.
#[cfg(not(unix))]
pub fn page_size() -> usize {
    4096
}

/// Translates a POSIX-style path (`/c/dir/file`) to the native form.
/// Identity on POSIX hosts.
#[cfg(not(windows))]
pub fn to_native(path: &str) -> Cow<'_, str> {
    Cow::Borrowed(path)
}

/// Translates a POSIX-style path (`/c/dir/file`) to the native form
/// (`C:\dir\file`).
#[cfg(windows)]
pub fn to_native(path: &str) -> Cow<'_, str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() {
        let drive = bytes[1].to_ascii_uppercase() as char;
        let rest = &path[2..];
        let mut out = String::with_capacity(path.len() + 1);
        out.push(drive);
        out.push(':');
        if rest.is_empty() {
            out.push('\\');
        } else {
            out.push_str(&rest.replace('/', "\\"));
        }
        Cow::Owned(out)
    } else {
        Cow::Owned(path.replace('/', "\\"))
    }
}

/// Translates a native path back to the POSIX-style contract form.
/// Identity on POSIX hosts.
#[cfg(not(windows))]
pub fn from_native(path: &str) -> Cow<'_, str> {
    Cow::Borrowed(path)
}

/// Translates a native path (`C:\dir\file`) back to the POSIX-style
/// contract form (`/c/dir/file`).
#[cfg(windows)]
pub fn from_native(path: &str) -> Cow<'_, str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let mut out = String::with_capacity(path.len() + 1);
        out.push('/');
        out.push(bytes[0].to_ascii_lowercase() as char);
        out.push_str(&path[2..].replace('\\', "/"));
        Cow::Owned(out)
    } else {
        Cow::Owned(path.replace('\\', "/"))
    }
}

/// Joins path segments with single separators, skipping empty segments.
pub(crate) fn merge_paths(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(part.trim_end_matches('/'));
        } else {
            out.push('/');
            out.push_str(part.trim_matches('/'));
        }
    }
    out
}

/// Parent directory of `path` (everything before the last separator).
pub(crate) fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// True when relative `path` escapes its root through `..` components.
pub(crate) fn is_above_root(path: &str) -> bool {
    let mut depth = 0i32;
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => depth += 1,
        }
    }
    false
}

/// Collapses `.` components and duplicate separators; `None` when the
/// result would be empty or escape the root.
pub(crate) fn reconstruct_path(path: &str) -> Option<String> {
    if is_above_root(path) {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Executable path of the current process, in contract form.
pub(crate) fn exec_path() -> Option<String> {
    let exe: PathBuf = std::env::current_exe().ok()?;
    Some(from_native(&exe.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_skips_empties_and_extra_slashes() {
        assert_eq!(merge_paths(&["/home/u", "file"]), "/home/u/file");
        assert_eq!(merge_paths(&["/home/u/", "/file"]), "/home/u/file");
        assert_eq!(merge_paths(&["/home/u", ""]), "/home/u");
        assert_eq!(merge_paths(&["", "rel"]), "rel");
        assert_eq!(merge_paths(&["/root", "a", "b"]), "/root/a/b");
    }

    #[test]
    fn above_root_detection() {
        assert!(!is_above_root("a/b/c"));
        assert!(!is_above_root("a/../b"));
        assert!(is_above_root("../a"));
        assert!(is_above_root("a/../../b"));
        assert!(!is_above_root("./a"));
    }

    #[test]
    fn reconstruct_collapses() {
        assert_eq!(reconstruct_path("a//b/./c").as_deref(), Some("a/b/c"));
        assert_eq!(reconstruct_path("a/../b").as_deref(), Some("b"));
        assert_eq!(reconstruct_path("../a"), None);
        assert_eq!(reconstruct_path(""), None);
    }

    #[test]
    fn parent_of_path() {
        assert_eq!(parent_dir("/a/b/c"), "/a/b");
        assert_eq!(parent_dir("/a"), "/");
        assert_eq!(parent_dir("a"), "");
    }

    #[cfg(unix)]
    #[test]
    fn access_reports_missing_as_declined() {
        let missing = access("/definitely/not/here/poolcore", AccessMode::EXISTS);
        assert_eq!(missing, Err(Status::Declined));

        assert!(access("/", AccessMode::EXISTS | AccessMode::READ).is_ok());
    }

    #[test]
    fn mkdir_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().into_owned();
        let nested = format!("{base}/a/b/c");
        mkdir_recursive(&nested).unwrap();
        assert!(access(&nested, AccessMode::EXISTS).is_ok());
        assert!(write_probe(&nested));
    }

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size.is_power_of_two());
        assert!(size >= 4096);
    }
}
