//! Integration tests for the global filesystem resource resolver.
//!
//! The resolver reads the process environment exactly once, so the whole
//! scenario chain runs in a single serialised test that pins the
//! environment before first use. Hermetic per-feature coverage lives in
//! the library's unit tests.

use poolcore::fs::{
    self, AccessMode, CategoryFlags, FileCategory, FileFlags,
};
use serial_test::serial;

fn collect(category: FileCategory, filename: &str, flags: FileFlags) -> Vec<String> {
    let mut out = Vec::new();
    fs::enumerate_paths(category, filename, flags, AccessMode::empty(), |path, _| {
        out.push(path.to_owned());
        true
    });
    out
}

#[test]
#[serial]
fn test_resolver_end_to_end_with_pinned_environment() {
    // Pin the environment before the resolver singleton is built.
    std::env::set_var("HOME", "/home/u");
    for var in [
        "XDG_DATA_HOME",
        "XDG_DATA_DIRS",
        "XDG_CONFIG_HOME",
        "XDG_CONFIG_DIRS",
        "XDG_STATE_HOME",
        "XDG_CACHE_HOME",
        "XDG_RUNTIME_DIR",
    ] {
        std::env::remove_var(var);
    }
    fs::initialize();

    // XDG defaults: user config home first, then the system config dirs.
    let config = collect(FileCategory::CommonConfig, "", FileFlags::empty());
    assert_eq!(config, vec!["/home/u/.config", "/etc/xdg"]);

    let data = collect(FileCategory::CommonData, "", FileFlags::empty());
    assert_eq!(
        data,
        vec!["/home/u/.local/share", "/usr/local/share", "/usr/share"]
    );

    // Filenames merge onto every candidate, in order, without duplicates.
    let merged = collect(FileCategory::CommonConfig, "app/settings.cfg", FileFlags::empty());
    assert_eq!(
        merged,
        vec![
            "/home/u/.config/app/settings.cfg",
            "/etc/xdg/app/settings.cfg"
        ]
    );
    let unique: std::collections::BTreeSet<&String> = merged.iter().collect();
    assert_eq!(unique.len(), merged.len());

    // No user-dirs.dirs: the user folders fall back to the home dir.
    assert_eq!(
        collect(FileCategory::UserDownload, "", FileFlags::empty()),
        vec!["/home/u"]
    );

    // Fonts ride on the data dirs.
    let fonts = collect(FileCategory::Fonts, "", FileFlags::empty());
    assert_eq!(fonts[0], "/home/u/.local/share/fonts");

    // Category flags.
    assert!(fs::category_flags(FileCategory::UserHome).contains(CategoryFlags::LOCATEABLE));
    assert_eq!(
        fs::category_flags(FileCategory::Custom),
        CategoryFlags::empty()
    );

    // Serialised references round-trip through detection.
    for category in [
        FileCategory::UserHome,
        FileCategory::CommonConfig,
        FileCategory::CommonCache,
    ] {
        let reference = fs::serialize_reference(category, "nested/file.bin");
        let mut relative = None;
        let detected = fs::detect_resource_category(&reference, |_, rel| {
            relative = Some(rel.to_owned());
        });
        assert_eq!(detected, Some(category));
        assert_eq!(relative.as_deref(), Some("nested/file.bin"));
    }

    // Absolute paths map back through the longest matching location.
    let detected = fs::detect_resource_category("/home/u/.config/tool/conf", |_, _| {});
    assert_eq!(detected, Some(FileCategory::CommonConfig));
    assert_eq!(
        fs::resource_category_by_prefix("%COMMON_STATE%:x"),
        Some(FileCategory::CommonState)
    );
    assert_eq!(fs::resource_category_by_prefix("/plain/path"), None);

    // Prefixed enumeration resolves and normalises; escapes are rejected.
    let mut resolved = Vec::new();
    let handled = fs::enumerate_prefixed_path(
        "%USER_HOME%:docs//notes/./a.txt",
        FileFlags::empty(),
        AccessMode::empty(),
        |path, _| {
            resolved.push(path.to_owned());
            true
        },
    );
    assert!(handled);
    assert_eq!(resolved, vec!["/home/u/docs/notes/a.txt"]);
    assert!(!fs::enumerate_prefixed_path(
        "%USER_HOME%:../escape",
        FileFlags::empty(),
        AccessMode::empty(),
        |_, _| true,
    ));

    // Repeated writable probes are idempotent.
    let first = collect(FileCategory::AppCache, "", FileFlags::WRITABLE);
    let second = collect(FileCategory::AppCache, "", FileFlags::WRITABLE);
    assert_eq!(first, second);
}

#[test]
#[serial]
fn test_variable_expansion_against_process_env() {
    std::env::set_var("POOLCORE_TEST_VAR", "/opt/value");
    assert_eq!(fs::read_variable("\"$POOLCORE_TEST_VAR/sub\""), "/opt/value/sub");
    assert_eq!(fs::read_variable("'literal $POOLCORE_TEST_VAR'"), "literal $POOLCORE_TEST_VAR");
    std::env::remove_var("POOLCORE_TEST_VAR");
}
