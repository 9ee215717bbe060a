//! Systemd search path enumeration
//!
//! Yields the system-scope unit directories under a given filesystem root,
//! highest precedence first. The root may be `/` (the live host) or the
//! mount point of an unpacked firmware image.

use std::path::{Path, PathBuf};

/// System-scope unit directories, relative to the filesystem root,
/// highest precedence first.
pub const SYSTEM_UNIT_DIRS: &[&str] = &[
    "etc/systemd/system",
    "run/systemd/system",
    "usr/local/lib/systemd/system",
    "usr/lib/systemd/system",
    "lib/systemd/system",
];

/// Enumerate the search paths that exist under `root`, highest precedence
/// first. Missing directories are skipped silently.
///
/// `lib/systemd/system` is dropped when `root/lib` is a symlink into
/// `usr/lib` (the usual merged-usr layout), so the same directory is not
/// walked twice under two names.
pub fn search_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for dir in SYSTEM_UNIT_DIRS {
        if *dir == "lib/systemd/system" && lib_is_merged(root) {
            log::debug!("{} is merged into usr/lib, skipping", dir);
            continue;
        }

        let path = root.join(dir);
        if path.is_dir() {
            paths.push(path);
        } else {
            log::debug!("search path {} not present, skipping", path.display());
        }
    }

    paths
}

/// Check whether `root/lib` is a symlink pointing at `usr/lib`.
fn lib_is_merged(root: &Path) -> bool {
    match std::fs::read_link(root.join("lib")) {
        Ok(target) => target == Path::new("usr/lib") || target == Path::new("/usr/lib"),
        Err(_) => false,
    }
}
