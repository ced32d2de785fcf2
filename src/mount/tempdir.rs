// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Picks a writable tmpfs-backed root for the MountApplier's scratch
//! workdir. Candidates are probed in a fixed order; the first one that is
//! both tmpfs-backed and writable wins.

use std::fs;
use std::path::{Path, PathBuf};

use crate::defs::{TEMPDIR_CANDIDATES, TEMPDIR_FALLBACK, TEMPDIR_LEAF, TMPFS_MAGIC};

fn is_tmpfs(path: &Path) -> bool {
    match rustix::fs::statfs(path) {
        Ok(stat) => stat.f_type as i64 == TMPFS_MAGIC,
        Err(_) => false,
    }
}

/// Creates and immediately removes a probe file inside `dir`, mirroring a
/// `mkstemp`-style writability check without a full tempfile lifecycle.
fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".magic_mount_probe");
    match fs::File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

pub fn select() -> PathBuf {
    for candidate in TEMPDIR_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_dir() && is_tmpfs(path) && is_writable(path) {
            return path.join(TEMPDIR_LEAF);
        }
    }
    PathBuf::from(TEMPDIR_FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writability_probe_does_not_leave_the_file_behind() {
        let dir = tempdir().unwrap();
        assert!(is_writable(dir.path()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn writability_probe_fails_on_nonexistent_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(!is_writable(&missing));
    }
}
