// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Path joining, existence/type probes, `mkdir -p`, and SELinux context
//! get/set/copy, all operating on the link itself (never following a
//! trailing symlink) since overlay construction must never be fooled by
//! a module shipping a symlink where a plain file is expected.

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extattr::{Flags as XattrFlags, lgetxattr, lsetxattr};

use crate::defs::{PATH_MAX, SELINUX_XATTR};

const FALLBACK_CONTEXT: &str = "u:object_r:system_file:s0";

/// Joins `base` and `leaf` like a path-aware `Path::join`, except an empty
/// `leaf` returns `base` unchanged rather than appending a trailing slash,
/// and the result is rejected if it would exceed `PATH_MAX` bytes.
pub fn join(base: &Path, leaf: &str) -> Result<PathBuf> {
    let joined = if leaf.is_empty() {
        base.to_path_buf()
    } else {
        base.join(leaf)
    };
    anyhow::ensure!(
        joined.as_os_str().len() < PATH_MAX,
        "path {} exceeds PATH_MAX",
        joined.display()
    );
    Ok(joined)
}

pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn is_directory(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// `mkdir -p`; idempotent, succeeds if `dir` already exists as a directory.
pub fn mkdir_p(dir: &Path) -> Result<()> {
    if is_directory(dir) {
        return Ok(());
    }
    create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))
}

/// Reads the SELinux context of `path` via `lgetxattr` (no symlink
/// traversal). Missing xattr support is not an error; the caller decides
/// whether a missing context is fatal.
pub fn selinux_get(path: &Path) -> Result<String> {
    let raw = lgetxattr(path, SELINUX_XATTR)
        .with_context(|| format!("lgetxattr {} security.selinux", path.display()))?;
    Ok(String::from_utf8_lossy(&raw).trim_matches('\0').to_string())
}

/// Sets the SELinux context of `path` via `lsetxattr`. Failures are logged
/// by the caller, never fatal — a missing or read-only xattr namespace is
/// common on non-SELinux test hosts.
pub fn selinux_set(path: &Path, context: &str) -> Result<()> {
    lsetxattr(path, SELINUX_XATTR, context.as_bytes(), XattrFlags::empty())
        .with_context(|| format!("lsetxattr {} security.selinux={context}", path.display()))
}

/// Copies the SELinux context from `src` to `dst`, falling back to a
/// generic `system_file` context when `src` has none (e.g. it is itself
/// a newly created synthetic node).
pub fn selinux_copy(src: &Path, dst: &Path) -> Result<()> {
    let mut context = selinux_get(src).unwrap_or_else(|_| FALLBACK_CONTEXT.to_string());
    if context.contains("u:object_r:rootfs:s0") {
        context = FALLBACK_CONTEXT.to_string();
    }
    match selinux_set(dst, &context) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!("selinux_copy {} -> {}: {e:#}", src.display(), dst.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn join_empty_leaf_returns_base() {
        assert_eq!(join(Path::new("/a"), "").unwrap(), Path::new("/a"));
    }

    #[test]
    fn join_root_and_leaf() {
        assert_eq!(join(Path::new("/"), "x").unwrap(), Path::new("/x"));
    }

    #[test]
    fn join_trailing_slash_base() {
        assert_eq!(join(Path::new("/a/"), "b").unwrap(), Path::new("/a/b"));
    }

    #[test]
    fn join_plain() {
        assert_eq!(join(Path::new("/a"), "b").unwrap(), Path::new("/a/b"));
    }

    #[test]
    fn mkdir_p_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        mkdir_p(&nested).unwrap();
        mkdir_p(&nested).unwrap();
        assert!(is_directory(&nested));
    }

    #[test]
    fn exists_and_is_directory_distinguish_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(exists(&file));
        assert!(!is_directory(&file));
    }
}
