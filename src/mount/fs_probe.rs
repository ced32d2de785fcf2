// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Classifies a live filesystem entry the same way `core::node` classifies
//! a module-supplied one, for the MountApplier's "does this child already
//! match what the tree wants" comparisons.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::core::node::NodeKind;

/// `nodeTypeFromStat`: classifies `metadata` (obtained via `lstat`, never
/// following the final symlink component) into the four node kinds. A
/// character device with `rdev == 0` is an overlayfs whiteout marker, and
/// anything else unrecognized (other special files, a char device with a
/// nonzero `rdev`) falls back to `Whiteout` as the catch-all, per the live
/// filesystem classifier's contract.
pub fn node_type_from_metadata(metadata: &Metadata) -> NodeKind {
    NodeKind::from_metadata(metadata.file_type(), metadata.rdev()).unwrap_or(NodeKind::Whiteout)
}

pub fn classify(path: &Path) -> Option<NodeKind> {
    let metadata = path.symlink_metadata().ok()?;
    Some(node_type_from_metadata(&metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::os::unix::net::UnixListener;
    use tempfile::tempdir;

    #[test]
    fn classifies_regular_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert_eq!(classify(&file), Some(NodeKind::Regular));
    }

    #[test]
    fn classifies_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(classify(dir.path()), Some(NodeKind::Directory));
    }

    #[test]
    fn classifies_symlink_without_following() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("lnk");
        symlink("/does/not/exist", &link).unwrap();
        assert_eq!(classify(&link), Some(NodeKind::Symlink));
    }

    #[test]
    fn non_whiteout_special_files_classify_as_whiteout() {
        let dir = tempdir().unwrap();
        let sock = dir.path().join("s.sock");
        let _listener = UnixListener::bind(&sock).unwrap();
        assert_eq!(classify(&sock), Some(NodeKind::Whiteout));
    }
}
