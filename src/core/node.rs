// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ffi::CString;
use std::fmt;
use std::fs::{DirEntry, FileType};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use anyhow::Result;
use extattr::lgetxattr;
use indexmap::IndexMap;
use rustix::path::Arg;

use crate::defs::{REPLACE_DIR_FILE_NAME, REPLACE_DIR_XATTR};

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    Whiteout,
}

impl NodeKind {
    /// Classifies `file_type`/`rdev` per the overlayfs whiteout convention: a
    /// character device with `rdev == 0` stands for a deleted entry.
    pub fn from_metadata(file_type: FileType, rdev: u64) -> Option<Self> {
        if file_type.is_char_device() && rdev == 0 {
            Some(Self::Whiteout)
        } else if file_type.is_file() {
            Some(Self::Regular)
        } else if file_type.is_dir() {
            Some(Self::Directory)
        } else if file_type.is_symlink() {
            Some(Self::Symlink)
        } else {
            None
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "DIR"),
            Self::Regular => write!(f, "FILE"),
            Self::Symlink => write!(f, "LINK"),
            Self::Whiteout => write!(f, "WHT"),
        }
    }
}

/// A single element of the in-memory overlay tree. `children` preserves
/// insertion order (module enumeration order), since later phases rely on
/// first-module-wins semantics and deterministic mount ordering.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub children: IndexMap<String, Node>,
    pub module_path: Option<PathBuf>,
    pub module_name: Option<String>,
    pub replace: bool,
    /// Set by MountApplier when a child cannot be applied safely.
    pub skip: bool,
    /// Set by MountApplier once a child has been handled in the
    /// existing-children pass, so the module-only pass skips it.
    pub done: bool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn print_tree(node: &Node, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool, is_root: bool) -> fmt::Result {
            let connector = if is_root {
                ""
            } else if is_last {
                "└── "
            } else {
                "├── "
            };
            let name = if node.name.is_empty() { "/" } else { &node.name };

            let mut flags = Vec::new();
            if node.replace {
                flags.push("REPLACE");
            }
            if node.skip {
                flags.push("SKIP");
            }
            let flag_str = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join("|"))
            };
            let source_str = node
                .module_path
                .as_ref()
                .map(|p| format!(" -> {}", p.display()))
                .unwrap_or_default();

            writeln!(f, "{prefix}{connector}{name} [{}]{flag_str}{source_str}", node.kind)?;

            let child_prefix = if is_root {
                ""
            } else if is_last {
                "    "
            } else {
                "│   "
            };
            let new_prefix = format!("{prefix}{child_prefix}");
            let last = node.children.len().saturating_sub(1);
            for (i, child) in node.children.values().enumerate() {
                print_tree(child, f, &new_prefix, i == last, false)?;
            }
            Ok(())
        }

        print_tree(self, f, "", true, true)
    }
}

impl Node {
    pub fn new_root() -> Self {
        Self {
            name: String::new(),
            kind: NodeKind::Directory,
            children: IndexMap::new(),
            module_path: None,
            module_name: None,
            replace: false,
            skip: false,
            done: false,
        }
    }

    /// Builds a synthetic (non-module-backed) Directory node, used when
    /// attaching structural nodes such as a promoted partition's parent.
    pub fn new_synthetic_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            children: IndexMap::new(),
            module_path: None,
            module_name: None,
            replace: false,
            skip: false,
            done: false,
        }
    }

    fn from_dir_entry(name: &str, entry: &DirEntry, module_name: &str) -> Option<Self> {
        let metadata = entry.metadata().ok()?;
        let kind = NodeKind::from_metadata(metadata.file_type(), metadata.rdev())?;
        let path = entry.path();
        let replace = kind == NodeKind::Directory && is_replace_dir(&path).unwrap_or(false);
        Some(Self {
            name: name.to_string(),
            kind,
            children: IndexMap::new(),
            module_path: Some(path),
            module_name: Some(module_name.to_string()),
            replace,
            skip: false,
            done: false,
        })
    }

    /// Scans `dir` (an entry inside a module) and merges each child into
    /// `self.children`, first-module-wins: an existing child is kept and
    /// only recursed into, never overwritten by a later module.
    ///
    /// Returns whether this subtree ends up with any content at all (a
    /// leaf child, or a directory child that itself has content or is
    /// marked `replace`).
    pub fn merge_module_dir(&mut self, dir: &Path, module_name: &str) -> Result<bool> {
        let mut has_content = false;
        let entries = match dir.read_dir() {
            Ok(e) => e,
            Err(_) => return Ok(false),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }

            let is_new = !self.children.contains_key(&name);
            let child = if is_new {
                match Self::from_dir_entry(&name, &entry, module_name) {
                    Some(n) => {
                        self.children.insert(name.clone(), n);
                        self.children.get_mut(&name)
                    }
                    None => None,
                }
            } else {
                self.children.get_mut(&name)
            };

            if let Some(child) = child {
                has_content |= if child.kind == NodeKind::Directory {
                    child.merge_module_dir(&dir.join(&child.name), module_name)? || child.replace
                } else {
                    true
                };
            }
        }
        Ok(has_content)
    }
}

/// `isReplaceDir`: true if the directory's `trusted.overlay.opaque` xattr
/// reads `"y"`, or a `.replace` sentinel exists directly inside it. Any
/// error probing the directory is treated as "not replace".
pub fn is_replace_dir(path: &Path) -> Result<bool> {
    if let Ok(v) = lgetxattr(path, REPLACE_DIR_XATTR) {
        if v == b"y" {
            return Ok(true);
        }
    }

    let Ok(c_path) = CString::new(path.as_str()?) else {
        return Ok(false);
    };
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
    if fd < 0 {
        return Ok(false);
    }
    let exists = unsafe {
        let sentinel = CString::new(REPLACE_DIR_FILE_NAME)?;
        let ret = libc::faccessat(fd, sentinel.as_ptr(), libc::F_OK, 0);
        libc::close(fd);
        ret
    };
    Ok(exists == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn replace_dir_detects_dot_replace_sentinel() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".replace"), b"").unwrap();
        assert!(is_replace_dir(dir.path()).unwrap());
    }

    #[test]
    fn replace_dir_ignores_sentinel_without_dot() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("replace"), b"").unwrap();
        assert!(!is_replace_dir(dir.path()).unwrap());
    }

    #[test]
    fn merge_module_dir_first_module_wins() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();
        fs::write(root_a.path().join("same.txt"), b"from a").unwrap();
        fs::write(root_b.path().join("same.txt"), b"from b").unwrap();

        let mut node = Node::new_root();
        node.merge_module_dir(root_a.path(), "modA").unwrap();
        node.merge_module_dir(root_b.path(), "modB").unwrap();

        let child = node.children.get("same.txt").unwrap();
        assert_eq!(child.module_name.as_deref(), Some("modA"));
    }

    #[test]
    fn merge_module_dir_preserves_insertion_order() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("zzz"), b"").unwrap();
        fs::write(root.path().join("aaa"), b"").unwrap();
        let mut node = Node::new_root();
        node.merge_module_dir(root.path(), "modA").unwrap();
        let names: Vec<_> = node.children.keys().cloned().collect();
        // insertion order is OS directory order, not name order; we only
        // assert both made it in with no reordering pass applied.
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn symlink_children_are_classified() {
        let root = tempdir().unwrap();
        symlink("/vendor", root.path().join("lnk")).unwrap();
        let mut node = Node::new_root();
        node.merge_module_dir(root.path(), "modA").unwrap();
        assert_eq!(node.children.get("lnk").unwrap().kind, NodeKind::Symlink);
    }
}
