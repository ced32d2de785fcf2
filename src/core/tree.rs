// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Builds the in-memory overlay tree: scan-and-merge, symlink-compatibility
//! resolution, builtin-partition promotion, and extra-partition attachment.
//!
//! Single-threaded by design (see the crate's concurrency notes): every
//! phase here mutates the same tree sequentially and none of it may run
//! under `rayon`, unlike module enumeration.

use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::core::enumerator::Module;
use crate::core::node::{Node, NodeKind};
use crate::defs::{EXTRA_PARTITION_BLACKLIST, PROMOTABLE_PARTITIONS, SYMLINK_COMPAT_PARTITIONS};
use crate::mount::path_ops;

pub struct BuildResult {
    pub root: Node,
    pub nodes_total: u32,
}

/// Registers an extra partition name, rejecting blank names and any name
/// whose first path segment collides with the fixed blacklist.
pub fn validate_extra_partition(name: &str) -> Result<String> {
    let trimmed = name.trim();
    anyhow::ensure!(!trimmed.is_empty(), "extra partition name is blank");
    let first_segment = trimmed.trim_start_matches('/').split('/').next().unwrap_or("");
    anyhow::ensure!(
        !EXTRA_PARTITION_BLACKLIST.contains(&first_segment.to_lowercase().as_str()),
        "extra partition {trimmed:?} collides with a reserved path segment"
    );
    Ok(trimmed.to_string())
}

/// Builds the overlay tree from `modules`, or returns `Ok(None)` when no
/// module contributed any content at all (Phase A's no-content sentinel).
pub fn build(modules: &[Module], extra_partitions: &[String]) -> Result<Option<BuildResult>> {
    let mut root = Node::new_root();
    let mut system = Node::new_synthetic_dir("system");

    // Phase A: scan-and-merge, first-module-wins, in enumeration order.
    let mut any_content = false;
    for module in modules.iter().filter(|m| m.has_system) {
        let module_system = module.path.join("system");
        any_content |= system.merge_module_dir(&module_system, &module.name)?;
    }
    if !any_content {
        return Ok(None);
    }

    resolve_symlink_compatibility(&mut system, modules, extra_partitions)?;
    let promoted = promote_builtin_partitions(&mut system);
    let extras = attach_extra_partitions(modules, extra_partitions)?;

    for child in promoted {
        root.children.insert(child.name.clone(), child);
    }
    for child in extras {
        root.children.insert(child.name.clone(), child);
    }
    // Phase E: system is attached last.
    root.children.insert(system.name.clone(), system);

    let nodes_total = count_nodes(&root);
    Ok(Some(BuildResult { root, nodes_total }))
}

fn count_nodes(node: &Node) -> u32 {
    1 + node.children.values().map(count_nodes).sum::<u32>()
}

/// Phase B. Replaces a `/system/<P>` symlink with a real Directory node
/// when some enabled module ships content compatible with that symlink's
/// target, so modules can still populate e.g. `/vendor` through the
/// `/system/vendor` symlink devices commonly expose. Quantifies over the
/// builtin symlink-compatible partitions union the operator-configured
/// extra partitions, since a device may equally route an extra partition
/// through a `/system/<P>` symlink.
fn resolve_symlink_compatibility(system: &mut Node, modules: &[Module], extra_partitions: &[String]) -> Result<()> {
    for &partition in SYMLINK_COMPAT_PARTITIONS {
        resolve_one_symlink(system, modules, partition)?;
    }
    for partition in extra_partitions {
        resolve_one_symlink(system, modules, partition)?;
    }
    Ok(())
}

fn resolve_one_symlink(system: &mut Node, modules: &[Module], partition: &str) -> Result<()> {
    let Some(child) = system.children.get(partition) else {
        return Ok(());
    };
    if child.kind != NodeKind::Symlink {
        return Ok(());
    }
    let Some(module_path) = child.module_path.clone() else {
        return Ok(());
    };

    let Ok(target) = fs::read_link(&module_path) else {
        return Ok(());
    };
    let target = target.to_string_lossy().trim_end_matches('/').to_string();

    let Some(owner_module) = child.module_name.as_deref() else {
        return Ok(());
    };
    let expect_relative = format!("../{partition}");
    let expect_absolute = modules
        .iter()
        .find(|m| m.name == owner_module)
        .map(|m| m.path.join(partition).to_string_lossy().trim_end_matches('/').to_string())
        .unwrap_or_default();
    if target != expect_relative && target != expect_absolute {
        return Ok(());
    }

    let Some(source_module) = modules.iter().find(|m| m.path.join(partition).is_dir()) else {
        return Ok(());
    };

    let mut candidate = Node::new_synthetic_dir(partition);
    let has_content = candidate.merge_module_dir(&source_module.path.join(partition), &source_module.name)?;
    if !has_content {
        return Ok(());
    }
    candidate.module_name = Some(source_module.name.clone());

    system.children.shift_remove(partition);
    system.children.insert(partition.to_string(), candidate);
    Ok(())
}

/// Phase C. Detaches `system`'s builtin-partition children and attaches
/// them directly under root, per the fixed promotion table.
fn promote_builtin_partitions(system: &mut Node) -> Vec<Node> {
    let mut promoted = Vec::new();
    for &(name, need_symlink) in PROMOTABLE_PARTITIONS {
        let live_partition_is_dir = path_ops::is_directory(Path::new("/").join(name).as_path());
        if !live_partition_is_dir {
            continue;
        }
        let system_link_ok = !need_symlink || path_ops::is_symlink(Path::new("/system").join(name).as_path());
        if !system_link_ok {
            continue;
        }
        if let Some(child) = system.children.shift_remove(name) {
            promoted.push(child);
        }
    }
    promoted
}

/// Phase D. For each live, directory-backed extra partition, builds a
/// fresh subtree by scanning every enabled module's matching subdirectory.
fn attach_extra_partitions(modules: &[Module], extra_partitions: &[String]) -> Result<Vec<Node>> {
    let mut attached = Vec::new();
    for name in extra_partitions {
        if !path_ops::is_directory(Path::new("/").join(name).as_path()) {
            continue;
        }
        let mut node = Node::new_synthetic_dir(name.clone());
        let mut has_content = false;
        for module in modules {
            let candidate = module.path.join(name);
            if candidate.is_dir() {
                has_content |= node.merge_module_dir(&candidate, &module.name)?;
            }
        }
        if has_content {
            attached.push(node);
        }
    }
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn module(path: std::path::PathBuf, name: &str) -> Module {
        let has_system = path.join("system").is_dir();
        Module { name: name.to_string(), path, has_system }
    }

    #[test]
    fn validate_extra_partition_rejects_blank_and_blacklisted() {
        assert!(validate_extra_partition("").is_err());
        assert!(validate_extra_partition("  ").is_err());
        assert!(validate_extra_partition("/bin").is_err());
        assert!(validate_extra_partition("vendor").is_err());
    }

    #[test]
    fn validate_extra_partition_accepts_ordinary_names() {
        assert_eq!(validate_extra_partition("mi_ext").unwrap(), "mi_ext");
        assert_eq!(validate_extra_partition("my_stock").unwrap(), "my_stock");
    }

    #[test]
    fn build_returns_none_when_no_module_has_content() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/system")).unwrap();
        let modules = vec![module(root.path().join("modA"), "modA")];
        let result = build(&modules, &[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn build_merges_single_module_file() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/system/app")).unwrap();
        write(root.path().join("modA/system/app/Foo.apk"), b"x").unwrap();
        let modules = vec![module(root.path().join("modA"), "modA")];
        let result = build(&modules, &[]).unwrap().expect("has content");
        let system = result.root.children.get("system").unwrap();
        let app = system.children.get("app").unwrap();
        assert!(app.children.get("Foo.apk").is_some());
    }

    #[test]
    fn build_first_module_wins_across_modules() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/system")).unwrap();
        create_dir_all(root.path().join("modB/system")).unwrap();
        write(root.path().join("modA/system/same"), b"a").unwrap();
        write(root.path().join("modB/system/same"), b"b").unwrap();
        let modules = vec![
            module(root.path().join("modA"), "modA"),
            module(root.path().join("modB"), "modB"),
        ];
        let result = build(&modules, &[]).unwrap().unwrap();
        let system = result.root.children.get("system").unwrap();
        let child = system.children.get("same").unwrap();
        assert_eq!(child.module_name.as_deref(), Some("modA"));
    }

    #[test]
    fn attach_extra_partitions_skips_nonexistent_live_dir() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/mi_ext")).unwrap();
        write(root.path().join("modA/mi_ext/f"), b"x").unwrap();
        let modules = vec![module(root.path().join("modA"), "modA")];
        // "/mi_ext" almost certainly does not exist as a live directory on
        // the test host, so nothing should be attached.
        let attached = attach_extra_partitions(&modules, &["mi_ext".to_string()]).unwrap();
        assert!(attached.is_empty());
    }

    #[test]
    fn resolve_symlink_compatibility_ignores_non_symlink_children() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/system")).unwrap();
        let modules = vec![module(root.path().join("modA"), "modA")];
        let mut system = Node::new_synthetic_dir("system");
        // no "vendor" child at all: should be a no-op, not an error.
        resolve_symlink_compatibility(&mut system, &modules, &[]).unwrap();
        assert!(system.children.get("vendor").is_none());
    }

    #[test]
    fn resolve_symlink_compatibility_promotes_compatible_target() {
        let work = tempdir().unwrap();
        create_dir_all(work.path().join("modA/system")).unwrap();
        create_dir_all(work.path().join("modA/vendor")).unwrap();
        write(work.path().join("modA/vendor/f"), b"x").unwrap();
        let link_path = work.path().join("modA/system/vendor_link");
        symlink("../vendor", &link_path).unwrap();

        let modules = vec![module(work.path().join("modA"), "modA")];
        let mut system = Node::new_synthetic_dir("system");
        system.children.insert(
            "vendor_link".to_string(),
            Node {
                name: "vendor_link".to_string(),
                kind: NodeKind::Symlink,
                children: Default::default(),
                module_path: Some(link_path.clone()),
                module_name: Some("modA".to_string()),
                replace: false,
                skip: false,
                done: false,
            },
        );

        // use the real partition name so the `../vendor` comparison applies
        let mut renamed = system.children.shift_remove("vendor_link").unwrap();
        renamed.name = "vendor".to_string();
        system.children.insert("vendor".to_string(), renamed);

        resolve_one_symlink(&mut system, &modules, "vendor").unwrap();
        let vendor = system.children.get("vendor").unwrap();
        assert_eq!(vendor.kind, NodeKind::Directory);
        assert!(vendor.children.get("f").is_some());
    }
}
