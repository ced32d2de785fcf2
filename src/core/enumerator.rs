// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Enumerates the module root once, filtering out disabled modules. The
//! per-entry sentinel-file probe is embarrassingly parallel (independent
//! stats of unrelated module directories, no shared tree state yet), so it
//! runs through `rayon` — the only place in this crate `rayon` is used,
//! since everything downstream (TreeBuilder, MountApplier) must stay
//! strictly sequential to honour enumeration-order-driven semantics.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::defs::{DISABLE_FILE_NAME, REMOVE_FILE_NAME, SKIP_MOUNT_FILE_NAME};
use crate::utils::validate_module_id;

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    /// Whether `<module>/system` is a directory; only such modules
    /// contribute to the overlay tree.
    pub has_system: bool,
}

/// Lists enabled modules under `module_dir`, preserving the order
/// `fs::read_dir` returned them in (OS directory order), since later
/// phases treat that order as mount-priority for first-module-wins merges.
pub fn enumerate(module_dir: &Path) -> Result<Vec<Module>> {
    if !module_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries: Vec<_> = fs::read_dir(module_dir)
        .with_context(|| format!("read_dir {}", module_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read_dir {}", module_dir.display()))?;

    let mut indexed: Vec<(usize, Module)> = entries
        .into_par_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let path = entry.path();
            if !path.is_dir() {
                return None;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "." || name == ".." {
                return None;
            }
            if let Err(e) = validate_module_id(&name) {
                tracing::warn!("skipping module directory {name:?}: {e:#}");
                return None;
            }
            if path.join(DISABLE_FILE_NAME).exists()
                || path.join(REMOVE_FILE_NAME).exists()
                || path.join(SKIP_MOUNT_FILE_NAME).exists()
            {
                return None;
            }
            let has_system = path.join("system").is_dir();
            Some((idx, Module { name, path, has_system }))
        })
        .collect();

    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, m)| m).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    #[test]
    fn skips_disabled_modules() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA/system")).unwrap();
        create_dir_all(root.path().join("modB/system")).unwrap();
        write(root.path().join("modB/disable"), b"").unwrap();

        let modules = enumerate(root.path()).unwrap();
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["modA"]);
    }

    #[test]
    fn skips_remove_and_skip_mount() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA")).unwrap();
        write(root.path().join("modA/remove"), b"").unwrap();
        create_dir_all(root.path().join("modB")).unwrap();
        write(root.path().join("modB/skip_mount"), b"").unwrap();

        assert!(enumerate(root.path()).unwrap().is_empty());
    }

    #[test]
    fn marks_modules_without_system_dir() {
        let root = tempdir().unwrap();
        create_dir_all(root.path().join("modA")).unwrap();

        let modules = enumerate(root.path()).unwrap();
        assert_eq!(modules.len(), 1);
        assert!(!modules[0].has_system);
    }

    #[test]
    fn missing_module_root_yields_empty_list() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        assert!(enumerate(&missing).unwrap().is_empty());
    }
}
