// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::defs::{DEFAULT_MOUNT_SOURCE, MODULES_DIR};

/// Process-wide mutable record driving a single mount run. Created at
/// startup from `Config`, mutated only by the orchestrating thread,
/// dropped at exit — nothing here is persisted.
pub struct Context {
    pub module_dir: PathBuf,
    pub mount_source: String,
    pub extra_partitions: Vec<String>,
    pub enable_unmountable: bool,
    /// Explicit workdir root override (config/CLI `temp_dir`); when unset,
    /// `TempdirSelector` picks one.
    pub temp_dir: Option<PathBuf>,
    failed_modules: BTreeSet<String>,
    pub stats: Stats,
}

#[derive(Default, Debug, Clone, Copy)]
pub struct Stats {
    pub modules_total: u32,
    pub nodes_total: u32,
    pub nodes_mounted: u32,
    pub nodes_skipped: u32,
    pub nodes_whiteout: u32,
    pub nodes_fail: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "modules: {}, nodes: {} (mounted {}, whiteout {}, skipped {}, failed {})",
            self.modules_total,
            self.nodes_total,
            self.nodes_mounted,
            self.nodes_whiteout,
            self.nodes_skipped,
            self.nodes_fail,
        )
    }
}

impl Context {
    pub fn new(module_dir: PathBuf, extra_partitions: Vec<String>, enable_unmountable: bool) -> Self {
        Self {
            module_dir,
            mount_source: DEFAULT_MOUNT_SOURCE.to_string(),
            extra_partitions,
            enable_unmountable,
            temp_dir: None,
            failed_modules: BTreeSet::new(),
            stats: Stats::default(),
        }
    }

    pub fn mark_failed(&mut self, module_name: &str) {
        self.failed_modules.insert(module_name.to_string());
    }

    pub fn failed_modules(&self) -> impl Iterator<Item = &str> {
        self.failed_modules.iter().map(String::as_str)
    }
}
