// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! Line-oriented `key = value` configuration file, `#`-comments supported.
//! Deliberately not TOML: the file format predates the donor's TOML
//! `Config` and matches the same unopinionated reader its predecessors
//! used for `module.prop`-shaped sidecar files. `Config` itself is still
//! `Serialize`/`Deserialize` via serde so it can be introspected and
//! round-tripped in tests even though the on-disk format is hand-rolled.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs::{CONFIG_FILE, DEFAULT_MOUNT_SOURCE, MODULES_DIR};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub module_dir: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub mount_source: String,
    pub log_file: Option<PathBuf>,
    pub partitions: Vec<String>,
    pub debug: bool,
    pub umount: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from(MODULES_DIR),
            temp_dir: None,
            mount_source: DEFAULT_MOUNT_SOURCE.to_string(),
            log_file: None,
            partitions: Vec::new(),
            debug: false,
            umount: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn load_default() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses the `key = value` body; unknown keys warn and are ignored,
    /// malformed lines (no `=`) and blank/`#`-comment lines are skipped.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("ignoring malformed config line: {line:?}");
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "module_dir" => config.module_dir = PathBuf::from(value),
                "temp_dir" => config.temp_dir = Some(PathBuf::from(value)),
                "mount_source" => config.mount_source = value.to_string(),
                "log_file" => config.log_file = Some(PathBuf::from(value)),
                "partitions" => {
                    config.partitions = value
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "debug" => config.debug = parse_bool(value),
                "umount" => config.umount = parse_bool(value),
                _ => tracing::warn!("unknown config key {key:?}, ignoring"),
            }
        }
        config
    }

    #[allow(clippy::too_many_arguments)]
    pub fn merge_cli(
        &mut self,
        module_dir: Option<PathBuf>,
        temp_dir: Option<PathBuf>,
        mount_source: Option<String>,
        partitions: Vec<String>,
        log_file: Option<PathBuf>,
        verbose: bool,
        no_umount: bool,
    ) {
        if let Some(dir) = module_dir {
            self.module_dir = dir;
        }
        if temp_dir.is_some() {
            self.temp_dir = temp_dir;
        }
        if let Some(source) = mount_source {
            self.mount_source = source;
        }
        if !partitions.is_empty() {
            self.partitions = partitions;
        }
        if log_file.is_some() {
            self.log_file = log_file;
        }
        if verbose {
            self.debug = true;
        }
        if no_umount {
            self.umount = false;
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_and_ignores_comments() {
        let config = Config::parse(
            "# a comment\nmodule_dir = /data/adb/modules\nmount_source=KSU\npartitions = a, b c\ndebug=true\n",
        );
        assert_eq!(config.module_dir, PathBuf::from("/data/adb/modules"));
        assert_eq!(config.mount_source, "KSU");
        assert_eq!(config.partitions, vec!["a", "b", "c"]);
        assert!(config.debug);
    }

    #[test]
    fn unknown_key_does_not_panic() {
        let config = Config::parse("nonsense_key = 1\n");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let config = Config::parse("this has no equals sign\n");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn merge_cli_overrides_only_set_fields() {
        let mut config = Config::default();
        config.merge_cli(Some(PathBuf::from("/custom")), None, None, Vec::new(), None, false, true);
        assert_eq!(config.module_dir, PathBuf::from("/custom"));
        assert!(!config.umount);
        assert_eq!(config.mount_source, DEFAULT_MOUNT_SOURCE);
    }
}
