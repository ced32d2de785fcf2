// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "magic-mount", version, about = "Android magic-mount overlay composer")]
pub struct Cli {
    /// Module root directory (default `/data/adb/modules`).
    #[arg(short = 'm', long = "module-dir")]
    pub module_dir: Option<PathBuf>,

    /// Scratch workdir root; `TempdirSelector` picks one when unset.
    #[arg(short = 't', long = "temp-dir")]
    pub temp_dir: Option<PathBuf>,

    /// `source` argument for the tmpfs mounts the applier creates.
    #[arg(short = 's', long = "mount-source")]
    pub mount_source: Option<String>,

    /// Extra partitions beyond the builtin promotion list, comma-separated.
    #[arg(short = 'p', long = "partitions", value_delimiter = ',')]
    pub partitions: Vec<String>,

    /// Write logs to this file instead of stdout.
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Config file path (default `/data/adb/magic_mount/mm.conf`).
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Disable `markUnmountable` calls to the kernel bridge.
    #[arg(long = "no-umount")]
    pub no_umount: bool,

    /// Build and print the tree and stats without touching the mount table.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
