// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

mod conf;
mod core;
mod defs;
mod mount;
mod utils;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use conf::{Cli, Config};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::from_file(path).with_context(|| format!("load config {}", path.display()));
    }
    Config::load_default()
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    config.merge_cli(
        cli.module_dir.clone(),
        cli.temp_dir.clone(),
        cli.mount_source.clone(),
        cli.partitions.clone(),
        cli.log_file.clone(),
        cli.verbose,
        cli.no_umount,
    );

    let _guard = utils::log::init(config.debug, config.log_file.as_deref())?;

    anyhow::ensure!(
        rustix::process::getuid().is_root(),
        "magic-mount must run as root (effective uid 0)"
    );

    let enable_unmountable = config.umount && !utils::zygisksu_enforce_active();
    if config.umount && !enable_unmountable {
        tracing::warn!("zygisksu unmount-denylist enforcer is active, disabling markUnmountable");
    }

    let extra_partitions: Vec<String> = config
        .partitions
        .iter()
        .filter_map(|p| match core::tree::validate_extra_partition(p) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!("rejecting extra partition {p:?}: {e:#}");
                None
            }
        })
        .collect();

    let mut ctx = core::context::Context::new(config.module_dir.clone(), extra_partitions, enable_unmountable);
    ctx.mount_source = config.mount_source.clone();
    ctx.temp_dir = config.temp_dir.clone();

    let modules = core::enumerator::enumerate(&ctx.module_dir)?;
    ctx.stats.modules_total = modules.iter().filter(|m| m.has_system).count() as u32;

    let build_result = core::tree::build(&modules, &ctx.extra_partitions)?;

    let Some(build_result) = build_result else {
        tracing::info!("no modules contributed content, nothing to mount");
        return Ok(());
    };

    if cli.dry_run {
        println!("{:?}", build_result.root);
        println!(
            "would mount: modules {}, nodes {}",
            ctx.stats.modules_total, build_result.nodes_total
        );
        return Ok(());
    }

    let apply_result = mount::apply(&mut ctx, build_result.root);

    tracing::info!("{}", ctx.stats);
    let failed: Vec<&str> = ctx.failed_modules().collect();
    if !failed.is_empty() {
        tracing::warn!("modules with failures: {}", failed.join(", "));
    }

    apply_result
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("magic-mount: {e:#}");
            ExitCode::FAILURE
        }
    }
}
