// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! `tracing` initialisation with pre-init message buffering: any event
//! emitted before [`init`] runs is queued in `PENDING` rather than lost,
//! then drained into the real subscriber once it is installed. On
//! Android, `android_logger` is used instead of the file-appender stack.

use std::fmt as std_fmt;
use std::fs::create_dir_all;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

static PENDING: OnceLock<Mutex<Vec<String>>> = OnceLock::new();

fn pending() -> &'static Mutex<Vec<String>> {
    PENDING.get_or_init(|| Mutex::new(Vec::new()))
}

/// Buffers `message` if no subscriber has been installed yet. Exists for
/// diagnostics raised before `main` loads the config (argument-parsing
/// warnings today; more may land here later).
pub fn buffer_pre_init(message: impl Into<String>) {
    pending().lock().unwrap().push(message.into());
}

struct SimpleFormatter;

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: fmt::format::Writer<'_>, event: &Event<'_>) -> std_fmt::Result {
        write!(writer, "[{}] ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the real subscriber and drains the pre-init buffer into it.
/// Returns a `WorkerGuard` the caller must hold for the process lifetime
/// when `log_file` is set (dropping it flushes the non-blocking writer).
#[cfg(target_os = "android")]
pub fn init(verbose: bool, _log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
            .with_tag("magic_mount"),
    );
    drain_pending();
    Ok(None)
}

#[cfg(not(target_os = "android"))]
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });

    // `-` means stdout (spec.md §6), not a file literally named `-`.
    let log_file = log_file.filter(|path| path.as_os_str() != "-");

    let guard = if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let appender = tracing_appender::rolling::never(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_default(),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking).event_format(SimpleFormatter))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().event_format(SimpleFormatter))
            .init();
        None
    };

    tracing_log::LogTracer::init().ok();
    drain_pending();
    Ok(guard)
}

fn drain_pending() {
    for message in pending().lock().unwrap().drain(..) {
        tracing::info!("{message}");
    }
}
