// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod cli;
pub mod config;

pub use cli::Cli;
pub use config::Config;
