// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod applier;
pub mod fs_probe;
pub mod kernel_bridge;
pub mod path_ops;
pub mod tempdir;

pub use applier::apply;
