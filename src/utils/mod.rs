// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod log;
pub mod validation;

pub use validation::{validate_module_id, zygisksu_enforce_active};
