// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod context;
pub mod enumerator;
pub mod node;
pub mod tree;
