// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex_lite::Regex;

use crate::defs::ZYGISKSU_DENYLIST_FILE;

static MODULE_ID_REGEX: OnceLock<Regex> = OnceLock::new();

/// Rejects module directory names that don't look like a module id,
/// before they flow into any path join.
pub fn validate_module_id(module_id: &str) -> Result<()> {
    let re = MODULE_ID_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9._-]+$").expect("valid regex"));
    if re.is_match(module_id) {
        Ok(())
    } else {
        bail!("invalid module id {module_id:?}: must match /^[a-zA-Z][a-zA-Z0-9._-]+$/")
    }
}

/// True when ZygiskSU's unmount-denylist enforcer is active, in which
/// case `enableUnmountable` defaults to off unless the config explicitly
/// allows coexistence.
pub fn zygisksu_enforce_active() -> bool {
    std::fs::read_to_string(ZYGISKSU_DENYLIST_FILE)
        .map(|s| s.trim() != "0")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_module_ids() {
        assert!(validate_module_id("my_module-1.2").is_ok());
    }

    #[test]
    fn rejects_ids_starting_with_a_digit() {
        assert!(validate_module_id("1bad").is_err());
    }

    #[test]
    fn rejects_blank_id() {
        assert!(validate_module_id("").is_err());
    }
}
