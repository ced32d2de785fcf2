// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub const MODULES_DIR: &str = "/data/adb/modules";
pub const CONFIG_FILE: &str = "/data/adb/magic_mount/mm.conf";
pub const DEFAULT_MOUNT_SOURCE: &str = "KSU";

pub const DISABLE_FILE_NAME: &str = "disable";
pub const REMOVE_FILE_NAME: &str = "remove";
pub const SKIP_MOUNT_FILE_NAME: &str = "skip_mount";

pub const REPLACE_DIR_FILE_NAME: &str = ".replace";
pub const REPLACE_DIR_XATTR: &str = "trusted.overlay.opaque";

pub const SELINUX_XATTR: &str = "security.selinux";

/// ZygiskSU's system-wide unmount-denylist enforcer switch. When this
/// reads anything other than `"0"`, `markUnmountable` calls default to
/// disabled unless the config explicitly allows coexistence.
pub const ZYGISKSU_DENYLIST_FILE: &str = "/data/adb/modules/zygisksu/enforce_denylist";

/// `(partition, requires_system_symlink)`, applied in this fixed order by
/// TreeBuilder Phase C. `odm` promotes whenever present; the others only
/// when the live `/system/<p>` is itself a symlink.
pub const PROMOTABLE_PARTITIONS: &[(&str, bool)] = &[
    ("vendor", true),
    ("system_ext", true),
    ("product", true),
    ("odm", false),
];

/// Builtin partitions eligible for Phase B symlink-compatibility
/// resolution; the operator-configured extra partitions are unioned in
/// at the call site, since spec quantifies over both sets.
pub const SYMLINK_COMPAT_PARTITIONS: &[&str] = &["vendor", "system_ext", "product", "odm"];

/// First path segments an extra partition registration may never use.
pub const EXTRA_PARTITION_BLACKLIST: &[&str] = &[
    "bin",
    "etc",
    "data",
    "data_mirror",
    "sdcard",
    "tmp",
    "dev",
    "sys",
    "mnt",
    "proc",
    "d",
    "test",
    "product",
    "vendor",
    "system_ext",
    "odm",
];

/// Candidate tmpfs-backed roots for the mount-applier workdir, tried in order.
pub const TEMPDIR_CANDIDATES: &[&str] = &["/mnt/vendor", "/mnt", "/debug_ramdisk"];
pub const TEMPDIR_FALLBACK: &str = "/dev/.magic_mount";
pub const TEMPDIR_LEAF: &str = ".magic_mount";

/// `TMPFS_MAGIC` from `linux/magic.h`.
pub const TMPFS_MAGIC: i64 = 0x0102_1994;

pub const PATH_MAX: usize = 4096;
