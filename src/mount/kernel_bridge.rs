// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! `markUnmountable(path)`: an opaque call into a KernelSU-family driver
//! that records `path` as safe to force-unmount later (e.g. on module
//! update/removal). The driver fd is obtained once per process via a
//! magic `reboot(2)` syscall the driver intercepts, then reused for every
//! subsequent ioctl.

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::ffi::CString;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::os::fd::RawFd;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::path::Path;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::OnceLock;

#[cfg(any(target_os = "linux", target_os = "android"))]
use anyhow::Result;

const KSU_INSTALL_MAGIC1: u32 = 0xDEAD_BEEF;
const KSU_INSTALL_MAGIC2: u32 = 0xCAFE_BABE;
const KSU_IOCTL_ADD_TRY_UMOUNT: u32 = 0x4000_4b12;

#[cfg(any(target_os = "linux", target_os = "android"))]
static DRIVER_FD: OnceLock<RawFd> = OnceLock::new();

#[repr(C)]
struct KsuAddTryUmount {
    arg: u64,
    flags: u32,
    mode: u8,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn mark_unmountable<P: AsRef<Path>>(target: P) -> Result<()> {
    use rustix::path::Arg;

    let path = CString::new(target.as_ref().as_str()?)?;
    let cmd = KsuAddTryUmount { arg: path.as_ptr() as u64, flags: 2, mode: 1 };

    let fd = *DRIVER_FD.get_or_init(|| {
        let mut fd: RawFd = -1;
        unsafe {
            libc::syscall(libc::SYS_reboot, KSU_INSTALL_MAGIC1, KSU_INSTALL_MAGIC2, 0, &mut fd);
        }
        fd
    });

    unsafe {
        #[cfg(target_env = "gnu")]
        let ret = libc::ioctl(fd, u64::from(KSU_IOCTL_ADD_TRY_UMOUNT), &cmd);
        #[cfg(not(target_env = "gnu"))]
        let ret = libc::ioctl(fd, KSU_IOCTL_ADD_TRY_UMOUNT as i32, &cmd);

        if ret < 0 {
            tracing::debug!("markUnmountable {}: {}", target.as_ref().display(), std::io::Error::last_os_error());
        }
    }

    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn mark_unmountable<P: AsRef<std::path::Path>>(_target: P) -> anyhow::Result<()> {
    Ok(())
}
