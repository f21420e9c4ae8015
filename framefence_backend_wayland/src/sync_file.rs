// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Completion timestamps from Linux `sync_file` descriptors.
//!
//! A native fence exported by EGL is a `sync_file`: a descriptor that polls
//! readable once every fence point behind it has signaled. The
//! `SYNC_IOC_FILE_INFO` ioctl reports each point's signal time on
//! `CLOCK_MONOTONIC`. The query is two-step:
//!
//! ```text
//!   ioctl(num_fences = 0)          ──► kernel fills num_fences
//!   ioctl(num_fences, array ptr)   ──► kernel fills one sync_fence_info each
//!   completion = max(timestamp_ns)
//! ```

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use bytemuck::{Pod, Zeroable};
use framefence_core::backend::FenceClock;
use framefence_core::time::HostTime;
use log::trace;

/// `struct sync_fence_info` from `<linux/sync_file.h>`.
#[expect(dead_code, reason = "mirrors the kernel ABI; only some fields are read")]
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SyncFenceInfo {
    obj_name: [u8; 32],
    driver_name: [u8; 32],
    status: i32,
    flags: u32,
    timestamp_ns: u64,
}

/// `struct sync_file_info` from `<linux/sync_file.h>`.
#[expect(dead_code, reason = "mirrors the kernel ABI; only some fields are read")]
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SyncFileInfo {
    name: [u8; 32],
    status: i32,
    flags: u32,
    num_fences: u32,
    pad: u32,
    sync_fence_info: u64,
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const SYNC_IOC_MAGIC: u8 = b'>';

/// Encodes `_IOWR(ty, nr, size)` with the generic Linux layout.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the size field is 14 bits wide"
)]
const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    ((IOC_READ | IOC_WRITE) << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32
}

const SYNC_IOC_FILE_INFO: u32 = iowr(SYNC_IOC_MAGIC, 4, size_of::<SyncFileInfo>());

/// Failure to read a fence's completion time.
#[derive(Debug, thiserror::Error)]
pub enum FenceQueryError {
    /// The ioctl itself failed.
    #[error("SYNC_IOC_FILE_INFO failed: {0}")]
    Ioctl(#[source] io::Error),
    /// The descriptor carries no fence points.
    #[error("sync_file carries no fence points")]
    Empty,
}

fn file_info(fd: BorrowedFd<'_>, info: &mut SyncFileInfo) -> Result<(), FenceQueryError> {
    // SAFETY: `info` is a live, correctly sized `sync_file_info`; when
    // `num_fences` is non-zero its `sync_fence_info` points at that many
    // writable entries owned by the caller.
    let ret = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            SYNC_IOC_FILE_INFO as _,
            core::ptr::from_mut(info),
        )
    };
    if ret < 0 {
        return Err(FenceQueryError::Ioctl(io::Error::last_os_error()));
    }
    Ok(())
}

/// Returns the time the last fence point behind `fd` signaled.
///
/// Only meaningful once `fd` has polled readable.
pub fn completion_time(fd: BorrowedFd<'_>) -> Result<HostTime, FenceQueryError> {
    let mut info = SyncFileInfo::zeroed();
    file_info(fd, &mut info)?;
    if info.num_fences == 0 {
        return Err(FenceQueryError::Empty);
    }

    let mut points = vec![SyncFenceInfo::zeroed(); info.num_fences as usize];
    info.sync_fence_info = points.as_mut_ptr().expose_provenance() as u64;
    file_info(fd, &mut info)?;

    let filled = points.len().min(info.num_fences as usize);
    trace!("sync_file with {filled} fence points");
    points[..filled]
        .iter()
        .map(|point| point.timestamp_ns)
        .max()
        .map(HostTime)
        .ok_or(FenceQueryError::Empty)
}

/// [`FenceClock`] over `CLOCK_MONOTONIC` and `sync_file` descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncFileClock;

impl FenceClock<OwnedFd> for SyncFileClock {
    type Error = FenceQueryError;

    fn now(&mut self) -> HostTime {
        crate::time::now()
    }

    fn completion_time(&mut self, fence: &OwnedFd) -> Result<HostTime, FenceQueryError> {
        completion_time(fence.as_fd())
    }
}
