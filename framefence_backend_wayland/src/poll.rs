// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `poll(2)` event multiplexer.
//!
//! The descriptor array is rebuilt from the fence table on every wait, so
//! slot `i + 1` is always entry `i` and nothing has to be kept in sync.

use std::os::fd::{AsFd, OwnedFd};

use framefence_core::backend::{
    Multiplexer, Readiness, SocketInterest, SocketReadiness, WaitError,
};
use framefence_core::fence::FenceTable;
use framefence_core::scheduler::Timeout;
use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use rustix::time::Timespec;

const ZERO_TIMEOUT: Timespec = Timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

/// Multiplexer over one protocol socket and a table of `sync_file` fences.
#[derive(Debug)]
pub struct PollMultiplexer<S> {
    socket: S,
}

impl<S: AsFd> PollMultiplexer<S> {
    /// Creates a multiplexer for `socket`.
    pub fn new(socket: S) -> Self {
        Self { socket }
    }
}

fn socket_events(interest: SocketInterest) -> PollFlags {
    if interest.writable {
        PollFlags::IN | PollFlags::OUT
    } else {
        PollFlags::IN
    }
}

fn socket_readiness(revents: PollFlags) -> SocketReadiness {
    SocketReadiness {
        readable: revents.contains(PollFlags::IN),
        writable: revents.contains(PollFlags::OUT),
        hangup: revents.intersects(PollFlags::ERR | PollFlags::HUP | PollFlags::NVAL),
    }
}

fn fence_ready(revents: PollFlags) -> bool {
    revents.contains(PollFlags::IN)
}

impl<S: AsFd> Multiplexer<OwnedFd> for PollMultiplexer<S> {
    fn wait(
        &mut self,
        interest: SocketInterest,
        fences: &FenceTable<OwnedFd>,
        timeout: Timeout,
    ) -> Result<Readiness, WaitError> {
        let mut fds = Vec::with_capacity(fences.poll_slots());
        fds.push(PollFd::from_borrowed_fd(
            self.socket.as_fd(),
            socket_events(interest),
        ));
        fds.extend(
            fences
                .iter()
                .map(|entry| PollFd::from_borrowed_fd(entry.fence.as_fd(), PollFlags::IN)),
        );

        let timeout = match timeout {
            Timeout::Immediate => Some(&ZERO_TIMEOUT),
            Timeout::Infinite => None,
        };
        match poll(&mut fds, timeout) {
            Ok(_) => {}
            Err(Errno::INTR) => return Err(WaitError::Interrupted),
            Err(err) => return Err(WaitError::Failed(format!("poll: {err}"))),
        }

        let Some((socket, fence_fds)) = fds.split_first() else {
            return Ok(Readiness::idle(fences.len()));
        };
        Ok(Readiness {
            socket: socket_readiness(socket.revents()),
            fences: fence_fds.iter().map(|fd| fence_ready(fd.revents())).collect(),
        })
    }
}
