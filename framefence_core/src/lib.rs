// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame pacing and GPU fence tracking for compositor latency measurement.
//!
//! `framefence_core` holds every decision of a client that renders frames,
//! hands them to a display server, and measures how long the GPU took to
//! finish each one. It is `no_std` compatible (with `alloc`) and performs no
//! I/O of its own: all side effects go through the traits in [`backend`].
//!
//! # Architecture
//!
//! ```text
//!   Protocol events ──► WindowState ──► Scheduler::decide()
//!                                           │
//!                 ┌─────────────────────────┘
//!                 ▼
//!   Renderer: draw, fence, present ──► FenceTable (oldest first)
//!                                           │
//!                 ┌─────────────────────────┘
//!                 ▼
//!   Multiplexer::wait(socket + fences) ──► reap ──► LatencySink
//! ```
//!
//! **[`frame_loop`]**: The single-threaded reactor. One blocking wait per
//! iteration; everything else is non-blocking.
//!
//! **[`scheduler`]**: Pacing policies: presentation-gated, unthrottled, and
//! self-chaining.
//!
//! **[`fence`]**: The ordered table of in-flight fences. The poll set is
//! derived from it on every wait.
//!
//! **[`window`]**: Surface state written by protocol handlers.
//!
//! **[`report`]**: Per-frame latency samples and sinks.
//!
//! **[`time`]**: Monotonic nanosecond timestamps and signed latencies.
//!
//! **[`backend`]**: Traits that platform backends implement.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod backend;
pub mod fence;
pub mod frame_loop;
pub mod report;
pub mod scheduler;
pub mod time;
pub mod window;
