// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-threaded frame loop.
//!
//! [`FrameLoop`] is a reactor with exactly one blocking point, the
//! [`Multiplexer::wait`] call. Each [`turn`](FrameLoop::turn) runs:
//!
//! ```text
//!   exit checks (close request, frame cap)
//!       │
//!       ▼
//!   Scheduler::decide ──► submit: [frame cb] [resize + ack] draw, fence,
//!       │                         timestamp, present, export, append
//!       ▼
//!   prepare_read ◄─► dispatch_pending   (until prepared)
//!       │
//!       ▼
//!   flush ──► socket write interest
//!       │
//!       ▼
//!   wait(socket + fences) ──► hangup: cancel, exit
//!       │
//!       ▼
//!   read_events or cancel_read, dispatch_pending
//!       │
//!       ▼
//!   reap ready fences ──► LatencySink
//! ```
//!
//! Handlers invoked by `dispatch_pending` only write [`WindowState`]; the
//! loop reads it back on the next turn.
//!
//! [`WindowState`]: crate::window::WindowState

use core::ops::ControlFlow;

use alloc::vec::Vec;
use log::{debug, error, info, trace, warn};

use crate::backend::{
    FenceClock, Flush, Multiplexer, Protocol, Renderer, SocketInterest, WaitError,
};
use crate::fence::{FenceEntry, FenceTable, FrameSeq};
use crate::report::{LatencySample, LatencySink};
use crate::scheduler::{Decision, PacingMode, Scheduler, Timeout};
use crate::time::HostTime;
use crate::window::SizePolicy;

/// Static configuration for a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopConfig {
    /// Pacing policy.
    pub pacing: PacingMode,
    /// Stop submitting after this many frames.
    pub max_frames: Option<u64>,
    /// Size resolution applied when a configure is acknowledged.
    pub size_policy: SizePolicy,
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// The compositor asked the window to close.
    Closed,
    /// The frame cap was reached and every fence retired.
    FrameLimit,
    /// The protocol socket reported an error or hangup.
    Hangup,
    /// Dispatching, flushing, or reading the protocol failed.
    ProtocolError,
    /// The blocking wait failed with something other than an interrupt.
    WaitFailed,
}

impl ExitReason {
    /// Returns `true` for a requested shutdown rather than an I/O failure.
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Closed | Self::FrameLimit)
    }
}

/// Summary of a finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Why the loop stopped.
    pub reason: ExitReason,
    /// Frames handed to the renderer.
    pub frames_submitted: u64,
    /// Frames whose fence was reaped and reported.
    pub frames_retired: u64,
}

impl RunOutcome {
    /// Process exit status for this outcome.
    ///
    /// Clean shutdowns exit 0. A protocol failure exits 1 only if it struck
    /// before any frame was submitted.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.reason.is_clean() || self.frames_submitted > 0 {
            0
        } else {
            1
        }
    }
}

/// Frame pacing and fence tracking engine.
///
/// `F` is the backend's pollable fence handle.
#[derive(Debug)]
pub struct FrameLoop<F> {
    config: LoopConfig,
    scheduler: Scheduler,
    fences: FenceTable<F>,
    next_frame: FrameSeq,
    retired: u64,
    interest: SocketInterest,
}

impl<F> FrameLoop<F> {
    /// Creates a loop that has not submitted anything yet.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            scheduler: Scheduler::new(config.pacing),
            fences: FenceTable::new(),
            next_frame: FrameSeq::default(),
            retired: 0,
            interest: SocketInterest::default(),
        }
    }

    /// In-flight fences, oldest first.
    #[must_use]
    pub fn fences(&self) -> &FenceTable<F> {
        &self.fences
    }

    /// Number of frames submitted so far.
    #[must_use]
    pub fn frames_submitted(&self) -> u64 {
        self.next_frame.0
    }

    /// Number of frames reaped so far.
    #[must_use]
    pub fn frames_retired(&self) -> u64 {
        self.retired
    }

    /// Current socket interest, as requested by the last flush.
    #[must_use]
    pub fn socket_interest(&self) -> SocketInterest {
        self.interest
    }

    fn frame_cap_reached(&self) -> bool {
        self.config
            .max_frames
            .is_some_and(|max| self.next_frame.0 >= max)
    }

    /// Runs turns until the loop exits, then releases every fence.
    pub fn run<P, R, M, C, S>(
        &mut self,
        protocol: &mut P,
        renderer: &mut R,
        mux: &mut M,
        clock: &mut C,
        sink: &mut S,
    ) -> RunOutcome
    where
        P: Protocol,
        R: Renderer<Fence = F>,
        M: Multiplexer<F>,
        C: FenceClock<F>,
        S: LatencySink + ?Sized,
    {
        let reason = loop {
            if let ControlFlow::Break(reason) = self.turn(protocol, renderer, mux, clock, sink) {
                break reason;
            }
        };
        let outcome = RunOutcome {
            reason,
            frames_submitted: self.frames_submitted(),
            frames_retired: self.retired,
        };
        self.shutdown();
        outcome
    }

    /// Runs one loop iteration.
    pub fn turn<P, R, M, C, S>(
        &mut self,
        protocol: &mut P,
        renderer: &mut R,
        mux: &mut M,
        clock: &mut C,
        sink: &mut S,
    ) -> ControlFlow<ExitReason>
    where
        P: Protocol,
        R: Renderer<Fence = F>,
        M: Multiplexer<F>,
        C: FenceClock<F>,
        S: LatencySink + ?Sized,
    {
        if protocol.window().close_requested() {
            info!("close requested after {} frames", self.next_frame.0);
            return ControlFlow::Break(ExitReason::Closed);
        }

        let draining = self.frame_cap_reached();
        if draining {
            if self.fences.is_empty() {
                info!("frame limit of {} reached", self.next_frame.0);
                return ControlFlow::Break(ExitReason::FrameLimit);
            }
        } else if let Decision::Submit { register_frame } =
            self.scheduler.decide(protocol.window())
        {
            self.submit(register_frame, protocol, renderer, clock);
        }

        while !protocol.prepare_read() {
            if let Err(err) = protocol.dispatch_pending() {
                error!("dispatching queued events failed: {err}");
                return ControlFlow::Break(ExitReason::ProtocolError);
            }
        }

        match protocol.flush() {
            Ok(Flush::Complete) => self.interest.writable = false,
            Ok(Flush::WouldBlock) => self.interest.writable = true,
            Err(err) => {
                protocol.cancel_read();
                error!("flushing protocol socket failed: {err}");
                return ControlFlow::Break(ExitReason::ProtocolError);
            }
        }

        // Nothing is left to submit while draining, so block even when
        // unthrottled.
        let timeout = if draining {
            Timeout::Infinite
        } else {
            self.scheduler.timeout()
        };
        let readiness = loop {
            match mux.wait(self.interest, &self.fences, timeout) {
                Ok(readiness) => break readiness,
                Err(WaitError::Interrupted) => trace!("wait interrupted, retrying"),
                Err(err @ WaitError::Failed(_)) => {
                    protocol.cancel_read();
                    error!("{err}");
                    return ControlFlow::Break(ExitReason::WaitFailed);
                }
            }
        };
        debug_assert_eq!(
            readiness.fences.len(),
            self.fences.len(),
            "readiness must be index-aligned with the fence table"
        );

        if readiness.socket.hangup {
            protocol.cancel_read();
            error!("protocol socket hung up");
            return ControlFlow::Break(ExitReason::Hangup);
        }

        if readiness.socket.readable {
            if let Err(err) = protocol.read_events() {
                error!("reading protocol events failed: {err}");
                return ControlFlow::Break(ExitReason::ProtocolError);
            }
        } else {
            protocol.cancel_read();
        }
        if let Err(err) = protocol.dispatch_pending() {
            error!("dispatching protocol events failed: {err}");
            return ControlFlow::Break(ExitReason::ProtocolError);
        }

        self.reap(readiness.fences, clock, sink);
        ControlFlow::Continue(())
    }

    fn submit<P, R, C>(
        &mut self,
        register_frame: bool,
        protocol: &mut P,
        renderer: &mut R,
        clock: &mut C,
    ) where
        P: Protocol,
        R: Renderer<Fence = F>,
        C: FenceClock<F>,
    {
        let frame = self.next_frame;

        if register_frame {
            protocol.request_frame();
            protocol.window().frame_requested();
        }

        if let Some(serial) = protocol.window().take_pending_serial() {
            let size = protocol.window().adopt_size(self.config.size_policy);
            renderer.resize(size);
            protocol.ack_configure(serial);
            debug!("acknowledged configure {serial} at {size}");
        }

        let size = protocol.window().current_size();
        renderer.draw(size, frame);
        let sync = renderer.create_fence();
        let submitted_at = clock.now();
        if let Err(err) = renderer.present() {
            warn!("frame {frame}: {err}");
        }

        if let Some(sync) = sync {
            match renderer.export_fence(sync) {
                Some(fence) => self.fences.push(FenceEntry {
                    fence,
                    frame,
                    submitted_at,
                }),
                None => debug!("frame {frame}: fence export failed, frame not measured"),
            }
        }

        trace!("submitted frame {frame} ({} in flight)", self.fences.len());
        self.next_frame = frame.next();
    }

    fn reap<C, S>(&mut self, mut ready: Vec<bool>, clock: &mut C, sink: &mut S)
    where
        C: FenceClock<F>,
        S: LatencySink + ?Sized,
    {
        let mut index = 0;
        while index < self.fences.len() {
            if !ready.get(index).copied().unwrap_or(false) {
                index += 1;
                continue;
            }

            // Same index next round: later entries have shifted down.
            let FenceEntry {
                fence,
                frame,
                submitted_at,
            } = self.fences.remove(index);
            ready.remove(index);

            let (completed_at, query_ok) = match clock.completion_time(&fence) {
                Ok(time) => (time, true),
                Err(err) => {
                    warn!("frame {frame}: completion time unavailable: {err}");
                    (HostTime::ZERO, false)
                }
            };
            drop(fence);

            let sample = LatencySample {
                frame,
                submitted_at,
                completed_at,
                query_ok,
            };
            sink.record(&sample);
            self.retired += 1;
        }
    }

    /// Releases every fence still in flight.
    pub fn shutdown(&mut self) {
        if !self.fences.is_empty() {
            debug!("releasing {} unretired fences", self.fences.len());
        }
        self.fences.clear();
    }
}

impl<F> Drop for FrameLoop<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Readiness, RenderError, SocketReadiness};
    use crate::time::HostTime;
    use crate::window::{Size, WindowState};
    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        RequestFrame,
        Ack(u32),
        Resize(Size),
        Draw(u64, Size),
        CreateFence,
        Now,
        Present,
        Export,
    }

    type Journal = Rc<RefCell<Vec<Call>>>;

    /// Read-cycle steps taken by [`FakeProtocol`], in order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Step {
        Prepare(bool),
        Dispatch(usize),
        Read,
        Cancel,
    }

    #[derive(Clone, Copy, Debug)]
    enum Event {
        Configure(u32, i32, i32),
        FrameDone,
        Close,
    }

    struct FakeProtocol {
        journal: Journal,
        window: WindowState,
        incoming: VecDeque<Event>,
        queued: VecDeque<Event>,
        prepared: bool,
        auto_present: bool,
        close_after_reads: Option<usize>,
        flushes: VecDeque<Result<Flush, String>>,
        reads: usize,
        cancels: usize,
        steps: Vec<Step>,
    }

    impl FakeProtocol {
        fn new(journal: &Journal) -> Self {
            Self {
                journal: journal.clone(),
                window: WindowState::new(),
                incoming: VecDeque::new(),
                queued: VecDeque::new(),
                prepared: false,
                auto_present: true,
                close_after_reads: None,
                flushes: VecDeque::new(),
                reads: 0,
                cancels: 0,
                steps: Vec::new(),
            }
        }
    }

    impl Protocol for FakeProtocol {
        type Error = String;

        fn window(&mut self) -> &mut WindowState {
            &mut self.window
        }

        fn prepare_read(&mut self) -> bool {
            let prepared = self.queued.is_empty();
            self.steps.push(Step::Prepare(prepared));
            self.prepared |= prepared;
            prepared
        }

        fn dispatch_pending(&mut self) -> Result<(), String> {
            self.steps.push(Step::Dispatch(self.queued.len()));
            while let Some(event) = self.queued.pop_front() {
                match event {
                    Event::Configure(serial, w, h) => {
                        self.window.resize(w, h);
                        self.window.configure(serial);
                    }
                    Event::FrameDone => self.window.frame_done(),
                    Event::Close => self.window.request_close(),
                }
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<Flush, String> {
            self.flushes.pop_front().unwrap_or(Ok(Flush::Complete))
        }

        fn cancel_read(&mut self) {
            assert!(self.prepared, "cancel without a prepared read");
            self.prepared = false;
            self.cancels += 1;
            self.steps.push(Step::Cancel);
        }

        fn read_events(&mut self) -> Result<(), String> {
            assert!(self.prepared, "read without a prepared read");
            self.prepared = false;
            self.reads += 1;
            self.steps.push(Step::Read);
            self.queued.extend(self.incoming.drain(..));
            if self.close_after_reads == Some(self.reads) {
                self.queued.push_back(Event::Close);
            }
            Ok(())
        }

        fn request_frame(&mut self) {
            self.journal.borrow_mut().push(Call::RequestFrame);
            if self.auto_present {
                self.incoming.push_back(Event::FrameDone);
            }
        }

        fn ack_configure(&mut self, serial: u32) {
            self.journal.borrow_mut().push(Call::Ack(serial));
        }
    }

    /// Fence handle that counts how many times it was released.
    #[derive(Debug)]
    struct TestFence {
        id: u64,
        released: Rc<Cell<usize>>,
    }

    impl Drop for TestFence {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    struct FakeRenderer {
        journal: Journal,
        fencing: bool,
        failed_exports: Vec<u64>,
        next_sync: u64,
        released: Rc<Cell<usize>>,
    }

    impl FakeRenderer {
        fn new(journal: &Journal, fencing: bool) -> Self {
            Self {
                journal: journal.clone(),
                fencing,
                failed_exports: Vec::new(),
                next_sync: 0,
                released: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Renderer for FakeRenderer {
        type Sync = u64;
        type Fence = TestFence;

        fn resize(&mut self, size: Size) {
            self.journal.borrow_mut().push(Call::Resize(size));
        }

        fn draw(&mut self, size: Size, frame: FrameSeq) {
            self.journal.borrow_mut().push(Call::Draw(frame.0, size));
        }

        fn create_fence(&mut self) -> Option<u64> {
            if !self.fencing {
                return None;
            }
            self.journal.borrow_mut().push(Call::CreateFence);
            let id = self.next_sync;
            self.next_sync += 1;
            Some(id)
        }

        fn present(&mut self) -> Result<(), RenderError> {
            self.journal.borrow_mut().push(Call::Present);
            Ok(())
        }

        fn export_fence(&mut self, sync: u64) -> Option<TestFence> {
            self.journal.borrow_mut().push(Call::Export);
            if self.failed_exports.contains(&sync) {
                return None;
            }
            Some(TestFence {
                id: sync,
                released: self.released.clone(),
            })
        }
    }

    type ReadyPattern = fn(usize, usize) -> Vec<bool>;

    fn all_ready(_wait: usize, len: usize) -> Vec<bool> {
        vec![true; len]
    }

    fn none_ready(_wait: usize, len: usize) -> Vec<bool> {
        vec![false; len]
    }

    struct FakeMux {
        pattern: ReadyPattern,
        socket_readable: bool,
        errors: VecDeque<WaitError>,
        hangup_at: Option<usize>,
        waits: usize,
        timeouts: Vec<Timeout>,
        interests: Vec<SocketInterest>,
    }

    impl FakeMux {
        fn new(pattern: ReadyPattern) -> Self {
            Self {
                pattern,
                socket_readable: true,
                errors: VecDeque::new(),
                hangup_at: None,
                waits: 0,
                timeouts: Vec::new(),
                interests: Vec::new(),
            }
        }
    }

    impl Multiplexer<TestFence> for FakeMux {
        fn wait(
            &mut self,
            interest: SocketInterest,
            fences: &FenceTable<TestFence>,
            timeout: Timeout,
        ) -> Result<Readiness, WaitError> {
            self.timeouts.push(timeout);
            self.interests.push(interest);
            if let Some(err) = self.errors.pop_front() {
                return Err(err);
            }
            let wait = self.waits;
            self.waits += 1;
            Ok(Readiness {
                socket: SocketReadiness {
                    readable: self.socket_readable,
                    writable: interest.writable,
                    hangup: self.hangup_at == Some(wait),
                },
                fences: (self.pattern)(wait, fences.len()),
            })
        }
    }

    struct FakeClock {
        journal: Journal,
        ticks: u64,
        queries: usize,
        failing: Vec<u64>,
    }

    impl FakeClock {
        fn new(journal: &Journal) -> Self {
            Self {
                journal: journal.clone(),
                ticks: 0,
                queries: 0,
                failing: Vec::new(),
            }
        }
    }

    impl FenceClock<TestFence> for FakeClock {
        type Error = &'static str;

        fn now(&mut self) -> HostTime {
            self.journal.borrow_mut().push(Call::Now);
            self.ticks += 1_000_000;
            HostTime(self.ticks)
        }

        fn completion_time(&mut self, fence: &TestFence) -> Result<HostTime, &'static str> {
            self.queries += 1;
            if self.failing.contains(&fence.id) {
                return Err("SYNC_IOC_FILE_INFO: EINVAL");
            }
            // 2.5ms after the submission timestamp of the same frame.
            Ok(HostTime((fence.id + 1) * 1_000_000 + 2_500_000))
        }
    }

    struct Rig {
        journal: Journal,
        protocol: FakeProtocol,
        renderer: FakeRenderer,
        mux: FakeMux,
        clock: FakeClock,
        samples: Vec<LatencySample>,
    }

    impl Rig {
        fn new(fencing: bool, pattern: ReadyPattern) -> Self {
            let journal = Journal::default();
            Self {
                protocol: FakeProtocol::new(&journal),
                renderer: FakeRenderer::new(&journal, fencing),
                mux: FakeMux::new(pattern),
                clock: FakeClock::new(&journal),
                samples: Vec::new(),
                journal,
            }
        }

        fn run(&mut self, frame_loop: &mut FrameLoop<TestFence>) -> RunOutcome {
            frame_loop.run(
                &mut self.protocol,
                &mut self.renderer,
                &mut self.mux,
                &mut self.clock,
                &mut self.samples,
            )
        }

        fn turn(&mut self, frame_loop: &mut FrameLoop<TestFence>) -> ControlFlow<ExitReason> {
            frame_loop.turn(
                &mut self.protocol,
                &mut self.renderer,
                &mut self.mux,
                &mut self.clock,
                &mut self.samples,
            )
        }

        fn frames(&self) -> Vec<u64> {
            self.samples.iter().map(|s| s.frame.0).collect()
        }
    }

    fn config(pacing: PacingMode, max_frames: Option<u64>) -> LoopConfig {
        LoopConfig {
            pacing,
            max_frames,
            size_policy: SizePolicy::default(),
        }
    }

    #[test]
    fn vsync_gated_three_frames() {
        let mut rig = Rig::new(true, all_ready);
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, Some(3)));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::FrameLimit);
        assert_eq!(outcome.frames_submitted, 3);
        assert_eq!(outcome.frames_retired, 3);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(rig.frames(), [0, 1, 2]);
        let requests = rig
            .journal
            .borrow()
            .iter()
            .filter(|c| **c == Call::RequestFrame)
            .count();
        assert_eq!(requests, 3, "every frame is gated behind a notification");
        for sample in &rig.samples {
            assert!(sample.query_ok);
            assert!(
                sample.completed_at >= sample.submitted_at,
                "latency must be non-negative for {sample:?}"
            );
            assert_eq!(sample.latency().nanos(), 2_500_000);
        }
        assert_eq!(rig.renderer.released.get(), 3);
    }

    #[test]
    fn vsync_gated_waits_for_presentation() {
        let mut rig = Rig::new(true, all_ready);
        rig.protocol.auto_present = false;
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        for _ in 0..5 {
            assert!(rig.turn(&mut frame_loop).is_continue());
        }
        assert_eq!(frame_loop.frames_submitted(), 1);

        rig.protocol.incoming.push_back(Event::FrameDone);
        assert!(rig.turn(&mut frame_loop).is_continue());
        assert!(rig.turn(&mut frame_loop).is_continue());
        assert_eq!(frame_loop.frames_submitted(), 2);
    }

    #[test]
    fn self_chaining_submits_one_frame_per_presentation() {
        let mut rig = Rig::new(true, none_ready);
        let mut frame_loop = FrameLoop::new(config(PacingMode::SelfChaining, None));

        for _ in 0..4 {
            assert!(rig.turn(&mut frame_loop).is_continue());
        }
        // The eager frame plus one per delivered notification; fences never
        // completing do not hold submission back.
        assert_eq!(frame_loop.frames_submitted(), 4);
        assert_eq!(frame_loop.fences().len(), 4);
        assert!(rig.samples.is_empty());
    }

    #[test]
    fn unsupported_fencing_reports_nothing() {
        let mut rig = Rig::new(false, all_ready);
        rig.protocol.close_after_reads = Some(5);
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::Closed);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.frames_submitted >= 5);
        assert!(rig.samples.is_empty());
        assert_eq!(rig.clock.queries, 0, "no kernel queries without fences");
        assert!(
            !rig.journal.borrow().contains(&Call::Export),
            "nothing to export in degraded mode"
        );
    }

    #[test]
    fn unsupported_fencing_stops_at_frame_cap_without_draining() {
        let mut rig = Rig::new(false, all_ready);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, Some(4)));
        let outcome = rig.run(&mut frame_loop);
        assert_eq!(outcome.reason, ExitReason::FrameLimit);
        assert_eq!(outcome.frames_submitted, 4);
        assert_eq!(rig.mux.waits, 4);
    }

    #[test]
    fn hangup_before_first_frame_exits_nonzero() {
        let mut rig = Rig::new(true, all_ready);
        rig.mux.hangup_at = Some(0);
        // A notification already outstanding keeps the first turn from
        // submitting.
        rig.protocol.window.frame_requested();
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::Hangup);
        assert_eq!(outcome.frames_submitted, 0);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(rig.protocol.cancels, 1, "prepared read is cancelled");
    }

    #[test]
    fn hangup_after_frames_releases_every_fence() {
        let mut rig = Rig::new(true, none_ready);
        rig.mux.hangup_at = Some(3);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, None));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::Hangup);
        assert_eq!(outcome.frames_submitted, 4);
        assert_eq!(outcome.frames_retired, 0);
        assert_eq!(outcome.exit_code(), 0);
        assert!(frame_loop.fences().is_empty());
        assert_eq!(rig.renderer.released.get(), 4, "all descriptors closed");
    }

    #[test]
    fn unthrottled_busy_polls_then_blocks_while_draining() {
        let mut rig = Rig::new(true, |wait, len| vec![wait >= 3; len]);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, Some(2)));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::FrameLimit);
        assert_eq!(rig.frames(), [0, 1]);
        assert_eq!(
            rig.mux.timeouts,
            [
                Timeout::Immediate,
                Timeout::Immediate,
                Timeout::Infinite,
                Timeout::Infinite
            ]
        );
    }

    #[test]
    fn quiet_socket_cancels_read_and_still_reaps() {
        let mut rig = Rig::new(true, all_ready);
        rig.mux.socket_readable = false;
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, Some(3)));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::FrameLimit);
        assert_eq!(rig.frames(), [0, 1, 2]);
        assert_eq!(rig.protocol.reads, 0, "nothing to read from a quiet socket");
        assert_eq!(rig.protocol.cancels, 3);
        assert_eq!(
            rig.protocol.steps,
            [Step::Prepare(true), Step::Cancel, Step::Dispatch(0)].repeat(3),
            "each cycle cancels, then dispatches"
        );
        assert_eq!(rig.renderer.released.get(), 3);
    }

    #[test]
    fn queued_events_are_dispatched_before_waiting() {
        let mut rig = Rig::new(true, all_ready);
        rig.protocol.queued.push_back(Event::Configure(7, 640, 480));
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        assert!(rig.turn(&mut frame_loop).is_continue());

        assert_eq!(
            rig.protocol.steps,
            [
                Step::Prepare(false),
                Step::Dispatch(1),
                Step::Prepare(true),
                Step::Read,
                Step::Dispatch(1),
            ]
        );
        assert_eq!(rig.mux.waits, 1);
        assert_eq!(rig.protocol.window.pending_serial(), Some(7));

        assert!(rig.turn(&mut frame_loop).is_continue());
        assert!(
            rig.journal.borrow().contains(&Call::Ack(7)),
            "configure dispatched before the wait is acknowledged next frame"
        );
    }

    #[test]
    fn interrupted_wait_is_retried_without_resubmitting() {
        let mut rig = Rig::new(true, all_ready);
        rig.mux.errors.extend([WaitError::Interrupted, WaitError::Interrupted]);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, None));

        assert!(rig.turn(&mut frame_loop).is_continue());

        assert_eq!(frame_loop.frames_submitted(), 1);
        assert_eq!(rig.mux.timeouts.len(), 3);
        assert_eq!(rig.frames(), [0]);
    }

    #[test]
    fn wait_failure_is_fatal() {
        let mut rig = Rig::new(true, all_ready);
        rig.mux.errors.push_back(WaitError::Failed("EBADF".into()));
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::WaitFailed);
        assert_eq!(rig.protocol.cancels, 1);
        assert_eq!(rig.renderer.released.get(), 1);
    }

    #[test]
    fn flush_backpressure_toggles_write_interest() {
        let mut rig = Rig::new(true, all_ready);
        rig.protocol
            .flushes
            .extend([Ok(Flush::WouldBlock), Ok(Flush::Complete)]);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, None));

        assert!(rig.turn(&mut frame_loop).is_continue());
        assert!(frame_loop.socket_interest().writable);
        assert!(rig.turn(&mut frame_loop).is_continue());
        assert!(!frame_loop.socket_interest().writable);
        assert_eq!(
            rig.mux.interests,
            [
                SocketInterest { writable: true },
                SocketInterest { writable: false }
            ]
        );
    }

    #[test]
    fn flush_failure_cancels_read_and_stops() {
        let mut rig = Rig::new(true, all_ready);
        rig.protocol.flushes.push_back(Err("EPIPE".into()));
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.reason, ExitReason::ProtocolError);
        assert_eq!(outcome.frames_submitted, 1);
        assert_eq!(rig.protocol.cancels, 1);
        assert_eq!(rig.mux.waits, 0, "no wait after a failed flush");
    }

    #[test]
    fn several_fences_retire_in_one_cycle() {
        // Nothing completes for four waits, then frames 0, 2, 3 complete
        // together while 1 and 4 stay in flight.
        let mut rig = Rig::new(true, |wait, len| {
            if wait < 4 {
                vec![false; len]
            } else {
                let mut ready = vec![true; len];
                ready[1] = false;
                if len > 4 {
                    ready[4] = false;
                }
                ready
            }
        });
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, None));
        for _ in 0..4 {
            assert!(rig.turn(&mut frame_loop).is_continue());
        }
        assert_eq!(frame_loop.fences().len(), 4);

        assert!(rig.turn(&mut frame_loop).is_continue());

        assert_eq!(rig.frames(), [0, 2, 3]);
        let in_flight: Vec<u64> = frame_loop.fences().iter().map(|e| e.frame.0).collect();
        assert_eq!(in_flight, [1, 4]);
        assert_eq!(rig.renderer.released.get(), 3);
    }

    #[test]
    fn pending_configure_resizes_then_acks_before_drawing() {
        let mut rig = Rig::new(true, none_ready);
        rig.protocol.window.resize(800, 0);
        rig.protocol.window.configure(42);
        let mut frame_loop = FrameLoop::new(config(PacingMode::VsyncGated, None));

        assert!(rig.turn(&mut frame_loop).is_continue());

        let size = Size::new(800, 500);
        assert_eq!(
            *rig.journal.borrow(),
            [
                Call::RequestFrame,
                Call::Resize(size),
                Call::Ack(42),
                Call::Draw(0, size),
                Call::CreateFence,
                Call::Now,
                Call::Present,
                Call::Export,
            ]
        );
        assert_eq!(rig.protocol.window.pending_serial(), None);
    }

    #[test]
    fn configure_between_frames_is_acknowledged_once() {
        let mut rig = Rig::new(true, all_ready);
        rig.protocol
            .incoming
            .push_back(Event::Configure(7, 1024, 768));
        let mut frame_loop = FrameLoop::new(LoopConfig {
            pacing: PacingMode::Unthrottled,
            max_frames: Some(3),
            size_policy: SizePolicy {
                fixed: Some(Size::new(300, 300)),
            },
        });

        let _ = rig.run(&mut frame_loop);

        let journal = rig.journal.borrow();
        let acks: Vec<&Call> = journal
            .iter()
            .filter(|c| matches!(c, Call::Ack(_)))
            .collect();
        assert_eq!(acks, [&Call::Ack(7)]);
        assert!(journal.contains(&Call::Resize(Size::new(300, 300))));
        assert!(journal.contains(&Call::Draw(1, Size::new(300, 300))));
    }

    #[test]
    fn failed_completion_query_reports_zero_and_continues() {
        let mut rig = Rig::new(true, all_ready);
        rig.clock.failing.push(1);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, Some(3)));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.frames_retired, 3);
        assert_eq!(rig.frames(), [0, 1, 2]);
        assert!(!rig.samples[1].query_ok);
        assert_eq!(rig.samples[1].completed_at, HostTime::ZERO);
        assert!(rig.samples[1].latency().is_negative());
        assert!(rig.samples[2].query_ok);
    }

    #[test]
    fn failed_export_skips_only_that_frame() {
        let mut rig = Rig::new(true, all_ready);
        rig.renderer.failed_exports.push(1);
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, Some(3)));

        let outcome = rig.run(&mut frame_loop);

        assert_eq!(outcome.frames_submitted, 3);
        assert_eq!(rig.frames(), [0, 2]);
    }

    #[test]
    fn table_stays_sorted_by_submission() {
        let mut rig = Rig::new(true, |wait, len| {
            (0..len).map(|i| (i + wait) % 3 == 0).collect()
        });
        let mut frame_loop = FrameLoop::new(config(PacingMode::Unthrottled, None));
        for _ in 0..20 {
            assert!(rig.turn(&mut frame_loop).is_continue());
            let frames: Vec<u64> = frame_loop.fences().iter().map(|e| e.frame.0).collect();
            assert!(
                frames.windows(2).all(|w| w[0] < w[1]),
                "fence table out of order: {frames:?}"
            );
        }
        let mut retired = rig.frames();
        retired.sort_unstable();
        retired.dedup();
        assert_eq!(retired.len(), rig.samples.len(), "each frame retires once");
    }
}
