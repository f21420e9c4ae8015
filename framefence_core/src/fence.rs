// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-flight fence tracking.
//!
//! Every submitted frame whose GPU work has not been confirmed complete owns
//! exactly one [`FenceEntry`] in the [`FenceTable`]. Entries are appended in
//! submission order and removed by stable compaction, so the table is always
//! sorted oldest-first.
//!
//! The poll-descriptor set is not stored. Backends derive it from the table
//! on every wait: slot 0 is the protocol socket and slot `i + 1` is entry
//! `i`. Because the view is rebuilt from the single owning collection, the
//! two can never drift apart.

use alloc::vec::Vec;
use core::fmt;

/// Sequence number identifying one submitted frame.
///
/// Assigned from a counter that increments exactly once per submission and
/// is never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameSeq(pub u64);

impl FrameSeq {
    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for FrameSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameSeq({})", self.0)
    }
}

impl fmt::Display for FrameSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One in-flight frame's completion token.
///
/// `F` is the kernel-level waitable handle (an `OwnedFd` in the Wayland
/// backend). The entry owns it exclusively; dropping the entry releases it.
pub struct FenceEntry<F> {
    /// Waitable completion handle.
    pub fence: F,
    /// Frame this fence belongs to.
    pub frame: FrameSeq,
    /// Monotonic time captured right before the frame was presented.
    pub submitted_at: crate::time::HostTime,
}

impl<F> fmt::Debug for FenceEntry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceEntry")
            .field("frame", &self.frame)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of in-flight fences.
pub struct FenceTable<F> {
    entries: Vec<FenceEntry<F>>,
}

impl<F> FenceTable<F> {
    /// Initial capacity; the collection grows geometrically beyond it.
    pub const INITIAL_CAPACITY: usize = 10;

    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(Self::INITIAL_CAPACITY),
        }
    }

    /// Appends the entry for a newly submitted frame.
    ///
    /// Frames must be pushed in strictly increasing sequence order.
    pub fn push(&mut self, entry: FenceEntry<F>) {
        debug_assert!(
            self.entries.last().is_none_or(|last| last.frame < entry.frame),
            "fence entries must be appended in submission order"
        );
        self.entries.push(entry);
    }

    /// Removes the entry at `index`, shifting later entries down by one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> FenceEntry<F> {
        self.entries.remove(index)
    }

    /// Iterates entries oldest-first.
    pub fn iter(&self) -> core::slice::Iter<'_, FenceEntry<F>> {
        self.entries.iter()
    }

    /// Number of in-flight fences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no fence is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of poll slots the derived descriptor view needs (socket
    /// included).
    #[must_use]
    pub fn poll_slots(&self) -> usize {
        self.entries.len() + 1
    }

    /// Drops every entry, releasing its handle.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<F> Default for FenceTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for FenceTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<'a, F> IntoIterator for &'a FenceTable<F> {
    type Item = &'a FenceEntry<F>;
    type IntoIter = core::slice::Iter<'a, FenceEntry<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
