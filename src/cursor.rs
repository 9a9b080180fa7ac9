//! Source cursors: single-use, mutable readers over one origin.
//!
//! A cursor is created fresh for every compile and is consumed by exactly
//! one fold. Both variants answer `drop`/`take` absorption requests:
//!
//! - [`IndexedCursor`] moves its start/end window in O(1).
//! - [`SequentialCursor`] records a pending skip and a remaining-count
//!   ceiling, applied lazily on the next read.

use crate::error::{Result, XformError};
use crate::op::Strategy;
use crate::origin::{IndexedSource, Item, ItemIter, OriginKind};
use std::sync::Arc;

/// Mutable reader over one origin.
pub(crate) enum SourceCursor {
    Indexed(IndexedCursor),
    Sequential(SequentialCursor),
}

impl SourceCursor {
    /// Open a fresh cursor over an origin.
    pub(crate) fn open(origin: &OriginKind) -> Self {
        match origin {
            OriginKind::Indexed(source) => SourceCursor::Indexed(IndexedCursor::new(source.clone())),
            OriginKind::Sequential(factory) => {
                SourceCursor::Sequential(SequentialCursor::new(factory()))
            }
        }
    }

    pub(crate) fn has_next(&mut self) -> bool {
        match self {
            SourceCursor::Indexed(c) => c.has_next(),
            SourceCursor::Sequential(c) => c.has_next(),
        }
    }

    /// Read the next element. Only valid right after `has_next()` returned true.
    pub(crate) fn next(&mut self) -> Result<Item> {
        match self {
            SourceCursor::Indexed(c) => c.next(),
            SourceCursor::Sequential(c) => c.next(),
        }
    }

    /// `has_next()` followed by `next()`.
    pub(crate) fn pull(&mut self) -> Option<Item> {
        if self.has_next() {
            self.next().ok()
        } else {
            None
        }
    }

    /// Absorb a drop of `n` elements. Cursors always succeed.
    pub(crate) fn try_drop(&mut self, n: usize) -> Strategy {
        match self {
            SourceCursor::Indexed(c) => c.drop_front(n),
            SourceCursor::Sequential(c) => c.skip(n),
        }
        Strategy::HandledInternally
    }

    /// Absorb a take of `n` elements. Cursors always succeed.
    pub(crate) fn try_take(&mut self, n: usize) -> Strategy {
        match self {
            SourceCursor::Indexed(c) => c.truncate(n),
            SourceCursor::Sequential(c) => c.limit(n),
        }
        Strategy::HandledInternally
    }
}

/// Cursor over a randomly addressable origin.
///
/// Invariant: `idx <= end <= source.len()`.
pub(crate) struct IndexedCursor {
    source: Arc<dyn IndexedSource>,
    idx: usize,
    end: usize,
}

impl IndexedCursor {
    fn new(source: Arc<dyn IndexedSource>) -> Self {
        let end = source.len();
        Self { source, idx: 0, end }
    }

    fn has_next(&self) -> bool {
        self.idx < self.end
    }

    fn next(&mut self) -> Result<Item> {
        if self.idx >= self.end {
            return Err(XformError::Exhausted);
        }
        let item = self.source.item(self.idx);
        self.idx += 1;
        Ok(item)
    }

    /// Advance the start, clamped so it never passes the end.
    fn drop_front(&mut self, n: usize) {
        self.idx = self.idx.saturating_add(n).min(self.end);
    }

    /// Shrink the effective end to at most `n` elements past the start.
    fn truncate(&mut self, n: usize) {
        self.end = self.idx.saturating_add(n).min(self.end);
    }

    /// Current `[start, end)` window.
    pub(crate) fn window(&self) -> (usize, usize) {
        (self.idx, self.end)
    }
}

/// Cursor over a forward-only pass.
///
/// `has_next()` has to read ahead, so the element it saw is parked in
/// `peeked` until `next()` hands it out.
pub(crate) struct SequentialCursor {
    items: ItemIter,
    pending_skip: usize,
    remaining: Option<usize>,
    peeked: Option<Item>,
    armed: bool,
}

impl SequentialCursor {
    pub(crate) fn new(items: ItemIter) -> Self {
        Self {
            items,
            pending_skip: 0,
            remaining: None,
            peeked: None,
            armed: false,
        }
    }

    fn apply_skip(&mut self) {
        if self.pending_skip > 0 {
            let skip = std::mem::take(&mut self.pending_skip);
            self.items.nth(skip - 1);
        }
    }

    fn has_next(&mut self) -> bool {
        if self.remaining == Some(0) {
            self.armed = false;
            return false;
        }
        self.apply_skip();
        if self.peeked.is_none() {
            self.peeked = self.items.next();
        }
        self.armed = self.peeked.is_some();
        self.armed
    }

    fn next(&mut self) -> Result<Item> {
        if !self.armed {
            return Err(XformError::Exhausted);
        }
        self.armed = false;
        let item = self.peeked.take().ok_or(XformError::Exhausted)?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(item)
    }

    /// Record `n` more elements to skip before the next read.
    ///
    /// Dropping from a stream that already has a ceiling eats into that
    /// ceiling: `take(3).drop(2)` leaves one element.
    fn skip(&mut self, n: usize) {
        self.pending_skip = self.pending_skip.saturating_add(n);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(n);
        }
    }

    /// Lower the remaining-count ceiling to at most `n`.
    fn limit(&mut self, n: usize) {
        self.remaining = Some(self.remaining.map_or(n, |r| r.min(n)));
    }

    /// Recorded `(pending_skip, remaining)`.
    pub(crate) fn bounds(&self) -> (usize, Option<usize>) {
        (self.pending_skip, self.remaining)
    }
}
