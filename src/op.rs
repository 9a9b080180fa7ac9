//! Compiled op-codes.
//!
//! An op-unit is the mutable, per-fold form of one description step. Each
//! unit plays one role when an element reaches it (predicate, transform or
//! expander) and answers the compiler's `drop`/`take` absorption queries.
//! Units that do not override a query answer [`Strategy::CannotHandle`].

use crate::cursor::{SequentialCursor, SourceCursor};
use crate::origin::Item;
use std::sync::Arc;

/// Answer to a `drop`/`take` absorption query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The unit took over the request; the search stops.
    HandledInternally,
    /// The unit preserves element count; keep searching upstream.
    DelegateUpstream,
    /// The unit changes or inspects element count; a counting op-code has
    /// to be materialized after it.
    CannotHandle,
}

/// Result of a transform: keep going with a value, or end the stream.
///
/// `Stop` ends the segment the transform belongs to; segments appended
/// later with `concat` still run. It is the only way a transform can end a
/// stream, so no element value can ever be mistaken for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<T> {
    Continue(T),
    Stop,
}

impl<T> Step<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Continue(value) => Step::Continue(f(value)),
            Step::Stop => Step::Stop,
        }
    }
}

impl<T> From<Option<T>> for Step<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Step::Continue(value),
            None => Step::Stop,
        }
    }
}

pub(crate) type Predicate = Arc<dyn Fn(&Item) -> bool + Send + Sync>;
pub(crate) type Transform = Arc<dyn Fn(Item) -> Step<Item> + Send + Sync>;
pub(crate) type Expander = Arc<dyn Fn(Item) -> crate::origin::ItemIter + Send + Sync>;

/// What happened to an element at one op-unit.
pub(crate) enum Outcome {
    /// Pass this (possibly new) element to the next unit.
    Keep(Item),
    /// Abandon the element; read the next one from the cursor.
    Discard,
    /// Run the remaining units over every element of this nested source.
    Expand(SourceCursor),
    /// Pass this element on, then end this segment.
    Last(Item),
    /// Abandon the element and end this segment.
    Stop,
}

/// Kind tag of a compiled unit, used for plan summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Filter,
    Map,
    MapWhile,
    FlatMap,
    Drop(usize),
    Take(usize),
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Filter => write!(f, "FILTER"),
            OpKind::Map => write!(f, "MAP"),
            OpKind::MapWhile => write!(f, "MAPWHILE"),
            OpKind::FlatMap => write!(f, "FLATMAP"),
            OpKind::Drop(n) => write!(f, "DROP {n}"),
            OpKind::Take(n) => write!(f, "TAKE {n}"),
        }
    }
}

/// A compiled, mutable op-code.
pub(crate) trait OpUnit {
    /// Handle one element.
    fn apply(&mut self, item: Item) -> Outcome;

    fn try_drop(&mut self, _n: usize) -> Strategy {
        Strategy::CannotHandle
    }

    fn try_take(&mut self, _n: usize) -> Strategy {
        Strategy::CannotHandle
    }

    fn kind(&self) -> OpKind;
}

/// Discards elements the predicate rejects.
pub(crate) struct FilterUnit {
    predicate: Predicate,
}

impl FilterUnit {
    pub(crate) fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

impl OpUnit for FilterUnit {
    fn apply(&mut self, item: Item) -> Outcome {
        if (self.predicate)(&item) {
            Outcome::Keep(item)
        } else {
            Outcome::Discard
        }
    }

    fn kind(&self) -> OpKind {
        OpKind::Filter
    }
}

/// Replaces each element with the transform's result.
///
/// A plain map never stops and maps one element to one element, so drops
/// and takes may pass straight through it. A map-while may end the stream
/// early and blocks both.
pub(crate) struct TransformUnit {
    transform: Transform,
    count_preserving: bool,
}

impl TransformUnit {
    pub(crate) fn map(transform: Transform) -> Self {
        Self {
            transform,
            count_preserving: true,
        }
    }

    pub(crate) fn map_while(transform: Transform) -> Self {
        Self {
            transform,
            count_preserving: false,
        }
    }

    fn absorb(&self) -> Strategy {
        if self.count_preserving {
            Strategy::DelegateUpstream
        } else {
            Strategy::CannotHandle
        }
    }
}

impl OpUnit for TransformUnit {
    fn apply(&mut self, item: Item) -> Outcome {
        match (self.transform)(item) {
            Step::Continue(item) => Outcome::Keep(item),
            Step::Stop => Outcome::Stop,
        }
    }

    fn try_drop(&mut self, _n: usize) -> Strategy {
        self.absorb()
    }

    fn try_take(&mut self, _n: usize) -> Strategy {
        self.absorb()
    }

    fn kind(&self) -> OpKind {
        if self.count_preserving {
            OpKind::Map
        } else {
            OpKind::MapWhile
        }
    }
}

/// Expands each element into a nested source.
pub(crate) struct FlatMapUnit {
    expander: Expander,
}

impl FlatMapUnit {
    pub(crate) fn new(expander: Expander) -> Self {
        Self { expander }
    }
}

impl OpUnit for FlatMapUnit {
    fn apply(&mut self, item: Item) -> Outcome {
        let nested = SequentialCursor::new((self.expander)(item));
        Outcome::Expand(SourceCursor::Sequential(nested))
    }

    fn kind(&self) -> OpKind {
        OpKind::FlatMap
    }
}

/// Materialized drop: a predicate that rejects elements while its counter
/// is positive. Later drops merge into it additively.
pub(crate) struct DropUnit {
    left_to_drop: usize,
}

impl DropUnit {
    pub(crate) fn new(n: usize) -> Self {
        Self { left_to_drop: n }
    }
}

impl OpUnit for DropUnit {
    fn apply(&mut self, item: Item) -> Outcome {
        if self.left_to_drop > 0 {
            self.left_to_drop -= 1;
            Outcome::Discard
        } else {
            Outcome::Keep(item)
        }
    }

    fn try_drop(&mut self, n: usize) -> Strategy {
        self.left_to_drop = self.left_to_drop.saturating_add(n);
        Strategy::HandledInternally
    }

    fn kind(&self) -> OpKind {
        OpKind::Drop(self.left_to_drop)
    }
}

/// Materialized take: a transform that passes elements while its counter is
/// positive and ends this segment with the last one. Later takes keep the
/// minimum.
///
/// A `take(0)` that could not be absorbed still reads one element before it
/// can end the segment.
pub(crate) struct TakeUnit {
    left_to_take: usize,
}

impl TakeUnit {
    pub(crate) fn new(n: usize) -> Self {
        Self { left_to_take: n }
    }
}

impl OpUnit for TakeUnit {
    fn apply(&mut self, item: Item) -> Outcome {
        match self.left_to_take {
            0 => Outcome::Stop,
            1 => {
                self.left_to_take = 0;
                Outcome::Last(item)
            }
            _ => {
                self.left_to_take -= 1;
                Outcome::Keep(item)
            }
        }
    }

    fn try_take(&mut self, n: usize) -> Strategy {
        self.left_to_take = self.left_to_take.min(n);
        Strategy::HandledInternally
    }

    fn kind(&self) -> OpKind {
        OpKind::Take(self.left_to_take)
    }
}
