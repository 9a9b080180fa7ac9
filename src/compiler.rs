//! Compiles a pipeline description into a chain of segments.
//!
//! A segment is one source cursor plus the ordered op-codes that apply to
//! its elements. `concat` starts a new segment; every other step either adds
//! an op-code to the current tail segment or, for `drop`/`take`, is pushed as
//! close to the source as it can go:
//!
//! 1. Walk the tail segment's op-codes backward from the end, asking each
//!    one to absorb the request. Count-preserving units delegate upstream,
//!    a matching counting unit merges the amount, anything else stops the
//!    walk.
//! 2. If the walk passes every op-code, the source cursor absorbs the request
//!    by index arithmetic or by recording a skip/ceiling.
//! 3. Otherwise a counting op-code is appended at the tail.

use crate::cursor::SourceCursor;
use crate::desc::{Node, Stage};
use crate::engine;
use crate::explain::{PlanSummary, SegmentSummary};
use crate::op::{DropUnit, FilterUnit, FlatMapUnit, OpUnit, Strategy, TakeUnit, TransformUnit};
use crate::origin::{Item, unerase};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, trace};

/// Compiler settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Absorb `drop`/`take` into earlier op-codes or the source cursor.
    /// When off, every `drop`/`take` becomes its own counting op-code.
    /// Output is the same either way.
    pub push_down: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { push_down: true }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_push_down() -> Self {
        Self { push_down: false }
    }
}

/// One compiled `(cursor, op-codes)` unit.
pub(crate) struct Segment {
    pub(crate) cursor: SourceCursor,
    pub(crate) ops: Vec<Box<dyn OpUnit>>,
    pub(crate) previous: Option<usize>,
    pub(crate) next: Option<usize>,
}

/// Which counting request is being pushed down.
#[derive(Clone, Copy, Debug)]
enum Count {
    Drop(usize),
    Take(usize),
}

impl Count {
    fn ask_unit(self, unit: &mut dyn OpUnit) -> Strategy {
        match self {
            Count::Drop(n) => unit.try_drop(n),
            Count::Take(n) => unit.try_take(n),
        }
    }

    fn ask_cursor(self, cursor: &mut SourceCursor) -> Strategy {
        match self {
            Count::Drop(n) => cursor.try_drop(n),
            Count::Take(n) => cursor.try_take(n),
        }
    }

    fn materialize(self) -> Box<dyn OpUnit> {
        match self {
            Count::Drop(n) => Box::new(DropUnit::new(n)),
            Count::Take(n) => Box::new(TakeUnit::new(n)),
        }
    }
}

/// A compiled, single-use execution plan producing `T` elements.
///
/// Holds mutable cursor and counter state; it is consumed by one fold.
pub struct Plan<T> {
    segments: Vec<Segment>,
    tail: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Plan<T> {
    /// Run the plan, left-folding every output element.
    pub fn fold<B, F>(self, init: B, mut reducer: F) -> B
    where
        F: FnMut(B, T) -> B,
    {
        self.fold_control(init, |acc, x| ControlFlow::Continue(reducer(acc, x)))
    }

    /// Run the plan with a reducer that may end the fold early by returning
    /// `ControlFlow::Break`.
    pub fn fold_control<B, F>(self, init: B, mut reducer: F) -> B
    where
        F: FnMut(B, T) -> ControlFlow<B, B>,
    {
        let mut erased = |acc: B, item: Item| reducer(acc, unerase::<T>(item));
        engine::run(self.segments, self.tail, init, &mut erased)
    }

    /// Number of segments (one per source).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Shape of the compiled plan, head segment first.
    pub fn summary(&self) -> PlanSummary {
        let segments = engine::forward_order(&self.segments, self.tail)
            .into_iter()
            .map(|idx| SegmentSummary::of(&self.segments[idx]))
            .collect();
        PlanSummary { segments }
    }
}

/// Compile a description into a fresh segment chain.
///
/// The description is never mutated; each call allocates new cursors and
/// op-codes.
pub(crate) fn compile<T>(node: &Arc<Node>, options: CompileOptions) -> Plan<T> {
    // Walk back to the source, then replay the steps front to back.
    let mut chain = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        chain.push(n.as_ref());
        current = n.prior();
    }

    let mut segments: Vec<Segment> = Vec::new();
    let mut tail = 0;
    for node in chain.into_iter().rev() {
        match &node.stage {
            Stage::Source(origin) => {
                tail = push_segment(&mut segments, None, SourceCursor::open(origin));
            }
            Stage::Concat(origin) => {
                tail = push_segment(&mut segments, Some(tail), SourceCursor::open(origin));
            }
            Stage::Filter(predicate) => {
                segments[tail]
                    .ops
                    .push(Box::new(FilterUnit::new(Arc::clone(predicate))));
            }
            Stage::Map(transform) => {
                segments[tail]
                    .ops
                    .push(Box::new(TransformUnit::map(Arc::clone(transform))));
            }
            Stage::MapWhile(transform) => {
                segments[tail]
                    .ops
                    .push(Box::new(TransformUnit::map_while(Arc::clone(transform))));
            }
            Stage::FlatMap(expander) => {
                segments[tail]
                    .ops
                    .push(Box::new(FlatMapUnit::new(Arc::clone(expander))));
            }
            Stage::Drop(n) => push_down(&mut segments[tail], Count::Drop(*n), options),
            Stage::Take(n) => push_down(&mut segments[tail], Count::Take(*n), options),
        }
    }

    debug!(segments = segments.len(), push_down = options.push_down, "compiled plan");
    Plan {
        segments,
        tail,
        _marker: PhantomData,
    }
}

fn push_segment(segments: &mut Vec<Segment>, previous: Option<usize>, cursor: SourceCursor) -> usize {
    let idx = segments.len();
    segments.push(Segment {
        cursor,
        ops: Vec::new(),
        previous,
        next: None,
    });
    if let Some(prev) = previous {
        segments[prev].next = Some(idx);
    }
    idx
}

fn push_down(segment: &mut Segment, count: Count, options: CompileOptions) {
    if options.push_down {
        let mut blocked = false;
        for unit in segment.ops.iter_mut().rev() {
            match count.ask_unit(unit.as_mut()) {
                Strategy::HandledInternally => {
                    trace!(?count, unit = %unit.kind(), "absorbed by op-code");
                    return;
                }
                Strategy::DelegateUpstream => continue,
                Strategy::CannotHandle => {
                    blocked = true;
                    break;
                }
            }
        }
        if !blocked && count.ask_cursor(&mut segment.cursor) == Strategy::HandledInternally {
            trace!(?count, "absorbed by source cursor");
            return;
        }
    }
    trace!(?count, "materialized counting op-code");
    segment.ops.push(count.materialize());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Xform;
    use crate::explain::SourceWindow;
    use crate::op::OpKind;

    fn ops_of(plan: &PlanSummary, segment: usize) -> Vec<OpKind> {
        plan.segments[segment].ops.clone()
    }

    #[test]
    fn test_source_only() {
        let plan = Xform::from_indexed(vec![1, 2, 3]).compile();
        assert_eq!(plan.segment_count(), 1);
        let summary = plan.summary();
        assert!(summary.segments[0].ops.is_empty());
        assert_eq!(
            summary.segments[0].source,
            SourceWindow::Indexed { start: 0, end: 3 }
        );
    }

    #[test]
    fn test_drop_absorbed_by_indexed_cursor() {
        let summary = Xform::from_indexed(vec![1, 2, 3, 4]).drop(1).drop(2).compile().summary();
        assert!(ops_of(&summary, 0).is_empty());
        assert_eq!(
            summary.segments[0].source,
            SourceWindow::Indexed { start: 3, end: 4 }
        );
    }

    #[test]
    fn test_take_absorbed_through_map() {
        let summary = Xform::from_indexed(vec![1, 2, 3, 4])
            .map(|x| x * 2)
            .take(2)
            .compile()
            .summary();
        assert_eq!(ops_of(&summary, 0), vec![OpKind::Map]);
        assert_eq!(
            summary.segments[0].source,
            SourceWindow::Indexed { start: 0, end: 2 }
        );
    }

    #[test]
    fn test_sequential_cursor_records_skip_and_limit() {
        let summary = Xform::from_sequential(vec![1, 2, 3, 4, 5])
            .drop(1)
            .take(3)
            .take(5)
            .compile()
            .summary();
        assert!(ops_of(&summary, 0).is_empty());
        assert_eq!(
            summary.segments[0].source,
            SourceWindow::Sequential {
                skip: 1,
                limit: Some(3)
            }
        );
    }

    #[test]
    fn test_filter_blocks_and_drops_merge() {
        let summary = Xform::from_indexed(vec![1, 2, 3, 4])
            .filter(|x| *x > 1)
            .drop(1)
            .map(|x| x + 1)
            .drop(2)
            .compile()
            .summary();
        assert_eq!(
            ops_of(&summary, 0),
            vec![OpKind::Filter, OpKind::Drop(3), OpKind::Map]
        );
    }

    #[test]
    fn test_takes_merge_by_minimum() {
        let summary = Xform::from_indexed(vec![1, 2, 3])
            .filter(|_| true)
            .take(5)
            .take(2)
            .take(4)
            .compile()
            .summary();
        assert_eq!(ops_of(&summary, 0), vec![OpKind::Filter, OpKind::Take(2)]);
    }

    #[test]
    fn test_take_after_materialized_drop_is_not_merged() {
        let summary = Xform::from_indexed(vec![1, 2, 3])
            .flat_map(|x| [x, x])
            .drop(1)
            .take(2)
            .compile()
            .summary();
        assert_eq!(
            ops_of(&summary, 0),
            vec![OpKind::FlatMap, OpKind::Drop(1), OpKind::Take(2)]
        );
    }

    #[test]
    fn test_push_down_disabled_materializes() {
        let summary = Xform::from_indexed(vec![1, 2, 3])
            .drop(1)
            .take(1)
            .compile_with(CompileOptions::without_push_down())
            .summary();
        assert_eq!(ops_of(&summary, 0), vec![OpKind::Drop(1), OpKind::Take(1)]);
        assert_eq!(
            summary.segments[0].source,
            SourceWindow::Indexed { start: 0, end: 3 }
        );
    }

    #[test]
    fn test_concat_starts_new_segment() {
        let summary = Xform::from_indexed(vec![1, 2])
            .map(|x| x + 1)
            .concat(vec![3, 4, 5])
            .drop(1)
            .filter(|x| *x > 0)
            .compile()
            .summary();
        assert_eq!(summary.segments.len(), 2);
        assert_eq!(ops_of(&summary, 0), vec![OpKind::Map]);
        assert_eq!(ops_of(&summary, 1), vec![OpKind::Filter]);
        assert_eq!(
            summary.segments[1].source,
            SourceWindow::Indexed { start: 1, end: 3 }
        );
    }

    #[test]
    fn test_compiles_are_independent() {
        let desc = Xform::from_sequential(vec![1, 2, 3]).filter(|_| true).take(2);
        let a = desc.compile();
        let b = desc.compile();
        assert_eq!(a.fold(0, |n, _| n + 1), 2);
        assert_eq!(b.fold(0, |n, _| n + 1), 2);
    }

    #[test]
    fn test_options_defaults() {
        assert!(CompileOptions::default().push_down);
        assert_eq!(CompileOptions::new(), CompileOptions::default());
        assert!(!CompileOptions::without_push_down().push_down);
    }
}
