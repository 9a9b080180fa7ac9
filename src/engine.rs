//! Fold engine.
//!
//! Runs a compiled segment chain exactly once. Each element read from a
//! segment's cursor is pushed through the op-codes left to right in a flat
//! loop; a flat-map recurses over its nested source with the remaining
//! op-codes, threading the accumulator through.
//!
//! Two ways to end early:
//!
//! - An op-code yields `Last` or `Stop` (a take handed out its last
//!   element, a map-while stopped). That ends the segment the op-code
//!   belongs to. Later segments still run, since the op-code never applied
//!   to them.
//! - The reducer returns `ControlFlow::Break`. That ends the whole fold.

use crate::compiler::Segment;
use crate::cursor::SourceCursor;
use crate::op::{OpUnit, Outcome};
use crate::origin::Item;
use std::ops::ControlFlow;
use tracing::trace;

/// How a pass over one cursor finished.
enum Pass<B> {
    /// Cursor exhausted.
    Drained(B),
    /// An op-code ended the segment.
    Stopped(B),
    /// The reducer asked to end the fold.
    Halted(B),
}

/// Segment indices from head to tail, found by following `previous` links
/// back from the tail and then `next` links forward.
pub(crate) fn forward_order(segments: &[Segment], tail: usize) -> Vec<usize> {
    if segments.is_empty() {
        return Vec::new();
    }
    let mut head = tail;
    while let Some(prev) = segments[head].previous {
        head = prev;
    }
    let mut order = Vec::with_capacity(segments.len());
    let mut current = Some(head);
    while let Some(idx) = current {
        order.push(idx);
        current = segments[idx].next;
    }
    order
}

/// Fold every segment in order, carrying the accumulator across segments.
pub(crate) fn run<B, R>(mut segments: Vec<Segment>, tail: usize, init: B, reducer: &mut R) -> B
where
    R: FnMut(B, Item) -> ControlFlow<B, B>,
{
    let mut acc = init;
    for idx in forward_order(&segments, tail) {
        let segment = &mut segments[idx];
        match run_pass(&mut segment.cursor, &mut segment.ops, 0, acc, reducer) {
            Pass::Drained(next) => acc = next,
            Pass::Stopped(next) => {
                trace!(segment = idx, "segment stopped early");
                acc = next;
            }
            Pass::Halted(next) => {
                trace!(segment = idx, "fold halted by reducer");
                return next;
            }
        }
    }
    acc
}

/// Push every element of `cursor` through `ops[start..]` and into the
/// reducer.
fn run_pass<B, R>(
    cursor: &mut SourceCursor,
    ops: &mut [Box<dyn OpUnit>],
    start: usize,
    init: B,
    reducer: &mut R,
) -> Pass<B>
where
    R: FnMut(B, Item) -> ControlFlow<B, B>,
{
    let mut acc = init;
    while let Some(item) = cursor.pull() {
        match run_item(item, ops, start, acc, reducer) {
            Pass::Drained(next) => acc = next,
            ended => return ended,
        }
    }
    Pass::Drained(acc)
}

/// Push one element through `ops[start..]`. `Drained` means the next
/// element may be read.
fn run_item<B, R>(
    mut item: Item,
    ops: &mut [Box<dyn OpUnit>],
    start: usize,
    acc: B,
    reducer: &mut R,
) -> Pass<B>
where
    R: FnMut(B, Item) -> ControlFlow<B, B>,
{
    let mut last = false;
    for j in start..ops.len() {
        match ops[j].apply(item) {
            Outcome::Keep(next) => item = next,
            Outcome::Last(next) => {
                item = next;
                last = true;
            }
            Outcome::Discard => return settle(acc, last),
            Outcome::Stop => return Pass::Stopped(acc),
            Outcome::Expand(mut nested) => {
                return match run_pass(&mut nested, ops, j + 1, acc, reducer) {
                    Pass::Drained(next) => settle(next, last),
                    ended => ended,
                };
            }
        }
    }
    match reducer(acc, item) {
        ControlFlow::Continue(next) => settle(next, last),
        ControlFlow::Break(done) => Pass::Halted(done),
    }
}

fn settle<B>(acc: B, last: bool) -> Pass<B> {
    if last {
        Pass::Stopped(acc)
    } else {
        Pass::Drained(acc)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CompileOptions, Xform};
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collect(x: &Xform<i32>) -> Vec<i32> {
        x.fold(Vec::new(), |mut acc, v| {
            acc.push(v);
            acc
        })
    }

    #[test]
    fn test_empty_source_returns_init() {
        let x = Xform::from_indexed(Vec::<i32>::new());
        assert_eq!(x.fold(42, |acc, v| acc + v), 42);
    }

    #[test]
    fn test_flat_map_then_ops_apply_to_nested() {
        let x = Xform::from_indexed(vec![1, 2])
            .flat_map(|v| vec![v, v * 10])
            .filter(|v| *v != 10)
            .map(|v| v + 1);
        assert_eq!(collect(&x), vec![2, 3, 21]);
    }

    #[test]
    fn test_nested_flat_maps() {
        let x = Xform::from_indexed(vec![1, 2])
            .flat_map(|v| vec![v, v])
            .flat_map(|v| vec![v * 10, v * 100]);
        assert_eq!(collect(&x), vec![10, 100, 10, 100, 20, 200, 20, 200]);
    }

    #[test]
    fn test_take_inside_flat_map_ends_outer_loop() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let x = Xform::from_sequential(vec![1, 2, 3, 4])
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .flat_map(|v| vec![v, v])
            .take(3);
        assert_eq!(collect(&x), vec![1, 1, 2]);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_take_stop_ends_only_its_segment() {
        let x = Xform::from_indexed(vec![1, 2, 3, 4])
            .filter(|v| *v > 0)
            .take(2)
            .concat(vec![9, 10]);
        assert_eq!(collect(&x), vec![1, 2, 9, 10]);
    }

    #[test]
    fn test_take_ends_segment_whether_absorbed_or_not() {
        let absorbed = Xform::from_indexed(vec![1, 2, 3]).take(1).concat([9]);
        let materialized = Xform::from_indexed(vec![1, 2, 3])
            .filter(|_| true)
            .take(1)
            .concat([9]);
        assert_eq!(collect(&absorbed), vec![1, 9]);
        assert_eq!(collect(&materialized), vec![1, 9]);
    }

    #[test]
    fn test_materialized_take_reads_no_extra_element() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let x = Xform::from_sequential(1..)
            .filter(|v| v % 2 == 1)
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .take(3);
        assert_eq!(collect(&x), vec![1, 3, 5]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_last_element_still_expands() {
        let x = Xform::from_indexed(vec![1, 2, 3])
            .filter(|_| true)
            .take(2)
            .flat_map(|v| [v, v * 10]);
        assert_eq!(collect(&x), vec![1, 10, 2, 20]);
    }

    #[test]
    fn test_reducer_break_ends_every_segment() {
        let x = Xform::from_indexed(vec![1, 2]).concat(vec![3, 4]);
        let out = x.compile().fold_control(Vec::new(), |mut acc, v| {
            acc.push(v);
            if v == 3 {
                ControlFlow::Break(acc)
            } else {
                ControlFlow::Continue(acc)
            }
        });
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_three_segments_in_order() {
        let x = Xform::from_indexed(vec![1])
            .concat(vec![2])
            .concat_sequential(vec![3, 4]);
        assert_eq!(collect(&x), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_predicate_runs_once_per_element() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let x = Xform::from_indexed(vec![1, 2, 3, 4, 5]).filter(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v % 2 == 1
        });
        assert_eq!(collect(&x), vec![1, 3, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_same_output_with_and_without_push_down() {
        let x = Xform::from_sequential((1..=20).collect::<Vec<i32>>())
            .map(|v| v * 3)
            .drop(2)
            .filter(|v| v % 2 == 0)
            .take(4)
            .drop(1)
            .flat_map(|v| [v, -v])
            .take(5);
        let on = x.fold_with(CompileOptions::default(), Vec::new(), |mut a, v| {
            a.push(v);
            a
        });
        let off = x.fold_with(CompileOptions::without_push_down(), Vec::new(), |mut a, v| {
            a.push(v);
            a
        });
        assert_eq!(on, off);
        assert_eq!(on, vec![18, -18, 24, -24, 30]);
    }
}
