//! Summaries of compiled plans.
//!
//! These types record what the compiler produced for each segment: the
//! cursor window or skip/ceiling it recorded, and the op-codes left in the
//! segment after push-down. The CLI prints them with `--explain`.

use crate::compiler::Segment;
use crate::cursor::SourceCursor;
use crate::op::OpKind;
use std::fmt;

/// Cursor state of one segment before the fold starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceWindow {
    /// Indexed cursor reading `[start, end)`.
    Indexed { start: usize, end: usize },
    /// Sequential cursor that skips `skip` elements and then reads at most
    /// `limit` (unbounded when `None`).
    Sequential { skip: usize, limit: Option<usize> },
}

impl fmt::Display for SourceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceWindow::Indexed { start, end } => write!(f, "INDEXED [{start}..{end})"),
            SourceWindow::Sequential { skip, limit } => {
                write!(f, "SEQUENTIAL skip={skip}")?;
                match limit {
                    Some(n) => write!(f, " limit={n}"),
                    None => Ok(()),
                }
            }
        }
    }
}

/// One segment of a compiled plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub source: SourceWindow,
    pub ops: Vec<OpKind>,
}

impl SegmentSummary {
    pub(crate) fn of(segment: &Segment) -> Self {
        let source = match &segment.cursor {
            SourceCursor::Indexed(c) => {
                let (start, end) = c.window();
                SourceWindow::Indexed { start, end }
            }
            SourceCursor::Sequential(c) => {
                let (skip, limit) = c.bounds();
                SourceWindow::Sequential { skip, limit }
            }
        };
        let ops = segment.ops.iter().map(|op| op.kind()).collect();
        Self { source, ops }
    }
}

/// Every segment of a compiled plan, head first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub segments: Vec<SegmentSummary>,
}

impl PlanSummary {
    /// Total op-codes across all segments.
    pub fn op_count(&self) -> usize {
        self.segments.iter().map(|s| s.ops.len()).sum()
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "segment {i}: {}", segment.source)?;
            for op in &segment.ops {
                write!(f, " | {op}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Xform;

    #[test]
    fn test_window_display() {
        let w = SourceWindow::Indexed { start: 1, end: 4 };
        assert_eq!(w.to_string(), "INDEXED [1..4)");
        let s = SourceWindow::Sequential {
            skip: 2,
            limit: None,
        };
        assert_eq!(s.to_string(), "SEQUENTIAL skip=2");
        let s = SourceWindow::Sequential {
            skip: 0,
            limit: Some(3),
        };
        assert_eq!(s.to_string(), "SEQUENTIAL skip=0 limit=3");
    }

    #[test]
    fn test_plan_display() {
        let summary = Xform::from_indexed(vec![1, 2, 3])
            .filter(|x| *x > 1)
            .take(1)
            .concat_sequential(vec![4, 5])
            .drop(1)
            .compile()
            .summary();
        assert_eq!(
            summary.to_string(),
            "segment 0: INDEXED [0..3) | FILTER | TAKE 1\nsegment 1: SEQUENTIAL skip=1"
        );
        assert_eq!(summary.op_count(), 2);
    }

    #[test]
    fn test_summary_of_empty_chain_of_ops() {
        let summary = Xform::from_array([1, 2]).compile().summary();
        assert_eq!(summary.segments.len(), 1);
        assert_eq!(summary.op_count(), 0);
    }
}
