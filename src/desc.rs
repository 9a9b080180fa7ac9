//! Pipeline descriptions.
//!
//! An [`Xform`] is an immutable, persistent chain of description nodes. Every
//! builder call wraps the receiver in a new node and leaves the receiver
//! untouched, so descriptions can be shared, extended in several directions
//! and folded any number of times. Nothing runs until a fold compiles the
//! chain into a fresh [`Plan`](crate::Plan).

use crate::compiler::{CompileOptions, Plan, compile};
use crate::error::{Result, XformError};
use crate::op::{Expander, Predicate, Step, Transform};
use crate::origin::{
    Item, ItemIter, Origin, OriginKind, RandomAccess, erase, refill, take_value, unerase,
    unerase_ref,
};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

/// What one description node adds to the chain.
pub(crate) enum Stage {
    Source(OriginKind),
    Drop(usize),
    Take(usize),
    Filter(Predicate),
    Map(Transform),
    MapWhile(Transform),
    FlatMap(Expander),
    Concat(OriginKind),
}

/// One description step. Every node but the source owns a reference to the
/// node it was built from.
pub(crate) struct Node {
    pub(crate) stage: Stage,
    prior: Option<Arc<Node>>,
}

impl Node {
    pub(crate) fn prior(&self) -> Option<&Arc<Node>> {
        self.prior.as_ref()
    }

    fn name(&self) -> &'static str {
        match self.stage {
            Stage::Source(_) => "SOURCE",
            Stage::Drop(_) => "DROP",
            Stage::Take(_) => "TAKE",
            Stage::Filter(_) => "FILTER",
            Stage::Map(_) => "MAP",
            Stage::MapWhile(_) => "MAPWHILE",
            Stage::FlatMap(_) => "FLATMAP",
            Stage::Concat(_) => "CONCAT",
        }
    }
}

// Unlink the prior chain one node at a time. The derived drop would recurse
// once per step and overflow the stack on long descriptions.
impl Drop for Node {
    fn drop(&mut self) {
        let mut prior = self.prior.take();
        while let Some(node) = prior {
            match Arc::into_inner(node) {
                Some(mut node) => prior = node.prior.take(),
                // Still shared by another description.
                None => break,
            }
        }
    }
}

/// Immutable description of a lazy transformation producing `T` elements.
///
/// ```
/// use xform_rs::Xform;
///
/// let out = Xform::from_indexed((1..=9).collect::<Vec<i32>>())
///     .filter(|x| x % 2 == 0)
///     .map(|x| x + 1)
///     .drop(2)
///     .flat_map(|x| [x, x * 10, x * 100])
///     .to_vec();
///
/// assert_eq!(out, vec![7, 70, 700, 9, 90, 900]);
/// ```
pub struct Xform<T> {
    node: Arc<Node>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Xform<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Xform<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut steps = Vec::new();
        let mut node = Some(&self.node);
        while let Some(current) = node {
            steps.push(current.name());
            node = current.prior();
        }
        steps.reverse();
        f.debug_tuple("Xform").field(&steps).finish()
    }
}

impl<T: 'static> Xform<T> {
    fn wrap<U>(stage: Stage, prior: Option<Arc<Node>>) -> Xform<U> {
        Xform {
            node: Arc::new(Node { stage, prior }),
            _marker: PhantomData,
        }
    }

    /// Describe `stage` on top of this description.
    fn then<U>(&self, stage: Stage) -> Xform<U> {
        Self::wrap(stage, Some(Arc::clone(&self.node)))
    }

    /// Description over any origin tier.
    pub fn from_origin(origin: Origin<T>) -> Self {
        Self::wrap(Stage::Source(origin.kind), None)
    }

    /// Description over a sized, randomly addressable collection.
    pub fn from_indexed<S: RandomAccess<T>>(items: S) -> Self {
        Self::from_origin(Origin::indexed(items))
    }

    /// Description over a fixed array.
    pub fn from_array<const N: usize>(items: [T; N]) -> Self
    where
        T: Clone + Send + Sync,
    {
        Self::from_origin(Origin::array(items))
    }

    /// Description over a forward-only sequence, re-read from a fresh clone
    /// on every fold.
    pub fn from_sequential<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: 'static,
    {
        Self::from_origin(Origin::sequential(items))
    }

    /// Skip the first `n` elements. `drop(a).drop(b)` behaves as `drop(a + b)`.
    pub fn drop(&self, n: usize) -> Self {
        self.then(Stage::Drop(n))
    }

    /// Keep at most `n` elements. `take(a).take(b)` behaves as `take(min(a, b))`.
    pub fn take(&self, n: usize) -> Self {
        self.then(Stage::Take(n))
    }

    /// Signed `drop`: rejects a negative amount right away.
    pub fn try_drop(&self, n: i64) -> Result<Self> {
        let n = checked_amount("drop", n)?;
        Ok(self.drop(n))
    }

    /// Signed `take`: rejects a negative amount right away.
    pub fn try_take(&self, n: i64) -> Result<Self> {
        let n = checked_amount("take", n)?;
        Ok(self.take(n))
    }

    /// Keep only elements for which `predicate` returns true.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(move |item: &Item| predicate(unerase_ref::<T>(item)));
        self.then(Stage::Filter(predicate))
    }

    /// Transform every element.
    pub fn map<U, F>(&self, f: F) -> Xform<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let transform: Transform = Arc::new(move |mut item: Item| {
            let value = f(take_value::<T>(&mut item));
            Step::Continue(refill(item, value))
        });
        self.then(Stage::Map(transform))
    }

    /// Transform elements until `f` returns [`Step::Stop`], which ends the
    /// stream at that point.
    pub fn map_while<U, F>(&self, f: F) -> Xform<U>
    where
        U: 'static,
        F: Fn(T) -> Step<U> + Send + Sync + 'static,
    {
        let transform: Transform = Arc::new(move |mut item: Item| {
            match f(take_value::<T>(&mut item)) {
                Step::Continue(value) => Step::Continue(refill(item, value)),
                Step::Stop => Step::Stop,
            }
        });
        self.then(Stage::MapWhile(transform))
    }

    /// Keep elements up to (not including) the first one failing `predicate`.
    pub fn take_while<F>(&self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.map_while(move |x| if predicate(&x) { Step::Continue(x) } else { Step::Stop })
    }

    /// Call `f` on every element that reaches this point, passing it on
    /// unchanged.
    pub fn inspect<F>(&self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.map(move |x| {
            f(&x);
            x
        })
    }

    /// Replace each element by the elements `f` produces for it.
    pub fn flat_map<U, I, F>(&self, f: F) -> Xform<U>
    where
        U: 'static,
        I: IntoIterator<Item = U>,
        I::IntoIter: 'static,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        let expander: Expander = Arc::new(move |item: Item| -> ItemIter {
            Box::new(f(unerase::<T>(item)).into_iter().map(erase))
        });
        self.then(Stage::FlatMap(expander))
    }

    /// Append another origin's elements after this description's output.
    ///
    /// Operations described after `concat` apply only to the appended
    /// elements; operations described before it never see them.
    pub fn concat(&self, origin: impl Into<Origin<T>>) -> Self {
        self.then(Stage::Concat(origin.into().kind))
    }

    /// `concat` for a forward-only sequence.
    pub fn concat_sequential<I>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: 'static,
    {
        self.concat(Origin::sequential(items))
    }

    /// Compile into a fresh, single-use plan with push-down enabled.
    pub fn compile(&self) -> Plan<T> {
        self.compile_with(CompileOptions::default())
    }

    pub fn compile_with(&self, options: CompileOptions) -> Plan<T> {
        compile(&self.node, options)
    }

    /// Left-fold every output element into an accumulator.
    pub fn fold<B, F>(&self, init: B, reducer: F) -> B
    where
        F: FnMut(B, T) -> B,
    {
        self.compile().fold(init, reducer)
    }

    pub fn fold_with<B, F>(&self, options: CompileOptions, init: B, reducer: F) -> B
    where
        F: FnMut(B, T) -> B,
    {
        self.compile_with(options).fold(init, reducer)
    }

    /// Fold until `stop_when` holds for the accumulator, then return it
    /// without reading further elements.
    pub fn fold_until<B, F, P>(&self, init: B, mut reducer: F, stop_when: P) -> B
    where
        F: FnMut(B, T) -> B,
        P: Fn(&B) -> bool,
    {
        self.compile().fold_control(init, |acc, x| {
            let acc = reducer(acc, x);
            if stop_when(&acc) {
                ControlFlow::Break(acc)
            } else {
                ControlFlow::Continue(acc)
            }
        })
    }

    /// Fold with a fallible reducer; the first error ends the fold.
    pub fn try_fold<B, E, F>(&self, init: B, mut reducer: F) -> std::result::Result<B, E>
    where
        F: FnMut(B, T) -> std::result::Result<B, E>,
    {
        self.compile().fold_control(Ok(init), |acc, x| match acc {
            Ok(acc) => match reducer(acc, x) {
                Ok(acc) => ControlFlow::Continue(Ok(acc)),
                Err(e) => ControlFlow::Break(Err(e)),
            },
            Err(e) => ControlFlow::Break(Err(e)),
        })
    }

    /// Collect the output into a `Vec`.
    pub fn to_vec(&self) -> Vec<T> {
        self.fold(Vec::new(), |mut acc, x| {
            acc.push(x);
            acc
        })
    }

    /// Number of output elements.
    pub fn count(&self) -> usize {
        self.fold(0, |n, _| n + 1)
    }
}

fn checked_amount(op: &'static str, amount: i64) -> Result<usize> {
    usize::try_from(amount).map_err(|_| XformError::NegativeAmount { op, amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> Xform<i32> {
        Xform::from_indexed(vec![1, 2, 3])
    }

    #[test]
    fn test_builders_do_not_mutate_receiver() {
        let base = src();
        let dropped = base.drop(1);
        let mapped = base.map(|x| x * 2);
        assert_eq!(base.to_vec(), vec![1, 2, 3]);
        assert_eq!(dropped.to_vec(), vec![2, 3]);
        assert_eq!(mapped.to_vec(), vec![2, 4, 6]);
    }

    #[test]
    fn test_try_drop_rejects_negative() {
        let err = src().try_drop(-1).unwrap_err();
        assert!(matches!(
            err,
            XformError::NegativeAmount {
                op: "drop",
                amount: -1
            }
        ));
    }

    #[test]
    fn test_try_take_rejects_negative() {
        let err = src().try_take(-5).unwrap_err();
        assert!(matches!(
            err,
            XformError::NegativeAmount {
                op: "take",
                amount: -5
            }
        ));
    }

    #[test]
    fn test_try_drop_and_take_accept_non_negative() {
        let x = src().try_drop(1).unwrap().try_take(1).unwrap();
        assert_eq!(x.to_vec(), vec![2]);
        assert_eq!(src().try_take(0).unwrap().to_vec(), Vec::<i32>::new());
    }

    #[test]
    fn test_map_changes_type() {
        let out = src().map(|x| format!("#{x}")).to_vec();
        assert_eq!(out, vec!["#1", "#2", "#3"]);
    }

    #[test]
    fn test_take_while() {
        let out = Xform::from_indexed(vec![1, 2, 5, 1]).take_while(|x| *x < 3).to_vec();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_take_while_then_drop_is_not_pushed_past() {
        let out = Xform::from_indexed(vec![5, 1, 2])
            .take_while(|x| *x < 3)
            .drop(2)
            .to_vec();
        assert!(out.is_empty());
    }

    #[test]
    fn test_map_while_changes_type() {
        let out = src()
            .map_while(|x| if x < 3 { Step::Continue(x as u8) } else { Step::Stop })
            .to_vec();
        assert_eq!(out, vec![1u8, 2u8]);
    }

    #[test]
    fn test_inspect_sees_surviving_elements() {
        use std::sync::Mutex;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let out = src()
            .inspect(move |x| sink.lock().unwrap().push(*x))
            .drop(1)
            .to_vec();
        assert_eq!(out, vec![2, 3]);
        // The drop is pushed to the source, so the dropped element is never inspected.
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_fold_until_stops_on_accumulator() {
        let total = Xform::from_indexed((1..=100).collect::<Vec<i32>>())
            .fold_until(0, |acc, x| acc + x, |acc| *acc >= 10);
        assert_eq!(total, 10);
    }

    #[test]
    fn test_try_fold_stops_at_first_error() {
        let res: std::result::Result<i32, String> = src().try_fold(0, |acc, x| {
            if x == 2 {
                Err(format!("bad {x}"))
            } else {
                Ok(acc + x)
            }
        });
        assert_eq!(res, Err("bad 2".to_string()));

        let ok: std::result::Result<i32, String> = src().try_fold(0, |acc, x| Ok(acc + x));
        assert_eq!(ok, Ok(6));
    }

    #[test]
    fn test_count() {
        assert_eq!(src().count(), 3);
        assert_eq!(src().filter(|x| *x > 1).count(), 2);
    }

    #[test]
    fn test_debug_lists_steps() {
        let x = src().drop(1).map(|x| x + 1).concat(vec![4]);
        assert_eq!(format!("{x:?}"), r#"Xform(["SOURCE", "DROP", "MAP", "CONCAT"])"#);
    }

    #[test]
    fn test_long_description_drops_without_recursion() {
        let mut x = src();
        for _ in 0..100_000 {
            x = x.map(|v| v);
        }
        assert_eq!(x.to_vec(), vec![1, 2, 3]);
        drop(x);
    }

    #[test]
    fn test_dropping_one_branch_keeps_shared_prefix() {
        let mut base = src();
        for _ in 0..100_000 {
            base = base.map(|v| v + 1);
        }
        let branch = base.take(1);
        drop(base);
        assert_eq!(branch.to_vec(), vec![100_001]);
        drop(branch);
    }

    #[test]
    fn test_description_is_send_and_sync() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<Xform<i32>>();
        assert_send_sync::<Xform<String>>();
    }
}
