//! Element origins that feed a pipeline.
//!
//! An origin comes in one of three capability tiers:
//!
//! - **Indexed**: a sized, randomly addressable collection (`Vec`, `VecDeque`,
//!   `Arc<[T]>`, or any [`RandomAccess`] implementation).
//! - **Array**: a fixed array of elements. Compiled exactly like indexed.
//! - **Sequential**: a forward-only, single-pass sequence. The origin keeps a
//!   clonable `IntoIterator` so each fold gets its own fresh pass.
//!
//! Indexed and array origins let the compiler absorb `drop`/`take` by moving
//! a start/end index. Sequential origins can only record a pending skip and a
//! remaining-count ceiling.

use std::any::Any;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased element flowing through a compiled plan.
///
/// The box holds an `Option<T>` so a transform can move the value out and
/// write its result back into the same allocation when the element type
/// does not change. A `map` that keeps the type then costs no allocation per
/// element; one that changes the type, and every flat-map output, allocates
/// a fresh box. The typed [`Xform`](crate::Xform) front end guarantees every
/// op-code sees the element type it was built for.
pub(crate) type Item = Box<dyn Any>;

/// Type-erased forward-only pass over an origin.
pub(crate) type ItemIter = Box<dyn Iterator<Item = Item>>;

pub(crate) fn erase<T: 'static>(value: T) -> Item {
    Box::new(Some(value))
}

pub(crate) fn unerase<T: 'static>(mut item: Item) -> T {
    take_value(&mut item)
}

pub(crate) fn unerase_ref<T: 'static>(item: &Item) -> &T {
    match item.downcast_ref::<Option<T>>() {
        Some(Some(value)) => value,
        _ => unreachable!("pipeline element type mismatch"),
    }
}

/// Move the value out of `item`, leaving its allocation empty for reuse.
pub(crate) fn take_value<T: 'static>(item: &mut Item) -> T {
    match item.downcast_mut::<Option<T>>().and_then(Option::take) {
        Some(value) => value,
        None => unreachable!("pipeline element type mismatch"),
    }
}

/// Store `value` in the emptied `item` when the types match, otherwise box
/// it afresh.
pub(crate) fn refill<U: 'static>(mut item: Item, value: U) -> Item {
    if let Some(slot) = item.downcast_mut::<Option<U>>() {
        *slot = Some(value);
        return item;
    }
    erase(value)
}

/// A sized collection whose elements can be read by position.
///
/// `get` is only called with `index < len()`.
pub trait RandomAccess<T>: Send + Sync + 'static {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> T;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> RandomAccess<T> for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

impl<T: Clone + Send + Sync + 'static> RandomAccess<T> for VecDeque<T> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

impl<T: Clone + Send + Sync + 'static> RandomAccess<T> for Box<[T]> {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

impl<T: Clone + Send + Sync + 'static> RandomAccess<T> for Arc<[T]> {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

impl<T: Clone + Send + Sync + 'static, const N: usize> RandomAccess<T> for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

/// Erased view of a [`RandomAccess`] origin used by indexed cursors.
pub(crate) trait IndexedSource: Send + Sync {
    fn len(&self) -> usize;

    fn item(&self, index: usize) -> Item;
}

struct Indexed<S, T> {
    items: S,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T> IndexedSource for Indexed<S, T>
where
    S: RandomAccess<T>,
    T: 'static,
{
    fn len(&self) -> usize {
        self.items.len()
    }

    fn item(&self, index: usize) -> Item {
        erase(self.items.get(index))
    }
}

type PassFactory = dyn Fn() -> ItemIter + Send + Sync;

/// Which capability tier an origin was supplied as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginTier {
    Indexed,
    Array,
    Sequential,
}

#[derive(Clone)]
pub(crate) enum OriginKind {
    Indexed(Arc<dyn IndexedSource>),
    Sequential(Arc<PassFactory>),
}

/// An immutable, shareable element origin.
///
/// Cloning is cheap: the underlying collection is reference counted and
/// never mutated, so descriptions holding an origin can be folded repeatedly
/// and from several threads at once.
pub struct Origin<T> {
    pub(crate) kind: OriginKind,
    tier: OriginTier,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Origin<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            tier: self.tier,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Origin<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Origin").field("tier", &self.tier).finish()
    }
}

impl<T: 'static> Origin<T> {
    /// Origin over a sized, randomly addressable collection.
    pub fn indexed<S: RandomAccess<T>>(items: S) -> Self {
        Self::with_indexed(items, OriginTier::Indexed)
    }

    /// Origin over a fixed array.
    pub fn array<const N: usize>(items: [T; N]) -> Self
    where
        T: Clone + Send + Sync,
    {
        Self::with_indexed(items, OriginTier::Array)
    }

    /// Origin over a forward-only sequence.
    ///
    /// `items` is cloned once per fold and consumed front to back.
    pub fn sequential<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: 'static,
    {
        let factory = move || -> ItemIter { Box::new(items.clone().into_iter().map(erase)) };
        Self {
            kind: OriginKind::Sequential(Arc::new(factory)),
            tier: OriginTier::Sequential,
            _marker: PhantomData,
        }
    }

    fn with_indexed<S: RandomAccess<T>>(items: S, tier: OriginTier) -> Self {
        let source = Indexed {
            items,
            _marker: PhantomData,
        };
        Self {
            kind: OriginKind::Indexed(Arc::new(source)),
            tier,
            _marker: PhantomData,
        }
    }

    pub fn tier(&self) -> OriginTier {
        self.tier
    }
}

impl<T: Clone + Send + Sync + 'static> From<Vec<T>> for Origin<T> {
    fn from(items: Vec<T>) -> Self {
        Origin::indexed(items)
    }
}

impl<T: Clone + Send + Sync + 'static, const N: usize> From<[T; N]> for Origin<T> {
    fn from(items: [T; N]) -> Self {
        Origin::array(items)
    }
}
