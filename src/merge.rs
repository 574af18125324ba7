//! Ordered merge of two sorted streams
//!
//! This module walks two independently produced sequences in lockstep and
//! aligns their elements by key. It is the heart of the sync diff: one side
//! is the photo library, the other is the bucket listing, and every key in
//! the union of both shows up exactly once in the output.
//!
//! ## Overview
//!
//! Each input is wrapped in a [`SortedReader`], which holds a single
//! lookahead element and checks on every advance that keys are strictly
//! increasing. [`OrderedMerge`] compares the two lookahead keys and yields:
//!
//! - [`Aligned::Left`] when the key only exists on the left
//! - [`Aligned::Right`] when the key only exists on the right
//! - [`Aligned::Both`] when both sides carry the key
//!
//! Nothing is buffered beyond the one lookahead per side, so either input
//! may be backed by network pagination or be unbounded.
//!
//! ## Ordering violations
//!
//! Inputs that are not strictly increasing produce
//! [`SyncError::OutOfOrder`] naming both keys. Equal adjacent keys are a
//! violation too. After yielding an error the merge is fused and returns
//! `None` from then on.
//!
//! ## Examples
//!
//! ```rust
//! use photosync::merge::ordered_merge;
//!
//! let pairs: Vec<_> = ordered_merge(vec![1, 3, 4, 6], vec![2, 3, 5, 6])
//!     .map(|pair| pair.map(|p| p.into_options()))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(pairs, vec![
//!     (Some(1), None),
//!     (None, Some(2)),
//!     (Some(3), Some(3)),
//!     (Some(4), None),
//!     (None, Some(5)),
//!     (Some(6), Some(6)),
//! ]);
//! ```

use crate::error::{Result, SyncError};
use std::cmp::Ordering;
use std::fmt::Display;
use tracing::trace;

/// One output element of an ordered merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aligned<L, R> {
    /// Key present only in the left input
    Left(L),
    /// Key present only in the right input
    Right(R),
    /// Key present in both inputs
    Both(L, R),
}

impl<L, R> Aligned<L, R> {
    /// Left element, if any
    pub fn left(&self) -> Option<&L> {
        match self {
            Aligned::Left(l) | Aligned::Both(l, _) => Some(l),
            Aligned::Right(_) => None,
        }
    }

    /// Right element, if any
    pub fn right(&self) -> Option<&R> {
        match self {
            Aligned::Right(r) | Aligned::Both(_, r) => Some(r),
            Aligned::Left(_) => None,
        }
    }

    /// Convert into a pair where an absent side is `None`
    pub fn into_options(self) -> (Option<L>, Option<R>) {
        match self {
            Aligned::Left(l) => (Some(l), None),
            Aligned::Right(r) => (None, Some(r)),
            Aligned::Both(l, r) => (Some(l), Some(r)),
        }
    }
}

/// Holds the current element of a sorted stream
///
/// The first element is pulled lazily on first access. `advance` hands out
/// the current element and loads the next one, failing if the new key does
/// not strictly follow the old one.
pub struct SortedReader<I, F, T, K> {
    iter: I,
    key_fn: F,
    current: Option<(T, K)>,
    primed: bool,
}

impl<I, F, T, K> SortedReader<I, F, T, K>
where
    I: Iterator<Item = Result<T>>,
    F: FnMut(&T) -> K,
    K: Ord + Display,
{
    /// Wrap a stream and the function that extracts its ordering key
    pub fn new(iter: I, key_fn: F) -> Self {
        Self {
            iter,
            key_fn,
            current: None,
            primed: false,
        }
    }

    /// Current element, or `None` once the stream is exhausted
    pub fn current(&mut self) -> Result<Option<&T>> {
        self.prime()?;
        Ok(self.current.as_ref().map(|(item, _)| item))
    }

    /// Key of the current element
    pub fn current_key(&mut self) -> Result<Option<&K>> {
        self.prime()?;
        Ok(self.current.as_ref().map(|(_, key)| key))
    }

    /// Take the current element and move to the next one
    ///
    /// Returns `Ok(None)` if the stream was already exhausted.
    pub fn advance(&mut self) -> Result<Option<T>> {
        self.prime()?;
        let Some((item, key)) = self.current.take() else {
            return Ok(None);
        };

        let next = self.pull()?;
        if let Some((_, next_key)) = &next {
            if key >= *next_key {
                return Err(SyncError::OutOfOrder {
                    previous: key.to_string(),
                    next: next_key.to_string(),
                });
            }
        }
        self.current = next;
        Ok(Some(item))
    }

    fn prime(&mut self) -> Result<()> {
        if !self.primed {
            self.primed = true;
            self.current = self.pull()?;
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<(T, K)>> {
        match self.iter.next() {
            None => Ok(None),
            Some(item) => {
                let item = item?;
                let key = (self.key_fn)(&item);
                Ok(Some((item, key)))
            }
        }
    }
}

/// Lazy merge of two key-sorted streams
///
/// Created with [`OrderedMerge::new`], or through the [`ordered_merge`] and
/// [`ordered_merge_by_key`] helpers for infallible inputs.
pub struct OrderedMerge<IL, IR, FL, FR, L, R, K> {
    left: SortedReader<IL, FL, L, K>,
    right: SortedReader<IR, FR, R, K>,
    done: bool,
}

impl<IL, IR, FL, FR, L, R, K> OrderedMerge<IL, IR, FL, FR, L, R, K>
where
    IL: Iterator<Item = Result<L>>,
    IR: Iterator<Item = Result<R>>,
    FL: FnMut(&L) -> K,
    FR: FnMut(&R) -> K,
    K: Ord + Display,
{
    /// Merge two fallible streams, each with its own key function
    ///
    /// Both key functions must map into the same key space. Errors from
    /// either input are passed through and end the merge.
    pub fn new(left: IL, right: IR, left_key: FL, right_key: FR) -> Self {
        Self {
            left: SortedReader::new(left, left_key),
            right: SortedReader::new(right, right_key),
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<Aligned<L, R>>> {
        let ordering = match (self.left.current_key()?, self.right.current_key()?) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(left_key), Some(right_key)) => {
                trace!("Comparing {} with {}", left_key, right_key);
                left_key.cmp(right_key)
            }
        };

        let pair = match ordering {
            Ordering::Less => Aligned::Left(take(self.left.advance()?)?),
            Ordering::Greater => Aligned::Right(take(self.right.advance()?)?),
            Ordering::Equal => {
                let left = take(self.left.advance()?)?;
                let right = take(self.right.advance()?)?;
                Aligned::Both(left, right)
            }
        };
        Ok(Some(pair))
    }
}

impl<IL, IR, FL, FR, L, R, K> Iterator for OrderedMerge<IL, IR, FL, FR, L, R, K>
where
    IL: Iterator<Item = Result<L>>,
    IR: Iterator<Item = Result<R>>,
    FL: FnMut(&L) -> K,
    FR: FnMut(&R) -> K,
    K: Ord + Display,
{
    type Item = Result<Aligned<L, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn take<T>(item: Option<T>) -> Result<T> {
    item.ok_or_else(|| SyncError::internal("advanced an exhausted reader"))
}

/// Merge two sorted sequences whose elements are their own keys
pub fn ordered_merge<T, A, B>(left: A, right: B) -> impl Iterator<Item = Result<Aligned<T, T>>>
where
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
    T: Ord + Display + Clone,
{
    ordered_merge_by_key(left, right, T::clone)
}

/// Merge two sorted sequences of the same type under a shared key function
///
/// Elements on one side that map to the same key as an element on the other
/// side are paired, even if the elements themselves differ.
pub fn ordered_merge_by_key<T, K, A, B, F>(
    left: A,
    right: B,
    key: F,
) -> impl Iterator<Item = Result<Aligned<T, T>>>
where
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
    F: Fn(&T) -> K + Clone,
    K: Ord + Display,
{
    OrderedMerge::new(
        left.into_iter().map(Ok::<T, SyncError>),
        right.into_iter().map(Ok::<T, SyncError>),
        key.clone(),
        key,
    )
}
