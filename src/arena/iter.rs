//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::ArenaKey;
use std::iter::{Enumerate, FusedIterator};
use std::marker::PhantomData;

macro_rules! pair_iter_impl {
    ($name:ident, $inner:ty, $t:ty $(, $lt:lifetime)*) => {
        impl<$($lt, )* K: ArenaKey, V> $name<$($lt, )* K, V> {
            pub(crate) fn with_inner(inner: $inner) -> Self {
                Self {
                    inner: inner.enumerate(),
                    _unused: PhantomData,
                }
            }
        }

        impl<$($lt, )* K: ArenaKey, V> Iterator for $name<$($lt, )* K, V> {
            type Item = (K, $t);

            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next().map(|(i, val)| (K::new(i), val))
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl<$($lt, )* K: ArenaKey, V> DoubleEndedIterator for $name<$($lt, )* K, V> {
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back().map(|(i, val)| (K::new(i), val))
            }
        }

        impl<$($lt, )* K: ArenaKey, V> ExactSizeIterator for $name<$($lt, )* K, V> {}

        impl<$($lt, )* K: ArenaKey, V> FusedIterator for $name<$($lt, )* K, V> {}
    }
}

/// Owning iterator over the `(key, value)` pairs of an [`ArenaMap`](crate::arena::ArenaMap).
#[derive(Debug)]
pub struct IntoIter<K: ArenaKey, V> {
    inner: Enumerate<std::vec::IntoIter<V>>,
    _unused: PhantomData<fn() -> K>,
}

pair_iter_impl!(IntoIter, std::vec::IntoIter<V>, V);

/// Iterator over `(key, &value)` pairs of an [`ArenaMap`](crate::arena::ArenaMap).
#[derive(Debug)]
pub struct Iter<'a, K: ArenaKey, V> {
    inner: Enumerate<std::slice::Iter<'a, V>>,
    _unused: PhantomData<fn() -> K>,
}

pair_iter_impl!(Iter, std::slice::Iter<'a, V>, &'a V, 'a);

/// Iterator over `(key, &mut value)` pairs of an [`ArenaMap`](crate::arena::ArenaMap).
#[derive(Debug)]
pub struct IterMut<'a, K: ArenaKey, V> {
    inner: Enumerate<std::slice::IterMut<'a, V>>,
    _unused: PhantomData<fn() -> K>,
}

pair_iter_impl!(IterMut, std::slice::IterMut<'a, V>, &'a mut V, 'a);

/// Iterates over every key in `[0, len)` in increasing order.
///
/// ```
/// # use trace_lsra::arena_key;
/// # use trace_lsra::arena::*;
/// arena_key! { struct K; }
/// let mut map = ArenaMap::<K, i32>::new();
/// let k1 = map.insert(1);
/// let k2 = map.insert(2);
/// let mut keys = map.keys();
/// assert_eq!(keys.next(), Some(k1));
/// assert_eq!(keys.next_back(), Some(k2));
/// assert_eq!(keys.next(), None);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Keys<K: ArenaKey> {
    pos: usize,
    reverse_pos: usize,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey> Keys<K> {
    pub(crate) fn with_len(len: usize) -> Self {
        Self {
            pos: 0,
            reverse_pos: len,
            _unused: PhantomData,
        }
    }
}

impl<K: ArenaKey> Iterator for Keys<K> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos < self.reverse_pos {
            self.pos += 1;

            Some(K::new(self.pos - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.reverse_pos - self.pos;

        (size, Some(size))
    }
}

impl<K: ArenaKey> DoubleEndedIterator for Keys<K> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.pos < self.reverse_pos {
            self.reverse_pos -= 1;

            Some(K::new(self.reverse_pos))
        } else {
            None
        }
    }
}

impl<K: ArenaKey> ExactSizeIterator for Keys<K> {}

impl<K: ArenaKey> FusedIterator for Keys<K> {}
