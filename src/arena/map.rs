//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena;
use crate::arena::{IntoIter, Iter, IterMut, Keys};
use crate::arena::ArenaKey;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::{fmt, slice};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The primary mapping of `K -> V`. Every other map keyed by `K` should be a
/// [`SecondaryMap`](super::SecondaryMap).
///
/// This is a typed wrapper around `Vec<V>` that can only be indexed by `K`.
/// Values are never removed, so keys stay valid for as long as the map lives.
///
/// ```
/// # use trace_lsra::arena_key;
/// # use trace_lsra::arena::ArenaMap;
/// arena_key! {
///     struct Name;
/// }
///
/// let mut names = ArenaMap::new();
/// let n: Name = names.insert("b0");
///
/// assert_eq!(names[n], "b0");
/// ```
#[derive(Clone)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ArenaMap<K: ArenaKey, V> {
    slots: Vec<V>,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, V> ArenaMap<K, V> {
    /// Creates a new, empty arena.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::default(),
            _unused: PhantomData,
        }
    }

    /// Creates an empty arena with room for `capacity` values.
    ///
    /// ```
    /// # use trace_lsra::arena_key;
    /// # use trace_lsra::arena::*;
    /// # arena_key! { struct Key; }
    /// let mut map = ArenaMap::with_capacity(10);
    /// assert!(map.capacity() >= 10);
    /// # let k1: Key = map.insert(5);
    /// ```
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            _unused: PhantomData,
        }
    }

    /// Checks if `key` has been returned from [`Self::insert`].
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        key.index() < self.slots.len()
    }

    /// Gets the value for `key`, if it exists.
    #[inline]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key.index())
    }

    /// Gets the value for `key` mutably, if it exists.
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key.index())
    }

    /// Adds a value and returns the key that refers to it.
    #[inline]
    pub fn insert(&mut self, value: V) -> K {
        self.slots.push(value);

        K::new(self.slots.len() - 1)
    }

    /// Gets the key that the next [`Self::insert`] will return.
    ///
    /// ```
    /// # use trace_lsra::arena_key;
    /// # use trace_lsra::arena::*;
    /// # arena_key! { struct Key; }
    /// let mut map = ArenaMap::default();
    /// let k1: Key = map.next_key();
    /// assert!(!map.contains(k1));
    ///
    /// let k2 = map.insert(0);
    /// assert_eq!(k1, k2);
    /// ```
    #[inline]
    pub fn next_key(&self) -> K {
        K::new(self.slots.len())
    }

    /// The number of values in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The number of values the arena can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Reserves space for at least `additional` more values.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional)
    }

    /// Every valid key, in increasing order.
    pub fn keys(&self) -> Keys<K> {
        Keys::with_len(self.slots.len())
    }

    /// Every value, in key order.
    pub fn values(&self) -> slice::Iter<'_, V> {
        self.slots.iter()
    }

    /// Every value, in key order, mutably.
    pub fn values_mut(&mut self) -> slice::IterMut<'_, V> {
        self.slots.iter_mut()
    }

    /// Every `(key, value)` pair, in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::with_inner(self.slots.iter())
    }

    /// Every `(key, value)` pair, in key order, mutably.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::with_inner(self.slots.iter_mut())
    }
}

impl<K: ArenaKey, V> IntoIterator for ArenaMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::with_inner(self.slots.into_iter())
    }
}

impl<K: ArenaKey, V> FromIterator<V> for ArenaMap<K, V> {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self {
            slots: Vec::from_iter(iter),
            _unused: PhantomData,
        }
    }
}

impl<K: ArenaKey, V> Default for ArenaMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, V: PartialEq> PartialEq for ArenaMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
    }
}

impl<K: ArenaKey, V: Eq> Eq for ArenaMap<K, V> {}

impl<K: ArenaKey, V: Debug> Debug for ArenaMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        arena::debug_write_map(f, "ArenaMap", self.iter())
    }
}

impl<K: ArenaKey, V> Index<K> for ArenaMap<K, V> {
    type Output = V;

    fn index(&self, key: K) -> &Self::Output {
        self.slots
            .get(key.index())
            .expect("tried to access invalid key on `ArenaMap`")
    }
}

impl<K: ArenaKey, V> IndexMut<K> for ArenaMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut Self::Output {
        self.slots
            .get_mut(key.index())
            .expect("tried to access invalid key on `ArenaMap`")
    }
}
