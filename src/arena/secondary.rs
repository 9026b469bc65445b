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
use crate::arena::{ArenaKey, ArenaMap};
use smallbitvec::SmallBitVec;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::{Index, IndexMut};
use std::{fmt, iter, mem};

/// A dense mapping `K -> V` where any key may be missing.
///
/// Unlike [`ArenaMap`], keys are not handed out by the map: the caller picks
/// them (e.g. a virtual register number) and the map grows to fit. Interval
/// tables are built on this, since an interval only exists once some operand
/// has referenced it.
///
/// ```
/// # use trace_lsra::arena_key;
/// # use trace_lsra::arena::*;
/// arena_key! { struct Player; }
///
/// let mut players = ArenaMap::new();
/// let p1: Player = players.insert("John");
/// let p2 = players.insert("Bob");
///
/// let mut ammo = SecondaryMap::with_primary(&players);
/// ammo.insert(p2, 50);
///
/// assert_eq!(ammo.get(p1), None);
/// assert_eq!(ammo[p2], 50);
/// assert_eq!(ammo.len(), 1);
/// ```
///
/// Slots are `MaybeUninit<V>`, a bitset records which ones hold a value.
pub struct SecondaryMap<K: ArenaKey, V> {
    slots: Vec<MaybeUninit<V>>,
    initialized: SmallBitVec,
    len: usize,
    _unused: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, V> SecondaryMap<K, V> {
    /// Creates an empty map.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::default(),
            initialized: SmallBitVec::default(),
            len: 0,
            _unused: PhantomData,
        }
    }

    /// Creates an empty map with slots for `capacity` keys already reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut map = Self::new();

        map.reserve(capacity);
        map
    }

    /// Creates an empty map with a slot for every key of `primary`.
    pub fn with_primary<T>(primary: &ArenaMap<K, T>) -> Self {
        Self::with_capacity(primary.len())
    }

    /// Checks if the map has a value for `key`.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.is_initialized(key.index())
    }

    /// Maps `key -> value`, returning the previous value if there was one.
    ///
    /// ```
    /// # use trace_lsra::arena_key;
    /// # use trace_lsra::arena::*;
    /// arena_key! { struct Key; }
    /// let mut map = SecondaryMap::new();
    /// let k = Key::new(7);
    ///
    /// assert_eq!(map.insert(k, 16), None);
    /// assert_eq!(map.insert(k, 13), Some(16));
    /// assert_eq!(map.capacity(), 8);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let idx = key.index();

        if idx == self.slots.len() {
            self.slots.push(MaybeUninit::new(value));
            self.initialized.push(true);
            self.len += 1;

            return None;
        }

        if idx > self.slots.len() {
            self.reserve(idx - self.slots.len() + 1);
        }

        if self.is_initialized(idx) {
            // SAFETY: the bitset says the slot holds a value
            let current = unsafe { self.slots[idx].assume_init_mut() };

            Some(mem::replace(current, value))
        } else {
            self.initialized.set(idx, true);
            self.slots[idx] = MaybeUninit::new(value);
            self.len += 1;

            None
        }
    }

    /// Gets the value for `key`, inserting `f()` first if there isn't one.
    pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> &mut V {
        if !self.contains(key) {
            self.insert(key, f());
        }

        // SAFETY: either it was already initialized or we just inserted
        unsafe { self.slots[key.index()].assume_init_mut() }
    }

    /// Gets the value for `key`, if there is one.
    pub fn get(&self, key: K) -> Option<&V> {
        if self.is_initialized(key.index()) {
            // SAFETY: the bitset says the slot holds a value
            Some(unsafe { self.slots[key.index()].assume_init_ref() })
        } else {
            None
        }
    }

    /// Gets the value for `key` mutably, if there is one.
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        if self.is_initialized(key.index()) {
            // SAFETY: the bitset says the slot holds a value
            Some(unsafe { self.slots[key.index()].assume_init_mut() })
        } else {
            None
        }
    }

    /// Removes the value for `key` and returns it, if there was one.
    pub fn take(&mut self, key: K) -> Option<V> {
        let idx = key.index();

        if !self.is_initialized(idx) {
            return None;
        }

        let old = mem::replace(&mut self.slots[idx], MaybeUninit::uninit());

        self.initialized.set(idx, false);
        self.len -= 1;

        // SAFETY: the bitset said the slot held a value, and we just cleared it
        Some(unsafe { old.assume_init() })
    }

    /// Adds `additional` empty slots to the end of the map.
    ///
    /// The capacity of a [`SecondaryMap`] is the number of keys it has slots
    /// for, not the capacity of its allocation.
    #[cold]
    pub fn reserve(&mut self, additional: usize) {
        self.initialized.extend(iter::repeat(false).take(additional));
        self.slots
            .extend(iter::repeat_with(MaybeUninit::uninit).take(additional));
    }

    /// The number of keys the map has slots for.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of keys that have values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no key has a value.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every key with a value, in increasing order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = K> + '_ {
        (0..self.slots.len())
            .filter(|&i| self.is_initialized(i))
            .map(K::new)
    }

    /// Every value, in key order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Every value, in key order, mutably.
    pub fn values_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }

    /// Every `(key, value)` pair, in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (K, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_initialized(*i))
            // SAFETY: filtered down to initialized slots
            .map(|(i, slot)| (K::new(i), unsafe { slot.assume_init_ref() }))
    }

    /// Every `(key, value)` pair, in key order, mutably.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = (K, &mut V)> + '_ {
        let initialized = &self.initialized;

        self.slots
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| initialized.get(*i) == Some(true))
            // SAFETY: filtered down to initialized slots
            .map(|(i, slot)| (K::new(i), unsafe { slot.assume_init_mut() }))
    }

    #[inline]
    fn is_initialized(&self, index: usize) -> bool {
        debug_assert_eq!(self.initialized.len(), self.slots.len());

        self.initialized.get(index) == Some(true)
    }
}

impl<K: ArenaKey, V> Drop for SecondaryMap<K, V> {
    fn drop(&mut self) {
        if !mem::needs_drop::<V>() {
            return;
        }

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if self.initialized.get(i) == Some(true) {
                // SAFETY: the slot holds a value and is never read again
                unsafe { slot.assume_init_drop() }
            }
        }
    }
}

impl<K: ArenaKey, V> Index<K> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, key: K) -> &Self::Output {
        self.get(key)
            .expect("tried to access invalid key on `SecondaryMap`")
    }
}

impl<K: ArenaKey, V> IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut Self::Output {
        self.get_mut(key)
            .expect("tried to access invalid key on `SecondaryMap`")
    }
}

impl<K: ArenaKey, V: Clone> Clone for SecondaryMap<K, V> {
    fn clone(&self) -> Self {
        let mut copy = Self::with_capacity(self.capacity());

        for (k, v) in self.iter() {
            copy.insert(k, v.clone());
        }

        copy
    }
}

impl<K: ArenaKey, V> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, V: PartialEq> PartialEq for SecondaryMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: ArenaKey, V: Eq> Eq for SecondaryMap<K, V> {}

impl<K: ArenaKey, V: Debug> Debug for SecondaryMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        arena::debug_write_map(f, "SecondaryMap", self.iter())
    }
}
