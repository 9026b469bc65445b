//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use std::fmt::Debug;

/// Models a type that can act as a key for [`ArenaMap`](crate::arena::ArenaMap)
/// and [`SecondaryMap`](crate::arena::SecondaryMap).
///
/// Prefer the [`arena_key`](crate::arena_key) and [`dense_arena_key`](crate::dense_arena_key)
/// macros over implementing this directly. Register types implement it by hand
/// so that registers can index interval tables directly.
pub trait ArenaKey: Copy + Eq + Debug {
    /// Creates a key from an arena index.
    ///
    /// Panics if `index` does not fit in the key's storage type.
    fn new(index: usize) -> Self;

    /// Converts the key back into an arena index. This is lossless.
    fn index(self) -> usize;
}

/// Creates a type-safe key for an [`ArenaMap`](crate::arena::ArenaMap).
///
/// The storage type defaults to `usize` when none is given.
///
/// ```
/// # use trace_lsra::arena_key;
/// # use trace_lsra::arena::ArenaMap;
/// arena_key! {
///     /// A key with the default storage type.
///     pub struct TraceRef;
///
///     struct TinyRef(u8);
/// }
///
/// type Traces<V> = ArenaMap<TraceRef, V>;
/// type Tiny<V> = ArenaMap<TinyRef, V>;
/// ```
#[macro_export(local_inner_macros)]
macro_rules! arena_key {
    ( $(#[$outer:meta])* $vis:vis struct $name:ident($ty:ty); $($rest:tt)* ) => {
        $(#[$outer])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name($ty);

        impl $crate::arena::ArenaKey for $name {
            #[inline]
            fn new(index: usize) -> Self {
                use std::convert::TryInto;

                Self(index.try_into().expect("index is not representable with key type"))
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                std::write!(f, "{}({})", std::stringify!($name), self.0)
            }
        }

        arena_key!($($rest)*);
    };

    ( $(#[$outer:meta])* $vis:vis struct $name:ident; $($rest:tt)* ) => {
        arena_key! { $(#[$outer])* $vis struct $name(usize); $($rest)* }
    };

    () => {}
}

/// Same as [`arena_key`], but the storage type is always [`u32`].
///
/// ```
/// # use trace_lsra::dense_arena_key;
/// # use trace_lsra::arena::ArenaMap;
/// dense_arena_key! {
///     pub struct BlockRef;
/// }
///
/// type Blocks = ArenaMap<BlockRef, String>;
/// ```
#[macro_export(local_inner_macros)]
macro_rules! dense_arena_key {
    ( $(#[$outer:meta])* $vis:vis struct $name:ident; $($rest:tt)* ) => {
        arena_key! { $(#[$outer])* $vis struct $name(u32); }

        dense_arena_key!($($rest)*);
    };

    () => {}
}
