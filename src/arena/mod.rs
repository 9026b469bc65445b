//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Typed, index-stable arenas.
//!
//! Everything the allocator hands out to collaborators is an index into one
//! of these maps rather than a reference: blocks, instructions and intervals
//! are all named by small `Copy` keys. The maps only ever grow, so a key that
//! was valid once stays valid for the lifetime of the map.
//!
//! ```
//! # use trace_lsra::arena_key;
//! # use trace_lsra::arena::*;
//! arena_key! {
//!     pub struct Node;
//! }
//!
//! let mut nodes = ArenaMap::new();
//! let entry: Node = nodes.insert("entry");
//! let exit = nodes.insert("exit");
//!
//! let mut depth = SecondaryMap::new();
//! depth.insert(exit, 1);
//!
//! assert_eq!(nodes[entry], "entry");
//! assert_eq!(depth.get(entry), None);
//! assert_eq!(depth[exit], 1);
//! ```

mod iter;
mod key;
mod map;
mod secondary;

pub use iter::*;
pub use key::ArenaKey;
pub use map::ArenaMap;
pub use secondary::SecondaryMap;

use std::fmt;
use std::fmt::{Debug, Formatter};

pub(in crate::arena) fn debug_write_map<'a, K, V>(
    f: &mut Formatter<'_>,
    name: &'static str,
    it: impl Iterator<Item = (K, &'a V)>,
) -> fmt::Result
where
    K: ArenaKey,
    V: Debug + 'a,
{
    write!(f, "{name} ")?;

    f.debug_map().entries(it).finish()
}
