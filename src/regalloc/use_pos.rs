//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use smallvec::SmallVec;
use std::fmt;
use std::fmt::{Display, Formatter};

/// How badly an operand wants to be in a register at some position.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterPriority {
    /// Any location works, including a stack slot
    None,
    /// A register is preferred, but a stack slot is accepted
    ShouldHaveRegister,
    /// The operand must be in a register
    MustHaveRegister,
}

impl Display for RegisterPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterPriority::None => "none",
            RegisterPriority::ShouldHaveRegister => "should",
            RegisterPriority::MustHaveRegister => "must",
        };

        f.write_str(name)
    }
}

/// The use positions of a single interval, highest position first.
///
/// Lifetime analysis walks code backwards, so positions only ever get
/// appended at the low end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsePosList {
    positions: SmallVec<[i32; 4]>,
    priorities: SmallVec<[RegisterPriority; 4]>,
}

impl UsePosList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a use position.
    ///
    /// Panics unless `pos` is strictly below every position already in the list.
    pub fn add(&mut self, pos: i32, priority: RegisterPriority) {
        if let Some(&last) = self.positions.last() {
            assert!(
                last > pos,
                "use positions must be added in descending order: {pos} after {last}"
            );
        }

        self.positions.push(pos);
        self.priorities.push(priority);
    }

    /// The number of use positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no use positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The `i`th position. Index 0 is the highest.
    #[inline]
    pub fn use_pos_at(&self, i: usize) -> i32 {
        self.positions[i]
    }

    /// The priority of the `i`th position.
    #[inline]
    pub fn priority_at(&self, i: usize) -> RegisterPriority {
        self.priorities[i]
    }

    /// Replaces the priority of the `i`th position.
    #[inline]
    pub fn set_priority_at(&mut self, i: usize, priority: RegisterPriority) {
        self.priorities[i] = priority;
    }

    /// The lowest position, i.e. the one added last.
    #[inline]
    pub fn lowest(&self) -> Option<(i32, RegisterPriority)> {
        Some((*self.positions.last()?, *self.priorities.last()?))
    }

    /// Drops the position closest to the start of the method.
    pub fn remove_lowest_use_pos(&mut self) {
        self.positions.pop();
        self.priorities.pop();
    }

    /// Moves every position `>= pos` into a new list, leaving the ones below
    /// `pos` in `self`.
    pub fn split_at(&mut self, pos: i32) -> UsePosList {
        let n = self.positions.iter().take_while(|&&p| p >= pos).count();

        UsePosList {
            positions: self.positions.drain(..n).collect(),
            priorities: self.priorities.drain(..n).collect(),
        }
    }

    /// Every `(position, priority)` pair, highest position first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (i32, RegisterPriority)> + '_ {
        self.positions
            .iter()
            .copied()
            .zip(self.priorities.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RegisterPriority::*;

    #[test]
    fn descending_append() {
        let mut list = UsePosList::new();

        list.add(10, MustHaveRegister);
        list.add(6, ShouldHaveRegister);
        list.add(3, None);

        assert_eq!(list.len(), 3);
        assert_eq!(list.use_pos_at(0), 10);
        assert_eq!(list.priority_at(1), ShouldHaveRegister);
        assert_eq!(list.lowest(), Some((3, None)));

        for i in 0..list.len() - 1 {
            assert!(list.use_pos_at(i) > list.use_pos_at(i + 1));
        }
    }

    #[test]
    #[should_panic(expected = "descending order")]
    fn equal_position_panics() {
        let mut list = UsePosList::new();

        list.add(4, None);
        list.add(4, MustHaveRegister);
    }

    #[test]
    #[should_panic(expected = "descending order")]
    fn ascending_position_panics() {
        let mut list = UsePosList::new();

        list.add(4, None);
        list.add(8, None);
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(None < ShouldHaveRegister);
        assert!(ShouldHaveRegister < MustHaveRegister);
    }

    #[test]
    fn remove_and_set() {
        let mut list = UsePosList::new();

        list.add(8, None);
        list.add(2, None);
        list.set_priority_at(0, MustHaveRegister);
        list.remove_lowest_use_pos();

        assert_eq!(list.iter().collect::<Vec<_>>(), [(8, MustHaveRegister)]);

        list.remove_lowest_use_pos();
        list.remove_lowest_use_pos();

        assert!(list.is_empty());
    }

    #[test]
    fn split() {
        let mut list = UsePosList::new();

        for pos in [12, 10, 6, 4] {
            list.add(pos, MustHaveRegister);
        }

        let upper = list.split_at(6);

        assert_eq!(upper.iter().map(|(p, _)| p).collect::<Vec<_>>(), [12, 10, 6]);
        assert_eq!(list.iter().map(|(p, _)| p).collect::<Vec<_>>(), [4]);
    }
}
