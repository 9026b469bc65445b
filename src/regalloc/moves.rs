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
use crate::lir::{Block, Constant, Location, ValueKind};
use std::fmt;
use std::fmt::{Display, Formatter};

/// One side of a move that data-flow resolution wants to insert.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveOperand {
    /// A register or stack slot
    Location(Location),
    /// A temporary introduced to break a cycle of moves. Each one is only
    /// live between two moves of the same insertion point.
    Scratch(u32),
    /// A constant being materialized. Only ever a source.
    Constant(Constant),
}

impl Display for MoveOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MoveOperand::Location(loc) => write!(f, "{loc}"),
            MoveOperand::Scratch(n) => write!(f, "scratch{n}"),
            MoveOperand::Constant(c) => write!(f, "{c}"),
        }
    }
}

/// A single `to <- from` copy.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationMove {
    /// What is copied
    pub from: MoveOperand,
    /// Where it is copied to
    pub to: MoveOperand,
    /// The kind of value being copied
    pub kind: ValueKind,
}

impl Display for LocationMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} = move {}", self.to, self.kind, self.from)
    }
}

/// A sequence of moves to insert at one point in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveInsertion {
    /// The block to insert into
    pub block: Block,
    /// The index of the instruction the moves go in front of
    pub index: usize,
    /// The moves, in the order they have to execute in
    pub moves: Vec<LocationMove>,
}

/// Every move data-flow resolution produced for a trace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedMoves {
    insertions: Vec<MoveInsertion>,
}

impl ResolvedMoves {
    /// Every insertion point, in the order they were resolved in.
    pub fn insertions(&self) -> &[MoveInsertion] {
        &self.insertions
    }

    /// Whether nothing needs to be inserted at all.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
    }

    /// The total number of moves.
    pub fn move_count(&self) -> usize {
        self.insertions.iter().map(|i| i.moves.len()).sum()
    }

    /// The moves going into `block`, as `(index, moves)` pairs.
    pub fn moves_for(&self, block: Block) -> impl Iterator<Item = (usize, &[LocationMove])> + '_ {
        self.insertions
            .iter()
            .filter(move |i| i.block == block)
            .map(|i| (i.index, i.moves.as_slice()))
    }
}

impl Display for ResolvedMoves {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for insertion in self.insertions.iter() {
            writeln!(f, "b{}[{}]:", insertion.block.index(), insertion.index)?;

            for mov in insertion.moves.iter() {
                writeln!(f, "  {mov}")?;
            }
        }

        Ok(())
    }
}

/// Collects the moves needed on control-flow edges and turns them into
/// something that can be inserted.
///
/// Mappings are added for one insertion point at a time: set the position,
/// add every mapping, then resolve them before moving on.
pub trait MoveResolver {
    /// Sets where the moves of the next batch will be inserted.
    fn set_insert_position(&mut self, block: Block, index: usize);

    /// Records that the value in `from` needs to be in `to`.
    fn add_mapping(&mut self, from: MoveOperand, to: Location, kind: ValueKind);

    /// Whether any mappings are waiting to be resolved.
    fn has_mappings(&self) -> bool;

    /// Resolves the pending mappings at the current insertion point.
    fn resolve_and_append_moves(&mut self);
}

/// The default [`MoveResolver`]. Every batch of mappings is treated as one
/// parallel copy and sequentialized so that no source is overwritten
/// before it is read.
#[derive(Debug, Default)]
pub struct ParallelMoveResolver {
    position: Option<(Block, usize)>,
    pending: Vec<LocationMove>,
    resolved: ResolvedMoves,
    next_scratch: u32,
}

impl ParallelMoveResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every move resolved so far.
    pub fn finish(self) -> ResolvedMoves {
        debug_assert!(self.pending.is_empty(), "unresolved mappings left behind");

        self.resolved
    }
}

impl MoveResolver for ParallelMoveResolver {
    fn set_insert_position(&mut self, block: Block, index: usize) {
        debug_assert!(self.pending.is_empty(), "insert position changed with pending mappings");

        self.position = Some((block, index));
    }

    fn add_mapping(&mut self, from: MoveOperand, to: Location, kind: ValueKind) {
        self.pending.push(LocationMove {
            from,
            to: MoveOperand::Location(to),
            kind,
        });
    }

    fn has_mappings(&self) -> bool {
        !self.pending.is_empty()
    }

    fn resolve_and_append_moves(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let (block, index) = self
            .position
            .expect("mappings added without an insert position");

        let pending = std::mem::take(&mut self.pending);
        let moves = sequentialize(pending, &mut self.next_scratch);

        for mov in moves.iter() {
            log::trace!("{block:?}[{index}]: {mov}");
        }

        self.resolved.insertions.push(MoveInsertion {
            block,
            index,
            moves,
        });
    }
}

/// Orders a parallel copy into a sequence of copies with the same effect.
///
/// A copy `b <- a` can go as soon as nothing left to do still reads `b`.
/// When every remaining copy is blocked they are all part of cycles, and
/// one of them is broken by moving its source into a scratch location.
pub fn sequentialize(moves: Vec<LocationMove>, next_scratch: &mut u32) -> Vec<LocationMove> {
    let mut pending: Vec<LocationMove> = moves.into_iter().filter(|m| m.from != m.to).collect();
    let mut seq = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let mut emitted_any = false;
        let mut i = 0;

        while i < pending.len() {
            let to = pending[i].to;

            if pending.iter().any(|m| m.from == to) {
                i += 1;
                continue;
            }

            seq.push(pending.swap_remove(i));
            emitted_any = true;
        }

        if !emitted_any {
            let blocked = pending
                .pop()
                .expect("non-empty list of moves became empty");
            let scratch = MoveOperand::Scratch(*next_scratch);

            *next_scratch += 1;

            // `b <- a` becomes `scratch <- a` now and `b <- scratch` later
            seq.push(LocationMove {
                from: blocked.from,
                to: scratch,
                kind: blocked.kind,
            });
            pending.push(LocationMove {
                from: scratch,
                ..blocked
            });
        }
    }

    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{PReg, StackSlot};
    use crate::utility::SaHashMap;

    fn reg(n: usize) -> MoveOperand {
        MoveOperand::Location(Location::Register(PReg::int(n)))
    }

    fn mov(from: MoveOperand, to: MoveOperand) -> LocationMove {
        LocationMove {
            from,
            to,
            kind: ValueKind::I64,
        }
    }

    // runs the moves on a fake machine and returns the final state
    fn execute(moves: &[LocationMove], init: &[(MoveOperand, i64)]) -> SaHashMap<MoveOperand, i64> {
        let mut state: SaHashMap<MoveOperand, i64> = init.iter().copied().collect();

        for m in moves {
            let value = match m.from {
                MoveOperand::Constant(c) => c.bits(),
                other => state[&other],
            };

            state.insert(m.to, value);
        }

        state
    }

    #[test]
    fn independent_moves_pass_through() {
        let moves = vec![mov(reg(0), reg(1)), mov(reg(2), reg(3))];
        let mut scratch = 0;
        let seq = sequentialize(moves.clone(), &mut scratch);

        assert_eq!(seq.len(), 2);
        assert_eq!(scratch, 0);
    }

    #[test]
    fn chains_are_ordered() {
        // r2 <- r1, r1 <- r0: r1 must be read before it is written
        let moves = vec![mov(reg(1), reg(2)), mov(reg(0), reg(1))];
        let seq = sequentialize(moves, &mut 0);
        let state = execute(&seq, &[(reg(0), 10), (reg(1), 11)]);

        assert_eq!(state[&reg(2)], 11);
        assert_eq!(state[&reg(1)], 10);
    }

    #[test]
    fn swaps_use_a_scratch() {
        let moves = vec![mov(reg(0), reg(1)), mov(reg(1), reg(0))];
        let mut scratch = 0;
        let seq = sequentialize(moves, &mut scratch);
        let state = execute(&seq, &[(reg(0), 1), (reg(1), 2)]);

        assert_eq!(seq.len(), 3);
        assert_eq!(scratch, 1);
        assert_eq!(state[&reg(0)], 2);
        assert_eq!(state[&reg(1)], 1);
    }

    #[test]
    fn rotations_and_fan_out() {
        let slot = MoveOperand::Location(Location::Stack(StackSlot::local(8)));
        let moves = vec![
            mov(reg(0), reg(1)),
            mov(reg(1), reg(2)),
            mov(reg(2), reg(0)),
            mov(reg(0), slot),
            mov(MoveOperand::Constant(Constant::new(ValueKind::I64, 7)), reg(3)),
        ];
        let seq = sequentialize(moves, &mut 0);
        let state = execute(&seq, &[(reg(0), 1), (reg(1), 2), (reg(2), 3)]);

        assert_eq!(state[&reg(1)], 1);
        assert_eq!(state[&reg(2)], 2);
        assert_eq!(state[&reg(0)], 3);
        assert_eq!(state[&slot], 1);
        assert_eq!(state[&reg(3)], 7);
    }

    #[test]
    fn self_moves_are_dropped() {
        assert!(sequentialize(vec![mov(reg(0), reg(0))], &mut 0).is_empty());
    }

    #[test]
    fn resolver_batches_by_position() {
        let mut resolver = ParallelMoveResolver::new();
        let r = |n| Location::Register(PReg::int(n));

        resolver.set_insert_position(Block::new(0), 3);
        resolver.add_mapping(reg(0), r(1), ValueKind::I64);
        assert!(resolver.has_mappings());
        resolver.resolve_and_append_moves();
        assert!(!resolver.has_mappings());

        resolver.set_insert_position(Block::new(2), 1);
        resolver.resolve_and_append_moves();
        resolver.add_mapping(reg(1), r(0), ValueKind::I64);
        resolver.add_mapping(reg(0), r(1), ValueKind::I64);
        resolver.resolve_and_append_moves();

        let moves = resolver.finish();

        assert_eq!(moves.insertions().len(), 2);
        assert_eq!(moves.move_count(), 4);
        assert_eq!(moves.moves_for(Block::new(0)).next().map(|(i, _)| i), Some(3));
        assert_eq!(
            moves.insertions()[0].moves[0].to_string(),
            "r1:i64 = move r0"
        );
        assert!(moves
            .to_string()
            .starts_with("b0[3]:\n  r1:i64 = move r0\nb2[1]:\n"));
    }
}
