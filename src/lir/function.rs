//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::{ArenaKey, ArenaMap};
use crate::dense_arena_key;
use crate::lir::{GenericInst, LirInst, OperandRole, Value};
use smallvec::SmallVec;

dense_arena_key! {
    /// Refers to a single basic block in a [`Lir`].
    pub struct Block;
}

/// A handle to a single instruction: the block it lives in and its index
/// inside that block.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct InstRef {
    /// The block containing the instruction
    pub block: Block,
    /// The instruction's index in the block
    pub index: usize,
}

/// A basic block: a label, a straight line of instructions and a terminator.
#[derive(Clone, Debug)]
pub struct BlockData<I> {
    insts: Vec<I>,
    preds: SmallVec<[Block; 2]>,
    succs: SmallVec<[Block; 2]>,
    loop_header: bool,
    loop_end: bool,
}

impl<I> BlockData<I> {
    fn new() -> Self {
        Self {
            insts: Vec::new(),
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            loop_header: false,
            loop_end: false,
        }
    }

    /// The instructions of the block, label first.
    #[inline]
    pub fn insts(&self) -> &[I] {
        &self.insts
    }

    /// Every block with an edge into this one.
    #[inline]
    pub fn preds(&self) -> &[Block] {
        &self.preds
    }

    /// Every block this one has an edge to.
    #[inline]
    pub fn succs(&self) -> &[Block] {
        &self.succs
    }

    /// Whether the block is the target of a loop's back edge.
    #[inline]
    pub fn is_loop_header(&self) -> bool {
        self.loop_header
    }

    /// Whether the block is the source of a loop's back edge.
    #[inline]
    pub fn is_loop_end(&self) -> bool {
        self.loop_end
    }
}

/// A function in the low-level IR that register allocation works on.
///
/// The control-flow graph is fixed once the function is built, only the
/// instructions inside of blocks can be changed afterwards.
#[derive(Clone, Debug)]
pub struct Lir<I> {
    blocks: ArenaMap<Block, BlockData<I>>,
    variable_count: usize,
}

impl<I: LirInst> Lir<I> {
    /// Gets the data for a block.
    #[inline]
    pub fn block(&self, block: Block) -> &BlockData<I> {
        &self.blocks[block]
    }

    /// The instructions of `block`.
    #[inline]
    pub fn insts(&self, block: Block) -> &[I] {
        &self.blocks[block].insts
    }

    /// The instructions of `block`, mutably.
    #[inline]
    pub fn insts_mut(&mut self, block: Block) -> &mut [I] {
        &mut self.blocks[block].insts
    }

    /// Gets a single instruction.
    #[inline]
    pub fn inst(&self, inst: InstRef) -> &I {
        &self.blocks[inst.block].insts[inst.index]
    }

    /// The label of `block`. Every block starts with one.
    pub fn label(&self, block: Block) -> &I {
        let first = self.insts(block).first();

        match first {
            Some(label) if label.is_label() => label,
            _ => panic!("block {block:?} does not start with a label"),
        }
    }

    /// The terminator of `block`, i.e. its last instruction.
    pub fn terminator(&self, block: Block) -> &I {
        self.insts(block)
            .last()
            .expect("block without instructions cannot have a terminator")
    }

    /// The predecessors of `block`.
    #[inline]
    pub fn preds(&self, block: Block) -> &[Block] {
        &self.blocks[block].preds
    }

    /// The successors of `block`.
    #[inline]
    pub fn succs(&self, block: Block) -> &[Block] {
        &self.blocks[block].succs
    }

    /// Every block, in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    /// The number of blocks in the function.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether `block` refers to a block in this function.
    #[inline]
    pub fn contains(&self, block: Block) -> bool {
        self.blocks.contains(block)
    }

    /// One past the highest virtual register number referenced anywhere.
    #[inline]
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }
}

/// Builds a [`Lir`] one block at a time.
///
/// ```
/// # use trace_lsra::lir::*;
/// let mut b = LirBuilder::new();
/// let entry = b.create_block();
/// let exit = b.create_block();
///
/// b.append(entry, GenericInst::label(vec![]));
/// b.terminate(entry, GenericInst::jump(exit, vec![]));
/// b.append(exit, GenericInst::label(vec![]));
/// b.append(exit, GenericInst::op("ret"));
///
/// let lir = b.finish();
///
/// assert_eq!(lir.succs(entry), [exit]);
/// assert_eq!(lir.preds(exit), [entry]);
/// ```
#[derive(Debug)]
pub struct LirBuilder<I> {
    blocks: ArenaMap<Block, BlockData<I>>,
}

impl<I: LirInst> LirBuilder<I> {
    /// Creates a builder for an empty function.
    pub fn new() -> Self {
        Self {
            blocks: ArenaMap::new(),
        }
    }

    /// Creates a new empty block.
    pub fn create_block(&mut self) -> Block {
        self.blocks.insert(BlockData::new())
    }

    /// Appends an instruction to the end of `block`.
    pub fn append(&mut self, block: Block, inst: I) {
        self.blocks[block].insts.push(inst);
    }

    /// Adds a control-flow edge `from -> to`.
    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    /// Marks `block` as a loop header.
    pub fn mark_loop_header(&mut self, block: Block) {
        self.blocks[block].loop_header = true;
    }

    /// Marks `block` as the end of a loop, i.e. the source of a back edge.
    pub fn mark_loop_end(&mut self, block: Block) {
        self.blocks[block].loop_end = true;
    }

    /// The number of blocks created so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Finishes the function.
    ///
    /// Panics if any block is empty.
    pub fn finish(self) -> Lir<I> {
        let mut variable_count = 0;
        let mut note = |value: &Value| {
            if let Some(vreg) = value.as_variable() {
                variable_count = variable_count.max(vreg.index() + 1);
            }
        };

        for (block, data) in self.blocks.iter() {
            assert!(!data.insts.is_empty(), "block {block:?} has no instructions");

            for inst in data.insts.iter() {
                for role in OperandRole::INSTRUCTION_ROLES {
                    inst.for_each_operand(role, &mut |value, _| note(value));
                }

                inst.incoming_values().iter().for_each(&mut note);
                inst.outgoing_values().iter().for_each(&mut note);
            }
        }

        Lir {
            blocks: self.blocks,
            variable_count,
        }
    }
}

impl<I: LirInst> Default for LirBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl LirBuilder<GenericInst> {
    /// Appends a terminator to `block` and adds an edge to each of its targets.
    pub fn terminate(&mut self, block: Block, inst: GenericInst) {
        for &target in inst.targets() {
            self.add_edge(block, target);
        }

        self.append(block, inst);
    }
}
