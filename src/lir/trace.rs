//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::{ArenaMap, SecondaryMap};
use crate::dense_arena_key;
use crate::lir::Block;

dense_arena_key! {
    /// Refers to a single trace in a [`TraceBuilderResult`]. Ids are handed
    /// out in the order traces get allocated.
    pub struct TraceId;
}

/// A linear group of blocks that get allocated as one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    id: TraceId,
    blocks: Vec<Block>,
}

impl Trace {
    /// The trace's id.
    #[inline]
    pub fn id(&self) -> TraceId {
        self.id
    }

    /// The blocks of the trace, in allocation order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Whether `block` is part of the trace.
    pub fn contains(&self, block: Block) -> bool {
        self.blocks.contains(&block)
    }
}

/// The partition of a function's blocks into traces.
#[derive(Clone, Debug)]
pub struct TraceBuilderResult {
    traces: ArenaMap<TraceId, Trace>,
    block_to_trace: SecondaryMap<Block, TraceId>,
}

impl TraceBuilderResult {
    /// Builds the result from a list of traces, each being a list of blocks
    /// in allocation order.
    ///
    /// Panics if a block is in more than one trace, or if a trace is empty.
    pub fn new(traces: Vec<Vec<Block>>) -> Self {
        let mut result = Self {
            traces: ArenaMap::with_capacity(traces.len()),
            block_to_trace: SecondaryMap::new(),
        };

        for blocks in traces {
            assert!(!blocks.is_empty(), "traces cannot be empty");

            let id = result.traces.next_key();

            for &block in blocks.iter() {
                let prev = result.block_to_trace.insert(block, id);

                assert!(prev.is_none(), "block {block:?} is in more than one trace");
            }

            result.traces.insert(Trace { id, blocks });
        }

        result
    }

    /// Every trace, in allocation order.
    pub fn traces(&self) -> impl ExactSizeIterator<Item = &Trace> + '_ {
        self.traces.values()
    }

    /// Gets a single trace.
    #[inline]
    pub fn trace(&self, id: TraceId) -> &Trace {
        &self.traces[id]
    }

    /// The number of traces.
    #[inline]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Whether there are no traces at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Gets the trace a block belongs to.
    ///
    /// Panics if the block is not in any trace.
    pub fn trace_for_block(&self, block: Block) -> &Trace {
        let id = self
            .block_to_trace
            .get(block)
            .unwrap_or_else(|| panic!("block {block:?} is not in any trace"));

        &self.traces[*id]
    }
}

/// Decides whether a trace is worth analyzing at all.
pub type TraceFilter = dyn Fn(&Trace) -> bool + Send + Sync;

/// Accepts every trace.
pub fn every_trace(_: &Trace) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;

    fn b(n: usize) -> Block {
        Block::new(n)
    }

    #[test]
    fn membership() {
        let result = TraceBuilderResult::new(vec![vec![b(0), b(2)], vec![b(1)]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.trace_for_block(b(2)).id(), TraceId::new(0));
        assert_eq!(result.trace_for_block(b(1)).id(), TraceId::new(1));
        assert_eq!(result.trace(TraceId::new(0)).blocks(), [b(0), b(2)]);
        assert!(result.trace(TraceId::new(0)).contains(b(2)));
        assert!(!result.trace(TraceId::new(0)).contains(b(1)));
    }

    #[test]
    #[should_panic(expected = "more than one trace")]
    fn overlapping_traces() {
        TraceBuilderResult::new(vec![vec![b(0)], vec![b(0)]]);
    }

    #[test]
    fn filters() {
        let result = TraceBuilderResult::new(vec![vec![b(0)], vec![b(1), b(2)]]);
        let multi: &TraceFilter = &|t: &Trace| t.blocks().len() > 1;

        let kept: Vec<_> = result.traces().filter(|t| multi(t)).map(Trace::id).collect();

        assert_eq!(kept, [TraceId::new(1)]);
        assert!(result.traces().all(every_trace));
    }
}
