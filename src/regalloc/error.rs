//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{Block, Location, PReg, TraceId, VReg};
use crate::regalloc::{Range, SpillState};
use thiserror::Error;

/// A broken contract between the allocator and one of its collaborators.
///
/// None of these can be recovered from: the method being compiled has to be
/// abandoned and reported as an internal compiler error.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A definition was found while the interval was in a state that only
    /// the allocator itself can reach.
    #[error("{trace:?}: definition of {vreg} at {op_id} found in spill state `{state}`")]
    InvalidSpillState {
        /// The trace being analyzed
        trace: TraceId,
        /// The interval
        vreg: VReg,
        /// The id of the defining instruction
        op_id: i32,
        /// The unexpected state
        state: SpillState,
    },

    /// A critical edge reached resolution without being split first.
    #[error("{trace:?}: critical edge {from:?} -> {to:?} must be split before resolution")]
    CriticalEdge {
        /// The trace being resolved
        trace: TraceId,
        /// The block with multiple successors
        from: Block,
        /// The block with multiple predecessors
        to: Block,
    },

    /// No interval of a split family covers an instruction.
    #[error("{trace:?}: no split child of {vreg} covers {op_id}")]
    MissingSplitChild {
        /// The trace being resolved
        trace: TraceId,
        /// The split parent
        vreg: VReg,
        /// The instruction id being looked up
        op_id: i32,
    },

    /// Resolution needed the location of an interval that was never assigned one.
    #[error("{trace:?}: {vreg} has no location at {op_id}")]
    Unallocated {
        /// The trace being resolved
        trace: TraceId,
        /// The interval without a location
        vreg: VReg,
        /// The instruction id the location was needed at
        op_id: i32,
    },

    /// A value crossing a block boundary has no interval in the trace.
    #[error("{trace:?}: {vreg} has no interval")]
    MissingInterval {
        /// The trace being resolved
        trace: TraceId,
        /// The value without an interval
        vreg: VReg,
    },

    /// The splitter asked for a split outside of an interval.
    #[error("{trace:?}: cannot split {vreg} at {pos}, no interval of it strictly contains it")]
    InvalidSplit {
        /// The trace the interval belongs to
        trace: TraceId,
        /// The interval
        vreg: VReg,
        /// The requested split position
        pos: i32,
    },

    /// Interval verification failed after the trace was resolved.
    #[error("{trace:?}: {source}")]
    Verification {
        /// The trace that failed verification
        trace: TraceId,
        /// What was wrong
        source: VerifyError,
    },
}

/// A problem found while checking intervals after analysis or resolution.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// An interval is stored under a different register than its own.
    #[error("interval stored as {slot} belongs to {operand}")]
    WrongOperand {
        /// Where it is stored
        slot: VReg,
        /// What it says it is
        operand: VReg,
    },

    /// An interval has no ranges at all.
    #[error("interval {0} is empty")]
    Empty(VReg),

    /// An interval ends before it starts.
    #[error("interval {vreg} has an invalid range {range}")]
    InvalidRange {
        /// The interval
        vreg: VReg,
        /// The broken range
        range: Range,
    },

    /// An interval was never assigned a location.
    #[error("interval {0} has no location")]
    Unallocated(VReg),

    /// Two intervals share a location while both are live.
    #[error("intervals {first} and {second} overlap in {location}")]
    Overlap {
        /// The first interval
        first: VReg,
        /// The second interval
        second: VReg,
        /// The shared location
        location: Location,
    },

    /// A variable interval overlaps with the fixed interval of its register.
    #[error("interval {vreg} overlaps with the fixed interval of {reg}")]
    FixedOverlap {
        /// The variable interval
        vreg: VReg,
        /// The register it was assigned
        reg: PReg,
    },

    /// Two stores built for the same trace disagree.
    #[error("interval stores differ at {0}")]
    Mismatch(String),
}
