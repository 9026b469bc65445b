//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Plain-data snapshots of an [`IntervalStore`], for printing and for
//! handing intervals to tools outside of the allocator.
//!
//! The text form is stable and is what the file tests compare against:
//!
//! ```text
//! trace 0:
//!   r0: [-1, 0) [4, 5)
//!   v0:i64 [2, 9) uses 2:none,8:must state no-spill-store def 2 remat #0:i64
//! ```

use crate::arena::ArenaKey;
use crate::lir::{Constant, Location, PReg, TraceId, VReg, ValueKind};
use crate::regalloc::{
    FixedInterval, IntervalHint, IntervalStore, Range, RegisterPriority, SpillState, TraceInterval,
};
use std::fmt;
use std::fmt::{Display, Formatter};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// A snapshot of a single fixed interval.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FixedDump {
    /// The register
    pub reg: PReg,
    /// The ranges, in increasing order
    pub ranges: Vec<Range>,
}

impl FixedDump {
    /// Takes a snapshot of `interval`.
    pub fn of(interval: &FixedInterval) -> Self {
        Self {
            reg: interval.reg(),
            ranges: interval.ranges().collect(),
        }
    }
}

/// A snapshot of a single variable interval.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct IntervalDump {
    /// The register the interval belongs to
    pub operand: VReg,
    /// The kind of value held
    pub kind: ValueKind,
    /// The ranges, in increasing order
    pub ranges: Vec<Range>,
    /// The use positions, in increasing order
    pub uses: Vec<(i32, RegisterPriority)>,
    /// The spill state
    pub spill_state: SpillState,
    /// Where the value is defined, if it is
    pub definition: Option<i32>,
    /// The location hint
    pub hint: Option<IntervalHint>,
    /// The constant the value can be rematerialized from
    pub materialized: Option<Constant>,
    /// The spill slot
    pub spill_slot: Option<Location>,
    /// The assigned location
    pub location: Option<Location>,
    /// The split parent, for split children
    pub split_parent: Option<VReg>,
}

impl IntervalDump {
    /// Takes a snapshot of `interval`.
    pub fn of(interval: &TraceInterval) -> Self {
        Self {
            operand: interval.operand(),
            kind: interval.kind(),
            ranges: interval.ranges().collect(),
            uses: interval.use_pos().iter().rev().collect(),
            spill_state: interval.spill_state(),
            definition: interval.spill_definition_pos(),
            hint: interval.location_hint(),
            materialized: interval.materialized_value(),
            spill_slot: interval.spill_slot(),
            location: interval.location(),
            split_parent: interval.split_parent(),
        }
    }
}

/// A snapshot of every non-empty interval of a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StoreDump {
    /// The trace the intervals belong to
    pub trace: TraceId,
    /// Fixed intervals, ordered by register
    pub fixed: Vec<FixedDump>,
    /// Variable intervals, ordered by virtual register
    pub intervals: Vec<IntervalDump>,
}

impl IntervalStore {
    /// Takes a snapshot of every non-empty interval.
    pub fn dump(&self) -> StoreDump {
        let mut fixed: Vec<_> = self
            .fixed_intervals()
            .filter(|(_, i)| !i.is_empty())
            .map(|(_, i)| FixedDump::of(i))
            .collect();

        let mut intervals: Vec<_> = self
            .intervals()
            .filter(|(_, i)| !i.is_empty())
            .map(|(_, i)| IntervalDump::of(i))
            .collect();

        fixed.sort_by_key(|f| f.reg);
        intervals.sort_by_key(|i| i.operand);

        StoreDump {
            trace: self.trace_id(),
            fixed,
            intervals,
        }
    }
}

fn write_ranges(f: &mut Formatter<'_>, ranges: &[Range]) -> fmt::Result {
    for range in ranges {
        write!(f, " {range}")?;
    }

    Ok(())
}

impl Display for FixedDump {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.reg)?;
        write_ranges(f, &self.ranges)
    }
}

impl Display for IntervalDump {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operand, self.kind)?;
        write_ranges(f, &self.ranges)?;

        if !self.uses.is_empty() {
            let uses: Vec<String> = self
                .uses
                .iter()
                .map(|(pos, priority)| format!("{pos}:{priority}"))
                .collect();

            write!(f, " uses {}", uses.join(","))?;
        }

        write!(f, " state {}", self.spill_state)?;

        if let Some(def) = self.definition {
            write!(f, " def {def}")?;
        }

        if let Some(hint) = self.hint {
            write!(f, " hint {hint}")?;
        }

        if let Some(constant) = self.materialized {
            write!(f, " remat {constant}")?;
        }

        if let Some(slot) = self.spill_slot {
            write!(f, " spill {slot}")?;
        }

        if let Some(location) = self.location {
            write!(f, " loc {location}")?;
        }

        if let Some(parent) = self.split_parent {
            write!(f, " parent {parent}")?;
        }

        Ok(())
    }
}

impl Display for StoreDump {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "trace {}:", self.trace.index())?;

        for fixed in self.fixed.iter() {
            writeln!(f, "  {fixed}")?;
        }

        for interval in self.intervals.iter() {
            writeln!(f, "  {interval}")?;
        }

        Ok(())
    }
}
