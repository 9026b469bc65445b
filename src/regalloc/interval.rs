//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{Constant, Location, OperandRole, PReg, VReg, ValueKind};
use crate::regalloc::{RegisterPriority, UsePosList};
use smallvec::SmallVec;
use std::fmt;
use std::fmt::{Display, Formatter};

/// A half-open range of instruction ids, `[from, to)`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    /// The first id in the range
    pub from: i32,
    /// One past the last id in the range
    pub to: i32,
}

impl Range {
    /// Creates `[from, to)`.
    #[inline]
    pub const fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }

    /// Whether `pos` is inside the range.
    #[inline]
    pub fn contains(self, pos: i32) -> bool {
        self.from <= pos && pos < self.to
    }

    /// Whether the two ranges share any id.
    #[inline]
    pub fn intersects(self, other: Range) -> bool {
        self.from < other.to && other.from < self.to
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Ranges of an interval, stored back to front: the last element is the
/// earliest range. Analysis only ever touches the earliest range, so that
/// one is kept at the cheap end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct RangeList(SmallVec<[Range; 2]>);

impl RangeList {
    fn first(&self) -> Option<Range> {
        self.0.last().copied()
    }

    fn first_mut(&mut self) -> Option<&mut Range> {
        self.0.last_mut()
    }

    fn prepend(&mut self, range: Range) {
        self.0.push(range);
    }

    fn add(&mut self, from: i32, to: i32) {
        debug_assert!(from < to, "invalid range [{from}, {to})");

        match self.first_mut() {
            Some(first) if first.from <= to => {
                first.from = first.from.min(from);
                first.to = first.to.max(to);
            }
            _ => self.prepend(Range::new(from, to)),
        }
    }

    fn set_from(&mut self, from: i32) {
        let first = self
            .first_mut()
            .expect("cannot set the start of an empty interval");

        first.from = from;
    }

    fn from(&self) -> i32 {
        self.first()
            .expect("empty intervals do not have a start")
            .from
    }

    fn to(&self) -> i32 {
        self.0.first().expect("empty intervals do not have an end").to
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = Range> + '_ {
        self.0.iter().rev().copied()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn covers(&self, pos: i32) -> bool {
        self.iter().any(|r| r.contains(pos))
    }
}

/// The interval of a physical register. It only blocks the register, it is
/// never colored itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedInterval {
    reg: PReg,
    ranges: RangeList,
}

impl FixedInterval {
    /// Creates an empty interval for `reg`.
    pub fn new(reg: PReg) -> Self {
        Self {
            reg,
            ranges: RangeList::default(),
        }
    }

    /// The register being blocked.
    #[inline]
    pub fn reg(&self) -> PReg {
        self.reg
    }

    /// Adds `[from, to)`, joining it with the earliest range if they touch.
    pub fn add_range(&mut self, from: i32, to: i32) {
        self.ranges.add(from, to);
    }

    /// Moves the start of the earliest range.
    pub fn set_from(&mut self, from: i32) {
        self.ranges.set_from(from);
    }

    /// Adds the `[-1, 0)` range that ends every fixed interval after analysis.
    /// It is never joined with the range starting at `0`.
    pub fn add_sentinel(&mut self) {
        self.ranges.prepend(Range::new(-1, 0));
    }

    /// The start of the earliest range. Panics if empty.
    #[inline]
    pub fn from(&self) -> i32 {
        self.ranges.from()
    }

    /// The end of the latest range. Panics if empty.
    #[inline]
    pub fn to(&self) -> i32 {
        self.ranges.to()
    }

    /// The ranges in increasing order.
    pub fn ranges(&self) -> impl DoubleEndedIterator<Item = Range> + '_ {
        self.ranges.iter()
    }

    /// Whether the interval has no ranges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether the register is blocked at `pos`.
    pub fn covers(&self, pos: i32) -> bool {
        self.ranges.covers(pos)
    }
}

/// Tracks whether the spill slot of an interval can be written once, at the
/// definition, and then never again.
///
/// Lifetime analysis only moves intervals through the first two states and
/// [`SpillState::NoOptimization`], the rest are reached by the allocator.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpillState {
    /// No definition has been seen yet
    NoDefinitionFound,
    /// One definition was seen, nothing has been spilled yet
    NoSpillStore,
    /// One spill move has been inserted
    OneSpillStore,
    /// The spill move is placed in a dominator of every spill
    SpillInDominator,
    /// The value is spilled right at its definition
    StoreAtDefinition,
    /// The value starts out in memory, so no spill store is needed at all
    StartInMemory,
    /// Spills need no special treatment
    NoOptimization,
}

impl Display for SpillState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpillState::NoDefinitionFound => "no-def",
            SpillState::NoSpillStore => "no-spill-store",
            SpillState::OneSpillStore => "one-spill-store",
            SpillState::SpillInDominator => "spill-in-dominator",
            SpillState::StoreAtDefinition => "store-at-def",
            SpillState::StartInMemory => "start-in-memory",
            SpillState::NoOptimization => "no-opt",
        };

        f.write_str(name)
    }
}

/// Another interval that an interval would like to share a location with.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntervalHint {
    /// A variable interval
    Variable(VReg),
    /// A fixed interval, i.e. a specific register
    Fixed(PReg),
}

impl Display for IntervalHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IntervalHint::Variable(vreg) => write!(f, "{vreg}"),
            IntervalHint::Fixed(preg) => write!(f, "{preg}"),
        }
    }
}

/// The interval of a single virtual register, or of one of its split children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceInterval {
    operand: VReg,
    kind: ValueKind,
    ranges: RangeList,
    use_pos: UsePosList,
    spill_state: SpillState,
    spill_definition_pos: Option<i32>,
    materialized_value: Option<Constant>,
    materializations_added: u32,
    hint: Option<IntervalHint>,
    spill_slot: Option<Location>,
    location: Option<Location>,
    split_parent: Option<VReg>,
    split_children: Vec<VReg>,
}

impl TraceInterval {
    /// Creates an empty interval for `operand`.
    pub fn new(operand: VReg, kind: ValueKind) -> Self {
        Self {
            operand,
            kind,
            ranges: RangeList::default(),
            use_pos: UsePosList::new(),
            spill_state: SpillState::NoDefinitionFound,
            spill_definition_pos: None,
            materialized_value: None,
            materializations_added: 0,
            hint: None,
            spill_slot: None,
            location: None,
            split_parent: None,
            split_children: Vec::new(),
        }
    }

    /// The register this interval belongs to.
    #[inline]
    pub fn operand(&self) -> VReg {
        self.operand
    }

    /// The kind of value the interval holds.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Adds `[from, to)`, joining it with the earliest range if they touch.
    pub fn add_range(&mut self, from: i32, to: i32) {
        self.ranges.add(from, to);
    }

    /// Moves the start of the earliest range.
    pub fn set_from(&mut self, from: i32) {
        self.ranges.set_from(from);
    }

    /// Moves the end of the latest range.
    pub fn set_to(&mut self, to: i32) {
        let last = self.ranges.0.first_mut().expect("cannot set the end of an empty interval");

        last.to = to;
    }

    /// The start of the earliest range. Panics if empty.
    #[inline]
    pub fn from(&self) -> i32 {
        self.ranges.from()
    }

    /// The end of the latest range. Panics if empty.
    #[inline]
    pub fn to(&self) -> i32 {
        self.ranges.to()
    }

    /// The ranges in increasing order.
    pub fn ranges(&self) -> impl DoubleEndedIterator<Item = Range> + '_ {
        self.ranges.iter()
    }

    /// Whether the interval has no ranges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether the value is live at `pos`.
    pub fn covers(&self, pos: i32) -> bool {
        self.ranges.covers(pos)
    }

    /// Whether the interval is valid at `op_id` for an operand in `role`.
    ///
    /// An interval ending at `op_id` is still valid for reads at `op_id`, but
    /// not for writes.
    pub fn covers_op(&self, op_id: i32, role: OperandRole) -> bool {
        let to_offset = if role == OperandRole::Output { 0 } else { 1 };

        !self.is_empty() && self.from() <= op_id && op_id < self.to() + to_offset
    }

    /// Records a use position, merging it with the lowest one if both are
    /// at the same position. The stronger priority wins.
    pub fn add_use_pos(&mut self, pos: i32, priority: RegisterPriority) {
        match self.use_pos.lowest() {
            Some((lowest, current)) if lowest == pos => {
                if current < priority {
                    self.use_pos.set_priority_at(self.use_pos.len() - 1, priority);
                }
            }
            _ => self.use_pos.add(pos, priority),
        }
    }

    /// The use positions, highest first.
    #[inline]
    pub fn use_pos(&self) -> &UsePosList {
        &self.use_pos
    }

    /// The use positions, mutably.
    #[inline]
    pub fn use_pos_mut(&mut self) -> &mut UsePosList {
        &mut self.use_pos
    }

    /// The current spill state.
    #[inline]
    pub fn spill_state(&self) -> SpillState {
        self.spill_state
    }

    /// Replaces the spill state.
    #[inline]
    pub fn set_spill_state(&mut self, state: SpillState) {
        self.spill_state = state;
    }

    /// The position of the (single) definition, if one was seen.
    #[inline]
    pub fn spill_definition_pos(&self) -> Option<i32> {
        self.spill_definition_pos
    }

    /// Records the position of the definition.
    #[inline]
    pub fn set_spill_definition_pos(&mut self, pos: i32) {
        self.spill_definition_pos = Some(pos);
    }

    /// The constant the value can be rematerialized from, if any.
    #[inline]
    pub fn materialized_value(&self) -> Option<Constant> {
        self.materialized_value
    }

    /// Replaces the rematerialization constant.
    #[inline]
    pub fn set_materialized_value(&mut self, value: Option<Constant>) {
        self.materialized_value = value;
    }

    /// Records the rematerialization candidate of one definition. Only a
    /// value with exactly one definition can be rematerialized, so every
    /// call after the first clears the constant.
    pub fn add_materialization_value(&mut self, value: Option<Constant>) {
        self.materialized_value = match self.materializations_added {
            0 => value,
            _ => None,
        };

        self.materializations_added += 1;
    }

    /// Whether the value can be recomputed instead of being reloaded.
    #[inline]
    pub fn can_materialize(&self) -> bool {
        self.materialized_value.is_some()
    }

    /// The location hint, if one was recorded.
    #[inline]
    pub fn location_hint(&self) -> Option<IntervalHint> {
        self.hint
    }

    /// Replaces the location hint.
    #[inline]
    pub fn set_location_hint(&mut self, hint: IntervalHint) {
        self.hint = Some(hint);
    }

    /// The stack slot the value lives in when spilled.
    #[inline]
    pub fn spill_slot(&self) -> Option<Location> {
        self.spill_slot
    }

    /// Assigns the spill slot. Only stack locations make sense here.
    pub fn set_spill_slot(&mut self, slot: Location) {
        debug_assert!(slot.is_stack(), "spill slot {slot} is not on the stack");

        self.spill_slot = Some(slot);
    }

    /// Where the allocator put the interval, if it did.
    #[inline]
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Assigns the interval's location.
    #[inline]
    pub fn set_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    /// The interval this one was split off of, or `None` for a parent.
    #[inline]
    pub fn split_parent(&self) -> Option<VReg> {
        self.split_parent
    }

    /// Every split child, ordered by start position.
    #[inline]
    pub fn split_children(&self) -> &[VReg] {
        &self.split_children
    }

    /// Whether this is an original interval, rather than one created by splitting.
    #[inline]
    pub fn is_split_parent(&self) -> bool {
        self.split_parent.is_none()
    }

    pub(crate) fn make_split_child_of(&mut self, parent: VReg) {
        self.split_parent = Some(parent);
    }

    pub(crate) fn split_children_mut(&mut self) -> &mut Vec<VReg> {
        &mut self.split_children
    }

    /// Cuts off everything at or after `pos` into `child`: the ranges above
    /// `pos` and the use positions `>= pos`.
    pub(crate) fn split_into(&mut self, pos: i32, child: &mut TraceInterval) {
        let mut upper = Vec::new();

        while let Some(first) = self.ranges.0.first_mut() {
            if first.to <= pos {
                break;
            }

            if first.from >= pos {
                upper.push(*first);
                self.ranges.0.remove(0);
            } else {
                upper.push(Range::new(pos, first.to));
                first.to = pos;
                break;
            }
        }

        for range in upper.into_iter() {
            child.ranges.prepend(range);
        }

        child.use_pos = self.use_pos.split_at(pos);
    }
}
