//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::{ArenaKey, SecondaryMap};
use crate::lir::{Block, InstRef, Location, OperandRole, PReg, TraceId, VReg, Value, ValueKind};
use crate::regalloc::{AllocError, FixedInterval, RegisterConfig, TraceInterval};

/// Accepts every variable interval. Fixed intervals are kept apart and never
/// show up in an unhandled list.
pub fn is_variable_interval(_: &TraceInterval) -> bool {
    true
}

/// Accepts intervals that live in memory: either the allocator put them on
/// the stack, or they have not been given a register but already own a
/// spill slot.
pub fn is_stack_interval(interval: &TraceInterval) -> bool {
    match interval.location() {
        Some(location) => location.is_stack(),
        None => interval.spill_slot().is_some(),
    }
}

/// Every interval of a single trace, plus the instruction id tables that
/// positions in those intervals refer to.
///
/// Variable intervals are indexed by virtual register number. Intervals made
/// by splitting get numbers past every register the code uses, so one flat
/// index space covers both.
#[derive(Clone, Debug)]
pub struct IntervalStore {
    trace: TraceId,
    blocks: Vec<Block>,
    registers: RegisterConfig,
    intervals: SecondaryMap<VReg, TraceInterval>,
    fixed: SecondaryMap<PReg, FixedInterval>,
    intervals_size: usize,
    first_derived: Option<usize>,
    op_id_to_inst: Vec<Option<InstRef>>,
    block_ids: SecondaryMap<Block, (i32, i32)>,
}

impl IntervalStore {
    /// Creates an empty store for `trace`, with room for `operand_size`
    /// variable intervals and then some for splitting.
    pub fn new(
        trace: TraceId,
        blocks: Vec<Block>,
        registers: RegisterConfig,
        operand_size: usize,
    ) -> Self {
        let fixed = SecondaryMap::with_capacity(registers.register_table_size());

        Self {
            trace,
            blocks,
            registers,
            intervals: SecondaryMap::with_capacity(operand_size + (operand_size >> 1)),
            fixed,
            intervals_size: operand_size,
            first_derived: None,
            op_id_to_inst: Vec::new(),
            block_ids: SecondaryMap::new(),
        }
    }

    /// The trace the intervals belong to.
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace
    }

    /// The register file the intervals were built against.
    #[inline]
    pub fn registers(&self) -> &RegisterConfig {
        &self.registers
    }

    /// Sizes the id tables for a trace of `instructions` instructions.
    pub fn init_op_id_maps(&mut self, instructions: usize) {
        self.op_id_to_inst = vec![None; instructions];
    }

    /// Records the instruction with index `index` (i.e. id `index << 1`).
    pub fn put_op_id_maps(&mut self, index: usize, inst: InstRef) {
        self.op_id_to_inst[index] = Some(inst);
    }

    /// Records the ids of the first and last instruction of `block`.
    pub fn put_block_ids(&mut self, block: Block, first: i32, last: i32) {
        debug_assert!(first <= last);

        self.block_ids.insert(block, (first, last));
    }

    /// The number of instructions in the trace.
    #[inline]
    pub fn instruction_count(&self) -> usize {
        self.op_id_to_inst.len()
    }

    /// The highest instruction id in the trace.
    pub fn max_op_id(&self) -> i32 {
        assert!(!self.op_id_to_inst.is_empty(), "no instructions have been numbered");

        ((self.op_id_to_inst.len() - 1) << 1) as i32
    }

    /// Gets the instruction with id `op_id`.
    ///
    /// Panics if `op_id` is odd or out of range.
    pub fn instruction_for_id(&self, op_id: i32) -> InstRef {
        assert_eq!(op_id & 1, 0, "instruction ids are even, got {op_id}");

        self.op_id_to_inst
            .get((op_id >> 1) as usize)
            .copied()
            .flatten()
            .unwrap_or_else(|| panic!("no instruction has id {op_id}"))
    }

    /// Gets the block containing the instruction at `op_id`. Odd positions map
    /// to the instruction right before them.
    pub fn block_for_id(&self, op_id: i32) -> Block {
        assert!(
            op_id >= 0 && op_id <= self.max_op_id() + 1,
            "id {op_id} is out of range"
        );

        self.instruction_for_id(op_id & !1).block
    }

    /// The id of the label of `block`.
    pub fn first_op_id(&self, block: Block) -> i32 {
        self.block_ids(block).0
    }

    /// The id of the terminator of `block`.
    pub fn last_op_id(&self, block: Block) -> i32 {
        self.block_ids(block).1
    }

    fn block_ids(&self, block: Block) -> (i32, i32) {
        *self
            .block_ids
            .get(block)
            .unwrap_or_else(|| panic!("block {block:?} has not been numbered"))
    }

    /// The number of blocks in the trace.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The `i`th block of the trace, in allocation order.
    #[inline]
    pub fn block_at(&self, i: usize) -> Block {
        self.blocks[i]
    }

    /// The blocks of the trace, in allocation order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Whether `value` takes part in allocation at all. Registers the
    /// allocator may not hand out are ignored entirely.
    pub fn is_processed(&self, value: &Value) -> bool {
        match value {
            Value::Register(reg, _) => self.registers.is_allocatable(*reg),
            _ => true,
        }
    }

    /// Gets the interval of `vreg`, creating it if needed.
    pub fn get_or_create_interval(&mut self, vreg: VReg, kind: ValueKind) -> &mut TraceInterval {
        let index = vreg.index();

        if index >= self.intervals_size {
            assert!(
                self.first_derived.is_none(),
                "{vreg} was first referenced after intervals were split"
            );

            self.intervals_size = index + 1;
        }

        self.intervals
            .get_or_insert_with(vreg, || TraceInterval::new(vreg, kind))
    }

    /// Gets the fixed interval of `reg`, creating it if needed.
    pub fn get_or_create_fixed_interval(&mut self, reg: PReg) -> &mut FixedInterval {
        debug_assert!(self.registers.is_allocatable(reg));

        self.fixed.get_or_insert_with(reg, || FixedInterval::new(reg))
    }

    /// Gets the interval of `vreg`, if it has one.
    #[inline]
    pub fn interval_for(&self, vreg: VReg) -> Option<&TraceInterval> {
        self.intervals.get(vreg)
    }

    /// Gets the interval of `vreg` mutably, if it has one.
    #[inline]
    pub fn interval_for_mut(&mut self, vreg: VReg) -> Option<&mut TraceInterval> {
        self.intervals.get_mut(vreg)
    }

    /// Gets the fixed interval of `reg`, if it has one.
    #[inline]
    pub fn fixed_interval_for(&self, reg: PReg) -> Option<&FixedInterval> {
        self.fixed.get(reg)
    }

    /// Every variable interval, including split children, by register number.
    pub fn intervals(&self) -> impl DoubleEndedIterator<Item = (VReg, &TraceInterval)> + '_ {
        self.intervals.iter()
    }

    /// Every variable interval mutably.
    pub fn intervals_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = (VReg, &mut TraceInterval)> + '_ {
        self.intervals.iter_mut()
    }

    /// Every fixed interval, by register identity.
    pub fn fixed_intervals(&self) -> impl DoubleEndedIterator<Item = (PReg, &FixedInterval)> + '_ {
        self.fixed.iter()
    }

    /// Every fixed interval mutably.
    pub fn fixed_intervals_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = (PReg, &mut FixedInterval)> + '_ {
        self.fixed.iter_mut()
    }

    /// The size of the variable interval index space, derived intervals included.
    #[inline]
    pub fn intervals_size(&self) -> usize {
        self.intervals_size
    }

    /// The index of the first interval created by splitting, if any were.
    #[inline]
    pub fn first_derived_interval_index(&self) -> Option<usize> {
        self.first_derived
    }

    /// Whether any interval has been created by splitting.
    #[inline]
    pub fn has_derived_intervals(&self) -> bool {
        self.first_derived.is_some()
    }

    /// Creates a new empty interval holding the same kind of value as
    /// `source`, numbered after every other interval.
    pub fn create_derived_interval(&mut self, source: VReg) -> VReg {
        let kind = self.intervals[source].kind();
        let index = self.intervals_size;

        if self.first_derived.is_none() {
            self.first_derived = Some(index);
        }

        let capacity = self.intervals.capacity();

        if index >= capacity {
            self.intervals.reserve((capacity >> 1) + 1);
        }

        let vreg = VReg::new(index as u32);

        self.intervals_size += 1;
        self.intervals.insert(vreg, TraceInterval::new(vreg, kind));

        log::trace!("created derived interval {vreg} from {source}");

        vreg
    }

    fn split_parent_of(&self, vreg: VReg) -> Result<VReg, AllocError> {
        let interval = self.intervals.get(vreg).ok_or(AllocError::MissingInterval {
            trace: self.trace,
            vreg,
        })?;

        Ok(interval.split_parent().unwrap_or(vreg))
    }

    fn family(&self, parent: VReg) -> impl Iterator<Item = VReg> + '_ {
        std::iter::once(parent).chain(self.intervals[parent].split_children().iter().copied())
    }

    /// Finds the interval of `vreg`'s split family that is valid at `op_id`
    /// for an operand used in `role`.
    pub fn split_child_at_op_id(
        &self,
        vreg: VReg,
        op_id: i32,
        role: OperandRole,
    ) -> Result<VReg, AllocError> {
        let parent = self.split_parent_of(vreg)?;

        self.family(parent)
            .find(|&child| self.intervals[child].covers_op(op_id, role))
            .ok_or(AllocError::MissingSplitChild {
                trace: self.trace,
                vreg: parent,
                op_id,
            })
    }

    /// Splits the member of `vreg`'s split family that strictly contains
    /// `pos`, moving everything at or after `pos` into a new split child.
    ///
    /// This is how the external splitter registers the children it makes.
    pub fn split_interval_at(&mut self, vreg: VReg, pos: i32) -> Result<VReg, AllocError> {
        let parent = self.split_parent_of(vreg)?;
        let victim = self
            .family(parent)
            .find(|&child| {
                let interval = &self.intervals[child];

                !interval.is_empty() && interval.from() < pos && pos < interval.to()
            })
            .ok_or(AllocError::InvalidSplit {
                trace: self.trace,
                vreg: parent,
                pos,
            })?;

        let child = self.create_derived_interval(parent);
        let mut split = TraceInterval::new(child, self.intervals[parent].kind());
        let original = &mut self.intervals[victim];

        original.split_into(pos, &mut split);
        split.make_split_child_of(parent);
        split.set_materialized_value(original.materialized_value());

        if let Some(slot) = original.spill_slot() {
            split.set_spill_slot(slot);
        }

        let from = split.from();

        self.intervals.insert(child, split);

        let intervals = &self.intervals;
        let at = intervals[parent]
            .split_children()
            .iter()
            .position(|&c| intervals[c].from() > from)
            .unwrap_or(intervals[parent].split_children().len());

        self.intervals[parent].split_children_mut().insert(at, child);

        log::trace!("split {victim} at {pos} into {child}");

        Ok(child)
    }

    /// Assigns a location to a single interval (not its whole split family).
    pub fn set_location(&mut self, vreg: VReg, location: Location) {
        self.intervals[vreg].set_location(location);
    }

    /// Whether the value of `vreg` at `op_id` is not held anywhere and has to
    /// be rematerialized.
    pub fn is_materialized(
        &self,
        vreg: VReg,
        op_id: i32,
        role: OperandRole,
    ) -> Result<bool, AllocError> {
        let child = &self.intervals[self.split_child_at_op_id(vreg, op_id, role)?];

        Ok(child.location().is_none() && child.can_materialize())
    }

    /// Every non-empty interval, sorted by start position.
    ///
    /// Intervals are created in nearly the order they start in, so this is an
    /// insertion sort that only moves the few that are out of place.
    pub fn sorted_intervals(&self) -> Vec<VReg> {
        let candidates = self
            .intervals
            .iter()
            .filter(|(_, i)| !i.is_empty())
            .map(|(vreg, i)| (vreg, i.from()));

        insertion_sort_by_from(candidates)
    }

    /// Every non-empty fixed interval, sorted by start position.
    pub fn sorted_fixed_intervals(&self) -> Vec<PReg> {
        let candidates = self
            .fixed
            .iter()
            .filter(|(_, i)| !i.is_empty())
            .map(|(reg, i)| (reg, i.from()));

        insertion_sort_by_from(candidates)
    }

    /// Merges the intervals created by splitting into an already sorted list.
    pub fn sort_intervals_after_allocation(&self, sorted: &[VReg]) -> Vec<VReg> {
        let Some(first) = self.first_derived else {
            return sorted.to_vec();
        };

        let mut derived: Vec<VReg> = self
            .intervals
            .keys()
            .filter(|vreg| vreg.index() >= first && !self.intervals[*vreg].is_empty())
            .collect();

        derived.sort_by_key(|vreg| self.intervals[*vreg].from());

        let mut merged = Vec::with_capacity(sorted.len() + derived.len());
        let (mut i, mut j) = (0, 0);

        while i < sorted.len() && j < derived.len() {
            if self.intervals[sorted[i]].from() <= self.intervals[derived[j]].from() {
                merged.push(sorted[i]);
                i += 1;
            } else {
                merged.push(derived[j]);
                j += 1;
            }
        }

        merged.extend_from_slice(&sorted[i..]);
        merged.extend_from_slice(&derived[j..]);

        merged
    }

    /// Sorts intervals by the position of their definition. Intervals without
    /// one go last.
    pub fn sort_intervals_by_spill_pos(&self, list: &mut [VReg]) {
        list.sort_by_key(|vreg| {
            self.intervals[*vreg]
                .spill_definition_pos()
                .unwrap_or(i32::MAX)
        });
    }

    /// Every non-empty interval accepted by `predicate`, sorted by start position.
    pub fn unhandled_intervals(&self, predicate: impl Fn(&TraceInterval) -> bool) -> Vec<VReg> {
        self.sorted_intervals()
            .into_iter()
            .filter(|vreg| predicate(&self.intervals[*vreg]))
            .collect()
    }
}

fn insertion_sort_by_from<K: Copy>(candidates: impl Iterator<Item = (K, i32)>) -> Vec<K> {
    let mut sorted: Vec<(K, i32)> = Vec::new();
    let mut sorted_from_max = i32::MIN;

    for (key, from) in candidates {
        if sorted_from_max <= from {
            sorted.push((key, from));
            sorted_from_max = from;
        } else {
            let at = sorted.partition_point(|&(_, f)| f <= from);

            sorted.insert(at, (key, from));
        }
    }

    sorted.into_iter().map(|(key, _)| key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::StackSlot;
    use crate::regalloc::RegisterPriority;

    fn store() -> IntervalStore {
        IntervalStore::new(
            TraceId::new(0),
            vec![Block::new(0)],
            RegisterConfig::generic(2, 2, 1),
            4,
        )
    }

    fn v(n: u32) -> VReg {
        VReg::new(n)
    }

    #[test]
    fn op_id_maps() {
        let mut s = store();

        s.init_op_id_maps(3);

        for i in 0..3 {
            s.put_op_id_maps(i, InstRef { block: Block::new(0), index: i });
        }

        s.put_block_ids(Block::new(0), 0, 4);

        assert_eq!(s.max_op_id(), 4);
        assert_eq!(s.instruction_for_id(2).index, 1);
        assert_eq!(s.block_for_id(5), Block::new(0));
        assert_eq!(s.first_op_id(Block::new(0)), 0);
        assert_eq!(s.last_op_id(Block::new(0)), 4);
        assert_eq!(s.block_count(), 1);
    }

    #[test]
    #[should_panic(expected = "instruction ids are even")]
    fn odd_instruction_id() {
        let mut s = store();

        s.init_op_id_maps(2);
        s.instruction_for_id(1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn block_for_id_out_of_range() {
        let mut s = store();

        s.init_op_id_maps(2);
        s.block_for_id(4);
    }

    #[test]
    fn processed_values() {
        let s = store();

        assert!(s.is_processed(&Value::reg(PReg::int(1), ValueKind::I64)));
        assert!(!s.is_processed(&Value::reg(PReg::int(5), ValueKind::I64)));
        assert!(s.is_processed(&Value::var(9, ValueKind::I64)));
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut s = store();

        s.get_or_create_interval(v(1), ValueKind::I32).add_range(0, 4);
        s.get_or_create_interval(v(1), ValueKind::I32).add_range(4, 8);
        s.get_or_create_fixed_interval(PReg::int(0)).add_range(2, 3);

        assert_eq!(s.intervals().count(), 1);
        assert_eq!(s.interval_for(v(1)).map(|i| i.to()), Some(8));
        assert_eq!(s.fixed_intervals().count(), 1);
        assert!(s.interval_for(v(2)).is_none());
    }

    #[test]
    fn derived_intervals_grow_past_operands() {
        let mut s = store();

        s.get_or_create_interval(v(0), ValueKind::F64);

        let first = s.create_derived_interval(v(0));
        let second = s.create_derived_interval(v(0));

        assert_eq!(first, v(4));
        assert_eq!(second, v(5));
        assert_eq!(s.first_derived_interval_index(), Some(4));
        assert!(s.has_derived_intervals());
        assert_eq!(s.intervals_size(), 6);
        assert_eq!(s.interval_for(second).map(|i| i.kind()), Some(ValueKind::F64));

        for _ in 0..20 {
            s.create_derived_interval(v(0));
        }

        assert_eq!(s.intervals_size(), 26);
    }

    #[test]
    fn split_children_cover_their_ranges() {
        let mut s = store();
        let i = s.get_or_create_interval(v(0), ValueKind::I64);

        i.add_range(2, 20);
        i.add_use_pos(16, RegisterPriority::MustHaveRegister);
        i.add_use_pos(4, RegisterPriority::MustHaveRegister);

        let upper = s.split_interval_at(v(0), 10).unwrap();
        let middle = s.split_interval_at(v(0), 6).unwrap();

        assert_eq!(s.interval_for(v(0)).unwrap().split_children(), [middle, upper]);
        assert_eq!(s.split_child_at_op_id(v(0), 4, OperandRole::Input), Ok(v(0)));
        assert_eq!(s.split_child_at_op_id(upper, 8, OperandRole::Input), Ok(middle));
        assert_eq!(s.split_child_at_op_id(v(0), 10, OperandRole::Input), Ok(middle));
        assert_eq!(s.split_child_at_op_id(v(0), 10, OperandRole::Output), Ok(upper));
        assert_eq!(s.interval_for(upper).unwrap().use_pos().len(), 1);
        assert!(matches!(
            s.split_child_at_op_id(v(0), 30, OperandRole::Input),
            Err(AllocError::MissingSplitChild { .. })
        ));
        assert!(matches!(
            s.split_interval_at(v(0), 20),
            Err(AllocError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn materialized_children() {
        let mut s = store();
        let i = s.get_or_create_interval(v(0), ValueKind::I64);

        i.add_range(0, 10);
        i.set_materialized_value(Some(crate::lir::Constant::new(ValueKind::I64, 1)));

        let child = s.split_interval_at(v(0), 6).unwrap();

        s.set_location(v(0), Location::Register(PReg::int(0)));

        assert_eq!(s.is_materialized(v(0), 2, OperandRole::Input), Ok(false));
        assert_eq!(s.is_materialized(v(0), 8, OperandRole::Input), Ok(true));

        s.set_location(child, Location::Stack(StackSlot::local(0)));

        assert_eq!(s.is_materialized(v(0), 8, OperandRole::Input), Ok(false));
    }

    #[test]
    fn sorting() {
        let mut s = store();

        s.get_or_create_interval(v(0), ValueKind::I64).add_range(4, 10);
        s.get_or_create_interval(v(1), ValueKind::I64).add_range(0, 6);
        s.get_or_create_interval(v(2), ValueKind::I64).add_range(8, 12);
        s.get_or_create_interval(v(3), ValueKind::I64);

        let sorted = s.sorted_intervals();

        assert_eq!(sorted, [v(1), v(0), v(2)]);

        let child = s.split_interval_at(v(1), 2).unwrap();
        let merged = s.sort_intervals_after_allocation(&sorted);

        assert_eq!(merged, [v(1), child, v(0), v(2)]);

        s.interval_for_mut(v(0)).unwrap().set_spill_definition_pos(4);
        s.interval_for_mut(v(2)).unwrap().set_spill_definition_pos(2);

        let mut by_spill = vec![v(0), v(1), v(2)];

        s.sort_intervals_by_spill_pos(&mut by_spill);

        assert_eq!(by_spill, [v(2), v(0), v(1)]);
    }

    #[test]
    fn unhandled_lists() {
        let mut s = store();

        s.get_or_create_interval(v(0), ValueKind::I64).add_range(4, 10);
        s.get_or_create_interval(v(1), ValueKind::I64).add_range(0, 6);
        s.set_location(v(0), Location::Stack(StackSlot::local(8)));
        s.set_location(v(1), Location::Register(PReg::int(0)));

        assert_eq!(s.unhandled_intervals(is_variable_interval), [v(1), v(0)]);
        assert_eq!(s.unhandled_intervals(is_stack_interval), [v(0)]);
    }

    #[test]
    fn sorted_fixed() {
        let mut s = store();

        s.get_or_create_fixed_interval(PReg::float(0)).add_range(2, 3);
        s.get_or_create_fixed_interval(PReg::int(1)).add_range(6, 7);
        s.get_or_create_fixed_interval(PReg::int(0));

        assert_eq!(s.sorted_fixed_intervals(), [PReg::float(0), PReg::int(1)]);
    }
}
