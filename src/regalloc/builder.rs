//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{
    Constant, LirInst, Location, OperandFlags, OperandRole, PReg, VReg, Value, ValueKind,
};
use crate::regalloc::{
    AllocError, AllocatorOptions, CallingConvention, IntervalHint, IntervalStore, RegisterPriority,
    SpillState, TraceInterval,
};

/// Gets the priority of a read (an `Input` or `Alive` operand) from the
/// operand's flags.
pub fn register_priority_of_input(flags: OperandFlags) -> RegisterPriority {
    if flags.contains(OperandFlags::OUTGOING) {
        RegisterPriority::None
    } else if flags.contains(OperandFlags::STACK) {
        RegisterPriority::ShouldHaveRegister
    } else {
        RegisterPriority::MustHaveRegister
    }
}

/// Applies the effect of a single operand of a single instruction to the
/// intervals of a trace.
///
/// Every operation assumes it is called in reverse program order: the
/// instruction with the highest id first, and within an instruction in the
/// order caller-saved registers, outputs, temps, alives, inputs, states.
pub struct IntervalBuilder<'a> {
    store: &'a mut IntervalStore,
    options: &'a AllocatorOptions,
    convention: &'a dyn CallingConvention,
}

impl<'a> IntervalBuilder<'a> {
    /// Creates a builder that updates `store`.
    pub fn new(
        store: &'a mut IntervalStore,
        options: &'a AllocatorOptions,
        convention: &'a dyn CallingConvention,
    ) -> Self {
        Self {
            store,
            options,
            convention,
        }
    }

    /// The store being updated.
    #[inline]
    pub fn store(&self) -> &IntervalStore {
        self.store
    }

    /// The store being updated, mutably.
    #[inline]
    pub fn store_mut(&mut self) -> &mut IntervalStore {
        self.store
    }

    /// Blocks every allocatable caller-saved register for the one instruction
    /// at `op_id`, if `inst` destroys them.
    pub fn visit_caller_saved_registers<I: LirInst + ?Sized>(&mut self, inst: &I, op_id: i32) {
        if !inst.destroys_caller_saved_registers() {
            return;
        }

        let clobbered: Vec<PReg> = self
            .store
            .registers()
            .caller_saved()
            .iter()
            .copied()
            .filter(|&reg| self.store.registers().is_allocatable(reg))
            .collect();

        for reg in clobbered {
            self.store
                .get_or_create_fixed_interval(reg)
                .add_range(op_id, op_id + 1);
        }
    }

    /// Handles `value` being defined by `inst` at `op_id`.
    pub fn visit_output<I: LirInst + ?Sized>(
        &mut self,
        inst: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError> {
        if !self.store.is_processed(value) {
            return Ok(());
        }

        match *value {
            Value::Register(reg, _) => self.add_fixed_def(reg, op_id),
            Value::Variable(vreg, kind) => {
                let priority = self.register_priority_of_output(inst);
                let materialized = self.materialized_value(inst, value);
                let interval = self.store.get_or_create_interval(vreg, kind);

                if interval.is_empty() {
                    interval.add_range(op_id, op_id + 1);

                    log::warn!("definition of {vreg} at {op_id} occurs without use");
                } else {
                    interval.set_from(op_id);
                }

                if !inst.is_label() {
                    interval.add_use_pos(op_id, priority);
                }

                self.record_definition(vreg, kind, op_id, inst.is_label(), materialized)?;
                self.handle_method_argument(inst, vreg);
            }
            _ => {}
        }

        self.add_register_hint(inst, value, OperandRole::Output, flags, true);

        Ok(())
    }

    /// Handles `value` being defined by the label `label` at `op_id` in a
    /// trace that is already in SSI form. The uses of the block have made the
    /// interval live from the start of the block, so only its start moves.
    pub fn visit_incoming<I: LirInst + ?Sized>(
        &mut self,
        label: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError> {
        debug_assert!(label.is_label());

        if !self.store.is_processed(value) {
            return Ok(());
        }

        match *value {
            Value::Register(reg, _) => self.add_fixed_def(reg, op_id),
            Value::Variable(vreg, kind) => {
                let interval = self.store.get_or_create_interval(vreg, kind);

                // a dead incoming value has nothing to widen
                if interval.is_empty() {
                    interval.add_range(op_id, op_id + 1);

                    log::warn!("incoming {vreg} at {op_id} occurs without use");
                } else if interval.from() > op_id {
                    interval.set_from(op_id);
                }

                self.record_definition(vreg, kind, op_id, true, None)?;
            }
            _ => {}
        }

        self.add_register_hint(label, value, OperandRole::Output, flags, true);

        Ok(())
    }

    /// Handles `value` leaving the block through the terminator `terminator`
    /// at `op_id` in a trace that is already in SSI form. An interval that
    /// is already live here has its ends moved, anything else starts out live
    /// from the start of the block.
    pub fn visit_outgoing<I: LirInst + ?Sized>(
        &mut self,
        terminator: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if !self.store.is_processed(value) {
            return;
        }

        let priority = register_priority_of_input(flags);

        match *value {
            Value::Register(reg, _) => {
                self.store
                    .get_or_create_fixed_interval(reg)
                    .add_range(block_from, op_id + 1);
            }
            Value::Variable(vreg, kind) => {
                let interval = self.store.get_or_create_interval(vreg, kind);

                if interval.is_empty() || interval.from() > op_id + 1 {
                    interval.add_range(block_from, op_id + 1);
                } else {
                    if interval.from() > block_from {
                        interval.set_from(block_from);
                    }

                    if interval.to() < op_id + 1 {
                        interval.set_to(op_id + 1);
                    }
                }

                interval.add_use_pos(op_id, priority);
            }
            _ => {}
        }

        self.add_register_hint(terminator, value, OperandRole::Alive, flags, false);
    }

    /// Handles `value` being clobbered by `inst` at `op_id`.
    pub fn visit_temp<I: LirInst + ?Sized>(
        &mut self,
        inst: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if !self.store.is_processed(value) {
            return;
        }

        match *value {
            Value::Register(reg, _) => {
                self.store
                    .get_or_create_fixed_interval(reg)
                    .add_range(op_id, op_id + 1);
            }
            Value::Variable(vreg, kind) => {
                let interval = self.store.get_or_create_interval(vreg, kind);

                if interval.is_empty() {
                    interval.add_range(op_id, op_id + 1);
                } else if interval.from() > op_id {
                    interval.set_from(op_id);
                }

                interval.add_use_pos(op_id, RegisterPriority::MustHaveRegister);
                interval.add_materialization_value(None);
            }
            _ => {}
        }

        self.add_register_hint(inst, value, OperandRole::Temp, flags, true);
    }

    /// Handles `value` having to survive `inst` at `op_id`. The value is
    /// assumed live from the start of the block, until a definition says otherwise.
    pub fn visit_alive<I: LirInst + ?Sized>(
        &mut self,
        inst: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if !self.store.is_processed(value) {
            return;
        }

        self.add_use(value, block_from, op_id + 1, register_priority_of_input(flags));
        self.add_register_hint(inst, value, OperandRole::Alive, flags, false);
    }

    /// Handles `value` being read by `inst` at `op_id`.
    pub fn visit_input<I: LirInst + ?Sized>(
        &mut self,
        inst: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if !self.store.is_processed(value) {
            return;
        }

        self.add_use(value, block_from, op_id, register_priority_of_input(flags));
        self.add_register_hint(inst, value, OperandRole::Input, flags, false);
    }

    /// Handles `value` being referenced by the debug info of the instruction
    /// at `op_id`. It has to be somewhere, but never needs a register.
    pub fn visit_state(&mut self, op_id: i32, block_from: i32, value: &Value) {
        if !self.store.is_processed(value) {
            return;
        }

        self.add_use(value, block_from, op_id + 1, RegisterPriority::None);
    }

    fn add_use(&mut self, value: &Value, from: i32, to: i32, priority: RegisterPriority) {
        match *value {
            Value::Register(reg, _) => {
                self.store
                    .get_or_create_fixed_interval(reg)
                    .add_range(from, to);
            }
            Value::Variable(vreg, kind) => {
                let interval = self.store.get_or_create_interval(vreg, kind);

                interval.add_range(from, to);
                interval.add_use_pos(to & !1, priority);
            }
            _ => {}
        }
    }

    fn add_fixed_def(&mut self, reg: PReg, op_id: i32) {
        let interval = self.store.get_or_create_fixed_interval(reg);

        if !interval.is_empty() && interval.from() <= op_id {
            interval.set_from(op_id);
        } else {
            interval.add_range(op_id, op_id + 1);
        }
    }

    fn register_priority_of_output<I: LirInst + ?Sized>(&self, inst: &I) -> RegisterPriority {
        if inst.is_label() {
            return RegisterPriority::None;
        }

        match inst.move_source() {
            Some(source) if self.convention.is_unoptimizable_method_argument(&source) => {
                RegisterPriority::None
            }
            _ => RegisterPriority::MustHaveRegister,
        }
    }

    // spill state and rematerialization candidate of one definition
    fn record_definition(
        &mut self,
        vreg: VReg,
        kind: ValueKind,
        op_id: i32,
        is_label: bool,
        materialized: Option<Constant>,
    ) -> Result<(), AllocError> {
        let trace = self.store.trace_id();
        let interval = self.store.get_or_create_interval(vreg, kind);

        change_spill_definition_pos(interval, is_label, op_id).map_err(|state| {
            AllocError::InvalidSpillState {
                trace,
                vreg,
                op_id,
                state,
            }
        })?;

        let materialized = materialized.filter(|_| self.allows_materialization(vreg));

        self.store
            .get_or_create_interval(vreg, kind)
            .add_materialization_value(materialized);

        Ok(())
    }

    // method arguments that stay in the caller's frame start out spilled
    // to their own slot
    fn handle_method_argument<I: LirInst + ?Sized>(&mut self, inst: &I, vreg: VReg) {
        let Some(source) = inst.move_source() else {
            return;
        };

        if !self.convention.is_unoptimizable_method_argument(&source) {
            return;
        }

        if let (Some(slot), Some(interval)) =
            (Location::of_value(source), self.store.interval_for_mut(vreg))
        {
            interval.set_spill_slot(slot);
            interval.set_location(slot);
            interval.set_spill_state(SpillState::StartInMemory);
        }
    }

    /// The constant that the value `value` defined by `inst` could be
    /// rematerialized from, if it is a constant load.
    fn materialized_value<I: LirInst + ?Sized>(&self, inst: &I, value: &Value) -> Option<Constant> {
        match inst.load_constant() {
            Some((result, constant)) if result == *value => Some(constant),
            _ => None,
        }
    }

    // rematerializing an interval with uses that accept the stack would add
    // constant loads where none are needed
    fn allows_materialization(&self, vreg: VReg) -> bool {
        if self.options.never_spill_constants {
            return true;
        }

        if !self.options.constants_to_stack {
            return false;
        }

        self.store.interval_for(vreg).map_or(true, |interval| {
            interval
                .use_pos()
                .iter()
                .all(|(_, p)| p != RegisterPriority::ShouldHaveRegister)
        })
    }

    /// Records a location hint between `target` and the operand `inst` pairs
    /// it with. Hints go from the definition to the use, `hint_at_def` says
    /// which side `target` is on.
    ///
    /// Only variable intervals get hints, and the first hint an interval gets
    /// is the one it keeps.
    pub fn add_register_hint<I: LirInst + ?Sized>(
        &mut self,
        inst: &I,
        target: &Value,
        role: OperandRole,
        flags: OperandFlags,
        hint_at_def: bool,
    ) {
        if !flags.contains(OperandFlags::HINT) || !target.is_variable_or_register() {
            return;
        }

        let Some(partner) = inst.register_hint(target, role) else {
            return;
        };

        if !partner.is_variable_or_register() || !self.store.is_processed(&partner) {
            return;
        }

        let (from, to) = if hint_at_def {
            (partner, *target)
        } else {
            (*target, partner)
        };

        let (receiver, kind, hint) = match (to, from) {
            (Value::Register(..), Value::Register(..)) => return,
            (Value::Register(reg, _), Value::Variable(vreg, kind)) => {
                (vreg, kind, IntervalHint::Fixed(reg))
            }
            (Value::Variable(vreg, kind), Value::Register(reg, _)) => {
                (vreg, kind, IntervalHint::Fixed(reg))
            }
            (Value::Variable(vreg, kind), Value::Variable(other, _)) => {
                (vreg, kind, IntervalHint::Variable(other))
            }
            _ => return,
        };

        let interval = self.store.get_or_create_interval(receiver, kind);

        if interval.location_hint().is_none() {
            interval.set_location_hint(hint);

            log::trace!("hint {receiver} -> {hint}");
        }
    }
}

/// Advances the spill state of `interval` for a definition at `def_pos`.
///
/// Definitions are found in reverse order. Returns the offending state if
/// the interval is in a state only the allocator should have put it in.
pub fn change_spill_definition_pos(
    interval: &mut TraceInterval,
    is_label: bool,
    def_pos: i32,
) -> Result<(), SpillState> {
    debug_assert!(interval.is_split_parent(), "only split parents have spill states");

    match interval.spill_state() {
        SpillState::NoDefinitionFound => {
            interval.set_spill_definition_pos(def_pos);

            // labels are promoted after the whole trace has been seen
            if !is_label {
                interval.set_spill_state(SpillState::NoSpillStore);
            }
        }
        SpillState::NoSpillStore => {
            let first = interval
                .spill_definition_pos()
                .expect("an interval with a store has a definition");

            debug_assert!(def_pos <= first, "definitions must be visited in reverse");

            // two-address forms define twice in a row, anything further apart
            // is a real second definition
            if def_pos < first - 2 {
                interval.set_spill_state(SpillState::NoOptimization);
            }
        }
        SpillState::NoOptimization | SpillState::StartInMemory => {}
        other => return Err(other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{Block, GenericInst, StackSlot, TraceId, ValueKind};
    use crate::regalloc::{Range, RegisterConfig, StackArgumentConvention};

    fn store() -> IntervalStore {
        IntervalStore::new(
            TraceId::new(0),
            vec![Block::new(0)],
            RegisterConfig::generic(2, 2, 1),
            8,
        )
    }

    fn v(n: u32) -> Value {
        Value::var(n, ValueKind::I64)
    }

    fn r(n: usize) -> Value {
        Value::reg(PReg::int(n), ValueKind::I64)
    }

    fn ranges(store: &IntervalStore, n: u32) -> Vec<Range> {
        store.interval_for(VReg::new(n)).unwrap().ranges().collect()
    }

    fn uses(store: &IntervalStore, n: u32) -> Vec<(i32, RegisterPriority)> {
        store.interval_for(VReg::new(n)).unwrap().use_pos().iter().collect()
    }

    const REG: OperandFlags = OperandFlags::REG;

    #[test]
    fn input_priorities() {
        assert_eq!(register_priority_of_input(REG), RegisterPriority::MustHaveRegister);
        assert_eq!(
            register_priority_of_input(REG | OperandFlags::STACK),
            RegisterPriority::ShouldHaveRegister
        );
        assert_eq!(
            register_priority_of_input(OperandFlags::STACK | OperandFlags::OUTGOING),
            RegisterPriority::None
        );
    }

    #[test]
    fn def_tightens_range() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let def = GenericInst::op("def").output(v(0));
        let useop = GenericInst::op("use").input(v(0));

        b.visit_input(&useop, 8, 0, &v(0), REG);
        b.visit_output(&def, 4, &v(0), REG).unwrap();

        assert_eq!(ranges(&s, 0), [Range::new(4, 8)]);
        assert_eq!(
            uses(&s, 0),
            [
                (8, RegisterPriority::MustHaveRegister),
                (4, RegisterPriority::MustHaveRegister)
            ]
        );
        assert_eq!(
            s.interval_for(VReg::new(0)).unwrap().spill_state(),
            SpillState::NoSpillStore
        );
    }

    #[test]
    fn dead_def_is_one_wide() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let def = GenericInst::op("def").output(v(1));

        b.visit_output(&def, 6, &v(1), REG).unwrap();

        assert_eq!(ranges(&s, 1), [Range::new(6, 7)]);
    }

    #[test]
    fn labels_have_no_use_position() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let label = GenericInst::label(vec![v(2)]);
        let useop = GenericInst::op("use").input(v(2));

        b.visit_input(&useop, 4, 0, &v(2), REG);
        b.visit_output(&label, 0, &v(2), REG | OperandFlags::STACK).unwrap();

        let interval = s.interval_for(VReg::new(2)).unwrap();

        assert_eq!(uses(&s, 2), [(4, RegisterPriority::MustHaveRegister)]);
        assert_eq!(interval.spill_state(), SpillState::NoDefinitionFound);
        assert_eq!(interval.spill_definition_pos(), Some(0));
    }

    #[test]
    fn alive_and_state_end_after_the_instruction() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let inst = GenericInst::op("x");

        b.visit_alive(&inst, 6, 2, &v(0), REG | OperandFlags::STACK);
        b.visit_state(4, 2, &v(1));

        assert_eq!(ranges(&s, 0), [Range::new(2, 7)]);
        assert_eq!(uses(&s, 0), [(6, RegisterPriority::ShouldHaveRegister)]);
        assert_eq!(ranges(&s, 1), [Range::new(2, 5)]);
        assert_eq!(uses(&s, 1), [(4, RegisterPriority::None)]);
    }

    #[test]
    fn temps() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let inst = GenericInst::op("x");

        b.visit_temp(&inst, 6, &v(0), REG);
        b.visit_temp(&inst, 6, &r(1), REG);
        b.visit_temp(&inst, 6, &r(7), REG);

        assert_eq!(ranges(&s, 0), [Range::new(6, 7)]);
        assert_eq!(uses(&s, 0), [(6, RegisterPriority::MustHaveRegister)]);
        assert_eq!(
            s.fixed_interval_for(PReg::int(1)).unwrap().ranges().collect::<Vec<_>>(),
            [Range::new(6, 7)]
        );
        assert!(s.fixed_interval_for(PReg::int(7)).is_none());
    }

    #[test]
    fn priorities_are_per_position() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let inst = GenericInst::op("x");

        b.visit_input(&inst, 10, 0, &v(0), REG | OperandFlags::STACK);
        b.visit_temp(&inst, 6, &v(0), REG);

        assert_eq!(
            uses(&s, 0),
            [
                (10, RegisterPriority::ShouldHaveRegister),
                (6, RegisterPriority::MustHaveRegister)
            ]
        );
    }

    #[test]
    fn fixed_defs() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let inst = GenericInst::op("x");

        b.visit_input(&inst, 8, 0, &r(0), REG);
        b.visit_output(&inst, 4, &r(0), REG).unwrap();
        b.visit_output(&inst, 2, &r(1), REG).unwrap();

        let fixed = |reg| -> Vec<Range> {
            s.fixed_interval_for(PReg::int(reg)).unwrap().ranges().collect()
        };

        assert_eq!(fixed(0), [Range::new(4, 8)]);
        assert_eq!(fixed(1), [Range::new(2, 3)]);
    }

    #[test]
    fn calls_block_caller_saved() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);

        b.visit_caller_saved_registers(&GenericInst::op("call").clobbers_caller_saved(), 4);
        b.visit_caller_saved_registers(&GenericInst::op("add"), 2);

        let blocked: Vec<_> = s.fixed_intervals().map(|(reg, _)| reg).collect();

        assert_eq!(blocked, [PReg::int(0), PReg::float(0)]);
        assert!(s.fixed_interval_for(PReg::int(0)).unwrap().covers(4));
        assert!(!s.fixed_interval_for(PReg::int(0)).unwrap().covers(2));
    }

    #[test]
    fn spill_state_machine() {
        let mut i = TraceInterval::new(VReg::new(0), ValueKind::I64);

        assert_eq!(change_spill_definition_pos(&mut i, false, 10), Ok(()));
        assert_eq!(i.spill_state(), SpillState::NoSpillStore);

        assert_eq!(change_spill_definition_pos(&mut i, false, 8), Ok(()));
        assert_eq!(i.spill_state(), SpillState::NoSpillStore);

        assert_eq!(change_spill_definition_pos(&mut i, false, 6), Ok(()));
        assert_eq!(i.spill_state(), SpillState::NoOptimization);

        assert_eq!(change_spill_definition_pos(&mut i, false, 2), Ok(()));
        assert_eq!(i.spill_state(), SpillState::NoOptimization);
        assert_eq!(i.spill_definition_pos(), Some(10));

        i.set_spill_state(SpillState::OneSpillStore);

        assert_eq!(
            change_spill_definition_pos(&mut i, false, 0),
            Err(SpillState::OneSpillStore)
        );
    }

    #[test]
    fn invalid_spill_state_is_an_error() {
        let mut s = store();
        let opts = AllocatorOptions::default();

        s.get_or_create_interval(VReg::new(0), ValueKind::I64)
            .set_spill_state(SpillState::StoreAtDefinition);

        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let err = b.visit_output(&GenericInst::op("x"), 2, &v(0), REG);

        assert!(matches!(
            err,
            Err(AllocError::InvalidSpillState {
                op_id: 2,
                state: SpillState::StoreAtDefinition,
                ..
            })
        ));
    }

    #[test]
    fn move_hints_go_to_the_variable() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let to_reg = GenericInst::mov(r(0), v(1));
        let from_reg = GenericInst::mov(v(2), r(1));
        let hint = REG | OperandFlags::HINT;

        b.visit_output(&to_reg, 10, &r(0), hint).unwrap();
        b.visit_input(&to_reg, 10, 0, &v(1), hint);
        b.visit_output(&from_reg, 4, &v(2), hint).unwrap();

        let hint_of = |n| s.interval_for(VReg::new(n)).unwrap().location_hint();

        assert_eq!(hint_of(1), Some(IntervalHint::Fixed(PReg::int(0))));
        assert_eq!(hint_of(2), Some(IntervalHint::Fixed(PReg::int(1))));
    }

    #[test]
    fn first_hint_wins() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let hint = REG | OperandFlags::HINT;
        let later = GenericInst::mov(v(3), v(1));
        let earlier = GenericInst::mov(v(3), v(2));

        b.visit_output(&later, 8, &v(3), hint).unwrap();
        b.visit_output(&earlier, 4, &v(3), hint).unwrap();

        assert_eq!(
            s.interval_for(VReg::new(3)).unwrap().location_hint(),
            Some(IntervalHint::Variable(VReg::new(1)))
        );
    }

    #[test]
    fn stack_method_arguments_have_no_priority() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let arg = Value::Stack(StackSlot::caller(16), ValueKind::I64);
        let load = GenericInst::mov(v(0), arg);

        b.visit_input(&GenericInst::op("use"), 6, 0, &v(0), REG);
        b.visit_output(&load, 2, &v(0), REG).unwrap();

        let interval = s.interval_for(VReg::new(0)).unwrap();

        assert_eq!(uses(&s, 0)[1], (2, RegisterPriority::None));
        assert_eq!(interval.spill_slot(), Location::of_value(arg));
        assert_eq!(interval.location(), Location::of_value(arg));
        assert_eq!(interval.spill_state(), SpillState::StartInMemory);
    }

    #[test]
    fn incoming_values_move_the_start() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let label = GenericInst::label(vec![v(0), v(1)]);

        b.visit_input(&GenericInst::op("use"), 6, 2, &v(0), REG);
        b.store_mut()
            .interval_for_mut(VReg::new(0))
            .unwrap()
            .set_from(4);
        b.visit_incoming(&label, 2, &v(0), OperandFlags::empty())
            .unwrap();
        b.visit_incoming(&label, 2, &v(1), OperandFlags::empty())
            .unwrap();

        assert_eq!(ranges(&s, 0), [Range::new(2, 6)]);
        assert_eq!(uses(&s, 0), [(6, RegisterPriority::MustHaveRegister)]);
        assert_eq!(ranges(&s, 1), [Range::new(2, 3)]);

        // labels only record where the definition is
        let interval = s.interval_for(VReg::new(0)).unwrap();

        assert_eq!(interval.spill_state(), SpillState::NoDefinitionFound);
        assert_eq!(interval.spill_definition_pos(), Some(2));
    }

    #[test]
    fn outgoing_values_move_the_ends() {
        let mut s = store();
        let opts = AllocatorOptions::default();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);
        let jump = GenericInst::jump(Block::new(0), vec![v(0), v(0)]);
        let outgoing = OperandFlags::STACK | OperandFlags::OUTGOING;

        b.visit_outgoing(&jump, 6, 2, &v(0), outgoing);

        assert_eq!(ranges(b.store(), 0), [Range::new(2, 7)]);

        // passing the value twice widens the one range that is already there
        b.store_mut()
            .interval_for_mut(VReg::new(0))
            .unwrap()
            .set_to(5);
        b.visit_outgoing(&jump, 6, 2, &v(0), outgoing);

        assert_eq!(ranges(&s, 0), [Range::new(2, 7)]);
        assert_eq!(uses(&s, 0), [(6, RegisterPriority::None)]);
    }

    #[test]
    fn constants_are_rematerialized() {
        let c = Constant::new(ValueKind::I64, 42);
        let load = GenericInst::load_const(v(0), c);
        let opts = AllocatorOptions::default();

        let mut s = store();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);

        b.visit_input(&GenericInst::op("use"), 6, 0, &v(0), REG);
        b.visit_output(&load, 2, &v(0), REG).unwrap();

        assert_eq!(s.interval_for(VReg::new(0)).unwrap().materialized_value(), Some(c));

        // a use that accepts the stack would rather reload than rematerialize
        let mut s = store();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);

        b.visit_input(&GenericInst::op("use"), 6, 0, &v(0), REG | OperandFlags::STACK);
        b.visit_output(&load, 2, &v(0), REG).unwrap();

        assert_eq!(s.interval_for(VReg::new(0)).unwrap().materialized_value(), None);

        let never = AllocatorOptions {
            never_spill_constants: true,
            ..opts
        };
        let mut s = store();
        let mut b = IntervalBuilder::new(&mut s, &never, &StackArgumentConvention);

        b.visit_input(&GenericInst::op("use"), 6, 0, &v(0), REG | OperandFlags::STACK);
        b.visit_output(&load, 2, &v(0), REG).unwrap();

        assert_eq!(s.interval_for(VReg::new(0)).unwrap().materialized_value(), Some(c));
    }

    #[test]
    fn temps_clear_materialization() {
        let c = Constant::new(ValueKind::I64, 1);
        let opts = AllocatorOptions::default();
        let mut s = store();
        let mut b = IntervalBuilder::new(&mut s, &opts, &StackArgumentConvention);

        b.visit_temp(&GenericInst::op("x"), 6, &v(0), REG);
        b.visit_output(&GenericInst::load_const(v(0), c), 2, &v(0), REG)
            .unwrap();

        assert!(!s.interval_for(VReg::new(0)).unwrap().can_materialize());
    }
}
