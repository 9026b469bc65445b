//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Builds the intervals of a single trace by walking its instructions
//! backwards.
//!
//! Code is in SSI form, so no value is live across a block boundary without
//! being passed through a terminator and a label. That means no liveness
//! sets are needed: every interval is discovered by the instructions that
//! use it, and extended back to the start of the block until a definition
//! is found.

use crate::lir::{
    ssi, Block, InstRef, Lir, LirInst, Location, Trace, TraceBuilderResult, Value,
};
use crate::regalloc::{
    AllocError, AllocatorOptions, CallingConvention, IntervalBuilder, IntervalHint, IntervalStore,
    RegisterConfig, SpillState,
};

/// Assigns ids to every instruction of `trace`, and returns the number of
/// instructions that were numbered.
///
/// Ids are even and increase along the trace: the label of the first block
/// is `0`, the terminator of the last block is `2 * (n - 1)`.
pub fn number_instructions<I: LirInst>(lir: &mut Lir<I>, trace: &Trace) -> usize {
    let mut next = 0;

    for &block in trace.blocks() {
        for inst in lir.insts_mut(block) {
            inst.set_id(next);
            next += 2;
        }
    }

    (next >> 1) as usize
}

/// Creates the store for `trace`, with the id tables filled in for the
/// layout of `lir`.
pub(crate) fn prepare_store<I: LirInst>(
    lir: &Lir<I>,
    trace: &Trace,
    registers: &RegisterConfig,
) -> IntervalStore {
    let count = trace
        .blocks()
        .iter()
        .map(|&block| lir.insts(block).len())
        .sum();

    let mut store = IntervalStore::new(
        trace.id(),
        trace.blocks().to_vec(),
        registers.clone(),
        lir.variable_count(),
    );

    store.init_op_id_maps(count);

    let mut index = 0;

    for &block in trace.blocks() {
        let len = lir.insts(block).len();
        let first = (index << 1) as i32;

        for i in 0..len {
            store.put_op_id_maps(index + i, InstRef { block, index: i });
        }

        index += len;

        store.put_block_ids(block, first, ((index - 1) << 1) as i32);
    }

    store
}

/// Calls the builder on every operand of `inst`, in the order the
/// operations expect.
pub(crate) fn visit_instruction<I: LirInst>(
    builder: &mut IntervalBuilder<'_>,
    inst: &I,
    op_id: i32,
    block_from: i32,
) -> Result<(), AllocError> {
    debug_assert!(
        inst.id() == -1 || inst.id() == op_id,
        "instruction numbered {} is at {op_id}",
        inst.id()
    );

    builder.visit_caller_saved_registers(inst, op_id);

    let mut result = Ok(());

    inst.visit_each_output(&mut |value, flags| {
        if result.is_ok() {
            result = builder.visit_output(inst, op_id, value, flags);
        }
    });

    result?;

    inst.visit_each_temp(&mut |value, flags| builder.visit_temp(inst, op_id, value, flags));
    inst.visit_each_alive(&mut |value, flags| {
        builder.visit_alive(inst, op_id, block_from, value, flags)
    });
    inst.visit_each_input(&mut |value, flags| {
        builder.visit_input(inst, op_id, block_from, value, flags)
    });
    inst.visit_each_state(&mut |value, _| builder.visit_state(op_id, block_from, value));

    Ok(())
}

/// Promotes intervals that are only defined by labels. Their definition is
/// only known once the whole trace has been walked.
pub(crate) fn finish_store(store: &mut IntervalStore) {
    for (_, interval) in store.intervals_mut() {
        if interval.spill_state() == SpillState::NoDefinitionFound
            && interval.spill_definition_pos().is_some()
        {
            interval.set_spill_state(SpillState::NoSpillStore);
        }
    }
}

/// Adds the `[-1, 0)` range to every fixed interval, so that the allocator
/// never needs to deal with a fixed interval that hasn't started yet.
pub(crate) fn add_fixed_sentinels(store: &mut IntervalStore) {
    for (_, interval) in store.fixed_intervals_mut() {
        interval.add_sentinel();
    }
}

/// Lifetime analysis for every trace of one function.
///
/// The function itself is only read, so a single analysis can be shared by
/// threads working on different traces. Instructions must have been numbered
/// with [`number_instructions`] first, or never numbered at all; ids are
/// derived from the block layout either way.
pub struct LifetimeAnalysis<'a, I> {
    lir: &'a Lir<I>,
    traces: &'a TraceBuilderResult,
    registers: &'a RegisterConfig,
    options: &'a AllocatorOptions,
    convention: &'a dyn CallingConvention,
}

impl<'a, I: LirInst> LifetimeAnalysis<'a, I> {
    /// Prepares to analyze traces of `lir`.
    pub fn new(
        lir: &'a Lir<I>,
        traces: &'a TraceBuilderResult,
        registers: &'a RegisterConfig,
        options: &'a AllocatorOptions,
        convention: &'a dyn CallingConvention,
    ) -> Self {
        Self {
            lir,
            traces,
            registers,
            options,
            convention,
        }
    }

    /// Builds every interval of `trace`.
    pub fn analyze(&self, trace: &Trace) -> Result<IntervalStore, AllocError> {
        log::debug!("lifetime analysis of {:?}", trace.id());

        let mut store = prepare_store(self.lir, trace, self.registers);

        {
            let mut builder = IntervalBuilder::new(&mut store, self.options, self.convention);

            for &block in trace.blocks().iter().rev() {
                self.build_block(&mut builder, block)?;
            }
        }

        finish_store(&mut store);

        if self.options.use_inter_trace_hints {
            add_inter_trace_hints(self.lir, self.traces, &mut store, trace);
        }

        add_fixed_sentinels(&mut store);

        log::debug!(
            "{:?}: {} instructions, {} intervals, {} fixed intervals",
            trace.id(),
            store.instruction_count(),
            store.intervals().count(),
            store.fixed_intervals().count()
        );

        Ok(store)
    }

    fn build_block(
        &self,
        builder: &mut IntervalBuilder<'_>,
        block: Block,
    ) -> Result<(), AllocError> {
        let block_from = builder.store().first_op_id(block);

        for (index, inst) in self.lir.insts(block).iter().enumerate().rev() {
            let op_id = block_from + ((index as i32) << 1);

            visit_instruction(builder, inst, op_id, block_from)?;
        }

        Ok(())
    }
}

/// Hints the labels of `trace` with whatever the already-allocated
/// predecessors of each block pass into it.
pub(crate) fn add_inter_trace_hints<I: LirInst>(
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    store: &mut IntervalStore,
    trace: &Trace,
) {
    for &block in trace.blocks() {
        for &pred in lir.preds(block) {
            if traces.trace_for_block(pred).id() > trace.id() {
                continue;
            }

            ssi::for_each_value_pair(lir, block, pred, |incoming, outgoing| {
                add_inter_trace_hint(store, incoming, outgoing)
            });
        }
    }
}

fn add_inter_trace_hint(store: &mut IntervalStore, incoming: &Value, outgoing: &Value) {
    let Some(vreg) = incoming.as_variable() else {
        return;
    };

    // a variable from an earlier trace has no interval in this store, so
    // only variables of this trace can be named by a hint
    let hint = match *outgoing {
        Value::Variable(other, _) if other != vreg && store.interval_for(other).is_some() => {
            Some(IntervalHint::Variable(other))
        }
        Value::Register(reg, _) if store.registers().is_allocatable(reg) => {
            Some(IntervalHint::Fixed(reg))
        }
        _ => None,
    };

    let Some(interval) = store.interval_for_mut(vreg) else {
        return;
    };

    match hint {
        Some(hint) => {
            if interval.location_hint().is_none() {
                interval.set_location_hint(hint);

                log::trace!("inter-trace hint {vreg} -> {hint}");
            }
        }
        None => {
            if let Some(slot) = Location::of_value(*outgoing).filter(|l| l.is_stack()) {
                if interval.spill_slot().is_none() {
                    interval.set_spill_slot(slot);
                }
            }
        }
    }
}

/// Numbers the instructions of `trace` and builds its intervals in one go.
pub fn analyze_trace<I: LirInst>(
    lir: &mut Lir<I>,
    traces: &TraceBuilderResult,
    trace: &Trace,
    registers: &RegisterConfig,
    options: &AllocatorOptions,
    convention: &dyn CallingConvention,
) -> Result<IntervalStore, AllocError> {
    number_instructions(lir, trace);

    LifetimeAnalysis::new(lir, traces, registers, options, convention).analyze(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{
        Constant, GenericInst, LirBuilder, OperandFlags, PReg, StackSlot, TraceId, VReg, ValueKind,
    };
    use crate::regalloc::{Range, RegisterPriority, StackArgumentConvention};

    fn v(n: u32) -> Value {
        Value::var(n, ValueKind::I64)
    }

    fn ranges(store: &IntervalStore, n: u32) -> Vec<Range> {
        store.interval_for(VReg::new(n)).unwrap().ranges().collect()
    }

    fn uses(store: &IntervalStore, n: u32) -> Vec<(i32, RegisterPriority)> {
        store.interval_for(VReg::new(n)).unwrap().use_pos().iter().collect()
    }

    //   b0:  0 label
    //        2 v0 = const #1
    //        4 v1 = add v0
    //        6 jump b1 (v1)
    //   b1:  8 label (v2)
    //       10 call v2 !clobbers
    //       12 ret
    fn straight_line() -> (Lir<GenericInst>, TraceBuilderResult) {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::load_const(v(0), Constant::new(ValueKind::I64, 1)));
        b.append(b0, GenericInst::op("add").output(v(1)).input(v(0)));
        b.terminate(b0, GenericInst::jump(b1, vec![v(1)]));
        b.append(b1, GenericInst::label(vec![v(2)]));
        b.append(b1, GenericInst::op("call").input(v(2)).clobbers_caller_saved());
        b.append(b1, GenericInst::op("ret"));

        (b.finish(), TraceBuilderResult::new(vec![vec![b0, b1]]))
    }

    fn analyze(lir: &mut Lir<GenericInst>, traces: &TraceBuilderResult, id: usize) -> IntervalStore {
        let trace = traces.trace(TraceId::new(id)).clone();

        analyze_trace(
            lir,
            traces,
            &trace,
            &RegisterConfig::generic(2, 2, 1),
            &AllocatorOptions::default(),
            &StackArgumentConvention,
        )
        .unwrap()
    }

    #[test]
    fn numbering() {
        let (mut lir, traces) = straight_line();
        let trace = traces.trace(TraceId::new(0)).clone();

        assert_eq!(number_instructions(&mut lir, &trace), 7);

        let ids: Vec<i32> = lir.insts(Block::new(1)).iter().map(|i| i.id()).collect();

        assert_eq!(ids, [8, 10, 12]);
    }

    #[test]
    fn id_tables() {
        let (mut lir, traces) = straight_line();
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(store.max_op_id(), 12);
        assert_eq!(store.first_op_id(Block::new(1)), 8);
        assert_eq!(store.last_op_id(Block::new(0)), 6);
        assert_eq!(store.block_for_id(7), Block::new(0));
        assert_eq!(
            store.instruction_for_id(10),
            InstRef {
                block: Block::new(1),
                index: 1
            }
        );
    }

    #[test]
    fn straight_line_intervals() {
        let (mut lir, traces) = straight_line();
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(ranges(&store, 0), [Range::new(2, 4)]);
        assert_eq!(
            uses(&store, 0),
            [
                (4, RegisterPriority::MustHaveRegister),
                (2, RegisterPriority::MustHaveRegister)
            ]
        );

        assert_eq!(ranges(&store, 1), [Range::new(4, 7)]);
        assert_eq!(
            uses(&store, 1),
            [
                (6, RegisterPriority::None),
                (4, RegisterPriority::MustHaveRegister)
            ]
        );

        assert_eq!(ranges(&store, 2), [Range::new(8, 10)]);
        assert_eq!(uses(&store, 2), [(10, RegisterPriority::MustHaveRegister)]);
    }

    #[test]
    fn spill_states_and_materialization() {
        let (mut lir, traces) = straight_line();
        let store = analyze(&mut lir, &traces, 0);
        let interval = |n| store.interval_for(VReg::new(n)).unwrap();

        assert_eq!(interval(0).spill_state(), SpillState::NoSpillStore);
        assert_eq!(
            interval(0).materialized_value(),
            Some(Constant::new(ValueKind::I64, 1))
        );
        assert_eq!(interval(1).materialized_value(), None);

        // only defined by a label, promoted at the end
        assert_eq!(interval(2).spill_state(), SpillState::NoSpillStore);
        assert_eq!(interval(2).spill_definition_pos(), Some(8));
    }

    #[test]
    fn fixed_intervals_end_with_the_sentinel() {
        let (mut lir, traces) = straight_line();
        let store = analyze(&mut lir, &traces, 0);
        let fixed: Vec<Range> = store
            .fixed_interval_for(PReg::int(0))
            .unwrap()
            .ranges()
            .collect();

        assert_eq!(fixed, [Range::new(-1, 0), Range::new(10, 11)]);
        assert!(store.fixed_interval_for(PReg::int(1)).is_none());
        assert_eq!(store.fixed_intervals().count(), 2);
    }

    #[test]
    fn hints_within_a_trace() {
        let (mut lir, traces) = straight_line();
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(
            store.interval_for(VReg::new(2)).unwrap().location_hint(),
            Some(IntervalHint::Variable(VReg::new(1)))
        );
    }

    #[test]
    fn hints_across_traces() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let b2 = b.create_block();
        let slot = Value::Stack(StackSlot::local(8), ValueKind::I64);
        let r1 = Value::reg(PReg::int(1), ValueKind::I64);

        b.append(b0, GenericInst::label(vec![]));
        b.terminate(b0, GenericInst::branch(&[b1, b2], vec![r1, slot]));
        b.append(b1, GenericInst::label(vec![v(0), v(1)]));
        b.append(b1, GenericInst::op("use").input(v(0)).input(v(1)));
        b.append(b2, GenericInst::label(vec![v(2), v(3)]));
        b.append(b2, GenericInst::op("use").input(v(2)).input(v(3)));

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0], vec![b1], vec![b2]]);
        let store = analyze(&mut lir, &traces, 1);
        let interval = |n| store.interval_for(VReg::new(n)).unwrap();

        assert_eq!(
            interval(0).location_hint(),
            Some(IntervalHint::Fixed(PReg::int(1)))
        );
        assert_eq!(interval(1).location_hint(), None);
        assert_eq!(
            interval(1).spill_slot(),
            Some(Location::Stack(StackSlot::local(8)))
        );
        assert!(store.interval_for(VReg::new(2)).is_none());
    }

    #[test]
    fn variables_of_earlier_traces_are_not_hints() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::op("def").output(v(0)));
        b.terminate(b0, GenericInst::jump(b1, vec![v(0)]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.append(b1, GenericInst::op("ret").input(v(1)));

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0], vec![b1]]);
        let store = analyze(&mut lir, &traces, 1);

        assert!(store.interval_for(VReg::new(0)).is_none());
        assert_eq!(store.interval_for(VReg::new(1)).unwrap().location_hint(), None);

        // in one trace, the outgoing value has an interval to point at
        let traces = TraceBuilderResult::new(vec![vec![b0, b1]]);
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(
            store.interval_for(VReg::new(1)).unwrap().location_hint(),
            Some(IntervalHint::Variable(VReg::new(0)))
        );
    }

    #[test]
    fn later_traces_give_no_hints() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();

        b.append(b0, GenericInst::label(vec![v(0)]));
        b.append(b0, GenericInst::op("ret").input(v(0)));
        b.append(b1, GenericInst::label(vec![]));
        b.terminate(b1, GenericInst::jump(b0, vec![v(1)]));

        let mut lir = b.finish();

        // b1 is allocated after b0, so its values are not known yet
        let traces = TraceBuilderResult::new(vec![vec![b0], vec![b1]]);
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(store.interval_for(VReg::new(0)).unwrap().location_hint(), None);
    }

    #[test]
    fn unprocessed_registers_are_ignored() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let sp = Value::reg(PReg::int(15), ValueKind::I64);

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::op("load").output(v(0)).input(sp));
        b.append(
            b0,
            GenericInst::op("ret").input_with(v(0), OperandFlags::REG | OperandFlags::STACK),
        );

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0]]);
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(store.fixed_intervals().count(), 0);
        assert_eq!(ranges(&store, 0), [Range::new(2, 4)]);
        assert_eq!(
            uses(&store, 0),
            [
                (4, RegisterPriority::ShouldHaveRegister),
                (2, RegisterPriority::MustHaveRegister)
            ]
        );
    }

    #[test]
    fn dead_definitions_are_one_wide() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::op("def").output(v(0)));
        b.append(b0, GenericInst::op("ret"));

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0]]);
        let store = analyze(&mut lir, &traces, 0);

        assert_eq!(ranges(&store, 0), [Range::new(2, 3)]);
    }
}
