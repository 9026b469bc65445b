//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Builds intervals while the SSI form itself is being built.
//!
//! Whoever constructs SSI form already touches every operand once, so
//! instead of a separate walk afterwards it can report each operand to an
//! [`OperandVisitor`]. The visitor has to be called in the same order that
//! [`LifetimeAnalysis`](crate::regalloc::LifetimeAnalysis) walks code in:
//! blocks and instructions backwards.

use crate::lir::{
    ssi, Lir, LirInst, OperandFlags, Trace, TraceBuilderResult, TraceFilter, Value,
};
use crate::regalloc::lifetime::{
    add_fixed_sentinels, add_inter_trace_hints, finish_store, prepare_store,
};
use crate::regalloc::{
    AllocError, AllocatorOptions, CallingConvention, IntervalBuilder, IntervalStore,
    RegisterConfig,
};

/// Receives every operand of every instruction of a trace, one at a time.
///
/// `block_from` is always the id of the label of the block the instruction
/// is in.
pub trait OperandVisitor<I: LirInst + ?Sized> {
    /// `value` is read by `inst`.
    fn visit_use(&mut self, inst: &I, op_id: i32, block_from: i32, value: &Value, flags: OperandFlags);

    /// `value` is written by `inst`.
    fn visit_def(
        &mut self,
        inst: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError>;

    /// `value` has to survive `inst`.
    fn visit_alive(
        &mut self,
        inst: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    );

    /// `value` is clobbered by `inst`.
    fn visit_temp(&mut self, inst: &I, op_id: i32, value: &Value, flags: OperandFlags);

    /// `value` is referenced by the debug state of the instruction at `op_id`.
    fn visit_state(&mut self, op_id: i32, block_from: i32, value: &Value);

    /// `value` is defined by the block's label.
    fn visit_incoming(
        &mut self,
        label: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError>;

    /// `value` is passed to a successor by the block's terminator.
    fn visit_outgoing(
        &mut self,
        terminator: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    );
}

/// An [`OperandVisitor`] that builds the same intervals lifetime analysis
/// would for a single trace.
pub struct SsiIntervalBuilder<'a, I> {
    lir: &'a Lir<I>,
    traces: &'a TraceBuilderResult,
    trace: &'a Trace,
    options: &'a AllocatorOptions,
    convention: &'a dyn CallingConvention,
    store: Option<IntervalStore>,
}

impl<'a, I: LirInst> SsiIntervalBuilder<'a, I> {
    /// Prepares to build the intervals of `trace`. If `filter` rejects the
    /// trace, every visit is ignored.
    pub fn new(
        lir: &'a Lir<I>,
        traces: &'a TraceBuilderResult,
        trace: &'a Trace,
        registers: &RegisterConfig,
        options: &'a AllocatorOptions,
        convention: &'a dyn CallingConvention,
        filter: &TraceFilter,
    ) -> Self {
        let store = filter(trace).then(|| prepare_store(lir, trace, registers));

        Self {
            lir,
            traces,
            trace,
            options,
            convention,
            store,
        }
    }

    /// Whether the trace is being processed at all.
    #[inline]
    pub fn process(&self) -> bool {
        self.store.is_some()
    }

    fn builder(&mut self) -> Option<IntervalBuilder<'_>> {
        let (options, convention) = (self.options, self.convention);

        self.store
            .as_mut()
            .map(|store| IntervalBuilder::new(store, options, convention))
    }

    /// Walks the trace and reports every operand to `self`, in the order
    /// the SSI builder would. Returns `None` if the trace is not processed.
    pub fn build(mut self) -> Result<Option<IntervalStore>, AllocError> {
        if !self.process() {
            return Ok(None);
        }

        let (lir, trace) = (self.lir, self.trace);

        for &block in trace.blocks().iter().rev() {
            let block_from = self
                .store
                .as_ref()
                .map_or(0, |store| store.first_op_id(block));

            for (index, inst) in lir.insts(block).iter().enumerate().rev() {
                let op_id = block_from + ((index as i32) << 1);

                self.visit_instruction(inst, op_id, block_from)?;
            }
        }

        Ok(self.finish())
    }

    fn visit_instruction(&mut self, inst: &I, op_id: i32, block_from: i32) -> Result<(), AllocError> {
        if let Some(mut builder) = self.builder() {
            builder.visit_caller_saved_registers(inst, op_id);
        }

        let mut result = Ok(());

        inst.visit_each_output(&mut |value, flags| {
            if result.is_err() {
                return;
            }

            result = if inst.is_label() {
                self.visit_incoming(inst, op_id, value, flags)
            } else {
                self.visit_def(inst, op_id, value, flags)
            };
        });

        result?;

        inst.visit_each_temp(&mut |value, flags| self.visit_temp(inst, op_id, value, flags));
        inst.visit_each_alive(&mut |value, flags| {
            if flags.contains(OperandFlags::OUTGOING) && !inst.outgoing_values().is_empty() {
                self.visit_outgoing(inst, op_id, block_from, value, flags);
            } else {
                self.visit_alive(inst, op_id, block_from, value, flags);
            }
        });
        inst.visit_each_input(&mut |value, flags| {
            self.visit_use(inst, op_id, block_from, value, flags)
        });
        inst.visit_each_state(&mut |value, _| self.visit_state(op_id, block_from, value));

        Ok(())
    }

    /// Completes the intervals once every operand has been visited.
    /// Returns `None` if the trace is not processed.
    pub fn finish(mut self) -> Option<IntervalStore> {
        let mut store = self.store.take()?;

        self.revisit_loop_back_edges(&mut store);
        finish_store(&mut store);

        if self.options.use_inter_trace_hints {
            add_inter_trace_hints(self.lir, self.traces, &mut store, self.trace);
        }

        add_fixed_sentinels(&mut store);

        log::debug!(
            "{:?}: {} intervals built with SSI",
            self.trace.id(),
            store.intervals().count()
        );

        Some(store)
    }

    // values carried around a loop inside of the trace must be live on the
    // whole back edge, no matter what order they were reported in
    fn revisit_loop_back_edges(&self, store: &mut IntervalStore) {
        let lir = self.lir;

        for &header in self.trace.blocks() {
            if !lir.block(header).is_loop_header() {
                continue;
            }

            for &end in lir.preds(header) {
                if !lir.block(end).is_loop_end() || !self.trace.contains(end) {
                    continue;
                }

                let end_to = store.last_op_id(end) + 1;
                let header_from = store.first_op_id(header);

                for value in ssi::outgoing(lir, end) {
                    let Some(interval) = value.as_variable().and_then(|v| store.interval_for_mut(v))
                    else {
                        continue;
                    };

                    if !interval.is_empty() && interval.to() < end_to {
                        interval.set_to(end_to);
                    }
                }

                for value in ssi::incoming(lir, header) {
                    let Some(interval) = value.as_variable().and_then(|v| store.interval_for_mut(v))
                    else {
                        continue;
                    };

                    if !interval.is_empty() && interval.from() > header_from {
                        interval.set_from(header_from);
                    }
                }
            }
        }
    }
}

impl<'a, I: LirInst> OperandVisitor<I> for SsiIntervalBuilder<'a, I> {
    fn visit_use(&mut self, inst: &I, op_id: i32, block_from: i32, value: &Value, flags: OperandFlags) {
        if let Some(mut builder) = self.builder() {
            builder.visit_input(inst, op_id, block_from, value, flags);
        }
    }

    fn visit_def(
        &mut self,
        inst: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError> {
        match self.builder() {
            Some(mut builder) => builder.visit_output(inst, op_id, value, flags),
            None => Ok(()),
        }
    }

    fn visit_alive(
        &mut self,
        inst: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if let Some(mut builder) = self.builder() {
            builder.visit_alive(inst, op_id, block_from, value, flags);
        }
    }

    fn visit_temp(&mut self, inst: &I, op_id: i32, value: &Value, flags: OperandFlags) {
        if let Some(mut builder) = self.builder() {
            builder.visit_temp(inst, op_id, value, flags);
        }
    }

    fn visit_state(&mut self, op_id: i32, block_from: i32, value: &Value) {
        if let Some(mut builder) = self.builder() {
            builder.visit_state(op_id, block_from, value);
        }
    }

    fn visit_incoming(
        &mut self,
        label: &I,
        op_id: i32,
        value: &Value,
        flags: OperandFlags,
    ) -> Result<(), AllocError> {
        match self.builder() {
            Some(mut builder) => builder.visit_incoming(label, op_id, value, flags),
            None => Ok(()),
        }
    }

    fn visit_outgoing(
        &mut self,
        terminator: &I,
        op_id: i32,
        block_from: i32,
        value: &Value,
        flags: OperandFlags,
    ) {
        if let Some(mut builder) = self.builder() {
            builder.visit_outgoing(terminator, op_id, block_from, value, flags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{
        every_trace, Block, Constant, GenericInst, LirBuilder, TraceId, VReg, ValueKind,
    };
    use crate::regalloc::{LifetimeAnalysis, Range, StackArgumentConvention};

    fn v(n: u32) -> Value {
        Value::var(n, ValueKind::I64)
    }

    //   b0: label; v0 = const #0; jump b1 (v0)
    //   b1: label (v1); v2 = add v1; branch b1, b2 (v2)
    //   b2: label (v3); ret v3
    fn counting_loop() -> (Lir<GenericInst>, TraceBuilderResult) {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let b2 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::load_const(v(0), Constant::new(ValueKind::I64, 0)));
        b.terminate(b0, GenericInst::jump(b1, vec![v(0)]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.append(
            b1,
            GenericInst::op("add").output(v(2)).input(v(1)).two_address(),
        );
        b.terminate(b1, GenericInst::branch(&[b1, b2], vec![v(2)]));
        b.append(b2, GenericInst::label(vec![v(3)]));
        b.append(b2, GenericInst::op("ret").input(v(3)).clobbers_caller_saved());
        b.mark_loop_header(b1);
        b.mark_loop_end(b1);

        (b.finish(), TraceBuilderResult::new(vec![vec![b0, b1, b2]]))
    }

    #[test]
    fn matches_lifetime_analysis() {
        let (lir, traces) = counting_loop();
        let trace = traces.trace(TraceId::new(0));
        let registers = RegisterConfig::generic(2, 2, 1);
        let options = AllocatorOptions::default();
        let convention = StackArgumentConvention;

        let expected = LifetimeAnalysis::new(&lir, &traces, &registers, &options, &convention)
            .analyze(trace)
            .unwrap();

        let built = SsiIntervalBuilder::new(
            &lir,
            &traces,
            trace,
            &registers,
            &options,
            &convention,
            &every_trace,
        )
        .build()
        .unwrap()
        .unwrap();

        assert_eq!(built.verify_equals(&expected), Ok(()));
        assert_eq!(
            built
                .interval_for(VReg::new(2))
                .unwrap()
                .ranges()
                .collect::<Vec<_>>(),
            [Range::new(8, 11)]
        );
    }

    #[test]
    fn rejected_traces_are_skipped() {
        let (lir, traces) = counting_loop();
        let trace = traces.trace(TraceId::new(0));
        let registers = RegisterConfig::default();
        let options = AllocatorOptions::default();
        let never = |_: &Trace| false;
        let builder = SsiIntervalBuilder::new(
            &lir,
            &traces,
            trace,
            &registers,
            &options,
            &StackArgumentConvention,
            &never,
        );

        assert!(!builder.process());
        assert!(matches!(builder.build(), Ok(None)));
    }

    #[test]
    fn back_edges_are_widened() {
        let (lir, traces) = counting_loop();
        let trace = traces.trace(TraceId::new(0));
        let registers = RegisterConfig::default();
        let options = AllocatorOptions::default();
        let mut builder = SsiIntervalBuilder::new(
            &lir,
            &traces,
            trace,
            &registers,
            &options,
            &StackArgumentConvention,
            &every_trace,
        );

        let label = lir.label(Block::new(1));
        let add = &lir.insts(Block::new(1))[1];

        // the branch is never reported, the back edge is left for `finish`
        builder.visit_def(add, 8, &v(2), OperandFlags::REG).unwrap();
        builder.visit_use(add, 8, 6, &v(1), OperandFlags::REG);
        builder
            .visit_incoming(label, 6, &v(1), OperandFlags::REG | OperandFlags::STACK)
            .unwrap();

        let store = builder.finish().unwrap();
        let ranges = |n| -> Vec<Range> {
            store.interval_for(VReg::new(n)).unwrap().ranges().collect()
        };

        assert_eq!(ranges(2), [Range::new(8, 11)]);
        assert_eq!(ranges(1), [Range::new(6, 8)]);
    }

    #[test]
    fn block_boundaries_reuse_the_existing_range() {
        let (lir, traces) = counting_loop();
        let trace = traces.trace(TraceId::new(0));
        let registers = RegisterConfig::default();
        let options = AllocatorOptions::default();
        let mut builder = SsiIntervalBuilder::new(
            &lir,
            &traces,
            trace,
            &registers,
            &options,
            &StackArgumentConvention,
            &every_trace,
        );

        let jump = lir.terminator(Block::new(0));
        let load = &lir.insts(Block::new(0))[1];
        let label = lir.label(Block::new(1));
        let add = &lir.insts(Block::new(1))[1];
        let outgoing = OperandFlags::STACK | OperandFlags::OUTGOING;

        builder.visit_def(add, 8, &v(2), OperandFlags::REG).unwrap();
        builder.visit_use(add, 8, 6, &v(1), OperandFlags::REG);
        builder.visit_incoming(label, 6, &v(1), OperandFlags::empty()).unwrap();
        builder.visit_outgoing(jump, 4, 0, &v(0), outgoing);
        builder.visit_outgoing(jump, 4, 0, &v(0), outgoing);
        builder.visit_def(load, 2, &v(0), OperandFlags::REG).unwrap();

        let store = builder.finish().unwrap();
        let ranges = |n| -> Vec<Range> {
            store.interval_for(VReg::new(n)).unwrap().ranges().collect()
        };

        assert_eq!(ranges(0), [Range::new(2, 5)]);
        assert_eq!(ranges(1), [Range::new(6, 8)]);
        assert_eq!(
            store.interval_for(VReg::new(1)).unwrap().spill_definition_pos(),
            Some(6)
        );
    }
}
