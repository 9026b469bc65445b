//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Fixes up the control-flow edges inside of a trace once every interval has
//! a location.
//!
//! After splitting, the interval a value leaves a block in and the interval
//! the successor's label expects it in can end up in different places. Every
//! such pair gets a move on the edge between the two blocks.

use crate::lir::{ssi, Block, Lir, LirInst, Location, OperandRole, Value, VReg, ValueKind};
use crate::regalloc::{
    AllocError, IntervalStore, MoveOperand, MoveResolver, ParallelMoveResolver, ResolvedMoves,
};

/// Inserts the moves needed on the edges of a single trace.
pub struct DataFlowResolver<'a, I> {
    lir: &'a Lir<I>,
    store: &'a IntervalStore,
}

impl<'a, I: LirInst> DataFlowResolver<'a, I> {
    /// Prepares to resolve the trace `store` was built for.
    pub fn new(lir: &'a Lir<I>, store: &'a IntervalStore) -> Self {
        Self { lir, store }
    }

    /// Hands every move the trace needs to `resolver`.
    ///
    /// Consecutive blocks are resolved first, then the back edge of a loop
    /// that ends the trace.
    pub fn resolve(&self, resolver: &mut dyn MoveResolver) -> Result<(), AllocError> {
        let blocks = self.store.blocks();

        if blocks.len() < 2 {
            return Ok(());
        }

        log::debug!("resolving data flow of {:?}", self.store.trace_id());

        for pair in blocks.windows(2) {
            self.resolve_edge(pair[0], pair[1], resolver)?;
        }

        let last = blocks[blocks.len() - 1];

        if self.lir.block(last).is_loop_end() {
            if let [header] = self.lir.succs(last) {
                if self.lir.block(*header).is_loop_header() && blocks.contains(header) {
                    self.resolve_edge(last, *header, resolver)?;
                }
            }
        }

        Ok(())
    }

    fn resolve_edge(
        &self,
        from: Block,
        to: Block,
        resolver: &mut dyn MoveResolver,
    ) -> Result<(), AllocError> {
        let mut mappings = Vec::new();
        let mut result = Ok(());

        ssi::for_each_value_pair(self.lir, to, from, |incoming, outgoing| {
            if result.is_err() {
                return;
            }

            result = self.collect_mapping(from, to, incoming, outgoing).map(|mapping| {
                mappings.extend(mapping);
            });
        });

        result?;

        if mappings.is_empty() {
            return Ok(());
        }

        let (block, index) = self.insertion_point(from, to)?;

        resolver.set_insert_position(block, index);

        for (source, target, kind) in mappings {
            resolver.add_mapping(source, target, kind);
        }

        resolver.resolve_and_append_moves();

        Ok(())
    }

    fn collect_mapping(
        &self,
        from: Block,
        to: Block,
        incoming: &Value,
        outgoing: &Value,
    ) -> Result<Option<(MoveOperand, Location, ValueKind)>, AllocError> {
        if incoming.is_illegal() {
            return Ok(None);
        }

        if let (Value::VirtualStack(a, _), Value::VirtualStack(b, _)) = (incoming, outgoing) {
            if a == b {
                return Ok(None);
            }
        }

        let in_id = self.store.first_op_id(to);
        let (in_child, in_location) = match *incoming {
            Value::Variable(vreg, _) => {
                let child = self.store.split_child_at_op_id(vreg, in_id, OperandRole::Input)?;

                (Some(child), self.location_of(child, in_id)?)
            }
            other => match Location::of_value(other) {
                Some(location) => (None, location),
                None => return Ok(None),
            },
        };

        let kind = incoming
            .kind()
            .or_else(|| outgoing.kind())
            .unwrap_or(ValueKind::I64);

        let out_id = self.store.last_op_id(from);
        let source = match *outgoing {
            Value::Constant(c) => MoveOperand::Constant(c),
            Value::Variable(vreg, _) => {
                let child = self.store.split_child_at_op_id(vreg, out_id, OperandRole::Output)?;

                if in_child == Some(child) {
                    return Ok(None);
                }

                MoveOperand::Location(self.location_of(child, out_id)?)
            }
            other => match Location::of_value(other) {
                Some(location) => MoveOperand::Location(location),
                None => return Ok(None),
            },
        };

        if source == MoveOperand::Location(in_location) {
            return Ok(None);
        }

        Ok(Some((source, in_location, kind)))
    }

    fn location_of(&self, vreg: VReg, op_id: i32) -> Result<Location, AllocError> {
        self.store
            .interval_for(vreg)
            .and_then(|interval| interval.location())
            .ok_or(AllocError::Unallocated {
                trace: self.store.trace_id(),
                vreg,
                op_id,
            })
    }

    // moves only come from the values a terminator passes along, so `from`
    // ends in that terminator and with a single successor they go right in
    // front of it. Otherwise `to` has to be the only way into itself and they
    // go after its label
    fn insertion_point(&self, from: Block, to: Block) -> Result<(Block, usize), AllocError> {
        debug_assert!(!self.lir.terminator(from).outgoing_values().is_empty());

        if self.lir.succs(from).len() <= 1 {
            return Ok((from, self.lir.insts(from).len() - 1));
        }

        if self.lir.preds(to).iter().any(|&pred| pred != from) {
            return Err(AllocError::CriticalEdge {
                trace: self.store.trace_id(),
                from,
                to,
            });
        }

        Ok((to, 1))
    }
}

/// Resolves the data flow of the trace `store` was built for with the
/// default [`ParallelMoveResolver`].
pub fn resolve_data_flow<I: LirInst>(
    lir: &Lir<I>,
    store: &IntervalStore,
) -> Result<ResolvedMoves, AllocError> {
    let mut resolver = ParallelMoveResolver::new();

    DataFlowResolver::new(lir, store).resolve(&mut resolver)?;

    Ok(resolver.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{
        Constant, GenericInst, LirBuilder, PReg, StackSlot, TraceBuilderResult, TraceId,
        VirtualStackSlot,
    };
    use crate::regalloc::{
        analyze_trace, AllocatorOptions, LocationMove, RegisterConfig, StackArgumentConvention,
    };

    fn v(n: u32) -> Value {
        Value::var(n, ValueKind::I64)
    }

    fn r(n: usize) -> Location {
        Location::Register(PReg::int(n))
    }

    fn analyze(lir: &mut Lir<GenericInst>, traces: &TraceBuilderResult, id: usize) -> IntervalStore {
        let trace = traces.trace(TraceId::new(id)).clone();

        analyze_trace(
            lir,
            traces,
            &trace,
            &RegisterConfig::generic(4, 4, 2),
            &AllocatorOptions::default(),
            &StackArgumentConvention,
        )
        .unwrap()
    }

    fn moves_of(resolved: &ResolvedMoves) -> Vec<(usize, usize, Vec<String>)> {
        resolved
            .insertions()
            .iter()
            .map(|i| {
                let moves = i.moves.iter().map(LocationMove::to_string).collect();

                (i.block.index(), i.index, moves)
            })
            .collect()
    }

    //   b0: label; v0 = def; jump b1 (out)
    //   b1: label (v1); ret v1
    fn two_blocks(out: Value) -> (Lir<GenericInst>, TraceBuilderResult) {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::op("def").output(v(0)));
        b.terminate(b0, GenericInst::jump(b1, vec![out]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.append(b1, GenericInst::op("ret").input(v(1)));

        (b.finish(), TraceBuilderResult::new(vec![vec![b0, b1]]))
    }

    #[test]
    fn differing_registers_get_a_move() {
        let (mut lir, traces) = two_blocks(v(0));
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(0));
        store.set_location(VReg::new(1), r(1));

        let resolved = resolve_data_flow(&lir, &store).unwrap();

        assert_eq!(moves_of(&resolved), [(0, 2, vec!["r1:i64 = move r0".to_string()])]);
    }

    #[test]
    fn moves_go_in_front_of_the_jump() {
        let (mut lir, traces) = two_blocks(v(0));
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(0));
        store.set_location(VReg::new(1), r(1));

        let resolved = resolve_data_flow(&lir, &store).unwrap();
        let insertion = &resolved.insertions()[0];
        let jump = &lir.insts(insertion.block)[insertion.index];

        // the jump carries the value, so the move has to happen before it
        assert_eq!(insertion.index, lir.insts(insertion.block).len() - 1);
        assert_eq!(jump.outgoing_values(), [v(0)]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let (mut lir, traces) = two_blocks(v(0));
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(2));
        store.set_location(VReg::new(1), r(2));

        assert!(resolve_data_flow(&lir, &store).unwrap().is_empty());
        assert!(resolve_data_flow(&lir, &store).unwrap().is_empty());
    }

    #[test]
    fn constants_move_directly() {
        let (mut lir, traces) = two_blocks(Value::constant(ValueKind::I64, 5));
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(0));
        store.set_location(VReg::new(1), r(1));

        let resolved = resolve_data_flow(&lir, &store).unwrap();

        assert_eq!(
            resolved.insertions()[0].moves[0].from,
            MoveOperand::Constant(Constant::new(ValueKind::I64, 5))
        );
    }

    #[test]
    fn split_children_are_found_at_the_edge() {
        let (mut lir, traces) = two_blocks(v(0));
        let mut store = analyze(&mut lir, &traces, 0);
        let slot = Location::Stack(StackSlot::local(8));

        // v0 is [2, 5), the part crossing the edge is on the stack
        let child = store.split_interval_at(VReg::new(0), 4).unwrap();

        store.set_location(VReg::new(0), r(0));
        store.set_location(child, slot);
        store.set_location(VReg::new(1), r(1));

        let resolved = resolve_data_flow(&lir, &store).unwrap();

        assert_eq!(
            moves_of(&resolved),
            [(0, 2, vec!["r1:i64 = move stack[8]".to_string()])]
        );
    }

    #[test]
    fn missing_locations_are_errors() {
        let (mut lir, traces) = two_blocks(v(0));
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(1), r(1));

        assert_eq!(
            resolve_data_flow(&lir, &store),
            Err(AllocError::Unallocated {
                trace: TraceId::new(0),
                vreg: VReg::new(0),
                op_id: 4,
            })
        );
    }

    #[test]
    fn single_block_traces_need_nothing() {
        let (mut lir, _) = two_blocks(v(0));
        let traces = TraceBuilderResult::new(vec![vec![Block::new(0)], vec![Block::new(1)]]);
        let store = analyze(&mut lir, &traces, 0);

        assert!(resolve_data_flow(&lir, &store).unwrap().is_empty());
    }

    #[test]
    fn illegal_and_shared_virtual_slots_are_skipped() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let vstack = Value::VirtualStack(VirtualStackSlot(3), ValueKind::I64);

        b.append(b0, GenericInst::label(vec![]));
        b.terminate(b0, GenericInst::jump(b1, vec![v(0), vstack]));
        b.append(b1, GenericInst::label(vec![Value::Illegal, vstack]));
        b.append(b1, GenericInst::op("ret"));

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0, b1]]);
        let store = analyze(&mut lir, &traces, 0);

        assert!(resolve_data_flow(&lir, &store).unwrap().is_empty());
    }

    //   b0: label; v0 = const #0; jump b1 (v0)
    //   b1: label (v1); branch b2, b3 (v1)          loop header
    //   b2: label (v2); v3 = add v2; jump b1 (v3)   loop end
    //   b3: label (v4); ret v4
    fn back_edge() -> (Lir<GenericInst>, TraceBuilderResult) {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let b2 = b.create_block();
        let b3 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::load_const(v(0), Constant::new(ValueKind::I64, 0)));
        b.terminate(b0, GenericInst::jump(b1, vec![v(0)]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.terminate(b1, GenericInst::branch(&[b2, b3], vec![v(1)]));
        b.append(b2, GenericInst::label(vec![v(2)]));
        b.append(b2, GenericInst::op("add").output(v(3)).input(v(2)));
        b.terminate(b2, GenericInst::jump(b1, vec![v(3)]));
        b.append(b3, GenericInst::label(vec![v(4)]));
        b.append(b3, GenericInst::op("ret").input(v(4)));
        b.mark_loop_header(b1);
        b.mark_loop_end(b2);

        (
            b.finish(),
            TraceBuilderResult::new(vec![vec![b0, b1, b2], vec![b3]]),
        )
    }

    #[test]
    fn loop_back_edge_is_resolved_last() {
        let (mut lir, traces) = back_edge();
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(0));
        store.set_location(VReg::new(1), r(1));
        store.set_location(VReg::new(2), r(1));
        store.set_location(VReg::new(3), r(0));

        let resolved = resolve_data_flow(&lir, &store).unwrap();

        assert_eq!(
            moves_of(&resolved),
            [
                (0, 2, vec!["r1:i64 = move r0".to_string()]),
                (2, 2, vec!["r1:i64 = move r0".to_string()]),
            ]
        );
    }

    #[test]
    fn branches_insert_after_the_label() {
        let (mut lir, traces) = back_edge();
        let mut store = analyze(&mut lir, &traces, 0);

        for n in 0..4 {
            store.set_location(VReg::new(n), r(n as usize));
        }

        let resolved = resolve_data_flow(&lir, &store).unwrap();
        let points: Vec<(usize, usize)> = moves_of(&resolved)
            .into_iter()
            .map(|(block, index, _)| (block, index))
            .collect();

        assert_eq!(points, [(0, 2), (2, 1), (2, 2)]);
    }

    //   b0: label; v0 = const #0; jump b1 (v0)
    //   b1: label (v1); branch b2, b3 (v1)          loop header
    //   b2: label (v2); v3 = add v2; jump b1 (v3)   loop end
    //   b3: label (v4); v5 = add v4; jump b1 (v5)   second trace
    #[test]
    fn headers_entered_from_another_trace() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let b2 = b.create_block();
        let b3 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::load_const(v(0), Constant::new(ValueKind::I64, 0)));
        b.terminate(b0, GenericInst::jump(b1, vec![v(0)]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.terminate(b1, GenericInst::branch(&[b2, b3], vec![v(1)]));
        b.append(b2, GenericInst::label(vec![v(2)]));
        b.append(b2, GenericInst::op("add").output(v(3)).input(v(2)));
        b.terminate(b2, GenericInst::jump(b1, vec![v(3)]));
        b.append(b3, GenericInst::label(vec![v(4)]));
        b.append(b3, GenericInst::op("add").output(v(5)).input(v(4)));
        b.terminate(b3, GenericInst::jump(b1, vec![v(5)]));
        b.mark_loop_header(b1);
        b.mark_loop_end(b2);
        b.mark_loop_end(b3);

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0, b1, b2], vec![b3]]);
        let mut store = analyze(&mut lir, &traces, 0);

        assert_eq!(lir.preds(b1), [b0, b2, b3]);

        for n in 0..4 {
            store.set_location(VReg::new(n), r(n as usize));
        }

        let resolved = resolve_data_flow(&lir, &store).unwrap();
        let moves = moves_of(&resolved);

        assert_eq!(
            moves,
            [
                (0, 2, vec!["r1:i64 = move r0".to_string()]),
                (2, 1, vec!["r2:i64 = move r1".to_string()]),
                (2, 2, vec!["r1:i64 = move r3".to_string()]),
            ]
        );

        // the back edge shows up once, after every edge between neighbors
        let is_back_edge = |m: &&(usize, usize, Vec<String>)| m.2 == ["r1:i64 = move r3"];

        assert_eq!(moves.iter().filter(is_back_edge).count(), 1);
        assert_eq!(moves.iter().position(|m| is_back_edge(&m)), Some(moves.len() - 1));

        // the edge out of the other trace is left to that trace
        assert!(moves.iter().all(|(block, _, _)| *block != b3.index()));
    }

    #[test]
    fn critical_edges_are_rejected() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();
        let b2 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.append(b0, GenericInst::op("def").output(v(0)));
        b.terminate(b0, GenericInst::branch(&[b1, b2], vec![v(0)]));
        b.append(b1, GenericInst::label(vec![v(1)]));
        b.append(b1, GenericInst::op("ret").input(v(1)));
        b.append(b2, GenericInst::label(vec![v(2)]));
        b.terminate(b2, GenericInst::jump(b1, vec![v(2)]));

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0, b1], vec![b2]]);
        let mut store = analyze(&mut lir, &traces, 0);

        store.set_location(VReg::new(0), r(0));
        store.set_location(VReg::new(1), r(1));

        assert_eq!(
            resolve_data_flow(&lir, &store),
            Err(AllocError::CriticalEdge {
                trace: TraceId::new(0),
                from: b0,
                to: b1,
            })
        );
    }
}
