//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::ArenaKey;
use crate::lir::{
    GenericInst, InstKind, Lir, LirInst, Operand, OperandFlags, OperandRole, TraceBuilderResult,
    Value,
};
use std::fmt;
use std::fmt::{Display, Formatter, Write};

fn write_values(f: &mut Formatter<'_>, values: &[Value]) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }

    let values: Vec<String> = values.iter().map(Value::to_string).collect();

    write!(f, " ({})", values.join(", "))
}

// only the flags that differ from what the reader gives an operand of
// `role` by default are printed. `implied` is set for operands that are
// hinted by `!two-address` already
fn operand_string(operand: &Operand, role: OperandRole, implied: bool) -> String {
    let prefix = match role {
        OperandRole::Temp => "temp ",
        OperandRole::Alive => "alive ",
        OperandRole::State => "state ",
        _ => "",
    };

    let mut s = format!("{prefix}{}", operand.value);

    if role != OperandRole::State && operand.flags.contains(OperandFlags::STACK) {
        s += " stack";
    }

    if operand.flags.contains(OperandFlags::CONST) {
        s += " const";
    }

    if !implied && operand.flags.contains(OperandFlags::HINT) {
        s += " hint";
    }

    s
}

impl Display for GenericInst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let output = |f: &mut Formatter<'_>| match self.explicit_operands(OperandRole::Output).first() {
            Some(out) => write!(f, "{} = ", out.value),
            None => Ok(()),
        };

        match self.kind() {
            InstKind::Label => {
                f.write_str("label")?;

                return write_values(f, self.block_values());
            }
            InstKind::Jump(target) => {
                write!(f, "jump b{}", target.index())?;

                return write_values(f, self.block_values());
            }
            InstKind::Branch(targets) => {
                f.write_str("branch")?;

                for target in targets.iter() {
                    write!(f, " b{}", target.index())?;
                }

                return write_values(f, self.block_values());
            }
            InstKind::Move => {
                output(f)?;

                match self.move_source() {
                    Some(src) => write!(f, "move {src}")?,
                    None => f.write_str("move")?,
                }
            }
            InstKind::LoadConstant(c) => {
                output(f)?;
                write!(f, "const {c}")?;
            }
            InstKind::Op(mnemonic) => {
                let two_address = self.is_two_address();
                let outputs: Vec<String> = self
                    .explicit_operands(OperandRole::Output)
                    .iter()
                    .enumerate()
                    .map(|(i, op)| operand_string(op, OperandRole::Output, i == 0 && two_address))
                    .collect();

                if !outputs.is_empty() {
                    write!(f, "{} = ", outputs.join(", "))?;
                }

                f.write_str(mnemonic)?;

                let operands: Vec<String> = [
                    OperandRole::Input,
                    OperandRole::Temp,
                    OperandRole::Alive,
                    OperandRole::State,
                ]
                .into_iter()
                .flat_map(|role| {
                    self.explicit_operands(role)
                        .iter()
                        .enumerate()
                        .map(move |(i, op)| {
                            let implied = role == OperandRole::Input && i == 0 && two_address;

                            operand_string(op, role, implied)
                        })
                })
                .collect();

                if !operands.is_empty() {
                    write!(f, " {}", operands.join(", "))?;
                }
            }
        }

        if self.destroys_caller_saved_registers() {
            f.write_str(" !clobbers")?;
        }

        if self.is_two_address() {
            f.write_str(" !two-address")?;
        }

        Ok(())
    }
}

/// Writes the blocks of `lir` in trace order, optionally prefixing every
/// instruction with its id.
pub fn write_lir<I: LirInst + Display>(
    out: &mut impl Write,
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    show_ids: bool,
) -> fmt::Result {
    for trace in traces.traces() {
        writeln!(out, "; trace {}", trace.id().index())?;

        for &block in trace.blocks() {
            let data = lir.block(block);

            write!(out, "b{}", block.index())?;

            if data.is_loop_header() {
                out.write_str(" loop-header")?;
            }

            if data.is_loop_end() {
                out.write_str(" loop-end")?;
            }

            out.write_str(":\n")?;

            for inst in data.insts() {
                if show_ids {
                    writeln!(out, "  {:>4}  {inst}", inst.id())?;
                } else {
                    writeln!(out, "  {inst}")?;
                }
            }
        }
    }

    Ok(())
}

/// Same as [`write_lir`], but into a new string.
pub fn stringify_lir<I: LirInst + Display>(
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    show_ids: bool,
) -> String {
    let mut out = String::default();

    // writing into a string cannot fail
    let _ = write_lir(&mut out, lir, traces, show_ids);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{Block, Constant, LirBuilder, PReg, StackSlot, ValueKind};
    use crate::regalloc::number_instructions;

    fn v(n: u32) -> Value {
        Value::var(n, ValueKind::I64)
    }

    #[test]
    fn instructions() {
        let cases = [
            (GenericInst::label(vec![]), "label"),
            (GenericInst::label(vec![v(0), v(1)]), "label (v0:i64, v1:i64)"),
            (GenericInst::jump(Block::new(2), vec![v(3)]), "jump b2 (v3:i64)"),
            (
                GenericInst::branch(&[Block::new(1), Block::new(2)], vec![]),
                "branch b1 b2",
            ),
            (GenericInst::mov(v(1), v(0)), "v1:i64 = move v0:i64"),
            (
                GenericInst::load_const(v(0), Constant::new(ValueKind::I64, -3)),
                "v0:i64 = const #-3:i64",
            ),
            (GenericInst::op("nop"), "nop"),
            (
                GenericInst::op("add")
                    .output(v(2))
                    .input(v(0))
                    .input(v(1))
                    .two_address(),
                "v2:i64 = add v0:i64, v1:i64 !two-address",
            ),
            (
                GenericInst::op("call")
                    .output(Value::reg(PReg::int(0), ValueKind::I64))
                    .input_with(
                        Value::Stack(StackSlot::caller(8), ValueKind::I64),
                        OperandFlags::REG | OperandFlags::STACK,
                    )
                    .temp(Value::reg(PReg::int(1), ValueKind::I64))
                    .state(v(4))
                    .clobbers_caller_saved(),
                "r0:i64 = call caller[8]:i64 stack, temp r1:i64, state v4:i64 !clobbers",
            ),
        ];

        for (inst, expected) in cases {
            assert_eq!(inst.to_string(), expected);
        }
    }

    #[test]
    fn functions_with_ids() {
        let mut b = LirBuilder::new();
        let b0 = b.create_block();
        let b1 = b.create_block();

        b.append(b0, GenericInst::label(vec![]));
        b.terminate(b0, GenericInst::jump(b1, vec![]));
        b.append(b1, GenericInst::label(vec![]));
        b.append(b1, GenericInst::op("ret"));
        b.mark_loop_header(b1);

        let mut lir = b.finish();
        let traces = TraceBuilderResult::new(vec![vec![b0, b1]]);

        for trace in traces.traces() {
            number_instructions(&mut lir, trace);
        }

        let expected = "\
; trace 0
b0:
  label
  jump b1
b1 loop-header:
  label
  ret
";

        assert_eq!(stringify_lir(&lir, &traces, false), expected);
        assert!(stringify_lir(&lir, &traces, true).contains("     6  ret"));
    }
}
