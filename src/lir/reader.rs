//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! A line-based textual format for [`GenericInst`] functions.
//!
//! ```text
//! ; everything after a `;` is a comment
//! allocatable r0 r1 r2 f0 f1
//! caller-saved r0 f0
//! option inter-trace-hints false
//! trace b0 b1
//! assign v0 r1
//! assign v0 @4 stack[8]
//!
//! b0:
//!   label
//!   v0:i64 = const #1:i64
//!   jump b1 (v0:i64)
//! b1 loop-header loop-end:
//!   label (v1:i64)
//!   v2:i64 = add v1:i64, temp r2:i64, state v1:i64 !two-address
//!   r0:i64 = call v2:i64 stack !clobbers
//!   branch b1 b2 (v2:i64)
//! ```
//!
//! Operands are comma-separated. Inputs may be prefixed with `temp`,
//! `alive` or `state` to change their role, and followed by the attributes
//! `stack`, `const` and `hint`. Without attributes, an operand has to be in
//! a register (state operands may be anywhere).
//!
//! Without `trace` lines, every block goes into one trace in the order the
//! blocks are written in. `assign` lines are replayed by a
//! [`ScriptedAllocator`](crate::regalloc::ScriptedAllocator).

use crate::arena::ArenaKey;
use crate::lir::{
    ssi, Block, GenericInst, Lir, LirBuilder, LirInst, Location, OperandFlags, OperandRole,
    PReg, StackSlot, TraceBuilderResult, VReg, Value, ValueKind, VirtualStackSlot,
};
use crate::regalloc::{AllocatorOptions, Assignment, RegisterConfig};
use crate::utility::SaHashMap;
use std::str::FromStr;
use thiserror::Error;

/// An error found while reading a textual LIR file.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{line}:{col}: {message}")]
pub struct ReadError {
    /// The line of the error, starting from 1
    pub line: usize,
    /// The column of the error, starting from 1
    pub col: usize,
    /// The number of characters the error covers
    pub len: usize,
    /// What went wrong
    pub message: String,
}

impl ReadError {
    /// Formats the error with an excerpt of `source`, pointing at the
    /// part of the line that is wrong.
    pub fn format(&self, name: &str, source: &str) -> String {
        let line = source.lines().nth(self.line - 1).unwrap_or_default();
        let (line_n, col_n) = (self.line.to_string(), self.col.to_string());
        let mut error = String::default();

        let num_padding = " ".repeat(line_n.len());
        let col_padding = " ".repeat(self.col - 1);
        let underline = "^".repeat(self.len);

        error += &format!("  --> {name}:{line_n}:{col_n}\n");
        error += &format!(" {num_padding} |\n");
        error += &format!(" {line_n} | {line}\n");
        error += &format!(" {num_padding} | {col_padding}{underline}\n");
        error += &format!(" {num_padding} |\n");
        error += &format!(" {num_padding} = {}", self.message);

        error
    }
}

/// Everything a textual LIR file describes.
#[derive(Debug)]
pub struct LirFile {
    /// The function
    pub lir: Lir<GenericInst>,
    /// Its traces
    pub traces: TraceBuilderResult,
    /// The register file, [`RegisterConfig::default`] if the file does not
    /// give one
    pub registers: RegisterConfig,
    /// Allocator options, defaults unless changed by `option` lines
    pub options: AllocatorOptions,
    /// The `assign` lines, in order
    pub assignments: Vec<Assignment>,
}

#[derive(Copy, Clone, Debug)]
struct Word<'a> {
    text: &'a str,
    line: usize,
    col: usize,
}

impl<'a> Word<'a> {
    fn error(&self, message: impl Into<String>) -> ReadError {
        ReadError {
            line: self.line,
            col: self.col,
            len: self.text.chars().count().max(1),
            message: message.into(),
        }
    }
}

fn word_at(code: &str, from: usize, to: usize, line: usize) -> Word<'_> {
    Word {
        text: &code[from..to],
        line,
        col: code[..from].chars().count() + 1,
    }
}

// splits a line into words. `(`, `)`, `,` and `=` are always words of
// their own, everything else is separated by whitespace
fn split_words(line: &str, line_no: usize) -> Vec<Word<'_>> {
    let code = match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    };

    let mut words = Vec::new();
    let mut start = None;

    for (i, c) in code.char_indices() {
        let punct = matches!(c, '(' | ')' | ',' | '=');

        if c.is_whitespace() || punct {
            if let Some(s) = start.take() {
                words.push(word_at(code, s, i, line_no));
            }

            if punct {
                words.push(word_at(code, i, i + c.len_utf8(), line_no));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        words.push(word_at(code, s, code.len(), line_no));
    }

    words
}

fn is_header(words: &[Word<'_>]) -> bool {
    words.last().map_or(false, |w| w.text.ends_with(':'))
}

fn header_name<'a>(words: &[Word<'a>]) -> Word<'a> {
    let first = words[0];

    Word {
        text: first.text.trim_end_matches(':'),
        ..first
    }
}

fn parse_number<T: FromStr>(text: &str, what: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("expected {what}, found `{text}`"))
}

fn parse_preg(text: &str) -> Result<PReg, String> {
    let expected = || format!("expected a register like `r0` or `f1`, found `{text}`");

    let (float, number) = match (text.strip_prefix('r'), text.strip_prefix('f')) {
        (Some(n), _) => (false, n),
        (_, Some(n)) => (true, n),
        _ => return Err(expected()),
    };

    let n: usize = number.parse().map_err(|_| expected())?;

    if n >= 128 {
        return Err(format!("register number {n} is too large"));
    }

    Ok(if float { PReg::float(n) } else { PReg::int(n) })
}

fn parse_slot_offset(text: &str) -> Result<i32, String> {
    let offset = text
        .strip_suffix(']')
        .ok_or_else(|| format!("expected `]` after `{text}`"))?;

    parse_number(offset, "a stack offset")
}

fn parse_location(text: &str) -> Result<Location, String> {
    if let Some(rest) = text.strip_prefix("stack[") {
        return Ok(Location::Stack(StackSlot::local(parse_slot_offset(rest)?)));
    }

    if let Some(rest) = text.strip_prefix("caller[") {
        return Ok(Location::Stack(StackSlot::caller(parse_slot_offset(rest)?)));
    }

    if let Some(rest) = text.strip_prefix("vstack") {
        let n = parse_number(rest, "a virtual stack slot number")?;

        return Ok(Location::VirtualStack(VirtualStackSlot(n)));
    }

    parse_preg(text).map(Location::Register)
}

fn parse_vreg(text: &str) -> Result<VReg, String> {
    match text.strip_prefix('v') {
        Some(n) => parse_number(n, "a virtual register number").map(VReg::new),
        None => Err(format!("expected a virtual register like `v0`, found `{text}`")),
    }
}

fn parse_value(text: &str) -> Result<Value, String> {
    if text == "illegal" {
        return Ok(Value::Illegal);
    }

    let (base, kind) = text
        .rsplit_once(':')
        .ok_or_else(|| format!("`{text}` needs a kind, e.g. `{text}:i64`"))?;

    let kind = ValueKind::from_str(kind).map_err(String::from)?;

    if let Some(bits) = base.strip_prefix('#') {
        return Ok(Value::constant(kind, parse_number(bits, "a constant")?));
    }

    if base.starts_with('v') && !base.starts_with("vstack") {
        return Ok(Value::Variable(parse_vreg(base)?, kind));
    }

    Ok(parse_location(base)?.to_value(kind))
}

fn parse_bool(word: Word<'_>) -> Result<bool, ReadError> {
    match word.text {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(word.error("expected `true` or `false`")),
    }
}

fn split_commas<'w, 'a>(words: &'w [Word<'a>]) -> Result<Vec<&'w [Word<'a>]>, ReadError> {
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let groups: Vec<_> = words.split(|w| w.text == ",").collect();

    for (i, group) in groups.iter().enumerate() {
        if group.is_empty() {
            let at = words.iter().filter(|w| w.text == ",").nth(i.saturating_sub(1));

            return Err(at.unwrap_or(&words[0]).error("expected an operand"));
        }
    }

    Ok(groups)
}

// `( value, value, ... )`, where the parens are `words[0]` and the last word
fn parse_value_list(words: &[Word<'_>]) -> Result<Vec<Value>, ReadError> {
    let (first, last) = match (words.first(), words.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(Vec::new()),
    };

    if first.text != "(" {
        return Err(first.error("expected `(`"));
    }

    if last.text != ")" || words.len() < 2 {
        return Err(last.error("expected `)` at the end of the list"));
    }

    let mut values = Vec::new();

    for group in split_commas(&words[1..words.len() - 1])? {
        if group.len() > 1 {
            return Err(group[1].error("expected `,` or `)`"));
        }

        values.push(parse_value(group[0].text).map_err(|m| group[0].error(m))?);
    }

    Ok(values)
}

struct Operand {
    role: OperandRole,
    value: Value,
    flags: OperandFlags,
}

fn parse_operand(group: &[Word<'_>], role: OperandRole) -> Result<Operand, ReadError> {
    let prefixed = match group[0].text {
        "temp" => Some(OperandRole::Temp),
        "alive" => Some(OperandRole::Alive),
        "state" => Some(OperandRole::State),
        _ => None,
    };

    let (role, rest) = match prefixed {
        Some(_) if role == OperandRole::Output => {
            return Err(group[0].error("outputs cannot change their role"))
        }
        Some(prefixed) => (prefixed, &group[1..]),
        None => (role, group),
    };

    let Some((value_word, attrs)) = rest.split_first() else {
        return Err(group[0].error("expected a value"));
    };

    let value = parse_value(value_word.text).map_err(|m| value_word.error(m))?;

    let mut flags = match role {
        OperandRole::State => OperandFlags::REG | OperandFlags::STACK,
        _ => OperandFlags::REG,
    };

    for attr in attrs {
        flags = flags
            | match attr.text {
                "stack" => OperandFlags::STACK,
                "const" => OperandFlags::CONST,
                "hint" => OperandFlags::HINT,
                _ => return Err(attr.error(format!("unknown operand attribute `{}`", attr.text))),
            };
    }

    Ok(Operand { role, value, flags })
}

#[derive(Default)]
struct BlockState<'a> {
    header: Option<Word<'a>>,
    insts: usize,
    terminator: Option<Word<'a>>,
}

struct Reader<'a> {
    names: SaHashMap<&'a str, Block>,
    blocks: Vec<BlockState<'a>>,
    builder: LirBuilder<GenericInst>,
    current: Option<Block>,
    allocatable: Option<Vec<PReg>>,
    caller_saved: Option<Vec<PReg>>,
    options: AllocatorOptions,
    traces: Vec<Vec<(Block, Word<'a>)>>,
    assignments: Vec<Assignment>,
}

impl<'a> Reader<'a> {
    fn new() -> Self {
        Self {
            names: SaHashMap::default(),
            blocks: Vec::new(),
            builder: LirBuilder::new(),
            current: None,
            allocatable: None,
            caller_saved: None,
            options: AllocatorOptions::default(),
            traces: Vec::new(),
            assignments: Vec::new(),
        }
    }

    fn declare_block(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        let name = header_name(words);

        if name.text.is_empty() {
            return Err(name.error("expected a block name"));
        }

        if self.names.contains_key(name.text) {
            return Err(name.error(format!("block `{}` is defined more than once", name.text)));
        }

        let block = self.builder.create_block();

        self.names.insert(name.text, block);
        self.blocks.push(BlockState {
            header: Some(name),
            ..BlockState::default()
        });

        Ok(())
    }

    fn block(&self, word: Word<'a>) -> Result<Block, ReadError> {
        self.names
            .get(word.text)
            .copied()
            .ok_or_else(|| word.error(format!("unknown block `{}`", word.text)))
    }

    fn line(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        match words[0].text {
            "allocatable" => {
                self.allocatable = Some(Self::registers(&words[1..])?);
            }
            "caller-saved" => {
                self.caller_saved = Some(Self::registers(&words[1..])?);
            }
            "option" => self.option(words)?,
            "trace" => {
                let blocks = words[1..]
                    .iter()
                    .map(|&w| Ok((self.block(w)?, w)))
                    .collect::<Result<Vec<_>, ReadError>>()?;

                if blocks.is_empty() {
                    return Err(words[0].error("a trace needs at least one block"));
                }

                self.traces.push(blocks);
            }
            "assign" => self.assign(words)?,
            _ if is_header(words) => self.header(words)?,
            _ => self.instruction(words)?,
        }

        Ok(())
    }

    fn registers(words: &[Word<'a>]) -> Result<Vec<PReg>, ReadError> {
        words
            .iter()
            .map(|w| parse_preg(w.text).map_err(|m| w.error(m)))
            .collect()
    }

    fn option(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        let name = *words
            .get(1)
            .ok_or_else(|| words[0].error("expected an option name"))?;

        let value = match words.get(2) {
            Some(&w) => parse_bool(w)?,
            None => true,
        };

        if let Some(extra) = words.get(3) {
            return Err(extra.error("unexpected word after the option"));
        }

        self.options
            .set(name.text, value)
            .map_err(|message| name.error(message))
    }

    fn assign(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        let (vreg, rest) = match words[1..].split_first() {
            Some((w, rest)) => (parse_vreg(w.text).map_err(|m| w.error(m))?, rest),
            None => return Err(words[0].error("expected a virtual register")),
        };

        let (split_at, rest) = match rest.split_first() {
            Some((w, rest)) if w.text.starts_with('@') => {
                let pos = parse_number(&w.text[1..], "an instruction id").map_err(|m| w.error(m))?;

                (Some(pos), rest)
            }
            _ => (None, rest),
        };

        let location = match rest {
            [w] => parse_location(w.text).map_err(|m| w.error(m))?,
            [] => return Err(words[words.len() - 1].error("expected a location")),
            [_, extra, ..] => return Err(extra.error("unexpected word after the location")),
        };

        self.assignments.push(Assignment {
            vreg,
            split_at,
            location,
        });

        Ok(())
    }

    fn header(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        let block = self.block(header_name(words))?;

        for attr in words[1..].iter() {
            match attr.text.trim_end_matches(':') {
                "loop-header" => self.builder.mark_loop_header(block),
                "loop-end" => self.builder.mark_loop_end(block),
                "" => {}
                other => return Err(attr.error(format!("unknown block attribute `{other}`"))),
            }
        }

        self.current = Some(block);

        Ok(())
    }

    fn instruction(&mut self, words: &[Word<'a>]) -> Result<(), ReadError> {
        let block = self
            .current
            .ok_or_else(|| words[0].error("instructions have to be inside of a block"))?;

        let inst = parse_inst(self, words)?;
        let state = &mut self.blocks[block.index()];

        if state.terminator.is_some() {
            return Err(words[0].error("instructions cannot follow a terminator"));
        }

        if state.insts == 0 && !inst.is_label() {
            return Err(words[0].error("blocks have to start with `label`"));
        }

        if state.insts != 0 && inst.is_label() {
            return Err(words[0].error("`label` can only start a block"));
        }

        state.insts += 1;

        if inst.is_terminator() {
            state.terminator = Some(words[0]);
            self.builder.terminate(block, inst);
        } else {
            self.builder.append(block, inst);
        }

        Ok(())
    }

    fn finish(self) -> Result<LirFile, ReadError> {
        let header = |block: Block| {
            self.blocks[block.index()]
                .header
                .expect("every block is declared by a header")
        };

        for (i, state) in self.blocks.iter().enumerate() {
            if state.insts == 0 {
                return Err(header(Block::new(i)).error("blocks cannot be empty"));
            }
        }

        let mut seen = vec![false; self.blocks.len()];
        let mut traces = Vec::with_capacity(self.traces.len().max(1));

        for trace in self.traces.iter() {
            for &(block, word) in trace.iter() {
                if std::mem::replace(&mut seen[block.index()], true) {
                    return Err(word.error(format!("`{}` is in more than one trace", word.text)));
                }
            }

            traces.push(trace.iter().map(|(block, _)| *block).collect::<Vec<_>>());
        }

        if traces.is_empty() && !self.blocks.is_empty() {
            traces.push((0..self.blocks.len()).map(Block::new).collect());
            seen.fill(true);
        }

        if let Some(missing) = seen.iter().position(|seen| !seen) {
            return Err(header(Block::new(missing)).error("block is not part of any trace"));
        }

        let lir = self.builder.finish();

        for block in lir.blocks() {
            for &succ in lir.succs(block) {
                let (outs, ins) = (ssi::outgoing(&lir, block).len(), ssi::incoming(&lir, succ).len());

                if outs != ins {
                    let word = self.blocks[block.index()]
                        .terminator
                        .unwrap_or_else(|| header(block));

                    return Err(word.error(format!(
                        "passes {outs} values to `{}`, which expects {ins}",
                        header(succ).text
                    )));
                }
            }
        }

        let registers = match (self.allocatable, self.caller_saved) {
            (None, None) => RegisterConfig::default(),
            (allocatable, caller_saved) => RegisterConfig::new(
                allocatable.unwrap_or_else(|| RegisterConfig::default().allocatable().to_vec()),
                caller_saved.unwrap_or_default(),
            ),
        };

        Ok(LirFile {
            lir,
            traces: TraceBuilderResult::new(traces),
            registers,
            options: self.options,
            assignments: self.assignments,
        })
    }
}

fn single_output(outputs: &[Word<'_>], mnemonic: Word<'_>) -> Result<Value, ReadError> {
    match outputs {
        [w] => parse_value(w.text).map_err(|m| w.error(m)),
        [] => Err(mnemonic.error(format!("`{}` needs an output", mnemonic.text))),
        [_, extra, ..] => Err(extra.error(format!("`{}` has one output", mnemonic.text))),
    }
}

fn single_operand(operands: &[Word<'_>], mnemonic: Word<'_>) -> Result<Value, ReadError> {
    match operands {
        [w] => parse_value(w.text).map_err(|m| w.error(m)),
        [] => Err(mnemonic.error(format!("`{}` needs an operand", mnemonic.text))),
        [_, extra, ..] => Err(extra.error(format!("`{}` has one operand", mnemonic.text))),
    }
}

fn parse_block_inst<'a>(
    reader: &Reader<'a>,
    mnemonic: Word<'a>,
    operands: &[Word<'a>],
) -> Result<GenericInst, ReadError> {
    let list_start = operands
        .iter()
        .position(|w| w.text == "(")
        .unwrap_or(operands.len());

    let (targets, list) = operands.split_at(list_start);
    let values = parse_value_list(list)?;
    let targets = targets
        .iter()
        .map(|&w| reader.block(w))
        .collect::<Result<Vec<_>, ReadError>>()?;

    match (mnemonic.text, targets.as_slice()) {
        ("label", []) => Ok(GenericInst::label(values)),
        ("label", _) => Err(operands[0].error("`label` does not take targets")),
        ("jump", [target]) => Ok(GenericInst::jump(*target, values)),
        ("jump", _) => Err(mnemonic.error("`jump` takes exactly one target")),
        ("branch", [_, _, ..]) => Ok(GenericInst::branch(&targets, values)),
        _ => Err(mnemonic.error("`branch` takes at least two targets")),
    }
}

fn parse_inst<'a>(reader: &Reader<'a>, words: &[Word<'a>]) -> Result<GenericInst, ReadError> {
    let (outputs, rest) = match words.iter().position(|w| w.text == "=") {
        Some(i) => (&words[..i], &words[i + 1..]),
        None => (&words[..0], words),
    };

    let Some((&mnemonic, rest)) = rest.split_first() else {
        return Err(words[words.len() - 1].error("expected an instruction after `=`"));
    };

    let marker_start = rest
        .iter()
        .position(|w| w.text.starts_with('!'))
        .unwrap_or(rest.len());

    let (operands, markers) = rest.split_at(marker_start);

    let mut inst = match mnemonic.text {
        "label" | "jump" | "branch" => {
            if let Some(out) = outputs.first() {
                return Err(out.error(format!("`{}` has no outputs", mnemonic.text)));
            }

            parse_block_inst(reader, mnemonic, operands)?
        }
        "move" => GenericInst::mov(
            single_output(outputs, mnemonic)?,
            single_operand(operands, mnemonic)?,
        ),
        "const" => {
            let dst = single_output(outputs, mnemonic)?;

            match single_operand(operands, mnemonic)? {
                Value::Constant(c) => GenericInst::load_const(dst, c),
                _ => return Err(operands[0].error("expected a constant like `#1:i64`")),
            }
        }
        name => {
            let mut inst = GenericInst::op(name);

            for group in split_commas(outputs)? {
                let out = parse_operand(group, OperandRole::Output)?;

                inst = inst.output_with(out.value, out.flags);
            }

            for group in split_commas(operands)? {
                let op = parse_operand(group, OperandRole::Input)?;

                inst = match op.role {
                    OperandRole::Temp => inst.temp_with(op.value, op.flags),
                    OperandRole::Alive => inst.alive_with(op.value, op.flags),
                    OperandRole::State => inst.state_with(op.value, op.flags),
                    _ => inst.input_with(op.value, op.flags),
                };
            }

            inst
        }
    };

    for marker in markers {
        inst = match marker.text {
            "!clobbers" => inst.clobbers_caller_saved(),
            "!two-address" => inst.two_address(),
            _ => return Err(marker.error(format!("unknown marker `{}`", marker.text))),
        };
    }

    Ok(inst)
}

/// Reads a function, its traces and the allocation setup from `source`.
pub fn read_lir(source: &str) -> Result<LirFile, ReadError> {
    let lines: Vec<Vec<Word<'_>>> = source
        .lines()
        .enumerate()
        .map(|(i, line)| split_words(line, i + 1))
        .collect();

    let mut reader = Reader::new();

    // blocks are created up front, so that jumps can refer to later blocks
    for words in lines.iter().filter(|w| is_header(w)) {
        reader.declare_block(words)?;
    }

    for words in lines.iter().filter(|w| !w.is_empty()) {
        reader.line(words)?;
    }

    reader.finish()
}
