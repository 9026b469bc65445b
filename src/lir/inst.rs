//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{Block, Constant, Value};
use paste::paste;
use smallvec::SmallVec;
use std::fmt::Debug;
use std::ops::BitOr;

/// The role an operand plays in an instruction.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperandRole {
    /// Produces a new value
    Output,
    /// Clobbered by the instruction, meaningless afterwards
    Temp,
    /// Must stay live through the instruction, though it is not a normal input
    Alive,
    /// Consumed before the instruction executes
    Input,
    /// Only referenced by deoptimization/debug metadata, never needs a register
    State,
    /// A value entering a block through its label
    Incoming,
    /// A value leaving a block through its terminator
    Outgoing,
}

impl OperandRole {
    /// The roles an instruction reports through [`LirInst::for_each_operand`],
    /// in the order lifetime analysis visits them.
    pub const INSTRUCTION_ROLES: [OperandRole; 5] = [
        OperandRole::Output,
        OperandRole::Temp,
        OperandRole::Alive,
        OperandRole::Input,
        OperandRole::State,
    ];
}

/// Constraints an instruction places on one of its operands.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperandFlags(u8);

impl OperandFlags {
    /// The operand may be a register.
    pub const REG: Self = Self(1 << 0);
    /// The operand may be a stack slot.
    pub const STACK: Self = Self(1 << 1);
    /// The operand may be a constant.
    pub const CONST: Self = Self(1 << 2);
    /// The operand takes part in a register hint.
    pub const HINT: Self = Self(1 << 3);
    /// The operand is a block's outgoing value.
    pub const OUTGOING: Self = Self(1 << 4);

    /// No flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OperandFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

macro_rules! role_visitors {
    ($($role:ident),*) => {
        paste! {
            $(
                #[doc = concat!("Calls `f` on every operand with the `", stringify!($role), "` role.")]
                fn [<visit_each_ $role:snake>](&self, f: &mut dyn FnMut(&Value, OperandFlags)) {
                    self.for_each_operand(OperandRole::$role, f)
                }
            )*
        }
    };
}

/// The instruction metadata the allocator needs from the LIR.
///
/// An instruction is numbered by lifetime analysis through [`Self::set_id`];
/// every other query is read-only.
pub trait LirInst: Debug {
    /// The instruction's id, or `-1` if it was never numbered.
    fn id(&self) -> i32;

    /// Assigns the instruction's id.
    fn set_id(&mut self, id: i32);

    /// Calls `f` on every operand with `role`. Only `Output`, `Temp`,
    /// `Alive`, `Input` and `State` are meaningful here, block-boundary
    /// values are exposed by [`Self::incoming_values`] and [`Self::outgoing_values`].
    fn for_each_operand(&self, role: OperandRole, f: &mut dyn FnMut(&Value, OperandFlags));

    role_visitors!(Output, Temp, Alive, Input, State);

    /// Whether the instruction destroys every caller-saved register, i.e. is a call.
    fn destroys_caller_saved_registers(&self) -> bool;

    /// Whether the instruction is the label that starts a block.
    fn is_label(&self) -> bool;

    /// The values a label defines on block entry. Empty for anything else.
    fn incoming_values(&self) -> &[Value];

    /// The values a terminator passes to its successors. Empty for anything else.
    fn outgoing_values(&self) -> &[Value];

    /// Returns the operand that `value` would like to share a location with,
    /// if `value` (in `role`) is part of a hint-worthy pair.
    fn register_hint(&self, value: &Value, role: OperandRole) -> Option<Value>;

    /// If the instruction loads a constant into a location, returns the
    /// result and the constant.
    fn load_constant(&self) -> Option<(Value, Constant)> {
        None
    }

    /// If the instruction is a plain move, returns its source.
    fn move_source(&self) -> Option<Value> {
        None
    }
}

/// What a [`GenericInst`] does, as far as the allocator cares.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum InstKind {
    /// The label at the start of a block
    Label,
    /// An unconditional jump
    Jump(Block),
    /// A conditional branch to two or more blocks
    Branch(SmallVec<[Block; 2]>),
    /// `dst = move src`
    Move,
    /// `dst = const #n`
    LoadConstant(Constant),
    /// Anything else, named by its mnemonic
    Op(Box<str>),
}

/// One operand of a [`GenericInst`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Operand {
    /// The value
    pub value: Value,
    /// Its constraints
    pub flags: OperandFlags,
}

impl Operand {
    /// Creates an operand.
    pub fn new(value: Value, flags: OperandFlags) -> Self {
        Self { value, flags }
    }
}

type Operands = SmallVec<[Operand; 2]>;

/// A target-independent instruction that is enough to describe any operand
/// shape the allocator deals with. The textual reader produces these, and
/// tests build them directly.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GenericInst {
    id: i32,
    kind: InstKind,
    outputs: Operands,
    temps: Operands,
    alives: Operands,
    inputs: Operands,
    states: Operands,
    block_values: Vec<Value>,
    clobbers: bool,
    two_address: bool,
}

impl GenericInst {
    fn with_kind(kind: InstKind) -> Self {
        Self {
            id: -1,
            kind,
            outputs: Operands::new(),
            temps: Operands::new(),
            alives: Operands::new(),
            inputs: Operands::new(),
            states: Operands::new(),
            block_values: Vec::new(),
            clobbers: false,
            two_address: false,
        }
    }

    /// A block label that defines `incoming` on entry.
    pub fn label(incoming: Vec<Value>) -> Self {
        Self {
            block_values: incoming,
            ..Self::with_kind(InstKind::Label)
        }
    }

    /// A jump to `target` that passes `outgoing` to its label.
    pub fn jump(target: Block, outgoing: Vec<Value>) -> Self {
        Self {
            block_values: outgoing,
            ..Self::with_kind(InstKind::Jump(target))
        }
    }

    /// A branch to every block in `targets`. Each successor's label receives
    /// `outgoing`.
    pub fn branch(targets: &[Block], outgoing: Vec<Value>) -> Self {
        Self {
            block_values: outgoing,
            ..Self::with_kind(InstKind::Branch(targets.iter().copied().collect()))
        }
    }

    /// `dst = move src`. Both sides hint at each other.
    pub fn mov(dst: Value, src: Value) -> Self {
        let hint = OperandFlags::REG | OperandFlags::STACK | OperandFlags::HINT;

        Self::with_kind(InstKind::Move)
            .output_with(dst, hint)
            .input_with(src, hint | OperandFlags::CONST)
    }

    /// `dst = const #n`.
    pub fn load_const(dst: Value, constant: Constant) -> Self {
        Self::with_kind(InstKind::LoadConstant(constant))
            .output_with(dst, OperandFlags::REG | OperandFlags::STACK)
    }

    /// Any other instruction, operands get added with the builder methods.
    pub fn op(mnemonic: &str) -> Self {
        Self::with_kind(InstKind::Op(mnemonic.into()))
    }

    /// Adds an output that must be in a register.
    pub fn output(self, value: Value) -> Self {
        self.output_with(value, OperandFlags::REG)
    }

    /// Adds an output with explicit flags.
    pub fn output_with(mut self, value: Value, flags: OperandFlags) -> Self {
        self.outputs.push(Operand::new(value, flags));
        self
    }

    /// Adds an input that must be in a register.
    pub fn input(self, value: Value) -> Self {
        self.input_with(value, OperandFlags::REG)
    }

    /// Adds an input with explicit flags.
    pub fn input_with(mut self, value: Value, flags: OperandFlags) -> Self {
        self.inputs.push(Operand::new(value, flags));
        self
    }

    /// Adds a temp.
    pub fn temp(self, value: Value) -> Self {
        self.temp_with(value, OperandFlags::REG)
    }

    /// Adds a temp with explicit flags.
    pub fn temp_with(mut self, value: Value, flags: OperandFlags) -> Self {
        self.temps.push(Operand::new(value, flags));
        self
    }

    /// Adds an alive operand with explicit flags.
    pub fn alive_with(mut self, value: Value, flags: OperandFlags) -> Self {
        self.alives.push(Operand::new(value, flags));
        self
    }

    /// Adds a state operand.
    pub fn state(self, value: Value) -> Self {
        self.state_with(value, OperandFlags::REG | OperandFlags::STACK)
    }

    /// Adds a state operand with explicit flags.
    pub fn state_with(mut self, value: Value, flags: OperandFlags) -> Self {
        self.states.push(Operand::new(value, flags));
        self
    }

    /// Marks the instruction as destroying every caller-saved register.
    pub fn clobbers_caller_saved(mut self) -> Self {
        self.clobbers = true;
        self
    }

    /// Marks the instruction as two-address: the first output would like to
    /// share a register with the first input.
    pub fn two_address(mut self) -> Self {
        self.two_address = true;

        if let Some(out) = self.outputs.first_mut() {
            out.flags = out.flags | OperandFlags::HINT;
        }

        if let Some(input) = self.inputs.first_mut() {
            input.flags = input.flags | OperandFlags::HINT;
        }

        self
    }

    /// What the instruction is.
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// Every successor block, for terminators.
    pub fn targets(&self) -> &[Block] {
        match &self.kind {
            InstKind::Jump(target) => std::slice::from_ref(target),
            InstKind::Branch(targets) => targets,
            _ => &[],
        }
    }

    /// Whether the instruction ends its block.
    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, InstKind::Jump(_) | InstKind::Branch(_))
    }

    /// Whether the instruction was built with [`Self::two_address`].
    pub fn is_two_address(&self) -> bool {
        self.two_address
    }

    /// The operands of `role` that were added explicitly, without any
    /// block-boundary values.
    pub fn explicit_operands(&self, role: OperandRole) -> &[Operand] {
        match role {
            OperandRole::Output => &self.outputs,
            OperandRole::Temp => &self.temps,
            OperandRole::Alive => &self.alives,
            OperandRole::Input => &self.inputs,
            OperandRole::State => &self.states,
            OperandRole::Incoming | OperandRole::Outgoing => &[],
        }
    }

    /// The values passed across the block boundary: defined by a label, or
    /// passed on by a terminator.
    pub fn block_values(&self) -> &[Value] {
        &self.block_values
    }

    /// The operands of `role`, with block-boundary values folded in.
    pub fn operands(&self, role: OperandRole) -> impl Iterator<Item = Operand> + '_ {
        let block_flags = match role {
            OperandRole::Output if self.kind == InstKind::Label => {
                Some(OperandFlags::REG | OperandFlags::STACK)
            }
            OperandRole::Alive if self.is_terminator() => Some(
                OperandFlags::REG | OperandFlags::STACK | OperandFlags::CONST | OperandFlags::OUTGOING,
            ),
            _ => None,
        };

        let block = block_flags
            .into_iter()
            .flat_map(move |flags| self.block_values.iter().map(move |v| Operand::new(*v, flags)));

        self.explicit_operands(role).iter().copied().chain(block)
    }
}

impl LirInst for GenericInst {
    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn for_each_operand(&self, role: OperandRole, f: &mut dyn FnMut(&Value, OperandFlags)) {
        for operand in self.operands(role) {
            f(&operand.value, operand.flags);
        }
    }

    fn destroys_caller_saved_registers(&self) -> bool {
        self.clobbers
    }

    fn is_label(&self) -> bool {
        self.kind == InstKind::Label
    }

    fn incoming_values(&self) -> &[Value] {
        match self.kind {
            InstKind::Label => &self.block_values,
            _ => &[],
        }
    }

    fn outgoing_values(&self) -> &[Value] {
        if self.is_terminator() {
            &self.block_values
        } else {
            &[]
        }
    }

    fn register_hint(&self, value: &Value, role: OperandRole) -> Option<Value> {
        if !(self.kind == InstKind::Move || self.two_address) {
            return None;
        }

        let out = self.outputs.first()?;
        let input = self.inputs.first()?;

        match role {
            OperandRole::Output | OperandRole::Temp if out.value == *value => Some(input.value),
            OperandRole::Input if input.value == *value => Some(out.value),
            _ => None,
        }
    }

    fn load_constant(&self) -> Option<(Value, Constant)> {
        match self.kind {
            InstKind::LoadConstant(c) => self.outputs.first().map(|out| (out.value, c)),
            _ => None,
        }
    }

    fn move_source(&self) -> Option<Value> {
        match self.kind {
            InstKind::Move => self.inputs.first().map(|input| input.value),
            _ => None,
        }
    }
}
