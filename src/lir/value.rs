//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{PReg, RegClass, VReg};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The kind (and width) of the data a value holds.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// A reference to a managed object. Stack walkers need to see these.
    Ref,
}

impl ValueKind {
    /// Gets the register class values of this kind live in.
    pub fn reg_class(self) -> RegClass {
        match self {
            ValueKind::F32 | ValueKind::F64 => RegClass::Float,
            _ => RegClass::Int,
        }
    }

    /// Whether the value is a reference to a managed object.
    pub fn is_reference(self) -> bool {
        self == ValueKind::Ref
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Ref => "ref",
        };

        f.write_str(name)
    }
}

impl FromStr for ValueKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i32" => Ok(ValueKind::I32),
            "i64" => Ok(ValueKind::I64),
            "f32" => Ok(ValueKind::F32),
            "f64" => Ok(ValueKind::F64),
            "ref" => Ok(ValueKind::Ref),
            _ => Err("the available kinds are `i32`, `i64`, `f32`, `f64`, `ref`"),
        }
    }
}

/// A slot in a stack frame, identified by its byte offset.
///
/// Slots in the caller's frame are how incoming stack arguments are read.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StackSlot {
    offset: i32,
    in_caller_frame: bool,
}

impl StackSlot {
    /// A slot in the current frame.
    pub const fn local(offset: i32) -> Self {
        Self {
            offset,
            in_caller_frame: false,
        }
    }

    /// A slot in the caller's frame, i.e. an incoming stack argument.
    pub const fn caller(offset: i32) -> Self {
        Self {
            offset,
            in_caller_frame: true,
        }
    }

    /// The byte offset of the slot.
    pub fn offset(self) -> i32 {
        self.offset
    }

    /// Whether the slot lives in the caller's frame.
    pub fn in_caller_frame(self) -> bool {
        self.in_caller_frame
    }
}

impl Display for StackSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.in_caller_frame {
            write!(f, "caller[{}]", self.offset)
        } else {
            write!(f, "stack[{}]", self.offset)
        }
    }
}

/// A stack slot that has not been given a frame offset yet.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct VirtualStackSlot(pub u32);

impl Display for VirtualStackSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "vstack{}", self.0)
    }
}

/// A literal constant, stored as raw bits.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Constant {
    kind: ValueKind,
    bits: i64,
}

impl Constant {
    /// Creates a constant of `kind` with the raw bits `bits`.
    pub const fn new(kind: ValueKind, bits: i64) -> Self {
        Self { kind, bits }
    }

    /// The kind of the constant.
    pub fn kind(self) -> ValueKind {
        self.kind
    }

    /// The raw bits of the constant.
    pub fn bits(self) -> i64 {
        self.bits
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.bits, self.kind)
    }
}

/// A value an instruction operates on.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// A virtual register, which gets an interval
    Variable(VReg, ValueKind),
    /// A physical register, which gets a fixed interval if it is allocatable
    Register(PReg, ValueKind),
    /// An already-assigned stack slot
    Stack(StackSlot, ValueKind),
    /// A stack slot that is not assigned yet
    VirtualStack(VirtualStackSlot, ValueKind),
    /// A literal
    Constant(Constant),
    /// No value at all
    Illegal,
}

impl Value {
    /// Shorthand for [`Value::Variable`].
    pub const fn var(n: u32, kind: ValueKind) -> Self {
        Value::Variable(VReg::new(n), kind)
    }

    /// Shorthand for [`Value::Register`].
    pub const fn reg(reg: PReg, kind: ValueKind) -> Self {
        Value::Register(reg, kind)
    }

    /// Shorthand for [`Value::Constant`].
    pub const fn constant(kind: ValueKind, bits: i64) -> Self {
        Value::Constant(Constant::new(kind, bits))
    }

    /// The kind of the value, or `None` for [`Value::Illegal`].
    pub fn kind(self) -> Option<ValueKind> {
        match self {
            Value::Variable(_, kind)
            | Value::Register(_, kind)
            | Value::Stack(_, kind)
            | Value::VirtualStack(_, kind) => Some(kind),
            Value::Constant(c) => Some(c.kind()),
            Value::Illegal => None,
        }
    }

    /// Returns the virtual register if this is a variable.
    pub fn as_variable(self) -> Option<VReg> {
        match self {
            Value::Variable(reg, _) => Some(reg),
            _ => None,
        }
    }

    /// Returns the physical register if this is a register.
    pub fn as_register(self) -> Option<PReg> {
        match self {
            Value::Register(reg, _) => Some(reg),
            _ => None,
        }
    }

    /// Returns the constant if this is a constant.
    pub fn as_constant(self) -> Option<Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Whether this is a variable or a physical register, i.e. something
    /// that can have an interval.
    pub fn is_variable_or_register(self) -> bool {
        matches!(self, Value::Variable(..) | Value::Register(..))
    }

    /// Whether this is any kind of stack slot.
    pub fn is_stack_slot(self) -> bool {
        matches!(self, Value::Stack(..) | Value::VirtualStack(..))
    }

    /// Whether this is [`Value::Illegal`].
    pub fn is_illegal(self) -> bool {
        self == Value::Illegal
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Variable(reg, kind) => write!(f, "{reg}:{kind}"),
            Value::Register(reg, kind) => write!(f, "{reg}:{kind}"),
            Value::Stack(slot, kind) => write!(f, "{slot}:{kind}"),
            Value::VirtualStack(slot, kind) => write!(f, "{slot}:{kind}"),
            Value::Constant(c) => write!(f, "{c}"),
            Value::Illegal => f.write_str("illegal"),
        }
    }
}

/// Where the allocator put (a piece of) an interval.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Location {
    /// A physical register
    Register(PReg),
    /// A stack slot with a frame offset
    Stack(StackSlot),
    /// A stack slot without a frame offset
    VirtualStack(VirtualStackSlot),
}

impl Location {
    /// Turns the location back into an operand holding a value of `kind`.
    pub fn to_value(self, kind: ValueKind) -> Value {
        match self {
            Location::Register(reg) => Value::Register(reg, kind),
            Location::Stack(slot) => Value::Stack(slot, kind),
            Location::VirtualStack(slot) => Value::VirtualStack(slot, kind),
        }
    }

    /// Gets the location an operand names, if it names one.
    pub fn of_value(value: Value) -> Option<Self> {
        match value {
            Value::Register(reg, _) => Some(Location::Register(reg)),
            Value::Stack(slot, _) => Some(Location::Stack(slot)),
            Value::VirtualStack(slot, _) => Some(Location::VirtualStack(slot)),
            _ => None,
        }
    }

    /// Whether the location is in memory.
    pub fn is_stack(self) -> bool {
        !matches!(self, Location::Register(_))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(reg) => write!(f, "{reg}"),
            Location::Stack(slot) => write!(f, "{slot}"),
            Location::VirtualStack(slot) => write!(f, "{slot}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!("f64".parse::<ValueKind>(), Ok(ValueKind::F64));
        assert!("i8".parse::<ValueKind>().is_err());
        assert_eq!(ValueKind::F32.reg_class(), RegClass::Float);
        assert_eq!(ValueKind::Ref.reg_class(), RegClass::Int);
        assert!(ValueKind::Ref.is_reference());
    }

    #[test]
    fn value_queries() {
        let v = Value::var(3, ValueKind::I64);
        let r = Value::reg(PReg::int(1), ValueKind::I32);
        let s = Value::Stack(StackSlot::caller(16), ValueKind::I64);

        assert_eq!(v.as_variable(), Some(VReg::new(3)));
        assert!(v.is_variable_or_register());
        assert!(r.is_variable_or_register());
        assert!(s.is_stack_slot());
        assert_eq!(Value::Illegal.kind(), None);
        assert_eq!(Value::constant(ValueKind::I32, 7).kind(), Some(ValueKind::I32));
    }

    #[test]
    fn display() {
        assert_eq!(Value::var(3, ValueKind::I64).to_string(), "v3:i64");
        assert_eq!(
            Value::Stack(StackSlot::caller(16), ValueKind::Ref).to_string(),
            "caller[16]:ref"
        );
        assert_eq!(Value::constant(ValueKind::I32, -2).to_string(), "#-2:i32");
        assert_eq!(Location::Register(PReg::float(2)).to_string(), "f2");
    }

    #[test]
    fn locations_round_trip_through_values() {
        let loc = Location::Stack(StackSlot::local(8));
        let value = loc.to_value(ValueKind::F64);

        assert_eq!(Location::of_value(value), Some(loc));
        assert!(loc.is_stack());
        assert_eq!(Location::of_value(Value::var(0, ValueKind::I64)), None);
    }
}
