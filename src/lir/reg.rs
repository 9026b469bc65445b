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
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Models the type of register that a given register is.
///
/// As of right now, this is only an integer or a float register.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// The register class for integer (and reference) values.
    Int = 0,
    /// The register class for floating-point values.
    Float = 1,
}

/// Represents a single physical register on a CPU. The register class
/// is stored in the lowest bit, while the register number is in the bits
/// above it.
///
/// The raw encoding doubles as the register's index in per-register tables,
/// which is how fixed intervals are looked up.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PReg {
    data: u8,
}

impl PReg {
    /// Creates a register with a given number and class
    #[inline]
    pub const fn with_class(class: RegClass, hw_number: usize) -> Self {
        Self {
            data: ((hw_number as u8) << 1) | (class as u8),
        }
    }

    /// Creates an integer register with a given hardware number
    #[inline]
    pub const fn int(hw_number: usize) -> Self {
        Self::with_class(RegClass::Int, hw_number)
    }

    /// Creates a floating-point register with a given hardware number
    #[inline]
    pub const fn float(hw_number: usize) -> Self {
        Self::with_class(RegClass::Float, hw_number)
    }

    /// The identity of the register. No other physical register shares it.
    #[inline]
    pub const fn identity(self) -> usize {
        self.data as usize
    }

    /// Gets the number of the register **within its class**. This value
    /// overlaps between register classes.
    #[inline]
    pub const fn hw_number(self) -> usize {
        (self.data >> 1) as usize
    }

    /// Gets what type of register this register is for.
    #[inline]
    pub const fn class(self) -> RegClass {
        if self.data & 1 == 0 {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }
}

impl ArenaKey for PReg {
    #[inline]
    fn new(index: usize) -> Self {
        assert!(index <= u8::MAX as usize, "register identity out of range");

        Self { data: index as u8 }
    }

    #[inline]
    fn index(self) -> usize {
        self.identity()
    }
}

impl Debug for PReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for PReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.class() {
            RegClass::Int => write!(f, "r{}", self.hw_number()),
            RegClass::Float => write!(f, "f{}", self.hw_number()),
        }
    }
}

/// Represents a single **virtual** register.
///
/// Unlike a physical register this is not bounded by any hardware, and the
/// number is dense: it is used directly as the index of the register's
/// interval. Intervals created by splitting get fresh numbers past the
/// highest one the LIR uses.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VReg {
    data: u32,
}

impl VReg {
    /// Creates virtual register number `n`.
    #[inline]
    pub const fn new(n: u32) -> Self {
        Self { data: n }
    }

    /// The register's number.
    #[inline]
    pub const fn number(self) -> u32 {
        self.data
    }
}

impl ArenaKey for VReg {
    #[inline]
    fn new(index: usize) -> Self {
        Self {
            data: u32::try_from(index).expect("virtual register number out of range"),
        }
    }

    #[inline]
    fn index(self) -> usize {
        self.data as usize
    }
}

impl Debug for VReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for VReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(PReg, u8);
    assert_eq_size!(VReg, u32);

    #[test]
    fn preg_encoding() {
        let r3 = PReg::int(3);
        let f3 = PReg::float(3);

        assert_ne!(r3, f3);
        assert_eq!(r3.hw_number(), f3.hw_number());
        assert_eq!(r3.class(), RegClass::Int);
        assert_eq!(f3.class(), RegClass::Float);
        assert_eq!(r3.identity(), 6);
        assert_eq!(f3.identity(), 7);
        assert_eq!(<PReg as ArenaKey>::new(f3.index()), f3);
    }

    #[test]
    fn display() {
        assert_eq!(PReg::int(0).to_string(), "r0");
        assert_eq!(PReg::float(12).to_string(), "f12");
        assert_eq!(VReg::new(42).to_string(), "v42");
        assert_eq!(format!("{:?}", VReg::new(1)), "v1");
    }
}
