//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{PReg, RegClass, Value};
use smallbitvec::SmallBitVec;

/// A set of detailed allocator configuration options.
///
/// This effectively models the `-fthing` argument pattern in GCC-like
/// compilers, every option can be flipped independently.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Constants loaded into variables are always rematerialized instead of
    /// being spilled, even if a use would accept a stack slot.
    pub never_spill_constants: bool,
    /// Hint incoming values of a trace at the locations the already-allocated
    /// predecessor traces put them in.
    pub use_inter_trace_hints: bool,
    /// Whether the target can move a constant straight into a stack slot.
    /// Constants are only considered for rematerialization when it can.
    pub constants_to_stack: bool,
    /// Verify every interval after each trace is analyzed and resolved.
    pub detailed_asserts: bool,
}

impl AllocatorOptions {
    /// Sets an option by its command-line name, e.g. `inter-trace-hints`.
    ///
    /// ```
    /// # use trace_lsra::regalloc::AllocatorOptions;
    /// let mut opts = AllocatorOptions::default();
    ///
    /// opts.set("never-spill-constants", true).unwrap();
    /// assert!(opts.never_spill_constants);
    /// assert!(opts.set("fast-math", true).is_err());
    /// ```
    pub fn set(&mut self, name: &str, value: bool) -> Result<(), String> {
        let option = match name {
            "never-spill-constants" => &mut self.never_spill_constants,
            "inter-trace-hints" => &mut self.use_inter_trace_hints,
            "constants-to-stack" => &mut self.constants_to_stack,
            "detailed-asserts" => &mut self.detailed_asserts,
            _ => return Err(format!("unknown allocator option `{name}`")),
        };

        *option = value;

        Ok(())
    }
}

#[allow(clippy::derivable_impls)]
impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            never_spill_constants: false,
            use_inter_trace_hints: true,
            constants_to_stack: true,
            detailed_asserts: false,
        }
    }
}

/// Describes the register file: which registers may be handed out, and
/// which of those get destroyed across a call.
#[derive(Clone, Debug)]
pub struct RegisterConfig {
    allocatable: Vec<PReg>,
    caller_saved: Vec<PReg>,
    is_allocatable: SmallBitVec,
}

impl RegisterConfig {
    /// Creates a register config from explicit lists. Caller-saved registers
    /// that are not allocatable are kept, but never get fixed intervals.
    pub fn new(allocatable: Vec<PReg>, caller_saved: Vec<PReg>) -> Self {
        let size = allocatable.iter().map(|r| r.identity() + 1).max().unwrap_or(0);
        let mut is_allocatable = SmallBitVec::from_elem(size, false);

        for reg in allocatable.iter() {
            is_allocatable.set(reg.identity(), true);
        }

        Self {
            allocatable,
            caller_saved,
            is_allocatable,
        }
    }

    /// A register file with `n_int` integer and `n_float` float registers,
    /// where the first `n_caller_saved` of each class are caller-saved.
    ///
    /// ```
    /// # use trace_lsra::regalloc::RegisterConfig;
    /// # use trace_lsra::lir::PReg;
    /// let config = RegisterConfig::generic(4, 2, 1);
    ///
    /// assert_eq!(config.allocatable().len(), 6);
    /// assert_eq!(config.caller_saved(), [PReg::int(0), PReg::float(0)]);
    /// assert!(!config.is_allocatable(PReg::int(4)));
    /// ```
    pub fn generic(n_int: usize, n_float: usize, n_caller_saved: usize) -> Self {
        let regs = |class: RegClass, n: usize| (0..n).map(move |i| PReg::with_class(class, i));

        let allocatable = regs(RegClass::Int, n_int)
            .chain(regs(RegClass::Float, n_float))
            .collect();

        let caller_saved = regs(RegClass::Int, n_caller_saved.min(n_int))
            .chain(regs(RegClass::Float, n_caller_saved.min(n_float)))
            .collect();

        Self::new(allocatable, caller_saved)
    }

    /// Every allocatable register.
    #[inline]
    pub fn allocatable(&self) -> &[PReg] {
        &self.allocatable
    }

    /// Every register destroyed by a call.
    #[inline]
    pub fn caller_saved(&self) -> &[PReg] {
        &self.caller_saved
    }

    /// Whether the allocator may hand out `reg`.
    #[inline]
    pub fn is_allocatable(&self, reg: PReg) -> bool {
        self.is_allocatable.get(reg.identity()) == Some(true)
    }

    /// One past the largest register identity that is allocatable, i.e. the
    /// size a table indexed by register would need.
    #[inline]
    pub fn register_table_size(&self) -> usize {
        self.is_allocatable.len()
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self::generic(4, 4, 2)
    }
}

/// Target-specific knowledge about how arguments arrive.
pub trait CallingConvention: Send + Sync {
    /// Whether a move out of `source` defines a method argument that has to
    /// stay where the caller put it, because the runtime reads it there while
    /// walking the stack.
    ///
    /// Definitions by such moves get no register priority at all.
    fn is_unoptimizable_method_argument(&self, source: &Value) -> bool;
}

/// The common convention: arguments passed on the stack that do not hold
/// references are left in the caller's frame.
#[derive(Copy, Clone, Debug, Default)]
pub struct StackArgumentConvention;

impl CallingConvention for StackArgumentConvention {
    fn is_unoptimizable_method_argument(&self, source: &Value) -> bool {
        match source {
            Value::Stack(slot, kind) => slot.in_caller_frame() && !kind.is_reference(),
            _ => false,
        }
    }
}
