//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The low-level IR the allocator works on.
//!
//! The allocator only needs a small view of the real LIR: blocks with
//! their predecessors and successors, the operands of each instruction and
//! the values passed across block boundaries. [`LirInst`] is that view, and
//! [`GenericInst`] is an instruction type that can express any of it, used
//! by the textual format and by tests.

mod function;
mod inst;
mod reader;
mod reg;
pub mod ssi;
mod trace;
mod value;
mod writer;

pub use function::*;
pub use inst::*;
pub use reader::*;
pub use reg::*;
pub use trace::*;
pub use value::*;
pub use writer::*;
