//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

mod lifetime;
mod resolve;

pub use lifetime::*;
pub use resolve::*;

use crate::subtest::TestResult;
use trace_lsra::lir::{read_lir, LirFile};
use trace_lsra::regalloc::{number_instructions, AllocationContext, ScriptedAllocator};

/// Reads a test file, numbers every trace and builds the context that
/// allocates it. Read errors are the result of the test.
fn read_test(name: &str, content: &str, ssi: bool) -> Result<(LirFile, AllocationContext), TestResult> {
    let mut file = read_lir(content).map_err(|e| TestResult::Error(e.format(name, content)))?;

    for trace in file.traces.traces() {
        number_instructions(&mut file.lir, trace);
    }

    let mut context = AllocationContext::new(file.registers.clone(), file.options)
        .with_allocator(ScriptedAllocator::new(file.assignments.clone()));

    context.use_ssi_builder = ssi;

    Ok((file, context))
}
