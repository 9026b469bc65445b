//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::runners::read_test;
use crate::subtest::{Subtest, TestResult};
use trace_lsra::arena::ArenaKey;
use trace_lsra::regalloc::allocate_trace;

fn resolve(name: &str, content: &str) -> TestResult {
    let (file, context) = match read_test(name, content, false) {
        Ok(test) => test,
        Err(result) => return result,
    };

    let mut out = String::default();

    for trace in file.traces.traces() {
        match allocate_trace(&file.lir, &file.traces, trace, &context) {
            Ok(Some(allocation)) => {
                out += &format!("trace {}:\n{}", allocation.trace.index(), allocation.moves);
            }
            Ok(None) => {}
            Err(err) => return TestResult::Error(err.to_string()),
        }
    }

    TestResult::Output(out)
}

pub const fn resolve_subtest() -> Subtest {
    Subtest::new("resolve", "resolve", resolve)
}
