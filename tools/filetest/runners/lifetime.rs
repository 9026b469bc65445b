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
use trace_lsra::regalloc::build_intervals;

fn dump_intervals(name: &str, content: &str, ssi: bool) -> TestResult {
    let (file, context) = match read_test(name, content, ssi) {
        Ok(test) => test,
        Err(result) => return result,
    };

    let mut out = String::default();

    for trace in file.traces.traces() {
        match build_intervals(&file.lir, &file.traces, trace, &context) {
            Ok(Some(store)) => out += &store.dump().to_string(),
            Ok(None) => {}
            Err(err) => return TestResult::Error(err.to_string()),
        }
    }

    TestResult::Output(out)
}

fn lifetime(name: &str, content: &str) -> TestResult {
    dump_intervals(name, content, false)
}

// the SSI builder has to agree with lifetime analysis on every file
fn ssi(name: &str, content: &str) -> TestResult {
    dump_intervals(name, content, true)
}

pub const fn lifetime_subtest() -> Subtest {
    Subtest::new("lifetime", "lifetime", lifetime)
}

pub const fn ssi_subtest() -> Subtest {
    Subtest::new("ssi", "lifetime", ssi)
}
