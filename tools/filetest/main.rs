//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

mod discovery;
mod display;
mod runner;
mod runners;
mod subtest;
mod testcase;

use crate::runner::{run_all, run_subtest};
use bpaf::Parser;
use std::process::ExitCode;
use trace_lsra::cli;

fn subtest() -> impl Parser<Option<String>> {
    bpaf::long("subtest")
        .help("the subtest to run, one of 'lifetime', 'ssi' or 'resolve'")
        .argument::<String>("NAME")
        .optional()
}

fn main() -> ExitCode {
    #[cfg(windows)]
    ansi_term::enable_ansi_support().expect("unable to enable ANSI");

    let jobs = cli::jobs();
    let subtest = subtest();
    let ((subtest, jobs), options) = cli::tool_with(
        "file-driven test runner for the trace register allocator",
        "filetest [--subtest <NAME>]",
        bpaf::construct!(subtest, jobs),
    )
    .run();

    if !options.inputs.is_empty() {
        eprintln!("expected file list to be empty!");

        return ExitCode::from(1);
    }

    let level = if options.verbose { "debug" } else { "off" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match subtest {
        Some(s) => run_subtest(&s, jobs),
        None => run_all(jobs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::from(1),
    }
}

#[test]
fn test_lifetime() {
    assert!(matches!(run_subtest("lifetime", Some(2)), Ok(())));
}

#[test]
fn test_ssi() {
    assert!(matches!(run_subtest("ssi", Some(2)), Ok(())));
}

#[test]
fn test_resolve() {
    assert!(matches!(run_subtest("resolve", Some(2)), Ok(())));
}
