//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use bpaf::Parser;
use std::fmt::Write;
use std::io::ErrorKind;
use std::sync::Arc;
use std::{fs, io};
use trace_lsra::cli;
use trace_lsra::cli::BaseOptions;
use trace_lsra::lir::{read_lir, write_lir, LirFile};
use trace_lsra::regalloc::{
    allocate_traces, build_intervals, number_instructions, AllocationContext, ScriptedAllocator,
};

struct DumpOptions {
    moves: bool,
    ssi: bool,
    jobs: Option<usize>,
    overrides: Vec<(String, bool)>,
}

fn parse_options() -> (BaseOptions, DumpOptions) {
    let moves = bpaf::long("moves")
        .short('m')
        .help("replay the file's `assign` lines and print the moves data-flow resolution inserts")
        .switch();

    let ssi = bpaf::long("ssi-builder")
        .help("build intervals with the SSI interval builder")
        .switch();

    let jobs = cli::jobs();
    let overrides = cli::allocator_options();

    let ((moves, ssi, jobs, overrides), base) = cli::tool_with(
        "prints the lifetime intervals of every trace in a .lir file",
        "Usage: lsra-dump [options] <input lir>",
        bpaf::construct!(moves, ssi, jobs, overrides),
    )
    .run();

    (
        base,
        DumpOptions {
            moves,
            ssi,
            jobs,
            overrides,
        },
    )
}

fn dump_file(source: &str, name: &str, options: &DumpOptions) -> Result<String, String> {
    let LirFile {
        mut lir,
        traces,
        registers,
        options: mut allocator_options,
        assignments,
    } = read_lir(source).map_err(|e| e.format(name, source))?;

    cli::apply_options(&mut allocator_options, &options.overrides);

    for trace in traces.traces() {
        number_instructions(&mut lir, trace);
    }

    let mut out = String::default();
    let _ = write_lir(&mut out, &lir, &traces, true);

    let mut context = AllocationContext::new(registers, allocator_options)
        .with_allocator(ScriptedAllocator::new(assignments));

    context.use_ssi_builder = options.ssi;

    // without `--moves` nothing gets a location, so only analysis is run
    if !options.moves {
        for trace in traces.traces() {
            let store = build_intervals(&lir, &traces, trace, &context)
                .map_err(|e| format!("analysis failed: {e}"))?;

            if let Some(store) = store {
                let _ = write!(out, "\n{}", store.dump());
            }
        }

        return Ok(out);
    }

    let results = allocate_traces(
        Arc::new(lir),
        Arc::new(traces),
        Arc::new(context),
        options.jobs,
    )
    .map_err(|e| format!("allocation failed: {e}"))?;

    for result in results {
        let _ = write!(out, "\n{}", result.store.dump());

        if !result.moves.is_empty() {
            let _ = write!(out, "moves:\n{}", result.moves);
        }
    }

    Ok(out)
}

fn main() -> io::Result<()> {
    let (base, options) = parse_options();
    let level = if base.verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if base.inputs.len() != 1 {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "can only dump one file at a time",
        ));
    }

    let input = &base.inputs[0];
    let source = fs::read_to_string(input)?;
    let name = input.display().to_string();

    let out = dump_file(&source, &name, &options).map_err(|e| {
        eprintln!("{e}");

        io::Error::new(ErrorKind::InvalidInput, "failed to dump file")
    })?;

    match &base.output {
        Some(path) => fs::write(path, out),
        None => {
            print!("{out}");

            Ok(())
        }
    }
}
