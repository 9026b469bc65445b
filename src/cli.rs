//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Contains utility code specifically for the CLI tools located in
//! the `tools/` subdirectory.
//!
//! All of these tools have similar command-line arguments and they all
//! should look/feel uniform, so most of the code is pulled into this
//! module and then used in the drivers of the different tools.

use crate::regalloc::AllocatorOptions;
use bpaf::{construct, OptionParser, Parser};
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Basic options that every CLI tool in the suite takes in.
pub struct BaseOptions {
    /// The file to output results to
    pub output: Option<PathBuf>,
    /// Whether or not to run the logging in verbose mode.
    pub verbose: bool,
    /// The list of inputs given to the tool
    pub inputs: Vec<PathBuf>,
}

/// Returns a [`OptionParser`] preconfigured with the standard options
/// and additional tool-specific options.
pub fn tool_with<T>(
    description: &'static str,
    usage: &'static str,
    additional: impl Parser<T> + 'static,
) -> OptionParser<(T, BaseOptions)> {
    let res = construct!(additional, default());

    res.to_options()
        .descr(description)
        .version(VERSION)
        .usage(usage)
}

/// Gets the baseline default options that every tool needs.
pub fn default() -> impl Parser<BaseOptions> {
    let inputs = inputs();
    let output = output();
    let verbose = verbose();

    construct!(BaseOptions {
        output,
        verbose,
        inputs,
    })
}

/// Gets the output file specified on the CLI, if one exists.
pub fn output() -> impl Parser<Option<PathBuf>> {
    bpaf::long("output")
        .short('o')
        .help("the file to output to")
        .argument::<PathBuf>("FILE")
        .optional()
}

/// Gets the input file specified on the CLI.
pub fn inputs() -> impl Parser<Vec<PathBuf>> {
    bpaf::positional::<PathBuf>("FILES")
        .help("files to read as input to the tool")
        .many()
}

/// Checks for the presence of `-v` or `--verbose`
pub fn verbose() -> impl Parser<bool> {
    bpaf::long("verbose")
        .short('v')
        .help("enable verbose output")
        .flag(true, false)
}

/// Gets the number of concurrent threads to use for a given task
pub fn jobs() -> impl Parser<Option<usize>> {
    bpaf::long("jobs")
        .short('j')
        .help("the number of concurrent jobs to run")
        .argument::<usize>("JOBS")
        .optional()
}

/// Gets the allocator options turned on or off on the command line, in
/// the form `--option NAME` or `--option NAME=false`.
pub fn allocator_options() -> impl Parser<Vec<(String, bool)>> {
    bpaf::long("option")
        .short('O')
        .help("an allocator option to set, e.g. 'inter-trace-hints=false'")
        .argument::<String>("NAME[=BOOL]")
        .guard(
            |opt| {
                let (name, value) = split_option(opt);

                value.is_some() && AllocatorOptions::default().set(name, true).is_ok()
            },
            "options must be a known option name, optionally followed by '=true' or '=false'",
        )
        .map(|opt| {
            let (name, value) = split_option(&opt);

            (name.to_string(), value.unwrap_or(true))
        })
        .many()
}

// `Some(..)` when the value part (if any) is a valid bool
fn split_option(opt: &str) -> (&str, Option<bool>) {
    match opt.split_once('=') {
        Some((name, "true")) => (name, Some(true)),
        Some((name, "false")) => (name, Some(false)),
        Some((name, _)) => (name, None),
        None => (opt, Some(true)),
    }
}

/// Applies options parsed by [`allocator_options`] on top of `options`.
pub fn apply_options(options: &mut AllocatorOptions, overrides: &[(String, bool)]) {
    for (name, value) in overrides {
        // names were validated while parsing
        let _ = options.set(name, *value);
    }
}
