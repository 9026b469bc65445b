//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Terminal output of the test runner.
//!
//! Every runner prints one `trace N:` section per trace, holding either an
//! interval dump or the moves resolution inserted. Mismatches are shown per
//! trace, so a failure only lists the traces that came out differently.

use crate::discovery::cases_in_subdir;
use crate::subtest::{Subtest, TestDetails};
use crate::testcase::TestFailure;
use ansi_term::Color::{Blue, Cyan, Green, Red, White, Yellow};
use std::time::Duration;

// lines up details with the file name of the result line
const INDENT: &str = "        ";

/// The lines one trace printed, under its `trace N:` header.
#[derive(Debug, PartialEq, Eq)]
struct TraceSection<'a> {
    header: &'a str,
    lines: Vec<&'a str>,
}

/// One line of a diff between expected and actual output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DiffLine<'a> {
    Same(&'a str),
    Expected(&'a str),
    Got(&'a str),
}

/// How one expected trace compares against the output of the test.
#[derive(Debug, PartialEq, Eq)]
enum TraceDiff<'a> {
    Missing(&'a str),
    Changed {
        header: &'a str,
        lines: Vec<DiffLine<'a>>,
    },
}

// lines in front of the first header end up in a section without one
fn trace_sections(output: &str) -> Vec<TraceSection<'_>> {
    let mut sections: Vec<TraceSection<'_>> = Vec::new();

    for line in output.lines() {
        if line.starts_with("trace ") && line.ends_with(':') {
            sections.push(TraceSection {
                header: line,
                lines: Vec::new(),
            });

            continue;
        }

        match sections.last_mut() {
            Some(section) => section.lines.push(line),
            None => sections.push(TraceSection {
                header: "",
                lines: vec![line],
            }),
        }
    }

    sections
}

fn diff_lines<'a>(expected: &[&'a str], got: &[&'a str]) -> Vec<DiffLine<'a>> {
    diff::slice(expected, got)
        .into_iter()
        .map(|line| match line {
            diff::Result::Left(l) => DiffLine::Expected(*l),
            diff::Result::Both(l, _) => DiffLine::Same(*l),
            diff::Result::Right(r) => DiffLine::Got(*r),
        })
        .collect()
}

/// Compares every trace of `expected` against the trace with the same
/// header in `got`. Traces that match are left out.
fn compare_traces<'a>(expected: &'a str, got: &'a str) -> Vec<TraceDiff<'a>> {
    let got = trace_sections(got);

    trace_sections(expected)
        .into_iter()
        .filter_map(|want| {
            let Some(have) = got.iter().find(|s| s.header == want.header) else {
                return Some(TraceDiff::Missing(want.header));
            };

            let lines = diff_lines(&want.lines, &have.lines);

            if lines.iter().all(|line| matches!(line, DiffLine::Same(_))) {
                return None;
            }

            Some(TraceDiff::Changed {
                header: want.header,
                lines,
            })
        })
        .collect()
}

fn render_lines(out: &mut String, lines: &[DiffLine<'_>]) {
    for line in lines {
        let line = match line {
            DiffLine::Same(l) => format!("    {l}"),
            DiffLine::Expected(l) => Red.paint(format!("  - {l}")).to_string(),
            DiffLine::Got(l) => Green.paint(format!("  + {l}")).to_string(),
        };

        out.push_str(INDENT);
        out.push_str(&line);
        out.push('\n');
    }
}

fn render_diff(expected: &str, got: &str) -> String {
    let legend = format!("{} {}", Red.paint("- expected"), Green.paint("+ got"));
    let mut out = format!("{legend}\n");
    let traces = compare_traces(expected, got);

    // the traces agree line by line, so whatever differs is between them
    if traces.is_empty() {
        let expected: Vec<&str> = expected.lines().collect();
        let got: Vec<&str> = got.lines().collect();

        render_lines(&mut out, &diff_lines(&expected, &got));

        return out;
    }

    for trace in traces {
        match trace {
            TraceDiff::Missing(header) => {
                let missing = Red.bold().paint("no output for");

                out += &format!("{INDENT}{missing} {header}\n");
            }
            TraceDiff::Changed { header, lines } => {
                out += &format!("{INDENT}{}\n", Yellow.bold().paint(header));

                render_lines(&mut out, &lines);
            }
        }
    }

    out
}

fn indented(text: &str) -> String {
    text.lines()
        .map(|line| format!("{INDENT}    {line}\n"))
        .collect()
}

fn render_failure(failure: &TestFailure) -> String {
    match failure {
        TestFailure::Diff { expected, got } => render_diff(expected, got),
        TestFailure::Missing { check, full } => format!(
            "{} {check}\n{}",
            Red.bold().paint("nothing matched CHECK:"),
            indented(full)
        ),
        TestFailure::Error(err) => {
            format!("{}\n{}", Red.bold().paint("allocation failed:"), indented(err))
        }
        TestFailure::LackOfError => Red
            .bold()
            .paint("expected an error, but every trace was allocated")
            .to_string(),
        TestFailure::Panic(message, backtrace) => format!(
            "{} {}\n\n{}",
            Red.paint("runner panicked:"),
            Red.bold().paint(message),
            Red.paint(backtrace)
        ),
    }
}

pub fn print_subtest_header(subtest: &Subtest) {
    let cases = cases_in_subdir(subtest.subdir()).len();
    let running = Green.bold().paint("Running");
    let name = White.bold().paint(subtest.name());

    println!("     {running} {name} ({cases} files in tests/{})", subtest.subdir());
}

pub fn print_summary(total: usize, failed: usize, elapsed: Duration) {
    let color = if failed == 0 { Green } else { Red };
    let result = color.bold().paint(if failed == 0 { "ok" } else { "FAILED" });
    let passed = Green.paint((total - failed).to_string());
    let failed = color.paint(failed.to_string());

    println!(
        "     {result} {passed} passed, {failed} failed of {} in {:.3}s",
        Blue.paint(total.to_string()),
        elapsed.as_secs_f32()
    );
}

pub fn print_failure(file: String, details: String) {
    println!();
    println!("{} {file}", Red.bold().paint("---- failure:"));
    print!("{details}");

    if !details.ends_with('\n') {
        println!();
    }
}

/// Prints the result line of one file. A failure is returned as the file's
/// name and the rendered details, to be printed after every file has run.
pub fn print_subtest_result(
    subtest: &Subtest,
    file: &'static str,
    details: TestDetails,
) -> Option<(String, String)> {
    let name = format!("{}/{}", Cyan.paint(subtest.name()), Blue.paint(file));
    let status = match details.output {
        Ok(()) => Green.paint("  ok").to_string(),
        Err(_) => Red.bold().paint("FAIL").to_string(),
    };

    println!("{INDENT}{status} {name} ({:.3}s)", details.elapsed.as_secs_f32());

    details.output.err().map(|failure| (name, render_failure(&failure)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "trace 0:\n  v0:i64 [2, 5) state no-spill-store def 2\n  \
                        v1:i64 [6, 8) state no-spill-store def 6\ntrace 1:\n  \
                        v4:i64 [0, 2) state no-spill-store def 0\n";

    #[test]
    fn output_is_split_per_trace() {
        let sections = trace_sections(DUMP);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, "trace 0:");
        assert_eq!(sections[0].lines.len(), 2);
        assert_eq!(
            sections[1].lines,
            ["  v4:i64 [0, 2) state no-spill-store def 0"]
        );
        assert_eq!(trace_sections("x\ntrace 3:\n")[0].header, "");
    }

    #[test]
    fn only_differing_traces_are_reported() {
        let got = DUMP.replace("v4:i64 [0, 2)", "v4:i64 [0, 3)");
        let diffs = compare_traces(DUMP, &got);

        assert_eq!(diffs.len(), 1);

        let TraceDiff::Changed { header, lines } = &diffs[0] else {
            panic!("expected a changed trace, got {diffs:?}");
        };

        assert_eq!(*header, "trace 1:");
        assert_eq!(
            lines,
            &[
                DiffLine::Expected("  v4:i64 [0, 2) state no-spill-store def 0"),
                DiffLine::Got("  v4:i64 [0, 3) state no-spill-store def 0"),
            ]
        );
    }

    #[test]
    fn moves_of_a_missing_trace() {
        let expected = "trace 0:\nb0[2]:\n  r1:i64 = move r0\ntrace 2:\nb4[1]:\n  r0:i64 = move r2\n";
        let got = "trace 0:\nb0[2]:\n  r1:i64 = move r0\n";

        assert_eq!(compare_traces(expected, got), [TraceDiff::Missing("trace 2:")]);
        assert!(compare_traces(got, got).is_empty());
    }
}
