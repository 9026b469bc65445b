//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::subtest::TestResult;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TestFailure {
    Diff { expected: String, got: String },
    Missing { check: String, full: String },
    Error(String),
    // message, backtrace
    Panic(String, String),
    LackOfError,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Check<'data> {
    // rest
    MatchEntireFile(&'data str),
    // expected
    MatchSection(String),
    // checks
    IndividualChecks(Vec<&'data str>),
    // part of the error message
    Error(String),
}

fn first_line(contents: &str) -> Option<(&str, &str)> {
    contents
        .find('\n')
        .map(|idx| (&contents[0..idx], &contents[idx + 1..]))
}

fn find_match_section<'data>(rest: &str) -> Check<'data> {
    let mut lines = rest.lines();
    let mut section = String::default();

    assert_eq!(lines.next(), Some(";"));

    for line in lines
        // we don't do `trim_start_matches(';')` because an empty line `;` needs to be empty
        // but we also need to maintain whitespace, so we can't just do .trim_start with one space
        .map(|line| line.trim_start_matches("; ").trim_end())
        .take_while(|line| *line != ";;")
    {
        if line != ";" {
            section.push_str(line);
        }

        section.push('\n');
    }

    Check::MatchSection(section)
}

fn find_individual_checks(rest: &str) -> Check<'_> {
    let lines = rest.lines();
    let mut checks = Vec::default();

    for line in lines
        .map(|line| line.trim_start())
        .filter(|line| line.starts_with("; CHECK: "))
    {
        let check = line.trim_start_matches("; CHECK: ");

        checks.push(check);
    }

    Check::IndividualChecks(checks)
}

fn find_checks<'data>(name: &str, contents: &'data str) -> Check<'data> {
    let (first, rest) = match first_line(contents) {
        Some(data) => data,
        None => return Check::IndividualChecks(Vec::default()),
    };

    if first.starts_with("; MATCH-ENTIRE") {
        return Check::MatchEntireFile(rest);
    }

    if first.starts_with("; MATCH-SECTION") {
        return find_match_section(rest);
    }

    if first.starts_with("; ERROR: ") {
        return Check::Error(first.trim_start_matches("; ERROR: ").to_string());
    }

    if first.starts_with("; STANDARD") {
        return find_individual_checks(rest);
    }

    panic!("test '{name}' did not provide `; <TYPE>` header for `filetest`. got: '{first}'")
}

fn match_entire_file(output: TestResult, expected: &str) -> Result<(), TestFailure> {
    match output {
        TestResult::Output(data) if data == expected => Ok(()),
        TestResult::Error(err) => Err(TestFailure::Error(err)),
        TestResult::Output(data) => Err(TestFailure::Diff {
            expected: expected.to_string(),
            got: data,
        }),
    }
}

fn match_error(output: TestResult, err: &str) -> Result<(), TestFailure> {
    match output {
        TestResult::Error(got) if got.contains(err) => Ok(()),
        TestResult::Error(got) => Err(TestFailure::Error(got)),
        _ => Err(TestFailure::LackOfError),
    }
}

fn match_section(output: TestResult, section: &str) -> Result<(), TestFailure> {
    match output {
        TestResult::Output(data) if data.contains(section) => Ok(()),
        TestResult::Error(err) => Err(TestFailure::Error(err)),
        TestResult::Output(data) => Err(TestFailure::Diff {
            expected: section.to_string(),
            got: data,
        }),
    }
}

fn match_checks(output: TestResult, checks: &[&str]) -> Result<(), TestFailure> {
    let data = match output {
        TestResult::Output(data) => data,
        TestResult::Error(err) => return Err(TestFailure::Error(err)),
    };

    let mut checks = checks.iter().peekable();

    for line in data.lines() {
        let check = match checks.peek() {
            Some(check) => **check,
            None => break,
        };

        if line == check {
            let _ = checks.next();
        }
    }

    match checks.next() {
        None => Ok(()),
        Some(check) => Err(TestFailure::Missing {
            check: check.to_string(),
            full: data,
        }),
    }
}

#[derive(Debug, Hash, Eq, PartialEq)]
pub struct FileTestCase<'data> {
    check: Check<'data>,
}

impl<'data> FileTestCase<'data> {
    pub fn from_raw(name: &str, raw: &'data str) -> Self {
        Self {
            check: find_checks(name, raw),
        }
    }

    pub fn check(&self, output: TestResult) -> Result<(), TestFailure> {
        match &self.check {
            Check::MatchEntireFile(expected) => match_entire_file(output, expected),
            Check::MatchSection(section) => match_section(output, section),
            Check::Error(error) => match_error(output, error),
            Check::IndividualChecks(checks) => match_checks(output, checks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(s: &str) -> TestResult {
        TestResult::Output(s.to_string())
    }

    #[test]
    fn checks_match_in_order() {
        let case = FileTestCase::from_raw(
            "t.lir",
            "; STANDARD\n; CHECK: a\n  ; CHECK:   b\nb0:\n",
        );

        assert_eq!(case.check(output("a\nx\n  b\n")), Ok(()));
        assert!(matches!(
            case.check(output("  b\na\n")),
            Err(TestFailure::Missing { .. })
        ));
    }

    #[test]
    fn sections_keep_indentation() {
        let case = FileTestCase::from_raw(
            "t.lir",
            "; MATCH-SECTION\n;\n; trace 0:\n;   v0:i64 [0, 2)\n;;\nb0:\n",
        );

        assert_eq!(case.check(output("x\ntrace 0:\n  v0:i64 [0, 2)\n")), Ok(()));
        assert!(case.check(output("trace 0:\nv0:i64 [0, 2)\n")).is_err());
    }

    #[test]
    fn expected_errors() {
        let case = FileTestCase::from_raw("t.lir", "; ERROR: unknown block\n");

        assert_eq!(
            case.check(TestResult::Error("3:8: unknown block `b9`".to_string())),
            Ok(())
        );
        assert_eq!(case.check(output("")), Err(TestFailure::LackOfError));
    }
}
