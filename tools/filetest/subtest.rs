//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::discovery;
use crate::testcase::TestFailure;
use backtrace::Backtrace;
use std::cell::RefCell;
use std::panic;
use std::sync::mpsc::Receiver;
use std::sync::{mpsc, Once};
use std::time::{Duration, Instant};
use threadpool::ThreadPool;

thread_local! {
    static PANIC: RefCell<Option<(String, Backtrace)>> = RefCell::new(None);
}

static INSTALL_HOOK: Once = Once::new();

// runners run on pool threads, so whatever a panic says is stashed for the
// thread that catches it instead of being printed over the test output
fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        panic::set_hook(Box::new(|info| {
            let message = match info.payload().downcast_ref::<&str>() {
                Some(s) => s.to_string(),
                None => match info.payload().downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "<unknown panic payload>".to_string(),
                },
            };

            let location = info
                .location()
                .map(|l| format!(" at {}:{}", l.file(), l.line()))
                .unwrap_or_default();

            PANIC.with(|p| *p.borrow_mut() = Some((format!("{message}{location}"), Backtrace::new())));
        }));
    });
}

pub enum TestResult {
    Output(String),
    Error(String),
}

pub struct TestDetails {
    pub elapsed: Duration,
    pub output: Result<(), TestFailure>,
}

pub struct Subtest {
    name: &'static str,
    subdir: &'static str,
    runner: fn(&str, &str) -> TestResult,
}

impl Subtest {
    pub const fn new(
        name: &'static str,
        subdir: &'static str,
        runner: fn(&str, &str) -> TestResult,
    ) -> Self {
        Self {
            name,
            subdir,
            runner,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subdir(&self) -> &'static str {
        self.subdir
    }

    pub fn run(&self, pool: &mut ThreadPool) -> Receiver<(&'static str, TestDetails)> {
        let (send, recv) = mpsc::channel();

        install_panic_hook();

        for file in discovery::cases_in_subdir(self.subdir) {
            let send = send.clone();
            let runner = self.runner;

            pool.execute(move || {
                let start = Instant::now();
                let result = panic::catch_unwind(|| runner(&file.name, file.contents));
                let elapsed = start.elapsed();
                let output = match result {
                    Ok(output) => file.case.check(output),
                    Err(_) => {
                        let (message, bt) = PANIC
                            .with(|p| p.borrow_mut().take())
                            .unwrap_or_else(|| ("<no panic message>".to_string(), Backtrace::new()));

                        Err(TestFailure::Panic(message, format!("{bt:?}")))
                    }
                };

                // we want to display the time taken on a per-test basis
                let details = TestDetails { elapsed, output };

                send.send((file.name.as_str(), details))
                    .expect("unable to send")
            });
        }

        recv
    }
}
