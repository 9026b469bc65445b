//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

#![deny(
    unreachable_pub,
    missing_docs,
    missing_abi,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]

//! # Trace LSRA
//!
//! Lifetime analysis and data-flow resolution for a trace-based linear scan
//! register allocator.
//!
//! Code is given as [`lir::Lir`], a control flow graph of low-level
//! instructions over virtual and physical registers, in SSI form. The graph
//! is partitioned into traces, and every trace is allocated on its own:
//!
//! 1. [`regalloc::LifetimeAnalysis`] builds an [`regalloc::IntervalStore`]
//!    for the trace, one interval per virtual register and one fixed interval
//!    per physical register.
//! 2. An [`regalloc::IntervalAllocator`] assigns locations to the intervals,
//!    splitting them where needed.
//! 3. [`regalloc::resolve_data_flow`] computes the moves needed on every
//!    edge that leaves a block of the trace.
//!
//! [`regalloc::allocate_traces`] runs all three for every trace, optionally
//! on a thread pool.

pub mod arena;
pub mod lir;
pub mod regalloc;
pub mod utility;

#[cfg(feature = "dev-tools")]
pub mod cli;
