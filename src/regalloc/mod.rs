//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The trace linear-scan register allocator's analysis and resolution.
//!
//! For every trace this builds the live intervals of its values
//! ([`LifetimeAnalysis`] or [`SsiIntervalBuilder`]), hands them to whatever
//! assigns locations ([`IntervalAllocator`]), and then computes the moves
//! needed where the locations on both sides of a control-flow edge
//! disagree ([`DataFlowResolver`]).

mod builder;
mod config;
mod driver;
mod dump;
mod error;
mod interval;
mod lifetime;
mod moves;
mod resolve;
mod ssi_builder;
mod store;
mod use_pos;
mod verify;

pub use builder::*;
pub use config::*;
pub use driver::*;
pub use dump::*;
pub use error::*;
pub use interval::*;
pub use lifetime::*;
pub use moves::*;
pub use resolve::*;
pub use ssi_builder::*;
pub use store::*;
pub use use_pos::*;
pub use verify::*;
