//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Block-boundary queries over code in SSI form.
//!
//! Every block's label defines the values flowing into it, and every
//! terminator lists the values flowing out of it. The `i`th outgoing value of
//! a predecessor flows into the `i`th incoming value of the successor. A
//! branch passes the same outgoing list to every one of its successors.

use crate::lir::{Block, Lir, LirInst, Value};

/// The values defined by `block`'s label.
pub fn incoming<I: LirInst>(lir: &Lir<I>, block: Block) -> &[Value] {
    lir.label(block).incoming_values()
}

/// The values passed out of `block` by its terminator.
pub fn outgoing<I: LirInst>(lir: &Lir<I>, block: Block) -> &[Value] {
    lir.terminator(block).outgoing_values()
}

/// Calls `visitor(incoming, outgoing)` for every value that crosses the edge
/// `from -> to`.
///
/// Panics if the two sides of the edge do not agree on the number of values.
pub fn for_each_value_pair<I: LirInst>(
    lir: &Lir<I>,
    to: Block,
    from: Block,
    mut visitor: impl FnMut(&Value, &Value),
) {
    let ins = incoming(lir, to);
    let outs = outgoing(lir, from);

    assert_eq!(
        ins.len(),
        outs.len(),
        "SSI mismatch on edge {from:?} -> {to:?}: {} incoming, {} outgoing",
        ins.len(),
        outs.len()
    );

    for (incoming, outgoing) in ins.iter().zip(outs.iter()) {
        visitor(incoming, outgoing);
    }
}
