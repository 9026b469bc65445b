//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::lir::{Location, PReg, VReg};
use crate::regalloc::{FixedInterval, IntervalStore, Range, TraceInterval, VerifyError};

fn ranges_intersect(
    mut a: impl Iterator<Item = Range>,
    mut b: impl Iterator<Item = Range>,
) -> bool {
    let (mut lhs, mut rhs) = (a.next(), b.next());

    while let (Some(l), Some(r)) = (lhs, rhs) {
        if l.intersects(r) {
            return true;
        }

        if l.to <= r.from {
            lhs = a.next();
        } else {
            rhs = b.next();
        }
    }

    false
}

// intervals made by the move resolver only ever span `[1, 2)`
fn is_resolver_interval(interval: &TraceInterval) -> bool {
    interval.from() == 1 && interval.to() == 2
}

fn verify_single(vreg: VReg, interval: &TraceInterval) -> Result<Location, VerifyError> {
    if interval.operand() != vreg {
        return Err(VerifyError::WrongOperand {
            slot: vreg,
            operand: interval.operand(),
        });
    }

    let location = interval.location().ok_or(VerifyError::Unallocated(vreg))?;

    if interval.is_empty() {
        return Err(VerifyError::Empty(vreg));
    }

    if let Some(range) = interval.ranges().find(|r| r.from >= r.to) {
        return Err(VerifyError::InvalidRange { vreg, range });
    }

    Ok(location)
}

/// Checks the intervals of a trace after locations have been assigned.
///
/// Every interval must be stored under its own register, have a location and
/// at least one well-formed range. No two intervals may share a location
/// while both are live, and no interval may sit in a register while that
/// register's fixed interval blocks it.
pub fn verify_intervals(store: &IntervalStore) -> Result<(), VerifyError> {
    let intervals: Vec<_> = store.intervals().collect();
    let mut locations = Vec::with_capacity(intervals.len());

    for &(vreg, interval) in intervals.iter() {
        locations.push(verify_single(vreg, interval)?);
    }

    for (i, &(first, lhs)) in intervals.iter().enumerate() {
        if is_resolver_interval(lhs) {
            continue;
        }

        let location = locations[i];

        for (j, &(second, rhs)) in intervals.iter().enumerate().skip(i + 1) {
            if is_resolver_interval(rhs) || locations[j] != location {
                continue;
            }

            if ranges_intersect(lhs.ranges(), rhs.ranges()) {
                return Err(VerifyError::Overlap {
                    first,
                    second,
                    location,
                });
            }
        }

        if let Location::Register(reg) = location {
            let blocked = store
                .fixed_interval_for(reg)
                .map_or(false, |fixed| ranges_intersect(fixed.ranges(), lhs.ranges()));

            if blocked {
                return Err(VerifyError::FixedOverlap { vreg: first, reg });
            }
        }
    }

    log::debug!("{:?}: no errors found in intervals", store.trace_id());

    Ok(())
}

fn compare_interval(a: &TraceInterval, b: &TraceInterval) -> Result<(), VerifyError> {
    let mismatch = |what: &str| Err(VerifyError::Mismatch(format!("{}: {what}", a.operand())));

    if a.operand() != b.operand() {
        return mismatch("operands differ");
    }

    if !a.ranges().eq(b.ranges()) {
        return mismatch("ranges differ");
    }

    if a.use_pos().len() != b.use_pos().len() {
        return mismatch("use position counts differ");
    }

    for ((a_pos, a_prio), (b_pos, b_prio)) in a.use_pos().iter().zip(b.use_pos().iter()) {
        if a_pos != b_pos {
            return mismatch(&format!("use positions {a_pos} and {b_pos} differ"));
        }

        if a_prio != b_prio {
            return mismatch(&format!("priorities at {a_pos} differ"));
        }
    }

    Ok(())
}

fn compare_fixed(reg: PReg, a: Option<&FixedInterval>, b: Option<&FixedInterval>) -> Result<(), VerifyError> {
    let empty = |i: Option<&FixedInterval>| i.map_or(true, |i| i.is_empty());

    match (a, b) {
        (Some(a), Some(b)) if !a.ranges().eq(b.ranges()) => {
            Err(VerifyError::Mismatch(format!("{reg}: fixed ranges differ")))
        }
        (Some(_), Some(_)) => Ok(()),
        _ if empty(a) && empty(b) => Ok(()),
        _ => Err(VerifyError::Mismatch(format!("{reg}: fixed interval missing"))),
    }
}

impl IntervalStore {
    /// Checks that two stores built for the same trace agree on every
    /// interval: the same ranges and the same use positions with the same
    /// priorities. Fixed intervals that are empty count as missing.
    pub fn verify_equals(&self, other: &IntervalStore) -> Result<(), VerifyError> {
        for (reg, fixed) in self.fixed_intervals() {
            compare_fixed(reg, Some(fixed), other.fixed_interval_for(reg))?;
        }

        for (reg, fixed) in other.fixed_intervals() {
            compare_fixed(reg, self.fixed_interval_for(reg), Some(fixed))?;
        }

        for (vreg, interval) in self.intervals() {
            match other.interval_for(vreg) {
                Some(theirs) => compare_interval(interval, theirs)?,
                None => return Err(VerifyError::Mismatch(format!("{vreg}: missing interval"))),
            }
        }

        match other.intervals().find(|(vreg, _)| self.interval_for(*vreg).is_none()) {
            Some((vreg, _)) => Err(VerifyError::Mismatch(format!("{vreg}: unexpected interval"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::lir::{Block, StackSlot, TraceId, ValueKind};
    use crate::regalloc::{RegisterConfig, RegisterPriority};

    fn store() -> IntervalStore {
        IntervalStore::new(
            TraceId::new(0),
            vec![Block::new(0)],
            RegisterConfig::generic(2, 2, 1),
            4,
        )
    }

    fn v(n: u32) -> VReg {
        VReg::new(n)
    }

    fn r(n: usize) -> Location {
        Location::Register(PReg::int(n))
    }

    fn add(s: &mut IntervalStore, vreg: VReg, from: i32, to: i32, location: Option<Location>) {
        s.get_or_create_interval(vreg, ValueKind::I64).add_range(from, to);

        if let Some(location) = location {
            s.set_location(vreg, location);
        }
    }

    #[test]
    fn well_formed_intervals_pass() {
        let mut s = store();

        add(&mut s, v(0), 0, 6, Some(r(0)));
        add(&mut s, v(1), 6, 10, Some(r(0)));
        add(&mut s, v(2), 2, 10, Some(r(1)));
        add(&mut s, v(3), 0, 10, Some(Location::Stack(StackSlot::local(8))));
        s.get_or_create_fixed_interval(PReg::int(1)).add_range(12, 13);

        assert_eq!(verify_intervals(&s), Ok(()));
    }

    #[test]
    fn unallocated_and_empty_intervals() {
        let mut s = store();

        add(&mut s, v(0), 0, 6, None);
        assert_eq!(verify_intervals(&s), Err(VerifyError::Unallocated(v(0))));

        let mut s = store();

        s.get_or_create_interval(v(1), ValueKind::I64);
        s.set_location(v(1), r(0));
        assert_eq!(verify_intervals(&s), Err(VerifyError::Empty(v(1))));
    }

    #[test]
    fn overlapping_locations() {
        let mut s = store();

        add(&mut s, v(0), 0, 6, Some(r(0)));
        add(&mut s, v(1), 4, 8, Some(r(0)));

        assert_eq!(
            verify_intervals(&s),
            Err(VerifyError::Overlap {
                first: v(0),
                second: v(1),
                location: r(0),
            })
        );
    }

    #[test]
    fn holes_do_not_overlap() {
        let mut s = store();

        add(&mut s, v(0), 8, 12, Some(r(0)));
        add(&mut s, v(0), 0, 4, None);
        add(&mut s, v(1), 4, 8, Some(r(0)));

        assert_eq!(verify_intervals(&s), Ok(()));
    }

    #[test]
    fn fixed_intervals_block_registers() {
        let mut s = store();

        add(&mut s, v(0), 0, 6, Some(r(1)));
        s.get_or_create_fixed_interval(PReg::int(1)).add_range(4, 5);

        assert_eq!(
            verify_intervals(&s),
            Err(VerifyError::FixedOverlap {
                vreg: v(0),
                reg: PReg::int(1),
            })
        );
    }

    #[test]
    fn resolver_intervals_are_skipped() {
        let mut s = store();

        add(&mut s, v(0), 0, 6, Some(r(0)));
        add(&mut s, v(1), 1, 2, Some(r(0)));

        assert_eq!(verify_intervals(&s), Ok(()));
    }

    #[test]
    fn equal_stores() {
        let build = |priority| {
            let mut s = store();

            add(&mut s, v(0), 0, 6, None);
            s.interval_for_mut(v(0))
                .unwrap()
                .add_use_pos(4, priority);
            s.get_or_create_fixed_interval(PReg::int(0)).add_range(2, 3);
            s.get_or_create_fixed_interval(PReg::int(1));
            s
        };

        let a = build(RegisterPriority::MustHaveRegister);
        let mut b = build(RegisterPriority::MustHaveRegister);

        assert_eq!(a.verify_equals(&b), Ok(()));
        assert_eq!(b.verify_equals(&a), Ok(()));

        assert!(a
            .verify_equals(&build(RegisterPriority::ShouldHaveRegister))
            .is_err());

        add(&mut b, v(2), 0, 2, None);
        assert!(a.verify_equals(&b).is_err());
        assert!(b.verify_equals(&a).is_err());
    }
}
