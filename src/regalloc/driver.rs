//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Runs every trace of a function through analysis, location assignment
//! and data-flow resolution.
//!
//! Traces are independent once the LIR is fixed, so with the `parallel`
//! feature each one becomes a job on a thread pool. The LIR and the
//! configuration are shared read-only, every job owns the store it builds.

use crate::lir::{
    every_trace, Lir, LirInst, Location, Trace, TraceBuilderResult, TraceFilter, TraceId, VReg,
};
use crate::regalloc::{
    resolve_data_flow, verify_intervals, AllocError, AllocatorOptions, CallingConvention,
    IntervalStore, LifetimeAnalysis, RegisterConfig, ResolvedMoves, SsiIntervalBuilder,
    StackArgumentConvention,
};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use std::sync::{atomic::AtomicBool, atomic::Ordering, mpsc};

#[cfg(feature = "parallel")]
use threadpool::ThreadPool;

/// The stage that runs between analysis and resolution: it gives every
/// interval a location, splitting intervals where one location is not enough.
pub trait IntervalAllocator: Send + Sync {
    /// Assigns locations to the intervals of one trace.
    fn allocate(&self, store: &mut IntervalStore) -> Result<(), AllocError>;
}

/// A single decision of a [`ScriptedAllocator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// The register whose interval is being assigned
    pub vreg: VReg,
    /// If set, the interval is split here first and only the new child gets
    /// the location
    pub split_at: Option<i32>,
    /// The location
    pub location: Location,
}

/// An allocator that replays a fixed list of decisions, in order.
///
/// Decisions for registers that have no interval in the trace being
/// allocated are skipped, so one list can cover every trace of a function.
#[derive(Clone, Debug, Default)]
pub struct ScriptedAllocator {
    assignments: Vec<Assignment>,
}

impl ScriptedAllocator {
    /// Creates an allocator that replays `assignments`.
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self { assignments }
    }

    /// The decisions being replayed.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }
}

impl IntervalAllocator for ScriptedAllocator {
    fn allocate(&self, store: &mut IntervalStore) -> Result<(), AllocError> {
        for assignment in self.assignments.iter() {
            if store.interval_for(assignment.vreg).is_none() {
                continue;
            }

            let target = match assignment.split_at {
                Some(pos) => store.split_interval_at(assignment.vreg, pos)?,
                None => assignment.vreg,
            };

            store.set_location(target, assignment.location);
        }

        Ok(())
    }
}

/// Everything about an allocation that is not the code itself.
pub struct AllocationContext {
    /// The register file
    pub registers: RegisterConfig,
    /// Allocator options
    pub options: AllocatorOptions,
    /// Target knowledge about method arguments
    pub convention: Box<dyn CallingConvention>,
    /// The location assignment stage
    pub allocator: Box<dyn IntervalAllocator>,
    /// Which traces get allocated by this allocator
    pub filter: Box<TraceFilter>,
    /// Build intervals while walking the trace in SSI order, instead of with
    /// the standalone lifetime analysis. Both give the same intervals.
    pub use_ssi_builder: bool,
}

impl AllocationContext {
    /// A context that processes every trace and assigns no locations.
    pub fn new(registers: RegisterConfig, options: AllocatorOptions) -> Self {
        Self {
            registers,
            options,
            convention: Box::new(StackArgumentConvention),
            allocator: Box::<ScriptedAllocator>::default(),
            filter: Box::new(every_trace),
            use_ssi_builder: false,
        }
    }

    /// Replaces the location assignment stage.
    pub fn with_allocator(mut self, allocator: impl IntervalAllocator + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    /// Replaces the trace filter.
    pub fn with_filter(mut self, filter: impl Fn(&Trace) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Replaces the calling convention.
    pub fn with_convention(mut self, convention: impl CallingConvention + 'static) -> Self {
        self.convention = Box::new(convention);
        self
    }
}

/// The result of allocating one trace.
#[derive(Clone, Debug)]
pub struct TraceAllocation {
    /// The trace
    pub trace: TraceId,
    /// Its intervals, with locations assigned
    pub store: IntervalStore,
    /// The moves that have to be inserted on its edges
    pub moves: ResolvedMoves,
}

/// Builds the intervals of `trace` with the builder `context` asks for,
/// without assigning any locations. Returns `None` if the context's filter
/// rejects the trace.
pub fn build_intervals<I: LirInst>(
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    trace: &Trace,
    context: &AllocationContext,
) -> Result<Option<IntervalStore>, AllocError> {
    if context.use_ssi_builder {
        return SsiIntervalBuilder::new(
            lir,
            traces,
            trace,
            &context.registers,
            &context.options,
            &*context.convention,
            &*context.filter,
        )
        .build();
    }

    if !(context.filter)(trace) {
        return Ok(None);
    }

    let analysis = LifetimeAnalysis::new(
        lir,
        traces,
        &context.registers,
        &context.options,
        &*context.convention,
    );

    analysis.analyze(trace).map(Some)
}

/// Analyzes, allocates and resolves a single trace. Returns `None` if the
/// context's filter rejects the trace.
pub fn allocate_trace<I: LirInst>(
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    trace: &Trace,
    context: &AllocationContext,
) -> Result<Option<TraceAllocation>, AllocError> {
    let Some(mut store) = build_intervals(lir, traces, trace, context)? else {
        log::debug!("{:?} is not processed by this allocator", trace.id());

        return Ok(None);
    };

    context.allocator.allocate(&mut store)?;

    if context.options.detailed_asserts {
        verify_intervals(&store).map_err(|source| AllocError::Verification {
            trace: trace.id(),
            source,
        })?;
    }

    let moves = resolve_data_flow(lir, &store)?;

    log::debug!("{:?}: {} moves resolved", trace.id(), moves.move_count());

    Ok(Some(TraceAllocation {
        trace: trace.id(),
        store,
        moves,
    }))
}

fn allocate_sequential<I: LirInst>(
    lir: &Lir<I>,
    traces: &TraceBuilderResult,
    context: &AllocationContext,
) -> Result<Vec<TraceAllocation>, AllocError> {
    let mut results = Vec::with_capacity(traces.traces().len());

    for trace in traces.traces() {
        if let Some(result) = allocate_trace(lir, traces, trace, context)? {
            results.push(result);
        }
    }

    Ok(results)
}

#[cfg(feature = "parallel")]
fn allocate_parallel<I: LirInst + Send + Sync + 'static>(
    lir: Arc<Lir<I>>,
    traces: Arc<TraceBuilderResult>,
    context: Arc<AllocationContext>,
    pool: ThreadPool,
) -> Result<Vec<TraceAllocation>, AllocError> {
    let (tx, rx) = mpsc::channel();
    let failed = Arc::new(AtomicBool::new(false));

    for trace in traces.traces() {
        let id = trace.id();
        let tx = tx.clone();
        let lir = Arc::clone(&lir);
        let traces = Arc::clone(&traces);
        let context = Arc::clone(&context);
        let failed = Arc::clone(&failed);

        pool.execute(move || {
            if failed.load(Ordering::Acquire) {
                return;
            }

            let result = allocate_trace(&lir, &traces, traces.trace(id), &context);

            if result.is_err() {
                failed.store(true, Ordering::Release);
            }

            // the receiver only goes away once every job is done
            let _ = tx.send((id, result));
        });
    }

    drop(tx);

    let mut finished: Vec<_> = rx.iter().collect();

    finished.sort_by_key(|(id, _)| *id);

    let mut results = Vec::with_capacity(finished.len());

    for (_, result) in finished {
        if let Some(allocation) = result? {
            results.push(allocation);
        }
    }

    Ok(results)
}

/// Allocates every trace of `lir`, returning the results ordered by trace id.
///
/// `jobs` is the number of threads to use, `None` picks one per CPU. Once a
/// trace fails no further traces are started, and the error of the earliest
/// failed trace is returned.
pub fn allocate_traces<I: LirInst + Send + Sync + 'static>(
    lir: Arc<Lir<I>>,
    traces: Arc<TraceBuilderResult>,
    context: Arc<AllocationContext>,
    jobs: Option<usize>,
) -> Result<Vec<TraceAllocation>, AllocError> {
    log::debug!("allocating {} traces", traces.traces().len());

    #[cfg(feature = "parallel")]
    {
        let pool = match jobs {
            Some(1) => None,
            Some(n) => Some(ThreadPool::new(n)),
            None => Some(ThreadPool::default()),
        };

        if let Some(pool) = pool {
            return allocate_parallel(lir, traces, context, pool);
        }
    }

    #[cfg(not(feature = "parallel"))]
    let _ = jobs;

    allocate_sequential(&lir, &traces, &context)
}
