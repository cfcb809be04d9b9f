// SPDX-License-Identifier: Apache-2.0

//! Executor lifecycle contract and the strategy factory.

use std::sync::Arc;

use crate::config::{SchedulerConfig, Strategy};
use crate::error::{EngineError, OperatorError};
use crate::graph::Topology;
use crate::ident::NodeIdx;
use crate::priority::PriorityMap;
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

pub mod chromatic;
pub mod hybrid;
pub mod topological;
pub mod windowed;

pub use chromatic::ChromaticExecutor;
pub use hybrid::HybridExecutor;
pub use topological::{EdgeFlipExecutor, TopologicalExecutor};
pub use windowed::WindowedExecutor;

/// Counts reported by one `execute()` run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecReport {
    /// Scheduling rounds (or DAG passes) performed.
    pub rounds: usize,
    /// Operator applications attempted, aborted retries included.
    pub attempted: usize,
    /// Operator applications that committed.
    pub committed: usize,
}

/// Push surface handed to the operator. Writes land in a worker-owned buffer
/// and are routed into the schedule after the surrounding parallel phase.
pub struct PushCtx<'a> {
    buf: &'a mut Vec<NodeIdx>,
}

impl<'a> PushCtx<'a> {
    pub(crate) fn new(buf: &'a mut Vec<NodeIdx>) -> Self {
        Self { buf }
    }

    /// Schedules `elem` for execution.
    pub fn push(&mut self, elem: NodeIdx) {
        self.buf.push(elem);
    }
}

/// The user operator. Runs exactly once per committed element; an error is
/// fatal for the run.
pub type OperatorFn<'a> =
    dyn Fn(NodeIdx, &mut PushCtx<'_>) -> Result<(), OperatorError> + Sync + 'a;

/// Neighborhood visitor: calls the touch function once per resource the
/// operator on the given element may read or write. Must be idempotent
/// across re-invocations of the same element.
pub type NeighborhoodFn<'a> = dyn Fn(NodeIdx, &mut dyn FnMut(NodeIdx)) + Sync + 'a;

/// The default neighborhood: the element itself plus its graph neighbors.
pub fn self_and_neighbors<G: Topology>(
    graph: &G,
) -> impl Fn(NodeIdx, &mut dyn FnMut(NodeIdx)) + Sync + '_ {
    move |n, touch| {
        touch(n);
        graph.for_each_neighbor(n, touch);
    }
}

/// First-error capture shared by the parallel apply phases. The flag is the
/// cheap cross-thread signal; the slot keeps the first error observed.
#[derive(Debug, Default)]
pub(crate) struct Poison {
    flag: std::sync::atomic::AtomicBool,
    slot: std::sync::Mutex<Option<EngineError>>,
}

impl Poison {
    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::Acquire)
    }

    pub(crate) fn set(&self, elem: NodeIdx, source: OperatorError) {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(EngineError::Operator { elem, source });
        }
        self.flag.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Takes the captured error, if any.
    pub(crate) fn take(&self) -> Option<EngineError> {
        if !self.is_set() {
            return None;
        }
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take()
    }
}

/// Common lifecycle of every executor.
///
/// Drive as: `initialize` with the initial active elements, `execute`, then
/// optionally `reset_dag` / `reinitialize_active` for further runs over the
/// same structure. After `execute` returns an error the executor must be
/// re-initialized before reuse.
pub trait SchedulingStrategy {
    /// Installs the initial active elements.
    fn initialize(&mut self, range: &[NodeIdx]);

    /// Runs to quiescence.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Operator`] on the first operator failure;
    /// commits from earlier rounds stand.
    fn execute(&mut self) -> Result<ExecReport, EngineError>;

    /// Restores the static dependency structure. No-op for executors
    /// without a DAG.
    fn reset_dag(&mut self);

    /// Restricts the next `execute()` to the given subset.
    fn reinitialize_active(&mut self, range: &[NodeIdx]);
}

/// Builds the executor selected by `config.strategy`, reporting to `sink`.
///
/// # Errors
///
/// Returns [`EngineError::Config`] when the configuration is rejected.
pub fn build_executor_with<'a, G: Topology>(
    config: &SchedulerConfig,
    graph: &'a G,
    nhood: &'a NeighborhoodFn<'a>,
    operator: &'a OperatorFn<'a>,
    sink: Arc<dyn TelemetrySink>,
) -> Result<Box<dyn SchedulingStrategy + 'a>, EngineError> {
    let config = config.clone().validated()?;
    let pri = PriorityMap::assign(graph, config.priority, config.seed);
    Ok(match config.strategy {
        Strategy::WindowedOptimistic => {
            Box::new(WindowedExecutor::new(&config, graph.len(), pri, nhood, operator, sink))
        }
        Strategy::Chromatic => {
            Box::new(ChromaticExecutor::new(&config, graph, pri, operator, sink))
        }
        Strategy::EdgeFlip => {
            Box::new(EdgeFlipExecutor::new(&config, graph, pri, operator, sink))
        }
        Strategy::Topological => {
            Box::new(TopologicalExecutor::new(&config, graph, pri, operator, sink))
        }
        Strategy::Hybrid => Box::new(HybridExecutor::new(&config, graph, pri, operator, sink)),
    })
}

/// [`build_executor_with`] wired to the null telemetry sink.
///
/// # Errors
///
/// Returns [`EngineError::Config`] when the configuration is rejected.
pub fn build_executor<'a, G: Topology>(
    config: &SchedulerConfig,
    graph: &'a G,
    nhood: &'a NeighborhoodFn<'a>,
    operator: &'a OperatorFn<'a>,
) -> Result<Box<dyn SchedulingStrategy + 'a>, EngineError> {
    build_executor_with(config, graph, nhood, operator, Arc::new(NullTelemetrySink))
}
