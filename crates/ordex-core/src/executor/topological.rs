// SPDX-License-Identifier: Apache-2.0

//! Topology-driven DAG executors.
//!
//! [`TopologicalExecutor`] sweeps the entire DAG source-first every pass and
//! fires the operator only on nodes holding an active mark; it is cheapest
//! when most of the graph is active. [`EdgeFlipExecutor`] instead restricts
//! each round's DAG to the currently active subset, paying a per-round
//! in-degree recomputation to skip inactive nodes entirely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SchedulerConfig;
use crate::dag::{run_dag, DepDag, MARK_IDLE, MARK_QUEUED};
use crate::error::EngineError;
use crate::executor::{ExecReport, OperatorFn, Poison, PushCtx, SchedulingStrategy};
use crate::graph::Topology;
use crate::ident::NodeIdx;
use crate::priority::PriorityMap;
use crate::telemetry::TelemetrySink;

/// Full-DAG fixpoint executor.
pub struct TopologicalExecutor<'a> {
    op: &'a OperatorFn<'a>,
    workers: usize,
    chunk: usize,
    sink: Arc<dyn TelemetrySink>,
    dag: DepDag,
}

impl<'a> TopologicalExecutor<'a> {
    /// Builds the dependency DAG up front.
    pub fn new<G: Topology>(
        config: &SchedulerConfig,
        graph: &G,
        pri: PriorityMap,
        op: &'a OperatorFn<'a>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let dag = DepDag::build(graph, &pri, config.workers);
        Self { op, workers: config.workers, chunk: config.chunk_size, sink, dag }
    }
}

impl SchedulingStrategy for TopologicalExecutor<'_> {
    fn initialize(&mut self, range: &[NodeIdx]) {
        self.dag.reset();
        self.dag.clear_marks();
        for &n in range {
            self.dag.mark_try_queue(n);
        }
    }

    fn execute(&mut self) -> Result<ExecReport, EngineError> {
        let mut report = ExecReport::default();
        loop {
            report.rounds += 1;
            let poison = Poison::default();
            let fired = AtomicUsize::new(0);
            let requeued = AtomicUsize::new(0);
            let dag = &self.dag;
            let op = self.op;
            let sources = dag.collect_sources();
            run_dag(dag, &sources, dag.len(), self.workers, false, &|_w, n| {
                if dag.mark_take(n) != MARK_QUEUED || poison.is_set() {
                    return;
                }
                let mut pushes = Vec::new();
                let mut ctx = PushCtx::new(&mut pushes);
                match op(n, &mut ctx) {
                    Ok(()) => {
                        fired.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(source) => poison.set(n, source),
                }
                // Pushes to nodes still queued this pass fold into it; only
                // pushes to already-visited nodes force another pass.
                for p in pushes {
                    if dag.mark_try_queue(p) {
                        requeued.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });

            let fired = fired.into_inner();
            report.attempted += fired;
            report.committed += fired;
            self.sink.on_round(report.rounds, fired, fired, self.dag.len());
            if let Some(err) = poison.take() {
                return Err(err);
            }
            self.dag.reset();
            if requeued.into_inner() == 0 {
                break;
            }
        }
        self.sink.on_summary(report.rounds, report.attempted, report.committed);
        Ok(report)
    }

    fn reset_dag(&mut self) {
        self.dag.reset();
    }

    fn reinitialize_active(&mut self, range: &[NodeIdx]) {
        self.initialize(range);
    }
}

/// Active-subset DAG executor.
pub struct EdgeFlipExecutor<'a> {
    op: &'a OperatorFn<'a>,
    workers: usize,
    chunk: usize,
    sink: Arc<dyn TelemetrySink>,
    dag: DepDag,
    next_active: Vec<NodeIdx>,
}

impl<'a> EdgeFlipExecutor<'a> {
    /// Builds the dependency DAG up front.
    pub fn new<G: Topology>(
        config: &SchedulerConfig,
        graph: &G,
        pri: PriorityMap,
        op: &'a OperatorFn<'a>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let dag = DepDag::build(graph, &pri, config.workers);
        Self {
            op,
            workers: config.workers,
            chunk: config.chunk_size,
            sink,
            dag,
            next_active: Vec::new(),
        }
    }
}

impl SchedulingStrategy for EdgeFlipExecutor<'_> {
    fn initialize(&mut self, range: &[NodeIdx]) {
        self.dag.reset();
        self.dag.clear_marks();
        self.next_active.clear();
        for &n in range {
            if self.dag.mark_try_queue(n) {
                self.next_active.push(n);
            }
        }
    }

    fn execute(&mut self) -> Result<ExecReport, EngineError> {
        let mut report = ExecReport::default();
        loop {
            if self.next_active.is_empty() {
                break;
            }
            let curr = std::mem::take(&mut self.next_active);
            report.rounds += 1;
            report.attempted += curr.len();

            let sources = self.dag.reinit_active(&curr, self.workers, self.chunk);
            let poison = Poison::default();
            let committed = AtomicUsize::new(0);
            let bufs: Vec<Mutex<Vec<NodeIdx>>> =
                (0..self.workers).map(|_| Mutex::new(Vec::new())).collect();
            let dag = &self.dag;
            let op = self.op;
            run_dag(dag, &sources, curr.len(), self.workers, true, &|w, n| {
                dag.mark_set(n, MARK_IDLE);
                if poison.is_set() {
                    return;
                }
                let mut pushes = Vec::new();
                let mut ctx = PushCtx::new(&mut pushes);
                match op(n, &mut ctx) {
                    Ok(()) => {
                        committed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(source) => poison.set(n, source),
                }
                // Pushes to nodes still active this round are folded into
                // it; everything else is deduped into the next round.
                let mut out = bufs[w].lock().unwrap_or_else(PoisonError::into_inner);
                for p in pushes {
                    if dag.mark_try_queue(p) {
                        out.push(p);
                    }
                }
            });

            let committed = committed.into_inner();
            report.committed += committed;
            for buf in bufs {
                self.next_active
                    .extend(buf.into_inner().unwrap_or_else(PoisonError::into_inner));
            }
            self.sink.on_round(report.rounds, curr.len(), committed, curr.len());
            if let Some(err) = poison.take() {
                return Err(err);
            }
        }
        self.sink.on_summary(report.rounds, report.attempted, report.committed);
        Ok(report)
    }

    fn reset_dag(&mut self) {
        self.dag.reset();
    }

    fn reinitialize_active(&mut self, range: &[NodeIdx]) {
        self.initialize(range);
    }
}
