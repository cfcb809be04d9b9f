// SPDX-License-Identifier: Apache-2.0

//! Hybrid executor: low colors carry most of the nodes and run as chromatic
//! color classes; the long tail of high colors runs through the active-DAG
//! driver instead, avoiding one near-empty parallel round per color.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SchedulerConfig;
use crate::dag::{run_dag, DepDag, MARK_IDLE};
use crate::error::EngineError;
use crate::executor::chromatic::run_flat;
use crate::executor::{ExecReport, OperatorFn, Poison, PushCtx, SchedulingStrategy};
use crate::graph::Topology;
use crate::ident::NodeIdx;
use crate::priority::PriorityMap;
use crate::telemetry::TelemetrySink;

/// One round's worth of pending work, split at the color cutoff.
#[derive(Debug, Default)]
struct RoundWork {
    buckets: Vec<Vec<NodeIdx>>,
    heavy: Vec<NodeIdx>,
}

impl RoundWork {
    fn with_colors(cutoff: usize) -> Self {
        Self { buckets: vec![Vec::new(); cutoff], heavy: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.heavy.is_empty() && self.buckets.iter().all(Vec::is_empty)
    }

    fn clear(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
        self.heavy.clear();
    }
}

/// Mixed chromatic / active-DAG executor.
pub struct HybridExecutor<'a> {
    op: &'a OperatorFn<'a>,
    workers: usize,
    chunk: usize,
    cutoff: u32,
    sink: Arc<dyn TelemetrySink>,
    dag: DepDag,
    curr: RoundWork,
    next: RoundWork,
}

impl<'a> HybridExecutor<'a> {
    /// Builds and colors the dependency DAG; colors below the configured
    /// cutoff get a bucket each.
    pub fn new<G: Topology>(
        config: &SchedulerConfig,
        graph: &G,
        pri: PriorityMap,
        op: &'a OperatorFn<'a>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let mut dag = DepDag::build(graph, &pri, config.workers);
        dag.color_all(graph, config.workers);
        let cutoff = config.cutoff_color.min(dag.num_colors());
        Self {
            op,
            workers: config.workers,
            chunk: config.chunk_size,
            cutoff,
            sink,
            dag,
            curr: RoundWork::with_colors(cutoff as usize),
            next: RoundWork::with_colors(cutoff as usize),
        }
    }

    /// Dedupes and routes a node by its precomputed color.
    fn enqueue_next(&mut self, n: NodeIdx) {
        if self.dag.mark_try_queue(n) {
            self.route_queued(n);
        }
    }

    /// Routes an already-queued node to its bucket.
    fn route_queued(&mut self, n: NodeIdx) {
        let c = self.dag.color_of(n);
        if c < self.cutoff {
            self.next.buckets[c as usize].push(n);
        } else {
            self.next.heavy.push(n);
        }
    }

    /// Runs the heavy tail through the restricted DAG, returning
    /// `(committed, deduped pushes)`. Pushes are deduped at push time so a
    /// push to a node still pending in this round folds into it.
    fn run_heavy(&self, heavy: &[NodeIdx], poison: &Poison) -> (usize, Vec<NodeIdx>) {
        let sources = self.dag.reinit_active(heavy, self.workers, self.chunk);
        let committed = AtomicUsize::new(0);
        let bufs: Vec<Mutex<Vec<NodeIdx>>> =
            (0..self.workers).map(|_| Mutex::new(Vec::new())).collect();
        let dag = &self.dag;
        let op = self.op;
        run_dag(dag, &sources, heavy.len(), self.workers, true, &|w, n| {
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
            let mut out = bufs[w].lock().unwrap_or_else(PoisonError::into_inner);
            for p in pushes {
                if dag.mark_try_queue(p) {
                    out.push(p);
                }
            }
        });
        let mut all = Vec::new();
        for buf in bufs {
            all.extend(buf.into_inner().unwrap_or_else(PoisonError::into_inner));
        }
        (committed.into_inner(), all)
    }
}

impl SchedulingStrategy for HybridExecutor<'_> {
    fn initialize(&mut self, range: &[NodeIdx]) {
        self.dag.reset();
        self.dag.clear_marks();
        self.curr.clear();
        self.next.clear();
        for &n in range {
            self.enqueue_next(n);
        }
    }

    fn execute(&mut self) -> Result<ExecReport, EngineError> {
        let mut report = ExecReport::default();
        loop {
            std::mem::swap(&mut self.curr, &mut self.next);
            self.next.clear();
            if self.curr.is_empty() {
                break;
            }
            report.rounds += 1;
            let poison = Poison::default();
            let mut round_attempted = 0;
            let mut round_committed = 0;

            // Light colors, ascending; classes are conflict-free inside.
            for c in 0..self.cutoff as usize {
                let items = std::mem::take(&mut self.curr.buckets[c]);
                if items.is_empty() {
                    continue;
                }
                round_attempted += items.len();
                let outs =
                    run_flat(&items, &self.dag, self.op, self.workers, self.chunk, &poison);
                for (done, pushes) in outs {
                    round_committed += done;
                    for p in pushes {
                        self.enqueue_next(p);
                    }
                }
                if poison.is_set() {
                    break;
                }
            }

            // Heavy tail through the restricted DAG.
            if !poison.is_set() && !self.curr.heavy.is_empty() {
                let heavy = std::mem::take(&mut self.curr.heavy);
                round_attempted += heavy.len();
                let (done, pushes) = self.run_heavy(&heavy, &poison);
                round_committed += done;
                for p in pushes {
                    self.route_queued(p);
                }
            }

            report.attempted += round_attempted;
            report.committed += round_committed;
            self.sink.on_round(report.rounds, round_attempted, round_committed, 0);
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
