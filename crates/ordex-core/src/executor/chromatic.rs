// SPDX-License-Identifier: Apache-2.0

//! Chromatic executor: color the dependency DAG once, then run whole color
//! classes in parallel with no ownership traffic. Nodes of one color are
//! pairwise non-adjacent, so intra-class conflicts cannot exist.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::dag::{DepDag, MARK_IDLE};
use crate::error::EngineError;
use crate::executor::{ExecReport, OperatorFn, Poison, PushCtx, SchedulingStrategy};
use crate::graph::Topology;
use crate::ident::NodeIdx;
use crate::par;
use crate::priority::PriorityMap;
use crate::telemetry::TelemetrySink;

/// Runs `items` with the operator, chunk-claimed across workers. Returns
/// `(committed, raw pushes)` per worker. Each node's queue mark is cleared
/// before the operator runs so self-pushes requeue.
pub(crate) fn run_flat(
    items: &[NodeIdx],
    dag: &DepDag,
    op: &OperatorFn<'_>,
    workers: usize,
    chunk: usize,
    poison: &Poison,
) -> Vec<(usize, Vec<NodeIdx>)> {
    let cursor = AtomicUsize::new(0);
    par::map_workers(workers, |_w| {
        let mut committed = 0usize;
        let mut pushes = Vec::new();
        loop {
            let start = cursor.fetch_add(chunk, Ordering::Relaxed);
            if start >= items.len() {
                break;
            }
            for &n in &items[start..(start + chunk).min(items.len())] {
                dag.mark_set(n, MARK_IDLE);
                if poison.is_set() {
                    continue;
                }
                let mut ctx = PushCtx::new(&mut pushes);
                match op(n, &mut ctx) {
                    Ok(()) => committed += 1,
                    Err(source) => poison.set(n, source),
                }
            }
        }
        (committed, pushes)
    })
}

/// Deterministic executor scheduling by graph coloring.
pub struct ChromaticExecutor<'a> {
    op: &'a OperatorFn<'a>,
    workers: usize,
    chunk: usize,
    sink: Arc<dyn TelemetrySink>,
    dag: DepDag,
    buckets: Vec<Vec<NodeIdx>>,
    cursor: usize,
}

impl<'a> ChromaticExecutor<'a> {
    /// Builds and colors the dependency DAG up front.
    pub fn new<G: Topology>(
        config: &SchedulerConfig,
        graph: &G,
        pri: PriorityMap,
        op: &'a OperatorFn<'a>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let mut dag = DepDag::build(graph, &pri, config.workers);
        dag.color_all(graph, config.workers);
        let colors = dag.num_colors().max(1) as usize;
        Self {
            op,
            workers: config.workers,
            chunk: config.chunk_size,
            sink,
            dag,
            buckets: vec![Vec::new(); colors],
            cursor: 0,
        }
    }

    fn enqueue(&mut self, n: NodeIdx) {
        if self.dag.mark_try_queue(n) {
            self.buckets[self.dag.color_of(n) as usize].push(n);
        }
    }

    /// Next non-empty bucket, scanning round-robin from the last served
    /// color. A fairness policy only; any pick order is correct.
    fn next_bucket(&self) -> Option<usize> {
        let k = self.buckets.len();
        (0..k).map(|i| (self.cursor + i) % k).find(|&c| !self.buckets[c].is_empty())
    }
}

impl SchedulingStrategy for ChromaticExecutor<'_> {
    fn initialize(&mut self, range: &[NodeIdx]) {
        self.dag.clear_marks();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.cursor = 0;
        for &n in range {
            self.enqueue(n);
        }
    }

    fn execute(&mut self) -> Result<ExecReport, EngineError> {
        let mut report = ExecReport::default();
        loop {
            let Some(c) = self.next_bucket() else { break };
            let items = std::mem::take(&mut self.buckets[c]);
            self.cursor = c + 1;
            report.rounds += 1;
            report.attempted += items.len();

            let poison = Poison::default();
            let outs = run_flat(&items, &self.dag, self.op, self.workers, self.chunk, &poison);

            let mut committed = 0;
            for (done, pushes) in outs {
                committed += done;
                for p in pushes {
                    self.enqueue(p);
                }
            }
            report.committed += committed;
            self.sink.on_round(report.rounds, items.len(), committed, items.len());
            if let Some(err) = poison.take() {
                return Err(err);
            }
        }
        self.sink.on_summary(report.rounds, report.attempted, report.committed);
        Ok(report)
    }

    // Coloring and in-degrees are static here; nothing to restore.
    fn reset_dag(&mut self) {}

    fn reinitialize_active(&mut self, range: &[NodeIdx]) {
        self.initialize(range);
    }
}
