// SPDX-License-Identifier: Apache-2.0

//! Speculative windowed executor.
//!
//! Each round admits a window-limited slice of pending work, expands every
//! attempt's neighborhood under ownership arbitration, runs the operator on
//! the surviving sources, and requeues the rest. The window grows or shrinks
//! with the observed commit ratio, trading parallelism against wasted
//! speculation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::context::AttemptArena;
use crate::error::EngineError;
use crate::executor::{ExecReport, NeighborhoodFn, OperatorFn, Poison, PushCtx, SchedulingStrategy};
use crate::ident::NodeIdx;
use crate::ownership::{Acquire, OwnerTable};
use crate::par;
use crate::priority::PriorityMap;
use crate::telemetry::TelemetrySink;
use crate::window::Window;

// First-round window scale-down for non-pushing operators, and the cap in
// units of workers*chunk. Both inherited tuning constants.
const NO_PUSH_DIVISOR: usize = 500;
const FIRST_ROUND_CAP_FACTOR: usize = 4;

/// Output of one apply-phase worker, merged single-threaded at round end.
#[derive(Default)]
struct WorkerOut {
    committed: usize,
    retries: Vec<NodeIdx>,
    pushes: Vec<NodeIdx>,
}

/// Priority-ordered speculative executor with adaptive windowing.
pub struct WindowedExecutor<'a> {
    nhood: &'a NeighborhoodFn<'a>,
    op: &'a OperatorFn<'a>,
    pri: PriorityMap,
    resources: usize,
    workers: usize,
    chunk: usize,
    target_ratio: f64,
    windowing: bool,
    may_push: bool,
    sink: Arc<dyn TelemetrySink>,
    window: Window,
    curr: Vec<NodeIdx>,
    next: Vec<NodeIdx>,
    window_size: usize,
    prev_attempted: usize,
    prev_committed: usize,
}

impl<'a> WindowedExecutor<'a> {
    /// Builds an idle executor over `resources` ownership slots.
    pub fn new(
        config: &SchedulerConfig,
        resources: usize,
        pri: PriorityMap,
        nhood: &'a NeighborhoodFn<'a>,
        op: &'a OperatorFn<'a>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            nhood,
            op,
            pri,
            resources,
            workers: config.workers,
            chunk: config.chunk_size,
            target_ratio: config.target_commit_ratio,
            windowing: config.windowing_enabled(),
            may_push: config.may_push,
            sink,
            window: Window::new(),
            curr: Vec::new(),
            next: Vec::new(),
            window_size: 0,
            prev_attempted: 0,
            prev_committed: 0,
        }
    }

    /// Swaps in the next worklist and tops it up from the window.
    fn begin_round(&mut self) {
        std::mem::swap(&mut self.curr, &mut self.next);
        self.next.clear();
        if !self.windowing {
            return;
        }
        self.resize_window();
        if self.may_push {
            let spill = self.curr.len() > 2 * self.window_size
                || (self.window.is_empty() && self.curr.len() > self.window_size);
            if spill {
                for e in self.curr.drain(..) {
                    self.window.push(e, &self.pri);
                }
            }
        }
        if self.curr.len() < self.window_size {
            let need = self.window_size - self.curr.len();
            self.window.poll_into(&mut self.curr, need);
        }
    }

    fn resize_window(&mut self) {
        let floor = self.workers * self.chunk;
        if self.prev_attempted == 0 {
            let cap = FIRST_ROUND_CAP_FACTOR * floor;
            let init = self.window.initial_fill().max(self.curr.len());
            let base = if self.may_push { init } else { init / NO_PUSH_DIVISOR };
            self.window_size = base.min(cap);
        } else {
            let ratio = self.prev_committed as f64 / self.prev_attempted as f64;
            if ratio >= self.target_ratio {
                self.window_size = self.window_size.saturating_mul(2);
            } else {
                self.window_size = (self.window_size as f64 * (ratio / self.target_ratio)) as usize;
            }
        }
        self.window_size = self.window_size.max(floor).max(1);
    }

    /// Expand phase: every attempt claims its neighborhood; a loss stops the
    /// sweep early since the attempt cannot run this round anyway.
    fn expand(&self, arena: &AttemptArena, owners: &OwnerTable) {
        let nhood = self.nhood;
        let pri = &self.pri;
        par::for_each_index(arena.len(), self.workers, self.chunk, |_w, i| {
            let idx = i as u32;
            let attempt = arena.get(idx);
            let mut lost = false;
            nhood(attempt.elem(), &mut |res| {
                if lost {
                    return;
                }
                if let Acquire::Lost { .. } = owners.acquire_ordered(res, idx, arena, pri) {
                    lost = true;
                }
            });
        });
    }

    /// Apply phase: sources run the operator and commit, everyone else
    /// cancels and requeues. Both paths release every held claim.
    fn apply(&self, arena: &AttemptArena, owners: &OwnerTable, poison: &Poison) -> Vec<WorkerOut> {
        let op = self.op;
        let sink = &self.sink;
        let chunk = self.chunk;
        let cursor = AtomicUsize::new(0);
        par::map_workers(self.workers, |_w| {
            let mut out = WorkerOut::default();
            loop {
                let start = cursor.fetch_add(chunk, Ordering::Relaxed);
                if start >= arena.len() {
                    break;
                }
                for i in start..(start + chunk).min(arena.len()) {
                    let idx = i as u32;
                    let attempt = arena.get(idx);
                    if attempt.is_src() && !poison.is_set() {
                        let mut ctx = PushCtx::new(&mut out.pushes);
                        match op(attempt.elem(), &mut ctx) {
                            Ok(()) => {
                                attempt.release_all(owners, idx);
                                out.committed += 1;
                            }
                            Err(source) => {
                                attempt.release_all(owners, idx);
                                poison.set(attempt.elem(), source);
                            }
                        }
                    } else {
                        attempt.release_all(owners, idx);
                        out.retries.push(attempt.elem());
                        sink.on_abort(attempt.elem());
                    }
                }
            }
            out
        })
    }

    fn route_push(&mut self, elem: NodeIdx) {
        if self.windowing {
            if let Some(min) = self.window.min_key() {
                if self.pri.key(elem) < min {
                    self.window.push(elem, &self.pri);
                    return;
                }
            }
        }
        self.next.push(elem);
    }
}

impl SchedulingStrategy for WindowedExecutor<'_> {
    fn initialize(&mut self, range: &[NodeIdx]) {
        self.window = Window::new();
        self.curr.clear();
        self.next.clear();
        self.window_size = 0;
        self.prev_attempted = 0;
        self.prev_committed = 0;
        if self.windowing {
            self.window.fill(range.iter().copied(), &self.pri);
        } else {
            self.next.extend_from_slice(range);
        }
    }

    fn execute(&mut self) -> Result<ExecReport, EngineError> {
        let owners = OwnerTable::new(self.resources);
        let mut report = ExecReport::default();
        loop {
            self.begin_round();
            if self.curr.is_empty() {
                break;
            }
            let arena = AttemptArena::from_elems(&self.curr);
            let poison = Poison::default();
            self.expand(&arena, &owners);
            let outs = self.apply(&arena, &owners, &poison);

            report.rounds += 1;
            report.attempted += arena.len();
            let mut committed = 0;
            for out in outs {
                committed += out.committed;
                self.next.extend(out.retries);
                for p in out.pushes {
                    self.route_push(p);
                }
            }
            report.committed += committed;
            self.prev_attempted = arena.len();
            self.prev_committed = committed;
            self.sink.on_round(report.rounds, arena.len(), committed, self.window_size);

            if let Some(err) = poison.take() {
                return Err(err);
            }
        }
        self.sink.on_summary(report.rounds, report.attempted, report.committed);
        Ok(report)
    }

    fn reset_dag(&mut self) {}

    fn reinitialize_active(&mut self, range: &[NodeIdx]) {
        self.initialize(range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::graph::{CsrGraph, Topology};
    use crate::priority::PriorityPolicy;
    use crate::telemetry::NullTelemetrySink;

    fn executor<'a>(
        cfg: &SchedulerConfig,
        g: &CsrGraph,
        nhood: &'a NeighborhoodFn<'a>,
        op: &'a OperatorFn<'a>,
    ) -> WindowedExecutor<'a> {
        let pri = PriorityMap::assign(g, cfg.priority, cfg.seed);
        WindowedExecutor::new(cfg, g.len(), pri, nhood, op, Arc::new(NullTelemetrySink))
    }

    #[test]
    fn window_doubles_on_good_ratio_and_shrinks_on_bad() {
        let g = CsrGraph::from_edges(4, &[]);
        let nhood = |_: NodeIdx, _: &mut dyn FnMut(NodeIdx)| {};
        let op =
            |_: NodeIdx, _: &mut PushCtx<'_>| -> Result<(), crate::error::OperatorError> { Ok(()) };
        let cfg = SchedulerConfig { workers: 2, chunk_size: 8, ..Default::default() };
        let mut ex = executor(&cfg, &g, &nhood, &op);
        ex.window_size = 100;
        ex.prev_attempted = 10;
        ex.prev_committed = 9;
        ex.resize_window();
        assert_eq!(ex.window_size, 200);
        ex.prev_committed = 4;
        ex.resize_window();
        // 200 * (0.4 / 0.8) = 100.
        assert_eq!(ex.window_size, 100);
    }

    #[test]
    fn window_never_drops_below_workers_times_chunk() {
        let g = CsrGraph::from_edges(4, &[]);
        let nhood = |_: NodeIdx, _: &mut dyn FnMut(NodeIdx)| {};
        let op =
            |_: NodeIdx, _: &mut PushCtx<'_>| -> Result<(), crate::error::OperatorError> { Ok(()) };
        let cfg = SchedulerConfig { workers: 4, chunk_size: 16, ..Default::default() };
        let mut ex = executor(&cfg, &g, &nhood, &op);
        ex.window_size = 70;
        ex.prev_attempted = 100;
        ex.prev_committed = 1;
        ex.resize_window();
        assert_eq!(ex.window_size, 64);
    }

    #[test]
    fn zero_ratio_runs_everything_in_one_round() {
        let g = CsrGraph::from_edges(8, &[]);
        let nhood = self_and_neighbors_dyn(&g);
        let op =
            |_: NodeIdx, _: &mut PushCtx<'_>| -> Result<(), crate::error::OperatorError> { Ok(()) };
        let cfg = SchedulerConfig {
            target_commit_ratio: 0.0,
            workers: 2,
            ..Default::default()
        }
        .validated()
        .unwrap();
        let mut ex = executor(&cfg, &g, &nhood, &op);
        let range: Vec<NodeIdx> = g.nodes().collect();
        ex.initialize(&range);
        let report = ex.execute().unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.committed, 8);
    }

    fn self_and_neighbors_dyn(
        g: &CsrGraph,
    ) -> impl Fn(NodeIdx, &mut dyn FnMut(NodeIdx)) + Sync + '_ {
        move |n, touch| {
            touch(n);
            g.for_each_neighbor(n, touch);
        }
    }
}
