// SPDX-License-Identifier: Apache-2.0

//! Priority-induced dependency DAG and its source-first execution driver.
//!
//! Every undirected graph edge becomes one directed DAG edge, from the
//! endpoint with the earlier order key to the later one. The total order
//! makes the result acyclic by construction, so source-first traversal is
//! always possible and visits each node after all earlier-ordered neighbors.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

use crate::graph::Topology;
use crate::ident::NodeIdx;
use crate::par;
use crate::priority::PriorityMap;

/// Node is not scheduled anywhere.
pub(crate) const MARK_IDLE: u8 = 0;
/// Node sits in a pending worklist or color bucket.
pub(crate) const MARK_QUEUED: u8 = 1;
/// Node belongs to the active subset of the current DAG round.
pub(crate) const MARK_ACTIVE: u8 = 2;

/// Dependency DAG over the input topology, in CSR successor form.
///
/// In-degrees are consumed during traversal and restored from a static
/// backup by [`reset`](Self::reset). A per-node mark byte carries the
/// scheduling state the executors dedupe pushes with, and a per-node color
/// slot holds the greedy coloring when [`color_all`](Self::color_all) ran.
#[derive(Debug)]
pub struct DepDag {
    indeg: Vec<AtomicU32>,
    indeg_backup: Vec<u32>,
    succ_off: Vec<u32>,
    succ: Vec<NodeIdx>,
    mark: Vec<AtomicU8>,
    color: Vec<AtomicI32>,
    num_colors: u32,
}

/// Contiguous node ranges handed to the build workers.
fn ranges(n: usize, workers: usize) -> Vec<(usize, usize)> {
    let workers = workers.max(1);
    let per = n.div_ceil(workers);
    (0..workers)
        .map(|w| ((w * per).min(n), ((w + 1) * per).min(n)))
        .filter(|&(lo, hi)| lo < hi)
        .collect()
}

impl DepDag {
    /// Builds the DAG induced by `pri` over `graph`.
    ///
    /// Count pass and fill pass both run data-parallel over contiguous node
    /// ranges; the prefix sum between them is serial.
    #[must_use]
    pub fn build<G: Topology + ?Sized>(graph: &G, pri: &PriorityMap, workers: usize) -> Self {
        let n = graph.len();
        let parts = ranges(n, workers);

        // Count pass: per-node in-degree and successor count.
        let counted: Vec<Vec<(u32, u32)>> = par::map_workers(parts.len().max(1), |w| {
            let Some(&(lo, hi)) = parts.get(w) else { return Vec::new() };
            let mut out = Vec::with_capacity(hi - lo);
            for i in lo..hi {
                let u = NodeIdx::from_index(i);
                let ku = pri.key(u);
                let mut indeg = 0u32;
                let mut nsucc = 0u32;
                graph.for_each_neighbor(u, &mut |v| {
                    if pri.key(v) < ku {
                        indeg += 1;
                    } else {
                        nsucc += 1;
                    }
                });
                out.push((indeg, nsucc));
            }
            out
        });

        let mut indeg_backup = Vec::with_capacity(n);
        let mut succ_off = Vec::with_capacity(n + 1);
        succ_off.push(0u32);
        let mut total = 0u32;
        for part in &counted {
            for &(indeg, nsucc) in part {
                indeg_backup.push(indeg);
                total += nsucc;
                succ_off.push(total);
            }
        }

        // Fill pass: each worker owns a disjoint CSR sub-slice.
        let mut succ = vec![NodeIdx(0); total as usize];
        std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(parts.len());
            let mut rest = succ.as_mut_slice();
            for &(lo, hi) in &parts {
                let take = (succ_off[hi] - succ_off[lo]) as usize;
                let (piece, tail) = std::mem::take(&mut rest).split_at_mut(take);
                rest = tail;
                let succ_off = &succ_off;
                handles.push(s.spawn(move || {
                    let base = succ_off[lo];
                    for i in lo..hi {
                        let u = NodeIdx::from_index(i);
                        let ku = pri.key(u);
                        let mut cursor = (succ_off[i] - base) as usize;
                        graph.for_each_neighbor(u, &mut |v| {
                            if pri.key(v) > ku {
                                piece[cursor] = v;
                                cursor += 1;
                            }
                        });
                    }
                }));
            }
            for h in handles {
                if let Err(payload) = h.join() {
                    std::panic::resume_unwind(payload);
                }
            }
        });

        let indeg = indeg_backup.iter().map(|&d| AtomicU32::new(d)).collect();
        Self {
            indeg,
            indeg_backup,
            succ_off,
            succ,
            mark: (0..n).map(|_| AtomicU8::new(MARK_IDLE)).collect(),
            color: (0..n).map(|_| AtomicI32::new(-1)).collect(),
            num_colors: 0,
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indeg_backup.len()
    }

    /// True when the DAG has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indeg_backup.is_empty()
    }

    /// Later-ordered neighbors of `node`.
    #[must_use]
    pub fn successors(&self, node: NodeIdx) -> &[NodeIdx] {
        let lo = self.succ_off[node.index()] as usize;
        let hi = self.succ_off[node.index() + 1] as usize;
        &self.succ[lo..hi]
    }

    /// Static in-degree of `node` (earlier-ordered neighbor count).
    #[must_use]
    pub fn static_in_degree(&self, node: NodeIdx) -> u32 {
        self.indeg_backup[node.index()]
    }

    /// Restores every in-degree counter from the static backup.
    pub fn reset(&self) {
        for (slot, &d) in self.indeg.iter().zip(&self.indeg_backup) {
            slot.store(d, Ordering::Relaxed);
        }
    }

    /// Nodes whose current in-degree is zero. Meaningful right after
    /// [`build`](Self::build) or [`reset`](Self::reset).
    #[must_use]
    pub fn collect_sources(&self) -> Vec<NodeIdx> {
        (0..self.len())
            .map(NodeIdx::from_index)
            .filter(|n| self.indeg[n.index()].load(Ordering::Relaxed) == 0)
            .collect()
    }

    /// Restricts the DAG to `subset`: marks its nodes active, recomputes
    /// in-degrees counting only edges inside the subset, and returns the
    /// subset's sources.
    ///
    /// Overwrites the in-degrees of subset nodes; callers that need the full
    /// DAG afterwards must [`reset`](Self::reset).
    pub fn reinit_active(&self, subset: &[NodeIdx], workers: usize, chunk: usize) -> Vec<NodeIdx> {
        par::for_each_index(subset.len(), workers, chunk, |_w, i| {
            let n = subset[i];
            self.mark[n.index()].store(MARK_ACTIVE, Ordering::Release);
            self.indeg[n.index()].store(0, Ordering::Release);
        });
        par::for_each_index(subset.len(), workers, chunk, |_w, i| {
            for &v in self.successors(subset[i]) {
                if self.mark[v.index()].load(Ordering::Acquire) == MARK_ACTIVE {
                    self.indeg[v.index()].fetch_add(1, Ordering::AcqRel);
                }
            }
        });
        subset
            .iter()
            .copied()
            .filter(|n| self.indeg[n.index()].load(Ordering::Acquire) == 0)
            .collect()
    }

    /// Greedily colors every node with the lowest color unused by its
    /// already-colored neighbors, visiting in DAG source-first order.
    ///
    /// The traversal order makes the result deterministic: when a node is
    /// colored, exactly its earlier-ordered neighbors are colored already.
    /// In-degrees are restored afterwards.
    pub fn color_all<G: Topology + ?Sized>(&mut self, graph: &G, workers: usize) {
        if self.is_empty() {
            self.num_colors = 0;
            return;
        }
        let max_color = AtomicU32::new(0);
        let scratch: Vec<Mutex<Vec<bool>>> =
            (0..workers.max(1)).map(|_| Mutex::new(Vec::new())).collect();
        {
            let dag = &*self;
            let sources = dag.collect_sources();
            run_dag(dag, &sources, dag.len(), workers, false, &|w, n| {
                let mut forbidden = scratch[w].lock().unwrap_or_else(PoisonError::into_inner);
                forbidden.clear();
                graph.for_each_neighbor(n, &mut |v| {
                    let c = dag.color[v.index()].load(Ordering::Acquire);
                    if c >= 0 {
                        let c = c as usize;
                        if forbidden.len() <= c {
                            forbidden.resize(c + 1, false);
                        }
                        forbidden[c] = true;
                    }
                });
                let c = forbidden.iter().position(|&f| !f).unwrap_or(forbidden.len());
                dag.color[n.index()].store(c as i32, Ordering::Release);
                max_color.fetch_max(c as u32, Ordering::Relaxed);
            });
        }
        self.num_colors = max_color.load(Ordering::Relaxed) + 1;
        self.reset();
    }

    /// Color of `node`. Zero until [`color_all`](Self::color_all) ran.
    #[must_use]
    pub fn color_of(&self, node: NodeIdx) -> u32 {
        self.color[node.index()].load(Ordering::Acquire).max(0) as u32
    }

    /// Number of colors in use after [`color_all`](Self::color_all).
    #[must_use]
    pub fn num_colors(&self) -> u32 {
        self.num_colors
    }

    /// Atomically queues an idle node. Returns false when the node is
    /// already queued or active, which dedupes concurrent pushes.
    pub(crate) fn mark_try_queue(&self, node: NodeIdx) -> bool {
        self.mark[node.index()]
            .compare_exchange(MARK_IDLE, MARK_QUEUED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_get(&self, node: NodeIdx) -> u8 {
        self.mark[node.index()].load(Ordering::Acquire)
    }

    pub(crate) fn mark_set(&self, node: NodeIdx, value: u8) {
        self.mark[node.index()].store(value, Ordering::Release);
    }

    /// Swaps the mark to idle, returning the previous value.
    pub(crate) fn mark_take(&self, node: NodeIdx) -> u8 {
        self.mark[node.index()].swap(MARK_IDLE, Ordering::AcqRel)
    }

    pub(crate) fn clear_marks(&self) {
        for m in &self.mark {
            m.store(MARK_IDLE, Ordering::Relaxed);
        }
    }
}

/// Runs `func` once per reachable node in source-first order.
///
/// `expected` is the number of nodes that will run: the whole DAG in full
/// mode, the active subset in `active_only` mode. Workers share work through
/// crossbeam deques seeded from `sources`; in-degree decrements release the
/// writes of the predecessor's `func` call to whichever worker picks up the
/// successor.
pub(crate) fn run_dag<F>(
    dag: &DepDag,
    sources: &[NodeIdx],
    expected: usize,
    workers: usize,
    active_only: bool,
    func: &F,
) where
    F: Fn(usize, NodeIdx) + Sync,
{
    let workers = workers.max(1);
    let injector = Injector::new();
    for &s in sources {
        injector.push(s);
    }
    let locals: Vec<Worker<NodeIdx>> = (0..workers).map(|_| Worker::new_fifo()).collect();
    let stealers: Vec<Stealer<NodeIdx>> = locals.iter().map(Worker::stealer).collect();
    let remaining = AtomicUsize::new(expected);

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for (w, local) in locals.into_iter().enumerate() {
            let injector = &injector;
            let stealers = &stealers;
            let remaining = &remaining;
            handles.push(s.spawn(move || loop {
                let node = local.pop().or_else(|| steal_task(&local, injector, stealers, w));
                match node {
                    Some(n) => {
                        func(w, n);
                        for &v in dag.successors(n) {
                            if active_only && dag.mark_get(v) != MARK_ACTIVE {
                                continue;
                            }
                            if dag.indeg[v.index()].fetch_sub(1, Ordering::AcqRel) == 1 {
                                local.push(v);
                            }
                        }
                        remaining.fetch_sub(1, Ordering::Release);
                    }
                    None => {
                        if remaining.load(Ordering::Acquire) == 0 {
                            break;
                        }
                        std::thread::yield_now();
                    }
                }
            }));
        }
        for h in handles {
            if let Err(payload) = h.join() {
                std::panic::resume_unwind(payload);
            }
        }
    });
}

fn steal_task(
    local: &Worker<NodeIdx>,
    injector: &Injector<NodeIdx>,
    stealers: &[Stealer<NodeIdx>],
    me: usize,
) -> Option<NodeIdx> {
    std::iter::repeat_with(|| {
        injector.steal_batch_and_pop(local).or_else(|| {
            stealers
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != me)
                .map(|(_, st)| st.steal())
                .collect()
        })
    })
    .find(|st: &Steal<NodeIdx>| !st.is_retry())
    .and_then(Steal::success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CsrGraph;
    use crate::priority::PriorityPolicy;

    fn path(n: usize) -> CsrGraph {
        let edges: Vec<(u32, u32)> = (0..n as u32 - 1).map(|i| (i, i + 1)).collect();
        CsrGraph::from_edges(n, &edges)
    }

    #[test]
    fn chain_builds_a_chain_dag() {
        let g = path(5);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let dag = DepDag::build(&g, &pri, 2);
        assert_eq!(dag.static_in_degree(NodeIdx(0)), 0);
        for i in 1..5u32 {
            assert_eq!(dag.static_in_degree(NodeIdx(i)), 1);
            assert_eq!(dag.successors(NodeIdx(i - 1)), &[NodeIdx(i)]);
        }
        assert_eq!(dag.collect_sources(), vec![NodeIdx(0)]);
    }

    #[test]
    fn run_dag_respects_dependencies() {
        let g = path(6);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let dag = DepDag::build(&g, &pri, 1);
        let order = Mutex::new(Vec::new());
        let sources = dag.collect_sources();
        run_dag(&dag, &sources, dag.len(), 4, false, &|_w, n| {
            order.lock().unwrap().push(n);
        });
        let order = order.into_inner().unwrap();
        assert_eq!(order.len(), 6);
        // A chain admits exactly one topological order.
        assert_eq!(order, (0..6).map(NodeIdx::from_index).collect::<Vec<_>>());
    }

    #[test]
    fn reset_restores_consumed_in_degrees() {
        let g = path(4);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let dag = DepDag::build(&g, &pri, 1);
        let sources = dag.collect_sources();
        run_dag(&dag, &sources, dag.len(), 2, false, &|_w, _n| {});
        assert!(dag.collect_sources().len() > 1);
        dag.reset();
        assert_eq!(dag.collect_sources(), vec![NodeIdx(0)]);
    }

    #[test]
    fn reinit_active_restricts_in_degrees() {
        let g = path(5);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let dag = DepDag::build(&g, &pri, 1);
        // Activate {1, 2, 4}: edge 1→2 is internal, 4 has no active pred.
        let subset = [NodeIdx(1), NodeIdx(2), NodeIdx(4)];
        let mut sources = dag.reinit_active(&subset, 2, 4);
        sources.sort_unstable();
        assert_eq!(sources, vec![NodeIdx(1), NodeIdx(4)]);
        dag.clear_marks();
        dag.reset();
    }

    #[test]
    fn coloring_is_proper_and_deterministic() {
        let g = CsrGraph::from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (0, 3)]);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let mut dag = DepDag::build(&g, &pri, 2);
        dag.color_all(&g, 4);
        assert!(dag.num_colors() >= 2);
        for n in g.nodes() {
            for &v in g.neighbors(n) {
                assert_ne!(dag.color_of(n), dag.color_of(v), "adjacent nodes share a color");
            }
        }
        let mut again = DepDag::build(&g, &pri, 1);
        again.color_all(&g, 1);
        for n in g.nodes() {
            assert_eq!(dag.color_of(n), again.color_of(n));
        }
        // Coloring restores the in-degrees it consumed.
        assert_eq!(dag.collect_sources(), vec![NodeIdx(0)]);
    }
}
