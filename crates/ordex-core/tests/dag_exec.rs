// SPDX-License-Identifier: Apache-2.0

//! Lifecycle behavior of the DAG-driven executors: reset, active-subset
//! reinitialization, and bit-for-bit reproducibility.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};

use ordex_core::{
    build_executor, self_and_neighbors, DepDag, EngineError, NodeIdx, OperatorError, PriorityMap,
    PriorityPolicy, PushCtx, SchedulerConfig, Strategy, Topology,
};

const DAG_STRATEGIES: &[Strategy] =
    &[Strategy::Chromatic, Strategy::EdgeFlip, Strategy::Topological, Strategy::Hybrid];

#[test]
fn dag_is_acyclic_and_edges_point_later_in_the_order() {
    for &seed in &common::SEEDS[..3] {
        let g = common::random_graph(100, 250, seed);
        let pri = PriorityMap::assign(&g, PriorityPolicy::Random, seed);
        let dag = DepDag::build(&g, &pri, 4);
        let mut dag_edges = 0usize;
        let mut graph_edges = 0usize;
        for n in g.nodes() {
            graph_edges += g.degree(n);
            for &v in dag.successors(n) {
                assert!(pri.earlier(n, v), "edge {n} -> {v} violates the order");
                dag_edges += 1;
            }
        }
        // Every undirected edge appears exactly once, directed.
        assert_eq!(2 * dag_edges, graph_edges);
        // In-degrees and successor lists agree.
        let mut indeg = vec![0u32; g.len()];
        for n in g.nodes() {
            for &v in dag.successors(n) {
                indeg[v.index()] += 1;
            }
        }
        for n in g.nodes() {
            assert_eq!(indeg[n.index()], dag.static_in_degree(n));
        }
    }
}

#[test]
fn coloring_is_proper_on_random_graphs() {
    for &seed in &common::SEEDS[..3] {
        let g = common::random_graph(100, 250, seed);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, seed);
        let mut dag = DepDag::build(&g, &pri, 4);
        dag.color_all(&g, 4);
        for n in g.nodes() {
            g.for_each_neighbor(n, &mut |v| {
                assert_ne!(dag.color_of(n), dag.color_of(v), "edge {n}-{v} shares a color");
            });
        }
    }
}

#[test]
fn reset_and_reinitialize_reproduce_the_first_run() {
    let g = common::path_graph(32);
    let range: Vec<NodeIdx> = g.nodes().collect();
    for &strategy in DAG_STRATEGIES {
        let vals: Vec<AtomicU64> = (0..32).map(|_| AtomicU64::new(0)).collect();
        let op = |n: NodeIdx, ctx: &mut PushCtx<'_>| -> Result<(), OperatorError> {
            let prev = if n.0 == 0 { 0 } else { vals[n.index() - 1].load(Ordering::SeqCst) };
            let cand = 2 * prev + 1;
            let old = vals[n.index()].swap(cand, Ordering::SeqCst);
            if old != cand && n.index() + 1 < vals.len() {
                ctx.push(NodeIdx(n.0 + 1));
            }
            Ok(())
        };
        let nhood = self_and_neighbors(&g);
        let cfg = SchedulerConfig { strategy, workers: 4, ..Default::default() };
        let mut ex = build_executor(&cfg, &g, &nhood, &op).unwrap();

        ex.initialize(&range);
        ex.execute().unwrap();
        let first: Vec<u64> = vals.iter().map(|v| v.load(Ordering::SeqCst)).collect();

        for v in &vals {
            v.store(0, Ordering::SeqCst);
        }
        ex.reset_dag();
        ex.reinitialize_active(&range);
        ex.execute().unwrap();
        let second: Vec<u64> = vals.iter().map(|v| v.load(Ordering::SeqCst)).collect();
        assert_eq!(first, second, "strategy {strategy:?}");
    }
}

#[test]
fn active_subset_runs_only_the_subset() {
    let g = common::path_graph(16);
    for &strategy in DAG_STRATEGIES {
        let runs: Vec<AtomicU64> = (0..16).map(|_| AtomicU64::new(0)).collect();
        let op = |n: NodeIdx, _: &mut PushCtx<'_>| -> Result<(), OperatorError> {
            runs[n.index()].fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        let nhood = self_and_neighbors(&g);
        let cfg = SchedulerConfig { strategy, workers: 2, ..Default::default() };
        let mut ex = build_executor(&cfg, &g, &nhood, &op).unwrap();
        ex.initialize(&[NodeIdx(3), NodeIdx(4), NodeIdx(11)]);
        let report = ex.execute().unwrap();
        assert_eq!(report.committed, 3, "strategy {strategy:?}");
        let total: u64 = runs.iter().map(|r| r.load(Ordering::SeqCst)).sum();
        assert_eq!(total, 3, "strategy {strategy:?}");
    }
}

#[test]
fn operator_error_propagates_from_dag_executors() {
    let g = common::path_graph(8);
    let range: Vec<NodeIdx> = g.nodes().collect();
    for &strategy in DAG_STRATEGIES {
        let op = |n: NodeIdx, _: &mut PushCtx<'_>| -> Result<(), OperatorError> {
            if n == NodeIdx(5) {
                return Err("bad element".into());
            }
            Ok(())
        };
        let nhood = self_and_neighbors(&g);
        let cfg = SchedulerConfig { strategy, workers: 2, ..Default::default() };
        let mut ex = build_executor(&cfg, &g, &nhood, &op).unwrap();
        ex.initialize(&range);
        match ex.execute() {
            Err(EngineError::Operator { elem, .. }) => assert_eq!(elem, NodeIdx(5)),
            other => panic!("strategy {strategy:?}: unexpected result {other:?}"),
        }
    }
}
