// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordex_core::{CsrGraph, NodeIdx, OrderKey, PriorityMap};

/// Seeds pinned so failures reproduce.
pub const SEEDS: &[u64] = &[1, 7, 42, 1337, 0xDEAD_BEEF];

/// Worker counts every parallel test sweeps.
pub const WORKER_COUNTS: &[usize] = &[1, 2, 8];

/// Small deterministic PRNG (xorshift64). Not for crypto, only for
/// generating reproducible test inputs.
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// Fisher-Yates shuffle driven by [`XorShift64`].
pub fn shuffle<T>(items: &mut [T], rng: &mut XorShift64) {
    for i in (1..items.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// Path 0-1-2-...-(n-1).
pub fn path_graph(n: usize) -> CsrGraph {
    let edges: Vec<(u32, u32)> = (0..n as u32 - 1).map(|i| (i, i + 1)).collect();
    CsrGraph::from_edges(n, &edges)
}

/// Star with node 0 at the center and `leaves` leaves.
pub fn star_graph(leaves: usize) -> CsrGraph {
    let edges: Vec<(u32, u32)> = (1..=leaves as u32).map(|i| (0, i)).collect();
    CsrGraph::from_edges(leaves + 1, &edges)
}

/// Random undirected graph; duplicate edges and self-loops are filtered by
/// the CSR builder.
pub fn random_graph(nodes: usize, edges: usize, seed: u64) -> CsrGraph {
    let mut rng = XorShift64::new(seed);
    let mut list = Vec::with_capacity(edges);
    for _ in 0..edges {
        let a = rng.below(nodes as u64) as u32;
        let b = rng.below(nodes as u64) as u32;
        if a != b {
            list.push((a, b));
        }
    }
    CsrGraph::from_edges(nodes, &list)
}

/// Reference semantics: run `op` over `range` strictly in total priority
/// order, re-inserting its pushes into the pending heap. Every scheduler
/// must be observationally equivalent to this loop.
pub fn run_sequential<F>(range: &[NodeIdx], pri: &PriorityMap, mut op: F)
where
    F: FnMut(NodeIdx, &mut Vec<NodeIdx>),
{
    let mut heap: BinaryHeap<Reverse<(OrderKey, NodeIdx)>> =
        range.iter().map(|&n| Reverse((pri.key(n), n))).collect();
    let mut pushes = Vec::new();
    while let Some(Reverse((_, n))) = heap.pop() {
        op(n, &mut pushes);
        for p in pushes.drain(..) {
            heap.push(Reverse((pri.key(p), p)));
        }
    }
}

/// Smallest value not present in `used` (the mex), counting from zero.
pub fn smallest_free(mut used: Vec<u64>) -> u64 {
    used.sort_unstable();
    let mut c = 0;
    for u in used {
        match u.cmp(&c) {
            std::cmp::Ordering::Equal => c += 1,
            std::cmp::Ordering::Greater => break,
            std::cmp::Ordering::Less => {}
        }
    }
    c
}
