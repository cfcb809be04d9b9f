// SPDX-License-Identifier: Apache-2.0

//! Input collaborator seam: the engine never stores a graph of its own, it
//! only asks the input container for sizes, degrees, and neighbor sweeps.

use rustc_hash::FxHashSet;

use crate::ident::NodeIdx;

/// Read-only topology the engine schedules over.
///
/// Neighbor enumeration must be repeatable (same order every sweep) and must
/// not yield the node itself; the DAG builder and the coloring pass rely on
/// both.
pub trait Topology: Sync {
    /// Number of elements (and resource slots).
    fn len(&self) -> usize;

    /// True when the topology has no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Degree of `node`.
    fn degree(&self, node: NodeIdx) -> usize;

    /// Calls `f` once per neighbor of `node`, in a fixed order.
    fn for_each_neighbor(&self, node: NodeIdx, f: &mut dyn FnMut(NodeIdx));
}

/// Compact undirected adjacency in CSR form.
///
/// This is the minimal container the engine needs for tests and for callers
/// without their own graph store; it is not a general graph database.
#[derive(Debug, Clone)]
pub struct CsrGraph {
    offsets: Vec<u32>,
    adjacency: Vec<NodeIdx>,
}

impl CsrGraph {
    /// Builds an undirected graph over `nodes` elements from an edge list.
    ///
    /// Self-loops and duplicate edges are dropped. Endpoints must be below
    /// `nodes`.
    #[must_use]
    pub fn from_edges(nodes: usize, edges: &[(u32, u32)]) -> Self {
        let mut seen = FxHashSet::default();
        let mut degree = vec![0u32; nodes];
        for &(a, b) in edges {
            assert!((a as usize) < nodes && (b as usize) < nodes, "edge endpoint out of range");
            if a == b {
                continue;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            if seen.insert(key) {
                degree[a as usize] += 1;
                degree[b as usize] += 1;
            }
        }

        let mut offsets = Vec::with_capacity(nodes + 1);
        let mut total = 0u32;
        offsets.push(0);
        for d in &degree {
            total += d;
            offsets.push(total);
        }

        let mut adjacency = vec![NodeIdx(0); total as usize];
        let mut cursor: Vec<u32> = offsets[..nodes].to_vec();
        for &(a, b) in edges {
            if a == b {
                continue;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            if seen.remove(&key) {
                adjacency[cursor[a as usize] as usize] = NodeIdx(b);
                cursor[a as usize] += 1;
                adjacency[cursor[b as usize] as usize] = NodeIdx(a);
                cursor[b as usize] += 1;
            }
        }
        // Neighbor order must be stable across sweeps; sort so it does not
        // depend on edge-list order.
        for w in offsets.windows(2) {
            adjacency[w[0] as usize..w[1] as usize].sort_unstable();
        }

        Self { offsets, adjacency }
    }

    /// Neighbors of `node` as a slice.
    #[must_use]
    pub fn neighbors(&self, node: NodeIdx) -> &[NodeIdx] {
        let lo = self.offsets[node.index()] as usize;
        let hi = self.offsets[node.index() + 1] as usize;
        &self.adjacency[lo..hi]
    }

    /// Iterator over all node ids.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.len()).map(NodeIdx::from_index)
    }
}

impl Topology for CsrGraph {
    fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    fn degree(&self, node: NodeIdx) -> usize {
        self.neighbors(node).len()
    }

    fn for_each_neighbor(&self, node: NodeIdx, f: &mut dyn FnMut(NodeIdx)) {
        for &v in self.neighbors(node) {
            f(v);
        }
    }
}
