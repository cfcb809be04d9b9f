// SPDX-License-Identifier: Apache-2.0

//! Priority assignment and the total order the schedulers arbitrate by.

use crate::graph::Topology;
use crate::ident::NodeIdx;

/// Number of distinct levels produced by the modular policies.
pub const PRIORITY_LEVELS: u32 = 100;

/// How per-node priorities are assigned before execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriorityPolicy {
    /// Every node gets the same level; ties resolve by node id.
    FirstFit,
    /// Node id modulo [`PRIORITY_LEVELS`].
    #[default]
    ById,
    /// Seeded pseudo-random level per node, reproducible across runs and
    /// worker counts.
    Random,
    /// Lower degree runs earlier.
    MinDegree,
    /// Higher degree runs earlier.
    MaxDegree,
}

/// Sortable key: `(priority level, node id)`. Lower compares earlier, and the
/// id component makes the order total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey(pub u32, pub u32);

/// Immutable per-node priority table plus the induced total order.
#[derive(Debug, Clone)]
pub struct PriorityMap {
    levels: Vec<u32>,
}

impl PriorityMap {
    /// Assigns a priority level to every node of `graph` under `policy`.
    ///
    /// `seed` feeds the `Random` policy only.
    pub fn assign<G: Topology + ?Sized>(graph: &G, policy: PriorityPolicy, seed: u64) -> Self {
        let n = graph.len();
        let mut levels = vec![0u32; n];
        match policy {
            PriorityPolicy::FirstFit => {}
            PriorityPolicy::ById => {
                for (i, level) in levels.iter_mut().enumerate() {
                    *level = (i as u32) % PRIORITY_LEVELS;
                }
            }
            PriorityPolicy::Random => {
                for (i, level) in levels.iter_mut().enumerate() {
                    *level = (splitmix64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
                        % u64::from(PRIORITY_LEVELS)) as u32;
                }
            }
            PriorityPolicy::MinDegree => {
                for (i, level) in levels.iter_mut().enumerate() {
                    *level = graph.degree(NodeIdx::from_index(i)) as u32;
                }
            }
            PriorityPolicy::MaxDegree => {
                let max_deg = (0..n)
                    .map(|i| graph.degree(NodeIdx::from_index(i)))
                    .max()
                    .unwrap_or(0) as u32;
                for (i, level) in levels.iter_mut().enumerate() {
                    *level = max_deg - graph.degree(NodeIdx::from_index(i)) as u32;
                }
            }
        }
        Self { levels }
    }

    /// Number of nodes covered by the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when the map covers no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Priority level of `node`.
    #[must_use]
    pub fn level(&self, node: NodeIdx) -> u32 {
        self.levels[node.index()]
    }

    /// Total-order key of `node`.
    #[must_use]
    pub fn key(&self, node: NodeIdx) -> OrderKey {
        OrderKey(self.levels[node.index()], node.0)
    }

    /// True when `a` is scheduled strictly before `b`.
    #[must_use]
    pub fn earlier(&self, a: NodeIdx, b: NodeIdx) -> bool {
        self.key(a) < self.key(b)
    }
}

/// splitmix64 finalizer; one invocation per node keeps `Random` independent
/// of worker count and visit order.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CsrGraph;

    fn path(n: usize) -> CsrGraph {
        let edges: Vec<(u32, u32)> = (0..n as u32 - 1).map(|i| (i, i + 1)).collect();
        CsrGraph::from_edges(n, &edges)
    }

    #[test]
    fn by_id_wraps_at_level_count() {
        let g = path(205);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        assert_eq!(pri.level(NodeIdx(3)), 3);
        assert_eq!(pri.level(NodeIdx(103)), 3);
        assert_eq!(pri.level(NodeIdx(203)), 3);
    }

    #[test]
    fn order_is_total_under_first_fit() {
        let g = path(8);
        let pri = PriorityMap::assign(&g, PriorityPolicy::FirstFit, 0);
        for i in 0..7u32 {
            assert!(pri.earlier(NodeIdx(i), NodeIdx(i + 1)));
        }
    }

    #[test]
    fn random_is_seed_stable() {
        let g = path(64);
        let a = PriorityMap::assign(&g, PriorityPolicy::Random, 10);
        let b = PriorityMap::assign(&g, PriorityPolicy::Random, 10);
        let c = PriorityMap::assign(&g, PriorityPolicy::Random, 11);
        for n in g.nodes() {
            assert_eq!(a.level(n), b.level(n));
        }
        assert!(g.nodes().any(|n| a.level(n) != c.level(n)));
    }

    #[test]
    fn degree_policies_invert() {
        let g = CsrGraph::from_edges(4, &[(0, 1), (0, 2), (0, 3)]);
        let min = PriorityMap::assign(&g, PriorityPolicy::MinDegree, 0);
        let max = PriorityMap::assign(&g, PriorityPolicy::MaxDegree, 0);
        // Center has the highest degree: last under MinDegree, first under
        // MaxDegree.
        assert!(min.earlier(NodeIdx(1), NodeIdx(0)));
        assert!(max.earlier(NodeIdx(0), NodeIdx(1)));
    }
}
