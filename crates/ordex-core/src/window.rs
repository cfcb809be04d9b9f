// SPDX-License-Identifier: Apache-2.0

//! Order-sorted holding pen for pending elements. The windowed executor
//! admits only the earliest slice of this heap each round.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::ident::NodeIdx;
use crate::priority::{OrderKey, PriorityMap};

/// Min-heap of `(order key, element)` pairs.
#[derive(Debug, Default)]
pub(crate) struct Window {
    heap: BinaryHeap<Reverse<(OrderKey, NodeIdx)>>,
    initial_fill: usize,
}

impl Window {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seeds the window and remembers the fill size for first-round sizing.
    pub(crate) fn fill(&mut self, elems: impl IntoIterator<Item = NodeIdx>, pri: &PriorityMap) {
        for e in elems {
            self.heap.push(Reverse((pri.key(e), e)));
        }
        self.initial_fill = self.heap.len();
    }

    pub(crate) fn push(&mut self, elem: NodeIdx, pri: &PriorityMap) {
        self.heap.push(Reverse((pri.key(elem), elem)));
    }

    /// Moves up to `n` earliest elements into `out`.
    pub(crate) fn poll_into(&mut self, out: &mut Vec<NodeIdx>, n: usize) {
        for _ in 0..n {
            match self.heap.pop() {
                Some(Reverse((_, elem))) => out.push(elem),
                None => break,
            }
        }
    }

    /// Earliest key still pending, if any.
    pub(crate) fn min_key(&self) -> Option<OrderKey> {
        self.heap.peek().map(|Reverse((k, _))| *k)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn initial_fill(&self) -> usize {
        self.initial_fill
    }
}
