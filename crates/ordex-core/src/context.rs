// SPDX-License-Identifier: Apache-2.0

//! Per-round attempt records.
//!
//! One [`Attempt`] exists per admitted element per round; the whole arena is
//! rebuilt each round and dropped at round end, so attempt indices are only
//! meaningful within a single round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::ident::NodeIdx;
use crate::ownership::OwnerTable;

/// State of one element's attempt within a round.
#[derive(Debug)]
pub struct Attempt {
    elem: NodeIdx,
    src: AtomicBool,
    // Written only by the worker expanding this attempt; arbitration from
    // other threads flips `src`, never the claim list. Insertion order is
    // release order.
    claims: Mutex<Vec<NodeIdx>>,
}

impl Attempt {
    fn new(elem: NodeIdx) -> Self {
        Self { elem, src: AtomicBool::new(true), claims: Mutex::new(Vec::new()) }
    }

    /// Element this attempt runs.
    #[must_use]
    pub fn elem(&self) -> NodeIdx {
        self.elem
    }

    /// True while the attempt has not lost arbitration.
    #[must_use]
    pub fn is_src(&self) -> bool {
        self.src.load(Ordering::Acquire)
    }

    /// Marks the attempt as aborted for this round.
    pub fn disable_src(&self) {
        self.src.store(false, Ordering::Release);
    }

    /// Records a resource this attempt now owns.
    pub(crate) fn record_claim(&self, resource: NodeIdx) {
        self.claims
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(resource);
    }

    /// Releases every still-held claim. Used both on commit and on cancel;
    /// slots stolen by an earlier attempt are skipped by the CAS inside
    /// [`OwnerTable::release`].
    pub fn release_all(&self, owners: &OwnerTable, me: u32) {
        let mut claims = self.claims.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for resource in claims.drain(..) {
            owners.release(resource, me);
        }
    }
}

/// Round-scoped slab of attempts, indexed by admission position.
#[derive(Debug, Default)]
pub struct AttemptArena {
    attempts: Vec<Attempt>,
}

impl AttemptArena {
    /// Builds one attempt per admitted element, in admission order.
    #[must_use]
    pub fn from_elems(elems: &[NodeIdx]) -> Self {
        Self { attempts: elems.iter().copied().map(Attempt::new).collect() }
    }

    /// Attempt at slab position `idx`.
    #[must_use]
    pub fn get(&self, idx: u32) -> &Attempt {
        &self.attempts[idx as usize]
    }

    /// Number of attempts this round.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// True when the round admitted nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Iterates attempts in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }
}
