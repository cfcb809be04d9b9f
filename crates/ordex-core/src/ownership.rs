// SPDX-License-Identifier: Apache-2.0

//! Resource ownership and priority arbitration.
//!
//! One atomic owner slot per resource. During a round, contenders race to
//! claim the slots their neighborhoods touch; each slot converges to the
//! earliest-ordered contender, and every later contender that meets an
//! earlier owner aborts its own attempt.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::AttemptArena;
use crate::ident::NodeIdx;
use crate::priority::PriorityMap;

/// Sentinel owner value for an unclaimed slot.
pub const NO_OWNER: u32 = u32::MAX;

/// Outcome of one ordered acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// The slot was free and is now owned by the caller.
    Won,
    /// The caller already owned the slot (repeat visit of the same resource).
    AlreadyOwned,
    /// The caller displaced a later-ordered owner, whose attempt was aborted.
    Stolen {
        /// The displaced attempt.
        victim: u32,
    },
    /// An earlier-ordered attempt holds the slot; the caller's attempt was
    /// aborted.
    Lost {
        /// The prevailing owner.
        owner: u32,
    },
}

/// Arena of owner slots, one per resource.
#[derive(Debug)]
pub struct OwnerTable {
    slots: Vec<AtomicU32>,
}

impl OwnerTable {
    /// Creates a table of `resources` unclaimed slots.
    #[must_use]
    pub fn new(resources: usize) -> Self {
        Self { slots: (0..resources).map(|_| AtomicU32::new(NO_OWNER)).collect() }
    }

    /// Number of resource slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current owner of `resource`, if any. A racing snapshot; useful for
    /// diagnostics and tests, not for arbitration.
    #[must_use]
    pub fn current_owner(&self, resource: NodeIdx) -> Option<u32> {
        match self.slots[resource.index()].load(Ordering::Acquire) {
            NO_OWNER => None,
            owner => Some(owner),
        }
    }

    /// Plain one-shot claim with no arbitration: succeeds only on a free
    /// slot. Returns the holder on failure.
    ///
    /// # Errors
    ///
    /// Returns the current owner when the slot is taken.
    pub fn try_acquire(&self, resource: NodeIdx, attempt: u32) -> Result<(), u32> {
        self.slots[resource.index()]
            .compare_exchange(NO_OWNER, attempt, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Releases `resource` if `attempt` still owns it. Returns whether the
    /// release happened; a stolen slot is left to its new owner.
    pub fn release(&self, resource: NodeIdx, attempt: u32) -> bool {
        self.slots[resource.index()]
            .compare_exchange(attempt, NO_OWNER, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Ordered acquisition for attempt `me` against everyone else expanding
    /// in the same round.
    ///
    /// The loop retries until the slot either belongs to `me` or to an
    /// attempt ordered no later than `me`. On `Stolen` the victim's source
    /// flag is cleared; on `Lost` the caller's own source flag is cleared.
    /// Equal keys (duplicate admissions of one element) resolve in favor of
    /// the incumbent.
    pub fn acquire_ordered(
        &self,
        resource: NodeIdx,
        me: u32,
        arena: &AttemptArena,
        pri: &PriorityMap,
    ) -> Acquire {
        let slot = &self.slots[resource.index()];
        let my_key = pri.key(arena.get(me).elem());
        loop {
            let holder = slot.load(Ordering::Acquire);
            if holder == me {
                return Acquire::AlreadyOwned;
            }
            if holder == NO_OWNER {
                if slot
                    .compare_exchange_weak(NO_OWNER, me, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    arena.get(me).record_claim(resource);
                    return Acquire::Won;
                }
                continue;
            }
            let their_key = pri.key(arena.get(holder).elem());
            if my_key < their_key {
                if slot
                    .compare_exchange_weak(holder, me, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    arena.get(holder).disable_src();
                    arena.get(me).record_claim(resource);
                    return Acquire::Stolen { victim: holder };
                }
                continue;
            }
            arena.get(me).disable_src();
            return Acquire::Lost { owner: holder };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AttemptArena;
    use crate::graph::CsrGraph;
    use crate::priority::PriorityPolicy;

    fn fixture() -> (OwnerTable, AttemptArena, PriorityMap) {
        let g = CsrGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let pri = PriorityMap::assign(&g, PriorityPolicy::ById, 0);
        let arena =
            AttemptArena::from_elems(&[NodeIdx(0), NodeIdx(1), NodeIdx(2), NodeIdx(3)]);
        (OwnerTable::new(4), arena, pri)
    }

    #[test]
    fn free_slot_is_won_and_claimed() {
        let (owners, arena, pri) = fixture();
        assert_eq!(owners.acquire_ordered(NodeIdx(2), 1, &arena, &pri), Acquire::Won);
        assert_eq!(owners.current_owner(NodeIdx(2)), Some(1));
        assert_eq!(
            owners.acquire_ordered(NodeIdx(2), 1, &arena, &pri),
            Acquire::AlreadyOwned
        );
    }

    #[test]
    fn earlier_attempt_steals_and_disables_victim() {
        let (owners, arena, pri) = fixture();
        assert_eq!(owners.acquire_ordered(NodeIdx(1), 2, &arena, &pri), Acquire::Won);
        assert_eq!(
            owners.acquire_ordered(NodeIdx(1), 0, &arena, &pri),
            Acquire::Stolen { victim: 2 }
        );
        assert!(!arena.get(2).is_src());
        assert!(arena.get(0).is_src());
        assert_eq!(owners.current_owner(NodeIdx(1)), Some(0));
    }

    #[test]
    fn later_attempt_loses_and_aborts_itself() {
        let (owners, arena, pri) = fixture();
        assert_eq!(owners.acquire_ordered(NodeIdx(1), 0, &arena, &pri), Acquire::Won);
        assert_eq!(
            owners.acquire_ordered(NodeIdx(1), 3, &arena, &pri),
            Acquire::Lost { owner: 0 }
        );
        assert!(!arena.get(3).is_src());
        assert_eq!(owners.current_owner(NodeIdx(1)), Some(0));
    }

    #[test]
    fn release_skips_stolen_slots() {
        let (owners, arena, pri) = fixture();
        owners.acquire_ordered(NodeIdx(1), 2, &arena, &pri);
        owners.acquire_ordered(NodeIdx(1), 0, &arena, &pri);
        assert!(!owners.release(NodeIdx(1), 2));
        assert!(owners.release(NodeIdx(1), 0));
        assert_eq!(owners.current_owner(NodeIdx(1)), None);
    }
}
