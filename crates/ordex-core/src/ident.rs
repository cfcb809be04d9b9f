// SPDX-License-Identifier: Apache-2.0

//! Element identity for the execution engine.

use std::fmt;

/// Identity of an active element, and of the resource slot it occupies.
///
/// The engine arbitrates conflicts over a dense `u32` index space supplied by
/// the input collaborator; element payloads stay outside the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(pub u32);

impl NodeIdx {
    /// Returns the index as a `usize` for slab addressing.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Builds a `NodeIdx` from a slab position.
    ///
    /// Truncation cannot occur for inputs the engine accepts: every input
    /// collaborator exposes at most `u32::MAX` elements.
    #[inline]
    #[must_use]
    pub fn from_index(i: usize) -> Self {
        debug_assert!(u32::try_from(i).is_ok());
        Self(i as u32)
    }
}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
