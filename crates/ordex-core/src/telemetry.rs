// SPDX-License-Identifier: Apache-2.0

//! Observability hooks. Executors report through an injected sink so library
//! code never logs on its own.

use crate::ident::NodeIdx;

/// Receiver for execution events.
///
/// Implementations must tolerate concurrent calls; abort notifications arrive
/// from worker threads. All hooks default to no-ops.
pub trait TelemetrySink: Send + Sync {
    /// End of a scheduling round.
    fn on_round(&self, _round: usize, _attempted: usize, _committed: usize, _window: usize) {}

    /// An attempt lost arbitration and was requeued.
    fn on_abort(&self, _elem: NodeIdx) {}

    /// End of an `execute()` run.
    fn on_summary(&self, _rounds: usize, _attempted: usize, _committed: usize) {}
}

/// Sink that drops every event. The default when no sink is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}
