// SPDX-License-Identifier: Apache-2.0

//! Per-run scheduler configuration. Plain data, no global state; every
//! executor takes its own copy.

use crate::error::ConfigError;
use crate::priority::PriorityPolicy;

/// Default target commit ratio for the windowed executor.
pub const DEFAULT_COMMIT_RATIO: f64 = 0.80;

/// Default color cutoff for the hybrid executor.
pub const DEFAULT_CUTOFF_COLOR: u32 = 20;

/// Default seed for the `Random` priority policy.
pub const DEFAULT_SEED: u64 = 10;

/// Which executor the factory builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Speculative windowed executor with ownership arbitration.
    #[default]
    WindowedOptimistic,
    /// Color the dependency DAG once, run color classes in parallel.
    Chromatic,
    /// Per-round active-subset DAG execution.
    EdgeFlip,
    /// Full-DAG topology-driven fixpoint passes.
    Topological,
    /// Chromatic below the color cutoff, active-DAG above it.
    Hybrid,
}

/// Knobs for one executor instance.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Executor selection.
    pub strategy: Strategy,
    /// Priority assignment policy.
    pub priority: PriorityPolicy,
    /// Commit-ratio target steering the adaptive window. Clamped to `[0, 1]`
    /// by [`validated`](Self::validated); `0.0` disables windowing.
    pub target_commit_ratio: f64,
    /// Colors below this run chromatically under the `Hybrid` strategy.
    /// A tuning knob, not a correctness requirement.
    pub cutoff_color: u32,
    /// Worker thread count.
    pub workers: usize,
    /// Elements claimed per scheduling grab.
    pub chunk_size: usize,
    /// Seed for the `Random` priority policy.
    pub seed: u64,
    /// Whether the operator may push new work. Gates the conservative
    /// first-round window size.
    pub may_push: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            priority: PriorityPolicy::default(),
            target_commit_ratio: DEFAULT_COMMIT_RATIO,
            cutoff_color: DEFAULT_CUTOFF_COLOR,
            workers: 1,
            chunk_size: 16,
            seed: DEFAULT_SEED,
            may_push: true,
        }
    }
}

impl SchedulerConfig {
    /// Clamps the commit ratio into `[0, 1]` and rejects degenerate values.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if !self.target_commit_ratio.is_finite() {
            return Err(ConfigError::NonFiniteRatio(self.target_commit_ratio));
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        self.target_commit_ratio = self.target_commit_ratio.clamp(0.0, 1.0);
        Ok(self)
    }

    /// True when the windowed executor should admit work through a window.
    #[must_use]
    pub(crate) fn windowing_enabled(&self) -> bool {
        self.target_commit_ratio > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates() {
        let cfg = SchedulerConfig::default().validated().unwrap();
        assert!((cfg.target_commit_ratio - DEFAULT_COMMIT_RATIO).abs() < f64::EPSILON);
        assert!(cfg.windowing_enabled());
    }

    #[test]
    fn ratio_is_clamped() {
        let cfg = SchedulerConfig { target_commit_ratio: 7.5, ..Default::default() };
        assert!((cfg.validated().unwrap().target_commit_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_values_are_rejected() {
        let nan = SchedulerConfig { target_commit_ratio: f64::NAN, ..Default::default() };
        assert!(matches!(nan.validated(), Err(ConfigError::NonFiniteRatio(_))));
        let zero = SchedulerConfig { workers: 0, ..Default::default() };
        assert!(matches!(zero.validated(), Err(ConfigError::ZeroWorkers)));
        let chunk = SchedulerConfig { chunk_size: 0, ..Default::default() };
        assert!(matches!(chunk.validated(), Err(ConfigError::ZeroChunkSize)));
    }

    #[test]
    fn zero_ratio_disables_windowing() {
        let cfg = SchedulerConfig { target_commit_ratio: 0.0, ..Default::default() }
            .validated()
            .unwrap();
        assert!(!cfg.windowing_enabled());
    }
}
