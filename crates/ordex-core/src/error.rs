// SPDX-License-Identifier: Apache-2.0

//! Error surface of the engine.
//!
//! Conflicts between concurrent attempts are never errors; they are resolved
//! internally by abort and retry. Only configuration problems and operator
//! failures reach the caller.

use thiserror::Error;

use crate::ident::NodeIdx;

/// Failure reported by a user operator. Opaque to the engine; carried as the
/// source of [`EngineError::Operator`].
pub type OperatorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejected [`SchedulerConfig`](crate::config::SchedulerConfig) values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target commit ratio was NaN or infinite.
    #[error("target commit ratio must be finite, got {0}")]
    NonFiniteRatio(f64),
    /// The worker count was zero.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    /// The chunk size was zero.
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
}

/// Fatal error returned by `execute()`.
///
/// Commits from earlier rounds stand; the executor must be re-initialized
/// before being driven again.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user operator failed on an element. The first failure observed is
    /// reported; ownership held by the failing round is still released.
    #[error("operator failed on element {elem}")]
    Operator {
        /// Element the operator was applied to.
        elem: NodeIdx,
        /// The operator's own error.
        #[source]
        source: OperatorError,
    },
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
