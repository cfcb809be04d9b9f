// SPDX-License-Identifier: Apache-2.0

//! Priority-ordered parallel execution engine for irregular graph workloads.
//!
//! The engine runs a user operator once per active element, honoring a total
//! priority order while extracting parallelism from elements whose
//! neighborhoods do not overlap. Two families of schedulers are provided:
//!
//! - **Speculative**: [`WindowedExecutor`] admits a priority-window of work
//!   each round, detects conflicts through per-resource ownership slots, and
//!   aborts/retries the later-ordered side of every collision. The window
//!   adapts to the observed commit ratio.
//! - **Deterministic**: [`ChromaticExecutor`], [`TopologicalExecutor`],
//!   [`EdgeFlipExecutor`], and [`HybridExecutor`] precompute the dependency
//!   DAG the priority order induces over the input graph and schedule along
//!   it, with no speculation and no aborts.
//!
//! Callers provide three collaborators: a [`Topology`] describing the
//!   elements and their adjacency, a [`NeighborhoodFn`] enumerating the
//! resources an element may touch, and an [`OperatorFn`] holding the
//! application logic. [`build_executor`] assembles the executor selected by
//! a [`SchedulerConfig`].
//!
//! ```
//! use ordex_core::{
//!     build_executor, self_and_neighbors, CsrGraph, NodeIdx, OperatorError, PushCtx,
//!     SchedulerConfig,
//! };
//!
//! let graph = CsrGraph::from_edges(3, &[(0, 1), (1, 2)]);
//! let nhood = self_and_neighbors(&graph);
//! let op = |_n: NodeIdx, _ctx: &mut PushCtx<'_>| -> Result<(), OperatorError> { Ok(()) };
//! let mut exec = build_executor(&SchedulerConfig::default(), &graph, &nhood, &op)?;
//! let range: Vec<NodeIdx> = graph.nodes().collect();
//! exec.initialize(&range);
//! let report = exec.execute()?;
//! assert_eq!(report.committed, 3);
//! # Ok::<(), ordex_core::EngineError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod config;
mod context;
mod dag;
mod error;
mod executor;
mod graph;
mod ident;
mod ownership;
mod par;
mod priority;
mod telemetry;
mod window;

pub use config::{
    SchedulerConfig, Strategy, DEFAULT_COMMIT_RATIO, DEFAULT_CUTOFF_COLOR, DEFAULT_SEED,
};
pub use context::{Attempt, AttemptArena};
pub use dag::DepDag;
pub use error::{ConfigError, EngineError, OperatorError};
pub use executor::{
    build_executor, build_executor_with, self_and_neighbors, ChromaticExecutor, EdgeFlipExecutor,
    ExecReport, HybridExecutor, NeighborhoodFn, OperatorFn, PushCtx, SchedulingStrategy,
    TopologicalExecutor, WindowedExecutor,
};
pub use graph::{CsrGraph, Topology};
pub use ident::NodeIdx;
pub use ownership::{Acquire, OwnerTable, NO_OWNER};
pub use priority::{OrderKey, PriorityMap, PriorityPolicy, PRIORITY_LEVELS};
pub use telemetry::{NullTelemetrySink, TelemetrySink};
