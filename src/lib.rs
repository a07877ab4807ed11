//! Ridgeline - regularized least-squares learning pipelines
//!
//! An RLS learning pipeline is an ordered sequence of stages (kernel
//! computation, parameter selection, optimization, prediction, performance
//! evaluation) executed under named, reusable *processes*. A process assigns
//! one directive per stage - compute, compute-and-save, load, or ignore -
//! so a single built pipeline can, for example, train once with results
//! persisted and then evaluate repeatedly by loading them back.
//!
//! # Modules
//!
//! - [`tasks`] - stage identities, dispatch registry and the RLS stage
//!   implementations (kernels, LOO/hold-out parameter selection,
//!   primal/dual solvers, prediction, performance metrics)
//! - [`pipeline`] - task sequences, process tables, the builder and the
//!   execution engine
//! - [`options`] - the shared option structure stages communicate through
//!   and callers query after a run
//! - [`session`] - the session-scoped persisted result store behind
//!   compute-and-save / load
//! - [`dataset`] - named matrix registry and delimited-file ingestion
//! - [`config`] - benchmark routine configuration parsing
//! - [`error`] - the error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use ndarray::arr2;
//! use ridgeline::options::TaskCategory;
//! use ridgeline::pipeline::{PipelineBuilder, TaskSequence};
//!
//! # fn main() -> ridgeline::error::Result<()> {
//! let mut builder = PipelineBuilder::new();
//! builder.set_task_sequence(TaskSequence::from_ids(&[
//!     "paramsel:loocvprimal",
//!     "optimizer:rlsprimal",
//!     "pred:primal",
//!     "perf:macroavg",
//! ])?)?;
//! builder.add_process_tokens("train", &["computeNsave", "computeNsave", "ignore", "ignore"])?;
//! builder.add_process_tokens("eval", &["load", "load", "computeNsave", "computeNsave"])?;
//! let mut pipeline = builder.build_pipeline("demo", false)?;
//!
//! pipeline.add_matrix("xtr", arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]));
//! pipeline.add_matrix("ytr", arr2(&[[1.0], [-1.0], [1.0]]));
//! pipeline.add_matrix("xte", arr2(&[[1.0, 2.0]]));
//! pipeline.add_matrix("yte", arr2(&[[-1.0]]));
//!
//! pipeline.run("xtr", "ytr", "train")?;
//! pipeline.run("xte", "yte", "eval")?;
//! let accuracy = pipeline.option_field(TaskCategory::Perf, "acc_avg")?;
//! # let _ = accuracy;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod session;
pub mod tasks;

pub use error::{PipelineError, Result};
pub use options::{FieldValue, OptionStore, StageOutput, TaskCategory};
pub use pipeline::{Directive, Pipeline, PipelineBuilder, TaskSequence};
pub use session::Session;
pub use tasks::{PipelineConfig, Task};
