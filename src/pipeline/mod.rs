//! Pipeline assembly and execution
//!
//! A [`TaskSequence`] fixes the stage order, a [`ProcessTable`] assigns
//! per-stage directives under reusable names, and [`PipelineBuilder`]
//! freezes both into an executable [`Pipeline`] bound to a session.

pub mod builder;
pub mod engine;
pub mod process;
pub mod sequence;

pub use builder::PipelineBuilder;
pub use engine::{Pipeline, RunRecord, RunState, StageAction};
pub use process::{Directive, Process, ProcessTable};
pub use sequence::TaskSequence;
