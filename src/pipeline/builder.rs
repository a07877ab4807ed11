//! Pipeline builder: freezes a (sequence, process table) pair into an
//! executable pipeline bound to a session

use std::path::PathBuf;

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::engine::Pipeline;
use crate::pipeline::process::{Directive, ProcessTable};
use crate::pipeline::sequence::TaskSequence;
use crate::session::Session;
use crate::tasks::{resolve, PipelineConfig};

/// Assembles the task sequence and process table, then compiles them into a
/// [`Pipeline`]. A builder compiles at most once; mutating or rebuilding
/// after that is a state error so directive lists can never desynchronize
/// from the stage order they were validated against.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    sequence: Option<TaskSequence>,
    table: ProcessTable,
    config: PipelineConfig,
    session_dir: Option<PathBuf>,
    built: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            sequence: None,
            table: ProcessTable::new(),
            config: PipelineConfig::default(),
            session_dir: None,
            built: false,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist session results on disk under `dir/<session name>`
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    /// Replace the active task sequence. Only valid before the pipeline has
    /// been built.
    pub fn set_task_sequence(&mut self, sequence: TaskSequence) -> Result<()> {
        if self.built {
            return Err(PipelineError::State(
                "task sequence cannot change after the pipeline was built".to_string(),
            ));
        }
        self.sequence = Some(sequence);
        Ok(())
    }

    pub fn clear_task_sequence(&mut self) -> Result<()> {
        if self.built {
            return Err(PipelineError::State(
                "task sequence cannot change after the pipeline was built".to_string(),
            ));
        }
        self.sequence = None;
        Ok(())
    }

    /// Register a named process against the current sequence
    pub fn add_process(&mut self, name: impl Into<String>, directives: Vec<Directive>) -> Result<()> {
        if self.built {
            return Err(PipelineError::State(
                "processes cannot be added after the pipeline was built".to_string(),
            ));
        }
        let sequence = self.sequence.as_ref().ok_or_else(|| {
            PipelineError::Config("set a task sequence before adding processes".to_string())
        })?;
        self.table.add(name, directives, sequence.len())
    }

    /// Register a named process from directive tokens
    pub fn add_process_tokens<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        tokens: &[S],
    ) -> Result<()> {
        if self.built {
            return Err(PipelineError::State(
                "processes cannot be added after the pipeline was built".to_string(),
            ));
        }
        let sequence = self.sequence.as_ref().ok_or_else(|| {
            PipelineError::Config("set a task sequence before adding processes".to_string())
        })?;
        self.table.add_tokens(name, tokens, sequence.len())
    }

    /// Explicit reset of the process table
    pub fn clear_processes(&mut self) {
        self.table.clear();
    }

    /// Compile into a pipeline bound to `session_name`. Fails if the session
    /// already holds saved results from an earlier build; use
    /// [`build_pipeline_forced`](Self::build_pipeline_forced) to override.
    pub fn build_pipeline(&mut self, session_name: &str, verbose: bool) -> Result<Pipeline> {
        self.build(session_name, verbose, false)
    }

    /// Compile even when the session directory already holds saved results
    pub fn build_pipeline_forced(&mut self, session_name: &str, verbose: bool) -> Result<Pipeline> {
        self.build(session_name, verbose, true)
    }

    fn build(&mut self, session_name: &str, verbose: bool, force: bool) -> Result<Pipeline> {
        if self.built {
            return Err(PipelineError::State(
                "this builder already produced a pipeline".to_string(),
            ));
        }
        let sequence = self.sequence.take().ok_or_else(|| {
            PipelineError::Config("cannot build a pipeline without a task sequence".to_string())
        })?;
        if sequence.is_empty() {
            return Err(PipelineError::Config(
                "cannot build a pipeline from an empty task sequence".to_string(),
            ));
        }
        if self.table.is_empty() {
            return Err(PipelineError::Config(
                "cannot build a pipeline with no registered processes".to_string(),
            ));
        }

        // Directive lists were validated on add; re-check in case the
        // sequence was replaced afterwards
        for name in self.table.names() {
            let process = self.table.get(name).expect("names() tracks the table");
            if process.directives.len() != sequence.len() {
                return Err(PipelineError::LengthMismatch {
                    expected: sequence.len(),
                    actual: process.directives.len(),
                });
            }
        }

        // Every stage identity must resolve to an implementation, and the
        // stage parameters must be usable before any run starts
        self.config.validate()?;
        for task in sequence.iter() {
            resolve(task, &self.config)?;
        }

        let session = match &self.session_dir {
            Some(dir) => Session::with_dir(session_name, dir.clone())?,
            None => Session::new(session_name),
        };
        if session.has_saved_results() && !force {
            return Err(PipelineError::State(format!(
                "session '{}' already holds saved results; clear it or build with force",
                session_name
            )));
        }

        self.built = true;
        info!(
            session = session_name,
            stages = sequence.len(),
            processes = self.table.len(),
            "pipeline built"
        );

        Ok(Pipeline::new(
            session,
            sequence,
            std::mem::take(&mut self.table),
            self.config.clone(),
            verbose,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_stage_builder() -> PipelineBuilder {
        let mut builder = PipelineBuilder::new();
        builder
            .set_task_sequence(
                TaskSequence::from_ids(&[
                    "kernel:linear",
                    "optimizer:rlsdual",
                    "perf:macroavg",
                ])
                .unwrap(),
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_build_requires_sequence_and_process() {
        let mut empty = PipelineBuilder::new();
        assert!(matches!(
            empty.build_pipeline("s", false),
            Err(PipelineError::Config(_))
        ));

        let mut no_process = three_stage_builder();
        assert!(matches!(
            no_process.build_pipeline("s", false),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_add_process_without_sequence_fails() {
        let mut builder = PipelineBuilder::new();
        assert!(matches!(
            builder.add_process_tokens("train", &["compute"]),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_sequence_frozen_after_build() {
        let mut builder = three_stage_builder();
        builder
            .add_process_tokens("train", &["compute", "compute", "compute"])
            .unwrap();
        builder.build_pipeline("frozen", false).unwrap();

        let err = builder
            .set_task_sequence(TaskSequence::from_ids(&["kernel:rbf"]).unwrap())
            .unwrap_err();
        assert!(matches!(err, PipelineError::State(_)));

        let err = builder.build_pipeline("again", false).unwrap_err();
        assert!(matches!(err, PipelineError::State(_)));
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let mut builder = PipelineBuilder::new().with_config(PipelineConfig {
            nlambda: 0,
            ..PipelineConfig::default()
        });
        builder
            .set_task_sequence(TaskSequence::from_ids(&["paramsel:loocvprimal"]).unwrap())
            .unwrap();
        builder.add_process_tokens("fit", &["compute"]).unwrap();
        assert!(matches!(
            builder.build_pipeline("s", false),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_stage_rejected_at_build() {
        let mut builder = PipelineBuilder::new();
        builder
            .set_task_sequence(TaskSequence::from_ids(&["kernel:hyperbolic"]).unwrap())
            .unwrap();
        builder.add_process_tokens("train", &["compute"]).unwrap();
        assert!(matches!(
            builder.build_pipeline("s", false),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_build_over_live_session_requires_force() {
        use crate::options::{StageOutput, TaskCategory};
        use ndarray::arr2;

        let dir = tempfile::tempdir().unwrap();

        // Seed the session directory with a saved blob
        let session = Session::with_dir("occupied", dir.path()).unwrap();
        session
            .save(
                TaskCategory::Pred,
                "primal",
                StageOutput::Pred {
                    scores: arr2(&[[1.0]]),
                },
            )
            .unwrap();

        let mut builder = three_stage_builder().with_session_dir(dir.path());
        builder
            .add_process_tokens("train", &["compute", "compute", "compute"])
            .unwrap();
        let err = builder.build_pipeline("occupied", false).unwrap_err();
        assert!(matches!(err, PipelineError::State(_)));

        let mut forced = {
            let mut b = PipelineBuilder::new().with_session_dir(dir.path());
            b.set_task_sequence(
                TaskSequence::from_ids(&[
                    "kernel:linear",
                    "optimizer:rlsdual",
                    "perf:macroavg",
                ])
                .unwrap(),
            )
            .unwrap();
            b.add_process_tokens("train", &["compute", "compute", "compute"])
                .unwrap();
            b
        };
        assert!(forced.build_pipeline_forced("occupied", false).is_ok());
    }
}
