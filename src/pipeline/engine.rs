//! Execution engine: runs named processes against named datasets
//!
//! Stages execute strictly in sequence order; each stage may consume the
//! output of the stages before it, threaded through the run's working
//! option store. Failures abort the remaining stages and keep whatever the
//! completed stages already wrote (no rollback).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::DatasetRegistry;
use crate::error::{PipelineError, Result};
use crate::options::{FieldValue, OptionStore, TaskCategory};
use crate::pipeline::process::{Directive, ProcessTable};
use crate::pipeline::sequence::TaskSequence;
use crate::session::Session;
use crate::tasks::{resolve, PipelineConfig, Task, TaskContext};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Executing(usize),
    Completed,
    Failed,
}

/// What happened at one stage position during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAction {
    pub stage: String,
    pub directive: Directive,
    /// Whether the stage's algorithm actually executed (false for
    /// ignore/load and for stages after a failure)
    pub executed: bool,
}

/// Timestamped record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub process: String,
    pub input_dataset: String,
    pub output_dataset: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageAction>,
    pub failure: Option<String>,
}

/// A compiled pipeline: frozen stage sequence and process table bound to a
/// session, plus the dataset registry and the shared option structure the
/// caller queries after runs.
#[derive(Debug)]
pub struct Pipeline {
    session: Session,
    sequence: TaskSequence,
    table: ProcessTable,
    config: PipelineConfig,
    verbose: bool,
    datasets: DatasetRegistry,
    options: OptionStore,
    execution_counts: HashMap<String, usize>,
    history: Vec<RunRecord>,
}

impl Pipeline {
    pub(crate) fn new(
        session: Session,
        sequence: TaskSequence,
        table: ProcessTable,
        config: PipelineConfig,
        verbose: bool,
    ) -> Self {
        Self {
            session,
            sequence,
            table,
            config,
            verbose,
            datasets: DatasetRegistry::new(),
            options: OptionStore::new(),
            execution_counts: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Register an in-memory dataset. Duplicate names overwrite.
    pub fn add_matrix(&mut self, name: impl Into<String>, matrix: Array2<f64>) {
        self.datasets.add_matrix(name, matrix);
    }

    /// Register a dataset from a headerless delimited numeric file
    pub fn add_csv(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        separator: u8,
    ) -> Result<()> {
        self.datasets.add_csv(name, path, separator)
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sequence(&self) -> &TaskSequence {
        &self.sequence
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Shared option structure accumulated across runs
    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    /// Query a named result field. Idempotent across repeated queries.
    pub fn option_field(&self, category: TaskCategory, field: &str) -> Result<FieldValue> {
        self.options.field(category, field)
    }

    /// Number of times the stage's algorithm actually executed in this
    /// pipeline (instrumentation; load/ignore do not count)
    pub fn execution_count(&self, category: TaskCategory, name: &str) -> usize {
        let id = format!("{}:{}", category, name);
        self.execution_counts.get(&id).copied().unwrap_or(0)
    }

    /// Execute the named process against the named (input, output) dataset
    /// pair. Stages run strictly in sequence order under the process's
    /// directives.
    pub fn run(&mut self, input: &str, output: &str, process: &str) -> Result<()> {
        let directives = self
            .table
            .get(process)
            .ok_or_else(|| {
                PipelineError::Config(format!("process '{}' is not registered", process))
            })?
            .directives
            .clone();
        let tasks: Vec<Task> = self.sequence.tasks().to_vec();

        // The engine works on its own copies; registered matrices are
        // never mutated.
        let x = self.datasets.get(input)?.clone();
        let y = self.datasets.get(output)?.clone();

        let mut record = RunRecord {
            process: process.to_string(),
            input_dataset: input.to_string(),
            output_dataset: output.to_string(),
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::with_capacity(tasks.len()),
            failure: None,
        };
        info!(process, input, output, "run started");

        // Fresh working store per run: compute results never leak across
        // runs, only the session store does (via computeNsave/load).
        let mut working = OptionStore::new();

        for (i, (task, directive)) in tasks.iter().zip(directives.iter()).enumerate() {
            record.state = RunState::Executing(i);
            if self.verbose {
                info!(stage = %task, %directive, position = i, "executing stage");
            } else {
                debug!(stage = %task, %directive, position = i, "executing stage");
            }

            let step = self.run_stage(task, *directive, &x, &y, &mut working);
            match step {
                Ok(executed) => {
                    record.stages.push(StageAction {
                        stage: task.id(),
                        directive: *directive,
                        executed,
                    });
                }
                Err(err) => {
                    warn!(stage = %task, error = %err, "stage failed; aborting run");
                    record.stages.push(StageAction {
                        stage: task.id(),
                        directive: *directive,
                        executed: false,
                    });
                    record.state = RunState::Failed;
                    record.failure = Some(err.to_string());
                    record.finished_at = Some(Utc::now());
                    self.history.push(record);
                    return Err(err);
                }
            }
        }

        record.state = RunState::Completed;
        record.finished_at = Some(Utc::now());
        info!(process, "run completed");
        self.history.push(record);
        Ok(())
    }

    /// Returns whether the stage's algorithm actually executed
    fn run_stage(
        &mut self,
        task: &Task,
        directive: Directive,
        x: &Array2<f64>,
        y: &Array2<f64>,
        working: &mut OptionStore,
    ) -> Result<bool> {
        match directive {
            Directive::Ignore => Ok(false),
            Directive::Load => {
                let saved = self.session.load(task.category, &task.name)?;
                working.insert(task.category, &task.name, saved.output.clone());
                self.options.insert(task.category, &task.name, saved.output);
                Ok(false)
            }
            Directive::Compute | Directive::ComputeAndSave => {
                let runner = resolve(task, &self.config)?;

                for required in runner.requires() {
                    if !working.contains_category(*required) {
                        return Err(PipelineError::MissingDependency {
                            stage: task.id(),
                            requires: required.to_string(),
                        });
                    }
                }
                let alternatives = runner.requires_any();
                if !alternatives.is_empty()
                    && !alternatives.iter().any(|c| working.contains_category(*c))
                {
                    let requires = alternatives
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(PipelineError::MissingDependency {
                        stage: task.id(),
                        requires,
                    });
                }

                let ctx = TaskContext {
                    x,
                    y,
                    opts: working,
                    config: &self.config,
                };
                let output = runner.run(&ctx).map_err(|err| match err {
                    err @ PipelineError::MissingDependency { .. } => err,
                    other => PipelineError::Stage {
                        stage: task.id(),
                        message: other.to_string(),
                    },
                })?;

                *self.execution_counts.entry(task.id()).or_insert(0) += 1;

                if directive == Directive::ComputeAndSave {
                    self.session
                        .save(task.category, &task.name, output.clone())?;
                }
                working.insert(task.category, &task.name, output.clone());
                self.options.insert(task.category, &task.name, output);
                Ok(true)
            }
        }
    }
}
