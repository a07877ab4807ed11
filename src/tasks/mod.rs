//! Pipeline stages: identities, dispatch and execution strategies
//!
//! A stage is a (category, name) pair such as `kernel:rbf` or
//! `optimizer:rlsprimal`. The registry in [`resolve`] maps each pair to its
//! execution strategy; unknown pairs are configuration errors.

pub mod kernel;
pub mod linalg;
pub mod optimizer;
pub mod paramsel;
pub mod perf;
pub mod pred;

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::options::{OptionStore, StageOutput, TaskCategory};
use kernel::KernelSpec;

/// One named step of a pipeline: (category, algorithm name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub category: TaskCategory,
    pub name: String,
}

impl Task {
    pub fn new(category: TaskCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }

    /// Stable identity string, e.g. `kernel:linear`
    pub fn id(&self) -> String {
        format!("{}:{}", self.category, self.name)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

impl FromStr for Task {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let (cat, name) = s.split_once(':').ok_or_else(|| {
            PipelineError::Config(format!(
                "task '{}' is not of the form <category>:<name>",
                s
            ))
        })?;
        if name.is_empty() {
            return Err(PipelineError::Config(format!(
                "task '{}' has an empty name",
                s
            )));
        }
        Ok(Task::new(cat.parse()?, name))
    }
}

/// Tunable parameters shared by the stage implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of points in the regularization grid
    pub nlambda: usize,
    /// Ratio of the smallest to the largest grid value
    pub lambda_min_ratio: f64,
    /// Regularization used by the optimizer when no paramsel stage ran
    pub default_lambda: f64,
    /// Fraction of samples held out by the `ho*` paramsel variants
    pub holdout_fraction: f64,
    /// Seed for the hold-out shuffle
    pub seed: Option<u64>,
    /// RBF kernel width
    pub rbf_gamma: f64,
    /// Polynomial kernel parameters
    pub poly_degree: u32,
    pub poly_gamma: f64,
    pub poly_coef0: f64,
}

impl PipelineConfig {
    /// Reject values the selection stages cannot form a grid or split from
    pub fn validate(&self) -> Result<()> {
        if self.nlambda == 0 {
            return Err(PipelineError::Config(
                "nlambda must be at least 1".to_string(),
            ));
        }
        if !self.lambda_min_ratio.is_finite() || self.lambda_min_ratio <= 0.0 {
            return Err(PipelineError::Config(format!(
                "lambda_min_ratio must be positive and finite, got {}",
                self.lambda_min_ratio
            )));
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nlambda: 20,
            lambda_min_ratio: 1e-6,
            default_lambda: 1e-4,
            holdout_fraction: 0.2,
            seed: Some(42),
            rbf_gamma: 1.0,
            poly_degree: 3,
            poly_gamma: 1.0,
            poly_coef0: 1.0,
        }
    }
}

/// Inputs visible to a stage while it executes
pub struct TaskContext<'a> {
    /// Input (feature) matrix of the current run, n x d
    pub x: &'a Array2<f64>,
    /// Output (target) matrix of the current run, n x T
    pub y: &'a Array2<f64>,
    /// Outputs of the stages that already ran (or were loaded) in this run
    pub opts: &'a OptionStore,
    pub config: &'a PipelineConfig,
}

/// Execution strategy for one stage identity
pub trait TaskRunner {
    /// Categories whose output must all be present before this stage can run
    fn requires(&self) -> &'static [TaskCategory];

    /// Categories of which at least one must be present (empty = no such
    /// constraint). Used by perf stages, which score from either a pred
    /// stage's output or directly from the trained model.
    fn requires_any(&self) -> &'static [TaskCategory] {
        &[]
    }

    /// Execute the stage against the current context
    fn run(&self, ctx: &TaskContext) -> Result<StageOutput>;
}

/// Map a (category, name) pair to its execution strategy
pub fn resolve(task: &Task, config: &PipelineConfig) -> Result<Box<dyn TaskRunner>> {
    use TaskCategory::*;

    let runner: Box<dyn TaskRunner> = match (task.category, task.name.as_str()) {
        (Kernel, "linear") => Box::new(kernel::KernelTask::new(KernelSpec::Linear)),
        (Kernel, "rbf") => Box::new(kernel::KernelTask::new(KernelSpec::Rbf {
            gamma: config.rbf_gamma,
        })),
        (Kernel, "poly") => Box::new(kernel::KernelTask::new(KernelSpec::Polynomial {
            degree: config.poly_degree,
            gamma: config.poly_gamma,
            coef0: config.poly_coef0,
        })),
        (Paramsel, "loocvprimal") => Box::new(paramsel::LoocvPrimal),
        (Paramsel, "loocvdual") => Box::new(paramsel::LoocvDual),
        (Paramsel, "hoprimal") => Box::new(paramsel::HoldoutPrimal),
        (Paramsel, "hodual") => Box::new(paramsel::HoldoutDual),
        (Optimizer, "rlsprimal") => Box::new(optimizer::RlsPrimal),
        (Optimizer, "rlsdual") => Box::new(optimizer::RlsDual),
        (Pred, "primal") => Box::new(pred::PredPrimal),
        (Pred, "dual") => Box::new(pred::PredDual),
        (Perf, "macroavg") => Box::new(perf::MacroAvg),
        (Perf, "precrec") => Box::new(perf::PrecRec),
        (category, name) => {
            return Err(PipelineError::Config(format!(
                "no stage implementation registered for {}:{}",
                category, name
            )))
        }
    };
    Ok(runner)
}
