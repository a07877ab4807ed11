//! Shared option structure: typed per-category stage outputs
//!
//! Every stage writes its output into an [`OptionStore`] keyed by
//! (category, stage name). The store is the only channel of inter-stage
//! communication during a run and the only channel for post-run result
//! queries by the caller. Absent entries are distinguishable from
//! populated-but-zero results: a stage that never ran leaves no entry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::tasks::kernel::KernelSpec;

/// Semantic slot of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskCategory {
    /// Kernel (Gram matrix) computation
    Kernel,
    /// Regularization parameter selection
    Paramsel,
    /// RLS optimization (primal or dual)
    Optimizer,
    /// Prediction on new inputs
    Pred,
    /// Performance evaluation
    Perf,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 5] = [
        TaskCategory::Kernel,
        TaskCategory::Paramsel,
        TaskCategory::Optimizer,
        TaskCategory::Pred,
        TaskCategory::Perf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Kernel => "kernel",
            TaskCategory::Paramsel => "paramsel",
            TaskCategory::Optimizer => "optimizer",
            TaskCategory::Pred => "pred",
            TaskCategory::Perf => "perf",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kernel" => Ok(TaskCategory::Kernel),
            "paramsel" => Ok(TaskCategory::Paramsel),
            "optimizer" => Ok(TaskCategory::Optimizer),
            "pred" => Ok(TaskCategory::Pred),
            "perf" => Ok(TaskCategory::Perf),
            other => Err(PipelineError::Config(format!(
                "unknown task category '{}'",
                other
            ))),
        }
    }
}

/// A trained RLS model, primal or dual form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsModel {
    /// Primal weight matrix (d x T)
    pub weights: Option<Array2<f64>>,
    /// Dual coefficient matrix (n x T)
    pub dual_coef: Option<Array2<f64>>,
    /// Training inputs retained for dual prediction
    pub train_x: Option<Array2<f64>>,
    /// Kernel used at training time (dual only)
    pub kernel: Option<KernelSpec>,
    /// Regularization parameter the solver used
    pub lambda: f64,
}

/// Output of a single executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageOutput {
    /// Training Gram matrix and the kernel that produced it
    Kernel {
        spec: KernelSpec,
        matrix: Array2<f64>,
    },
    /// Chosen regularization parameter per output column, with the
    /// cross-validation error achieved at that parameter
    Paramsel { lambdas: Vec<f64>, errors: Vec<f64> },
    /// Trained model
    Optimizer { model: RlsModel },
    /// Score matrix for the prediction inputs (n_test x T)
    Pred { scores: Array2<f64> },
    /// Named metric vectors (per class), single-element for macro averages
    Perf { metrics: BTreeMap<String, Vec<f64>> },
}

impl StageOutput {
    /// Category this output belongs to
    pub fn category(&self) -> TaskCategory {
        match self {
            StageOutput::Kernel { .. } => TaskCategory::Kernel,
            StageOutput::Paramsel { .. } => TaskCategory::Paramsel,
            StageOutput::Optimizer { .. } => TaskCategory::Optimizer,
            StageOutput::Pred { .. } => TaskCategory::Pred,
            StageOutput::Perf { .. } => TaskCategory::Perf,
        }
    }

    /// Look up a named field on this output
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            StageOutput::Kernel { matrix, .. } => match name {
                "K" | "matrix" => Some(FieldValue::Matrix(matrix.clone())),
                _ => None,
            },
            StageOutput::Paramsel { lambdas, errors } => match name {
                "lambdas" => Some(FieldValue::Vector(lambdas.clone())),
                "errors" => Some(FieldValue::Vector(errors.clone())),
                _ => None,
            },
            StageOutput::Optimizer { model } => match name {
                "W" | "weights" => model.weights.clone().map(FieldValue::Matrix),
                "C" | "dual_coef" => model.dual_coef.clone().map(FieldValue::Matrix),
                "lambda" => Some(FieldValue::Scalar(model.lambda)),
                _ => None,
            },
            StageOutput::Pred { scores } => match name {
                "pred" | "scores" => Some(FieldValue::Matrix(scores.clone())),
                _ => None,
            },
            StageOutput::Perf { metrics } => metrics.get(name).map(|v| {
                if v.len() == 1 {
                    FieldValue::Scalar(v[0])
                } else {
                    FieldValue::Vector(v.clone())
                }
            }),
        }
    }
}

/// Value returned by a field query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Array2<f64>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FieldValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            FieldValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Array2<f64>> {
        match self {
            FieldValue::Matrix(m) => Some(m),
            _ => None,
        }
    }
}

/// Accumulating per-run / per-session result store: category -> stage name
/// -> output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionStore {
    map: HashMap<TaskCategory, BTreeMap<String, StageOutput>>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the output for (category, stage name)
    pub fn insert(&mut self, category: TaskCategory, name: &str, output: StageOutput) {
        self.map
            .entry(category)
            .or_default()
            .insert(name.to_string(), output);
    }

    pub fn get(&self, category: TaskCategory, name: &str) -> Option<&StageOutput> {
        self.map.get(&category).and_then(|m| m.get(name))
    }

    /// Whether any stage of the given category has produced output
    pub fn contains_category(&self, category: TaskCategory) -> bool {
        self.map.get(&category).is_some_and(|m| !m.is_empty())
    }

    /// First output registered under the given category, in stage-name order
    pub fn first_of(&self, category: TaskCategory) -> Option<&StageOutput> {
        self.map.get(&category).and_then(|m| m.values().next())
    }

    /// Query a named field within a category, searching every stage that
    /// wrote to it. Fails if the field was never populated.
    pub fn field(&self, category: TaskCategory, field: &str) -> Result<FieldValue> {
        if let Some(entries) = self.map.get(&category) {
            for output in entries.values() {
                if let Some(value) = output.field(field) {
                    return Ok(value);
                }
            }
        }
        Err(PipelineError::FieldNotFound {
            category: category.to_string(),
            field: field.to_string(),
        })
    }

    /// Kernel spec and Gram matrix, if a kernel stage has run
    pub fn kernel_output(&self) -> Option<(&KernelSpec, &Array2<f64>)> {
        match self.first_of(TaskCategory::Kernel) {
            Some(StageOutput::Kernel { spec, matrix }) => Some((spec, matrix)),
            _ => None,
        }
    }

    /// Selected regularization parameters, if a paramsel stage has run
    pub fn paramsel_lambdas(&self) -> Option<&[f64]> {
        match self.first_of(TaskCategory::Paramsel) {
            Some(StageOutput::Paramsel { lambdas, .. }) => Some(lambdas),
            _ => None,
        }
    }

    /// Trained model, if an optimizer stage has run
    pub fn optimizer_model(&self) -> Option<&RlsModel> {
        match self.first_of(TaskCategory::Optimizer) {
            Some(StageOutput::Optimizer { model }) => Some(model),
            _ => None,
        }
    }

    /// Prediction scores, if a pred stage has run
    pub fn pred_scores(&self) -> Option<&Array2<f64>> {
        match self.first_of(TaskCategory::Pred) {
            Some(StageOutput::Pred { scores }) => Some(scores),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.values().all(|m| m.is_empty())
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_category_roundtrip() {
        for cat in TaskCategory::ALL {
            assert_eq!(cat.as_str().parse::<TaskCategory>().unwrap(), cat);
        }
        assert!("frobnicate".parse::<TaskCategory>().is_err());
    }

    #[test]
    fn test_field_lookup() {
        let mut store = OptionStore::new();
        store.insert(
            TaskCategory::Pred,
            "primal",
            StageOutput::Pred {
                scores: arr2(&[[1.0, -1.0], [0.5, 0.5]]),
            },
        );

        let value = store.field(TaskCategory::Pred, "pred").unwrap();
        assert_eq!(value.as_matrix().unwrap().nrows(), 2);
    }

    #[test]
    fn test_field_not_found() {
        let store = OptionStore::new();
        let err = store.field(TaskCategory::Perf, "acc").unwrap_err();
        assert!(matches!(err, PipelineError::FieldNotFound { .. }));
    }

    #[test]
    fn test_perf_scalar_field() {
        let mut metrics = BTreeMap::new();
        metrics.insert("acc".to_string(), vec![0.9, 0.8]);
        metrics.insert("acc_avg".to_string(), vec![0.85]);

        let mut store = OptionStore::new();
        store.insert(
            TaskCategory::Perf,
            "macroavg",
            StageOutput::Perf { metrics },
        );

        assert_eq!(
            store
                .field(TaskCategory::Perf, "acc_avg")
                .unwrap()
                .as_scalar(),
            Some(0.85)
        );
        assert_eq!(
            store
                .field(TaskCategory::Perf, "acc")
                .unwrap()
                .as_vector()
                .unwrap()
                .len(),
            2
        );
    }
}
