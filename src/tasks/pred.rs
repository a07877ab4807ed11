//! Prediction stages
//!
//! `pred:primal` multiplies the run's inputs by the trained weight matrix;
//! `pred:dual` rebuilds the cross-kernel between the run's inputs and the
//! stored training inputs and applies the dual coefficients.

use crate::error::{PipelineError, Result};
use crate::options::{StageOutput, TaskCategory};
use crate::tasks::{TaskContext, TaskRunner};

/// Primal prediction: scores = X * W
pub struct PredPrimal;

impl TaskRunner for PredPrimal {
    fn requires(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Optimizer]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let model = ctx
            .opts
            .optimizer_model()
            .ok_or_else(|| PipelineError::Data("no trained model available".to_string()))?;
        let weights = model.weights.as_ref().ok_or_else(|| {
            PipelineError::Data("trained model has no primal weights; use pred:dual".to_string())
        })?;
        if ctx.x.ncols() != weights.nrows() {
            return Err(PipelineError::Shape {
                expected: format!("{} feature columns", weights.nrows()),
                actual: format!("{}", ctx.x.ncols()),
            });
        }
        Ok(StageOutput::Pred {
            scores: ctx.x.dot(weights),
        })
    }
}

/// Dual prediction: scores = K(X, X_train) * C
pub struct PredDual;

impl TaskRunner for PredDual {
    fn requires(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Optimizer]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let model = ctx
            .opts
            .optimizer_model()
            .ok_or_else(|| PipelineError::Data("no trained model available".to_string()))?;
        let (coef, train_x, kernel) = match (&model.dual_coef, &model.train_x, &model.kernel) {
            (Some(c), Some(x), Some(k)) => (c, x, k),
            _ => {
                return Err(PipelineError::Data(
                    "trained model has no dual coefficients; use pred:primal".to_string(),
                ))
            }
        };
        if ctx.x.ncols() != train_x.ncols() {
            return Err(PipelineError::Shape {
                expected: format!("{} feature columns", train_x.ncols()),
                actual: format!("{}", ctx.x.ncols()),
            });
        }
        let cross = kernel.cross(ctx.x, train_x);
        Ok(StageOutput::Pred {
            scores: cross.dot(coef),
        })
    }
}
