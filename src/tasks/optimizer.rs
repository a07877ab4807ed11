//! RLS optimization stages: primal and dual closed-form solvers

use crate::error::{PipelineError, Result};
use crate::options::{RlsModel, StageOutput, TaskCategory};
use crate::tasks::linalg::solve_spd;
use crate::tasks::paramsel::single_lambda;
use crate::tasks::{TaskContext, TaskRunner};

/// Regularization the solver uses: paramsel's per-column lambdas collapsed
/// to their median when present, else the configured default.
fn effective_lambda(ctx: &TaskContext) -> f64 {
    match ctx.opts.paramsel_lambdas() {
        Some(lambdas) if !lambdas.is_empty() => single_lambda(lambdas),
        _ => ctx.config.default_lambda,
    }
}

/// Primal solver: W = (X^T X + n*lambda*I)^-1 X^T Y
pub struct RlsPrimal;

impl TaskRunner for RlsPrimal {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let (x, y) = (ctx.x, ctx.y);
        if x.nrows() != y.nrows() {
            return Err(PipelineError::Shape {
                expected: format!("{} label rows", x.nrows()),
                actual: format!("{}", y.nrows()),
            });
        }
        let n = x.nrows();
        let lambda = effective_lambda(ctx);

        let mut a = x.t().dot(x);
        for i in 0..a.nrows() {
            a[[i, i]] += n as f64 * lambda;
        }
        let xty = x.t().dot(y);
        let weights = solve_spd(&a, &xty).ok_or_else(|| {
            PipelineError::Data(format!(
                "primal RLS system is singular at lambda={}",
                lambda
            ))
        })?;

        Ok(StageOutput::Optimizer {
            model: RlsModel {
                weights: Some(weights),
                dual_coef: None,
                train_x: None,
                kernel: None,
                lambda,
            },
        })
    }
}

/// Dual solver: C = (K + n*lambda*I)^-1 Y, keeping the training inputs and
/// kernel so the pred stage can rebuild the cross-kernel
pub struct RlsDual;

impl TaskRunner for RlsDual {
    fn requires(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Kernel]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let (spec, k) = ctx
            .opts
            .kernel_output()
            .ok_or_else(|| PipelineError::Data("no kernel output available".to_string()))?;
        let n = ctx.y.nrows();
        if k.nrows() != n || k.ncols() != n {
            return Err(PipelineError::Shape {
                expected: format!("{}x{} kernel", n, n),
                actual: format!("{}x{}", k.nrows(), k.ncols()),
            });
        }
        let lambda = effective_lambda(ctx);

        let mut a = k.clone();
        for i in 0..n {
            a[[i, i]] += n as f64 * lambda;
        }
        let dual_coef = solve_spd(&a, ctx.y).ok_or_else(|| {
            PipelineError::Data(format!("dual RLS system is singular at lambda={}", lambda))
        })?;

        Ok(StageOutput::Optimizer {
            model: RlsModel {
                weights: None,
                dual_coef: Some(dual_coef),
                train_x: Some(ctx.x.clone()),
                kernel: Some(spec.clone()),
                lambda,
            },
        })
    }
}
