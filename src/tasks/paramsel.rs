//! Regularization parameter selection stages
//!
//! `loocvprimal` / `loocvdual` compute exact leave-one-out residuals via the
//! hat-matrix diagonal, so the full grid costs one factorization per lambda
//! rather than one per held-out sample. `hoprimal` / `hodual` use a single
//! seeded hold-out split instead.

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};
use crate::options::{StageOutput, TaskCategory};
use crate::tasks::linalg::{logspace, solve_spd, spd_inverse};
use crate::tasks::{TaskContext, TaskRunner};

/// Largest grid value: a Gershgorin bound on the spectrum of `a / n`
fn lambda_max(a: &Array2<f64>, n: usize) -> f64 {
    let bound = a
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max);
    (bound / n.max(1) as f64).max(1e-10)
}

fn lambda_grid(a: &Array2<f64>, n: usize, ctx: &TaskContext) -> Result<Vec<f64>> {
    ctx.config.validate()?;
    let hi = lambda_max(a, n);
    let lo = hi * ctx.config.lambda_min_ratio;
    Ok(logspace(lo, hi, ctx.config.nlambda))
}

fn check_rows(ctx: &TaskContext) -> Result<()> {
    if ctx.x.nrows() != ctx.y.nrows() {
        return Err(PipelineError::Shape {
            expected: format!("{} label rows", ctx.x.nrows()),
            actual: format!("{}", ctx.y.nrows()),
        });
    }
    if ctx.x.nrows() < 2 {
        return Err(PipelineError::Data(
            "parameter selection needs at least 2 samples".to_string(),
        ));
    }
    Ok(())
}

/// Track the best lambda per output column across the grid
struct BestPerColumn {
    lambdas: Vec<f64>,
    errors: Vec<f64>,
}

impl BestPerColumn {
    fn new(t: usize) -> Self {
        Self {
            lambdas: vec![0.0; t],
            errors: vec![f64::INFINITY; t],
        }
    }

    fn update(&mut self, lambda: f64, column_errors: &[f64]) {
        for (c, &err) in column_errors.iter().enumerate() {
            if err < self.errors[c] {
                self.errors[c] = err;
                self.lambdas[c] = lambda;
            }
        }
    }

    fn into_output(self) -> StageOutput {
        StageOutput::Paramsel {
            lambdas: self.lambdas,
            errors: self.errors,
        }
    }
}

/// Exact leave-one-out selection in the primal formulation
pub struct LoocvPrimal;

impl TaskRunner for LoocvPrimal {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        check_rows(ctx)?;
        let (x, y) = (ctx.x, ctx.y);
        let (n, t) = (x.nrows(), y.ncols());

        let xtx = x.t().dot(x);
        let xty = x.t().dot(y);
        let grid = lambda_grid(&xtx, n, ctx)?;
        let mut best = BestPerColumn::new(t);

        for &lambda in &grid {
            let mut a = xtx.clone();
            for i in 0..a.nrows() {
                a[[i, i]] += n as f64 * lambda;
            }
            let g = spd_inverse(&a).ok_or_else(|| {
                PipelineError::Data(format!("singular system at lambda={}", lambda))
            })?;
            let w = g.dot(&xty);
            let preds = x.dot(&w);

            // Hat diagonal h_i = x_i^T G x_i; LOO residual r_i = (y_i - p_i)/(1 - h_i)
            let mut col_errors = vec![0.0; t];
            for i in 0..n {
                let xi = x.row(i);
                let gxi = g.dot(&xi);
                let h = xi.dot(&gxi);
                let denom = (1.0 - h).abs().max(1e-12);
                for c in 0..t {
                    let r = (y[[i, c]] - preds[[i, c]]) / denom;
                    col_errors[c] += r * r;
                }
            }
            for err in col_errors.iter_mut() {
                *err /= n as f64;
            }
            best.update(lambda, &col_errors);
        }
        Ok(best.into_output())
    }
}

/// Exact leave-one-out selection in the dual formulation
pub struct LoocvDual;

impl TaskRunner for LoocvDual {
    fn requires(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Kernel]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        check_rows(ctx)?;
        let (_, k) = ctx
            .opts
            .kernel_output()
            .ok_or_else(|| PipelineError::Data("no kernel output available".to_string()))?;
        let (n, t) = (ctx.y.nrows(), ctx.y.ncols());
        if k.nrows() != n || k.ncols() != n {
            return Err(PipelineError::Shape {
                expected: format!("{}x{} kernel", n, n),
                actual: format!("{}x{}", k.nrows(), k.ncols()),
            });
        }

        let grid = lambda_grid(k, n, ctx)?;
        let mut best = BestPerColumn::new(t);

        for &lambda in &grid {
            let mut a = k.clone();
            for i in 0..n {
                a[[i, i]] += n as f64 * lambda;
            }
            let g = spd_inverse(&a).ok_or_else(|| {
                PipelineError::Data(format!("singular system at lambda={}", lambda))
            })?;
            let c_mat = g.dot(ctx.y);

            // LOO residual r_i = c_i / G_ii
            let mut col_errors = vec![0.0; t];
            for i in 0..n {
                let denom = g[[i, i]].abs().max(1e-12);
                for c in 0..t {
                    let r = c_mat[[i, c]] / denom;
                    col_errors[c] += r * r;
                }
            }
            for err in col_errors.iter_mut() {
                *err /= n as f64;
            }
            best.update(lambda, &col_errors);
        }
        Ok(best.into_output())
    }
}

/// Shuffled (train, validation) index split
fn holdout_split(n: usize, ctx: &TaskContext) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_val = ((n as f64 * ctx.config.holdout_fraction).round() as usize).clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = match ctx.config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    indices.shuffle(&mut rng);
    let val = indices[..n_val].to_vec();
    let train = indices[n_val..].to_vec();
    Ok((train, val))
}

fn take_rows(m: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    m.select(Axis(0), rows)
}

/// Mean squared validation error per output column
fn column_mse(truth: &Array2<f64>, preds: &Array2<f64>) -> Vec<f64> {
    let n = truth.nrows().max(1);
    (0..truth.ncols())
        .map(|c| {
            let mut sum = 0.0;
            for i in 0..truth.nrows() {
                let r = truth[[i, c]] - preds[[i, c]];
                sum += r * r;
            }
            sum / n as f64
        })
        .collect()
}

/// Hold-out selection in the primal formulation
pub struct HoldoutPrimal;

impl TaskRunner for HoldoutPrimal {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        check_rows(ctx)?;
        let (train, val) = holdout_split(ctx.x.nrows(), ctx)?;
        let (x_tr, y_tr) = (take_rows(ctx.x, &train), take_rows(ctx.y, &train));
        let (x_val, y_val) = (take_rows(ctx.x, &val), take_rows(ctx.y, &val));

        let xtx = x_tr.t().dot(&x_tr);
        let xty = x_tr.t().dot(&y_tr);
        let grid = lambda_grid(&xtx, x_tr.nrows(), ctx)?;
        let mut best = BestPerColumn::new(ctx.y.ncols());

        for &lambda in &grid {
            let mut a = xtx.clone();
            for i in 0..a.nrows() {
                a[[i, i]] += x_tr.nrows() as f64 * lambda;
            }
            let w = solve_spd(&a, &xty).ok_or_else(|| {
                PipelineError::Data(format!("singular system at lambda={}", lambda))
            })?;
            let preds = x_val.dot(&w);
            best.update(lambda, &column_mse(&y_val, &preds));
        }
        Ok(best.into_output())
    }
}

/// Hold-out selection in the dual formulation
pub struct HoldoutDual;

impl TaskRunner for HoldoutDual {
    fn requires(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Kernel]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        check_rows(ctx)?;
        let (_, k) = ctx
            .opts
            .kernel_output()
            .ok_or_else(|| PipelineError::Data("no kernel output available".to_string()))?;
        let n = ctx.y.nrows();
        if k.nrows() != n {
            return Err(PipelineError::Shape {
                expected: format!("{}x{} kernel", n, n),
                actual: format!("{}x{}", k.nrows(), k.ncols()),
            });
        }

        let (train, val) = holdout_split(n, ctx)?;
        let k_tr = k.select(Axis(0), &train).select(Axis(1), &train);
        let k_val = k.select(Axis(0), &val).select(Axis(1), &train);
        let y_tr = take_rows(ctx.y, &train);
        let y_val = take_rows(ctx.y, &val);

        let grid = lambda_grid(&k_tr, train.len(), ctx)?;
        let mut best = BestPerColumn::new(ctx.y.ncols());

        for &lambda in &grid {
            let mut a = k_tr.clone();
            for i in 0..a.nrows() {
                a[[i, i]] += train.len() as f64 * lambda;
            }
            let coef = solve_spd(&a, &y_tr).ok_or_else(|| {
                PipelineError::Data(format!("singular system at lambda={}", lambda))
            })?;
            let preds = k_val.dot(&coef);
            best.update(lambda, &column_mse(&y_val, &preds));
        }
        Ok(best.into_output())
    }
}

/// Median of the per-column lambdas: the single value the optimizer solves
/// with (one factorization per run)
pub fn single_lambda(lambdas: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = lambdas.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}
