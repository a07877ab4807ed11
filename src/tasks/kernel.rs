//! Kernel computation stages
//!
//! Builds the training Gram matrix for the dual RLS path. The cross-kernel
//! between test and training inputs is recomputed at prediction time from
//! the same [`KernelSpec`].

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::options::{StageOutput, TaskCategory};
use crate::tasks::{TaskContext, TaskRunner};

/// Kernel function description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelSpec {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = exp(-γ * ||x - y||²)
    Rbf { gamma: f64 },
    /// K(x, y) = (γ * x · y + c)^d
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
}

impl KernelSpec {
    /// Gram matrix over the rows of `x` (n x n)
    pub fn gram(&self, x: &Array2<f64>) -> Array2<f64> {
        self.cross(x, x)
    }

    /// Kernel matrix between the rows of `a` and the rows of `b`
    /// (a.nrows() x b.nrows())
    pub fn cross(&self, a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
        let dots = a.dot(&b.t());
        match self {
            KernelSpec::Linear => dots,
            KernelSpec::Polynomial {
                degree,
                gamma,
                coef0,
            } => dots.mapv(|d| (gamma * d + coef0).powi(*degree as i32)),
            KernelSpec::Rbf { gamma } => {
                let a_norms: Array1<f64> =
                    a.map_axis(Axis(1), |row| row.iter().map(|v| v * v).sum());
                let b_norms: Array1<f64> =
                    b.map_axis(Axis(1), |row| row.iter().map(|v| v * v).sum());
                let (n, m) = (a.nrows(), b.nrows());
                let gamma = *gamma;

                let rows: Vec<Vec<f64>> = (0..n)
                    .into_par_iter()
                    .map(|i| {
                        (0..m)
                            .map(|j| {
                                let sq_dist =
                                    (a_norms[i] + b_norms[j] - 2.0 * dots[[i, j]]).max(0.0);
                                (-gamma * sq_dist).exp()
                            })
                            .collect()
                    })
                    .collect();

                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                Array2::from_shape_vec((n, m), flat)
                    .expect("row-major kernel buffer matches (n, m)")
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KernelSpec::Linear => "linear",
            KernelSpec::Rbf { .. } => "rbf",
            KernelSpec::Polynomial { .. } => "poly",
        }
    }
}

/// Stage runner computing the training Gram matrix
pub struct KernelTask {
    spec: KernelSpec,
}

impl KernelTask {
    pub fn new(spec: KernelSpec) -> Self {
        Self { spec }
    }
}

impl TaskRunner for KernelTask {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        if ctx.x.nrows() == 0 {
            return Err(PipelineError::Data(
                "kernel stage received an empty input matrix".to_string(),
            ));
        }
        let matrix = self.spec.gram(ctx.x);
        Ok(StageOutput::Kernel {
            spec: self.spec.clone(),
            matrix,
        })
    }
}
