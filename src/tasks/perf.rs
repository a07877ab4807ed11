//! Performance evaluation stages
//!
//! Targets use the ±1 one-vs-all coding (see [`crate::dataset::one_vs_all`]):
//! with T > 1 output columns the class is the argmax column, with a single
//! column the class is the sign of the score.
//!
//! Scores come from a pred stage when one ran in the current run; otherwise
//! they are derived directly from the trained model on the run's inputs, so
//! a sequence without an explicit pred stage can still end in perf.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{PipelineError, Result};
use crate::options::{StageOutput, TaskCategory};
use crate::tasks::{TaskContext, TaskRunner};

/// Decode class indices from a score or target matrix
fn decode_classes(m: &Array2<f64>) -> Vec<usize> {
    if m.ncols() == 1 {
        // Binary: class 0 is the positive class
        m.column(0)
            .iter()
            .map(|&v| if v >= 0.0 { 0 } else { 1 })
            .collect()
    } else {
        m.rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }
}

fn n_classes(y: &Array2<f64>) -> usize {
    if y.ncols() == 1 {
        2
    } else {
        y.ncols()
    }
}

/// Scores for the current run: a pred stage's output if present, else
/// computed from the trained model on the run's inputs
fn scores_for_run(ctx: &TaskContext) -> Result<Array2<f64>> {
    if let Some(scores) = ctx.opts.pred_scores() {
        return Ok(scores.clone());
    }
    let model = ctx.opts.optimizer_model().ok_or_else(|| {
        PipelineError::Data("no prediction scores or trained model available".to_string())
    })?;
    if let Some(weights) = &model.weights {
        return Ok(ctx.x.dot(weights));
    }
    if let (Some(coef), Some(train_x), Some(kernel)) =
        (&model.dual_coef, &model.train_x, &model.kernel)
    {
        return Ok(kernel.cross(ctx.x, train_x).dot(coef));
    }
    Err(PipelineError::Data(
        "trained model holds neither primal weights nor dual coefficients".to_string(),
    ))
}

fn classes_for_run(ctx: &TaskContext) -> Result<(Vec<usize>, Vec<usize>, usize)> {
    let scores = scores_for_run(ctx)?;
    if scores.nrows() != ctx.y.nrows() {
        return Err(PipelineError::Shape {
            expected: format!("{} prediction rows", ctx.y.nrows()),
            actual: format!("{}", scores.nrows()),
        });
    }
    // A model trained against a wider one-vs-all coding emits class indices
    // the target matrix cannot represent
    let k = n_classes(ctx.y);
    if n_classes(&scores) != k {
        return Err(PipelineError::Shape {
            expected: format!("scores over {} classes", k),
            actual: format!("{} classes", n_classes(&scores)),
        });
    }
    Ok((decode_classes(&scores), decode_classes(ctx.y), k))
}

fn mean_of_observed(values: &[f64]) -> f64 {
    let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        0.0
    } else {
        observed.iter().sum::<f64>() / observed.len() as f64
    }
}

/// Per-class accuracy with its macro average
pub struct MacroAvg;

impl TaskRunner for MacroAvg {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn requires_any(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Pred, TaskCategory::Optimizer]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let (predicted, truth, k) = classes_for_run(ctx)?;

        let mut correct = vec![0usize; k];
        let mut total = vec![0usize; k];
        for (&p, &t) in predicted.iter().zip(truth.iter()) {
            total[t] += 1;
            if p == t {
                correct[t] += 1;
            }
        }

        let acc: Vec<f64> = correct
            .iter()
            .zip(total.iter())
            .map(|(&c, &t)| if t > 0 { c as f64 / t as f64 } else { f64::NAN })
            .collect();

        let mut metrics = BTreeMap::new();
        metrics.insert("acc_avg".to_string(), vec![mean_of_observed(&acc)]);
        metrics.insert("acc".to_string(), acc);
        Ok(StageOutput::Perf { metrics })
    }
}

/// Per-class precision, recall and F1 with macro averages
pub struct PrecRec;

impl TaskRunner for PrecRec {
    fn requires(&self) -> &'static [TaskCategory] {
        &[]
    }

    fn requires_any(&self) -> &'static [TaskCategory] {
        &[TaskCategory::Pred, TaskCategory::Optimizer]
    }

    fn run(&self, ctx: &TaskContext) -> Result<StageOutput> {
        let (predicted, truth, k) = classes_for_run(ctx)?;

        let mut tp = vec![0usize; k];
        let mut fp = vec![0usize; k];
        let mut fn_ = vec![0usize; k];
        for (&p, &t) in predicted.iter().zip(truth.iter()) {
            if p == t {
                tp[t] += 1;
            } else {
                fp[p] += 1;
                fn_[t] += 1;
            }
        }

        let mut precision = Vec::with_capacity(k);
        let mut recall = Vec::with_capacity(k);
        let mut f1 = Vec::with_capacity(k);
        for c in 0..k {
            let p = if tp[c] + fp[c] > 0 {
                tp[c] as f64 / (tp[c] + fp[c]) as f64
            } else {
                f64::NAN
            };
            let r = if tp[c] + fn_[c] > 0 {
                tp[c] as f64 / (tp[c] + fn_[c]) as f64
            } else {
                f64::NAN
            };
            let f = if p.is_nan() || r.is_nan() || p + r == 0.0 {
                f64::NAN
            } else {
                2.0 * p * r / (p + r)
            };
            precision.push(p);
            recall.push(r);
            f1.push(f);
        }

        let mut metrics = BTreeMap::new();
        metrics.insert(
            "precision_avg".to_string(),
            vec![mean_of_observed(&precision)],
        );
        metrics.insert("recall_avg".to_string(), vec![mean_of_observed(&recall)]);
        metrics.insert("f1_avg".to_string(), vec![mean_of_observed(&f1)]);
        metrics.insert("precision".to_string(), precision);
        metrics.insert("recall".to_string(), recall);
        metrics.insert("f1".to_string(), f1);
        Ok(StageOutput::Perf { metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionStore;
    use crate::tasks::PipelineConfig;
    use ndarray::arr2;

    fn ctx_with_scores<'a>(
        scores: Array2<f64>,
        x: &'a Array2<f64>,
        y: &'a Array2<f64>,
        opts: &'a mut OptionStore,
        config: &'a PipelineConfig,
    ) -> TaskContext<'a> {
        opts.insert(TaskCategory::Pred, "primal", StageOutput::Pred { scores });
        TaskContext {
            x,
            y,
            opts,
            config,
        }
    }

    #[test]
    fn test_macroavg_perfect_predictions() {
        let x = arr2(&[[0.0], [0.0], [0.0], [0.0]]);
        let y = arr2(&[[1.0], [1.0], [-1.0], [-1.0]]);
        let scores = arr2(&[[0.9], [0.4], [-0.2], [-1.5]]);
        let mut opts = OptionStore::new();
        let config = PipelineConfig::default();
        let ctx = ctx_with_scores(scores, &x, &y, &mut opts, &config);

        match MacroAvg.run(&ctx).unwrap() {
            StageOutput::Perf { metrics } => {
                assert_eq!(metrics["acc"], vec![1.0, 1.0]);
                assert_eq!(metrics["acc_avg"], vec![1.0]);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_macroavg_multiclass_argmax() {
        let x = arr2(&[[0.0], [0.0], [0.0]]);
        // Three classes, one sample each; last one misclassified
        let y = arr2(&[[1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [-1.0, -1.0, 1.0]]);
        let scores = arr2(&[[0.8, 0.1, 0.1], [0.0, 0.9, 0.2], [0.7, 0.2, 0.1]]);
        let mut opts = OptionStore::new();
        let config = PipelineConfig::default();
        let ctx = ctx_with_scores(scores, &x, &y, &mut opts, &config);

        match MacroAvg.run(&ctx).unwrap() {
            StageOutput::Perf { metrics } => {
                assert_eq!(metrics["acc"], vec![1.0, 1.0, 0.0]);
                assert!((metrics["acc_avg"][0] - 2.0 / 3.0).abs() < 1e-12);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_precrec_counts() {
        let x = arr2(&[[0.0], [0.0], [0.0], [0.0]]);
        let y = arr2(&[[1.0], [1.0], [-1.0], [-1.0]]);
        // One false negative for the positive class
        let scores = arr2(&[[0.9], [-0.4], [-0.2], [-1.5]]);
        let mut opts = OptionStore::new();
        let config = PipelineConfig::default();
        let ctx = ctx_with_scores(scores, &x, &y, &mut opts, &config);

        match PrecRec.run(&ctx).unwrap() {
            StageOutput::Perf { metrics } => {
                assert_eq!(metrics["precision"][0], 1.0);
                assert_eq!(metrics["recall"][0], 0.5);
                assert!((metrics["recall"][1] - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let x = arr2(&[[0.0], [0.0], [0.0]]);
        // Binary targets against three-class scores
        let y = arr2(&[[1.0], [-1.0], [1.0]]);
        let scores = arr2(&[[0.8, 0.1, 0.1], [0.0, 0.9, 0.2], [0.7, 0.2, 0.1]]);
        let mut opts = OptionStore::new();
        let config = PipelineConfig::default();
        let ctx = ctx_with_scores(scores, &x, &y, &mut opts, &config);

        assert!(matches!(
            MacroAvg.run(&ctx),
            Err(PipelineError::Shape { .. })
        ));
        assert!(matches!(
            PrecRec.run(&ctx),
            Err(PipelineError::Shape { .. })
        ));
    }

    #[test]
    fn test_perf_without_pred_fails() {
        let x = arr2(&[[0.0]]);
        let y = arr2(&[[1.0]]);
        let opts = OptionStore::new();
        let config = PipelineConfig::default();
        let ctx = TaskContext {
            x: &x,
            y: &y,
            opts: &opts,
            config: &config,
        };
        assert!(MacroAvg.run(&ctx).is_err());
    }
}
