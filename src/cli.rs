//! Command-line interface: run a train/eval pipeline or a benchmark sweep

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::{read_bench_config, BenchRoutine, DatasetSelection};
use crate::dataset::one_vs_all;
use crate::error::{PipelineError, Result};
use crate::options::{FieldValue, TaskCategory};
use crate::pipeline::{Pipeline, PipelineBuilder, TaskSequence};

#[derive(Parser)]
#[command(
    name = "ridgeline",
    about = "Regularized least-squares learning pipelines",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train on one dataset pair, evaluate on another
    Train {
        /// Training feature file (headerless delimited numeric)
        xtr: PathBuf,
        /// Training label file
        ytr: PathBuf,
        /// Test feature file
        xte: PathBuf,
        /// Test label file
        yte: PathBuf,
        /// Kernel: primal (no kernel), linear, rbf or poly
        #[arg(long, default_value = "primal")]
        kernel: String,
        /// Field separator in the data files
        #[arg(long, default_value = ",")]
        separator: String,
        /// Treat label files as one-column class labels and encode them ±1
        #[arg(long)]
        encode_labels: bool,
        /// Session name for the persisted result store
        #[arg(long, default_value = "cli")]
        session: String,
        /// Log every stage as it executes
        #[arg(short, long)]
        verbose: bool,
    },
    /// Run benchmark routines from a configuration file
    Bench {
        /// Configuration file: `<routine> <run-count> <dataset>...` per line
        #[arg(long)]
        config: PathBuf,
        /// Directory holding one subdirectory per dataset with
        /// Xtr/ytr/Xte/yte files
        #[arg(long)]
        data_dir: PathBuf,
        /// Field separator in the data files
        #[arg(long, default_value = ",")]
        separator: String,
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Sequence and directive lists for a named learning routine
fn routine_spec(name: &str) -> Result<(Vec<&'static str>, Vec<&'static str>, Vec<&'static str>)> {
    match name {
        "loocvprimal" | "hoprimal" => {
            let paramsel = if name == "loocvprimal" {
                "paramsel:loocvprimal"
            } else {
                "paramsel:hoprimal"
            };
            Ok((
                vec![paramsel, "optimizer:rlsprimal", "pred:primal", "perf:macroavg"],
                vec!["computeNsave", "computeNsave", "ignore", "ignore"],
                vec!["load", "load", "computeNsave", "computeNsave"],
            ))
        }
        "loocvdual" | "hodual" | "rbfdual" | "polydual" => {
            let (kernel, paramsel) = match name {
                "loocvdual" => ("kernel:linear", "paramsel:loocvdual"),
                "hodual" => ("kernel:linear", "paramsel:hodual"),
                "rbfdual" => ("kernel:rbf", "paramsel:hodual"),
                _ => ("kernel:poly", "paramsel:hodual"),
            };
            Ok((
                vec![kernel, paramsel, "optimizer:rlsdual", "pred:dual", "perf:macroavg"],
                vec!["computeNsave", "computeNsave", "computeNsave", "ignore", "ignore"],
                vec!["load", "load", "load", "computeNsave", "computeNsave"],
            ))
        }
        other => Err(PipelineError::Config(format!(
            "unknown learning routine '{}'",
            other
        ))),
    }
}

fn separator_byte(separator: &str) -> Result<u8> {
    let bytes = separator.as_bytes();
    if bytes.len() != 1 {
        return Err(PipelineError::Config(format!(
            "separator must be a single byte, got '{}'",
            separator
        )));
    }
    Ok(bytes[0])
}

fn kernel_routine(kernel: &str) -> Result<&'static str> {
    match kernel {
        "primal" => Ok("loocvprimal"),
        "linear" => Ok("loocvdual"),
        "rbf" => Ok("rbfdual"),
        "poly" => Ok("polydual"),
        other => Err(PipelineError::Config(format!(
            "unknown kernel '{}' (expected primal, linear, rbf or poly)",
            other
        ))),
    }
}

/// Build a pipeline for a routine and register the four dataset matrices
#[allow(clippy::too_many_arguments)]
fn build_routine_pipeline(
    routine: &str,
    session: &str,
    verbose: bool,
    xtr: &Path,
    ytr: &Path,
    xte: &Path,
    yte: &Path,
    separator: u8,
    encode_labels: bool,
) -> Result<Pipeline> {
    let (sequence, train, eval) = routine_spec(routine)?;

    let mut builder = PipelineBuilder::new();
    builder.set_task_sequence(TaskSequence::from_ids(&sequence)?)?;
    builder.add_process_tokens("train", &train)?;
    builder.add_process_tokens("eval", &eval)?;
    let mut pipeline = builder.build_pipeline(session, verbose)?;

    pipeline.add_csv("xtr", xtr, separator)?;
    pipeline.add_csv("xte", xte, separator)?;
    pipeline.add_csv("ytr", ytr, separator)?;
    pipeline.add_csv("yte", yte, separator)?;

    if encode_labels {
        for name in ["ytr", "yte"] {
            let encoded = one_vs_all(pipeline.datasets().get(name)?)?;
            pipeline.add_matrix(name, encoded);
        }
    }
    Ok(pipeline)
}

fn print_field(pipeline: &Pipeline, category: TaskCategory, field: &str) {
    match pipeline.option_field(category, field) {
        Ok(FieldValue::Scalar(v)) => {
            println!("  {} {}.{} = {:.4}", "•".dimmed(), category, field, v)
        }
        Ok(FieldValue::Vector(v)) => {
            let formatted: Vec<String> = v.iter().map(|x| format!("{:.4}", x)).collect();
            println!(
                "  {} {}.{} = [{}]",
                "•".dimmed(),
                category,
                field,
                formatted.join(", ")
            )
        }
        Ok(FieldValue::Matrix(m)) => println!(
            "  {} {}.{} = <{}x{} matrix>",
            "•".dimmed(),
            category,
            field,
            m.nrows(),
            m.ncols()
        ),
        Err(_) => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_train(
    xtr: &Path,
    ytr: &Path,
    xte: &Path,
    yte: &Path,
    kernel: &str,
    separator: &str,
    encode_labels: bool,
    session: &str,
    verbose: bool,
) -> Result<()> {
    let routine = kernel_routine(kernel)?;
    let separator = separator_byte(separator)?;
    let mut pipeline = build_routine_pipeline(
        routine,
        session,
        verbose,
        xtr,
        ytr,
        xte,
        yte,
        separator,
        encode_labels,
    )?;

    let start = Instant::now();
    pipeline.run("xtr", "ytr", "train")?;
    pipeline.run("xte", "yte", "eval")?;
    let elapsed = start.elapsed();

    println!(
        "{} trained and evaluated in {:.3}s",
        "✓".green(),
        elapsed.as_secs_f64()
    );
    print_field(&pipeline, TaskCategory::Paramsel, "lambdas");
    print_field(&pipeline, TaskCategory::Perf, "acc");
    print_field(&pipeline, TaskCategory::Perf, "acc_avg");
    Ok(())
}

/// Datasets available under the data directory (one subdirectory each)
fn available_datasets(data_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(data_dir)?.flatten() {
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn data_file(data_dir: &Path, dataset: &str, stem: &str) -> PathBuf {
    data_dir.join(dataset).join(format!("{}.csv", stem))
}

/// Mean wall time and mean accuracy of a routine's runs on one dataset
fn bench_dataset(
    routine: &BenchRoutine,
    dataset: &str,
    data_dir: &Path,
    separator: u8,
    verbose: bool,
) -> Result<(f64, f64)> {
    let mut elapsed_total = 0.0;
    let mut acc_total = 0.0;
    let mut acc_runs = 0usize;
    for run in 0..routine.runs {
        let session = format!("bench-{}-{}-{}", routine.name, dataset, run);
        let mut pipeline = build_routine_pipeline(
            &routine.name,
            &session,
            verbose,
            &data_file(data_dir, dataset, "Xtr"),
            &data_file(data_dir, dataset, "ytr"),
            &data_file(data_dir, dataset, "Xte"),
            &data_file(data_dir, dataset, "yte"),
            separator,
            true,
        )?;

        let start = Instant::now();
        pipeline.run("xtr", "ytr", "train")?;
        pipeline.run("xte", "yte", "eval")?;
        elapsed_total += start.elapsed().as_secs_f64();

        if let Ok(FieldValue::Scalar(acc)) =
            pipeline.option_field(TaskCategory::Perf, "acc_avg")
        {
            acc_total += acc;
            acc_runs += 1;
        }
    }
    let mean_time = if routine.runs > 0 {
        elapsed_total / routine.runs as f64
    } else {
        0.0
    };
    let mean_acc = if acc_runs > 0 {
        acc_total / acc_runs as f64
    } else {
        f64::NAN
    };
    Ok((mean_time, mean_acc))
}

fn cmd_bench(config: &Path, data_dir: &Path, separator: &str, verbose: bool) -> Result<()> {
    // Parse the whole configuration before touching any dataset
    let routines = read_bench_config(config)?;
    let separator = separator_byte(separator)?;
    let all_names = available_datasets(data_dir)?;

    println!(
        "{:<14} {:<16} {:>5} {:>10} {:>9}",
        "routine", "dataset", "runs", "mean time", "accuracy"
    );
    for routine in &routines {
        let names: Vec<String> = match &routine.datasets {
            DatasetSelection::All => all_names.clone(),
            DatasetSelection::Named(names) => {
                for name in names {
                    if !all_names.contains(name) {
                        return Err(PipelineError::DatasetNotFound(name.clone()));
                    }
                }
                names.clone()
            }
        };

        for dataset in &names {
            let (mean_time, mean_acc) =
                bench_dataset(routine, dataset, data_dir, separator, verbose)?;
            println!(
                "{:<14} {:<16} {:>5} {:>9.3}s {:>8.2}%",
                routine.name,
                dataset,
                routine.runs,
                mean_time,
                mean_acc * 100.0
            );
        }
    }
    Ok(())
}

/// Entry point for the parsed CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Train {
            xtr,
            ytr,
            xte,
            yte,
            kernel,
            separator,
            encode_labels,
            session,
            verbose,
        } => cmd_train(
            &xtr,
            &ytr,
            &xte,
            &yte,
            &kernel,
            &separator,
            encode_labels,
            &session,
            verbose,
        ),
        Commands::Bench {
            config,
            data_dir,
            separator,
            verbose,
        } => cmd_bench(&config, &data_dir, &separator, verbose),
    }
}
