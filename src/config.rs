//! Benchmark routine configuration
//!
//! Line-oriented text format, one learning routine per line:
//!
//! ```text
//! # routine    runs   datasets...
//! loocvprimal  5      iris wine
//! hodual       3      _all_
//! ```
//!
//! Blank lines and `#` comments are ignored. Each line needs at least three
//! whitespace-separated tokens; the second must be a non-negative integer.
//! The special dataset token `_all_` selects every available dataset.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const LINE_USAGE: &str = "expected: <routine-name> <run-count> <dataset-name>...";

/// Which datasets a routine runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetSelection {
    /// Every dataset available in the data directory
    All,
    Named(Vec<String>),
}

/// One benchmark routine: a named learning setup, a repeat count, and the
/// datasets it runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchRoutine {
    pub name: String,
    pub runs: usize,
    pub datasets: DatasetSelection,
}

/// Parse a configuration file from disk
pub fn read_bench_config(path: impl AsRef<Path>) -> Result<Vec<BenchRoutine>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_bench_config(&text)
}

/// Parse configuration text. Malformed lines fail before any dataset is
/// touched.
pub fn parse_bench_config(text: &str) -> Result<Vec<BenchRoutine>> {
    let mut routines = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(PipelineError::Config(format!(
                "line {}: too few tokens; {}",
                lineno + 1,
                LINE_USAGE
            )));
        }

        let runs: usize = tokens[1].parse().map_err(|_| {
            PipelineError::Config(format!(
                "line {}: run count '{}' is not a non-negative integer; {}",
                lineno + 1,
                tokens[1],
                LINE_USAGE
            ))
        })?;

        let datasets = if tokens[2..] == ["_all_"] {
            DatasetSelection::All
        } else if tokens[2..].contains(&"_all_") {
            return Err(PipelineError::Config(format!(
                "line {}: '_all_' cannot be combined with named datasets",
                lineno + 1
            )));
        } else {
            DatasetSelection::Named(tokens[2..].iter().map(|s| s.to_string()).collect())
        };

        routines.push(BenchRoutine {
            name: tokens[0].to_string(),
            runs,
            datasets,
        });
    }

    Ok(routines)
}
