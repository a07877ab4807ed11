//! Dataset registry: named in-memory matrices and delimited-file ingestion
//!
//! Datasets are read-only inputs to pipeline runs; the engine works on its
//! own copies and never mutates what the caller registered.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Named matrix store
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: HashMap<String, Array2<f64>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory matrix. Duplicate names overwrite.
    pub fn add_matrix(&mut self, name: impl Into<String>, matrix: Array2<f64>) {
        self.datasets.insert(name.into(), matrix);
    }

    /// Register a matrix loaded from a headerless delimited numeric file.
    pub fn add_csv(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        separator: u8,
    ) -> Result<()> {
        let matrix = read_delimited(path.as_ref(), separator)?;
        self.add_matrix(name, matrix);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Array2<f64>> {
        self.datasets
            .get(name)
            .ok_or_else(|| PipelineError::DatasetNotFound(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Array2<f64>> {
        self.datasets.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.datasets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Load a headerless delimited numeric file into a matrix
pub fn read_delimited(path: &Path, separator: u8) -> Result<Array2<f64>> {
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let matrix = df.to_ndarray::<Float64Type>(IndexOrder::C)?;
    if matrix.nrows() == 0 {
        return Err(PipelineError::Data(format!(
            "dataset file '{}' contains no rows",
            path.display()
        )));
    }
    Ok(matrix)
}

/// Encode a one-column class-label matrix into the ±1 one-vs-all coding the
/// RLS stages train against. Class values are the sorted distinct labels;
/// with exactly two classes a single ±1 column is produced.
pub fn one_vs_all(labels: &Array2<f64>) -> Result<Array2<f64>> {
    if labels.ncols() != 1 {
        return Err(PipelineError::Shape {
            expected: "1 label column".to_string(),
            actual: format!("{}", labels.ncols()),
        });
    }
    let mut classes: Vec<f64> = labels.column(0).to_vec();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();
    if classes.len() < 2 {
        return Err(PipelineError::Data(
            "label column contains fewer than 2 classes".to_string(),
        ));
    }

    let n = labels.nrows();
    if classes.len() == 2 {
        let positive = classes[1];
        let mut encoded = Array2::from_elem((n, 1), -1.0);
        for i in 0..n {
            if labels[[i, 0]] == positive {
                encoded[[i, 0]] = 1.0;
            }
        }
        return Ok(encoded);
    }

    let mut encoded = Array2::from_elem((n, classes.len()), -1.0);
    for i in 0..n {
        let value = labels[[i, 0]];
        let class = classes
            .iter()
            .position(|&c| c == value)
            .unwrap_or_default();
        encoded[[i, class]] = 1.0;
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use std::io::Write;

    #[test]
    fn test_register_and_overwrite() {
        let mut registry = DatasetRegistry::new();
        registry.add_matrix("xtr", arr2(&[[1.0]]));
        registry.add_matrix("xtr", arr2(&[[2.0, 3.0]]));
        assert_eq!(registry.get("xtr").unwrap().ncols(), 2);
        assert!(registry.get("nope").is_err());
    }

    #[test]
    fn test_read_delimited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtr.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "1.0,2.0").unwrap();
        writeln!(file, "3.0,4.0").unwrap();
        writeln!(file, "5.0,6.0").unwrap();

        let matrix = read_delimited(&path, b',').unwrap();
        assert_eq!(matrix.dim(), (3, 2));
        assert_eq!(matrix[[2, 1]], 6.0);
    }

    #[test]
    fn test_one_vs_all_binary() {
        let labels = arr2(&[[1.0], [2.0], [1.0], [2.0]]);
        let encoded = one_vs_all(&labels).unwrap();
        assert_eq!(encoded.dim(), (4, 1));
        assert_eq!(encoded.column(0).to_vec(), vec![-1.0, 1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_one_vs_all_multiclass() {
        let labels = arr2(&[[3.0], [1.0], [2.0]]);
        let encoded = one_vs_all(&labels).unwrap();
        assert_eq!(encoded.dim(), (3, 3));
        assert_eq!(encoded[[0, 2]], 1.0);
        assert_eq!(encoded[[1, 0]], 1.0);
        assert_eq!(encoded[[2, 1]], 1.0);
        assert_eq!(encoded[[0, 0]], -1.0);
    }

    #[test]
    fn test_one_vs_all_rejects_single_class() {
        let labels = arr2(&[[1.0], [1.0]]);
        assert!(one_vs_all(&labels).is_err());
    }
}
