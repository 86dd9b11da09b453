//! Reference dataset of labeled feature vectors.
//!
//! Loaded once per session and read-only afterwards.  The file is a plain
//! comma-separated table, one sample per row: `label, f_1 ... f_126`.
//! An optional header row (first field `label`), blank lines and `#`
//! comments are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::features::{FeatureVector, FEATURE_LEN};

/// Errors raised while loading a reference dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The dataset file could not be read.
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row has the wrong number of feature columns.
    #[error("line {line}: expected {expected} feature columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A row has an empty label.
    #[error("line {line}: missing label")]
    MissingLabel { line: usize },

    /// A feature cell is not a finite number.
    #[error("line {line}, column {column}: invalid feature value {value:?}")]
    InvalidNumber {
        line: usize,
        column: usize,
        value: String,
    },

    /// The file contained no samples.
    #[error("dataset contains no samples")]
    Empty,
}

/// One labeled reference vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub label: String,
    pub features: FeatureVector,
}

/// Immutable set of training samples.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    samples: Vec<TrainingSample>,
}

impl ReferenceDataset {
    /// Build a dataset from already-validated samples.
    pub fn from_samples(samples: Vec<TrainingSample>) -> Self {
        Self { samples }
    }

    /// Load a dataset file.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::parse(&content)?;
        info!(
            "Loaded {} reference samples ({} labels) from {}",
            dataset.len(),
            dataset.labels().len(),
            path.display(),
        );
        Ok(dataset)
    }

    /// Parse dataset text.
    pub fn parse(content: &str) -> Result<Self, DatasetError> {
        let mut samples = Vec::new();
        let mut seen_row = false;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut cells = line.split(',').map(str::trim);
            let label = cells.next().unwrap_or_default();

            if !seen_row && label.eq_ignore_ascii_case("label") {
                seen_row = true;
                continue;
            }
            seen_row = true;

            if label.is_empty() {
                return Err(DatasetError::MissingLabel { line: line_no });
            }

            let cells: Vec<&str> = cells.collect();
            if cells.len() != FEATURE_LEN {
                return Err(DatasetError::ColumnCount {
                    line: line_no,
                    expected: FEATURE_LEN,
                    found: cells.len(),
                });
            }

            let mut values = Vec::with_capacity(FEATURE_LEN);
            for (col, cell) in cells.iter().enumerate() {
                match cell.parse::<f32>() {
                    Ok(v) if v.is_finite() => values.push(v),
                    _ => {
                        return Err(DatasetError::InvalidNumber {
                            line: line_no,
                            column: col + 2,
                            value: cell.to_string(),
                        })
                    }
                }
            }

            // Length and finiteness were checked above.
            let Some(features) = FeatureVector::from_values(values) else {
                return Err(DatasetError::ColumnCount {
                    line: line_no,
                    expected: FEATURE_LEN,
                    found: cells.len(),
                });
            };
            samples.push(TrainingSample {
                label: label.to_string(),
                features,
            });
        }

        if samples.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct labels with their sample counts, sorted by label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct labels, sorted.
    pub fn labels(&self) -> Vec<&str> {
        self.label_counts().into_keys().collect()
    }
}

// ── Tests ──────────────────────────────────────────────────
