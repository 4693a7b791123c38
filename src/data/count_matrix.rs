//! Count matrix representation for RNA-seq data

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::frame::{DataFrame, Value};
use crate::error::{DeseqError, Result};

/// Deduplicate names by appending _1, _2, etc. to duplicates
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *seen.entry(name.clone()).or_insert(0) += 1;
    }
    if seen.values().all(|&c| c == 1) {
        return names;
    }
    seen.clear();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                let new_name = format!("{}_{}", name, *count - 1);
                log::warn!("Duplicate gene name '{}' renamed to '{}'", name, new_name);
                new_name
            }
        })
        .collect()
}

/// Raw read counts, genes x samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DeseqError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(DeseqError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DeseqError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if !counts.is_empty() && counts.iter().all(|&x| x == 0.0) {
            return Err(DeseqError::InvalidCountMatrix {
                reason: "All samples have 0 counts for all genes".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; the model expects integer counts");
        }

        Ok(Self {
            counts,
            gene_ids: deduplicate_names(gene_ids),
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

}

impl TryFrom<&DataFrame> for CountMatrix {
    type Error = DeseqError;

    /// Rows of the table are genes, columns are samples
    fn try_from(df: &DataFrame) -> Result<Self> {
        let mut counts = Array2::zeros((df.n_rows(), df.n_cols()));
        for (j, sample) in df.columns().iter().enumerate() {
            for (i, value) in df.column_at(j).iter().enumerate() {
                counts[[i, j]] = match value {
                    Value::Int(v) => *v as f64,
                    Value::Float(v) => *v,
                    Value::Missing => {
                        return Err(DeseqError::InvalidCountMatrix {
                            reason: format!("missing count for gene '{}' in sample '{}'", df.index()[i], sample),
                        })
                    }
                    Value::Str(s) => {
                        return Err(DeseqError::InvalidCountMatrix {
                            reason: format!("Invalid count value: {}", s),
                        })
                    }
                };
            }
        }
        CountMatrix::new(counts, df.index().to_vec(), df.columns().to_vec())
    }
}

impl From<&CountMatrix> for DataFrame {
    /// Whole-valued counts become integer columns, anything else stays float
    fn from(matrix: &CountMatrix) -> Self {
        let integral = matrix.counts.iter().all(|&x| x == x.round() && x.abs() < i64::MAX as f64);
        let data = matrix
            .counts
            .columns()
            .into_iter()
            .map(|col| {
                col.iter()
                    .map(|&x| if integral { Value::Int(x as i64) } else { Value::Float(x) })
                    .collect()
            })
            .collect();
        DataFrame::from_parts("gene_id", matrix.gene_ids.clone(), matrix.sample_ids.clone(), data)
    }
}
