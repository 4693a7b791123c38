//! Design matrix creation for GLM

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::linalg;
use crate::data::SampleMetadata;
use crate::error::{DeseqError, Result};

/// How one design factor is encoded in the model matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactorCoding {
    /// Treatment contrasts against `reference`; one column per other level
    Categorical {
        name: String,
        reference: String,
        levels: Vec<String>,
    },
    /// A single numeric column
    Continuous { name: String },
}

/// Information about the design matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignInfo {
    /// Names of the coefficients, intercept first
    pub coef_names: Vec<String>,
    /// Coding of each design factor, in design-factor order
    pub factors: Vec<FactorCoding>,
}

impl DesignInfo {
    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }

    pub fn coef_index(&self, name: &str) -> Option<usize> {
        self.coef_names.iter().position(|c| c == name)
    }
}

/// Build `~ factor_1 + factor_2 + ...` with an intercept.
///
/// Categorical factors use the alphabetically first level as reference and
/// name their columns `<factor>_<level>_vs_<reference>`.
pub fn create_design_matrix(metadata: &SampleMetadata, factors: &[String]) -> Result<(Array2<f64>, DesignInfo)> {
    if factors.is_empty() {
        return Err(DeseqError::InvalidDesignMatrix {
            reason: "at least one design factor is required".to_string(),
        });
    }

    let n_samples = metadata.n_samples();
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n_samples]];
    let mut coef_names = vec!["intercept".to_string()];
    let mut codings = Vec::with_capacity(factors.len());

    for factor in factors {
        if let Some(values) = metadata.condition(factor) {
            let levels = metadata.levels(factor).unwrap_or_default();
            let reference = levels.first().cloned().unwrap_or_default();
            if levels.len() < 2 {
                log::warn!(
                    "Design factor '{}' has only one level ('{}'); it adds no columns to the design",
                    factor,
                    reference
                );
            }
            let others: Vec<String> = levels.into_iter().skip(1).collect();
            for level in &others {
                columns.push(values.iter().map(|v| if v == level { 1.0 } else { 0.0 }).collect());
                coef_names.push(format!("{}_{}_vs_{}", factor, level, reference));
            }
            codings.push(FactorCoding::Categorical {
                name: factor.clone(),
                reference,
                levels: others,
            });
        } else if let Some(values) = metadata.continuous(factor) {
            columns.push(values.clone());
            coef_names.push(factor.clone());
            codings.push(FactorCoding::Continuous { name: factor.clone() });
        } else {
            return Err(DeseqError::InvalidDesignMatrix {
                reason: format!("Design factor '{}' not found in metadata", factor),
            });
        }
    }

    let mut design = Array2::zeros((n_samples, columns.len()));
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            design[[i, j]] = v;
        }
    }

    Ok((
        design,
        DesignInfo {
            coef_names,
            factors: codings,
        },
    ))
}

/// Reject designs that cannot be fit: rank deficiency or no residual
/// degrees of freedom for dispersion estimation.
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let (nrow, ncol) = matrix.dim();
    if nrow == 0 || ncol == 0 {
        return Err(DeseqError::InvalidDesignMatrix {
            reason: "Design matrix has zero rows or columns".to_string(),
        });
    }

    if linalg::rank(matrix) < ncol {
        return Err(DeseqError::InvalidDesignMatrix {
            reason: "the model matrix is not full rank, so the model cannot be fit as specified. \
                     Some design factors are linear combinations of others or have empty levels."
                .to_string(),
        });
    }

    if nrow <= ncol {
        return Err(DeseqError::InvalidDesignMatrix {
            reason: format!(
                "the design has {} coefficients for {} samples; there are no replicates to estimate dispersion",
                ncol, nrow
            ),
        });
    }

    Ok(())
}

/// Group index of each sample: samples with identical design rows share a cell
pub fn design_cells(design: &Array2<f64>) -> Vec<usize> {
    let mut patterns: Vec<Vec<i64>> = Vec::new();
    design
        .rows()
        .into_iter()
        .map(|row| {
            let key: Vec<i64> = row.iter().map(|&v| (v * 1e6).round() as i64).collect();
            match patterns.iter().position(|p| *p == key) {
                Some(idx) => idx,
                None => {
                    patterns.push(key);
                    patterns.len() - 1
                }
            }
        })
        .collect()
}

/// True when the number of distinct rows equals the number of columns,
/// i.e. the model only describes group means.
pub fn is_group_design(design: &Array2<f64>) -> bool {
    let cells = design_cells(design);
    cells.iter().max().map_or(0, |&m| m + 1) == design.ncols()
}
