//! deseq_artifacts: DESeq2 model fitting with design-keyed artifact storage
//!
//! Tables are read from and written to a project's `data` directory, models
//! are fitted on a counts table plus a sample design table, and each fitted
//! model is persisted under a key derived from its design factors.
//!
//! # Example
//!
//! ```ignore
//! use deseq_artifacts::prelude::*;
//!
//! let counts = load_df("counts.csv")?;
//! let design = load_df("design.csv")?;
//!
//! // Writes ../models/dds_condition.pkl
//! let factors = vec!["condition".to_string()];
//! let dds = train_model(&counts, &design, &factors)?;
//!
//! let reloaded = load_model(&factors)?;
//! assert_eq!(reloaded.dispersions()?, dds.dispersions()?);
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod filter;
pub mod glm;
pub mod inference;
pub mod io;
pub mod normalization;
pub mod stats;
pub mod train;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ProjectLayout, TrainingConfig};
    pub use crate::data::{CountMatrix, DataFrame, DeseqDataSet, SampleMetadata, Value};
    pub use crate::dispersion::{DispersionParams, DispersionPrior, DispersionTrend};
    pub use crate::error::{DeseqError, Result};
    pub use crate::glm::{DesignInfo, GlmFitParams};
    pub use crate::inference::{DefaultInference, Inference};
    pub use crate::io::{
        artifact_key, find_file, get_root_path, list_artifacts, load_df, load_model, read_dataframe, save_df,
        save_model, write_dataframe,
    };
    pub use crate::normalization::SizeFactorMethod;
    pub use crate::train::{train_model, train_model_in, train_model_with_batch};
}

pub use io::{artifact_key, find_file, get_root_path, load_df, load_model, save_df, save_model};
pub use train::{train_model, train_model_with_batch};

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use tempfile::TempDir;

    fn column(values: &[f64]) -> Vec<Value> {
        values.iter().map(|&v| Value::Float(v)).collect()
    }

    #[test]
    fn test_tables_to_artifact_and_back() {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::rooted(dir.path());
        std::fs::create_dir_all(&layout.data_dir).unwrap();
        std::fs::create_dir_all(&layout.models_dir).unwrap();

        let samples: Vec<String> = (1..=6).map(|i| format!("s{}", i)).collect();
        let genes: Vec<String> = (1..=5).map(|i| format!("gene{}", i)).collect();
        let counts = DataFrame::new(
            "gene",
            genes,
            samples.clone(),
            vec![
                column(&[100.0, 500.0, 300.0, 50.0, 200.0]),
                column(&[110.0, 520.0, 310.0, 55.0, 220.0]),
                column(&[90.0, 480.0, 290.0, 45.0, 180.0]),
                column(&[400.0, 500.0, 75.0, 50.0, 200.0]),
                column(&[420.0, 510.0, 80.0, 52.0, 210.0]),
                column(&[380.0, 490.0, 70.0, 48.0, 190.0]),
            ],
        )
        .unwrap();
        let treatment = ["control", "control", "control", "treated", "treated", "treated"];
        let design = DataFrame::new(
            "sample",
            samples,
            vec!["treatment".to_string()],
            vec![treatment.iter().map(|t| Value::Str(t.to_string())).collect()],
        )
        .unwrap();

        layout.save_df(&counts, "counts.csv").unwrap();
        layout.save_df(&design, "design.csv").unwrap();
        let counts = layout.load_df("counts.csv").unwrap();
        let design = layout.load_df("design.csv").unwrap();

        let factors = vec!["treatment".to_string()];
        let config = TrainingConfig {
            inference_cpus: 2,
            fit_cpus: 1,
            refit_cooks: true,
        };
        let dds = train_model_in(&layout, &config, &counts, &design, &factors).unwrap();

        let lfc = dds.log2_fold_change("treatment_treated_vs_control").unwrap();
        assert!(lfc[0] > 1.0);
        assert!(lfc[2] < -1.0);

        let reloaded = layout.load_model(&factors).unwrap();
        assert_eq!(reloaded.log2_fold_changes().unwrap(), dds.log2_fold_changes().unwrap());
    }
}
