//! Fit a model on a counts table and persist it under its design key

use std::sync::Arc;

use crate::config::{ProjectLayout, TrainingConfig};
use crate::data::{DataFrame, DeseqDataSet};
use crate::error::Result;
use crate::inference::DefaultInference;
use crate::io::artifact_key;

/// Fit with explicit settings and save to `layout`'s models directory.
///
/// `counts` has genes as rows and samples as columns; `design` has samples
/// as rows. Nothing is written if fitting fails.
pub fn train_model_in(
    layout: &ProjectLayout,
    config: &TrainingConfig,
    counts: &DataFrame,
    design: &DataFrame,
    design_factors: &[String],
) -> Result<DeseqDataSet> {
    log::info!(
        "Training model dds{} on {} genes x {} samples",
        artifact_key(design_factors),
        counts.n_rows(),
        counts.n_cols()
    );

    let inference = Arc::new(DefaultInference::new(config.inference_cpus)?);
    let mut dds = DeseqDataSet::from_frames(
        counts,
        design,
        design_factors,
        config.refit_cooks,
        inference,
        config.fit_cpus,
    )?;
    dds.deseq2()?;

    let path = layout.save_model(&dds, design_factors)?;
    log::info!("Model saved to {}", path.display());
    Ok(dds)
}

/// Fit with 8 inference threads, 4 dataset threads and outlier refitting,
/// then save to `../models/dds<key>.pkl`
pub fn train_model(counts: &DataFrame, design: &DataFrame, design_factors: &[String]) -> Result<DeseqDataSet> {
    train_model_in(&ProjectLayout::default(), &TrainingConfig::default(), counts, design, design_factors)
}

/// Same as [`train_model`]; batch covariates are passed as design factors
pub fn train_model_with_batch(
    counts: &DataFrame,
    design: &DataFrame,
    design_factors: &[String],
) -> Result<DeseqDataSet> {
    train_model(counts, design, design_factors)
}
