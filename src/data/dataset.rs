//! DeseqDataSet - counts, design and every fitted quantity of one model

use std::f64::consts::LN_2;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{CountMatrix, DataFrame, SampleMetadata};
use crate::dispersion::{
    estimate_prior_variance, fit_dispersion_trend, is_dispersion_outlier, DispersionParams, DispersionPrior,
    DispersionTrend,
};
use crate::error::{DeseqError, Result};
use crate::filter::{
    cooks_distance_gene, default_cooks_cutoff, group_cells, replace_outliers, robust_disp_gene, CooksParams,
};
use crate::glm::{check_full_rank, create_design_matrix, design_cells, is_group_design, DesignInfo, GlmFitParams};
use crate::inference::{DefaultInference, Inference};
use crate::normalization::{estimate_size_factors, normalized_counts, SizeFactorMethod};

/// A count matrix with its design, fitted in place by [`DeseqDataSet::deseq2`].
///
/// The whole value is serializable. The inference executor is not: after
/// deserialization it is rebuilt on demand with the stored thread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeseqDataSet {
    counts: CountMatrix,
    metadata: SampleMetadata,
    design_factors: Vec<String>,
    design_matrix: Array2<f64>,
    design_info: DesignInfo,
    refit_cooks: bool,
    /// Threads of the Cook's distance stage
    n_cpus: usize,
    /// Threads of the inference executor
    inference_cpus: usize,
    #[serde(skip)]
    inference: Option<Arc<dyn Inference>>,

    size_factors: Option<Array1<f64>>,
    normalized_counts: Option<Array2<f64>>,
    base_means: Option<Array1<f64>>,
    all_zero: Option<Vec<bool>>,

    gene_dispersions: Option<Array1<f64>>,
    trended_dispersions: Option<Array1<f64>>,
    map_dispersions: Option<Array1<f64>>,
    dispersions: Option<Array1<f64>>,
    dispersion_trend: Option<DispersionTrend>,
    dispersion_prior: Option<DispersionPrior>,
    dispersion_outliers: Option<Vec<bool>>,

    /// Natural-log coefficients, genes x coefficients
    coefficients: Option<Array2<f64>>,
    log2_fold_changes: Option<Array2<f64>>,
    /// Standard errors on the log2 scale
    standard_errors: Option<Array2<f64>>,
    mu: Option<Array2<f64>>,
    hat_diagonals: Option<Array2<f64>>,
    deviance: Option<Array1<f64>>,
    converged: Option<Vec<bool>>,

    cooks: Option<Array2<f64>>,
    cooks_cutoff: Option<f64>,
    /// Counts after outlier replacement, present only if a gene was refit
    replace_counts: Option<Array2<f64>>,
    replaced: Option<Vec<bool>>,
}

/// Per-gene outputs of the dispersion and GLM stages for a subset of genes
struct StageOutput {
    gene_dispersions: Vec<f64>,
    trended_dispersions: Vec<f64>,
    map_dispersions: Vec<f64>,
    dispersions: Vec<f64>,
    outliers: Vec<bool>,
    fits: Vec<crate::glm::GlmFitResult>,
}

impl DeseqDataSet {
    /// Create a dataset ready to fit.
    ///
    /// Metadata rows are realigned to the count columns; every sample in the
    /// counts must appear in the metadata. The design matrix is built here,
    /// so unknown factors fail early.
    pub fn new(
        counts: CountMatrix,
        metadata: SampleMetadata,
        design_factors: &[String],
        refit_cooks: bool,
        inference: Arc<dyn Inference>,
        n_cpus: usize,
    ) -> Result<Self> {
        let metadata = if metadata.sample_ids() == counts.sample_ids() {
            metadata
        } else {
            log::debug!("Reordering metadata rows to match count columns");
            metadata.reordered(counts.sample_ids())?
        };

        let (design_matrix, design_info) = create_design_matrix(&metadata, design_factors)?;
        log::debug!("Design coefficients: {:?}", design_info.coef_names);

        Ok(Self {
            counts,
            metadata,
            design_factors: design_factors.to_vec(),
            design_matrix,
            design_info,
            refit_cooks,
            n_cpus: n_cpus.max(1),
            inference_cpus: inference.n_cpus(),
            inference: Some(inference),
            size_factors: None,
            normalized_counts: None,
            base_means: None,
            all_zero: None,
            gene_dispersions: None,
            trended_dispersions: None,
            map_dispersions: None,
            dispersions: None,
            dispersion_trend: None,
            dispersion_prior: None,
            dispersion_outliers: None,
            coefficients: None,
            log2_fold_changes: None,
            standard_errors: None,
            mu: None,
            hat_diagonals: None,
            deviance: None,
            converged: None,
            cooks: None,
            cooks_cutoff: None,
            replace_counts: None,
            replaced: None,
        })
    }

    /// Create a dataset from tables: counts with genes as rows and samples
    /// as columns, metadata with samples as rows.
    pub fn from_frames(
        counts: &DataFrame,
        metadata: &DataFrame,
        design_factors: &[String],
        refit_cooks: bool,
        inference: Arc<dyn Inference>,
        n_cpus: usize,
    ) -> Result<Self> {
        let counts = CountMatrix::try_from(counts)?;
        let metadata = SampleMetadata::try_from(metadata)?;
        Self::new(counts, metadata, design_factors, refit_cooks, inference, n_cpus)
    }

    /// Run the full fit: size factors, dispersions, GLM, Cook's distances
    /// and, when enabled, outlier replacement with refitting.
    pub fn deseq2(&mut self) -> Result<()> {
        check_full_rank(&self.design_matrix)?;
        let inference = self.inference()?;
        let disp_params = DispersionParams::default();
        let glm_params = GlmFitParams::default();
        let cooks_params = CooksParams::default();

        let counts = self.counts.counts().to_owned();
        let (n_genes, n_samples) = counts.dim();
        let n_coefs = self.design_matrix.ncols();

        log::info!("Fitting size factors...");
        let size_factors = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio)?;
        let sf = size_factors.to_vec();
        let normalized = normalized_counts(counts.view(), &size_factors);
        let base_means = normalized.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(n_genes));
        let all_zero: Vec<bool> = counts.rows().into_iter().map(|r| r.iter().all(|&c| c == 0.0)).collect();
        let genes: Vec<usize> = (0..n_genes).filter(|&i| !all_zero[i]).collect();
        if genes.is_empty() {
            return Err(DeseqError::InvalidCountMatrix {
                reason: "every gene has zero counts in all samples".to_string(),
            });
        }
        log::debug!("Size factors: {:?}", sf);

        log::info!("Fitting dispersions...");
        let use_linear_mu = is_group_design(&self.design_matrix);
        let gene_wise =
            inference.gene_wise_dispersions(&counts, &sf, &self.design_matrix, &genes, use_linear_mu, &disp_params);
        let mut gene_dispersions = Array1::from_elem(n_genes, f64::NAN);
        let mut disp_mu = Array2::zeros((n_genes, n_samples));
        for (&i, est) in genes.iter().zip(&gene_wise) {
            gene_dispersions[i] = est.dispersion;
            disp_mu.row_mut(i).assign(&Array1::from_vec(est.mu.clone()));
        }

        let kept_means: Vec<f64> = genes.iter().map(|&i| base_means[i]).collect();
        let kept_disps: Vec<f64> = genes.iter().map(|&i| gene_dispersions[i]).collect();
        let trend = fit_dispersion_trend(&kept_means, &kept_disps, disp_params.min_disp);
        let trended = trended_for(&trend, &base_means, &all_zero);

        let kept_trend: Vec<f64> = genes.iter().map(|&i| trended[i]).collect();
        let prior = estimate_prior_variance(&kept_disps, &kept_trend, n_samples, n_coefs, disp_params.min_disp);

        let stage = self.fit_stages(
            inference.as_ref(),
            &counts,
            &sf,
            &genes,
            &gene_dispersions.to_vec(),
            &disp_mu,
            &trended.to_vec(),
            &prior,
            &disp_params,
            &glm_params,
        );
        let n_outliers = stage.outliers.iter().filter(|&&o| o).count();
        log::debug!("Dispersion outliers: {}", n_outliers);

        self.size_factors = Some(size_factors);
        self.normalized_counts = Some(normalized.clone());
        self.base_means = Some(base_means);
        self.gene_dispersions = Some(gene_dispersions);
        self.trended_dispersions = Some(trended);
        self.map_dispersions = Some(Array1::from_elem(n_genes, f64::NAN));
        self.dispersions = Some(Array1::from_elem(n_genes, f64::NAN));
        self.dispersion_outliers = Some(vec![false; n_genes]);
        self.dispersion_trend = Some(trend);
        self.dispersion_prior = Some(prior);
        self.all_zero = Some(all_zero);
        self.init_glm_results(n_genes, n_samples, n_coefs);
        self.store_stage(&genes, stage);

        log::info!("Calculating Cook's distances...");
        let cells = group_cells(&design_cells(&self.design_matrix));
        let cooks = self.cooks_distances(&counts, &normalized, &cells, &cooks_params)?;
        let cutoff = default_cooks_cutoff(n_samples, n_coefs, cooks_params.cutoff_quantile);
        self.cooks = Some(cooks);
        self.cooks_cutoff = Some(cutoff);
        self.replaced = Some(vec![false; n_genes]);
        self.replace_counts = None;

        if self.refit_cooks {
            self.refit_outliers(
                inference.as_ref(),
                &counts,
                &normalized,
                &cells,
                cutoff,
                &disp_params,
                &glm_params,
                &cooks_params,
            )?;
        }

        let n_converged = self.converged.as_ref().map_or(0, |c| c.iter().filter(|&&x| x).count());
        log::info!("Fit complete: {} genes, {} converged", genes.len(), n_converged);
        Ok(())
    }

    /// Gene-wise and MAP dispersions then GLM fits for `genes`, with a
    /// fixed trend and prior
    #[allow(clippy::too_many_arguments)]
    fn fit_stages(
        &self,
        inference: &dyn Inference,
        counts: &Array2<f64>,
        sf: &[f64],
        genes: &[usize],
        gene_dispersions: &[f64],
        disp_mu: &Array2<f64>,
        trended: &[f64],
        prior: &DispersionPrior,
        disp_params: &DispersionParams,
        glm_params: &GlmFitParams,
    ) -> StageOutput {
        let map = inference.map_dispersions(
            counts,
            &self.design_matrix,
            disp_mu,
            gene_dispersions,
            trended,
            prior.prior_var,
            genes,
            disp_params,
        );

        let mut final_disps = vec![f64::NAN; counts.nrows()];
        let mut outliers = Vec::with_capacity(genes.len());
        for (&i, &map_disp) in genes.iter().zip(&map) {
            let outlier = is_dispersion_outlier(gene_dispersions[i], trended[i], prior, disp_params.outlier_sd);
            final_disps[i] = if outlier { gene_dispersions[i] } else { map_disp };
            outliers.push(outlier);
        }

        log::info!("Fitting GLMs for {} genes...", genes.len());
        let fits = inference.fit_glms(counts, &self.design_matrix, sf, &final_disps, genes, glm_params);

        StageOutput {
            gene_dispersions: genes.iter().map(|&i| gene_dispersions[i]).collect(),
            trended_dispersions: genes.iter().map(|&i| trended[i]).collect(),
            map_dispersions: map,
            dispersions: genes.iter().map(|&i| final_disps[i]).collect(),
            outliers,
            fits,
        }
    }

    fn init_glm_results(&mut self, n_genes: usize, n_samples: usize, n_coefs: usize) {
        self.coefficients = Some(Array2::from_elem((n_genes, n_coefs), f64::NAN));
        self.log2_fold_changes = Some(Array2::from_elem((n_genes, n_coefs), f64::NAN));
        self.standard_errors = Some(Array2::from_elem((n_genes, n_coefs), f64::NAN));
        self.mu = Some(Array2::zeros((n_genes, n_samples)));
        self.hat_diagonals = Some(Array2::from_elem((n_genes, n_samples), f64::NAN));
        self.deviance = Some(Array1::from_elem(n_genes, f64::NAN));
        self.converged = Some(vec![false; n_genes]);
    }

    /// Write stage results into the rows of `genes`
    fn store_stage(&mut self, genes: &[usize], stage: StageOutput) {
        for (k, &i) in genes.iter().enumerate() {
            let fit = &stage.fits[k];
            if let Some(g) = self.gene_dispersions.as_mut() {
                g[i] = stage.gene_dispersions[k];
            }
            if let Some(t) = self.trended_dispersions.as_mut() {
                t[i] = stage.trended_dispersions[k];
            }
            if let Some(m) = self.map_dispersions.as_mut() {
                m[i] = stage.map_dispersions[k];
            }
            if let Some(d) = self.dispersions.as_mut() {
                d[i] = stage.dispersions[k];
            }
            if let Some(o) = self.dispersion_outliers.as_mut() {
                o[i] = stage.outliers[k];
            }
            if let Some(c) = self.coefficients.as_mut() {
                c.row_mut(i).assign(&Array1::from_vec(fit.coefficients.clone()));
            }
            if let Some(l) = self.log2_fold_changes.as_mut() {
                l.row_mut(i).assign(&Array1::from_iter(fit.coefficients.iter().map(|b| b / LN_2)));
            }
            if let Some(s) = self.standard_errors.as_mut() {
                s.row_mut(i).assign(&Array1::from_iter(fit.standard_errors.iter().map(|se| se / LN_2)));
            }
            if let Some(m) = self.mu.as_mut() {
                m.row_mut(i).assign(&Array1::from_vec(fit.mu.clone()));
            }
            if let Some(h) = self.hat_diagonals.as_mut() {
                h.row_mut(i).assign(&Array1::from_vec(fit.hat_diagonals.clone()));
            }
            if let Some(d) = self.deviance.as_mut() {
                d[i] = -2.0 * fit.log_likelihood;
            }
            if let Some(c) = self.converged.as_mut() {
                c[i] = fit.converged;
            }
        }
    }

    /// Cook's distances on a pool of `n_cpus` threads
    fn cooks_distances(
        &self,
        counts: &Array2<f64>,
        normalized: &Array2<f64>,
        cells: &std::collections::BTreeMap<usize, Vec<usize>>,
        params: &CooksParams,
    ) -> Result<Array2<f64>> {
        let (mu, hat) = match (&self.mu, &self.hat_diagonals) {
            (Some(mu), Some(hat)) => (mu, hat),
            _ => {
                return Err(DeseqError::NotFitted {
                    missing: "GLM fit".to_string(),
                })
            }
        };
        let n_coefs = self.design_matrix.ncols();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.n_cpus).build()?;

        let rows: Vec<Vec<f64>> = pool.install(|| {
            (0..counts.nrows())
                .into_par_iter()
                .map(|i| {
                    let alpha = robust_disp_gene(normalized.row(i), cells, params.min_disp);
                    cooks_distance_gene(counts.row(i), mu.row(i), hat.row(i), alpha, n_coefs)
                })
                .collect()
        });

        let mut cooks = Array2::zeros(counts.dim());
        for (i, row) in rows.into_iter().enumerate() {
            cooks.row_mut(i).assign(&Array1::from_vec(row));
        }
        Ok(cooks)
    }

    /// Replace outlier counts and refit the affected genes with the
    /// original trend and prior
    #[allow(clippy::too_many_arguments)]
    fn refit_outliers(
        &mut self,
        inference: &dyn Inference,
        counts: &Array2<f64>,
        normalized: &Array2<f64>,
        cells: &std::collections::BTreeMap<usize, Vec<usize>>,
        cutoff: f64,
        disp_params: &DispersionParams,
        glm_params: &GlmFitParams,
        cooks_params: &CooksParams,
    ) -> Result<()> {
        let sf = self.size_factors()?.to_vec();
        let cooks = self.cooks()?.clone();
        let (replaced_counts, flagged) = replace_outliers(counts, normalized, &sf, &cooks, cutoff, cells, cooks_params);
        if flagged.is_empty() {
            log::debug!("No counts replaced");
            return Ok(());
        }
        log::info!("Replacing outliers and refitting {} genes...", flagged.len());

        let (trend, prior) = match (self.dispersion_trend, self.dispersion_prior) {
            (Some(t), Some(p)) => (t, p),
            _ => {
                return Err(DeseqError::NotFitted {
                    missing: "dispersion prior".to_string(),
                })
            }
        };

        let use_linear_mu = is_group_design(&self.design_matrix);
        let gene_wise = inference.gene_wise_dispersions(
            &replaced_counts,
            &sf,
            &self.design_matrix,
            &flagged,
            use_linear_mu,
            disp_params,
        );

        let n_genes = counts.nrows();
        let mut gene_dispersions = vec![f64::NAN; n_genes];
        let mut trended = vec![f64::NAN; n_genes];
        let mut disp_mu = Array2::zeros(counts.dim());
        for (&i, est) in flagged.iter().zip(&gene_wise) {
            gene_dispersions[i] = est.dispersion;
            disp_mu.row_mut(i).assign(&Array1::from_vec(est.mu.clone()));
            let base_mean = replaced_counts.row(i).iter().zip(&sf).map(|(&c, &s)| c / s).sum::<f64>() / sf.len() as f64;
            trended[i] = trend.evaluate(base_mean);
            if let Some(b) = self.base_means.as_mut() {
                b[i] = base_mean;
            }
        }

        let stage = self.fit_stages(
            inference,
            &replaced_counts,
            &sf,
            &flagged,
            &gene_dispersions,
            &disp_mu,
            &trended,
            &prior,
            disp_params,
            glm_params,
        );
        self.store_stage(&flagged, stage);

        if let Some(r) = self.replaced.as_mut() {
            for &i in &flagged {
                r[i] = true;
            }
        }
        self.replace_counts = Some(replaced_counts);
        Ok(())
    }

    /// Executor for the per-gene stages, rebuilt from the stored thread
    /// count when the dataset was deserialized
    fn inference(&mut self) -> Result<Arc<dyn Inference>> {
        if let Some(inference) = &self.inference {
            return Ok(Arc::clone(inference));
        }
        let inference: Arc<dyn Inference> = Arc::new(DefaultInference::new(self.inference_cpus)?);
        self.inference = Some(Arc::clone(&inference));
        Ok(inference)
    }

    // Getters
    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    pub fn design_factors(&self) -> &[String] {
        &self.design_factors
    }

    pub fn design_matrix(&self) -> &Array2<f64> {
        &self.design_matrix
    }

    pub fn design_info(&self) -> &DesignInfo {
        &self.design_info
    }

    pub fn refit_cooks(&self) -> bool {
        self.refit_cooks
    }

    pub fn n_cpus(&self) -> usize {
        self.n_cpus
    }

    pub fn inference_cpus(&self) -> usize {
        self.inference_cpus
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn is_fitted(&self) -> bool {
        self.dispersions.is_some() && self.coefficients.is_some()
    }

    pub fn size_factors(&self) -> Result<&Array1<f64>> {
        fitted(&self.size_factors, "size factors")
    }

    pub fn normalized_counts(&self) -> Result<&Array2<f64>> {
        fitted(&self.normalized_counts, "normalized counts")
    }

    /// Mean of normalized counts per gene
    pub fn base_means(&self) -> Result<&Array1<f64>> {
        fitted(&self.base_means, "base means")
    }

    pub fn all_zero(&self) -> Result<&[bool]> {
        fitted(&self.all_zero, "all-zero flags").map(Vec::as_slice)
    }

    pub fn gene_dispersions(&self) -> Result<&Array1<f64>> {
        fitted(&self.gene_dispersions, "gene-wise dispersions")
    }

    pub fn trended_dispersions(&self) -> Result<&Array1<f64>> {
        fitted(&self.trended_dispersions, "trended dispersions")
    }

    pub fn map_dispersions(&self) -> Result<&Array1<f64>> {
        fitted(&self.map_dispersions, "MAP dispersions")
    }

    /// Final dispersions used by the GLM
    pub fn dispersions(&self) -> Result<&Array1<f64>> {
        fitted(&self.dispersions, "dispersions")
    }

    pub fn dispersion_trend(&self) -> Result<&DispersionTrend> {
        fitted(&self.dispersion_trend, "dispersion trend")
    }

    pub fn dispersion_prior(&self) -> Result<&DispersionPrior> {
        fitted(&self.dispersion_prior, "dispersion prior")
    }

    pub fn dispersion_outliers(&self) -> Result<&[bool]> {
        fitted(&self.dispersion_outliers, "dispersion outliers").map(Vec::as_slice)
    }

    pub fn coefficients(&self) -> Result<&Array2<f64>> {
        fitted(&self.coefficients, "coefficients")
    }

    pub fn log2_fold_changes(&self) -> Result<&Array2<f64>> {
        fitted(&self.log2_fold_changes, "log2 fold changes")
    }

    /// Log2 fold changes of one coefficient, by name
    pub fn log2_fold_change(&self, coef: &str) -> Result<Array1<f64>> {
        let j = self.design_info.coef_index(coef).ok_or_else(|| DeseqError::InvalidInput {
            reason: format!(
                "unknown coefficient '{}'; available: {}",
                coef,
                self.design_info.coef_names.join(", ")
            ),
        })?;
        Ok(self.log2_fold_changes()?.column(j).to_owned())
    }

    pub fn standard_errors(&self) -> Result<&Array2<f64>> {
        fitted(&self.standard_errors, "standard errors")
    }

    pub fn mu(&self) -> Result<&Array2<f64>> {
        fitted(&self.mu, "fitted means")
    }

    pub fn hat_diagonals(&self) -> Result<&Array2<f64>> {
        fitted(&self.hat_diagonals, "hat diagonals")
    }

    pub fn deviance(&self) -> Result<&Array1<f64>> {
        fitted(&self.deviance, "deviance")
    }

    pub fn converged(&self) -> Result<&[bool]> {
        fitted(&self.converged, "convergence flags").map(Vec::as_slice)
    }

    pub fn cooks(&self) -> Result<&Array2<f64>> {
        fitted(&self.cooks, "Cook's distances")
    }

    pub fn cooks_cutoff(&self) -> Result<f64> {
        fitted(&self.cooks_cutoff, "Cook's cutoff").copied()
    }

    /// Genes whose outlier counts were replaced and refit
    pub fn replaced(&self) -> Result<&[bool]> {
        fitted(&self.replaced, "replacement flags").map(Vec::as_slice)
    }

    pub fn replace_counts(&self) -> Option<&Array2<f64>> {
        self.replace_counts.as_ref()
    }
}

fn fitted<'a, T>(value: &'a Option<T>, missing: &str) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| DeseqError::NotFitted {
        missing: missing.to_string(),
    })
}

fn trended_for(trend: &DispersionTrend, base_means: &Array1<f64>, all_zero: &[bool]) -> Array1<f64> {
    Array1::from_iter(
        base_means
            .iter()
            .zip(all_zero)
            .map(|(&m, &zero)| if zero { f64::NAN } else { trend.evaluate(m) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn dataset(counts: Array2<f64>, conditions: &[&str], refit: bool) -> DeseqDataSet {
        let n_genes = counts.nrows();
        let n_samples = counts.ncols();
        let counts = CountMatrix::new(counts, ids("g", n_genes), ids("s", n_samples)).unwrap();
        let mut metadata = SampleMetadata::new(ids("s", n_samples));
        metadata
            .add_condition("condition", conditions.iter().map(|s| s.to_string()).collect())
            .unwrap();
        let inference = Arc::new(DefaultInference::new(2).unwrap());
        DeseqDataSet::new(counts, metadata, &["condition".to_string()], refit, inference, 2).unwrap()
    }

    fn six_sample_counts() -> Array2<f64> {
        array![
            [100.0, 110.0, 90.0, 400.0, 420.0, 380.0],
            [500.0, 520.0, 480.0, 500.0, 510.0, 490.0],
            [300.0, 310.0, 290.0, 75.0, 80.0, 70.0],
            [50.0, 55.0, 45.0, 50.0, 52.0, 48.0],
            [200.0, 220.0, 180.0, 200.0, 210.0, 190.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [150.0, 160.0, 140.0, 300.0, 320.0, 280.0],
            [80.0, 85.0, 75.0, 80.0, 82.0, 78.0],
        ]
    }

    #[test]
    fn test_full_fit_recovers_direction_of_change() {
        let mut dds = dataset(six_sample_counts(), &["A", "A", "A", "B", "B", "B"], true);
        assert!(!dds.is_fitted());
        assert!(dds.dispersions().is_err());

        dds.deseq2().unwrap();
        assert!(dds.is_fitted());

        let lfc = dds.log2_fold_change("condition_B_vs_A").unwrap();
        assert!((lfc[0] - 2.0).abs() < 0.2);
        assert!((lfc[2] + 2.0).abs() < 0.2);
        assert!(lfc[1].abs() < 0.2);
        assert!(lfc[5].is_nan());

        let disps = dds.dispersions().unwrap();
        assert!(disps[5].is_nan());
        assert!(disps.iter().enumerate().filter(|(i, _)| *i != 5).all(|(_, d)| d.is_finite() && *d > 0.0));
        assert!(dds.all_zero().unwrap()[5]);
        assert_eq!(dds.cooks().unwrap().dim(), (8, 6));
        // Three replicates per cell: nothing is replaced
        assert!(dds.replaced().unwrap().iter().all(|&r| !r));
        assert!(dds.replace_counts().is_none());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let conditions = ["A", "A", "A", "B", "B", "B"];
        let mut a = dataset(six_sample_counts(), &conditions, true);
        let mut b = dataset(six_sample_counts(), &conditions, true);
        a.deseq2().unwrap();
        b.deseq2().unwrap();
        let bits = |x: &Array2<f64>| x.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(a.log2_fold_changes().unwrap()), bits(b.log2_fold_changes().unwrap()));
        assert_eq!(
            a.dispersions().unwrap().iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.dispersions().unwrap().iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_outlier_in_large_cell_is_replaced_and_refit() {
        // Genes 1, 4, 7 and 10 go up 1.5x in B; gene 3 is flat apart from one outlier
        let mut counts = Array2::from_shape_fn((12, 14), |(i, j)| {
            let base = 50.0 + 30.0 * i as f64;
            let wobble = [0.9, 1.0, 1.1, 1.05, 0.95, 1.0, 1.02][j % 7];
            let group = if j >= 7 && i % 3 == 1 { 1.5 } else { 1.0 };
            (base * wobble * group).round()
        });
        counts[[3, 2]] = 5000.0;
        let conditions: Vec<&str> = (0..14).map(|j| if j < 7 { "A" } else { "B" }).collect();

        let mut refit = dataset(counts.clone(), &conditions, true);
        refit.deseq2().unwrap();
        assert!(refit.replaced().unwrap()[3]);
        let replaced = refit.replace_counts().unwrap();
        assert!(replaced[[3, 2]] < 1000.0);
        assert_eq!(refit.counts().counts()[[3, 2]], 5000.0);

        let mut plain = dataset(counts, &conditions, false);
        plain.deseq2().unwrap();
        assert!(plain.replaced().unwrap().iter().all(|&r| !r));
        let lfc_refit = refit.log2_fold_change("condition_B_vs_A").unwrap()[3];
        let lfc_plain = plain.log2_fold_change("condition_B_vs_A").unwrap()[3];
        assert!(lfc_refit.abs() < 0.2);
        assert!(lfc_plain < -1.0);
        let up = refit.log2_fold_change("condition_B_vs_A").unwrap()[4];
        assert!((up - 1.5_f64.log2()).abs() < 0.1);
    }

    #[test]
    fn test_no_replicates_fails() {
        let counts = array![[10.0, 20.0], [30.0, 40.0]];
        let mut dds = dataset(counts, &["A", "B"], true);
        assert!(matches!(dds.deseq2(), Err(DeseqError::InvalidDesignMatrix { .. })));
        assert!(!dds.is_fitted());
    }

    #[test]
    fn test_metadata_is_realigned_to_counts() {
        let counts = CountMatrix::new(six_sample_counts(), ids("g", 8), ids("s", 6)).unwrap();
        let order = ["s4", "s1", "s5", "s2", "s6", "s3"];
        let mut shuffled = SampleMetadata::new(order.iter().map(|s| s.to_string()).collect());
        shuffled
            .add_condition("condition", ["B", "A", "B", "A", "B", "A"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let inference = Arc::new(DefaultInference::new(1).unwrap());
        let dds = DeseqDataSet::new(counts, shuffled, &["condition".to_string()], true, inference, 1).unwrap();
        assert_eq!(dds.metadata().sample_ids(), dds.counts().sample_ids());
        assert_eq!(dds.design_matrix().column(1).to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_sample_in_metadata_fails() {
        let counts = CountMatrix::new(array![[1.0, 2.0, 3.0]], vec!["g1".into()], ids("s", 3)).unwrap();
        let mut metadata = SampleMetadata::new(ids("s", 2));
        metadata.add_condition("condition", vec!["A".into(), "B".into()]).unwrap();
        let inference = Arc::new(DefaultInference::new(1).unwrap());
        let err = DeseqDataSet::new(counts, metadata, &["condition".to_string()], true, inference, 1).unwrap_err();
        assert!(matches!(err, DeseqError::InvalidMetadata { .. }));
    }
}
