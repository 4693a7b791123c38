//! Parallel execution of the per-gene fitting stages

use std::fmt;

use ndarray::Array2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::dispersion::{estimate_dispersion_gene, fit_map_dispersion, DispersionParams, GeneDispersion};
use crate::error::Result;
use crate::glm::{fit_single_gene, GlmFitParams, GlmFitResult};

/// Executor of the per-gene stages. Every method returns results in the
/// order of `genes`.
pub trait Inference: Send + Sync + fmt::Debug {
    /// Number of worker threads
    fn n_cpus(&self) -> usize;

    /// Gene-wise dispersion estimates with the means they were fit at
    fn gene_wise_dispersions(
        &self,
        counts: &Array2<f64>,
        size_factors: &[f64],
        design: &Array2<f64>,
        genes: &[usize],
        use_linear_mu: bool,
        params: &DispersionParams,
    ) -> Vec<GeneDispersion>;

    /// MAP dispersions; `mu`, `gene_dispersions` and `trended_dispersions`
    /// are indexed by gene over the full matrix
    #[allow(clippy::too_many_arguments)]
    fn map_dispersions(
        &self,
        counts: &Array2<f64>,
        design: &Array2<f64>,
        mu: &Array2<f64>,
        gene_dispersions: &[f64],
        trended_dispersions: &[f64],
        prior_var: f64,
        genes: &[usize],
        params: &DispersionParams,
    ) -> Vec<f64>;

    /// Negative binomial GLM fits at the final dispersions
    fn fit_glms(
        &self,
        counts: &Array2<f64>,
        design: &Array2<f64>,
        size_factors: &[f64],
        dispersions: &[f64],
        genes: &[usize],
        params: &GlmFitParams,
    ) -> Vec<GlmFitResult>;
}

/// Rayon-backed inference with a private thread pool
pub struct DefaultInference {
    n_cpus: usize,
    pool: ThreadPool,
}

impl DefaultInference {
    pub fn new(n_cpus: usize) -> Result<Self> {
        let n_cpus = n_cpus.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_cpus)
            .thread_name(|i| format!("deseq-inference-{}", i))
            .build()?;
        Ok(Self { n_cpus, pool })
    }
}

impl fmt::Debug for DefaultInference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultInference").field("n_cpus", &self.n_cpus).finish()
    }
}

impl Inference for DefaultInference {
    fn n_cpus(&self) -> usize {
        self.n_cpus
    }

    fn gene_wise_dispersions(
        &self,
        counts: &Array2<f64>,
        size_factors: &[f64],
        design: &Array2<f64>,
        genes: &[usize],
        use_linear_mu: bool,
        params: &DispersionParams,
    ) -> Vec<GeneDispersion> {
        self.pool.install(|| {
            genes
                .par_iter()
                .map(|&i| estimate_dispersion_gene(counts.row(i), size_factors, design, use_linear_mu, params))
                .collect()
        })
    }

    fn map_dispersions(
        &self,
        counts: &Array2<f64>,
        design: &Array2<f64>,
        mu: &Array2<f64>,
        gene_dispersions: &[f64],
        trended_dispersions: &[f64],
        prior_var: f64,
        genes: &[usize],
        params: &DispersionParams,
    ) -> Vec<f64> {
        self.pool.install(|| {
            genes
                .par_iter()
                .map(|&i| {
                    let mu_row = mu.row(i).to_vec();
                    fit_map_dispersion(
                        counts.row(i),
                        design,
                        &mu_row,
                        gene_dispersions[i],
                        trended_dispersions[i],
                        prior_var,
                        params,
                    )
                })
                .collect()
        })
    }

    fn fit_glms(
        &self,
        counts: &Array2<f64>,
        design: &Array2<f64>,
        size_factors: &[f64],
        dispersions: &[f64],
        genes: &[usize],
        params: &GlmFitParams,
    ) -> Vec<GlmFitResult> {
        self.pool.install(|| {
            genes
                .par_iter()
                .map(|&i| fit_single_gene(counts.row(i), design, size_factors, dispersions[i], params))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_results_follow_gene_order() {
        let inference = DefaultInference::new(2).unwrap();
        assert_eq!(inference.n_cpus(), 2);

        let counts = array![
            [10.0, 12.0, 30.0, 33.0],
            [0.0, 0.0, 0.0, 0.0],
            [100.0, 90.0, 110.0, 95.0]
        ];
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let sf = [1.0; 4];
        let params = DispersionParams::default();

        let both = inference.gene_wise_dispersions(&counts, &sf, &design, &[2, 1, 0], true, &params);
        assert_eq!(both.len(), 3);
        assert!(both[1].dispersion.is_nan());

        let single = inference.gene_wise_dispersions(&counts, &sf, &design, &[0], true, &params);
        assert_eq!(single[0].dispersion.to_bits(), both[2].dispersion.to_bits());

        let dispersions = [0.05, f64::NAN, 0.01];
        let fits = inference.fit_glms(&counts, &design, &sf, &dispersions, &[0, 2], &GlmFitParams::default());
        assert!(fits[0].coefficients[1] > 0.0);
        assert!(fits[1].coefficients[0] > fits[0].coefficients[0]);
    }

    #[test]
    fn test_zero_threads_means_one() {
        assert_eq!(DefaultInference::new(0).unwrap().n_cpus(), 1);
    }
}
