//! Generalized Linear Model fitting for negative binomial data

mod design;
mod fitting;
pub(crate) mod linalg;
mod negative_binomial;

pub use design::{check_full_rank, create_design_matrix, design_cells, is_group_design, DesignInfo, FactorCoding};
pub use fitting::{fit_single_gene, GlmFitParams, GlmFitResult};
pub use negative_binomial::{nb_log_density, nb_mean, nb_variance, nb_weight, MAX_BETA, MIN_MU};
