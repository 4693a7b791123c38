//! Outlier detection and replacement

mod cooks;

pub use cooks::{
    cooks_distance_gene, default_cooks_cutoff, group_cells, max_cooks_per_gene, replace_outliers, robust_disp_gene,
    CooksParams,
};
