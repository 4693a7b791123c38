//! Project layout and training configuration

use std::path::{Path, PathBuf};

use crate::io::get_root_path;

/// Directories used for table I/O and model artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Where `save_df` writes tables
    pub data_dir: PathBuf,
    /// Where model artifacts are written and read
    pub models_dir: PathBuf,
    /// Root of the recursive search done by `load_df`
    pub search_dir: PathBuf,
}

impl Default for ProjectLayout {
    /// Tables and models go to `../data` and `../models` relative to the
    /// working directory; tables are looked up under `<root>/data`.
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("../data"),
            models_dir: PathBuf::from("../models"),
            search_dir: get_root_path().join("data"),
        }
    }
}

impl ProjectLayout {
    /// Everything under one project root: `root/data` and `root/models`
    pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            models_dir: root.join("models"),
            search_dir: root.join("data"),
        }
    }
}

/// Concurrency and outlier settings for a training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingConfig {
    /// Threads of the inference executor
    pub inference_cpus: usize,
    /// Threads the dataset uses for its own stages
    pub fit_cpus: usize,
    /// Replace Cook's outliers and refit the affected genes
    pub refit_cooks: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            inference_cpus: 8,
            fit_cpus: 4,
            refit_cooks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = ProjectLayout::default();
        assert_eq!(layout.data_dir, PathBuf::from("../data"));
        assert_eq!(layout.models_dir, PathBuf::from("../models"));
        assert!(layout.search_dir.ends_with("data"));
        assert!(layout.search_dir.starts_with(get_root_path()));
    }

    #[test]
    fn test_rooted_layout() {
        let layout = ProjectLayout::rooted("/tmp/project");
        assert_eq!(layout.models_dir, PathBuf::from("/tmp/project/models"));
        assert_eq!(layout.data_dir, layout.search_dir);
    }

    #[test]
    fn test_training_defaults() {
        let config = TrainingConfig::default();
        assert_eq!((config.inference_cpus, config.fit_cpus, config.refit_cooks), (8, 4, true));
    }
}
