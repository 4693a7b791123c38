//! Error types for deseq_artifacts

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for table I/O, model fitting and artifact storage
#[derive(Error, Debug)]
pub enum DeseqError {
    #[error("File '{filename}' not found under {}", search_dir.display())]
    FileNotFound { filename: String, search_dir: PathBuf },

    #[error("Invalid table: {reason}")]
    InvalidTable { reason: String },

    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Trend fitting failed: {reason}")]
    TrendFittingFailed { reason: String },

    #[error("Model has not been fitted: {missing} is unavailable")]
    NotFitted { missing: String },

    #[error("Invalid model artifact {}: {reason}", path.display())]
    ArtifactFormat { path: PathBuf, reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Artifact encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Artifact decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DeseqError {
    /// True when the error is a missing file, either from the recursive
    /// search or from the filesystem itself.
    pub fn is_not_found(&self) -> bool {
        match self {
            DeseqError::FileNotFound { .. } => true,
            DeseqError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for deseq_artifacts operations
pub type Result<T> = std::result::Result<T, DeseqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let search = DeseqError::FileNotFound {
            filename: "counts.csv".to_string(),
            search_dir: PathBuf::from("data"),
        };
        assert!(search.is_not_found());
        assert!(search.to_string().contains("counts.csv"));

        let io = DeseqError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(io.is_not_found());

        let other = DeseqError::InvalidInput { reason: "x".to_string() };
        assert!(!other.is_not_found());
    }
}
