//! Tables, count matrices, sample metadata and the fitted dataset

mod count_matrix;
mod dataset;
mod frame;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::DeseqDataSet;
pub use frame::{ColumnType, DataFrame, Value};
pub use metadata::SampleMetadata;
