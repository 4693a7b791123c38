//! Filesystem I/O: path lookup, CSV tables and model artifacts

mod artifact;
mod csv;
mod paths;

pub use self::csv::{load_df, read_dataframe, save_df, write_dataframe};
pub use artifact::{
    artifact_key, artifact_path, list_artifacts, load_model, normalized_artifact_key, save_model, ArtifactEntry,
    ArtifactEnvelope, ARTIFACT_SEPARATOR, FORMAT_VERSION,
};
pub use paths::{find_file, get_root_path};
