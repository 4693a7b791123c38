//! Model artifacts keyed by design factors
//!
//! A model fitted on factors `["a", "b"]` lives in `<models_dir>/dds_a_b.pkl`.
//! The file holds a small binary header followed by a MessagePack envelope:
//!
//! ```text
//! b"DDSA" | format version (u16, little endian) | msgpack(ArtifactEnvelope)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ProjectLayout;
use crate::data::DeseqDataSet;
use crate::error::{DeseqError, Result};

/// Joins design factors in an artifact key
pub const ARTIFACT_SEPARATOR: &str = "_";

const ARTIFACT_PREFIX: &str = "dds";
const ARTIFACT_EXTENSION: &str = "pkl";
const MAGIC: &[u8; 4] = b"DDSA";
pub const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Key of a factor list: `"_" + f1 + "_" + f2 ...`.
///
/// Order matters: `["a", "b"]` and `["b", "a"]` name different artifacts.
pub fn artifact_key(design_factors: &[String]) -> String {
    design_factors
        .iter()
        .map(|factor| format!("{}{}", ARTIFACT_SEPARATOR, factor))
        .collect()
}

/// Key of the sorted factor list, the same for any ordering of the factors
pub fn normalized_artifact_key(design_factors: &[String]) -> String {
    let mut sorted = design_factors.to_vec();
    sorted.sort();
    artifact_key(&sorted)
}

fn artifact_file_name(design_factors: &[String]) -> String {
    format!("{}{}.{}", ARTIFACT_PREFIX, artifact_key(design_factors), ARTIFACT_EXTENSION)
}

/// What is stored in an artifact after the header
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    /// Version of the crate that wrote the file
    pub crate_version: String,
    pub design_factors: Vec<String>,
    pub model: DeseqDataSet,
}

/// Summary of one artifact found in the models directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    /// File name without the `dds` prefix and extension
    pub key: String,
}

fn encode(model: &DeseqDataSet, design_factors: &[String]) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct EnvelopeRef<'a> {
        crate_version: &'a str,
        design_factors: &'a [String],
        model: &'a DeseqDataSet,
    }

    let payload = rmp_serde::to_vec_named(&EnvelopeRef {
        crate_version: env!("CARGO_PKG_VERSION"),
        design_factors,
        model,
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode(bytes: &[u8], path: &Path) -> Result<ArtifactEnvelope> {
    let format_error = |reason: String| DeseqError::ArtifactFormat {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(format_error("not a model artifact (bad magic)".to_string()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(format_error(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    Ok(rmp_serde::from_slice(&bytes[HEADER_LEN..])?)
}

impl ProjectLayout {
    /// `<models_dir>/dds<key>.pkl`
    pub fn artifact_path(&self, design_factors: &[String]) -> PathBuf {
        self.models_dir.join(artifact_file_name(design_factors))
    }

    /// Persist a model under its design-factor key. Overwrites silently;
    /// the models directory must exist.
    pub fn save_model(&self, model: &DeseqDataSet, design_factors: &[String]) -> Result<PathBuf> {
        let path = self.artifact_path(design_factors);
        let bytes = encode(model, design_factors)?;
        fs::write(&path, &bytes)?;
        log::debug!("Saved model {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Load the model stored under the design-factor key
    pub fn load_model(&self, design_factors: &[String]) -> Result<DeseqDataSet> {
        let path = self.artifact_path(design_factors);
        let bytes = fs::read(&path)?;
        let envelope = decode(&bytes, &path)?;

        if envelope.design_factors != design_factors {
            return Err(DeseqError::ArtifactFormat {
                path,
                reason: format!(
                    "artifact was written for factors {:?}, requested {:?}",
                    envelope.design_factors, design_factors
                ),
            });
        }
        if envelope.crate_version != env!("CARGO_PKG_VERSION") {
            log::debug!("Artifact written by version {}", envelope.crate_version);
        }

        log::info!("Successfully loaded model: {}{}", ARTIFACT_PREFIX, artifact_key(design_factors));
        Ok(envelope.model)
    }

    /// Artifacts in the models directory, sorted by file name. A missing
    /// directory holds no artifacts.
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactEntry>> {
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let key = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(ARTIFACT_PREFIX))
                .and_then(|rest| rest.strip_suffix(&format!(".{}", ARTIFACT_EXTENSION)))
                .map(str::to_string);
            if let Some(key) = key {
                if path.is_file() {
                    artifacts.push(ArtifactEntry { path, key });
                }
            }
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }
}

/// Save to `../models/dds<key>.pkl`
pub fn save_model(model: &DeseqDataSet, design_factors: &[String]) -> Result<()> {
    ProjectLayout::default().save_model(model, design_factors).map(|_| ())
}

/// Load from `../models/dds<key>.pkl`
pub fn load_model(design_factors: &[String]) -> Result<DeseqDataSet> {
    ProjectLayout::default().load_model(design_factors)
}

pub fn artifact_path(design_factors: &[String]) -> PathBuf {
    ProjectLayout::default().artifact_path(design_factors)
}

pub fn list_artifacts() -> Result<Vec<ArtifactEntry>> {
    ProjectLayout::default().list_artifacts()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};
    use crate::inference::DefaultInference;
    use ndarray::array;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn factors(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn unfitted_model() -> DeseqDataSet {
        let samples = factors(&["s1", "s2", "s3", "s4"]);
        let counts = CountMatrix::new(
            array![[10.0, 12.0, 30.0, 28.0], [5.0, 6.0, 5.0, 4.0]],
            factors(&["g1", "g2"]),
            samples.clone(),
        )
        .unwrap();
        let mut metadata = SampleMetadata::new(samples);
        metadata.add_condition("condition", factors(&["A", "A", "B", "B"])).unwrap();
        let inference = Arc::new(DefaultInference::new(1).unwrap());
        DeseqDataSet::new(counts, metadata, &factors(&["condition"]), true, inference, 1).unwrap()
    }

    fn layout() -> (TempDir, ProjectLayout) {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::rooted(dir.path());
        fs::create_dir_all(&layout.models_dir).unwrap();
        (dir, layout)
    }

    #[test]
    fn test_artifact_key() {
        assert_eq!(artifact_key(&factors(&["condition"])), "_condition");
        assert_eq!(artifact_key(&factors(&["batch", "condition"])), "_batch_condition");
        assert_eq!(artifact_key(&[]), "");
    }

    #[test]
    fn test_key_is_order_sensitive() {
        let ab = factors(&["a", "b"]);
        let ba = factors(&["b", "a"]);
        assert_ne!(artifact_key(&ab), artifact_key(&ba));
        assert_eq!(normalized_artifact_key(&ab), normalized_artifact_key(&ba));
    }

    #[test]
    fn test_artifact_path() {
        let layout = ProjectLayout::rooted("/project");
        assert_eq!(
            layout.artifact_path(&factors(&["condition"])),
            PathBuf::from("/project/models/dds_condition.pkl")
        );
        assert!(artifact_path(&factors(&["x"])).ends_with("dds_x.pkl"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, layout) = layout();
        let model = unfitted_model();
        let key = factors(&["condition"]);

        let path = layout.save_model(&model, &key).unwrap();
        assert!(path.ends_with("dds_condition.pkl"));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"DDSA");

        let loaded = layout.load_model(&key).unwrap();
        assert_eq!(loaded.counts(), model.counts());
        assert_eq!(loaded.metadata(), model.metadata());
        assert_eq!(loaded.design_factors(), model.design_factors());
        assert_eq!(loaded.inference_cpus(), 1);
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let (_dir, layout) = layout();
        match layout.load_model(&factors(&["nothing"])) {
            Err(DeseqError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_corrupt_artifacts_rejected() {
        let (_dir, layout) = layout();
        let key = factors(&["condition"]);
        let path = layout.artifact_path(&key);

        fs::write(&path, b"PK\x03\x04garbage").unwrap();
        assert!(matches!(layout.load_model(&key), Err(DeseqError::ArtifactFormat { .. })));

        let mut future = b"DDSA".to_vec();
        future.extend_from_slice(&99u16.to_le_bytes());
        fs::write(&path, &future).unwrap();
        assert!(matches!(layout.load_model(&key), Err(DeseqError::ArtifactFormat { .. })));

        let good = encode(&unfitted_model(), &key).unwrap();
        fs::write(&path, &good[..good.len() / 2]).unwrap();
        assert!(matches!(layout.load_model(&key), Err(DeseqError::Decode(_))));
    }

    #[test]
    fn test_renamed_artifact_rejected() {
        let (_dir, layout) = layout();
        let written = factors(&["condition"]);
        let path = layout.save_model(&unfitted_model(), &written).unwrap();
        fs::rename(&path, layout.artifact_path(&factors(&["other"]))).unwrap();
        assert!(matches!(
            layout.load_model(&factors(&["other"])),
            Err(DeseqError::ArtifactFormat { .. })
        ));
    }

    #[test]
    fn test_list_artifacts() {
        let (_dir, layout) = layout();
        let model = unfitted_model();
        layout.save_model(&model, &factors(&["condition"])).unwrap();
        layout.save_model(&model, &factors(&["batch", "condition"])).unwrap();
        fs::write(layout.models_dir.join("notes.txt"), "").unwrap();

        let keys: Vec<String> = layout.list_artifacts().unwrap().into_iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["_batch_condition", "_condition"]);

        let empty = ProjectLayout::rooted(layout.models_dir.join("missing"));
        assert!(empty.list_artifacts().unwrap().is_empty());
    }
}
