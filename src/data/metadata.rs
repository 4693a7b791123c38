//! Sample metadata: experimental covariates per sample

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::frame::{ColumnType, DataFrame, Value};
use crate::error::{DeseqError, Result};

/// Sample metadata containing experimental conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    /// Categorical covariates (column name -> value per sample)
    conditions: BTreeMap<String, Vec<String>>,
    /// Continuous covariates (column name -> value per sample)
    continuous: BTreeMap<String, Vec<f64>>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                log::warn!("Duplicate sample ID detected: '{}'. Sample IDs should be unique.", id);
            }
        }
        Self {
            sample_ids,
            conditions: BTreeMap::new(),
            continuous: BTreeMap::new(),
        }
    }

    /// Add a categorical column
    pub fn add_condition(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.check_len(values.len())?;
        self.conditions.insert(name.to_string(), values);
        Ok(())
    }

    /// Add a continuous column
    pub fn add_continuous(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.check_len(values.len())?;
        self.continuous.insert(name.to_string(), values);
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.sample_ids.len() {
            return Err(DeseqError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", len),
            });
        }
        Ok(())
    }

    pub fn condition(&self, name: &str) -> Option<&Vec<String>> {
        self.conditions.get(name)
    }

    pub fn continuous(&self, name: &str) -> Option<&Vec<f64>> {
        self.continuous.get(name)
    }

    /// Sorted unique levels of a categorical column
    pub fn levels(&self, name: &str) -> Option<Vec<String>> {
        self.conditions.get(name).map(|values| {
            let mut unique = values.clone();
            unique.sort();
            unique.dedup();
            unique
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Reorder rows to follow `order`. Every id in `order` must be present.
    pub fn reordered(&self, order: &[String]) -> Result<Self> {
        let positions: Vec<usize> = order
            .iter()
            .map(|id| {
                self.sample_ids.iter().position(|s| s == id).ok_or_else(|| DeseqError::InvalidMetadata {
                    reason: format!("sample '{}' is missing from the metadata", id),
                })
            })
            .collect::<Result<_>>()?;

        let pick = |values: &Vec<String>| positions.iter().map(|&i| values[i].clone()).collect();
        Ok(Self {
            sample_ids: order.to_vec(),
            conditions: self.conditions.iter().map(|(k, v)| (k.clone(), pick(v))).collect(),
            continuous: self
                .continuous
                .iter()
                .map(|(k, v)| (k.clone(), positions.iter().map(|&i| v[i]).collect()))
                .collect(),
        })
    }
}

impl TryFrom<&DataFrame> for SampleMetadata {
    type Error = DeseqError;

    /// Rows of the table are samples. Text and integer columns become
    /// categorical, float columns continuous. Columns with missing cells are
    /// left out.
    fn try_from(df: &DataFrame) -> Result<Self> {
        if df.n_rows() == 0 {
            return Err(DeseqError::InvalidMetadata {
                reason: "No samples found in metadata".to_string(),
            });
        }

        let mut metadata = SampleMetadata::new(df.index().to_vec());
        for (j, name) in df.columns().iter().enumerate() {
            let values = df.column_at(j);
            if values.iter().any(Value::is_missing) {
                log::warn!("Metadata column '{}' has missing values and is ignored", name);
                continue;
            }
            match df.column_type(j) {
                ColumnType::Float => {
                    let numbers = values.iter().filter_map(Value::as_f64).collect();
                    metadata.add_continuous(name, numbers)?;
                }
                ColumnType::Int | ColumnType::Str => {
                    metadata.add_condition(name, values.iter().map(|v| v.to_string()).collect())?;
                }
            }
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_sample_metadata() {
        let mut meta = SampleMetadata::new(s(&["s1", "s2", "s3", "s4"]));
        meta.add_condition("treatment", s(&["control", "control", "treated", "treated"])).unwrap();

        assert_eq!(meta.levels("treatment").unwrap(), vec!["control", "treated"]);
        assert!(meta.add_condition("bad", s(&["a"])).is_err());
    }

    #[test]
    fn test_from_dataframe() {
        let df = DataFrame::from_text(
            "sample",
            s(&["s1", "s2", "s3"]),
            s(&["condition", "batch", "age", "note"]),
            vec![
                s(&["A", "A", "B"]),
                s(&["1", "2", "1"]),
                s(&["30.5", "41", "28"]),
                s(&["x", "", "y"]),
            ],
        )
        .unwrap();

        let meta = SampleMetadata::try_from(&df).unwrap();
        assert_eq!(meta.condition("condition").unwrap(), &s(&["A", "A", "B"]));
        assert_eq!(meta.condition("batch").unwrap(), &s(&["1", "2", "1"]));
        assert_eq!(meta.continuous("age").unwrap(), &vec![30.5, 41.0, 28.0]);
        assert!(meta.condition("note").is_none());
    }

    #[test]
    fn test_reordered() {
        let mut meta = SampleMetadata::new(s(&["s1", "s2", "s3"]));
        meta.add_condition("c", s(&["a", "b", "c"])).unwrap();
        meta.add_continuous("x", vec![1.0, 2.0, 3.0]).unwrap();

        let re = meta.reordered(&s(&["s3", "s1", "s2"])).unwrap();
        assert_eq!(re.condition("c").unwrap(), &s(&["c", "a", "b"]));
        assert_eq!(re.continuous("x").unwrap(), &vec![3.0, 1.0, 2.0]);

        assert!(meta.reordered(&s(&["s9"])).is_err());
    }
}
