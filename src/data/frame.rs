//! In-memory table with a row index and typed columns

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DeseqError, Result};

/// A single cell of a [`DataFrame`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Missing,
}

impl Value {
    /// Numeric view of the cell, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) | Value::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing ".0" so whole floats are read back as floats
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) => f.write_str(s),
            Value::Missing => Ok(()),
        }
    }
}

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Str,
}

/// Tabular data: one index column of row identifiers plus named columns.
/// Values are stored column-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    index_name: String,
    index: Vec<String>,
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Create a table from column-major data
    pub fn new(
        index_name: &str,
        index: Vec<String>,
        columns: Vec<String>,
        data: Vec<Vec<Value>>,
    ) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(DeseqError::DimensionMismatch {
                expected: format!("{} columns", columns.len()),
                got: format!("{} columns of data", data.len()),
            });
        }

        if let Some((name, col)) = columns
            .iter()
            .zip(data.iter())
            .find(|(_, col)| col.len() != index.len())
        {
            return Err(DeseqError::InvalidTable {
                reason: format!(
                    "column '{}' has {} values, index has {}",
                    name,
                    col.len(),
                    index.len()
                ),
            });
        }

        Ok(Self {
            index_name: index_name.to_string(),
            index,
            columns,
            data,
        })
    }

    /// Build from parts whose dimensions are already consistent
    pub(crate) fn from_parts(
        index_name: &str,
        index: Vec<String>,
        columns: Vec<String>,
        data: Vec<Vec<Value>>,
    ) -> Self {
        debug_assert_eq!(columns.len(), data.len());
        debug_assert!(data.iter().all(|col| col.len() == index.len()));
        Self {
            index_name: index_name.to_string(),
            index,
            columns,
            data,
        }
    }

    /// Create a table from raw text cells, inferring a type per column.
    /// `cells[col][row]` holds the unparsed text.
    pub fn from_text(
        index_name: &str,
        index: Vec<String>,
        columns: Vec<String>,
        cells: Vec<Vec<String>>,
    ) -> Result<Self> {
        let data = cells.into_iter().map(|col| infer_column(&col)).collect();
        Self::new(index_name, index, columns, data)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Row identifiers
    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a column by name
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.column_index(name).map(|j| self.data[j].as_slice())
    }

    /// Values of a column by position
    pub fn column_at(&self, j: usize) -> &[Value] {
        &self.data[j]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        self.data.get(col).and_then(|c| c.get(row))
    }

    /// Type of a column, ignoring missing cells. An all-missing column is `Str`.
    pub fn column_type(&self, j: usize) -> ColumnType {
        column_type_of(&self.data[j])
    }

    /// Row-major view of one row, index excluded
    pub fn row(&self, i: usize) -> Vec<&Value> {
        self.data.iter().map(|col| &col[i]).collect()
    }
}

fn column_type_of(values: &[Value]) -> ColumnType {
    let mut ty: Option<ColumnType> = None;
    for v in values {
        let cell = match v {
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Str(_) => return ColumnType::Str,
            Value::Missing => continue,
        };
        ty = Some(match (ty, cell) {
            (Some(ColumnType::Float), _) | (_, ColumnType::Float) => ColumnType::Float,
            _ => ColumnType::Int,
        });
    }
    ty.unwrap_or(ColumnType::Str)
}

/// Parse a column of text cells into the narrowest type that fits all of them
fn infer_column(cells: &[String]) -> Vec<Value> {
    let trimmed: Vec<&str> = cells.iter().map(|s| s.trim()).collect();
    let present = || trimmed.iter().filter(|s| !s.is_empty());

    if present().all(|s| s.parse::<i64>().is_ok()) && present().next().is_some() {
        return trimmed
            .iter()
            .map(|s| s.parse::<i64>().map(Value::Int).unwrap_or(Value::Missing))
            .collect();
    }

    if present().all(|s| s.parse::<f64>().is_ok()) && present().next().is_some() {
        return trimmed
            .iter()
            .map(|s| s.parse::<f64>().map(Value::Float).unwrap_or(Value::Missing))
            .collect();
    }

    trimmed
        .iter()
        .map(|s| {
            if s.is_empty() {
                Value::Missing
            } else {
                Value::Str(s.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_type_inference() {
        let df = DataFrame::from_text(
            "sample",
            strings(&["s1", "s2", "s3"]),
            strings(&["count", "ratio", "condition"]),
            vec![
                strings(&["10", "0", "7"]),
                strings(&["1.5", "2", ""]),
                strings(&["A", "A", "B"]),
            ],
        )
        .unwrap();

        assert_eq!(df.column_type(0), ColumnType::Int);
        assert_eq!(df.column_type(1), ColumnType::Float);
        assert_eq!(df.column_type(2), ColumnType::Str);
        assert_eq!(df.get(2, 1), Some(&Value::Missing));
        assert_eq!(df.column("count").unwrap()[0], Value::Int(10));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = DataFrame::new(
            "id",
            strings(&["a", "b"]),
            strings(&["x"]),
            vec![vec![Value::Int(1)]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_whole_float_keeps_decimal_point() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Int(2).to_string(), "2");
        assert_eq!(Value::Missing.to_string(), "");
    }
}
