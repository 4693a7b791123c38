//! CSV reading and writing of tables, with the first column as row index

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};

use super::paths::find_file;
use crate::config::ProjectLayout;
use crate::data::DataFrame;
use crate::error::{DeseqError, Result};

/// Read a CSV file. The first header cell names the index, the first
/// column of every row holds the row identifier.
pub fn read_dataframe<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path.as_ref())?;

    let header = reader.headers()?.clone();
    if header.is_empty() {
        return Err(DeseqError::InvalidTable {
            reason: format!("{} has no header", path.as_ref().display()),
        });
    }
    let index_name = header.get(0).unwrap_or_default().to_string();
    let columns: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record?;
        index.push(record.get(0).unwrap_or_default().to_string());
        for (j, field) in record.iter().skip(1).enumerate() {
            cells[j].push(field.to_string());
        }
    }

    DataFrame::from_text(&index_name, index, columns, cells)
}

/// Write a table as CSV, index column first. Overwrites silently; the
/// parent directory must exist.
pub fn write_dataframe<P: AsRef<Path>>(path: P, df: &DataFrame) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path.as_ref())?;

    let mut header = Vec::with_capacity(df.n_cols() + 1);
    header.push(df.index_name().to_string());
    header.extend(df.columns().iter().cloned());
    writer.write_record(&header)?;

    for (i, id) in df.index().iter().enumerate() {
        let mut record = Vec::with_capacity(df.n_cols() + 1);
        record.push(id.clone());
        record.extend(df.row(i).into_iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

impl ProjectLayout {
    /// Write `df` to `<data_dir>/<filename>`
    pub fn save_df(&self, df: &DataFrame, filename: &str) -> Result<PathBuf> {
        let path = self.data_dir.join(filename);
        write_dataframe(&path, df)?;
        log::debug!("Saved table {} ({} x {})", path.display(), df.n_rows(), df.n_cols());
        Ok(path)
    }

    /// Find `filename` under `search_dir` and read it
    pub fn load_df(&self, filename: &str) -> Result<DataFrame> {
        let path = find_file(filename, &self.search_dir).ok_or_else(|| DeseqError::FileNotFound {
            filename: filename.to_string(),
            search_dir: self.search_dir.clone(),
        })?;
        log::debug!("Loading table {}", path.display());
        read_dataframe(path)
    }
}

/// Write a table to `../data/<filename>`
pub fn save_df(df: &DataFrame, filename: &str) -> Result<()> {
    ProjectLayout::default().save_df(df, filename).map(|_| ())
}

/// Find `filename` under `<root>/data` and read it
pub fn load_df(filename: &str) -> Result<DataFrame> {
    ProjectLayout::default().load_df(filename)
}
