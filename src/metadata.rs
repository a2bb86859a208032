//! Aggregated metadata table.
//!
//! Each repository returns differently shaped records, and even one
//! repository may return different columns for different projects. Tables
//! are merged by column name: the result carries the union of columns in
//! first-seen order and rows from both sides, with missing cells left empty.

use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::error::GrabError;
use crate::store::OutputDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_csv_str(text: &str) -> Result<Self, GrabError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let columns = reader
            .headers()
            .map_err(|err| GrabError::Metadata(err.to_string()))?
            .iter()
            .map(|value| value.trim().to_string())
            .collect::<Vec<_>>();
        let mut table = Self {
            columns,
            rows: Vec::new(),
        };
        for record in reader.records() {
            let record = record.map_err(|err| GrabError::Metadata(err.to_string()))?;
            // runinfo pads its output with blank lines and repeated headers
            if record.iter().all(|value| value.trim().is_empty()) {
                continue;
            }
            if record.iter().eq(table.columns.iter().map(String::as_str)) {
                continue;
            }
            let mut row = record.iter().map(str::to_string).collect::<Vec<_>>();
            row.resize(table.columns.len(), String::new());
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Builds a table from `(column, value)` records, each becoming one row.
    pub fn from_records<I, R>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::new();
        for record in records {
            table.push_record(record);
        }
        table
    }

    pub fn push_record<R>(&mut self, record: R)
    where
        R: IntoIterator<Item = (String, String)>,
    {
        let mut row = vec![String::new(); self.columns.len()];
        for (column, value) in record {
            let index = self.column_index_or_insert(&column);
            if index >= row.len() {
                row.resize(index + 1, String::new());
            }
            row[index] = value;
        }
        self.rows.push(row);
        self.pad_rows();
    }

    pub fn merge(&mut self, other: MetadataTable) {
        let mapping = other
            .columns
            .iter()
            .map(|column| self.column_index_or_insert(column))
            .collect::<Vec<_>>();
        self.pad_rows();
        for other_row in other.rows {
            let mut row = vec![String::new(); self.columns.len()];
            for (value, index) in other_row.into_iter().zip(&mapping) {
                row[*index] = value;
            }
            self.rows.push(row);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = HashMap<&str, &str>> {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }

    pub fn to_csv_string(&self) -> Result<String, GrabError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|err| GrabError::Metadata(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| GrabError::Metadata(err.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| GrabError::Metadata(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| GrabError::Metadata(err.to_string()))
    }

    /// Writes the table to `path`, appending to whatever table is already
    /// there so repeated runs accumulate rows.
    pub fn save(&self, path: &Utf8Path) -> Result<(), GrabError> {
        if self.columns.is_empty() {
            return Ok(());
        }
        let mut combined = if path.as_std_path().exists() {
            let existing = fs::read_to_string(path.as_std_path())
                .map_err(|err| GrabError::Filesystem(format!("read {path}: {err}")))?;
            Self::from_csv_str(&existing)?
        } else {
            Self::new()
        };
        combined.merge(self.clone());
        OutputDir::write_bytes_atomic(path, combined.to_csv_string()?.as_bytes())?;
        tracing::info!(path = %path, rows = combined.len(), "saved metadata table");
        Ok(())
    }

    fn column_index_or_insert(&mut self, column: &str) -> usize {
        match self.columns.iter().position(|existing| existing == column) {
            Some(index) => index,
            None => {
                self.columns.push(column.to_string());
                self.columns.len() - 1
            }
        }
    }

    fn pad_rows(&mut self) {
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}
