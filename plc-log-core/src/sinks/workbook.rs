//! Workbook (.xlsx) sink
//!
//! Every non-empty batch re-reads the existing worksheet, appends the new
//! rows, applies the retained-row cap and rewrites the whole file. Old
//! content that cannot be read is treated as empty.

use super::Sink;
use crate::types::{ChangeRecord, LoggerError, Result, TagValue};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Workbook sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookConfig {
    /// Destination .xlsx file
    pub path: PathBuf,

    /// Number of data rows to keep (0 = unlimited)
    #[serde(default)]
    pub max_rows: usize,

    /// Header written when the file has none of its own
    #[serde(default = "default_headers")]
    pub headers: [String; 3],
}

fn default_headers() -> [String; 3] {
    ["Item".to_string(), "Value".to_string(), "Timestamp".to_string()]
}

impl WorkbookConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_rows: 0,
            headers: default_headers(),
        }
    }

    /// Builder method: set the retained-row cap
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Builder method: set the column headers
    pub fn with_headers(mut self, item: &str, value: &str, timestamp: &str) -> Self {
        self.headers = [item.to_string(), value.to_string(), timestamp.to_string()];
        self
    }
}

/// One data row of the worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookRow {
    pub item: String,
    pub value: TagValue,
    pub timestamp: String,
}

impl From<&ChangeRecord> for WorkbookRow {
    fn from(record: &ChangeRecord) -> Self {
        Self {
            item: record.tag.clone(),
            value: record.value.clone(),
            timestamp: record.timestamp_str(),
        }
    }
}

/// Header plus data rows of one worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookTable {
    pub headers: [String; 3],
    pub rows: Vec<WorkbookRow>,
}

/// Append change records to a capped .xlsx worksheet
pub struct WorkbookSink {
    config: WorkbookConfig,
}

impl WorkbookSink {
    pub fn new(config: WorkbookConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkbookConfig {
        &self.config
    }

    /// Existing table, or an empty one if the file is missing or unreadable
    fn load_previous(&self) -> WorkbookTable {
        let empty = WorkbookTable {
            headers: self.config.headers.clone(),
            rows: Vec::new(),
        };

        if !self.config.path.exists() {
            log::debug!("Workbook {:?} does not exist yet", self.config.path);
            return empty;
        }

        match read_table(&self.config.path) {
            Ok(Some(table)) => table,
            Ok(None) => empty,
            Err(e) => {
                log::warn!(
                    "Could not read workbook {:?}, starting from an empty table: {}",
                    self.config.path,
                    e
                );
                empty
            }
        }
    }
}

impl Sink for WorkbookSink {
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut table = self.load_previous();
        table.rows.extend(records.iter().map(WorkbookRow::from));

        let cap = self.config.max_rows;
        if cap > 0 && table.rows.len() > cap {
            let excess = table.rows.len() - cap;
            table.rows.drain(..excess);
        }

        write_table(&self.config.path, &table)?;
        log::debug!(
            "Rewrote workbook {:?} with {} row(s)",
            self.config.path,
            table.rows.len()
        );
        Ok(())
    }
}

/// Read the first worksheet; `None` when it has no rows at all
pub fn read_table(path: &Path) -> Result<Option<WorkbookTable>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| LoggerError::WorkbookError(format!("Failed to open {:?}: {}", path, e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoggerError::WorkbookError(format!("No worksheet in {:?}", path)))?
        .map_err(|e| LoggerError::WorkbookError(format!("Failed to read {:?}: {}", path, e)))?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(None),
    };

    let headers = [0, 1, 2].map(|i| header.get(i).map(cell_text).unwrap_or_default());
    let rows = rows
        .map(|row| WorkbookRow {
            item: row.first().map(cell_text).unwrap_or_default(),
            value: row.get(1).map(cell_value).unwrap_or(TagValue::Null),
            timestamp: row.get(2).map(cell_text).unwrap_or_default(),
        })
        .collect();

    Ok(Some(WorkbookTable { headers, rows }))
}

/// Rewrite the destination file from `table`
///
/// The workbook is written next to the destination and renamed over it, so
/// readers never see a half-written file.
pub fn write_table(path: &Path, table: &WorkbookTable) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, header) in table.headers.iter().enumerate() {
        sheet
            .write_string(0, col as u16, header.as_str())
            .map_err(xlsx_error)?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, row.item.as_str()).map_err(xlsx_error)?;
        match &row.value {
            TagValue::Null => {}
            TagValue::Bool(v) => {
                sheet.write_boolean(r, 1, *v).map_err(xlsx_error)?;
            }
            TagValue::Int(v) => {
                sheet.write_number(r, 1, *v as f64).map_err(xlsx_error)?;
            }
            TagValue::Float(v) => {
                sheet.write_number(r, 1, *v).map_err(xlsx_error)?;
            }
            TagValue::Text(v) => {
                sheet.write_string(r, 1, v.as_str()).map_err(xlsx_error)?;
            }
        }
        sheet
            .write_string(r, 2, row.timestamp.as_str())
            .map_err(xlsx_error)?;
    }

    let buffer = workbook.save_to_buffer().map_err(xlsx_error)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, buffer)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> LoggerError {
    LoggerError::WorkbookError(e.to_string())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> TagValue {
    match cell {
        Data::Empty => TagValue::Null,
        Data::Bool(v) => TagValue::Bool(*v),
        Data::Int(v) => TagValue::Int(*v),
        Data::Float(v) => TagValue::Float(*v),
        Data::String(v) => TagValue::Text(v.clone()),
        other => TagValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn batch(start: usize, count: usize) -> Vec<ChangeRecord> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (start..start + count)
            .map(|i| ChangeRecord {
                tag: format!("Tag{}", i),
                value: TagValue::Int(i as i64),
                timestamp: base + Duration::seconds(i as i64),
            })
            .collect()
    }

    fn read_back(path: &Path) -> WorkbookTable {
        read_table(path).unwrap().unwrap()
    }

    #[test]
    fn test_capped_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut sink = WorkbookSink::new(WorkbookConfig::new(&path).with_max_rows(5));

        sink.write(&batch(0, 3)).unwrap();
        sink.write(&batch(3, 4)).unwrap();

        let table = read_back(&path);
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.rows[0].item, "Tag2");
        assert_eq!(table.rows[4].item, "Tag6");
        assert_eq!(table.rows[4].timestamp, "2024-01-01T00:00:06");
    }

    #[test]
    fn test_uncapped_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut sink = WorkbookSink::new(WorkbookConfig::new(&path));

        sink.write(&batch(0, 3)).unwrap();
        sink.write(&batch(3, 4)).unwrap();

        let table = read_back(&path);
        assert_eq!(table.rows.len(), 7);
        assert_eq!(table.headers, default_headers());
    }

    #[test]
    fn test_existing_headers_are_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut first = WorkbookSink::new(WorkbookConfig::new(&path).with_headers("Tag", "Reading", "When"));
        first.write(&batch(0, 1)).unwrap();

        let mut second = WorkbookSink::new(WorkbookConfig::new(&path));
        second.write(&batch(1, 1)).unwrap();

        let table = read_back(&path);
        assert_eq!(table.headers, ["Tag".to_string(), "Reading".to_string(), "When".to_string()]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        fs::write(&path, b"not a workbook").unwrap();

        let mut sink = WorkbookSink::new(WorkbookConfig::new(&path));
        sink.write(&batch(0, 2)).unwrap();

        assert_eq!(read_back(&path).rows.len(), 2);
    }

    #[test]
    fn test_empty_batch_does_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut sink = WorkbookSink::new(WorkbookConfig::new(&path));
        sink.write(&[]).unwrap();
        assert!(!path.exists());
    }
}
