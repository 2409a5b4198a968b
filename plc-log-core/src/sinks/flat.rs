//! Flat text and CSV sinks
//!
//! Both append one line per change record to a UTF-8 file. The file is only
//! opened when there is something to write.

use super::Sink;
use crate::types::{ChangeRecord, Result};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default line format: `name - value - timestamp`
pub const FLAT_FORMAT: &str = "{name} - {value} - {timestamp}\n";

/// CSV line format: `name,value,timestamp`
pub const CSV_FORMAT: &str = "{name},{value},{timestamp}\n";

/// Append change records to a text file using a line template
///
/// The template understands the `{name}`, `{value}` and `{timestamp}`
/// placeholders.
#[derive(Debug, Clone)]
pub struct FlatSink {
    path: PathBuf,
    format: String,
}

impl FlatSink {
    /// Flat sink with the default ` - ` separated format
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_format(path, FLAT_FORMAT)
    }

    /// Flat sink with a custom line template
    pub fn with_format(path: impl AsRef<Path>, format: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format: format.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render one record with the line template
    pub fn format_record(&self, record: &ChangeRecord) -> String {
        let value = record.value.to_string();
        let timestamp = record.timestamp_str();
        render(
            &self.format,
            &[
                ("{name}", record.tag.as_str()),
                ("{value}", value.as_str()),
                ("{timestamp}", timestamp.as_str()),
                ("{0}", record.tag.as_str()),
                ("{1}", value.as_str()),
                ("{2}", timestamp.as_str()),
            ],
        )
    }
}

/// Single-pass placeholder substitution (substituted text is never rescanned)
fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match fields.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl Sink for FlatSink {
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writer.write_all(self.format_record(record).as_bytes())?;
        }
        writer.flush()?;

        log::debug!("Appended {} line(s) to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// Append change records as `name,value,timestamp` lines
#[derive(Debug, Clone)]
pub struct CsvSink {
    inner: FlatSink,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: FlatSink::with_format(path, CSV_FORMAT),
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

impl Sink for CsvSink {
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
        self.inner.write(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagValue;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    fn records() -> Vec<ChangeRecord> {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        vec![
            ChangeRecord { tag: "Speed".into(), value: TagValue::Float(12.5), timestamp: ts },
            ChangeRecord { tag: "Run".into(), value: TagValue::Bool(true), timestamp: ts },
        ]
    }

    #[test]
    fn test_flat_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut sink = FlatSink::new(&path);
        sink.write(&records()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Speed - 12.5 - 2024-05-06T07:08:09\nRun - true - 2024-05-06T07:08:09\n"
        );
    }

    #[test]
    fn test_csv_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::new(&path);
        sink.write(&records()).unwrap();
        sink.write(&records()[..1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Speed,12.5,2024-05-06T07:08:09");
        assert_eq!(lines[2], "Speed,12.5,2024-05-06T07:08:09");
    }

    #[test]
    fn test_empty_batch_does_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.txt");
        let mut sink = FlatSink::new(&path);
        sink.write(&[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_batch_leaves_content_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::new(&path);
        sink.write(&records()).unwrap();
        let before = fs::read(&path).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        sink.write(&[]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_custom_template_is_not_rescanned() {
        let sink = FlatSink::with_format("unused", "[{timestamp}] {name}={value} {other}\n");
        let record = ChangeRecord {
            tag: "{value}".into(),
            value: TagValue::Int(3),
            timestamp: records()[0].timestamp,
        };
        assert_eq!(
            sink.format_record(&record),
            "[2024-05-06T07:08:09] {value}=3 {other}\n"
        );
    }

    #[test]
    fn test_positional_template() {
        let sink = FlatSink::with_format("unused", "{2};{0};{1}\n");
        assert_eq!(
            sink.format_record(&records()[1]),
            "2024-05-06T07:08:09;Run;true\n"
        );
    }

    #[test]
    fn test_unwritable_destination_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("log.txt");
        let mut sink = FlatSink::new(&path);
        assert!(sink.write(&records()).is_err());
    }
}
