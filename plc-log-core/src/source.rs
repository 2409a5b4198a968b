//! Tag sources (controller-read boundary)
//!
//! A source returns one sample per declared tag, always in the declared
//! order, so the tracker can pair samples by position.

use crate::types::{LoggerError, Result, Sample, TagValue};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Anything that can read the current value of a fixed tag list
pub trait TagSource {
    /// Declared tags, in read order
    fn tags(&self) -> &[String];

    /// Read every tag once
    fn read(&mut self) -> Result<Vec<Sample>>;
}

impl<S: TagSource + ?Sized> TagSource for Box<S> {
    fn tags(&self) -> &[String] {
        (**self).tags()
    }

    fn read(&mut self) -> Result<Vec<Sample>> {
        (**self).read()
    }
}

/// Reads a JSON snapshot (`{"Tag": value, ...}`) on every poll
///
/// Whatever keeps the snapshot current (a gateway, a PLC bridge script) is
/// outside this crate. Tags absent from the snapshot read as `Null`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    tags: Vec<String>,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>, tags: Vec<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tags,
        }
    }
}

impl TagSource for JsonFileSource {
    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn read(&mut self) -> Result<Vec<Sample>> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            LoggerError::SourceError(format!("Failed to read snapshot {:?}: {}", self.path, e))
        })?;
        let mut snapshot: HashMap<String, TagValue> = serde_json::from_str(&content).map_err(|e| {
            LoggerError::SourceError(format!("Malformed snapshot {:?}: {}", self.path, e))
        })?;

        Ok(self
            .tags
            .iter()
            .map(|tag| Sample {
                tag: tag.clone(),
                value: snapshot.remove(tag).unwrap_or(TagValue::Null),
            })
            .collect())
    }
}

/// Scripted source: yields one row of values per read
///
/// Once the script is exhausted the last row repeats.
#[derive(Debug, Clone)]
pub struct StaticSource {
    tags: Vec<String>,
    rows: Vec<Vec<TagValue>>,
    next: usize,
}

impl StaticSource {
    pub fn new(tags: Vec<String>, rows: Vec<Vec<TagValue>>) -> Self {
        Self { tags, rows, next: 0 }
    }
}

impl TagSource for StaticSource {
    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn read(&mut self) -> Result<Vec<Sample>> {
        let row = self
            .rows
            .get(self.next)
            .or_else(|| self.rows.last())
            .ok_or_else(|| LoggerError::SourceError("Static source has no rows".to_string()))?;
        if self.next < self.rows.len() {
            self.next += 1;
        }

        Ok(self
            .tags
            .iter()
            .zip(row.iter().cloned().chain(std::iter::repeat(TagValue::Null)))
            .map(|(tag, value)| Sample {
                tag: tag.clone(),
                value,
            })
            .collect())
    }
}
