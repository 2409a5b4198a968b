//! Core types for the PLC change logger
//!
//! This module defines the values read from the controller, the change
//! records emitted by the tracker, and the error type shared by every sink.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the logger
pub type Timestamp = DateTime<Utc>;

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, LoggerError>;

/// Timestamp format written by every sink (19 characters, no zone suffix)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current UTC time truncated to whole seconds.
///
/// One value is taken per poll cycle and shared by all records of that cycle.
pub fn cycle_timestamp() -> Timestamp {
    Utc::now().trunc_subsecs(0)
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SS`
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Errors that can occur while reading tags or writing to a sink
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    WorkbookError(String),

    #[error("HTTP transport error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Remote sheet returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Tag source error: {0}")]
    SourceError(String),

    #[error("Sink {sink} failed: {message}")]
    SinkFailed { sink: String, message: String },
}

/// A value read from the controller
///
/// `Int` and `Float` are kept apart so that a change of type is visible to
/// the tracker even when the numeric value compares equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// No value (tag missing or unreadable)
    Null,
    /// Boolean tag (BOOL)
    Bool(bool),
    /// Integer tag (SINT/INT/DINT/LINT)
    Int(i64),
    /// Floating-point tag (REAL/LREAL)
    Float(f64),
    /// String tag
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Null => Ok(()),
            TagValue::Bool(v) => write!(f, "{}", v),
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

impl TagValue {
    /// Convert to a JSON scalar for the remote sheet
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TagValue::Null => serde_json::Value::Null,
            TagValue::Bool(v) => serde_json::Value::Bool(*v),
            TagValue::Int(v) => serde_json::Value::from(*v),
            TagValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(v.to_string())),
            TagValue::Text(v) => serde_json::Value::String(v.clone()),
        }
    }
}

/// One (tag, value) reading at a poll instant
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Tag name as declared on the controller
    pub tag: String,
    /// Value read this cycle
    pub value: TagValue,
}

impl Sample {
    pub fn new(tag: impl Into<String>, value: impl Into<TagValue>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// A (tag, value, timestamp) triplet emitted when a value changed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub tag: String,
    pub value: TagValue,
    pub timestamp: Timestamp,
}

impl ChangeRecord {
    /// Timestamp rendered in the sink format
    pub fn timestamp_str(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Row for the remote sheet: name, value, timestamp
    pub fn to_sheet_row(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.tag.clone()),
            self.value.to_json(),
            serde_json::Value::String(self.timestamp_str()),
        ]
    }
}
