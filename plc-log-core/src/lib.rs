//! PLC Change Logger Library
//!
//! Polls a fixed list of controller tags and appends only the values that
//! changed, each stamped with the cycle time, to one or more sinks.
//!
//! # Architecture
//!
//! - [`TagSource`] reads one sample per declared tag, in a stable order
//! - [`ChangeTracker`] keeps the last-seen value per tag and emits the diff
//! - [`Sink`] backends record the changes: flat text, CSV, `.xlsx`
//!   workbook, or a remote Google sheet with row rotation
//! - [`PollLoop`] drives read → diff → write → sleep until stopped
//!
//! Credential acquisition and the raw controller protocol stay outside this
//! crate; they plug in through [`TokenProvider`] and [`TagSource`].
//!
//! # Example Usage
//!
//! ```no_run
//! use plc_log_core::{CsvSink, JsonFileSource, PollConfig, PollLoop, TrackedSink};
//! use std::time::Duration;
//!
//! let tags = vec!["Motor_Speed".to_string(), "Tank_Level".to_string()];
//! let source = JsonFileSource::new("snapshot.json", tags.clone());
//!
//! let mut poll = PollLoop::new(source, PollConfig::new().with_interval(Duration::from_secs(1)));
//! poll.add_sink(TrackedSink::new("csv", tags.len(), Box::new(CsvSink::new("changes.csv"))));
//!
//! poll.baseline().unwrap();
//! let stop = poll.stop_handle();
//! // hand `stop` to a signal handler, then:
//! poll.run().unwrap();
//! # drop(stop);
//! ```

// Public modules
pub mod auth;
pub mod poll;
pub mod sheets;
pub mod sinks;
pub mod source;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use auth::{StaticToken, TokenFile, TokenProvider};
pub use poll::{CycleReport, FailurePolicy, LoopStats, PollConfig, PollLoop, SinkOutcome, StopHandle};
pub use sheets::{HttpSheetsClient, SheetRequest, SheetsApi};
pub use sinks::{
    CsvSink, FlatSink, RemoteSheetSink, RowCap, SheetRotationConfig, Sink, TrackedSink,
    WorkbookConfig, WorkbookSink,
};
pub use source::{JsonFileSource, StaticSource, TagSource};
pub use tracker::{diff, ChangeTracker, TrackerState};
pub use types::{
    cycle_timestamp, format_timestamp, ChangeRecord, LoggerError, Result, Sample, TagValue,
    Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
