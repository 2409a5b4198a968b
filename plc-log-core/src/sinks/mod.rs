//! Logging sinks (flat text, CSV, workbook, remote sheet)
//!
//! Every backend implements [`Sink`]. The tracker/dispatch logic lives in
//! [`TrackedSink`], which pairs one sink with its own change tracker.

use crate::tracker::ChangeTracker;
use crate::types::{ChangeRecord, Result, Sample, Timestamp};

pub mod flat;
pub mod sheet;
pub mod workbook;

pub use flat::{CsvSink, FlatSink};
pub use sheet::{RemoteSheetSink, RowCap, SheetRotationConfig};
pub use workbook::{WorkbookConfig, WorkbookSink};

/// Common trait for all logging backends
///
/// `write` must not touch the destination when `records` is empty.
pub trait Sink {
    /// Durably record a batch of change records
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
        (**self).write(records)
    }
}

/// A sink together with the tracker that feeds it
pub struct TrackedSink {
    name: String,
    tracker: ChangeTracker,
    sink: Box<dyn Sink>,
}

impl TrackedSink {
    /// Wrap a sink with a tracker that reports every tag on the first cycle
    pub fn new(name: impl Into<String>, tag_count: usize, sink: Box<dyn Sink>) -> Self {
        Self {
            name: name.into(),
            tracker: ChangeTracker::unknown(tag_count),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diff `samples` against this sink's tracker and write the changes
    ///
    /// Returns the number of records handed to the sink.
    pub fn log_samples(&mut self, samples: &[Sample], timestamp: Timestamp) -> Result<usize> {
        let changed = self.tracker.diff(samples, timestamp);
        if !changed.is_empty() {
            log::trace!("{}: {} changed value(s)", self.name, changed.len());
        }
        self.sink.write(&changed)?;
        Ok(changed.len())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Sink that records every batch it receives
    #[derive(Clone, Default)]
    pub struct MemorySink {
        pub batches: Rc<RefCell<Vec<Vec<ChangeRecord>>>>,
        pub fail: bool,
    }

    impl Sink for MemorySink {
        fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
            if records.is_empty() {
                return Ok(());
            }
            if self.fail {
                return Err(crate::types::LoggerError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "sink offline",
                )));
            }
            self.batches.borrow_mut().push(records.to_vec());
            Ok(())
        }
    }

    thread_local! {
        static CAPTURED: RefCell<Vec<(log::Level, String)>> = RefCell::new(Vec::new());
    }

    /// Logger that keeps records on the emitting test's thread
    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED.with(|c| c.borrow_mut().push((record.level(), record.args().to_string())));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INSTALL: std::sync::Once = std::sync::Once::new();

    /// Run `f` and return its result with the log records it emitted
    pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<(log::Level, String)>) {
        INSTALL.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(log::LevelFilter::Trace);
            }
        });
        CAPTURED.with(|c| c.borrow_mut().clear());
        let out = f();
        let records = CAPTURED.with(|c| c.borrow_mut().drain(..).collect());
        (out, records)
    }
}
