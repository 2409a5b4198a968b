//! Poll loop
//!
//! Reads the tag source, feeds every configured sink through its own
//! tracker, waits for the poll interval, and repeats until stopped.
//! Everything runs on the caller's thread; sinks are invoked one after the
//! other in configuration order.

use crate::sinks::TrackedSink;
use crate::source::TagSource;
use crate::types::{cycle_timestamp, LoggerError, Result, Sample, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting for the next cycle
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// What to do when a sink or the source fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the failure, keep running the other sinks and later cycles
    #[default]
    Isolate,
    /// Stop the loop on the first failure
    FailFast,
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Time between the end of one cycle and the start of the next
    #[serde(with = "seconds", default = "default_interval")]
    pub interval: Duration,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Stop after this many cycles (None = until stopped)
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_interval() -> Duration {
    Duration::from_millis(500)
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            failure_policy: FailurePolicy::default(),
            max_cycles: None,
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Builder method: set the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder method: bound the number of cycles
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }
}

/// Interval as fractional seconds in config files
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Requests the RUNNING -> STOPPED transition from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the loop at the start of its next cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Outcome of one sink in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOutcome {
    pub sink: String,
    pub changes: usize,
    pub error: Option<String>,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp: Timestamp,
    pub sinks: Vec<SinkOutcome>,
}

impl CycleReport {
    /// Total records handed to sinks
    pub fn total_changes(&self) -> usize {
        self.sinks.iter().map(|s| s.changes).sum()
    }

    pub fn failures(&self) -> usize {
        self.sinks.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Counters accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub records_written: u64,
    pub sink_failures: u64,
    pub source_failures: u64,
}

/// The RUNNING/STOPPED poll loop
pub struct PollLoop<S: TagSource> {
    source: S,
    sinks: Vec<TrackedSink>,
    config: PollConfig,
    running: Arc<AtomicBool>,
    stats: LoopStats,
}

impl<S: TagSource> PollLoop<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self {
            source,
            sinks: Vec::new(),
            config,
            running: Arc::new(AtomicBool::new(true)),
            stats: LoopStats::default(),
        }
    }

    /// Add a sink; sinks run in the order they are added
    pub fn add_sink(&mut self, sink: TrackedSink) {
        log::info!("Logging to {}", sink.name());
        self.sinks.push(sink);
    }

    /// Builder form of [`PollLoop::add_sink`]
    pub fn with_sink(mut self, sink: TrackedSink) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn tag_count(&self) -> usize {
        self.source.tags().len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Take a baseline read and check it against the declared tags
    ///
    /// The trackers still start from "unknown", so the first cycle reports
    /// every tag once.
    pub fn baseline(&mut self) -> Result<Vec<Sample>> {
        let samples = self.source.read()?;
        let declared = self.source.tags();
        if samples.len() != declared.len() {
            return Err(LoggerError::SourceError(format!(
                "Source returned {} samples for {} declared tags",
                samples.len(),
                declared.len()
            )));
        }
        if let Some((sample, tag)) = samples.iter().zip(declared).find(|(s, t)| s.tag != **t) {
            return Err(LoggerError::SourceError(format!(
                "Source returned tag {} where {} was declared",
                sample.tag, tag
            )));
        }
        log::info!("Baseline read of {} tag(s) complete", samples.len());
        Ok(samples)
    }

    /// Read once and dispatch to every sink
    ///
    /// A source failure is returned as an error. Sink failures are recorded
    /// in the report; other sinks still run.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let samples = self.source.read()?;
        let timestamp = cycle_timestamp();
        Ok(self.dispatch(&samples, timestamp))
    }

    /// Feed one set of samples to every sink with a shared timestamp
    pub fn dispatch(&mut self, samples: &[Sample], timestamp: Timestamp) -> CycleReport {
        let mut outcomes = Vec::with_capacity(self.sinks.len());

        for sink in &mut self.sinks {
            let outcome = match sink.log_samples(samples, timestamp) {
                Ok(changes) => SinkOutcome {
                    sink: sink.name().to_string(),
                    changes,
                    error: None,
                },
                Err(e) => {
                    log::error!("Sink {} failed: {}", sink.name(), e);
                    SinkOutcome {
                        sink: sink.name().to_string(),
                        changes: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        self.stats.cycles += 1;
        let report = CycleReport {
            timestamp,
            sinks: outcomes,
        };
        self.stats.records_written += report.total_changes() as u64;
        self.stats.sink_failures += report.failures() as u64;

        if report.total_changes() > 0 {
            log::debug!(
                "Cycle {}: {} change(s) across {} sink(s)",
                self.stats.cycles,
                report.total_changes(),
                report.sinks.len()
            );
        }
        report
    }

    /// Run until stopped (or until `max_cycles` is reached)
    pub fn run(&mut self) -> Result<LoopStats> {
        log::info!(
            "Polling {} tag(s) every {:?} into {} sink(s)",
            self.tag_count(),
            self.config.interval,
            self.sinks.len()
        );

        while self.running.load(Ordering::SeqCst) {
            if let Some(max) = self.config.max_cycles {
                if self.stats.cycles + self.stats.source_failures >= max {
                    break;
                }
            }

            let started = Instant::now();
            match self.run_cycle() {
                Ok(report) => {
                    if self.config.failure_policy == FailurePolicy::FailFast {
                        if let Some(failed) = report.sinks.iter().find(|s| s.error.is_some()) {
                            return Err(LoggerError::SinkFailed {
                                sink: failed.sink.clone(),
                                message: failed.error.clone().unwrap_or_default(),
                            });
                        }
                    }
                }
                Err(e) => {
                    self.stats.source_failures += 1;
                    if self.config.failure_policy == FailurePolicy::FailFast {
                        return Err(e);
                    }
                    log::error!("Tag read failed, skipping cycle: {}", e);
                }
            }
            log::trace!("Cycle took {:?}", started.elapsed());

            self.wait(self.config.interval);
        }

        log::info!(
            "Poll loop stopped after {} cycle(s), {} record(s) written",
            self.stats.cycles,
            self.stats.records_written
        );
        Ok(self.stats)
    }

    /// Sleep for `interval`, returning early once a stop is requested
    fn wait(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
        }
    }
}
