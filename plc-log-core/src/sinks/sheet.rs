//! Remote spreadsheet sink with row rotation
//!
//! Sheet layout (one-based rows, fixed for the life of the sheet):
//!
//! ```text
//!         A            B        C          D
//!   1     Item         Value    Timestamp  <- header
//!   2     Last-update  <time>   <time>     <- marker
//!   3     <name>       <value>  <time>     <- data ...
//! ```
//!
//! Each non-empty batch is appended at row 3. When the service reports that
//! the last written row is beyond the cap, a single batchUpdate fills the
//! parsed-time formula in column D and deletes data rows 3..=7. The marker
//! row is refreshed after every batch.

use super::Sink;
use crate::sheets::{a1_range, AppendResponse, GridRange, SheetRequest, SheetsApi};
use crate::types::{format_timestamp, ChangeRecord, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Lowest accepted row cap; keeps the header and marker rows out of reach
pub const MIN_ROW_CAP: u32 = 20;

/// First data row (one-based)
pub const FIRST_DATA_ROW: u32 = 3;

/// Rows removed per rotation
pub const ROTATION_BLOCK: u32 = 5;

/// Column D formula: parse the column C timestamp into a date+time value
pub const PARSED_TIME_FORMULA: &str = concat!(
    "=if(C3=\"\"",
    ",\"\"",
    ",date(left(C3,4),right(left(C3,7),2),right(left(C3,10),2))",
    "+time(left(right(C3,8),2),left(right(C3,5),2),right(C3,2))",
    ")"
);

fn updated_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":C(\d+)$").expect("static regex"))
}

/// Last written row from an updated range such as `PLCLOGPOC!A41:C46`
///
/// Returns `None` when the range does not end in a column C reference.
pub fn parse_last_row(updated_range: &str) -> Option<u32> {
    updated_range_regex()
        .captures(updated_range)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Requested and effective row cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCap {
    pub requested: u32,
    pub effective: u32,
}

impl RowCap {
    /// Apply the floor of [`MIN_ROW_CAP`]
    pub fn from_requested(requested: u32) -> Self {
        Self {
            requested,
            effective: requested.max(MIN_ROW_CAP),
        }
    }

    /// True when the requested cap was raised to the floor
    pub fn was_raised(&self) -> bool {
        self.effective > self.requested
    }
}

/// Remote sheet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRotationConfig {
    /// Spreadsheet identifier (from the sheet URL)
    pub spreadsheet_id: String,

    /// Name of the sheet (tab) that receives the rows
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Numeric grid id of the sheet, used by structural edits
    #[serde(default)]
    pub sheet_id: i64,

    /// Approximate row count at which old rows are removed
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,

    /// Echo request and response payloads at info level
    #[serde(default)]
    pub debug: bool,
}

fn default_sheet_name() -> String {
    "PLCLOGPOC".to_string()
}

fn default_max_rows() -> u32 {
    200
}

impl SheetRotationConfig {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: default_sheet_name(),
            sheet_id: 0,
            max_rows: default_max_rows(),
            debug: false,
        }
    }

    /// Builder method: set the sheet (tab) name
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    /// Builder method: set the numeric sheet id
    pub fn with_sheet_id(mut self, sheet_id: i64) -> Self {
        self.sheet_id = sheet_id;
        self
    }

    /// Builder method: set the requested row cap
    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Builder method: enable payload echo
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Structural edits issued when the table outgrows the cap
///
/// `last_row` is the one-based last written row; the formula covers data
/// rows 3..=last_row and the delete removes data rows 3..=7.
pub fn rotation_requests(sheet_id: i64, last_row: u32) -> Vec<SheetRequest> {
    let first = FIRST_DATA_ROW - 1;
    vec![
        SheetRequest::repeat_formula(
            GridRange {
                sheet_id,
                start_row_index: first,
                end_row_index: last_row,
                start_column_index: 3,
                end_column_index: 4,
            },
            PARSED_TIME_FORMULA,
        ),
        SheetRequest::delete_rows(sheet_id, first, first + ROTATION_BLOCK),
    ]
}

/// Append change records to a remote sheet and keep it bounded
pub struct RemoteSheetSink {
    config: SheetRotationConfig,
    cap: RowCap,
    api: Box<dyn SheetsApi>,
}

impl RemoteSheetSink {
    /// Create the sink, raising a too-small cap to [`MIN_ROW_CAP`]
    pub fn new(config: SheetRotationConfig, api: Box<dyn SheetsApi>) -> Self {
        let cap = RowCap::from_requested(config.max_rows);
        if cap.was_raised() {
            log::warn!(
                "Limiting sheet {} to minimum of {} rows instead of requested {} rows",
                config.spreadsheet_id,
                cap.effective,
                cap.requested
            );
        }
        Self { config, cap, api }
    }

    pub fn row_cap(&self) -> RowCap {
        self.cap
    }

    pub fn config(&self) -> &SheetRotationConfig {
        &self.config
    }

    /// Rotate if the service wrote past the cap; errors are logged, not returned
    fn maybe_rotate(&self, updated_range: &str) {
        let last_row = match parse_last_row(updated_range) {
            Some(row) => row,
            None => {
                log::debug!("No row number in updated range {:?}, skipping rotation", updated_range);
                return;
            }
        };

        if last_row <= self.cap.effective {
            return;
        }

        let requests = rotation_requests(self.config.sheet_id, last_row);
        if self.config.debug {
            log::info!("batchUpdate request: {:?}", requests);
        }

        match self.api.batch_update(&self.config.spreadsheet_id, &requests) {
            Ok(result) => {
                log::info!(
                    "Rotated sheet {}: last row {} exceeded cap {}, removed {} rows",
                    self.config.sheet_name,
                    last_row,
                    self.cap.effective,
                    ROTATION_BLOCK
                );
                if self.config.debug {
                    log::info!("batchUpdate result: {}", result);
                }
            }
            Err(e) if self.config.debug => {
                log::warn!("Row rotation failed on sheet {}: {}", self.config.sheet_name, e);
            }
            Err(e) => {
                log::debug!("Row rotation failed on sheet {}: {}", self.config.sheet_name, e);
            }
        }
    }
}

impl Sink for RemoteSheetSink {
    fn write(&mut self, records: &[ChangeRecord]) -> Result<()> {
        let first = match records.first() {
            Some(first) => first,
            None => return Ok(()),
        };

        let rows: Vec<Vec<Value>> = records.iter().map(ChangeRecord::to_sheet_row).collect();
        let append_range = a1_range(&self.config.sheet_name, &format!("A{}", FIRST_DATA_ROW));
        if self.config.debug {
            log::info!("append {} rows: {:?}", append_range, rows);
        }
        let result = self
            .api
            .append(&self.config.spreadsheet_id, &append_range, &rows)?;
        if self.config.debug {
            log::info!("append result: {}", result);
        }

        let response: AppendResponse = serde_json::from_value(result).unwrap_or_default();
        self.maybe_rotate(response.updated_range());

        let now = Value::String(format_timestamp(&first.timestamp));
        let marker = vec![vec![now.clone(), now]];
        let marker_range = a1_range(&self.config.sheet_name, "B2:C2");
        let result = self
            .api
            .update(&self.config.spreadsheet_id, &marker_range, &marker)?;
        if self.config.debug {
            log::info!("update result: {}", result);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Dimension;
    use crate::sinks::testing::capture_logs;
    use crate::types::{LoggerError, TagValue};
    use chrono::{TimeZone, Utc};
    use log::Level;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Append(String, Vec<Vec<Value>>),
        Update(String, Vec<Vec<Value>>),
        BatchUpdate(Vec<SheetRequest>),
    }

    #[derive(Clone, Default)]
    struct FakeSheets {
        calls: Rc<RefCell<Vec<Call>>>,
        updated_range: String,
        fail_append: bool,
        fail_batch: bool,
        fail_update: bool,
    }

    impl FakeSheets {
        fn reporting(updated_range: &str) -> Self {
            Self {
                updated_range: updated_range.to_string(),
                ..Default::default()
            }
        }

        fn batch_updates(&self) -> Vec<Vec<SheetRequest>> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    Call::BatchUpdate(r) => Some(r.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl SheetsApi for FakeSheets {
        fn append(&self, _id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value> {
            self.calls.borrow_mut().push(Call::Append(range.to_string(), rows.to_vec()));
            if self.fail_append {
                return Err(LoggerError::Remote { status: 403, body: "forbidden".into() });
            }
            Ok(json!({"updates": {"updatedRange": self.updated_range}}))
        }

        fn update(&self, _id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value> {
            self.calls.borrow_mut().push(Call::Update(range.to_string(), rows.to_vec()));
            if self.fail_update {
                return Err(LoggerError::Remote { status: 503, body: "unavailable".into() });
            }
            Ok(json!({}))
        }

        fn batch_update(&self, _id: &str, requests: &[SheetRequest]) -> Result<Value> {
            self.calls.borrow_mut().push(Call::BatchUpdate(requests.to_vec()));
            if self.fail_batch {
                return Err(LoggerError::Remote { status: 500, body: "boom".into() });
            }
            Ok(json!({}))
        }
    }

    fn records() -> Vec<ChangeRecord> {
        let ts = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        vec![
            ChangeRecord { tag: "A".into(), value: TagValue::Int(2), timestamp: ts },
            ChangeRecord { tag: "B".into(), value: TagValue::Float(0.5), timestamp: ts },
        ]
    }

    fn sink(fake: &FakeSheets, max_rows: u32) -> RemoteSheetSink {
        RemoteSheetSink::new(
            SheetRotationConfig::new("sheet-id").with_max_rows(max_rows),
            Box::new(fake.clone()),
        )
    }

    #[test]
    fn test_parse_last_row() {
        assert_eq!(parse_last_row("PLCLOGPOC!A41:C46"), Some(46));
        assert_eq!(parse_last_row("'My Log'!A3:C3"), Some(3));
        assert_eq!(parse_last_row("PLCLOGPOC!A41:B46"), None);
        assert_eq!(parse_last_row("PLCLOGPOC!A41:C46x"), None);
        assert_eq!(parse_last_row(""), None);
    }

    #[test]
    fn test_row_cap_floor() {
        let cap = RowCap::from_requested(5);
        assert_eq!(cap.effective, 20);
        assert!(cap.was_raised());

        let cap = RowCap::from_requested(200);
        assert_eq!(cap.effective, 200);
        assert!(!cap.was_raised());
    }

    #[test]
    fn test_small_cap_is_raised_not_rejected() {
        let fake = FakeSheets::default();
        let (sink, logs) = capture_logs(|| sink(&fake, 5));
        assert_eq!(sink.row_cap().effective, 20);
        assert_eq!(sink.row_cap().requested, 5);

        let warnings: Vec<_> = logs.iter().filter(|(level, _)| *level == Level::Warn).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].1.contains("minimum of 20 rows instead of requested 5"));
    }

    #[test]
    fn test_cap_at_floor_does_not_warn() {
        let fake = FakeSheets::default();
        for max_rows in [20, 200] {
            let (_sink, logs) = capture_logs(|| sink(&fake, max_rows));
            assert!(logs.iter().all(|(level, _)| *level != Level::Warn));
        }
    }

    #[test]
    fn test_debug_mode_echoes_payloads_at_info() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A20:C21");
        let mut sink = RemoteSheetSink::new(
            SheetRotationConfig::new("sheet-id").with_max_rows(20).with_debug(true),
            Box::new(fake.clone()),
        );
        let (result, logs) = capture_logs(|| sink.write(&records()));
        result.unwrap();

        let echoed: Vec<_> = logs
            .iter()
            .filter(|(level, _)| *level == Level::Info)
            .map(|(_, msg)| msg.as_str())
            .collect();
        assert!(echoed.iter().any(|m| m.starts_with("append 'PLCLOGPOC'!A3 rows")));
        assert!(echoed.iter().any(|m| m.starts_with("append result")));
        assert!(echoed.iter().any(|m| m.starts_with("batchUpdate request")));
        assert!(echoed.iter().any(|m| m.starts_with("update result")));
    }

    #[test]
    fn test_payloads_not_echoed_without_debug() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A10:C11");
        let mut sink = sink(&fake, 200);
        let (result, logs) = capture_logs(|| sink.write(&records()));
        result.unwrap();
        assert!(logs.iter().all(|(_, msg)| !msg.contains("result")));
    }

    #[test]
    fn test_append_then_marker() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A10:C11");
        let mut sink = sink(&fake, 200);
        sink.write(&records()).unwrap();

        let calls = fake.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            Call::Append(
                "'PLCLOGPOC'!A3".into(),
                vec![
                    vec![json!("A"), json!(2), json!("2024-02-03T04:05:06")],
                    vec![json!("B"), json!(0.5), json!("2024-02-03T04:05:06")],
                ]
            )
        );
        assert_eq!(
            calls[1],
            Call::Update(
                "'PLCLOGPOC'!B2:C2".into(),
                vec![vec![json!("2024-02-03T04:05:06"), json!("2024-02-03T04:05:06")]]
            )
        );
    }

    #[test]
    fn test_rotation_past_cap() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A20:C21");
        let mut sink = sink(&fake, 20);
        sink.write(&records()).unwrap();

        let batches = fake.batch_updates();
        assert_eq!(batches.len(), 1);
        let requests = &batches[0];
        assert_eq!(requests.len(), 2);

        match &requests[0] {
            SheetRequest::RepeatCell(r) => {
                assert_eq!(r.range.start_row_index, 2);
                assert_eq!(r.range.end_row_index, 21);
                assert_eq!(r.range.start_column_index, 3);
                assert_eq!(r.range.end_column_index, 4);
                assert_eq!(r.cell.user_entered_value.formula_value, PARSED_TIME_FORMULA);
            }
            other => panic!("expected repeatCell, got {:?}", other),
        }
        match &requests[1] {
            SheetRequest::DeleteDimension(d) => {
                assert_eq!(d.range.dimension, Dimension::Rows);
                assert_eq!((d.range.start_index, d.range.end_index), (2, 7));
            }
            other => panic!("expected deleteDimension, got {:?}", other),
        }

        // Marker is refreshed after the rotation
        assert!(matches!(fake.calls.borrow().last(), Some(Call::Update(_, _))));
    }

    #[test]
    fn test_no_rotation_at_cap() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A19:C20");
        let mut sink = sink(&fake, 20);
        sink.write(&records()).unwrap();
        assert!(fake.batch_updates().is_empty());
    }

    #[test]
    fn test_unparseable_range_skips_rotation() {
        let fake = FakeSheets::reporting("garbage");
        let mut sink = sink(&fake, 20);
        sink.write(&records()).unwrap();
        assert!(fake.batch_updates().is_empty());
        assert_eq!(fake.calls.borrow().len(), 2);
    }

    #[test]
    fn test_rotation_failure_is_swallowed() {
        let mut fake = FakeSheets::reporting("PLCLOGPOC!A100:C101");
        fake.fail_batch = true;
        let mut sink = sink(&fake, 20);
        sink.write(&records()).unwrap();

        let calls = fake.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[2], Call::Update(_, _)));
    }

    #[test]
    fn test_append_failure_is_surfaced_without_marker() {
        let mut fake = FakeSheets::reporting("PLCLOGPOC!A3:C4");
        fake.fail_append = true;
        let mut sink = sink(&fake, 20);
        let err = sink.write(&records()).unwrap_err();
        assert!(matches!(err, LoggerError::Remote { status: 403, .. }));

        let calls = fake.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Append(_, _)));
    }

    #[test]
    fn test_marker_failure_is_surfaced() {
        let mut fake = FakeSheets::reporting("PLCLOGPOC!A3:C4");
        fake.fail_update = true;
        let mut sink = sink(&fake, 20);
        let err = sink.write(&records()).unwrap_err();
        assert!(matches!(err, LoggerError::Remote { status: 503, .. }));
    }

    #[test]
    fn test_empty_batch_issues_no_calls() {
        let fake = FakeSheets::reporting("PLCLOGPOC!A100:C101");
        let mut sink = sink(&fake, 20);
        sink.write(&[]).unwrap();
        assert!(fake.calls.borrow().is_empty());
    }
}
