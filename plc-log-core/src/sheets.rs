//! Google Sheets v4 wire client
//!
//! Only the three calls the remote sink needs are modelled: values.append,
//! values.update and spreadsheets.batchUpdate. Structural edits are typed so
//! the JSON matches the REST contract field for field.

use crate::auth::TokenProvider;
use crate::types::{LoggerError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default REST endpoint for spreadsheets
pub const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// A1 range on a named sheet, e.g. `'PLCLOGPOC'!A3`
pub fn a1_range(sheet_name: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet_name.replace('\'', "''"), cells)
}

/// Remote spreadsheet primitives
pub trait SheetsApi {
    /// Insert `rows` after the table found at `range`, shifting rows down
    fn append(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value>;

    /// Overwrite the cells of `range` with `rows`
    fn update(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value>;

    /// Apply structural edits atomically
    fn batch_update(&self, spreadsheet_id: &str, requests: &[SheetRequest]) -> Result<Value>;
}

/// Response of values.append (only the fields the sink reads)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppendResponse {
    #[serde(default)]
    pub updates: Option<UpdateValuesResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: String,
}

impl AppendResponse {
    /// Range the service reports as written, e.g. `PLCLOGPOC!A41:C46`
    pub fn updated_range(&self) -> &str {
        self.updates
            .as_ref()
            .map(|u| u.updated_range.as_str())
            .unwrap_or("")
    }
}

/// One structural edit of a batchUpdate request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetRequest {
    RepeatCell(RepeatCellRequest),
    DeleteDimension(DeleteDimensionRequest),
}

/// Fill every cell of `range` with `cell`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatCellRequest {
    pub range: GridRange,
    pub cell: CellData,
    pub fields: String,
}

/// Zero-based, end-exclusive rectangle on one sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    pub sheet_id: i64,
    pub start_row_index: u32,
    pub end_row_index: u32,
    pub start_column_index: u32,
    pub end_column_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellData {
    pub user_entered_value: ExtendedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedValue {
    pub formula_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDimensionRequest {
    pub range: DimensionRange,
}

/// Zero-based, end-exclusive span of rows or columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRange {
    pub sheet_id: i64,
    pub dimension: Dimension,
    pub start_index: u32,
    pub end_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dimension {
    Rows,
    Columns,
}

impl SheetRequest {
    /// Write `formula` into every cell of `range`
    pub fn repeat_formula(range: GridRange, formula: impl Into<String>) -> Self {
        SheetRequest::RepeatCell(RepeatCellRequest {
            range,
            cell: CellData {
                user_entered_value: ExtendedValue {
                    formula_value: formula.into(),
                },
            },
            fields: "userEnteredValue".to_string(),
        })
    }

    /// Delete rows `[start, end)` (zero-based)
    pub fn delete_rows(sheet_id: i64, start: u32, end: u32) -> Self {
        SheetRequest::DeleteDimension(DeleteDimensionRequest {
            range: DimensionRange {
                sheet_id,
                dimension: Dimension::Rows,
                start_index: start,
                end_index: end,
            },
        })
    }
}

#[derive(Serialize)]
struct ValueRange<'a> {
    values: &'a [Vec<Value>],
}

#[derive(Serialize)]
struct BatchUpdateBody<'a> {
    requests: &'a [SheetRequest],
}

/// Blocking HTTP implementation of [`SheetsApi`]
pub struct HttpSheetsClient {
    client: Client,
    token: Box<dyn TokenProvider>,
    endpoint: String,
}

impl HttpSheetsClient {
    /// Client against the public endpoint with no request timeout
    pub fn new(token: Box<dyn TokenProvider>) -> Result<Self> {
        Self::with_options(token, SHEETS_ENDPOINT, None)
    }

    /// Client against a custom endpoint, optionally with a request timeout
    pub fn with_options(
        token: Box<dyn TokenProvider>,
        endpoint: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            endpoint: endpoint.into(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| LoggerError::ConfigError(format!("Invalid endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| LoggerError::ConfigError(format!("Endpoint cannot take a path: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Value> {
        let token = self.token.access_token()?;
        let response = request.bearer_auth(token).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(LoggerError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        log::trace!("Sheets response: {}", body);
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl SheetsApi for HttpSheetsClient {
    fn append(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value> {
        let url = self.url(&[spreadsheet_id, "values", &format!("{}:append", range)])?;
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&ValueRange { values: rows });
        self.send(request)
    }

    fn update(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Value>]) -> Result<Value> {
        let url = self.url(&[spreadsheet_id, "values", range])?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&ValueRange { values: rows });
        self.send(request)
    }

    fn batch_update(&self, spreadsheet_id: &str, requests: &[SheetRequest]) -> Result<Value> {
        let url = self.url(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        let request = self.client.post(url).json(&BatchUpdateBody { requests });
        self.send(request)
    }
}
