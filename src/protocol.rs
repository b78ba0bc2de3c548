//! Wire format of the `/_sql` endpoint.
//!
//! Request bodies carry the statement plus either positional `args` or
//! `bulk_args`. Successful responses decode into a [`ResultBatch`]; error
//! responses decode into one of the server-reported [`MonkError`] kinds.

use crate::error::{MonkError, MonkResult};
use crate::types::{DataType, TypeDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Bind values for a statement. Single and bulk arguments are exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlArgs {
    #[default]
    None,
    /// Positional parameters for one execution.
    Args(Vec<JsonValue>),
    /// One parameter list per execution of the same statement.
    Bulk(Vec<Vec<JsonValue>>),
}

impl From<Vec<JsonValue>> for SqlArgs {
    fn from(args: Vec<JsonValue>) -> Self {
        SqlArgs::Args(args)
    }
}

impl From<Vec<Vec<JsonValue>>> for SqlArgs {
    fn from(bulk: Vec<Vec<JsonValue>>) -> Self {
        SqlArgs::Bulk(bulk)
    }
}

/// JSON body sent to `/_sql`.
#[derive(Debug, Serialize)]
pub struct SqlRequest<'a> {
    pub stmt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<&'a [JsonValue]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk_args: Option<&'a [Vec<JsonValue>]>,
}

impl<'a> SqlRequest<'a> {
    pub fn new(stmt: &'a str, args: &'a SqlArgs) -> Self {
        let (args, bulk_args) = match args {
            SqlArgs::None => (None, None),
            SqlArgs::Args(a) => (Some(a.as_slice()), None),
            SqlArgs::Bulk(b) => (None, Some(b.as_slice())),
        };
        Self {
            stmt,
            args,
            bulk_args,
        }
    }
}

/// Outcome of one entry of a bulk execution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultInfo {
    #[serde(default = "unknown_rowcount")]
    pub rowcount: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ResultInfo {
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Decoded response of one statement execution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultBatch {
    #[serde(default)]
    pub cols: Vec<String>,
    #[serde(default)]
    pub col_types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
    /// `-1` when not applicable, e.g. for DDL.
    #[serde(default = "unknown_rowcount")]
    pub rowcount: i64,
    /// Server-side execution time in milliseconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub results: Option<Vec<ResultInfo>>,
}

fn unknown_rowcount() -> i64 {
    -1
}

impl ResultBatch {
    /// Decode and validate a response body.
    pub fn from_json(body: JsonValue) -> MonkResult<Self> {
        let mut batch: ResultBatch = serde_json::from_value(body)?;
        // Servers that omit `col_types` still name their columns.
        if batch.col_types.is_empty() {
            batch.col_types = vec![TypeDescriptor::Base(DataType::NotSupported); batch.cols.len()];
        }
        batch.validate()?;
        Ok(batch)
    }

    fn validate(&self) -> MonkResult<()> {
        if self.col_types.len() != self.cols.len() {
            return Err(MonkError::Interface(format!(
                "{} columns but {} column types",
                self.cols.len(),
                self.col_types.len()
            )));
        }
        if let Some((i, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.cols.len())
        {
            return Err(MonkError::Interface(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                self.cols.len()
            )));
        }
        Ok(())
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c == name)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(default)]
    error_trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Whether a successful-status body still reports an error.
pub fn has_error_payload(body: &JsonValue) -> bool {
    body.get("error").is_some_and(JsonValue::is_object)
}

/// Map a terminal error response to the matching error kind.
///
/// `status` is the HTTP status; 2xx bodies with an `error` object are
/// treated as internal errors.
pub fn decode_error(status: u16, body: Option<&JsonValue>) -> MonkError {
    let parsed = body.and_then(|b| serde_json::from_value::<ErrorBody>(b.clone()).ok());
    let (message, code, trace) = match parsed {
        Some(e) => (e.error.message, e.error.code, e.error_trace),
        None => (format!("MonkDB server responded with {}", status), None, None),
    };

    if (200..300).contains(&status) {
        return MonkError::Internal { message, trace };
    }
    match (status, code) {
        (409, _) | (_, Some(4091..=4093)) => MonkError::Integrity { message, trace },
        (_, Some(4004)) => MonkError::NotSupported { message, trace },
        (400 | 404, _) => MonkError::Programming { message, trace },
        (401 | 403, _) => MonkError::Operational { message, trace },
        _ => MonkError::Data { message, trace },
    }
}
