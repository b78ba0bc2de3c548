//! Forward-only result cursor.
//!
//! A cursor holds at most one converted result. `execute` replaces it,
//! `advance` walks it row by row, and `close` drops it. Executing again
//! after `close` starts over.

use crate::connection::Connection;
use crate::converter::Converter;
use crate::error::{MonkError, MonkResult};
use crate::protocol::{ResultBatch, ResultInfo, SqlArgs};
use crate::types::TypeDescriptor;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One converted result row.
pub type Row = Vec<Value>;

/// Name and type of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_: TypeDescriptor,
}

/// Something that addresses a column: a position or a name.
pub trait ColumnIndex {
    fn position(&self, columns: &HashMap<String, usize>, width: usize) -> MonkResult<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, _columns: &HashMap<String, usize>, width: usize) -> MonkResult<usize> {
        if *self < width {
            Ok(*self)
        } else {
            Err(MonkError::ColumnNotFound(self.to_string()))
        }
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &HashMap<String, usize>, _width: usize) -> MonkResult<usize> {
        columns
            .get(*self)
            .copied()
            .ok_or_else(|| MonkError::ColumnNotFound((*self).to_string()))
    }
}

impl ColumnIndex for String {
    fn position(&self, columns: &HashMap<String, usize>, width: usize) -> MonkResult<usize> {
        self.as_str().position(columns, width)
    }
}

struct ResultState {
    columns: Vec<ColumnDescription>,
    by_name: HashMap<String, usize>,
    rows: Vec<Row>,
    rowcount: i64,
    duration: f64,
    results: Option<Vec<ResultInfo>>,
    /// `None` before the first row; `Some(rows.len())` once exhausted.
    position: Option<usize>,
}

impl ResultState {
    fn convert(batch: ResultBatch, converter: &Converter) -> MonkResult<Self> {
        let converters = batch
            .col_types
            .iter()
            .map(|t| converter.resolve(t))
            .collect::<MonkResult<Vec<_>>>()?;

        let rows: Vec<Row> = batch
            .rows
            .iter()
            .map(|row| row.iter().zip(&converters).map(|(v, f)| f(v)).collect())
            .collect();

        let by_name: HashMap<String, usize> = batch
            .cols
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let columns: Vec<ColumnDescription> = batch
            .cols
            .into_iter()
            .zip(batch.col_types)
            .map(|(name, type_)| ColumnDescription { name, type_ })
            .collect();

        Ok(Self {
            columns,
            by_name,
            rows,
            rowcount: batch.rowcount,
            duration: batch.duration,
            results: batch.results,
            position: None,
        })
    }

    fn current(&self) -> MonkResult<&Row> {
        self.position
            .and_then(|i| self.rows.get(i))
            .ok_or(MonkError::InvalidCursorPosition)
    }
}

/// Executes statements and walks their results.
///
/// # Example
/// ```ignore
/// let mut cursor = conn.cursor()?;
/// cursor.execute("SELECT name, age FROM users WHERE age > ?", &[json!(21)]).await?;
/// while cursor.advance() {
///     println!("{} {:?}", cursor.get_str("name")?.unwrap_or("-"), cursor.get_i64(1)?);
/// }
/// ```
pub struct Cursor {
    connection: Connection,
    converter: Arc<Converter>,
    state: Option<ResultState>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(connection: Connection) -> Self {
        let converter = connection.converter().clone();
        Self {
            connection,
            converter,
            state: None,
            closed: false,
        }
    }

    /// Use a different converter for subsequent executions.
    pub fn set_converter(&mut self, converter: Arc<Converter>) {
        self.converter = converter;
    }

    /// Execute a statement with positional parameters.
    pub async fn execute(&mut self, stmt: &str, params: &[JsonValue]) -> MonkResult<()> {
        self.run(stmt, positional(params), &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), aborted when `cancel` fires.
    pub async fn execute_cancellable(
        &mut self,
        stmt: &str,
        params: &[JsonValue],
        cancel: &CancellationToken,
    ) -> MonkResult<()> {
        self.run(stmt, positional(params), cancel).await
    }

    /// Execute a statement once per parameter list. Per-entry outcomes are
    /// available through [`results`](Self::results).
    pub async fn execute_many(&mut self, stmt: &str, bulk: &[Vec<JsonValue>]) -> MonkResult<()> {
        self.run(stmt, SqlArgs::Bulk(bulk.to_vec()), &CancellationToken::new()).await
    }

    async fn run(
        &mut self,
        stmt: &str,
        args: SqlArgs,
        cancel: &CancellationToken,
    ) -> MonkResult<()> {
        self.connection.ensure_open()?;
        self.state = None;
        self.closed = false;
        let batch = self
            .connection
            .client()
            .sql_cancellable(stmt, args, cancel)
            .await?;
        self.state = Some(ResultState::convert(batch, &self.converter)?);
        Ok(())
    }

    /// Move to the next row. Returns `false` once past the last row or when
    /// nothing has been executed.
    pub fn advance(&mut self) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        let len = state.rows.len();
        let next = state.position.map_or(0, |i| (i + 1).min(len));
        state.position = Some(next);
        next < len
    }

    /// Same as [`advance`](Self::advance).
    pub fn next_row(&mut self) -> bool {
        self.advance()
    }

    /// Value of a column in the current row.
    pub fn get<C: ColumnIndex>(&self, column: C) -> MonkResult<&Value> {
        let state = self.state.as_ref().ok_or(MonkError::InvalidCursorPosition)?;
        let row = state.current()?;
        let i = column.position(&state.by_name, row.len())?;
        row.get(i)
            .ok_or_else(|| MonkError::ColumnNotFound(i.to_string()))
    }

    pub fn get_str<C: ColumnIndex>(&self, column: C) -> MonkResult<Option<&str>> {
        Ok(self.get(column)?.as_str())
    }

    pub fn get_i64<C: ColumnIndex>(&self, column: C) -> MonkResult<Option<i64>> {
        Ok(self.get(column)?.as_i64())
    }

    pub fn get_f64<C: ColumnIndex>(&self, column: C) -> MonkResult<Option<f64>> {
        Ok(self.get(column)?.as_f64())
    }

    pub fn get_bool<C: ColumnIndex>(&self, column: C) -> MonkResult<Option<bool>> {
        Ok(self.get(column)?.as_bool())
    }

    /// The current row.
    pub fn current_row(&self) -> MonkResult<&Row> {
        self.state
            .as_ref()
            .ok_or(MonkError::InvalidCursorPosition)?
            .current()
    }

    /// Advance and return the row, or `None` when exhausted.
    pub fn fetch_one(&mut self) -> Option<Row> {
        if !self.advance() {
            return None;
        }
        self.current_row().ok().cloned()
    }

    /// Up to `n` further rows.
    pub fn fetch_many(&mut self, n: usize) -> Vec<Row> {
        let mut rows = Vec::with_capacity(n.min(self.remaining()));
        while rows.len() < n {
            match self.fetch_one() {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        rows
    }

    /// Every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.remaining());
        while let Some(row) = self.fetch_one() {
            rows.push(row);
        }
        rows
    }

    /// Rows after the current one, without moving the cursor.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &Row> {
        let (rows, start) = match &self.state {
            Some(state) => {
                let start = state.position.map_or(0, |i| (i + 1).min(state.rows.len()));
                (state.rows.as_slice(), start)
            }
            None => (&[][..], 0),
        };
        rows[start..].iter()
    }

    fn remaining(&self) -> usize {
        self.rows().len()
    }

    /// Affected or returned rows of the last statement, `-1` if unknown.
    pub fn rowcount(&self) -> i64 {
        self.state.as_ref().map_or(-1, |s| s.rowcount)
    }

    /// Server-side execution time in milliseconds.
    pub fn duration(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.duration)
    }

    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.state.as_ref().map(|s| s.columns.as_slice())
    }

    pub fn columns(&self) -> Vec<&str> {
        self.description()
            .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Per-entry outcomes of the last `execute_many`.
    pub fn results(&self) -> Option<&[ResultInfo]> {
        self.state.as_ref()?.results.as_deref()
    }

    /// Drop the current result. Idempotent; a later execute reopens the cursor.
    pub fn close(&mut self) {
        self.state = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the last execute left a result to read.
    pub fn has_result(&self) -> bool {
        self.state.is_some()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

fn positional(params: &[JsonValue]) -> SqlArgs {
    if params.is_empty() {
        SqlArgs::None
    } else {
        SqlArgs::Args(params.to_vec())
    }
}
