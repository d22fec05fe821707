//! Fetched result batches and the row cursor.
use std::{borrow::Cow, fmt};

use time::{Date, PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    client::CliService,
    common::ByteStr,
    error::Result,
    metadata::{HiveType, Schema},
    thrift::{
        FetchOrientation, OperationHandle, ProtocolVersion,
        backend::{RowSet, WireColumn, WireValue},
    },
    value::Value,
};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// A fetched batch failed to decode against the result set schema.
pub struct DecodeError {
    message: Cow<'static, str>,
}

impl DecodeError {
    pub(crate) fn new(message: impl Into<Cow<'static, str>>) -> DecodeError {
        DecodeError { message: message.into() }
    }
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode error: {}", self.message)
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Bit `row` of the null bitmap; a set bit overrides the payload value.
fn bitmap_null(nulls: &[u8], row: usize) -> bool {
    nulls.get(row / 8).is_some_and(|b| (b >> (row % 8)) & 1 == 1)
}

fn parse_date(s: &ByteStr) -> Result<Value, DecodeError> {
    Date::parse(s, DATE_FORMAT)
        .map(Value::Date)
        .map_err(|_| DecodeError::new(format!("invalid date {s:?}")))
}

fn parse_timestamp(s: &ByteStr) -> Result<Value, DecodeError> {
    PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT)
        .map(Value::Timestamp)
        .map_err(|_| DecodeError::new(format!("invalid timestamp {s:?}")))
}

/// Interpret one string cell according to the column type. Strings carry
/// every type the wire has no dedicated column for.
fn string_cell(kind: HiveType, s: ByteStr) -> Result<Value, DecodeError> {
    Ok(match kind {
        HiveType::Decimal => Value::Decimal(s),
        HiveType::Date => parse_date(&s)?,
        HiveType::Timestamp => parse_timestamp(&s)?,
        HiveType::Binary => Value::Binary(s.into_bytes()),
        _ => Value::Str(s),
    })
}

fn mismatch(kind: HiveType) -> DecodeError {
    DecodeError::new(format!("column payload does not match declared type {kind}"))
}

/// One decoded batch, stored column major.
#[derive(Default)]
pub struct RowBatch {
    columns: Vec<Vec<Value>>,
    row_count: usize,
}

impl RowBatch {
    /// Decode a wire row set against `schema`.
    ///
    /// Servers at protocol V6 and newer send columnar batches with null
    /// bitmaps; older servers send one value union per cell with absence
    /// as the null marker.
    pub(crate) fn decode(
        schema: &Schema,
        rowset: RowSet,
        version: ProtocolVersion,
    ) -> Result<RowBatch, DecodeError> {
        if version.columnar_results() {
            Self::decode_columnar(schema, rowset.columns)
        } else {
            Self::decode_rows(schema, rowset.rows)
        }
    }

    fn decode_columnar(schema: &Schema, wire: Vec<WireColumn>) -> Result<RowBatch, DecodeError> {
        // a reply without columns marks the end of the stream
        if wire.is_empty() {
            return Ok(RowBatch::default());
        }
        if wire.len() != schema.len() {
            return Err(DecodeError::new(format!(
                "batch has {} columns, schema has {}",
                wire.len(),
                schema.len(),
            )));
        }

        let row_count = wire.first().map(WireColumn::len).unwrap_or(0);
        let mut columns = Vec::with_capacity(wire.len());
        for (desc, col) in schema.columns().iter().zip(wire) {
            if col.len() != row_count {
                return Err(DecodeError::new("ragged column lengths in batch"));
            }
            columns.push(decode_column(desc.desc.kind, col)?);
        }
        Ok(RowBatch { columns, row_count })
    }

    fn decode_rows(
        schema: &Schema,
        wire: Vec<crate::thrift::backend::RowValues>,
    ) -> Result<RowBatch, DecodeError> {
        let row_count = wire.len();
        let mut columns = vec![Vec::with_capacity(row_count); schema.len()];
        for row in wire {
            if row.values.len() != schema.len() {
                return Err(DecodeError::new("row width does not match schema"));
            }
            for ((desc, value), column) in
                schema.columns().iter().zip(row.values).zip(&mut columns)
            {
                column.push(row_cell(desc.desc.kind, value)?);
            }
        }
        Ok(RowBatch { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.columns.get(column)?.get(row)
    }
}

fn decode_column(kind: HiveType, col: WireColumn) -> Result<Vec<Value>, DecodeError> {
    macro_rules! plain {
        ($values:expr, $nulls:expr, $variant:expr) => {
            $values
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    if bitmap_null(&$nulls, row) { Value::Null } else { $variant(v) }
                })
                .collect()
        };
    }

    Ok(match (kind, col) {
        (HiveType::Boolean, WireColumn::Bool { values, nulls }) => {
            plain!(values, nulls, Value::Bool)
        }
        (HiveType::TinyInt, WireColumn::Byte { values, nulls }) => {
            plain!(values, nulls, Value::TinyInt)
        }
        (HiveType::SmallInt, WireColumn::Short { values, nulls }) => {
            plain!(values, nulls, Value::SmallInt)
        }
        (HiveType::Int, WireColumn::Int { values, nulls }) => plain!(values, nulls, Value::Int),
        (HiveType::BigInt, WireColumn::Long { values, nulls }) => {
            plain!(values, nulls, Value::BigInt)
        }
        // FLOAT shares the double column on the wire
        (HiveType::Float, WireColumn::Double { values, nulls }) => {
            plain!(values, nulls, |v: f64| Value::Float(v as f32))
        }
        (HiveType::Double, WireColumn::Double { values, nulls }) => {
            plain!(values, nulls, Value::Double)
        }
        (HiveType::Binary, WireColumn::Binary { values, nulls }) => {
            plain!(values, nulls, Value::Binary)
        }
        (kind, WireColumn::String { values, nulls }) => values
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                if bitmap_null(&nulls, row) { Ok(Value::Null) } else { string_cell(kind, v) }
            })
            .collect::<Result<_, _>>()?,
        (kind, _) => return Err(mismatch(kind)),
    })
}

fn row_cell(kind: HiveType, value: WireValue) -> Result<Value, DecodeError> {
    Ok(match (kind, value) {
        (_, WireValue::Null) => Value::Null,
        (HiveType::Boolean, WireValue::Bool(v)) => Value::Bool(v),
        (HiveType::TinyInt, WireValue::Byte(v)) => Value::TinyInt(v),
        (HiveType::SmallInt, WireValue::Short(v)) => Value::SmallInt(v),
        (HiveType::Int, WireValue::Int(v)) => Value::Int(v),
        (HiveType::BigInt, WireValue::Long(v)) => Value::BigInt(v),
        (HiveType::Float, WireValue::Double(v)) => Value::Float(v as f32),
        (HiveType::Double, WireValue::Double(v)) => Value::Double(v),
        (kind, WireValue::String(v)) => string_cell(kind, v)?,
        (kind, _) => return Err(mismatch(kind)),
    })
}

/// Forward-only cursor over an operation's result set.
///
/// Batches are fetched lazily: [`next`][Rows::next] pulls the following
/// batch from the server only when the current one is exhausted, and an
/// empty batch marks the end of the result set.
pub struct Rows<'a, C: CliService> {
    client: &'a C,
    operation: OperationHandle,
    schema: Schema,
    protocol: ProtocolVersion,
    fetch_size: i64,
    batch: RowBatch,
    pos: Option<usize>,
    finished: bool,
    was_null: bool,
}

impl<'a, C: CliService> Rows<'a, C> {
    pub(crate) fn new(
        client: &'a C,
        operation: OperationHandle,
        schema: Schema,
        protocol: ProtocolVersion,
        fetch_size: i64,
    ) -> Rows<'a, C> {
        Rows {
            client,
            operation,
            schema,
            protocol,
            fetch_size,
            batch: RowBatch::default(),
            pos: None,
            finished: false,
            was_null: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Advance to the next row, fetching a new batch when needed.
    /// Returns `false` once the result set is exhausted.
    pub async fn next(&mut self) -> Result<bool> {
        self.was_null = false;
        loop {
            let next = self.pos.map_or(0, |p| p + 1);
            if next < self.batch.row_count() {
                self.pos = Some(next);
                return Ok(true);
            }
            if self.finished {
                return Ok(false);
            }

            let resp = self
                .client
                .fetch_results(&self.operation, FetchOrientation::Next, self.fetch_size, 0)
                .await?;
            resp.status.verify(true)?;

            let rowset = resp.results.unwrap_or_else(|| RowSet {
                start_row_offset: 0,
                rows: Vec::new(),
                columns: Vec::new(),
            });
            let batch = RowBatch::decode(&self.schema, rowset, self.protocol)?;
            if batch.is_empty() {
                self.finished = true;
                return Ok(false);
            }
            self.batch = batch;
            self.pos = None;
        }
    }

    /// Value of `column` (zero based) on the current row.
    ///
    /// Also records whether the cell was null for [`was_null`][Self::was_null].
    pub fn get(&mut self, column: usize) -> Result<&Value> {
        let row = self
            .pos
            .ok_or_else(|| DecodeError::new("cursor is not positioned on a row"))?;
        let value = self
            .batch
            .value(row, column)
            .ok_or_else(|| DecodeError::new(format!("no column at index {column}")))?;
        self.was_null = value.is_null();
        Ok(value)
    }

    /// Value of the named column on the current row.
    pub fn get_by_name(&mut self, name: &str) -> Result<&Value> {
        let index = self
            .schema
            .column_by_name(name)
            .map(|c| c.index)
            .ok_or_else(|| DecodeError::new(format!("no column named {name:?}")))?;
        self.get(index)
    }

    /// Whether the last [`get`][Self::get] returned a null cell.
    pub fn was_null(&self) -> bool {
        self.was_null
    }
}
