//! Set-oriented inserts through `COPY ... FROM STDIN`.
//!
//! Rows are materialized in column order, timestamps lose their offset, and
//! the result is streamed in text format, one chunk at a time.

use chrono::NaiveDateTime;
use sqlx::PgConnection;
use std::fmt::Write;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{Result, UnitOfWorkError};
use crate::schema::{quote_ident, Column, ColumnType, TableSchema};
use crate::value::SqlValue;

pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// The columns a bulk load writes, with their positions in the entity's values.
pub(crate) struct BulkLayout<'a> {
    schema: &'a TableSchema,
    columns: Vec<(usize, &'a Column)>,
}

impl<'a> BulkLayout<'a> {
    pub(crate) fn new<T: Entity>(schema: &'a TableSchema) -> Self {
        Self {
            schema,
            columns: schema.insert_columns::<T>().collect(),
        }
    }

    pub(crate) fn copy_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(_, column)| quote_ident(column.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            self.schema.quoted_table(),
            columns
        )
    }

    /// Column types as the bulk load sends them.
    pub(crate) fn column_types(&self) -> Vec<(&'static str, ColumnType)> {
        self.columns
            .iter()
            .map(|(_, column)| (column.name, column.bulk_type()))
            .collect()
    }

    /// Appends one row of `entity` to `buf` in COPY text format.
    pub(crate) fn encode_row<T: Entity>(&self, entity: &T, buf: &mut String) -> Result<()> {
        let values = self.schema.values_of(entity)?;
        for (position, (index, _)) in self.columns.iter().enumerate() {
            if position > 0 {
                buf.push('\t');
            }
            encode_value(&values[*index].clone().without_offset(), buf);
        }
        buf.push('\n');
        Ok(())
    }
}

/// Streams `items` into the layout's table and returns the rows copied.
///
/// A failure part-way leaves the copy aborted; the surrounding transaction
/// stays open for the caller to resolve.
pub(crate) async fn copy_rows<T: Entity>(
    conn: &mut PgConnection,
    layout: &BulkLayout<'_>,
    items: &[T],
    chunk_bytes: usize,
) -> Result<u64> {
    let mut copy = conn.copy_in_raw(&layout.copy_statement()).await?;
    let mut buf = String::with_capacity(chunk_bytes);

    for item in items {
        if let Err(err) = layout.encode_row(item, &mut buf) {
            copy.abort(err.to_string()).await?;
            return Err(err);
        }
        if buf.len() >= chunk_bytes {
            debug!(bytes = buf.len(), "Sending bulk copy chunk");
            copy.send(buf.as_bytes()).await?;
            buf.clear();
        }
    }
    if !buf.is_empty() {
        copy.send(buf.as_bytes()).await?;
    }

    copy.finish().await.map_err(UnitOfWorkError::from)
}

fn encode_value(value: &SqlValue, buf: &mut String) {
    match value {
        SqlValue::Null(_) => buf.push_str("\\N"),
        SqlValue::Bool(v) => buf.push(if *v { 't' } else { 'f' }),
        SqlValue::Int4(v) => {
            let _ = write!(buf, "{v}");
        }
        SqlValue::Int8(v) => {
            let _ = write!(buf, "{v}");
        }
        SqlValue::Float8(v) => {
            if v.is_nan() {
                buf.push_str("NaN");
            } else if v.is_infinite() {
                buf.push_str(if *v > 0.0 { "Infinity" } else { "-Infinity" });
            } else {
                let _ = write!(buf, "{v}");
            }
        }
        SqlValue::Text(v) => escape_text(v, buf),
        SqlValue::Uuid(v) => {
            let _ = write!(buf, "{}", v.hyphenated());
        }
        SqlValue::Timestamp(v) => write_timestamp(v, buf),
        SqlValue::TimestampTz(v) => write_timestamp(&v.naive_utc(), buf),
        SqlValue::Json(v) => escape_text(&v.to_string(), buf),
    }
}

fn write_timestamp(at: &NaiveDateTime, buf: &mut String) {
    let _ = write!(buf, "{}", at.format("%Y-%m-%d %H:%M:%S%.6f"));
}

fn escape_text(text: &str, buf: &mut String) {
    for ch in text.chars() {
        match ch {
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            other => buf.push(other),
        }
    }
}
