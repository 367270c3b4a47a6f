//! Destinations for records streamed out of a query.
//!
//! A [`RecordSink`] receives whole pages in cursor order, so a large table can
//! be exported without holding it in memory.

use crate::Result;
use serde_json::Value;
use std::fs::File;
use std::io;
use std::path::Path;

/// Receives pages of records.
pub trait RecordSink {
    /// Called once per page, in cursor order.
    fn write_page(&mut self, records: &[Value]) -> Result<()>;

    /// Called once after the last page.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<Value> {
    fn write_page(&mut self, records: &[Value]) -> Result<()> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// Writes records as CSV rows.
///
/// The header is the selected columns when given, otherwise the keys of the
/// first record. Strings are written as-is, `null` and missing columns as an
/// empty cell, and any other value as its JSON text.
///
/// # Examples
///
/// ```
/// use bubble_api::{CsvSink, RecordSink};
/// use serde_json::json;
///
/// let mut sink = CsvSink::new(Vec::new()).with_columns(["_id", "name"]);
/// sink.write_page(&[json!({"_id": "1x1", "name": "Ada", "age": 36})]).unwrap();
/// sink.finish().unwrap();
/// assert_eq!(String::from_utf8(sink.into_inner().unwrap()).unwrap(), "_id,name\n1x1,Ada\n");
/// ```
pub struct CsvSink<W: io::Write> {
    writer: csv::Writer<W>,
    columns: Option<Vec<String>>,
    header_written: bool,
    rows: usize,
}

impl CsvSink<File> {
    /// Creates (or truncates) a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_writer(csv::Writer::from_path(path)?))
    }
}

impl<W: io::Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self::from_writer(csv::Writer::from_writer(writer))
    }

    fn from_writer(writer: csv::Writer<W>) -> Self {
        Self {
            writer,
            columns: None,
            header_written: false,
            rows: 0,
        }
    }

    /// Fixes the header and the order of cells in every row.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error().into())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        if let Some(columns) = &self.columns {
            self.writer.write_record(columns)?;
            self.header_written = true;
        }
        Ok(())
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl<W: io::Write> RecordSink for CsvSink<W> {
    fn write_page(&mut self, records: &[Value]) -> Result<()> {
        for record in records {
            if self.columns.is_none() {
                let keys = match record {
                    Value::Object(map) => map.keys().cloned().collect(),
                    _ => Vec::new(),
                };
                self.columns = Some(keys);
            }
            self.write_header()?;

            let row: Vec<String> = self
                .columns
                .iter()
                .flatten()
                .map(|column| cell(record.get(column)))
                .collect();
            self.writer.write_record(&row)?;
            self.rows += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.write_header()?;
        self.writer.flush()?;
        tracing::debug!(rows = self.rows, "CSV export flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn written(sink: CsvSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_header_from_first_record() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_page(&[
            json!({"_id": "1x1", "age": 36, "tags": ["a", "b"]}),
            json!({"_id": "1x2", "age": null}),
        ])
        .unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows(), 2);
        assert_eq!(
            written(sink),
            "_id,age,tags\n1x1,36,\"[\"\"a\"\",\"\"b\"\"]\"\n1x2,,\n"
        );
    }

    #[test]
    fn test_selected_columns_header_without_rows() {
        let mut sink = CsvSink::new(Vec::new()).with_columns(["_id", "name"]);
        sink.write_page(&[]).unwrap();
        sink.finish().unwrap();
        assert_eq!(written(sink), "_id,name\n");
    }

    #[test]
    fn test_vec_sink_appends_pages() {
        let mut sink: Vec<Value> = Vec::new();
        sink.write_page(&[json!(1), json!(2)]).unwrap();
        sink.write_page(&[json!(3)]).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink, vec![json!(1), json!(2), json!(3)]);
    }
}
