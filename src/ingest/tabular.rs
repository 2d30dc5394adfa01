//! Spreadsheet and CSV readers.
//!
//! Both formats are read into a [`Table`] whose first row is the header and
//! then serialized as records, one JSON object per data row.

use std::fmt::Display;
use std::io::{Cursor, Read, Seek};

use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::Timelike;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{DocumentKind, IngestError};

/// Strings read as missing values in CSV cells.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A parsed sheet: named columns and typed rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Display-ready slice of a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Serialize as `[{"col": value, ...}, ...]` keeping column order.
    pub fn to_records_json(&self) -> Result<String, IngestError> {
        let records: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let record: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(record)
            })
            .collect();

        serde_json::to_string(&records).map_err(parse_failure)
    }

    /// Header plus the first `limit` rows, rendered as text.
    #[must_use]
    pub fn preview(&self, limit: usize) -> TablePreview {
        TablePreview {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .take(limit)
                .map(|row| row.iter().map(display_value).collect())
                .collect(),
        }
    }
}

/// Read the first worksheet of an `.xlsx` or `.xls` workbook.
pub(super) fn read_workbook(kind: DocumentKind, bytes: &[u8]) -> Result<Table, IngestError> {
    let cursor = Cursor::new(bytes);
    let range = match kind {
        DocumentKind::Xls => first_sheet(Xls::new(cursor).map_err(parse_failure)?)?,
        _ => first_sheet(Xlsx::new(cursor).map_err(parse_failure)?)?,
    };
    Ok(table_from_range(&range))
}

fn first_sheet<RS, R>(mut workbook: R) -> Result<Range<Data>, IngestError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: Display,
{
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::ParseFailure("Workbook has no worksheets".to_string()))?
        .map_err(parse_failure)
}

fn table_from_range(range: &Range<Data>) -> Table {
    // A range opens at its first used cell; columns left of it still count.
    let lead = range.start().map_or(0, |(_, col)| col as usize);
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Table::default();
    };

    let columns = column_names(
        std::iter::repeat_n(String::new(), lead).chain(header.iter().map(header_label)),
    );
    let rows = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            std::iter::repeat_n(Value::Null, lead)
                .chain(row.iter().map(cell_value))
                .collect()
        })
        .collect();

    Table { columns, rows }
}

fn header_label(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        other => display_value(&cell_value(other)),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => sheet_number(*f),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 => {
                Value::String(ts.format("%Y-%m-%d").to_string())
            }
            Some(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => sheet_number(dt.as_f64()),
        },
    }
}

/// Workbooks store every number as a float; whole values come back as integers.
fn sheet_number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INT {
        Value::from(f as i64)
    } else {
        float_value(f)
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Read a CSV file whose first line is the header.
pub(super) fn read_csv(bytes: &[u8]) -> Result<Table, IngestError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header = reader.headers().map_err(parse_failure)?.clone();
    if header.is_empty() {
        return Err(IngestError::ParseFailure(
            "No columns to parse from file".to_string(),
        ));
    }
    let columns = column_names(header.iter().map(str::to_string));

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_failure)?;
        if record.len() > columns.len() {
            let line = record.position().map_or(0, csv::Position::line);
            return Err(IngestError::ParseFailure(format!(
                "Expected {} fields in line {line}, saw {}",
                columns.len(),
                record.len()
            )));
        }
        let mut row: Vec<Value> = record.iter().map(infer_value).collect();
        row.resize(columns.len(), Value::Null);
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

fn infer_value(raw: &str) -> Value {
    if NA_VALUES.contains(&raw) {
        return Value::Null;
    }
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return float_value(f);
        }
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Name blank headers `Unnamed: <i>` and suffix repeats with `.1`, `.2`, ...
fn column_names(labels: impl Iterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (idx, label) in labels.enumerate() {
        let base = if label.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            label
        };
        let mut name = base.clone();
        let mut n = 0;
        while names.contains(&name) {
            n += 1;
            name = format!("{base}.{n}");
        }
        names.push(name);
    }
    names
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_failure(e: impl Display) -> IngestError {
    IngestError::ParseFailure(e.to_string())
}
