//! Core dataset definitions: raw text tables, typed frames and the prepared
//! training matrix.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

use crate::common::error::{PricingError, PricingResult};
use crate::features::Feature;

/// Text encodings tried, in order, when a source file is read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextEncoding {
    /// UTF-16 with a byte order mark; files without one are rejected.
    Utf16,
    Utf8,
    Latin1,
    Iso8859_1,
}

impl TextEncoding {
    pub fn fallback_order() -> &'static [TextEncoding] {
        &[
            TextEncoding::Utf16,
            TextEncoding::Utf8,
            TextEncoding::Latin1,
            TextEncoding::Iso8859_1,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf16 => "utf-16",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Iso8859_1 => "iso-8859-1",
        }
    }

    /// Decode `bytes` strictly; `None` means this encoding does not fit.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            TextEncoding::Utf16 => {
                let (encoding, bom_len) = Encoding::for_bom(bytes)?;
                if encoding != UTF_16LE && encoding != UTF_16BE {
                    return None;
                }
                encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            }
            TextEncoding::Utf8 => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            // Single-byte encodings accept every input.
            TextEncoding::Latin1 | TextEncoding::Iso8859_1 => {
                Some(WINDOWS_1252.decode_without_bom_handling(bytes).0)
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A delimited text table exactly as read: header names plus string cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Repository contract for raw tabular sources.
pub trait TableRepo {
    fn load_table(&self, path: &Path) -> PricingResult<RawTable>;
}

/// Typed column storage. Missing cells are `None`.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v[row].is_none(),
            Column::Text(v) => v[row].is_none(),
            Column::DateTime(v) => v[row].is_none(),
        }
    }

    fn retain(&mut self, keep: &[bool]) {
        fn filter<T>(values: &mut Vec<T>, keep: &[bool]) {
            let mut idx = 0;
            values.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        match self {
            Column::Numeric(v) => filter(v, keep),
            Column::Text(v) => filter(v, keep),
            Column::DateTime(v) => filter(v, keep),
        }
    }
}

fn is_missing_cell(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "" | "na" | "nan" | "null" | "none" | "n/a"
    )
}

/// Column-oriented table with typed columns of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    /// Type a raw table: a column is numeric when every present cell parses
    /// as a number, text otherwise.
    pub fn from_raw(raw: &RawTable) -> Self {
        let rows = raw.records.len();
        let mut columns = Vec::with_capacity(raw.headers.len());
        for col in 0..raw.headers.len() {
            let cells: Vec<Option<&str>> = raw
                .records
                .iter()
                .map(|rec| rec.get(col).map(String::as_str).filter(|c| !is_missing_cell(c)))
                .collect();
            let numeric: Option<Vec<Option<f64>>> = cells
                .iter()
                .map(|c| match c {
                    None => Some(None),
                    Some(s) => s.trim().parse::<f64>().ok().map(Some),
                })
                .collect();
            let column = match numeric {
                Some(values) => Column::Numeric(values),
                None => Column::Text(cells.iter().map(|c| c.map(str::to_string)).collect()),
            };
            columns.push(column);
        }
        Self {
            names: raw.headers.clone(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name)? {
            Column::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(i) = self.position(from) {
            self.names[i] = to.to_string();
        }
    }

    /// Insert or replace a column. Panics in debug builds on length mismatch.
    pub fn set_column(&mut self, name: &str, column: Column) {
        debug_assert_eq!(column.len(), self.rows);
        match self.position(name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name.to_string());
                self.columns.push(column);
            }
        }
    }

    /// Keep rows whose mask entry is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.rows);
        for col in &mut self.columns {
            col.retain(keep);
        }
        self.rows = keep.iter().filter(|k| **k).count();
    }

    pub fn columns_mut(&mut self) -> impl Iterator<Item = (&str, &mut Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter_mut())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }
}

/// Feature matrix and target produced by the preparation pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedData {
    /// Column order of every row in `x`.
    pub features: Vec<Feature>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl PreparedData {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Column slice in the order of `features`.
    pub fn select(&self, features: &[Feature]) -> PricingResult<PreparedData> {
        let mut idx = Vec::with_capacity(features.len());
        let mut missing = Vec::new();
        for f in features {
            match self.features.iter().position(|have| have == f) {
                Some(i) => idx.push(i),
                None => missing.push(f.name().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(PricingError::MissingFeatures(missing));
        }
        let x = self
            .x
            .iter()
            .map(|row| idx.iter().map(|i| row[*i]).collect())
            .collect();
        Ok(PreparedData {
            features: features.to_vec(),
            x,
            y: self.y.clone(),
        })
    }
}

/// Deterministic train/test partition of a [`PreparedData`].
#[derive(Clone, Debug)]
pub struct Split {
    pub features: Vec<Feature>,
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            records: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn columns_are_typed_from_their_cells() {
        let frame = Frame::from_raw(&raw(
            &["distance", "cab_type", "price"],
            &[&["1.5", "Uber", "9.5"], &["", "Lyft", "NaN"], &["2", "Uber", "11"]],
        ));
        assert_eq!(frame.numeric("distance"), Some(&[Some(1.5), None, Some(2.0)][..]));
        assert!(matches!(frame.column("cab_type"), Some(Column::Text(_))));
        assert_eq!(frame.numeric("price").map(|p| p[1]), Some(None));
    }

    #[test]
    fn retain_rows_filters_every_column() {
        let mut frame = Frame::from_raw(&raw(&["a", "b"], &[&["1", "x"], &["2", "y"], &["3", "z"]]));
        frame.retain_rows(&[true, false, true]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.numeric("a"), Some(&[Some(1.0), Some(3.0)][..]));
        assert_eq!(
            frame.column("b"),
            Some(&Column::Text(vec![Some("x".into()), Some("z".into())]))
        );
    }

    #[test]
    fn utf16_requires_a_byte_order_mark() {
        let text = "price,distance\n10,1\n";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(TextEncoding::Utf16.decode(&bytes).as_deref(), Some(text));
        assert_eq!(TextEncoding::Utf16.decode(text.as_bytes()), None);
    }

    #[test]
    fn utf8_rejects_invalid_bytes_and_latin1_accepts_them() {
        let bytes = b"city\nS\xE3o Paulo\n";
        assert_eq!(TextEncoding::Utf8.decode(bytes), None);
        assert_eq!(
            TextEncoding::Latin1.decode(bytes).as_deref(),
            Some("city\nSão Paulo\n")
        );
    }

    #[test]
    fn select_reorders_columns() {
        let data = PreparedData {
            features: vec![Feature::Distance, Feature::Hour, Feature::IsWeekend],
            x: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            y: vec![10.0, 20.0],
        };
        let picked = data.select(&[Feature::IsWeekend, Feature::Distance]).unwrap();
        assert_eq!(picked.x, vec![vec![3.0, 1.0], vec![6.0, 4.0]]);
        assert!(matches!(
            data.select(&[Feature::Month]),
            Err(PricingError::MissingFeatures(_))
        ));
    }
}
