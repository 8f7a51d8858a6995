use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use csv::{Reader, ReaderBuilder, StringRecord, Writer};

/// Column-name lookup for a CSV header row.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let mut by_name = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            by_name.entry(name.clone()).or_insert(idx);
        }
        Self { names, by_name }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn require(&self, name: &str, path: &Path) -> Result<usize> {
        self.get(name)
            .ok_or_else(|| anyhow!("{} is missing required column {name:?}", path.display()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

pub fn open_reader(path: &Path) -> Result<(Reader<File>, HeaderIndex)> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    Ok((reader, HeaderIndex::new(&headers)))
}

pub fn open_writer(path: &Path) -> Result<Writer<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Writer::from_path(path).with_context(|| format!("create {}", path.display()))
}

/// Trimmed cell content; empty cells and pandas-style `nan` read as absent.
pub fn cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    let raw = record.get(idx?)?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw == "<NA>" {
        None
    } else {
        Some(raw)
    }
}

pub fn cell_string(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    cell(record, idx).map(|s| s.to_string())
}

pub fn parse_f64(raw: Option<&str>) -> Option<f64> {
    let v = raw?.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Integer ids occasionally arrive as `123.0` after a float round-trip.
pub fn parse_i64(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn parse_year(raw: &str) -> Option<i32> {
    parse_date(raw).map(|d| d.year())
}

pub fn required_i64(
    record: &StringRecord,
    idx: usize,
    column: &str,
    path: &Path,
    line: usize,
) -> Result<i64> {
    parse_i64(cell(record, Some(idx))).ok_or_else(|| {
        anyhow!(
            "{} line {line}: column {column:?} is not an integer",
            path.display()
        )
    })
}

pub fn required_date(
    record: &StringRecord,
    idx: usize,
    column: &str,
    path: &Path,
    line: usize,
) -> Result<NaiveDate> {
    cell(record, Some(idx))
        .and_then(parse_date)
        .ok_or_else(|| anyhow!("{} line {line}: column {column:?} is not a date", path.display()))
}

/// Null-aware float formatting. `Display` for f64 is the shortest string that
/// round-trips, which keeps re-runs byte-identical.
pub fn format_f64(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}"),
        _ => String::new(),
    }
}

pub fn format_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_dates() {
        assert_eq!(parse_i64(Some("42")), Some(42));
        assert_eq!(parse_i64(Some("42.0")), Some(42));
        assert_eq!(parse_i64(Some("42.5")), None);
        assert_eq!(parse_year("2019-08-17"), Some(2019));
        assert_eq!(parse_year("2021-01-02 00:00:00"), Some(2021));
        assert_eq!(parse_year("17/08/2019"), None);
    }

    #[test]
    fn formats_nulls_and_integers() {
        assert_eq!(format_f64(None), "");
        assert_eq!(format_f64(Some(f64::NAN)), "");
        assert_eq!(format_f64(Some(5.0)), "5");
        assert_eq!(format_f64(Some(0.25)), "0.25");
    }

    #[test]
    fn empty_and_nan_cells_are_absent() {
        let rec = StringRecord::from(vec!["1", " ", "nan", "x"]);
        assert_eq!(cell(&rec, Some(0)), Some("1"));
        assert_eq!(cell(&rec, Some(1)), None);
        assert_eq!(cell(&rec, Some(2)), None);
        assert_eq!(cell(&rec, Some(9)), None);
        assert_eq!(cell(&rec, None), None);
    }
}
