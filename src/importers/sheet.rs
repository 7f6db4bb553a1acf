//! Raw tabular file reading
//!
//! One `Table` abstraction over Excel and CSV exports. Excel goes through
//! calamine's auto-detection because futures terminals still emit legacy
//! `.xls`. CSV bytes are decoded through a fixed encoding fallback chain
//! (UTF-8 with BOM, then GBK, then GB18030) crossed with comma and
//! semicolon delimiters; an attempt is accepted once the header row
//! yields more than one column.

use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use encoding_rs::{Encoding, GB18030, GBK, UTF_8};
use std::path::Path;
use tracing::debug;

use crate::error::{FundError, Result};

/// Raw cell prior to schema coercion
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            // Integral floats print without the trailing ".0" pandas-style
            // exports never carry
            CellValue::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", *f as i64)
            }
            CellValue::Number(f) => f.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

#[derive(Debug)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

const ENCODING_FALLBACK: &[&Encoding] = &[UTF_8, GBK, GB18030];
const DELIMITER_FALLBACK: &[u8] = &[b',', b';'];

/// Read the first sheet (Excel) or the decoded body (CSV) of an export
pub fn read_table(path: &Path) -> Result<Table> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" | "xls" => read_excel_sheet(path, 0)?.ok_or_else(|| {
            anyhow!(FundError::ParseError(format!(
                "{}: workbook has no sheets",
                path.display()
            )))
        }),
        "csv" | "txt" => read_csv_with_fallback(path),
        other => Err(anyhow!(FundError::ParseError(format!(
            "{}: unsupported file extension '{}'",
            path.display(),
            other
        )))),
    }
}

/// Read one sheet by index; `Ok(None)` when the workbook has fewer
/// sheets (futures exports only sometimes carry the benchmark sheet).
pub fn read_excel_sheet(path: &Path, index: usize) -> Result<Option<Table>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let Some(range) = workbook.worksheet_range_at(index) else {
        return Ok(None);
    };
    let range = range.with_context(|| format!("Failed to read sheet {} of {}", index, path.display()))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Some(Table {
            headers: Vec::new(),
            rows: Vec::new(),
        }));
    };

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let body = rows
        .map(|row| row.iter().map(convert_excel_cell).collect())
        .collect();

    Ok(Some(Table {
        headers,
        rows: body,
    }))
}

fn convert_excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.trim().to_string()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        other => CellValue::Text(other.to_string()),
    }
}

fn read_csv_with_fallback(path: &Path) -> Result<Table> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut single_column_fallback: Option<Table> = None;

    for encoding in ENCODING_FALLBACK {
        let (decoded, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            continue;
        }
        for &delimiter in DELIMITER_FALLBACK {
            let table = parse_csv_text(&decoded, delimiter)?;
            if table.headers.len() > 1 {
                debug!(
                    "Decoded {} as {} with delimiter '{}'",
                    path.display(),
                    encoding.name(),
                    delimiter as char
                );
                return Ok(table);
            }
            if single_column_fallback.is_none() && !table.headers.is_empty() {
                single_column_fallback = Some(table);
            }
        }
    }

    // Single-column files exist (narrow account exports); only a file no
    // encoding could decode is a parse failure.
    single_column_fallback.ok_or_else(|| {
        anyhow!(FundError::ParseError(format!(
            "{}: could not decode with any supported encoding",
            path.display()
        )))
    })
}

fn parse_csv_text(text: &str, delimiter: u8) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read CSV record")?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    let field = field.trim();
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn test_utf8_bom_csv() {
        let (_dir, path) = write_temp(
            "a.csv",
            "\u{feff}单元名称,总资产\n甲单元,1000000\n".as_bytes(),
        );
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["单元名称", "总资产"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], CellValue::Text("甲单元".to_string()));
    }

    #[test]
    fn test_gbk_csv_falls_through() {
        let text = "单元名称,总资产\n甲单元,1000000\n";
        let (encoded, _, _) = GBK.encode(text);
        let (_dir, path) = write_temp("a.csv", &encoded);
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["单元名称", "总资产"]);
    }

    #[test]
    fn test_semicolon_delimiter_fallback() {
        let (_dir, path) = write_temp("a.csv", b"name;value\nx;1\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["name", "value"]);
        assert_eq!(table.rows[0][1], CellValue::Text("1".to_string()));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let (_dir, path) = write_temp("a.pdf", b"whatever");
        assert!(read_table(&path).is_err());
    }

    #[test]
    fn test_integral_number_as_text_has_no_decimal_point() {
        assert_eq!(CellValue::Number(600519.0).as_text(), "600519");
        assert_eq!(CellValue::Number(1.5).as_text(), "1.5");
    }
}
