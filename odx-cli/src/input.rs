//! Header-indexed row tables from CSV or XLSX files.
//!
//! CSV files from the legacy POS exports are sometimes Latin-1; decoding
//! tries UTF-8 first and falls back to Windows-1252, the same order the
//! operators' old scripts used.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One spreadsheet, rows as strings, columns addressed by header name.
pub struct Table {
    columns: HashMap<String, usize>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a `.csv` or `.xlsx` file based on its extension.
    pub fn read(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Self::read_csv(path),
            "xlsx" | "xls" | "ods" => Self::read_xlsx(path),
            other => bail!("Unsupported input format '.{other}' for {}", path.display()),
        }
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(err.as_bytes());
                decoded.into_owned()
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers: Vec<String> =
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            // flexible(true) admits short rows; pad so indexing stays safe
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self::from_parts(headers, rows))
    }

    fn read_xlsx(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        let range = workbook
            .worksheet_range_at(0)
            .context("Workbook has no sheets")??;

        let mut rows_iter = range.rows();
        let headers: Vec<String> = rows_iter
            .next()
            .context("Workbook sheet is empty")?
            .iter()
            .map(|cell| cell_to_string(cell).trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for sheet_row in rows_iter {
            let mut row: Vec<String> = sheet_row.iter().map(cell_to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self::from_parts(headers, rows))
    }

    pub(crate) fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect();
        Self { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Fail early when a required column is missing, like the originals did
    /// before touching the server.
    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            bail!("Input file has no '{name}' column")
        }
    }

    /// Trimmed cell content; `None` when the column is absent or the cell
    /// is blank.
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        let index = *self.columns.get(name)?;
        let value = row.get(index)?.trim();
        (!value.is_empty()).then_some(value)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Spreadsheets store barcodes as floats; keep them integral
        #[allow(clippy::cast_possible_truncation)]
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(name: &str, bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_utf8_csv_with_header_lookup() {
        let (_dir, path) = write_file("marcas.csv", b"name,extra\nACME,1\n ,2\n");
        let table = Table::read(&path).unwrap();
        assert_eq!(table.len(), 2);
        table.require_column("name").unwrap();
        assert!(table.require_column("missing").is_err());
        assert_eq!(table.cell(&table.rows[0], "name"), Some("ACME"));
        // blank cell reads as absent
        assert_eq!(table.cell(&table.rows[1], "name"), None);
    }

    #[test]
    fn falls_back_to_latin1() {
        // "Señor" in Latin-1: 0xF1 is not valid UTF-8
        let (_dir, path) = write_file("clientes.csv", b"name\nSe\xf1or\n");
        let table = Table::read(&path).unwrap();
        assert_eq!(table.cell(&table.rows[0], "name"), Some("Se\u{f1}or"));
    }

    #[test]
    fn short_rows_are_padded() {
        let (_dir, path) = write_file("x.csv", b"a,b,c\n1\n");
        let table = Table::read(&path).unwrap();
        assert_eq!(table.cell(&table.rows[0], "a"), Some("1"));
        assert_eq!(table.cell(&table.rows[0], "c"), None);
    }

    #[test]
    fn rejects_unknown_extension() {
        let (_dir, path) = write_file("x.pdf", b"whatever");
        assert!(Table::read(&path).is_err());
    }

    #[test]
    fn float_cells_keep_integral_barcodes() {
        assert_eq!(cell_to_string(&Data::Float(7791234567890.0)), "7791234567890");
        assert_eq!(cell_to_string(&Data::Float(12.5)), "12.5");
    }
}
