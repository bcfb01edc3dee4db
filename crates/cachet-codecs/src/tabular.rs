//! Tabular data persisted as CSV with a leading index column.
//!
//! Unquoted fields are typed on read (empty, integer, float, else text).
//! Text that would otherwise read back as another type is always quoted on
//! write, so a table survives a write/read cycle with its hash unchanged.

use cachet_resource::{Codec, ContentHash, DataHash, Resource, ResourceError, Target};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Empty, Cell::Empty) => true,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Float(a), Cell::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_owned())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl Cell {
    /// Type an unquoted CSV field.
    fn infer(field: &str) -> Self {
        if field.is_empty() {
            Cell::Empty
        } else if let Ok(v) = field.parse::<i64>() {
            Cell::Int(v)
        } else if let Ok(v) = field.parse::<f64>() {
            Cell::Float(v)
        } else {
            Cell::Text(field.to_owned())
        }
    }

    fn write_field(&self, out: &mut String) {
        match self {
            Cell::Empty => {}
            Cell::Int(v) => {
                let _ = write!(out, "{v}");
            }
            // Debug keeps a decimal point on integral values ("1.0")
            Cell::Float(v) => {
                let _ = write!(out, "{v:?}");
            }
            Cell::Text(s) => {
                let needs_quotes = !matches!(Cell::infer(s), Cell::Text(_))
                    || s.contains([',', '"', '\n', '\r']);
                if needs_quotes {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
        }
    }

    fn feed(&self, hasher: &mut blake3::Hasher) {
        match self {
            Cell::Empty => {
                hasher.update(&[0]);
            }
            Cell::Int(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_le_bytes());
            }
            Cell::Float(v) => {
                let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
                hasher.update(&[2]);
                hasher.update(&bits.to_le_bytes());
            }
            Cell::Text(s) => {
                hasher.update(&[3]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
    }
}

/// A table of typed cells with named columns and an index column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_name: String,
    columns: Vec<String>,
    index: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            index_name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row labelled with the next integer index.
    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<(), ResourceError> {
        let label = Cell::Int(self.rows.len() as i64);
        self.push_labeled(label, cells)
    }

    pub fn push_labeled(&mut self, label: Cell, cells: Vec<Cell>) -> Result<(), ResourceError> {
        if cells.len() != self.columns.len() {
            return Err(ResourceError::InvalidField {
                field: "row".to_owned(),
                reason: format!(
                    "expected {} cells, got {}",
                    self.columns.len(),
                    cells.len()
                ),
            });
        }
        self.index.push(label);
        self.rows.push(cells);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[Cell] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[pos]).collect())
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_header_field(&self.index_name, &mut out);
        for col in &self.columns {
            out.push(',');
            write_header_field(col, &mut out);
        }
        out.push('\n');
        for (label, row) in self.index.iter().zip(&self.rows) {
            label.write_field(&mut out);
            for cell in row {
                out.push(',');
                cell.write_field(&mut out);
            }
            out.push('\n');
        }
        out
    }

    pub fn from_csv(text: &str) -> Result<Self, String> {
        let mut records = parse_records(text)?.into_iter();
        let header = records.next().ok_or("missing header row")?;
        let mut header = header.into_iter().map(|f| f.text);
        let index_name = header.next().unwrap_or_default();
        let mut table = Table {
            index_name,
            columns: header.collect(),
            index: Vec::new(),
            rows: Vec::new(),
        };

        for (n, record) in records.enumerate() {
            if record.len() != table.columns.len() + 1 {
                return Err(format!(
                    "row {} has {} fields, expected {}",
                    n + 1,
                    record.len(),
                    table.columns.len() + 1
                ));
            }
            let mut cells = record.into_iter().map(Field::into_cell);
            let label = cells.next().unwrap_or(Cell::Empty);
            table.index.push(label);
            table.rows.push(cells.collect());
        }
        Ok(table)
    }
}

/// Header fields are always read back as text, so only separators force quoting.
fn write_header_field(name: &str, out: &mut String) {
    if name.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&name.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(name);
    }
}

struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn into_cell(self) -> Cell {
        if self.quoted {
            Cell::Text(self.text)
        } else {
            Cell::infer(&self.text)
        }
    }
}

fn parse_records(text: &str) -> Result<Vec<Vec<Field>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = Field {
        text: String::new(),
        quoted: false,
    };
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.text.push('"');
                }
                '"' => in_quotes = false,
                _ => field.text.push(c),
            }
            continue;
        }
        match c {
            '"' if field.text.is_empty() && !field.quoted => {
                in_quotes = true;
                field.quoted = true;
            }
            ',' => record.push(std::mem::replace(
                &mut field,
                Field {
                    text: String::new(),
                    quoted: false,
                },
            )),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::replace(
                    &mut field,
                    Field {
                        text: String::new(),
                        quoted: false,
                    },
                ));
                records.push(std::mem::take(&mut record));
            }
            _ => field.text.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_owned());
    }
    if !record.is_empty() || !field.text.is_empty() || field.quoted {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

pub type CsvSource = Resource<CsvCodec>;
pub type CsvTarget = Target<CsvCodec>;

impl Codec for CsvCodec {
    type Payload = Table;
    const KIND: &'static str = "csv";
    const EXTENSIONS: &'static [&'static str] = &[".csv"];

    fn read(&self, path: &Path) -> Result<Table, ResourceError> {
        let text = fs::read_to_string(path)?;
        Table::from_csv(&text).map_err(|reason| ResourceError::Format {
            kind: Self::KIND,
            path: path.to_path_buf(),
            reason,
        })
    }

    fn write(&self, path: &Path, payload: &Table) -> Result<(), ResourceError> {
        fs::write(path, payload.to_csv())?;
        Ok(())
    }

    fn from_fields(_: &Map<String, Value>) -> Result<Self, ResourceError> {
        Ok(Self)
    }
}

impl ContentHash for CsvCodec {
    /// Row-order-sensitive: each row (index label first) is digested on its
    /// own and the row digests are chained after the header (index name,
    /// then column names).
    fn hash(&self, payload: &Table) -> DataHash {
        let mut hasher = blake3::Hasher::new();
        Cell::Text(payload.index_name.clone()).feed(&mut hasher);
        hasher.update(&(payload.columns.len() as u64).to_le_bytes());
        for col in &payload.columns {
            Cell::Text(col.clone()).feed(&mut hasher);
        }
        for (label, row) in payload.index.iter().zip(&payload.rows) {
            let mut row_hasher = blake3::Hasher::new();
            label.feed(&mut row_hasher);
            for cell in row {
                cell.feed(&mut row_hasher);
            }
            hasher.update(row_hasher.finalize().as_bytes());
        }
        DataHash::from_hasher(&hasher)
    }
}
