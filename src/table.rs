//! Tabular data model
//!
//! A `Table` is what one spreadsheet tab (or one metrics response) becomes
//! after loading. Rows are stored positionally: every row holds exactly one
//! cell per column, so a row is a mapping column → cell by index.

use crate::models::Record;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Longest string cell handed to the model before truncation
pub const MAX_CELL_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Null or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
            Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// JSON form; integral numbers are emitted as integers
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Number(n) => {
                if is_integral(*n) {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
        }
    }

    /// Dict-literal rendering used in the statistics text: numbers bare,
    /// text single-quoted
    pub fn repr(&self) -> String {
        match self {
            Cell::Null => "nan".to_string(),
            Cell::Text(s) => format!("'{}'", s),
            Cell::Number(n) => format_number(*n),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Truncate text longer than `MAX_CELL_CHARS` characters, appending "..."
pub fn truncate_text(text: &str) -> String {
    if text.chars().count() > MAX_CELL_CHARS {
        let mut out: String = text.chars().take(MAX_CELL_CHARS).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}

/// Apply `truncate_text` to every string value of every record
pub fn truncate_records(records: &mut [Record]) {
    for record in records.iter_mut() {
        for value in record.values_mut() {
            if let Value::String(s) = value {
                if s.chars().count() > MAX_CELL_CHARS {
                    *s = truncate_text(s);
                }
            }
        }
    }
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.cells[idx])
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Empty table with the given header; duplicate names collapse to the first
    pub fn new(columns: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let columns = columns
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from a raw spreadsheet value grid (header row first).
    ///
    /// Header names are trimmed; short rows are padded with "" and long rows
    /// truncated to the header width; duplicate column names keep only their
    /// first occurrence; entirely blank rows and columns are dropped; every
    /// column whose non-blank values all parse as numbers becomes numeric.
    pub fn from_grid(grid: Vec<Vec<String>>) -> Self {
        let mut grid = grid.into_iter();
        let Some(header) = grid.next() else {
            return Table::default();
        };

        let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
        let width = header.len();

        let mut seen = HashSet::new();
        let mut keep: Vec<usize> = (0..width)
            .filter(|&idx| seen.insert(header[idx].clone()))
            .collect();

        let mut raw_rows: Vec<Vec<String>> = grid
            .map(|mut row| {
                row.resize(width, String::new());
                keep.iter().map(|&idx| row[idx].clone()).collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|v| !v.trim().is_empty()))
            .collect();

        if !raw_rows.is_empty() {
            let non_blank: Vec<usize> = (0..keep.len())
                .filter(|&pos| raw_rows.iter().any(|row| !row[pos].trim().is_empty()))
                .collect();
            if non_blank.len() != keep.len() {
                keep = non_blank.iter().map(|&pos| keep[pos]).collect();
                raw_rows = raw_rows
                    .into_iter()
                    .map(|row| non_blank.iter().map(|&pos| row[pos].clone()).collect())
                    .collect();
            }
        }

        let columns: Vec<String> = keep.iter().map(|&idx| header[idx].clone()).collect();

        let mut typed: Vec<Vec<Cell>> = vec![Vec::with_capacity(columns.len()); raw_rows.len()];
        for pos in 0..columns.len() {
            let column: Vec<&str> = raw_rows.iter().map(|row| row[pos].as_str()).collect();
            for (row_idx, cell) in infer_column(&column).into_iter().enumerate() {
                typed[row_idx].push(cell);
            }
        }

        Self {
            columns,
            rows: typed,
        }
    }

    /// Build a table from row mappings; columns appear in first-seen order and
    /// keys missing from a record become `Null`
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map(Cell::from_json).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows or no columns
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// First column whose lowercased name is one of `aliases`
    pub fn find_column_ci(&self, aliases: &[&str]) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| aliases.contains(&c.to_lowercase().as_str()))
            .map(|c| c.as_str())
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Append a row, padding with `Null` or truncating to the header width
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    /// Set (or add) a column computed from each row
    pub fn set_column<F>(&mut self, name: &str, mut compute: F)
    where
        F: FnMut(Row<'_>) -> Cell,
    {
        let values: Vec<Cell> = self.rows().map(|row| compute(row)).collect();
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Keep only rows matching `predicate`
    pub fn retain<F>(&mut self, mut predicate: F)
    where
        F: FnMut(Row<'_>) -> bool,
    {
        let columns = &self.columns;
        self.rows.retain(|cells| predicate(Row { columns, cells }));
    }

    /// Rows matching a fallible predicate; the first error aborts
    pub fn try_filter<F, E>(&self, mut predicate: F) -> Result<Table, E>
    where
        F: FnMut(Row<'_>) -> Result<bool, E>,
    {
        let mut out = Table {
            columns: self.columns.clone(),
            rows: Vec::new(),
        };
        for row in self.rows() {
            if predicate(row)? {
                out.rows.push(row.cells.to_vec());
            }
        }
        Ok(out)
    }

    /// Most frequent non-null values of a column, descending by count; ties
    /// keep first-appearance order
    pub fn value_counts(&self, column: &str, limit: usize) -> Vec<(Cell, usize)> {
        let Some(values) = self.column_values(column) else {
            return Vec::new();
        };

        let mut order: Vec<(Cell, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for cell in values.filter(|c| !matches!(c, Cell::Null)) {
            let key = cell.repr();
            match index.get(&key) {
                Some(&pos) => order[pos].1 += 1,
                None => {
                    index.insert(key, order.len());
                    order.push((cell.clone(), 1));
                }
            }
        }

        order.sort_by(|a, b| b.1.cmp(&a.1));
        order.truncate(limit);
        order
    }

    /// Projection onto the named columns (missing names are skipped)
    pub fn select(&self, names: &[String]) -> Table {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Stable sort, descending by a column; numbers before text, nulls last
    pub fn sort_desc_by(&mut self, column: &str) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        self.rows.sort_by(|a, b| compare_desc(&a[idx], &b[idx]));
    }

    /// Stable sort by a derived key, largest first
    pub fn sort_by_key_desc<K, F>(&mut self, mut key: F)
    where
        K: Ord,
        F: FnMut(Row<'_>) -> K,
    {
        let columns = &self.columns;
        let mut keyed: Vec<(K, Vec<Cell>)> = self
            .rows
            .drain(..)
            .map(|cells| (key(Row { columns, cells: &cells }), cells))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        self.rows = keyed.into_iter().map(|(_, cells)| cells).collect();
    }

    /// Drop rows whose `column` value repeats an earlier row's value
    pub fn drop_duplicates(&mut self, column: &str) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row[idx].to_string()));
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Cell::to_json))
                    .collect()
            })
            .collect()
    }
}

fn compare_desc(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (Cell::Number(x), Cell::Number(y)) => y.partial_cmp(x).unwrap_or(Ordering::Equal),
        (Cell::Text(x), Cell::Text(y)) => y.cmp(x),
        (Cell::Number(_), _) => Ordering::Less,
        (_, Cell::Number(_)) => Ordering::Greater,
        (Cell::Text(_), Cell::Null) => Ordering::Less,
        (Cell::Null, Cell::Text(_)) => Ordering::Greater,
        (Cell::Null, Cell::Null) => Ordering::Equal,
    }
}

/// Numeric iff at least one value is non-blank and every non-blank value
/// parses; blanks in a numeric column become `Null`
fn infer_column(values: &[&str]) -> Vec<Cell> {
    let mut parsed = Vec::with_capacity(values.len());
    let mut any_value = false;

    for raw in values {
        if raw.trim().is_empty() {
            parsed.push(None);
            continue;
        }
        any_value = true;
        match parse_number(raw) {
            Some(n) => parsed.push(Some(n)),
            None => {
                return values.iter().map(|v| Cell::Text(v.to_string())).collect();
            }
        }
    }

    if !any_value {
        return values.iter().map(|v| Cell::Text(v.to_string())).collect();
    }

    parsed
        .into_iter()
        .map(|n| n.map(Cell::Number).unwrap_or(Cell::Null))
        .collect()
}

/// Render value counts as a dict literal, e.g. `{200: 8, 404: 2}`
pub fn format_counts(counts: &[(Cell, usize)]) -> String {
    let body = counts
        .iter()
        .map(|(cell, n)| format!("{}: {}", cell.repr(), n))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}
