// src/extractors/structured.rs
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;

// Currency symbols and thousands separators removed from every body cell.
static CURRENCY_NOISE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[$€£¥,]").expect("Failed to compile CURRENCY_NOISE_RE"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?$").expect("Failed to compile NUMBER_RE")
});

/// A table grid straight out of the markup: spans already expanded, nothing cleaned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub header_rows: Vec<Vec<String>>,
    pub body_rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

/// Outcome of the numeric coercion attempt for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every non-empty cell parsed as a number.
    Numeric,
    /// At least one cell was not numeric; the column stays as text.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTable {
    pub columns: Vec<String>,
    pub kinds: Vec<ColumnKind>,
    pub rows: Vec<Vec<Cell>>,
}

impl StructuredTable {
    /// Cleans a raw grid into a typed table.
    ///
    /// Header levels are flattened into one label per column (blank labels
    /// fall back to the column position). Currency symbols and thousands
    /// separators are stripped, rows and columns left without any value are
    /// dropped, then each column is coerced to numbers when every value allows it.
    pub fn from_raw(raw: RawTable) -> Self {
        let width = raw
            .header_rows
            .iter()
            .chain(raw.body_rows.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        let labels: Vec<String> = (0..width)
            .map(|col| flatten_header(&raw.header_rows, col).unwrap_or_else(|| col.to_string()))
            .collect();

        let mut body: Vec<Vec<String>> = raw
            .body_rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .into_iter()
                    .map(|cell| CURRENCY_NOISE_RE.replace_all(&cell, "").trim().to_string())
                    .collect();
                cells.resize(width, String::new());
                cells
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        let keep: Vec<usize> = (0..width)
            .filter(|&col| body.iter().any(|row| !row[col].is_empty()))
            .collect();

        let columns: Vec<String> = keep.iter().map(|&col| labels[col].clone()).collect();
        for row in body.iter_mut() {
            *row = keep.iter().map(|&col| std::mem::take(&mut row[col])).collect();
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|col| {
                if body.iter().all(|row| row[col].is_empty() || NUMBER_RE.is_match(&row[col])) {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Text
                }
            })
            .collect();

        let rows = body
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(kinds.iter())
                    .map(|(cell, kind)| to_cell(cell, *kind))
                    .collect()
            })
            .collect();

        Self { columns, kinds, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Single-column grids are layout artifacts rather than statements.
    pub fn is_meaningful(&self) -> bool {
        !self.is_empty() && self.columns.len() >= 2
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::render))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(text) => text.clone(),
        }
    }
}

fn flatten_header(header_rows: &[Vec<String>], col: usize) -> Option<String> {
    let mut levels: Vec<&str> = Vec::new();
    for row in header_rows {
        let Some(level) = row.get(col).map(|s| s.trim()) else {
            continue;
        };
        // Spanned cells repeat down and across; keep each distinct level once.
        if !level.is_empty() && levels.last() != Some(&level) {
            levels.push(level);
        }
    }
    let label = levels.join(" ").trim().to_string();
    (!label.is_empty()).then_some(label)
}

fn to_cell(value: String, kind: ColumnKind) -> Cell {
    if value.is_empty() {
        return Cell::Empty;
    }
    match kind {
        ColumnKind::Numeric => value.parse::<f64>().map(Cell::Number).unwrap_or(Cell::Text(value)),
        ColumnKind::Text => Cell::Text(value),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
