use serde_json::{Map, Value};

const DOUBLE_PART_KEYS: [&str; 2] = ["1", "2"];
const CELL_SEPARATOR: char = ',';
const ROW_SEPARATOR: char = '\n';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    Single,
    Double,
    Table { rows: usize, cols: usize },
}

impl AnswerShape {
    /// Picks the shape for a task: an explicit `answer_type` wins, otherwise the
    /// layout table keyed on the display number decides.
    pub fn resolve(answer_type: Option<&str>, number: u32) -> Self {
        let (rows, cols) = table_dimensions(number);
        match answer_type.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("single") => Self::Single,
            Some("double") => Self::Double,
            Some("table") => Self::Table { rows, cols },
            _ if rows == 1 && cols == 1 => Self::Single,
            _ => Self::Table { rows, cols },
        }
    }

    pub fn field_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Table { rows, cols } => rows * cols,
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::Single => "single".to_string(),
            Self::Double => "double".to_string(),
            Self::Table { rows, cols } => format!("table {rows}x{cols}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    Single(String),
    Double([String; 2]),
    Table(Vec<Vec<String>>),
}

impl AnswerValue {
    #[cfg(test)]
    pub fn empty(shape: AnswerShape) -> Self {
        match shape {
            AnswerShape::Single => Self::Single(String::new()),
            AnswerShape::Double => Self::Double([String::new(), String::new()]),
            AnswerShape::Table { rows, cols } => Self::Table(vec![vec![String::new(); cols]; rows]),
        }
    }

    /// Builds a value from field values in row-major order, the order the
    /// renderer lays out inputs. Missing fields are empty.
    pub fn from_fields(shape: AnswerShape, fields: &[String]) -> Self {
        let field = |idx: usize| fields.get(idx).cloned().unwrap_or_default();
        match shape {
            AnswerShape::Single => Self::Single(field(0)),
            AnswerShape::Double => Self::Double([field(0), field(1)]),
            AnswerShape::Table { rows, cols } => Self::Table(
                (0..rows)
                    .map(|row| (0..cols).map(|col| field(row * cols + col)).collect())
                    .collect(),
            ),
        }
    }

    pub fn into_fields(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Double(parts) => parts.to_vec(),
            Self::Table(grid) => grid.into_iter().flatten().collect(),
        }
    }

    fn cells(&self) -> Box<dyn Iterator<Item = &String> + '_> {
        match self {
            Self::Single(value) => Box::new(std::iter::once(value)),
            Self::Double(parts) => Box::new(parts.iter()),
            Self::Table(grid) => Box::new(grid.iter().flatten()),
        }
    }
}

/// Layout of answer inputs for a task display number, as (rows, cols).
pub fn table_dimensions(number: u32) -> (usize, usize) {
    match number {
        1..=16 => (1, 1),
        17 | 18 => (1, 2),
        19 => (1, 3),
        25 => (10, 2),
        26 => (1, 2),
        27 => (2, 2),
        _ => (1, 1),
    }
}

pub fn is_present(value: &AnswerValue) -> bool {
    value.cells().any(|cell| !cell.trim().is_empty())
}

/// Whether a stored transport string counts toward progress for `shape`.
pub fn is_answered(shape: AnswerShape, raw: &str) -> bool {
    is_present(&decode(shape, raw))
}

pub fn encode(shape: AnswerShape, value: &AnswerValue) -> String {
    match (shape, value) {
        (AnswerShape::Single, AnswerValue::Single(text)) => text.trim().to_string(),
        (AnswerShape::Double, AnswerValue::Double(parts)) => encode_double(parts),
        (AnswerShape::Table { rows, cols }, AnswerValue::Table(grid)) => {
            encode_table(rows, cols, grid)
        }
        (shape, other) => {
            let fields = other.clone().into_fields();
            encode(shape, &AnswerValue::from_fields(shape, &fields))
        }
    }
}

/// Never fails: stored data that does not fit `shape` decodes to empty cells.
pub fn decode(shape: AnswerShape, raw: &str) -> AnswerValue {
    match shape {
        AnswerShape::Single => AnswerValue::Single(raw.trim().to_string()),
        AnswerShape::Double => AnswerValue::Double(decode_double(raw)),
        AnswerShape::Table { rows, cols } => AnswerValue::Table(decode_table(raw, rows, cols)),
    }
}

fn encode_double(parts: &[String; 2]) -> String {
    let mut map = Map::new();
    for (key, part) in DOUBLE_PART_KEYS.iter().zip(parts) {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            map.insert((*key).to_string(), Value::String(trimmed.to_string()));
        }
    }
    if map.is_empty() {
        return String::new();
    }
    Value::Object(map).to_string()
}

fn decode_double(raw: &str) -> [String; 2] {
    let mut parts = [String::new(), String::new()];
    if raw.trim().is_empty() {
        return parts;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return parts;
    };
    for (slot, key) in parts.iter_mut().zip(DOUBLE_PART_KEYS) {
        *slot = match map.get(key) {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            _ => String::new(),
        };
    }
    parts
}

fn encode_table(rows: usize, cols: usize, grid: &[Vec<String>]) -> String {
    let cell = |row: usize, col: usize| grid_cell(grid, row, col);
    // Trailing empty rows are left out; decode pads them back.
    let Some(last_row) = (0..rows)
        .rev()
        .find(|&row| (0..cols).any(|col| !cell(row, col).is_empty()))
    else {
        return String::new();
    };

    (0..=last_row)
        .map(|row| {
            (0..cols)
                .map(|col| escape_cell(cell(row, col)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn grid_cell(grid: &[Vec<String>], row: usize, col: usize) -> &str {
    grid.get(row)
        .and_then(|cells| cells.get(col))
        .map(|value| value.trim())
        .unwrap_or("")
}

fn escape_cell(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            ESCAPE => out.push_str("\\\\"),
            CELL_SEPARATOR => out.push_str("\\,"),
            ROW_SEPARATOR => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn decode_table(raw: &str, rows: usize, cols: usize) -> Vec<Vec<String>> {
    let mut grid = vec![vec![String::new(); cols]; rows];
    if raw.trim().is_empty() {
        return grid;
    }

    for (row_idx, cells) in split_grid(raw).into_iter().enumerate().take(rows) {
        for (col_idx, value) in cells.into_iter().enumerate().take(cols) {
            grid[row_idx][col_idx] = value.trim().to_string();
        }
    }
    grid
}

fn split_grid(raw: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => match chars.next() {
                Some('n') => cell.push(ROW_SEPARATOR),
                Some(CELL_SEPARATOR) => cell.push(CELL_SEPARATOR),
                Some(ESCAPE) => cell.push(ESCAPE),
                // Legacy answers were never escaped; keep unknown sequences verbatim.
                Some(other) => {
                    cell.push(ESCAPE);
                    cell.push(other);
                }
                None => cell.push(ESCAPE),
            },
            CELL_SEPARATOR => row.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&ROW_SEPARATOR) => {}
            ROW_SEPARATOR => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            other => cell.push(other),
        }
    }
    row.push(cell);
    rows.push(row);
    rows
}

#[cfg(test)]
#[path = "../tests/unit/codec_tests.rs"]
mod tests;
