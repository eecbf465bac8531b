use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{IntakeError, StructuralIssue};
use crate::utils::format_datetime;

/// A single cell. Non-finite numbers never make it into a table, so equality and hashing are total.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Build a numeric cell; NaN and infinities become null
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Number(value)
        } else {
            CellValue::Null
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn kind(&self) -> ColumnType {
        match self {
            CellValue::Null => ColumnType::Empty,
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Number(_) => ColumnType::Number,
            CellValue::Bool(_) => ColumnType::Bool,
            CellValue::Date(_) => ColumnType::Date,
        }
    }
}

// -0.0 and 0.0 must hash alike since they compare equal
fn number_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => number_bits(*a) == number_bits(*b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Date(a), CellValue::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Null => {}
            CellValue::Text(s) => s.hash(state),
            CellValue::Number(n) => number_bits(*n).hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{}", format_datetime(d)),
        }
    }
}

/// Whole numbers print without a trailing ".0" so exported ids stay readable
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Every cell is null, so nothing is known about the column yet
    Empty,
    Text,
    Number,
    Bool,
    Date,
}

impl ColumnType {
    /// Infer the type of a column from its non-null cells. Mixed kinds fall back to text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a CellValue>) -> ColumnType {
        let mut inferred = ColumnType::Empty;
        for cell in cells {
            let kind = cell.kind();
            inferred = match (inferred, kind) {
                (current, ColumnType::Empty) => current,
                (ColumnType::Empty, kind) => kind,
                (current, kind) if current == kind => current,
                _ => return ColumnType::Text,
            };
        }
        inferred
    }

    /// Combined type of two declarations of the same column, `None` when they conflict
    pub fn merge(self, other: ColumnType) -> Option<ColumnType> {
        match (self, other) {
            (ColumnType::Empty, other) => Some(other),
            (current, ColumnType::Empty) => Some(current),
            (current, other) if current == other => Some(current),
            _ => None,
        }
    }

    pub fn is_compatible_with(self, other: ColumnType) -> bool {
        self.merge(other).is_some()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Empty => "empty",
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Bool => "boolean",
            ColumnType::Date => "date",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    cells: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<CellValue>) -> Self {
        let column_type = ColumnType::infer(&cells);
        Column {
            name: name.into(),
            column_type,
            cells,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }
}

/// Ordered named columns of equal length. Immutable once built; every pipeline stage produces a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn empty() -> Self {
        Table::default()
    }

    /// Build a table, rejecting ragged columns and repeated column names
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, IntakeError> {
        let row_count = columns.iter().map(Column::len).max().unwrap_or(0);

        let mut issues: Vec<StructuralIssue> = columns
            .iter()
            .filter(|column| column.len() != row_count)
            .map(|column| StructuralIssue::RaggedColumn {
                column: column.name.clone(),
                length: column.len(),
                expected: row_count,
            })
            .collect();
        issues.extend(Self::duplicate_names(&columns));

        if issues.is_empty() {
            Ok(Table { columns, row_count })
        } else {
            Err(IntakeError::Structural { issues })
        }
    }

    /// Row-oriented constructor, mostly for building small tables by hand
    pub fn from_rows(names: &[&str], rows: Vec<Vec<CellValue>>) -> Result<Self, IntakeError> {
        let mut cells: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            for (index, value) in row.into_iter().enumerate() {
                if let Some(column) = cells.get_mut(index) {
                    column.push(value);
                }
            }
        }
        let columns = names
            .iter()
            .zip(cells)
            .map(|(name, cells)| Column::new(*name, cells))
            .collect();
        Self::from_columns(columns)
    }

    /// Callers guarantee equal lengths and unique names
    pub(crate) fn from_columns_unchecked(columns: Vec<Column>) -> Self {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        Table { columns, row_count }
    }

    fn duplicate_names(columns: &[Column]) -> Vec<StructuralIssue> {
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for (index, column) in columns.iter().enumerate() {
            let entry = positions.entry(column.name.as_str()).or_default();
            if entry.is_empty() {
                order.push(column.name.as_str());
            }
            entry.push(index + 1);
        }

        order
            .into_iter()
            .filter_map(|name| {
                let found = &positions[name];
                (found.len() > 1).then(|| StructuralIssue::DuplicateHeader {
                    header: name.to_string(),
                    positions: found.clone(),
                })
            })
            .collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<Vec<&CellValue>> {
        if index >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.cells[index]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&CellValue>> + '_ {
        (0..self.row_count).map(move |index| self.columns.iter().map(|c| &c.cells[index]).collect())
    }

    /// First `n` rows, used for upload previews
    pub fn head(&self, n: usize) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.cells.iter().take(n).cloned().collect()))
            .collect();
        Table::from_columns_unchecked(columns)
    }
}
