use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::table::ColumnType;

/// Coarse error category, one per failure family a caller may want to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Structural,
    Schema,
    SchemaConflict,
    Key,
    UnknownSource,
    UnknownTable,
    QualityGate,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralIssue {
    RaggedColumn {
        column: String,
        length: usize,
        expected: usize,
    },
    DuplicateHeader {
        header: String,
        positions: Vec<usize>,
    },
}

impl StructuralIssue {
    pub fn column(&self) -> &str {
        match self {
            StructuralIssue::RaggedColumn { column, .. } => column,
            StructuralIssue::DuplicateHeader { header, .. } => header,
        }
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralIssue::RaggedColumn {
                column,
                length,
                expected,
            } => write!(
                f,
                "column '{column}' has {length} value(s) but the table has {expected} row(s)"
            ),
            StructuralIssue::DuplicateHeader { header, positions } => {
                let columns = positions
                    .iter()
                    .map(|p| format!("column {p}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "header '{header}' appears in: {columns}")
            }
        }
    }
}

/// Two declarations of the same column name that cannot share a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConflict {
    pub column: String,
    pub first: ColumnType,
    pub second: ColumnType,
}

impl fmt::Display for TypeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({} vs {})", self.column, self.first, self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("At least one key column is required to align two tables")]
    Empty,

    #[error("Key column(s) missing from the {side} table: {}", quote_list(.columns))]
    Missing { side: JoinSide, columns: Vec<String> },

    #[error(
        "Merge suffixes produce column name(s) already in use: {}; choose other suffixes",
        quote_list(.columns)
    )]
    SuffixCollision { columns: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntakeError {
    #[error("Unable to read '{file}': {message}")]
    Parse { file: String, message: String },

    #[error("Inconsistent table structure: {}", join_display(.issues))]
    Structural { issues: Vec<StructuralIssue> },

    #[error("Missing required column(s): {}", quote_list(.missing))]
    Schema { missing: Vec<String> },

    #[error("Incompatible column types: {}", join_display(.conflicts))]
    SchemaConflict { conflicts: Vec<TypeConflict> },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    #[error("No table named '{name}' in source '{source_name}'")]
    UnknownTable { source_name: String, name: String },

    #[error("Export blocked by data quality issues: {}", join_display(.issues))]
    QualityGate { issues: Vec<String> },

    #[error("Unable to export table: {message}")]
    Export { message: String },
}

impl IntakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::Parse { .. } => ErrorKind::Parse,
            IntakeError::Structural { .. } => ErrorKind::Structural,
            IntakeError::Schema { .. } => ErrorKind::Schema,
            IntakeError::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            IntakeError::Key(_) => ErrorKind::Key,
            IntakeError::UnknownSource(_) => ErrorKind::UnknownSource,
            IntakeError::UnknownTable { .. } => ErrorKind::UnknownTable,
            IntakeError::QualityGate { .. } => ErrorKind::QualityGate,
            IntakeError::Export { .. } => ErrorKind::Export,
        }
    }

    /// Column names this error points at, in the order they were reported
    pub fn columns(&self) -> Vec<&str> {
        match self {
            IntakeError::Structural { issues } => issues.iter().map(|i| i.column()).collect(),
            IntakeError::Schema { missing } => missing.iter().map(String::as_str).collect(),
            IntakeError::SchemaConflict { conflicts } => {
                conflicts.iter().map(|c| c.column.as_str()).collect()
            }
            IntakeError::Key(KeyError::Missing { columns, .. })
            | IntakeError::Key(KeyError::SuffixCollision { columns }) => {
                columns.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<zip::result::ZipError> for IntakeError {
    fn from(err: zip::result::ZipError) -> Self {
        IntakeError::Export {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for IntakeError {
    fn from(err: std::io::Error) -> Self {
        IntakeError::Export {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for IntakeError {
    fn from(err: csv::Error) -> Self {
        IntakeError::Export {
            message: err.to_string(),
        }
    }
}

/// Every error found while validating one uploaded file. Never empty.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("'{file}' failed validation: {}", join_display(.errors))]
pub struct ValidationErrors {
    pub file: String,
    pub errors: Vec<IntakeError>,
}

impl ValidationErrors {
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind() == kind)
    }

    /// Multi-line rendering for the error log
    pub fn to_report(&self) -> String {
        let mut report = format!("File: {}\n", self.file);
        for error in &self.errors {
            report.push_str(&format!("  - {error}\n"));
        }
        report
    }
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_display<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_message_names_every_column() {
        let error = IntakeError::Structural {
            issues: vec![
                StructuralIssue::RaggedColumn {
                    column: "B".to_string(),
                    length: 4,
                    expected: 5,
                },
                StructuralIssue::DuplicateHeader {
                    header: "A".to_string(),
                    positions: vec![1, 3],
                },
            ],
        };

        let message = error.to_string();
        assert!(message.contains("column 'B' has 4 value(s)"));
        assert!(message.contains("header 'A' appears in: column 1, column 3"));
        assert_eq!(error.columns(), vec!["B", "A"]);
        assert_eq!(error.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_key_error_converts_into_intake_error() {
        let error: IntakeError = KeyError::Missing {
            side: JoinSide::Right,
            columns: vec!["ID".to_string()],
        }
        .into();

        assert_eq!(error.kind(), ErrorKind::Key);
        assert_eq!(
            error.to_string(),
            "Key column(s) missing from the right table: 'ID'"
        );
    }

    #[test]
    fn test_schema_conflict_message() {
        let error = IntakeError::SchemaConflict {
            conflicts: vec![TypeConflict {
                column: "Age".to_string(),
                first: ColumnType::Number,
                second: ColumnType::Text,
            }],
        };
        assert_eq!(
            error.to_string(),
            "Incompatible column types: 'Age' (number vs text)"
        );
    }
}
