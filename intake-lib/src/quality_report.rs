use serde::Serialize;
use std::collections::HashSet;

use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNullCount {
    pub column: String,
    pub nulls: usize,
}

/// Advisory statistics for one table. Never an error: callers decide what to gate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub row_count: usize,
    /// One entry per column, in column order
    pub null_counts: Vec<ColumnNullCount>,
    /// Rows identical to an earlier row, counted with multiplicity
    pub duplicate_rows: usize,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_rows == 0 && self.null_counts.iter().all(|c| c.nulls == 0)
    }

    pub fn null_count(&self, column: &str) -> Option<usize> {
        self.null_counts
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.nulls)
    }

    /// Human-readable findings, empty for a clean report
    pub fn issues(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .null_counts
            .iter()
            .filter(|c| c.nulls > 0)
            .map(|c| format!("Missing {}: {} of {} row(s)", c.column, c.nulls, self.row_count))
            .collect();

        if self.duplicate_rows > 0 {
            issues.push(format!("Duplicate rows: {}", self.duplicate_rows));
        }
        issues
    }
}

/// Count nulls per column and duplicate rows. Linear in the number of cells.
pub fn report(table: &Table) -> QualityReport {
    let null_counts = table
        .columns()
        .iter()
        .map(|column| ColumnNullCount {
            column: column.name().to_string(),
            nulls: column.null_count(),
        })
        .collect();

    QualityReport {
        row_count: table.row_count(),
        null_counts,
        duplicate_rows: count_duplicate_rows(table),
    }
}

fn count_duplicate_rows(table: &Table) -> usize {
    let mut seen = HashSet::with_capacity(table.row_count());
    let mut duplicates = 0;
    for row in table.rows() {
        if !seen.insert(row) {
            duplicates += 1;
        }
    }
    duplicates
}
