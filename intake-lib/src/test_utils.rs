// Test utilities available to both unit and integration tests
// Only compiled when testing

use chrono::NaiveDate;

use crate::intake_validator::RawFile;
use crate::table::{CellValue, Table};

#[allow(dead_code)]
pub fn num(value: f64) -> CellValue {
    CellValue::Number(value)
}

#[allow(dead_code)]
pub fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

/// Midnight date cell
#[allow(dead_code)]
pub fn date(year: i32, month: u32, day: u32) -> CellValue {
    datetime(year, month, day, 0, 0, 0)
}

#[allow(dead_code)]
pub fn datetime(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> CellValue {
    let value = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .unwrap();
    CellValue::Date(value)
}

/// Build a table from rows, panicking on structural errors
#[allow(dead_code)]
pub fn table(names: &[&str], rows: Vec<Vec<CellValue>>) -> Table {
    Table::from_rows(names, rows).unwrap()
}

#[allow(dead_code)]
pub fn csv_file(name: &str, content: &str) -> RawFile {
    RawFile::new(name, content.as_bytes())
}

/// The "material" table used across the alignment scenarios
#[allow(dead_code)]
pub fn sample_materials() -> Table {
    table(
        &["ID", "Name"],
        vec![vec![num(1.0), text("x")], vec![num(2.0), text("y")]],
    )
}

#[allow(dead_code)]
pub fn sample_departments() -> Table {
    table(
        &["ID", "Dept"],
        vec![vec![num(2.0), text("Eng")], vec![num(3.0), text("HR")]],
    )
}
