use intake_lib::{ExportFormat, IntakeValidator, IntakeValidatorBuilder, RawFile, Table, export};

// Re-export shared test utilities from src/test_utils.rs
// These are the core functions used by most tests
pub use intake_lib::test_utils::{
    csv_file, date, datetime, num, sample_departments, sample_materials, table, text,
};

// =============================================================================
// Upload helpers
// =============================================================================

/// Validator with default settings and no required columns
#[allow(dead_code)]
pub fn default_validator() -> IntakeValidator {
    IntakeValidatorBuilder::new().build()
}

/// Write a table to an in-memory workbook upload
#[allow(dead_code)]
pub fn workbook_file(name: &str, table: &Table) -> RawFile {
    let bytes = export(table, ExportFormat::Workbook).unwrap();
    RawFile::new(name, bytes)
}

/// Export as a workbook and validate it again
#[allow(dead_code)]
pub fn round_trip(table: &Table) -> Table {
    default_validator()
        .validate(&workbook_file("round_trip.xlsx", table))
        .unwrap()
}
