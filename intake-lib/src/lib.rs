#![allow(clippy::needless_return)]

pub mod config;
mod consolidator;
mod error;
mod export;
mod intake_validator;
mod quality_report;
mod session;
mod table;
pub mod utils;

// Test utilities - only compiled when testing or with test feature
// #[cfg(test)] alone doesn't work for integration tests (they're external crates)
// The feature flag makes it available to integration tests via dev-dependencies
#[cfg(any(test, feature = "test"))]
pub mod test_utils;

pub use config::{IntakeConfig, MergeSuffixes};
pub use consolidator::{align_sources, consolidate_source};
pub use error::{
    ErrorKind, IntakeError, JoinSide, KeyError, StructuralIssue, TypeConflict, ValidationErrors,
};
pub use export::{
    CSV_MIME_TYPE, ExportArtifact, ExportFormat, SHEET_NAME, TSV_MIME_TYPE, WORKBOOK_MIME_TYPE,
    export, export_artifact,
};
pub use intake_validator::{
    FileFormat, IntakeValidator, IntakeValidatorBuilder, RawFile, ValidationResult,
};
pub use quality_report::{ColumnNullCount, QualityReport, report};
pub use session::{Session, TEMPLATE_FILE_STEM, UploadOutcome};
pub use table::{CellValue, Column, ColumnType, Table};

pub const ERRORS_LOG_FILE: &str = "errors.log";
