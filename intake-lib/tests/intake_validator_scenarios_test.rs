//! Structural, schema and parse failures as reported for whole uploads

use intake_lib::{
    CellValue, ColumnType, ErrorKind, IntakeError, IntakeValidatorBuilder, RawFile, StructuralIssue,
};
use proptest::prelude::*;

mod common;
use common::*;

#[test]
fn test_short_column_is_named_in_structural_error() {
    // A has five values, B only four
    let file = csv_file("samples.csv", "A,B\n1,1\n2,2\n3,3\n4,4\n5\n");

    let errors = default_validator().validate(&file).unwrap_err();

    assert_eq!(errors.file, "samples.csv");
    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].kind(), ErrorKind::Structural);
    assert_eq!(errors.errors[0].columns(), vec!["B"]);
    assert_eq!(
        errors.errors[0],
        IntakeError::Structural {
            issues: vec![StructuralIssue::RaggedColumn {
                column: "B".to_string(),
                length: 4,
                expected: 5,
            }]
        }
    );
}

#[test]
fn test_structural_and_schema_errors_are_reported_together() {
    let file = csv_file("samples.csv", "ID,ID\n1,2\n");
    let validator = IntakeValidatorBuilder::new()
        .expected_columns(&["Depth".to_string()])
        .build();

    let errors = validator.validate(&file).unwrap_err();

    assert!(errors.has_kind(ErrorKind::Structural));
    assert!(errors.has_kind(ErrorKind::Schema));
    assert_eq!(errors.errors[0].kind(), ErrorKind::Structural);
    assert!(errors.to_report().contains("'Depth'"));
}

#[test]
fn test_duplicate_headers_are_structural() {
    // Headers clash after normalization, positions are 1-based
    let clash = csv_file("dup.csv", "ID,Name, ID \n1,x,2\n");

    let errors = default_validator().validate(&clash).unwrap_err();

    assert_eq!(
        errors.errors,
        vec![IntakeError::Structural {
            issues: vec![StructuralIssue::DuplicateHeader {
                header: "ID".to_string(),
                positions: vec![1, 3],
            }]
        }]
    );
}

#[test]
fn test_unreadable_workbook_is_a_parse_error() {
    let file = RawFile::new("broken.xlsx", b"definitely not a workbook".to_vec());

    let errors = default_validator().validate(&file).unwrap_err();

    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].kind(), ErrorKind::Parse);
}

#[test]
fn test_missing_sheet_is_a_parse_error() {
    let file = workbook_file("samples.xlsx", &sample_materials());
    let validator = IntakeValidatorBuilder::new().sheet_name("Stations").build();

    let errors = validator.validate(&file).unwrap_err();

    assert_eq!(errors.errors[0].kind(), ErrorKind::Parse);
}

#[test]
fn test_named_sheet_is_read() {
    let file = workbook_file("samples.xlsx", &sample_materials());
    let validator = IntakeValidatorBuilder::new()
        .sheet_name(intake_lib::SHEET_NAME)
        .build();

    assert_eq!(validator.validate(&file).unwrap(), sample_materials());
}

#[test]
fn test_csv_types_are_inferred_per_column() {
    let file = csv_file(
        "stations.csv",
        "Station,Depth,Active,Collected,Notes\nS1,12.5,true,2025-02-26,\nS2,7,false,2025-02-27 10:30:00,\n",
    );

    let table = default_validator().validate(&file).unwrap();

    let types: Vec<ColumnType> = table.columns().iter().map(|c| c.column_type()).collect();
    assert_eq!(
        types,
        vec![
            ColumnType::Text,
            ColumnType::Number,
            ColumnType::Bool,
            ColumnType::Date,
            ColumnType::Empty,
        ]
    );
    assert_eq!(
        table.row(1),
        Some(vec![
            &text("S2"),
            &num(7.0),
            &CellValue::Bool(false),
            &datetime(2025, 2, 27, 10, 30, 0),
            &CellValue::Null,
        ])
    );
}

proptest! {
    #[test]
    fn test_validate_never_panics_on_text_uploads(
        content in proptest::collection::vec(any::<u8>(), 0..256),
        extension in prop::sample::select(vec!["csv", "tsv", "txt"]),
    ) {
        let file = RawFile::new(format!("upload.{extension}"), content);
        match default_validator().validate(&file) {
            Ok(table) => {
                for column in table.columns() {
                    prop_assert_eq!(column.len(), table.row_count());
                }
            }
            Err(errors) => prop_assert!(!errors.errors.is_empty()),
        }
    }
}
