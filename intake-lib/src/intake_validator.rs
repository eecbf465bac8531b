use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::config::IntakeConfig;
use crate::error::{IntakeError, ValidationErrors};
use crate::table::{CellValue, Column, Table};
use crate::utils::{
    excel_serial_to_datetime, is_blank, normalize_header, parse_iso_datetime, unnamed_header,
};

/// Either the validated table or every error found in the file, never both
pub type ValidationResult = Result<Table, ValidationErrors>;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &str = "\u{feff}";

/// Upload as it arrives from the presentation layer: a file name and its full content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(RawFile { name, bytes })
    }

    /// Format declared by the file extension, falling back to the content's magic bytes
    pub fn format(&self) -> FileFormat {
        FileFormat::from_file_name(&self.name).unwrap_or_else(|| FileFormat::sniff(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// xlsx, xlsm, xlsb, xls or ods
    Workbook,
    Csv,
    Tsv,
    /// Delimited text using the configured delimiter
    Text,
}

impl FileFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Workbook),
            "csv" => Some(FileFormat::Csv),
            "tsv" | "tab" => Some(FileFormat::Tsv),
            "txt" => Some(FileFormat::Text),
            _ => None,
        }
    }

    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE2_MAGIC) {
            FileFormat::Workbook
        } else {
            FileFormat::Text
        }
    }
}

/// Headers plus one cell vector per column, before the structural check.
/// Columns may still differ in length here.
#[derive(Debug, Default)]
struct ParsedGrid {
    headers: Vec<String>,
    columns: Vec<Vec<CellValue>>,
}

impl ParsedGrid {
    fn add_column(&mut self, header: String) {
        self.headers.push(header);
        self.columns.push(Vec::new());
    }

    fn into_table(self) -> Result<Table, IntakeError> {
        let columns = self
            .headers
            .into_iter()
            .zip(self.columns)
            .map(|(header, cells)| Column::new(header, cells))
            .collect();
        Table::from_columns(columns)
    }
}

pub struct IntakeValidator {
    sheet_name: Option<String>,
    delimiter: u8,
    null_markers: Vec<String>,
    skip_blank_rows: bool,
    expected_columns: Vec<String>,
}

pub struct IntakeValidatorBuilder {
    sheet_name: Option<String>,
    delimiter: u8,
    null_markers: Vec<String>,
    skip_blank_rows: bool,
    expected_columns: Vec<String>,
}

impl Default for IntakeValidatorBuilder {
    fn default() -> Self {
        IntakeValidatorBuilder {
            sheet_name: None,
            delimiter: b',',
            null_markers: Vec::new(),
            skip_blank_rows: false,
            expected_columns: Vec::new(),
        }
    }
}

impl IntakeValidatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every option from a session config
    pub fn from_config(config: &IntakeConfig) -> Self {
        IntakeValidatorBuilder {
            sheet_name: config.sheet_name.clone(),
            delimiter: config.delimiter_byte(),
            null_markers: config.null_markers.clone(),
            skip_blank_rows: config.skip_blank_rows,
            expected_columns: config.expected_columns.clone(),
        }
    }

    pub fn sheet_name(mut self, sheet_name: &str) -> Self {
        self.sheet_name = Some(sheet_name.to_string());
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn null_markers(mut self, markers: &[String]) -> Self {
        self.null_markers = markers.to_vec();
        self
    }

    pub fn skip_blank_rows(mut self, skip: bool) -> Self {
        self.skip_blank_rows = skip;
        self
    }

    pub fn expected_columns(mut self, columns: &[String]) -> Self {
        self.expected_columns = columns.to_vec();
        self
    }

    pub fn build(self) -> IntakeValidator {
        IntakeValidator {
            sheet_name: self.sheet_name,
            delimiter: self.delimiter,
            null_markers: self.null_markers,
            skip_blank_rows: self.skip_blank_rows,
            // Compare against headers the way headers themselves are normalized
            expected_columns: self
                .expected_columns
                .iter()
                .map(|c| normalize_header(c))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

impl IntakeValidator {
    //////////////////////////////////////////////////////////////
    ///  Public API
    //////////////////////////////////////////////////////////////

    pub fn expected_columns(&self) -> &[String] {
        &self.expected_columns
    }

    /// Parse and check one uploaded file.
    ///
    /// A parse failure stops immediately; structural and schema problems are collected
    /// together so the caller sees everything wrong with the file at once.
    pub fn validate(&self, raw_file: &RawFile) -> ValidationResult {
        let failure = |errors: Vec<IntakeError>| ValidationErrors {
            file: raw_file.name.clone(),
            errors,
        };

        let grid = self.parse(raw_file).map_err(|e| failure(vec![e]))?;

        let mut errors = Vec::new();
        let schema_error = self.check_expected_columns(&grid.headers);
        match grid.into_table() {
            Ok(table) => {
                if let Some(error) = schema_error {
                    errors.push(error);
                } else {
                    debug!(
                        file = %raw_file.name,
                        rows = table.row_count(),
                        columns = table.column_count(),
                        "upload validated"
                    );
                    return Ok(table);
                }
            }
            Err(structural) => {
                errors.push(structural);
                errors.extend(schema_error);
            }
        }

        Err(failure(errors))
    }

    //////////////////////////////////////////////////////////////
    ///  Private methods
    //////////////////////////////////////////////////////////////

    fn parse(&self, raw_file: &RawFile) -> Result<ParsedGrid, IntakeError> {
        let format = raw_file.format();
        debug!(file = %raw_file.name, ?format, bytes = raw_file.bytes.len(), "parsing upload");
        match format {
            FileFormat::Workbook => self.parse_workbook(raw_file),
            FileFormat::Csv => self.parse_delimited(raw_file, b','),
            FileFormat::Tsv => self.parse_delimited(raw_file, b'\t'),
            FileFormat::Text => self.parse_delimited(raw_file, self.delimiter),
        }
    }

    fn parse_workbook(&self, raw_file: &RawFile) -> Result<ParsedGrid, IntakeError> {
        let parse_error = |message: String| IntakeError::Parse {
            file: raw_file.name.clone(),
            message,
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(raw_file.bytes.as_slice()))
            .map_err(|e| parse_error(format!("not a readable workbook ({e})")))?;

        let range: Range<Data> = match &self.sheet_name {
            Some(sheet_name) => workbook
                .worksheet_range(sheet_name)
                .map_err(|e| parse_error(format!("error reading sheet '{sheet_name}': {e}")))?,
            None => workbook
                .worksheet_range_at(0)
                .ok_or_else(|| parse_error("workbook contains no sheets".to_string()))?
                .map_err(|e| parse_error(format!("error reading first sheet: {e}")))?,
        };

        let mut grid = ParsedGrid::default();
        for (row_index, row) in range.rows().enumerate() {
            if row_index == 0 {
                // First row contains headers
                for (col_index, cell) in row.iter().enumerate() {
                    grid.add_column(Self::header_name(&cell.to_string(), col_index));
                }
                continue;
            }

            let values: Vec<CellValue> = row.iter().map(|cell| self.convert_cell(cell)).collect();
            if self.skip_blank_rows && values.iter().all(CellValue::is_null) {
                continue;
            }
            for (col_index, value) in values.into_iter().enumerate() {
                grid.columns[col_index].push(value);
            }
        }

        Ok(grid)
    }

    fn parse_delimited(&self, raw_file: &RawFile, delimiter: u8) -> Result<ParsedGrid, IntakeError> {
        let parse_error = |message: String| IntakeError::Parse {
            file: raw_file.name.clone(),
            message,
        };

        let content = std::str::from_utf8(&raw_file.bytes)
            .map_err(|e| parse_error(format!("content is not valid UTF-8 text ({e})")))?;
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        let mut grid = ParsedGrid::default();
        for (record_index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| parse_error(e.to_string()))?;

            if record_index == 0 {
                for (col_index, field) in record.iter().enumerate() {
                    grid.add_column(Self::header_name(field, col_index));
                }
                continue;
            }

            if self.skip_blank_rows && record.iter().all(is_blank) {
                continue;
            }

            // Fields past the header land in unnamed columns, which are then short
            // for every record that does not reach them
            for (col_index, field) in record.iter().enumerate() {
                if col_index >= grid.columns.len() {
                    grid.add_column(unnamed_header(col_index));
                }
                grid.columns[col_index].push(self.infer_text_cell(field));
            }
        }

        Ok(grid)
    }

    fn header_name(raw: &str, index: usize) -> String {
        let header = normalize_header(raw);
        if header.is_empty() {
            unnamed_header(index)
        } else {
            header
        }
    }

    /// Convert a workbook cell. Strings stay text; only blank or null-marker strings become null.
    fn convert_cell(&self, cell: &Data) -> CellValue {
        match cell {
            Data::Empty | Data::Error(_) => CellValue::Null,
            Data::String(s) => {
                if is_blank(s) || self.is_null_marker(s) {
                    CellValue::Null
                } else {
                    CellValue::Text(s.clone())
                }
            }
            Data::Float(f) => CellValue::number(*f),
            Data::Int(i) => CellValue::number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => {
                if dt.is_duration() {
                    CellValue::number(dt.as_f64())
                } else {
                    excel_serial_to_datetime(dt.as_f64())
                        .map(CellValue::Date)
                        .unwrap_or(CellValue::Null)
                }
            }
            Data::DateTimeIso(s) => parse_iso_datetime(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }

    /// Infer a typed value from a delimited-text field: null, number, boolean, date, then text
    fn infer_text_cell(&self, field: &str) -> CellValue {
        let trimmed = field.trim();
        if trimmed.is_empty() || self.is_null_marker(trimmed) {
            return CellValue::Null;
        }

        if let Ok(number) = trimmed.parse::<f64>() {
            // "NaN" and "inf" parse as floats but are kept as the text they are
            if number.is_finite() {
                return CellValue::Number(number);
            }
            return CellValue::Text(field.to_string());
        }

        match trimmed.to_lowercase().as_str() {
            "true" => return CellValue::Bool(true),
            "false" => return CellValue::Bool(false),
            _ => {}
        }

        if let Some(date) = parse_iso_datetime(trimmed) {
            return CellValue::Date(date);
        }

        CellValue::Text(field.to_string())
    }

    fn is_null_marker(&self, value: &str) -> bool {
        let value = value.trim();
        self.null_markers.iter().any(|marker| marker == value)
    }

    fn check_expected_columns(&self, headers: &[String]) -> Option<IntakeError> {
        let missing: Vec<String> = self
            .expected_columns
            .iter()
            .filter(|expected| !headers.contains(expected))
            .cloned()
            .collect();

        if missing.is_empty() {
            None
        } else {
            Some(IntakeError::Schema { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::*;
    use calamine::CellErrorType;

    fn default_validator() -> IntakeValidator {
        IntakeValidatorBuilder::new().build()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            FileFormat::from_file_name("Tracker.XLSX"),
            Some(FileFormat::Workbook)
        );
        assert_eq!(FileFormat::from_file_name("legacy.xls"), Some(FileFormat::Workbook));
        assert_eq!(FileFormat::from_file_name("vendor.csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_file_name("vendor.tsv"), Some(FileFormat::Tsv));
        assert_eq!(FileFormat::from_file_name("no_extension"), None);
    }

    #[test]
    fn test_format_sniffing() {
        assert_eq!(FileFormat::sniff(b"PK\x03\x04rest"), FileFormat::Workbook);
        assert_eq!(FileFormat::sniff(b"ID,Name\n1,x\n"), FileFormat::Text);
    }

    #[test]
    fn test_infer_text_cell_types() {
        let validator = default_validator();

        assert_eq!(validator.infer_text_cell("   "), CellValue::Null);
        assert_eq!(validator.infer_text_cell("42"), num(42.0));
        assert_eq!(validator.infer_text_cell(" -1.5 "), num(-1.5));
        assert_eq!(validator.infer_text_cell("TRUE"), CellValue::Bool(true));
        assert_eq!(
            validator.infer_text_cell("2025-02-26"),
            date(2025, 2, 26)
        );
        assert_eq!(validator.infer_text_cell("NaN"), text("NaN"));
        assert_eq!(validator.infer_text_cell("Sample A"), text("Sample A"));
    }

    #[test]
    fn test_null_markers_apply_to_text_cells() {
        let validator = IntakeValidatorBuilder::new()
            .null_markers(&["N/A".to_string()])
            .build();

        assert_eq!(validator.infer_text_cell("N/A"), CellValue::Null);
        assert_eq!(
            validator.convert_cell(&Data::String("N/A".to_string())),
            CellValue::Null
        );
    }

    #[test]
    fn test_config_null_markers_match_trimmed_cells() {
        let config = IntakeConfig {
            null_markers: vec!["N/A".to_string()],
            ..IntakeConfig::default()
        };
        let validator = IntakeValidatorBuilder::from_config(&config).build();

        assert!(validator.is_null_marker(" N/A "));
        assert!(!validator.is_null_marker("NA"));
        assert_eq!(validator.infer_text_cell(" N/A "), CellValue::Null);
    }

    #[test]
    fn test_convert_workbook_cells() {
        let validator = default_validator();

        assert_eq!(validator.convert_cell(&Data::Empty), CellValue::Null);
        assert_eq!(
            validator.convert_cell(&Data::Error(CellErrorType::Div0)),
            CellValue::Null
        );
        assert_eq!(validator.convert_cell(&Data::Int(7)), num(7.0));
        assert_eq!(validator.convert_cell(&Data::Float(f64::NAN)), CellValue::Null);
        assert_eq!(
            validator.convert_cell(&Data::String("  ".to_string())),
            CellValue::Null
        );
        // Workbook strings are never re-typed
        assert_eq!(
            validator.convert_cell(&Data::String("123".to_string())),
            text("123")
        );
        assert_eq!(
            validator.convert_cell(&Data::DateTimeIso("2025-02-26".to_string())),
            date(2025, 2, 26)
        );
    }

    #[test]
    fn test_csv_upload_produces_typed_table() {
        let raw = csv_file("samples.csv", "ID,Name,Collected\n1,x,2025-02-26\n2,,2025-02-27\n");

        let table = default_validator().validate(&raw).unwrap();

        assert_eq!(table.column_names(), vec!["ID", "Name", "Collected"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.row(1), Some(vec![&num(2.0), &CellValue::Null, &date(2025, 2, 27)]));
    }

    #[test]
    fn test_bom_is_stripped_from_first_header() {
        let raw = csv_file("bom.csv", "\u{feff}ID,Name\n1,x\n");
        let table = default_validator().validate(&raw).unwrap();
        assert_eq!(table.column_names(), vec!["ID", "Name"]);
    }

    #[test]
    fn test_headers_are_normalized_and_blank_headers_named() {
        let raw = csv_file("headers.csv", "\"  Sample\n ID \",,Depth\n1,2,3\n");

        let table = default_validator().validate(&raw).unwrap();
        assert_eq!(table.column_names(), vec!["Sample ID", "Unnamed: 1", "Depth"]);
    }

    #[test]
    fn test_short_record_makes_trailing_column_ragged() {
        let raw = csv_file("ragged.csv", "A,B\n1,1\n2,2\n3,3\n4,4\n5\n");

        let errors = default_validator().validate(&raw).unwrap_err();

        assert_eq!(errors.errors.len(), 1);
        assert_eq!(errors.errors[0].kind(), ErrorKind::Structural);
        assert_eq!(errors.errors[0].columns(), vec!["B"]);
    }

    #[test]
    fn test_long_record_creates_short_unnamed_column() {
        let raw = csv_file("overflow.csv", "A,B\n1,2\n3,4,5\n");

        let errors = default_validator().validate(&raw).unwrap_err();
        assert_eq!(errors.errors[0].columns(), vec!["Unnamed: 2"]);
    }

    #[test]
    fn test_duplicate_headers_are_structural_errors() {
        let raw = csv_file("dupes.csv", "ID,Name,ID\n1,x,1\n");

        let errors = default_validator().validate(&raw).unwrap_err();
        assert!(errors.has_kind(ErrorKind::Structural));
        assert!(errors.to_string().contains("column 1, column 3"));
    }

    #[test]
    fn test_missing_expected_columns_are_all_named() {
        let validator = IntakeValidatorBuilder::new()
            .expected_columns(&[
                "MaterialID".to_string(),
                "Description".to_string(),
                "Prep ID".to_string(),
            ])
            .build();
        let raw = csv_file("materials.csv", "MaterialID,Extra\n101,x\n");

        let errors = validator.validate(&raw).unwrap_err();

        assert_eq!(errors.errors.len(), 1);
        assert_eq!(errors.errors[0].kind(), ErrorKind::Schema);
        assert_eq!(errors.errors[0].columns(), vec!["Description", "Prep ID"]);
    }

    #[test]
    fn test_structural_and_schema_errors_are_reported_together() {
        let validator = IntakeValidatorBuilder::new()
            .expected_columns(&["Description".to_string()])
            .build();
        let raw = csv_file("both.csv", "A,B\n1,2\n3\n");

        let errors = validator.validate(&raw).unwrap_err();
        let kinds: Vec<ErrorKind> = errors.errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![ErrorKind::Structural, ErrorKind::Schema]);
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let raw = RawFile::new("broken.csv", vec![0x49, 0x44, 0xff, 0xfe, 0x0a]);

        let errors = default_validator().validate(&raw).unwrap_err();
        assert!(errors.has_kind(ErrorKind::Parse));
    }

    #[test]
    fn test_corrupt_workbook_is_a_parse_error() {
        let raw = RawFile::new("broken.xlsx", b"PK\x03\x04 definitely not a zip".to_vec());

        let errors = default_validator().validate(&raw).unwrap_err();
        assert_eq!(errors.errors.len(), 1);
        assert_eq!(errors.errors[0].kind(), ErrorKind::Parse);
        assert_eq!(errors.file, "broken.xlsx");
    }

    #[test]
    fn test_empty_file_is_an_empty_table() {
        let raw = csv_file("empty.csv", "");
        assert_eq!(default_validator().validate(&raw), Ok(Table::empty()));
    }

    #[test]
    fn test_skip_blank_rows() {
        let raw = csv_file("blank.csv", "A,B\n1,2\n,\n3,4\n");

        let kept = default_validator().validate(&raw).unwrap();
        assert_eq!(kept.row_count(), 3);

        let skipped = IntakeValidatorBuilder::new()
            .skip_blank_rows(true)
            .build()
            .validate(&raw)
            .unwrap();
        assert_eq!(skipped.row_count(), 2);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let raw = csv_file("same.csv", "ID,Name\n1,x\n2,y\n");
        let validator = default_validator();
        assert_eq!(validator.validate(&raw), validator.validate(&raw));
    }
}
