use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::IntakeError;
use crate::table::{CellValue, Table};
use crate::utils::datetime_to_excel_serial;

/// Name of the only worksheet in an exported workbook
pub const SHEET_NAME: &str = "Sheet1";

pub const WORKBOOK_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_MIME_TYPE: &str = "text/csv";
pub const TSV_MIME_TYPE: &str = "text/tab-separated-values";

// Cell style indexes into the cellXfs list written in styles.xml
const STYLE_DATE: u8 = 1;
const STYLE_DATETIME: u8 = 2;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// Built-in number formats 14 (date) and 22 (date-time) mark serial numbers as dates for readers
const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Single-sheet xlsx workbook
    Workbook,
    DelimitedText { delimiter: u8 },
}

impl ExportFormat {
    pub fn csv() -> Self {
        ExportFormat::DelimitedText { delimiter: b',' }
    }

    pub fn tsv() -> Self {
        ExportFormat::DelimitedText { delimiter: b'\t' }
    }

    /// Pick a format from a target file name's extension
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "xlsx" => Some(ExportFormat::Workbook),
            "csv" => Some(ExportFormat::csv()),
            "tsv" => Some(ExportFormat::tsv()),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Workbook => "xlsx",
            ExportFormat::DelimitedText { delimiter: b'\t' } => "tsv",
            ExportFormat::DelimitedText { .. } => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Workbook => WORKBOOK_MIME_TYPE,
            ExportFormat::DelimitedText { delimiter: b'\t' } => TSV_MIME_TYPE,
            ExportFormat::DelimitedText { .. } => CSV_MIME_TYPE,
        }
    }
}

/// Exported bytes tagged with the file name they should be downloaded as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Serialize a table. Column order is the table's column order.
pub fn export(table: &Table, format: ExportFormat) -> Result<Vec<u8>, IntakeError> {
    match format {
        ExportFormat::Workbook => write_workbook(table),
        ExportFormat::DelimitedText { delimiter } => write_delimited(table, delimiter),
    }
}

pub fn export_artifact(
    table: &Table,
    format: ExportFormat,
    file_stem: &str,
) -> Result<ExportArtifact, IntakeError> {
    let bytes = export(table, format)?;
    Ok(ExportArtifact {
        file_name: format!("{file_stem}.{}", format.extension()),
        mime_type: format.mime_type(),
        bytes,
    })
}

fn write_delimited(table: &Table, delimiter: u8) -> Result<Vec<u8>, IntakeError> {
    // Quote fields only when necessary (e.g. when they contain the delimiter)
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    if !table.is_empty() {
        writer.write_record(table.column_names())?;
    }
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer.into_inner().map_err(|e| IntakeError::Export {
        message: e.to_string(),
    })
}

fn write_workbook(table: &Table) -> Result<Vec<u8>, IntakeError> {
    let sheet_xml = worksheet_xml(table);
    let workbook_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape(SHEET_NAME)
    );

    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("xl/workbook.xml", &workbook_xml),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
        ("xl/styles.xml", STYLES_XML),
        ("xl/worksheets/sheet1.xml", &sheet_xml),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (path, content) in parts {
        zip.start_file(path, options)?;
        zip.write_all(content.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

fn worksheet_xml(table: &Table) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    if !table.is_empty() {
        xml.push_str(r#"<row r="1">"#);
        for (col, name) in table.column_names().into_iter().enumerate() {
            push_inline_string(&mut xml, &cell_reference(col, 1), name);
        }
        xml.push_str("</row>");
    }

    for (index, row) in table.rows().enumerate() {
        let row_number = index + 2;
        xml.push_str(&format!(r#"<row r="{row_number}">"#));
        if row.iter().all(|cell| cell.is_null()) {
            // A row without cells would vanish on re-read, an empty string reads back as null
            push_inline_string(&mut xml, &cell_reference(0, row_number), "");
        }
        for (col, cell) in row.into_iter().enumerate() {
            push_cell(&mut xml, &cell_reference(col, row_number), cell);
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_cell(xml: &mut String, reference: &str, cell: &CellValue) {
    match cell {
        CellValue::Null => {}
        CellValue::Text(s) => push_inline_string(xml, reference, s),
        CellValue::Number(n) => xml.push_str(&format!(r#"<c r="{reference}"><v>{n}</v></c>"#)),
        CellValue::Bool(b) => {
            let flag = if *b { 1 } else { 0 };
            xml.push_str(&format!(r#"<c r="{reference}" t="b"><v>{flag}</v></c>"#));
        }
        CellValue::Date(d) => match datetime_to_excel_serial(d) {
            Some(serial) => {
                let style = if d.time() == chrono::NaiveTime::MIN {
                    STYLE_DATE
                } else {
                    STYLE_DATETIME
                };
                xml.push_str(&format!(
                    r#"<c r="{reference}" s="{style}"><v>{serial}</v></c>"#
                ));
            }
            None => push_inline_string(xml, reference, &cell.to_string()),
        },
    }
}

fn push_inline_string(xml: &mut String, reference: &str, value: &str) {
    xml.push_str(&format!(
        r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        escape_text(value)
    ));
}

/// XML-escape cell text. A literal carriage return would be folded into the following
/// line feed by XML end-of-line handling, so it is written as a character reference.
fn escape_text(value: &str) -> String {
    escape(value).replace('\r', "&#13;")
}

/// A1-style reference for a 0-based column and 1-based row
fn cell_reference(column: usize, row: usize) -> String {
    let mut letters = Vec::new();
    let mut remaining = column + 1;
    while remaining > 0 {
        let offset = (remaining - 1) % 26;
        letters.push(b'A' + offset as u8);
        remaining = (remaining - 1) / 26;
    }
    letters.reverse();
    format!("{}{row}", String::from_utf8_lossy(&letters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 1), "A1");
        assert_eq!(cell_reference(25, 3), "Z3");
        assert_eq!(cell_reference(26, 3), "AA3");
        assert_eq!(cell_reference(701, 10), "ZZ10");
        assert_eq!(cell_reference(702, 10), "AAA10");
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(
            ExportFormat::from_file_name("final_metadata.xlsx"),
            Some(ExportFormat::Workbook)
        );
        assert_eq!(
            ExportFormat::from_file_name("final_metadata.CSV"),
            Some(ExportFormat::csv())
        );
        assert_eq!(ExportFormat::from_file_name("final_metadata.json"), None);
    }

    #[test]
    fn test_csv_export_keeps_column_order_and_formats_values() {
        let table = table(
            &["Zeta", "Alpha", "Collected", "Active"],
            vec![
                vec![num(101.0), text("Sample, A"), date(2025, 2, 26), CellValue::Bool(true)],
                vec![num(2.5), CellValue::Null, CellValue::Null, CellValue::Bool(false)],
            ],
        );

        let bytes = export(&table, ExportFormat::csv()).unwrap();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Zeta,Alpha,Collected,Active\n101,\"Sample, A\",2025-02-26,true\n2.5,,,false\n"
        );
    }

    #[test]
    fn test_tsv_export() {
        let table = table(&["A", "B"], vec![vec![text("x"), text("y")]]);
        let bytes = export(&table, ExportFormat::tsv()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "A\tB\nx\ty\n");
    }

    #[test]
    fn test_worksheet_escapes_text() {
        let table = table(&["Note"], vec![vec![text("<b> & \"q\"")]]);
        let xml = worksheet_xml(&table);
        assert!(xml.contains("&lt;b&gt; &amp; &quot;q&quot;"));
    }

    #[test]
    fn test_worksheet_escapes_carriage_returns() {
        let table = table(&["Note"], vec![vec![text("line1\r\nline2\r")]]);
        let xml = worksheet_xml(&table);
        assert!(xml.contains("line1&#13;\nline2&#13;</t>"));
        assert!(!xml.contains('\r'));
    }

    #[test]
    fn test_worksheet_keeps_all_null_rows() {
        let table = table(&["A", "B"], vec![vec![CellValue::Null, CellValue::Null]]);
        let xml = worksheet_xml(&table);
        assert!(xml.contains(r#"<row r="2"><c r="A2" t="inlineStr">"#));
    }

    #[test]
    fn test_workbook_export_is_a_zip_package() {
        let table = table(&["ID"], vec![vec![num(1.0)]]);
        let bytes = export(&table, ExportFormat::Workbook).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
    }

    #[test]
    fn test_artifact_file_name_and_mime_type() {
        let table = table(&["ID"], vec![vec![num(1.0)]]);

        let artifact = export_artifact(&table, ExportFormat::Workbook, "upload_file").unwrap();
        assert_eq!(artifact.file_name, "upload_file.xlsx");
        assert_eq!(artifact.mime_type, WORKBOOK_MIME_TYPE);

        let artifact = export_artifact(&table, ExportFormat::csv(), "upload_file").unwrap();
        assert_eq!(artifact.file_name, "upload_file.csv");
        assert_eq!(artifact.mime_type, CSV_MIME_TYPE);
    }

    #[test]
    fn test_export_empty_table() {
        assert!(export(&Table::empty(), ExportFormat::csv()).unwrap().is_empty());
        assert!(export(&Table::empty(), ExportFormat::Workbook).is_ok());
    }
}
