use anyhow::{anyhow, Context, Result};
use intake_lib::{
    ErrorKind, ExportArtifact, ExportFormat, IntakeConfig, QualityReport, RawFile, Session, Table,
    ERRORS_LOG_FILE, TEMPLATE_FILE_STEM,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const UPLOADS_SOURCE: &str = "uploads";
const LEFT_SOURCE: &str = "left";
const RIGHT_SOURCE: &str = "right";

#[derive(Serialize)]
struct FileReport<'a> {
    file: &'a str,
    #[serde(flatten)]
    report: QualityReport,
}

/// Config file (if any) with command-line overrides applied on top
pub fn load_config(path: Option<&Path>, sheet_name: Option<&str>) -> Result<IntakeConfig> {
    let mut config = match path {
        Some(path) => IntakeConfig::load(path)?,
        None => IntakeConfig::default(),
    };
    if let Some(sheet_name) = sheet_name {
        config.sheet_name = Some(sheet_name.to_string());
    }
    if config.error_log.is_none() {
        config.error_log = Some(PathBuf::from(ERRORS_LOG_FILE));
    }
    Ok(config)
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<RawFile>> {
    paths
        .iter()
        .map(|path| {
            RawFile::from_path(path)
                .with_context(|| format!("Unable to read file {}", path.display()))
        })
        .collect()
}

fn error_log_name(session: &Session) -> String {
    session
        .config()
        .error_log
        .as_deref()
        .unwrap_or(Path::new(ERRORS_LOG_FILE))
        .display()
        .to_string()
}

/// Upload every file into `source`, printing one line per file. Returns false when any file failed.
fn upload_files(
    session: &mut Session,
    source: &str,
    paths: &[PathBuf],
    expected_columns: Option<&[String]>,
) -> Result<bool> {
    let files = read_files(paths)?;
    let outcomes = session.upload_many(source, &files, expected_columns);

    let mut all_ok = true;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(table) => println!(
                "✅ {}: {} row(s), {} column(s)",
                outcome.file_name,
                table.row_count(),
                table.column_count()
            ),
            Err(errors) => {
                all_ok = false;
                println!("❌ {}", outcome.file_name);
                for error in &errors.errors {
                    println!("   - {error}");
                }
            }
        }
    }

    if !all_ok {
        eprintln!("❌ Check {} for details.", error_log_name(session));
    }
    Ok(all_ok)
}

pub fn validate(session: &mut Session, files: &[PathBuf], expect: &[String]) -> Result<bool> {
    let expected = (!expect.is_empty()).then_some(expect);
    upload_files(session, UPLOADS_SOURCE, files, expected)
}

/// Quality report for every stored upload, written to `out`. Files that fail validation
/// are listed by the upload step and do not hold back the reports of the others.
pub fn report_files(
    session: &mut Session,
    files: &[PathBuf],
    json: bool,
    out: &mut impl Write,
) -> Result<bool> {
    let all_ok = upload_files(session, UPLOADS_SOURCE, files, None)?;

    let names: Vec<String> = match session.table_names(UPLOADS_SOURCE) {
        Ok(names) => names.into_iter().map(str::to_string).collect(),
        // Nothing was accepted, so the source was never created
        Err(_) => Vec::new(),
    };

    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        reports.push(FileReport {
            file: name,
            report: session.run_quality_report(UPLOADS_SOURCE, name)?,
        });
    }

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
        return Ok(all_ok);
    }

    for file_report in &reports {
        let issues = file_report.report.issues();
        if issues.is_empty() {
            writeln!(
                out,
                "✅ {}: {} row(s), no missing values or duplicates",
                file_report.file, file_report.report.row_count
            )?;
        } else {
            writeln!(
                out,
                "⚠️ {}: {} row(s)",
                file_report.file, file_report.report.row_count
            )?;
            for issue in issues {
                writeln!(out, "   - {issue}")?;
            }
        }
    }
    Ok(all_ok)
}

pub fn consolidate(
    session: &mut Session,
    files: &[PathBuf],
    output: &Path,
    force: bool,
) -> Result<bool> {
    if !upload_files(session, UPLOADS_SOURCE, files, None)? {
        return Ok(false);
    }

    let table = session.consolidate(UPLOADS_SOURCE)?;
    session.store_result("consolidated", table.clone());
    println!(
        "✅ Consolidated {} file(s): {} row(s), {} column(s)",
        files.len(),
        table.row_count(),
        table.column_count()
    );

    write_output(session, &table, output, force)
}

pub fn align(
    session: &mut Session,
    left: &[PathBuf],
    right: &[PathBuf],
    keys: &[String],
    output: &Path,
    force: bool,
) -> Result<bool> {
    let left_ok = upload_files(session, LEFT_SOURCE, left, None)?;
    let right_ok = upload_files(session, RIGHT_SOURCE, right, None)?;
    if !(left_ok && right_ok) {
        return Ok(false);
    }

    let keys: Vec<String> = if keys.is_empty() {
        session.config().key_columns.clone()
    } else {
        keys.to_vec()
    };

    let table = session.align(LEFT_SOURCE, RIGHT_SOURCE, &keys)?;
    session.store_result("aligned", table.clone());
    println!(
        "✅ Aligned on {}: {} row(s), {} column(s)",
        keys.join(", "),
        table.row_count(),
        table.column_count()
    );

    write_output(session, &table, output, force)
}

/// Write the header-only upload template. Without `--expect` the config's expected columns are used.
pub fn template(session: &Session, expect: &[String], output: &Path) -> Result<bool> {
    let columns: Vec<String> = if expect.is_empty() {
        session.expected_columns(UPLOADS_SOURCE)
    } else {
        expect.to_vec()
    };

    let artifact = session.template(&columns)?;
    std::fs::write(output, &artifact.bytes)
        .with_context(|| format!("Unable to write {}", output.display()))?;
    println!(
        "✅ Upload template with {} column(s) created: {}",
        columns.len(),
        output.display()
    );
    Ok(true)
}

/// Export format for an output path; `.txt` uses the configured delimiter
fn output_format(config: &IntakeConfig, output: &Path) -> Result<ExportFormat> {
    let name = output.to_string_lossy();
    if let Some(format) = ExportFormat::from_file_name(&name) {
        return Ok(format);
    }
    match output.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => Ok(ExportFormat::DelimitedText {
            delimiter: config.delimiter_byte(),
        }),
        _ => Err(anyhow!(
            "Unsupported output file {}, use .xlsx, .csv, .tsv or .txt",
            output.display()
        )),
    }
}

fn write_output(session: &Session, table: &Table, output: &Path, force: bool) -> Result<bool> {
    let format = output_format(session.config(), output)?;
    let file_stem = output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("export");

    let exported = if force {
        session.force_export(table, format, file_stem)
    } else {
        session.export(table, format, file_stem)
    };

    let artifact: ExportArtifact = match exported {
        Ok(artifact) => artifact,
        Err(e) if e.kind() == ErrorKind::QualityGate => {
            eprintln!("❌ {e}");
            eprintln!("❌ Use --force to export anyway.");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::write(output, &artifact.bytes)
        .with_context(|| format!("Unable to write {}", output.display()))?;
    info!(path = %output.display(), mime_type = artifact.mime_type, "output written");
    println!("✅ File created: {}", output.display());
    Ok(true)
}
