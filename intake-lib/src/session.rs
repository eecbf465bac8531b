use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::IntakeConfig;
use crate::consolidator::{align_sources, consolidate_source};
use crate::error::{IntakeError, ValidationErrors};
use crate::export::{ExportArtifact, ExportFormat, export_artifact};
use crate::intake_validator::{IntakeValidatorBuilder, RawFile, ValidationResult};
use crate::quality_report::{QualityReport, report};
use crate::table::{Column, Table};
use crate::utils::{normalize_header, write_error_to_log};

/// File name (without extension) of generated upload templates
pub const TEMPLATE_FILE_STEM: &str = "upload_file";

/// A named group of uploaded tables, e.g. the files of one metadata module
#[derive(Debug, Default)]
struct Source {
    tables: BTreeMap<String, Table>,
    /// Required columns for this source's uploads, replacing the config's list
    expected_columns: Option<Vec<String>>,
    /// Bumped on every change to `tables`
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AlignKey {
    left: String,
    right: String,
    key_columns: Vec<String>,
}

struct CachedAlignment {
    left_generation: u64,
    right_generation: u64,
    table: Arc<Table>,
}

/// Outcome of one file in a batch upload
#[derive(Debug)]
pub struct UploadOutcome {
    pub file_name: String,
    pub result: ValidationResult,
}

impl UploadOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// All state of one intake workflow. Nothing is global: callers own the session and pass it around.
pub struct Session {
    config: IntakeConfig,
    sources: BTreeMap<String, Source>,
    results: BTreeMap<String, Arc<Table>>,
    consolidated: HashMap<String, (u64, Arc<Table>)>,
    aligned: HashMap<AlignKey, CachedAlignment>,
    next_generation: u64,
}

impl Session {
    //////////////////////////////////////////////////////////////
    ///  Public API
    //////////////////////////////////////////////////////////////

    pub fn new(config: IntakeConfig) -> Self {
        Session {
            config,
            sources: BTreeMap::new(),
            results: BTreeMap::new(),
            consolidated: HashMap::new(),
            aligned: HashMap::new(),
            next_generation: 1,
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Register an empty source. Returns false when it already exists.
    pub fn add_source(&mut self, name: &str) -> bool {
        if self.sources.contains_key(name) {
            return false;
        }
        self.sources.insert(name.to_string(), Source::default());
        true
    }

    pub fn list_sources(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// File names stored in a source, sorted
    pub fn table_names(&self, source: &str) -> Result<Vec<&str>, IntakeError> {
        Ok(self.source(source)?.tables.keys().map(String::as_str).collect())
    }

    pub fn get_table(&self, source: &str, name: &str) -> Result<&Table, IntakeError> {
        self.source(source)?
            .tables
            .get(name)
            .ok_or_else(|| IntakeError::UnknownTable {
                source_name: source.to_string(),
                name: name.to_string(),
            })
    }

    /// Required columns for future uploads to `source`. `None` falls back to the config.
    pub fn set_expected_columns(&mut self, source: &str, columns: Option<Vec<String>>) {
        self.sources
            .entry(source.to_string())
            .or_default()
            .expected_columns = columns;
    }

    /// Columns uploads to `source` must carry: the source's own list, else the config's
    pub fn expected_columns(&self, source: &str) -> Vec<String> {
        self.sources
            .get(source)
            .and_then(|s| s.expected_columns.clone())
            .unwrap_or_else(|| self.config.expected_columns.clone())
    }

    /// Header-only workbook (`upload_file.xlsx`, sheet `Sheet1`) listing `columns`, handed
    /// out to be filled in and uploaded again. Headers are normalized the way uploads are.
    pub fn template<S: AsRef<str>>(&self, columns: &[S]) -> Result<ExportArtifact, IntakeError> {
        let columns: Vec<Column> = columns
            .iter()
            .map(|name| normalize_header(name.as_ref()))
            .filter(|name| !name.is_empty())
            .map(|name| Column::new(name, Vec::new()))
            .collect();
        if columns.is_empty() {
            return Err(IntakeError::Export {
                message: "an upload template needs at least one column".to_string(),
            });
        }

        let table = Table::from_columns(columns)?;
        let artifact = export_artifact(&table, ExportFormat::Workbook, TEMPLATE_FILE_STEM)?;
        info!(columns = table.column_count(), "upload template generated");
        Ok(artifact)
    }

    /// Validate one file and store it in `source`, replacing a file with the same name.
    ///
    /// `expected_columns` overrides both the source's and the config's required columns.
    /// A rejected file leaves the source untouched.
    pub fn upload_to_source(
        &mut self,
        source: &str,
        raw_file: &RawFile,
        expected_columns: Option<&[String]>,
    ) -> ValidationResult {
        let expected: Vec<String> = match expected_columns {
            Some(columns) => columns.to_vec(),
            None => self.expected_columns(source),
        };

        let validator = IntakeValidatorBuilder::from_config(&self.config)
            .expected_columns(&expected)
            .build();

        match validator.validate(raw_file) {
            Ok(table) => {
                info!(
                    source,
                    file = %raw_file.name,
                    rows = table.row_count(),
                    columns = table.column_count(),
                    "upload accepted"
                );
                let generation = self.bump_generation();
                let entry = self.sources.entry(source.to_string()).or_default();
                entry.tables.insert(raw_file.name.clone(), table.clone());
                entry.generation = generation;
                Ok(table)
            }
            Err(errors) => {
                warn!(source, file = %raw_file.name, errors = errors.errors.len(), "upload rejected");
                self.log_rejected_upload(&errors);
                Err(errors)
            }
        }
    }

    /// Upload several files; a rejected file does not stop the others
    pub fn upload_many(
        &mut self,
        source: &str,
        files: &[RawFile],
        expected_columns: Option<&[String]>,
    ) -> Vec<UploadOutcome> {
        files
            .iter()
            .map(|file| UploadOutcome {
                file_name: file.name.clone(),
                result: self.upload_to_source(source, file, expected_columns),
            })
            .collect()
    }

    /// Drop a stored file, e.g. before uploading a corrected version under another name
    pub fn remove_from_source(&mut self, source: &str, name: &str) -> Result<Table, IntakeError> {
        let generation = self.next_generation;
        let entry = self
            .sources
            .get_mut(source)
            .ok_or_else(|| IntakeError::UnknownSource(source.to_string()))?;
        let table = entry
            .tables
            .remove(name)
            .ok_or_else(|| IntakeError::UnknownTable {
                source_name: source.to_string(),
                name: name.to_string(),
            })?;
        entry.generation = generation;
        self.next_generation += 1;
        info!(source, file = name, "upload removed");
        Ok(table)
    }

    /// First `rows` rows of a stored file
    pub fn preview(&self, source: &str, name: &str, rows: usize) -> Result<Table, IntakeError> {
        Ok(self.get_table(source, name)?.head(rows))
    }

    pub fn run_quality_report(&self, source: &str, name: &str) -> Result<QualityReport, IntakeError> {
        Ok(report(self.get_table(source, name)?))
    }

    /// Union of every file in `source`, in file name order. Cached until the source changes.
    pub fn consolidate(&mut self, source: &str) -> Result<Arc<Table>, IntakeError> {
        let current = self.source(source)?;
        let generation = current.generation;

        if let Some((cached_generation, table)) = self.consolidated.get(source) {
            if *cached_generation == generation {
                debug!(source, "consolidation served from cache");
                return Ok(Arc::clone(table));
            }
        }

        let table = Arc::new(consolidate_source(current.tables.values())?);
        info!(
            source,
            files = current.tables.len(),
            rows = table.row_count(),
            columns = table.column_count(),
            "source consolidated"
        );
        self.consolidated
            .insert(source.to_string(), (generation, Arc::clone(&table)));
        Ok(table)
    }

    /// Consolidate both sources and join them on `key_columns` (full outer join).
    /// Cached until either source changes.
    pub fn align<S: AsRef<str>>(
        &mut self,
        left: &str,
        right: &str,
        key_columns: &[S],
    ) -> Result<Arc<Table>, IntakeError> {
        let left_table = self.consolidate(left)?;
        let right_table = self.consolidate(right)?;
        let left_generation = self.source(left)?.generation;
        let right_generation = self.source(right)?.generation;

        let key = AlignKey {
            left: left.to_string(),
            right: right.to_string(),
            key_columns: key_columns.iter().map(|k| k.as_ref().to_string()).collect(),
        };
        if let Some(cached) = self.aligned.get(&key) {
            if cached.left_generation == left_generation
                && cached.right_generation == right_generation
            {
                debug!(left, right, "alignment served from cache");
                return Ok(Arc::clone(&cached.table));
            }
        }

        let table = Arc::new(align_sources(
            &left_table,
            &right_table,
            key_columns,
            &self.config.merge_suffixes,
        )?);
        info!(
            left,
            right,
            keys = ?key.key_columns,
            rows = table.row_count(),
            "sources aligned"
        );
        self.aligned.insert(
            key,
            CachedAlignment {
                left_generation,
                right_generation,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Join one stored file from each side, without consolidating the rest of either source
    pub fn align_files<S: AsRef<str>>(
        &self,
        left: (&str, &str),
        right: (&str, &str),
        key_columns: &[S],
    ) -> Result<Table, IntakeError> {
        let left_table = self.get_table(left.0, left.1)?;
        let right_table = self.get_table(right.0, right.1)?;
        align_sources(
            left_table,
            right_table,
            key_columns,
            &self.config.merge_suffixes,
        )
    }

    /// Keep a derived table under a user-chosen label, replacing any previous one
    pub fn store_result(&mut self, label: &str, table: Arc<Table>) {
        self.results.insert(label.to_string(), table);
    }

    pub fn result(&self, label: &str) -> Option<Arc<Table>> {
        self.results.get(label).cloned()
    }

    pub fn result_labels(&self) -> Vec<&str> {
        self.results.keys().map(String::as_str).collect()
    }

    /// Export a table, refusing when the config blocks exports with quality issues
    pub fn export(
        &self,
        table: &Table,
        format: ExportFormat,
        file_stem: &str,
    ) -> Result<ExportArtifact, IntakeError> {
        if self.config.block_export_on_quality_issues {
            let issues = report(table).issues();
            if !issues.is_empty() {
                warn!(file_stem, issues = issues.len(), "export blocked");
                let error = IntakeError::QualityGate { issues };
                self.log_error("Export Blocked", &error.to_string());
                return Err(error);
            }
        }
        self.force_export(table, format, file_stem)
    }

    /// Export without the quality gate
    pub fn force_export(
        &self,
        table: &Table,
        format: ExportFormat,
        file_stem: &str,
    ) -> Result<ExportArtifact, IntakeError> {
        let artifact = export_artifact(table, format, file_stem)?;
        info!(file = %artifact.file_name, bytes = artifact.bytes.len(), "table exported");
        Ok(artifact)
    }

    //////////////////////////////////////////////////////////////
    ///  Private methods
    //////////////////////////////////////////////////////////////

    fn source(&self, name: &str) -> Result<&Source, IntakeError> {
        self.sources
            .get(name)
            .ok_or_else(|| IntakeError::UnknownSource(name.to_string()))
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn log_rejected_upload(&self, errors: &ValidationErrors) {
        self.log_error("Upload Validation Error", &errors.to_report());
    }

    fn log_error(&self, error_type: &str, message: &str) {
        if let Some(log_file) = &self.config.error_log {
            write_error_to_log(log_file, error_type, message);
        }
    }
}
