use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffixes appended to non-key columns that exist on both sides of an alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSuffixes {
    pub left: String,
    pub right: String,
}

impl Default for MergeSuffixes {
    fn default() -> Self {
        MergeSuffixes {
            left: "_x".to_string(),
            right: "_y".to_string(),
        }
    }
}

/// Settings shared by every stage of a session. Every field has a default, so a JSON
/// config file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Worksheet read from workbook uploads; the first sheet when unset
    pub sheet_name: Option<String>,

    /// Delimiter for `.txt` uploads and delimited-text exports (`.csv` is always `,`, `.tsv` always tab)
    pub delimiter: char,

    /// Cell contents treated as missing in addition to blank cells (e.g. "N/A")
    pub null_markers: Vec<String>,

    pub skip_blank_rows: bool,

    /// Columns every upload must carry unless its source overrides them
    pub expected_columns: Vec<String>,

    /// Default join key for alignment
    pub key_columns: Vec<String>,

    pub merge_suffixes: MergeSuffixes,

    /// Refuse to export tables whose quality report is not clean
    pub block_export_on_quality_issues: bool,

    /// Append rejected uploads and blocked exports to this file
    pub error_log: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        IntakeConfig {
            sheet_name: None,
            delimiter: ',',
            null_markers: Vec::new(),
            skip_blank_rows: false,
            expected_columns: Vec::new(),
            key_columns: Vec::new(),
            merge_suffixes: MergeSuffixes::default(),
            block_export_on_quality_issues: true,
            error_log: None,
        }
    }
}

impl IntakeConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: IntakeConfig = serde_json::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(anyhow::anyhow!(
                "The delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            ));
        }
        if self.merge_suffixes.left == self.merge_suffixes.right {
            return Err(anyhow::anyhow!(
                "Merge suffixes must differ, both are '{}'",
                self.merge_suffixes.left
            ));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }
}
