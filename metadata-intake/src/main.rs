// reset; cargo run -- validate ./data/Sample_Collection_North_Adriatic_26Feb2025.xlsx --sheet-name Sample --expect "Sample ID"
// reset; cargo run -- align --left ./data/materials.xlsx --right ./data/stations.csv --key ID --output aligned.xlsx

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use intake_lib::Session;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metadata-intake")]
#[command(about = "A tool to validate, consolidate and align tabular metadata uploads")]
#[command(version)]
struct Args {
    /// JSON config file. Flags given on the command line take precedence over it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Optional sheet name to read from workbooks (if not specified, reads the first sheet)
    #[arg(long, global = true)]
    sheet_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an empty workbook listing the columns an upload must carry
    Template {
        /// Column to include (repeatable); defaults to the config's expected_columns
        #[arg(long = "expect")]
        expect: Vec<String>,

        #[arg(short, long, default_value = "upload_file.xlsx")]
        output: PathBuf,
    },

    /// Check uploads for parse, structural and missing column errors
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Column every file must contain (repeatable)
        #[arg(long = "expect")]
        expect: Vec<String>,
    },

    /// Print missing values and duplicate rows per file
    Report {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Stack uploads of one source into a single table
    Consolidate {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file; .xlsx, .csv, .tsv or .txt
        #[arg(short, long)]
        output: PathBuf,

        /// Export even when the quality report is not clean
        #[arg(long)]
        force: bool,
    },

    /// Full outer join of two sources on key columns
    Align {
        #[arg(long, num_args = 1.., required = true)]
        left: Vec<PathBuf>,

        #[arg(long, num_args = 1.., required = true)]
        right: Vec<PathBuf>,

        /// Key column (repeatable); defaults to the config's key_columns
        #[arg(long = "key")]
        keys: Vec<String>,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let arguments = Args::parse();

    let config = commands::load_config(arguments.config.as_deref(), arguments.sheet_name.as_deref())?;
    let mut session = Session::new(config);

    let succeeded = match &arguments.command {
        Command::Template { expect, output } => commands::template(&session, expect, output),
        Command::Validate { files, expect } => commands::validate(&mut session, files, expect),
        Command::Report { files, json } => {
            commands::report_files(&mut session, files, *json, &mut std::io::stdout())
        }
        Command::Consolidate {
            files,
            output,
            force,
        } => commands::consolidate(&mut session, files, output, *force),
        Command::Align {
            left,
            right,
            keys,
            output,
            force,
        } => commands::align(&mut session, left, right, keys, output, *force),
    };

    match succeeded {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Failed with error: {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "metadata-intake",
            "validate",
            "a.xlsx",
            "--sheet-name",
            "Sample",
            "--expect",
            "Sample ID",
        ])
        .unwrap();

        assert_eq!(args.sheet_name.as_deref(), Some("Sample"));
        match args.command {
            Command::Validate { files, expect } => {
                assert_eq!(files, vec![PathBuf::from("a.xlsx")]);
                assert_eq!(expect, vec!["Sample ID".to_string()]);
            }
            _ => panic!("expected the validate command"),
        }
    }

    #[test]
    fn test_template_defaults_output_name() {
        let args = Args::try_parse_from([
            "metadata-intake",
            "template",
            "--expect",
            "MaterialID",
        ])
        .unwrap();

        match args.command {
            Command::Template { expect, output } => {
                assert_eq!(expect, vec!["MaterialID".to_string()]);
                assert_eq!(output, PathBuf::from("upload_file.xlsx"));
            }
            _ => panic!("expected the template command"),
        }
    }

    #[test]
    fn test_align_requires_both_sides() {
        let result = Args::try_parse_from([
            "metadata-intake",
            "align",
            "--left",
            "a.csv",
            "--output",
            "out.csv",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_align_accepts_several_keys() {
        let args = Args::try_parse_from([
            "metadata-intake",
            "align",
            "--left",
            "a.csv",
            "b.csv",
            "--right",
            "c.csv",
            "--key",
            "ID",
            "--key",
            "Cruise",
            "-o",
            "out.xlsx",
        ])
        .unwrap();

        match args.command {
            Command::Align { left, keys, .. } => {
                assert_eq!(left.len(), 2);
                assert_eq!(keys, vec!["ID".to_string(), "Cruise".to_string()]);
            }
            _ => panic!("expected the align command"),
        }
    }
}
