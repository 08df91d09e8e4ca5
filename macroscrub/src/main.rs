use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use macroscrub_core::carve;
use macroscrub_core::config::ScrubConfig;
use macroscrub_core::pipeline::{Pipeline, RunOptions};
use std::path::{Path, PathBuf};

mod formatter;

#[derive(Parser)]
#[command(name = "macroscrub")]
#[command(about = "Cleaner and deobfuscator for wrapper-protected macro-enabled workbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Workbook container (.xlsm/.zip), executable wrapper (.exe) or an
    /// already unpacked directory
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output path for the rebuilt container (default: <input>_clean.xlsm)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export macro modules into this directory
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Export components only; skip rebuilding the container
    #[arg(long)]
    manual: bool,

    /// Where to write the plain-text report (default: next to the output)
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        ScrubConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        let default_config_path = PathBuf::from("macroscrub.toml");
        if default_config_path.exists() {
            ScrubConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            ScrubConfig::default()
        }
    };

    // An executable wrapper needs a carving pass first; the scratch
    // directory must outlive the pipeline run.
    let scratch = tempfile::tempdir().context("Failed to allocate a scratch directory")?;
    let input = resolve_input(&cli.file, scratch.path())?;

    // Defaults derive from the path the user gave, not the carved copy,
    // so nothing ends up inside the scratch directory.
    let output = if cli.manual {
        None
    } else {
        Some(
            cli.output
                .clone()
                .unwrap_or_else(|| sibling_path(&cli.file, "_clean.xlsm")),
        )
    };
    let export_dir = if cli.manual && cli.export_dir.is_none() {
        Some(sibling_path(&cli.file, "_macros"))
    } else {
        cli.export_dir.clone()
    };
    let report_path = cli.report.clone().unwrap_or_else(|| {
        sibling_path(output.as_deref().unwrap_or(&cli.file), "_report.txt")
    });

    let options = RunOptions {
        output,
        export_dir,
        report_path: Some(report_path),
    };

    let report = Pipeline::with_config(config)
        .run(&input, &options)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    match cli.format {
        OutputFormat::Human => formatter::print_human(&input, &report),
        OutputFormat::Json => formatter::print_json(&report)?,
    }

    Ok(())
}

/// Validate the input surface and carve executables down to a container.
fn resolve_input(file: &Path, scratch: &Path) -> Result<PathBuf> {
    if file.is_dir() {
        return Ok(file.to_path_buf());
    }
    if !file.exists() {
        anyhow::bail!("Input file not found: {}", file.display());
    }

    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsm" | "zip" => Ok(file.to_path_buf()),
        "exe" => {
            let located = carve::locate_embedded_container(file, scratch);
            located.container_path.with_context(|| {
                format!("No embedded workbook found inside {}", file.display())
            })
        }
        _ => anyhow::bail!(
            "Unsupported input: {} (expected .xlsm, .zip, .exe or a directory)",
            file.display()
        ),
    }
}

/// `book.xlsm` + `_clean.xlsm` -> `book_clean.xlsm`, next to the input.
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}{suffix}"))
}
