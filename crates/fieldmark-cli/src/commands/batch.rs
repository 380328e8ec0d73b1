//! Batch processing command for multiple document layouts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use fieldmark_core::{
    ExtractionMode, ExtractionOutput, JsonLayoutProvider, Strategy, Template, TemplateExtractionEngine,
    TextLayoutProvider,
};

use super::process::{OutputFormat, format_output};
use super::{build_engine, load_config, load_template};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Layout files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Template JSON file applied to every layout
    #[arg(short, long)]
    template: PathBuf,

    /// Extraction mode: off, matching or matching-llm
    #[arg(short, long, default_value = "matching")]
    mode: ExtractionMode,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single layout.
struct ProcessResult {
    path: PathBuf,
    document_id: Option<String>,
    output: Option<ExtractionOutput>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching layout files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} layouts to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let template = Arc::new(load_template(&args.template)?);
    let mode = args.mode;
    let engine = Arc::new(tokio::task::spawn_blocking(move || build_engine(&config, mode)).await??);

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let semaphore = Arc::new(Semaphore::new(args.jobs.max(1)));
    let mut handles = Vec::with_capacity(files.len());

    for path in files {
        let permit = semaphore.clone().acquire_owned().await?;
        let engine = engine.clone();
        let template = template.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let file_start = Instant::now();
            let result = process_single_file(&path, &engine, &template, mode);
            drop(permit);

            let processing_time_ms = file_start.elapsed().as_millis() as u64;
            match result {
                Ok((document_id, output)) => ProcessResult {
                    path,
                    document_id: Some(document_id),
                    output: Some(output),
                    error: None,
                    processing_time_ms,
                },
                Err(e) => ProcessResult {
                    path,
                    document_id: None,
                    output: None,
                    error: Some(e.to_string()),
                    processing_time_ms,
                },
            }
        }));
    }

    // Awaiting in submission order keeps results in input order.
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.await?;
        if let Some(error_msg) = &result.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), error_msg);
            } else {
                error!("Failed to process {}: {}", result.path.display(), error_msg);
                release_engine(engine).await?;
                anyhow::bail!("Processing failed: {}", error_msg);
            }
        }
        overall_pb.inc(1);
        results.push(result);
    }

    overall_pb.finish_with_message("Complete");
    release_engine(engine).await?;

    let successful: Vec<_> = results.iter().filter(|r| r.output.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &successful {
            if let Some(output) = &result.output {
                let output_name = result.path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document");

                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));
                fs::write(&output_path, format_output(output, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args.output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} layouts in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn process_single_file(
    path: &Path,
    engine: &TemplateExtractionEngine,
    template: &Template,
    mode: ExtractionMode,
) -> anyhow::Result<(String, ExtractionOutput)> {
    let document = JsonLayoutProvider::new().load(path)?;
    let output = engine.run(template, &document, mode);
    Ok((document.id, output))
}

/// Drop the last engine handle on the blocking pool: it may own a blocking
/// HTTP client.
async fn release_engine(engine: Arc<TemplateExtractionEngine>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || drop(engine)).await?;
    Ok(())
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "document_id",
        "results",
        "matched",
        "notes",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result.path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(output) = &result.output {
            let matched = output
                .results
                .iter()
                .filter(|r| r.strategy != Strategy::TemplateCoordinates)
                .count();
            wtr.write_record([
                filename.to_string(),
                "success".to_string(),
                result.document_id.clone().unwrap_or_default(),
                output.results.len().to_string(),
                matched.to_string(),
                output.notes().count().to_string(),
                result.processing_time_ms.to_string(),
                String::new(),
            ])?;
        } else {
            wtr.write_record([
                filename.to_string(),
                "error".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                result.processing_time_ms.to_string(),
                result.error.clone().unwrap_or_default(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
