//! Process command - apply a template to a single document layout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use fieldmark_core::{
    AnnotationRecord, ApplyPolicy, ExtractionMode, ExtractionOutput, JsonLayoutProvider, TextLayoutProvider,
    materialize,
};

use super::{build_engine, load_config, load_template};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Template JSON file
    #[arg(short, long)]
    template: PathBuf,

    /// Layout JSON file (pages of text fragments with bounding boxes)
    #[arg(short, long)]
    layout: PathBuf,

    /// Extraction mode: off, matching or matching-llm
    #[arg(short, long, default_value = "matching")]
    mode: ExtractionMode,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Annotation file to add the results to
    #[arg(short, long)]
    annotations: Option<PathBuf>,

    /// How results are added to an annotation file
    #[arg(long, value_enum, default_value = "append")]
    policy: PolicyArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Results and match details as JSON
    Json,
    /// One CSV row per result
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum PolicyArg {
    /// Add every result
    Append,
    /// Skip fields the document already has an annotation for
    SkipExisting,
}

impl From<PolicyArg> for ApplyPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Append => ApplyPolicy::Append,
            PolicyArg::SkipExisting => ApplyPolicy::SkipExistingFields,
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.layout.exists() {
        anyhow::bail!("Layout file not found: {}", args.layout.display());
    }

    info!("Processing layout: {}", args.layout.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
            .progress_chars("##-"),
    );

    pb.set_message("Loading template...");
    pb.set_position(10);
    let template = load_template(&args.template)?;

    pb.set_message("Reading layout...");
    pb.set_position(30);
    let document = JsonLayoutProvider::new()
        .load(&args.layout)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.layout.display(), e))?;
    debug!("{} pages, {} fragments", document.page_count(), document.fragment_count());

    pb.set_message(format!("Extracting fields ({})...", args.mode));
    pb.set_position(50);

    // The LLM transport uses a blocking HTTP client, which must live off the
    // async executor from construction to drop.
    let mode = args.mode;
    let (output, annotations) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let engine = build_engine(&config, mode)?;
        let output = engine.run(&template, &document, mode);
        let annotations = engine.annotations(&document.id, &output);
        Ok((output, annotations))
    })
    .await??;

    pb.set_position(90);

    if let Some(path) = &args.annotations {
        pb.set_message("Writing annotations...");
        let (added, skipped) = apply_annotations(path, annotations, args.policy.into())?;
        pb.finish_with_message("Done");
        eprintln!(
            "{} {} annotation(s) added to {} ({} skipped)",
            style("✓").green(),
            added,
            path.display(),
            skipped
        );
    } else {
        pb.finish_with_message("Done");
    }

    let rendered = format_output(&output, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &rendered)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", rendered);
    }

    for note in output.notes() {
        eprintln!("{} {}: {}", style("!").yellow(), note.field_name, note.note);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Merge new records into the annotation file at `path`.
///
/// Returns how many records were added and how many the policy skipped.
pub fn apply_annotations(
    path: &Path,
    incoming: Vec<AnnotationRecord>,
    policy: ApplyPolicy,
) -> anyhow::Result<(usize, usize)> {
    let mut existing: Vec<AnnotationRecord> = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid annotation file {}: {}", path.display(), e))?
    } else {
        Vec::new()
    };

    let total = incoming.len();
    let added = materialize(&existing, incoming, policy);
    let counts = (added.len(), total - added.len());

    existing.extend(added);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&existing)?)?;

    Ok(counts)
}

pub fn format_output(output: &ExtractionOutput, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(output)?),
        OutputFormat::Csv => format_csv(output),
        OutputFormat::Text => Ok(format_text(output)),
    }
}

fn format_csv(output: &ExtractionOutput) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "field_name",
        "field_type",
        "value",
        "page_number",
        "x",
        "y",
        "width",
        "height",
        "confidence",
        "strategy",
    ])?;

    for result in &output.results {
        let c = &result.coordinates;
        wtr.write_record([
            result.field_name.clone(),
            result.field_type.as_str().to_string(),
            result.value.clone().unwrap_or_default(),
            result.page_number.to_string(),
            format!("{:.2}", c.x),
            format!("{:.2}", c.y),
            format!("{:.2}", c.width),
            format!("{:.2}", c.height),
            format!("{:.2}", result.confidence),
            result.strategy.as_str().to_string(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(output: &ExtractionOutput) -> String {
    let mut text = String::new();

    let width = output
        .results
        .iter()
        .map(|r| r.field_name.chars().count())
        .max()
        .unwrap_or(0);

    for result in &output.results {
        text.push_str(&format!(
            "{:width$}  {}\n",
            result.field_name,
            result.value.as_deref().unwrap_or("-"),
            width = width
        ));
        text.push_str(&format!(
            "{:width$}  page {} at ({:.1}, {:.1}), {} {:.2}\n",
            "",
            result.page_number,
            result.coordinates.x,
            result.coordinates.y,
            result.strategy,
            result.confidence,
            width = width
        ));
    }

    let notes: Vec<_> = output.notes().collect();
    if !notes.is_empty() {
        text.push_str("\nNotes:\n");
        for note in notes {
            text.push_str(&format!("  {}: {}\n", note.field_name, note.note));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmark_core::{Coordinates, ExtractionResult, FieldType, MatchDetail, Strategy};

    fn output() -> ExtractionOutput {
        ExtractionOutput {
            results: vec![ExtractionResult {
                field_name: "contract_number".to_string(),
                field_type: FieldType::Text,
                value: Some("HT-7".to_string()),
                page_number: 1,
                coordinates: Coordinates::new(80.0, 120.0, 200.0, 16.0),
                confidence: 0.8,
                strategy: Strategy::KeywordOffset,
            }],
            details: vec![MatchDetail::note("llm", "llm unavailable; fell back to matching")],
        }
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let csv = format_output(&output(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("field_name,field_type,value"));
        assert_eq!(lines[1], "contract_number,text,HT-7,1,80.00,120.00,200.00,16.00,0.80,keyword_offset");
    }

    #[test]
    fn test_text_lists_notes() {
        let text = format_output(&output(), OutputFormat::Text).unwrap();
        assert!(text.contains("contract_number  HT-7"));
        assert!(text.contains("Notes:\n  llm: llm unavailable"));
    }

    #[test]
    fn test_apply_annotations_policies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        let records = vec![AnnotationRecord::from_result("doc", "合同编号", &output().results[0])];

        assert_eq!(apply_annotations(&path, records.clone(), ApplyPolicy::Append).unwrap(), (1, 0));
        assert_eq!(apply_annotations(&path, records.clone(), ApplyPolicy::Append).unwrap(), (1, 0));
        assert_eq!(
            apply_annotations(&path, records, ApplyPolicy::SkipExistingFields).unwrap(),
            (0, 1)
        );

        let stored: Vec<AnnotationRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.len(), 2);
    }
}
