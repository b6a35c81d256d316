//! CLI binary for heartscan.
//!
//! A thin shim over the library crate: maps CLI flags to `ServiceConfig`,
//! submits each image in turn and prints the resulting record list.

use anyhow::{Context, Result};
use clap::Parser;
use heartscan::{
    validate_image, Attachment, DiagnoseError, DiagnosisRecord, ImageCheck, ObserverHandle,
    PreviewRef, RecordId, ServiceConfig, ServiceError, ServiceKind, SubmissionObserver,
    UploadOrchestrator,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner that names the backend being waited on, plus
/// one log line per committed record or failed call.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Idle");
        Arc::new(Self { bar })
    }
}

impl SubmissionObserver for CliObserver {
    fn on_submit_start(&self, has_document: bool) {
        self.bar.reset_elapsed();
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.set_prefix("Diagnosing");
        self.bar.set_message(if has_document {
            "scan + patient document"
        } else {
            "scan"
        });
    }

    fn on_call_start(&self, service: ServiceKind) {
        self.bar.set_message(format!("waiting for the {service}…"));
    }

    fn on_record_added(&self, record: &DiagnosisRecord) {
        self.bar.println(format!(
            "  {} {} record {}  {}  {}",
            green("✓"),
            record.kind(),
            record.id,
            bold(record.prediction_label()),
            dim(&record.confidence_label()),
        ));
    }

    fn on_call_failed(&self, service: ServiceKind, error: &ServiceError) {
        // Truncate very long error messages to keep output tidy.
        let msg = error.to_string();
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!("  {} {}  {}", red("✗"), service, red(&msg)));
    }

    fn on_submit_complete(&self, _records_added: &[RecordId]) {
        self.bar.disable_steady_tick();
        self.bar.set_prefix("Idle");
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Diagnose one scan
  heartscan retina.png

  # Scan plus patient document (table extraction)
  heartscan retina.jpg --document labs.pdf

  # Several scans, each sent with the same document, JSON output
  heartscan left.png right.png -d labs.pdf --json

  # Backends on different hosts
  heartscan --predict-url https://gpu.example.org/predict \
            --extract-url http://localhost:5000/extract-table retina.png

  # Backend that expects the document under the `pdf` field
  heartscan --document-field pdf retina.png -d labs.pdf

ENVIRONMENT VARIABLES:
  HEARTSCAN_PREDICT_URL      Prediction endpoint
  HEARTSCAN_EXTRACT_URL      Table-extraction endpoint
  HEARTSCAN_PREDICT_TIMEOUT  Prediction call timeout (seconds)
  HEARTSCAN_EXTRACT_TIMEOUT  Table-extraction call timeout (seconds)
  RUST_LOG                   Log filter override (e.g. heartscan=debug)

EXIT STATUS:
  0  every submission succeeded
  1  at least one image was rejected or a backend call failed
"#;

/// Send retinal scans (and an optional patient document) for diagnosis.
#[derive(Parser, Debug)]
#[command(
    name = "heartscan",
    version,
    about = "Send retinal scans and patient documents for heart-disease diagnosis",
    long_about = "Submit retinal scan images to a prediction service and, optionally, a patient \
document to a table-extraction service. Each successful answer becomes a diagnosis record; the \
resulting list is printed as cards or JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scan images (PNG or JPEG). Submitted one after the other.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Patient document (e.g. a PDF) sent along with every image.
    #[arg(short, long, env = "HEARTSCAN_DOCUMENT")]
    document: Option<PathBuf>,

    /// Prediction endpoint.
    #[arg(long, env = "HEARTSCAN_PREDICT_URL", default_value = heartscan::config::DEFAULT_PREDICT_URL)]
    predict_url: String,

    /// Table-extraction endpoint.
    #[arg(long, env = "HEARTSCAN_EXTRACT_URL", default_value = heartscan::config::DEFAULT_EXTRACT_URL)]
    extract_url: String,

    /// Prediction call timeout in seconds.
    #[arg(long, env = "HEARTSCAN_PREDICT_TIMEOUT", default_value_t = 60)]
    predict_timeout: u64,

    /// Table-extraction call timeout in seconds.
    #[arg(long, env = "HEARTSCAN_EXTRACT_TIMEOUT", default_value_t = 60)]
    extract_timeout: u64,

    /// Multipart field name for the image.
    #[arg(long, env = "HEARTSCAN_IMAGE_FIELD", default_value = "image")]
    image_field: String,

    /// Multipart field name for the document.
    #[arg(long, env = "HEARTSCAN_DOCUMENT_FIELD", default_value = "document")]
    document_field: String,

    /// Output the record list (and failures) as JSON.
    #[arg(long, env = "HEARTSCAN_JSON")]
    json: bool,

    /// Attach each image as a base64 data URI preview instead of its path.
    #[arg(long)]
    embed_previews: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "HEARTSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HEARTSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "HEARTSCAN_QUIET")]
    quiet: bool,
}

/// A submission (or selection) that did not fully succeed.
#[derive(Debug, Serialize)]
struct Failure {
    image: String,
    message: String,
    /// The scan diagnosis was kept even though the call failed.
    partial: bool,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    records: &'a [DiagnosisRecord],
    failures: &'a [Failure],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports progress; keep library logs quiet under it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let observer: Option<ObserverHandle> = if show_progress {
        Some(CliObserver::new() as Arc<dyn SubmissionObserver>)
    } else {
        None
    };
    let config = build_config(&cli, observer)?;
    let orchestrator = UploadOrchestrator::from_config(&config).context("Failed to set up service clients")?;

    // ── Load inputs ──────────────────────────────────────────────────────
    let document = match cli.document {
        Some(ref path) => Some(
            Attachment::from_path(path)
                .await
                .with_context(|| format!("Failed to load document {}", path.display()))?,
        ),
        None => None,
    };

    let mut failures: Vec<Failure> = Vec::new();
    let mut selected: Vec<(String, Attachment)> = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        let label = path.display().to_string();
        match select_image(path, cli.embed_previews).await {
            Ok(image) => selected.push((label, image)),
            Err(message) => {
                if !cli.quiet {
                    eprintln!("{} {}  {}", red("✘"), bold(&label), red(&message));
                }
                failures.push(Failure {
                    image: label,
                    message,
                    partial: false,
                });
            }
        }
    }

    // ── Submit, strictly one at a time ───────────────────────────────────
    for (label, image) in selected {
        if !cli.quiet && !cli.json {
            eprintln!("{} {}", cyan("◆"), bold(&format!("Submitting {label}")));
        }
        match orchestrator.submit(Some(image), document.clone()).await {
            Ok(report) => {
                if !cli.quiet && !cli.json && !show_progress {
                    eprintln!(
                        "{} {} record(s) in {}ms",
                        green("✔"),
                        report.record_ids().len(),
                        report.duration_ms
                    );
                }
            }
            Err(e) => {
                if !cli.quiet && !cli.json {
                    eprintln!("{} {}", if e.is_partial() { cyan("⚠") } else { red("✘") }, e);
                }
                failures.push(Failure {
                    image: label,
                    message: failure_message(&e),
                    partial: e.is_partial(),
                });
            }
        }
    }

    // ── Output ───────────────────────────────────────────────────────────
    let records = orchestrator.records();
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.json {
        let json = serde_json::to_string_pretty(&JsonOutput {
            records: &records,
            failures: &failures,
        })
        .context("Failed to serialise records")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    } else {
        for (i, record) in records.iter().enumerate() {
            handle
                .write_all(render_card(i + 1, record).as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    drop(handle);

    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} image(s) did not complete cleanly",
            failures.len(),
            cli.images.len()
        );
    }
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli, observer: Option<ObserverHandle>) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .predict_url(cli.predict_url.clone())
        .extract_url(cli.extract_url.clone())
        .predict_timeout_secs(cli.predict_timeout)
        .extract_timeout_secs(cli.extract_timeout)
        .image_field(cli.image_field.clone())
        .document_field(cli.document_field.clone());

    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

/// Load an image and check it the way a file picker would, before any
/// submission is possible.
async fn select_image(path: &Path, embed_preview: bool) -> std::result::Result<Attachment, String> {
    let image = Attachment::from_path(path).await.map_err(|e| e.to_string())?;
    if let ImageCheck::Rejected { reason } = validate_image(&image) {
        return Err(format!("{reason} (detected {})", image.mime_type));
    }
    let preview = if embed_preview {
        PreviewRef::new(image.data_uri())
    } else {
        PreviewRef::new(path.display().to_string())
    };
    Ok(image.with_preview(preview))
}

fn failure_message(e: &DiagnoseError) -> String {
    e.service_error()
        .map(|s| s.message.clone())
        .unwrap_or_else(|| e.to_string())
}

/// One result card, as plain text.
fn render_card(index: usize, record: &DiagnosisRecord) -> String {
    let mut out = String::new();
    let title = match record.kind() {
        heartscan::RecordKind::Retinal => format!("Diagnosis Result {index}"),
        heartscan::RecordKind::Table => format!("Patient Data Result {index}"),
    };
    out.push_str(&format!("{}  {}\n", bold(&title), dim(&record.id.to_string())));
    out.push_str(&format!("  Prediction: {}\n", record.prediction_label()));
    out.push_str(&format!("  Confidence: {}\n", record.confidence_label()));
    if let Some(ref preview) = record.preview {
        let shown = if preview.as_str().starts_with("data:") {
            "<embedded image>"
        } else {
            preview.as_str()
        };
        out.push_str(&format!("  Scan:       {}\n", dim(shown)));
    }
    if let Some(rows) = record.table_rows() {
        if rows.is_empty() {
            out.push_str(&format!("  {}\n", dim("(no table rows extracted)")));
        } else {
            out.push_str(&render_table(rows));
        }
    }
    out.push('\n');
    out
}

/// Ragged rows as an aligned text grid; short rows are simply shorter.
fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, cell)| {
                let pad = widths[c].saturating_sub(cell.chars().count());
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        out.push_str(&format!("  │ {} │\n", cells.join(" │ ")));
    }
    out
}
