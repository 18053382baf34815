//! CLI binary for pdf2expense.
//!
//! Maps flags onto `ExtractionConfig`, runs the extraction, and prints the
//! report as JSON. All human-facing chatter goes to stderr so stdout stays
//! pipeable.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2expense::{
    extract_expenses, extract_to_file, ExtractionConfig, ExtractionProgressCallback,
    OpenAiVisionClient, ProgressCallback, SourceDocument,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ANSI escapes, applied through one helper so --quiet paths stay plain.
const GREEN: &str = "32";
const RED: &str = "31";
const CYAN: &str = "36";
const BOLD: &str = "1";
const DIM: &str = "2";

fn tint(code: &str, s: impl AsRef<str>) -> String {
    format!("\x1b[{code}m{}\x1b[0m", s.as_ref())
}

/// Progress callback rendering one indicatif bar plus a log line per page.
///
/// Pages complete out of order in concurrent mode, so every printed line
/// names its page and the running record count is kept in an atomic.
struct PageTicker {
    bar: ProgressBar,
    records_so_far: AtomicUsize,
}

impl PageTicker {
    /// The bar starts as a bare spinner; `on_extraction_start` sizes it once
    /// rendering is done and the page count is known.
    fn start() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Rendering PDF pages…");
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Arc::new(Self {
            bar,
            records_so_far: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for PageTicker {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.green/238}] {pos}/{len} pages  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        self.bar.println(tint(
            BOLD,
            format!("Extracting expenses from {total_pages} page(s)…"),
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, records: usize) {
        let so_far = self.records_so_far.fetch_add(records, Ordering::SeqCst) + records;
        self.bar.println(format!(
            "  {} page {page_num}/{total_pages}: {records} record(s)  {}",
            tint(GREEN, "ok"),
            tint(DIM, format!("[{so_far} total]")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        // One line per failure; the full error is also in the JSON report.
        let short: String = error.chars().take(80).collect();
        self.bar.println(format!(
            "  {} page {page_num}/{total_pages}: {}",
            tint(RED, "failed"),
            tint(RED, short),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {success_count} page(s) extracted",
                tint(GREEN, "done:")
            );
        } else {
            eprintln!(
                "{} {success_count}/{total_pages} page(s) extracted, {failed} failed",
                tint(if failed == total_pages { RED } else { CYAN }, "done:")
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract from one report (JSON to stdout)
  pdf2expense report.pdf

  # Several documents, four model calls in flight
  pdf2expense -c 4 january.pdf february.pdf march.pdf

  # Write a report file (pretty-printed, atomic write)
  pdf2expense report.pdf -o expenses.json

  # Point at an OpenAI-compatible gateway with a specific model
  pdf2expense --base-url https://llm.internal.example/v1 --model gpt-4o-mini report.pdf

  # Crisper renders for dense tables
  pdf2expense --max-pixels 3000 --jpeg-quality 92 scan.pdf

OUTPUT:
  The report is JSON: extracted records (date, category, description,
  amount), the exact grand total, per-page detail including dropped-record
  counts and raw model answers, and run statistics.

  Page-level failures are recorded inside the JSON and the exit code stays
  0; only batch-fatal errors (admission rejects, unreadable PDF, no model
  configured) exit non-zero.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      API key used when --api-key is not given
  OPENAI_BASE_URL     OpenAI-compatible endpoint (Azure front-ends, proxies)
  RUST_LOG            Overrides the log filter (tracing-subscriber EnvFilter)

SETUP:
  1. Install pdfium:   the libpdfium shared library must be on the loader path
  2. Set an API key:   export OPENAI_API_KEY=sk-...
  3. Extract:          pdf2expense report.pdf -o expenses.json
"#;

/// Extract travel-expense records from PDF reports using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2expense",
    version,
    about = "Extract travel-expense records from PDF reports using Vision LLMs",
    long_about = "Extract structured travel-expense records from scanned PDF reports. Each page \
is rasterised and read by a vision language model; the answers are recovered into validated \
records with an exact grand total. Works with OpenAI and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF report files to extract from (up to the configured batch limit).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the JSON report to this file instead of stdout.
    #[arg(short, long, env = "PDF2EXPENSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID (e.g. gpt-4o, gpt-4o-mini).
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// API key for the model endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL (Azure front-ends, proxies, gateways).
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "PDF2EXPENSE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Longest rendered page edge in pixels (512–4096).
    #[arg(long, env = "PDF2EXPENSE_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(512..=4096))]
    max_pixels: u32,

    /// JPEG quality for encoded pages (1–100).
    #[arg(long, env = "PDF2EXPENSE_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Retries per page on model failure.
    #[arg(long, env = "PDF2EXPENSE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "PDF2EXPENSE_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Pretty-print the JSON written to stdout.
    #[arg(long, env = "PDF2EXPENSE_PRETTY")]
    pretty: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2EXPENSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2EXPENSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON report.
    #[arg(short, long, env = "PDF2EXPENSE_QUIET")]
    quiet: bool,
}

fn init_logging(cli: &Cli, show_progress: bool) {
    // While the bar is drawing, library INFO logs would tear it apart, so
    // they are filtered down to errors unless --verbose asks for more.
    let default_filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "pdf2expense=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_progress = !cli.quiet && !cli.no_progress;
    init_logging(&cli, show_progress);

    let mut documents = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        documents.push(
            SourceDocument::from_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let progress: Option<ProgressCallback> = show_progress
        .then(|| PageTicker::start() as Arc<dyn ExtractionProgressCallback>);
    let config = build_config(&cli, progress)?;

    match cli.output {
        Some(ref output_path) => {
            let stats = extract_to_file(&documents, output_path, &config)
                .await
                .context("Extraction failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} record(s) from {} page(s) in {}ms → {}",
                    tint(if stats.failed_pages == 0 { GREEN } else { CYAN }, "wrote:"),
                    stats.total_records,
                    stats.total_pages,
                    stats.total_duration_ms,
                    tint(BOLD, output_path.display().to_string()),
                );
                if stats.dropped_records > 0 {
                    eprintln!(
                        "  {}",
                        tint(
                            DIM,
                            format!("{} record(s) dropped during validation", stats.dropped_records)
                        )
                    );
                }
            }
        }
        None => {
            let output = extract_expenses(&documents, &config)
                .await
                .context("Extraction failed")?;

            let json = if cli.pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }
            .context("Failed to serialise output")?;
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(json.as_bytes())
                .and_then(|_| stdout.write_all(b"\n"))
                .context("Failed to write to stdout")?;

            // The ticker already reported per-page; without it, one summary
            // line on stderr is the only chatter.
            if !cli.quiet && !show_progress {
                eprintln!(
                    "Extracted {} record(s) from {} page(s) in {}ms, total {:.2}",
                    output.stats.total_records,
                    output.stats.total_pages,
                    output.stats.total_duration_ms,
                    output.total_amount,
                );
                if output.stats.failed_pages > 0 {
                    eprintln!("  {} page(s) failed", output.stats.failed_pages);
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .jpeg_quality(cli.jpeg_quality)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.timeout_secs);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }

    // A key on the command line (or via env through clap) builds the client
    // here; otherwise the library's own environment lookup applies and a
    // missing key surfaces as ModelNotConfigured with a hint.
    if let Some(ref key) = cli.api_key {
        let mut client = OpenAiVisionClient::new(key.clone());
        if let Some(ref model) = cli.model {
            client = client.with_model(model.clone());
        }
        if let Some(ref base_url) = cli.base_url {
            client = client.with_base_url(base_url.clone());
        }
        builder = builder.vision_model(Arc::new(client));
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
