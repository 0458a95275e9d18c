//! CLI binary for pdf2text.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2text::prompts::DETAILED_IMAGE_PROMPT;
use pdf2text::{
    convert, ConversionConfig, ConversionProgressCallback, ConversionResult, ConversionStatus,
    ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the extraction tool runs, then a bar over eligible images.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl CliProgressCallback {
    /// Stop the spinner if the run ended without a completion event.
    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, pdf_name: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("{pdf_name}…"));
    }

    fn on_extraction_complete(&self, image_count: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extraction done, {image_count} images found"))
        ));
    }

    fn on_describe_start(&self, eligible: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(eligible as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Describing");
    }

    fn on_image_start(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_image_complete(&self, name: &str, description_len: usize) {
        self.bar.println(format!(
            "  {} {:<32}  {}",
            green("✓"),
            name,
            dim(&format!("{description_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<32}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, described: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} images described", green("✔"), bold(&described.to_string()));
        } else {
            eprintln!(
                "{} {} images described  ({} failed)",
                cyan("⚠"),
                bold(&described.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert, describing images with the auto-detected provider
  pdf2text report.pdf

  # Custom instruction for the image descriptions
  pdf2text report.pdf --prompt "Summarise the chart's trend in one sentence."

  # Built-in detailed instruction for maps, charts and diagrams
  pdf2text --detailed atlas.pdf

  # Text and images only, no description service
  pdf2text --no-describe report.pdf

  # Full result as JSON
  pdf2text --json report.pdf > result.json

OUTPUT:
  pdf_to_text/<run_id>/<run_id>.md    enriched Markdown
  pdf_to_text/<run_id>/<run_id>.pdf   copy of the input
  pdf_to_text/<run_id>/images/        extracted images
  files_dict.json                     run_id → original file name

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (enables image descriptions)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. pdf2text=debug

  A .env file in the working directory is loaded before flags are parsed.
"#;

/// Convert a PDF to Markdown enriched with image descriptions.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2text",
    version,
    about = "Convert a PDF to Markdown enriched with VLM image descriptions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Instruction sent with each image.
    #[arg(long, env = "PDF2TEXT_PROMPT", conflicts_with_all = ["prompt_file", "detailed"])]
    prompt: Option<String>,

    /// Read the image instruction from this file.
    #[arg(long, env = "PDF2TEXT_PROMPT_FILE", conflicts_with = "detailed")]
    prompt_file: Option<PathBuf>,

    /// Use the built-in detailed instruction for charts, maps and diagrams.
    #[arg(long)]
    detailed: bool,

    /// Directory receiving per-document output folders.
    #[arg(long, env = "PDF2TEXT_OUTPUT_ROOT", default_value = "pdf_to_text")]
    output_root: PathBuf,

    /// Run registry file.
    #[arg(long, env = "PDF2TEXT_REGISTRY", default_value = "files_dict.json")]
    registry: PathBuf,

    /// Structure-extraction program.
    #[arg(long, env = "PDF2TEXT_EXTRACTOR", default_value = "marker_single")]
    extractor: String,

    /// Extra argument passed to the extractor before the paths.
    ///
    /// Repeat the flag for several arguments; values are passed through
    /// unsplit, so `--extractor-arg --languages --extractor-arg en,de` works.
    #[arg(long = "extractor-arg", allow_hyphen_values = true)]
    extractor_args: Vec<String>,

    /// Kill the extractor after this many seconds.
    #[arg(long, env = "PDF2TEXT_EXTRACTION_TIMEOUT")]
    extraction_timeout: Option<u64>,

    /// Describe only images larger than this many bytes.
    #[arg(long, env = "PDF2TEXT_THRESHOLD", default_value_t = 20_000)]
    threshold: u64,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default gpt-4o when OpenAI is auto-selected).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Never call a description service.
    #[arg(long, env = "PDF2TEXT_NO_DESCRIBE")]
    no_describe: bool,

    /// Concurrent description requests.
    #[arg(short, long, env = "PDF2TEXT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per image on description failure.
    #[arg(long, env = "PDF2TEXT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-image description timeout in seconds.
    #[arg(long, env = "PDF2TEXT_DESCRIBE_TIMEOUT")]
    describe_timeout: Option<u64>,

    /// Preview length in characters.
    #[arg(long, env = "PDF2TEXT_PREVIEW_CHARS", default_value_t = 2_000)]
    preview_chars: usize,

    /// Leave the temporary workspace on disk.
    #[arg(long)]
    keep_workspace: bool,

    /// Print the full result as JSON instead of the preview.
    #[arg(long, env = "PDF2TEXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TEXT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials usually live in .env; a missing file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bar = show_progress.then(CliProgressCallback::new);
    let progress: Option<ProgressCallback> = bar
        .clone()
        .map(|cb| cb as Arc<dyn ConversionProgressCallback>);

    let prompt = resolve_prompt(&cli).await?;
    let config = build_config(&cli, progress)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = convert(&cli.input, &prompt, &config).await;
    // Error and no-output runs never reach `on_conversion_complete`.
    if let Some(cb) = bar {
        cb.finish();
    }
    print_result(&cli, &result)?;

    if result.status == ConversionStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}

async fn resolve_prompt(cli: &Cli) -> Result<String> {
    if let Some(ref p) = cli.prompt {
        return Ok(p.clone());
    }
    if let Some(ref path) = cli.prompt_file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path));
    }
    if cli.detailed {
        return Ok(DETAILED_IMAGE_PROMPT.to_string());
    }
    Ok(String::new())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .output_root(&cli.output_root)
        .registry_path(&cli.registry)
        .extractor_program(&cli.extractor)
        .extractor_args(cli.extractor_args.iter().cloned())
        .description_threshold_bytes(cli.threshold)
        .describe_concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .preview_char_limit(cli.preview_chars)
        .keep_workspace(cli.keep_workspace)
        .auto_detect_provider(!cli.no_describe);

    if let Some(secs) = cli.extraction_timeout {
        builder = builder.extraction_timeout_secs(secs);
    }
    if let Some(secs) = cli.describe_timeout {
        builder = builder.describe_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(provider) = cli.provider.as_ref().filter(|_| !cli.no_describe) {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_result(cli: &Cli, result: &ConversionResult) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(result).context("Failed to serialise result")?;
        println!("{json}");
        return Ok(());
    }

    match result.status {
        ConversionStatus::Converted => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(result.preview_text.as_bytes())
                .context("Failed to write to stdout")?;
            if !result.preview_text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            if !cli.quiet {
                let out = result
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                eprintln!(
                    "{}  {}  →  {}  {}",
                    green("✔"),
                    result.original_file_name,
                    bold(&out),
                    dim(&format!("{}ms", result.stats.total_duration_ms)),
                );
            }
        }
        ConversionStatus::NoOutputFound => {
            eprintln!("{} {}", cyan("⚠"), result.message);
        }
        ConversionStatus::Error => {
            eprintln!("{} {}", red("✘"), result.message);
        }
    }
    Ok(())
}
