//! CLI binary for examlens.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalyzerConfig`, reads the PDFs and syllabus from disk, and prints the
//! per-file outcomes as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use examlens::{
    AnalysisProgressCallback, AnalyzerConfig, BatchRequest, ExamlensError, FilePipeline,
    ProgressCallback, SyllabusEnvelope, TopicDetails, UploadedFile, WorkerPool,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit status for a batch rejected as a whole (missing files or syllabus).
const EXIT_BATCH_ERROR: i32 = 2;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a progress bar plus one log line per finished file. Files may
/// finish out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_files} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, file_name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, topics: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{topics:>3} topics")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files analysed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files analysed  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse two papers, print JSON to stdout
  examlens --syllabus syllabus.json midterm.pdf final.pdf

  # Write results to a file
  examlens --syllabus syllabus.json midterm.pdf -o analysis.json

  # Use a local OpenAI-compatible server
  examlens --ai-base-url http://localhost:11434/v1 --model llama3 \
           --syllabus syllabus.json midterm.pdf

SYLLABUS FILE:
  Either a JSON array of topics, or an object wrapping it in "request":
    [{"topic": "Algebra", "subtopics": ["Linear Equations", "Quadratics"]}]
    {"request": [{"topic": "Algebra", "subtopics": ["Linear Equations"]}]}

OUTPUT:
  One JSON object per input file, in input order. Successful files carry
  "analysis" (a list of {Topic, Total_Marks, Important_Subtopics});
  failed files carry "error". When the AI step fails the analysis is empty
  and "analysis_error" says why.

EXIT STATUS:
  0  the batch ran (individual files may still have failed)
  1  the CLI itself failed (unreadable file, invalid configuration)
  2  the batch was rejected, e.g. an empty syllabus; prints {"Error": "..."}

ENVIRONMENT VARIABLES:
  EXAMLENS_OCR_URL        OCR upload endpoint
  EXAMLENS_AI_BASE_URL    Chat-completion API base URL
  EXAMLENS_AI_API_KEY     Bearer key for the completion API
  EXAMLENS_MODEL          Model ID
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Analyse exam-paper PDFs against a syllabus.
#[derive(Parser, Debug)]
#[command(
    name = "examlens",
    version,
    about = "Analyse exam-paper PDFs against a syllabus",
    long_about = "Send each exam paper through OCR, ask a chat model which syllabus topics \
it examines and how many marks each carries, and print the result as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Exam-paper PDF files, analysed in the order given.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON file with the syllabus topics.
    #[arg(short, long, env = "EXAMLENS_SYLLABUS")]
    syllabus: PathBuf,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "EXAMLENS_OUTPUT")]
    output: Option<PathBuf>,

    /// OCR upload endpoint.
    #[arg(long, env = "EXAMLENS_OCR_URL")]
    ocr_url: String,

    /// Chat-completion API base URL; `/chat/completions` is appended.
    #[arg(long, env = "EXAMLENS_AI_BASE_URL", default_value = "https://api.openai.com/v1")]
    ai_base_url: String,

    /// Bearer key for the completion API.
    #[arg(long, env = "EXAMLENS_AI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Model ID sent with every completion request.
    #[arg(long, env = "EXAMLENS_MODEL", default_value = "gpt-4.1-mini")]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "EXAMLENS_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Completion token ceiling.
    #[arg(long, env = "EXAMLENS_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: u32,

    /// Per-attempt completion timeout in seconds.
    #[arg(long, env = "EXAMLENS_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Completion retries after the first attempt.
    #[arg(long, env = "EXAMLENS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Delay between completion attempts in milliseconds.
    #[arg(long, env = "EXAMLENS_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// OCR request timeout in seconds.
    #[arg(long, env = "EXAMLENS_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Per-file size limit in KB.
    #[arg(long, env = "EXAMLENS_MAX_FILE_KB", default_value_t = 2000.0)]
    max_file_kb: f64,

    /// Directory for staged uploads.
    #[arg(long, env = "EXAMLENS_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Files analysed concurrently.
    #[arg(short, long, env = "EXAMLENS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "EXAMLENS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Content type to declare for every file instead of sniffing `%PDF`.
    #[arg(long)]
    content_type: Option<String>,

    /// Disable progress bar.
    #[arg(long, env = "EXAMLENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXAMLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EXAMLENS_QUIET")]
    quiet: bool,
}

/// Accepted syllabus file shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum SyllabusFile {
    Topics(Vec<TopicDetails>),
    Envelope(SyllabusEnvelope),
}

impl SyllabusFile {
    fn into_topics(self) -> Option<Vec<TopicDetails>> {
        match self {
            SyllabusFile::Topics(topics) => Some(topics),
            SyllabusFile::Envelope(env) => env.request,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Read inputs ──────────────────────────────────────────────────────
    let syllabus = read_syllabus(&cli.syllabus).await?;
    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        files.push(read_upload(path, cli.content_type.as_deref()).await?);
    }
    let request = BatchRequest {
        files: Some(files),
        syllabus,
    };

    // ── Run batch ────────────────────────────────────────────────────────
    let pool = WorkerPool::new(config.pool).context("Invalid worker pool configuration")?;
    let pipeline = FilePipeline::from_config(config).context("Failed to initialise clients")?;

    let outcomes = match pool.submit(pipeline.handle(request)).await.and_then(|r| r) {
        Ok(outcomes) => outcomes,
        Err(e @ (ExamlensError::MissingInput(_) | ExamlensError::CapacityExceeded { .. })) => {
            let body = serde_json::json!({ "Error": e.to_string() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(EXIT_BATCH_ERROR);
        }
        Err(e) => return Err(e).context("Analysis failed"),
    };

    // ── Write output ─────────────────────────────────────────────────────
    let json = serde_json::to_string_pretty(&outcomes).context("Failed to serialise outcomes")?;
    if let Some(ref path) = cli.output {
        tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            let ok = outcomes.iter().filter(|o| o.is_success()).count();
            eprintln!(
                "{}  {}/{} files  →  {}",
                if ok == outcomes.len() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                ok,
                outcomes.len(),
                bold(&path.display().to_string()),
            );
        }
    } else {
        println!("{json}");
    }

    Ok(())
}

/// Map CLI args to `AnalyzerConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalyzerConfig> {
    let mut builder = AnalyzerConfig::builder()
        .ocr_url(&cli.ocr_url)
        .ai_base_url(&cli.ai_base_url)
        .api_key(&cli.api_key)
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .retry_delay_ms(cli.retry_delay_ms)
        .ocr_timeout_secs(cli.ocr_timeout)
        .max_file_kb(cli.max_file_kb)
        .file_concurrency(cli.concurrency);

    if let Some(ref dir) = cli.staging_dir {
        builder = builder.staging_dir(dir);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_syllabus(path: &Path) -> Result<Option<Vec<TopicDetails>>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read syllabus {}", path.display()))?;
    let parsed: SyllabusFile = serde_json::from_str(&text).with_context(|| {
        format!(
            "Syllabus {} is neither a topic list nor {{\"request\": [...]}}",
            path.display()
        )
    })?;
    Ok(parsed.into_topics())
}

async fn read_upload(path: &Path, content_type: Option<&str>) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = content_type
        .unwrap_or_else(|| examlens::pipeline::validate::sniff_content_type(&bytes))
        .to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, Some(content_type), bytes))
}
