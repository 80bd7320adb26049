//! CLI binary for worksheet-manual.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one job, and reports where the artifacts landed.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use worksheet_manual::{
    FileType, FsArtifactStore, InMemoryJobStore, Job, JobId, JobMeta, JobStatus, Pipeline,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, Stage,
};

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that tracks the current stage and prints one line per finished
/// stage and chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    stage_started: std::sync::Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            stage_started: std::sync::Mutex::new(None),
        })
    }

    fn stage_elapsed(&self) -> f64 {
        self.stage_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, _job_id: &JobId, stage: Stage) {
        if let Ok(mut t) = self.stage_started.lock() {
            *t = Some(Instant::now());
        }
        let prefix = match stage {
            Stage::Extraction => "Extracting",
            Stage::Generation => "Generating",
            Stage::Compilation => "Compiling",
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message("");
    }

    fn on_stage_complete(&self, _job_id: &JobId, stage: Stage, detail: &str) {
        let secs = self.stage_elapsed();
        self.bar.println(format!(
            "  {} {:<12} {}  {}",
            green("✓"),
            stage,
            dim(detail),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_chunk_start(&self, _job_id: &JobId, chunk_index: usize, total: usize, depth: usize) {
        let split = if depth > 0 {
            format!(" (split, depth {depth})")
        } else {
            String::new()
        };
        self.bar
            .set_message(format!("chunk {}/{}{}", chunk_index + 1, total, split));
    }

    fn on_chunk_complete(&self, _job_id: &JobId, chunk_index: usize, total: usize, questions: usize) {
        self.bar.println(format!(
            "    {} chunk {:>2}/{:<2} {}",
            dim("·"),
            chunk_index + 1,
            total,
            dim(&format!("{questions} question(s)")),
        ));
    }

    fn on_job_finished(&self, _job_id: &JobId, status: JobStatus, error: Option<&str>) {
        self.bar.finish_and_clear();
        match error {
            None => eprintln!("{} manual {}", green("✔"), bold(&status.to_string())),
            Some(e) => eprintln!("{} job {}: {}", red("✘"), status, red(e)),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # DOCX worksheet, manuals written under ./manuals/<job-id>/
  manualgen worksheet.docx --program JEE --subject Physics --chapter Kinematics

  # PDF worksheet with a specific model and fallbacks
  manualgen ws.pdf --model gpt-4.1 --fallback-model gpt-4.1-mini --fallback-model gpt-4o-mini

  # Keep scratch directories for inspecting LaTeX failures
  manualgen ws.docx --keep-scratch -v

EXTERNAL TOOLS:
  pdflatex      required (override with --latex)
  pandoc        required (override with --pandoc)
  pdftotext     PDF text fallback when libpdfium is unavailable
  xsltproc      equation fallback, needs --omml-stylesheet
  pix2tex_ocr   PDF equation OCR (override with --ocr-command)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Turn a question worksheet into an answer-key manual.
#[derive(Parser, Debug)]
#[command(
    name = "manualgen",
    version,
    about = "Turn question worksheets (DOCX/PDF) into answer-key manuals",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Worksheet file (.docx or .pdf).
    input: PathBuf,

    /// Input type when the extension is missing or misleading: docx, pdf.
    #[arg(long, env = "MANUALGEN_FILE_TYPE")]
    file_type: Option<FileType>,

    /// Program name for the manual header (e.g. JEE).
    #[arg(long, env = "MANUALGEN_PROGRAM", default_value = "")]
    program: String,

    /// Subject for the manual header.
    #[arg(long, env = "MANUALGEN_SUBJECT", default_value = "")]
    subject: String,

    /// Chapter or worksheet title.
    #[arg(long, env = "MANUALGEN_CHAPTER", default_value = "")]
    chapter: String,

    /// Directory that receives `<job-id>/manual.pdf` and `manual.docx`.
    #[arg(short, long, env = "MANUALGEN_OUTPUT_DIR", default_value = "manuals")]
    output_dir: PathBuf,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Models tried in order when the primary model is unavailable.
    #[arg(long = "fallback-model", env = "MANUALGEN_FALLBACK_MODELS", value_delimiter = ',')]
    fallback_models: Vec<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Questions per completion call.
    #[arg(long, env = "MANUALGEN_CHUNK_SIZE", default_value_t = 4)]
    chunk_size: usize,

    /// Maximum adaptive split depth per chunk.
    #[arg(long, env = "MANUALGEN_MAX_CHUNK_DEPTH", default_value_t = 2)]
    max_chunk_depth: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MANUALGEN_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max output tokens per completion call.
    #[arg(long, env = "MANUALGEN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "MANUALGEN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Timeout for each pdflatex / pandoc run, in seconds.
    #[arg(long, env = "MANUALGEN_COMPILE_TIMEOUT", default_value_t = 120)]
    compile_timeout: u64,

    /// LaTeX engine.
    #[arg(long = "latex", env = "MANUALGEN_LATEX", default_value = "pdflatex")]
    latex_program: String,

    /// Document converter.
    #[arg(long = "pandoc", env = "MANUALGEN_PANDOC", default_value = "pandoc")]
    pandoc_program: String,

    /// OMML→MathML stylesheet for the xsltproc equation fallback.
    #[arg(long, env = "MANUALGEN_OMML_STYLESHEET")]
    omml_stylesheet: Option<PathBuf>,

    /// OCR command line (space separated); the PDF path is appended.
    #[arg(long, env = "MANUALGEN_OCR_COMMAND")]
    ocr_command: Option<String>,

    /// Produce a placeholder manual instead of failing on quota errors.
    #[arg(long, env = "MANUALGEN_QUOTA_FALLBACK")]
    quota_fallback: bool,

    /// Keep compiler scratch directories for inspection.
    #[arg(long, env = "MANUALGEN_KEEP_SCRATCH")]
    keep_scratch: bool,

    /// Regex for watermark lines to drop (repeatable).
    #[arg(long = "watermark", env = "MANUALGEN_WATERMARKS", value_delimiter = ',')]
    watermarks: Vec<String>,

    /// Disable the progress spinner.
    #[arg(long, env = "MANUALGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MANUALGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MANUALGEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
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

    let file_type = match cli.file_type {
        Some(t) => t,
        None => FileType::from_extension(&cli.input).with_context(|| {
            format!(
                "Cannot tell the file type of {:?}; pass --file-type docx|pdf",
                cli.input
            )
        })?,
    };

    let buffer = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {:?}", cli.input))?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Run one job ──────────────────────────────────────────────────────
    let jobs = Arc::new(InMemoryJobStore::default());
    let pipeline = Pipeline::new(
        config,
        jobs.clone(),
        Arc::new(FsArtifactStore::new(&cli.output_dir)),
    )
    .context("Invalid configuration")?;

    let job_id = JobId::new();
    let meta = JobMeta::new(&cli.program, &cli.subject, &cli.chapter);
    jobs.insert(Job::new(job_id.clone(), meta.clone(), file_type));

    let start = Instant::now();
    pipeline
        .run_pipeline(&job_id, &buffer, file_type, &meta)
        .await
        .with_context(|| format!("Job {job_id} failed"))?;

    let job = jobs
        .get(&job_id)
        .context("Job record disappeared from the store")?;
    if !cli.quiet {
        eprintln!(
            "{}  job {}  {:.1}s",
            green("✔"),
            job_id,
            start.elapsed().as_secs_f64()
        );
        if let Some(ref pdf) = job.pdf_location {
            eprintln!("   PDF   →  {}", bold(pdf));
        }
        if let Some(ref docx) = job.docx_location {
            eprintln!("   DOCX  →  {}", bold(docx));
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .chunk_size(cli.chunk_size)
        .max_chunk_depth(cli.max_chunk_depth)
        .fallback_models(cli.fallback_models.clone())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .compile_timeout_secs(cli.compile_timeout)
        .latex_program(&cli.latex_program)
        .pandoc_program(&cli.pandoc_program)
        .quota_fallback(cli.quota_fallback)
        .keep_scratch(cli.keep_scratch);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.omml_stylesheet {
        builder = builder.omml_stylesheet(path);
    }
    if let Some(ref command) = cli.ocr_command {
        let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            anyhow::bail!("--ocr-command must not be empty");
        }
        builder = builder.ocr_command(argv);
    }
    if !cli.watermarks.is_empty() {
        builder = builder.watermark_patterns(cli.watermarks.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
