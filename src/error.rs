//! Error types for the worksheet-manual library.
//!
//! Errors come in two tiers:
//!
//! * **Stage errors**: [`ExtractionError`], [`GenerationError`],
//!   [`CompileError`] and [`ConfigurationError`]. Any of these ends the job:
//!   the pipeline catches them at its boundary, logs them with the job id and
//!   moves the job to `failed`. They are wrapped by [`PipelineError`].
//!
//! * **Sub-path errors**: [`TransformError`] and [`OcrError`]. These belong
//!   to optional enrichment steps (equation sub-extraction, OCR). They are
//!   logged at `warn!` and discarded; they never fail a stage.
//!
//! [`CompletionError`] sits between the two: the generation orchestrator
//! inspects its category (model missing, quota exhausted) to decide between
//! a fallback model, a placeholder manual, or a [`GenerationError`].

use crate::job::{FileType, JobId, JobStatus};
use thiserror::Error;

/// Any error that ends a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The job store or artifact store rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A status change that the job lifecycle does not allow.
    #[error("Invalid status transition for job {job_id}: {from} → {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

// ── Extraction ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Every baseline and enrichment path returned empty text.
    #[error("No text could be extracted from the {file_type} document (tried: {attempts})")]
    AllPathsEmpty {
        file_type: FileType,
        attempts: String,
    },

    /// The input buffer could not be written to the scratch directory.
    #[error("Failed to stage input document: {0}")]
    Staging(#[source] std::io::Error),
}

// ── Generation ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The primary model and every fallback model were reported missing.
    #[error("No usable model: every candidate was reported as not found ({})", tried.join(", "))]
    ModelsExhausted { tried: Vec<String> },

    /// Quota or rate limit hit and the placeholder fallback is disabled.
    #[error("Quota exceeded for model '{model}': {detail}\nEnable quota fallback to emit a placeholder manual instead.")]
    QuotaExceeded { model: String, detail: String },

    /// The completion call timed out.
    #[error("Completion call to '{model}' timed out after {secs}s")]
    Timeout { model: String, secs: u64 },

    /// Any other non-recoverable API failure.
    #[error("Completion API error from '{model}': {detail}")]
    Api { model: String, detail: String },
}

/// Failure categories surfaced by a [`crate::pipeline::llm::CompletionClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("model '{model}' not found")]
    ModelNotFound { model: String },

    #[error("quota or rate limit exceeded: {detail}")]
    QuotaExceeded { detail: String },

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    Api(String),
}

impl CompletionError {
    /// Classify a provider error message into a completion failure category.
    ///
    /// Providers report failures as free-form strings, so the match is on
    /// the well-known fragments OpenAI, Anthropic and Gemini use.
    pub fn classify(message: &str, model: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("model_not_found")
            || (lower.contains("does not exist") && lower.contains("model"))
            || (lower.contains("model") && lower.contains("not found"))
            || (lower.contains("404") && lower.contains("model"))
        {
            return CompletionError::ModelNotFound {
                model: model.to_string(),
            };
        }

        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("ratelimit")
            || lower.contains("quota")
            || lower.contains("resource_exhausted")
            || lower.contains("too many requests")
        {
            return CompletionError::QuotaExceeded {
                detail: message.to_string(),
            };
        }

        CompletionError::Api(message.to_string())
    }

    /// Lift into a stage error for the given model.
    pub fn into_generation_error(self, model: &str) -> GenerationError {
        match self {
            CompletionError::ModelNotFound { model } => {
                GenerationError::ModelsExhausted { tried: vec![model] }
            }
            CompletionError::QuotaExceeded { detail } => GenerationError::QuotaExceeded {
                model: model.to_string(),
                detail,
            },
            CompletionError::Timeout { secs } => GenerationError::Timeout {
                model: model.to_string(),
                secs,
            },
            CompletionError::Api(detail) => GenerationError::Api {
                model: model.to_string(),
                detail,
            },
        }
    }
}

// ── Compilation ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompileError {
    /// The external compiler exited non-zero. `log_tail` holds the last
    /// lines of its log (or stderr when no log was written).
    #[error("{engine} failed ({status}). Last log lines:\n{log_tail}")]
    Failed {
        engine: String,
        status: String,
        log_tail: String,
    },

    /// The compiler exited zero but the expected artifact is missing.
    #[error("{engine} finished but did not produce '{artifact}'")]
    MissingArtifact { engine: String, artifact: String },

    #[error("{engine} timed out after {secs}s")]
    Timeout { engine: String, secs: u64 },

    #[error("Could not launch {engine}: {detail}")]
    Spawn { engine: String, detail: String },

    #[error("Scratch directory I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Both word-processor conversion paths failed.
    #[error("DOCX conversion failed on both paths.\nPrimary: {primary}\nFallback: {fallback}")]
    BothPathsFailed {
        primary: Box<CompileError>,
        fallback: Box<CompileError>,
    },
}

// ── Configuration ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No completion provider could be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Required external programs are not on PATH.
    #[error("Required external tools not found: {}\nInstall them or point the matching --*-program option at them.", tools.join(", "))]
    MissingTools { tools: Vec<String> },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ── Stores ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job {0} not found in store")]
    NotFound(JobId),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

// ── Sub-path errors (never fatal) ────────────────────────────────────────

/// Failure of one equation transform engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The engine cannot serve this process at all (e.g. stylesheet version
    /// it does not implement). Sticky: the engine is skipped from then on.
    #[error("engine unsupported: {0}")]
    Unsupported(String),

    /// The engine could not run (missing program, missing stylesheet, timeout).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but rejected this particular equation.
    #[error("transform failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR command not configured")]
    NotConfigured,

    #[error("OCR command failed: {0}")]
    Command(String),

    #[error("OCR output had no JSON line")]
    EmptyOutput,

    #[error("OCR output was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
