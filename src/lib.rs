//! # worksheet-manual
//!
//! Turn question worksheets (DOCX or PDF) into answer-key manuals: every
//! question reproduced with its options, the key, and a short bulleted
//! solution written by an LLM, typeset to PDF and DOCX.
//!
//! ## Pipeline Overview
//!
//! ```text
//! worksheet
//!  │
//!  ├─ 1. Extract    pandoc / docx XML / pdfium / pdftotext, plus equations
//!  ├─ 2. Normalise  unicode folding, watermark removal (idempotent)
//!  ├─ 3. Chunk      question blocks grouped CHUNK_SIZE at a time
//!  ├─ 4. Generate   one completion per chunk, split and retried when short
//!  ├─ 5. Render     manual text → LaTeX with math-aware escaping
//!  └─ 6. Compile    pdflatex → PDF, pandoc → DOCX
//! ```
//!
//! Each job moves `extracting → generating → compiling → ready`, or to
//! `failed` from any of those. Results are observed only through the job
//! record in the [`JobStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use worksheet_manual::{FileType, FsArtifactStore, InMemoryJobStore, Job, JobId, JobMeta};
//! use worksheet_manual::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let jobs = Arc::new(InMemoryJobStore::default());
//!     let pipeline = Pipeline::new(
//!         PipelineConfig::default(),
//!         jobs.clone(),
//!         Arc::new(FsArtifactStore::new("manuals")),
//!     )?;
//!
//!     let id = JobId::new();
//!     let meta = JobMeta::new("JEE", "Physics", "Kinematics");
//!     jobs.insert(Job::new(id.clone(), meta.clone(), FileType::Pdf));
//!
//!     let buffer = std::fs::read("worksheet.pdf")?;
//!     pipeline.run_pipeline(&id, &buffer, FileType::Pdf, &meta).await?;
//!     println!("{:?}", jobs.get(&id).and_then(|j| j.pdf_location));
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Needed for | Required |
//! |------|------------|----------|
//! | `pdflatex` | PDF output | yes |
//! | `pandoc` | DOCX input and output | yes |
//! | libpdfium | PDF text layer | no (falls back to `pdftotext`) |
//! | `pdftotext` | PDF text fallback | no |
//! | `xsltproc` + OMML stylesheet | equation fallback | no |
//! | `pix2tex_ocr` | PDF equation OCR | no |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `manualgen` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod math;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{
    CompileError, CompletionError, ConfigurationError, ExtractionError, GenerationError,
    PipelineError, StoreError,
};
pub use job::{FileType, Job, JobId, JobLifecycle, JobMeta, JobStatus, JobUpdate};
pub use pipeline::chunk::{Chunk, ChunkPlanner, QuestionBlock};
pub use pipeline::compile::DocumentCompiler;
pub use pipeline::extract::ExtractionEngine;
pub use pipeline::latex::LatexRenderer;
pub use pipeline::llm::{
    CompletionClient, CompletionRequest, EdgequakeClient, GenerationOrchestrator,
    GenerationOutcome,
};
pub use pipeline::normalize::{normalize, TextNormalizer};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use run::{resolve_client, Pipeline};
pub use store::{ArtifactStore, FsArtifactStore, InMemoryJobStore, JobStore};
