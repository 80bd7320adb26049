//! The pipeline driver: runs one job through every stage and its status
//! lifecycle.
//!
//! ```text
//! preflight ──▶ extracting ──▶ generating ──▶ compiling ──▶ ready
//!     │             │              │              │
//!     └─────────────┴──────────────┴──────────────┴──────▶ failed
//! ```
//!
//! Stages run strictly in sequence within a job. Independent jobs share a
//! [`Pipeline`] (it is cheap to clone) and run concurrently; their only
//! shared state is the job store, where each record is addressed by id.

use crate::config::PipelineConfig;
use crate::error::{ConfigurationError, PipelineError};
use crate::job::{FileType, JobId, JobLifecycle, JobMeta, JobStatus, JobUpdate};
use crate::pipeline::chunk::ChunkPlanner;
use crate::pipeline::compile::DocumentCompiler;
use crate::pipeline::extract::ExtractionEngine;
use crate::pipeline::latex::LatexRenderer;
use crate::pipeline::llm::{CompletionClient, EdgequakeClient, GenerationOrchestrator};
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use crate::store::{ArtifactStore, JobStore};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Artifact names under the job's id in the [`ArtifactStore`].
pub const PDF_ARTIFACT: &str = "manual.pdf";
pub const DOCX_ARTIFACT: &str = "manual.docx";

/// Runs jobs end to end.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use worksheet_manual::{FileType, FsArtifactStore, InMemoryJobStore, Job, JobId, JobMeta};
/// use worksheet_manual::{Pipeline, PipelineConfig};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let jobs = Arc::new(InMemoryJobStore::default());
/// let pipeline = Pipeline::new(
///     PipelineConfig::default(),
///     jobs.clone(),
///     Arc::new(FsArtifactStore::new("out")),
/// )?;
///
/// let id = JobId::new();
/// let meta = JobMeta::new("JEE", "Physics", "Kinematics");
/// jobs.insert(Job::new(id.clone(), meta.clone(), FileType::Docx));
///
/// let buffer = std::fs::read("worksheet.docx")?;
/// pipeline.spawn(id.clone(), buffer, FileType::Docx, meta).await??;
/// println!("{:?}", jobs.get(&id).map(|j| j.status));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    jobs: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    extraction: ExtractionEngine,
    compiler: DocumentCompiler,
    renderer: LatexRenderer,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("extraction", &self.extraction)
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        jobs: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ConfigurationError> {
        let extraction = ExtractionEngine::new(&config)?;
        let compiler = DocumentCompiler::new(&config);
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Ok(Self {
            config: Arc::new(config),
            jobs,
            artifacts,
            extraction,
            compiler,
            renderer: LatexRenderer::new(),
            progress,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `run_pipeline` on the runtime and return immediately.
    pub fn spawn(
        &self,
        job_id: JobId,
        buffer: Vec<u8>,
        file_type: FileType,
        meta: JobMeta,
    ) -> JoinHandle<Result<(), PipelineError>> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline
                .run_pipeline(&job_id, &buffer, file_type, &meta)
                .await
        })
    }

    /// Run one admitted job (already persisted in `extracting`) to `ready`
    /// or `failed`.
    ///
    /// Results are observable through the job record. On `Err` the record
    /// has already been moved to `failed`; the error is returned for the
    /// caller's logs only.
    pub async fn run_pipeline(
        &self,
        job_id: &JobId,
        buffer: &[u8],
        file_type: FileType,
        meta: &JobMeta,
    ) -> Result<(), PipelineError> {
        let span = info_span!("job", job_id = %job_id);
        self.run_job(job_id, buffer, file_type, meta)
            .instrument(span)
            .await
    }

    async fn run_job(
        &self,
        job_id: &JobId,
        buffer: &[u8],
        file_type: FileType,
        meta: &JobMeta,
    ) -> Result<(), PipelineError> {
        let start = Instant::now();
        let mut lifecycle = JobLifecycle::new(job_id.clone(), self.jobs.as_ref());

        let result = self
            .stages(&mut lifecycle, job_id, buffer, file_type, meta)
            .await;
        match result {
            Ok(()) => {
                info!("job ready in {:.1}s", start.elapsed().as_secs_f64());
                self.progress
                    .on_job_finished(job_id, JobStatus::Ready, None);
                Ok(())
            }
            Err(e) => {
                error!(job_id = %job_id, stage = %lifecycle.status(), "job failed: {}", e);
                if let Err(store_err) = lifecycle.fail().await {
                    error!(job_id = %job_id, "could not record failure: {}", store_err);
                }
                self.progress
                    .on_job_finished(job_id, lifecycle.status(), Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn stages(
        &self,
        lifecycle: &mut JobLifecycle<'_>,
        job_id: &JobId,
        buffer: &[u8],
        file_type: FileType,
        meta: &JobMeta,
    ) -> Result<(), PipelineError> {
        let client = self.preflight(file_type)?;

        // ── Extraction ───────────────────────────────────────────────────
        self.progress.on_stage_start(job_id, Stage::Extraction);
        let text = self.extraction.extract_text(buffer, file_type).await?;
        self.progress.on_stage_complete(
            job_id,
            Stage::Extraction,
            &format!("{} chars", text.len()),
        );
        lifecycle
            .advance(JobUpdate::Generating {
                extracted_text: text.clone(),
            })
            .await?;

        // ── Generation ───────────────────────────────────────────────────
        self.progress.on_stage_start(job_id, Stage::Generation);
        let chunks = ChunkPlanner::new(self.config.chunk_size).plan_chunks(&text);
        info!("planned {} chunk(s)", chunks.len());
        let outcome = GenerationOrchestrator::new(client, &self.config)
            .generate(&chunks, &self.config.model, meta, job_id)
            .await?;
        if outcome.fallback {
            warn!("manual is a quota fallback placeholder");
        }
        self.progress.on_stage_complete(
            job_id,
            Stage::Generation,
            &format!(
                "{} question(s), {} call(s)",
                outcome.question_count, outcome.calls
            ),
        );
        let manual_text = outcome.text;
        lifecycle
            .advance(JobUpdate::Compiling {
                manual_text: manual_text.clone(),
            })
            .await?;

        // ── Compilation ──────────────────────────────────────────────────
        self.progress.on_stage_start(job_id, Stage::Compilation);
        let header = self
            .config
            .header_text
            .clone()
            .unwrap_or_else(|| meta.header_text());
        let document = self.renderer.render(&manual_text, &header, job_id);
        let pdf = self.compiler.compile_to_pdf(&document).await?;
        let docx = self
            .compiler
            .compile_to_docx(&manual_text, &header, job_id)
            .await?;

        let pdf_location = self.artifacts.put(job_id, PDF_ARTIFACT, pdf).await?;
        let docx_location = self.artifacts.put(job_id, DOCX_ARTIFACT, docx).await?;
        self.progress
            .on_stage_complete(job_id, Stage::Compilation, &pdf_location);

        lifecycle
            .advance(JobUpdate::Ready {
                pdf_location,
                docx_location,
            })
            .await
    }

    /// Check external tools and resolve the completion client before any
    /// work starts. Missing tools are reported together.
    pub fn preflight(
        &self,
        file_type: FileType,
    ) -> Result<Arc<dyn CompletionClient>, ConfigurationError> {
        // pandoc also reads DOCX input, so it is required for both file types
        let required = [
            self.config.latex_program.as_str(),
            self.config.pandoc_program.as_str(),
        ];
        debug!("preflight for {} input", file_type);

        let missing: Vec<String> = required
            .into_iter()
            .filter(|program| which::which(program).is_err())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigurationError::MissingTools { tools: missing });
        }

        resolve_client(&self.config)
    }
}

/// Instantiate a named provider for `model`.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ConfigurationError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConfigurationError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the completion client, from most-specific to least-specific:
///
/// 1. **Injected client** (`config.completion_client`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **`EDGEQUAKE_LLM_PROVIDER`**, with `EDGEQUAKE_MODEL` when set.
/// 4. **`OPENAI_API_KEY`** present: OpenAI with `config.model`.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`]. The
///    detected provider cannot serve fallback models.
pub fn resolve_client(
    config: &PipelineConfig,
) -> Result<Arc<dyn CompletionClient>, ConfigurationError> {
    if let Some(ref client) = config.completion_client {
        return Ok(Arc::clone(client));
    }

    let timeout = config.api_timeout();
    let named = |name: &str, model: &str| -> Result<Arc<dyn CompletionClient>, ConfigurationError> {
        let provider = create_provider(name, model)?;
        Ok(Arc::new(EdgequakeClient::new(
            Some(name.to_string()),
            model,
            provider,
            timeout,
        )))
    };

    if let Some(ref name) = config.provider_name {
        return named(name, &config.model);
    }

    if let Ok(prov) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !prov.is_empty() {
            let model = std::env::var("EDGEQUAKE_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| config.model.clone());
            return named(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return named("openai", &config.model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ConfigurationError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(EdgequakeClient::new(
        None,
        &config.model,
        llm_provider,
        timeout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::pipeline::llm::CompletionRequest;
    use crate::store::{FsArtifactStore, InMemoryJobStore};
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl CompletionClient for Never {
        async fn complete(&self, _: CompletionRequest<'_>) -> Result<String, CompletionError> {
            Err(CompletionError::Api("unused".into()))
        }
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(InMemoryJobStore::default()),
            Arc::new(FsArtifactStore::new(std::env::temp_dir())),
        )
        .unwrap()
    }

    #[test]
    fn injected_client_wins() {
        let client: Arc<dyn CompletionClient> = Arc::new(Never);
        let config = PipelineConfig::builder()
            .completion_client(Arc::clone(&client))
            .build()
            .unwrap();
        let resolved = resolve_client(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &client));
    }

    #[test]
    fn preflight_lists_every_missing_tool() {
        let p = pipeline(
            PipelineConfig::builder()
                .latex_program("no-such-latex")
                .pandoc_program("no-such-pandoc")
                .completion_client(Arc::new(Never))
                .build()
                .unwrap(),
        );
        match p.preflight(FileType::Docx) {
            Err(ConfigurationError::MissingTools { tools }) => {
                assert_eq!(tools, vec!["no-such-latex", "no-such-pandoc"]);
            }
            Err(other) => panic!("unexpected: {other}"),
            Ok(_) => panic!("expected missing tools"),
        }
    }
}
