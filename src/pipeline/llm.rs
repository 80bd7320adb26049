//! Manual generation: prompt each chunk, validate, split and retry.
//!
//! The completion API is reached through [`CompletionClient`], a fixed
//! one-method interface. [`EdgequakeClient`] is the production adapter over
//! `edgequake-llm` providers; tests inject scripted clients.
//!
//! ## Adaptive split
//!
//! A chunk whose cleaned output holds fewer question markers than its input
//! (but more than zero) is halved and each half regenerated one level
//! deeper. Depth is an explicit parameter capped by `max_chunk_depth`; at
//! the cap the output is kept as-is, so a chunk costs at most
//! `2^(max_chunk_depth + 1) - 1` calls.

use crate::config::PipelineConfig;
use crate::error::{CompletionError, GenerationError};
use crate::job::{JobId, JobMeta};
use crate::pipeline::chunk::{count_questions, split_in_half, Chunk};
use crate::pipeline::postprocess::{clean_response, merge_outputs};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{build_manual_prompt, ANSWER_KEY_BANNER, MANUAL_SYSTEM_PROMPT, MANUAL_TITLE};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Text-completion API.
///
/// Implementations must report a missing model as
/// [`CompletionError::ModelNotFound`] and rate or quota exhaustion as
/// [`CompletionError::QuotaExceeded`]; the orchestrator's fallbacks key off
/// those two variants.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError>;
}

/// [`CompletionClient`] over `edgequake-llm` providers.
///
/// An edgequake provider is bound to one model, so fallback models get
/// their own provider instance, created on first use and cached.
pub struct EdgequakeClient {
    provider_name: Option<String>,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
    timeout: Duration,
}

impl EdgequakeClient {
    /// `provider` serves `model`. Without a `provider_name` no other model
    /// can be reached.
    pub fn new(
        provider_name: Option<String>,
        model: &str,
        provider: Arc<dyn LLMProvider>,
        timeout: Duration,
    ) -> Self {
        let mut providers = HashMap::new();
        providers.insert(model.to_string(), provider);
        Self {
            provider_name,
            providers: Mutex::new(providers),
            timeout,
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, CompletionError> {
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| CompletionError::Api("provider cache poisoned".to_string()))?;
        if let Some(p) = providers.get(model) {
            return Ok(Arc::clone(p));
        }
        let name = self.provider_name.as_deref().ok_or_else(|| {
            CompletionError::Api(format!(
                "model '{model}' needs a named provider; the auto-detected one only serves its own model"
            ))
        })?;
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| CompletionError::classify(&e.to_string(), model))?;
        providers.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

#[async_trait]
impl CompletionClient for EdgequakeClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        let provider = self.provider_for(request.model)?;
        let messages = vec![
            ChatMessage::system(request.system),
            ChatMessage::user(request.prompt),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| CompletionError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| CompletionError::classify(&e.to_string(), request.model))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Merged manual text plus bookkeeping for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub text: String,
    /// Question markers in `text`.
    pub question_count: usize,
    /// Completion calls issued, splits included.
    pub calls: usize,
    /// Deepest split level reached.
    pub max_depth_reached: usize,
    /// The placeholder manual was produced after quota exhaustion.
    pub fallback: bool,
}

/// Per-job generation state: the model chain and counters.
struct JobContext {
    job_id: JobId,
    meta: JobMeta,
    models: Vec<String>,
    active_model: usize,
    chunk_index: usize,
    total_chunks: usize,
    calls: usize,
    max_depth_reached: usize,
}

/// Drives the completion API chunk by chunk.
pub struct GenerationOrchestrator {
    client: Arc<dyn CompletionClient>,
    fallback_models: Vec<String>,
    max_depth: usize,
    temperature: f32,
    max_tokens: usize,
    quota_fallback: bool,
    progress: ProgressCallback,
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn CompletionClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            fallback_models: config.fallback_models.clone(),
            max_depth: config.max_chunk_depth,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            quota_fallback: config.quota_fallback,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Generate and merge the manual for `chunks`, in order and sequentially.
    pub async fn generate(
        &self,
        chunks: &[Chunk],
        model: &str,
        meta: &JobMeta,
        job_id: &JobId,
    ) -> Result<GenerationOutcome, GenerationError> {
        let mut models = vec![model.to_string()];
        models.extend(
            self.fallback_models
                .iter()
                .filter(|m| m.as_str() != model)
                .cloned(),
        );
        let mut ctx = JobContext {
            job_id: job_id.clone(),
            meta: meta.clone(),
            models,
            active_model: 0,
            chunk_index: 0,
            total_chunks: chunks.len(),
            calls: 0,
            max_depth_reached: 0,
        };

        match self.generate_all(&mut ctx, chunks).await {
            Ok(text) => {
                let question_count = count_questions(&text);
                info!(
                    "generated {} question(s) from {} chunk(s) in {} call(s)",
                    question_count,
                    chunks.len(),
                    ctx.calls
                );
                Ok(GenerationOutcome {
                    text,
                    question_count,
                    calls: ctx.calls,
                    max_depth_reached: ctx.max_depth_reached,
                    fallback: false,
                })
            }
            Err(GenerationError::QuotaExceeded { model, detail }) if self.quota_fallback => {
                warn!(
                    "quota exceeded on '{}' ({}); emitting placeholder manual",
                    model, detail
                );
                let text = fallback_manual(meta);
                Ok(GenerationOutcome {
                    question_count: count_questions(&text),
                    text,
                    calls: ctx.calls,
                    max_depth_reached: ctx.max_depth_reached,
                    fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn generate_all(
        &self,
        ctx: &mut JobContext,
        chunks: &[Chunk],
    ) -> Result<String, GenerationError> {
        let mut outputs = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            ctx.chunk_index = i;
            let text = self.generate_chunk(ctx, chunk.clone(), 0).await?;
            let questions = count_questions(&text);
            debug!(
                "chunk {}/{} ({}): {} question(s)",
                i + 1,
                chunks.len(),
                chunk.label(),
                questions
            );
            self.progress
                .on_chunk_complete(&ctx.job_id, i, chunks.len(), questions);
            outputs.push(text);
        }
        Ok(merge_outputs(&outputs))
    }

    /// One chunk at `depth`. Boxed because it recurses on split halves.
    fn generate_chunk<'a>(
        &'a self,
        ctx: &'a mut JobContext,
        chunk: Chunk,
        depth: usize,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        async move {
            ctx.max_depth_reached = ctx.max_depth_reached.max(depth);
            self.progress
                .on_chunk_start(&ctx.job_id, ctx.chunk_index, ctx.total_chunks, depth);

            let source = chunk.text();
            let prompt = build_manual_prompt(&ctx.meta, &source, chunk.include_header);
            let raw = self.complete(ctx, &prompt).await?;
            let cleaned = clean_response(&raw);

            let expected = count_questions(&source);
            let actual = count_questions(&cleaned);
            if expected > 0 && actual > 0 && actual < expected {
                if depth < self.max_depth && chunk.len() > 1 {
                    warn!(
                        "{}: {} of {} questions at depth {}, splitting",
                        chunk.label(),
                        actual,
                        expected,
                        depth
                    );
                    let mut outputs = Vec::with_capacity(2);
                    for half in split_in_half(&chunk) {
                        outputs.push(self.generate_chunk(ctx, half, depth + 1).await?);
                    }
                    return Ok(merge_outputs(&outputs));
                }
                warn!(
                    "{}: keeping {} of {} questions at depth {}",
                    chunk.label(),
                    actual,
                    expected,
                    depth
                );
            }
            Ok(cleaned)
        }
        .boxed()
    }

    /// One call, walking the fallback model list on "model not found".
    /// A model found missing stays skipped for the rest of the job.
    async fn complete(&self, ctx: &mut JobContext, prompt: &str) -> Result<String, GenerationError> {
        loop {
            let model = ctx.models[ctx.active_model].clone();
            ctx.calls += 1;
            let request = CompletionRequest {
                system: MANUAL_SYSTEM_PROMPT,
                prompt,
                model: &model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };
            match self.client.complete(request).await {
                Ok(text) => return Ok(text),
                Err(CompletionError::ModelNotFound { .. })
                    if ctx.active_model + 1 < ctx.models.len() =>
                {
                    ctx.active_model += 1;
                    warn!(
                        "model '{}' not found, falling back to '{}'",
                        model, ctx.models[ctx.active_model]
                    );
                }
                Err(CompletionError::ModelNotFound { .. }) => {
                    return Err(GenerationError::ModelsExhausted {
                        tried: ctx.models.clone(),
                    });
                }
                Err(e) => return Err(e.into_generation_error(&model)),
            }
        }
    }
}

/// Single-question placeholder manual used when quota fallback is enabled.
/// The first line marks it as such.
pub fn fallback_manual(meta: &JobMeta) -> String {
    let chapter = if meta.chapter.trim().is_empty() {
        "this worksheet"
    } else {
        meta.chapter.trim()
    };
    format!(
        "FALLBACK: placeholder manual, the completion service quota was exhausted.\n\
         {MANUAL_TITLE}: {program} {subject}\n\
         Worksheet: {chapter}\n\
         Syllabus Topics Covered: {chapter}\n\
         {ANSWER_KEY_BANNER}\n\
         \n\
         1. Review question for {chapter}.\n\
         Key: Not available\n\
         Solution:\n\
         • Detailed solutions could not be generated for this job.\n\
         • The completion service reported that its quota was exhausted.\n\
         • The worksheet itself was extracted successfully.\n\
         • Submit the worksheet again once the quota resets.\n\
         • The regenerated manual will contain every question.",
        program = meta.program.trim(),
        subject = meta.subject.trim(),
    )
}
