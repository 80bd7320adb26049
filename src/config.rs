//! Configuration for the worksheet → manual pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. One config is shared by every job a
//! [`crate::Pipeline`] runs, so it is cheap to clone (the only heap-shared
//! members are the injected client and progress callback).

use crate::error::ConfigurationError;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::normalize::TextNormalizer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use worksheet_manual::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_size(3)
///     .model("gpt-4.1-mini")
///     .fallback_models(vec!["gpt-4.1-nano".into()])
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 3);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Question blocks per generation chunk. Default: 4.
    pub chunk_size: usize,

    /// How many times a short chunk may be halved and regenerated. Default: 2.
    ///
    /// At depth `max_chunk_depth` the orchestrator keeps whatever the model
    /// returned, so the worst case is `2^(max_chunk_depth + 1) - 1` calls
    /// per chunk (7 at the default depth).
    pub max_chunk_depth: usize,

    /// Primary model identifier. Default: `gpt-4.1-mini`.
    pub model: String,

    /// Models tried in order when the API reports the current one missing.
    pub fallback_models: Vec<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `completion_client`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-built completion client. Takes precedence over `provider_name`.
    pub completion_client: Option<Arc<dyn CompletionClient>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 8192.
    pub max_tokens: usize,

    /// Per-completion timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Document-to-markdown converter and equation transform timeout. Default: 30.
    pub converter_timeout_secs: u64,

    /// OCR equation recogniser timeout. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Page-layout compiler and word-processor converter timeout. Default: 120.
    pub compile_timeout_secs: u64,

    /// Document converter program (DOCX → markdown, TeX → DOCX). Default: `pandoc`.
    pub pandoc_program: String,

    /// Page-layout compiler. Default: `pdflatex`.
    pub latex_program: String,

    /// Subprocess XSLT engine for equations. Default: `xsltproc`.
    pub xslt_program: String,

    /// OMML → MathML XSLT stylesheet (e.g. Office's `OMML2MML.XSL`).
    pub omml_stylesheet: Option<PathBuf>,

    /// OCR equation recogniser, argv style. The PDF path is appended.
    /// Empty disables OCR. Default: `["pix2tex_ocr"]`.
    pub ocr_command: Vec<String>,

    /// Fallback PDF text extractor. Default: `pdftotext`.
    pub pdftotext_program: String,

    /// Path to libpdfium. Falls back to `PDFIUM_LIB_PATH`, then the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Emit a placeholder manual instead of failing on quota errors. Default: false.
    pub quota_fallback: bool,

    /// Keep compiler scratch directories for debugging. Default: false.
    pub keep_scratch: bool,

    /// Extra watermark line patterns, matched against whole trimmed lines.
    pub watermark_patterns: Vec<String>,

    /// Running header text. Defaults to the job's program | subject | chapter.
    pub header_text: Option<String>,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4,
            max_chunk_depth: 2,
            model: "gpt-4.1-mini".to_string(),
            fallback_models: Vec::new(),
            provider_name: None,
            completion_client: None,
            temperature: 0.2,
            max_tokens: 8192,
            api_timeout_secs: 60,
            converter_timeout_secs: 30,
            ocr_timeout_secs: 120,
            compile_timeout_secs: 120,
            pandoc_program: "pandoc".to_string(),
            latex_program: "pdflatex".to_string(),
            xslt_program: "xsltproc".to_string(),
            omml_stylesheet: None,
            ocr_command: vec!["pix2tex_ocr".to_string()],
            pdftotext_program: "pdftotext".to_string(),
            pdfium_lib_path: None,
            quota_fallback: false,
            keep_scratch: false,
            watermark_patterns: Vec::new(),
            header_text: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_size", &self.chunk_size)
            .field("max_chunk_depth", &self.max_chunk_depth)
            .field("model", &self.model)
            .field("fallback_models", &self.fallback_models)
            .field("provider_name", &self.provider_name)
            .field(
                "completion_client",
                &self
                    .completion_client
                    .as_ref()
                    .map(|_| "<dyn CompletionClient>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pandoc_program", &self.pandoc_program)
            .field("latex_program", &self.latex_program)
            .field("omml_stylesheet", &self.omml_stylesheet)
            .field("ocr_command", &self.ocr_command)
            .field("quota_fallback", &self.quota_fallback)
            .field("keep_scratch", &self.keep_scratch)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    /// Normaliser carrying the extra watermark patterns.
    pub fn normalizer(&self) -> Result<TextNormalizer, ConfigurationError> {
        TextNormalizer::with_watermarks(&self.watermark_patterns)
            .map_err(|e| ConfigurationError::Invalid(format!("watermark pattern: {e}")))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn max_chunk_depth(mut self, depth: usize) -> Self {
        self.config.max_chunk_depth = depth.min(8);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn fallback_models(mut self, models: Vec<String>) -> Self {
        self.config.fallback_models = models;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.completion_client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(256);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs.max(1);
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs.max(1);
        self
    }

    pub fn pandoc_program(mut self, program: impl Into<String>) -> Self {
        self.config.pandoc_program = program.into();
        self
    }

    pub fn latex_program(mut self, program: impl Into<String>) -> Self {
        self.config.latex_program = program.into();
        self
    }

    pub fn xslt_program(mut self, program: impl Into<String>) -> Self {
        self.config.xslt_program = program.into();
        self
    }

    pub fn omml_stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.omml_stylesheet = Some(path.into());
        self
    }

    pub fn ocr_command(mut self, argv: Vec<String>) -> Self {
        self.config.ocr_command = argv;
        self
    }

    pub fn pdftotext_program(mut self, program: impl Into<String>) -> Self {
        self.config.pdftotext_program = program.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn quota_fallback(mut self, v: bool) -> Self {
        self.config.quota_fallback = v;
        self
    }

    pub fn keep_scratch(mut self, v: bool) -> Self {
        self.config.keep_scratch = v;
        self
    }

    pub fn watermark_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.watermark_patterns = patterns;
        self
    }

    pub fn header_text(mut self, text: impl Into<String>) -> Self {
        self.config.header_text = Some(text.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigurationError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(ConfigurationError::Invalid(
                "chunk size must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ConfigurationError::Invalid("model must not be empty".into()));
        }
        if c.fallback_models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigurationError::Invalid(
                "fallback model names must not be empty".into(),
            ));
        }
        c.normalizer()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.chunk_size, 4);
        assert_eq!(c.max_chunk_depth, 2);
        assert_eq!(c.api_timeout(), Duration::from_secs(60));
        assert_eq!(c.converter_timeout(), Duration::from_secs(30));
        assert_eq!(c.compile_timeout(), Duration::from_secs(120));
        assert!(!c.quota_fallback);
        assert_eq!(c.ocr_command, vec!["pix2tex_ocr".to_string()]);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = PipelineConfig::builder().chunk_size(0).build().unwrap_err();
        assert!(err.to_string().contains("chunk size"));
    }

    #[test]
    fn bad_watermark_pattern_is_rejected() {
        let err = PipelineConfig::builder()
            .watermark_patterns(vec!["(open".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn setters_clamp() {
        let c = PipelineConfig::builder()
            .temperature(9.0)
            .max_chunk_depth(100)
            .api_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_chunk_depth, 8);
        assert_eq!(c.api_timeout_secs, 1);
    }

    #[test]
    fn debug_hides_client() {
        let s = format!("{:?}", PipelineConfig::default());
        assert!(s.contains("completion_client: None"));
    }
}
