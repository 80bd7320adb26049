//! Source-text extraction.
//!
//! [`ExtractionEngine::extract_text`] turns an input buffer into normalised
//! worksheet text. Each file type has an ordered list of baseline strategies
//! (first non-empty result wins) and one optional enrichment pass:
//!
//! | File type | Baseline strategies | Enrichment |
//! |-----------|---------------------|------------|
//! | DOCX | pandoc markdown, native paragraph text | equations from OMML |
//! | PDF | pdfium text layer, `pdftotext` | OCR equation recogniser |
//!
//! Enrichment failures are logged and dropped. The call only fails when the
//! baseline and the enrichment together produced nothing.

pub mod docx;
pub mod equations;
pub mod mathml;
pub mod omml;
pub mod pdf;
pub mod xml;

use crate::config::PipelineConfig;
use crate::error::{ConfigurationError, ExtractionError};
use crate::job::FileType;
use crate::pipeline::normalize::TextNormalizer;
use crate::process::CommandError;
use equations::{equation_lines, EquationEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why one extraction path produced nothing.
#[derive(Debug, Error)]
pub enum PathFailure {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("{0}")]
    Parse(String),

    #[error("worker task failed: {0}")]
    Join(String),
}

/// One baseline text source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineStrategy {
    PandocMarkdown,
    DocxParagraphs,
    PdfiumText,
    Pdftotext,
}

impl BaselineStrategy {
    /// Candidates for a file type, in the order they are tried.
    pub fn for_file_type(file_type: FileType) -> &'static [BaselineStrategy] {
        match file_type {
            FileType::Docx => &[Self::PandocMarkdown, Self::DocxParagraphs],
            FileType::Pdf => &[Self::PdfiumText, Self::Pdftotext],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PandocMarkdown => "pandoc",
            Self::DocxParagraphs => "docx-paragraphs",
            Self::PdfiumText => "pdfium",
            Self::Pdftotext => "pdftotext",
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    pandoc_program: String,
    pdftotext_program: String,
    pdfium_lib_path: Option<PathBuf>,
    ocr_command: Vec<String>,
    converter_timeout: Duration,
    ocr_timeout: Duration,
}

/// Extraction with per-format fallbacks and a shared equation engine.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    settings: Settings,
    normalizer: TextNormalizer,
    equations: Arc<EquationEngine>,
}

impl ExtractionEngine {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigurationError> {
        let equations = EquationEngine::new(
            config.omml_stylesheet.clone(),
            &config.xslt_program,
            config.converter_timeout(),
        );
        Ok(Self {
            settings: Settings {
                pandoc_program: config.pandoc_program.clone(),
                pdftotext_program: config.pdftotext_program.clone(),
                pdfium_lib_path: config.pdfium_lib_path.clone(),
                ocr_command: config.ocr_command.clone(),
                converter_timeout: config.converter_timeout(),
                ocr_timeout: config.ocr_timeout(),
            },
            normalizer: config.normalizer()?,
            equations: Arc::new(equations),
        })
    }

    /// Replace the equation engine (e.g. to share one across pipelines).
    pub fn with_equation_engine(mut self, engine: Arc<EquationEngine>) -> Self {
        self.equations = engine;
        self
    }

    pub fn equation_engine(&self) -> &Arc<EquationEngine> {
        &self.equations
    }

    /// Normalised text for `buffer`.
    ///
    /// The buffer is staged in a scratch directory that is removed on every
    /// exit path when the guard drops.
    pub async fn extract_text(
        &self,
        buffer: &[u8],
        file_type: FileType,
    ) -> Result<String, ExtractionError> {
        let scratch = tempfile::Builder::new()
            .prefix("manual-extract-")
            .tempdir()
            .map_err(ExtractionError::Staging)?;
        let input = scratch.path().join(format!("input.{}", file_type.extension()));
        tokio::fs::write(&input, buffer)
            .await
            .map_err(ExtractionError::Staging)?;

        let mut attempts = Vec::new();
        let mut text = self
            .baseline(file_type, &input, buffer, &mut attempts)
            .await
            .unwrap_or_default();

        let enrichment = match file_type {
            FileType::Docx => self.docx_equations(buffer).await,
            FileType::Pdf => self.ocr_equations(&input).await,
        };
        if !enrichment.is_empty() {
            if !text.trim().is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&enrichment);
        }

        let normalized = self.normalizer.normalize(&text);
        if normalized.trim().is_empty() {
            return Err(ExtractionError::AllPathsEmpty {
                file_type,
                attempts: attempts.join("; "),
            });
        }
        info!(
            "extracted {} chars from {} document",
            normalized.len(),
            file_type
        );
        Ok(normalized)
    }

    /// First strategy with non-empty output. Failures are recorded in
    /// `attempts` for the final error message.
    async fn baseline(
        &self,
        file_type: FileType,
        input: &Path,
        buffer: &[u8],
        attempts: &mut Vec<String>,
    ) -> Option<String> {
        for (i, strategy) in BaselineStrategy::for_file_type(file_type).iter().enumerate() {
            match self.run_strategy(*strategy, input, buffer).await {
                Ok(text) if !text.trim().is_empty() => {
                    if i > 0 {
                        warn!("baseline text from fallback path '{}'", strategy.name());
                    } else {
                        debug!("baseline text from '{}'", strategy.name());
                    }
                    return Some(text);
                }
                Ok(_) => attempts.push(format!("{}: empty output", strategy.name())),
                Err(e) => {
                    warn!("{} extraction failed: {}", strategy.name(), e);
                    attempts.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }
        None
    }

    async fn run_strategy(
        &self,
        strategy: BaselineStrategy,
        input: &Path,
        buffer: &[u8],
    ) -> Result<String, PathFailure> {
        let s = &self.settings;
        match strategy {
            BaselineStrategy::PandocMarkdown => {
                docx::pandoc_markdown(&s.pandoc_program, input, s.converter_timeout).await
            }
            BaselineStrategy::DocxParagraphs => {
                let xml = docx::read_document_xml(buffer)?;
                docx::paragraph_text(&xml)
            }
            BaselineStrategy::PdfiumText => pdf::pdfium_text(input, s.pdfium_lib_path.clone()).await,
            BaselineStrategy::Pdftotext => {
                pdf::pdftotext(&s.pdftotext_program, input, s.converter_timeout).await
            }
        }
    }

    async fn docx_equations(&self, buffer: &[u8]) -> String {
        let xml = match docx::read_document_xml(buffer) {
            Ok(xml) => xml,
            Err(e) => {
                warn!("equation sub-extraction skipped: {}", e);
                return String::new();
            }
        };
        equation_lines(&self.equations.extract(&xml).await)
    }

    async fn ocr_equations(&self, input: &Path) -> String {
        if self.settings.ocr_command.is_empty() {
            return String::new();
        }
        match pdf::ocr_equations(&self.settings.ocr_command, input, self.settings.ocr_timeout).await
        {
            Ok(eqs) => {
                debug!("OCR recognised {} equation(s)", eqs.len());
                pdf::equation_blocks(&eqs)
            }
            Err(e) => {
                warn!("OCR equation pass skipped: {}", e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<w:document xmlns:w="urn:w" xmlns:m="urn:m"><w:body>
<w:p><w:r><w:t>1. Simplify the expression.</w:t></w:r></w:p>
<w:p><m:oMath><m:sSup><m:e><m:r><m:t>x</m:t></m:r></m:e><m:sup><m:r><m:t>2</m:t></m:r></m:sup></m:sSup></m:oMath></w:p>
<w:p><w:r><w:t>Page 1 of 3</w:t></w:r></w:p>
</w:body></w:document>"#;

    fn engine_without_tools() -> ExtractionEngine {
        let config = PipelineConfig::builder()
            .pandoc_program("definitely-missing-pandoc")
            .pdftotext_program("definitely-missing-pdftotext")
            .pdfium_lib_path("/nonexistent/libpdfium.so")
            .ocr_command(Vec::new())
            .build()
            .unwrap();
        ExtractionEngine::new(&config).unwrap()
    }

    #[test]
    fn strategy_order() {
        assert_eq!(
            BaselineStrategy::for_file_type(FileType::Docx),
            &[BaselineStrategy::PandocMarkdown, BaselineStrategy::DocxParagraphs]
        );
        assert_eq!(
            BaselineStrategy::for_file_type(FileType::Pdf)[0],
            BaselineStrategy::PdfiumText
        );
    }

    #[tokio::test]
    async fn docx_falls_back_to_native_text_and_appends_equations() {
        let engine = engine_without_tools();
        let text = engine
            .extract_text(&docx::docx_with(DOC), FileType::Docx)
            .await
            .unwrap();
        assert_eq!(text, "1. Simplify the expression.\n\n\nEquation 1: $x^2$");
    }

    #[tokio::test]
    async fn all_paths_empty_is_extraction_error() {
        let engine = engine_without_tools();
        let err = engine
            .extract_text(b"%PDF-1.4 not really", FileType::Pdf)
            .await
            .unwrap_err();
        match err {
            ExtractionError::AllPathsEmpty { file_type, attempts } => {
                assert_eq!(file_type, FileType::Pdf);
                assert!(attempts.contains("pdfium"), "{attempts}");
                assert!(attempts.contains("pdftotext"), "{attempts}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
