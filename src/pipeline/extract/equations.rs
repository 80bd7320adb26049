//! Equation sub-extraction for word-processor documents.
//!
//! Every top-level `m:oMath` element in `word/document.xml` is run through an
//! ordered list of [`EquationTransform`] engines (in-process first, then the
//! `xsltproc` subprocess) to get MathML, and the MathML is converted to inline
//! TeX by [`MathmlToLatex`].
//!
//! The engine is shared by every job in the process. It holds two pieces of
//! state that outlive a single call:
//!
//! * the stylesheet, loaded at most once behind a [`OnceCell`] so concurrent
//!   jobs share one load attempt (a failed load is cached too);
//! * a sticky per-engine flag set when an engine reports
//!   [`TransformError::Unsupported`], so it is never retried in this process.
//!
//! Nothing here fails a job: every error is logged and the equations found
//! so far (possibly none) are returned.

use super::mathml::MathmlToLatex;
use super::omml::omml_to_mathml;
use super::xml::{collect_outermost, parse, XmlElement};
use crate::error::TransformError;
use crate::process::{tail_lines, CommandError, ExternalCommand};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A loaded OMML→MathML XSLT stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    pub path: PathBuf,
    /// `version` attribute of the `xsl:stylesheet` root.
    pub version: String,
}

impl Stylesheet {
    /// Read and validate a stylesheet file.
    pub async fn load(path: &Path) -> Result<Self, TransformError> {
        let xml = tokio::fs::read_to_string(path).await.map_err(|e| {
            TransformError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let root = parse(&xml).map_err(|e| {
            TransformError::Unavailable(format!("{} is not XML: {e}", path.display()))
        })?;
        if !matches!(root.local_name(), "stylesheet" | "transform") {
            return Err(TransformError::Unavailable(format!(
                "{} is not an XSLT stylesheet (root <{}>)",
                path.display(),
                root.name
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            version: root.attr("version").unwrap_or("1.0").to_string(),
        })
    }
}

/// One way of turning an `m:oMath` element into MathML.
#[async_trait]
pub trait EquationTransform: Send + Sync {
    fn name(&self) -> &'static str;

    /// `omath` carries the document's namespace declarations.
    async fn transform(
        &self,
        omath: &XmlElement,
        stylesheet: Option<&Stylesheet>,
    ) -> Result<String, TransformError>;
}

/// The in-process engine: the built-in XSLT 1.0 OMML2MML mapping.
#[derive(Debug, Default)]
pub struct NativeTransform;

#[async_trait]
impl EquationTransform for NativeTransform {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn transform(
        &self,
        omath: &XmlElement,
        stylesheet: Option<&Stylesheet>,
    ) -> Result<String, TransformError> {
        if let Some(sheet) = stylesheet {
            if sheet.version != "1.0" {
                return Err(TransformError::Unsupported(format!(
                    "stylesheet {} declares XSLT {}, the in-process engine implements 1.0",
                    sheet.path.display(),
                    sheet.version
                )));
            }
        }
        omml_to_mathml(omath)
    }
}

/// Subprocess engine: `xsltproc <stylesheet> -` with the equation on stdin.
#[derive(Debug, Clone)]
pub struct XsltprocTransform {
    program: String,
    timeout: Duration,
}

impl XsltprocTransform {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EquationTransform for XsltprocTransform {
    fn name(&self) -> &'static str {
        "xsltproc"
    }

    async fn transform(
        &self,
        omath: &XmlElement,
        stylesheet: Option<&Stylesheet>,
    ) -> Result<String, TransformError> {
        let sheet = stylesheet.ok_or_else(|| {
            TransformError::Unavailable("no OMML stylesheet configured".into())
        })?;

        let output = ExternalCommand::new(&self.program, self.timeout)
            .arg(&sheet.path)
            .arg("-")
            .stdin(omath.to_xml())
            .run()
            .await
            .map_err(|e| match e {
                CommandError::Timeout { .. } | CommandError::Spawn { .. } => {
                    TransformError::Unavailable(e.to_string())
                }
                CommandError::Io { .. } => TransformError::Failed(e.to_string()),
            })?;

        if !output.success() {
            return Err(TransformError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                tail_lines(&output.stderr_lossy(), 5)
            )));
        }
        let mathml = output.stdout_lossy();
        if mathml.trim().is_empty() {
            return Err(TransformError::Failed("empty transform output".into()));
        }
        Ok(mathml)
    }
}

struct Candidate {
    transform: Box<dyn EquationTransform>,
    disabled: AtomicBool,
}

/// Process-wide equation extractor.
pub struct EquationEngine {
    stylesheet_path: Option<PathBuf>,
    stylesheet: OnceCell<Option<Arc<Stylesheet>>>,
    candidates: Vec<Candidate>,
    converter: MathmlToLatex,
}

impl std::fmt::Debug for EquationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquationEngine")
            .field("stylesheet_path", &self.stylesheet_path)
            .field(
                "candidates",
                &self
                    .candidates
                    .iter()
                    .map(|c| (c.transform.name(), c.disabled.load(Ordering::Relaxed)))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EquationEngine {
    /// Native engine first, `xsltproc` as the fallback.
    pub fn new(stylesheet_path: Option<PathBuf>, xslt_program: &str, timeout: Duration) -> Self {
        Self::with_transforms(
            stylesheet_path,
            vec![
                Box::new(NativeTransform),
                Box::new(XsltprocTransform::new(xslt_program, timeout)),
            ],
        )
    }

    /// Custom ordered engine list.
    pub fn with_transforms(
        stylesheet_path: Option<PathBuf>,
        transforms: Vec<Box<dyn EquationTransform>>,
    ) -> Self {
        Self {
            stylesheet_path,
            stylesheet: OnceCell::new(),
            candidates: transforms
                .into_iter()
                .map(|transform| Candidate {
                    transform,
                    disabled: AtomicBool::new(false),
                })
                .collect(),
            converter: MathmlToLatex::new(),
        }
    }

    /// Whether the named engine has been switched off for this process.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| c.transform.name() == name && c.disabled.load(Ordering::Acquire))
    }

    async fn stylesheet(&self) -> Option<Arc<Stylesheet>> {
        self.stylesheet
            .get_or_init(|| async {
                let path = self.stylesheet_path.as_deref()?;
                match Stylesheet::load(path).await {
                    Ok(sheet) => {
                        debug!("loaded OMML stylesheet {} (XSLT {})", path.display(), sheet.version);
                        Some(Arc::new(sheet))
                    }
                    Err(e) => {
                        warn!("OMML stylesheet unusable, continuing without it: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Inline TeX for every equation in `document_xml`, in document order.
    pub async fn extract(&self, document_xml: &str) -> Vec<String> {
        let (equations, namespaces) = match collect_outermost(document_xml, "oMath") {
            Ok(found) => found,
            Err(e) => {
                warn!("equation scan skipped, document.xml unreadable: {}", e);
                return Vec::new();
            }
        };
        if equations.is_empty() {
            return Vec::new();
        }

        let stylesheet = self.stylesheet().await;
        let mut out = Vec::with_capacity(equations.len());

        for (index, omath) in equations.into_iter().enumerate() {
            let omath = omath.with_namespaces(&namespaces);
            match self.transform_one(&omath, stylesheet.as_deref()).await {
                Ok(mathml) => match self.converter.convert(&mathml) {
                    Ok(tex) => out.push(tex),
                    Err(e) => debug!("equation {} dropped: {}", index + 1, e),
                },
                Err(TransformError::Unavailable(reason)) => {
                    warn!(
                        "equation sub-extraction stopped at equation {}: {}",
                        index + 1,
                        reason
                    );
                    break;
                }
                Err(e) => debug!("equation {} dropped: {}", index + 1, e),
            }
        }

        info!("recognised {} equation(s)", out.len());
        out
    }

    /// Try each enabled engine in order; first success wins.
    async fn transform_one(
        &self,
        omath: &XmlElement,
        stylesheet: Option<&Stylesheet>,
    ) -> Result<String, TransformError> {
        let mut last = TransformError::Unavailable("no equation transform engine enabled".into());
        for candidate in &self.candidates {
            if candidate.disabled.load(Ordering::Acquire) {
                continue;
            }
            match candidate.transform.transform(omath, stylesheet).await {
                Ok(mathml) => return Ok(mathml),
                Err(TransformError::Unsupported(reason)) => {
                    if !candidate.disabled.swap(true, Ordering::AcqRel) {
                        warn!(
                            "{} equation engine disabled for this process: {}",
                            candidate.transform.name(),
                            reason
                        );
                    }
                    last = TransformError::Unsupported(reason);
                }
                Err(e) => {
                    debug!("{} engine failed: {}", candidate.transform.name(), e);
                    last = e;
                }
            }
        }
        Err(last)
    }
}

/// `Equation N: $...$` lines for the extracted equations.
pub fn equation_lines(equations: &[String]) -> String {
    equations
        .iter()
        .enumerate()
        .map(|(i, tex)| format!("Equation {}: ${}$", i + 1, tex))
        .collect::<Vec<_>>()
        .join("\n")
}
