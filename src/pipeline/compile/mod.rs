//! Output compilation: LaTeX → PDF and manual → DOCX.
//!
//! Both variants work in their own scratch directory. The directory is a
//! [`tempfile::TempDir`] guard, so it is removed on every exit path,
//! timeouts included, unless `keep_scratch` is set.

pub mod docx;
pub mod pdf;
pub mod sanitize;

use crate::config::PipelineConfig;
use crate::error::CompileError;
use crate::job::JobId;
use crate::process::{tail_lines, CommandError, ExternalCommand};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

pub use docx::DocxCompiler;
pub use pdf::PdfCompiler;

/// Lines of compiler log carried by [`CompileError::Failed`].
pub const LOG_TAIL_LINES: usize = 40;

/// Both output compilers, configured once per pipeline.
#[derive(Debug, Clone)]
pub struct DocumentCompiler {
    pdf: PdfCompiler,
    docx: DocxCompiler,
}

impl DocumentCompiler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            pdf: PdfCompiler::new(
                &config.latex_program,
                config.compile_timeout(),
                config.keep_scratch,
            ),
            docx: DocxCompiler::new(
                &config.pandoc_program,
                config.compile_timeout(),
                config.keep_scratch,
            ),
        }
    }

    /// PDF bytes for a complete LaTeX document.
    pub async fn compile_to_pdf(&self, document: &str) -> Result<Vec<u8>, CompileError> {
        self.pdf.compile(document).await
    }

    /// DOCX bytes for the manual text.
    pub async fn compile_to_docx(
        &self,
        manual_text: &str,
        header_text: &str,
        job_id: &JobId,
    ) -> Result<Vec<u8>, CompileError> {
        self.docx.compile(manual_text, header_text, job_id).await
    }
}

/// A fresh scratch directory. With `keep` set it survives the guard and
/// its path is logged.
pub(crate) fn scratch_dir(prefix: &str, keep: bool) -> Result<TempDir, CompileError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .keep(keep)
        .tempdir()?;
    if keep {
        info!("keeping scratch directory {}", dir.path().display());
    }
    Ok(dir)
}

pub(crate) fn command_error(engine: &str, e: CommandError) -> CompileError {
    match e {
        CommandError::Timeout { secs, .. } => CompileError::Timeout {
            engine: engine.to_string(),
            secs,
        },
        CommandError::Spawn { source, .. } | CommandError::Io { source, .. } => {
            CompileError::Spawn {
                engine: engine.to_string(),
                detail: source.to_string(),
            }
        }
    }
}

/// Run `cmd` and read `artifact` from `dir` afterwards.
///
/// A non-zero exit becomes [`CompileError::Failed`] with the tail of
/// `log_file` when it exists, otherwise of stderr and stdout.
pub(crate) async fn run_to_artifact(
    engine: &str,
    cmd: ExternalCommand,
    dir: &Path,
    artifact: &str,
    log_file: Option<&str>,
) -> Result<Vec<u8>, CompileError> {
    let output = cmd.run().await.map_err(|e| command_error(engine, e))?;

    if !output.success() {
        let log = match log_file {
            Some(name) => tokio::fs::read(dir.join(name))
                .await
                .ok()
                .map(|b| String::from_utf8_lossy(&b).into_owned()),
            None => None,
        };
        let log = log.unwrap_or_else(|| {
            format!("{}\n{}", output.stdout_lossy(), output.stderr_lossy())
        });
        return Err(CompileError::Failed {
            engine: engine.to_string(),
            status: output.status.to_string(),
            log_tail: tail_lines(log.trim_end(), LOG_TAIL_LINES),
        });
    }

    match tokio::fs::read(dir.join(artifact)).await {
        Ok(bytes) if !bytes.is_empty() => {
            debug!("{} produced {} ({} bytes)", engine, artifact, bytes.len());
            Ok(bytes)
        }
        _ => Err(CompileError::MissingArtifact {
            engine: engine.to_string(),
            artifact: artifact.to_string(),
        }),
    }
}
