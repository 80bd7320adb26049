//! Word-processor output via pandoc.
//!
//! Two candidate paths, tried in order:
//!
//! | Path | Input | Reader |
//! |------|-------|--------|
//! | primary | rendered LaTeX, sanitised | `-f latex` |
//! | fallback | raw manual text, sanitised | `-f markdown` |

use super::sanitize::{sanitize_latex, sanitize_markdown};
use super::{run_to_artifact, scratch_dir};
use crate::error::CompileError;
use crate::job::JobId;
use crate::pipeline::latex::LatexRenderer;
use crate::process::ExternalCommand;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocxPath {
    Latex,
    Markdown,
}

impl DocxPath {
    fn reader(self) -> &'static str {
        match self {
            Self::Latex => "latex",
            Self::Markdown => "markdown",
        }
    }

    fn source_name(self) -> &'static str {
        match self {
            Self::Latex => "manual.tex",
            Self::Markdown => "manual.md",
        }
    }

    fn output_name(self) -> &'static str {
        match self {
            Self::Latex => "manual.docx",
            Self::Markdown => "manual-markdown.docx",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocxCompiler {
    program: String,
    timeout: Duration,
    keep_scratch: bool,
    renderer: LatexRenderer,
}

impl DocxCompiler {
    pub fn new(program: &str, timeout: Duration, keep_scratch: bool) -> Self {
        Self {
            program: program.to_string(),
            timeout,
            keep_scratch,
            renderer: LatexRenderer::new(),
        }
    }

    /// DOCX bytes for `manual_text`. The markdown path runs only when the
    /// LaTeX path fails; both failing yields
    /// [`CompileError::BothPathsFailed`].
    pub async fn compile(
        &self,
        manual_text: &str,
        header_text: &str,
        job_id: &JobId,
    ) -> Result<Vec<u8>, CompileError> {
        let scratch = scratch_dir("manual-docx-", self.keep_scratch)?;
        let dir = scratch.path();

        let latex = sanitize_latex(&self.renderer.render(manual_text, header_text, job_id));
        let primary = match self.convert(dir, DocxPath::Latex, &latex).await {
            Ok(bytes) => {
                info!("DOCX built from LaTeX ({} bytes)", bytes.len());
                return Ok(bytes);
            }
            Err(e) => e,
        };
        warn!("DOCX from LaTeX failed, retrying from markdown: {}", primary);

        let markdown = sanitize_markdown(manual_text);
        match self.convert(dir, DocxPath::Markdown, &markdown).await {
            Ok(bytes) => {
                info!("DOCX built from markdown fallback ({} bytes)", bytes.len());
                Ok(bytes)
            }
            Err(fallback) => Err(CompileError::BothPathsFailed {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            }),
        }
    }

    async fn convert(
        &self,
        dir: &Path,
        path: DocxPath,
        source: &str,
    ) -> Result<Vec<u8>, CompileError> {
        tokio::fs::write(dir.join(path.source_name()), source).await?;
        let cmd = ExternalCommand::new(&self.program, self.timeout)
            .arg(path.source_name())
            .args(["-f", path.reader(), "-t", "docx", "-o", path.output_name()])
            .current_dir(dir);
        run_to_artifact(&self.program, cmd, dir, path.output_name(), None).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A pandoc stand-in that copies its input to the `-o` target, failing
    /// for the readers listed in `fail_readers`.
    fn fake_pandoc(dir: &Path, fail_readers: &str) -> String {
        let path = dir.join("fake-pandoc");
        let script = format!(
            r#"#!/bin/sh
src="$1"; shift
reader=""; out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) reader="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
for r in {fail_readers} none; do
  if [ "$r" = "$reader" ]; then echo "reader $reader rejected input" >&2; exit 64; fi
done
cp "$src" "$out"
"#
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn primary_path_sends_sanitised_latex() {
        let bin = tempfile::tempdir().unwrap();
        let compiler = DocxCompiler::new(&fake_pandoc(bin.path(), ""), Duration::from_secs(10), false);
        let bytes = compiler
            .compile("1. Solve $$ $x$$", "JEE", &JobId::from("j"))
            .await
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\\documentclass"));
        assert!(text.contains("$$ x $$"));
    }

    #[tokio::test]
    async fn falls_back_to_markdown() {
        let bin = tempfile::tempdir().unwrap();
        let compiler =
            DocxCompiler::new(&fake_pandoc(bin.path(), "latex"), Duration::from_secs(10), false);
        let bytes = compiler
            .compile("1. fill ____ <b>now</b>", "JEE", &JobId::from("j"))
            .await
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "1. fill \\_\\_\\_\\_ now  ");
    }

    #[tokio::test]
    async fn both_paths_failing_reports_both() {
        let bin = tempfile::tempdir().unwrap();
        let compiler = DocxCompiler::new(
            &fake_pandoc(bin.path(), "latex markdown"),
            Duration::from_secs(10),
            false,
        );
        let err = compiler
            .compile("1. x", "", &JobId::from("j"))
            .await
            .unwrap_err();
        match err {
            CompileError::BothPathsFailed { primary, fallback } => {
                assert!(primary.to_string().contains("reader latex rejected"));
                assert!(fallback.to_string().contains("reader markdown rejected"));
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
