//! Page-layout output via `pdflatex` (or any compatible engine).

use super::{run_to_artifact, scratch_dir};
use crate::error::CompileError;
use crate::process::ExternalCommand;
use std::time::Duration;
use tracing::info;

const JOB_NAME: &str = "manual";

#[derive(Debug, Clone)]
pub struct PdfCompiler {
    program: String,
    timeout: Duration,
    keep_scratch: bool,
}

impl PdfCompiler {
    pub fn new(program: &str, timeout: Duration, keep_scratch: bool) -> Self {
        Self {
            program: program.to_string(),
            timeout,
            keep_scratch,
        }
    }

    /// Compile `document` once in non-interactive, halt-on-error mode.
    pub async fn compile(&self, document: &str) -> Result<Vec<u8>, CompileError> {
        let scratch = scratch_dir("manual-pdf-", self.keep_scratch)?;
        let dir = scratch.path();
        let tex = format!("{JOB_NAME}.tex");
        tokio::fs::write(dir.join(&tex), document).await?;

        let cmd = ExternalCommand::new(&self.program, self.timeout)
            .args(["-interaction=nonstopmode", "-halt-on-error"])
            .arg(format!("-output-directory={}", dir.display()))
            .arg(&tex)
            .current_dir(dir);

        let pdf = run_to_artifact(
            &self.program,
            cmd,
            dir,
            &format!("{JOB_NAME}.pdf"),
            Some(&format!("{JOB_NAME}.log")),
        )
        .await?;
        info!("{} produced {} bytes of PDF", self.program, pdf.len());
        Ok(pdf)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Shell stand-in for the compiler, written into `dir`.
    fn fake_compiler(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("fake-latex");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn reads_produced_pdf() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_compiler(bin.path(), "printf '%%PDF-1.5 fake' > manual.pdf");
        let pdf = PdfCompiler::new(&program, Duration::from_secs(10), false)
            .compile("\\documentclass{article}")
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_log() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_compiler(
            bin.path(),
            "echo '! Undefined control sequence.' > manual.log; echo 'l.12 \\foo' >> manual.log; exit 1",
        );
        let err = PdfCompiler::new(&program, Duration::from_secs(10), false)
            .compile("\\foo")
            .await
            .unwrap_err();
        match err {
            CompileError::Failed { log_tail, .. } => {
                assert!(log_tail.contains("Undefined control sequence"));
                assert!(log_tail.contains("l.12"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn hung_compiler_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let program = fake_compiler(bin.path(), "sleep 5");
        let err = PdfCompiler::new(&program, Duration::from_secs(1), false)
            .compile("x")
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Timeout { secs: 1, .. }));
    }
}
