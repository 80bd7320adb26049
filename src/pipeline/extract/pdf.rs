//! Page-image baseline paths (pdfium, `pdftotext`) and the OCR equation
//! recogniser.
//!
//! pdfium is not safe to call from async contexts, so the text pass runs in
//! `spawn_blocking`.

use super::PathFailure;
use crate::error::OcrError;
use crate::process::{tail_lines, ExternalCommand};
use pdfium_render::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Text of every page via pdfium, pages separated by blank lines.
pub async fn pdfium_text(path: &Path, lib_path: Option<PathBuf>) -> Result<String, PathFailure> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdfium_text_blocking(&path, lib_path))
        .await
        .map_err(|e| PathFailure::Join(e.to_string()))?
}

fn bind_pdfium(lib_path: Option<PathBuf>) -> Result<Pdfium, PathFailure> {
    let lib_path = lib_path.or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
    let bindings = match lib_path {
        Some(p) => Pdfium::bind_to_library(&p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PathFailure::Parse(format!("pdfium unavailable: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn pdfium_text_blocking(path: &Path, lib_path: Option<PathBuf>) -> Result<String, PathFailure> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| PathFailure::Parse(format!("failed to load PDF: {e:?}")))?;

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| PathFailure::Parse(format!("page {}: {e:?}", index + 1)))?;
        pages.push(text.all());
    }
    debug!("pdfium extracted {} page(s)", pages.len());
    Ok(pages.join("\n\n"))
}

/// `pdftotext -layout -enc UTF-8 <path> -`.
pub async fn pdftotext(
    program: &str,
    path: &Path,
    timeout: Duration,
) -> Result<String, PathFailure> {
    let output = ExternalCommand::new(program, timeout)
        .args(["-layout", "-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .run()
        .await?;
    if !output.success() {
        return Err(PathFailure::Exit {
            status: output.status.to_string(),
            stderr: tail_lines(&output.stderr_lossy(), 5),
        });
    }
    Ok(output.stdout_lossy())
}

#[derive(Debug, Deserialize)]
struct OcrLine {
    #[serde(default)]
    equations: Vec<String>,
}

/// Run the OCR recogniser over `path` and return its equations.
pub async fn ocr_equations(
    argv: &[String],
    path: &Path,
    timeout: Duration,
) -> Result<Vec<String>, OcrError> {
    let cmd = ExternalCommand::from_argv(argv, timeout).ok_or(OcrError::NotConfigured)?;
    let output = cmd
        .arg(path)
        .run()
        .await
        .map_err(|e| OcrError::Command(e.to_string()))?;
    if !output.success() {
        return Err(OcrError::Command(format!(
            "exited with {}: {}",
            output.status,
            tail_lines(&output.stderr_lossy(), 5)
        )));
    }
    parse_ocr_output(&output.stdout_lossy())
}

/// The recogniser prints newline-delimited JSON; only the last line counts.
pub fn parse_ocr_output(stdout: &str) -> Result<Vec<String>, OcrError> {
    let last = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(OcrError::EmptyOutput)?;
    let parsed: OcrLine = serde_json::from_str(last)?;
    Ok(parsed
        .equations
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect())
}

/// `Equation N:` labels, each followed by a display-math block.
pub fn equation_blocks(equations: &[String]) -> String {
    equations
        .iter()
        .enumerate()
        .map(|(i, tex)| format!("Equation {}:\n$$\n{}\n$$", i + 1, tex))
        .collect::<Vec<_>>()
        .join("\n\n")
}
