//! Word-processor baseline paths: pandoc markdown and native paragraph text.

use super::PathFailure;
use crate::process::{tail_lines, ExternalCommand};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// `pandoc <path> -f docx -t markdown --wrap=none`.
///
/// Pandoc writes OMML equations as `$…$` TeX, so this path already carries
/// inline math.
pub async fn pandoc_markdown(
    program: &str,
    path: &Path,
    timeout: Duration,
) -> Result<String, PathFailure> {
    let output = ExternalCommand::new(program, timeout)
        .arg(path)
        .args(["-f", "docx", "-t", "markdown", "--wrap=none"])
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

/// `word/document.xml` from a docx archive.
pub fn read_document_xml(buffer: &[u8]) -> Result<String, PathFailure> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(buffer))
        .map_err(|e| PathFailure::Parse(format!("not a docx archive: {e}")))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| PathFailure::Parse(format!("word/document.xml: {e}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| PathFailure::Parse(format!("word/document.xml: {e}")))?;
    Ok(xml)
}

/// Plain paragraph text from `word/document.xml`: `w:t` runs, one line per
/// `w:p`. Equation runs are left to the equation sub-path.
pub fn paragraph_text(document_xml: &str) -> Result<String, PathFailure> {
    let mut reader = Reader::from_str(document_xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text = false;
    let mut math_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| PathFailure::Parse(e.to_string()))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"w:t" if math_depth == 0 => in_text = true,
                b"m:oMath" => math_depth += 1,
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"w:tab" if math_depth == 0 => out.push('\t'),
                b"w:br" | b"w:cr" if math_depth == 0 => out.push('\n'),
                _ => {}
            },
            Event::End(ref e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                b"m:oMath" => math_depth = math_depth.saturating_sub(1),
                _ => {}
            },
            Event::Text(ref t) if in_text => {
                let text = t.unescape().map_err(|e| PathFailure::Parse(e.to_string()))?;
                out.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// A minimal docx archive holding only `word/document.xml`.
#[cfg(test)]
pub(crate) fn docx_with(document_xml: &str) -> Vec<u8> {
    use std::io::Write;

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}
