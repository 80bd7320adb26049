//! Post-processing: deterministic cleanup of model-generated manual text.
//!
//! Even with a strict prompt the model sometimes wraps its answer in code
//! fences or repeats a line verbatim (typically a bullet or the key line).
//! These rules fix such quirks without touching content.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule sees `\n` only;
//! fence lines are dropped before duplicate detection so a fence between two
//! identical lines does not hide the repeat.

use crate::prompts::ANSWER_KEY_BANNER;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one raw completion.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Drop code-fence marker lines
/// 4. Trim trailing whitespace per line
/// 5. Collapse consecutive duplicate lines (case and whitespace insensitive)
/// 6. Collapse 3+ consecutive blank lines down to 2, trim the ends
pub fn clean_response(raw: &str) -> String {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = strip_fence_lines(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_duplicate_lines(&s);
    collapse_blank_lines(&s).trim_matches('\n').to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

// ── Rule 3: Drop code-fence lines ────────────────────────────────────────────

static RE_FENCE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*```[\w-]*\s*$").unwrap());

fn strip_fence_lines(input: &str) -> String {
    input
        .lines()
        .filter(|line| !RE_FENCE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Trim trailing whitespace ─────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse consecutive duplicates ──────────────────────────────────

/// Comparison key: lowercase, runs of whitespace folded to one space.
fn line_key(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Blank lines are left to rule 6.
fn collapse_duplicate_lines(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut last_key: Option<String> = None;
    for line in input.lines() {
        if line.trim().is_empty() {
            out.push(line);
            last_key = None;
            continue;
        }
        let key = line_key(line);
        if last_key.as_deref() == Some(key.as_str()) {
            continue;
        }
        out.push(line);
        last_key = Some(key);
    }
    out.join("\n")
}

// ── Rule 6: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Header banner ────────────────────────────────────────────────────────────

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\W_]*solutions?\s+manual\b").unwrap());
static RE_WORKSHEET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\W_]*worksheet\s*[:\-]").unwrap());
static RE_SYLLABUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\W_]*syllabus\s+topics\s+covered\b").unwrap());
static RE_ANSWER_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\W_]*answer\s+key\b").unwrap());

/// Which header banner line, if any, `line` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLine {
    Title,
    Worksheet,
    Syllabus,
    AnswerKey,
}

pub fn header_kind(line: &str) -> Option<HeaderLine> {
    let line = line.trim();
    if RE_TITLE.is_match(line) {
        Some(HeaderLine::Title)
    } else if RE_WORKSHEET.is_match(line) {
        Some(HeaderLine::Worksheet)
    } else if RE_SYLLABUS.is_match(line) {
        Some(HeaderLine::Syllabus)
    } else if RE_ANSWER_KEY.is_match(line) || line.eq_ignore_ascii_case(ANSWER_KEY_BANNER) {
        Some(HeaderLine::AnswerKey)
    } else {
        None
    }
}

pub fn is_header_line(line: &str) -> bool {
    header_kind(line).is_some()
}

fn strip_header_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !is_header_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merge chunk outputs in order.
///
/// The first output is kept as-is; later outputs lose any repeated header
/// banner lines. Outputs that end up empty are skipped. Parts are joined
/// with a blank line.
pub fn merge_outputs<S: AsRef<str>>(outputs: &[S]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(outputs.len());
    for (i, output) in outputs.iter().enumerate() {
        let part = if i == 0 {
            output.as_ref().trim().to_string()
        } else {
            strip_header_lines(output.as_ref()).trim().to_string()
        };
        if !part.is_empty() {
            parts.push(part);
        }
    }
    parts.join("\n\n")
}
