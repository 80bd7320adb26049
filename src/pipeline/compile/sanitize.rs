//! Rewrites that keep pandoc's readers from rejecting generated input.
//!
//! pandoc's LaTeX reader is strict about malformed math and about leftovers
//! from the model's markdown habits; its markdown reader chokes on bare
//! underscores and stray HTML. Both passes leave math bodies alone apart
//! from Unicode → macro substitution.

use crate::math::map_spans;
use crate::pipeline::normalize::{fold_symbols, symbols_to_ascii, symbols_to_latex};
use once_cell::sync::Lazy;
use regex::Regex;

/// `$$ $x$$` → `$$ x $$`
static RE_DOUBLED_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$[ \t]*\$([^$\n]+?)\$\$").unwrap());

/// `$$x$ $$` → `$$ x $$`
static RE_DOUBLED_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$([^$\n]+?)\$[ \t]*\$\$").unwrap());

/// `\*` left behind by markdown escaping.
static RE_ESCAPED_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\*").unwrap());

/// Unpaired `**` emphasis markers.
static RE_STRAY_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*").unwrap());

/// Fill-in blanks written as long runs of escaped underscores.
static RE_UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\\_){4,}").unwrap());

/// Lines holding nothing but braces.
static RE_BRACE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[{}]+[ \t]*\n").unwrap());

/// Closing braces opening a line.
static RE_LEADING_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\}+").unwrap());

static RE_HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>").unwrap());

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());

/// Clean a rendered LaTeX document before `pandoc -f latex`.
///
/// Rules (applied in order):
/// 1. Rewrite doubled display-math wrappers
/// 2. Drop `\*` escapes and unpaired `**`
/// 3. Shorten long `\_` runs to three
/// 4. Remove brace-only lines and closing braces at line start
/// 5. Unicode math symbols to macros (math) or ASCII (prose)
pub fn sanitize_latex(document: &str) -> String {
    let s = RE_DOUBLED_OPEN.replace_all(document, "$$$$ $1 $$$$");
    let s = RE_DOUBLED_CLOSE.replace_all(&s, "$$$$ $1 $$$$");
    let s = RE_ESCAPED_STAR.replace_all(&s, "*");
    let s = RE_STRAY_BOLD.replace_all(&s, "");
    let s = RE_UNDERSCORE_RUN.replace_all(&s, r"\_\_\_");
    let s = RE_BRACE_LINE.replace_all(&s, "");
    let s = RE_LEADING_CLOSE.replace_all(&s, "");
    fold_symbols(&s)
}

/// Clean raw manual text for `pandoc -f markdown`.
///
/// Outside math: embedded images and HTML tags are removed and underscores
/// escaped. Inside math: Unicode symbols become macros.
pub fn sanitize_markdown(manual_text: &str) -> String {
    let text = RE_DOUBLED_OPEN.replace_all(manual_text, "$$$$ $1 $$$$");
    let text = RE_DOUBLED_CLOSE.replace_all(&text, "$$$$ $1 $$$$");
    let out = map_spans(&text, sanitize_markdown_prose, symbols_to_latex);
    // hard line breaks keep option and key lines apart
    out.lines()
        .map(|l| if l.trim().is_empty() { String::new() } else { format!("{}  ", l.trim_end()) })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_markdown_prose(prose: &str) -> String {
    let s = RE_IMAGE.replace_all(prose, "");
    let s = RE_HTML_TAG.replace_all(&s, "");
    let s = symbols_to_ascii(&s);
    let mut out = String::with_capacity(s.len() + 8);
    let mut prev = None;
    for c in s.chars() {
        if c == '_' && prev != Some('\\') {
            out.push('\\');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
