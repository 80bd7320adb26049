//! Manual text → complete LaTeX document.
//!
//! The renderer is line oriented. Each line is classified (title banner,
//! labelled field, answer-key banner, question start, bullet, body) and
//! emitted as the matching construct. Display math that spans several lines
//! is joined into one logical line first so it is never split by the
//! classifier.
//!
//! Escaping works per math span: prose has the reserved characters escaped
//! and Unicode symbols spelled out, math bodies only get Unicode → macro
//! substitution.

use crate::job::JobId;
use crate::math::{map_spans, math_ranges, split_math_spans, Span};
use crate::pipeline::normalize::{symbols_to_ascii, symbols_to_latex};
use crate::pipeline::postprocess::{header_kind, HeaderLine};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(?:\*\*)?([Qq]?\d+[.)])(?:\*\*)?\s+(.*)$").unwrap()
});

static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*(?:[•●◦▪▸‣]|[-*]\s)\s*(.*)$").unwrap());

static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\**\s*(worksheet|syllabus topics covered|key|answer|solution|fallback)\s*\**\s*:\s*\**\s*(.*)$",
    )
    .unwrap()
});

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#{1,6}\s+(.*)$").unwrap());

static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+?)\*\*").unwrap());

const PREAMBLE: &str = r"\documentclass[11pt,a4paper]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage[margin=2cm]{geometry}
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{fancyhdr}
\usepackage{enumitem}
\setlist[itemize]{leftmargin=1.5em,itemsep=1pt,topsep=2pt}
\setlength{\parindent}{0pt}
\setlength{\parskip}{3pt}
\setlength{\headheight}{14pt}
\pagestyle{fancy}
\fancyhf{}
";

const PLACEHOLDER_BODY: &str =
    "\\begin{center}\n\\textit{No content was generated for this manual.}\n\\end{center}\n";

/// Renders manual text into a standalone LaTeX document.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatexRenderer;

impl LatexRenderer {
    pub fn new() -> Self {
        Self
    }

    /// One complete, compilable document. `header_text` goes into the
    /// running page header; `job_id` into the footer. Empty input yields a
    /// single placeholder page.
    pub fn render(&self, manual_text: &str, header_text: &str, job_id: &JobId) -> String {
        let mut doc = String::with_capacity(manual_text.len() * 2 + PREAMBLE.len() + 256);
        doc.push_str(&format!("% manual for job {}\n", job_id));
        doc.push_str(PREAMBLE);
        doc.push_str(&format!(
            "\\fancyhead[L]{{\\small {}}}\n\\fancyhead[R]{{\\small Solutions Manual}}\n",
            escape_prose(header_text.trim())
        ));
        doc.push_str(&format!(
            "\\fancyfoot[C]{{\\thepage}}\n\\fancyfoot[R]{{\\scriptsize {}}}\n",
            escape_prose(job_id.as_str())
        ));
        doc.push_str("\\begin{document}\n");
        if manual_text.trim().is_empty() {
            doc.push_str(PLACEHOLDER_BODY);
        } else {
            doc.push_str(&render_body(manual_text));
        }
        doc.push_str("\\end{document}\n");
        doc
    }
}

fn render_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut in_list = false;

    for line in logical_lines(text) {
        let bullet = RE_BULLET.captures(&line);
        if in_list && bullet.is_none() {
            out.push_str("\\end{itemize}\n");
            in_list = false;
        }
        if let Some(caps) = bullet {
            if !in_list {
                out.push_str("\\begin{itemize}\n");
                in_list = true;
            }
            out.push_str(&format!("\\item {}\n", escape_line(&caps[1])));
            continue;
        }
        out.push_str(&render_line(&line));
    }
    if in_list {
        out.push_str("\\end{itemize}\n");
    }
    out
}

fn render_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return "\n".to_string();
    }

    match header_kind(trimmed) {
        Some(HeaderLine::Title) => {
            return format!(
                "\\begin{{center}}{{\\Large\\textbf{{{}}}}}\\end{{center}}\n",
                escape_line(strip_decoration(trimmed))
            );
        }
        Some(HeaderLine::AnswerKey) => {
            return format!(
                "\\begin{{center}}\\textbf{{{}}}\\end{{center}}\n",
                escape_line(strip_decoration(trimmed))
            );
        }
        _ => {}
    }

    if let Some(caps) = RE_LABEL.captures(trimmed) {
        return format!(
            "\\textbf{{{}:}} {}\\par\n",
            escape_prose(caps[1].trim()),
            escape_line(caps[2].trim())
        );
    }
    if let Some(caps) = RE_QUESTION.captures(trimmed) {
        return format!(
            "\\medskip\n\\textbf{{{}}} {}\\par\n",
            escape_prose(&caps[1]),
            escape_line(&caps[2])
        );
    }
    if let Some(caps) = RE_HEADING.captures(trimmed) {
        return format!("\\medskip\n\\textbf{{{}}}\\par\n", escape_line(&caps[1]));
    }
    format!("{}\\par\n", escape_line(trimmed))
}

/// Drop markdown emphasis and heading marks around a banner line.
fn strip_decoration(line: &str) -> &str {
    line.trim_matches(|c: char| c == '*' || c == '#' || c == '_' || c.is_whitespace())
}

/// Lines of `text`, with multi-line display math joined onto the line that
/// opens it. An opener that is never closed leaves the lines untouched.
fn logical_lines(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        if has_open_display(lines[i]) {
            let mut joined = lines[i].to_string();
            let mut closed_at = None;
            for (j, next) in lines.iter().enumerate().skip(i + 1) {
                // blank lines are not allowed inside display math
                if next.trim().is_empty() {
                    continue;
                }
                joined.push('\n');
                joined.push_str(next);
                if !has_open_display(&joined) {
                    closed_at = Some(j);
                    break;
                }
            }
            if let Some(j) = closed_at {
                out.push(joined);
                i = j + 1;
                continue;
            }
        }
        out.push(lines[i].to_string());
        i += 1;
    }
    out
}

fn has_open_display(text: &str) -> bool {
    split_math_spans(text)
        .iter()
        .any(|s| matches!(s, Span::Prose(p) if p.contains("$$") || p.contains("\\[")))
}

/// Escape one line: prose spans escaped, `**bold**` turned into
/// `\textbf`, math spans passed through with Unicode → macro substitution.
///
/// Bold pairs are matched across the whole line, so a bold run may enclose
/// math. Markers that fall inside a math span are left to the math.
pub fn escape_line(line: &str) -> String {
    let math = math_ranges(line);
    let in_math = |pos: usize| math.iter().any(|r| r.contains(&pos));

    let mut out = String::with_capacity(line.len() + 16);
    let mut last = 0;
    for caps in RE_BOLD.captures_iter(line) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if in_math(whole.start()) || in_math(whole.end() - 1) {
            continue;
        }
        out.push_str(&escape_segment(&line[last..whole.start()]));
        out.push_str("\\textbf{");
        out.push_str(&escape_segment(inner.as_str()));
        out.push('}');
        last = whole.end();
    }
    out.push_str(&escape_segment(&line[last..]));
    out
}

fn escape_segment(text: &str) -> String {
    map_spans(text, escape_prose, symbols_to_latex)
}

/// Escape a prose fragment for LaTeX.
///
/// Unicode math glyphs are spelled out first. A backslash before ASCII
/// punctuation is a markdown escape and yields the literal character.
/// Characters the default fonts cannot typeset become `?`.
pub fn escape_prose(text: &str) -> String {
    let text = symbols_to_ascii(text);
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let c = match c {
            '\\' => match chars.peek() {
                Some(&next) if next.is_ascii_punctuation() => {
                    chars.next();
                    next
                }
                _ => {
                    out.push_str("\\textbackslash{}");
                    continue;
                }
            },
            other => other,
        };
        match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '–' => out.push_str("--"),
            '—' => out.push_str("---"),
            '‘' | '’' => out.push('\''),
            '“' => out.push_str("``"),
            '”' => out.push_str("''"),
            '…' => out.push_str("\\ldots{}"),
            '•' | '●' | '◦' | '▪' => out.push_str("\\textbullet{}"),
            c if (c as u32) <= 0xFF => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> String {
        let doc = LatexRenderer::new().render(text, "JEE | Physics", &JobId::from("job-1"));
        let start = doc.find("\\begin{document}\n").unwrap() + "\\begin{document}\n".len();
        let end = doc.find("\\end{document}").unwrap();
        doc[start..end].to_string()
    }

    #[test]
    fn percent_and_currency_in_prose() {
        assert_eq!(escape_line("50% off"), "50\\% off");
        assert_eq!(escape_line("$500"), "\\$500");
    }

    #[test]
    fn reserved_characters_escaped_in_prose_only() {
        let line = "a & b % c # d _ e { f } g ~ h ^ i and $x_1^{2} + y$";
        let out = escape_line(line);
        assert!(out.starts_with(
            "a \\& b \\% c \\# d \\_ e \\{ f \\} g \\textasciitilde{} h \\textasciicircum{} i and "
        ));
        assert!(out.ends_with("$x_1^{2} + y$"));
    }

    #[test]
    fn math_gets_macros_prose_gets_ascii() {
        assert_eq!(escape_line("θ ≤ 90° when $θ ≤ π$"), "theta <= 90 deg when $\\theta \\leq \\pi$");
    }

    #[test]
    fn markdown_escapes_become_literals() {
        assert_eq!(escape_prose(r"\$5 and \* and C:\path"), "\\$5 and * and C:\\textbackslash{}path");
    }

    #[test]
    fn bold_markup() {
        assert_eq!(escape_line("**Note:** 5% rule"), "\\textbf{Note:} 5\\% rule");
    }

    #[test]
    fn bold_run_may_enclose_math() {
        assert_eq!(
            escape_line("**bold $x_1$ text** & more"),
            "\\textbf{bold $x_1$ text} \\& more"
        );
    }

    #[test]
    fn bold_markers_inside_math_are_left_alone() {
        assert_eq!(escape_line("$a**b**c$ done"), "$a**b**c$ done");
    }

    #[test]
    fn structural_lines() {
        let text = "Solutions Manual: JEE Physics\nWorksheet: Kinematics\nAnswer Key & Detailed Solutions\n\n1. Find $v$.\n(a) 5 m/s\nKey: (a)\nSolution:\n• Use $v = u + at$\n• Substitute\nDone.";
        let out = body(text);
        assert!(out.contains("\\begin{center}{\\Large\\textbf{Solutions Manual: JEE Physics}}\\end{center}"));
        assert!(out.contains("\\textbf{Worksheet:} Kinematics\\par"));
        assert!(out.contains("\\textbf{Answer Key \\& Detailed Solutions}"));
        assert!(out.contains("\\textbf{1.} Find $v$.\\par"));
        assert!(out.contains("(a) 5 m/s\\par"));
        assert!(out.contains(
            "\\begin{itemize}\n\\item Use $v = u + at$\n\\item Substitute\n\\end{itemize}\nDone.\\par"
        ));
    }

    #[test]
    fn list_closed_at_end_of_input() {
        let out = body("- one\n- two");
        assert!(out.trim_end().ends_with("\\end{itemize}"));
        assert_eq!(out.matches("\\begin{itemize}").count(), 1);
    }

    #[test]
    fn multi_line_display_math_is_kept_together() {
        let out = body("Equation 1:\n$$\n\\frac{a_1}{2}\n\n$$\nafter_text");
        assert!(out.contains("$$\n\\frac{a_1}{2}\n$$\\par"), "{out}");
        assert!(out.contains("after\\_text"));
    }

    #[test]
    fn empty_input_renders_placeholder_page() {
        let doc = LatexRenderer::new().render("  \n", "", &JobId::from("job-2"));
        assert!(doc.contains("No content was generated"));
        assert!(doc.starts_with("% manual for job job-2\n\\documentclass"));
        assert!(doc.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn header_text_is_escaped() {
        let doc = LatexRenderer::new().render("x", "R&D | Ch_1", &JobId::from("j"));
        assert!(doc.contains("\\fancyhead[L]{\\small R\\&D | Ch\\_1}"));
    }

    /// Whether an escaped prose fragment still has a reserved character in
    /// its raw form.
    fn has_bare_reserved(escaped: &str) -> bool {
        let s = escaped
            .replace("\\textasciitilde{}", "")
            .replace("\\textasciicircum{}", "");
        let mut prev = ' ';
        for c in s.chars() {
            if matches!(c, '~' | '^') {
                return true;
            }
            if matches!(c, '&' | '%' | '$' | '#' | '_' | '{' | '}') && prev != '\\' {
                return true;
            }
            prev = c;
        }
        false
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn reserved_characters_escaped_in_prose_and_kept_in_math(
            pieces in prop::collection::vec(("[a-z &%#_{}~^]{1,12}", "[a-z_^{}]{1,6}"), 1..6)
        ) {
            let mut line = String::new();
            let mut expected = String::new();
            for (prose, math) in &pieces {
                let escaped = escape_prose(prose);
                prop_assert!(!has_bare_reserved(&escaped), "{} -> {}", prose, escaped);
                line.push_str(&format!("{prose}${math}$"));
                expected.push_str(&format!("{escaped}${math}$"));
            }
            prop_assert_eq!(escape_line(&line), expected);
        }
    }
}
