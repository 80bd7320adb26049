//! Splitting text into prose and math spans.
//!
//! Recognised delimiters: `$$…$$` and `\[…\]` (display), `$…$` and `\(…\)`
//! (inline). A backslash-escaped `\$` is never a delimiter.
//!
//! Single dollars follow pandoc's rule so that currency amounts stay prose:
//! the opening `$` must be followed by a non-space character, the closing
//! `$` must be preceded by a non-space character and must not be followed by
//! a digit. Inline bodies may not span lines; display bodies may.
//! An opener without a matching closer is ordinary prose.

use std::ops::Range;

/// A piece of a line: either prose or a delimited math span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'a> {
    Prose(&'a str),
    Math {
        open: &'a str,
        body: &'a str,
        close: &'a str,
    },
}

/// Split `text` into alternating prose and math spans.
///
/// Concatenating the spans (delimiters included) reproduces `text` exactly.
pub fn split_math_spans(text: &str) -> Vec<Span<'_>> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut prose_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let found = match bytes[i] {
            b'\\' => match bytes.get(i + 1) {
                Some(b'(') => find_closing(text, i + 2, "\\)", false).map(|end| (2, end, 2)),
                Some(b'[') => find_closing(text, i + 2, "\\]", true).map(|end| (2, end, 2)),
                Some(_) => {
                    // escaped character such as \$, never a delimiter
                    i += 2;
                    continue;
                }
                None => None,
            },
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                find_closing(text, i + 2, "$$", true).map(|end| (2, end, 2))
            }
            b'$' => find_inline_dollar(text, i).map(|end| (1, end, 1)),
            _ => None,
        };

        match found {
            Some((open_len, body_end, close_len)) => {
                if prose_start < i {
                    spans.push(Span::Prose(&text[prose_start..i]));
                }
                let body_start = i + open_len;
                let close_end = body_end + close_len;
                spans.push(Span::Math {
                    open: &text[i..body_start],
                    body: &text[body_start..body_end],
                    close: &text[body_end..close_end],
                });
                i = close_end;
                prose_start = i;
            }
            None => {
                // an unmatched `$$` is two prose dollars, skip both
                i += if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
                    2
                } else {
                    1
                };
            }
        }
    }

    if prose_start < text.len() {
        spans.push(Span::Prose(&text[prose_start..]));
    }
    spans
}

/// Rebuild `text`, passing prose through `prose` and math bodies through `math`.
/// Delimiters are kept verbatim.
pub fn map_spans<P, M>(text: &str, mut prose: P, mut math: M) -> String
where
    P: FnMut(&str) -> String,
    M: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len() + 16);
    for span in split_math_spans(text) {
        match span {
            Span::Prose(p) => out.push_str(&prose(p)),
            Span::Math { open, body, close } => {
                out.push_str(open);
                out.push_str(&math(body));
                out.push_str(close);
            }
        }
    }
    out
}

/// Byte ranges of every math span in `text`, delimiters included.
pub fn math_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    for span in split_math_spans(text) {
        let len = match span {
            Span::Prose(p) => p.len(),
            Span::Math { open, body, close } => {
                let len = open.len() + body.len() + close.len();
                ranges.push(offset..offset + len);
                len
            }
        };
        offset += len;
    }
    ranges
}

/// Byte offset of the first unescaped `close` at or after `from`.
fn find_closing(text: &str, from: usize, close: &str, multiline: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if !close.starts_with('\\') => {
                j += 2;
                continue;
            }
            b'\n' if !multiline => return None,
            _ => {}
        }
        if bytes[j..].starts_with(close.as_bytes()) && j > from {
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Closing position for a single `$` opened at `open`, per pandoc's rule.
fn find_inline_dollar(text: &str, open: usize) -> Option<usize> {
    let rest = &text[open + 1..];
    let first = rest.chars().next()?;
    if first.is_whitespace() || first == '$' {
        return None;
    }

    let bytes = text.as_bytes();
    let mut j = open + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => {
                j += 2;
                continue;
            }
            b'\n' => return None,
            b'$' => {
                let before = text[..j].chars().next_back();
                let after = text[j + 1..].chars().next();
                let valid_close = before.is_some_and(|c| !c.is_whitespace())
                    && !after.is_some_and(|c| c.is_numeric())
                    && after != Some('$');
                if valid_close && j > open + 1 {
                    return Some(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(spans: &[Span<'_>]) -> String {
        spans
            .iter()
            .map(|s| match s {
                Span::Prose(p) => p.to_string(),
                Span::Math { open, body, close } => format!("{open}{body}{close}"),
            })
            .collect()
    }

    #[test]
    fn inline_dollar_math() {
        let spans = split_math_spans("area is $x^2$ units");
        assert_eq!(
            spans,
            vec![
                Span::Prose("area is "),
                Span::Math {
                    open: "$",
                    body: "x^2",
                    close: "$"
                },
                Span::Prose(" units"),
            ]
        );
    }

    #[test]
    fn currency_is_prose() {
        assert_eq!(split_math_spans("$500"), vec![Span::Prose("$500")]);
        assert!(math_ranges("costs $5 and $6 today").is_empty());
    }

    #[test]
    fn escaped_dollar_is_not_delimiter() {
        assert!(math_ranges(r"price \$5 or \$6").is_empty());
    }

    #[test]
    fn display_and_paren_delimiters() {
        let text = r"a $$\frac{1}{2}$$ b \(y\) c \[z\]";
        let spans = split_math_spans(text);
        let bodies: Vec<&str> = spans
            .iter()
            .filter_map(|s| match s {
                Span::Math { body, .. } => Some(*body),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec![r"\frac{1}{2}", "y", "z"]);
        assert_eq!(rebuild(&spans), text);
    }

    #[test]
    fn display_math_may_span_lines_inline_may_not() {
        assert!(!math_ranges("$$\nx + y\n$$").is_empty());
        assert!(math_ranges("$x\ny$").is_empty());
    }

    #[test]
    fn unmatched_opener_is_prose() {
        let text = "open $$ never closed";
        assert_eq!(rebuild(&split_math_spans(text)), text);
        assert!(math_ranges(text).is_empty());
    }

    #[test]
    fn ranges_cover_delimiters() {
        let text = "a $x$ b $$y$$";
        assert_eq!(math_ranges(text), vec![2..5, 8..13]);
        assert_eq!(&text[8..13], "$$y$$");
    }

    #[test]
    fn map_spans_keeps_delimiters() {
        let out = map_spans("a_b $a_b$", |p| p.replace('_', "-"), |m| m.to_uppercase());
        assert_eq!(out, "a-b $A_B$");
    }

    #[test]
    fn round_trip_preserves_text() {
        for text in [
            "",
            "plain",
            "$",
            "$$",
            "\\",
            "x $a$ y $$b$$ z \\(c\\) w \\[d\\]",
            "50% of $1,000 is $500",
            "unicode α $β$ γ",
        ] {
            assert_eq!(rebuild(&split_math_spans(text)), text, "input: {text:?}");
        }
    }
}
