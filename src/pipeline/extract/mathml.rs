//! MathML → inline TeX.
//!
//! [`MathmlToLatex`] is the one converter the equation sub-path uses. It
//! accepts presentation MathML with or without a namespace prefix (`mml:`),
//! so it reads both the in-process transform output and `xsltproc` output.

use super::xml::{parse, XmlElement, XmlNode};
use crate::error::TransformError;
use crate::pipeline::normalize::symbol_latex;
use once_cell::sync::Lazy;
use regex::Regex;

/// Functions that TeX typesets upright via a macro of the same name.
const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "log", "ln", "lg", "exp", "lim", "max", "min", "sup", "inf", "det", "deg", "gcd",
];

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_TRAILING_MACRO: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[A-Za-z]+$").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct MathmlToLatex;

impl MathmlToLatex {
    pub fn new() -> Self {
        Self
    }

    /// Convert a MathML document to TeX without surrounding delimiters.
    pub fn convert(&self, mathml: &str) -> Result<String, TransformError> {
        let root = parse(mathml).map_err(|e| TransformError::Failed(e.to_string()))?;
        let tex = element(&root);
        let tex = RE_SPACES.replace_all(tex.trim(), " ").into_owned();
        if tex.is_empty() {
            return Err(TransformError::Failed("MathML produced no content".into()));
        }
        Ok(tex)
    }
}

/// Append `piece`, separating it from a preceding control word or a
/// single-token script (`^n`) when the two would otherwise fuse.
fn push(out: &mut String, piece: &str) {
    if needs_space(out, piece) {
        out.push(' ');
    }
    out.push_str(piece);
}

fn needs_space(out: &str, piece: &str) -> bool {
    let Some(first) = piece.chars().next() else {
        return false;
    };
    if first.is_ascii_alphabetic() && RE_TRAILING_MACRO.is_match(out) {
        return true;
    }
    let mut tail = out.chars().rev();
    first.is_ascii_alphanumeric()
        && matches!(
            (tail.next(), tail.next()),
            (Some(last), Some('^' | '_')) if last.is_ascii_alphanumeric()
        )
}

fn children(el: &XmlElement) -> String {
    let mut out = String::new();
    for child in el.elements() {
        push(&mut out, &element(child));
    }
    out
}

fn nth(el: &XmlElement, n: usize) -> String {
    el.elements().nth(n).map(element).unwrap_or_default()
}

/// Braces around anything longer than one symbol.
fn group(tex: &str) -> String {
    let t = tex.trim();
    let single = t.chars().count() == 1
        || (t.starts_with('\\') && t[1..].chars().all(|c| c.is_ascii_alphabetic()));
    if single && !t.is_empty() {
        t.to_string()
    } else {
        format!("{{{t}}}")
    }
}

fn token_text(el: &XmlElement) -> String {
    el.children
        .iter()
        .map(|n| match n {
            XmlNode::Text(t) => t.as_str(),
            XmlNode::Element(_) => "",
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn symbols(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        match c {
            // function application and invisible times/separator
            '\u{2061}' | '\u{2062}' | '\u{2063}' => {}
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '%' => out.push_str("\\%"),
            '#' => out.push_str("\\#"),
            '&' => out.push_str("\\&"),
            _ => match symbol_latex(c) {
                Some(tex) => push(&mut out, tex),
                None => {
                    let mut buf = [0u8; 4];
                    push(&mut out, c.encode_utf8(&mut buf));
                }
            },
        }
    }
    out
}

fn identifier(text: &str) -> String {
    if text.chars().count() > 1 {
        if KNOWN_FUNCTIONS.contains(&text) {
            format!("\\{text}")
        } else if text.chars().all(|c| c.is_ascii_alphabetic()) {
            format!("\\mathrm{{{text}}}")
        } else {
            symbols(text)
        }
    } else {
        symbols(text)
    }
}

fn is_large_operator(tex: &str) -> bool {
    matches!(
        tex.trim(),
        "\\sum" | "\\prod" | "\\int" | "\\oint" | "\\lim" | "\\max" | "\\min" | "\\bigcup"
            | "\\bigcap" | "\\cup" | "\\cap"
    )
}

fn over_accent(accent: &str, base: &str) -> Option<String> {
    let macro_ = match accent.trim() {
        "\u{0302}" | "^" | "\\hat" => "\\hat",
        "\u{00AF}" | "\u{203E}" | "\u{0305}" | "-" => "\\overline",
        "\u{2192}" | "\u{20D7}" | "\\rightarrow" => "\\vec",
        "\u{0303}" | "~" | "\\sim" => "\\tilde",
        "\u{0307}" | "\u{02D9}" => "\\dot",
        "\u{0308}" | "\u{00A8}" => "\\ddot",
        "\u{23DE}" => "\\overbrace",
        _ => return None,
    };
    Some(format!("{macro_}{{{}}}", base.trim()))
}

fn under_accent(accent: &str, base: &str) -> Option<String> {
    let macro_ = match accent.trim() {
        "\u{0332}" | "_" => "\\underline",
        "\u{23DF}" => "\\underbrace",
        _ => return None,
    };
    Some(format!("{macro_}{{{}}}", base.trim()))
}

fn element(el: &XmlElement) -> String {
    match el.local_name() {
        "mi" => identifier(&token_text(el)),
        "mn" => token_text(el),
        "mo" => symbols(&token_text(el)),
        "mtext" => {
            let t = token_text(el);
            if t.is_empty() {
                String::new()
            } else {
                format!("\\text{{{t}}}")
            }
        }
        "mspace" => " ".to_string(),
        "none" | "mprescripts" | "annotation" | "annotation-xml" => String::new(),

        "semantics" => el.elements().next().map(element).unwrap_or_default(),

        "mfrac" => {
            let num = nth(el, 0);
            let den = nth(el, 1);
            if el.attr("linethickness") == Some("0") {
                format!("\\binom{{{}}}{{{}}}", num.trim(), den.trim())
            } else {
                format!("\\frac{{{}}}{{{}}}", num.trim(), den.trim())
            }
        }
        "msqrt" => format!("\\sqrt{{{}}}", children(el).trim()),
        "mroot" => format!("\\sqrt[{}]{{{}}}", nth(el, 1).trim(), nth(el, 0).trim()),

        "msup" => format!("{}^{}", group(&nth(el, 0)), group(&nth(el, 1))),
        "msub" => format!("{}_{}", group(&nth(el, 0)), group(&nth(el, 1))),
        "msubsup" => format!(
            "{}_{}^{}",
            group(&nth(el, 0)),
            group(&nth(el, 1)),
            group(&nth(el, 2))
        ),

        "munder" => {
            let base = nth(el, 0);
            let under = nth(el, 1);
            if is_large_operator(&base) {
                format!("{}_{}", base.trim(), group(&under))
            } else if let Some(tex) = under_accent(&under, &base) {
                tex
            } else {
                format!("\\underset{{{}}}{{{}}}", under.trim(), base.trim())
            }
        }
        "mover" => {
            let base = nth(el, 0);
            let over = nth(el, 1);
            let raw_over = el
                .elements()
                .nth(1)
                .map(token_text)
                .unwrap_or_default();
            if is_large_operator(&base) {
                format!("{}^{}", base.trim(), group(&over))
            } else if let Some(tex) = over_accent(&raw_over, &base) {
                tex
            } else {
                format!("\\overset{{{}}}{{{}}}", over.trim(), base.trim())
            }
        }
        "munderover" => format!(
            "{}_{}^{}",
            nth(el, 0).trim(),
            group(&nth(el, 1)),
            group(&nth(el, 2))
        ),

        "mmultiscripts" => {
            let parts: Vec<&XmlElement> = el.elements().collect();
            let base = parts.first().map(|e| element(e)).unwrap_or_default();
            let split = parts
                .iter()
                .position(|e| e.local_name() == "mprescripts")
                .unwrap_or(parts.len());
            let scripts = |slice: &[&XmlElement]| -> String {
                let mut out = String::new();
                for pair in slice.chunks(2) {
                    let sub = pair.first().map(|e| element(e)).unwrap_or_default();
                    let sup = pair.get(1).map(|e| element(e)).unwrap_or_default();
                    if !sub.trim().is_empty() {
                        out.push_str(&format!("_{}", group(&sub)));
                    }
                    if !sup.trim().is_empty() {
                        out.push_str(&format!("^{}", group(&sup)));
                    }
                }
                out
            };
            let post = scripts(parts.get(1..split).unwrap_or(&[]));
            let pre = scripts(parts.get(split + 1..).unwrap_or(&[]));
            if pre.is_empty() {
                format!("{}{post}", group(&base))
            } else {
                format!("{{}}{pre}{}{post}", group(&base))
            }
        }

        "mtable" => {
            let rows: Vec<String> = el
                .children_named("mtr")
                .map(|row| {
                    row.children_named("mtd")
                        .map(|cell| children(cell).trim().to_string())
                        .collect::<Vec<_>>()
                        .join(" & ")
                })
                .collect();
            format!("\\begin{{matrix}} {} \\end{{matrix}}", rows.join(" \\\\ "))
        }

        "mfenced" => {
            let open = el.attr("open").unwrap_or("(");
            let close = el.attr("close").unwrap_or(")");
            let sep = el.attr("separators").unwrap_or(",");
            let items: Vec<String> = el.elements().map(element).collect();
            format!("{}{}{}", symbols(open), items.join(sep), symbols(close))
        }

        "mphantom" => format!("\\phantom{{{}}}", children(el).trim()),

        // math, mrow, mstyle, mpadded, menclose and anything unknown
        _ => children(el),
    }
}
