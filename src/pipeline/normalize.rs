//! Text normalisation: Unicode math folding and boilerplate stripping.
//!
//! Extracted worksheet text arrives full of artefacts from the source
//! document: styled letters from the Mathematical Alphanumeric Symbols block
//! (`𝑥`, `𝐀`, `𝟐`), raw operator glyphs, running footers, page numbers and
//! level banners. [`TextNormalizer::normalize`] folds all of these into plain
//! text in a fixed rule order:
//!
//! 1. Normalise line endings (CRLF/CR → LF)
//! 2. Strip invisible characters, turn NBSP into a space
//! 3. Fold styled math letters and digits to ASCII
//! 4. Replace operator and Greek glyphs: ASCII spellings in prose,
//!    TeX macros inside math spans
//! 5. Trim trailing whitespace per line
//! 6. Drop watermark / footer lines
//! 7. Collapse 3+ blank lines down to 2 and trim the ends
//!
//! Every rule only ever removes non-ASCII input or whole lines, so running
//! the normaliser twice gives the same result as running it once.

use crate::math::map_spans;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Normalise with the built-in watermark patterns only.
pub fn normalize(text: &str) -> String {
    TextNormalizer::default().normalize(text)
}

/// Text normaliser with an optional set of extra watermark patterns.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    extra_watermarks: Vec<Regex>,
}

impl TextNormalizer {
    /// Add watermark patterns on top of the built-in set.
    ///
    /// Each pattern is matched case-insensitively against the *whole*
    /// trimmed line.
    pub fn with_watermarks<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let extra_watermarks = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&format!("^(?:{})$", p.as_ref()))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { extra_watermarks })
    }

    pub fn normalize(&self, text: &str) -> String {
        let s = text.replace("\r\n", "\n").replace('\r', "\n");
        let s = remove_invisible_chars(&s);
        let s = fold_math_alphanumerics(&s);
        let s = fold_symbols(&s);

        let kept: Vec<&str> = s
            .lines()
            .map(str::trim_end)
            .filter(|line| !self.is_watermark(line.trim()))
            .collect();
        let joined = kept.join("\n");

        RE_BLANK_LINES
            .replace_all(&joined, "\n\n\n")
            .trim_matches('\n')
            .to_string()
    }

    /// Whether a trimmed line is boilerplate to drop.
    pub fn is_watermark(&self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        WATERMARKS.iter().any(|re| re.is_match(line))
            || self.extra_watermarks.iter().any(|re| re.is_match(line))
    }
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

static WATERMARKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // page numbers
        r"^page\s*\d+(\s*(of|/)\s*\d+)?$",
        r"^[-–—]\s*\d+\s*[-–—]$",
        r"^\d+\s*\|\s*page$",
        // level banners
        r"^(level|lvl)\s*[-:–]?\s*(\d+|[ivx]+)$",
        // program names
        r"^(jee\s*(main|advanced)?|neet(\s*ug)?|olympiad|foundation)(\s*(program(me)?|course|batch))?(\s*\d{4}(\s*-\s*\d{2,4})?)?$",
        // publisher footers
        r"^downloaded\s+from\b.*$",
        r"^(https?://|www\.)\S+$",
        r"^(©|\(c\)\s|copyright\b).*$",
        r"^all\s+rights\s+reserved\.?$",
        r"^(confidential|for\s+internal\s+use\s+only)\.?$",
    ]
    .iter()
    .map(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .unwrap()
    })
    .collect()
});

// ── Invisible characters ─────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .replace(
            [
                '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
            ],
            "",
        )
        .replace(['\u{00A0}', '\u{202F}', '\u{2009}'], " ")
}

// ── Mathematical alphanumerics ───────────────────────────────────────────

/// Fold styled letters/digits (bold, italic, script, fraktur, double-struck,
/// sans-serif, monospace, fullwidth) to their plain equivalents.
pub fn fold_math_alphanumerics(input: &str) -> String {
    input
        .chars()
        .map(|c| fold_math_char(c).unwrap_or(c))
        .collect()
}

fn fold_math_char(c: char) -> Option<char> {
    let cp = c as u32;
    match cp {
        // 13 Latin styles × 52 letters
        0x1D400..=0x1D6A3 => {
            let off = ((cp - 0x1D400) % 52) as u8;
            Some(if off < 26 {
                (b'A' + off) as char
            } else {
                (b'a' + off - 26) as char
            })
        }
        0x1D6A4 => Some('i'),
        0x1D6A5 => Some('j'),
        // 5 Greek styles × 58 symbols
        0x1D6A8..=0x1D7C9 => Some(math_greek((cp - 0x1D6A8) % 58)),
        // 5 digit styles × 10
        0x1D7CE..=0x1D7FF => Some((b'0' + ((cp - 0x1D7CE) % 10) as u8) as char),
        // fullwidth forms
        0xFF10..=0xFF19 => char::from_u32(cp - 0xFF10 + '0' as u32),
        0xFF21..=0xFF3A => char::from_u32(cp - 0xFF21 + 'A' as u32),
        0xFF41..=0xFF5A => char::from_u32(cp - 0xFF41 + 'a' as u32),
        _ => LETTERLIKE
            .iter()
            .find(|(from, _)| *from == c)
            .map(|(_, to)| *to),
    }
}

/// Greek symbol at `off` within one styled Greek run.
fn math_greek(off: u32) -> char {
    match off {
        17 => 'Θ', // ϴ, capital theta symbol
        0..=24 => char::from_u32(0x0391 + off).unwrap_or('?'),
        25 => '∇',
        26..=50 => char::from_u32(0x03B1 + off - 26).unwrap_or('?'),
        51 => '∂',
        52 => 'ε',
        53 => 'ϑ',
        54 => 'κ',
        55 => 'ϕ',
        56 => 'ρ',
        _ => 'ϖ',
    }
}

/// Letterlike symbols that fill the holes in the styled Latin runs.
const LETTERLIKE: &[(char, char)] = &[
    ('ℎ', 'h'), ('ℬ', 'B'), ('ℰ', 'E'), ('ℱ', 'F'), ('ℋ', 'H'), ('ℐ', 'I'),
    ('ℒ', 'L'), ('ℳ', 'M'), ('ℛ', 'R'), ('ℯ', 'e'), ('ℊ', 'g'), ('ℴ', 'o'),
    ('ℭ', 'C'), ('ℌ', 'H'), ('ℑ', 'I'), ('ℜ', 'R'), ('ℨ', 'Z'), ('ℂ', 'C'),
    ('ℍ', 'H'), ('ℕ', 'N'), ('ℙ', 'P'), ('ℚ', 'Q'), ('ℝ', 'R'), ('ℤ', 'Z'),
    ('ℓ', 'l'),
];

// ── Operators and Greek ──────────────────────────────────────────────────

/// `(glyph, prose spelling, TeX macro)`.
const SYMBOLS: &[(char, &str, &str)] = &[
    // operators
    ('×', "x", "\\times"),
    ('÷', "/", "\\div"),
    ('±', "+/-", "\\pm"),
    ('∓', "-/+", "\\mp"),
    ('·', "*", "\\cdot"),
    ('⋅', "*", "\\cdot"),
    ('∗', "*", "\\ast"),
    ('−', "-", "-"),
    ('–', "-", "-"),
    ('⁄', "/", "/"),
    ('≤', "<=", "\\leq"),
    ('⩽', "<=", "\\leq"),
    ('≥', ">=", "\\geq"),
    ('⩾', ">=", "\\geq"),
    ('≠', "!=", "\\neq"),
    ('≈', "~=", "\\approx"),
    ('≅', "~=", "\\cong"),
    ('≃', "~=", "\\simeq"),
    ('∼', "~", "\\sim"),
    ('≡', "==", "\\equiv"),
    ('∝', "prop. to", "\\propto"),
    ('∞', "infinity", "\\infty"),
    ('√', "sqrt", "\\sqrt"),
    ('∑', "sum", "\\sum"),
    ('∏', "prod", "\\prod"),
    ('∫', "integral", "\\int"),
    ('∮', "contour integral", "\\oint"),
    ('∂', "d", "\\partial"),
    ('∇', "nabla", "\\nabla"),
    ('∈', "in", "\\in"),
    ('∉', "not in", "\\notin"),
    ('∋', "contains", "\\ni"),
    ('⊂', "subset", "\\subset"),
    ('⊆', "subseteq", "\\subseteq"),
    ('⊃', "superset", "\\supset"),
    ('⊇', "supseteq", "\\supseteq"),
    ('∪', "union", "\\cup"),
    ('∩', "intersection", "\\cap"),
    ('∅', "empty set", "\\emptyset"),
    ('∀', "for all", "\\forall"),
    ('∃', "there exists", "\\exists"),
    ('¬', "not", "\\neg"),
    ('∧', "and", "\\wedge"),
    ('∨', "or", "\\vee"),
    ('→', "->", "\\rightarrow"),
    ('←', "<-", "\\leftarrow"),
    ('↔', "<->", "\\leftrightarrow"),
    ('⇒', "=>", "\\Rightarrow"),
    ('⇐', "<=", "\\Leftarrow"),
    ('⇔', "<=>", "\\Leftrightarrow"),
    ('↑', "^", "\\uparrow"),
    ('↓', "v", "\\downarrow"),
    ('⊥', "perp", "\\perp"),
    ('∥', "||", "\\parallel"),
    ('∠', "angle", "\\angle"),
    ('△', "triangle", "\\triangle"),
    ('°', " deg", "^\\circ"),
    ('∘', "o", "\\circ"),
    ('′', "'", "'"),
    ('″', "''", "''"),
    ('∴', "therefore", "\\therefore"),
    ('∵', "because", "\\because"),
    ('…', "...", "\\ldots"),
    ('⋯', "...", "\\cdots"),
    ('ℏ', "hbar", "\\hbar"),
    ('Å', "A", "\\AA"),
    ('½', "1/2", "\\frac{1}{2}"),
    ('⅓', "1/3", "\\frac{1}{3}"),
    ('¼', "1/4", "\\frac{1}{4}"),
    ('¾', "3/4", "\\frac{3}{4}"),
    // lowercase Greek
    ('α', "alpha", "\\alpha"),
    ('β', "beta", "\\beta"),
    ('γ', "gamma", "\\gamma"),
    ('δ', "delta", "\\delta"),
    ('ε', "epsilon", "\\varepsilon"),
    ('ϵ', "epsilon", "\\epsilon"),
    ('ζ', "zeta", "\\zeta"),
    ('η', "eta", "\\eta"),
    ('θ', "theta", "\\theta"),
    ('ϑ', "theta", "\\vartheta"),
    ('ι', "iota", "\\iota"),
    ('κ', "kappa", "\\kappa"),
    ('λ', "lambda", "\\lambda"),
    ('μ', "mu", "\\mu"),
    ('µ', "mu", "\\mu"),
    ('ν', "nu", "\\nu"),
    ('ξ', "xi", "\\xi"),
    ('ο', "o", "o"),
    ('π', "pi", "\\pi"),
    ('ϖ', "pi", "\\varpi"),
    ('ρ', "rho", "\\rho"),
    ('ς', "sigma", "\\varsigma"),
    ('σ', "sigma", "\\sigma"),
    ('τ', "tau", "\\tau"),
    ('υ', "upsilon", "\\upsilon"),
    ('φ', "phi", "\\varphi"),
    ('ϕ', "phi", "\\phi"),
    ('χ', "chi", "\\chi"),
    ('ψ', "psi", "\\psi"),
    ('ω', "omega", "\\omega"),
    // uppercase Greek
    ('Α', "A", "A"),
    ('Β', "B", "B"),
    ('Γ', "Gamma", "\\Gamma"),
    ('Δ', "Delta", "\\Delta"),
    ('Ε', "E", "E"),
    ('Ζ', "Z", "Z"),
    ('Η', "H", "H"),
    ('Θ', "Theta", "\\Theta"),
    ('Ι', "I", "I"),
    ('Κ', "K", "K"),
    ('Λ', "Lambda", "\\Lambda"),
    ('Μ', "M", "M"),
    ('Ν', "N", "N"),
    ('Ξ', "Xi", "\\Xi"),
    ('Ο', "O", "O"),
    ('Π', "Pi", "\\Pi"),
    ('Ρ', "P", "P"),
    ('Σ', "Sigma", "\\Sigma"),
    ('Τ', "T", "T"),
    ('Υ', "Upsilon", "\\Upsilon"),
    ('Φ', "Phi", "\\Phi"),
    ('Χ', "X", "X"),
    ('Ψ', "Psi", "\\Psi"),
    ('Ω', "Omega", "\\Omega"),
];

const SUPERSCRIPTS: &[(char, char)] = &[
    ('⁰', '0'), ('¹', '1'), ('²', '2'), ('³', '3'), ('⁴', '4'), ('⁵', '5'),
    ('⁶', '6'), ('⁷', '7'), ('⁸', '8'), ('⁹', '9'), ('⁺', '+'), ('⁻', '-'),
    ('⁼', '='), ('⁽', '('), ('⁾', ')'), ('ⁿ', 'n'), ('ⁱ', 'i'),
];

const SUBSCRIPTS: &[(char, char)] = &[
    ('₀', '0'), ('₁', '1'), ('₂', '2'), ('₃', '3'), ('₄', '4'), ('₅', '5'),
    ('₆', '6'), ('₇', '7'), ('₈', '8'), ('₉', '9'), ('₊', '+'), ('₋', '-'),
    ('₌', '='), ('₍', '('), ('₎', ')'),
];

/// TeX macro for a single glyph, if it has one.
pub fn symbol_latex(c: char) -> Option<&'static str> {
    SYMBOLS.iter().find(|(g, _, _)| *g == c).map(|(_, _, tex)| *tex)
}

/// Replace glyphs with their prose spellings (`≤` → `<=`, `α` → `alpha`).
pub fn symbols_to_ascii(text: &str) -> String {
    substitute(text, false)
}

/// Replace glyphs with TeX macros (`≤` → `\leq`, `x²` → `x^{2}`).
pub fn symbols_to_latex(text: &str) -> String {
    substitute(text, true)
}

/// Span-aware folding: prose gets ASCII spellings, math bodies get macros.
pub fn fold_symbols(text: &str) -> String {
    map_spans(text, symbols_to_ascii, symbols_to_latex)
}

fn substitute(text: &str, tex: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // runs of super/subscripts become one group: x²³ → x^{23}
        if let Some((table, marker)) = script_table(c) {
            let mut run = String::new();
            while let Some(plain) = chars.get(i).and_then(|&ch| lookup(table, ch)) {
                run.push(plain);
                i += 1;
            }
            out.push(marker);
            if tex {
                out.push('{');
                out.push_str(&run);
                out.push('}');
            } else {
                out.push_str(&run);
            }
            continue;
        }

        match SYMBOLS.iter().find(|(g, _, _)| *g == c) {
            Some((_, ascii, macro_)) => {
                if tex {
                    out.push_str(macro_);
                    // keep `\alpha x` from fusing into `\alphax`
                    let next_is_letter = chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic());
                    if macro_.starts_with('\\')
                        && macro_.ends_with(|ch: char| ch.is_ascii_alphabetic())
                        && next_is_letter
                    {
                        out.push(' ');
                    }
                } else {
                    out.push_str(ascii);
                }
            }
            None => out.push(c),
        }
        i += 1;
    }
    out
}

fn script_table(c: char) -> Option<(&'static [(char, char)], char)> {
    if lookup(SUPERSCRIPTS, c).is_some() {
        Some((SUPERSCRIPTS, '^'))
    } else if lookup(SUBSCRIPTS, c).is_some() {
        Some((SUBSCRIPTS, '_'))
    } else {
        None
    }
}

fn lookup(table: &[(char, char)], c: char) -> Option<char> {
    table.iter().find(|(from, _)| *from == c).map(|(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn folds_styled_letters_and_digits() {
        assert_eq!(fold_math_alphanumerics("𝑥 + 𝐀 = 𝟐"), "x + A = 2");
        assert_eq!(fold_math_alphanumerics("𝓛𝓸𝓰"), "Log");
        assert_eq!(fold_math_alphanumerics("ℎ𝑣"), "hv");
        assert_eq!(fold_math_alphanumerics("ℝ"), "R");
    }

    #[test]
    fn folds_styled_greek() {
        // U+1D6FC MATHEMATICAL ITALIC SMALL ALPHA
        assert_eq!(fold_math_alphanumerics("\u{1D6FC}"), "α");
        // U+1D6B9 MATHEMATICAL BOLD CAPITAL THETA SYMBOL
        assert_eq!(fold_math_alphanumerics("\u{1D6B9}"), "Θ");
    }

    #[test]
    fn prose_gets_ascii_math_gets_macros() {
        assert_eq!(fold_symbols("a ≤ b and $a ≤ b$"), "a <= b and $a \\leq b$");
        assert_eq!(fold_symbols("angle θ, $θx$"), "angle theta, $\\theta x$");
    }

    #[test]
    fn superscript_runs_group() {
        assert_eq!(symbols_to_latex("x²³"), "x^{23}");
        assert_eq!(symbols_to_ascii("x²"), "x^2");
        assert_eq!(symbols_to_latex("H₂O"), "H_{2}O");
    }

    #[test]
    fn strips_watermarks_and_page_numbers() {
        let input = "1. What is 2+2?\nPage 3 of 10\n- 4 -\nLevel - II\nA. 4\nDownloaded from example.org";
        let out = normalize(input);
        assert_eq!(out, "1. What is 2+2?\nA. 4");
    }

    #[test]
    fn extra_watermark_patterns_match_whole_line() {
        let n = TextNormalizer::with_watermarks(&["acme academy"]).unwrap();
        assert_eq!(n.normalize("ACME Academy\nWelcome to Acme Academy"), "Welcome to Acme Academy");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(normalize("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(normalize("\n\n\na\n\n"), "a");
    }

    #[test]
    fn invalid_extra_pattern_is_error() {
        assert!(TextNormalizer::with_watermarks(&["(unclosed"]).is_err());
    }

    #[test]
    fn idempotent_on_samples() {
        for s in [
            "x²³ + $y²$ ≤ 5 × 3",
            "$x$½ and ½$y$",
            "α$β$γ\r\n\r\n\r\n\r\nPage 1",
            "𝐀 ⇒ 𝐁\n\n\n\n  \n\n",
            "$$\nΣ x_i\n$$",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input: {s:?}");
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-z0-9 $\\\\(){}^_\\n²³αβ≤×𝑥𝟐½°→-]{0,80}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
