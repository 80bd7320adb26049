//! In-process OMML → MathML transform.
//!
//! This is a compiled rendition of the XSLT 1.0 `OMML2MML` mapping that ships
//! with word processors: each OMML construct becomes the MathML element the
//! stylesheet would emit. It serves the same role as running the stylesheet
//! through an XSLT engine, without needing one in the process.

use super::xml::XmlElement;
use crate::error::TransformError;
use std::fmt::Write as _;

const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

/// Transform one `m:oMath` element into a `<math>` document.
pub fn omml_to_mathml(omath: &XmlElement) -> Result<String, TransformError> {
    let mut out = String::new();
    let _ = write!(out, "<math xmlns=\"{MATHML_NS}\">");
    out.push_str(&children(omath, Ctx::default())?);
    out.push_str("</math>");
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    /// Inside `m:fName`: letter runs stay whole (`sin`, not `s i n`).
    function_name: bool,
}

const FUNCTION_NAME: Ctx = Ctx {
    function_name: true,
};

fn children(el: &XmlElement, ctx: Ctx) -> Result<String, TransformError> {
    let mut out = String::new();
    for child in el.elements() {
        out.push_str(&node(child, ctx)?);
    }
    Ok(out)
}

/// `<mrow>` around the children of an argument slot, empty when absent.
fn slot(el: &XmlElement, name: &str, ctx: Ctx) -> Result<String, TransformError> {
    match el.child(name) {
        Some(arg) => Ok(format!("<mrow>{}</mrow>", children(arg, ctx)?)),
        None => Ok("<mrow/>".to_string()),
    }
}

/// `m:val` of a property element, e.g. `<m:dPr><m:begChr m:val="["/></m:dPr>`.
fn prop<'a>(el: &'a XmlElement, pr: &str, name: &str) -> Option<&'a str> {
    el.child(pr)?.child(name)?.attr("val")
}

fn is_on(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("on") | Some("true"))
}

fn node(el: &XmlElement, ctx: Ctx) -> Result<String, TransformError> {
    let name = el.local_name();
    match name {
        // property bags carry no content
        n if n.ends_with("Pr") => Ok(String::new()),

        "oMath" | "oMathPara" => children(el, ctx),

        // argument containers
        "e" | "num" | "den" | "sub" | "sup" | "deg" | "lim" => {
            Ok(format!("<mrow>{}</mrow>", children(el, ctx)?))
        }
        "fName" => Ok(format!("<mrow>{}</mrow>", children(el, FUNCTION_NAME)?)),

        "r" => Ok(run(el, ctx)),

        "f" => {
            let kind = prop(el, "fPr", "type").unwrap_or("bar");
            let attrs = match kind {
                "noBar" => " linethickness=\"0\"",
                "skw" | "lin" => " bevelled=\"true\"",
                _ => "",
            };
            Ok(format!(
                "<mfrac{attrs}>{}{}</mfrac>",
                slot(el, "num", ctx)?,
                slot(el, "den", ctx)?
            ))
        }

        "sSup" => Ok(format!(
            "<msup>{}{}</msup>",
            slot(el, "e", ctx)?,
            slot(el, "sup", ctx)?
        )),
        "sSub" => Ok(format!(
            "<msub>{}{}</msub>",
            slot(el, "e", ctx)?,
            slot(el, "sub", ctx)?
        )),
        "sSubSup" => Ok(format!(
            "<msubsup>{}{}{}</msubsup>",
            slot(el, "e", ctx)?,
            slot(el, "sub", ctx)?,
            slot(el, "sup", ctx)?
        )),
        "sPre" => Ok(format!(
            "<mmultiscripts>{}<mprescripts/>{}{}</mmultiscripts>",
            slot(el, "e", ctx)?,
            slot(el, "sub", ctx)?,
            slot(el, "sup", ctx)?
        )),

        "rad" => {
            let hide_degree = is_on(prop(el, "radPr", "degHide"));
            let has_degree = el.child("deg").is_some_and(|d| d.elements().next().is_some());
            if hide_degree || !has_degree {
                Ok(format!("<msqrt>{}</msqrt>", slot(el, "e", ctx)?))
            } else {
                Ok(format!(
                    "<mroot>{}{}</mroot>",
                    slot(el, "e", ctx)?,
                    slot(el, "deg", ctx)?
                ))
            }
        }

        "d" => {
            let open = prop(el, "dPr", "begChr").unwrap_or("(");
            let close = prop(el, "dPr", "endChr").unwrap_or(")");
            let sep = prop(el, "dPr", "sepChr").unwrap_or("|");
            let mut out = String::from("<mrow>");
            if !open.is_empty() {
                out.push_str(&mo(open));
            }
            for (i, arg) in el.children_named("e").enumerate() {
                if i > 0 {
                    out.push_str(&mo(sep));
                }
                out.push_str(&format!("<mrow>{}</mrow>", children(arg, ctx)?));
            }
            if !close.is_empty() {
                out.push_str(&mo(close));
            }
            out.push_str("</mrow>");
            Ok(out)
        }

        "nary" => {
            let chr = prop(el, "naryPr", "chr").unwrap_or("\u{222B}");
            let under_over = prop(el, "naryPr", "limLoc") == Some("undOvr");
            let hide_sub = is_on(prop(el, "naryPr", "subHide"));
            let hide_sup = is_on(prop(el, "naryPr", "supHide"));
            let op = mo(chr);
            let sub = slot(el, "sub", ctx)?;
            let sup = slot(el, "sup", ctx)?;
            let (lower, upper, both) = if under_over {
                ("munder", "mover", "munderover")
            } else {
                ("msub", "msup", "msubsup")
            };
            let head = match (hide_sub, hide_sup) {
                (true, true) => op,
                (false, true) => format!("<{lower}>{op}{sub}</{lower}>"),
                (true, false) => format!("<{upper}>{op}{sup}</{upper}>"),
                (false, false) => format!("<{both}>{op}{sub}{sup}</{both}>"),
            };
            Ok(format!("<mrow>{head}{}</mrow>", slot(el, "e", ctx)?))
        }

        "func" => Ok(format!(
            "<mrow>{}<mo>\u{2061}</mo>{}</mrow>",
            slot(el, "fName", FUNCTION_NAME)?,
            slot(el, "e", ctx)?
        )),

        "acc" => {
            let chr = prop(el, "accPr", "chr").unwrap_or("\u{0302}");
            Ok(format!(
                "<mover accent=\"true\">{}{}</mover>",
                slot(el, "e", ctx)?,
                mo(chr)
            ))
        }

        "bar" => {
            if prop(el, "barPr", "pos") == Some("top") {
                Ok(format!(
                    "<mover accent=\"true\">{}{}</mover>",
                    slot(el, "e", ctx)?,
                    mo("\u{00AF}")
                ))
            } else {
                Ok(format!(
                    "<munder underaccent=\"true\">{}{}</munder>",
                    slot(el, "e", ctx)?,
                    mo("\u{0332}")
                ))
            }
        }

        "groupChr" => {
            let chr = prop(el, "groupChrPr", "chr").unwrap_or("\u{23DF}");
            if prop(el, "groupChrPr", "pos") == Some("top") {
                Ok(format!("<mover>{}{}</mover>", slot(el, "e", ctx)?, mo(chr)))
            } else {
                Ok(format!("<munder>{}{}</munder>", slot(el, "e", ctx)?, mo(chr)))
            }
        }

        "limLow" => Ok(format!(
            "<munder>{}{}</munder>",
            slot(el, "e", ctx)?,
            slot(el, "lim", ctx)?
        )),
        "limUpp" => Ok(format!(
            "<mover>{}{}</mover>",
            slot(el, "e", ctx)?,
            slot(el, "lim", ctx)?
        )),

        "m" => {
            let mut out = String::from("<mtable>");
            for row in el.children_named("mr") {
                out.push_str("<mtr>");
                for cell in row.children_named("e") {
                    out.push_str(&format!("<mtd>{}</mtd>", children(cell, ctx)?));
                }
                out.push_str("</mtr>");
            }
            out.push_str("</mtable>");
            Ok(out)
        }

        "eqArr" => {
            let mut out = String::from("<mtable>");
            for row in el.children_named("e") {
                out.push_str(&format!("<mtr><mtd>{}</mtd></mtr>", children(row, ctx)?));
            }
            out.push_str("</mtable>");
            Ok(out)
        }

        "phant" => {
            let shown = prop(el, "phantPr", "show") != Some("0");
            let body = slot(el, "e", ctx)?;
            if shown {
                Ok(body)
            } else {
                Ok(format!("<mphantom>{body}</mphantom>"))
            }
        }

        "box" | "borderBox" => slot(el, "e", ctx),

        // control characters and bookmarks carry nothing
        "ctrlPr" | "bookmarkStart" | "bookmarkEnd" | "proofErr" => Ok(String::new()),

        other => Err(TransformError::Failed(format!(
            "unsupported OMML element <{other}>"
        ))),
    }
}

fn mo(text: &str) -> String {
    format!("<mo>{}</mo>", quick_xml::escape::escape(text))
}

/// Tokenise a math run into `mi`/`mn`/`mo`, or `mtext` for normal-text runs.
fn run(el: &XmlElement, ctx: Ctx) -> String {
    let text: String = el
        .elements()
        .filter(|c| c.local_name() == "t")
        .map(XmlElement::text)
        .collect();
    // <m:nor/> with no value means "on"
    let normal_text = el
        .child("rPr")
        .and_then(|pr| pr.child("nor"))
        .is_some_and(|nor| is_on(Some(nor.attr("val").unwrap_or("1"))));
    if normal_text {
        return format!("<mtext>{}</mtext>", quick_xml::escape::escape(text.as_str()));
    }

    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let n: String = chars[start..i].iter().collect();
            let _ = write!(out, "<mn>{n}</mn>");
        } else if c.is_alphabetic() {
            if ctx.function_name {
                let start = i;
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let _ = write!(out, "<mi>{word}</mi>");
            } else {
                let _ = write!(out, "<mi>{c}</mi>");
                i += 1;
            }
        } else {
            out.push_str(&mo(&c.to_string()));
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::xml::parse;

    fn convert(omml: &str) -> Result<String, TransformError> {
        let wrapped = format!("<m:oMath xmlns:m=\"urn:m\">{omml}</m:oMath>");
        omml_to_mathml(&parse(&wrapped).unwrap())
    }

    fn r(t: &str) -> String {
        format!("<m:r><m:t>{t}</m:t></m:r>")
    }

    #[test]
    fn run_tokenises_identifiers_numbers_operators() {
        let out = convert(&r("2x+10")).unwrap();
        assert!(out.contains("<mn>2</mn><mi>x</mi><mo>+</mo><mn>10</mn>"), "{out}");
    }

    #[test]
    fn fraction_and_superscript() {
        let omml = format!(
            "<m:f><m:num>{}</m:num><m:den>{}</m:den></m:f><m:sSup><m:e>{}</m:e><m:sup>{}</m:sup></m:sSup>",
            r("a"),
            r("b"),
            r("x"),
            r("2")
        );
        let out = convert(&omml).unwrap();
        assert!(out.contains("<mfrac><mrow><mi>a</mi></mrow><mrow><mi>b</mi></mrow></mfrac>"), "{out}");
        assert!(out.contains("<msup><mrow><mi>x</mi></mrow><mrow><mn>2</mn></mrow></msup>"), "{out}");
    }

    #[test]
    fn radical_without_degree_is_sqrt() {
        let omml = format!(
            "<m:rad><m:radPr><m:degHide m:val=\"1\"/></m:radPr><m:deg/><m:e>{}</m:e></m:rad>",
            r("x")
        );
        assert!(convert(&omml).unwrap().contains("<msqrt>"));
    }

    #[test]
    fn delimiter_uses_configured_chars() {
        let omml = format!(
            "<m:d><m:dPr><m:begChr m:val=\"[\"/><m:endChr m:val=\"]\"/></m:dPr><m:e>{}</m:e></m:d>",
            r("x")
        );
        let out = convert(&omml).unwrap();
        assert!(out.contains("<mo>[</mo><mrow><mi>x</mi></mrow><mo>]</mo>"), "{out}");
    }

    #[test]
    fn function_name_stays_whole() {
        let omml = format!(
            "<m:func><m:fName>{}</m:fName><m:e>{}</m:e></m:func>",
            r("sin"),
            r("x")
        );
        assert!(convert(&omml).unwrap().contains("<mi>sin</mi>"));
    }

    #[test]
    fn unknown_element_fails_this_equation() {
        let err = convert("<m:mystery/>").unwrap_err();
        assert!(matches!(err, TransformError::Failed(_)));
    }
}
