//! Minimal owned XML tree on top of `quick-xml`.
//!
//! Equation markup (OMML inside `word/document.xml`, MathML coming back from
//! a transform) is small and deeply nested, so it is easier to walk as a tree
//! than as an event stream. Only element and text nodes are kept; comments,
//! processing instructions and doctype declarations are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("XML document has no root element")]
    NoRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written in the source (`m:oMath`, `mml:mfrac`).
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Attribute value by local name (`m:val` and `val` both match `"val"`).
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| local(k) == local_name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.local_name() == local_name)
    }

    /// Concatenated text of this element and all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Add `xmlns*` declarations this element does not already carry.
    pub fn with_namespaces(mut self, namespaces: &[(String, String)]) -> Self {
        for (key, value) in namespaces {
            if !self.attrs.iter().any(|(k, _)| k == key) {
                self.attrs.push((key.clone(), value.clone()));
            }
        }
        self
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for node in &el.children {
        match node {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}

fn write_element(el: &XmlElement, out: &mut String) {
    let _ = write!(out, "<{}", el.name);
    for (k, v) in &el.attrs {
        let _ = write!(out, " {}=\"{}\"", k, quick_xml::escape::escape(v.as_str()));
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for node in &el.children {
        match node {
            XmlNode::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
            XmlNode::Element(e) => write_element(e, out),
        }
    }
    let _ = write!(out, "</{}>", el.name);
}

fn start_element(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

/// Parse a whole document and return its root element.
pub fn parse(xml: &str) -> Result<XmlElement, XmlError> {
    let mut found = None;
    walk(xml, |_| true, |el, _| {
        if found.is_none() {
            found = Some(el);
        }
    })?;
    found.ok_or(XmlError::NoRoot)
}

/// Every outermost element with local name `local_name`, plus the `xmlns*`
/// declarations of the document root so the fragments can be re-serialised
/// as standalone documents.
pub fn collect_outermost(
    xml: &str,
    local_name: &str,
) -> Result<(Vec<XmlElement>, Vec<(String, String)>), XmlError> {
    let mut found = Vec::new();
    let mut namespaces = Vec::new();
    walk(
        xml,
        |name| local(name) == local_name,
        |el, root_attrs| {
            if namespaces.is_empty() {
                namespaces = root_attrs
                    .iter()
                    .filter(|(k, _)| k == "xmlns" || k.starts_with("xmlns:"))
                    .cloned()
                    .collect();
            }
            found.push(el);
        },
    )?;
    Ok((found, namespaces))
}

/// Stream through `xml`, building subtrees only for outermost elements whose
/// qualified name passes `wanted`. Each finished subtree is passed to `emit`
/// together with the root element's attributes.
fn walk<W, E>(xml: &str, wanted: W, mut emit: E) -> Result<(), XmlError>
where
    W: Fn(&str) -> bool,
    E: FnMut(XmlElement, &[(String, String)]),
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut root_attrs: Option<Vec<(String, String)>> = None;
    // open elements of the subtree currently being built
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let is_empty = matches!(event, Event::Empty(_));
                let el = start_element(start)?;
                if root_attrs.is_none() {
                    root_attrs = Some(el.attrs.clone());
                }
                if !stack.is_empty() || wanted(&el.name) {
                    if is_empty {
                        close(&mut stack, el, root_attrs.as_deref(), &mut emit);
                    } else {
                        stack.push(el);
                    }
                }
                if !is_empty {
                    depth += 1;
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(XmlError::Malformed("unbalanced end tag".into()));
                }
                depth -= 1;
                if let Some(el) = stack.pop() {
                    close(&mut stack, el, root_attrs.as_deref(), &mut emit);
                }
            }
            Event::Text(ref text) => {
                if let Some(parent) = stack.last_mut() {
                    let t = text
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    push_text(parent, &t);
                }
            }
            Event::CData(ref data) => {
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, &String::from_utf8_lossy(data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unexpected end of document".into()));
    }
    Ok(())
}

fn close<E>(
    stack: &mut [XmlElement],
    el: XmlElement,
    root_attrs: Option<&[(String, String)]>,
    emit: &mut E,
) where
    E: FnMut(XmlElement, &[(String, String)]),
{
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None => emit(el, root_attrs.unwrap_or(&[])),
    }
}

fn push_text(parent: &mut XmlElement, text: &str) {
    if let Some(XmlNode::Text(prev)) = parent.children.last_mut() {
        prev.push_str(text);
    } else {
        parent.children.push(XmlNode::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<w:document xmlns:w="urn:w" xmlns:m="urn:m">
  <w:body>
    <w:p><w:r><w:t>Solve</w:t></w:r>
      <m:oMathPara><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath></m:oMathPara>
    </w:p>
    <w:p><m:oMath><m:f><m:num><m:r><m:t>1</m:t></m:r></m:num><m:den><m:r><m:t>2</m:t></m:r></m:den></m:f></m:oMath></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn collects_outermost_elements_with_root_namespaces() {
        let (found, ns) = collect_outermost(DOC, "oMath").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text(), "x");
        assert_eq!(found[1].child("f").unwrap().child("num").unwrap().text(), "1");
        assert!(ns.contains(&("xmlns:m".to_string(), "urn:m".to_string())));
    }

    #[test]
    fn parse_returns_root() {
        let root = parse("<a x=\"1\"><b>t &amp; u</b><c/></a>").unwrap();
        assert_eq!(root.local_name(), "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().text(), "t & u");
        assert!(root.child("c").is_some());
    }

    #[test]
    fn serialises_with_injected_namespaces() {
        let el = parse("<m:oMath><m:r><m:t>a&lt;b</m:t></m:r></m:oMath>").unwrap();
        let xml = el
            .with_namespaces(&[("xmlns:m".into(), "urn:m".into())])
            .to_xml();
        assert_eq!(
            xml,
            "<m:oMath xmlns:m=\"urn:m\"><m:r><m:t>a&lt;b</m:t></m:r></m:oMath>"
        );
    }

    #[test]
    fn malformed_input_is_error() {
        assert!(parse("<a><b></a>").is_err());
        assert_eq!(parse("just text"), Err(XmlError::NoRoot));
    }
}
