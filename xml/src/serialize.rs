//! Re-emits a parsed document, either faithfully or pretty-printed.
//!
//! The faithful form writes attribute lexical values back out where they
//! were recorded, so character and entity references survive a round trip.
//! The indenting form only reflows element-only content and never touches
//! a subtree under `xml:space="preserve"`.

use crate::dom::{Attribute, Document, Element, XmlNode};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndentStyle {
    None,
    Spaces(usize),
}

pub struct XmlWriter {
    indent: IndentStyle,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            indent: IndentStyle::None,
        }
    }

    pub fn pretty(width: usize) -> Self {
        Self {
            indent: IndentStyle::Spaces(width),
        }
    }

    pub fn write_document(&self, document: &Document) -> String {
        let mut out = String::new();
        for node in document.nodes() {
            match node {
                XmlNode::XmlDeclaration(decl) => {
                    out.push_str("<?xml version=\"");
                    out.push_str(decl.version());
                    out.push('"');
                    if let Some(encoding) = decl.encoding() {
                        out.push_str(" encoding=\"");
                        out.push_str(encoding);
                        out.push('"');
                    }
                    if let Some(standalone) = decl.standalone() {
                        out.push_str(" standalone=\"");
                        out.push_str(if standalone { "yes" } else { "no" });
                        out.push('"');
                    }
                    out.push_str("?>");
                    self.newline(&mut out, 0);
                }
                XmlNode::DocumentType(doctype) => {
                    out.push_str(&doctype.to_string());
                    self.newline(&mut out, 0);
                }
                XmlNode::Element(element) => self.write_element(&mut out, element, 0, false),
                XmlNode::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(&comment.value);
                    out.push_str("-->");
                    self.newline(&mut out, 0);
                }
                XmlNode::ProcessingInstruction(pi) => {
                    write_pi(&mut out, &pi.target, &pi.data);
                    self.newline(&mut out, 0);
                }
                _ => {}
            }
        }
        out
    }

    fn newline(&self, out: &mut String, depth: usize) {
        if let IndentStyle::Spaces(width) = self.indent {
            out.push('\n');
            for _ in 0..depth * width {
                out.push(' ');
            }
        }
    }

    fn write_element(&self, out: &mut String, element: &Element, depth: usize, preserve: bool) {
        out.push('<');
        out.push_str(element.name());
        for attribute in element.attributes() {
            write_attribute(out, attribute);
        }

        if element.children().is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');

        let preserve = preserve
            || matches!(element.attribute_value("xml:space"), Some("preserve"));
        let reflow = !preserve
            && matches!(self.indent, IndentStyle::Spaces(_))
            && element.children().iter().all(|child| match child {
                XmlNode::Text(t) => t.value.chars().all(|c| c.is_ascii_whitespace()),
                XmlNode::Cdata(_) => false,
                _ => true,
            });

        for child in element.children() {
            if reflow {
                if matches!(child, XmlNode::Text(_)) {
                    continue;
                }
                self.newline(out, depth + 1);
            }
            match child {
                XmlNode::Element(child) => self.write_element(out, child, depth + 1, preserve),
                XmlNode::Text(text) => escape_text(out, &text.value),
                XmlNode::Cdata(cdata) => {
                    out.push_str("<![CDATA[");
                    out.push_str(&cdata.value);
                    out.push_str("]]>");
                }
                XmlNode::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(&comment.value);
                    out.push_str("-->");
                }
                XmlNode::ProcessingInstruction(pi) => write_pi(out, &pi.target, &pi.data),
                _ => {}
            }
        }
        if reflow {
            self.newline(out, depth);
        }

        out.push_str("</");
        out.push_str(element.name());
        out.push('>');
    }
}

fn write_pi(out: &mut String, target: &str, data: &str) {
    out.push_str("<?");
    out.push_str(target);
    if !data.is_empty() {
        out.push(' ');
        out.push_str(data);
    }
    out.push_str("?>");
}

fn write_attribute(out: &mut String, attribute: &Attribute) {
    out.push(' ');
    out.push_str(&attribute.name);
    out.push_str("=\"");
    match &attribute.lexical {
        // The recorded source text is re-emitted as long as it fits the
        // chosen delimiter.
        Some(lexical) if !lexical.contains('"') && !lexical.contains('<') => {
            out.push_str(lexical)
        }
        _ => escape_attribute(out, &attribute.value),
    }
    out.push('"');
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}

fn escape_text(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
