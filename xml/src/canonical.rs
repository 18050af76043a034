//! Canonical XML 1.0 serialization (inclusive form, without comments).
//!
//! The writer takes a finished [`Document`] and produces the byte-exact
//! normal form used by signers: XML declaration, document type and comments
//! are omitted, attributes are sorted by full name in code-point order,
//! no tag is self-closing, and stored numeric character references win over
//! their expansion so signer-visible bytes survive a round trip.

use crate::dom::{Attribute, Document, Element, ProcessingInstruction, XmlNode};

pub fn canonicalize(document: &Document) -> String {
    let mut out = String::new();
    for node in document.nodes() {
        match node {
            XmlNode::Element(element) => write_element(&mut out, element),
            XmlNode::ProcessingInstruction(pi) => write_pi(&mut out, pi),
            // Declaration, doctype and comments are dropped from the
            // canonical form.
            _ => {}
        }
    }
    out
}

pub fn canonicalize_to_bytes(document: &Document) -> Vec<u8> {
    canonicalize(document).into_bytes()
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(element.name());

    let mut attributes: Vec<&Attribute> = element.attributes().iter().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    for attribute in attributes {
        out.push(' ');
        out.push_str(&attribute.name);
        out.push_str("=\"");
        match &attribute.lexical {
            // A stored numeric reference is part of the signed bytes.
            Some(lexical) if lexical.contains("&#") => out.push_str(lexical),
            _ => escape_attribute(out, &attribute.value),
        }
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        match child {
            XmlNode::Element(child) => write_element(out, child),
            XmlNode::Text(text) => escape_text(out, &text.value),
            // CDATA sections are emitted as their character content.
            XmlNode::Cdata(cdata) => escape_text(out, &cdata.value),
            XmlNode::ProcessingInstruction(pi) => write_pi(out, pi),
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
}

fn write_pi(out: &mut String, pi: &ProcessingInstruction) {
    out.push_str("<?");
    out.push_str(&pi.target);
    out.push(' ');
    if !pi.data.trim().is_empty() {
        out.push_str(&pi.data);
    }
    out.push_str("?>");
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}

fn escape_text(out: &mut String, value: &str) {
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => {
                out.push_str("&#13;");
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    out.push_str("&#10;");
                }
            }
            '\n' => out.push_str("&#10;"),
            c => out.push(c),
        }
    }
}
