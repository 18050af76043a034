//! Owned document tree. Every node kind is a variant of the [`XmlNode`]
//! sum; visitors match on the tag instead of downcasting. The numeric codes
//! of [`NodeKind`] are part of the external API and must not be reordered.

use std::fmt;

use crate::name::split_qname;

/// Node-kind codes carried out-of-band by foreign APIs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Document = 0,
    Element = 1,
    Attribute = 2,
    Cdata = 3,
    Comment = 4,
    ProcessingInstruction = 5,
    Text = 6,
    EntityDecl = 7,
    XmlDeclaration = 8,
    AttributeListDecl = 9,
    DocumentType = 10,
    AttributeDecl = 11,
    ElementDecl = 12,
    InternalSubset = 13,
    NotationDecl = 14,
}

impl NodeKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Document(Document),
    Element(Element),
    Attribute(Attribute),
    Cdata(Cdata),
    Comment(Comment),
    ProcessingInstruction(ProcessingInstruction),
    Text(Text),
    XmlDeclaration(XmlDeclaration),
    DocumentType(DocumentType),
}

impl XmlNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Document(_) => NodeKind::Document,
            Self::Element(_) => NodeKind::Element,
            Self::Attribute(_) => NodeKind::Attribute,
            Self::Cdata(_) => NodeKind::Cdata,
            Self::Comment(_) => NodeKind::Comment,
            Self::ProcessingInstruction(_) => NodeKind::ProcessingInstruction,
            Self::Text(_) => NodeKind::Text,
            Self::XmlDeclaration(_) => NodeKind::XmlDeclaration,
            Self::DocumentType(_) => NodeKind::DocumentType,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// Root of a parsed document. Owns the ordered top-level node sequence:
/// at most one XML declaration (always first when present), at most one
/// document type, and exactly one root element after a successful parse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    nodes: Vec<XmlNode>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: XmlNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[XmlNode] {
        &self.nodes
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(XmlNode::as_element)
    }

    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.nodes.iter().find_map(|n| match n {
            XmlNode::XmlDeclaration(d) => Some(d),
            _ => None,
        })
    }

    pub fn doctype(&self) -> Option<&DocumentType> {
        self.nodes.iter().find_map(|n| match n {
            XmlNode::DocumentType(d) => Some(d),
            _ => None,
        })
    }
}

/// An element: qualified name, uniquely-named attributes in insertion
/// order, and an ordered child sequence in which no two adjacent children
/// are text nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Inserts or replaces by attribute name; the original position is kept
    /// on replacement so serialization stays faithful.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(|a| a.value.as_str())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Appends a child, merging a text node into a trailing text sibling.
    pub fn append_child(&mut self, node: XmlNode) {
        if let XmlNode::Text(text) = &node {
            if let Some(XmlNode::Text(last)) = self.children.last_mut() {
                last.value.push_str(&text.value);
                return;
            }
        }
        self.children.push(node);
    }

    /// Removes and returns the child at `index`, severing its ownership.
    pub fn remove_child(&mut self, index: usize) -> XmlNode {
        self.children.remove(index)
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// Concatenated character data of the element's text and CDATA
    /// children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(&t.value),
                XmlNode::Cdata(c) => out.push_str(&c.value),
                _ => {}
            }
        }
        out
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Value after reference expansion and normalization.
    pub value: String,
    /// The attribute text as written when it contained references.
    pub lexical: Option<String>,
    /// Declared type name, populated by a DTD or schema grammar.
    pub declared_type: Option<String>,
    /// `false` when the value was injected from a grammar default.
    pub specified: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            lexical: None,
            declared_type: None,
            specified: true,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Text {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cdata {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlDeclaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<bool>,
}

impl XmlDeclaration {
    pub fn new(version: impl Into<String>, encoding: Option<String>, standalone: Option<bool>) -> Self {
        Self {
            version: version.into(),
            encoding,
            standalone,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The declared encoding. Never the version.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn standalone(&self) -> Option<bool> {
        self.standalone
    }
}

#[derive(Clone, Debug, Eq)]
pub struct DocumentType {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: Option<String>,
}

/// Document types compare by external identifier only.
impl PartialEq for DocumentType {
    fn eq(&self, other: &Self) -> bool {
        self.public_id == other.public_id && self.system_id == other.system_id
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!DOCTYPE {}", self.name)?;
        match (&self.public_id, &self.system_id) {
            (Some(public), Some(system)) => write!(f, " PUBLIC \"{}\" \"{}\"", public, system)?,
            (None, Some(system)) => write!(f, " SYSTEM \"{}\"", system)?,
            _ => {}
        }
        if let Some(subset) = &self.internal_subset {
            write!(f, " [{}]", subset)?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_text_children_merge() {
        let mut element = Element::new("p");
        element.append_child(XmlNode::Text(Text { value: "a".into() }));
        element.append_child(XmlNode::Text(Text { value: "b".into() }));
        assert_eq!(element.children().len(), 1);
        assert_eq!(element.text(), "ab");

        element.append_child(XmlNode::Comment(Comment { value: "x".into() }));
        element.append_child(XmlNode::Text(Text { value: "c".into() }));
        assert_eq!(element.children().len(), 3);
        assert_eq!(element.text(), "abc");
    }

    #[test]
    fn attribute_names_stay_unique() {
        let mut element = Element::new("e");
        element.set_attribute(Attribute::new("a", "1"));
        element.set_attribute(Attribute::new("b", "2"));
        element.set_attribute(Attribute::new("a", "3"));
        assert_eq!(element.attributes().len(), 2);
        assert_eq!(element.attribute_value("a"), Some("3"));
        // Replacement keeps the original position.
        assert_eq!(element.attributes()[0].name, "a");
    }

    #[test]
    fn doctype_equality_ignores_name_and_subset() {
        let a = DocumentType {
            name: "doc".into(),
            public_id: Some("-//X//DTD".into()),
            system_id: Some("x.dtd".into()),
            internal_subset: Some("<!ELEMENT doc EMPTY>".into()),
        };
        let b = DocumentType {
            name: "other".into(),
            public_id: Some("-//X//DTD".into()),
            system_id: Some("x.dtd".into()),
            internal_subset: None,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn node_kind_codes_are_stable() {
        assert_eq!(NodeKind::Document.code(), 0);
        assert_eq!(NodeKind::Element.code(), 1);
        assert_eq!(NodeKind::Attribute.code(), 2);
        assert_eq!(NodeKind::Cdata.code(), 3);
        assert_eq!(NodeKind::Comment.code(), 4);
        assert_eq!(NodeKind::ProcessingInstruction.code(), 5);
        assert_eq!(NodeKind::Text.code(), 6);
        assert_eq!(NodeKind::XmlDeclaration.code(), 8);
        assert_eq!(NodeKind::DocumentType.code(), 10);
        assert_eq!(NodeKind::NotationDecl.code(), 14);
    }

    #[test]
    fn declaration_reports_encoding_not_version() {
        let decl = XmlDeclaration::new("1.0", Some("UTF-8".into()), None);
        assert_eq!(decl.encoding(), Some("UTF-8"));
        assert_eq!(decl.version(), "1.0");
    }
}
