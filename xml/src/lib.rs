//! Streaming XML 1.0/1.1 front end: a byte reader with a BOM probe, a
//! hand-written scanner dispatching SAX-style events, a DOM builder, a
//! minimal DTD grammar, and faithful/canonical serializers.

pub mod builder;
pub mod canonical;
pub mod dom;
pub mod dtd;
pub mod error;
pub mod name;
pub mod reader;
pub mod sax;
pub mod scanner;
pub mod serialize;

pub use builder::TreeBuilder;
pub use canonical::{canonicalize, canonicalize_to_bytes};
pub use dom::{
    Attribute, Cdata, Comment, Document, DocumentType, Element, NodeKind, ProcessingInstruction,
    Text, XmlDeclaration, XmlNode,
};
pub use dtd::DtdGrammar;
pub use error::{ParseErrorKind, TextPosition, XmlError};
pub use reader::Reader;
pub use sax::{ContentHandler, SaxAttribute};
pub use scanner::{DtdResolver, Scanner};
pub use serialize::{IndentStyle, XmlWriter};

/// Parses an in-memory document into a DOM tree.
pub fn parse_str(text: &str) -> Result<Document, XmlError> {
    let mut builder = TreeBuilder::new();
    Scanner::new(Reader::from_str(text), &mut builder).parse()?;
    builder.into_document()
}

/// Opens, probes and parses a file into a DOM tree.
pub fn parse_file(path: impl AsRef<std::path::Path>) -> Result<Document, XmlError> {
    let mut builder = TreeBuilder::new();
    Scanner::new(Reader::open(path)?, &mut builder).parse()?;
    builder.into_document()
}
