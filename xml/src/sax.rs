//! SAX2-style event interface between the scanner and its consumers.
//!
//! Every callback returns a `Result` so that any handler can cancel the
//! parse; the scanner stops at the first error, releases the reader and
//! propagates the cause. The default implementations ignore the event.

use crate::error::XmlError;

/// An attribute as it was scanned, before any tree exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaxAttribute {
    /// Qualified name as written, possibly prefixed.
    pub name: String,
    /// Value after reference expansion and attribute-value normalization.
    pub value: String,
    /// The raw attribute text, kept only when it differs from `value` (it
    /// contained a character or entity reference). The canonicalizer uses
    /// it to preserve signer-visible numeric references.
    pub lexical: Option<String>,
    /// `false` for attributes injected from a grammar default.
    pub specified: bool,
}

impl SaxAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            lexical: None,
            specified: true,
        }
    }

    pub fn defaulted(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            specified: false,
            ..Self::new(name, value)
        }
    }
}

/// Receiver for scanner events.
///
/// Ordering guarantees: `start_document` first and `end_document` last;
/// every `start_element` of well-formed input is matched by exactly one
/// `end_element`; character runs arrive in order but may be split across
/// several `characters` calls; a CDATA run arrives as one or more
/// `characters` calls bracketed by `start_cdata`/`end_cdata`.
#[allow(unused_variables)]
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    /// The raw text between `[` and `]` of the document type declaration.
    fn internal_subset(&mut self, text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    /// White-space-only character data inside an element whose declared
    /// content is element-only.
    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    /// An entity reference that could not be expanded.
    fn skipped_entity(&mut self, name: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }
}
