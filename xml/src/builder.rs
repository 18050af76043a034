//! Content handler that reconstructs a [`Document`] from scanner events.

use crate::dom::{
    Attribute, Cdata, Comment, Document, DocumentType, Element, ProcessingInstruction, Text,
    XmlDeclaration, XmlNode,
};
use crate::error::XmlError;
use crate::sax::{ContentHandler, SaxAttribute};

#[derive(Default)]
pub struct TreeBuilder {
    top_level: Vec<XmlNode>,
    stack: Vec<Element>,
    pending_doctype: Option<DocumentType>,
    in_cdata: bool,
    finished: Option<Document>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished document; fails if `end_document` never fired.
    pub fn into_document(self) -> Result<Document, XmlError> {
        self.finished
            .ok_or_else(|| XmlError::Structural("document never finished".into()))
    }

    fn append(&mut self, node: XmlNode) {
        match self.stack.last_mut() {
            Some(parent) => parent.append_child(node),
            None => self.top_level.push(node),
        }
    }
}

impl ContentHandler for TreeBuilder {
    fn start_document(&mut self) -> Result<(), XmlError> {
        self.top_level.clear();
        self.stack.clear();
        self.finished = None;
        Ok(())
    }

    fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), XmlError> {
        self.top_level.push(XmlNode::XmlDeclaration(XmlDeclaration::new(
            version,
            encoding.map(str::to_string),
            standalone,
        )));
        Ok(())
    }

    fn start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        self.pending_doctype = Some(DocumentType {
            name: name.to_string(),
            public_id: public_id.map(str::to_string),
            system_id: system_id.map(str::to_string),
            internal_subset: None,
        });
        Ok(())
    }

    fn internal_subset(&mut self, text: &str) -> Result<(), XmlError> {
        if let Some(doctype) = &mut self.pending_doctype {
            doctype.internal_subset = Some(text.to_string());
        }
        Ok(())
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        if let Some(doctype) = self.pending_doctype.take() {
            self.top_level.push(XmlNode::DocumentType(doctype));
        }
        Ok(())
    }

    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        let mut element = Element::new(name);
        for attribute in attributes {
            element.set_attribute(Attribute {
                name: attribute.name.clone(),
                value: attribute.value.clone(),
                lexical: attribute.lexical.clone(),
                declared_type: None,
                specified: attribute.specified,
            });
        }
        self.stack.push(element);
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), XmlError> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| XmlError::Structural(format!("unexpected end of element {name:?}")))?;
        if element.name() != name {
            return Err(XmlError::Structural(format!(
                "end of element {:?} closed {:?}",
                name,
                element.name()
            )));
        }
        self.append(XmlNode::Element(element));
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        if self.stack.is_empty() {
            // Only the scanner's prolog/trailer white space lands here.
            return Ok(());
        }
        let node = if self.in_cdata {
            XmlNode::Cdata(Cdata {
                value: text.to_string(),
            })
        } else {
            XmlNode::Text(Text {
                value: text.to_string(),
            })
        };
        self.append(node);
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XmlError> {
        self.characters(text)
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.append(XmlNode::Comment(Comment {
            value: text.to_string(),
        }));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.append(XmlNode::ProcessingInstruction(ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        }));
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        self.in_cdata = true;
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        self.in_cdata = false;
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        if !self.stack.is_empty() {
            return Err(XmlError::Structural(format!(
                "{} element(s) still open at end of document",
                self.stack.len()
            )));
        }
        let roots = self
            .top_level
            .iter()
            .filter(|n| matches!(n, XmlNode::Element(_)))
            .count();
        if roots != 1 {
            return Err(XmlError::Structural(format!(
                "expected exactly one root element, found {roots}"
            )));
        }
        let mut document = Document::new();
        for node in self.top_level.drain(..) {
            document.push(node);
        }
        self.finished = Some(document);
        Ok(())
    }
}
