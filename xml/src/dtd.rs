//! Minimal document type definition grammar: element and attribute-list
//! declarations, the general-entity table and notation declarations.
//!
//! This is the interface the scanning pipeline needs from a DTD: entity
//! lookup during reference expansion, attribute defaulting, and
//! tokenized-type value normalization. Content models are kept in their
//! declared textual form; full DTD validation is a grammar-layer concern.

use std::collections::HashMap;

use crate::error::{ParseErrorKind, TextPosition, XmlError};
use crate::name::{is_name, is_xml_whitespace};

/// Declared attribute type (XML 1.0 §3.3.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttType {
    Cdata,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Enumeration(Vec<String>),
    Notation(Vec<String>),
}

impl AttType {
    /// Everything but CDATA gets the tokenized normalization of §3.3.3.
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::Cdata)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdata => "CDATA",
            Self::Id => "ID",
            Self::IdRef => "IDREF",
            Self::IdRefs => "IDREFS",
            Self::Entity => "ENTITY",
            Self::Entities => "ENTITIES",
            Self::NmToken => "NMTOKEN",
            Self::NmTokens => "NMTOKENS",
            Self::Enumeration(_) => "enumeration",
            Self::Notation(_) => "NOTATION",
        }
    }
}

/// Default declaration of an attribute (XML 1.0 §3.3.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultDecl {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

impl DefaultDecl {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Fixed(v) | Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttlistAttribute {
    pub name: String,
    pub att_type: AttType,
    pub default: DefaultDecl,
}

/// Declared element content, kept textual for the children form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// Names admitted beside character data; empty for pure `(#PCDATA)`.
    Mixed(Vec<String>),
    /// The content-model expression as written, parentheses included.
    Children(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DtdElement {
    pub name: String,
    pub content: ContentSpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    /// Replacement text for internal entities.
    pub value: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Notation name of an unparsed entity.
    pub ndata: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotationDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DtdGrammar {
    elements: HashMap<String, DtdElement>,
    attlists: HashMap<String, Vec<AttlistAttribute>>,
    entities: HashMap<String, EntityDecl>,
    notations: HashMap<String, NotationDecl>,
}

impl DtdGrammar {
    /// Parses the text between `[` and `]` of a document type declaration.
    /// Parameter entities are recognized and skipped; everything this
    /// grammar does not model is a hard error.
    pub fn parse_internal_subset(text: &str) -> Result<Self, XmlError> {
        let mut grammar = Self::default();
        grammar.extend_from_subset(text)?;
        Ok(grammar)
    }

    /// Parses additional declarations, keeping already-present ones. The
    /// internal subset is parsed first, so its declarations win over an
    /// external subset's, as required by XML 1.0 §2.8.
    pub fn extend_from_subset(&mut self, text: &str) -> Result<(), XmlError> {
        let mut cursor = SubsetCursor::new(text);
        while cursor.skip_insignificant()? {
            if cursor.eat("<!ELEMENT") {
                let decl = cursor.element_decl()?;
                self.elements.entry(decl.name.clone()).or_insert(decl);
            } else if cursor.eat("<!ATTLIST") {
                let (element, attributes) = cursor.attlist_decl()?;
                let list = self.attlists.entry(element).or_default();
                for attribute in attributes {
                    if !list.iter().any(|a| a.name == attribute.name) {
                        list.push(attribute);
                    }
                }
            } else if cursor.eat("<!ENTITY") {
                if let Some(decl) = cursor.entity_decl()? {
                    self.entities.entry(decl.name.clone()).or_insert(decl);
                }
            } else if cursor.eat("<!NOTATION") {
                let decl = cursor.notation_decl()?;
                self.notations.entry(decl.name.clone()).or_insert(decl);
            } else {
                return Err(cursor.error(ParseErrorKind::MalformedDecl));
            }
        }
        Ok(())
    }

    /// Folds externally loaded declarations in below the ones already
    /// present; the internal subset always wins (XML 1.0 §2.8).
    pub fn merge_external(&mut self, external: DtdGrammar) {
        for (name, decl) in external.elements {
            self.elements.entry(name).or_insert(decl);
        }
        for (element, attributes) in external.attlists {
            let list = self.attlists.entry(element).or_default();
            for attribute in attributes {
                if !list.iter().any(|a| a.name == attribute.name) {
                    list.push(attribute);
                }
            }
        }
        for (name, decl) in external.entities {
            self.entities.entry(name).or_insert(decl);
        }
        for (name, decl) in external.notations {
            self.notations.entry(name).or_insert(decl);
        }
    }

    pub fn element(&self, name: &str) -> Option<&DtdElement> {
        self.elements.get(name)
    }

    /// True when the element is declared with children-only content, which
    /// makes white-space runs inside it ignorable.
    pub fn has_element_content(&self, name: &str) -> bool {
        matches!(
            self.elements.get(name).map(|e| &e.content),
            Some(ContentSpec::Children(_))
        )
    }

    pub fn attributes_for(&self, element: &str) -> &[AttlistAttribute] {
        self.attlists.get(element).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attribute_decl(&self, element: &str, attribute: &str) -> Option<&AttlistAttribute> {
        self.attributes_for(element)
            .iter()
            .find(|a| a.name == attribute)
    }

    /// Replacement text of an internal general entity.
    pub fn entity_value(&self, name: &str) -> Option<&str> {
        self.entities.get(name).and_then(|e| e.value.as_deref())
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    pub fn notation(&self, name: &str) -> Option<&NotationDecl> {
        self.notations.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
            && self.attlists.is_empty()
            && self.entities.is_empty()
            && self.notations.is_empty()
    }

    /// Applies the tokenized-type normalization of XML 1.0 §3.3.3 when the
    /// attribute is declared with a non-CDATA type, otherwise returns the
    /// value untouched.
    pub fn normalize_attribute<'v>(
        &self,
        element: &str,
        attribute: &str,
        value: &'v str,
    ) -> std::borrow::Cow<'v, str> {
        match self.attribute_decl(element, attribute) {
            Some(decl) if decl.att_type.is_tokenized() => {
                let collapsed = value.split(' ').filter(|t| !t.is_empty());
                std::borrow::Cow::Owned(collapsed.collect::<Vec<_>>().join(" "))
            }
            _ => std::borrow::Cow::Borrowed(value),
        }
    }
}

/// Character cursor over declaration text.
struct SubsetCursor<'a> {
    rest: &'a str,
    consumed: usize,
}

impl<'a> SubsetCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text, consumed: 0 }
    }

    fn error(&self, kind: ParseErrorKind) -> XmlError {
        XmlError::parse(
            kind,
            TextPosition {
                byte: self.consumed,
                line: 1,
                column: self.consumed as u32 + 1,
            },
        )
    }

    fn advance(&mut self, n: usize) {
        self.consumed += n;
        self.rest = &self.rest[n..];
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest.starts_with(token) {
            self.advance(token.len());
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest.trim_start_matches(is_xml_whitespace);
        let n = self.rest.len() - trimmed.len();
        self.advance(n);
    }

    /// Skips white space, comments, processing instructions and parameter
    /// entity references. Returns false at the end of the subset.
    fn skip_insignificant(&mut self) -> Result<bool, XmlError> {
        loop {
            self.skip_whitespace();
            if self.rest.is_empty() {
                return Ok(false);
            }
            if self.eat("<!--") {
                match self.rest.find("-->") {
                    Some(end) => self.advance(end + 3),
                    None => return Err(self.error(ParseErrorKind::UnterminatedComment)),
                }
            } else if self.eat("<?") {
                match self.rest.find("?>") {
                    Some(end) => self.advance(end + 2),
                    None => return Err(self.error(ParseErrorKind::UnterminatedPi)),
                }
            } else if self.rest.starts_with('%') {
                // Parameter entity reference; not expanded by this layer.
                match self.rest.find(';') {
                    Some(end) => self.advance(end + 1),
                    None => return Err(self.error(ParseErrorKind::MalformedDecl)),
                }
            } else {
                return Ok(true);
            }
        }
    }

    fn name(&mut self) -> Result<String, XmlError> {
        let end = self
            .rest
            .find(|c: char| is_xml_whitespace(c) || "()|,%>\"'[".contains(c))
            .unwrap_or(self.rest.len());
        let name = &self.rest[..end];
        if !is_name(name) {
            return Err(self.error(ParseErrorKind::MalformedDecl));
        }
        self.advance(end);
        Ok(name.to_string())
    }

    fn quoted(&mut self) -> Result<String, XmlError> {
        let quote = match self.rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error(ParseErrorKind::MalformedDecl)),
        };
        self.advance(1);
        match self.rest.find(quote) {
            Some(end) => {
                let value = self.rest[..end].to_string();
                self.advance(end + 1);
                Ok(value)
            }
            None => Err(self.error(ParseErrorKind::MalformedDecl)),
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), XmlError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::MalformedDecl))
        }
    }

    /// `SYSTEM SystemLiteral` or `PUBLIC PubidLiteral SystemLiteral`.
    fn external_id(&mut self) -> Result<(Option<String>, Option<String>), XmlError> {
        if self.eat("SYSTEM") {
            self.skip_whitespace();
            Ok((None, Some(self.quoted()?)))
        } else if self.eat("PUBLIC") {
            self.skip_whitespace();
            let public = self.quoted()?;
            self.skip_whitespace();
            // The system literal is optional in a NOTATION declaration.
            let system = if self.rest.starts_with(['"', '\'']) {
                Some(self.quoted()?)
            } else {
                None
            };
            Ok((Some(public), system))
        } else {
            Err(self.error(ParseErrorKind::MalformedDecl))
        }
    }

    fn element_decl(&mut self) -> Result<DtdElement, XmlError> {
        self.skip_whitespace();
        let name = self.name()?;
        self.skip_whitespace();
        let content = if self.eat("EMPTY") {
            ContentSpec::Empty
        } else if self.eat("ANY") {
            ContentSpec::Any
        } else if self.rest.starts_with('(') {
            let mut model = self.balanced_parens()?;
            // `?`, `*` or `+` may trail the closing parenthesis.
            if let Some(c @ ('?' | '*' | '+')) = self.rest.chars().next() {
                model.push(c);
                self.advance(1);
            }
            if model.contains("#PCDATA") {
                let names = model
                    .trim_start_matches('(')
                    .trim_end_matches(['*', ')'])
                    .split('|')
                    .map(str::trim)
                    .filter(|t| !t.is_empty() && *t != "#PCDATA")
                    .map(str::to_string)
                    .collect();
                ContentSpec::Mixed(names)
            } else {
                ContentSpec::Children(model)
            }
        } else {
            return Err(self.error(ParseErrorKind::MalformedDecl));
        };
        self.skip_whitespace();
        self.expect(">")?;
        Ok(DtdElement { name, content })
    }

    fn balanced_parens(&mut self) -> Result<String, XmlError> {
        if !self.rest.starts_with('(') {
            return Err(self.error(ParseErrorKind::MalformedDecl));
        }
        let mut depth = 0usize;
        for (i, c) in self.rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let model = self.rest[..=i].to_string();
                        self.advance(i + 1);
                        return Ok(model);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(ParseErrorKind::MalformedDecl))
    }

    fn attlist_decl(&mut self) -> Result<(String, Vec<AttlistAttribute>), XmlError> {
        self.skip_whitespace();
        let element = self.name()?;
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat(">") {
                return Ok((element, attributes));
            }
            if self.rest.is_empty() {
                return Err(self.error(ParseErrorKind::MalformedDecl));
            }
            let name = self.name()?;
            self.skip_whitespace();
            let att_type = self.att_type()?;
            self.skip_whitespace();
            let default = self.default_decl()?;
            attributes.push(AttlistAttribute {
                name,
                att_type,
                default,
            });
        }
    }

    fn att_type(&mut self) -> Result<AttType, XmlError> {
        // Longest keywords first: IDREFS before IDREF before ID.
        if self.eat("CDATA") {
            Ok(AttType::Cdata)
        } else if self.eat("IDREFS") {
            Ok(AttType::IdRefs)
        } else if self.eat("IDREF") {
            Ok(AttType::IdRef)
        } else if self.eat("ID") {
            Ok(AttType::Id)
        } else if self.eat("ENTITIES") {
            Ok(AttType::Entities)
        } else if self.eat("ENTITY") {
            Ok(AttType::Entity)
        } else if self.eat("NMTOKENS") {
            Ok(AttType::NmTokens)
        } else if self.eat("NMTOKEN") {
            Ok(AttType::NmToken)
        } else if self.eat("NOTATION") {
            self.skip_whitespace();
            Ok(AttType::Notation(self.name_group()?))
        } else if self.rest.starts_with('(') {
            Ok(AttType::Enumeration(self.name_group()?))
        } else {
            Err(self.error(ParseErrorKind::MalformedDecl))
        }
    }

    fn name_group(&mut self) -> Result<Vec<String>, XmlError> {
        let group = self.balanced_parens()?;
        Ok(group
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn default_decl(&mut self) -> Result<DefaultDecl, XmlError> {
        if self.eat("#REQUIRED") {
            Ok(DefaultDecl::Required)
        } else if self.eat("#IMPLIED") {
            Ok(DefaultDecl::Implied)
        } else if self.eat("#FIXED") {
            self.skip_whitespace();
            Ok(DefaultDecl::Fixed(self.quoted()?))
        } else {
            Ok(DefaultDecl::Value(self.quoted()?))
        }
    }

    fn entity_decl(&mut self) -> Result<Option<EntityDecl>, XmlError> {
        self.skip_whitespace();
        if self.eat("%") {
            // Parameter entity: consume the declaration, keep nothing.
            self.skip_whitespace();
            self.name()?;
            self.skip_whitespace();
            if self.rest.starts_with(['"', '\'']) {
                self.quoted()?;
            } else {
                self.external_id()?;
            }
            self.skip_whitespace();
            self.expect(">")?;
            return Ok(None);
        }
        let name = self.name()?;
        self.skip_whitespace();
        let decl = if self.rest.starts_with(['"', '\'']) {
            EntityDecl {
                name,
                value: Some(self.quoted()?),
                public_id: None,
                system_id: None,
                ndata: None,
            }
        } else {
            let (public_id, system_id) = self.external_id()?;
            self.skip_whitespace();
            let ndata = if self.eat("NDATA") {
                self.skip_whitespace();
                Some(self.name()?)
            } else {
                None
            };
            EntityDecl {
                name,
                value: None,
                public_id,
                system_id,
                ndata,
            }
        };
        self.skip_whitespace();
        self.expect(">")?;
        Ok(Some(decl))
    }

    fn notation_decl(&mut self) -> Result<NotationDecl, XmlError> {
        self.skip_whitespace();
        let name = self.name()?;
        self.skip_whitespace();
        let (public_id, system_id) = self.external_id()?;
        self.skip_whitespace();
        self.expect(">")?;
        Ok(NotationDecl {
            name,
            public_id,
            system_id,
        })
    }
}
