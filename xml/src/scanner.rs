//! Hand-written character-by-character XML 1.0/1.1 recognizer.
//!
//! The scanner owns the [`Reader`] and drives a [`ContentHandler`]
//! synchronously: a handler call returns before the next event is produced.
//! Recognizers are tried in order at each position: XML declaration,
//! DOCTYPE, comment, processing instruction, CDATA section, end tag, start
//! tag, character data.

use std::collections::VecDeque;

use crate::dtd::DtdGrammar;
use crate::error::{ParseErrorKind, TextPosition, XmlError};
use crate::name::{is_name_char, is_name_start_char, is_xml_char, is_xml_whitespace};
use crate::reader::Reader;
use crate::sax::{ContentHandler, SaxAttribute};

/// Loads external declarations when the document carries a DOCTYPE with an
/// external identifier. Internal-subset declarations win over anything the
/// resolver supplies.
pub trait DtdResolver {
    fn resolve_dtd(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Option<DtdGrammar>;
}

const MAX_ENTITY_DEPTH: u8 = 8;

pub struct Scanner<'a> {
    chars: Cursor,
    handler: &'a mut dyn ContentHandler,
    dtd_resolver: Option<&'a dyn DtdResolver>,
    include_default_attributes: bool,
    dtd: Option<DtdGrammar>,
}

impl<'a> Scanner<'a> {
    pub fn new(reader: Reader, handler: &'a mut dyn ContentHandler) -> Self {
        Self {
            chars: Cursor::new(reader),
            handler,
            dtd_resolver: None,
            include_default_attributes: true,
            dtd: None,
        }
    }

    pub fn with_dtd_resolver(mut self, resolver: &'a dyn DtdResolver) -> Self {
        self.dtd_resolver = Some(resolver);
        self
    }

    /// Controls injection of attribute defaults declared by the DTD.
    pub fn include_default_attributes(mut self, include: bool) -> Self {
        self.include_default_attributes = include;
        self
    }

    /// The DTD grammar assembled while scanning, if the document had one.
    pub fn into_dtd(self) -> Option<DtdGrammar> {
        self.dtd
    }

    pub fn parse(&mut self) -> Result<(), XmlError> {
        self.handler.start_document()?;
        self.parse_prolog()?;

        let mut stack = Vec::new();
        self.parse_start_tag(&mut stack)?;
        while !stack.is_empty() {
            self.parse_content(&mut stack)?;
        }

        self.parse_trailing_misc()?;
        self.handler.end_document()
    }

    fn err(&self, kind: ParseErrorKind) -> XmlError {
        XmlError::parse(kind, self.chars.position())
    }

    // ---- prolog -----------------------------------------------------------

    fn parse_prolog(&mut self) -> Result<(), XmlError> {
        if self.at_xml_declaration()? {
            self.parse_xml_declaration()?;
        }
        let mut doctype_seen = false;
        loop {
            self.skip_whitespace()?;
            if self.chars.looking_at("<!--")? {
                self.parse_comment()?;
            } else if self.chars.looking_at("<!DOCTYPE")? {
                if doctype_seen {
                    return Err(self.err(ParseErrorKind::MalformedDecl));
                }
                doctype_seen = true;
                self.parse_doctype()?;
            } else if self.chars.looking_at("<?")? {
                self.parse_pi()?;
            } else if self.chars.looking_at("</")? {
                return Err(self.err(ParseErrorKind::UnmatchedEndTag));
            } else if self.chars.looking_at("<!")? {
                return Err(self.err(ParseErrorKind::MalformedDecl));
            } else {
                return match self.chars.peek()? {
                    Some('<') => Ok(()),
                    Some(_) => Err(self.err(ParseErrorKind::IllegalChar)),
                    None => Err(XmlError::Structural(
                        "document has no root element".into(),
                    )),
                };
            }
        }
    }

    fn at_xml_declaration(&mut self) -> Result<bool, XmlError> {
        // `<?xml-stylesheet` and friends are ordinary PIs.
        Ok(self.chars.looking_at("<?xml")?
            && matches!(self.chars.peek_at(5)?, Some(c) if is_xml_whitespace(c)))
    }

    fn parse_xml_declaration(&mut self) -> Result<(), XmlError> {
        self.chars.eat("<?xml")?;
        let mut version = None;
        let mut encoding = None;
        let mut standalone = None;
        loop {
            let had_space = self.skip_whitespace()?;
            if self.chars.eat("?>")? {
                break;
            }
            if !had_space {
                return Err(self.err(ParseErrorKind::MalformedDecl));
            }
            let name = self.parse_name(ParseErrorKind::MalformedDecl)?;
            self.skip_whitespace()?;
            if !self.chars.eat("=")? {
                return Err(self.err(ParseErrorKind::MalformedDecl));
            }
            self.skip_whitespace()?;
            let value = self.parse_quoted_literal(ParseErrorKind::MalformedDecl)?;
            match name.as_str() {
                "version" if version.is_none() => {
                    if value != "1.0" && value != "1.1" {
                        return Err(self.err(ParseErrorKind::UnsupportedVersion));
                    }
                    version = Some(value);
                }
                "encoding" if encoding.is_none() && version.is_some() => {
                    encoding = Some(value);
                }
                "standalone" if standalone.is_none() && version.is_some() => {
                    standalone = Some(match value.as_str() {
                        "yes" => true,
                        "no" => false,
                        _ => return Err(self.err(ParseErrorKind::MalformedDecl)),
                    });
                }
                _ => return Err(self.err(ParseErrorKind::MalformedDecl)),
            }
        }
        match version {
            Some(version) => {
                self.handler
                    .xml_declaration(&version, encoding.as_deref(), standalone)
            }
            None => Err(self.err(ParseErrorKind::MalformedDecl)),
        }
    }

    fn parse_doctype(&mut self) -> Result<(), XmlError> {
        self.chars.eat("<!DOCTYPE")?;
        if !self.skip_whitespace()? {
            return Err(self.err(ParseErrorKind::MalformedDecl));
        }
        let name = self.parse_name(ParseErrorKind::MalformedDecl)?;
        self.skip_whitespace()?;

        let mut public_id = None;
        let mut system_id = None;
        if self.chars.eat("SYSTEM")? {
            self.skip_whitespace()?;
            system_id = Some(self.parse_quoted_literal(ParseErrorKind::MalformedDecl)?);
            self.skip_whitespace()?;
        } else if self.chars.eat("PUBLIC")? {
            self.skip_whitespace()?;
            public_id = Some(self.parse_quoted_literal(ParseErrorKind::MalformedDecl)?);
            self.skip_whitespace()?;
            system_id = Some(self.parse_quoted_literal(ParseErrorKind::MalformedDecl)?);
            self.skip_whitespace()?;
        }

        self.handler
            .start_dtd(&name, public_id.as_deref(), system_id.as_deref())?;

        let mut grammar = DtdGrammar::default();
        if self.chars.eat("[")? {
            let subset = self.capture_internal_subset()?;
            self.handler.internal_subset(&subset)?;
            grammar = DtdGrammar::parse_internal_subset(&subset)?;
            self.skip_whitespace()?;
        }
        if !self.chars.eat(">")? {
            return Err(self.err(ParseErrorKind::MalformedDecl));
        }

        if public_id.is_some() || system_id.is_some() {
            if let Some(resolver) = self.dtd_resolver {
                if let Some(external) =
                    resolver.resolve_dtd(public_id.as_deref(), system_id.as_deref())
                {
                    grammar.merge_external(external);
                }
            }
        }
        if !grammar.is_empty() {
            self.dtd = Some(grammar);
        }

        self.handler.end_dtd()
    }

    /// Collects the internal subset verbatim up to the closing `]`,
    /// respecting quoted literals and comments.
    fn capture_internal_subset(&mut self) -> Result<String, XmlError> {
        let mut text = String::new();
        let mut quote: Option<char> = None;
        loop {
            if quote.is_none() && self.chars.looking_at("<!--")? {
                text.push_str("<!--");
                self.chars.eat("<!--")?;
                loop {
                    match self.chars.next()? {
                        Some(c) => {
                            text.push(c);
                            if text.ends_with("-->") {
                                break;
                            }
                        }
                        None => return Err(self.err(ParseErrorKind::UnterminatedComment)),
                    }
                }
                continue;
            }
            match self.chars.next()? {
                Some(']') if quote.is_none() => return Ok(text),
                Some(c) => {
                    match quote {
                        Some(q) if c == q => quote = None,
                        None if c == '"' || c == '\'' => quote = Some(c),
                        _ => {}
                    }
                    text.push(c);
                }
                None => return Err(self.err(ParseErrorKind::MalformedDecl)),
            }
        }
    }

    fn parse_trailing_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace()?;
            if self.chars.looking_at("<!--")? {
                self.parse_comment()?;
            } else if self.chars.looking_at("<?")? {
                self.parse_pi()?;
            } else {
                return match self.chars.peek()? {
                    None => Ok(()),
                    Some('<') => Err(XmlError::Structural(
                        "more than one root element".into(),
                    )),
                    Some(_) => Err(self.err(ParseErrorKind::IllegalChar)),
                };
            }
        }
    }

    // ---- element content --------------------------------------------------

    fn parse_content(&mut self, stack: &mut Vec<String>) -> Result<(), XmlError> {
        match self.chars.peek()? {
            None => Err(self.err(ParseErrorKind::UnmatchedEndTag)),
            Some('<') => {
                if self.chars.looking_at("<!--")? {
                    self.parse_comment()
                } else if self.chars.looking_at("<![CDATA[")? {
                    self.parse_cdata()
                } else if self.chars.looking_at("<?")? {
                    self.parse_pi()
                } else if self.chars.looking_at("</")? {
                    self.parse_end_tag(stack)
                } else {
                    self.parse_start_tag(stack)
                }
            }
            Some(_) => self.parse_text(stack),
        }
    }

    fn parse_text(&mut self, stack: &[String]) -> Result<(), XmlError> {
        let mut text = String::new();
        let mut had_reference = false;
        loop {
            match self.chars.peek()? {
                None | Some('<') => break,
                Some('&') => {
                    match self.parse_reference()? {
                        Reference::Char(c) => {
                            text.push(c);
                            had_reference = true;
                        }
                        Reference::Text(t) => {
                            text.push_str(&t);
                            had_reference = true;
                        }
                        Reference::Skipped(name) => {
                            self.flush_text(&text, had_reference, stack)?;
                            text.clear();
                            had_reference = false;
                            self.handler.skipped_entity(&name)?;
                        }
                    }
                }
                Some('>') if text.ends_with("]]") => {
                    return Err(self.err(ParseErrorKind::IllegalChar));
                }
                Some(c) => {
                    if !is_xml_char(c) {
                        return Err(self.err(ParseErrorKind::IllegalChar));
                    }
                    self.chars.next()?;
                    text.push(c);
                }
            }
        }
        self.flush_text(&text, had_reference, stack)
    }

    fn flush_text(
        &mut self,
        text: &str,
        had_reference: bool,
        stack: &[String],
    ) -> Result<(), XmlError> {
        if text.is_empty() {
            return Ok(());
        }
        let ignorable = !had_reference
            && text.chars().all(is_xml_whitespace)
            && matches!(
                (stack.last(), &self.dtd),
                (Some(element), Some(dtd)) if dtd.has_element_content(element)
            );
        if ignorable {
            self.handler.ignorable_whitespace(text)
        } else {
            self.handler.characters(text)
        }
    }

    fn parse_start_tag(&mut self, stack: &mut Vec<String>) -> Result<(), XmlError> {
        self.chars.eat("<")?;
        let name = self.parse_name(ParseErrorKind::MalformedTag)?;
        let mut attributes: Vec<SaxAttribute> = Vec::new();

        let empty = loop {
            let had_space = self.skip_whitespace()?;
            match self.chars.peek()? {
                Some('>') => {
                    self.chars.next()?;
                    break false;
                }
                Some('/') => {
                    self.chars.next()?;
                    if !self.chars.eat(">")? {
                        return Err(self.err(ParseErrorKind::MalformedTag));
                    }
                    break true;
                }
                Some(c) if is_name_start_char(c) => {
                    if !had_space {
                        return Err(self.err(ParseErrorKind::MalformedTag));
                    }
                    let attribute = self.parse_attribute(&name)?;
                    if attributes.iter().any(|a| a.name == attribute.name) {
                        return Err(self.err(ParseErrorKind::DuplicateAttribute));
                    }
                    attributes.push(attribute);
                }
                Some(_) => return Err(self.err(ParseErrorKind::MalformedTag)),
                None => return Err(self.err(ParseErrorKind::MalformedTag)),
            }
        };

        if self.include_default_attributes {
            self.inject_default_attributes(&name, &mut attributes);
        }

        self.handler.start_element(&name, &attributes)?;
        if empty {
            self.handler.end_element(&name)?;
        } else {
            stack.push(name);
        }
        Ok(())
    }

    fn inject_default_attributes(&mut self, element: &str, attributes: &mut Vec<SaxAttribute>) {
        let Some(dtd) = &self.dtd else { return };
        for decl in dtd.attributes_for(element) {
            if let Some(value) = decl.default.value() {
                if !attributes.iter().any(|a| a.name == decl.name) {
                    attributes.push(SaxAttribute::defaulted(decl.name.clone(), value));
                }
            }
        }
    }

    fn parse_attribute(&mut self, element: &str) -> Result<SaxAttribute, XmlError> {
        let name = self.parse_name(ParseErrorKind::MalformedTag)?;
        self.skip_whitespace()?;
        if !self.chars.eat("=")? {
            return Err(self.err(ParseErrorKind::MalformedTag));
        }
        self.skip_whitespace()?;

        let quote = match self.chars.next()? {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.err(ParseErrorKind::MalformedTag)),
        };

        let mut value = String::new();
        let mut raw = String::new();
        loop {
            match self.chars.peek()? {
                None => return Err(self.err(ParseErrorKind::MalformedTag)),
                Some(c) if c == quote => {
                    self.chars.next()?;
                    break;
                }
                Some('<') => return Err(self.err(ParseErrorKind::IllegalChar)),
                Some('&') => {
                    let raw_start = raw.len();
                    match self.parse_reference_raw(&mut raw)? {
                        Reference::Char(c) => value.push(c),
                        Reference::Text(t) => value.push_str(&t),
                        // An unexpandable reference stays literal.
                        Reference::Skipped(_) => {
                            let literal = raw[raw_start..].to_string();
                            value.push_str(&literal);
                        }
                    }
                }
                // Literal white space normalizes to a space; characters that
                // arrived through a reference stay as they are.
                Some(c) if is_xml_whitespace(c) => {
                    self.chars.next()?;
                    value.push(' ');
                    raw.push(c);
                }
                Some(c) => {
                    if !is_xml_char(c) {
                        return Err(self.err(ParseErrorKind::IllegalChar));
                    }
                    self.chars.next()?;
                    value.push(c);
                    raw.push(c);
                }
            }
        }

        if let Some(dtd) = &self.dtd {
            let normalized = match dtd.normalize_attribute(element, &name, &value) {
                std::borrow::Cow::Owned(normalized) => Some(normalized),
                std::borrow::Cow::Borrowed(_) => None,
            };
            if let Some(normalized) = normalized {
                value = normalized;
            }
        }

        let lexical = (raw != value).then_some(raw);
        Ok(SaxAttribute {
            name,
            value,
            lexical,
            specified: true,
        })
    }

    fn parse_end_tag(&mut self, stack: &mut Vec<String>) -> Result<(), XmlError> {
        self.chars.eat("</")?;
        let name = self.parse_name(ParseErrorKind::MalformedTag)?;
        self.skip_whitespace()?;
        if !self.chars.eat(">")? {
            return Err(self.err(ParseErrorKind::MalformedTag));
        }
        match stack.last() {
            Some(open) if *open == name => {
                stack.pop();
                self.handler.end_element(&name)
            }
            _ => Err(self.err(ParseErrorKind::UnmatchedEndTag)),
        }
    }

    fn parse_comment(&mut self) -> Result<(), XmlError> {
        self.chars.eat("<!--")?;
        let mut text = String::new();
        loop {
            if self.chars.looking_at("--")? {
                self.chars.eat("--")?;
                return if self.chars.eat(">")? {
                    self.handler.comment(&text)
                } else {
                    // `--` is not allowed inside a comment.
                    Err(self.err(ParseErrorKind::IllegalChar))
                };
            }
            match self.chars.next()? {
                Some(c) if is_xml_char(c) => text.push(c),
                Some(_) => return Err(self.err(ParseErrorKind::IllegalChar)),
                None => return Err(self.err(ParseErrorKind::UnterminatedComment)),
            }
        }
    }

    fn parse_pi(&mut self) -> Result<(), XmlError> {
        self.chars.eat("<?")?;
        let target = self.parse_name(ParseErrorKind::MalformedDecl)?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.err(ParseErrorKind::MalformedDecl));
        }
        if self.chars.eat("?>")? {
            return self.handler.processing_instruction(&target, "");
        }
        if !self.skip_whitespace()? {
            return Err(self.err(ParseErrorKind::MalformedDecl));
        }
        let mut data = String::new();
        loop {
            if self.chars.eat("?>")? {
                return self.handler.processing_instruction(&target, &data);
            }
            match self.chars.next()? {
                Some(c) if is_xml_char(c) => data.push(c),
                Some(_) => return Err(self.err(ParseErrorKind::IllegalChar)),
                None => return Err(self.err(ParseErrorKind::UnterminatedPi)),
            }
        }
    }

    fn parse_cdata(&mut self) -> Result<(), XmlError> {
        self.chars.eat("<![CDATA[")?;
        self.handler.start_cdata()?;
        let mut text = String::new();
        loop {
            if self.chars.looking_at("]]>")? {
                self.chars.eat("]]>")?;
                if !text.is_empty() {
                    self.handler.characters(&text)?;
                }
                return self.handler.end_cdata();
            }
            match self.chars.next()? {
                Some(c) if is_xml_char(c) => text.push(c),
                Some(_) => return Err(self.err(ParseErrorKind::IllegalChar)),
                None => return Err(self.err(ParseErrorKind::UnterminatedCdata)),
            }
        }
    }

    // ---- references -------------------------------------------------------

    fn parse_reference(&mut self) -> Result<Reference, XmlError> {
        let mut raw = String::new();
        self.parse_reference_raw(&mut raw)
    }

    /// Parses a reference starting at `&`, appending its source text to
    /// `raw`.
    fn parse_reference_raw(&mut self, raw: &mut String) -> Result<Reference, XmlError> {
        self.chars.eat("&")?;
        if self.chars.eat("#")? {
            let hex = self.chars.eat("x")?;
            let mut digits = String::new();
            loop {
                match self.chars.next()? {
                    Some(';') => break,
                    Some(c) if c.is_ascii_hexdigit() && (hex || c.is_ascii_digit()) => {
                        digits.push(c)
                    }
                    _ => return Err(self.err(ParseErrorKind::IllegalChar)),
                }
            }
            let radix = if hex { 16 } else { 10 };
            let code = u32::from_str_radix(&digits, radix)
                .map_err(|_| self.err(ParseErrorKind::IllegalChar))?;
            let c = char::from_u32(code)
                .filter(|c| is_xml_char(*c))
                .ok_or_else(|| self.err(ParseErrorKind::IllegalChar))?;
            raw.push_str("&#");
            if hex {
                raw.push('x');
            }
            raw.push_str(&digits);
            raw.push(';');
            return Ok(Reference::Char(c));
        }

        let name = self.parse_name(ParseErrorKind::IllegalChar)?;
        if !self.chars.eat(";")? {
            return Err(self.err(ParseErrorKind::IllegalChar));
        }
        raw.push('&');
        raw.push_str(&name);
        raw.push(';');

        if let Some(c) = predefined_entity(&name) {
            return Ok(Reference::Char(c));
        }
        match self.dtd.as_ref().and_then(|d| d.entity_value(&name)) {
            Some(replacement) => {
                let replacement = replacement.to_string();
                Ok(Reference::Text(self.expand_entity_text(
                    &replacement,
                    MAX_ENTITY_DEPTH,
                )))
            }
            None => Ok(Reference::Skipped(name)),
        }
    }

    /// Textual expansion of references inside entity replacement text.
    /// Unknown references stay literal; expansion depth is bounded.
    fn expand_entity_text(&self, text: &str, depth: u8) -> String {
        if depth == 0 || !text.contains('&') {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find('&') {
            out.push_str(&rest[..start]);
            rest = &rest[start..];
            let Some(end) = rest.find(';') else {
                break;
            };
            let entity = &rest[1..end];
            if let Some(code) = entity.strip_prefix('#') {
                let (digits, radix) = match code.strip_prefix('x') {
                    Some(hex) => (hex, 16),
                    None => (code, 10),
                };
                match u32::from_str_radix(digits, radix).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => out.push_str(&rest[..=end]),
                }
            } else if let Some(c) = predefined_entity(entity) {
                out.push(c);
            } else if let Some(value) = self.dtd.as_ref().and_then(|d| d.entity_value(entity)) {
                let value = value.to_string();
                out.push_str(&self.expand_entity_text(&value, depth - 1));
            } else {
                out.push_str(&rest[..=end]);
            }
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        out
    }

    // ---- lexical helpers --------------------------------------------------

    fn parse_name(&mut self, on_error: ParseErrorKind) -> Result<String, XmlError> {
        let mut name = String::new();
        match self.chars.peek()? {
            Some(c) if is_name_start_char(c) => {
                self.chars.next()?;
                name.push(c);
            }
            _ => return Err(self.err(on_error)),
        }
        while let Some(c) = self.chars.peek()? {
            if is_name_char(c) {
                self.chars.next()?;
                name.push(c);
            } else {
                break;
            }
        }
        Ok(name)
    }

    fn parse_quoted_literal(&mut self, on_error: ParseErrorKind) -> Result<String, XmlError> {
        let quote = match self.chars.next()? {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.err(on_error)),
        };
        let mut value = String::new();
        loop {
            match self.chars.next()? {
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.err(on_error)),
            }
        }
    }

    fn skip_whitespace(&mut self) -> Result<bool, XmlError> {
        let mut any = false;
        while let Some(c) = self.chars.peek()? {
            if is_xml_whitespace(c) {
                self.chars.next()?;
                any = true;
            } else {
                break;
            }
        }
        Ok(any)
    }
}

enum Reference {
    Char(char),
    Text(String),
    Skipped(String),
}

fn predefined_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Character cursor over the reader with lookahead, end-of-line
/// normalization (XML 1.0 §2.11) and position tracking.
struct Cursor {
    reader: Reader,
    buf: VecDeque<char>,
    pos: TextPosition,
    pending_cr: bool,
}

impl Cursor {
    fn new(reader: Reader) -> Self {
        Self {
            reader,
            buf: VecDeque::new(),
            pos: TextPosition {
                byte: 0,
                line: 1,
                column: 1,
            },
            pending_cr: false,
        }
    }

    fn position(&self) -> TextPosition {
        self.pos
    }

    fn fill(&mut self, n: usize) -> Result<(), XmlError> {
        while self.buf.len() < n && self.reader.data_available() {
            let Some(chunk) = self.reader.read()? else {
                break;
            };
            for c in chunk.chars() {
                if self.pending_cr {
                    self.pending_cr = false;
                    if c == '\n' {
                        continue;
                    }
                }
                if c == '\r' {
                    self.pending_cr = true;
                    self.buf.push_back('\n');
                } else {
                    self.buf.push_back(c);
                }
            }
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<char>, XmlError> {
        self.peek_at(0)
    }

    fn peek_at(&mut self, i: usize) -> Result<Option<char>, XmlError> {
        self.fill(i + 1)?;
        Ok(self.buf.get(i).copied())
    }

    fn next(&mut self) -> Result<Option<char>, XmlError> {
        self.fill(1)?;
        let c = self.buf.pop_front();
        if let Some(c) = c {
            self.pos.byte += c.len_utf8();
            if c == '\n' {
                self.pos.line += 1;
                self.pos.column = 1;
            } else {
                self.pos.column += 1;
            }
        }
        Ok(c)
    }

    fn looking_at(&mut self, token: &str) -> Result<bool, XmlError> {
        let len = token.chars().count();
        self.fill(len)?;
        if self.buf.len() < len {
            return Ok(false);
        }
        Ok(token.chars().zip(self.buf.iter()).all(|(a, b)| a == *b))
    }

    /// Consumes `token` if present; `Ok(false)` otherwise.
    fn eat(&mut self, token: &str) -> Result<bool, XmlError> {
        if self.looking_at(token)? {
            for _ in token.chars() {
                self.next()?;
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
