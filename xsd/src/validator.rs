//! Structural instance validation, executed against live scanner events.
//!
//! [`SchemaValidatingFilter`] sits between the scanner and a downstream
//! handler: every event is checked against the grammar and then forwarded,
//! with grammar-defaulted attributes injected into the stream as
//! `specified=false`. Validation faults never abort the parse; they
//! accumulate on the filter so a caller sees every fault in one pass.

use std::collections::HashMap;
use std::sync::Arc;

use grove_xml::name::{is_xml_whitespace, XSI_NAMESPACE};
use grove_xml::sax::{ContentHandler, SaxAttribute};
use grove_xml::XmlError;

use crate::attribute_decl::{AttributeUse, ValueConstraint};
use crate::automaton::{ContentMatcher, StepOutcome};
use crate::complex_type::ContentKind;
use crate::composite::{CompositeGrammar, ValueFault};
use crate::error::{SchemaError, ValidationError, ValidationErrorKind};
use crate::grammar::SchemaType;
use crate::particle::ProcessContents;
use crate::xstypes::QName;

pub struct SchemaValidatingFilter<H: ContentHandler> {
    inner: H,
    grammar: Arc<CompositeGrammar>,
    include_default_attributes: bool,
    /// Collect every fault (default), or keep only the first.
    stop_at_first: bool,
    errors: Vec<ValidationError>,
    ns_stack: Vec<Vec<(String, Option<String>)>>,
    frames: Vec<Frame>,
    /// Depth inside a `processContents="skip"` wildcard subtree.
    skip_depth: u32,
    /// Compiled content matchers, one prototype per type key.
    matcher_cache: HashMap<QName, Option<ContentMatcher>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FrameKind {
    /// No declaration or type was found; children are still looked up.
    Unvalidated,
    Empty,
    Simple,
    ElementOnly,
    Mixed,
}

struct Frame {
    path: String,
    child_counter: HashMap<String, u32>,
    kind: FrameKind,
    matcher: Option<ContentMatcher>,
    simple_type: Option<QName>,
    text: String,
    has_nonws_text: bool,
    has_element_children: bool,
    nilled: bool,
    content_error_emitted: bool,
    fixed: Option<String>,
}

impl<H: ContentHandler> SchemaValidatingFilter<H> {
    pub fn new(grammar: Arc<CompositeGrammar>, inner: H) -> Self {
        Self {
            inner,
            grammar,
            include_default_attributes: true,
            stop_at_first: false,
            errors: Vec::new(),
            ns_stack: Vec::new(),
            frames: Vec::new(),
            skip_depth: 0,
            matcher_cache: HashMap::new(),
        }
    }

    pub fn include_default_attributes(mut self, include: bool) -> Self {
        self.include_default_attributes = include;
        self
    }

    pub fn stop_at_first_error(mut self, stop: bool) -> Self {
        self.stop_at_first = stop;
        self
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_parts(self) -> (H, Vec<ValidationError>) {
        (self.inner, self.errors)
    }

    fn emit(&mut self, path: &str, kind: ValidationErrorKind, message: String) {
        if self.stop_at_first && !self.errors.is_empty() {
            return;
        }
        self.errors.push(ValidationError {
            path: path.to_string(),
            kind,
            message,
        });
    }

    // ---- namespace context ------------------------------------------------

    fn push_ns_scope(&mut self, attributes: &[SaxAttribute]) {
        let mut scope = Vec::new();
        for attribute in attributes {
            if attribute.name == "xmlns" {
                let uri = (!attribute.value.is_empty()).then(|| attribute.value.clone());
                scope.push((String::new(), uri));
            } else if let Some(prefix) = attribute.name.strip_prefix("xmlns:") {
                let uri = (!attribute.value.is_empty()).then(|| attribute.value.clone());
                scope.push((prefix.to_string(), uri));
            }
        }
        self.ns_stack.push(scope);
    }

    fn lookup_prefix(&self, prefix: &str) -> Option<Option<String>> {
        if prefix == "xml" {
            return Some(Some(grove_xml::name::XML_NAMESPACE.to_string()));
        }
        for scope in self.ns_stack.iter().rev() {
            if let Some((_, uri)) = scope.iter().find(|(p, _)| p == prefix) {
                return Some(uri.clone());
            }
        }
        None
    }

    fn expand_element_name(&self, raw: &str) -> QName {
        match raw.split_once(':') {
            Some((prefix, local)) => {
                QName::new(self.lookup_prefix(prefix).flatten(), local)
            }
            None => QName::new(self.lookup_prefix("").flatten(), raw),
        }
    }

    /// Unprefixed attributes live in no namespace.
    fn expand_attribute_name(&self, raw: &str) -> QName {
        match raw.split_once(':') {
            Some((prefix, local)) => {
                QName::new(self.lookup_prefix(prefix).flatten(), local)
            }
            None => QName::unqualified(raw),
        }
    }

    fn is_namespace_or_xsi(&self, attribute: &SaxAttribute) -> bool {
        if attribute.name == "xmlns" || attribute.name.starts_with("xmlns:") {
            return true;
        }
        let expanded = self.expand_attribute_name(&attribute.name);
        matches!(
            expanded.namespace(),
            Some(XSI_NAMESPACE) | Some(grove_xml::name::XML_NAMESPACE)
        )
    }

    fn xsi_attribute<'a>(&self, attributes: &'a [SaxAttribute], local: &str) -> Option<&'a str> {
        attributes
            .iter()
            .find(|attribute| {
                let expanded = self.expand_attribute_name(&attribute.name);
                expanded.namespace() == Some(XSI_NAMESPACE) && expanded.local() == local
            })
            .map(|attribute| attribute.value.as_str())
    }

    // ---- content matchers --------------------------------------------------

    /// One compiled matcher prototype per type key; cloning yields a fresh
    /// run starting at the initial state set.
    fn matcher_for(&mut self, type_name: &QName, path: &str) -> Option<ContentMatcher> {
        if let Some(cached) = self.matcher_cache.get(type_name) {
            return cached.clone();
        }
        let built = match self
            .grammar
            .complex_type(type_name)
            .and_then(|complex| complex.content_model.clone())
        {
            Some(model) => match ContentMatcher::for_particle(&model, self.grammar.as_ref()) {
                Ok(matcher) => {
                    if !crate::automaton::particle_upa_ok(&model, self.grammar.as_ref()) {
                        tracing::warn!(
                            type_name = %type_name,
                            "content model violates unique particle attribution"
                        );
                    }
                    Some(matcher)
                }
                Err(error) => {
                    let (kind, message) = match &error {
                        SchemaError::UnresolvedReference { .. } => {
                            (ValidationErrorKind::UnresolvedType, error.to_string())
                        }
                        other => (ValidationErrorKind::ContentModel, other.to_string()),
                    };
                    self.emit(path, kind, message);
                    None
                }
            },
            None => None,
        };
        self.matcher_cache.insert(type_name.clone(), built.clone());
        built
    }

    fn find_prefix_for(&self, namespace: &str) -> Option<String> {
        for scope in self.ns_stack.iter().rev() {
            for (prefix, uri) in scope {
                if uri.as_deref() == Some(namespace) && !prefix.is_empty() {
                    return Some(prefix.clone());
                }
            }
        }
        None
    }

    // ---- the element entry checks -----------------------------------------

    fn check_attributes(
        &mut self,
        path: &str,
        type_name: &QName,
        attributes: &mut Vec<SaxAttribute>,
    ) {
        let (uses, wildcard) = self.grammar.attribute_uses(type_name);

        for attribute in attributes.clone() {
            if self.is_namespace_or_xsi(&attribute) {
                continue;
            }
            let expanded = self.expand_attribute_name(&attribute.name);
            match uses.iter().find(|use_| use_.name == expanded) {
                Some(declared) => {
                    if declared.use_ == AttributeUse::Prohibited {
                        self.emit(
                            path,
                            ValidationErrorKind::ProhibitedAttribute,
                            format!("attribute {expanded} is prohibited"),
                        );
                        continue;
                    }
                    if let Some(type_ref) = declared.type_ref.clone() {
                        match self.grammar.validate_value(&type_ref, &attribute.value) {
                            Ok(()) => {}
                            Err(ValueFault::Invalid(message)) => self.emit(
                                path,
                                ValidationErrorKind::InvalidValue,
                                format!("attribute {expanded}: {message}"),
                            ),
                            Err(ValueFault::UnresolvedType(name)) => self.emit(
                                path,
                                ValidationErrorKind::UnresolvedType,
                                format!("attribute {expanded} has unresolved type {name}"),
                            ),
                        }
                    }
                    if let Some(ValueConstraint::Fixed(fixed)) =
                        declared.value_constraint.clone()
                    {
                        if attribute.value != fixed {
                            self.emit(
                                path,
                                ValidationErrorKind::FixedValueMismatch,
                                format!(
                                    "attribute {expanded} must have the fixed value {fixed:?}"
                                ),
                            );
                        }
                    }
                }
                None => {
                    if !wildcard {
                        self.emit(
                            path,
                            ValidationErrorKind::UndeclaredAttribute,
                            format!("attribute {expanded} is not declared"),
                        );
                    }
                }
            }
        }

        for declared in &uses {
            let present = attributes
                .iter()
                .any(|attribute| self.expand_attribute_name(&attribute.name) == declared.name);
            if present {
                continue;
            }
            if declared.use_ == AttributeUse::Required {
                self.errors_push_required(path, &declared.name);
                continue;
            }
            if declared.use_ == AttributeUse::Prohibited {
                continue;
            }
            if let Some(constraint) = &declared.value_constraint {
                if self.include_default_attributes {
                    let written = match declared.name.namespace() {
                        Some(namespace) => match self.find_prefix_for(namespace) {
                            Some(prefix) => format!("{prefix}:{}", declared.name.local()),
                            None => declared.name.local().to_string(),
                        },
                        None => declared.name.local().to_string(),
                    };
                    attributes.push(SaxAttribute::defaulted(written, constraint.value()));
                }
            }
        }
    }

    fn errors_push_required(&mut self, path: &str, name: &QName) {
        self.emit(
            path,
            ValidationErrorKind::RequiredAttributeMissing,
            format!("required attribute {name} is missing"),
        );
    }
}

impl<H: ContentHandler> ContentHandler for SchemaValidatingFilter<H> {
    fn start_document(&mut self) -> Result<(), XmlError> {
        self.inner.start_document()
    }

    fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), XmlError> {
        self.inner.xml_declaration(version, encoding, standalone)
    }

    fn start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        self.inner.start_dtd(name, public_id, system_id)
    }

    fn internal_subset(&mut self, text: &str) -> Result<(), XmlError> {
        self.inner.internal_subset(text)
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        self.inner.end_dtd()
    }

    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        self.push_ns_scope(attributes);
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return self.inner.start_element(name, attributes);
        }

        let qname = self.expand_element_name(name);

        // Attribute the child to the parent's content model first.
        let mut wildcard_mode = None;
        let mut parent_rejected = false;
        let mut parent_forbids_children = false;
        let parent_path = match self.frames.last_mut() {
            Some(parent) => {
                parent.has_element_children = true;
                let count = parent
                    .child_counter
                    .entry(name.to_string())
                    .and_modify(|count| *count += 1)
                    .or_insert(1);
                let step = if *count > 1 {
                    format!("{}/{}[{}]", parent.path, name, count)
                } else {
                    format!("{}/{}", parent.path, name)
                };
                match parent.kind {
                    FrameKind::Simple | FrameKind::Empty => parent_forbids_children = true,
                    FrameKind::ElementOnly | FrameKind::Mixed => {
                        if let Some(matcher) = &mut parent.matcher {
                            match matcher.step(&qname, self.grammar.as_ref()) {
                                StepOutcome::Matched => {}
                                StepOutcome::Wildcard(pc) => wildcard_mode = Some(pc),
                                StepOutcome::Rejected => parent_rejected = true,
                            }
                        }
                    }
                    // No governing type: the subtree keeps being looked up,
                    // but absent declarations are tolerated, as under a lax
                    // wildcard.
                    FrameKind::Unvalidated => wildcard_mode = Some(ProcessContents::Lax),
                }
                step
            }
            None => format!("/{name}"),
        };
        let path = parent_path;

        if parent_forbids_children {
            let emitted = self
                .frames
                .last()
                .map(|parent| parent.content_error_emitted)
                .unwrap_or(true);
            if !emitted {
                let parent_path = self.frames.last().map(|p| p.path.clone()).unwrap_or_default();
                self.emit(
                    &parent_path,
                    ValidationErrorKind::ContentModel,
                    format!("element {qname} is not allowed in this content"),
                );
                if let Some(parent) = self.frames.last_mut() {
                    parent.content_error_emitted = true;
                }
            }
        }
        if parent_rejected {
            let emitted = self
                .frames
                .last()
                .map(|parent| parent.content_error_emitted)
                .unwrap_or(true);
            if !emitted {
                self.emit(
                    &path,
                    ValidationErrorKind::ContentModel,
                    format!("element {qname} violates the content model"),
                );
                if let Some(parent) = self.frames.last_mut() {
                    parent.content_error_emitted = true;
                }
            }
        }

        if wildcard_mode == Some(ProcessContents::Skip) {
            self.skip_depth = 1;
            return self.inner.start_element(name, attributes);
        }

        // Resolve the declaration and the governing type.
        let decl = self.grammar.element(&qname);
        let decl_found = decl.is_some();
        let mut nillable = false;
        let mut abstract_ = false;
        let mut fixed = None;
        let mut type_name = None;
        if let Some(decl) = decl {
            nillable = decl.nillable;
            abstract_ = decl.abstract_;
            if let Some(ValueConstraint::Fixed(value)) = &decl.value_constraint {
                fixed = Some(value.clone());
            }
            type_name = self.grammar.element_type(decl);
        }

        if !decl_found && wildcard_mode != Some(ProcessContents::Lax) {
            self.emit(
                &path,
                ValidationErrorKind::UndeclaredElement,
                format!("no declaration for element {qname}"),
            );
        }
        if abstract_ {
            self.emit(
                &path,
                ValidationErrorKind::AbstractElement,
                format!("element {qname} is declared abstract"),
            );
        }

        // An instance-specified xsi:type overrides the declared type.
        if let Some(written) = self.xsi_attribute(attributes, "type") {
            let override_name = match written.split_once(':') {
                Some((prefix, local)) => QName::new(self.lookup_prefix(prefix).flatten(), local),
                None => {
                    let default = self.lookup_prefix("").flatten();
                    match default {
                        Some(ns) => QName::with_namespace(ns, written),
                        None if grove_builtins::is_builtin_type_name(written) => {
                            QName::with_namespace(grove_xml::name::XS_NAMESPACE, written)
                        }
                        None => QName::unqualified(written),
                    }
                }
            };
            if self.grammar.type_resolves(&override_name) {
                type_name = Some(override_name);
            } else {
                self.emit(
                    &path,
                    ValidationErrorKind::UnresolvedType,
                    format!("xsi:type {override_name} does not resolve"),
                );
            }
        }

        // xsi:nil is only honoured on nillable declarations.
        let mut nilled = false;
        if let Some(value) = self.xsi_attribute(attributes, "nil") {
            let is_true = matches!(value, "true" | "1");
            if is_true && !nillable {
                self.emit(
                    &path,
                    ValidationErrorKind::InvalidNil,
                    format!("element {qname} is not nillable"),
                );
            } else if is_true {
                nilled = true;
                if fixed.is_some() {
                    self.emit(
                        &path,
                        ValidationErrorKind::InvalidNil,
                        format!("nilled element {qname} has a fixed value constraint"),
                    );
                }
            }
        }

        // Classify the frame and check attributes against the type.
        let mut out_attributes = attributes.to_vec();
        let mut kind = FrameKind::Unvalidated;
        let mut matcher = None;
        let mut simple_type = None;

        if let Some(type_name) = type_name.clone() {
            if type_name.is_builtin() {
                kind = FrameKind::Simple;
                simple_type = Some(type_name.clone());
                if type_name.local() == "anyType" {
                    kind = FrameKind::Unvalidated;
                    simple_type = None;
                }
            } else {
                match self.grammar.type_by_name(&type_name) {
                    Some(SchemaType::Simple(_)) => {
                        kind = FrameKind::Simple;
                        simple_type = Some(type_name.clone());
                    }
                    Some(SchemaType::Complex(complex)) => {
                        let content_kind = complex.content_kind();
                        let simple_content = complex.simple_content_type.clone();
                        self.check_attributes(&path, &type_name, &mut out_attributes);
                        match content_kind {
                            ContentKind::Empty => kind = FrameKind::Empty,
                            ContentKind::Simple => {
                                kind = FrameKind::Simple;
                                simple_type = simple_content.or(Some(type_name.clone()));
                            }
                            ContentKind::ElementOnly => {
                                kind = FrameKind::ElementOnly;
                                matcher = self.matcher_for(&type_name, &path);
                            }
                            ContentKind::Mixed => {
                                kind = FrameKind::Mixed;
                                matcher = self.matcher_for(&type_name, &path);
                            }
                        }
                    }
                    None => {
                        self.emit(
                            &path,
                            ValidationErrorKind::UnresolvedType,
                            format!("type {type_name} of element {qname} does not resolve"),
                        );
                    }
                }
            }
        }

        if nilled {
            kind = FrameKind::Empty;
            matcher = None;
        }

        self.frames.push(Frame {
            path,
            child_counter: HashMap::new(),
            kind,
            matcher,
            simple_type,
            text: String::new(),
            has_nonws_text: false,
            has_element_children: false,
            nilled,
            content_error_emitted: false,
            fixed,
        });

        self.inner.start_element(name, &out_attributes)
    }

    fn end_element(&mut self, name: &str) -> Result<(), XmlError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            self.ns_stack.pop();
            return self.inner.end_element(name);
        }

        if let Some(frame) = self.frames.pop() {
            match frame.kind {
                FrameKind::Unvalidated => {}
                FrameKind::Empty => {
                    if frame.has_element_children || frame.has_nonws_text {
                        let message = if frame.nilled {
                            format!("nilled element {name} must be empty")
                        } else {
                            format!("element {name} must be empty")
                        };
                        self.emit(&frame.path, ValidationErrorKind::ContentModel, message);
                    }
                }
                FrameKind::Simple => {
                    if let Some(simple_type) = &frame.simple_type {
                        match self.grammar.validate_value(simple_type, &frame.text) {
                            Ok(()) => {}
                            Err(ValueFault::Invalid(message)) => {
                                self.emit(&frame.path, ValidationErrorKind::InvalidValue, message)
                            }
                            Err(ValueFault::UnresolvedType(type_name)) => self.emit(
                                &frame.path,
                                ValidationErrorKind::UnresolvedType,
                                format!("type {type_name} does not resolve"),
                            ),
                        }
                    }
                    if let Some(fixed) = &frame.fixed {
                        if !frame.nilled && frame.text.trim() != fixed.trim() {
                            self.emit(
                                &frame.path,
                                ValidationErrorKind::FixedValueMismatch,
                                format!("content must equal the fixed value {fixed:?}"),
                            );
                        }
                    }
                }
                FrameKind::ElementOnly | FrameKind::Mixed => {
                    if frame.kind == FrameKind::ElementOnly && frame.has_nonws_text {
                        self.emit(
                            &frame.path,
                            ValidationErrorKind::ContentModel,
                            format!("element {name} does not allow character content"),
                        );
                    }
                    if let Some(matcher) = &frame.matcher {
                        if !frame.content_error_emitted && !matcher.accepts() {
                            self.emit(
                                &frame.path,
                                ValidationErrorKind::ContentModel,
                                format!("content of element {name} is incomplete"),
                            );
                        }
                    }
                }
            }
        }

        self.ns_stack.pop();
        self.inner.end_element(name)
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        if self.skip_depth == 0 {
            if let Some(frame) = self.frames.last_mut() {
                frame.text.push_str(text);
                if !text.chars().all(is_xml_whitespace) {
                    frame.has_nonws_text = true;
                }
            }
        }
        self.inner.characters(text)
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XmlError> {
        self.inner.ignorable_whitespace(text)
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.inner.comment(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.inner.processing_instruction(target, data)
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        self.inner.start_cdata()
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        self.inner.end_cdata()
    }

    fn skipped_entity(&mut self, name: &str) -> Result<(), XmlError> {
        self.inner.skipped_entity(name)
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        self.inner.end_document()
    }
}
