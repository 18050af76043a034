//! Event-driven schema-document parser: a [`ContentHandler`] that maps the
//! supported XML Schema subset onto the grammar model while the scanner
//! walks the document. Forward references are tolerated throughout one
//! schema file; the deferred queues drain once the whole schema set is
//! loaded.

use grove_builtins::WhiteSpace;
use grove_xml::name::{XML_NAMESPACE, XS_NAMESPACE};
use grove_xml::sax::{ContentHandler, SaxAttribute};
use grove_xml::XmlError;

use crate::attribute_decl::{AttributeDecl, AttributeGroup, AttributeUse, Form, ValueConstraint};
use crate::complex_type::{ComplexType, DerivationMethod};
use crate::element_decl::{ElementDecl, NotationDecl};
use crate::error::SchemaError;
use crate::facet::{check_facet_set, Facet, Pattern};
use crate::grammar::{Import, SchemaGrammar, SchemaType};
use crate::particle::{NamespaceConstraint, Occurs, Particle, ProcessContents};
use crate::simple_type::SimpleType;
use crate::xstypes::QName;

pub struct SchemaHandler {
    grammar: SchemaGrammar,
    errors: Vec<SchemaError>,
    /// One namespace scope per open element: `(prefix, uri)`; the empty
    /// prefix is the default namespace.
    ns_stack: Vec<Vec<(String, Option<String>)>>,
    frames: Vec<Frame>,
    anon_counter: u32,
}

enum Frame {
    Schema,
    /// Uninterpreted subtree (annotations, foreign namespaces, elements
    /// whose effect was applied on entry).
    Swallow {
        depth: u32,
    },
    Element {
        decl: ElementDecl,
        occurs: Occurs,
        top_level: bool,
    },
    ElementRef {
        name: QName,
        occurs: Occurs,
    },
    ComplexType {
        type_: ComplexType,
        key: QName,
    },
    SimpleType {
        builder: SimpleTypeBuilder,
    },
    Restriction(DerivationFrame),
    Extension(DerivationFrame),
    SimpleContent,
    ComplexContent,
    ModelGroup {
        compositor: Compositor,
        particles: Vec<Particle>,
        occurs: Occurs,
    },
    GroupDef {
        name: QName,
        particles: Vec<Particle>,
    },
    GroupRef {
        reference: QName,
        occurs: Occurs,
    },
    AnyParticle {
        particle: Particle,
    },
    AttributeGroupDef {
        group: AttributeGroup,
    },
    Attribute {
        decl: AttributeDecl,
        top_level: bool,
    },
    List {
        item_type: Option<QName>,
    },
    Union {
        member_types: Vec<QName>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Compositor {
    Sequence,
    Choice,
    All,
}

struct SimpleTypeBuilder {
    key: QName,
    name: Option<QName>,
    base: Option<QName>,
    facets: Vec<Facet>,
    item_type: Option<QName>,
    member_types: Vec<QName>,
    is_list: bool,
    is_union: bool,
}

/// Shared state of `<restriction>` and `<extension>`: the base reference,
/// collected facets, an optional particle and attribute uses.
#[derive(Default)]
struct DerivationFrame {
    base: Option<QName>,
    patterns: Vec<String>,
    enumerations: Vec<String>,
    facets: Vec<Facet>,
    particle: Option<Particle>,
    attributes: Vec<AttributeDecl>,
    attribute_group_refs: Vec<QName>,
    any_attribute: bool,
}

fn attr<'a>(attributes: &'a [SaxAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

impl Default for SchemaHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaHandler {
    pub fn new() -> Self {
        Self {
            grammar: SchemaGrammar::default(),
            errors: Vec::new(),
            ns_stack: Vec::new(),
            frames: Vec::new(),
            anon_counter: 0,
        }
    }

    /// The grammar and the diagnostics gathered along the way. The caller
    /// decides whether diagnostics are fatal (validating mode) or lax.
    pub fn finish(self) -> (SchemaGrammar, Vec<SchemaError>) {
        (self.grammar, self.errors)
    }

    fn report(&mut self, error: SchemaError) {
        self.errors.push(error);
    }

    fn anon_key(&mut self) -> QName {
        self.anon_counter += 1;
        // `#` cannot occur in an NCName, so synthesized keys cannot clash
        // with author-written names.
        QName::new(
            self.grammar.target_namespace.clone(),
            format!("#anon{}", self.anon_counter),
        )
    }

    // ---- namespace scopes --------------------------------------------------

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
            return Some(Some(XML_NAMESPACE.to_string()));
        }
        for scope in self.ns_stack.iter().rev() {
            if let Some((_, uri)) = scope.iter().find(|(p, _)| p == prefix) {
                return Some(uri.clone());
            }
        }
        None
    }

    /// Expands the element tag name against the in-scope prefixes.
    fn resolve_tag(&mut self, raw: &str) -> (Option<String>, String) {
        match raw.split_once(':') {
            Some((prefix, local)) => match self.lookup_prefix(prefix) {
                Some(uri) => (uri, local.to_string()),
                None => {
                    self.report(SchemaError::Load(format!(
                        "prefix {prefix:?} is not bound to a namespace"
                    )));
                    (None, local.to_string())
                }
            },
            None => (
                self.lookup_prefix("").flatten(),
                raw.to_string(),
            ),
        }
    }

    /// Resolves a type reference. An unqualified name defaults to the
    /// target namespace unless it is a known built-in, which stays in the
    /// schema namespace.
    fn resolve_type_name(&mut self, written: &str) -> QName {
        match written.split_once(':') {
            Some((prefix, local)) => match self.lookup_prefix(prefix) {
                Some(uri) => QName::new(uri, local),
                None => {
                    self.report(SchemaError::Load(format!(
                        "prefix {prefix:?} in type reference {written:?} is not bound"
                    )));
                    QName::unqualified(local)
                }
            },
            None => {
                if let Some(default) = self.lookup_prefix("").flatten() {
                    QName::with_namespace(default, written)
                } else if grove_builtins::is_builtin_type_name(written) {
                    QName::with_namespace(XS_NAMESPACE, written)
                } else {
                    QName::new(self.grammar.target_namespace.clone(), written)
                }
            }
        }
    }

    /// Resolves a component reference (element, group, attribute group).
    fn resolve_component_name(&mut self, written: &str) -> QName {
        match written.split_once(':') {
            Some((prefix, local)) => match self.lookup_prefix(prefix) {
                Some(uri) => QName::new(uri, local),
                None => {
                    self.report(SchemaError::Load(format!(
                        "prefix {prefix:?} in reference {written:?} is not bound"
                    )));
                    QName::unqualified(local)
                }
            },
            None => match self.lookup_prefix("").flatten() {
                Some(default) => QName::with_namespace(default, written),
                None => QName::new(self.grammar.target_namespace.clone(), written),
            },
        }
    }

    fn swallowing(&mut self) -> bool {
        if let Some(Frame::Swallow { depth }) = self.frames.last_mut() {
            *depth += 1;
            true
        } else {
            false
        }
    }

    fn occurs_of(&mut self, attributes: &[SaxAttribute]) -> Occurs {
        match Occurs::parse(attr(attributes, "minOccurs"), attr(attributes, "maxOccurs")) {
            Ok(occurs) => occurs,
            Err(error) => {
                self.report(error);
                Occurs::ONE
            }
        }
    }

    fn value_constraint(&mut self, attributes: &[SaxAttribute]) -> Option<ValueConstraint> {
        match (attr(attributes, "fixed"), attr(attributes, "default")) {
            (Some(fixed), _) => Some(ValueConstraint::Fixed(fixed.to_string())),
            (None, Some(default)) => Some(ValueConstraint::Default(default.to_string())),
            (None, None) => None,
        }
    }

    // ---- dispatch ----------------------------------------------------------

    fn open_schema_element(
        &mut self,
        local: &str,
        attributes: &[SaxAttribute],
    ) -> Result<(), XmlError> {
        match local {
            "schema" => {
                self.grammar.target_namespace =
                    attr(attributes, "targetNamespace").map(str::to_string);
                self.grammar.element_form_default =
                    Form::parse(attr(attributes, "elementFormDefault"), Form::Unqualified);
                self.grammar.attribute_form_default =
                    Form::parse(attr(attributes, "attributeFormDefault"), Form::Unqualified);
                self.frames.push(Frame::Schema);
            }
            "annotation" => self.frames.push(Frame::Swallow { depth: 0 }),
            "element" => self.open_element_decl(attributes),
            "complexType" => {
                let top_level = matches!(self.frames.last(), Some(Frame::Schema));
                let key = match attr(attributes, "name") {
                    Some(name) if top_level => {
                        QName::new(self.grammar.target_namespace.clone(), name)
                    }
                    _ => self.anon_key(),
                };
                let name = attr(attributes, "name")
                    .filter(|_| top_level)
                    .map(|_| key.clone());
                let mut type_ = ComplexType::new(name);
                type_.mixed = parse_bool(attr(attributes, "mixed"));
                type_.abstract_ = parse_bool(attr(attributes, "abstract"));
                self.frames.push(Frame::ComplexType { type_, key });
            }
            "simpleType" => {
                let top_level = matches!(self.frames.last(), Some(Frame::Schema));
                let key = match attr(attributes, "name") {
                    Some(name) if top_level => {
                        QName::new(self.grammar.target_namespace.clone(), name)
                    }
                    _ => self.anon_key(),
                };
                let name = attr(attributes, "name")
                    .filter(|_| top_level)
                    .map(|_| key.clone());
                self.frames.push(Frame::SimpleType {
                    builder: SimpleTypeBuilder {
                        key,
                        name,
                        base: None,
                        facets: Vec::new(),
                        item_type: None,
                        member_types: Vec::new(),
                        is_list: false,
                        is_union: false,
                    },
                });
            }
            "sequence" | "choice" | "all" => {
                let occurs = self.occurs_of(attributes);
                let compositor = match local {
                    "sequence" => Compositor::Sequence,
                    "choice" => Compositor::Choice,
                    _ => Compositor::All,
                };
                self.frames.push(Frame::ModelGroup {
                    compositor,
                    particles: Vec::new(),
                    occurs,
                });
            }
            "any" => {
                let occurs = self.occurs_of(attributes);
                let namespace = NamespaceConstraint::parse(
                    attr(attributes, "namespace"),
                    self.grammar.target_namespace.as_deref(),
                );
                let process_contents =
                    ProcessContents::parse(attr(attributes, "processContents"));
                self.frames.push(Frame::AnyParticle {
                    particle: Particle::Any {
                        namespace,
                        process_contents,
                        occurs,
                    },
                });
            }
            "anyAttribute" => {
                self.mark_any_attribute();
                self.frames.push(Frame::Swallow { depth: 0 });
            }
            "group" => {
                if let Some(reference) = attr(attributes, "ref") {
                    let reference = self.resolve_component_name(reference);
                    let occurs = self.occurs_of(attributes);
                    self.grammar.defer_group_ref(reference.clone());
                    self.frames.push(Frame::GroupRef { reference, occurs });
                } else if let Some(name) = attr(attributes, "name") {
                    let name = QName::new(self.grammar.target_namespace.clone(), name);
                    self.frames.push(Frame::GroupDef {
                        name,
                        particles: Vec::new(),
                    });
                } else {
                    self.report(SchemaError::Load(
                        "group needs either a name or a ref".into(),
                    ));
                    self.frames.push(Frame::Swallow { depth: 0 });
                }
            }
            "attributeGroup" => {
                if let Some(reference) = attr(attributes, "ref") {
                    let reference = self.resolve_component_name(reference);
                    self.grammar.defer_attribute_group_ref(reference.clone());
                    self.attach_attribute_group_ref(reference);
                    self.frames.push(Frame::Swallow { depth: 0 });
                } else if let Some(name) = attr(attributes, "name") {
                    let name = QName::new(self.grammar.target_namespace.clone(), name);
                    self.frames.push(Frame::AttributeGroupDef {
                        group: AttributeGroup::new(name),
                    });
                } else {
                    self.report(SchemaError::Load(
                        "attributeGroup needs either a name or a ref".into(),
                    ));
                    self.frames.push(Frame::Swallow { depth: 0 });
                }
            }
            "attribute" => self.open_attribute_decl(attributes),
            "restriction" => {
                let base = attr(attributes, "base").map(|b| self.resolve_type_name(b));
                self.frames.push(Frame::Restriction(DerivationFrame {
                    base,
                    ..DerivationFrame::default()
                }));
            }
            "extension" => {
                let base = attr(attributes, "base").map(|b| self.resolve_type_name(b));
                if base.is_none() {
                    self.report(SchemaError::Load("extension requires a base".into()));
                }
                self.frames.push(Frame::Extension(DerivationFrame {
                    base,
                    ..DerivationFrame::default()
                }));
            }
            "simpleContent" => self.frames.push(Frame::SimpleContent),
            "complexContent" => self.frames.push(Frame::ComplexContent),
            "list" => {
                let item_type = attr(attributes, "itemType").map(|t| self.resolve_type_name(t));
                self.frames.push(Frame::List { item_type });
            }
            "union" => {
                let member_types = attr(attributes, "memberTypes")
                    .map(|list| {
                        list.split_ascii_whitespace()
                            .map(|t| self.resolve_type_name(t))
                            .collect()
                    })
                    .unwrap_or_default();
                self.frames.push(Frame::Union { member_types });
            }
            "import" => {
                self.grammar.imports.push(Import {
                    namespace: attr(attributes, "namespace").map(str::to_string),
                    schema_location: attr(attributes, "schemaLocation").map(str::to_string),
                });
                self.frames.push(Frame::Swallow { depth: 0 });
            }
            "include" => {
                self.grammar.imports.push(Import {
                    namespace: None,
                    schema_location: attr(attributes, "schemaLocation").map(str::to_string),
                });
                self.frames.push(Frame::Swallow { depth: 0 });
            }
            "notation" => {
                if let Some(name) = attr(attributes, "name") {
                    self.grammar.register_notation(NotationDecl {
                        name: QName::new(self.grammar.target_namespace.clone(), name),
                        public_id: attr(attributes, "public").map(str::to_string),
                        system_id: attr(attributes, "system").map(str::to_string),
                    });
                }
                self.frames.push(Frame::Swallow { depth: 0 });
            }
            "enumeration" | "pattern" | "length" | "minLength" | "maxLength"
            | "minInclusive" | "maxInclusive" | "minExclusive" | "maxExclusive"
            | "totalDigits" | "fractionDigits" | "whiteSpace" => {
                self.open_facet(local, attributes);
                self.frames.push(Frame::Swallow { depth: 0 });
            }
            other => {
                self.report(SchemaError::Load(format!(
                    "unsupported schema element <{other}>"
                )));
                self.frames.push(Frame::Swallow { depth: 0 });
            }
        }
        Ok(())
    }

    fn open_element_decl(&mut self, attributes: &[SaxAttribute]) {
        let top_level = matches!(self.frames.last(), Some(Frame::Schema));
        let occurs = if top_level {
            Occurs::ONE
        } else {
            self.occurs_of(attributes)
        };

        if let Some(reference) = attr(attributes, "ref") {
            let name = self.resolve_component_name(reference);
            self.frames.push(Frame::ElementRef { name, occurs });
            return;
        }

        let Some(local) = attr(attributes, "name") else {
            self.report(SchemaError::Load("element needs a name or a ref".into()));
            self.frames.push(Frame::Swallow { depth: 0 });
            return;
        };

        let form = Form::parse(attr(attributes, "form"), self.grammar.element_form_default);
        let namespace = if top_level || form == Form::Qualified {
            self.grammar.target_namespace.clone()
        } else {
            None
        };
        let mut decl = ElementDecl::new(QName::new(namespace, local));
        decl.form = form;
        decl.nillable = parse_bool(attr(attributes, "nillable"));
        decl.abstract_ = parse_bool(attr(attributes, "abstract"));
        decl.substitution_group = attr(attributes, "substitutionGroup")
            .map(|head| self.resolve_component_name(head));
        decl.value_constraint = self.value_constraint(attributes);
        decl.type_ref = attr(attributes, "type").map(|t| self.resolve_type_name(t));

        self.frames.push(Frame::Element {
            decl,
            occurs,
            top_level,
        });
    }

    fn open_attribute_decl(&mut self, attributes: &[SaxAttribute]) {
        let top_level = matches!(self.frames.last(), Some(Frame::Schema));

        let name = if let Some(reference) = attr(attributes, "ref") {
            self.resolve_component_name(reference)
        } else if let Some(local) = attr(attributes, "name") {
            let form = Form::parse(attr(attributes, "form"), self.grammar.attribute_form_default);
            let namespace = if top_level || form == Form::Qualified {
                self.grammar.target_namespace.clone()
            } else {
                None
            };
            QName::new(namespace, local)
        } else {
            self.report(SchemaError::Load("attribute needs a name or a ref".into()));
            self.frames.push(Frame::Swallow { depth: 0 });
            return;
        };

        let mut decl = AttributeDecl::new(name);
        decl.form = Form::parse(attr(attributes, "form"), self.grammar.attribute_form_default);
        decl.use_ = AttributeUse::parse(attr(attributes, "use"));
        decl.value_constraint = self.value_constraint(attributes);
        decl.type_ref = attr(attributes, "type").map(|t| self.resolve_type_name(t));

        self.frames.push(Frame::Attribute { decl, top_level });
    }

    fn open_facet(&mut self, local: &str, attributes: &[SaxAttribute]) {
        let Some(value) = attr(attributes, "value").map(str::to_string) else {
            self.report(SchemaError::InvalidFacets(format!(
                "facet {local} is missing its value"
            )));
            return;
        };

        enum Parsed {
            Enumeration(String),
            Pattern(String),
            Single(Facet),
        }

        let bad_number = || {
            SchemaError::InvalidFacets(format!(
                "facet {local} value {value:?} is not a non-negative integer"
            ))
        };
        let parsed = match local {
            "enumeration" => Ok(Parsed::Enumeration(value.clone())),
            "pattern" => Ok(Parsed::Pattern(value.clone())),
            "length" | "minLength" | "maxLength" => {
                value.parse::<u64>().map_err(|_| bad_number()).map(|v| {
                    Parsed::Single(match local {
                        "length" => Facet::Length(v),
                        "minLength" => Facet::MinLength(v),
                        _ => Facet::MaxLength(v),
                    })
                })
            }
            "totalDigits" | "fractionDigits" => {
                value.parse::<u32>().map_err(|_| bad_number()).map(|v| {
                    Parsed::Single(if local == "totalDigits" {
                        Facet::TotalDigits(v)
                    } else {
                        Facet::FractionDigits(v)
                    })
                })
            }
            "minInclusive" => Ok(Parsed::Single(Facet::MinInclusive(value.clone()))),
            "maxInclusive" => Ok(Parsed::Single(Facet::MaxInclusive(value.clone()))),
            "minExclusive" => Ok(Parsed::Single(Facet::MinExclusive(value.clone()))),
            "maxExclusive" => Ok(Parsed::Single(Facet::MaxExclusive(value.clone()))),
            "whiteSpace" => match value.as_str() {
                "preserve" => Ok(Parsed::Single(Facet::WhiteSpace(WhiteSpace::Preserve))),
                "replace" => Ok(Parsed::Single(Facet::WhiteSpace(WhiteSpace::Replace))),
                "collapse" => Ok(Parsed::Single(Facet::WhiteSpace(WhiteSpace::Collapse))),
                other => Err(SchemaError::InvalidFacets(format!(
                    "whiteSpace value {other:?} is not preserve, replace or collapse"
                ))),
            },
            other => Err(SchemaError::InvalidFacets(format!(
                "unsupported facet {other}"
            ))),
        };

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                self.report(error);
                return;
            }
        };

        let derivation = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Restriction(derivation) => Some(derivation),
            _ => None,
        });
        match derivation {
            Some(derivation) => match parsed {
                Parsed::Enumeration(value) => derivation.enumerations.push(value),
                Parsed::Pattern(value) => derivation.patterns.push(value),
                Parsed::Single(facet) => derivation.facets.push(facet),
            },
            None => self.report(SchemaError::InvalidFacets(format!(
                "facet {local} outside of a restriction"
            ))),
        }
    }

    fn mark_any_attribute(&mut self) {
        for frame in self.frames.iter_mut().rev() {
            match frame {
                Frame::ComplexType { type_, .. } => {
                    type_.any_attribute = true;
                    return;
                }
                Frame::AttributeGroupDef { group } => {
                    group.any_attribute = true;
                    return;
                }
                Frame::Restriction(derivation) | Frame::Extension(derivation) => {
                    derivation.any_attribute = true;
                    return;
                }
                _ => {}
            }
        }
        self.report(SchemaError::Load("misplaced anyAttribute".into()));
    }

    fn attach_attribute_group_ref(&mut self, reference: QName) {
        let target = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::ComplexType { type_, .. } => Some(&mut type_.attribute_group_refs),
            Frame::AttributeGroupDef { group } => Some(&mut group.group_refs),
            Frame::Restriction(derivation) | Frame::Extension(derivation) => {
                Some(&mut derivation.attribute_group_refs)
            }
            _ => None,
        });
        match target {
            Some(refs) => refs.push(reference),
            None => self.report(SchemaError::Load(
                "misplaced attributeGroup reference".into(),
            )),
        }
    }

    fn attach_particle(&mut self, particle: Particle) {
        let error = match self.frames.last_mut() {
            Some(Frame::ModelGroup { particles, .. }) | Some(Frame::GroupDef { particles, .. }) => {
                particles.push(particle);
                None
            }
            Some(Frame::Restriction(derivation)) | Some(Frame::Extension(derivation)) => {
                derivation.particle = Some(particle);
                None
            }
            Some(Frame::ComplexType { type_, .. }) => type_.set_content_model(particle).err(),
            _ => Some(SchemaError::InvalidParticle(
                "particle in an unexpected position".into(),
            )),
        };
        if let Some(error) = error {
            self.report(error);
        }
    }

    fn attach_attribute(&mut self, decl: AttributeDecl, top_level: bool) {
        if top_level {
            if let Err(error) = self.grammar.register_attribute(decl) {
                self.report(error);
            }
            return;
        }
        let target = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Restriction(derivation) | Frame::Extension(derivation) => {
                Some(&mut derivation.attributes)
            }
            Frame::ComplexType { type_, .. } => Some(&mut type_.attributes),
            Frame::AttributeGroupDef { group } => Some(&mut group.attributes),
            _ => None,
        });
        match target {
            Some(attributes) => attributes.push(decl),
            None => self.report(SchemaError::Load("misplaced attribute declaration".into())),
        }
    }

    /// Applies a finished derivation to its owner: the enclosing simple
    /// type builder, or the complex type reached through simpleContent /
    /// complexContent.
    fn attach_derivation(&mut self, derivation: DerivationFrame, method: DerivationMethod) {
        let DerivationFrame {
            base,
            patterns,
            enumerations,
            facets: mut collected,
            particle,
            attributes,
            attribute_group_refs,
            any_attribute,
        } = derivation;

        let mut facets = Vec::new();
        if !patterns.is_empty() {
            // Repeated pattern elements form one expression with multiple
            // branches.
            match Pattern::compile(patterns.join("|")) {
                Ok(pattern) => facets.push(Facet::Pattern(pattern)),
                Err(error) => self.report(error),
            }
        }
        if !enumerations.is_empty() {
            facets.push(Facet::Enumeration(enumerations));
        }
        facets.append(&mut collected);

        if matches!(self.frames.last(), Some(Frame::SimpleType { .. })) {
            if let Some(Frame::SimpleType { builder }) = self.frames.last_mut() {
                builder.base = base;
                builder.facets = facets;
            }
            return;
        }

        let under_simple_content = matches!(self.frames.last(), Some(Frame::SimpleContent));

        let primitive = base
            .as_ref()
            .filter(|b| b.is_builtin())
            .and_then(|b| grove_builtins::builtin(&b.local))
            .map(|b| b.primitive());
        if let Err(error) = check_facet_set(&facets, primitive) {
            self.report(error);
        }

        // Facets on a simpleContent restriction become an anonymous simple
        // type constraining the character content.
        let simple_content = if under_simple_content {
            match (&base, facets.is_empty()) {
                (Some(base), false) => {
                    let key = self.anon_key();
                    let restricted = SimpleType::atomic(None, base.clone(), facets);
                    if let Err(error) = self
                        .grammar
                        .register_type(key.clone(), SchemaType::Simple(restricted))
                    {
                        self.report(error);
                    }
                    Some(key)
                }
                (Some(base), true) => Some(base.clone()),
                (None, _) => None,
            }
        } else {
            None
        };

        let owner = self
            .frames
            .iter()
            .rposition(|frame| matches!(frame, Frame::ComplexType { .. }));
        let Some(owner) = owner else {
            self.report(SchemaError::Load(
                "restriction or extension outside of a type".into(),
            ));
            return;
        };

        let mut deferred = None;
        if let Frame::ComplexType { type_, .. } = &mut self.frames[owner] {
            if let Some(base) = base {
                type_.derivation = Some((method, base));
                if let Some(content) = simple_content {
                    type_.set_simple_content(content);
                }
            }
            if let Some(particle) = particle {
                deferred = type_.set_content_model(particle).err();
            }
            type_.attributes.extend(attributes);
            type_.attribute_group_refs.extend(attribute_group_refs);
            type_.any_attribute |= any_attribute;
        }
        if let Some(error) = deferred {
            self.report(error);
        }
    }

    fn close_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Schema | Frame::SimpleContent | Frame::ComplexContent => {}
            Frame::Swallow { .. } => {}
            Frame::Element {
                decl,
                occurs,
                top_level,
            } => {
                let name = decl.name.clone();
                if top_level {
                    if let Err(error) = self.grammar.register_element(decl) {
                        self.report(error);
                    }
                } else {
                    self.grammar.register_local_element(decl);
                    self.attach_particle(Particle::Element { name, occurs });
                }
            }
            Frame::ElementRef { name, occurs } => {
                self.attach_particle(Particle::Element { name, occurs });
            }
            Frame::ComplexType { type_, key } => {
                if let Err(error) = self
                    .grammar
                    .register_type(key.clone(), SchemaType::Complex(type_))
                {
                    self.report(error);
                }
                if let Some(Frame::Element { decl, .. }) = self.frames.last_mut() {
                    decl.type_ref = Some(key);
                }
            }
            Frame::SimpleType { builder } => {
                let facet_check = {
                    let primitive = builder
                        .base
                        .as_ref()
                        .filter(|b| b.is_builtin())
                        .and_then(|b| grove_builtins::builtin(&b.local))
                        .map(|b| b.primitive());
                    check_facet_set(&builder.facets, primitive).err()
                };
                if let Some(error) = facet_check {
                    self.report(error);
                }

                let key = builder.key.clone();
                let simple = if builder.is_list {
                    let item = builder.item_type.unwrap_or_else(|| {
                        QName::with_namespace(XS_NAMESPACE, "anySimpleType")
                    });
                    SimpleType::list(builder.name, item)
                } else if builder.is_union {
                    SimpleType::union(builder.name, builder.member_types)
                } else {
                    let base = builder.base.unwrap_or_else(|| {
                        QName::with_namespace(XS_NAMESPACE, "anySimpleType")
                    });
                    SimpleType::atomic(builder.name, base, builder.facets)
                };
                if let Err(error) = self
                    .grammar
                    .register_type(key.clone(), SchemaType::Simple(simple))
                {
                    self.report(error);
                }

                match self.frames.last_mut() {
                    Some(Frame::Element { decl, .. }) => decl.type_ref = Some(key),
                    Some(Frame::Attribute { decl, .. }) => decl.type_ref = Some(key),
                    Some(Frame::List { item_type }) => *item_type = Some(key),
                    Some(Frame::Union { member_types }) => member_types.push(key),
                    Some(Frame::Restriction(derivation)) => {
                        // An inline simple type can stand in for the base.
                        if derivation.base.is_none() {
                            derivation.base = Some(key);
                        }
                    }
                    _ => {}
                }
            }
            Frame::Restriction(derivation) => {
                self.attach_derivation(derivation, DerivationMethod::Restriction);
            }
            Frame::Extension(derivation) => {
                self.attach_derivation(derivation, DerivationMethod::Extension);
            }
            Frame::ModelGroup {
                compositor,
                particles,
                occurs,
            } => {
                let particle = match compositor {
                    Compositor::Sequence => Particle::Sequence { particles, occurs },
                    Compositor::Choice => Particle::Choice { particles, occurs },
                    Compositor::All => Particle::All {
                        particles,
                        min: occurs.min,
                    },
                };
                let nested_all = matches!(particle, Particle::All { .. })
                    && self
                        .frames
                        .iter()
                        .any(|f| matches!(f, Frame::ModelGroup { .. }));
                if nested_all {
                    self.report(SchemaError::InvalidParticle(
                        "an all group may only appear at the top of a content model".into(),
                    ));
                }
                if let Err(error) = particle.check_structure() {
                    self.report(error);
                }
                self.attach_particle(particle);
            }
            Frame::GroupDef { name, mut particles } => {
                let particle = if particles.len() == 1 {
                    particles.remove(0)
                } else {
                    Particle::Sequence {
                        particles,
                        occurs: Occurs::ONE,
                    }
                };
                if let Err(error) = self.grammar.register_group(name, particle) {
                    self.report(error);
                }
            }
            Frame::GroupRef { reference, occurs } => {
                self.attach_particle(Particle::Group { reference, occurs });
            }
            Frame::AnyParticle { particle } => self.attach_particle(particle),
            Frame::AttributeGroupDef { group } => {
                if let Err(error) = self.grammar.register_attribute_group(group) {
                    self.report(error);
                }
            }
            Frame::Attribute { decl, top_level } => self.attach_attribute(decl, top_level),
            Frame::List { item_type } => {
                if let Some(Frame::SimpleType { builder }) = self.frames.last_mut() {
                    builder.is_list = true;
                    builder.item_type = item_type;
                }
            }
            Frame::Union { member_types } => {
                if let Some(Frame::SimpleType { builder }) = self.frames.last_mut() {
                    builder.is_union = true;
                    builder.member_types = member_types;
                }
            }
        }
    }
}

impl ContentHandler for SchemaHandler {
    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        self.push_ns_scope(attributes);
        if self.swallowing() {
            return Ok(());
        }
        let (namespace, local) = self.resolve_tag(name);
        if namespace.as_deref() != Some(XS_NAMESPACE) {
            if self.frames.is_empty() {
                self.report(SchemaError::Load(format!(
                    "root element {name:?} is not an XML Schema document"
                )));
            }
            self.frames.push(Frame::Swallow { depth: 0 });
            return Ok(());
        }
        self.open_schema_element(&local, attributes)
    }

    fn end_element(&mut self, _name: &str) -> Result<(), XmlError> {
        if let Some(Frame::Swallow { depth }) = self.frames.last_mut() {
            if *depth > 0 {
                *depth -= 1;
                self.ns_stack.pop();
                return Ok(());
            }
        }
        if let Some(frame) = self.frames.pop() {
            self.close_frame(frame);
        }
        self.ns_stack.pop();
        Ok(())
    }
}
