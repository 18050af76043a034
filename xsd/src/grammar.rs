//! One schema document's component arena. Components live in maps keyed by
//! their canonical name; references between components are name handles
//! resolved through the grammar (or through the composite grammar for
//! cross-schema references). An alias index maps author-written forms back
//! to canonical keys.

use std::collections::HashMap;

use crate::attribute_decl::{AttributeDecl, AttributeGroup, Form};
use crate::complex_type::ComplexType;
use crate::element_decl::{ElementDecl, NotationDecl};
use crate::error::{RefKind, SchemaError};
use crate::particle::Particle;
use crate::simple_type::SimpleType;
use crate::xstypes::QName;

#[derive(Clone, Debug)]
pub enum SchemaType {
    Simple(SimpleType),
    Complex(ComplexType),
}

impl SchemaType {
    pub fn as_simple(&self) -> Option<&SimpleType> {
        match self {
            Self::Simple(simple) => Some(simple),
            Self::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexType> {
        match self {
            Self::Complex(complex) => Some(complex),
            Self::Simple(_) => None,
        }
    }

    /// Base type link, the edge the derivation-cycle check walks.
    pub fn base_name(&self) -> Option<&QName> {
        match self {
            Self::Simple(simple) => simple.base.as_ref(),
            Self::Complex(complex) => complex.derivation.as_ref().map(|(_, base)| base),
        }
    }
}

/// An `xs:import` or `xs:include` recorded for the composite loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// Imported namespace; `None` for includes.
    pub namespace: Option<String>,
    pub schema_location: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SchemaGrammar {
    pub target_namespace: Option<String>,
    pub element_form_default: Form,
    pub attribute_form_default: Form,

    types: HashMap<QName, SchemaType>,
    elements: HashMap<QName, ElementDecl>,
    attributes: HashMap<QName, AttributeDecl>,
    groups: HashMap<QName, Particle>,
    attribute_groups: HashMap<QName, AttributeGroup>,
    notations: HashMap<QName, NotationDecl>,

    /// Author-written name forms (plain local name, Clark form) mapped to
    /// the canonical key of a named type.
    aliases: HashMap<String, QName>,

    pub imports: Vec<Import>,

    deferred_group_refs: Vec<QName>,
    deferred_attribute_group_refs: Vec<QName>,
}

impl SchemaGrammar {
    pub fn new(target_namespace: Option<String>) -> Self {
        Self {
            target_namespace,
            ..Self::default()
        }
    }

    // ---- registration (during the schema-parse traversal) -----------------

    pub fn register_type(&mut self, name: QName, type_: SchemaType) -> Result<(), SchemaError> {
        if self.elements.contains_key(&name) {
            // Element declarations and type definitions share the key space.
            return Err(SchemaError::DuplicateName(name));
        }
        if self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.add_alias(&name);
        self.types.insert(name, type_);
        Ok(())
    }

    pub fn register_element(&mut self, decl: ElementDecl) -> Result<(), SchemaError> {
        let name = decl.name.clone();
        if self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        if self.elements.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.add_alias(&name);
        self.elements.insert(name, decl);
        Ok(())
    }

    /// Local element declarations surface globally only while no global
    /// declaration claims the name; the content model still bounds where
    /// they can occur.
    pub fn register_local_element(&mut self, decl: ElementDecl) {
        self.elements.entry(decl.name.clone()).or_insert(decl);
    }

    pub fn register_attribute(&mut self, decl: AttributeDecl) -> Result<(), SchemaError> {
        let name = decl.name.clone();
        if self.attributes.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.attributes.insert(name, decl);
        Ok(())
    }

    pub fn register_group(&mut self, name: QName, particle: Particle) -> Result<(), SchemaError> {
        if self.groups.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.groups.insert(name, particle);
        Ok(())
    }

    pub fn register_attribute_group(&mut self, group: AttributeGroup) -> Result<(), SchemaError> {
        let name = group.name.clone();
        if self.attribute_groups.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.attribute_groups.insert(name, group);
        Ok(())
    }

    pub fn register_notation(&mut self, decl: NotationDecl) {
        self.notations.entry(decl.name.clone()).or_insert(decl);
    }

    fn add_alias(&mut self, name: &QName) {
        self.aliases
            .entry(name.local.clone())
            .or_insert_with(|| name.clone());
        self.aliases
            .entry(name.clark())
            .or_insert_with(|| name.clone());
    }

    // ---- deferred references ----------------------------------------------

    pub fn defer_group_ref(&mut self, name: QName) {
        if !self.deferred_group_refs.contains(&name) {
            self.deferred_group_refs.push(name);
        }
    }

    pub fn defer_attribute_group_ref(&mut self, name: QName) {
        if !self.deferred_attribute_group_refs.contains(&name) {
            self.deferred_attribute_group_refs.push(name);
        }
    }

    pub fn deferred_group_refs(&self) -> &[QName] {
        &self.deferred_group_refs
    }

    pub fn deferred_attribute_group_refs(&self) -> &[QName] {
        &self.deferred_attribute_group_refs
    }

    // ---- lookup ------------------------------------------------------------

    pub fn type_by_name(&self, name: &QName) -> Option<&SchemaType> {
        self.types.get(name)
    }

    pub fn element(&self, name: &QName) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn attribute(&self, name: &QName) -> Option<&AttributeDecl> {
        self.attributes.get(name)
    }

    pub fn group(&self, name: &QName) -> Option<&Particle> {
        self.groups.get(name)
    }

    pub fn attribute_group(&self, name: &QName) -> Option<&AttributeGroup> {
        self.attribute_groups.get(name)
    }

    pub fn notation(&self, name: &QName) -> Option<&NotationDecl> {
        self.notations.get(name)
    }

    /// Resolves an author-written form (`local` or `{ns}local`) through the
    /// alias index.
    pub fn resolve_alias(&self, written: &str) -> Option<&QName> {
        self.aliases.get(written)
    }

    pub fn types(&self) -> impl Iterator<Item = (&QName, &SchemaType)> {
        self.types.iter()
    }

    pub fn elements(&self) -> impl Iterator<Item = (&QName, &ElementDecl)> {
        self.elements.iter()
    }

    pub fn type_names(&self) -> Vec<QName> {
        self.types.keys().cloned().collect()
    }

    pub(crate) fn type_by_name_mut(&mut self, name: &QName) -> Option<&mut SchemaType> {
        self.types.get_mut(name)
    }

    pub(crate) fn remove_element(&mut self, name: &QName) -> Option<ElementDecl> {
        self.elements.remove(name)
    }

    /// Every name handle this grammar's components point at, with the
    /// reference kind, for the post-load resolution check.
    pub fn referenced_names(&self) -> Vec<(RefKind, QName)> {
        let mut refs = Vec::new();
        let mut push_type = |refs: &mut Vec<(RefKind, QName)>, name: &Option<QName>| {
            if let Some(name) = name {
                refs.push((RefKind::Type, name.clone()));
            }
        };

        for type_ in self.types.values() {
            match type_ {
                SchemaType::Simple(simple) => {
                    push_type(&mut refs, &simple.base);
                    push_type(&mut refs, &simple.item_type);
                    for member in &simple.member_types {
                        refs.push((RefKind::Type, member.clone()));
                    }
                }
                SchemaType::Complex(complex) => {
                    if let Some((_, base)) = &complex.derivation {
                        refs.push((RefKind::Type, base.clone()));
                    }
                    push_type(&mut refs, &complex.simple_content_type);
                    for attribute in &complex.attributes {
                        push_type(&mut refs, &attribute.type_ref);
                    }
                    for group in &complex.attribute_group_refs {
                        refs.push((RefKind::AttributeGroup, group.clone()));
                    }
                    if let Some(model) = &complex.content_model {
                        let mut groups = Vec::new();
                        model.group_references(&mut groups);
                        for group in groups {
                            refs.push((RefKind::Group, group.clone()));
                        }
                    }
                }
            }
        }
        for element in self.elements.values() {
            push_type(&mut refs, &element.type_ref);
            if let Some(head) = &element.substitution_group {
                refs.push((RefKind::Element, head.clone()));
            }
        }
        for attribute in self.attributes.values() {
            push_type(&mut refs, &attribute.type_ref);
        }
        for group in self.attribute_groups.values() {
            for attribute in &group.attributes {
                push_type(&mut refs, &attribute.type_ref);
            }
            for nested in &group.group_refs {
                refs.push((RefKind::AttributeGroup, nested.clone()));
            }
        }
        for particle in self.groups.values() {
            let mut groups = Vec::new();
            particle.group_references(&mut groups);
            for group in groups {
                refs.push((RefKind::Group, group.clone()));
            }
        }
        refs
    }
}
