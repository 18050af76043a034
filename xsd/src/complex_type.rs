//! Complex type definitions (§3.4): content kind, the content-model
//! particle, attribute uses and the derivation link.

use crate::attribute_decl::AttributeDecl;
use crate::error::SchemaError;
use crate::particle::{Occurs, Particle};
use crate::xstypes::QName;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Empty,
    Simple,
    ElementOnly,
    Mixed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DerivationMethod {
    Extension,
    Restriction,
}

#[derive(Clone, Debug)]
pub struct ComplexType {
    pub name: Option<QName>,
    /// Set once a content model or simple content is established;
    /// `content_kind()` reports `Empty` while unset.
    declared_kind: Option<ContentKind>,
    pub content_model: Option<Particle>,
    /// Simple type constraining character content when the kind is
    /// `Simple`.
    pub simple_content_type: Option<QName>,
    pub attributes: Vec<AttributeDecl>,
    pub attribute_group_refs: Vec<QName>,
    pub derivation: Option<(DerivationMethod, QName)>,
    pub mixed: bool,
    pub abstract_: bool,
    /// An `anyAttribute` wildcard admits undeclared attributes.
    pub any_attribute: bool,
}

impl ComplexType {
    pub fn new(name: Option<QName>) -> Self {
        Self {
            name,
            declared_kind: None,
            content_model: None,
            simple_content_type: None,
            attributes: Vec::new(),
            attribute_group_refs: Vec::new(),
            derivation: None,
            mixed: false,
            abstract_: false,
            any_attribute: false,
        }
    }

    pub fn content_kind(&self) -> ContentKind {
        self.declared_kind.unwrap_or(ContentKind::Empty)
    }

    /// Installs the content model. Fails when the type is already fixed to
    /// empty content; the `mixed` flag decides between mixed and
    /// element-only.
    pub fn set_content_model(&mut self, model: Particle) -> Result<(), SchemaError> {
        if self.declared_kind == Some(ContentKind::Empty) {
            return Err(SchemaError::Load(format!(
                "type {} has empty content and cannot take a content model",
                self.display_name()
            )));
        }
        self.declared_kind = Some(if self.mixed {
            ContentKind::Mixed
        } else {
            ContentKind::ElementOnly
        });
        self.content_model = Some(model);
        Ok(())
    }

    pub fn set_simple_content(&mut self, base: QName) {
        self.declared_kind = Some(ContentKind::Simple);
        self.simple_content_type = Some(base);
    }

    pub fn set_empty_content(&mut self) {
        self.declared_kind = Some(ContentKind::Empty);
    }

    /// Merges the base type's particles in front of this extension's own,
    /// as a sequence. Nested choice and all groups keep their identity;
    /// only sequences are flattened.
    pub fn merge_extension_base(&mut self, base: &ComplexType) {
        let mut merged = Vec::new();
        append_flattened(&mut merged, base.content_model.clone());
        append_flattened(&mut merged, self.content_model.take());
        if !merged.is_empty() {
            let model = if merged.len() == 1 {
                merged.remove(0)
            } else {
                Particle::Sequence {
                    particles: merged,
                    occurs: Occurs::ONE,
                }
            };
            if self.mixed || base.mixed {
                self.mixed = true;
            }
            self.declared_kind = Some(if self.mixed {
                ContentKind::Mixed
            } else {
                ContentKind::ElementOnly
            });
            self.content_model = Some(model);
        } else if base.content_kind() == ContentKind::Simple {
            self.declared_kind = Some(ContentKind::Simple);
            if self.simple_content_type.is_none() {
                self.simple_content_type = base.simple_content_type.clone();
            }
        }

        for attribute in &base.attributes {
            if !self
                .attributes
                .iter()
                .any(|own| own.name == attribute.name)
            {
                self.attributes.push(attribute.clone());
            }
        }
        for group in &base.attribute_group_refs {
            if !self.attribute_group_refs.contains(group) {
                self.attribute_group_refs.push(group.clone());
            }
        }
        self.any_attribute |= base.any_attribute;
    }

    fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map(QName::to_string)
            .unwrap_or_else(|| "<anonymous>".into())
    }
}

/// Appends a particle to the merged child list, splicing in the children
/// of a single-occurrence sequence instead of nesting it.
fn append_flattened(into: &mut Vec<Particle>, particle: Option<Particle>) {
    match particle {
        Some(Particle::Sequence { particles, occurs }) if occurs == Occurs::ONE => {
            into.extend(particles);
        }
        Some(other) => into.push(other),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xstypes::QName;

    fn element(name: &str) -> Particle {
        Particle::Element {
            name: QName::unqualified(name),
            occurs: Occurs::ONE,
        }
    }

    #[test]
    fn content_kind_follows_mixed_flag() {
        let mut plain = ComplexType::new(None);
        plain.set_content_model(element("a")).unwrap();
        assert_eq!(plain.content_kind(), ContentKind::ElementOnly);

        let mut mixed = ComplexType::new(None);
        mixed.mixed = true;
        mixed.set_content_model(element("a")).unwrap();
        assert_eq!(mixed.content_kind(), ContentKind::Mixed);
    }

    #[test]
    fn empty_content_rejects_a_model() {
        let mut empty = ComplexType::new(None);
        empty.set_empty_content();
        assert!(empty.set_content_model(element("a")).is_err());
    }

    #[test]
    fn extension_merge_flattens_sequences_only() {
        let mut base = ComplexType::new(Some(QName::unqualified("Base")));
        base.set_content_model(Particle::Sequence {
            particles: vec![element("a"), element("b")],
            occurs: Occurs::ONE,
        })
        .unwrap();

        let mut derived = ComplexType::new(Some(QName::unqualified("Derived")));
        derived
            .set_content_model(Particle::Choice {
                particles: vec![element("c"), element("d")],
                occurs: Occurs::ONE,
            })
            .unwrap();
        derived.merge_extension_base(&base);

        match derived.content_model.as_ref().unwrap() {
            Particle::Sequence { particles, .. } => {
                assert_eq!(particles.len(), 3);
                assert_eq!(particles[0], element("a"));
                assert_eq!(particles[1], element("b"));
                // The choice keeps its identity instead of being spliced.
                assert!(matches!(particles[2], Particle::Choice { .. }));
            }
            other => panic!("expected a sequence, got {other:?}"),
        }
    }

    #[test]
    fn extension_merge_carries_base_attributes() {
        let mut base = ComplexType::new(None);
        base.attributes
            .push(AttributeDecl::new(QName::unqualified("id")));
        base.any_attribute = true;

        let mut derived = ComplexType::new(None);
        derived
            .attributes
            .push(AttributeDecl::new(QName::unqualified("kind")));
        derived.merge_extension_base(&base);

        assert_eq!(derived.attributes.len(), 2);
        assert!(derived.any_attribute);
    }
}
