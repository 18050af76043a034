//! Content-model particles: the term tree a complex type constrains its
//! element children with (§3.9).

use crate::error::SchemaError;
use crate::xstypes::QName;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Occurs {
    pub min: u32,
    pub max: MaxOccurs,
}

impl Occurs {
    pub const ONE: Occurs = Occurs {
        min: 1,
        max: MaxOccurs::Bounded(1),
    };

    pub const OPTIONAL: Occurs = Occurs {
        min: 0,
        max: MaxOccurs::Bounded(1),
    };

    /// Maps the `minOccurs`/`maxOccurs` attributes; both default to 1.
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Result<Self, SchemaError> {
        let parse_count = |value: &str| {
            value.parse::<u32>().map_err(|_| {
                SchemaError::InvalidParticle(format!("occurrence bound {value:?} is not a number"))
            })
        };
        let min = min.map(parse_count).transpose()?.unwrap_or(1);
        let max = match max {
            Some("unbounded") => MaxOccurs::Unbounded,
            Some(value) => MaxOccurs::Bounded(parse_count(value)?),
            None => MaxOccurs::Bounded(1),
        };
        let occurs = Occurs { min, max };
        if !occurs.is_valid() {
            return Err(SchemaError::InvalidParticle(format!(
                "minOccurs {min} exceeds maxOccurs"
            )));
        }
        Ok(occurs)
    }

    pub fn is_valid(&self) -> bool {
        match self.max {
            MaxOccurs::Unbounded => true,
            MaxOccurs::Bounded(max) => self.min <= max,
        }
    }

    fn within_zero_or_one(&self) -> bool {
        self.min <= 1 && matches!(self.max, MaxOccurs::Bounded(0) | MaxOccurs::Bounded(1))
    }
}

/// Wildcard namespace constraint (§3.10.2), resolved against the target
/// namespace at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// `##other`: anything but the listed namespaces (target and absent).
    Not(Vec<Option<String>>),
    Enumeration(Vec<Option<String>>),
}

impl NamespaceConstraint {
    /// Maps the `namespace` attribute of `<any>`/`<anyAttribute>`.
    pub fn parse(attribute: Option<&str>, target_namespace: Option<&str>) -> Self {
        match attribute {
            None | Some("##any") => Self::Any,
            Some("##other") => {
                let mut excluded = vec![None];
                if let Some(target) = target_namespace {
                    excluded.push(Some(target.to_string()));
                }
                Self::Not(excluded)
            }
            Some(list) => {
                let namespaces = list
                    .split_ascii_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => target_namespace.map(str::to_string),
                        "##local" => None,
                        other => Some(other.to_string()),
                    })
                    .collect();
                Self::Enumeration(namespaces)
            }
        }
    }

    pub fn allows(&self, namespace: Option<&str>) -> bool {
        let as_option = namespace.map(str::to_string);
        match self {
            Self::Any => true,
            Self::Not(excluded) => !excluded.contains(&as_option),
            Self::Enumeration(included) => included.contains(&as_option),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

impl ProcessContents {
    pub fn parse(attribute: Option<&str>) -> Self {
        match attribute {
            Some("lax") => Self::Lax,
            Some("skip") => Self::Skip,
            _ => Self::Strict,
        }
    }
}

/// A node of the content-model tree. Element terms reference their
/// declaration by canonical name; group terms stay references until the
/// automaton is compiled.
#[derive(Clone, Debug, PartialEq)]
pub enum Particle {
    Element {
        name: QName,
        occurs: Occurs,
    },
    Sequence {
        particles: Vec<Particle>,
        occurs: Occurs,
    },
    Choice {
        particles: Vec<Particle>,
        occurs: Occurs,
    },
    /// Permutation group; only ever the top of a content model, with
    /// `minOccurs` 0 or 1 and child cardinalities 0 or 1.
    All {
        particles: Vec<Particle>,
        min: u32,
    },
    Group {
        reference: QName,
        occurs: Occurs,
    },
    Any {
        namespace: NamespaceConstraint,
        process_contents: ProcessContents,
        occurs: Occurs,
    },
}

impl Particle {
    pub fn occurs(&self) -> Occurs {
        match self {
            Self::Element { occurs, .. }
            | Self::Sequence { occurs, .. }
            | Self::Choice { occurs, .. }
            | Self::Group { occurs, .. }
            | Self::Any { occurs, .. } => *occurs,
            Self::All { min, .. } => Occurs {
                min: *min,
                max: MaxOccurs::Bounded(1),
            },
        }
    }

    pub fn children(&self) -> &[Particle] {
        match self {
            Self::Sequence { particles, .. }
            | Self::Choice { particles, .. }
            | Self::All { particles, .. } => particles,
            _ => &[],
        }
    }

    /// Structural constraints: occurrence bounds are sane, `all` only at
    /// the top of a content model with 0/1 cardinalities throughout.
    pub fn check_structure(&self) -> Result<(), SchemaError> {
        self.check_inner(true)
    }

    fn check_inner(&self, top_level: bool) -> Result<(), SchemaError> {
        if !self.occurs().is_valid() {
            return Err(SchemaError::InvalidParticle(
                "minOccurs exceeds maxOccurs".into(),
            ));
        }
        if let Self::All { particles, min } = self {
            if !top_level {
                return Err(SchemaError::InvalidParticle(
                    "an all group may only appear at the top of a content model".into(),
                ));
            }
            if *min > 1 {
                return Err(SchemaError::InvalidParticle(
                    "an all group must have minOccurs 0 or 1".into(),
                ));
            }
            for child in particles {
                if !child.occurs().within_zero_or_one() {
                    return Err(SchemaError::InvalidParticle(
                        "children of an all group must have occurrence 0 or 1".into(),
                    ));
                }
            }
        }
        for child in self.children() {
            child.check_inner(false)?;
        }
        Ok(())
    }

    /// Every group reference in the tree, for deferred resolution.
    pub fn group_references<'a>(&'a self, into: &mut Vec<&'a QName>) {
        if let Self::Group { reference, .. } = self {
            into.push(reference);
        }
        for child in self.children() {
            child.group_references(into);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_parsing() {
        assert_eq!(Occurs::parse(None, None).unwrap(), Occurs::ONE);
        assert_eq!(
            Occurs::parse(Some("0"), Some("unbounded")).unwrap(),
            Occurs {
                min: 0,
                max: MaxOccurs::Unbounded
            }
        );
        assert!(Occurs::parse(Some("3"), Some("2")).is_err());
        assert!(Occurs::parse(Some("x"), None).is_err());
    }

    #[test]
    fn nested_all_is_rejected() {
        let nested = Particle::Sequence {
            particles: vec![Particle::All {
                particles: vec![],
                min: 1,
            }],
            occurs: Occurs::ONE,
        };
        assert!(nested.check_structure().is_err());

        let top = Particle::All {
            particles: vec![Particle::Element {
                name: QName::unqualified("a"),
                occurs: Occurs::OPTIONAL,
            }],
            min: 1,
        };
        assert!(top.check_structure().is_ok());
    }

    #[test]
    fn all_children_must_be_zero_or_one() {
        let bad = Particle::All {
            particles: vec![Particle::Element {
                name: QName::unqualified("a"),
                occurs: Occurs {
                    min: 0,
                    max: MaxOccurs::Unbounded,
                },
            }],
            min: 1,
        };
        assert!(bad.check_structure().is_err());
    }

    #[test]
    fn namespace_constraints() {
        let target = Some("http://example/ns");
        assert!(NamespaceConstraint::parse(None, target).allows(Some("anything")));

        let other = NamespaceConstraint::parse(Some("##other"), target);
        assert!(other.allows(Some("http://elsewhere")));
        assert!(!other.allows(target));
        assert!(!other.allows(None));

        let listed =
            NamespaceConstraint::parse(Some("##targetNamespace ##local http://x"), target);
        assert!(listed.allows(target));
        assert!(listed.allows(None));
        assert!(listed.allows(Some("http://x")));
        assert!(!listed.allows(Some("http://y")));
    }
}
