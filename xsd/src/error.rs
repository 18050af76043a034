use std::fmt;

use thiserror::Error;

use crate::xstypes::QName;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefKind {
    Type,
    Element,
    Attribute,
    Group,
    AttributeGroup,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "type",
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Group => "group",
            Self::AttributeGroup => "attribute group",
        })
    }
}

/// Faults raised while loading or resolving a schema. The handler collects
/// them and fails late; in lax mode they degrade to diagnostics.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("schema load error: {0}")]
    Load(String),

    #[error("unresolved {kind} reference {name}")]
    UnresolvedReference { kind: RefKind, name: QName },

    #[error("circular type derivation through {0}")]
    CircularDerivation(QName),

    #[error("duplicate definition of {0}")]
    DuplicateName(QName),

    #[error("invalid facet set: {0}")]
    InvalidFacets(String),

    #[error("invalid particle: {0}")]
    InvalidParticle(String),

    #[error("{0}")]
    Xml(String),
}

impl From<grove_xml::XmlError> for SchemaError {
    fn from(err: grove_xml::XmlError) -> Self {
        Self::Xml(err.to_string())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    UndeclaredElement,
    UndeclaredAttribute,
    RequiredAttributeMissing,
    ProhibitedAttribute,
    InvalidValue,
    ContentModel,
    UnresolvedType,
    InvalidNil,
    AbstractElement,
    FixedValueMismatch,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UndeclaredElement => "undeclared element",
            Self::UndeclaredAttribute => "undeclared attribute",
            Self::RequiredAttributeMissing => "required attribute missing",
            Self::ProhibitedAttribute => "prohibited attribute",
            Self::InvalidValue => "invalid value",
            Self::ContentModel => "content model violation",
            Self::UnresolvedType => "unresolved type",
            Self::InvalidNil => "invalid xsi:nil use",
            Self::AbstractElement => "abstract element in instance",
            Self::FixedValueMismatch => "fixed value mismatch",
        })
    }
}

/// One instance-validation fault. Validation errors never abort the parse;
/// they are collected so a caller sees every fault in one pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    /// Slash-separated element path with 1-based indices among same-named
    /// siblings, e.g. `/order/item[2]`.
    pub path: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}
