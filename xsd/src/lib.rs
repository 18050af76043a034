//! W3C XML Schema 1.0 support: the grammar component model, an
//! event-driven schema-document parser, and a structural validator that
//! runs against live scanner events.
//!
//! Names are canonical `(namespace, local)` pairs throughout; components
//! reference each other by name through the owning grammar. A grammar is
//! mutable only while its schema document is being traversed and frozen
//! once the composite's load finishes.

pub mod attribute_decl;
pub mod automaton;
pub mod complex_type;
pub mod composite;
pub mod element_decl;
pub mod error;
pub mod facet;
pub mod grammar;
pub mod handler;
pub mod particle;
pub mod simple_type;
pub mod validator;
pub mod xstypes;

pub use attribute_decl::{AttributeDecl, AttributeGroup, AttributeUse, Form, ValueConstraint};
pub use complex_type::{ComplexType, ContentKind, DerivationMethod};
pub use composite::{
    ComponentResolver, CompositeGrammar, ImportResolver, NoImports, RelativeImports, ValueFault,
};
pub use element_decl::{ElementDecl, NotationDecl};
pub use error::{RefKind, SchemaError, ValidationError, ValidationErrorKind};
pub use facet::Facet;
pub use grammar::{Import, SchemaGrammar, SchemaType};
pub use handler::SchemaHandler;
pub use particle::{MaxOccurs, NamespaceConstraint, Occurs, Particle, ProcessContents};
pub use simple_type::{SimpleType, Variety};
pub use validator::SchemaValidatingFilter;
pub use xstypes::QName;

use std::path::Path;

/// Loads a single in-memory schema document into a composite grammar.
/// Diagnostics are fatal in validating mode and warnings otherwise.
pub fn load_schema_str(
    text: &str,
    validating: bool,
) -> Result<(CompositeGrammar, Vec<SchemaError>), SchemaError> {
    CompositeGrammar::load_str(text, validating)
}

/// Loads a schema file and everything it includes or imports, resolving
/// schema locations relative to the importing document.
pub fn load_schema_file(
    path: impl AsRef<Path>,
    validating: bool,
) -> Result<(CompositeGrammar, Vec<SchemaError>), SchemaError> {
    CompositeGrammar::load_file(path, validating, &NoImports)
}
