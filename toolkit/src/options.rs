//! Parser configuration.

use std::sync::Arc;

use grove_catalog::Catalog;
use grove_xml::DtdGrammar;
use grove_xsd::CompositeGrammar;

/// A grammar produced outside the parse, keyed by the resolved URI of the
/// external identifier that requested it.
pub enum LoadedGrammar {
    Schema(Arc<CompositeGrammar>),
    Dtd(DtdGrammar),
}

/// Callback invoked when the document declares a DTD or schema. It
/// receives the catalog-resolved URI and may hand back a pre-compiled
/// grammar; `None` falls through to the built-in loaders.
pub trait GrammarHandler {
    fn grammar_for(&self, uri: &str) -> Option<LoadedGrammar>;
}

/// Options consumed by [`crate::parse_file`] / [`crate::parse_str`].
pub struct ParseOptions {
    /// Run the structural validator and promote unresolved-reference
    /// warnings during grammar load to errors.
    pub validating: bool,
    /// Inject grammar-declared attribute defaults into the event stream
    /// (and thus the tree) with `specified=false`.
    pub include_default_attributes: bool,
    /// Catalog used to resolve external identifiers and schema locations.
    pub catalog: Option<Catalog>,
    pub grammar_handler: Option<Box<dyn GrammarHandler>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self {
            validating: false,
            include_default_attributes: true,
            catalog: None,
            grammar_handler: None,
        }
    }

    pub fn validating(mut self, validating: bool) -> Self {
        self.validating = validating;
        self
    }

    pub fn include_default_attributes(mut self, include: bool) -> Self {
        self.include_default_attributes = include;
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_grammar_handler(mut self, handler: Box<dyn GrammarHandler>) -> Self {
        self.grammar_handler = Some(handler);
        self
    }
}
