//! The toolkit facade: one entry point that wires the byte reader, the
//! scanner, catalog-driven grammar resolution, the structural validator
//! and the DOM builder into a single configured parse.

mod options;
mod pipeline;

pub use options::{GrammarHandler, LoadedGrammar, ParseOptions};
pub use pipeline::{parse_file, parse_str, ParseReport, ToolkitError};

pub use grove_catalog::{Catalog, CatalogError};
pub use grove_xml::{
    canonicalize, canonicalize_to_bytes, Document, Element, IndentStyle, XmlError, XmlNode,
    XmlWriter,
};
pub use grove_xsd::{
    CompositeGrammar, SchemaError, ValidationError, ValidationErrorKind,
};
