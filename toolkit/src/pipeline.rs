//! The configured parse: bytes → scanner → (validating filter) → tree.
//!
//! Grammar wiring happens while events flow. A DOCTYPE's external
//! identifier is resolved through the catalog and handed to the grammar
//! handler (or read as an external DTD subset); the root element's
//! `xsi:schemaLocation` pairs select the schema grammar, which then
//! validates the remaining event stream while the tree is built.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use grove_catalog::{Catalog, CatalogError};
use grove_xml::name::XSI_NAMESPACE;
use grove_xml::sax::{ContentHandler, SaxAttribute};
use grove_xml::scanner::DtdResolver;
use grove_xml::{Document, DtdGrammar, Reader, Scanner, TreeBuilder, XmlError};
use grove_xsd::composite::ImportResolver;
use grove_xsd::{CompositeGrammar, SchemaError, SchemaValidatingFilter, ValidationError};

use crate::options::{GrammarHandler, LoadedGrammar, ParseOptions};

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Outcome of a successful parse: the first fatal fault would have been
/// returned as an error; non-fatal validation faults are listed here.
pub struct ParseReport {
    pub document: Document,
    pub validation_errors: Vec<ValidationError>,
}

pub fn parse_str(text: &str, options: &ParseOptions) -> Result<ParseReport, ToolkitError> {
    run(Reader::from_str(text), PathBuf::from("."), options)
}

pub fn parse_file(
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> Result<ParseReport, ToolkitError> {
    let path = path.as_ref();
    let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    run(Reader::open(path)?, base_dir, options)
}

fn run(
    reader: Reader,
    base_dir: PathBuf,
    options: &ParseOptions,
) -> Result<ParseReport, ToolkitError> {
    let dtd_resolver = PipelineDtdResolver { options, base_dir: base_dir.clone() };
    let mut sink = PipelineSink {
        options,
        base_dir,
        sink: Sink::Direct(TreeBuilder::new()),
        root_seen: false,
        fail: None,
    };

    let outcome = {
        let mut scanner = Scanner::new(reader, &mut sink)
            .with_dtd_resolver(&dtd_resolver)
            .include_default_attributes(options.include_default_attributes);
        scanner.parse()
    };
    if let Some(fail) = sink.fail.take() {
        return Err(fail);
    }
    outcome?;

    let (builder, validation_errors) = match sink.sink {
        Sink::Direct(builder) => (builder, Vec::new()),
        Sink::Validating(filter) => filter.into_parts(),
    };
    Ok(ParseReport {
        document: builder.into_document()?,
        validation_errors,
    })
}

/// Resolves a DOCTYPE's external identifier through the catalog and the
/// grammar handler; falls back to parsing the resolved file as an external
/// DTD subset.
struct PipelineDtdResolver<'o> {
    options: &'o ParseOptions,
    base_dir: PathBuf,
}

impl DtdResolver for PipelineDtdResolver<'_> {
    fn resolve_dtd(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Option<DtdGrammar> {
        let resolved = self
            .options
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.resolve_entity(public_id, system_id))
            .or_else(|| {
                let system = system_id?;
                let candidate = if Path::new(system).is_absolute() {
                    PathBuf::from(system)
                } else {
                    self.base_dir.join(system)
                };
                candidate
                    .exists()
                    .then(|| candidate.to_string_lossy().into_owned())
            })?;

        if let Some(handler) = &self.options.grammar_handler {
            match handler.grammar_for(&resolved) {
                Some(LoadedGrammar::Dtd(grammar)) => return Some(grammar),
                Some(LoadedGrammar::Schema(_)) | None => {}
            }
        }

        let text = std::fs::read_to_string(&resolved).ok()?;
        match DtdGrammar::parse_internal_subset(&text) {
            Ok(grammar) => Some(grammar),
            Err(error) => {
                debug!(uri = %resolved, %error, "external DTD subset did not parse");
                None
            }
        }
    }
}

/// Resolves `include`/`import` schema locations through the catalog.
struct CatalogImports<'c> {
    catalog: Option<&'c Catalog>,
}

impl ImportResolver for CatalogImports<'_> {
    fn resolve_location(
        &self,
        _namespace: Option<&str>,
        location: Option<&str>,
    ) -> Option<PathBuf> {
        let location = location?;
        let resolved = self.catalog?.match_uri(location)?;
        let path = PathBuf::from(resolved);
        path.exists().then_some(path)
    }
}

enum Sink {
    Direct(TreeBuilder),
    Validating(Box<SchemaValidatingFilter<TreeBuilder>>),
}

macro_rules! forward_to_sink {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match &mut $self.sink {
            Sink::Direct(builder) => builder.$method($($arg),*),
            Sink::Validating(filter) => filter.$method($($arg),*),
        }
    };
}

struct PipelineSink<'o> {
    options: &'o ParseOptions,
    base_dir: PathBuf,
    sink: Sink,
    root_seen: bool,
    fail: Option<ToolkitError>,
}

impl PipelineSink<'_> {
    /// Schema locations declared on the root element, resolved to local
    /// paths: `xsi:schemaLocation` namespace/location pairs plus
    /// `xsi:noNamespaceSchemaLocation`.
    fn schema_paths(&self, attributes: &[SaxAttribute]) -> Vec<PathBuf> {
        let xsi_prefixes: Vec<&str> = attributes
            .iter()
            .filter(|a| a.value == XSI_NAMESPACE)
            .filter_map(|a| a.name.strip_prefix("xmlns:"))
            .collect();

        let mut locations = Vec::new();
        for attribute in attributes {
            let Some((prefix, local)) = attribute.name.split_once(':') else {
                continue;
            };
            if !xsi_prefixes.contains(&prefix) {
                continue;
            }
            match local {
                "schemaLocation" => {
                    // Pairs of namespace and location; only the locations
                    // matter for resolution.
                    let tokens: Vec<&str> = attribute.value.split_ascii_whitespace().collect();
                    for pair in tokens.chunks(2) {
                        if let [_, location] = pair {
                            locations.push(location.to_string());
                        }
                    }
                }
                "noNamespaceSchemaLocation" => locations.push(attribute.value.clone()),
                _ => {}
            }
        }

        locations
            .into_iter()
            .filter_map(|location| self.resolve_location(&location))
            .collect()
    }

    fn resolve_location(&self, location: &str) -> Option<PathBuf> {
        if let Some(resolved) = self
            .options
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.match_uri(location))
        {
            let path = PathBuf::from(resolved);
            if path.exists() {
                return Some(path);
            }
        }
        let candidate = if Path::new(location).is_absolute() {
            PathBuf::from(location)
        } else {
            self.base_dir.join(location)
        };
        candidate.exists().then_some(candidate)
    }

    /// Loads (or receives from the grammar handler) the schema grammar the
    /// root element points at.
    fn schema_grammar(
        &mut self,
        attributes: &[SaxAttribute],
    ) -> Result<Option<Arc<CompositeGrammar>>, SchemaError> {
        let paths = self.schema_paths(attributes);
        if paths.is_empty() {
            return Ok(None);
        }

        if let Some(handler) = &self.options.grammar_handler {
            for path in &paths {
                let uri = path.to_string_lossy();
                if let Some(LoadedGrammar::Schema(grammar)) = handler.grammar_for(&uri) {
                    debug!(%uri, "grammar handler supplied a compiled schema");
                    return Ok(Some(grammar));
                }
            }
        }

        let imports = CatalogImports {
            catalog: self.options.catalog.as_ref(),
        };
        let (grammar, _) = CompositeGrammar::load_files(&paths, true, &imports)?;
        Ok(Some(Arc::new(grammar)))
    }
}

impl ContentHandler for PipelineSink<'_> {
    fn start_document(&mut self) -> Result<(), XmlError> {
        forward_to_sink!(self, start_document)
    }

    fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), XmlError> {
        forward_to_sink!(self, xml_declaration, version, encoding, standalone)
    }

    fn start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        forward_to_sink!(self, start_dtd, name, public_id, system_id)
    }

    fn internal_subset(&mut self, text: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, internal_subset, text)
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        forward_to_sink!(self, end_dtd)
    }

    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        if !self.root_seen {
            self.root_seen = true;
            if self.options.validating {
                match self.schema_grammar(attributes) {
                    Ok(Some(grammar)) => {
                        let current =
                            std::mem::replace(&mut self.sink, Sink::Direct(TreeBuilder::new()));
                        if let Sink::Direct(builder) = current {
                            self.sink = Sink::Validating(Box::new(
                                SchemaValidatingFilter::new(grammar, builder)
                                    .include_default_attributes(
                                        self.options.include_default_attributes,
                                    ),
                            ));
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        // Strict mode: a broken grammar fails the parse.
                        self.fail = Some(ToolkitError::Schema(error));
                        return Err(XmlError::Aborted("schema grammar failed to load".into()));
                    }
                }
            }
        }
        forward_to_sink!(self, start_element, name, attributes)
    }

    fn end_element(&mut self, name: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, end_element, name)
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, characters, text)
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, ignorable_whitespace, text)
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, comment, text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, processing_instruction, target, data)
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        forward_to_sink!(self, start_cdata)
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        forward_to_sink!(self, end_cdata)
    }

    fn skipped_entity(&mut self, name: &str) -> Result<(), XmlError> {
        forward_to_sink!(self, skipped_entity, name)
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        forward_to_sink!(self, end_document)
    }
}
