//! A composite grammar: the schema documents reached from one entry point
//! through `include`/`import`, resolved as a unit. Cross-schema group and
//! attribute-group references go through the [`ComponentResolver`] trait
//! the composite implements; deferred references drain once every document
//! is loaded. After [`CompositeGrammar::finish`] the grammar set is
//! immutable and the validator reads it without locking.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::attribute_decl::{AttributeDecl, AttributeGroup};
use crate::automaton::ParticleContext;
use crate::complex_type::{ComplexType, ContentKind, DerivationMethod};
use crate::element_decl::ElementDecl;
use crate::error::{RefKind, SchemaError};
use crate::facet::{apply_facets, Facet};
use crate::grammar::{SchemaGrammar, SchemaType};
use crate::handler::SchemaHandler;
use crate::particle::Particle;
use crate::simple_type::{SimpleType, Variety};
use crate::xstypes::QName;

/// Resolves cross-schema component references for a handler working inside
/// a composite grammar.
pub trait ComponentResolver {
    fn resolve_group(&self, name: &QName) -> Option<Particle>;
    fn resolve_attribute_group(&self, name: &QName) -> Option<AttributeGroup>;
}

/// Maps an `import`/`include` to a loadable file.
pub trait ImportResolver {
    fn resolve_location(&self, namespace: Option<&str>, location: Option<&str>)
        -> Option<PathBuf>;
}

/// Resolver that never finds anything; single-document loads use it.
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve_location(&self, _: Option<&str>, _: Option<&str>) -> Option<PathBuf> {
        None
    }
}

/// Resolves schema locations relative to the directory of the importing
/// document.
pub struct RelativeImports {
    base: PathBuf,
}

impl RelativeImports {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl ImportResolver for RelativeImports {
    fn resolve_location(
        &self,
        _namespace: Option<&str>,
        location: Option<&str>,
    ) -> Option<PathBuf> {
        let location = location?;
        let candidate = if Path::new(location).is_absolute() {
            PathBuf::from(location)
        } else {
            self.base.join(location)
        };
        candidate.exists().then_some(candidate)
    }
}

/// How a simple-value check can fail.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueFault {
    Invalid(String),
    UnresolvedType(QName),
}

#[derive(Debug, Default)]
pub struct CompositeGrammar {
    grammars: Vec<SchemaGrammar>,
    /// Promotes unresolved-reference diagnostics to load failures.
    pub validating: bool,
}

impl CompositeGrammar {
    pub fn from_grammar(grammar: SchemaGrammar, validating: bool) -> Self {
        Self {
            grammars: vec![grammar],
            validating,
        }
    }

    /// Parses a schema document held in memory. Imports are not followed.
    pub fn load_str(
        text: &str,
        validating: bool,
    ) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        let mut handler = SchemaHandler::new();
        let reader = grove_xml::Reader::from_str(text);
        grove_xml::Scanner::new(reader, &mut handler).parse()?;
        let (grammar, mut diagnostics) = handler.finish();
        let mut composite = Self::from_grammar(grammar, validating);
        diagnostics.extend(composite.finish());
        composite.conclude(diagnostics)
    }

    /// Loads a schema file and, transitively, everything it includes or
    /// imports. Already-visited files are skipped, so circular includes
    /// terminate.
    pub fn load_file(
        path: impl AsRef<Path>,
        validating: bool,
        imports: &dyn ImportResolver,
    ) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        Self::load_files(&[path.as_ref().to_path_buf()], validating, imports)
    }

    /// Loads several entry documents (one per `xsi:schemaLocation` pair)
    /// into a single composite.
    pub fn load_files(
        paths: &[PathBuf],
        validating: bool,
        imports: &dyn ImportResolver,
    ) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        let mut composite = Self {
            grammars: Vec::new(),
            validating,
        };
        let mut diagnostics = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: Vec<PathBuf> = paths.to_vec();

        while let Some(next) = queue.pop() {
            let canonical = next.canonicalize().unwrap_or_else(|_| next.clone());
            if !visited.insert(canonical) {
                continue;
            }
            debug!(schema = %next.display(), "loading schema document");

            let mut handler = SchemaHandler::new();
            let reader = grove_xml::Reader::open(&next)?;
            grove_xml::Scanner::new(reader, &mut handler).parse()?;
            let (grammar, errors) = handler.finish();
            diagnostics.extend(errors);

            let base = next.parent().unwrap_or(Path::new(".")).to_path_buf();
            let relative = RelativeImports::new(base);
            for import in &grammar.imports {
                let location = import.schema_location.as_deref();
                let resolved = imports
                    .resolve_location(import.namespace.as_deref(), location)
                    .or_else(|| relative.resolve_location(import.namespace.as_deref(), location));
                match resolved {
                    Some(target) => queue.push(target),
                    None => debug!(
                        namespace = import.namespace.as_deref().unwrap_or("<none>"),
                        "import left unresolved"
                    ),
                }
            }
            composite.grammars.push(grammar);
        }

        diagnostics.extend(composite.finish());
        composite.conclude(diagnostics)
    }

    fn conclude(
        self,
        diagnostics: Vec<SchemaError>,
    ) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        if self.validating {
            if let Some(first) = diagnostics.first() {
                return Err(first.clone());
            }
        } else {
            for diagnostic in &diagnostics {
                warn!(%diagnostic, "schema diagnostic");
            }
        }
        Ok((self, diagnostics))
    }

    pub fn grammars(&self) -> &[SchemaGrammar] {
        &self.grammars
    }

    // ---- lookup -----------------------------------------------------------

    pub fn type_by_name(&self, name: &QName) -> Option<&SchemaType> {
        self.grammars
            .iter()
            .find_map(|grammar| grammar.type_by_name(name))
    }

    pub fn complex_type(&self, name: &QName) -> Option<&ComplexType> {
        self.type_by_name(name).and_then(SchemaType::as_complex)
    }

    pub fn element(&self, name: &QName) -> Option<&ElementDecl> {
        self.grammars.iter().find_map(|grammar| grammar.element(name))
    }

    pub fn attribute(&self, name: &QName) -> Option<&AttributeDecl> {
        self.grammars
            .iter()
            .find_map(|grammar| grammar.attribute(name))
    }

    pub fn group(&self, name: &QName) -> Option<&Particle> {
        self.grammars.iter().find_map(|grammar| grammar.group(name))
    }

    pub fn attribute_group(&self, name: &QName) -> Option<&AttributeGroup> {
        self.grammars
            .iter()
            .find_map(|grammar| grammar.attribute_group(name))
    }

    /// The type governing an element declaration: its own reference, or the
    /// first one found along the substitution-group chain; absent means
    /// `xs:anyType`.
    pub fn element_type(&self, decl: &ElementDecl) -> Option<QName> {
        if decl.type_ref.is_some() {
            return decl.type_ref.clone();
        }
        let mut guard = HashSet::new();
        let mut head = decl.substitution_group.clone();
        while let Some(name) = head {
            if !guard.insert(name.clone()) {
                break;
            }
            match self.element(&name) {
                Some(head_decl) => {
                    if head_decl.type_ref.is_some() {
                        return head_decl.type_ref.clone();
                    }
                    head = head_decl.substitution_group.clone();
                }
                None => break,
            }
        }
        None
    }

    /// Whether a type name resolves anywhere: built-ins, any loaded
    /// grammar.
    pub fn type_resolves(&self, name: &QName) -> bool {
        name.is_builtin() || self.type_by_name(name).is_some()
    }

    /// Effective attribute uses of a complex type: its own declarations,
    /// its attribute groups (transitively) and its base chain. The most
    /// derived declaration of a name wins.
    pub fn attribute_uses(&self, type_name: &QName) -> (Vec<AttributeDecl>, bool) {
        let mut uses: Vec<AttributeDecl> = Vec::new();
        let mut wildcard = false;
        let mut seen_types = HashSet::new();
        let mut current = Some(type_name.clone());

        while let Some(name) = current {
            if !seen_types.insert(name.clone()) {
                break;
            }
            let Some(complex) = self.complex_type(&name) else {
                break;
            };
            wildcard |= complex.any_attribute;
            for decl in &complex.attributes {
                push_use(&mut uses, self.effective_attribute(decl));
            }
            let mut seen_groups = HashSet::new();
            for group in &complex.attribute_group_refs {
                self.collect_group_attributes(group, &mut uses, &mut wildcard, &mut seen_groups);
            }
            current = complex.derivation.as_ref().map(|(_, base)| base.clone());
        }
        (uses, wildcard)
    }

    fn collect_group_attributes(
        &self,
        name: &QName,
        uses: &mut Vec<AttributeDecl>,
        wildcard: &mut bool,
        seen: &mut HashSet<QName>,
    ) {
        if !seen.insert(name.clone()) {
            return;
        }
        let Some(group) = self.attribute_group(name) else {
            return;
        };
        *wildcard |= group.any_attribute;
        for decl in &group.attributes {
            push_use(uses, self.effective_attribute(decl));
        }
        for nested in &group.group_refs {
            self.collect_group_attributes(nested, uses, wildcard, seen);
        }
    }

    /// Completes an attribute use that references a top-level declaration:
    /// the use's own `use`/`default` settings override the referenced
    /// declaration's type and constraints.
    fn effective_attribute(&self, decl: &AttributeDecl) -> AttributeDecl {
        if decl.type_ref.is_some() {
            return decl.clone();
        }
        match self.attribute(&decl.name) {
            Some(global) => {
                let mut merged = decl.clone();
                merged.type_ref = global.type_ref.clone();
                if merged.value_constraint.is_none() {
                    merged.value_constraint = global.value_constraint.clone();
                }
                merged
            }
            None => decl.clone(),
        }
    }

    // ---- simple-type value validation -------------------------------------

    /// Validates a character value against a (simple or simple-content)
    /// type. Built-in checks run first and short-circuit; the facet lists
    /// along the restriction chain run afterwards.
    pub fn validate_value(&self, type_name: &QName, value: &str) -> Result<(), ValueFault> {
        let mut guard = HashSet::new();
        self.validate_value_guarded(type_name, value, &mut guard)
    }

    fn validate_value_guarded(
        &self,
        type_name: &QName,
        value: &str,
        guard: &mut HashSet<QName>,
    ) -> Result<(), ValueFault> {
        if !guard.insert(type_name.clone()) {
            return Ok(());
        }
        if type_name.is_builtin() {
            let builtin = grove_builtins::builtin(&type_name.local)
                .ok_or_else(|| ValueFault::UnresolvedType(type_name.clone()))?;
            return builtin
                .validate(value)
                .map_err(|error| ValueFault::Invalid(error.to_string()));
        }
        match self.type_by_name(type_name) {
            Some(SchemaType::Simple(simple)) => self.validate_simple(simple, value, guard),
            Some(SchemaType::Complex(complex)) => match &complex.simple_content_type {
                Some(content) => self.validate_value_guarded(content, value, guard),
                None => Ok(()),
            },
            None => Err(ValueFault::UnresolvedType(type_name.clone())),
        }
    }

    fn validate_simple(
        &self,
        simple: &SimpleType,
        value: &str,
        guard: &mut HashSet<QName>,
    ) -> Result<(), ValueFault> {
        match simple.variety {
            Variety::Atomic => self.validate_atomic(simple, value, guard),
            Variety::List => {
                let collapsed =
                    grove_builtins::normalized_value(value, grove_builtins::WhiteSpace::Collapse);
                let items: Vec<&str> = collapsed.split(' ').filter(|i| !i.is_empty()).collect();
                if let Some(item_type) = &simple.item_type {
                    for item in &items {
                        self.validate_value_guarded(item_type, item, &mut guard.clone())?;
                    }
                }
                // Length facets of a list count items, not characters.
                apply_facets(&simple.facets, &collapsed, items.len() as u64, None)
                    .map_err(ValueFault::Invalid)
            }
            Variety::Union => {
                for member in &simple.member_types {
                    if self
                        .validate_value_guarded(member, value, &mut guard.clone())
                        .is_ok()
                    {
                        return Ok(());
                    }
                }
                Err(ValueFault::Invalid(format!(
                    "value {value:?} matches no member of the union"
                )))
            }
        }
    }

    fn validate_atomic(
        &self,
        simple: &SimpleType,
        value: &str,
        guard: &mut HashSet<QName>,
    ) -> Result<(), ValueFault> {
        // Walk to the builtin ancestor, gathering facet lists on the way
        // (most derived first).
        let mut facet_lists: Vec<&[Facet]> = vec![&simple.facets];
        let mut declared_ws = simple.declared_white_space();
        let mut base = simple.base.clone();
        let builtin = loop {
            let Some(name) = base else {
                break None;
            };
            if name.is_builtin() {
                break grove_builtins::builtin(&name.local);
            }
            match self.type_by_name(&name) {
                Some(SchemaType::Simple(ancestor)) if ancestor.variety == Variety::Atomic => {
                    facet_lists.push(&ancestor.facets);
                    if declared_ws.is_none() {
                        declared_ws = ancestor.declared_white_space();
                    }
                    base = ancestor.base.clone();
                }
                Some(SchemaType::Simple(ancestor)) => {
                    // Restriction of a list or union: check the ancestor's
                    // own rules first, then this type's facets.
                    self.validate_simple(ancestor, value, guard)?;
                    break None;
                }
                Some(SchemaType::Complex(_)) => break None,
                None => return Err(ValueFault::UnresolvedType(name)),
            }
        };

        let white_space = declared_ws
            .or_else(|| builtin.map(|b| b.white_space))
            .unwrap_or(grove_builtins::WhiteSpace::Collapse);
        let normalized = grove_builtins::normalized_value(value, white_space);

        let primitive = builtin.map(|b| b.primitive());
        if let Some(builtin) = builtin {
            builtin
                .validate_literal(&normalized)
                .map_err(|error| ValueFault::Invalid(error.to_string()))?;
        }

        let length = normalized.chars().count() as u64;
        for facets in facet_lists.iter().rev() {
            apply_facets(facets, &normalized, length, primitive).map_err(ValueFault::Invalid)?;
        }
        Ok(())
    }

    // ---- post-load resolution ---------------------------------------------

    /// Runs the end-of-load passes over the complete grammar set: the
    /// derivation-cycle check, extension content-model merging, the drain
    /// of deferred group/attribute-group queues, and the reference-
    /// resolution sweep. Returns every diagnostic found; in lax mode,
    /// element declarations with unresolvable types are dropped.
    pub fn finish(&mut self) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();

        let cyclic = self.find_derivation_cycles(&mut diagnostics);
        self.merge_extensions(&cyclic);
        self.drain_deferred(&mut diagnostics);
        self.check_references(&mut diagnostics);

        if !self.validating {
            self.drop_broken_elements(&diagnostics);
        }
        diagnostics
    }

    /// Depth-first walk over base-type edges; a back edge is a derivation
    /// cycle.
    fn find_derivation_cycles(&self, diagnostics: &mut Vec<SchemaError>) -> HashSet<QName> {
        let mut edges: HashMap<QName, QName> = HashMap::new();
        for grammar in &self.grammars {
            for (name, type_) in grammar.types() {
                if let Some(base) = type_.base_name() {
                    edges.insert(name.clone(), base.clone());
                }
            }
        }

        let mut cyclic = HashSet::new();
        let mut settled: HashSet<QName> = HashSet::new();
        for start in edges.keys() {
            if settled.contains(start) {
                continue;
            }
            let mut trail = Vec::new();
            let mut current = start.clone();
            loop {
                if let Some(position) = trail.iter().position(|seen: &QName| *seen == current) {
                    for name in &trail[position..] {
                        if cyclic.insert((*name).clone()) {
                            diagnostics.push(SchemaError::CircularDerivation((*name).clone()));
                        }
                    }
                    break;
                }
                if settled.contains(&current) || cyclic.contains(&current) {
                    break;
                }
                trail.push(current.clone());
                match edges.get(&current) {
                    Some(base) => current = base.clone(),
                    None => break,
                }
            }
            settled.extend(trail);
        }
        cyclic
    }

    /// Replaces each extension's content model with the base's particles
    /// followed by its own. Bases merge before their extensions; cyclic
    /// types are skipped.
    fn merge_extensions(&mut self, cyclic: &HashSet<QName>) {
        let mut pending: Vec<QName> = Vec::new();
        for grammar in &self.grammars {
            for (name, type_) in grammar.types() {
                if let SchemaType::Complex(complex) = type_ {
                    if matches!(complex.derivation, Some((DerivationMethod::Extension, _)))
                        && !cyclic.contains(name)
                    {
                        pending.push(name.clone());
                    }
                }
            }
        }

        let mut pending_set: HashSet<QName> = pending.iter().cloned().collect();
        let mut progressed = true;
        while progressed && !pending.is_empty() {
            progressed = false;
            let mut waiting = Vec::new();
            for name in pending {
                let base_name = self
                    .complex_type(&name)
                    .and_then(|c| c.derivation.as_ref())
                    .map(|(_, base)| base.clone());
                let Some(base_name) = base_name else {
                    pending_set.remove(&name);
                    progressed = true;
                    continue;
                };
                if pending_set.contains(&base_name) {
                    waiting.push(name);
                    continue;
                }

                match self.complex_type(&base_name).cloned() {
                    Some(base) => {
                        if let Some(derived) = self.complex_type_mut(&name) {
                            derived.merge_extension_base(&base);
                        }
                    }
                    None => {
                        // Extending a simple or built-in base yields simple
                        // content.
                        if let Some(derived) = self.complex_type_mut(&name) {
                            if derived.content_kind() == ContentKind::Empty
                                && derived.simple_content_type.is_none()
                            {
                                derived.set_simple_content(base_name);
                            }
                        }
                    }
                }
                pending_set.remove(&name);
                progressed = true;
            }
            pending = waiting;
        }
    }

    fn complex_type_mut(&mut self, name: &QName) -> Option<&mut ComplexType> {
        for grammar in &mut self.grammars {
            if let Some(SchemaType::Complex(complex)) = grammar.type_by_name_mut(name) {
                return Some(complex);
            }
        }
        None
    }

    fn drain_deferred(&self, diagnostics: &mut Vec<SchemaError>) {
        for grammar in &self.grammars {
            for name in grammar.deferred_group_refs() {
                if self.resolve_group(name).is_none() {
                    diagnostics.push(SchemaError::UnresolvedReference {
                        kind: RefKind::Group,
                        name: name.clone(),
                    });
                }
            }
            for name in grammar.deferred_attribute_group_refs() {
                if self.resolve_attribute_group(name).is_none() {
                    diagnostics.push(SchemaError::UnresolvedReference {
                        kind: RefKind::AttributeGroup,
                        name: name.clone(),
                    });
                }
            }
        }
    }

    /// Every non-built-in name handle must resolve somewhere in the
    /// composite after load completes.
    fn check_references(&self, diagnostics: &mut Vec<SchemaError>) {
        let mut reported = HashSet::new();
        for grammar in &self.grammars {
            for (kind, name) in grammar.referenced_names() {
                let resolves = match kind {
                    RefKind::Type => self.type_resolves(&name),
                    RefKind::Element => self.element(&name).is_some(),
                    RefKind::Attribute => self.attribute(&name).is_some(),
                    RefKind::Group => self.group(&name).is_some(),
                    RefKind::AttributeGroup => self.attribute_group(&name).is_some(),
                };
                if !resolves && reported.insert((kind, name.clone())) {
                    diagnostics.push(SchemaError::UnresolvedReference { kind, name });
                }
            }
        }
    }

    /// Lax-mode degradation: an element declaration whose type never
    /// resolved is dropped with a warning instead of failing the load.
    fn drop_broken_elements(&mut self, diagnostics: &[SchemaError]) {
        let broken_types: HashSet<&QName> = diagnostics
            .iter()
            .filter_map(|diagnostic| match diagnostic {
                SchemaError::UnresolvedReference {
                    kind: RefKind::Type,
                    name,
                } => Some(name),
                _ => None,
            })
            .collect();
        if broken_types.is_empty() {
            return;
        }

        for grammar in &mut self.grammars {
            let doomed: Vec<QName> = grammar
                .elements()
                .filter(|(_, decl)| {
                    decl.type_ref
                        .as_ref()
                        .is_some_and(|type_ref| broken_types.contains(type_ref))
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in doomed {
                warn!(element = %name, "dropping element declaration with unresolved type");
                grammar.remove_element(&name);
            }
        }
    }
}

impl ComponentResolver for CompositeGrammar {
    fn resolve_group(&self, name: &QName) -> Option<Particle> {
        self.group(name).cloned()
    }

    fn resolve_attribute_group(&self, name: &QName) -> Option<AttributeGroup> {
        self.attribute_group(name).cloned()
    }
}

impl ParticleContext for CompositeGrammar {
    fn group(&self, name: &QName) -> Option<&Particle> {
        CompositeGrammar::group(self, name)
    }

    /// A candidate element substitutes for a head when its
    /// substitution-group chain reaches the head's declaration.
    fn substitutes(&self, candidate: &QName, head: &QName) -> bool {
        if candidate == head {
            return true;
        }
        let mut guard = HashSet::new();
        let mut current = self
            .element(candidate)
            .and_then(|decl| decl.substitution_group.clone());
        while let Some(name) = current {
            if name == *head {
                return true;
            }
            if !guard.insert(name.clone()) {
                return false;
            }
            current = self
                .element(&name)
                .and_then(|decl| decl.substitution_group.clone());
        }
        false
    }
}

fn push_use(uses: &mut Vec<AttributeDecl>, decl: AttributeDecl) {
    if !uses.iter().any(|existing| existing.name == decl.name) {
        uses.push(decl);
    }
}
