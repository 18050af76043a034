//! OASIS XML Catalog support: loading catalog documents into the four
//! identifier maps plus the two ordered rewrite lists, and the lookup
//! algorithm over them.
//!
//! Catalog documents are parsed with the crate's own scanner and DOM
//! builder. A loaded catalog is immutable. Absent lookup results are not
//! errors: `None` means "unresolved, caller decides". Malformed catalog
//! structure is a hard error, and a failed load discards the partial
//! catalog.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use grove_xml::{Element, XmlError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{path}: root element {root:?} is not an XML catalog")]
    NotACatalog { path: PathBuf, root: String },

    #[error("{path}: <{element}> is missing required attribute {attribute:?}")]
    MissingAttribute {
        path: PathBuf,
        element: String,
        attribute: String,
    },

    #[error("{path}: catalog has no root element")]
    Empty { path: PathBuf },

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Identifier maps of one logical catalog, `nextCatalog` links already
/// folded in (first-loaded entry wins).
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    public_catalog: HashMap<String, String>,
    system_catalog: HashMap<String, String>,
    uri_catalog: HashMap<String, String>,
    /// Basename fallback for DTD-ish resources (`.dtd`, `.ent`, `.mod`).
    dtd_catalog: HashMap<String, String>,
    system_rewrites: Vec<(String, String)>,
    uri_rewrites: Vec<(String, String)>,
    /// Working directory of the first catalog file; the fallback base for
    /// relative URIs.
    base_dir: PathBuf,
}

impl Catalog {
    /// Loads a catalog document and, eagerly, every catalog it links to.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let mut catalog = Catalog {
            base_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            ..Catalog::default()
        };
        let mut visited = HashSet::new();
        catalog.load_into(path, &mut visited)?;
        Ok(catalog)
    }

    fn load_into(&mut self, path: &Path, visited: &mut HashSet<PathBuf>) -> Result<(), CatalogError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !visited.insert(canonical) {
            // Already loaded; `nextCatalog` cycles end here.
            return Ok(());
        }

        let document = grove_xml::parse_file(path)?;
        let root = document.root().ok_or_else(|| CatalogError::Empty {
            path: path.to_path_buf(),
        })?;
        if root.local_name() != "catalog" {
            return Err(CatalogError::NotACatalog {
                path: path.to_path_buf(),
                root: root.name().to_string(),
            });
        }

        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        self.walk(root, &base, path, visited)
    }

    /// Depth-first walk over the catalog tree. An `xml:base` attribute
    /// changes the base URI for its subtree; the previous base is restored
    /// on backtrack by scoping.
    fn walk(
        &mut self,
        element: &Element,
        base: &Path,
        path: &Path,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<(), CatalogError> {
        for child in element.child_elements() {
            let base = match child.attribute_value("xml:base") {
                Some(value) => resolve_path(value, base),
                None => base.to_path_buf(),
            };

            let require = |attribute: &str| -> Result<&str, CatalogError> {
                child
                    .attribute_value(attribute)
                    .ok_or_else(|| CatalogError::MissingAttribute {
                        path: path.to_path_buf(),
                        element: child.local_name().to_string(),
                        attribute: attribute.to_string(),
                    })
            };

            match child.local_name() {
                "public" => {
                    let public_id = unwrap_urn_publicid(require("publicId")?);
                    let uri = self.make_absolute(require("uri")?, &base);
                    if Path::new(&uri).exists() {
                        if !self.public_catalog.contains_key(&public_id) {
                            self.public_catalog.insert(public_id, uri.clone());
                        }
                        self.insert_dtd_entry(&uri, &["dtd", "ent", "mod"]);
                    }
                }
                "system" => {
                    let system_id = require("systemId")?.to_string();
                    let uri = self.make_absolute(require("uri")?, &base);
                    if Path::new(&uri).exists() {
                        if !self.system_catalog.contains_key(&system_id) {
                            self.system_catalog.insert(system_id, uri.clone());
                        }
                        self.insert_dtd_entry(&uri, &["dtd"]);
                    }
                }
                "uri" => {
                    let name = require("name")?.to_string();
                    let uri = self.make_absolute(require("uri")?, &base);
                    if Path::new(&uri).exists() {
                        if !self.uri_catalog.contains_key(&name) {
                            self.uri_catalog.insert(name, uri.clone());
                        }
                        self.insert_dtd_entry(&uri, &["dtd", "ent", "mod"]);
                    }
                }
                "rewriteSystem" => {
                    let prefix = require("systemIdStartString")?.to_string();
                    let replacement = require("rewritePrefix")?.to_string();
                    if !self.system_rewrites.iter().any(|(p, _)| *p == prefix) {
                        self.system_rewrites.push((prefix, replacement));
                    }
                }
                "rewriteURI" => {
                    let prefix = require("uriStartString")?.to_string();
                    let replacement = require("rewritePrefix")?.to_string();
                    if !self.uri_rewrites.iter().any(|(p, _)| *p == prefix) {
                        self.uri_rewrites.push((prefix, replacement));
                    }
                }
                "nextCatalog" => {
                    let target = self.make_absolute(require("catalog")?, &base);
                    self.load_into(Path::new(&target), visited)?;
                }
                // Wrapper elements (e.g. <group>) only contribute their
                // subtree and possibly an xml:base.
                _ => {}
            }

            self.walk(child, &base, path, visited)?;
        }
        Ok(())
    }

    fn insert_dtd_entry(&mut self, uri: &str, extensions: &[&str]) {
        let path = Path::new(uri);
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !matches {
            return;
        }
        if let Some(basename) = path.file_name().and_then(|n| n.to_str()) {
            if !self.dtd_catalog.contains_key(basename) {
                self.dtd_catalog.insert(basename.to_string(), uri.to_string());
            }
        }
    }

    /// Absolute inputs come back unchanged; relative ones resolve against
    /// the active base, falling back to the catalog's working directory.
    pub fn make_absolute(&self, uri: &str, base: &Path) -> String {
        if is_absolute_uri(uri) {
            return uri.to_string();
        }
        let base = if base.as_os_str().is_empty() {
            &self.base_dir
        } else {
            base
        };
        base.join(uri).to_string_lossy().into_owned()
    }

    /// Resolves an external identifier: the public identifier is tried
    /// first, the system identifier is the fallback.
    pub fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Option<String> {
        public_id
            .and_then(|pid| self.match_public(pid))
            .or_else(|| system_id.and_then(|sid| self.match_system(sid)))
    }

    pub fn match_public(&self, public_id: &str) -> Option<String> {
        let unwrapped = unwrap_urn_publicid(public_id);
        self.public_catalog.get(&unwrapped).cloned()
    }

    pub fn match_system(&self, system_id: &str) -> Option<String> {
        for (prefix, replacement) in &self.system_rewrites {
            if let Some(rest) = system_id.strip_prefix(prefix.as_str()) {
                return Some(format!("{replacement}{rest}"));
            }
        }
        if let Some(uri) = self.system_catalog.get(system_id) {
            return Some(uri.clone());
        }
        let basename = system_id.rsplit(['/', '\\']).next()?;
        self.dtd_catalog.get(basename).cloned()
    }

    pub fn match_uri(&self, uri: &str) -> Option<String> {
        for (prefix, replacement) in &self.uri_rewrites {
            if let Some(rest) = uri.strip_prefix(prefix.as_str()) {
                return Some(format!("{replacement}{rest}"));
            }
        }
        self.uri_catalog.get(uri).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.public_catalog.is_empty()
            && self.system_catalog.is_empty()
            && self.uri_catalog.is_empty()
            && self.dtd_catalog.is_empty()
            && self.system_rewrites.is_empty()
            && self.uri_rewrites.is_empty()
    }
}

fn is_absolute_uri(uri: &str) -> bool {
    if uri.starts_with('/') {
        return true;
    }
    // A scheme ("http:", "urn:", single-letter Windows drives excluded).
    match uri.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

fn resolve_path(value: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Unwraps a `urn:publicid:` form into the public identifier it denotes
/// (RFC 3151): `+` becomes space, `:` becomes `//`, `;` becomes `::`, and
/// the reserved percent-escapes are decoded.
pub fn unwrap_urn_publicid(public_id: &str) -> String {
    let Some(urn) = public_id.strip_prefix("urn:publicid:") else {
        return public_id.to_string();
    };
    let mut out = String::with_capacity(urn.len());
    let mut chars = urn.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            ':' => out.push_str("//"),
            ';' => out.push_str("::"),
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                match hex.as_str() {
                    "2B" | "2b" => out.push('+'),
                    "3A" | "3a" => out.push(':'),
                    "2F" | "2f" => out.push('/'),
                    "3B" | "3b" => out.push(';'),
                    "27" => out.push('\''),
                    "3F" | "3f" => out.push('?'),
                    "23" => out.push('#'),
                    "25" => out.push('%'),
                    other => {
                        out.push('%');
                        out.push_str(other);
                    }
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urn_publicid_unwrapping() {
        assert_eq!(
            unwrap_urn_publicid("urn:publicid:-:OASIS:DTD+XML+Catalogs+V1.0:EN"),
            "-//OASIS//DTD XML Catalogs V1.0//EN"
        );
        assert_eq!(unwrap_urn_publicid("-//X//DTD"), "-//X//DTD");
        assert_eq!(unwrap_urn_publicid("urn:publicid:a%2Fb%25c"), "a/b%c");
    }

    #[test]
    fn absolute_uri_detection() {
        assert!(is_absolute_uri("/t/x.dtd"));
        assert!(is_absolute_uri("http://example/x.dtd"));
        assert!(is_absolute_uri("urn:publicid:x"));
        assert!(!is_absolute_uri("x.dtd"));
        assert!(!is_absolute_uri("sub/x.dtd"));
    }
}
