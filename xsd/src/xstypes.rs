//! Shared schema value types: canonical qualified names and the sequence /
//! set aliases used by the component model.

use std::fmt;

use lazy_static::lazy_static;

pub use grove_xml::name::{XS_NAMESPACE, XSI_NAMESPACE};

pub type NCName = String;
pub type AnyUri = String;
pub type Sequence<T> = Vec<T>;
pub type Set<T> = Vec<T>;

/// Canonical `(namespace name, local name)` pair. Every author-written form
/// (`local`, `prefix:local`, `{ns}local`) collapses to this at ingress;
/// Clark notation is its display form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<impl Into<String>>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(Into::into),
            local: local.into(),
        }
    }

    pub fn with_namespace(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self::new(Some(namespace), local)
    }

    pub fn unqualified(local: impl Into<String>) -> Self {
        Self::new(None::<String>, local)
    }

    /// Parses Clark notation (`{namespace}local` or bare `local`).
    pub fn parse_clark(text: &str) -> Self {
        match text.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((namespace, local)) => Self::with_namespace(namespace, local),
            None => Self::unqualified(text),
        }
    }

    pub fn clark(&self) -> String {
        self.to_string()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// True for names in the XML Schema namespace that denote a built-in
    /// simple or special type.
    pub fn is_builtin(&self) -> bool {
        self.namespace.as_deref() == Some(XS_NAMESPACE)
            && grove_builtins::is_builtin_type_name(&self.local)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{{{}}}{}", namespace, self.local),
            None => f.write_str(&self.local),
        }
    }
}

lazy_static! {
    pub static ref XS_ANY_TYPE_NAME: QName = QName::with_namespace(XS_NAMESPACE, "anyType");
    pub static ref XS_ANY_SIMPLE_TYPE_NAME: QName =
        QName::with_namespace(XS_NAMESPACE, "anySimpleType");
    pub static ref XS_STRING_NAME: QName = QName::with_namespace(XS_NAMESPACE, "string");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_round_trip() {
        let qualified = QName::with_namespace("http://example/ns", "item");
        assert_eq!(qualified.to_string(), "{http://example/ns}item");
        assert_eq!(QName::parse_clark(&qualified.clark()), qualified);

        let plain = QName::unqualified("item");
        assert_eq!(plain.to_string(), "item");
        assert_eq!(QName::parse_clark("item"), plain);
    }

    #[test]
    fn builtin_detection_requires_the_schema_namespace() {
        assert!(QName::with_namespace(XS_NAMESPACE, "string").is_builtin());
        assert!(!QName::with_namespace("http://example", "string").is_builtin());
        assert!(!QName::with_namespace(XS_NAMESPACE, "Person").is_builtin());
    }
}
