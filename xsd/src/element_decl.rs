//! Element declarations (§3.3).

use crate::attribute_decl::{Form, ValueConstraint};
use crate::xstypes::QName;

#[derive(Clone, Debug)]
pub struct ElementDecl {
    pub name: QName,
    pub form: Form,
    /// Declared or inline type; absent means `xs:anyType`.
    pub type_ref: Option<QName>,
    pub nillable: bool,
    pub abstract_: bool,
    /// Head of the substitution group this declaration belongs to.
    pub substitution_group: Option<QName>,
    pub value_constraint: Option<ValueConstraint>,
}

impl ElementDecl {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            form: Form::Unqualified,
            type_ref: None,
            nillable: false,
            abstract_: false,
            substitution_group: None,
            value_constraint: None,
        }
    }
}

/// Notation declaration (§3.12); carried in the grammar's notation table.
#[derive(Clone, Debug)]
pub struct NotationDecl {
    pub name: QName,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}
