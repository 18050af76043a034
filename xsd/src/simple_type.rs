//! Simple type definitions (§3.14): atomic restrictions of a base type,
//! lists of an item type, and unions over member types.

use grove_builtins::WhiteSpace;

use crate::facet::Facet;
use crate::xstypes::QName;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variety {
    Atomic,
    List,
    Union,
}

#[derive(Clone, Debug)]
pub struct SimpleType {
    /// Absent for anonymous types; the grammar still addresses those
    /// through a synthesized canonical key.
    pub name: Option<QName>,
    pub variety: Variety,
    /// Base type of an atomic restriction.
    pub base: Option<QName>,
    /// Constraining facets in declaration order.
    pub facets: Vec<Facet>,
    /// Item type of a list.
    pub item_type: Option<QName>,
    /// Member types of a union, in declaration order.
    pub member_types: Vec<QName>,
}

impl SimpleType {
    pub fn atomic(name: Option<QName>, base: QName, facets: Vec<Facet>) -> Self {
        Self {
            name,
            variety: Variety::Atomic,
            base: Some(base),
            facets,
            item_type: None,
            member_types: Vec::new(),
        }
    }

    pub fn list(name: Option<QName>, item_type: QName) -> Self {
        Self {
            name,
            variety: Variety::List,
            base: None,
            facets: Vec::new(),
            item_type: Some(item_type),
            member_types: Vec::new(),
        }
    }

    pub fn union(name: Option<QName>, member_types: Vec<QName>) -> Self {
        Self {
            name,
            variety: Variety::Union,
            base: None,
            facets: Vec::new(),
            item_type: None,
            member_types,
        }
    }

    /// The `whiteSpace` facet declared directly on this restriction, if
    /// any; otherwise the base type's behaviour applies.
    pub fn declared_white_space(&self) -> Option<WhiteSpace> {
        self.facets.iter().rev().find_map(|facet| match facet {
            Facet::WhiteSpace(ws) => Some(*ws),
            _ => None,
        })
    }
}
