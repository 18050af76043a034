//! Constraining facets (pt. 2, §4.3): the ordered facet list of a simple
//! type restriction, consistency rules over a facet set, and value
//! checking.

use grove_builtins::{compare_values, WhiteSpace};
use regex::Regex;

use crate::error::SchemaError;

#[derive(Clone, Debug)]
pub enum Facet {
    /// The union of every `<enumeration>` value in the restriction.
    Enumeration(Vec<String>),
    Pattern(Pattern),
    Length(u64),
    MinLength(u64),
    MaxLength(u64),
    MinInclusive(String),
    MaxInclusive(String),
    MinExclusive(String),
    MaxExclusive(String),
    TotalDigits(u32),
    FractionDigits(u32),
    WhiteSpace(WhiteSpace),
}

/// A pattern facet keeps its source expression and the regex derived from
/// it at parse time. Branches of repeated `<pattern>` elements are already
/// joined with `|` by the schema handler.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub source: String,
    regex: Option<Regex>,
}

impl Pattern {
    /// Anchors the expression, since XML Schema patterns match the whole
    /// literal.
    pub fn compile(source: impl Into<String>) -> Result<Self, SchemaError> {
        let source = source.into();
        match Regex::new(&format!("^(?:{source})$")) {
            Ok(regex) => Ok(Self {
                source,
                regex: Some(regex),
            }),
            Err(err) => Err(SchemaError::InvalidFacets(format!(
                "pattern {source:?} does not compile: {err}"
            ))),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(value),
            // An uncompilable pattern was already reported at load time.
            None => true,
        }
    }
}

impl Facet {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enumeration(_) => "enumeration",
            Self::Pattern(_) => "pattern",
            Self::Length(_) => "length",
            Self::MinLength(_) => "minLength",
            Self::MaxLength(_) => "maxLength",
            Self::MinInclusive(_) => "minInclusive",
            Self::MaxInclusive(_) => "maxInclusive",
            Self::MinExclusive(_) => "minExclusive",
            Self::MaxExclusive(_) => "maxExclusive",
            Self::TotalDigits(_) => "totalDigits",
            Self::FractionDigits(_) => "fractionDigits",
            Self::WhiteSpace(_) => "whiteSpace",
        }
    }
}

/// Checks a restriction's facet list for internal consistency:
/// `length` excludes `minLength`/`maxLength`; `minLength <= maxLength`;
/// `fractionDigits <= totalDigits`; inclusive and exclusive bounds do not
/// mix on the same end; the lower bound must not exceed the upper (strictly
/// below it when both ends are exclusive).
pub fn check_facet_set(facets: &[Facet], primitive: Option<&str>) -> Result<(), SchemaError> {
    let mut length = None;
    let mut min_length = None;
    let mut max_length = None;
    let mut total_digits = None;
    let mut fraction_digits = None;
    let mut min_inclusive = None;
    let mut min_exclusive = None;
    let mut max_inclusive = None;
    let mut max_exclusive = None;

    for facet in facets {
        match facet {
            Facet::Length(v) => length = Some(*v),
            Facet::MinLength(v) => min_length = Some(*v),
            Facet::MaxLength(v) => max_length = Some(*v),
            Facet::TotalDigits(v) => total_digits = Some(*v),
            Facet::FractionDigits(v) => fraction_digits = Some(*v),
            Facet::MinInclusive(v) => min_inclusive = Some(v.as_str()),
            Facet::MinExclusive(v) => min_exclusive = Some(v.as_str()),
            Facet::MaxInclusive(v) => max_inclusive = Some(v.as_str()),
            Facet::MaxExclusive(v) => max_exclusive = Some(v.as_str()),
            _ => {}
        }
    }

    if length.is_some() && (min_length.is_some() || max_length.is_some()) {
        return Err(SchemaError::InvalidFacets(
            "length excludes minLength and maxLength".into(),
        ));
    }
    if let (Some(min), Some(max)) = (min_length, max_length) {
        if min > max {
            return Err(SchemaError::InvalidFacets(format!(
                "minLength {min} exceeds maxLength {max}"
            )));
        }
    }
    if let (Some(fraction), Some(total)) = (fraction_digits, total_digits) {
        if fraction > total {
            return Err(SchemaError::InvalidFacets(format!(
                "fractionDigits {fraction} exceeds totalDigits {total}"
            )));
        }
    }
    if min_inclusive.is_some() && min_exclusive.is_some() {
        return Err(SchemaError::InvalidFacets(
            "minInclusive and minExclusive are mutually exclusive".into(),
        ));
    }
    if max_inclusive.is_some() && max_exclusive.is_some() {
        return Err(SchemaError::InvalidFacets(
            "maxInclusive and maxExclusive are mutually exclusive".into(),
        ));
    }

    let lower = min_inclusive.or(min_exclusive);
    let upper = max_inclusive.or(max_exclusive);
    if let (Some(lower), Some(upper)) = (lower, upper) {
        let primitive = primitive.unwrap_or("decimal");
        if let Some(order) = compare_values(primitive, lower, upper) {
            let both_exclusive = min_exclusive.is_some() && max_exclusive.is_some();
            let broken = if both_exclusive {
                order != std::cmp::Ordering::Less
            } else {
                order == std::cmp::Ordering::Greater
            };
            if broken {
                return Err(SchemaError::InvalidFacets(format!(
                    "lower bound {lower:?} does not precede upper bound {upper:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Applies the facet list in order to an already white-space-normalized
/// value. `length_units` carries the unit count the length facets apply to
/// (characters for atomic types, items for lists).
pub fn apply_facets(
    facets: &[Facet],
    value: &str,
    length_units: u64,
    primitive: Option<&str>,
) -> Result<(), String> {
    for facet in facets {
        match facet {
            Facet::WhiteSpace(_) => {}
            Facet::Enumeration(allowed) => {
                if !allowed.iter().any(|candidate| candidate == value) {
                    return Err(format!("value {value:?} is not in the enumeration"));
                }
            }
            Facet::Pattern(pattern) => {
                if !pattern.matches(value) {
                    return Err(format!(
                        "value {value:?} does not match pattern {:?}",
                        pattern.source
                    ));
                }
            }
            Facet::Length(expected) => {
                if length_units != *expected {
                    return Err(format!(
                        "length {length_units} does not equal the required {expected}"
                    ));
                }
            }
            Facet::MinLength(min) => {
                if length_units < *min {
                    return Err(format!("length {length_units} is below minLength {min}"));
                }
            }
            Facet::MaxLength(max) => {
                if length_units > *max {
                    return Err(format!("length {length_units} exceeds maxLength {max}"));
                }
            }
            Facet::MinInclusive(bound) => {
                check_bound(primitive, value, bound, "minInclusive", |o| {
                    o != std::cmp::Ordering::Less
                })?;
            }
            Facet::MinExclusive(bound) => {
                check_bound(primitive, value, bound, "minExclusive", |o| {
                    o == std::cmp::Ordering::Greater
                })?;
            }
            Facet::MaxInclusive(bound) => {
                check_bound(primitive, value, bound, "maxInclusive", |o| {
                    o != std::cmp::Ordering::Greater
                })?;
            }
            Facet::MaxExclusive(bound) => {
                check_bound(primitive, value, bound, "maxExclusive", |o| {
                    o == std::cmp::Ordering::Less
                })?;
            }
            Facet::TotalDigits(max) => {
                let digits = value.chars().filter(char::is_ascii_digit).count() as u32;
                if digits > *max {
                    return Err(format!("{digits} digits exceed totalDigits {max}"));
                }
            }
            Facet::FractionDigits(max) => {
                let fraction = value
                    .split_once('.')
                    .map(|(_, fraction)| {
                        fraction.chars().filter(char::is_ascii_digit).count() as u32
                    })
                    .unwrap_or(0);
                if fraction > *max {
                    return Err(format!(
                        "{fraction} fraction digits exceed fractionDigits {max}"
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_bound(
    primitive: Option<&str>,
    value: &str,
    bound: &str,
    facet: &str,
    acceptable: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<(), String> {
    let primitive = primitive.unwrap_or("decimal");
    match compare_values(primitive, value, bound) {
        Some(order) if acceptable(order) => Ok(()),
        Some(_) => Err(format!("value {value:?} violates {facet} {bound:?}")),
        None => Err(format!(
            "value {value:?} is not comparable to {facet} {bound:?}"
        )),
    }
}
