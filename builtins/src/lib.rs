//! The XML Schema built-in simple types as one process-wide immutable
//! table, built on first use and shared by reference. Each entry knows its
//! base type, its `whiteSpace` behaviour, and how to check a literal
//! against the type's lexical space. Range facets use
//! [`compare_values`] to order two literals under a primitive's rules.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug)]
pub enum ValueError {
    NotInLexicalSpace {
        type_name: &'static str,
        value: String,
    },
    OutOfRange {
        type_name: &'static str,
        value: String,
    },
    EmptyList {
        type_name: &'static str,
    },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInLexicalSpace { type_name, value } => {
                write!(f, "value {value:?} is not a valid {type_name}")
            }
            Self::OutOfRange { type_name, value } => {
                write!(f, "value {value:?} is out of range for {type_name}")
            }
            Self::EmptyList { type_name } => {
                write!(f, "{type_name} requires at least one list item")
            }
        }
    }
}

impl std::error::Error for ValueError {}

/// The `whiteSpace` facet values (pt. 2, §4.3.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

/// Applies a `whiteSpace` facet to a literal before lexical mapping.
pub fn normalized_value(value: &str, white_space: WhiteSpace) -> Cow<'_, str> {
    match white_space {
        WhiteSpace::Preserve => Cow::Borrowed(value),
        WhiteSpace::Replace => {
            if value.contains(['\t', '\n', '\r']) {
                Cow::Owned(value.replace(['\t', '\n', '\r'], " "))
            } else {
                Cow::Borrowed(value)
            }
        }
        WhiteSpace::Collapse => {
            let collapsed = value
                .split([' ', '\t', '\n', '\r'])
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if collapsed == value {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(collapsed)
            }
        }
    }
}

/// Lexical-space check strategy of one builtin.
#[derive(Copy, Clone, Debug)]
enum Check {
    /// Every string is acceptable after white-space handling.
    AnyString,
    Boolean,
    Decimal,
    /// float and double: decimal or scientific notation, INF, -INF, NaN.
    FloatingPoint,
    Integer {
        min: Option<i128>,
        max: Option<i128>,
    },
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    Duration,
    HexBinary,
    Base64Binary,
    Language,
    Name,
    NcName,
    NmToken,
    QName,
    /// White-space separated list of another builtin, at least one item.
    List(&'static str),
}

#[derive(Clone, Debug)]
pub struct Builtin {
    pub name: &'static str,
    /// Base type in the builtin hierarchy; `None` only for `anyType`.
    pub base: Option<&'static str>,
    pub white_space: WhiteSpace,
    check: Check,
}

impl Builtin {
    /// Normalizes per the type's `whiteSpace`, then checks the literal.
    pub fn validate(&self, value: &str) -> Result<(), ValueError> {
        let normalized = normalized_value(value, self.white_space);
        self.validate_literal(&normalized)
    }

    /// Checks a literal that is already white-space normalized.
    pub fn validate_literal(&self, literal: &str) -> Result<(), ValueError> {
        let bad = || ValueError::NotInLexicalSpace {
            type_name: self.name,
            value: literal.to_string(),
        };
        let matches = |re: &Regex| if re.is_match(literal) { Ok(()) } else { Err(bad()) };
        match self.check {
            Check::AnyString => Ok(()),
            Check::Boolean => match literal {
                "true" | "false" | "1" | "0" => Ok(()),
                _ => Err(bad()),
            },
            Check::Decimal => matches(&DECIMAL_RE),
            Check::FloatingPoint => matches(&FLOAT_RE),
            Check::Integer { min, max } => {
                if !INTEGER_RE.is_match(literal) {
                    return Err(bad());
                }
                let parsed: i128 = literal.parse().map_err(|_| ValueError::OutOfRange {
                    type_name: self.name,
                    value: literal.to_string(),
                })?;
                let below = min.is_some_and(|min| parsed < min);
                let above = max.is_some_and(|max| parsed > max);
                if below || above {
                    Err(ValueError::OutOfRange {
                        type_name: self.name,
                        value: literal.to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            Check::DateTime => matches(&DATE_TIME_RE),
            Check::Date => matches(&DATE_RE),
            Check::Time => matches(&TIME_RE),
            Check::GYear => matches(&G_YEAR_RE),
            Check::GYearMonth => matches(&G_YEAR_MONTH_RE),
            Check::GMonth => matches(&G_MONTH_RE),
            Check::GMonthDay => matches(&G_MONTH_DAY_RE),
            Check::GDay => matches(&G_DAY_RE),
            Check::Duration => {
                // The component shape is regular; "at least one component"
                // is checked separately because it needs lookahead.
                if DURATION_RE.is_match(literal)
                    && literal.chars().any(|c| c.is_ascii_digit())
                    && !literal.ends_with('T')
                {
                    Ok(())
                } else {
                    Err(bad())
                }
            }
            Check::HexBinary => matches(&HEX_BINARY_RE),
            Check::Base64Binary => matches(&BASE64_RE),
            Check::Language => matches(&LANGUAGE_RE),
            Check::Name => matches(&NAME_RE),
            Check::NcName => matches(&NCNAME_RE),
            Check::NmToken => matches(&NMTOKEN_RE),
            Check::QName => matches(&QNAME_RE),
            Check::List(item_type) => {
                let item = builtin(item_type).ok_or_else(bad)?;
                let mut any = false;
                for token in literal.split(' ').filter(|t| !t.is_empty()) {
                    item.validate_literal(token)?;
                    any = true;
                }
                if any {
                    Ok(())
                } else {
                    Err(ValueError::EmptyList {
                        type_name: self.name,
                    })
                }
            }
        }
    }

    /// The primitive this type derives from, following base links until a
    /// direct child of `anyAtomicType`. List types report their item's
    /// primitive.
    pub fn primitive(&self) -> &'static str {
        if let Check::List(item) = self.check {
            return builtin(item).map(|b| b.primitive()).unwrap_or(item);
        }
        let mut current = self.name;
        loop {
            let Some(entry) = builtin(current) else {
                return current;
            };
            match entry.base {
                Some("anyAtomicType") | Some("anySimpleType") | None => return current,
                Some(base) => current = base,
            }
        }
    }
}

pub fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTIN_TYPES.get(name)
}

pub fn is_builtin_type_name(name: &str) -> bool {
    BUILTIN_TYPES.contains_key(name)
}

/// Orders two literals under a primitive type's value rules; `None` when
/// the primitive has no usable order (or a literal does not parse).
pub fn compare_values(primitive: &str, a: &str, b: &str) -> Option<Ordering> {
    match primitive {
        "decimal" | "integer" => {
            if let (Ok(a), Ok(b)) = (a.parse::<i128>(), b.parse::<i128>()) {
                return Some(a.cmp(&b));
            }
            numeric_cmp(a, b)
        }
        "float" | "double" => numeric_cmp(a, b),
        "dateTime" | "date" | "time" | "gYear" | "gYearMonth" | "gMonth" | "gMonthDay"
        | "gDay" => Some(a.cmp(b)),
        _ => None,
    }
}

fn numeric_cmp(a: &str, b: &str) -> Option<Ordering> {
    let parse = |v: &str| match v {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => v.parse::<f64>().ok(),
    };
    parse(a)?.partial_cmp(&parse(b)?)
}

lazy_static! {
    static ref DECIMAL_RE: Regex = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap();
    static ref FLOAT_RE: Regex =
        Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|[+-]?INF|NaN)$").unwrap();
    static ref INTEGER_RE: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref DATE_TIME_RE: Regex = Regex::new(
        r"^-?\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$"
    )
    .unwrap();
    static ref DATE_RE: Regex =
        Regex::new(r"^-?\d{4,}-\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref TIME_RE: Regex =
        Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_YEAR_RE: Regex = Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_YEAR_MONTH_RE: Regex =
        Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_MONTH_RE: Regex = Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_MONTH_DAY_RE: Regex =
        Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_DAY_RE: Regex = Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DURATION_RE: Regex =
        Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap();
    static ref HEX_BINARY_RE: Regex = Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap();
    static ref BASE64_RE: Regex =
        Regex::new(r"^([A-Za-z0-9+/] ?)*(=( ?=)?)? *$").unwrap();
    static ref LANGUAGE_RE: Regex =
        Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref NAME_RE: Regex =
        Regex::new(r"^[:_\p{L}][-.:_\p{L}\p{Nd}\p{M}]*$").unwrap();
    static ref NCNAME_RE: Regex =
        Regex::new(r"^[_\p{L}][-._\p{L}\p{Nd}\p{M}]*$").unwrap();
    static ref NMTOKEN_RE: Regex = Regex::new(r"^[-.:_\p{L}\p{Nd}\p{M}]+$").unwrap();
    static ref QNAME_RE: Regex = Regex::new(
        r"^[_\p{L}][-._\p{L}\p{Nd}\p{M}]*(:[_\p{L}][-._\p{L}\p{Nd}\p{M}]*)?$"
    )
    .unwrap();
}

macro_rules! builtin_table {
    ($($name:literal => $base:expr, $ws:ident, $check:expr;)+) => {
        {
            let mut table = HashMap::new();
            $(
                table.insert($name, Builtin {
                    name: $name,
                    base: $base,
                    white_space: WhiteSpace::$ws,
                    check: $check,
                });
            )+
            table
        }
    };
}

lazy_static! {
    static ref BUILTIN_TYPES: HashMap<&'static str, Builtin> = builtin_table! {
        // Special types (pt. 2, §3.2).
        "anyType" => None, Preserve, Check::AnyString;
        "anySimpleType" => Some("anyType"), Preserve, Check::AnyString;
        "anyAtomicType" => Some("anySimpleType"), Preserve, Check::AnyString;

        // The 19 primitives (pt. 2, §3.3).
        "string" => Some("anyAtomicType"), Preserve, Check::AnyString;
        "boolean" => Some("anyAtomicType"), Collapse, Check::Boolean;
        "decimal" => Some("anyAtomicType"), Collapse, Check::Decimal;
        "float" => Some("anyAtomicType"), Collapse, Check::FloatingPoint;
        "double" => Some("anyAtomicType"), Collapse, Check::FloatingPoint;
        "duration" => Some("anyAtomicType"), Collapse, Check::Duration;
        "dateTime" => Some("anyAtomicType"), Collapse, Check::DateTime;
        "time" => Some("anyAtomicType"), Collapse, Check::Time;
        "date" => Some("anyAtomicType"), Collapse, Check::Date;
        "gYearMonth" => Some("anyAtomicType"), Collapse, Check::GYearMonth;
        "gYear" => Some("anyAtomicType"), Collapse, Check::GYear;
        "gMonthDay" => Some("anyAtomicType"), Collapse, Check::GMonthDay;
        "gDay" => Some("anyAtomicType"), Collapse, Check::GDay;
        "gMonth" => Some("anyAtomicType"), Collapse, Check::GMonth;
        "hexBinary" => Some("anyAtomicType"), Collapse, Check::HexBinary;
        "base64Binary" => Some("anyAtomicType"), Collapse, Check::Base64Binary;
        "anyURI" => Some("anyAtomicType"), Collapse, Check::AnyString;
        "QName" => Some("anyAtomicType"), Collapse, Check::QName;
        "NOTATION" => Some("anyAtomicType"), Collapse, Check::QName;

        // String-derived ordinary types (pt. 2, §3.4).
        "normalizedString" => Some("string"), Replace, Check::AnyString;
        "token" => Some("normalizedString"), Collapse, Check::AnyString;
        "language" => Some("token"), Collapse, Check::Language;
        "NMTOKEN" => Some("token"), Collapse, Check::NmToken;
        "NMTOKENS" => Some("NMTOKEN"), Collapse, Check::List("NMTOKEN");
        "Name" => Some("token"), Collapse, Check::Name;
        "NCName" => Some("Name"), Collapse, Check::NcName;
        "ID" => Some("NCName"), Collapse, Check::NcName;
        "IDREF" => Some("NCName"), Collapse, Check::NcName;
        "IDREFS" => Some("IDREF"), Collapse, Check::List("IDREF");
        "ENTITY" => Some("NCName"), Collapse, Check::NcName;
        "ENTITIES" => Some("ENTITY"), Collapse, Check::List("ENTITY");

        // Decimal-derived ordinary types.
        "integer" => Some("decimal"), Collapse,
            Check::Integer { min: None, max: None };
        "nonPositiveInteger" => Some("integer"), Collapse,
            Check::Integer { min: None, max: Some(0) };
        "negativeInteger" => Some("nonPositiveInteger"), Collapse,
            Check::Integer { min: None, max: Some(-1) };
        "long" => Some("integer"), Collapse,
            Check::Integer { min: Some(i64::MIN as i128), max: Some(i64::MAX as i128) };
        "int" => Some("long"), Collapse,
            Check::Integer { min: Some(i32::MIN as i128), max: Some(i32::MAX as i128) };
        "short" => Some("int"), Collapse,
            Check::Integer { min: Some(i16::MIN as i128), max: Some(i16::MAX as i128) };
        "byte" => Some("short"), Collapse,
            Check::Integer { min: Some(i8::MIN as i128), max: Some(i8::MAX as i128) };
        "nonNegativeInteger" => Some("integer"), Collapse,
            Check::Integer { min: Some(0), max: None };
        "unsignedLong" => Some("nonNegativeInteger"), Collapse,
            Check::Integer { min: Some(0), max: Some(u64::MAX as i128) };
        "unsignedInt" => Some("unsignedLong"), Collapse,
            Check::Integer { min: Some(0), max: Some(u32::MAX as i128) };
        "unsignedShort" => Some("unsignedInt"), Collapse,
            Check::Integer { min: Some(0), max: Some(u16::MAX as i128) };
        "unsignedByte" => Some("unsignedShort"), Collapse,
            Check::Integer { min: Some(0), max: Some(u8::MAX as i128) };
        "positiveInteger" => Some("nonNegativeInteger"), Collapse,
            Check::Integer { min: Some(1), max: None };
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, value: &str) -> Result<(), ValueError> {
        builtin(name).unwrap().validate(value)
    }

    #[test]
    fn table_is_complete_and_linked() {
        for entry in BUILTIN_TYPES.values() {
            if let Some(base) = entry.base {
                assert!(
                    is_builtin_type_name(base),
                    "{} has unknown base {base}",
                    entry.name
                );
            }
        }
        assert!(is_builtin_type_name("string"));
        assert!(!is_builtin_type_name("Person"));
    }

    #[test]
    fn primitive_resolution() {
        assert_eq!(builtin("unsignedByte").unwrap().primitive(), "decimal");
        assert_eq!(builtin("ID").unwrap().primitive(), "string");
        assert_eq!(builtin("string").unwrap().primitive(), "string");
        assert_eq!(builtin("NMTOKENS").unwrap().primitive(), "string");
    }

    #[test]
    fn boolean_lexical_space() {
        assert!(check("boolean", "true").is_ok());
        assert!(check("boolean", " 1 ").is_ok());
        assert!(check("boolean", "TRUE").is_err());
    }

    #[test]
    fn integer_family_ranges() {
        assert!(check("byte", "-128").is_ok());
        assert!(check("byte", "128").is_err());
        assert!(check("unsignedShort", "65535").is_ok());
        assert!(check("unsignedShort", "-1").is_err());
        assert!(check("positiveInteger", "0").is_err());
        assert!(check("nonNegativeInteger", "0").is_ok());
        assert!(check("int", "3").is_ok());
        assert!(check("int", "3.5").is_err());
    }

    #[test]
    fn decimal_and_float_forms() {
        assert!(check("decimal", "-1.5").is_ok());
        assert!(check("decimal", ".5").is_ok());
        assert!(check("decimal", "1e3").is_err());
        assert!(check("double", "1e3").is_ok());
        assert!(check("double", "-INF").is_ok());
        assert!(check("float", "NaN").is_ok());
    }

    #[test]
    fn date_and_time_forms() {
        assert!(check("dateTime", "2002-10-10T12:00:00Z").is_ok());
        assert!(check("dateTime", "2002-10-10").is_err());
        assert!(check("date", "2002-10-10").is_ok());
        assert!(check("time", "13:20:00-05:00").is_ok());
        assert!(check("gMonthDay", "--12-25").is_ok());
        assert!(check("gDay", "---31").is_ok());
    }

    #[test]
    fn duration_requires_a_component() {
        assert!(check("duration", "P1Y2M3DT4H5M6S").is_ok());
        assert!(check("duration", "PT0.5S").is_ok());
        assert!(check("duration", "-P30D").is_ok());
        assert!(check("duration", "P").is_err());
        assert!(check("duration", "P1YT").is_err());
    }

    #[test]
    fn binary_and_name_forms() {
        assert!(check("hexBinary", "0fB8").is_ok());
        assert!(check("hexBinary", "0fB").is_err());
        assert!(check("NCName", "note").is_ok());
        assert!(check("NCName", "ns:note").is_err());
        assert!(check("QName", "ns:note").is_ok());
        assert!(check("NMTOKENS", "a b c").is_ok());
        assert!(check("NMTOKENS", "   ").is_err());
        assert!(check("language", "en-US").is_ok());
        assert!(check("language", "verylonglanguage").is_err());
    }

    #[test]
    fn white_space_normalization_applies_before_checking() {
        assert!(check("int", "\n  42\t").is_ok());
        assert_eq!(normalized_value("a\tb", WhiteSpace::Replace), "a b");
        assert_eq!(normalized_value(" a  b ", WhiteSpace::Collapse), "a b");
        assert_eq!(normalized_value(" a ", WhiteSpace::Preserve), " a ");
    }

    #[test]
    fn ordered_comparison_by_primitive() {
        assert_eq!(compare_values("decimal", "-1", "3"), Some(Ordering::Less));
        assert_eq!(compare_values("double", "1e2", "99"), Some(Ordering::Greater));
        assert_eq!(
            compare_values("date", "2001-01-01", "2002-01-01"),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values("string", "a", "b"), None);
        assert_eq!(compare_values("float", "NaN", "1"), None);
    }
}
