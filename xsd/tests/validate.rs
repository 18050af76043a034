use std::sync::Arc;

use grove_xml::{Reader, Scanner, TreeBuilder};
use grove_xsd::{
    load_schema_str, SchemaValidatingFilter, ValidationError, ValidationErrorKind,
};

const PERSON_SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Person">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="name" type="xs:string"/>
        <xs:element name="age">
          <xs:simpleType>
            <xs:restriction base="xs:int">
              <xs:minInclusive value="0"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn validate(schema: &str, document: &str) -> Vec<ValidationError> {
    validate_with(schema, document, true)
}

fn validate_with(schema: &str, document: &str, defaults: bool) -> Vec<ValidationError> {
    let (grammar, _) = load_schema_str(schema, true).expect("schema must load");
    let mut filter = SchemaValidatingFilter::new(Arc::new(grammar), TreeBuilder::new())
        .include_default_attributes(defaults);
    Scanner::new(Reader::from_str(document), &mut filter)
        .parse()
        .expect("instance must be well-formed");
    filter.into_parts().1
}

fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
    errors.iter().map(|error| error.kind).collect()
}

#[test]
fn valid_person_passes() {
    let errors = validate(PERSON_SCHEMA, "<Person><name>A</name><age>3</age></Person>");
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn order_and_range_violations_produce_exactly_two_errors() {
    let errors = validate(PERSON_SCHEMA, "<Person><age>-1</age><name>A</name></Person>");
    assert_eq!(
        kinds(&errors),
        [
            ValidationErrorKind::ContentModel,
            ValidationErrorKind::InvalidValue
        ],
        "{errors:?}"
    );
    assert_eq!(errors[0].path, "/Person/age");
}

#[test]
fn missing_trailing_child_is_incomplete_content() {
    let errors = validate(PERSON_SCHEMA, "<Person><name>A</name></Person>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::ContentModel]);
}

#[test]
fn undeclared_root_is_reported() {
    let errors = validate(PERSON_SCHEMA, "<Stranger/>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::UndeclaredElement]);
}

#[test]
fn attribute_rules() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="item">
        <xs:complexType>
          <xs:attribute name="id" type="xs:NCName" use="required"/>
          <xs:attribute name="legacy" type="xs:string" use="prohibited"/>
          <xs:attribute name="count" type="xs:int"/>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    assert!(validate(schema, r#"<item id="a1" count="2"/>"#).is_empty());

    let errors = validate(schema, r#"<item legacy="x" count="NaN" other="1"/>"#);
    let mut found = kinds(&errors);
    found.sort_by_key(|kind| format!("{kind:?}"));
    assert_eq!(
        found,
        [
            ValidationErrorKind::InvalidValue,
            ValidationErrorKind::ProhibitedAttribute,
            ValidationErrorKind::RequiredAttributeMissing,
            ValidationErrorKind::UndeclaredAttribute,
        ],
        "{errors:?}"
    );
}

#[test]
fn defaulted_attributes_are_injected_as_unspecified() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="knob">
        <xs:complexType>
          <xs:attribute name="setting" type="xs:string" default="auto"/>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    let (grammar, _) = load_schema_str(schema, true).unwrap();
    let mut filter = SchemaValidatingFilter::new(Arc::new(grammar), TreeBuilder::new());
    Scanner::new(Reader::from_str("<knob/>"), &mut filter)
        .parse()
        .unwrap();
    let (builder, errors) = filter.into_parts();
    assert!(errors.is_empty());

    let document = builder.into_document().unwrap();
    let attribute = document.root().unwrap().attribute("setting").unwrap();
    assert_eq!(attribute.value, "auto");
    assert!(!attribute.specified);

    // Injection can be turned off.
    let errors = validate_with(schema, "<knob/>", false);
    assert!(errors.is_empty());
}

#[test]
fn all_group_accepts_any_permutation_once() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="pair">
        <xs:complexType>
          <xs:all>
            <xs:element name="x" type="xs:string"/>
            <xs:element name="y" type="xs:string"/>
          </xs:all>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    assert!(validate(schema, "<pair><y>1</y><x>2</x></pair>").is_empty());
    assert!(!validate(schema, "<pair><x>1</x><x>2</x><y>3</y></pair>").is_empty());
    assert!(!validate(schema, "<pair><x>1</x></pair>").is_empty());
}

#[test]
fn lax_wildcard_validates_only_known_elements() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="known" type="xs:int"/>
      <xs:element name="bag">
        <xs:complexType>
          <xs:sequence>
            <xs:any processContents="lax" minOccurs="0" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    // Unknown children pass under lax processing.
    assert!(validate(schema, "<bag><mystery/></bag>").is_empty());
    // A declared element reached through the wildcard is still validated.
    let errors = validate(schema, "<bag><known>oops</known></bag>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::InvalidValue]);
}

#[test]
fn skip_wildcard_ignores_the_whole_subtree() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="known" type="xs:int"/>
      <xs:element name="bag">
        <xs:complexType>
          <xs:sequence>
            <xs:any processContents="skip" minOccurs="0" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    assert!(validate(schema, "<bag><known>not-a-number</known></bag>").is_empty());
    assert!(validate(schema, "<bag><a><b><c>deep</c></b></a></bag>").is_empty());
}

#[test]
fn strict_wildcard_requires_a_declaration() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="bag">
        <xs:complexType>
          <xs:sequence>
            <xs:any processContents="strict"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    let errors = validate(schema, "<bag><mystery/></bag>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::UndeclaredElement]);
}

#[test]
fn nillable_elements_take_xsi_nil() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="row">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="value" type="xs:int" nillable="true"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    let nilled = r#"<row xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
        <value xsi:nil="true"/>
    </row>"#;
    assert!(validate(schema, nilled).is_empty());

    let nilled_with_content = r#"<row xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
        <value xsi:nil="true">7</value>
    </row>"#;
    let errors = validate(schema, nilled_with_content);
    assert_eq!(kinds(&errors), [ValidationErrorKind::ContentModel]);
}

#[test]
fn xsi_nil_on_a_non_nillable_element() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="value" type="xs:int"/>
    </xs:schema>"#;

    let document = r#"<value xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                             xsi:nil="true">3</value>"#;
    let errors = validate(schema, document);
    assert_eq!(kinds(&errors), [ValidationErrorKind::InvalidNil]);
}

#[test]
fn xsi_type_overrides_the_declared_type() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="value" type="xs:string"/>
    </xs:schema>"#;

    let document = r#"<value xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                             xmlns:xs="http://www.w3.org/2001/XMLSchema"
                             xsi:type="xs:int">not-a-number</value>"#;
    let errors = validate(schema, document);
    assert_eq!(kinds(&errors), [ValidationErrorKind::InvalidValue]);
}

#[test]
fn fixed_element_values_are_enforced() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="version" type="xs:string" fixed="1.0"/>
    </xs:schema>"#;

    assert!(validate(schema, "<version>1.0</version>").is_empty());
    let errors = validate(schema, "<version>2.0</version>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::FixedValueMismatch]);
}

#[test]
fn stop_at_first_error_keeps_only_one() {
    let (grammar, _) = load_schema_str(PERSON_SCHEMA, true).unwrap();
    let mut filter = SchemaValidatingFilter::new(Arc::new(grammar), TreeBuilder::new())
        .stop_at_first_error(true);
    Scanner::new(
        Reader::from_str("<Person><age>-1</age><name>A</name></Person>"),
        &mut filter,
    )
    .parse()
    .unwrap();
    assert_eq!(filter.errors().len(), 1);
}

#[test]
fn substitution_group_member_satisfies_the_head_particle() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="head" type="xs:string"/>
      <xs:element name="member" substitutionGroup="head"/>
      <xs:element name="holder">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="head"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    assert!(validate(schema, "<holder><head>h</head></holder>").is_empty());
    assert!(validate(schema, "<holder><member>m</member></holder>").is_empty());
    assert!(!validate(schema, "<holder><other>o</other></holder>").is_empty());
}

#[test]
fn mixed_content_allows_text_between_children() {
    let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="p">
        <xs:complexType mixed="true">
          <xs:sequence>
            <xs:element name="b" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="strictp">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="b" type="xs:string" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    assert!(validate(schema, "<p>hello <b>bold</b> world</p>").is_empty());
    let errors = validate(schema, "<strictp>text not allowed<b>x</b></strictp>");
    assert_eq!(kinds(&errors), [ValidationErrorKind::ContentModel]);
}
