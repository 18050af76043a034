use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use grove::{
    canonicalize, parse_file, parse_str, Catalog, CompositeGrammar, GrammarHandler,
    LoadedGrammar, ParseOptions, ValidationErrorKind, XmlWriter,
};

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn parse_and_canonicalize() {
    let report = parse_str(
        r#"<?xml version="1.0"?><r b="2" a="1"><c/></r>"#,
        &ParseOptions::new(),
    )
    .unwrap();
    assert_eq!(
        canonicalize(&report.document),
        r#"<r a="1" b="2"><c></c></r>"#
    );
}

#[test]
fn empty_pi_canonical_form() {
    let report = parse_str("<r><?foo?></r>", &ParseOptions::new()).unwrap();
    assert_eq!(canonicalize(&report.document), "<r><?foo ?></r>");
}

#[test]
fn numeric_reference_survives_the_pipeline() {
    let report = parse_str(r#"<r title="A&#38;B"/>"#, &ParseOptions::new()).unwrap();
    assert_eq!(canonicalize(&report.document), r#"<r title="A&#38;B"></r>"#);

    let expanded = parse_str(r#"<r title="A&amp;B"/>"#, &ParseOptions::new()).unwrap();
    assert_eq!(canonicalize(&expanded.document), r#"<r title="A&amp;B"></r>"#);
}

const PERSON_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
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

#[test]
fn schema_validation_through_schema_location() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "person.xsd", PERSON_XSD);
    let good = write(
        dir.path(),
        "good.xml",
        r#"<Person xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                  xsi:noNamespaceSchemaLocation="person.xsd">
             <name>A</name><age>3</age>
           </Person>"#,
    );
    let bad = write(
        dir.path(),
        "bad.xml",
        r#"<Person xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                  xsi:noNamespaceSchemaLocation="person.xsd">
             <age>-1</age><name>A</name>
           </Person>"#,
    );

    let options = ParseOptions::new().validating(true);
    let report = parse_file(&good, &options).unwrap();
    assert!(report.validation_errors.is_empty(), "{:?}", report.validation_errors);

    let report = parse_file(&bad, &options).unwrap();
    let kinds: Vec<_> = report.validation_errors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        [
            ValidationErrorKind::ContentModel,
            ValidationErrorKind::InvalidValue
        ],
        "{:?}",
        report.validation_errors
    );
}

#[test]
fn forward_group_reference_validates() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="A">
            <xs:complexType>
              <xs:group ref="G"/>
            </xs:complexType>
          </xs:element>
          <xs:group name="G">
            <xs:sequence>
              <xs:element name="x"/>
            </xs:sequence>
          </xs:group>
        </xs:schema>"#,
    );
    let instance = write(
        dir.path(),
        "a.xml",
        r#"<A xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
              xsi:noNamespaceSchemaLocation="a.xsd"><x/></A>"#,
    );

    let report = parse_file(&instance, &ParseOptions::new().validating(true)).unwrap();
    assert!(report.validation_errors.is_empty(), "{:?}", report.validation_errors);
}

#[test]
fn schema_location_resolves_through_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let xsd = write(dir.path(), "person.xsd", PERSON_XSD);
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog>
                 <uri name="http://example/schemas/person.xsd" uri="{xsd}"/>
               </catalog>"#
        ),
    );
    let instance = write(
        dir.path(),
        "doc.xml",
        r#"<Person xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                  xsi:noNamespaceSchemaLocation="http://example/schemas/person.xsd">
             <name>A</name><age>caterpillar</age>
           </Person>"#,
    );

    let options = ParseOptions::new()
        .validating(true)
        .with_catalog(Catalog::load(&catalog_file).unwrap());
    let report = parse_file(&instance, &options).unwrap();
    assert_eq!(report.validation_errors.len(), 1);
    assert_eq!(
        report.validation_errors[0].kind,
        ValidationErrorKind::InvalidValue
    );
}

#[test]
fn dtd_defaults_are_injected_into_the_tree() {
    let text = r#"<!DOCTYPE doc [
        <!ELEMENT doc EMPTY>
        <!ATTLIST doc kind CDATA "plain">
    ]><doc/>"#;

    let report = parse_str(text, &ParseOptions::new()).unwrap();
    let attribute = report.document.root().unwrap().attribute("kind").unwrap();
    assert_eq!(attribute.value, "plain");
    assert!(!attribute.specified);

    let options = ParseOptions::new().include_default_attributes(false);
    let report = parse_str(text, &options).unwrap();
    assert!(report.document.root().unwrap().attribute("kind").is_none());
}

#[test]
fn external_dtd_resolves_through_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let dtd = write(
        dir.path(),
        "doc.dtd",
        r#"<!ELEMENT doc EMPTY>
           <!ATTLIST doc version CDATA "1.0">"#,
    );
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog>
                 <system systemId="http://example/doc.dtd" uri="{dtd}"/>
               </catalog>"#
        ),
    );
    let instance = write(
        dir.path(),
        "doc.xml",
        r#"<!DOCTYPE doc SYSTEM "http://example/doc.dtd"><doc/>"#,
    );

    let options = ParseOptions::new().with_catalog(Catalog::load(&catalog_file).unwrap());
    let report = parse_file(&instance, &options).unwrap();
    let attribute = report.document.root().unwrap().attribute("version").unwrap();
    assert_eq!(attribute.value, "1.0");
    assert!(!attribute.specified);
}

struct Precompiled(Arc<CompositeGrammar>);

impl GrammarHandler for Precompiled {
    fn grammar_for(&self, uri: &str) -> Option<LoadedGrammar> {
        uri.ends_with("person.xsd")
            .then(|| LoadedGrammar::Schema(Arc::clone(&self.0)))
    }
}

#[test]
fn grammar_handler_supplies_a_compiled_grammar() {
    let dir = tempfile::tempdir().unwrap();
    // The file must exist for location resolution; its content is ignored
    // because the handler supplies the compiled grammar.
    write(dir.path(), "person.xsd", "<unused/>");
    let instance = write(
        dir.path(),
        "doc.xml",
        r#"<Person xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                  xsi:noNamespaceSchemaLocation="person.xsd">
             <name>A</name><age>-3</age>
           </Person>"#,
    );

    let (grammar, _) = grove_xsd::load_schema_str(PERSON_XSD, true).unwrap();
    let options = ParseOptions::new()
        .validating(true)
        .with_grammar_handler(Box::new(Precompiled(Arc::new(grammar))));
    let report = parse_file(&instance, &options).unwrap();
    assert_eq!(report.validation_errors.len(), 1);
    assert_eq!(
        report.validation_errors[0].kind,
        ValidationErrorKind::InvalidValue
    );
}

#[test]
fn serializer_round_trips_to_the_same_canonical_form() {
    let inputs = [
        r#"<?xml version="1.0"?><r b="2" a="1"><c/>text &amp; more</r>"#,
        "<r><p xml:space=\"preserve\">  a  b  </p></r>",
        r#"<r t="A&#38;B"><![CDATA[x<y]]></r>"#,
    ];
    let writer = XmlWriter::new();
    for input in inputs {
        let first = parse_str(input, &ParseOptions::new()).unwrap().document;
        let rewritten = writer.write_document(&first);
        let second = parse_str(&rewritten, &ParseOptions::new()).unwrap().document;
        assert_eq!(canonicalize(&first), canonicalize(&second), "input: {input}");
    }
}

#[test]
fn canonicalization_is_stable_and_idempotent() {
    let report = parse_str(
        r#"<?xml version="1.0"?><r c="3" b="2" a="1"><!--x--><k>v</k></r>"#,
        &ParseOptions::new(),
    )
    .unwrap();
    let once = canonicalize(&report.document);
    let twice = canonicalize(&parse_str(&once, &ParseOptions::new()).unwrap().document);
    assert_eq!(once, twice);

    let reordered = parse_str(
        r#"<r a="1" c="3" b="2"><!--y--><k>v</k></r>"#,
        &ParseOptions::new(),
    )
    .unwrap();
    assert_eq!(once, canonicalize(&reordered.document));
}
