use grove_xml::{canonicalize, parse_str, XmlWriter};
use pretty_assertions::assert_eq;

#[test]
fn canonical_form_of_a_simple_document() {
    let document = parse_str(r#"<?xml version="1.0"?><r b="2" a="1"><c/></r>"#).unwrap();
    assert_eq!(canonicalize(&document), r#"<r a="1" b="2"><c></c></r>"#);
}

#[test]
fn canonicalization_is_idempotent() {
    let inputs = [
        r#"<?xml version="1.0"?><r b="2" a="1"><c/>text &amp; more<!--gone--></r>"#,
        "<r><p xml:space=\"preserve\">  a  b  </p><![CDATA[x<y]]></r>",
        r#"<r t="A&#38;B"><?pi?><?pi2 data?></r>"#,
    ];
    for input in inputs {
        let first = canonicalize(&parse_str(input).unwrap());
        let second = canonicalize(&parse_str(&first).unwrap());
        assert_eq!(first, second, "input: {input}");
    }
}

#[test]
fn canonicalization_ignores_attribute_order() {
    let one = parse_str(r#"<r c="3" a="1" b="2"/>"#).unwrap();
    let two = parse_str(r#"<r b="2" c="3" a="1"/>"#).unwrap();
    assert_eq!(canonicalize(&one), canonicalize(&two));
}

#[test]
fn numeric_reference_survives_canonicalization() {
    let document = parse_str(r#"<r title="A&#38;B"/>"#).unwrap();
    assert_eq!(canonicalize(&document), r#"<r title="A&#38;B"></r>"#);

    let expanded = parse_str(r#"<r title="A&amp;B"/>"#).unwrap();
    assert_eq!(canonicalize(&expanded), r#"<r title="A&amp;B"></r>"#);
}

#[test]
fn empty_pi_gets_a_space_before_close() {
    let document = parse_str("<r><?foo?></r>").unwrap();
    assert_eq!(canonicalize(&document), "<r><?foo ?></r>");
}

#[test]
fn faithful_serialization_reparses_to_the_same_canonical_form() {
    let inputs = [
        r#"<?xml version="1.0" encoding="UTF-8"?><r b="2" a="1"><c/>mixed <b>text</b></r>"#,
        r#"<r t="A&#38;B"><![CDATA[raw < data]]><?go now?></r>"#,
        "<r><inner attr=\"a&lt;b\">x&amp;y</inner></r>",
    ];
    let writer = XmlWriter::new();
    for input in inputs {
        let first = parse_str(input).unwrap();
        let rewritten = writer.write_document(&first);
        let second = parse_str(&rewritten).unwrap();
        assert_eq!(
            canonicalize(&first),
            canonicalize(&second),
            "input: {input}\nrewritten: {rewritten}"
        );
    }
}
