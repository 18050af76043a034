use grove_xml::error::{ParseErrorKind, XmlError};
use grove_xml::sax::{ContentHandler, SaxAttribute};
use grove_xml::{Reader, Scanner};

/// Records every event as one line, for whole-stream assertions.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Recorder {
    fn scan(text: &str) -> Result<Vec<String>, XmlError> {
        let mut recorder = Recorder::default();
        let mut scanner = Scanner::new(Reader::from_str(text), &mut recorder);
        scanner.parse()?;
        Ok(recorder.events)
    }
}

impl ContentHandler for Recorder {
    fn start_document(&mut self) -> Result<(), XmlError> {
        self.events.push("startDocument".into());
        Ok(())
    }

    fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), XmlError> {
        self.events.push(format!(
            "xmlDecl {version} {} {}",
            encoding.unwrap_or("-"),
            standalone.map(|s| s.to_string()).unwrap_or("-".into())
        ));
        Ok(())
    }

    fn start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        self.events.push(format!(
            "startDTD {name} {} {}",
            public_id.unwrap_or("-"),
            system_id.unwrap_or("-")
        ));
        Ok(())
    }

    fn internal_subset(&mut self, _text: &str) -> Result<(), XmlError> {
        self.events.push("internalSubset".into());
        Ok(())
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        self.events.push("endDTD".into());
        Ok(())
    }

    fn start_element(&mut self, name: &str, attributes: &[SaxAttribute]) -> Result<(), XmlError> {
        let attrs: Vec<String> = attributes
            .iter()
            .map(|a| {
                format!(
                    "{}={:?}{}{}",
                    a.name,
                    a.value,
                    if a.specified { "" } else { "(default)" },
                    a.lexical
                        .as_deref()
                        .map(|l| format!("[{l}]"))
                        .unwrap_or_default()
                )
            })
            .collect();
        self.events
            .push(format!("startElement {name} {}", attrs.join(" ")));
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), XmlError> {
        self.events.push(format!("endElement {name}"));
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        self.events.push(format!("characters {text:?}"));
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XmlError> {
        self.events.push(format!("ignorable {text:?}"));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.events.push(format!("comment {text:?}"));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.events.push(format!("pi {target} {data:?}"));
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        self.events.push("startCDATA".into());
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        self.events.push("endCDATA".into());
        Ok(())
    }

    fn skipped_entity(&mut self, name: &str) -> Result<(), XmlError> {
        self.events.push(format!("skippedEntity {name}"));
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        self.events.push("endDocument".into());
        Ok(())
    }
}

fn kind_of(err: XmlError) -> ParseErrorKind {
    err.parse_kind().expect("expected a parse error")
}

#[test]
fn full_event_stream() {
    let events = Recorder::scan(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <!DOCTYPE doc [<!ELEMENT doc ANY>]>\
         <!-- hi --><doc a=\"1\"><child/>text<![CDATA[1<2]]></doc><?done?>",
    )
    .unwrap();
    assert_eq!(
        events,
        vec![
            "startDocument",
            "xmlDecl 1.0 UTF-8 -",
            "startDTD doc - -",
            "internalSubset",
            "endDTD",
            "comment \" hi \"",
            "startElement doc a=\"1\"",
            "startElement child ",
            "endElement child",
            "characters \"text\"",
            "startCDATA",
            "characters \"1<2\"",
            "endCDATA",
            "endElement doc",
            "pi done \"\"",
            "endDocument",
        ]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>()
    );
}

#[test]
fn trailing_pi_comes_before_end_document() {
    // Events after the root close still arrive in document order; the
    // previous test pins the full stream, this one just the tail shape.
    let events = Recorder::scan("<r/><?after?>").unwrap();
    let tail: Vec<_> = events.iter().rev().take(2).rev().collect();
    assert_eq!(tail, ["pi after \"\"", "endDocument"]);
}

#[test]
fn attribute_quotes_are_symmetric() {
    let events = Recorder::scan(r#"<r a="x'y" b='x"y'/>"#).unwrap();
    assert!(events.contains(&"startElement r a=\"x'y\" b=\"x\\\"y\"".to_string()));
}

#[test]
fn attribute_references_expand_and_keep_lexical() {
    let events = Recorder::scan(r#"<r t="A&#38;B" u="a&lt;b" v="plain"/>"#).unwrap();
    let start = events.iter().find(|e| e.starts_with("startElement")).unwrap();
    assert!(start.contains(r#"t="A&B"[A&#38;B]"#), "{start}");
    assert!(start.contains(r#"u="a<b"[a&lt;b]"#), "{start}");
    assert!(start.contains(r#"v="plain""#) && !start.contains("plain]"), "{start}");
}

#[test]
fn attribute_whitespace_normalizes_to_spaces() {
    let events = Recorder::scan("<r a=\"x\n\ty\"/>").unwrap();
    assert!(events.contains(&"startElement r a=\"x  y\"[x\n\ty]".to_string()));
}

#[test]
fn character_reference_whitespace_survives_normalization() {
    let events = Recorder::scan(r#"<r a="x&#9;y"/>"#).unwrap();
    assert!(events.contains(&"startElement r a=\"x\\ty\"[x&#9;y]".to_string()));
}

#[test]
fn duplicate_attribute_is_rejected() {
    let err = Recorder::scan(r#"<r a="1" a="2"/>"#).unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::DuplicateAttribute);
}

#[test]
fn unterminated_constructs() {
    assert_eq!(
        kind_of(Recorder::scan("<r><!-- oops</r>").unwrap_err()),
        ParseErrorKind::UnterminatedComment
    );
    assert_eq!(
        kind_of(Recorder::scan("<r><?pi data</r>").unwrap_err()),
        ParseErrorKind::UnterminatedPi
    );
    assert_eq!(
        kind_of(Recorder::scan("<r><![CDATA[abc</r>").unwrap_err()),
        ParseErrorKind::UnterminatedCdata
    );
}

#[test]
fn mismatched_end_tag() {
    let err = Recorder::scan("<a><b></a></b>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::UnmatchedEndTag);
}

#[test]
fn unsupported_version() {
    let err = Recorder::scan("<?xml version=\"2.0\"?><r/>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::UnsupportedVersion);
}

#[test]
fn version_1_1_is_accepted() {
    let events = Recorder::scan("<?xml version=\"1.1\"?><r/>").unwrap();
    assert!(events.contains(&"xmlDecl 1.1 - -".to_string()));
}

#[test]
fn cdata_end_marker_in_content_is_illegal() {
    let err = Recorder::scan("<r>a]]>b</r>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::IllegalChar);
    // A bare "]]" is fine.
    assert!(Recorder::scan("<r>a]]b</r>").is_ok());
}

#[test]
fn internal_subset_drives_entities_and_defaults() {
    let events = Recorder::scan(
        "<!DOCTYPE doc [\
           <!ELEMENT doc (item)>\
           <!ELEMENT item EMPTY>\
           <!ATTLIST item kind CDATA \"plain\">\
           <!ENTITY greet \"hello &amp; welcome\">\
         ]>\
         <doc>\n  <item/>\n</doc>",
    )
    .unwrap();
    // White space between children of an element declared with element
    // content is reported as ignorable.
    assert!(events.contains(&"ignorable \"\\n  \"".to_string()), "{events:?}");
    assert!(events.contains(&"startElement item kind=\"plain\"(default)".to_string()));
}

#[test]
fn entity_expansion_in_content() {
    let events = Recorder::scan(
        "<!DOCTYPE d [<!ENTITY who \"world\"><!ENTITY hi \"hello &who;\">]>\
         <d>&hi;!</d>",
    )
    .unwrap();
    assert!(events.contains(&"characters \"hello world!\"".to_string()), "{events:?}");
}

#[test]
fn undeclared_entity_is_skipped() {
    let events = Recorder::scan("<d>a&nope;b</d>").unwrap();
    assert_eq!(
        events,
        vec![
            "startDocument",
            "startElement d ",
            "characters \"a\"",
            "skippedEntity nope",
            "characters \"b\"",
            "endElement d",
            "endDocument",
        ]
    );
}

#[test]
fn empty_document_has_no_root() {
    assert!(matches!(
        Recorder::scan("").unwrap_err(),
        XmlError::Structural(_)
    ));
    assert!(matches!(
        Recorder::scan("<?xml version=\"1.0\"?><!-- only prolog -->").unwrap_err(),
        XmlError::Structural(_)
    ));
}

#[test]
fn second_root_element_is_structural() {
    assert!(matches!(
        Recorder::scan("<a/><b/>").unwrap_err(),
        XmlError::Structural(_)
    ));
}

#[test]
fn self_closing_root_produces_paired_events() {
    let events = Recorder::scan("<r/>").unwrap();
    assert_eq!(
        events,
        vec!["startDocument", "startElement r ", "endElement r", "endDocument"]
    );
}

#[test]
fn crlf_normalizes_to_lf() {
    let events = Recorder::scan("<r>a\r\nb\rc</r>").unwrap();
    assert!(events.contains(&"characters \"a\\nb\\nc\"".to_string()), "{events:?}");
}

#[test]
fn double_hyphen_inside_comment_is_illegal() {
    let err = Recorder::scan("<r><!-- a -- b --></r>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::IllegalChar);
}

#[test]
fn pi_target_xml_is_reserved() {
    let err = Recorder::scan("<r><?xml version=\"1.0\"?></r>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::MalformedDecl);
}

#[test]
fn doctype_with_external_id() {
    let events =
        Recorder::scan("<!DOCTYPE doc PUBLIC \"-//X//DTD\" \"http://example/x.dtd\"><doc/>")
            .unwrap();
    assert!(events.contains(&"startDTD doc -//X//DTD http://example/x.dtd".to_string()));
}

#[test]
fn markup_in_attribute_value_is_illegal() {
    let err = Recorder::scan("<r a=\"1<2\"/>").unwrap_err();
    assert_eq!(kind_of(err), ParseErrorKind::IllegalChar);
}
