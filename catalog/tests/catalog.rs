use std::fs;
use std::path::Path;

use grove_catalog::{Catalog, CatalogError};

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn public_then_system_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let dtd = write(dir.path(), "x.dtd", "<!ELEMENT x EMPTY>");
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog">
                 <public publicId="-//X//DTD" uri="{dtd}"/>
               </catalog>"#
        ),
    );
    let catalog = Catalog::load(&catalog_file).unwrap();

    // The public identifier wins when it is mapped.
    assert_eq!(
        catalog.resolve_entity(Some("-//X//DTD"), Some("http://example/x.dtd")),
        Some(dtd.clone())
    );
    // Without a public match, the system identifier falls back to the
    // basename table seeded by the .dtd mapping.
    assert_eq!(
        catalog.resolve_entity(Some("-//Other//DTD"), Some("http://example/x.dtd")),
        Some(dtd.clone())
    );
    assert_eq!(catalog.resolve_entity(Some("-//Other//DTD"), Some("y.dtd")), None);
}

#[test]
fn system_and_uri_entries() {
    let dir = tempfile::tempdir().unwrap();
    let schema = write(dir.path(), "po.xsd", "<schema/>");
    let dtd = write(dir.path(), "doc.dtd", "<!ELEMENT doc ANY>");
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog>
                 <system systemId="http://example/doc.dtd" uri="{dtd}"/>
                 <uri name="http://example/po.xsd" uri="{schema}"/>
               </catalog>"#
        ),
    );
    let catalog = Catalog::load(&catalog_file).unwrap();

    assert_eq!(catalog.match_system("http://example/doc.dtd"), Some(dtd));
    assert_eq!(catalog.match_uri("http://example/po.xsd"), Some(schema));
    assert_eq!(catalog.match_uri("http://example/other.xsd"), None);
}

#[test]
fn missing_files_are_not_mapped() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        r#"<catalog>
             <system systemId="http://example/ghost.dtd" uri="ghost.dtd"/>
           </catalog>"#,
    );
    let catalog = Catalog::load(&catalog_file).unwrap();
    assert_eq!(catalog.match_system("http://example/ghost.dtd"), None);
}

#[test]
fn rewrites_apply_in_order_first_prefix_wins() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        r#"<catalog>
             <rewriteSystem systemIdStartString="http://example/dtds/" rewritePrefix="/local/dtds/"/>
             <rewriteSystem systemIdStartString="http://example/" rewritePrefix="/local/other/"/>
             <rewriteURI uriStartString="http://example/schemas/" rewritePrefix="/local/xsd/"/>
           </catalog>"#,
    );
    let catalog = Catalog::load(&catalog_file).unwrap();

    assert_eq!(
        catalog.match_system("http://example/dtds/x.dtd"),
        Some("/local/dtds/x.dtd".into())
    );
    assert_eq!(
        catalog.match_system("http://example/misc/y.dtd"),
        Some("/local/other/misc/y.dtd".into())
    );
    assert_eq!(
        catalog.match_uri("http://example/schemas/po.xsd"),
        Some("/local/xsd/po.xsd".into())
    );
}

#[test]
fn urn_public_ids_unwrap_before_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let dtd = write(dir.path(), "cat.dtd", "<!ELEMENT c EMPTY>");
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog>
                 <public publicId="urn:publicid:-:X:DTD+Cat:EN" uri="{dtd}"/>
               </catalog>"#
        ),
    );
    let catalog = Catalog::load(&catalog_file).unwrap();
    assert_eq!(catalog.match_public("-//X//DTD Cat//EN"), Some(dtd.clone()));
    assert_eq!(
        catalog.match_public("urn:publicid:-:X:DTD+Cat:EN"),
        Some(dtd)
    );
}

#[test]
fn next_catalog_merges_with_existing_entries_winning() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "first.dtd", "<!ELEMENT a EMPTY>");
    let second = write(dir.path(), "second.dtd", "<!ELEMENT b EMPTY>");
    write(
        dir.path(),
        "more.xml",
        &format!(
            r#"<catalog>
                 <public publicId="-//Shared//DTD" uri="{second}"/>
                 <public publicId="-//Extra//DTD" uri="{second}"/>
                 <nextCatalog catalog="catalog.xml"/>
               </catalog>"#
        ),
    );
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        &format!(
            r#"<catalog>
                 <public publicId="-//Shared//DTD" uri="{first}"/>
                 <nextCatalog catalog="more.xml"/>
               </catalog>"#
        ),
    );
    let catalog = Catalog::load(&catalog_file).unwrap();

    // First-loaded wins, the nextCatalog cycle terminates, and new
    // entries from the linked catalog are merged in.
    assert_eq!(catalog.match_public("-//Shared//DTD"), Some(first));
    assert_eq!(catalog.match_public("-//Extra//DTD"), Some(second));
}

#[test]
fn xml_base_changes_resolution_for_its_subtree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let inner = write(&dir.path().join("sub"), "inner.dtd", "<!ELEMENT i EMPTY>");
    let outer = write(dir.path(), "outer.dtd", "<!ELEMENT o EMPTY>");
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        r#"<catalog>
             <group xml:base="sub">
               <system systemId="http://example/inner.dtd" uri="inner.dtd"/>
             </group>
             <system systemId="http://example/outer.dtd" uri="outer.dtd"/>
           </catalog>"#,
    );
    let catalog = Catalog::load(&catalog_file).unwrap();

    assert_eq!(catalog.match_system("http://example/inner.dtd"), Some(inner));
    assert_eq!(catalog.match_system("http://example/outer.dtd"), Some(outer));
}

#[test]
fn non_catalog_root_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_file = write(dir.path(), "catalog.xml", "<not-a-catalog/>");
    assert!(matches!(
        Catalog::load(&catalog_file),
        Err(CatalogError::NotACatalog { .. })
    ));
}

#[test]
fn missing_required_attribute_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_file = write(
        dir.path(),
        "catalog.xml",
        r#"<catalog><public publicId="-//X//DTD"/></catalog>"#,
    );
    assert!(matches!(
        Catalog::load(&catalog_file),
        Err(CatalogError::MissingAttribute { .. })
    ));
}
