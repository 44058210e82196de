use std::path::{Path, PathBuf};

use anyhow::Result;
use leigraph_core::entity::Fragment;
use leigraph_core::fragments::FragmentWriter;
use leigraph_core::mapping::{Mapper, MappingError, MappingTable};
use leigraph_core::pipeline::map_file;
use leigraph_parser::{open_source, ReaderOptions, RecordKind, SourceRecord};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../leigraph-parser/tests/data")
        .join(name)
}

fn map_fixture(mapper: &Mapper, name: &str, kind: RecordKind) -> Result<Vec<Vec<Fragment>>> {
    let mut mapped = Vec::new();
    for record in open_source(&fixture(name), &ReaderOptions::for_kind(kind))? {
        mapped.push(mapper.map(&record?)?);
    }
    Ok(mapped)
}

fn find<'a>(fragments: &'a [Fragment], key: &str) -> &'a Fragment {
    fragments
        .iter()
        .find(|fragment| fragment.key().as_str() == key)
        .unwrap_or_else(|| panic!("no fragment keyed {key}"))
}

#[test]
fn registration_record_maps_to_organization_addresses_and_identification() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let mapped = map_fixture(&mapper, "lei_records.xml", RecordKind::Registration)?;
    assert_eq!(mapped.len(), 2);

    let first = &mapped[0];
    let schemata: Vec<&str> = first.iter().map(Fragment::schema).collect();
    assert_eq!(
        schemata,
        vec!["Organization", "Address", "Address", "Identification"]
    );

    let org = find(first, "lei-5493001KJTIIGC8Y1R12")
        .as_entity()
        .expect("organization is an entity");
    assert_eq!(org.first("name"), Some("Bloomberg Finance L.P."));
    assert_eq!(
        org.values("alias"),
        &["Bloomberg".to_string(), "Bloomberg L.P. & Co".to_string()]
    );
    assert_eq!(org.first("jurisdiction"), Some("us"));
    assert_eq!(org.first("status"), Some("active"));
    assert_eq!(org.first("incorporationDate"), Some("1993-09-28"));
    assert_eq!(
        org.values("legalForm"),
        &["LIMITED PARTNERSHIP".to_string(), "T91T".to_string()]
    );
    assert_eq!(org.first("addressEntity"), Some("addr-legal-5493001KJTIIGC8Y1R12"));

    let address = find(first, "addr-legal-5493001KJTIIGC8Y1R12")
        .as_entity()
        .expect("address is an entity");
    assert_eq!(
        address.first("full"),
        Some("731 Lexington Avenue, New York, US-NY, 10022, US")
    );
    assert_eq!(address.first("country"), Some("us"));

    let identification = find(first, "regid-5493001KJTIIGC8Y1R12")
        .as_entity()
        .expect("identification is an entity");
    assert_eq!(identification.first("number"), Some("2386365"));
    assert_eq!(
        identification.first("holder"),
        Some("lei-5493001KJTIIGC8Y1R12")
    );
    Ok(())
}

#[test]
fn successor_lei_becomes_a_succession_relationship() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let mapped = map_fixture(&mapper, "lei_records.xml", RecordKind::Registration)?;
    let second = &mapped[1];

    let org = find(second, "lei-213800ABCDEFGHIJ1234")
        .as_entity()
        .expect("organization is an entity");
    assert_eq!(org.first("name"), Some("Muster & Söhne GmbH"));
    assert_eq!(org.first("registrationStatus"), Some("retired"));
    assert!(org.first("incorporationDate").is_none());
    assert!(second
        .iter()
        .all(|fragment| fragment.schema() != "Identification"));

    let succession = find(
        second,
        "succession-213800ABCDEFGHIJ1234-5493001KJTIIGC8Y1R12",
    )
    .as_relationship()
    .expect("succession is a relationship");
    assert_eq!(succession.source.as_str(), "lei-213800ABCDEFGHIJ1234");
    assert_eq!(succession.target.as_str(), "lei-5493001KJTIIGC8Y1R12");
    assert_eq!(succession.label, "successor");
    Ok(())
}

#[test]
fn relationship_records_point_from_parent_to_child() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let mapped = map_fixture(&mapper, "relationship_records.xml", RecordKind::Relationship)?;
    assert_eq!(mapped.len(), 2);

    let consolidation = mapped[0][0]
        .as_relationship()
        .expect("relationship fragment");
    assert!(consolidation.id.as_str().starts_with("rel-"));
    assert_eq!(consolidation.id.as_str().len(), "rel-".len() + 64);
    assert_eq!(consolidation.source.as_str(), "lei-5493001KJTIIGC8Y1R12");
    assert_eq!(consolidation.target.as_str(), "lei-213800ABCDEFGHIJ1234");
    assert_eq!(consolidation.label, "direct_parent");
    assert_eq!(
        consolidation.properties.get("startDate"),
        Some(&vec!["2018-01-01".to_string(), "2012-06-06".to_string()])
    );
    assert_eq!(consolidation.first("endDate"), Some("2018-12-31"));
    assert_eq!(consolidation.first("status"), Some("active"));

    let branch = mapped[1][0].as_relationship().expect("relationship fragment");
    assert_eq!(branch.label, "branch");
    assert_eq!(branch.target.as_str(), "lei-984500AAAABBBBCCCC99");
    assert_ne!(branch.id, consolidation.id);
    Ok(())
}

#[test]
fn xml_and_csv_sources_yield_the_same_keys() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let keys = |mapped: Vec<Vec<Fragment>>| -> Vec<String> {
        mapped
            .iter()
            .map(|fragments| fragments[0].key().to_string())
            .collect()
    };

    let from_xml = keys(map_fixture(&mapper, "lei_records.xml", RecordKind::Registration)?);
    let from_csv = keys(map_fixture(&mapper, "lei_records.csv", RecordKind::Registration)?);
    assert_eq!(from_xml, from_csv);
    Ok(())
}

#[test]
fn unknown_source_fields_are_dropped() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let mapped = map_fixture(&mapper, "lei_records.csv", RecordKind::Registration)?;

    for fragment in mapped.iter().flatten() {
        let properties = match fragment {
            Fragment::Entity(entity) => &entity.properties,
            Fragment::Relationship(relationship) => &relationship.properties,
        };
        assert!(properties
            .values()
            .flatten()
            .all(|value| value != "ignored"));
    }
    Ok(())
}

#[test]
fn mapping_twice_produces_identical_output() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let run = || -> Result<Vec<u8>> {
        let options = ReaderOptions::for_kind(RecordKind::Registration);
        let mut writer = FragmentWriter::new(Vec::new(), "memory");
        map_file(&fixture("lei_records.xml"), &options, &mapper, &mut writer)?;
        let (bytes, _) = writer.into_inner()?;
        Ok(bytes)
    };

    let first = run()?;
    let second = run()?;
    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn fragments_from_the_same_identifier_share_a_key() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let record = SourceRecord::new(RecordKind::Registration, 1)
        .with("LEI", "LEI1")
        .with("Entity.LegalName", "Acme Corp");
    let renamed = SourceRecord::new(RecordKind::Registration, 7)
        .with("LEI", "LEI1")
        .with("Entity.LegalName", "Acme Corporation");

    let first = mapper.map(&record)?;
    let second = mapper.map(&renamed)?;
    assert_eq!(first[0].key(), second[0].key());
    assert_eq!(first[0].key().as_str(), "lei-LEI1");
    Ok(())
}

#[test]
fn missing_identifier_is_a_mapping_error() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let record = SourceRecord::new(RecordKind::Registration, 3)
        .with("Entity.LegalName", "Nameless Holdings");

    let err = mapper.map(&record).expect_err("record without LEI must fail");
    match err {
        MappingError::MissingField { ordinal, field, .. } => {
            assert_eq!(ordinal, 3);
            assert_eq!(field, "LEI");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn missing_relationship_type_is_a_mapping_error() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let record = SourceRecord::new(RecordKind::Relationship, 1)
        .with("Relationship.StartNode.NodeID", "LEI2")
        .with("Relationship.EndNode.NodeID", "LEI1");

    let err = mapper.map(&record).expect_err("edge without a type must fail");
    assert!(matches!(err, MappingError::MissingField { .. }));
    Ok(())
}

#[test]
fn invalid_optional_values_are_dropped() -> Result<()> {
    let mapper = Mapper::gleif()?;
    let record = SourceRecord::new(RecordKind::Registration, 1)
        .with("LEI", "LEI1")
        .with("Entity.LegalName", "Acme Corp")
        .with("Entity.LegalJurisdiction", "Atlantis")
        .with("Entity.EntityCreationDate", "sometime in 1990");

    let fragments = mapper.map(&record)?;
    let org = fragments[0].as_entity().expect("organization");
    assert!(org.first("jurisdiction").is_none());
    assert!(org.first("incorporationDate").is_none());
    assert_eq!(org.first("name"), Some("Acme Corp"));
    Ok(())
}

#[test]
fn custom_table_maps_minimal_sources() -> Result<()> {
    let table = MappingTable::from_toml_str(
        r#"
        [[registration.entities]]
        schema = "Organization"
        key = { prefix = "lei", fields = ["id"] }
        properties = { name = { field = "name", required = true } }

        [[relationship.relationships]]
        schema = "Relationship"
        key = { prefix = "rel", fields = ["parent", "child", "type"] }
        source = { prefix = "lei", fields = ["parent"] }
        target = { prefix = "lei", fields = ["child"] }
        label = { field = "type", transforms = ["lowercase"] }
        "#,
    )?;
    let mapper = Mapper::new(table)?;

    let registration = map_fixture(&mapper, "minimal_registration.csv", RecordKind::Registration)?;
    let org = registration[0][0].as_entity().expect("organization");
    assert_eq!(org.id.as_str(), "lei-LEI1");
    assert_eq!(org.schema, "Organization");
    assert_eq!(org.first("name"), Some("Acme Corp"));
    assert!(org.first("comment").is_none());

    let relationships =
        map_fixture(&mapper, "minimal_relationships.csv", RecordKind::Relationship)?;
    let edge = relationships[0][0].as_relationship().expect("relationship");
    assert_eq!(edge.source.as_str(), "lei-LEI1");
    assert_eq!(edge.target.as_str(), "lei-LEI2");
    assert_eq!(edge.label, "branch");
    Ok(())
}

#[test]
fn invalid_required_value_is_a_mapping_error() -> Result<()> {
    let table = MappingTable::from_toml_str(
        r#"
        [[registration.entities]]
        schema = "Organization"
        key = { prefix = "lei", fields = ["id"] }
        properties = { founded = { field = "founded", required = true, transforms = ["date"] } }
        "#,
    )?;
    let mapper = Mapper::new(table)?;
    let record = SourceRecord::new(RecordKind::Registration, 7)
        .with("id", "LEI1")
        .with("founded", "not a date");

    let err = mapper.map(&record).expect_err("bad required date must fail");
    match err {
        MappingError::InvalidValue {
            ordinal,
            property,
            value,
            ..
        } => {
            assert_eq!(ordinal, 7);
            assert_eq!(property, "founded");
            assert_eq!(value, "not a date");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn label_mapped_to_nothing_is_a_mapping_error() -> Result<()> {
    let table = MappingTable::from_toml_str(
        r#"
        [[relationship.relationships]]
        schema = "Relationship"
        key = { prefix = "rel", fields = ["parent", "child"] }
        source = { prefix = "lei", fields = ["parent"] }
        target = { prefix = "lei", fields = ["child"] }
        label = { field = "type", map = { HIDDEN = "" } }
        "#,
    )?;
    let mapper = Mapper::new(table)?;
    let record = SourceRecord::new(RecordKind::Relationship, 2)
        .with("parent", "LEI1")
        .with("child", "LEI2")
        .with("type", "HIDDEN");

    let err = mapper.map(&record).expect_err("empty label must fail");
    assert!(
        matches!(err, MappingError::EmptyLabel { ordinal: 2, .. }),
        "unexpected error: {err}"
    );
    Ok(())
}
