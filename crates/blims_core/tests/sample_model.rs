use blims_core::{
    parse_human_code, HumanCodeCounter, InMemorySampleRepository, Lineage, MetadataValue,
    RepoError, Sample, SampleRepository,
};
use serde_json::json;
use uuid::Uuid;

#[test]
fn sample_serializes_with_api_field_names() {
    let mut sample = Sample::with_id(Uuid::from_u128(1), "Blood Sample A", "Blood", "System");
    sample.human_code = "s1".to_string();
    sample.add_metadata("volume_ml", 5);
    sample.add_metadata("test_data", true);
    sample.add_file("/data/a.pdf");
    sample.barcode = Some("BLOOD001".to_string());

    let value = serde_json::to_value(&sample).unwrap();

    assert_eq!(value["sample_id"], "s1");
    assert!(value.get("human_code").is_none());
    assert_eq!(value["id"], "00000000-0000-0000-0000-000000000001");
    assert_eq!(value["metadata"]["volume_ml"], 5);
    assert_eq!(value["metadata"]["test_data"], true);
    assert_eq!(value["file_paths"], json!(["/data/a.pdf"]));
    assert_eq!(value["container_id"], serde_json::Value::Null);
    assert_eq!(value["is_container"], false);
    assert!(value["created_at"].as_str().unwrap().contains('T'));
}

#[test]
fn sample_deserializes_with_defaults_for_missing_collections() {
    let raw = json!({
        "id": "00000000-0000-0000-0000-000000000007",
        "sample_id": "s7",
        "name": "Tube",
        "sample_type": "Blood",
        "created_by": "alice",
        "created_at": "2025-02-28T10:00:00Z"
    });

    let sample: Sample = serde_json::from_value(raw).unwrap();
    assert_eq!(sample.human_code, "s7");
    assert!(sample.metadata.is_empty());
    assert!(sample.parent_ids.is_empty());
    assert!(!sample.is_container);
    assert_eq!(sample.container_id, None);
    assert!(sample.validate().is_ok());
}

#[test]
fn metadata_values_keep_their_json_types() {
    let mut sample = Sample::new("Extract", "DNA", "alice");
    sample.add_metadata("concentration_ng_ul", 25.6);
    sample.add_metadata("cycles", 30);
    sample.add_metadata("primer_set", "16S-V4");
    sample.add_metadata("note", MetadataValue::Null);

    let text = serde_json::to_string(&sample).unwrap();
    let back: Sample = serde_json::from_str(&text).unwrap();

    assert_eq!(back, sample);
    assert_eq!(
        back.metadata_value("concentration_ng_ul"),
        Some(&MetadataValue::Float(25.6))
    );
    assert_eq!(back.metadata_value("cycles"), Some(&MetadataValue::Int(30)));
    assert_eq!(back.metadata_value("note"), Some(&MetadataValue::Null));
}

#[test]
fn lineage_serializes_as_two_lists() {
    let lineage = Lineage {
        ancestors: Vec::new(),
        descendants: Vec::new(),
    };
    assert_eq!(
        serde_json::to_value(&lineage).unwrap(),
        json!({"ancestors": [], "descendants": []})
    );
}

#[test]
fn human_code_parsing() {
    assert_eq!(parse_human_code("s42"), Some(("s", 42)));
    assert_eq!(parse_human_code("box7"), Some(("box", 7)));
    assert_eq!(parse_human_code("s-1"), None);
    assert_eq!(parse_human_code("42"), None);

    let counter = HumanCodeCounter::new("s");
    assert_eq!(counter.number_of("s9"), Some(9));
    assert_eq!(counter.number_of("box9"), None);
}

#[test]
fn store_rejects_edits_to_fixed_fields() {
    let mut repo = InMemorySampleRepository::new();
    let stored = repo
        .create_sample(Sample::container("Box", "Box", "alice"))
        .unwrap();

    let mut edited = stored.clone();
    edited.is_container = false;
    assert_eq!(
        repo.update_sample(&edited).unwrap_err(),
        RepoError::ImmutableField {
            id: stored.id,
            field: "is_container",
        }
    );

    let mut edited = stored.clone();
    edited.human_code = "s99".to_string();
    assert!(matches!(
        repo.update_sample(&edited),
        Err(RepoError::ImmutableField {
            field: "human_code",
            ..
        })
    ));
    assert_eq!(repo.get_sample(stored.id).unwrap(), stored);
}
