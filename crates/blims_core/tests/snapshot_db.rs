use blims_core::db::{load_snapshot, open_db, open_db_in_memory, save_snapshot, SnapshotError};
use blims_core::{
    InMemorySampleRepository, NewSample, SampleRepository, SampleService, SequentialSampleIds,
};

fn seeded_service() -> SampleService<InMemorySampleRepository> {
    let mut service = SampleService::new(InMemorySampleRepository::new())
        .with_id_supplier(SequentialSampleIds::starting_at(1));
    let blood = service
        .create_sample(
            NewSample::new("Blood Sample A", "Blood", "System")
                .with_metadata("volume_ml", 5)
                .with_metadata("concentration", 25.6)
                .with_barcode("BLOOD001"),
        )
        .unwrap();
    let dna = service
        .derive_sample(blood.id, NewSample::new("DNA Extract", "DNA", "System"))
        .unwrap();
    let plate = service
        .create_sample(NewSample::new("96-well Plate", "Plate", "System").as_container())
        .unwrap();
    let boxed = service
        .create_sample(NewSample::new("Storage Box", "Box", "System").as_container())
        .unwrap();
    service.add_to_container(dna.id, plate.id).unwrap();
    service.add_to_container(plate.id, boxed.id).unwrap();
    service.add_file(dna.id, "/data/qc.pdf").unwrap();
    service
}

#[test]
fn save_then_load_preserves_every_sample() {
    let service = seeded_service();
    let mut conn = open_db_in_memory().unwrap();

    let summary = save_snapshot(&mut conn, service.repo()).unwrap();
    assert_eq!(summary.samples, 4);
    assert_eq!(summary.next_code_number, 5);

    let loaded = load_snapshot(&conn, "s").unwrap();
    assert_eq!(loaded.get_all(), service.repo().get_all());
    assert_eq!(loaded.next_code_number(), 5);
    assert_eq!(loaded.get_sample_by_code("s2").unwrap().name, "DNA Extract");
}

#[test]
fn loaded_store_keeps_working_and_does_not_reuse_codes() {
    let mut service = seeded_service();
    let doomed = service
        .create_sample(NewSample::new("Scratch", "Blood", "System"))
        .unwrap();
    assert_eq!(doomed.human_code, "s5");
    service.delete_sample(doomed.id).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blims.db");
    let mut conn = open_db(&path).unwrap();
    save_snapshot(&mut conn, service.repo()).unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    let repo = load_snapshot(&conn, "s").unwrap();
    let mut service = SampleService::new(repo).with_id_supplier(SequentialSampleIds::starting_at(100));

    let fresh = service
        .create_sample(NewSample::new("Fresh", "Blood", "System"))
        .unwrap();
    assert_eq!(fresh.human_code, "s6");
    assert!(service.check_integrity().is_empty());
}

#[test]
fn load_rejects_snapshot_breaking_link_invariants() {
    let service = seeded_service();
    let mut conn = open_db_in_memory().unwrap();
    save_snapshot(&mut conn, service.repo()).unwrap();

    conn.execute(
        "UPDATE samples SET child_ids_json = '[]' WHERE human_code = 's1';",
        [],
    )
    .unwrap();

    match load_snapshot(&conn, "s").unwrap_err() {
        SnapshotError::Integrity(violations) => assert_eq!(violations.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn codes_with_foreign_prefix_do_not_move_counter() {
    let service = seeded_service();
    let mut conn = open_db_in_memory().unwrap();
    save_snapshot(&mut conn, service.repo()).unwrap();

    conn.execute(
        "UPDATE samples SET human_code = 'x' || human_code WHERE human_code = 's3';",
        [],
    )
    .unwrap();
    let loaded = load_snapshot(&conn, "s").unwrap();
    assert!(loaded.get_sample_by_code("xs3").is_some());
    assert_eq!(loaded.next_code_number(), 5);
}
