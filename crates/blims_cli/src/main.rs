//! CLI demo entry point.
//!
//! # Responsibility
//! - Seed a small sample inventory through `blims_core`.
//! - Print lineage and container hierarchy as JSON.
//! - Optionally save the seeded store to a SQLite snapshot (`blims_cli <db>`).

use blims_core::db::{open_db, save_snapshot};
use blims_core::{
    init_logging, load_config_from_env, InMemorySampleRepository, LimsConfig,
    NewSample, SampleService, SequentialSampleIds,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

struct Seeded {
    blood: blims_core::SampleId,
    box_container: blims_core::SampleId,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("blims_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = load_config_from_env()?;
    init_logging(&config)?;

    let mut service = service_for(&config);
    let seeded = seed_inventory(&mut service)?;

    let lineage = service.get_lineage(seeded.blood)?;
    println!("{}", serde_json::to_string_pretty(&lineage)?);
    let hierarchy = service.get_container_hierarchy(seeded.box_container)?;
    println!("{}", serde_json::to_string_pretty(&hierarchy)?);

    let violations = service.check_integrity();
    if !violations.is_empty() {
        return Err(format!("seeded inventory breaks {} invariant(s)", violations.len()).into());
    }

    if let Some(path) = std::env::args().nth(1) {
        let mut conn = open_db(&path)?;
        let summary = save_snapshot(&mut conn, service.repo())?;
        println!("saved {} samples to {path}", summary.samples);
    }
    Ok(())
}

fn service_for(config: &LimsConfig) -> SampleService<InMemorySampleRepository> {
    let repo = InMemorySampleRepository::with_prefix(config.human_code_prefix.clone());
    SampleService::with_config(repo, config).with_id_supplier(SequentialSampleIds::starting_at(1))
}

fn seed_inventory(
    service: &mut SampleService<InMemorySampleRepository>,
) -> Result<Seeded, Box<dyn Error>> {
    let blood = service.create_sample(
        NewSample::new("Blood Sample A", "Blood", "System")
            .with_metadata("source", "Patient 12345")
            .with_metadata("collection_date", "2025-02-28")
            .with_metadata("volume_ml", 5)
            .with_metadata("test_data", true)
            .with_barcode("BLOOD001"),
    )?;
    let tissue = service.create_sample(
        NewSample::new("Tissue Sample B", "Tissue", "System")
            .with_metadata("source", "Patient 67890")
            .with_metadata("collection_date", "2025-02-27")
            .with_metadata("tissue_type", "Liver")
            .with_metadata("test_data", true)
            .with_barcode("TISSUE001"),
    )?;
    let dna = service.derive_sample(
        blood.id,
        NewSample::new("DNA Extract from Sample A", "DNA", "System")
            .with_metadata("extraction_method", "Column")
            .with_metadata("concentration_ng_ul", 25.6)
            .with_metadata("test_data", true)
            .with_barcode("DNA001"),
    )?;
    let plate = service.create_sample(
        NewSample::new("96-well Plate X", "Plate", "System")
            .with_metadata("plate_type", "96-well PCR")
            .with_metadata("manufacturer", "LabCorp")
            .with_metadata("test_data", true)
            .with_barcode("PLATE001")
            .as_container(),
    )?;
    let box_container = service.create_sample(
        NewSample::new("Sample Storage Box Y", "Box", "System")
            .with_metadata("box_type", "Freezer Box")
            .with_metadata("capacity", "81 tubes")
            .with_metadata("test_data", true)
            .with_barcode("BOX001")
            .as_container(),
    )?;
    let pcr = service.create_sample(
        NewSample::new("PCR Product C", "PCR", "System")
            .with_metadata("primer_set", "16S-V4")
            .with_metadata("cycles", 30)
            .with_metadata("test_data", true)
            .with_barcode("PCR001"),
    )?;

    service.add_to_container(pcr.id, plate.id)?;
    service.add_to_container(plate.id, box_container.id)?;
    service.add_file(dna.id, "/data/sequencing/dna_sample_qc.pdf")?;
    service.add_file(pcr.id, "/data/pcr/gel_image.png")?;
    service.add_metadata(blood.id, "stored_at", "-80C")?;
    service.add_metadata(tissue.id, "fixation", "Formalin")?;

    info!(
        "event=seed_inventory module=cli status=ok samples={}",
        service.count()
    );
    Ok(Seeded {
        blood: blood.id,
        box_container: box_container.id,
    })
}
