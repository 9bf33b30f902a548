use depoline_core::{MigrationRecord, RecordDescriptor};
use depoline_matching::similarity::{Fingerprint, score};
use depoline_matching::{CandidateRecord, LocalRegistry, MatchingConfig, MatchingEngine, RegistryEntry, Weights};

fn synthetic_registry(n: usize) -> LocalRegistry {
    LocalRegistry::new(
        (0..n)
            .map(|i| RegistryEntry {
                record_id: Some(format!("rec-{i}")),
                candidate: CandidateRecord {
                    identifier: Some(i.to_string()),
                    title: format!("North Pacific sea surface temperature survey {i}"),
                    abstract_text: Some(format!("Gridded monthly observations, cruise {i}")),
                    creators: vec![format!("Observer {}", i % 17), "PICES Secretariat".into()],
                    ..CandidateRecord::default()
                },
            })
            .collect(),
    )
}

#[divan::bench]
fn score_pair() -> f64 {
    let weights = Weights::default();
    let a = Fingerprint::new(
        "Bering Sea zooplankton biomass 1995-2010",
        Some("Net tow biomass estimates from summer cruises"),
        &["Smith, J.".to_string(), "Doe, A.".to_string()],
    );
    let b = Fingerprint::new(
        "Zooplankton biomass in the Bering Sea, 1995 to 2010",
        Some("Biomass estimates from summer net tows"),
        &["Smith, J.".to_string()],
    );
    score(divan::black_box(&a), divan::black_box(&b), &weights).0
}

#[divan::bench(args = [100, 1000, 5000])]
fn find_candidates_local(bencher: divan::Bencher, n: usize) {
    let engine = MatchingEngine::new(
        MatchingConfig::default().validated().unwrap(),
        synthetic_registry(n),
    );
    let mut record = MigrationRecord::new("probe");
    record.descriptor = Some(RecordDescriptor {
        title: "North Pacific sea surface temperature survey 42".into(),
        abstract_text: Some("Gridded monthly observations, cruise 42".into()),
        creators: vec!["Observer 8".into()],
        ..RecordDescriptor::default()
    });
    bencher.bench(|| engine.find_candidates(divan::black_box(&record)));
}

fn main() {
    divan::main();
}
