//! Save/load round trips of a fitted ensemble.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use cobra_ensemble::{Cobra, CobraConfig, CobraError, Dataset, Preset};

fn make_classification(seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let features = (0..90)
        .map(|i| {
            let class = i % 3;
            (0..4)
                .map(|f| {
                    let base = if f == class { 3.0 } else { 0.0 };
                    base + rng.r#gen::<f64>() * 0.5
                })
                .collect()
        })
        .collect();
    let labels = (0..90).map(|i| i % 3).collect();
    Dataset::new(features, labels).unwrap()
}

#[test]
fn round_trip_identical_predictions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cobra_model.bin");

    let ds = make_classification(42);
    let mut cobra: Cobra = Cobra::new(CobraConfig::new().with_preset(Preset::Advanced));
    cobra.fit(&ds).unwrap();
    cobra.save(&path).unwrap();

    let loaded: Cobra = Cobra::load(&path).unwrap();
    assert_eq!(loaded.machine_names(), cobra.machine_names());
    assert_eq!(loaded.agreement(), cobra.agreement());
    assert_eq!(loaded.config(), cobra.config());

    let queries = make_classification(7).features().to_vec();
    assert_eq!(
        loaded.predict_with_info(&queries, None).unwrap(),
        cobra.predict_with_info(&queries, None).unwrap()
    );
    assert_eq!(
        loaded.predict_proba_batch(&queries).unwrap(),
        cobra.predict_proba_batch(&queries).unwrap()
    );
}

#[test]
fn stale_agreement_state_survives_round_trip() {
    let ds = make_classification(1);
    let mut cobra: Cobra = Cobra::new(CobraConfig::new());
    cobra.split_data(&ds).unwrap();
    cobra.load_default().unwrap();

    let loaded: Cobra = Cobra::from_bytes(&cobra.to_bytes().unwrap()).unwrap();
    assert!(loaded.agreement().is_none());
    assert!(matches!(
        loaded.predict_one(&[0.0; 4], None),
        Err(CobraError::AgreementNotBuilt)
    ));
}

#[test]
fn load_nonexistent_file_error() {
    let dir = TempDir::new().unwrap();
    let err = Cobra::<cobra_machines::Machine>::load(dir.path().join("missing.bin")).unwrap_err();
    assert!(matches!(err, CobraError::ReadModel { .. }));
}

#[test]
fn load_corrupt_file_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.bin");
    std::fs::write(&path, b"not a valid bincode file").unwrap();
    let err = Cobra::<cobra_machines::Machine>::load(&path).unwrap_err();
    assert!(matches!(
        err,
        CobraError::DeserializeModel { .. } | CobraError::IncompatibleModelVersion { .. }
    ));
}
