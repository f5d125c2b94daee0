use std::fs;

use cycle_lstm::evaluation::Accuracy;
use cycle_lstm::{
    CycleModel, ModelMetadata, ModelPersistence, Normalizer, PersistenceError, SavedModel,
};
use tempfile::tempdir;

const WINDOW: [[f64; 2]; 3] = [[0.4, -0.2], [-1.1, 0.6], [0.0, 0.9]];

fn saved_model() -> (CycleModel, SavedModel) {
    let model = CycleModel::with_seed(5, 2, 42);
    let mut metadata = ModelMetadata::new("persistence", &model);
    metadata.total_epochs = 100;
    metadata.final_loss = Some(0.01);
    metadata.accuracy = Some(Accuracy {
        cycle_length: 0.5,
        menstruation_length: 0.75,
    });
    metadata.description = Some("round trip".to_string());

    let normalizer = Normalizer {
        mean: [28.3, 4.9],
        std: [1.7, 0.8],
    };
    let saved = SavedModel::new(&model, normalizer, metadata);
    (model, saved)
}

#[test]
fn test_json_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    let (model, saved) = saved_model();

    ModelPersistence::save(&saved, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"model_name\": \"persistence\""));

    let saved_again = ModelPersistence::load(&path).unwrap();
    let (restored, normalizer, metadata) = saved_again.into_parts().unwrap();
    assert_eq!(metadata.model_name, "persistence");
    assert_eq!(metadata.total_epochs, 100);
    assert_eq!(metadata.description.as_deref(), Some("round trip"));
    assert_eq!(restored.hidden_size(), 5);
    assert_eq!(restored.num_layers(), 2);

    let expected = model.predict(&WINDOW);
    let actual = restored.predict(&WINDOW);
    for (a, e) in actual.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-9);
    }
    assert!((normalizer.mean[0] - 28.3).abs() < 1e-12);
}

#[test]
fn test_binary_round_trip_is_exact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let (model, saved) = saved_model();

    ModelPersistence::save_to_binary(&saved, &path).unwrap();
    let binary_size = fs::metadata(&path).unwrap().len();
    ModelPersistence::save_to_json(&saved, dir.path().join("model.json")).unwrap();
    let json_size = fs::metadata(dir.path().join("model.json")).unwrap().len();
    assert!(binary_size < json_size);

    let saved_again = ModelPersistence::load_from_binary(&path).unwrap();
    let (restored, normalizer, metadata) = saved_again.into_parts().unwrap();
    assert_eq!(restored.predict(&WINDOW), model.predict(&WINDOW));
    assert_eq!(normalizer, saved.normalizer);
    assert_eq!(metadata.accuracy, saved.metadata.accuracy);
}

#[test]
fn test_load_errors() {
    let dir = tempdir().unwrap();

    let missing = ModelPersistence::load(dir.path().join("missing.bin"));
    assert!(matches!(missing, Err(PersistenceError::Io(_))));

    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"model\": ").unwrap();
    assert!(matches!(ModelPersistence::load(&path), Err(PersistenceError::Json(_))));
}
