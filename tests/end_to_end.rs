use std::{collections::HashMap, fs, path::Path};

use artist_classifier::{
    checkpoint::{load_with_config, CLASSES_FILE, CONFIG_FILE, MODEL_FILE},
    data::{ArtworkDataset, ArtworkIndex, ClassRegistry},
    evaluation::evaluate,
    model::ModelConfig,
    training::{train, TrainingConfig},
    Error,
};
use burn::{
    backend::{Autodiff, NdArray},
    config::Config,
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::AdamConfig,
};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

type Backend = NdArray<f32>;
type AutodiffBackend = Autodiff<Backend>;

const IMAGE_SIZE: usize = 16;

fn write_class(root: &Path, name: &str, count: usize, color: [u8; 3]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        let image = RgbImage::from_fn(24, 20, |x, y| {
            let shade = ((x + y) as u8).wrapping_mul(3).wrapping_add(i as u8);
            Rgb(color.map(|c| c.saturating_sub(shade)))
        });
        image.save(dir.join(format!("{i}.png"))).unwrap();
    }
}

fn small_config(classes: usize) -> TrainingConfig {
    TrainingConfig::new(
        ModelConfig::new(classes)
            .with_image_size(IMAGE_SIZE)
            .with_hidden_size(32),
        AdamConfig::new(),
    )
    .with_augmentation(
        artist_classifier::data::AugmentationConfig::new().with_image_size(IMAGE_SIZE),
    )
    .with_epoch_count(1)
    .with_worker_count(2)
}

#[test]
fn two_artists_train_evaluate_and_reload() {
    let workspace = TempDir::new().unwrap();
    let images = workspace.path().join("images");
    write_class(&images, "Claude_Monet", 5, [240, 180, 60]);
    write_class(&images, "Edgar_Degas", 5, [40, 90, 220]);
    let artifact_dir = workspace.path().join("artifact");

    let index = ArtworkIndex::scan(&images, &HashMap::new()).unwrap();
    assert_eq!(index.len(), 10);

    let config = small_config(index.classes.len());
    let split = index.split(config.train_ratio, config.seed).unwrap();
    assert_eq!((split.train.len(), split.test.len()), (8, 2));

    let train_set = ArtworkDataset::new(split.train, config.augmentation.init_training());
    let test_set = ArtworkDataset::new(
        split.test,
        config.augmentation.init_evaluation(&config.eval_transform),
    );
    let device = Default::default();

    let outcome =
        train::<AutodiffBackend>(&artifact_dir, &config, &index.classes, &train_set, &device)
            .unwrap();

    assert_eq!(outcome.epochs.len(), 1);
    assert_eq!(outcome.epochs[0].batches, 1);
    assert!(outcome.epochs[0].average_loss.is_finite());
    assert_eq!(outcome.model.num_classes(), index.classes.len());

    let report = evaluate(&outcome.model.valid(), &test_set, &config, &device).unwrap();
    assert_eq!(report.total(), 2);
    assert!([0.0, 50.0, 100.0].contains(&report.accuracy()));

    assert!(artifact_dir.join(format!("{MODEL_FILE}.mpk")).is_file());
    assert_eq!(
        ClassRegistry::load(&artifact_dir.join(CLASSES_FILE)).unwrap(),
        index.classes
    );
    let saved = TrainingConfig::load(artifact_dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(saved.model.classes, 2);

    let restored =
        load_with_config::<Backend>(&artifact_dir.join(MODEL_FILE), &config.model, &device)
            .unwrap();
    let batch = artist_classifier::data::ArtworkBatcher::<Backend>::new(device.clone())
        .batch(vec![test_set.load(0).unwrap()]);
    restored
        .forward(batch.images.clone())
        .into_data()
        .assert_approx_eq(&outcome.model.valid().forward(batch.images).into_data(), 4);

    let wrong = load_with_config::<Backend>(
        &artifact_dir.join(MODEL_FILE),
        &ModelConfig::new(3)
            .with_image_size(IMAGE_SIZE)
            .with_hidden_size(32),
        &device,
    );
    assert!(matches!(wrong, Err(Error::ClassCountMismatch { .. })));
}

#[test]
fn registry_size_must_match_model_outputs() {
    let workspace = TempDir::new().unwrap();
    write_class(workspace.path(), "Alpha", 2, [200, 0, 0]);
    let index = ArtworkIndex::scan(workspace.path(), &HashMap::new()).unwrap();
    let config = small_config(2);
    let dataset = ArtworkDataset::new(index.samples.clone(), config.augmentation.init_training());

    let result = train::<AutodiffBackend>(
        &workspace.path().join("artifact"),
        &config,
        &index.classes,
        &dataset,
        &Default::default(),
    );

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn empty_training_split_is_rejected() {
    let workspace = TempDir::new().unwrap();
    let config = small_config(1);
    let classes = ClassRegistry::new(vec!["Alpha".into()]);
    let dataset = ArtworkDataset::new(vec![], config.augmentation.init_training());

    let result = train::<AutodiffBackend>(
        &workspace.path().join("artifact"),
        &config,
        &classes,
        &dataset,
        &Default::default(),
    );

    assert!(matches!(result, Err(Error::EmptyDataset(_))));
}

#[test]
fn empty_test_split_reports_zero_accuracy() {
    let config = small_config(2);
    let device = Default::default();
    let model = config.model.init::<Backend>(&device);
    let dataset = ArtworkDataset::new(vec![], config.augmentation.init_training());

    let report = evaluate(&model, &dataset, &config, &device).unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(report.accuracy(), 0.0);
}
