use std::{collections::HashMap, path::Path};

use anyhow::Result;
use artist_classifier::{
    backend::{self, DefaultBackend, TrainingBackend},
    checkpoint::{load_trained_model, MODEL_FILE},
    data::{ArtworkDataset, ArtworkIndex},
    evaluation::evaluate,
    model::ModelConfig,
    training::{train, TrainingConfig},
};
use burn::{module::AutodiffModule, optim::AdamConfig};
use tracing::{info, Level};

const DATA_DIR: &str = "images";
const ARTIFACT_DIR: &str = "artifact";

const CAPPED_ARTISTS: [(&str, usize); 3] = [
    ("Vincent_van_Gogh", 300),
    ("Edgar_Degas", 300),
    ("Pablo_Picasso", 300),
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let device = backend::default_device();
    info!("Using device: {} {:?}", backend::backend_name(), device);

    let caps: HashMap<String, usize> = CAPPED_ARTISTS
        .iter()
        .map(|(artist, cap)| (artist.to_string(), *cap))
        .collect();
    let index = ArtworkIndex::scan(Path::new(DATA_DIR), &caps)?;

    let config = TrainingConfig::new(ModelConfig::new(index.classes.len()), AdamConfig::new());
    config.validate()?;

    let split = index.split(config.train_ratio, config.seed)?;
    let train_set = ArtworkDataset::new(split.train, config.augmentation.init_training());
    let test_set = ArtworkDataset::new(
        split.test,
        config.augmentation.init_evaluation(&config.eval_transform),
    );

    let artifact_dir = Path::new(ARTIFACT_DIR);
    let outcome = train::<TrainingBackend>(artifact_dir, &config, &index.classes, &train_set, &device)?;
    evaluate(&outcome.model.valid(), &test_set, &config, &device)?;

    let model = load_trained_model::<DefaultBackend>(
        &artifact_dir.join(MODEL_FILE),
        index.classes.len(),
        &device,
    )?;
    info!("Restored classifier for {} artists", model.num_classes());

    Ok(())
}
