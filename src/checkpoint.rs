//! Persisting and restoring classifier weights.

use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use tracing::info;

use crate::{
    error::{Error, Result},
    model::{ArtistClassifier, ModelConfig},
};

/// Weights file name inside the artifact directory; the recorder appends `.mpk`.
pub const MODEL_FILE: &str = "artist_classifier";
pub const CONFIG_FILE: &str = "config.json";
pub const CLASSES_FILE: &str = "classes.json";

pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub fn save_model<B: Backend>(model: &ArtistClassifier<B>, path: &Path) -> Result<()> {
    model
        .clone()
        .save_file(path, &CheckpointRecorder::new())
        .map_err(|err| Error::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })?;

    info!("Model saved to {}", path.display());
    Ok(())
}

/// Rebuilds a classifier with the default input size for `num_classes` artists.
pub fn load_trained_model<B: Backend>(
    path: &Path,
    num_classes: usize,
    device: &B::Device,
) -> Result<ArtistClassifier<B>> {
    load_with_config(path, &ModelConfig::new(num_classes), device)
}

/// Loads weights saved by [`save_model`] into a model built from `config`.
///
/// The stored head shapes are compared with the topology `config` describes
/// before anything is loaded, so a checkpoint trained on a different number of
/// artists or a different input size is rejected.
pub fn load_with_config<B: Backend>(
    path: &Path,
    config: &ModelConfig,
    device: &B::Device,
) -> Result<ArtistClassifier<B>> {
    let record: <ArtistClassifier<B> as Module<B>>::Record = CheckpointRecorder::new()
        .load(path.to_path_buf(), device)
        .map_err(|err| Error::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })?;

    let (features, classes) = ArtistClassifier::<B>::record_dims(&record);
    if classes != config.classes {
        return Err(Error::ClassCountMismatch {
            path: path.to_path_buf(),
            expected: config.classes,
            found: classes,
        });
    }
    if features != config.flatten_size() {
        return Err(Error::FeatureSizeMismatch {
            path: path.to_path_buf(),
            expected: config.flatten_size(),
            found: features,
        });
    }

    let model = config.init::<B>(device).load_record(record);
    info!("Model loaded successfully from {}", path.display());

    Ok(model)
}
