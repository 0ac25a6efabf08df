use std::{fs, path::Path};

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    optim::{AdamConfig, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
    train::TrainStep,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPool;
use tracing::info;

use crate::{
    checkpoint::{self, CLASSES_FILE, CONFIG_FILE, MODEL_FILE},
    data::{self, ArtworkBatcher, ArtworkDataset, AugmentationConfig, BatchPlan, ClassRegistry, EvalTransform},
    error::{self, Error},
    model::{ArtistClassifier, ModelConfig},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,

    pub optimizer: AdamConfig,

    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,

    #[config(default = 15)]
    pub epoch_count: usize,

    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = 1.0e-3)]
    pub learning_rate: f64,

    /// Share of the indexed samples used for training; the rest is the test split.
    #[config(default = 0.8)]
    pub train_ratio: f64,

    #[config(default = 4)]
    pub worker_count: usize,

    /// Batches between two progress lines.
    #[config(default = 10)]
    pub log_interval: usize,

    #[config(default = "EvalTransform::Deterministic")]
    pub eval_transform: EvalTransform,
}

impl TrainingConfig {
    pub fn validate(&self) -> error::Result<()> {
        self.augmentation.validate()?;

        if self.model.classes == 0 {
            return Err(Error::Config("at least one class is required".into()));
        }
        if self.model.image_size != self.augmentation.image_size {
            return Err(Error::Config(format!(
                "model expects {}px inputs but augmentation produces {}px",
                self.model.image_size, self.augmentation.image_size
            )));
        }
        if self.model.flatten_size() == 0 {
            return Err(Error::Config(format!(
                "image size {} is too small for three pooling stages",
                self.model.image_size
            )));
        }
        if self.batch_size == 0 || self.worker_count == 0 || self.log_interval == 0 {
            return Err(Error::Config(
                "batch size, worker count and log interval must be positive".into(),
            ));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "train ratio must be in (0, 1], got {}",
                self.train_ratio
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub batches: usize,
    pub average_loss: f64,
}

pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: ArtistClassifier<B>,
    pub epochs: Vec<EpochSummary>,
}

struct EpochContext<'a, B: AutodiffBackend> {
    config: &'a TrainingConfig,
    dataset: &'a ArtworkDataset,
    batcher: ArtworkBatcher<B>,
    pool: ThreadPool,
}

impl<B: AutodiffBackend> EpochContext<'_, B> {
    /// One pass over `plan` with an optimizer step after every batch.
    fn run_epoch<O: Optimizer<ArtistClassifier<B>, B>>(
        &self,
        mut model: ArtistClassifier<B>,
        optimizer: &mut O,
        plan: &BatchPlan,
        epoch: usize,
    ) -> error::Result<(ArtistClassifier<B>, EpochSummary)> {
        let mut total_loss = 0.0;

        for (batch_idx, indices) in plan.iter().enumerate() {
            let batch = self
                .batcher
                .batch(self.dataset.load_batch(indices, &self.pool)?);

            let output = TrainStep::step(&model, batch);
            let loss = output.item.loss.into_scalar().elem::<f64>();
            model = optimizer.step(self.config.learning_rate, model, output.grads);
            total_loss += loss;

            if logs_batch(batch_idx, self.config.log_interval) {
                info!(
                    "Epoch [{}/{}], Batch [{}/{}], Loss: {:.4}",
                    epoch,
                    self.config.epoch_count,
                    batch_idx,
                    plan.len(),
                    loss
                );
            }
        }

        let summary = EpochSummary {
            epoch,
            batches: plan.len(),
            average_loss: total_loss / plan.len().max(1) as f64,
        };

        Ok((model, summary))
    }
}

/// Progress is reported on the first batch and every `interval` batches after it.
fn logs_batch(batch_idx: usize, interval: usize) -> bool {
    batch_idx % interval == 0
}

fn create_artifact_dir(artifact_dir: &Path) -> error::Result<()> {
    fs::remove_dir_all(artifact_dir).ok();
    fs::create_dir_all(artifact_dir).map_err(|err| Error::io(artifact_dir, err))
}

/// Trains a fresh classifier on `dataset` and writes the final weights, the
/// configuration and the class registry into `artifact_dir`.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &TrainingConfig,
    classes: &ClassRegistry,
    dataset: &ArtworkDataset,
    device: &B::Device,
) -> error::Result<TrainingOutcome<B>> {
    config.validate()?;
    if classes.len() != config.model.classes {
        return Err(Error::Config(format!(
            "{} classes were indexed but the model is configured for {}",
            classes.len(),
            config.model.classes
        )));
    }
    if dataset.is_empty() {
        return Err(Error::EmptyDataset("no training samples".into()));
    }

    create_artifact_dir(artifact_dir)?;
    let config_path = artifact_dir.join(CONFIG_FILE);
    config
        .save(&config_path)
        .map_err(|err| Error::io(&config_path, err))?;
    classes.save(&artifact_dir.join(CLASSES_FILE))?;

    B::seed(config.seed);

    let context = EpochContext {
        config,
        dataset,
        batcher: ArtworkBatcher::<B>::new(device.clone()),
        pool: data::worker_pool(config.worker_count)?,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut model = config.model.init::<B>(device);
    let mut optimizer = config.optimizer.init::<B, ArtistClassifier<B>>();

    info!(
        "Training on {} samples for {} epochs (batch size {}, learning rate {})",
        dataset.len(),
        config.epoch_count,
        config.batch_size,
        config.learning_rate
    );

    let mut epochs = Vec::with_capacity(config.epoch_count);
    for epoch in 1..=config.epoch_count {
        let plan = BatchPlan::shuffled(dataset.len(), config.batch_size, &mut rng);
        let (trained, summary) = context.run_epoch(model, &mut optimizer, &plan, epoch)?;
        model = trained;

        info!(
            "Epoch [{}/{}], Average Loss: {:.4}",
            epoch, config.epoch_count, summary.average_loss
        );
        epochs.push(summary);
    }

    checkpoint::save_model(&model, &artifact_dir.join(MODEL_FILE))?;

    Ok(TrainingOutcome { model, epochs })
}
