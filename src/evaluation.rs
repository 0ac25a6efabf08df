use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::ElementConversion,
    train::ValidStep,
};
use tracing::{info, warn};

use crate::{
    data::{self, ArtworkBatcher, ArtworkDataset, BatchPlan},
    error::{Error, Result},
    metrics::ConfusionMatrix,
    model::ArtistClassifier,
    training::TrainingConfig,
};

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub confusion: ConfusionMatrix,
    pub average_loss: f64,
}

impl EvaluationReport {
    /// Percentage of correctly classified test samples.
    pub fn accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }

    pub fn total(&self) -> usize {
        self.confusion.total()
    }
}

/// Scores `model` on `dataset` in order, without gradient tracking.
///
/// Pass the inference copy of a trained model (`model.valid()`).
pub fn evaluate<B: Backend>(
    model: &ArtistClassifier<B>,
    dataset: &ArtworkDataset,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<EvaluationReport> {
    config.validate()?;

    let mut confusion = ConfusionMatrix::new(model.num_classes());
    if dataset.is_empty() {
        warn!("Test split is empty, reporting 0% accuracy");
        return Ok(EvaluationReport {
            confusion,
            average_loss: 0.,
        });
    }

    if dataset.is_stochastic() {
        warn!("Test images are randomly augmented, accuracy will vary between runs");
    }

    let pool = data::worker_pool(config.worker_count)?;
    let batcher = ArtworkBatcher::<B>::new(device.clone());
    let plan = BatchPlan::sequential(dataset.len(), config.batch_size);
    let mut total_loss = 0.;

    for (batch_idx, indices) in plan.iter().enumerate() {
        let batch = batcher.batch(dataset.load_batch(indices, &pool)?);
        let output = ValidStep::step(model, batch);

        total_loss += output.loss.into_scalar().elem::<f64>();
        let predicted = to_labels(output.output.argmax(1).squeeze::<1>(1))?;
        let actual = to_labels(output.targets)?;
        for (actual, predicted) in actual.into_iter().zip(predicted) {
            confusion.record(actual, predicted)?;
        }

        info!(
            "Batch [{}/{}], Running Accuracy: {:.2}%",
            batch_idx + 1,
            plan.len(),
            confusion.accuracy()
        );
    }

    let report = EvaluationReport {
        confusion,
        average_loss: total_loss / plan.len() as f64,
    };
    info!("Test Accuracy: {:.2}%", report.accuracy());
    info!(
        "Macro Precision: {:.4}, Macro Recall: {:.4}, Macro F1: {:.4}, Average Loss: {:.4}",
        report.confusion.macro_precision(),
        report.confusion.macro_recall(),
        report.confusion.macro_f1(),
        report.average_loss
    );

    Ok(report)
}

fn to_labels<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let labels = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| Error::Tensor(format!("{err:?}")))?;

    Ok(labels.into_iter().map(|label| label as usize).collect())
}
