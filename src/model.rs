use burn::{
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig, Relu};

use crate::{
    data::ArtworkBatch,
    module::conv_stage::{ConvStage, ConvStageConfig},
};

const CONV_STAGES: [[usize; 3]; 3] = [
    // in, mid, out
    [3, 64, 128],
    [128, 256, 128],
    [128, 64, 32],
];

#[derive(Module, Debug)]
pub struct ArtistClassifier<B: Backend> {
    stages: Vec<ConvStage<B>>,

    hidden: Linear<B>,
    activation: Relu,
    output: Linear<B>,
}

impl<B: Backend> ArtistClassifier<B> {
    /// `[N, 3, S, S]` images to `[N, classes]` logits.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .stages
            .iter()
            .fold(x, |x, stage| stage.forward(x));

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.activation.forward(self.hidden.forward(x));
        self.output.forward(x)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight.val().dims()[1]
    }

    pub fn feature_size(&self) -> usize {
        self.hidden.weight.val().dims()[0]
    }

    /// `(flattened features, classes)` stored in a record of this module.
    pub(crate) fn record_dims(record: &<Self as Module<B>>::Record) -> (usize, usize) {
        (
            record.hidden.weight.val().dims()[0],
            record.output.weight.val().dims()[1],
        )
    }
}

impl<B: AutodiffBackend> TrainStep<ArtworkBatch<B>, ClassificationOutput<B>> for ArtistClassifier<B> {
    fn step(&self, batch: ArtworkBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ArtworkBatch<B>, ClassificationOutput<B>> for ArtistClassifier<B> {
    fn step(&self, batch: ArtworkBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub classes: usize,

    /// Height and width of the square input.
    #[config(default = 224)]
    pub image_size: usize,

    #[config(default = 1024)]
    pub hidden_size: usize,
}

impl ModelConfig {
    /// Width of the flattened feature map: every stage halves the resolution.
    pub fn flatten_size(&self) -> usize {
        let side = CONV_STAGES
            .iter()
            .fold(self.image_size, |side, _| side / 2);
        let channels = CONV_STAGES[CONV_STAGES.len() - 1][2];

        channels * side * side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ArtistClassifier<B> {
        let stages = CONV_STAGES
            .iter()
            .map(|&channels| ConvStageConfig::new(channels).init(device))
            .collect();

        ArtistClassifier {
            stages,
            hidden: LinearConfig::new(self.flatten_size(), self.hidden_size).init(device),
            activation: Relu::new(),
            output: LinearConfig::new(self.hidden_size, self.classes).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Distribution};

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn flatten_size_follows_input_size() {
        assert_eq!(ModelConfig::new(5).flatten_size(), 32 * 28 * 28);
        assert_eq!(ModelConfig::new(5).with_image_size(32).flatten_size(), 32 * 4 * 4);
        assert_eq!(ModelConfig::new(5).with_image_size(20).flatten_size(), 32 * 2 * 2);
    }

    #[test]
    fn logits_have_one_column_per_class() {
        let device = Default::default();
        let config = ModelConfig::new(7).with_image_size(16).with_hidden_size(32);
        let model = config.init::<TestBackend>(&device);

        let images = Tensor::random([2, 3, 16, 16], Distribution::Default, &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [2, 7]);
        assert_eq!(model.num_classes(), 7);
        assert_eq!(model.feature_size(), config.flatten_size());
    }

    #[test]
    fn classification_output_carries_scalar_loss() {
        let device = Default::default();
        let model = ModelConfig::new(3)
            .with_image_size(8)
            .with_hidden_size(16)
            .init::<TestBackend>(&device);
        let images = Tensor::random([4, 3, 8, 8], Distribution::Default, &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 2, 1], &device);

        let output = model.forward_classification(images, targets);

        assert_eq!(output.loss.dims(), [1]);
        assert!(output.loss.into_scalar() > 0.);
    }
}
