use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rand::{seq::SliceRandom, Rng};

use super::dataset::ArtworkItem;

/// Index groups for one pass over a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Vec<usize>>,
}

impl BatchPlan {
    /// Every index once, in random order.
    pub fn shuffled<R: Rng + ?Sized>(len: usize, batch_size: usize, rng: &mut R) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);

        Self::chunked(indices, batch_size)
    }

    /// Every index once, in ascending order.
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        Self::chunked((0..len).collect(), batch_size)
    }

    fn chunked(indices: Vec<usize>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");

        Self {
            batches: indices
                .chunks(batch_size)
                .map(<[usize]>::to_vec)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.batches.iter().map(Vec::as_slice)
    }
}

#[derive(Clone, Debug)]
pub struct ArtworkBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone)]
pub struct ArtworkBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ArtworkBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ArtworkItem, ArtworkBatch<B>> for ArtworkBatcher<B> {
    fn batch(&self, items: Vec<ArtworkItem>) -> ArtworkBatch<B> {
        let images = items
            .iter()
            .map(|item| {
                let (channels, height, width) = item.image.dim();
                let data = TensorData::new(
                    item.image.iter().copied().collect::<Vec<f32>>(),
                    [channels, height, width],
                )
                .convert::<B::FloatElem>();

                Tensor::<B, 3>::from_data(data, &self.device).reshape([1, channels, height, width])
            })
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    [(item.label as i64).elem::<B::IntElem>()],
                    &self.device,
                )
            })
            .collect();

        let images = Tensor::cat(images, 0).to_device(&self.device);
        let targets = Tensor::cat(targets, 0).to_device(&self.device);

        ArtworkBatch { images, targets }
    }
}
