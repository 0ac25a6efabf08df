use image::ImageReader;
use ndarray::Array3;
use rand::Rng;
use rayon::{
    iter::{IntoParallelRefIterator, ParallelIterator},
    ThreadPool,
};

use super::{augment::Pipeline, index::Sample};
use crate::error::{Error, Result};

/// A decoded, preprocessed sample.
#[derive(Debug, Clone)]
pub struct ArtworkItem {
    /// `[3, H, W]`, normalized.
    pub image: Array3<f32>,
    pub label: usize,
}

/// Random-access view over a list of samples. Images are read and augmented
/// on every access, so repeated loads of one sample differ when the pipeline
/// is stochastic.
#[derive(Debug, Clone)]
pub struct ArtworkDataset {
    samples: Vec<Sample>,
    pipeline: Pipeline,
}

impl ArtworkDataset {
    pub fn new(samples: Vec<Sample>, pipeline: Pipeline) -> Self {
        Self { samples, pipeline }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether loading the same sample twice can give different arrays.
    pub fn is_stochastic(&self) -> bool {
        self.pipeline.is_stochastic()
    }

    pub fn load(&self, index: usize) -> Result<ArtworkItem> {
        self.load_with(index, &mut rand::thread_rng())
    }

    pub fn load_with<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<ArtworkItem> {
        let sample = self.samples.get(index).ok_or(Error::SampleIndex {
            index,
            len: self.samples.len(),
        })?;

        let image = ImageReader::open(&sample.path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|err| Error::io(&sample.path, err))?
            .decode()
            .map_err(|source| Error::Image {
                path: sample.path.clone(),
                source,
            })?
            .to_rgb8();

        Ok(ArtworkItem {
            image: self.pipeline.apply(image, rng),
            label: sample.label,
        })
    }

    /// Loads `indices` concurrently on `pool`, preserving their order.
    pub fn load_batch(&self, indices: &[usize], pool: &ThreadPool) -> Result<Vec<ArtworkItem>> {
        pool.install(|| {
            indices
                .par_iter()
                .map(|&index| self.load(index))
                .collect()
        })
    }
}
