pub mod augment;
pub mod batcher;
pub mod dataset;
pub mod index;

pub use augment::{AugmentationConfig, EvalTransform, Pipeline};
pub use batcher::{ArtworkBatch, ArtworkBatcher, BatchPlan};
pub use dataset::{ArtworkDataset, ArtworkItem};
pub use index::{ArtworkIndex, ClassRegistry, DatasetSplit, Sample};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;

/// Pool used to decode and augment the samples of a batch in parallel.
pub fn worker_pool(worker_count: usize) -> Result<ThreadPool> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|index| format!("loader-{index}"))
        .build()?)
}
