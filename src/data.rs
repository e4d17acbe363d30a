use std::sync::Arc;

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::{vision::MnistItem, Dataset},
    },
    prelude::*,
    tensor::ElementConversion,
};

const WIDTH: usize = 28;
const HEIGHT: usize = 28;

/// Converts MNIST items into image and label tensors.
#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Pixel intensities in `[0, 1]`, shape `[batch_size, 1, 28, 28]`.
    pub images: Tensor<B, 4>,
    /// Digit labels, shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let images: Vec<Tensor<B, 3>> = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, &self.device))
            .map(|tensor| tensor.reshape([1, HEIGHT, WIDTH]))
            // Raw pixels are stored as 0..=255
            .map(|tensor| tensor / 255)
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

        let images = Tensor::stack(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

/// Builds a shuffled data loader over an MNIST split.
///
/// Any [`Dataset`] of [`MnistItem`] works, which lets tests feed in-memory
/// items instead of the downloaded files.
pub fn mnist_loader<B, D>(
    device: B::Device,
    dataset: D,
    batch_size: usize,
    seed: u64,
    num_workers: usize,
) -> Arc<dyn DataLoader<MnistBatch<B>>>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    DataLoaderBuilder::new(MnistBatcher::<B>::new(device))
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(num_workers)
        .build(dataset)
}

/// Number of batches needed to cover `num_items`, counting a trailing partial batch.
pub fn num_batches(num_items: usize, batch_size: usize) -> usize {
    num_items.div_ceil(batch_size)
}
