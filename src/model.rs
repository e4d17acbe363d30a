use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    train::ClassificationOutput,
};

use crate::{data::MnistBatch, MnistError};

/// Two convolution blocks followed by a linear classifier.
#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    out: Linear<B>,
}

/// Convolution, activation and 2x2 max pooling.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    activation: Relu,
    pool: MaxPool2d,
}

#[derive(Config, Debug)]
pub struct CnnConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    /// Output channels of the first and second convolution block.
    #[config(default = "[16, 32]")]
    pub channels: [usize; 2],
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = 2)]
    pub padding: usize,
    /// Width and height of the square input images.
    #[config(default = 28)]
    pub image_size: usize,
}

impl CnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cnn<B> {
        let [channels1, channels2] = self.channels;

        Cnn {
            conv1: self.block(1, channels1, device),
            conv2: self.block(channels1, channels2, device),
            out: LinearConfig::new(self.flattened_size(), self.num_classes).init(device),
        }
    }

    /// Number of features fed to the output layer: each block halves the
    /// spatial size of the feature maps.
    pub fn flattened_size(&self) -> usize {
        let side = self.image_size / 4;
        self.channels[1] * side * side
    }

    pub(crate) fn validate(&self) -> Result<(), MnistError> {
        if self.num_classes < 2 {
            return Err(MnistError::InvalidConfig(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        if self.channels.contains(&0) || self.kernel_size == 0 {
            return Err(MnistError::InvalidConfig(
                "channels and kernel_size must be non-zero".into(),
            ));
        }
        // Padding keeps the size only when the kernel fits exactly around it.
        if self.kernel_size != 2 * self.padding + 1 {
            return Err(MnistError::InvalidConfig(format!(
                "kernel_size {} with padding {} does not preserve the image size",
                self.kernel_size, self.padding
            )));
        }
        if self.image_size < 4 || self.image_size % 4 != 0 {
            return Err(MnistError::InvalidConfig(format!(
                "image_size must be a positive multiple of 4, got {}",
                self.image_size
            )));
        }

        Ok(())
    }

    fn block<B: Backend>(
        &self,
        channels_in: usize,
        channels_out: usize,
        device: &B::Device,
    ) -> ConvBlock<B> {
        let conv = Conv2dConfig::new([channels_in, channels_out], [self.kernel_size; 2])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        ConvBlock {
            conv,
            activation: Relu::new(),
            pool,
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    /// # Shapes
    ///   - Input `[batch_size, channels_in, height, width]`
    ///   - Output `[batch_size, channels_out, height / 2, width / 2]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);

        self.pool.forward(x)
    }
}

impl<B: Backend> Cnn<B> {
    /// # Shapes
    ///   - Images `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let (output, _features) = self.forward_features(images);
        output
    }

    /// Returns the class scores together with the flattened activations of the
    /// last convolution block.
    ///
    /// # Shapes
    ///   - Images `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, num_classes]`
    ///   - Features `[batch_size, channels * height / 4 * width / 4]`
    pub fn forward_features(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = self.conv1.forward(images);
        let x = self.conv2.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let features = x.reshape([batch_size, channels * height * width]);
        let output = self.out.forward(features.clone());

        (output, features)
    }

    pub fn forward_classification(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        let output = self.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets.clone());

        ClassificationOutput::new(loss, output, batch.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::{Distribution, ElementConversion};

    type Device = <TestBackend as Backend>::Device;

    fn random_batch(batch_size: usize, device: &Device) -> MnistBatch<TestBackend> {
        let images = Tensor::random([batch_size, 1, 28, 28], Distribution::Default, device);
        let labels = (0..batch_size).map(|i| (i % 10) as i64).collect::<Vec<_>>();
        let targets = Tensor::from_data(
            TensorData::new(labels, [batch_size])
                .convert::<<TestBackend as Backend>::IntElem>(),
            device,
        );

        MnistBatch { images, targets }
    }

    #[test]
    fn flattened_size_matches_reference_layer() {
        assert_eq!(CnnConfig::new().flattened_size(), 32 * 7 * 7);
    }

    #[test]
    fn output_has_ten_scores_per_image() {
        let device = Default::default();
        let model = CnnConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 28, 28], &device);

        let (output, features) = model.forward_features(images);

        assert_eq!(output.dims(), [3, 10]);
        assert_eq!(features.dims(), [3, 1568]);
    }

    #[test]
    fn conv_block_halves_spatial_size() {
        let device = Default::default();
        let config = CnnConfig::new();
        let block = config.block::<TestBackend>(1, 16, &device);

        let output = block.forward(Tensor::ones([2, 1, 28, 28], &device));

        assert_eq!(output.dims(), [2, 16, 14, 14]);
    }

    #[test]
    fn conv_block_output_is_non_negative() {
        let device = Default::default();
        let block = CnnConfig::new().block::<TestBackend>(1, 4, &device);
        let input = Tensor::random([1, 1, 8, 8], Distribution::Normal(0.0, 1.0), &device);

        let min = block.forward(input).min().into_scalar().elem::<f32>();

        assert!(min >= 0.0);
    }

    #[test]
    fn classification_loss_is_finite_and_non_negative() {
        let device = Default::default();
        let model = CnnConfig::new().init::<TestBackend>(&device);

        let output = model.forward_classification(random_batch(4, &device));
        let loss = output.loss.into_scalar().elem::<f32>();

        assert!(loss.is_finite());
        assert!(loss >= 0.0);
        assert_eq!(output.output.dims(), [4, 10]);
    }

    #[test]
    fn smaller_images_are_supported() {
        let device = Default::default();
        let config = CnnConfig::new().with_image_size(8).with_channels([2, 4]);
        let model = config.init::<TestBackend>(&device);

        let output = model.forward(Tensor::zeros([1, 1, 8, 8], &device));

        assert_eq!(config.flattened_size(), 16);
        assert_eq!(output.dims(), [1, 10]);
    }

    #[test]
    fn rejects_size_changing_padding() {
        assert!(CnnConfig::new().with_padding(1).validate().is_err());
        assert!(CnnConfig::new().with_image_size(30).validate().is_err());
        assert!(CnnConfig::new().with_num_classes(1).validate().is_err());
        assert!(CnnConfig::new().validate().is_ok());
    }
}
