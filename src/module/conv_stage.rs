use burn::{module::Module, nn::conv::Conv2d, prelude::*};
use nn::{
    conv::Conv2dConfig,
    pool::{MaxPool2d, MaxPool2dConfig},
    PaddingConfig2d, Relu,
};

/// Two 3x3 convolutions with ReLU, then a 2x2 max pool halving height and width.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    expand: Conv2d<B>,
    project: Conv2d<B>,
    activation: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.expand.forward(x));
        let x = self.activation.forward(self.project.forward(x));

        self.pool.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ConvStageConfig {
    /// Input, intermediate and output channels.
    channels: [usize; 3],

    #[config(default = "[3, 3]")]
    kernel_size: [usize; 2],

    #[config(default = "PaddingConfig2d::Explicit(1, 1)")]
    padding: PaddingConfig2d,

    #[config(default = "[2, 2]")]
    pool_size: [usize; 2],
}

impl ConvStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvStage<B> {
        let [input, hidden, output] = self.channels;

        ConvStage {
            expand: Conv2dConfig::new([input, hidden], self.kernel_size)
                .with_padding(self.padding.clone())
                .init(device),
            project: Conv2dConfig::new([hidden, output], self.kernel_size)
                .with_padding(self.padding.clone())
                .init(device),
            activation: Relu::new(),
            pool: MaxPool2dConfig::new(self.pool_size)
                .with_strides(self.pool_size)
                .init(),
        }
    }
}
