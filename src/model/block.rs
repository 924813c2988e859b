use core::f64::consts::SQRT_2;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Device, Tensor},
};

// Conv initializer
const INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: SQRT_2, // recommended value for ReLU
    fan_out_only: true,
};

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A bottleneck residual block.
    Bottleneck(Bottleneck<B>),
    /// A basic residual block.
    Basic(BasicBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

/// ResNet [basic residual block](https://paperswithcode.com/method/residual-block) implementation.
/// Derived from [torchivision.models.resnet.BasicBlock](https://github.com/pytorch/vision/blob/main/torchvision/models/resnet.py)
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        // Conv block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.relu.forward(out)
    }
}

/// ResNet [bottleneck residual block](https://paperswithcode.com/method/bottleneck-residual-block)
/// implementation.
/// Derived from [torchivision.models.resnet.Bottleneck](https://github.com/pytorch/vision/blob/main/torchvision/models/resnet.py)
///
/// **NOTE:** Following common practice, this bottleneck block places the stride for downsampling
/// to the second 3x3 convolution while the original paper places it to the first 1x1 convolution.
/// This variant improves the accuracy and is known as [ResNet V1.5](https://catalog.ngc.nvidia.com/orgs/nvidia/resources/resnet_50_v1_5_for_pytorch).
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        // Conv block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.relu.forward(out)
    }
}

/// Downsample layer applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }
}

/// Collection of sequential residual blocks.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }
}

/// [Downsample](Downsample) configuration.
struct DownsampleConfig {
    conv: Conv2dConfig,
    bn: BatchNormConfig,
}

impl DownsampleConfig {
    fn new(in_channels: usize, out_channels: usize, stride: usize) -> Self {
        // conv1x1
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false);
        let bn = BatchNormConfig::new(out_channels);

        Self { conv, bn }
    }

    fn init<B: Backend>(self, device: &Device<B>) -> Downsample<B> {
        Downsample {
            conv: self.conv.with_initializer(INITIALIZER).init(device),
            bn: self.bn.init(device),
        }
    }

    /// A downsample layer is needed when the block changes the resolution or the channels.
    fn needed(in_channels: usize, out_channels: usize, stride: usize) -> Option<Self> {
        (stride != 1 || in_channels != out_channels)
            .then(|| Self::new(in_channels, out_channels, stride))
    }
}

/// [Basic residual block](BasicBlock) configuration.
struct BasicBlockConfig {
    conv1: Conv2dConfig,
    bn1: BatchNormConfig,
    conv2: Conv2dConfig,
    bn2: BatchNormConfig,
    downsample: Option<DownsampleConfig>,
}

impl BasicBlockConfig {
    fn new(in_channels: usize, out_channels: usize, stride: usize) -> Self {
        // conv3x3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false);
        let bn1 = BatchNormConfig::new(out_channels);

        // conv3x3
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false);
        let bn2 = BatchNormConfig::new(out_channels);

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample: DownsampleConfig::needed(in_channels, out_channels, stride),
        }
    }

    fn init<B: Backend>(self, device: &Device<B>) -> BasicBlock<B> {
        BasicBlock {
            conv1: self.conv1.with_initializer(INITIALIZER).init(device),
            bn1: self.bn1.init(device),
            relu: Relu::new(),
            conv2: self.conv2.with_initializer(INITIALIZER).init(device),
            bn2: self.bn2.init(device),
            downsample: self.downsample.map(|d| d.init(device)),
        }
    }
}

/// [Bottleneck residual block](Bottleneck) configuration.
struct BottleneckConfig {
    conv1: Conv2dConfig,
    bn1: BatchNormConfig,
    conv2: Conv2dConfig,
    bn2: BatchNormConfig,
    conv3: Conv2dConfig,
    bn3: BatchNormConfig,
    downsample: Option<DownsampleConfig>,
}

impl BottleneckConfig {
    fn new(in_channels: usize, out_channels: usize, stride: usize) -> Self {
        // Intermediate output channels w/ expansion = 4
        let int_out_channels = out_channels / 4;

        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, int_out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false);
        let bn1 = BatchNormConfig::new(int_out_channels);

        // conv3x3
        let conv2 = Conv2dConfig::new([int_out_channels, int_out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false);
        let bn2 = BatchNormConfig::new(int_out_channels);

        // conv1x1
        let conv3 = Conv2dConfig::new([int_out_channels, out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false);
        let bn3 = BatchNormConfig::new(out_channels);

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            downsample: DownsampleConfig::needed(in_channels, out_channels, stride),
        }
    }

    fn init<B: Backend>(self, device: &Device<B>) -> Bottleneck<B> {
        Bottleneck {
            conv1: self.conv1.with_initializer(INITIALIZER).init(device),
            bn1: self.bn1.init(device),
            relu: Relu::new(),
            conv2: self.conv2.with_initializer(INITIALIZER).init(device),
            bn2: self.bn2.init(device),
            conv3: self.conv3.with_initializer(INITIALIZER).init(device),
            bn3: self.bn3.init(device),
            downsample: self.downsample.map(|d| d.init(device)),
        }
    }
}

/// [Residual layer block](LayerBlock) configuration.
pub struct LayerBlockConfig {
    num_blocks: usize,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    bottleneck: bool,
}

impl LayerBlockConfig {
    /// Create a new instance of the residual layer block [config](LayerBlockConfig).
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        bottleneck: bool,
    ) -> Self {
        Self {
            num_blocks,
            in_channels,
            out_channels,
            stride,
            bottleneck,
        }
    }

    /// Initialize a new [LayerBlock](LayerBlock) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> LayerBlock<B> {
        let blocks = (0..self.num_blocks)
            .map(|b| {
                // The first block uses the specified stride and channels, the others a stride of 1
                let (in_channels, stride) = if b == 0 {
                    (self.in_channels, self.stride)
                } else {
                    (self.out_channels, 1)
                };

                if self.bottleneck {
                    ResidualBlock::Bottleneck(
                        BottleneckConfig::new(in_channels, self.out_channels, stride).init(device),
                    )
                } else {
                    ResidualBlock::Basic(
                        BasicBlockConfig::new(in_channels, self.out_channels, stride).init(device),
                    )
                }
            })
            .collect();

        LayerBlock { blocks }
    }
}
