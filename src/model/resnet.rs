use core::f64::consts::SQRT_2;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Device, Tensor},
};

use super::block::{LayerBlock, LayerBlockConfig};
use crate::config::Architecture;

// ResNet residual layer block configs
const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// ResNet implementation.
/// Derived from [torchivision.models.resnet.ResNet](https://github.com/pytorch/vision/blob/main/torchvision/models/resnet.py)
///
/// The stem accepts any number of input channels so that multi-band rasters (e.g., RGB + NIR
/// satellite tiles) can be classified.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    layer4: LayerBlock<B>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// ResNet from [`Deep Residual Learning for Image Recognition`](https://arxiv.org/abs/1512.03385).
    ///
    /// # Arguments
    ///
    /// * `architecture`: ResNet depth.
    /// * `num_classes`: Number of output classes of the model.
    /// * `in_channels`: Number of channels (bands) of the input images.
    /// * `device` - Device to create the module on.
    pub fn new(
        architecture: &Architecture,
        num_classes: usize,
        in_channels: usize,
        device: &Device<B>,
    ) -> Self {
        let (blocks, expansion) = match architecture {
            Architecture::ResNet18 => (RESNET18_BLOCKS, 1),
            Architecture::ResNet34 => (RESNET34_BLOCKS, 1),
            Architecture::ResNet50 => (RESNET50_BLOCKS, 4),
            Architecture::ResNet101 => (RESNET101_BLOCKS, 4),
            Architecture::ResNet152 => (RESNET152_BLOCKS, 4),
        };

        ResNetConfig::new(blocks, num_classes, expansion, in_channels).init(device)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        // First block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.maxpool.forward(out);

        // Residual blocks
        let out = self.layer1.forward(out);
        let out = self.layer2.forward(out);
        let out = self.layer3.forward(out);
        let out = self.layer4.forward(out);

        let out = self.avgpool.forward(out);
        // Reshape [B, C, 1, 1] -> [B, C]
        let out = out.flatten(1, 3);

        self.fc.forward(out)
    }

    /// Number of input channels expected by the first convolution.
    pub fn in_channels(&self) -> usize {
        let [_out, d_input, _k1, _k2] = self.conv1.weight.dims();
        d_input
    }

    /// Number of output classes of the classification layer.
    pub fn num_classes(&self) -> usize {
        let [_d_input, d_output] = self.fc.weight.dims();
        d_output
    }
}

/// [ResNet](ResNet) configuration.
struct ResNetConfig {
    conv1: Conv2dConfig,
    bn1: BatchNormConfig,
    maxpool: MaxPool2dConfig,
    layer1: LayerBlockConfig,
    layer2: LayerBlockConfig,
    layer3: LayerBlockConfig,
    layer4: LayerBlockConfig,
    avgpool: AdaptiveAvgPool2dConfig,
    fc: LinearConfig,
}

impl ResNetConfig {
    /// Create a new instance of the ResNet [config](ResNetConfig).
    fn new(blocks: [usize; 4], num_classes: usize, expansion: usize, in_channels: usize) -> Self {
        // `new()` is private but still check just in case...
        assert!(
            expansion == 1 || expansion == 4,
            "ResNet module only supports expansion values [1, 4] for residual blocks"
        );

        // 7x7 conv, 64, /2
        let conv1 = Conv2dConfig::new([in_channels, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false);
        let bn1 = BatchNormConfig::new(64);

        // 3x3 maxpool, /2
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1));

        // Residual blocks
        let bottleneck = expansion > 1;
        let layer1 = LayerBlockConfig::new(blocks[0], 64, 64 * expansion, 1, bottleneck);
        let layer2 =
            LayerBlockConfig::new(blocks[1], 64 * expansion, 128 * expansion, 2, bottleneck);
        let layer3 =
            LayerBlockConfig::new(blocks[2], 128 * expansion, 256 * expansion, 2, bottleneck);
        let layer4 =
            LayerBlockConfig::new(blocks[3], 256 * expansion, 512 * expansion, 2, bottleneck);

        // Average pooling [B, 512 * expansion, H, W] -> [B, 512 * expansion, 1, 1]
        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]);

        // Output layer
        let fc = LinearConfig::new(512 * expansion, num_classes);

        Self {
            conv1,
            bn1,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool,
            fc,
        }
    }

    /// Initialize a new [ResNet](ResNet) module.
    fn init<B: Backend>(self, device: &Device<B>) -> ResNet<B> {
        // Conv initializer
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2, // recommended value for ReLU
            fan_out_only: true,
        };

        ResNet {
            conv1: self.conv1.with_initializer(initializer).init(device),
            bn1: self.bn1.init(device),
            relu: Relu::new(),
            maxpool: self.maxpool.init(),
            layer1: self.layer1.init(device),
            layer2: self.layer2.init(device),
            layer3: self.layer3.init(device),
            layer4: self.layer4.init(device),
            avgpool: self.avgpool.init(),
            fc: self.fc.init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn resnet18_multiband() {
        let device = Default::default();
        let model = ResNet::<B>::new(&Architecture::ResNet18, 17, 4, &device);
        assert_eq!(model.in_channels(), 4);
        assert_eq!(model.num_classes(), 17);

        let out = model.forward(Tensor::zeros([1, 4, 32, 32], &device));
        assert_eq!(out.dims(), [1, 17]);
    }

    #[test]
    fn resnet50_output_shape() {
        let device = Default::default();
        let model = ResNet::<B>::new(&Architecture::ResNet50, 5, 3, &device);

        let out = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(out.dims(), [1, 5]);
    }
}
