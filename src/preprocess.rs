use burn::tensor::{
    backend::Backend,
    module::interpolate,
    ops::{InterpolateMode, InterpolateOptions},
    Device, Tensor, TensorData,
};

use crate::config::ModelConfig;
use crate::error::{Error, Result};

/// Per-channel normalizer.
///
/// The normalization is done according to the following formula:
/// `input = (input / value_scale - mean) / std`
#[derive(Clone)]
pub struct Normalizer<B: Backend> {
    pub value_scale: f32,
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    /// Creates a new normalizer with one mean and std value per channel.
    pub fn new(value_scale: f32, mean: Vec<f32>, std: Vec<f32>, device: &Device<B>) -> Self {
        let channels = mean.len();
        let mean = Tensor::<B, 1>::from_data(
            TensorData::new(mean, [channels]).convert::<B::FloatElem>(),
            device,
        )
        .reshape([1, channels, 1, 1]);
        let channels = std.len();
        let std = Tensor::<B, 1>::from_data(
            TensorData::new(std, [channels]).convert::<B::FloatElem>(),
            device,
        )
        .reshape([1, channels, 1, 1]);

        Self {
            value_scale,
            mean,
            std,
        }
    }

    /// Normalizes the input image batch `[B, C, H, W]`.
    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input.div_scalar(self.value_scale) - self.mean.clone()) / self.std.clone()
    }
}

/// Turns `u8 [H, W, C]` image data into a normalized `[1, C, height, width]` float batch.
#[derive(Clone)]
pub struct Preprocessor<B: Backend> {
    channels: usize,
    size: [usize; 2],
    normalizer: Normalizer<B>,
    device: Device<B>,
}

impl<B: Backend> Preprocessor<B> {
    pub fn new(config: &ModelConfig, device: &Device<B>) -> Self {
        let (mean, std) = config.normalization.per_channel(config.in_channels);

        Self {
            channels: config.in_channels,
            size: [config.height, config.width],
            normalizer: Normalizer::new(config.normalization.value_scale, mean, std, device),
            device: device.clone(),
        }
    }

    pub fn forward(&self, image: TensorData) -> Result<Tensor<B, 4>> {
        let [height, width, channels] = match image.shape[..] {
            [h, w, c] => [h, w, c],
            _ => {
                return Err(Error::InvalidRaster(format!(
                    "expected [H, W, C] image data, got shape {:?}",
                    image.shape
                )))
            }
        };
        if channels != self.channels {
            return Err(Error::ChannelMismatch {
                expected: self.channels,
                actual: channels,
            });
        }

        // Cast to float
        let x = Tensor::<B, 3>::from_data(image.convert::<B::FloatElem>(), &self.device)
            .permute([2, 0, 1]) // [C, H, W]
            .unsqueeze::<4>(); // [B, C, H, W]

        // Resize to the network input size
        let x = if [height, width] == self.size {
            x
        } else {
            log::debug!(
                "Resizing {height}x{width} to {}x{}",
                self.size[0],
                self.size[1]
            );
            interpolate(
                x,
                self.size,
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        Ok(self.normalizer.normalize(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Architecture, NormalizationConfig};
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn assert_close(actual: Tensor<B, 4>, expected: &[f32]) {
        let actual = actual.into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn imagenet_normalization() {
        let device = Default::default();
        let config = ModelConfig::new(Architecture::ResNet18)
            .with_height(1)
            .with_width(2);
        let preprocessor = Preprocessor::<B>::new(&config, &device);

        // 1x2 RGB image
        let image = TensorData::new(vec![255u8, 0, 0, 0, 255, 0], [1, 2, 3]);
        let x = preprocessor.forward(image).unwrap();

        assert_eq!(x.dims(), [1, 3, 1, 2]);
        assert_close(
            x,
            &[
                (1.0 - 0.485) / 0.229,
                -0.485 / 0.229,
                -0.456 / 0.224,
                (1.0 - 0.456) / 0.224,
                -0.406 / 0.225,
                -0.406 / 0.225,
            ],
        );
    }

    #[test]
    fn mean_scale_normalization_with_resize() {
        let device = Default::default();
        let config = ModelConfig::new(Architecture::ResNet18)
            .with_in_channels(1)
            .with_height(4)
            .with_width(4)
            .with_normalization(NormalizationConfig::mean_scale(117.0, 1.0));
        let preprocessor = Preprocessor::<B>::new(&config, &device);

        // A constant image stays constant after bilinear resizing
        let image = TensorData::new(vec![120u8; 4], [2, 2, 1]);
        let x = preprocessor.forward(image).unwrap();

        assert_eq!(x.dims(), [1, 1, 4, 4]);
        assert_close(x, &[3.0; 16]);
    }

    #[test]
    fn rejects_channel_mismatch() {
        let device = Default::default();
        let config = ModelConfig::new(Architecture::ResNet18);
        let preprocessor = Preprocessor::<B>::new(&config, &device);

        let image = TensorData::new(vec![0u8; 8], [2, 1, 4]);
        assert!(matches!(
            preprocessor.forward(image),
            Err(Error::ChannelMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }
}
