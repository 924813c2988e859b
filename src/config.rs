use std::path::{Path, PathBuf};

use burn::config::Config;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// Model configuration file name inside a model directory.
pub const CONFIG_FILE: &str = "config.json";
/// Label file name inside a model directory.
pub const LABELS_FILE: &str = "labels.txt";
/// Weights file names looked up, in order, when the config does not name one.
pub const WEIGHTS_FILES: [&str; 3] = ["model.mpk", "model.pth", "model.pt"];

/// Supported network architectures.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Architecture {
    ResNet18,
    ResNet34,
    ResNet50,
    ResNet101,
    ResNet152,
}

/// Activation applied to the network output to obtain probabilities.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Mutually exclusive classes; the probabilities sum to one.
    Softmax,
    /// Independent classes (multi-label tagging).
    Sigmoid,
}

/// Input normalization: `((value / value_scale) - mean) / std`.
///
/// `mean` and `std` hold either a single value applied to all channels or one value per channel.
#[derive(Config, Debug)]
pub struct NormalizationConfig {
    /// Pixel values are divided by this value first.
    #[config(default = 255.0)]
    pub value_scale: f32,
    #[config(default = "vec![0.485, 0.456, 0.406]")]
    pub mean: Vec<f32>,
    #[config(default = "vec![0.229, 0.224, 0.225]")]
    pub std: Vec<f32>,
}

impl NormalizationConfig {
    /// Normalization of models pre-trained on ImageNet with torchvision.
    pub fn imagenet() -> Self {
        Self::new()
    }

    /// Normalization on the raw `[0, 255]` pixel values: `(value - mean) / scale`.
    pub fn mean_scale(mean: f32, scale: f32) -> Self {
        Self::new()
            .with_value_scale(1.0)
            .with_mean(vec![mean])
            .with_std(vec![scale])
    }

    /// Mean and std with one value per channel.
    pub fn per_channel(&self, channels: usize) -> (Vec<f32>, Vec<f32>) {
        fn broadcast(values: &[f32], channels: usize) -> Vec<f32> {
            match values {
                [value] => vec![*value; channels],
                _ => values.to_vec(),
            }
        }

        (
            broadcast(&self.mean, channels),
            broadcast(&self.std, channels),
        )
    }

    fn validate(&self, channels: usize) -> crate::Result<()> {
        for (name, values) in [("mean", &self.mean), ("std", &self.std)] {
            if values.len() != 1 && values.len() != channels {
                return Err(Error::Config(format!(
                    "normalization {name} must hold 1 or {channels} values, got {}",
                    values.len()
                )));
            }
        }

        if !(self.value_scale > 0.0) {
            return Err(Error::Config(format!(
                "normalization value_scale must be positive, got {}",
                self.value_scale
            )));
        }

        if self.std.iter().any(|std| !(*std > 0.0)) {
            return Err(Error::Config(format!(
                "normalization std values must be positive, got {:?}",
                self.std
            )));
        }

        Ok(())
    }
}

/// Configuration of a model directory.
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub architecture: Architecture,
    /// Number of output classes. Defaults to the number of labels.
    pub num_classes: Option<usize>,
    /// Number of input channels (bands) of the network.
    #[config(default = 3)]
    pub in_channels: usize,
    /// Input height of the network.
    #[config(default = 224)]
    pub height: usize,
    /// Input width of the network.
    #[config(default = 224)]
    pub width: usize,
    #[config(default = "NormalizationConfig::imagenet()")]
    pub normalization: NormalizationConfig,
    #[config(default = "Activation::Softmax")]
    pub activation: Activation,
    /// Raster bands fed to the network, in order. Defaults to all bands.
    pub bands: Option<Vec<usize>>,
    /// Weights file name inside the model directory.
    pub weights: Option<String>,
}

impl ModelConfig {
    /// Read `config.json` from a model directory.
    pub fn from_dir(model_dir: impl AsRef<Path>) -> crate::Result<Self> {
        let path = model_dir.as_ref().join(CONFIG_FILE);
        let bytes = std::fs::read(&path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;

        let config = Self::from_json(&bytes)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a JSON config. Only `architecture` is required, missing keys take their default value.
    pub fn from_json(json: &[u8]) -> serde_json::Result<Self> {
        let mut value: Value = serde_json::from_slice(json)?;
        let architecture = match value.get("architecture") {
            Some(architecture) => Architecture::deserialize(architecture)?,
            None => return Err(serde::de::Error::missing_field("architecture")),
        };

        let defaults = serde_json::to_value(Self::new(architecture))?;
        fill_defaults(&mut value, defaults);

        serde_json::from_value(value)
    }

    /// Check that the configuration is consistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.in_channels == 0 || self.height == 0 || self.width == 0 {
            return Err(Error::Config(format!(
                "input size must be non-zero, got {}x{}x{}",
                self.in_channels, self.height, self.width
            )));
        }

        if let Some(bands) = &self.bands {
            if bands.len() != self.in_channels {
                return Err(Error::Config(format!(
                    "{} bands selected for a network with {} input channels",
                    bands.len(),
                    self.in_channels
                )));
            }
        }

        if self.num_classes == Some(0) {
            return Err(Error::Config("num_classes must be non-zero".into()));
        }

        self.normalization.validate(self.in_channels)
    }

    /// Path of the weights file inside the model directory.
    pub fn weights_path(&self, model_dir: impl AsRef<Path>) -> crate::Result<PathBuf> {
        let model_dir = model_dir.as_ref();

        if let Some(file) = &self.weights {
            return Ok(model_dir.join(file));
        }

        WEIGHTS_FILES
            .iter()
            .map(|file| model_dir.join(file))
            .find(|path| path.is_file())
            .ok_or_else(|| Error::MissingWeights {
                dir: model_dir.to_path_buf(),
                tried: WEIGHTS_FILES.join(", "),
            })
    }
}

/// Insert the keys of `defaults` missing from `value`, recursing into nested objects.
fn fill_defaults(value: &mut Value, defaults: Value) {
    if let (Value::Object(map), Value::Object(defaults)) = (value, defaults) {
        for (key, default) in defaults {
            match map.get_mut(&key) {
                Some(existing) => fill_defaults(existing, default),
                None => {
                    map.insert(key, default);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"architecture": "ResNet50"}"#).unwrap();
        let config = ModelConfig::from_dir(dir.path()).unwrap();

        assert_eq!(config.architecture, Architecture::ResNet50);
        assert_eq!(config.num_classes, None);
        assert_eq!((config.in_channels, config.height, config.width), (3, 224, 224));
        assert_eq!(config.activation, Activation::Softmax);
        assert_eq!(config.normalization.value_scale, 255.0);
        assert_eq!(config.normalization.mean, vec![0.485, 0.456, 0.406]);
        assert_eq!(config.bands, None);
    }

    #[test]
    fn partial_normalization_keeps_other_defaults() {
        let json = br#"{"architecture": "ResNet18", "normalization": {"value_scale": 1.0}}"#;
        let config = ModelConfig::from_json(json).unwrap();

        assert_eq!(config.normalization.value_scale, 1.0);
        assert_eq!(config.normalization.std, vec![0.229, 0.224, 0.225]);
        assert_eq!(config.height, 224);
    }

    #[test]
    fn architecture_is_required() {
        let err = ModelConfig::from_json(br#"{"in_channels": 4}"#).unwrap_err();
        assert!(err.to_string().contains("architecture"));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        assert!(matches!(
            ModelConfig::from_dir(dir.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn multiband_tagging_config() {
        let json = br#"{
            "architecture": "ResNet50",
            "in_channels": 4,
            "height": 256,
            "width": 256,
            "activation": "Sigmoid",
            "bands": [2, 1, 0, 3],
            "normalization": {"value_scale": 1.0, "mean": [117.0], "std": [1.0]}
        }"#;
        let config = ModelConfig::from_json(json).unwrap();
        assert!(config.validate().is_ok());

        let (mean, std) = config.normalization.per_channel(4);
        assert_eq!(mean, vec![117.0; 4]);
        assert_eq!(std, vec![1.0; 4]);
    }

    #[test]
    fn rejects_inconsistent_config() {
        let config = ModelConfig::new(Architecture::ResNet18).with_in_channels(4);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ModelConfig::new(Architecture::ResNet18)
            .with_bands(Some(vec![0, 1]))
            .with_normalization(NormalizationConfig::mean_scale(117.0, 1.0));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ModelConfig::new(Architecture::ResNet18)
            .with_normalization(NormalizationConfig::mean_scale(117.0, 0.0));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn weights_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig::new(Architecture::ResNet18);

        assert!(matches!(
            config.weights_path(dir.path()),
            Err(Error::MissingWeights { .. })
        ));

        std::fs::write(dir.path().join("model.pth"), b"").unwrap();
        assert_eq!(
            config.weights_path(dir.path()).unwrap(),
            dir.path().join("model.pth")
        );

        std::fs::write(dir.path().join("model.mpk"), b"").unwrap();
        assert_eq!(
            config.weights_path(dir.path()).unwrap(),
            dir.path().join("model.mpk")
        );

        let config = config.with_weights(Some("resnet50-11ad3fa6.pth".into()));
        assert_eq!(
            config.weights_path(dir.path()).unwrap(),
            dir.path().join("resnet50-11ad3fa6.pth")
        );
    }
}
