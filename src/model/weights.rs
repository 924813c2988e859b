use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{backend::Backend, Device},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use super::resnet::ResNet;
use crate::error::{Error, Result};

/// Supported weights file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    /// Burn named MessagePack record (`.mpk`).
    Burn,
    /// PyTorch `state_dict` checkpoint (`.pth`, `.pt`).
    PyTorch,
}

impl WeightsFormat {
    /// Guess the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("mpk") => Ok(Self::Burn),
            Some("pth") | Some("pt") => Ok(Self::PyTorch),
            _ => Err(Error::UnsupportedWeights(path.to_path_buf())),
        }
    }
}

/// Load the weights stored at `path` into the model.
///
/// The loaded weights must match the shape of the model's input convolution and classification
/// layer.
pub fn load_weights<B: Backend>(
    model: ResNet<B>,
    path: &Path,
    device: &Device<B>,
) -> Result<ResNet<B>> {
    let (in_channels, num_classes) = (model.in_channels(), model.num_classes());

    let model = match WeightsFormat::from_path(path)? {
        WeightsFormat::Burn => {
            log::info!("Loading burn record {}", path.display());
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            model
                .load_file(path.to_path_buf(), &recorder, device)
                .map_err(|err| Error::Recorder(format!("{err}")))?
        }
        WeightsFormat::PyTorch => {
            log::info!("Loading PyTorch checkpoint {}", path.display());
            // Load weights from torch state_dict
            let load_args = LoadArgs::new(path.to_path_buf())
                // Map *.downsample.0.* -> *.downsample.conv.*
                .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
                // Map *.downsample.1.* -> *.downsample.bn.*
                .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2")
                // Map layer[i].[j].* -> layer[i].blocks.[j].*
                .with_key_remap("(layer[1-4])\\.([0-9]+)\\.(.+)", "$1.blocks.$2.$3");
            let record = PyTorchFileRecorder::<FullPrecisionSettings>::new()
                .load(load_args, device)
                .map_err(|err| Error::Recorder(format!("{err}")))?;

            model.load_record(record)
        }
    };

    if model.in_channels() != in_channels {
        return Err(Error::WeightsMismatch(format!(
            "weights expect {} input channels, config has {in_channels}",
            model.in_channels()
        )));
    }
    if model.num_classes() != num_classes {
        return Err(Error::WeightsMismatch(format!(
            "weights produce {} classes, config has {num_classes}",
            model.num_classes()
        )));
    }

    Ok(model)
}

/// Save the model weights as a burn named MessagePack record.
pub fn save_weights<B: Backend>(model: &ResNet<B>, path: &Path) -> Result<()> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone() // `save_file` takes ownership
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|err| {
            Error::Recorder(format!(
                "Failed to save weights to file {}.\nError: {err}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Architecture;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            WeightsFormat::from_path(Path::new("model.mpk")).unwrap(),
            WeightsFormat::Burn
        );
        assert_eq!(
            WeightsFormat::from_path(Path::new("resnet50-0676ba61.pth")).unwrap(),
            WeightsFormat::PyTorch
        );
        assert!(matches!(
            WeightsFormat::from_path(Path::new("graph.pb")),
            Err(Error::UnsupportedWeights(_))
        ));
    }

    #[test]
    fn save_and_load_burn_record() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mpk");

        let saved = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        save_weights(&saved, &path).unwrap();
        assert!(path.exists());

        let model = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        let model = load_weights(model, &path, &device).unwrap();
        assert_eq!(model.num_classes(), 10);

        let model = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        assert!(matches!(
            load_weights(model, &dir.path().join("missing.mpk"), &device),
            Err(Error::Recorder(_))
        ));
    }

    #[test]
    fn rejects_weights_of_another_shape() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("multiband.mpk");
        let saved = ResNet::<B>::new(&Architecture::ResNet18, 10, 4, &device);
        save_weights(&saved, &path).unwrap();

        let model = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        assert!(matches!(
            load_weights(model, &path, &device),
            Err(Error::WeightsMismatch(msg)) if msg.contains("4 input channels")
        ));

        let path = dir.path().join("ten_classes.mpk");
        let saved = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        save_weights(&saved, &path).unwrap();

        let model = ResNet::<B>::new(&Architecture::ResNet18, 5, 3, &device);
        assert!(matches!(
            load_weights(model, &path, &device),
            Err(Error::WeightsMismatch(msg)) if msg.contains("10 classes")
        ));
    }

    #[test]
    fn pytorch_and_unknown_extensions() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        let model = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        assert!(matches!(
            load_weights(model, &dir.path().join("resnet18.pth"), &device),
            Err(Error::Recorder(_))
        ));

        let model = ResNet::<B>::new(&Architecture::ResNet18, 10, 3, &device);
        assert!(matches!(
            load_weights(model, &dir.path().join("graph.pb"), &device),
            Err(Error::UnsupportedWeights(_))
        ));
    }
}
