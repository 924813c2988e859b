use std::path::Path;

use burn::tensor::{
    activation::{sigmoid, softmax},
    backend::Backend,
    Device,
};

use crate::config::{Activation, ModelConfig, LABELS_FILE};
use crate::error::{Error, Result};
use crate::labels::Labels;
use crate::model::{resnet::ResNet, weights};
use crate::preprocess::Preprocessor;
use crate::raster::Raster;

/// A single class prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub probability: f32,
}

/// Class probabilities of one image.
#[derive(Debug, Clone)]
pub struct Classification {
    probabilities: Vec<f32>,
    labels: Labels,
}

impl Classification {
    pub fn new(probabilities: Vec<f32>, labels: Labels) -> Self {
        Self {
            probabilities,
            labels,
        }
    }

    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    fn prediction(&self, index: usize) -> Prediction {
        Prediction {
            index,
            label: self.labels.get(index).unwrap_or_default().to_string(),
            probability: self.probabilities[index],
        }
    }

    /// The most likely class. The first of equal maxima wins and NaN scores never win.
    pub fn best(&self) -> Option<Prediction> {
        let mut best: Option<usize> = None;
        for (index, &probability) in self.probabilities.iter().enumerate() {
            let better = match best {
                Some(b) => probability > self.probabilities[b],
                None => !probability.is_nan(),
            };
            if better {
                log::trace!("New best score {probability} at index {index}");
                best = Some(index);
            }
        }

        best.map(|index| self.prediction(index))
    }

    /// The `k` most likely classes, in decreasing order of probability.
    pub fn top_k(&self, k: usize) -> Vec<Prediction> {
        let mut indices: Vec<usize> = (0..self.probabilities.len())
            .filter(|&i| !self.probabilities[i].is_nan())
            .collect();
        // Stable sort keeps the lowest index first among equal scores
        indices.sort_by(|&a, &b| self.probabilities[b].total_cmp(&self.probabilities[a]));

        indices
            .into_iter()
            .take(k)
            .map(|index| self.prediction(index))
            .collect()
    }

    /// All classes with a probability of at least `threshold`, in label order.
    pub fn above(&self, threshold: f32) -> Vec<Prediction> {
        (0..self.probabilities.len())
            .filter(|&i| self.probabilities[i] >= threshold)
            .map(|index| self.prediction(index))
            .collect()
    }
}

/// Pre-trained image classifier loaded from a model directory.
pub struct ImageClassifier<B: Backend> {
    model: ResNet<B>,
    preprocessor: Preprocessor<B>,
    labels: Labels,
    config: ModelConfig,
    bands: Option<Vec<usize>>,
}

impl<B: Backend> ImageClassifier<B> {
    /// Load the config, labels and weights of a model directory.
    pub fn load(model_dir: impl AsRef<Path>, device: &Device<B>) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let config = ModelConfig::from_dir(model_dir)?;
        let labels = Labels::from_file(model_dir.join(LABELS_FILE))?;
        let weights = config.weights_path(model_dir)?;

        Self::from_parts(config, labels, &weights, device)
    }

    /// Build a classifier from an already loaded config and labels.
    pub fn from_parts(
        config: ModelConfig,
        labels: Labels,
        weights: &Path,
        device: &Device<B>,
    ) -> Result<Self> {
        config.validate()?;

        let num_classes = config.num_classes.unwrap_or(labels.len());
        if num_classes != labels.len() {
            return Err(Error::LabelCountMismatch {
                outputs: num_classes,
                labels: labels.len(),
            });
        }

        log::info!(
            "Creating {:?} with {} input channels and {num_classes} classes",
            config.architecture,
            config.in_channels
        );
        let model = ResNet::new(&config.architecture, num_classes, config.in_channels, device);
        let model = weights::load_weights(model, weights, device)?;

        Ok(Self {
            model,
            preprocessor: Preprocessor::new(&config, device),
            labels,
            bands: config.bands.clone(),
            config,
        })
    }

    /// Override the raster bands fed to the network.
    pub fn with_bands(mut self, bands: Vec<usize>) -> Result<Self> {
        if bands.len() != self.config.in_channels {
            return Err(Error::Config(format!(
                "{} bands selected for a network with {} input channels",
                bands.len(),
                self.config.in_channels
            )));
        }
        self.bands = Some(bands);
        Ok(self)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Classify a single raster.
    pub fn classify(&self, raster: &Raster) -> Result<Classification> {
        let data = match &self.bands {
            Some(bands) => raster.select_bands(bands)?.to_tensor_data(),
            None => raster.to_tensor_data(),
        };

        let input = self.preprocessor.forward(data)?;
        let output = self.model.forward(input);

        let shape = output.dims();
        if shape[0] != 1 {
            return Err(Error::UnexpectedOutputShape(shape.to_vec()));
        }

        let output = match self.config.activation {
            Activation::Softmax => softmax(output, 1),
            Activation::Sigmoid => sigmoid(output),
        };

        let probabilities = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| Error::Tensor(format!("{err:?}")))?;

        if probabilities.len() != self.labels.len() {
            return Err(Error::LabelCountMismatch {
                outputs: probabilities.len(),
                labels: self.labels.len(),
            });
        }

        Ok(Classification::new(probabilities, self.labels.clone()))
    }

    /// Save the loaded weights as a burn record.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        weights::save_weights(&self.model, path)?;
        log::info!("Saved weights to {}", path.display());
        Ok(())
    }
}
