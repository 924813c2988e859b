use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read [{}]: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model config: {0}")]
    Config(String),

    #[error("Label file [{}] contains no labels", .0.display())]
    EmptyLabels(PathBuf),

    #[error("Model produces {outputs} scores but {labels} labels were provided")]
    LabelCountMismatch { outputs: usize, labels: usize },

    #[error("No weights file found in [{}] (tried {tried})", .dir.display())]
    MissingWeights { dir: PathBuf, tried: String },

    #[error("Unsupported weights file [{}]: expected .mpk, .pth or .pt", .0.display())]
    UnsupportedWeights(PathBuf),

    #[error("Failed to load weights.\nError: {0}")]
    Recorder(String),

    #[error("Weights do not match the model config: {0}")]
    WeightsMismatch(String),

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to decode TIFF: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Unsupported raster: {0}")]
    UnsupportedRaster(String),

    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Band {band} is out of range for a raster with {bands} bands")]
    BandOutOfRange { band: usize, bands: usize },

    #[error("Expected an image with {expected} bands, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Expected model to produce a [1 N] shaped tensor where N is the number of labels, instead it produced one with shape {0:?}")]
    UnexpectedOutputShape(Vec<usize>),

    #[error("Tensor data error: {0}")]
    Tensor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
