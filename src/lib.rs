//! Label images with pre-trained classification networks.
//!
//! A model directory holds a `config.json` ([ModelConfig]), a `labels.txt` with one class name
//! per line and the network weights, either as a burn record (`model.mpk`) or as a PyTorch
//! checkpoint (`model.pth`). Images are decoded into [rasters](Raster), which may carry any
//! number of bands (e.g., multi-band GeoTIFF satellite tiles).
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use label_image_burn::{decode_image, ImageClassifier};
//!
//! let device = Default::default();
//! let classifier = ImageClassifier::<NdArray>::load("models/planet", &device)?;
//! let raster = decode_image("tiles/train_10.tif")?;
//! let best = classifier.classify(&raster)?.best();
//! ```

mod classifier;
mod config;
mod decode;
mod error;
mod labels;
pub mod model;
mod preprocess;
mod raster;

pub use classifier::*;
pub use config::*;
pub use decode::*;
pub use error::{Error, Result};
pub use labels::*;
pub use preprocess::*;
pub use raster::*;
