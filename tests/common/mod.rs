//! Model directory and raster fixtures shared by the integration tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;

use burn::{backend::NdArray, config::Config};
use label_image_burn::{
    model::{resnet::ResNet, weights::save_weights},
    Architecture, ModelConfig, CONFIG_FILE, LABELS_FILE,
};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

pub type B = NdArray<f32>;

pub const LABELS: [&str; 3] = ["agriculture", "clear", "water"];

pub fn small_config() -> ModelConfig {
    ModelConfig::new(Architecture::ResNet18)
        .with_height(32)
        .with_width(32)
}

/// Write config, labels and random weights into a new model directory.
pub fn model_dir(config: &ModelConfig) -> TempDir {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();

    config.save(dir.path().join(CONFIG_FILE)).unwrap();
    std::fs::write(dir.path().join(LABELS_FILE), LABELS.join("\n") + "\n").unwrap();

    let model = ResNet::<B>::new(
        &config.architecture,
        LABELS.len(),
        config.in_channels,
        &device,
    );
    save_weights(&model, &dir.path().join("model.mpk")).unwrap();

    dir
}

/// Write a 4-band (RGB + NIR) 40x24 TIFF tile.
pub fn write_tile(path: &Path) {
    let (width, height) = (40u32, 24u32);
    let data: Vec<u8> = (0..width * height * 4).map(|i| (i % 251) as u8).collect();

    let mut buf = Cursor::new(Vec::new());
    TiffEncoder::new(&mut buf)
        .unwrap()
        .write_image::<colortype::RGBA8>(width, height, &data)
        .unwrap();
    std::fs::write(path, buf.into_inner()).unwrap();
}

/// Write a 48x36 RGB gradient picture.
pub fn write_picture(path: &Path) {
    image::RgbImage::from_fn(48, 36, |x, y| image::Rgb([x as u8 * 5, y as u8 * 7, 128]))
        .save(path)
        .unwrap();
}
