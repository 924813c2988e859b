#![recursion_limit = "256"] // wgpu

use std::{path::PathBuf, process::ExitCode, time::Instant};

use burn::tensor::backend::Backend;
use clap::Parser;
use label_image_burn::{decode_image, Activation, ImageClassifier, Result};
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    prelude::*,
    registry,
};

#[cfg(not(any(
    feature = "ndarray",
    feature = "wgpu",
    feature = "tch-cpu",
    feature = "tch-gpu"
)))]
compile_error!("At least one backend feature must be enabled: ndarray, wgpu, tch-cpu or tch-gpu");

/// Threshold used to list tags when the model was trained for multi-label classification.
const DEFAULT_TAG_THRESHOLD: f32 = 0.5;

/// Label an image with a pre-trained classification network.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory containing config.json, labels.txt and the model weights.
    model_dir: PathBuf,

    /// Image to label: a TIFF/GeoTIFF raster with any number of bands, or a JPEG/PNG picture.
    image: PathBuf,

    /// Also list the k most likely labels.
    #[arg(short = 'k', long, default_value_t = 1)]
    top_k: usize,

    /// List every label with a probability of at least this value.
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Raster bands fed to the network, in order (e.g., `2,1,0`).
    #[arg(short, long, value_delimiter = ',')]
    bands: Option<Vec<usize>>,

    /// Save the loaded weights as a burn record (`.mpk`).
    #[arg(long)]
    export: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run<B: Backend>(args: &Args, device: B::Device) -> Result<()> {
    let start = Instant::now();

    let mut classifier = ImageClassifier::<B>::load(&args.model_dir, &device)?;
    if let Some(bands) = &args.bands {
        classifier = classifier.with_bands(bands.clone())?;
    }
    if let Some(path) = &args.export {
        classifier.export(path)?;
    }

    let raster = decode_image(&args.image)?;
    log::info!(
        "Decoded {} ({}x{}, {} bands)",
        args.image.display(),
        raster.width(),
        raster.height(),
        raster.bands()
    );

    let result = classifier.classify(&raster)?;

    match result.best() {
        Some(best) => println!(
            "BEST MATCH: {} ({:.2}% likely)",
            best.label,
            best.probability * 100.0
        ),
        None => println!("BEST MATCH: none (no valid score)"),
    }

    if args.top_k > 1 {
        for (rank, prediction) in result.top_k(args.top_k).iter().enumerate() {
            println!(
                "{:>3}. {} ({:.2}%)",
                rank + 1,
                prediction.label,
                prediction.probability * 100.0
            );
        }
    }

    let threshold = args.threshold.or_else(|| {
        (classifier.config().activation == Activation::Sigmoid).then_some(DEFAULT_TAG_THRESHOLD)
    });
    if let Some(threshold) = threshold {
        let tags: Vec<String> = result
            .above(threshold)
            .into_iter()
            .map(|prediction| prediction.label)
            .collect();
        println!("TAGS: {}", tags.join(", "));
    }

    println!("Elapsed: {} ms", start.elapsed().as_millis());

    Ok(())
}

#[cfg(feature = "ndarray")]
mod ndarray {
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    pub fn run(args: &super::Args) -> label_image_burn::Result<()> {
        super::run::<NdArray>(args, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::wgpu::{Wgpu, WgpuDevice};

    pub fn run(args: &super::Args) -> label_image_burn::Result<()> {
        super::run::<Wgpu>(args, WgpuDevice::default())
    }
}

#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
mod tch {
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};

    pub fn run(args: &super::Args) -> label_image_burn::Result<()> {
        #[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(all(feature = "tch-gpu", target_os = "macos"))]
        let device = LibTorchDevice::Mps;
        #[cfg(not(feature = "tch-gpu"))]
        let device = LibTorchDevice::Cpu;

        super::run::<LibTorch>(args, device)
    }
}

/// Run on the first enabled backend, accelerators first.
#[allow(unreachable_code)]
fn launch(args: &Args) -> Result<()> {
    #[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
    return tch::run(args);

    #[cfg(feature = "wgpu")]
    return wgpu::run(args);

    #[cfg(feature = "ndarray")]
    return ndarray::run(args);
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                // The wgpu crate is logging too much, so we skip `info` level and below.
                if path.starts_with("wgpu") && *m.level() > LevelFilter::WARN {
                    return false;
                }
            }
            true
        }));
    registry().with(layer).init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    match launch(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
