use std::io::{Cursor, Read, Seek};
use std::path::Path;

use image::ImageFormat;
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::{PlanarConfiguration, Tag},
    ColorType,
};

use crate::error::{Error, Result};
use crate::raster::{Layout, Raster, Samples};

/// Decode an image file into a raster.
///
/// TIFF files (including GeoTIFF tiles) keep all of their bands and their native sample type.
/// Other formats supported by the `image` crate are decoded as 3-band RGB.
pub fn decode_image(path: impl AsRef<Path>) -> Result<Raster> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match image::guess_format(&bytes) {
        Ok(ImageFormat::Tiff) => {
            log::debug!("Decoding {} as TIFF", path.display());
            decode_tiff(Cursor::new(bytes))
        }
        _ => {
            log::debug!("Decoding {} with the image crate", path.display());
            decode_picture(&bytes)
        }
    }
}

/// Decode the first image of a TIFF stream.
pub fn decode_tiff<R: Read + Seek>(reader: R) -> Result<Raster> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let color_type = decoder.colortype()?;
    if let ColorType::Palette(_) = color_type {
        return Err(Error::UnsupportedRaster(
            "palette TIFF images are not supported".into(),
        ));
    }

    let planar = decoder.find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        == Some(PlanarConfiguration::Planar.to_u16());
    if planar {
        return decode_planar(&mut decoder, width, height);
    }

    let samples = samples_from(decoder.read_image()?)?;

    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(Error::InvalidRaster(format!(
            "{} samples do not fill a {width}x{height} image",
            samples.len()
        )));
    }
    let bands = samples.len() / pixels;

    log::debug!(
        "TIFF {width}x{height}, {bands} bands of {} ({color_type:?})",
        samples.type_name()
    );

    Raster::new(width, height, bands, Layout::Interleaved, samples)
}

/// Read a band-separate image (`PlanarConfiguration = 2`), one strip or tile at a time.
///
/// Chunks are stored band after band, each band split into `across * down` chunks in row-major
/// order.
fn decode_planar<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Result<Raster> {
    let bands = decoder
        .find_tag_unsigned::<usize>(Tag::SamplesPerPixel)?
        .unwrap_or(1);
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
    let across = width.div_ceil(chunk_width);
    let chunks_per_band = across * height.div_ceil(chunk_height);

    let mut planes = Vec::with_capacity(bands);
    for band in 0..bands {
        let mut band_samples: Option<Samples> = None;
        // Position of each pixel of the plane in the concatenated chunks
        let mut order = vec![0; width * height];
        let mut offset = 0;

        for chunk in 0..chunks_per_band {
            let row = chunk / across * chunk_height;
            let col = chunk % across * chunk_width;
            let (w, h) = (chunk_width.min(width - col), chunk_height.min(height - row));

            let index = band * chunks_per_band + chunk;
            let samples = samples_from(decoder.read_chunk(index as u32)?)?;
            // Edge tiles of the later bands may still carry their padding rows
            if samples.len() < w * h {
                return Err(Error::InvalidRaster(format!(
                    "chunk {index} holds {} samples, expected {}",
                    samples.len(),
                    w * h
                )));
            }

            for r in 0..h {
                for c in 0..w {
                    order[(row + r) * width + col + c] = offset + r * w + c;
                }
            }
            offset += samples.len();

            match &mut band_samples {
                Some(all) => all.extend(samples)?,
                None => band_samples = Some(samples),
            }
        }

        let band_samples = band_samples
            .ok_or_else(|| Error::InvalidRaster(format!("band {band} has no chunks")))?;
        planes.push(band_samples.gather(&order));
    }

    log::debug!("Planar TIFF {width}x{height}, {bands} bands in {chunks_per_band} chunks per band");

    Raster::from_planes(width, height, planes)
}

fn samples_from(result: DecodingResult) -> Result<Samples> {
    match result {
        DecodingResult::U8(v) => Ok(Samples::U8(v)),
        DecodingResult::U16(v) => Ok(Samples::U16(v)),
        DecodingResult::U32(v) => Ok(Samples::U32(v)),
        DecodingResult::I8(v) => Ok(Samples::I8(v)),
        DecodingResult::I16(v) => Ok(Samples::I16(v)),
        DecodingResult::I32(v) => Ok(Samples::I32(v)),
        DecodingResult::F32(v) => Ok(Samples::F32(v)),
        DecodingResult::F64(v) => Ok(Samples::F64(v)),
        DecodingResult::U64(_) | DecodingResult::I64(_) => Err(Error::UnsupportedRaster(
            "64-bit integer samples are not supported".into(),
        )),
    }
}

/// Decode an encoded picture (JPEG, PNG, ...) as RGB.
pub fn decode_picture(bytes: &[u8]) -> Result<Raster> {
    let img = image::load_from_memory(bytes)?.into_rgb8();
    let (width, height) = (img.width() as usize, img.height() as usize);

    Raster::new(
        width,
        height,
        3,
        Layout::Interleaved,
        Samples::U8(img.into_raw()),
    )
}
