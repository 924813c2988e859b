use burn::tensor::TensorData;

use crate::error::{Error, Result};

/// Typed sample storage of a raster.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::I8(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::I32(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the sample type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Samples::U8(_) => "u8",
            Samples::U16(_) => "u16",
            Samples::U32(_) => "u32",
            Samples::I8(_) => "i8",
            Samples::I16(_) => "i16",
            Samples::I32(_) => "i32",
            Samples::F32(_) => "f32",
            Samples::F64(_) => "f64",
        }
    }

    /// Sample at `index` converted to a byte.
    ///
    /// Unsigned integers are rescaled by their bit depth, signed integers and floats saturate
    /// to `[0, 255]`.
    fn byte(&self, index: usize) -> u8 {
        match self {
            Samples::U8(v) => v[index],
            Samples::U16(v) => (v[index] >> 8) as u8,
            Samples::U32(v) => (v[index] >> 24) as u8,
            Samples::I8(v) => v[index].max(0) as u8,
            Samples::I16(v) => v[index].clamp(0, 255) as u8,
            Samples::I32(v) => v[index].clamp(0, 255) as u8,
            // `as` saturates and maps NaN to 0
            Samples::F32(v) => v[index].round() as u8,
            Samples::F64(v) => v[index].round() as u8,
        }
    }

    /// Collect the samples at the given indices, keeping the sample type.
    pub(crate) fn gather(&self, indices: &[usize]) -> Samples {
        fn pick<T: Copy>(values: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| values[i]).collect()
        }

        match self {
            Samples::U8(v) => Samples::U8(pick(v, indices)),
            Samples::U16(v) => Samples::U16(pick(v, indices)),
            Samples::U32(v) => Samples::U32(pick(v, indices)),
            Samples::I8(v) => Samples::I8(pick(v, indices)),
            Samples::I16(v) => Samples::I16(pick(v, indices)),
            Samples::I32(v) => Samples::I32(pick(v, indices)),
            Samples::F32(v) => Samples::F32(pick(v, indices)),
            Samples::F64(v) => Samples::F64(pick(v, indices)),
        }
    }

    /// Append `other` to `self`. Both must hold the same sample type.
    pub(crate) fn extend(&mut self, other: Samples) -> Result<()> {
        match (self, other) {
            (Samples::U8(a), Samples::U8(b)) => a.extend(b),
            (Samples::U16(a), Samples::U16(b)) => a.extend(b),
            (Samples::U32(a), Samples::U32(b)) => a.extend(b),
            (Samples::I8(a), Samples::I8(b)) => a.extend(b),
            (Samples::I16(a), Samples::I16(b)) => a.extend(b),
            (Samples::I32(a), Samples::I32(b)) => a.extend(b),
            (Samples::F32(a), Samples::F32(b)) => a.extend(b),
            (Samples::F64(a), Samples::F64(b)) => a.extend(b),
            (a, b) => {
                return Err(Error::InvalidRaster(format!(
                    "bands mix {} and {} samples",
                    a.type_name(),
                    b.type_name()
                )))
            }
        }
        Ok(())
    }
}

/// Memory order of the samples of a [raster](Raster).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Pixel-major order `[row][col][band]`.
    Interleaved,
    /// Band-sequential order `[band][row][col]`, one plane per band.
    Planar,
}

/// A `height x width` raster with any number of bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    bands: usize,
    layout: Layout,
    samples: Samples,
}

impl Raster {
    /// Create a new raster, checking that the sample count matches the dimensions.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        layout: Layout,
        samples: Samples,
    ) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(Error::InvalidRaster(format!(
                "empty raster ({width}x{height} with {bands} bands)"
            )));
        }

        let expected = width * height * bands;
        if samples.len() != expected {
            return Err(Error::InvalidRaster(format!(
                "{width}x{height} raster with {bands} bands needs {expected} samples, got {}",
                samples.len()
            )));
        }

        Ok(Self {
            width,
            height,
            bands,
            layout,
            samples,
        })
    }

    /// Create a planar raster from one plane of `width * height` samples per band.
    pub fn from_planes(width: usize, height: usize, planes: Vec<Samples>) -> Result<Self> {
        let bands = planes.len();
        let mut planes = planes.into_iter();
        let mut samples = planes
            .next()
            .ok_or_else(|| Error::InvalidRaster("raster has no bands".into()))?;

        for (band, plane) in planes.enumerate() {
            if plane.len() != width * height {
                return Err(Error::InvalidRaster(format!(
                    "band {} holds {} samples, expected {}",
                    band + 1,
                    plane.len(),
                    width * height
                )));
            }
            samples.extend(plane)?;
        }

        Self::new(width, height, bands, Layout::Planar, samples)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// Position of sample `(row, col, band)` in the sample buffer.
    fn index(&self, row: usize, col: usize, band: usize) -> usize {
        match self.layout {
            Layout::Interleaved => (row * self.width + col) * self.bands + band,
            Layout::Planar => band * self.width * self.height + row * self.width + col,
        }
    }

    /// Keep only the given bands, in the given order.
    pub fn select_bands(&self, bands: &[usize]) -> Result<Self> {
        if let Some(&band) = bands.iter().find(|&&b| b >= self.bands) {
            return Err(Error::BandOutOfRange {
                band,
                bands: self.bands,
            });
        }

        let pixels = self.width * self.height;
        let indices: Vec<usize> = match self.layout {
            Layout::Interleaved => (0..pixels)
                .flat_map(|p| bands.iter().map(move |&b| p * self.bands + b))
                .collect(),
            Layout::Planar => bands
                .iter()
                .flat_map(|&b| (0..pixels).map(move |p| b * pixels + p))
                .collect(),
        };

        Self::new(
            self.width,
            self.height,
            bands.len(),
            self.layout,
            self.samples.gather(&indices),
        )
    }

    /// Flatten the raster into bytes in `[height, width, bands]` row-major order.
    pub fn to_interleaved_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.width * self.height * self.bands];
        for row in 0..self.height {
            for col in 0..self.width {
                let offset = (row * self.width + col) * self.bands;
                for band in 0..self.bands {
                    bytes[offset + band] = self.samples.byte(self.index(row, col, band));
                }
            }
        }
        bytes
    }

    /// The raster as `u8` tensor data of shape `[height, width, bands]`.
    pub fn to_tensor_data(&self) -> TensorData {
        TensorData::new(
            self.to_interleaved_bytes(),
            [self.height, self.width, self.bands],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::DType;

    // 2 rows x 3 cols, value = 100 * band + 10 * row + col
    fn planes() -> Vec<Samples> {
        (0..3u8)
            .map(|band| {
                Samples::U8(
                    (0..2u8)
                        .flat_map(|row| (0..3u8).map(move |col| 100 * band + 10 * row + col))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn planar_to_interleaved() {
        let raster = Raster::from_planes(3, 2, planes()).unwrap();
        assert_eq!(raster.layout(), Layout::Planar);

        let bytes = raster.to_interleaved_bytes();
        assert_eq!(
            bytes,
            vec![
                0, 100, 200, 1, 101, 201, 2, 102, 202, //
                10, 110, 210, 11, 111, 211, 12, 112, 212,
            ]
        );
    }

    #[test]
    fn interleaved_is_unchanged() {
        let samples: Vec<u8> = (0..24).collect();
        let raster =
            Raster::new(3, 2, 4, Layout::Interleaved, Samples::U8(samples.clone())).unwrap();
        assert_eq!(raster.to_interleaved_bytes(), samples);
    }

    #[test]
    fn tensor_data_is_tagged_u8() {
        let raster = Raster::from_planes(3, 2, planes()).unwrap();
        let data = raster.to_tensor_data();

        assert_eq!(data.dtype, DType::U8);
        assert_eq!(data.shape, vec![2, 3, 3]);
    }

    #[test]
    fn select_bands_reorders() {
        let raster = Raster::from_planes(3, 2, planes()).unwrap();
        let bgr = raster.select_bands(&[2, 1, 0]).unwrap();

        assert_eq!(bgr.bands(), 3);
        assert_eq!(&bgr.to_interleaved_bytes()[..6], &[200, 100, 0, 201, 101, 1]);

        let interleaved = Raster::new(
            3,
            2,
            3,
            Layout::Interleaved,
            Samples::U8(raster.to_interleaved_bytes()),
        )
        .unwrap();
        assert_eq!(
            interleaved.select_bands(&[2, 1, 0]).unwrap().to_interleaved_bytes(),
            bgr.to_interleaved_bytes()
        );
    }

    #[test]
    fn select_bands_out_of_range() {
        let raster = Raster::from_planes(3, 2, planes()).unwrap();
        assert!(matches!(
            raster.select_bands(&[0, 3]),
            Err(Error::BandOutOfRange { band: 3, bands: 3 })
        ));
    }

    #[test]
    fn rejects_wrong_sample_count() {
        let result = Raster::new(2, 2, 3, Layout::Interleaved, Samples::U8(vec![0; 11]));
        assert!(matches!(result, Err(Error::InvalidRaster(_))));

        let result = Raster::from_planes(
            2,
            1,
            vec![Samples::U8(vec![1, 2]), Samples::U16(vec![1, 2])],
        );
        assert!(matches!(result, Err(Error::InvalidRaster(_))));
    }

    #[test]
    fn wide_samples_convert_to_bytes() {
        let raster = Raster::from_planes(
            2,
            1,
            vec![
                Samples::U16(vec![0xFFFF, 0x0100]),
                Samples::U16(vec![0x8000, 0x00FF]),
            ],
        )
        .unwrap();
        assert_eq!(raster.to_interleaved_bytes(), vec![255, 128, 1, 0]);

        let raster = Raster::new(
            4,
            1,
            1,
            Layout::Interleaved,
            Samples::F32(vec![-3.0, 12.4, 300.0, f32::NAN]),
        )
        .unwrap();
        assert_eq!(raster.to_interleaved_bytes(), vec![0, 12, 255, 0]);

        let raster =
            Raster::new(2, 1, 1, Layout::Interleaved, Samples::I16(vec![-7, 1000])).unwrap();
        assert_eq!(raster.to_interleaved_bytes(), vec![0, 255]);
    }
}
