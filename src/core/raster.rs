//! Single-channel float rasters and the immutable target image.

use crate::error::{FitError, Result};

/// A row-major single-channel image of `f32` intensities.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Raster {
    /// All-zero raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width as usize) * (height as usize)],
        }
    }

    /// Wrap an existing buffer. Fails if `data.len() != width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(FitError::config(format!(
                "raster buffer has {} values, expected {width}x{height}={expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a raster by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Largest value and its flat index (first occurrence). `None` for an empty raster.
    ///
    /// NaN values are skipped.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((i, v)),
            }
        }
        best
    }
}

/// The grayscale image being approximated: non-empty, finite, values in `[0, 1]`.
///
/// Built once per session and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct TargetImage {
    raster: Raster,
}

impl TargetImage {
    pub fn new(raster: Raster) -> Result<Self> {
        if raster.width() == 0 || raster.height() == 0 {
            return Err(FitError::config(format!(
                "target image must be non-empty, got {}x{}",
                raster.width(),
                raster.height()
            )));
        }
        if let Some(bad) = raster
            .data()
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(FitError::config(format!(
                "target intensities must lie in [0, 1], found {bad}"
            )));
        }
        Ok(Self { raster })
    }

    pub fn from_fn(width: u32, height: u32, f: impl FnMut(u32, u32) -> f32) -> Result<Self> {
        Self::new(Raster::from_fn(width, height, f))
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}
