//! Pixel-domain tensors: images, feature maps and masks.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};

use crate::error::{AugmentError, Result};
use crate::geometry::{crop_hwc, fill_hwc, remap_grid, Descriptor};

/// Single-channel `f32` image used to run `image` crate operations per channel.
pub(crate) type PlaneBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// An (H, W, C) `f32` tensor in row-major, channel-interleaved order.
///
/// Pixel images keep their 0-255 range as floats; feature maps (ELA, blur
/// residuals) and masks use whatever range their producer chose.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Wrap an interleaved (H, W, C) buffer.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if any dimension is zero or the
    /// buffer length is not `height * width * channels`.
    pub fn new(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        if height == 0 || width == 0 || channels == 0 {
            return Err(AugmentError::InvalidArgument(format!(
                "tensor dimensions must be non-zero, got {height}x{width}x{channels}"
            )));
        }
        if data.len() != height * width * channels {
            return Err(AugmentError::InvalidArgument(format!(
                "tensor buffer holds {} values, expected {}",
                data.len(),
                height * width * channels
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// Tensor filled with zeros.
    pub fn zeros(height: usize, width: usize, channels: usize) -> Result<Self> {
        Self::new(height, width, channels, vec![0.0; height * width * channels])
    }

    /// Create a 3-channel tensor from an `image::RgbImage`.
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            height: height as usize,
            width: width as usize,
            channels: 3,
            data: img.as_raw().iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Create a 1-channel tensor from an `image::GrayImage`.
    pub fn from_gray_image(img: &GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            height: height as usize,
            width: width as usize,
            channels: 1,
            data: img.as_raw().iter().map(|&v| f32::from(v)).collect(),
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Shape as (H, W, C).
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, channel: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + channel]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, channel: usize, value: f32) {
        self.data[(y * self.width + x) * self.channels + channel] = value;
    }

    /// Apply a dihedral transform to the pixel grid.
    pub fn transform(&self, descriptor: Descriptor) -> Self {
        if descriptor == Descriptor::Identity {
            return self.clone();
        }

        let (data, height, width) =
            remap_grid(&self.data, self.height, self.width, self.channels, descriptor);
        Self {
            height,
            width,
            channels: self.channels,
            data,
        }
    }

    /// Copy the `height x width` region whose top-left corner is `(top, left)`.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the region is empty or
    /// extends beyond the tensor.
    pub fn crop(&self, top: usize, left: usize, height: usize, width: usize) -> Result<Self> {
        check_region(self.height, self.width, top, left, height, width)?;

        // Fast path: full crop returns a clone
        if top == 0 && left == 0 && height == self.height && width == self.width {
            return Ok(self.clone());
        }

        Ok(Self {
            height,
            width,
            channels: self.channels,
            data: crop_hwc(&self.data, self.width, self.channels, (top, left), (height, width)),
        })
    }

    /// Overwrite every channel of a rectangular region with `value`.
    ///
    /// The region is clipped to the tensor bounds.
    pub fn fill_rect(&mut self, top: usize, left: usize, height: usize, width: usize, value: f32) {
        let shape = self.shape();
        fill_hwc(&mut self.data, shape, (top, left), (height, width), value);
    }

    /// Split into one `image` buffer per channel.
    pub(crate) fn to_planes(&self) -> Vec<PlaneBuffer> {
        (0..self.channels)
            .map(|c| {
                PlaneBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
                    Luma([self.get(y as usize, x as usize, c)])
                })
            })
            .collect()
    }

    /// Inverse of [`ImageTensor::to_planes`].
    pub(crate) fn from_planes(planes: &[PlaneBuffer]) -> Result<Self> {
        let first = planes.first().ok_or_else(|| {
            AugmentError::InvalidArgument("at least one plane is required".to_string())
        })?;
        let (width, height) = first.dimensions();
        if planes.iter().any(|p| p.dimensions() != (width, height)) {
            return Err(AugmentError::InvalidArgument(
                "planes must share one size".to_string(),
            ));
        }

        let len = (width * height) as usize;
        let mut data = Vec::with_capacity(len * planes.len());
        for i in 0..len {
            for plane in planes {
                data.push(plane.as_raw()[i]);
            }
        }

        Self::new(height as usize, width as usize, planes.len(), data)
    }

    /// Quantize to an 8-bit `image` (1 or 3 channels), clamping to 0-255.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` for other channel counts.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        let bytes: Vec<u8> = self
            .data
            .iter()
            .map(|&v| v.clamp(0.0, 255.0).round() as u8)
            .collect();
        let (w, h) = (self.width as u32, self.height as u32);

        let image = match self.channels {
            1 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
            c => {
                return Err(AugmentError::InvalidArgument(format!(
                    "8-bit conversion supports 1 or 3 channels, got {c}"
                )))
            }
        };

        image.ok_or_else(|| AugmentError::InvalidArgument("pixel buffer size mismatch".to_string()))
    }

    /// Convert an 8-bit `image` back, keeping `channels` (1 or 3).
    pub fn from_dynamic_image(image: DynamicImage, channels: usize) -> Result<Self> {
        match channels {
            1 => Ok(Self::from_gray_image(&image.into_luma8())),
            3 => Ok(Self::from_rgb_image(&image.into_rgb8())),
            c => Err(AugmentError::InvalidArgument(format!(
                "8-bit conversion supports 1 or 3 channels, got {c}"
            ))),
        }
    }
}

/// Check that a region is non-empty and inside a `rows x cols` grid.
pub(crate) fn check_region(
    rows: usize,
    cols: usize,
    top: usize,
    left: usize,
    height: usize,
    width: usize,
) -> Result<()> {
    let fits = |start: usize, len: usize, limit: usize| {
        len > 0 && start.checked_add(len).is_some_and(|end| end <= limit)
    };
    if !fits(top, height, rows) || !fits(left, width, cols) {
        return Err(AugmentError::InvalidArgument(format!(
            "region {height}x{width} at ({top}, {left}) does not fit in {rows}x{cols}"
        )));
    }
    Ok(())
}
