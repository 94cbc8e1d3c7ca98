//! Whole-image DCT transforms built from the block grid.
//!
//! A [`DctImage`] stores planes of JPEG coefficients (usually Y, Cb, Cr) in
//! pixel-position layout: coefficient `(u, v)` of block `(r, c)` sits at pixel
//! `(8r + u, 8c + v)`. Transforming it is a two-level operation:
//!
//! 1. Each plane is viewed as a [`BlockGrid`] of shape `(H/8, W/8, 64)`
//! 2. The grid is permuted exactly like a pixel image at block resolution
//! 3. Every block is corrected by the block engine with the same descriptor
//! 4. The planes are converted back and re-interleaved
//!
//! Steps 2 and 3 touch independent axes, so their order does not matter.

use std::borrow::Cow;
use std::ops::Neg;

use super::block::{transform_flat, DctBlock, BLOCK_LEN, BLOCK_SIZE};
use crate::error::{AugmentError, Result};
use crate::geometry::{crop_hwc, fill_hwc, remap_grid, Descriptor, QuarterTurns};
use crate::target::check_region;

/// Number of coefficient planes in a DCT image (Y, Cb, Cr).
pub const DCT_CHANNELS: usize = 3;

/// A DCT coefficient image of shape (H, W, C), channel-interleaved.
///
/// `C` is 3 (Y, Cb, Cr) for a full JPEG image; single planes stored under
/// their own sample key use `C = 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DctImage<T> {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<T>,
}

impl<T: Copy> DctImage<T> {
    /// Wrap an interleaved (H, W, 3) coefficient buffer.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if either dimension is zero or
    /// not a multiple of 8, or if `data.len() != height * width * 3`.
    pub fn new(height: usize, width: usize, data: Vec<T>) -> Result<Self> {
        Self::with_channels(height, width, DCT_CHANNELS, data)
    }

    /// Wrap an interleaved (H, W, C) coefficient buffer.
    pub fn with_channels(
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<T>,
    ) -> Result<Self> {
        check_block_aligned(height, width)?;
        if channels == 0 {
            return Err(AugmentError::InvalidArgument(
                "DCT image needs at least one channel".to_string(),
            ));
        }

        let expected = height * width * channels;
        if data.len() != expected {
            return Err(AugmentError::InvalidArgument(format!(
                "DCT buffer holds {} values, expected {expected} for {height}x{width}x{channels}",
                data.len()
            )));
        }

        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// 3-channel image filled with a single value.
    pub fn filled(height: usize, width: usize, value: T) -> Result<Self> {
        Self::new(height, width, vec![value; height * width * DCT_CHANNELS])
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
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<T> {
        self.data
    }

    /// Coefficient at pixel position `(y, x)` of `channel`.
    #[inline]
    pub fn get(&self, y: usize, x: usize, channel: usize) -> T {
        self.data[(y * self.width + x) * self.channels + channel]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, channel: usize, value: T) {
        self.data[(y * self.width + x) * self.channels + channel] = value;
    }

    /// Copy a block-aligned region of every channel.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the region is out of bounds
    /// or any of its edges does not fall on the 8x8 block grid.
    pub fn crop(&self, top: usize, left: usize, height: usize, width: usize) -> Result<Self> {
        if top % BLOCK_SIZE != 0 || left % BLOCK_SIZE != 0 {
            return Err(AugmentError::InvalidArgument(format!(
                "DCT crop origin ({top}, {left}) is not block-aligned"
            )));
        }
        check_region(self.height, self.width, top, left, height, width)?;

        let data = crop_hwc(&self.data, self.width, self.channels, (top, left), (height, width));
        Self::with_channels(height, width, self.channels, data)
    }

    /// Overwrite every channel of a region with `value`.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the region is out of bounds
    /// or would cover only part of a block.
    pub fn fill_region(
        &mut self,
        top: usize,
        left: usize,
        height: usize,
        width: usize,
        value: T,
    ) -> Result<()> {
        if [top, left, height, width].iter().any(|v| v % BLOCK_SIZE != 0) {
            return Err(AugmentError::InvalidArgument(format!(
                "DCT fill {height}x{width} at ({top}, {left}) does not cover whole blocks"
            )));
        }
        check_region(self.height, self.width, top, left, height, width)?;

        let shape = self.shape();
        fill_hwc(&mut self.data, shape, (top, left), (height, width), value);
        Ok(())
    }

    /// Extract one channel as a row-major (H, W) plane.
    pub fn plane(&self, channel: usize) -> Vec<T> {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
            .collect()
    }

    /// Block-grid view of one channel.
    pub fn channel_grid(&self, channel: usize) -> BlockGrid<T> {
        BlockGrid::from_plane_unchecked(&self.plane(channel), self.height, self.width)
    }

    /// Block-grid views of every channel, in channel order.
    pub fn channel_grids(&self) -> Vec<BlockGrid<T>> {
        (0..self.channels).map(|c| self.channel_grid(c)).collect()
    }

    /// Reassemble an image from the block grids of its channels.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if no grid is given or the
    /// grids differ in shape.
    pub fn from_channel_grids(grids: &[BlockGrid<T>]) -> Result<Self> {
        let first = grids.first().ok_or_else(|| {
            AugmentError::InvalidArgument("at least one channel grid is required".to_string())
        })?;
        let (rows, cols) = (first.rows(), first.cols());
        if grids.iter().any(|g| g.rows() != rows || g.cols() != cols) {
            return Err(AugmentError::InvalidArgument(
                "channel grids must share one shape".to_string(),
            ));
        }

        let planes: Vec<Vec<T>> = grids.iter().map(BlockGrid::to_plane).collect();
        let (height, width) = (rows * BLOCK_SIZE, cols * BLOCK_SIZE);

        Self::with_channels(height, width, planes.len(), interleave(&planes, height * width))
    }
}

/// Interleave equally sized planes into an (N, C) buffer.
fn interleave<T: Copy>(planes: &[Vec<T>], len: usize) -> Vec<T> {
    let mut data = Vec::with_capacity(len * planes.len());
    for i in 0..len {
        for plane in planes {
            data.push(plane[i]);
        }
    }
    data
}

/// One channel reshaped to (H/8, W/8, 64); the last axis is a row-major block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy> BlockGrid<T> {
    /// Build the block-grid view of a row-major (H, W) plane.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the dimensions are not block
    /// aligned or the plane length does not match.
    pub fn from_plane(plane: &[T], height: usize, width: usize) -> Result<Self> {
        check_block_aligned(height, width)?;
        if plane.len() != height * width {
            return Err(AugmentError::InvalidArgument(format!(
                "plane holds {} values, expected {}",
                plane.len(),
                height * width
            )));
        }
        Ok(Self::from_plane_unchecked(plane, height, width))
    }

    fn from_plane_unchecked(plane: &[T], height: usize, width: usize) -> Self {
        let (rows, cols) = (height / BLOCK_SIZE, width / BLOCK_SIZE);
        let mut data = Vec::with_capacity(plane.len());

        for r in 0..rows {
            for c in 0..cols {
                for u in 0..BLOCK_SIZE {
                    let start = (r * BLOCK_SIZE + u) * width + c * BLOCK_SIZE;
                    data.extend_from_slice(&plane[start..start + BLOCK_SIZE]);
                }
            }
        }

        Self { rows, cols, data }
    }

    /// Inverse of [`BlockGrid::from_plane`].
    pub fn to_plane(&self) -> Vec<T> {
        let width = self.cols * BLOCK_SIZE;
        let mut plane = self.data.clone();

        for r in 0..self.rows {
            for c in 0..self.cols {
                let block = self.block_slice(r, c);
                for u in 0..BLOCK_SIZE {
                    let start = (r * BLOCK_SIZE + u) * width + c * BLOCK_SIZE;
                    plane[start..start + BLOCK_SIZE]
                        .copy_from_slice(&block[u * BLOCK_SIZE..(u + 1) * BLOCK_SIZE]);
                }
            }
        }

        plane
    }

    /// Number of block rows (H/8).
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of block columns (W/8).
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The 64 coefficients of block `(r, c)`.
    #[inline]
    pub fn block_slice(&self, r: usize, c: usize) -> &[T] {
        let start = (r * self.cols + c) * BLOCK_LEN;
        &self.data[start..start + BLOCK_LEN]
    }

    /// Block `(r, c)` as an 8x8 array.
    pub fn block(&self, r: usize, c: usize) -> DctBlock<T> {
        let slice = self.block_slice(r, c);
        let mut block = [[slice[0]; BLOCK_SIZE]; BLOCK_SIZE];
        for (u, row) in block.iter_mut().enumerate() {
            row.copy_from_slice(&slice[u * BLOCK_SIZE..(u + 1) * BLOCK_SIZE]);
        }
        block
    }
}

impl<T> BlockGrid<T>
where
    T: Copy + Neg<Output = T>,
{
    /// Permute the grid and correct every block with the same descriptor.
    pub fn transform(&self, descriptor: Descriptor) -> Self {
        let (mut data, rows, cols) =
            remap_grid(&self.data, self.rows, self.cols, BLOCK_LEN, descriptor);

        for block in data.chunks_exact_mut(BLOCK_LEN) {
            transform_flat(block, descriptor);
        }

        Self { rows, cols, data }
    }
}

/// Apply a descriptor to a whole DCT image.
///
/// `Descriptor::Identity` borrows the input without copying it.
pub fn dct_transform<T>(image: &DctImage<T>, descriptor: Descriptor) -> Cow<'_, DctImage<T>>
where
    T: Copy + Neg<Output = T>,
{
    if descriptor == Descriptor::Identity {
        return Cow::Borrowed(image);
    }

    let (rows, cols) =
        descriptor.output_dims(image.height / BLOCK_SIZE, image.width / BLOCK_SIZE);
    let planes: Vec<Vec<T>> = (0..image.channels)
        .map(|channel| image.channel_grid(channel).transform(descriptor).to_plane())
        .collect();

    let (height, width) = (rows * BLOCK_SIZE, cols * BLOCK_SIZE);
    Cow::Owned(DctImage {
        height,
        width,
        channels: image.channels,
        data: interleave(&planes, height * width),
    })
}

/// Rotate a DCT image counter-clockwise by `k` quarter turns.
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` if `k` is not in `0..4`.
pub fn dct_rot90<T>(image: &DctImage<T>, k: u8) -> Result<Cow<'_, DctImage<T>>>
where
    T: Copy + Neg<Output = T>,
{
    let turns = QuarterTurns::new(k)?;
    Ok(match turns.get() {
        0 => Cow::Borrowed(image),
        _ => dct_transform(image, Descriptor::Rotate90(turns)),
    })
}

/// Transpose a DCT image (swap rows and columns).
pub fn dct_transpose<T>(image: &DctImage<T>) -> DctImage<T>
where
    T: Copy + Neg<Output = T>,
{
    dct_transform(image, Descriptor::Transpose).into_owned()
}

/// Mirror a DCT image left to right.
pub fn dct_hflip<T>(image: &DctImage<T>) -> DctImage<T>
where
    T: Copy + Neg<Output = T>,
{
    dct_transform(image, Descriptor::HorizontalFlip).into_owned()
}

/// Mirror a DCT image top to bottom.
pub fn dct_vflip<T>(image: &DctImage<T>) -> DctImage<T>
where
    T: Copy + Neg<Output = T>,
{
    dct_transform(image, Descriptor::VerticalFlip).into_owned()
}

fn check_block_aligned(height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0 || height % BLOCK_SIZE != 0 || width % BLOCK_SIZE != 0 {
        return Err(AugmentError::InvalidArgument(format!(
            "DCT dimensions must be non-zero multiples of {BLOCK_SIZE}, got {height}x{width}"
        )));
    }
    Ok(())
}


// ============================================================================
// Property-Based Tests
// ============================================================================
