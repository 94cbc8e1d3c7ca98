//! Dihedral grid transforms shared by pixel images and DCT block grids.
//!
//! Every geometric operation in this crate is expressed as a [`Descriptor`]
//! and resolved through [`Descriptor::source_index`], which maps an output
//! cell back to the input cell it is copied from. Pixel images use a cell of
//! `channels` values, DCT block grids use a cell of 64 coefficients, so the
//! spatial permutation of both representations is the same code path.
//!
//! # Coordinate System
//!
//! - Rows grow downwards, columns grow to the right
//! - Rotation is counter-clockwise, one quarter turn per unit of `k`
//!   (`out[i][j] = in[j][cols - 1 - i]` for `k = 1`)

use serde::{Deserialize, Serialize};

use crate::error::{AugmentError, Result};

/// Number of counter-clockwise quarter turns, always in `0..4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct QuarterTurns(u8);

impl QuarterTurns {
    /// Validate a rotation factor.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if `k` is not in `0..4`.
    pub fn new(k: u8) -> Result<Self> {
        if k < 4 {
            Ok(Self(k))
        } else {
            Err(AugmentError::InvalidArgument(format!(
                "rotation factor must be in 0..4, got {k}"
            )))
        }
    }

    /// Reduce an arbitrary number of quarter turns modulo 4.
    pub fn wrapping(k: u32) -> Self {
        Self((k % 4) as u8)
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Compose two rotations.
    pub fn then(self, other: QuarterTurns) -> QuarterTurns {
        Self::wrapping(u32::from(self.0) + u32::from(other.0))
    }
}

impl TryFrom<u8> for QuarterTurns {
    type Error = AugmentError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QuarterTurns> for u8 {
    fn from(value: QuarterTurns) -> Self {
        value.0
    }
}

/// A geometric operation applied identically to every tensor of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Descriptor {
    /// No change.
    #[default]
    Identity,
    /// Counter-clockwise rotation by `k` quarter turns.
    Rotate90(QuarterTurns),
    /// Swap rows and columns.
    Transpose,
    /// Mirror left to right.
    HorizontalFlip,
    /// Mirror top to bottom.
    VerticalFlip,
}

impl Descriptor {
    /// Rotation descriptor for `k` quarter turns (`k = 0` yields `Identity`).
    pub fn rotate90(k: u8) -> Result<Self> {
        let turns = QuarterTurns::new(k)?;
        Ok(if turns.get() == 0 {
            Descriptor::Identity
        } else {
            Descriptor::Rotate90(turns)
        })
    }

    /// Returns true if this descriptor swaps the height and width of a grid.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        match self {
            Descriptor::Rotate90(k) => k.get() % 2 == 1,
            Descriptor::Transpose => true,
            _ => false,
        }
    }

    /// Output `(rows, cols)` for an input grid of `(rows, cols)`.
    #[inline]
    pub fn output_dims(self, rows: usize, cols: usize) -> (usize, usize) {
        if self.swaps_dimensions() {
            (cols, rows)
        } else {
            (rows, cols)
        }
    }

    /// The descriptor that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Descriptor::Rotate90(k) => {
                Descriptor::Rotate90(QuarterTurns::wrapping(4 - u32::from(k.get())))
            }
            other => other,
        }
    }

    /// Map an output cell `(i, j)` to the input cell it is read from.
    ///
    /// `rows`/`cols` are the dimensions of the *input* grid.
    #[inline]
    pub fn source_index(self, rows: usize, cols: usize, i: usize, j: usize) -> (usize, usize) {
        match self {
            Descriptor::Identity => (i, j),
            Descriptor::Rotate90(k) => match k.get() {
                1 => (j, cols - 1 - i),
                2 => (rows - 1 - i, cols - 1 - j),
                3 => (rows - 1 - j, i),
                _ => (i, j),
            },
            Descriptor::Transpose => (j, i),
            Descriptor::HorizontalFlip => (i, cols - 1 - j),
            Descriptor::VerticalFlip => (rows - 1 - i, j),
        }
    }
}

/// Permute a row-major grid of fixed-size cells according to `descriptor`.
///
/// `data` holds `rows * cols` cells of `cell` consecutive values each.
/// Returns the permuted buffer together with its `(rows, cols)`.
pub(crate) fn remap_grid<E: Copy>(
    data: &[E],
    rows: usize,
    cols: usize,
    cell: usize,
    descriptor: Descriptor,
) -> (Vec<E>, usize, usize) {
    debug_assert_eq!(data.len(), rows * cols * cell, "Grid buffer size mismatch");

    let (out_rows, out_cols) = descriptor.output_dims(rows, cols);
    let mut output = Vec::with_capacity(data.len());

    for i in 0..out_rows {
        for j in 0..out_cols {
            let (src_r, src_c) = descriptor.source_index(rows, cols, i, j);
            let start = (src_r * cols + src_c) * cell;
            output.extend_from_slice(&data[start..start + cell]);
        }
    }

    (output, out_rows, out_cols)
}

/// Copy a `height x width` region of an interleaved (rows, cols, channels)
/// buffer. The caller guarantees the region is in bounds.
pub(crate) fn crop_hwc<E: Copy>(
    data: &[E],
    cols: usize,
    channels: usize,
    (top, left): (usize, usize),
    (height, width): (usize, usize),
) -> Vec<E> {
    let row_len = width * channels;
    let mut output = Vec::with_capacity(height * row_len);

    // Copy row by row
    for y in top..top + height {
        let start = (y * cols + left) * channels;
        output.extend_from_slice(&data[start..start + row_len]);
    }

    output
}

/// Overwrite a region of an interleaved buffer, clipped to `rows x cols`.
pub(crate) fn fill_hwc<E: Copy>(
    data: &mut [E],
    (rows, cols, channels): (usize, usize, usize),
    (top, left): (usize, usize),
    (height, width): (usize, usize),
    value: E,
) {
    let bottom = top.saturating_add(height).min(rows);
    let right = left.saturating_add(width).min(cols);
    let left = left.min(right);

    for y in top.min(bottom)..bottom {
        let start = (y * cols + left) * channels;
        let end = (y * cols + right) * channels;
        data[start..end].fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x3 grid with one value per cell:
    /// ```text
    /// 0 1 2
    /// 3 4 5
    /// ```
    fn grid() -> Vec<u32> {
        (0..6).collect()
    }

    #[test]
    fn test_quarter_turns_validation() {
        assert!(QuarterTurns::new(3).is_ok());
        assert!(matches!(
            QuarterTurns::new(4),
            Err(AugmentError::InvalidArgument(_))
        ));
        assert_eq!(QuarterTurns::wrapping(7).get(), 3);
    }

    #[test]
    fn test_quarter_turns_compose() {
        let a = QuarterTurns::new(3).unwrap();
        let b = QuarterTurns::new(2).unwrap();
        assert_eq!(a.then(b).get(), 1);
    }

    #[test]
    fn test_rotate90_zero_is_identity() {
        assert_eq!(Descriptor::rotate90(0).unwrap(), Descriptor::Identity);
        assert!(Descriptor::rotate90(4).is_err());
    }

    #[test]
    fn test_rot90_counter_clockwise() {
        let (out, rows, cols) = remap_grid(&grid(), 2, 3, 1, Descriptor::rotate90(1).unwrap());
        assert_eq!((rows, cols), (3, 2));
        // Right column becomes the top row
        assert_eq!(out, vec![2, 5, 1, 4, 0, 3]);
    }

    #[test]
    fn test_rot180() {
        let (out, rows, cols) = remap_grid(&grid(), 2, 3, 1, Descriptor::rotate90(2).unwrap());
        assert_eq!((rows, cols), (2, 3));
        assert_eq!(out, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_rot270() {
        let (out, rows, cols) = remap_grid(&grid(), 2, 3, 1, Descriptor::rotate90(3).unwrap());
        assert_eq!((rows, cols), (3, 2));
        assert_eq!(out, vec![3, 0, 4, 1, 5, 2]);
    }

    #[test]
    fn test_transpose() {
        let (out, rows, cols) = remap_grid(&grid(), 2, 3, 1, Descriptor::Transpose);
        assert_eq!((rows, cols), (3, 2));
        assert_eq!(out, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_flips() {
        let (out, _, _) = remap_grid(&grid(), 2, 3, 1, Descriptor::HorizontalFlip);
        assert_eq!(out, vec![2, 1, 0, 5, 4, 3]);

        let (out, _, _) = remap_grid(&grid(), 2, 3, 1, Descriptor::VerticalFlip);
        assert_eq!(out, vec![3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_multi_value_cells_move_together() {
        let data = vec![1, 10, 2, 20];
        let (out, rows, cols) = remap_grid(&data, 1, 2, 2, Descriptor::HorizontalFlip);
        assert_eq!((rows, cols), (1, 2));
        assert_eq!(out, vec![2, 20, 1, 10]);
    }

    #[test]
    fn test_inverse_undoes_descriptor() {
        let descriptors = [
            Descriptor::Identity,
            Descriptor::rotate90(1).unwrap(),
            Descriptor::rotate90(2).unwrap(),
            Descriptor::rotate90(3).unwrap(),
            Descriptor::Transpose,
            Descriptor::HorizontalFlip,
            Descriptor::VerticalFlip,
        ];
        for d in descriptors {
            let (out, rows, cols) = remap_grid(&grid(), 2, 3, 1, d);
            let (back, _, _) = remap_grid(&out, rows, cols, 1, d.inverse());
            assert_eq!(back, grid(), "{d:?}");
        }
    }

    #[test]
    fn test_crop_and_fill_hwc() {
        // 3x4 grid, 2 values per cell
        let data: Vec<u32> = (0..24).collect();
        let cropped = crop_hwc(&data, 4, 2, (1, 1), (2, 2));
        assert_eq!(cropped, vec![10, 11, 12, 13, 18, 19, 20, 21]);

        let mut data = data;
        fill_hwc(&mut data, (3, 4, 2), (2, 3), (5, 5), 0);
        assert_eq!(&data[22..24], &[0, 0]);
        assert_eq!(data[21], 21);

        // Regions far past the grid clip to nothing
        let before = data.clone();
        fill_hwc(&mut data, (3, 4, 2), (usize::MAX, 0), (8, 8), 7);
        fill_hwc(&mut data, (3, 4, 2), (0, 1), (2, usize::MAX), 7);
        assert_eq!(&data[..2], &before[..2]);
        assert!(data[2..8].iter().all(|&v| v == 7));
    }

    #[test]
    fn test_descriptor_serde() {
        let d = Descriptor::rotate90(3).unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"Rotate90":3}"#);
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);

        assert!(serde_json::from_str::<Descriptor>(r#"{"Rotate90":5}"#).is_err());
    }
}
