//! Geometric transforms of a single 8x8 DCT coefficient block.
//!
//! A spatial transform of an 8x8 pixel block maps onto its DCT-II
//! coefficients as a permutation plus sign flips. Basis function `u` along an
//! axis satisfies `cos((2(7 - x) + 1)uπ/16) = (-1)^u · cos((2x + 1)uπ/16)`,
//! so mirroring an axis negates every coefficient with an odd frequency index
//! along that axis, while swapping the axes (transpose) only swaps indices.
//!
//! Rotations are built from those two primitives:
//!
//! ```text
//! k = 1: negate odd columns, then transpose   (mirror x, swap axes)
//! k = 2: negate odd rows and odd columns       (mirror both axes)
//! k = 3: negate odd rows, then transpose       (mirror y, swap axes)
//! ```
//!
//! # Coefficient Range
//!
//! Signed integer coefficients must lie in `-T::MAX..=T::MAX`: negating
//! `T::MIN` overflows, and no wrapping result would keep the transforms
//! invertible. Quantized JPEG coefficients use at most 12 bits, so `i16`
//! and wider hold them with room to spare.

use std::ops::Neg;

use crate::error::Result;
use crate::geometry::{Descriptor, QuarterTurns};

/// Side length of a JPEG block.
pub const BLOCK_SIZE: usize = 8;

/// Number of coefficients in one block.
pub const BLOCK_LEN: usize = BLOCK_SIZE * BLOCK_SIZE;

/// One 8x8 block indexed by (vertical frequency, horizontal frequency).
pub type DctBlock<T> = [[T; BLOCK_SIZE]; BLOCK_SIZE];

/// Negate every coefficient in an odd-indexed row (1, 3, 5, 7).
///
/// Integer coefficients must be greater than `T::MIN`.
pub fn negate_odd_rows<T>(block: &DctBlock<T>) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    let mut out = *block;
    for row in out.iter_mut().skip(1).step_by(2) {
        for value in row.iter_mut() {
            *value = -*value;
        }
    }
    out
}

/// Negate every coefficient in an odd-indexed column (1, 3, 5, 7).
///
/// Integer coefficients must be greater than `T::MIN`.
pub fn negate_odd_cols<T>(block: &DctBlock<T>) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    let mut out = *block;
    for row in out.iter_mut() {
        for value in row.iter_mut().skip(1).step_by(2) {
            *value = -*value;
        }
    }
    out
}

/// Plain matrix transpose; swapping the axes needs no sign correction.
pub fn transpose_block<T: Copy>(block: &DctBlock<T>) -> DctBlock<T> {
    let mut out = *block;
    for (u, row) in block.iter().enumerate() {
        for (v, &value) in row.iter().enumerate() {
            out[v][u] = value;
        }
    }
    out
}

/// Rotate a block counter-clockwise by `k` quarter turns.
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` if `k` is not in `0..4`.
pub fn rotate_block<T>(block: &DctBlock<T>, k: u8) -> Result<DctBlock<T>>
where
    T: Copy + Neg<Output = T>,
{
    Ok(rotate_block_turns(block, QuarterTurns::new(k)?))
}

pub(crate) fn rotate_block_turns<T>(block: &DctBlock<T>, k: QuarterTurns) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    match k.get() {
        1 => transpose_block(&negate_odd_cols(block)),
        2 => negate_odd_rows(&negate_odd_cols(block)),
        3 => transpose_block(&negate_odd_rows(block)),
        _ => *block,
    }
}

/// Mirror a block left to right.
pub fn hflip_block<T>(block: &DctBlock<T>) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    negate_odd_cols(block)
}

/// Mirror a block top to bottom.
pub fn vflip_block<T>(block: &DctBlock<T>) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    negate_odd_rows(block)
}

/// Apply a descriptor to one block.
pub fn transform_block<T>(block: &DctBlock<T>, descriptor: Descriptor) -> DctBlock<T>
where
    T: Copy + Neg<Output = T>,
{
    match descriptor {
        Descriptor::Identity => *block,
        Descriptor::Rotate90(k) => rotate_block_turns(block, k),
        Descriptor::Transpose => transpose_block(block),
        Descriptor::HorizontalFlip => hflip_block(block),
        Descriptor::VerticalFlip => vflip_block(block),
    }
}

/// Apply a descriptor to a block stored as 64 row-major coefficients.
pub(crate) fn transform_flat<T>(coefficients: &mut [T], descriptor: Descriptor)
where
    T: Copy + Neg<Output = T>,
{
    debug_assert_eq!(coefficients.len(), BLOCK_LEN);

    let mut block = [[coefficients[0]; BLOCK_SIZE]; BLOCK_SIZE];
    for (u, row) in block.iter_mut().enumerate() {
        row.copy_from_slice(&coefficients[u * BLOCK_SIZE..(u + 1) * BLOCK_SIZE]);
    }

    let block = transform_block(&block, descriptor);
    for (u, row) in block.iter().enumerate() {
        coefficients[u * BLOCK_SIZE..(u + 1) * BLOCK_SIZE].copy_from_slice(row);
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
