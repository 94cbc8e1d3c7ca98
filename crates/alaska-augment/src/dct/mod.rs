//! JPEG DCT-domain geometric transforms.
//!
//! JPEG stores an image as 8x8 blocks of DCT-II coefficients. Rotating or
//! mirroring such an image cannot be done by moving coefficients around like
//! pixels: the block grid moves like a pixel grid, but every block must also
//! have its coefficients permuted and selectively negated.
//!
//! - [`block`] transforms one 8x8 coefficient block
//! - [`plane`] applies a transform to a whole (H, W, 3) coefficient image

pub mod block;
pub mod plane;

pub use block::{
    hflip_block, negate_odd_cols, negate_odd_rows, rotate_block, transform_block,
    transpose_block, vflip_block, DctBlock, BLOCK_LEN, BLOCK_SIZE,
};
pub use plane::{
    dct_hflip, dct_rot90, dct_transform, dct_transpose, dct_vflip, BlockGrid, DctImage,
    DCT_CHANNELS,
};
