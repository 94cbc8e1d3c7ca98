//! Steps that change which pixels end up where: crops, tile shuffles and
//! dropout holes.
//!
//! Offsets and extents are snapped to the 8x8 block grid wherever the sample
//! allows it, so that DCT planes travelling with the image can follow the
//! same operation block for block.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::photometric::resize_tensor;
use super::step::Interpolation;
use crate::dct::{DctImage, BLOCK_SIZE};
use crate::error::{AugmentError, Result};
use crate::target::{
    mismatch, CropWindow, ImageTensor, Keypoint, Sample, TargetData, TargetKind, TargetRegistry,
};

/// Random offset in `0..=max_offset`, rounded down to a block boundary.
fn aligned_offset<R: Rng + ?Sized>(rng: &mut R, max_offset: usize) -> usize {
    rng.random_range(0..=max_offset / BLOCK_SIZE) * BLOCK_SIZE
}

/// Draw a `height x width` crop window of a `rows x cols` sample.
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` if the window is empty or larger
/// than the sample.
pub(crate) fn sample_crop_window<R: Rng + ?Sized>(
    rng: &mut R,
    (rows, cols): (usize, usize),
    height: usize,
    width: usize,
) -> Result<CropWindow> {
    if height == 0 || width == 0 || height > rows || width > cols {
        return Err(AugmentError::InvalidArgument(format!(
            "crop size {height}x{width} does not fit in {rows}x{cols}"
        )));
    }

    Ok(CropWindow {
        top: aligned_offset(rng, rows - height),
        left: aligned_offset(rng, cols - width),
        height,
        width,
    })
}

/// Draw a square window whose side is in `min_max_height`, clamped to the
/// sample.
pub(crate) fn sample_sized_crop_window<R: Rng + ?Sized>(
    rng: &mut R,
    (rows, cols): (usize, usize),
    (min, max): (usize, usize),
) -> Result<CropWindow> {
    if min == 0 || min > max {
        return Err(AugmentError::InvalidArgument(format!(
            "crop height range {min}..={max} is invalid"
        )));
    }

    let height = rng.random_range(min..=max).min(rows);
    let width = height.min(cols);

    Ok(CropWindow {
        top: rng.random_range(0..=rows - height),
        left: rng.random_range(0..=cols - width),
        height,
        width,
    })
}

/// Extent of one hole, snapped to whole blocks whenever the axis holds one.
fn hole_extent<R: Rng + ?Sized>(
    rng: &mut R,
    (min, max): (usize, usize),
    limit: usize,
) -> Result<usize> {
    if min == 0 || min > max {
        return Err(AugmentError::InvalidArgument(format!(
            "hole size range {min}..={max} is invalid"
        )));
    }

    let extent = rng.random_range(min..=max).min(limit);
    Ok(if limit >= BLOCK_SIZE {
        extent.max(BLOCK_SIZE) / BLOCK_SIZE * BLOCK_SIZE
    } else {
        extent
    })
}

/// Draw `max_holes` dropout rectangles inside a `rows x cols` sample.
pub(crate) fn sample_holes<R: Rng + ?Sized>(
    rng: &mut R,
    (rows, cols): (usize, usize),
    max_holes: usize,
    height_range: (usize, usize),
    width_range: (usize, usize),
) -> Result<Vec<CropWindow>> {
    (0..max_holes)
        .map(|_| -> Result<CropWindow> {
            let height = hole_extent(rng, height_range, rows)?;
            let width = hole_extent(rng, width_range, cols)?;
            Ok(CropWindow {
                top: aligned_offset(rng, rows - height),
                left: aligned_offset(rng, cols - width),
                height,
                width,
            })
        })
        .collect()
}

/// Split `size` into `parts` contiguous `(start, len)` spans.
///
/// Spans are whole blocks when the axis is block-aligned and has at least
/// one block per part; the remainder goes to the trailing spans.
fn split_axis(size: usize, parts: usize) -> Vec<(usize, usize)> {
    let align = if size % BLOCK_SIZE == 0 && size / BLOCK_SIZE >= parts {
        BLOCK_SIZE
    } else {
        1
    };
    let units = size / align;
    let (base, rem) = (units / parts, units % parts);

    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = (base + usize::from(i >= parts - rem)) * align;
            let span = (start, len);
            start += len;
            span
        })
        .collect()
}

/// Row-major tiles of a `grid x grid` split of a `rows x cols` sample.
pub(crate) fn grid_tiles((rows, cols): (usize, usize), grid: usize) -> Result<Vec<CropWindow>> {
    if grid == 0 || grid > rows || grid > cols {
        return Err(AugmentError::InvalidArgument(format!(
            "cannot split {rows}x{cols} into a {grid}x{grid} grid"
        )));
    }

    let ys = split_axis(rows, grid);
    let xs = split_axis(cols, grid);
    Ok(ys
        .iter()
        .flat_map(|&(top, height)| {
            xs.iter().map(move |&(left, width)| CropWindow {
                top,
                left,
                height,
                width,
            })
        })
        .collect())
}

/// Random tile permutation that only swaps tiles of identical shape.
pub(crate) fn sample_permutation<R: Rng + ?Sized>(
    rng: &mut R,
    size: (usize, usize),
    grid: usize,
) -> Result<Vec<usize>> {
    let tiles = grid_tiles(size, grid)?;
    let mut permutation: Vec<usize> = (0..tiles.len()).collect();

    let mut groups: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (index, tile) in tiles.iter().enumerate() {
        groups.entry((tile.height, tile.width)).or_default().push(index);
    }

    for members in groups.values() {
        let mut shuffled = members.clone();
        shuffled.shuffle(rng);
        for (&dst, &src) in members.iter().zip(&shuffled) {
            permutation[dst] = src;
        }
    }

    Ok(permutation)
}

fn validate_permutation(tiles: &[CropWindow], permutation: &[usize]) -> Result<()> {
    if permutation.len() != tiles.len() {
        return Err(AugmentError::ReplayMismatch(format!(
            "permutation covers {} tiles, grid has {}",
            permutation.len(),
            tiles.len()
        )));
    }

    let mut seen = vec![false; tiles.len()];
    for (dst, &src) in permutation.iter().enumerate() {
        let valid = src < tiles.len()
            && !seen[src]
            && (tiles[src].height, tiles[src].width) == (tiles[dst].height, tiles[dst].width);
        if !valid {
            return Err(AugmentError::ReplayMismatch(format!(
                "tile {src} cannot move to tile {dst}"
            )));
        }
        seen[src] = true;
    }

    Ok(())
}

/// Move tile `permutation[dst]` of an interleaved buffer to tile `dst`.
fn permute_tiles<E: Copy>(
    data: &[E],
    cols: usize,
    channels: usize,
    tiles: &[CropWindow],
    permutation: &[usize],
) -> Vec<E> {
    let mut output = data.to_vec();

    for (dst, &src) in permutation.iter().enumerate() {
        let (from, to) = (tiles[src], tiles[dst]);
        let row_len = from.width * channels;
        for dy in 0..from.height {
            let s = ((from.top + dy) * cols + from.left) * channels;
            let d = ((to.top + dy) * cols + to.left) * channels;
            output[d..d + row_len].copy_from_slice(&data[s..s + row_len]);
        }
    }

    output
}

fn shuffle_tensor(
    tensor: &ImageTensor,
    tiles: &[CropWindow],
    permutation: &[usize],
) -> Result<ImageTensor> {
    let (height, width, channels) = tensor.shape();
    let data = permute_tiles(tensor.as_slice(), width, channels, tiles, permutation);
    ImageTensor::new(height, width, channels, data)
}

fn shuffle_dct(
    image: &DctImage<f32>,
    tiles: &[CropWindow],
    permutation: &[usize],
) -> Result<DctImage<f32>> {
    let misaligned = tiles.iter().any(|t| {
        t.top % BLOCK_SIZE != 0
            || t.left % BLOCK_SIZE != 0
            || t.height % BLOCK_SIZE != 0
            || t.width % BLOCK_SIZE != 0
    });
    if misaligned {
        return Err(AugmentError::InvalidArgument(
            "grid tiles do not fall on the DCT block grid".to_string(),
        ));
    }

    let (height, width, channels) = image.shape();
    let data = permute_tiles(image.as_slice(), width, channels, tiles, permutation);
    DctImage::with_channels(height, width, channels, data)
}

fn shuffle_keypoint(point: &Keypoint, tiles: &[CropWindow], permutation: &[usize]) -> Keypoint {
    let contains = |t: &CropWindow| {
        point.x >= t.left as f32
            && point.x < (t.left + t.width) as f32
            && point.y >= t.top as f32
            && point.y < (t.top + t.height) as f32
    };

    let Some(src) = tiles.iter().position(contains) else {
        return *point;
    };
    let Some(dst) = permutation.iter().position(|&s| s == src) else {
        return *point;
    };

    let (from, to) = (tiles[src], tiles[dst]);
    Keypoint::new(
        point.x - from.left as f32 + to.left as f32,
        point.y - from.top as f32 + to.top as f32,
        point.angle,
    )
}

fn crop_tensor(tensor: &ImageTensor, window: CropWindow) -> Result<ImageTensor> {
    tensor.crop(window.top, window.left, window.height, window.width)
}

/// Recorded windows must lie inside the sample they are applied to.
fn check_window((rows, cols): (usize, usize), window: CropWindow) -> Result<()> {
    if window.fits(rows, cols) {
        Ok(())
    } else {
        Err(AugmentError::ReplayMismatch(format!(
            "{window:?} does not fit in a {rows}x{cols} sample"
        )))
    }
}

/// Crop every target of a sample to `window`.
///
/// Boxes are clipped and dropped once empty; keypoints outside the window
/// are dropped. DCT planes require a block-aligned window.
pub(crate) fn crop_sample(
    sample: &Sample,
    registry: &TargetRegistry,
    window: CropWindow,
) -> Result<Sample> {
    let (rows, cols) = sample.spatial_size()?;
    check_window((rows, cols), window)?;

    sample.try_map(registry, |_, kind, data| match (kind, data) {
        (TargetKind::Image, TargetData::Image(t)) => Ok(TargetData::Image(crop_tensor(t, window)?)),
        (TargetKind::Mask, TargetData::Mask(t)) => Ok(TargetData::Mask(crop_tensor(t, window)?)),
        (TargetKind::Masks, TargetData::Masks(masks)) => Ok(TargetData::Masks(
            masks
                .iter()
                .map(|t| crop_tensor(t, window))
                .collect::<Result<_>>()?,
        )),
        (TargetKind::BBoxes, TargetData::BBoxes(boxes)) => Ok(TargetData::BBoxes(
            boxes
                .iter()
                .filter_map(|b| b.crop(rows, cols, window))
                .collect(),
        )),
        (TargetKind::Keypoints, TargetData::Keypoints(points)) => Ok(TargetData::Keypoints(
            points.iter().filter_map(|p| p.crop(window)).collect(),
        )),
        (TargetKind::Dct, TargetData::Dct(image)) => Ok(TargetData::Dct(image.crop(
            window.top,
            window.left,
            window.height,
            window.width,
        )?)),
        (kind, data) => Err(mismatch(kind, data)),
    })
}

/// Crop to `window`, then resize the crop to `height x width`.
///
/// Images use `interpolation`, masks always use nearest neighbour. DCT
/// planes cannot be resampled and are rejected.
pub(crate) fn resized_crop_sample(
    sample: &Sample,
    registry: &TargetRegistry,
    window: CropWindow,
    (height, width): (usize, usize),
    interpolation: Interpolation,
) -> Result<Sample> {
    let (rows, cols) = sample.spatial_size()?;
    check_window((rows, cols), window)?;

    let scale_x = width as f32 / window.width as f32;
    let scale_y = height as f32 / window.height as f32;
    let filter = interpolation.to_image_filter();
    let nearest = Interpolation::Nearest.to_image_filter();

    sample.try_map(registry, |_, kind, data| match (kind, data) {
        (TargetKind::Image, TargetData::Image(t)) => Ok(TargetData::Image(resize_tensor(
            &crop_tensor(t, window)?,
            height,
            width,
            filter,
        )?)),
        (TargetKind::Mask, TargetData::Mask(t)) => Ok(TargetData::Mask(resize_tensor(
            &crop_tensor(t, window)?,
            height,
            width,
            nearest,
        )?)),
        (TargetKind::Masks, TargetData::Masks(masks)) => Ok(TargetData::Masks(
            masks
                .iter()
                .map(|t| {
                    crop_tensor(t, window).and_then(|c| resize_tensor(&c, height, width, nearest))
                })
                .collect::<Result<_>>()?,
        )),
        // Normalized boxes are unaffected by the resize
        (TargetKind::BBoxes, TargetData::BBoxes(boxes)) => Ok(TargetData::BBoxes(
            boxes
                .iter()
                .filter_map(|b| b.crop(rows, cols, window))
                .collect(),
        )),
        (TargetKind::Keypoints, TargetData::Keypoints(points)) => Ok(TargetData::Keypoints(
            points
                .iter()
                .filter_map(|p| p.crop(window))
                .map(|p| p.scale(scale_x, scale_y))
                .collect(),
        )),
        (TargetKind::Dct, TargetData::Dct(_)) => Err(AugmentError::UnsupportedTarget {
            step: "RandomSizedCrop",
            kind: TargetKind::Dct,
        }),
        (kind, data) => Err(mismatch(kind, data)),
    })
}

/// Rearrange the tiles of a `grid x grid` split according to `permutation`.
///
/// Bounding boxes cannot follow a tile shuffle and are rejected.
pub(crate) fn grid_shuffle_sample(
    sample: &Sample,
    registry: &TargetRegistry,
    grid: usize,
    permutation: &[usize],
) -> Result<Sample> {
    let tiles = grid_tiles(sample.spatial_size()?, grid)?;
    validate_permutation(&tiles, permutation)?;

    sample.try_map(registry, |_, kind, data| match (kind, data) {
        (TargetKind::Image, TargetData::Image(t)) => {
            Ok(TargetData::Image(shuffle_tensor(t, &tiles, permutation)?))
        }
        (TargetKind::Mask, TargetData::Mask(t)) => {
            Ok(TargetData::Mask(shuffle_tensor(t, &tiles, permutation)?))
        }
        (TargetKind::Masks, TargetData::Masks(masks)) => Ok(TargetData::Masks(
            masks
                .iter()
                .map(|t| shuffle_tensor(t, &tiles, permutation))
                .collect::<Result<_>>()?,
        )),
        (TargetKind::Keypoints, TargetData::Keypoints(points)) => Ok(TargetData::Keypoints(
            points
                .iter()
                .map(|p| shuffle_keypoint(p, &tiles, permutation))
                .collect(),
        )),
        (TargetKind::Dct, TargetData::Dct(image)) => {
            Ok(TargetData::Dct(shuffle_dct(image, &tiles, permutation)?))
        }
        (TargetKind::BBoxes, TargetData::BBoxes(_)) => Err(AugmentError::UnsupportedTarget {
            step: "RandomGridShuffle",
            kind: TargetKind::BBoxes,
        }),
        (kind, data) => Err(mismatch(kind, data)),
    })
}

/// Zero every hole in images and DCT planes; other targets pass through.
///
/// DCT planes only accept holes made of whole blocks.
pub(crate) fn dropout_sample(
    sample: &Sample,
    registry: &TargetRegistry,
    holes: &[CropWindow],
) -> Result<Sample> {
    let size = sample.spatial_size()?;
    for &hole in holes {
        check_window(size, hole)?;
    }

    sample.try_map(registry, |_, kind, data| match (kind, data) {
        (TargetKind::Image, TargetData::Image(t)) => {
            let mut output = t.clone();
            for hole in holes {
                output.fill_rect(hole.top, hole.left, hole.height, hole.width, 0.0);
            }
            Ok(TargetData::Image(output))
        }
        (TargetKind::Dct, TargetData::Dct(image)) => {
            let mut output = image.clone();
            for hole in holes {
                output.fill_region(hole.top, hole.left, hole.height, hole.width, 0.0)?;
            }
            Ok(TargetData::Dct(output))
        }
        (kind, data) if data.kind() == kind => Ok(data.clone()),
        (kind, data) => Err(mismatch(kind, data)),
    })
}
