//! Pixel-value steps that only touch image targets: JPEG recompression,
//! downscaling and Gaussian blur, plus the resampling used by resized crops.
//!
//! Resampling runs per channel on `f32` planes through `image::imageops`.
//! Those routines clamp floats to `[0, 1]`, so every plane is min-max
//! normalized into that range first and mapped back afterwards.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, ImageFormat};
use rand::Rng;

use crate::error::{AugmentError, Result};
use crate::target::{
    mismatch, ImageTensor, PlaneBuffer, Sample, TargetData, TargetKind, TargetRegistry,
};

/// Run `f` on every image target; every other target passes through.
pub(crate) fn map_images<F>(sample: &Sample, registry: &TargetRegistry, f: F) -> Result<Sample>
where
    F: Fn(&ImageTensor) -> Result<ImageTensor>,
{
    sample.try_map(registry, |_, kind, data| match (kind, data) {
        (TargetKind::Image, TargetData::Image(t)) => Ok(TargetData::Image(f(t)?)),
        (kind, data) if data.kind() == kind => Ok(data.clone()),
        (kind, data) => Err(mismatch(kind, data)),
    })
}

/// Apply a plane operation to every channel in normalized `[0, 1]` space.
fn map_planes<F>(tensor: &ImageTensor, f: F) -> Result<ImageTensor>
where
    F: Fn(&PlaneBuffer) -> PlaneBuffer,
{
    let planes: Vec<PlaneBuffer> = tensor
        .to_planes()
        .into_iter()
        .map(|mut plane| {
            let (min, max) = plane
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let range = if max > min { max - min } else { 1.0 };

            for v in plane.iter_mut() {
                *v = (*v - min) / range;
            }
            let mut output = f(&plane);
            for v in output.iter_mut() {
                *v = *v * range + min;
            }
            output
        })
        .collect();

    ImageTensor::from_planes(&planes)
}

/// Resize a tensor to `height x width`.
///
/// # Arguments
///
/// * `tensor` - Source tensor, any channel count
/// * `height`, `width` - Target size, both non-zero
/// * `filter` - Resampling filter
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` if the target size is empty.
pub fn resize_tensor(
    tensor: &ImageTensor,
    height: usize,
    width: usize,
    filter: FilterType,
) -> Result<ImageTensor> {
    if height == 0 || width == 0 {
        return Err(AugmentError::InvalidArgument(format!(
            "resize target {height}x{width} is empty"
        )));
    }
    if (height, width) == (tensor.height(), tensor.width()) {
        return Ok(tensor.clone());
    }

    map_planes(tensor, |plane| {
        imageops::resize(plane, width as u32, height as u32, filter)
    })
}

/// Shrink by `scale` with nearest-neighbour sampling, then scale back up.
pub fn downscale(tensor: &ImageTensor, scale: f32) -> Result<ImageTensor> {
    let (height, width) = (tensor.height(), tensor.width());
    let small_h = ((height as f32 * scale) as u32).max(1);
    let small_w = ((width as f32 * scale) as u32).max(1);

    map_planes(tensor, |plane| {
        let small = imageops::resize(plane, small_w, small_h, FilterType::Nearest);
        imageops::resize(&small, width as u32, height as u32, FilterType::Nearest)
    })
}

/// Gaussian blur of every channel.
pub fn gaussian_blur(tensor: &ImageTensor, sigma: f32) -> Result<ImageTensor> {
    map_planes(tensor, |plane| imageops::blur(plane, sigma))
}

/// Round-trip a tensor through JPEG at the given quality (1-100).
///
/// Values are quantized to 8 bits on the way in.
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` for tensors that are not 1 or 3
/// channels, `AugmentError::Codec` if encoding or decoding fails.
pub fn jpeg_compress(tensor: &ImageTensor, quality: u8) -> Result<ImageTensor> {
    let image = tensor.to_dynamic_image()?;
    let quality = quality.clamp(1, 100);

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )
        .map_err(|e| AugmentError::Codec(e.to_string()))?;

    let decoded = image::load_from_memory_with_format(buffer.get_ref(), ImageFormat::Jpeg)
        .map_err(|e| AugmentError::Codec(e.to_string()))?;

    ImageTensor::from_dynamic_image(decoded, tensor.channels())
}

/// Uniform downscale factor in `scale_min..=scale_max`.
pub(crate) fn sample_scale<R: Rng + ?Sized>(
    rng: &mut R,
    scale_min: f32,
    scale_max: f32,
) -> Result<f32> {
    if !(scale_min > 0.0 && scale_min <= scale_max && scale_max <= 1.0) {
        return Err(AugmentError::InvalidArgument(format!(
            "downscale range {scale_min}..={scale_max} must lie in (0, 1]"
        )));
    }
    if scale_min == scale_max {
        return Ok(scale_min);
    }
    Ok(rng.random_range(scale_min..=scale_max))
}

/// Uniform odd kernel size within `blur_limit`.
pub(crate) fn sample_kernel_size<R: Rng + ?Sized>(
    rng: &mut R,
    (low, high): (u32, u32),
) -> Result<u32> {
    let low = low.max(3) | 1;
    let high = if high % 2 == 0 { high.saturating_sub(1) } else { high };
    if low > high {
        return Err(AugmentError::InvalidArgument(format!(
            "blur limit {low}..={high} contains no odd kernel size"
        )));
    }

    let choices = (high - low) / 2 + 1;
    Ok(low + 2 * rng.random_range(0..choices))
}

/// Sigma that OpenCV derives from a kernel size when none is given.
pub(crate) fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::target::{test_tensor, INPUT_IMAGE_KEY, INPUT_MASK_KEY};

    fn constant(height: usize, width: usize, channels: usize, value: f32) -> ImageTensor {
        ImageTensor::new(height, width, channels, vec![value; height * width * channels]).unwrap()
    }

    fn checkerboard(size: usize) -> ImageTensor {
        let data = (0..size * size)
            .map(|i| if (i / size + i % size) % 2 == 0 { 0.0 } else { 255.0 })
            .collect();
        ImageTensor::new(size, size, 1, data).unwrap()
    }

    #[test]
    fn test_jpeg_keeps_flat_image() {
        let t = constant(16, 16, 3, 100.0);
        let out = jpeg_compress(&t, 90).unwrap();

        assert_eq!(out.shape(), (16, 16, 3));
        assert!(out.as_slice().iter().all(|&v| (v - 100.0).abs() <= 3.0));
    }

    #[test]
    fn test_jpeg_grayscale() {
        let out = jpeg_compress(&constant(8, 8, 1, 50.0), 75).unwrap();
        assert_eq!(out.shape(), (8, 8, 1));
    }

    #[test]
    fn test_jpeg_rejects_feature_maps() {
        assert!(matches!(
            jpeg_compress(&constant(8, 8, 2, 0.0), 90),
            Err(AugmentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resize_keeps_range() {
        let data = (0..8 * 8).map(|i| i as f32 / 6.3 - 5.0).collect();
        let t = ImageTensor::new(8, 8, 1, data).unwrap();
        let out = resize_tensor(&t, 16, 12, FilterType::Triangle).unwrap();

        assert_eq!(out.shape(), (16, 12, 1));
        assert!(out.as_slice().iter().all(|&v| (-5.001..=5.001).contains(&v)));
    }

    #[test]
    fn test_resize_constant_is_exact() {
        let out = resize_tensor(&constant(8, 8, 3, 7.0), 4, 4, FilterType::CatmullRom).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_resize_rejects_empty_target() {
        assert!(resize_tensor(&constant(8, 8, 1, 0.0), 0, 8, FilterType::Nearest).is_err());
    }

    #[test]
    fn test_downscale_loses_detail() {
        let t = test_tensor(8, 8, 1);
        let out = downscale(&t, 0.25).unwrap();

        assert_eq!(out.shape(), (8, 8, 1));
        let mut values: Vec<i64> = out.as_slice().iter().map(|v| v.round() as i64).collect();
        values.sort_unstable();
        values.dedup();
        assert!(values.len() <= 4);
    }

    #[test]
    fn test_blur_smooths_checkerboard() {
        let t = checkerboard(16);
        let out = gaussian_blur(&t, sigma_for_kernel(5)).unwrap();

        assert_eq!(out.shape(), t.shape());
        let (y, x) = (8, 8);
        assert!(out.get(y, x, 0) > 10.0 && out.get(y, x, 0) < 245.0);
    }

    #[test]
    fn test_sigma_for_kernel() {
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-6);
        assert!((sigma_for_kernel(9) - 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_sizes_are_odd() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen = Vec::new();
        for _ in 0..100 {
            let k = sample_kernel_size(&mut rng, (5, 9)).unwrap();
            assert!(k % 2 == 1 && (5..=9).contains(&k));
            seen.push(k);
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![5, 7, 9]);

        assert!(sample_kernel_size(&mut rng, (8, 8)).is_err());
    }

    #[test]
    fn test_scale_validation() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_scale(&mut rng, 0.25, 0.25).unwrap(), 0.25);
        assert!(sample_scale(&mut rng, 0.0, 0.5).is_err());
        assert!(sample_scale(&mut rng, 0.5, 1.5).is_err());
    }

    #[test]
    fn test_map_images_skips_masks() {
        let registry = TargetRegistry::default();
        let mask = test_tensor(8, 8, 1);
        let sample = Sample::new()
            .with(INPUT_IMAGE_KEY, TargetData::Image(constant(8, 8, 3, 1.0)))
            .with(INPUT_MASK_KEY, TargetData::Mask(mask.clone()));

        let out = map_images(&sample, &registry, |t| Ok(constant(t.height(), t.width(), 3, 2.0)))
            .unwrap();

        assert_eq!(out.get(INPUT_IMAGE_KEY), Some(&TargetData::Image(constant(8, 8, 3, 2.0))));
        assert_eq!(out.get(INPUT_MASK_KEY), Some(&TargetData::Mask(mask)));
    }
}
