//! Per-sample transforms and pixel layout conversion.
//!
//! Decoded images keep their native pixel type until either the batch
//! augmenter normalizes them or they are flattened with [`image_to_chw`],
//! which always yields values in `[0, 1]`.

use crate::augmentation::filter_type;
use crate::loader::SamplePair;
use image::{DynamicImage, GrayImage, RgbImage};
use pixpair_core::{Error, Interpolation, Result};
use std::fmt;
use std::sync::Arc;

/// A pure image-to-image function applied to one side of every sample
pub type ImageFn = Arc<dyn Fn(DynamicImage) -> DynamicImage + Send + Sync>;

/// Pair of functions applied to every decoded sample before augmentation.
///
/// Defaults to identity on both sides.
#[derive(Clone)]
pub struct SampleTransform {
    input: ImageFn,
    label: ImageFn,
}

impl SampleTransform {
    /// Leaves both images untouched
    pub fn identity() -> Self {
        Self {
            input: Arc::new(|image: DynamicImage| image),
            label: Arc::new(|image: DynamicImage| image),
        }
    }

    /// Creates a transform from an input function and a label function
    pub fn new<I, L>(input: I, label: L) -> Self
    where
        I: Fn(DynamicImage) -> DynamicImage + Send + Sync + 'static,
        L: Fn(DynamicImage) -> DynamicImage + Send + Sync + 'static,
    {
        Self {
            input: Arc::new(input),
            label: Arc::new(label),
        }
    }

    /// Resizes both images to `width` x `height`, keeping their pixel type
    pub fn resize(width: u32, height: u32, interpolation: Interpolation) -> Self {
        let filter = filter_type(interpolation);
        let resize = move |image: DynamicImage| {
            if (image.width(), image.height()) == (width, height) {
                image
            } else {
                image.resize_exact(width, height, filter)
            }
        };
        Self::new(resize, resize)
    }

    /// Replaces the input function
    pub fn with_input<F>(mut self, f: F) -> Self
    where
        F: Fn(DynamicImage) -> DynamicImage + Send + Sync + 'static,
    {
        self.input = Arc::new(f);
        self
    }

    /// Replaces the label function
    pub fn with_label<F>(mut self, f: F) -> Self
    where
        F: Fn(DynamicImage) -> DynamicImage + Send + Sync + 'static,
    {
        self.label = Arc::new(f);
        self
    }

    pub fn apply(&self, pair: SamplePair) -> SamplePair {
        SamplePair {
            input: (self.input)(pair.input),
            label: (self.label)(pair.label),
        }
    }
}

impl Default for SampleTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for SampleTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleTransform").finish_non_exhaustive()
    }
}

/// Converts an image to 3-channel floats in `[0, 1]`.
///
/// Integer images are divided by their type's maximum (255 for 8-bit);
/// float images are copied as they are.
pub fn normalize_unit(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageRgb32F(image.to_rgb32f())
}

/// Flattens an image into planar CHW floats in `[0, 1]`.
///
/// `channels` selects the layout: 1 for a luminance map, 3 for RGB.
pub fn image_to_chw(image: &DynamicImage, channels: u32) -> Result<Vec<f32>> {
    match channels {
        1 => Ok(image.to_luma32f().into_raw()),
        3 => {
            let rgb = image.to_rgb32f();
            let plane = rgb.width() as usize * rgb.height() as usize;
            let mut values = vec![0.0f32; 3 * plane];

            for (i, pixel) in rgb.pixels().enumerate() {
                values[i] = pixel[0];
                values[plane + i] = pixel[1];
                values[2 * plane + i] = pixel[2];
            }

            Ok(values)
        }
        other => Err(Error::InvalidArgument(format!(
            "Unsupported channel count: {}",
            other
        ))),
    }
}

/// Builds an 8-bit image from planar CHW floats, clipping to `[0, 1]`
pub fn chw_to_image(values: &[f32], width: u32, height: u32, channels: u32) -> Result<DynamicImage> {
    let plane = width as usize * height as usize;
    if values.len() != plane * channels as usize {
        return Err(Error::InvalidArgument(format!(
            "Expected {} values for a {}x{}x{} image, got {}",
            plane * channels as usize,
            width,
            height,
            channels,
            values.len()
        )));
    }

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

    match channels {
        1 => {
            let raw: Vec<u8> = values.iter().copied().map(to_u8).collect();
            GrayImage::from_raw(width, height, raw)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| Error::Image("Invalid grayscale buffer".to_string()))
        }
        3 => {
            let mut raw = Vec::with_capacity(3 * plane);
            for i in 0..plane {
                raw.push(to_u8(values[i]));
                raw.push(to_u8(values[plane + i]));
                raw.push(to_u8(values[2 * plane + i]));
            }
            RgbImage::from_raw(width, height, raw)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| Error::Image("Invalid RGB buffer".to_string()))
        }
        other => Err(Error::InvalidArgument(format!(
            "Unsupported channel count: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn pair(value: u8) -> SamplePair {
        SamplePair {
            input: DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([value]))),
            label: DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([value]))),
        }
    }

    #[test]
    fn test_identity_transform() {
        let out = SampleTransform::default().apply(pair(42));
        assert_eq!(out.input.to_luma8().get_pixel(1, 1)[0], 42);
        assert_eq!(out.label.to_luma8().get_pixel(1, 1)[0], 42);
    }

    #[test]
    fn test_transform_sides_are_independent() {
        let transform = SampleTransform::identity().with_label(|mut image| {
            image.invert();
            image
        });
        let out = transform.apply(pair(10));
        assert_eq!(out.input.to_luma8().get_pixel(0, 0)[0], 10);
        assert_eq!(out.label.to_luma8().get_pixel(0, 0)[0], 245);
    }

    #[test]
    fn test_new_takes_both_functions() {
        let transform = SampleTransform::new(
            |image: DynamicImage| image.fliph(),
            |image: DynamicImage| image.brighten(5),
        );
        let out = transform.apply(pair(10));
        assert_eq!(out.input.to_luma8().get_pixel(0, 0)[0], 10);
        assert_eq!(out.label.to_luma8().get_pixel(0, 0)[0], 15);
    }

    #[test]
    fn test_resize_both_sides() {
        let transform = SampleTransform::resize(6, 4, Interpolation::Nearest);
        let out = transform.apply(pair(7));
        for image in [&out.input, &out.label] {
            assert_eq!((image.width(), image.height()), (6, 4));
            assert!(matches!(image, DynamicImage::ImageLuma8(_)));
            assert_eq!(image.to_luma8().get_pixel(5, 3)[0], 7);
        }
    }

    #[test]
    fn test_normalize_unit_divides_by_255() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 51, 255])));
        let normalized = normalize_unit(&image).to_rgb32f();
        let pixel = normalized.get_pixel(0, 0);
        assert_eq!(pixel[0], 0.0);
        assert!((pixel[1] - 0.2).abs() < 1e-6);
        assert_eq!(pixel[2], 1.0);
    }

    #[test]
    fn test_normalize_round_trip_recovers_pixels() {
        let image = GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]));
        let normalized = normalize_unit(&DynamicImage::ImageLuma8(image)).to_rgb32f();

        for (x, pixel) in normalized.pixels().enumerate() {
            assert_eq!((pixel[0] * 255.0).round() as usize, x);
        }
    }

    #[test]
    fn test_image_to_chw_is_planar() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 0, 255]));

        let values = image_to_chw(&DynamicImage::ImageRgb8(image), 3).unwrap();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_image_to_chw_single_channel() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([255])));
        let values = image_to_chw(&image, 1).unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_chw_to_image_clips() {
        let image = chw_to_image(&[-0.5, 0.5, 1.5, 1.0], 2, 2, 1).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(1, 0)[0], 128);
        assert_eq!(image.get_pixel(0, 1)[0], 255);
    }

    #[test]
    fn test_chw_to_image_rejects_wrong_length() {
        assert!(chw_to_image(&[0.0; 5], 2, 2, 1).is_err());
        assert!(image_to_chw(&DynamicImage::new_rgb8(1, 1), 2).is_err());
    }
}
