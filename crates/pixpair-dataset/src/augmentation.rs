//! Batch-level augmentation.
//!
//! Augmenters see a whole batch at once so that one random crop and one
//! flip decision can be shared by every image of the batch, inputs and
//! labels alike. Inputs and labels stay pixel-aligned even when they have
//! different resolutions, because the crop is expressed as fractions.

use crate::dataset::ImageBatch;
use crate::preprocess::normalize_unit;
use image::imageops::FilterType;
use image::DynamicImage;
use pixpair_core::{AugmentationConfig, CropBounds, Interpolation, Result};
use rand::{Rng, RngCore};
use tracing::trace;

/// Transforms a decoded batch before it is handed to the caller
pub trait Augment: Send + Sync {
    fn augment(&self, batch: ImageBatch, rng: &mut dyn RngCore) -> Result<ImageBatch>;
}

/// Returns batches unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Augment for Identity {
    fn augment(&self, batch: ImageBatch, _rng: &mut dyn RngCore) -> Result<ImageBatch> {
        Ok(batch)
    }
}

/// Maps the configured interpolation onto the `image` resampling filter
pub fn filter_type(interpolation: Interpolation) -> FilterType {
    match interpolation {
        Interpolation::Nearest => FilterType::Nearest,
        Interpolation::Bilinear => FilterType::Triangle,
        Interpolation::Bicubic => FilterType::CatmullRom,
        Interpolation::Lanczos => FilterType::Lanczos3,
    }
}

/// Normalize, shared random crop, resize and shared random horizontal flip
#[derive(Debug, Clone)]
pub struct NormCropResize {
    width: u32,
    height: u32,
    filter: FilterType,
    max_crop_fraction: f32,
    flip_probability: f64,
}

impl NormCropResize {
    /// Resizes to `width` x `height` with bilinear filtering, crops up to a
    /// quarter per side and flips half of the batches
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: FilterType::Triangle,
            max_crop_fraction: 0.25,
            flip_probability: 0.5,
        }
    }

    pub fn from_config(config: &AugmentationConfig) -> Self {
        Self::new(config.target_width, config.target_height)
            .with_interpolation(config.interpolation)
            .with_max_crop_fraction(config.max_crop_fraction)
            .with_flip_probability(config.flip_probability)
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.filter = filter_type(interpolation);
        self
    }

    pub fn with_max_crop_fraction(mut self, fraction: f32) -> Self {
        self.max_crop_fraction = fraction.max(0.0);
        self
    }

    pub fn with_flip_probability(mut self, probability: f64) -> Self {
        self.flip_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Target size as `(width, height)`
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Draws independent per-side crop fractions in `[0, max_crop_fraction)`
    pub fn sample_bounds(&self, rng: &mut dyn RngCore) -> CropBounds {
        let max = self.max_crop_fraction;
        let mut side = || {
            if max > 0.0 {
                rng.gen_range(0.0..max)
            } else {
                0.0
            }
        };

        let top = side();
        let bottom = side();
        let left = side();
        let right = side();
        CropBounds::new(top, bottom, left, right)
    }

    /// Applies a fixed crop and flip decision to every image of the batch
    pub fn apply(&self, batch: ImageBatch, bounds: CropBounds, flip: bool) -> Result<ImageBatch> {
        let transform = |image: DynamicImage| self.transform_one(&image, bounds, flip);

        let inputs = batch
            .inputs
            .into_iter()
            .map(transform)
            .collect::<Result<Vec<_>>>()?;
        let labels = batch
            .labels
            .into_iter()
            .map(transform)
            .collect::<Result<Vec<_>>>()?;

        Ok(ImageBatch { inputs, labels })
    }

    fn transform_one(
        &self,
        image: &DynamicImage,
        bounds: CropBounds,
        flip: bool,
    ) -> Result<DynamicImage> {
        let normalized = normalize_unit(image);
        let rect = bounds.pixel_rect(normalized.width(), normalized.height())?;

        let resized = normalized
            .crop_imm(rect.x, rect.y, rect.width, rect.height)
            .resize_exact(self.width, self.height, self.filter);

        Ok(if flip { resized.fliph() } else { resized })
    }
}

impl Augment for NormCropResize {
    fn augment(&self, batch: ImageBatch, rng: &mut dyn RngCore) -> Result<ImageBatch> {
        let bounds = self.sample_bounds(rng);
        let flip = rng.gen_bool(self.flip_probability);
        trace!("Augmenting batch of {} with crop {} flip={}", batch.len(), bounds, flip);
        self.apply(batch, bounds, flip)
    }
}
