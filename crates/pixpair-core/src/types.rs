//! Core type definitions shared across the workspace.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// An (input image, label image) pair of paths.
///
/// The order inside the pair is fixed at construction; the label at
/// `label` is the target for the image at `input`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the network input image
    pub input: PathBuf,
    /// Path to the label (target) image
    pub label: PathBuf,
}

impl Sample {
    /// Creates a new sample
    pub fn new(input: impl Into<PathBuf>, label: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            label: label.into(),
        }
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation (or test) data
    Validation,
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
        }
    }
}

/// Image shape as seen by a network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageShape {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of channels (1 for grayscale maps, 3 for RGB)
    pub channels: u32,
}

impl ImageShape {
    /// Creates a new image shape
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Total number of values in a CHW tensor of this shape
    pub fn num_values(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Crop margins expressed as fractions of each image dimension.
///
/// Fractions make one crop applicable to an input and a label of different
/// resolutions while keeping them spatially aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBounds {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

/// A crop rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBounds {
    /// Creates crop bounds from per-side fractions
    pub fn new(top: f32, bottom: f32, left: f32, right: f32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Bounds that keep the whole image
    pub fn none() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Resolves the bounds against an image of the given size.
    ///
    /// Margins are floored to whole pixels. Fails with
    /// [`Error::DegenerateCrop`] when nothing would remain.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Result<CropRect> {
        let margin = |fraction: f32, extent: u32| (fraction.max(0.0) * extent as f32).floor() as u32;

        let top = margin(self.top, height);
        let bottom = margin(self.bottom, height);
        let left = margin(self.left, width);
        let right = margin(self.right, width);

        let cropped_height = height.saturating_sub(top.saturating_add(bottom));
        let cropped_width = width.saturating_sub(left.saturating_add(right));

        if cropped_width == 0 || cropped_height == 0 {
            return Err(Error::DegenerateCrop {
                width,
                height,
                bounds: *self,
            });
        }

        Ok(CropRect {
            x: left,
            y: top,
            width: cropped_width,
            height: cropped_height,
        })
    }
}

impl std::fmt::Display for CropBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[top={:.3}, bottom={:.3}, left={:.3}, right={:.3}]",
            self.top, self.bottom, self.left, self.right
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_keeps_pair_order() {
        let sample = Sample::new("images/a.jpg", "maps/a.png");
        assert_eq!(sample.input, PathBuf::from("images/a.jpg"));
        assert_eq!(sample.label, PathBuf::from("maps/a.png"));
    }

    #[test]
    fn test_data_split_display() {
        assert_eq!(DataSplit::Train.to_string(), "train");
        assert_eq!(DataSplit::Validation.to_string(), "validation");
    }

    #[test]
    fn test_image_shape() {
        let shape = ImageShape::new(64, 32, 3);
        assert_eq!(shape.num_values(), 64 * 32 * 3);
        assert_eq!(shape.to_string(), "64x32x3");
    }

    #[test]
    fn test_pixel_rect_floors_margins() {
        let bounds = CropBounds::new(0.125, 0.25, 0.25, 0.0);
        let rect = bounds.pixel_rect(10, 20).unwrap();
        // top = floor(2.5), bottom = floor(5.0), left = floor(2.5)
        assert_eq!(
            rect,
            CropRect {
                x: 2,
                y: 2,
                width: 8,
                height: 13
            }
        );
    }

    #[test]
    fn test_pixel_rect_none_keeps_everything() {
        let rect = CropBounds::none().pixel_rect(7, 3).unwrap();
        assert_eq!(rect.width, 7);
        assert_eq!(rect.height, 3);
    }

    #[test]
    fn test_degenerate_crop_reports_shape_and_bounds() {
        let bounds = CropBounds::new(0.5, 0.5, 0.1, 0.1);
        let err = bounds.pixel_rect(4, 4).unwrap_err();
        match err {
            Error::DegenerateCrop {
                width,
                height,
                bounds: reported,
            } => {
                assert_eq!((width, height), (4, 4));
                assert_eq!(reported, bounds);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
