//! Paired image datasets for image-to-image training.
//!
//! This crate provides:
//! - Path-list reading and the fixed-seed hold-out split
//! - Sample decoding with errors naming both images of a pair
//! - Per-sample transforms and batch-level augmentation
//! - [`ImageDataset`] and its endless, per-epoch shuffled [`BatchGenerator`]

pub mod augmentation;
pub mod dataset;
pub mod lists;
pub mod loader;
pub mod preprocess;

pub use augmentation::{filter_type, Augment, Identity, NormCropResize};
pub use dataset::{BatchGenerator, ImageBatch, ImageDataset};
pub use lists::{holdout_split, pair_samples, read_path_list, HOLDOUT_FRACTION, HOLDOUT_SEED};
pub use loader::{is_image_file, list_images, SamplePair, SampleReader, IMAGE_EXTENSIONS};
pub use preprocess::{chw_to_image, image_to_chw, normalize_unit, ImageFn, SampleTransform};
