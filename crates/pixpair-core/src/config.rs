//! Configuration structures for pixpair runs.

use crate::error::{Error, Result};
use crate::types::ImageShape;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Data configuration
    pub data: DataConfig,
    /// Batch augmentation
    pub augmentation: AugmentationConfig,
    /// Network and checkpoint location
    pub network: NetworkConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Epoch hooks built by the run logger
    pub hooks: HookConfig,
    /// Root directory for timestamped run folders
    pub output_dir: PathBuf,
    /// Directory with images used for qualitative snapshots
    pub test_images: Option<PathBuf>,
    /// Seed for shuffling and augmentation; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            augmentation: AugmentationConfig::default(),
            network: NetworkConfig::default(),
            training: TrainingParams::default(),
            hooks: HookConfig::default(),
            output_dir: PathBuf::from("logs"),
            test_images: None,
            seed: None,
        }
    }
}

impl RunConfig {
    /// Checks every section for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.augmentation.validate()?;
        self.network.validate()?;
        self.training.validate()?;
        self.hooks.validate()?;
        Ok(())
    }

    /// Shape of the tensors fed into the network
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(
            self.augmentation.target_width,
            self.augmentation.target_height,
            self.network.input_channels,
        )
    }

    /// Shape of the tensors the network predicts
    pub fn output_shape(&self) -> ImageShape {
        ImageShape::new(
            self.augmentation.target_width,
            self.augmentation.target_height,
            self.network.output_channels,
        )
    }
}

/// Where the sample lists live and how they are batched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Text file listing training input images, one path per line
    pub train_inputs: PathBuf,
    /// Text file listing training label images, line-aligned with `train_inputs`
    pub train_labels: PathBuf,
    /// Text file listing validation input images
    pub val_inputs: Option<PathBuf>,
    /// Text file listing validation label images
    pub val_labels: Option<PathBuf>,
    /// Hold out part of the training pairs when no validation lists are given
    pub split_train: bool,
    /// Batch size
    pub batch_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_inputs: PathBuf::from("data/train_x.txt"),
            train_labels: PathBuf::from("data/train_y.txt"),
            val_inputs: None,
            val_labels: None,
            split_train: true,
            batch_size: 8,
        }
    }
}

impl DataConfig {
    /// Validates the data section
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".to_string()));
        }
        if self.val_inputs.is_some() != self.val_labels.is_some() {
            return Err(Error::Config(
                "val_inputs and val_labels must be given together".to_string(),
            ));
        }
        Ok(())
    }

    /// Validation list pair, when both files are configured
    pub fn validation_lists(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.val_inputs, &self.val_labels) {
            (Some(inputs), Some(labels)) => Some((inputs.clone(), labels.clone())),
            _ => None,
        }
    }
}

/// Resampling filter used when resizing crops
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest neighbour (pixel replication)
    Nearest,
    /// Bilinear
    Bilinear,
    /// Bicubic (Catmull-Rom)
    Bicubic,
    /// Lanczos with window 3
    Lanczos,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "nearest"),
            Interpolation::Bilinear => write!(f, "bilinear"),
            Interpolation::Bicubic => write!(f, "bicubic"),
            Interpolation::Lanczos => write!(f, "lanczos"),
        }
    }
}

/// Batch augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Apply normalize/crop/resize/flip; identity otherwise
    pub enabled: bool,
    /// Width every crop is resized to
    pub target_width: u32,
    /// Height every crop is resized to
    pub target_height: u32,
    /// Resampling filter
    pub interpolation: Interpolation,
    /// Upper bound (exclusive) of the fraction cut from each side
    pub max_crop_fraction: f32,
    /// Probability of flipping a batch horizontally
    pub flip_probability: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_width: 128,
            target_height: 128,
            interpolation: Interpolation::Bilinear,
            max_crop_fraction: 0.25,
            flip_probability: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Validates the augmentation section
    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(Error::Config("Target size must be non-zero".to_string()));
        }
        if !(0.0..0.5).contains(&self.max_crop_fraction) {
            return Err(Error::Config(format!(
                "max_crop_fraction must be in [0, 0.5), got {}",
                self.max_crop_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(Error::Config(format!(
                "flip_probability must be in [0, 1], got {}",
                self.flip_probability
            )));
        }
        Ok(())
    }
}

/// Network identity and checkpoint location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name used for the checkpoint folder and file prefix
    pub name: String,
    /// Root of the per-network checkpoint folders
    pub save_root: PathBuf,
    /// Channels of the input images
    pub input_channels: u32,
    /// Channels of the predicted map
    pub output_channels: u32,
    /// Filters of the first convolution; deeper layers scale from it
    pub base_filters: usize,
    /// Dropout rate after every block
    pub dropout: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::from("SampleCnn"),
            save_root: PathBuf::from("saveData"),
            input_channels: 3,
            output_channels: 1,
            base_filters: 32,
            dropout: 0.1,
        }
    }
}

impl NetworkConfig {
    /// Validates the network section
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("Network name must not be empty".to_string()));
        }
        if !matches!(self.input_channels, 1 | 3) || !matches!(self.output_channels, 1 | 3) {
            return Err(Error::Config(
                "Input and output channels must be 1 or 3".to_string(),
            ));
        }
        if self.base_filters == 0 {
            return Err(Error::Config("base_filters must be greater than 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Number of epochs to run in this invocation
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 0.001,
        }
    }
}

impl TrainingParams {
    /// Validates the training section
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("Number of epochs must be greater than 0".to_string()));
        }
        if self.learning_rate <= 0.0 {
            return Err(Error::Config("Learning rate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Where prediction grids are sent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationTarget {
    /// PNG file per epoch
    File,
    /// PNG file plus an entry in the dashboard event stream
    Dashboard,
}

/// Selection of epoch hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Save a checkpoint every `checkpoint_period` epochs
    pub checkpoint: bool,
    /// Append per-epoch metrics to `log.csv`
    pub csv: bool,
    /// Stream `loss` and `val_loss` to the dashboard scalar file
    pub dashboard: bool,
    /// Snapshot predictions on the registered test images
    pub visualize: bool,
    /// Sink for the prediction snapshots
    pub target: VisualizationTarget,
    /// Epochs between checkpoints
    pub checkpoint_period: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            checkpoint: true,
            csv: true,
            dashboard: true,
            visualize: true,
            target: VisualizationTarget::Dashboard,
            checkpoint_period: 5,
        }
    }
}

impl HookConfig {
    /// Validates the hook section
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint && self.checkpoint_period == 0 {
            return Err(Error::Config(
                "checkpoint_period must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_config_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hooks.checkpoint_period, 5);
        assert_eq!(config.augmentation.max_crop_fraction, 0.25);
        assert_eq!(config.input_shape(), ImageShape::new(128, 128, 3));
        assert_eq!(config.output_shape(), ImageShape::new(128, 128, 1));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = RunConfig::default();
        config.data.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_half_validation_pair_rejected() {
        let mut data = DataConfig::default();
        data.val_inputs = Some(PathBuf::from("val_x.txt"));
        assert!(data.validate().is_err());
        assert!(data.validation_lists().is_none());

        data.val_labels = Some(PathBuf::from("val_y.txt"));
        assert!(data.validate().is_ok());
        assert!(data.validation_lists().is_some());
    }

    #[test]
    fn test_crop_fraction_capped_below_half() {
        let mut aug = AugmentationConfig::default();
        aug.max_crop_fraction = 0.5;
        assert!(aug.validate().is_err());
        aug.max_crop_fraction = 0.0;
        assert!(aug.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            seed = 7

            [data]
            train_inputs = "lists/x.txt"
            train_labels = "lists/y.txt"
            batch_size = 4

            [hooks]
            target = "file"
            dashboard = false
            checkpoint_period = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(7));
        assert_eq!(config.data.batch_size, 4);
        assert!(config.data.split_train);
        assert_eq!(config.hooks.target, VisualizationTarget::File);
        assert_eq!(config.hooks.checkpoint_period, 2);
        assert!(!config.hooks.dashboard);
        assert!(config.hooks.csv);
        assert_eq!(config.augmentation.interpolation, Interpolation::Bilinear);
        assert_eq!(config.network.name, "SampleCnn");
    }

    #[test]
    fn test_interpolation_display() {
        assert_eq!(Interpolation::Nearest.to_string(), "nearest");
        assert_eq!(Interpolation::Lanczos.to_string(), "lanczos");
    }
}
