//! Epoch-boundary hooks.
//!
//! Hooks are invoked by the trainer after every epoch with the epoch's
//! metrics and the current model. Each hook performs blocking file I/O.

use crate::dashboard::DashboardWriter;
use crate::grid::{interleave, stack_grid};
use crate::model::PixelModel;
use crate::network::{save_checkpoint, CHECKPOINT_EXTENSION};
use crate::tensor::{images_to_tensor, tensor_to_images};
use burn::tensor::backend::Backend;
use image::DynamicImage;
use pixpair_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    /// Mean training loss
    pub loss: f64,
    /// Mean validation loss, when a validation split was evaluated
    pub val_loss: Option<f64>,
}

/// Callback run at the end of every epoch
pub trait EpochHook<B: Backend, M: PixelModel<B>> {
    fn name(&self) -> &str;

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &M) -> Result<()>;
}

/// Saves the model every `period` epochs
#[derive(Debug, Clone)]
pub struct CheckpointHook {
    dir: PathBuf,
    prefix: Option<String>,
    period: usize,
}

impl CheckpointHook {
    /// Writes `<dir>/<epoch:04>.mpk` every `period` epochs
    pub fn new(dir: impl Into<PathBuf>, period: usize) -> Result<Self> {
        if period == 0 {
            return Err(Error::InvalidArgument(
                "Checkpoint period must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            dir: dir.into(),
            prefix: None,
            period,
        })
    }

    /// Prefixes file names as `<prefix>_<epoch:04>.mpk`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Path of the checkpoint for `epoch`, without extension
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        let name = match &self.prefix {
            Some(prefix) => format!("{prefix}_{epoch:04}"),
            None => format!("{epoch:04}"),
        };
        self.dir.join(name)
    }
}

impl<B: Backend, M: PixelModel<B>> EpochHook<B, M> for CheckpointHook {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &M) -> Result<()> {
        if metrics.epoch % self.period != 0 {
            return Ok(());
        }

        let path = self.checkpoint_path(metrics.epoch);
        let file = path.with_extension(CHECKPOINT_EXTENSION);
        if file.exists() {
            return Err(Error::AlreadyExists(format!(
                "Checkpoint {} would be overwritten",
                file.display()
            )));
        }

        let saved = save_checkpoint(model, &path)?;
        info!("Saved checkpoint {}", saved.display());
        Ok(())
    }
}

/// Appends `epoch,loss,val_loss` lines to a CSV file
#[derive(Debug, Clone)]
pub struct CsvLogHook {
    path: PathBuf,
}

impl CsvLogHook {
    pub const HEADER: &'static str = "epoch,loss,val_loss";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, metrics: &EpochMetrics) -> Result<()> {
        let write_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if write_header {
            writeln!(file, "{}", Self::HEADER)?;
        }

        let val_loss = metrics.val_loss.map(|v| v.to_string()).unwrap_or_default();
        writeln!(file, "{},{},{}", metrics.epoch, metrics.loss, val_loss)?;
        Ok(())
    }
}

impl<B: Backend, M: PixelModel<B>> EpochHook<B, M> for CsvLogHook {
    fn name(&self) -> &str {
        "csv"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _model: &M) -> Result<()> {
        self.append(metrics)
    }
}

/// Streams `loss` and `val_loss` to the dashboard scalar file
#[derive(Debug, Clone)]
pub struct ScalarHook {
    dashboard: DashboardWriter,
}

impl ScalarHook {
    pub fn new(dashboard: DashboardWriter) -> Self {
        Self { dashboard }
    }
}

impl<B: Backend, M: PixelModel<B>> EpochHook<B, M> for ScalarHook {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _model: &M) -> Result<()> {
        self.dashboard.add_scalar("loss", metrics.epoch, metrics.loss)?;
        if let Some(val_loss) = metrics.val_loss {
            self.dashboard.add_scalar("val_loss", metrics.epoch, val_loss)?;
        }
        Ok(())
    }
}

/// Predicts the registered test images one at a time and saves a grid
pub struct VisualizationHook<B: Backend> {
    images: Vec<DynamicImage>,
    input_channels: u32,
    figs_dir: PathBuf,
    dashboard: Option<DashboardWriter>,
    device: B::Device,
}

impl<B: Backend> VisualizationHook<B> {
    /// `images` must already have the network's input size
    pub fn new(
        images: Vec<DynamicImage>,
        input_channels: u32,
        figs_dir: impl Into<PathBuf>,
        device: B::Device,
    ) -> Self {
        Self {
            images,
            input_channels,
            figs_dir: figs_dir.into(),
            dashboard: None,
            device,
        }
    }

    /// Also pushes interleaved input/prediction grids to a dashboard
    pub fn with_dashboard(mut self, dashboard: DashboardWriter) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    pub fn figure_path(&self, epoch: usize) -> PathBuf {
        self.figs_dir.join(format!("{epoch}.png"))
    }

    fn predict<M: PixelModel<B>>(&self, model: &M) -> Result<Vec<DynamicImage>> {
        let mut predictions = Vec::with_capacity(self.images.len());
        for image in &self.images {
            let input = images_to_tensor::<B>(
                std::slice::from_ref(image),
                self.input_channels,
                &self.device,
            )?;
            predictions.extend(tensor_to_images(model.forward(input))?);
        }
        Ok(predictions)
    }
}

impl<B: Backend, M: PixelModel<B>> EpochHook<B, M> for VisualizationHook<B> {
    fn name(&self) -> &str {
        "visualization"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &M) -> Result<()> {
        if self.images.is_empty() {
            debug!("No test images registered, skipping visualization");
            return Ok(());
        }

        let predictions = self.predict(model)?;

        match &self.dashboard {
            Some(dashboard) => {
                let grid = stack_grid(&interleave(&self.images, &predictions))?;
                let figure = self.figure_path(metrics.epoch);
                let relative = figure.strip_prefix(dashboard.run_dir()).unwrap_or(&figure);
                dashboard.add_image("predictions", metrics.epoch, &grid, relative)?;
            }
            None => {
                let grid = stack_grid(&predictions)?;
                std::fs::create_dir_all(&self.figs_dir)?;
                grid.save(self.figure_path(metrics.epoch))?;
            }
        }

        debug!(
            "Saved {} predictions for epoch {}",
            predictions.len(),
            metrics.epoch
        );
        Ok(())
    }
}

/// Ordered collection of hooks, run one after another
pub struct HookSet<B: Backend, M: PixelModel<B>> {
    hooks: Vec<Box<dyn EpochHook<B, M>>>,
}

impl<B: Backend, M: PixelModel<B>> HookSet<B, M> {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn push(&mut self, hook: impl EpochHook<B, M> + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn with(mut self, hook: impl EpochHook<B, M> + 'static) -> Self {
        self.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Runs every hook in order; the first failure aborts the rest
    pub fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &M) -> Result<()> {
        for hook in &mut self.hooks {
            hook.on_epoch_end(metrics, model)?;
        }
        Ok(())
    }
}

impl<B: Backend, M: PixelModel<B>> Default for HookSet<B, M> {
    fn default() -> Self {
        Self::new()
    }
}
