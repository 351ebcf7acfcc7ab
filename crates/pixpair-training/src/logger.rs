//! Run directories and the hooks that write into them.
//!
//! Layout of a run:
//!
//! ```text
//! <output_root>/<YYYY-MM-DD-HH-MM-SS>/
//!     architecture.txt
//!     log.csv
//!     events.jsonl
//!     scalars.jsonl
//!     0005.mpk
//!     figs/<epoch>.png
//! ```
//!
//! A run started in the same second as an existing one gets a `-1`, `-2`, ...
//! suffix so runs never share a directory.

use crate::dashboard::DashboardWriter;
use crate::hooks::{CheckpointHook, CsvLogHook, HookSet, ScalarHook, VisualizationHook};
use crate::model::PixelModel;
use burn::tensor::backend::Backend;
use chrono::Local;
use image::imageops::FilterType;
use image::DynamicImage;
use pixpair_core::{Error, HookConfig, ImageShape, Result, VisualizationTarget};
use pixpair_dataset::{list_images, SampleReader};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Most test images kept for visual snapshots
pub const MAX_TEST_IMAGES: usize = 8;

pub const ARCHITECTURE_FILE: &str = "architecture.txt";
pub const CSV_LOG_FILE: &str = "log.csv";
pub const FIGURES_DIR: &str = "figs";

/// Attempts at a fresh run directory before giving up
const MAX_RUN_DIR_ATTEMPTS: usize = 100;

/// Creates a new directory named `stamp` under `root`, suffixing on collision
fn create_run_dir(root: &Path, stamp: &str) -> Result<PathBuf> {
    fs::create_dir_all(root)?;

    for attempt in 0..MAX_RUN_DIR_ATTEMPTS {
        let name = match attempt {
            0 => stamp.to_string(),
            n => format!("{stamp}-{n}"),
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::AlreadyExists(format!(
        "No free run directory for {} under {}",
        stamp,
        root.display()
    )))
}

/// Owns one timestamped run directory and builds its epoch hooks
pub struct RunLogger<B: Backend> {
    run_dir: PathBuf,
    test_images: Vec<DynamicImage>,
    input_shape: Option<ImageShape>,
    device: B::Device,
}

impl<B: Backend> RunLogger<B> {
    /// Creates `<output_root>/<timestamp>/figs/` and writes the model summary
    pub fn new<M: PixelModel<B>>(output_root: &Path, model: &M, device: B::Device) -> Result<Self> {
        let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        let run_dir = create_run_dir(output_root, &stamp)?;

        fs::create_dir(run_dir.join(FIGURES_DIR))?;
        fs::write(run_dir.join(ARCHITECTURE_FILE), model.summary())?;

        info!("Logging run to {}", run_dir.display());

        Ok(Self {
            run_dir,
            test_images: Vec::new(),
            input_shape: None,
            device,
        })
    }

    /// Network input shape; test images are resized to it before prediction
    pub fn with_input_shape(mut self, shape: ImageShape) -> Self {
        self.input_shape = Some(shape);
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn figs_dir(&self) -> PathBuf {
        self.run_dir.join(FIGURES_DIR)
    }

    pub fn test_images(&self) -> &[DynamicImage] {
        &self.test_images
    }

    /// Loads up to 8 images from `dir`, in file-name order, as fixed samples
    /// for the visualization hook. Returns how many were added.
    pub fn set_test_images(&mut self, dir: &Path) -> Result<usize> {
        let reader = SampleReader::new();
        let paths = list_images(dir, MAX_TEST_IMAGES)?;

        for path in &paths {
            let image = reader.load_image(path)?;
            self.test_images.push(self.fit_to_input(image));
        }

        debug!("Registered {} test images from {}", paths.len(), dir.display());
        Ok(paths.len())
    }

    /// Adds one in-memory test image
    pub fn add_test_image(&mut self, image: DynamicImage) {
        let image = self.fit_to_input(image);
        self.test_images.push(image);
    }

    fn fit_to_input(&self, image: DynamicImage) -> DynamicImage {
        match self.input_shape {
            Some(shape) if (image.width(), image.height()) != (shape.width, shape.height) => {
                image.resize_exact(shape.width, shape.height, FilterType::Triangle)
            }
            _ => image,
        }
    }

    /// Builds the hooks selected in `config`, in the order checkpoint, csv,
    /// dashboard, visualization
    pub fn hooks<M: PixelModel<B> + 'static>(&self, config: &HookConfig) -> Result<HookSet<B, M>> {
        let mut hooks = HookSet::new();

        if config.checkpoint {
            hooks.push(CheckpointHook::new(&self.run_dir, config.checkpoint_period)?);
        }

        if config.csv {
            hooks.push(CsvLogHook::new(self.run_dir.join(CSV_LOG_FILE)));
        }

        if config.dashboard {
            hooks.push(ScalarHook::new(DashboardWriter::new(&self.run_dir)));
        }

        if config.visualize {
            let channels = self.input_shape.map(|shape| shape.channels).unwrap_or(3);
            let hook = VisualizationHook::<B>::new(
                self.test_images.clone(),
                channels,
                self.figs_dir(),
                self.device.clone(),
            );
            match config.target {
                VisualizationTarget::File => hooks.push(hook),
                VisualizationTarget::Dashboard => {
                    hooks.push(hook.with_dashboard(DashboardWriter::new(&self.run_dir)))
                }
            }
        }

        debug!("Built hooks: {:?}", hooks.names());
        Ok(hooks)
    }
}
