//! Networks, checkpoints, run logging and the training loop for pixpair.
//!
//! - [`Network`]: builds a model and resumes it from its latest checkpoint
//! - [`RunLogger`]: a timestamped run directory plus the epoch hooks writing into it
//! - [`Trainer`]: MSE + Adam loop driving a [`pixpair_dataset::BatchGenerator`]

pub mod dashboard;
pub mod grid;
pub mod hooks;
pub mod logger;
pub mod model;
pub mod network;
pub mod tensor;
pub mod trainer;

pub use dashboard::{DashboardWriter, ImageEvent, ScalarEvent, EVENTS_FILE, SCALARS_FILE};
pub use grid::{grid_dims, interleave, stack_grid};
pub use hooks::{
    CheckpointHook, CsvLogHook, EpochHook, EpochMetrics, HookSet, ScalarHook, VisualizationHook,
};
pub use logger::{RunLogger, ARCHITECTURE_FILE, CSV_LOG_FILE, FIGURES_DIR, MAX_TEST_IMAGES};
pub use model::{PixelModel, SampleCnn, SampleCnnConfig, SAMPLE_CNN_STRIDE};
pub use network::{
    latest_checkpoint, load_checkpoint, parse_checkpoint_epoch, save_checkpoint, Network,
    SampleCnnNetwork, CHECKPOINT_EXTENSION, DEFAULT_SAVE_ROOT,
};
pub use tensor::{images_to_tensor, tensor_to_images, PairBatch, PairBatcher};
pub use trainer::{mse, Trainer};
