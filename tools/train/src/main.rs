//! Training CLI Tool
//!
//! Trains an image-to-image network from paired path lists, resuming from the
//! latest checkpoint of the configured network when one exists.

use anyhow::{Context, Result};
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use burn::module::AutodiffModule;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pixpair_core::{load_toml_config, setup_cli_logging, DataSplit, RunConfig};
use pixpair_dataset::{ImageDataset, NormCropResize, SampleTransform};
use pixpair_training::{
    CheckpointHook, EpochHook, EpochMetrics, Network, PixelModel, RunLogger, SampleCnn,
    SampleCnnNetwork, Trainer,
};
use std::path::PathBuf;
use tracing::info;

type TrainBackend = Autodiff<NdArray>;
type InnerBackend = NdArray;

/// Image-to-image training tool
#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train image-to-image networks",
    long_about = "Train image-to-image networks on paired input/label images listed in text files. \
                  Runs are logged to timestamped folders and resume from the latest checkpoint."
)]
struct Args {
    /// Path to run configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override output directory for run folders
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override learning rate
    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    /// Override batch size
    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Override directory of test images for prediction snapshots
    #[arg(short, long, value_name = "DIR")]
    test_images: Option<PathBuf>,

    /// Override random seed
    #[arg(short, long, value_name = "SEED")]
    seed: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Dry run (validate config without training)
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_cli_logging(args.verbose)?;

    info!("pixpair - Training Tool");
    info!("=======================");

    let mut config: RunConfig =
        load_toml_config(&args.config).context("Failed to load configuration file")?;

    apply_overrides(&mut config, &args);

    config.validate().context("Invalid configuration")?;

    print_config_summary(&config);

    if args.dry_run {
        info!("Configuration validated successfully (dry run)");
        return Ok(());
    }

    run_training(&config)?;

    info!("Training completed successfully!");

    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.training.learning_rate = lr;
    }
    if let Some(batch_size) = args.batch_size {
        config.data.batch_size = batch_size;
    }
    if let Some(ref output) = args.output {
        config.output_dir = output.clone();
    }
    if let Some(ref test_images) = args.test_images {
        config.test_images = Some(test_images.clone());
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
}

fn print_config_summary(config: &RunConfig) {
    info!("");
    info!("Configuration Summary:");
    info!("  Network: {} ({} filters)", config.network.name, config.network.base_filters);
    info!("  Input shape: {}", config.input_shape());
    info!("  Output shape: {}", config.output_shape());
    info!("  Epochs: {}", config.training.epochs);
    info!("  Batch size: {}", config.data.batch_size);
    info!("  Learning rate: {}", config.training.learning_rate);
    info!("  Train inputs: {}", config.data.train_inputs.display());
    info!("  Train labels: {}", config.data.train_labels.display());
    match config.data.validation_lists() {
        Some((inputs, labels)) => {
            info!("  Val inputs: {}", inputs.display());
            info!("  Val labels: {}", labels.display());
        }
        None => info!("  Hold-out split: {}", config.data.split_train),
    }
    if config.augmentation.enabled {
        info!(
            "  Augmentation: crop < {}, flip p={}, {} resize",
            config.augmentation.max_crop_fraction,
            config.augmentation.flip_probability,
            config.augmentation.interpolation
        );
    } else {
        info!(
            "  Augmentation: off, resizing to {}x{}",
            config.augmentation.target_width, config.augmentation.target_height
        );
    }
    info!("  Output dir: {}", config.output_dir.display());
    info!("  Checkpoints: {}", config.network.save_root.join(&config.network.name).display());
    info!("");
}

fn build_dataset(config: &RunConfig) -> Result<ImageDataset> {
    let mut dataset = ImageDataset::new(config.data.batch_size)?;
    if let Some(seed) = config.seed {
        dataset = dataset.with_seed(seed);
    }
    let augmentation = &config.augmentation;
    if augmentation.enabled {
        dataset = dataset.with_augmenter(NormCropResize::from_config(augmentation));
    } else {
        dataset = dataset.with_transform(SampleTransform::resize(
            augmentation.target_width,
            augmentation.target_height,
            augmentation.interpolation,
        ));
    }

    let validation = config.data.validation_lists();
    dataset
        .add_from_txt(
            &config.data.train_inputs,
            &config.data.train_labels,
            validation
                .as_ref()
                .map(|(inputs, labels)| (inputs.as_path(), labels.as_path())),
            config.data.split_train,
        )
        .context("Failed to load sample lists")?;

    info!(
        "Loaded {} training and {} validation pairs",
        dataset.train_len(),
        dataset.validation_len()
    );

    Ok(dataset)
}

fn run_training(config: &RunConfig) -> Result<()> {
    let device = NdArrayDevice::default();

    info!("Loading dataset...");
    let mut dataset = build_dataset(config)?;
    let mut train = dataset.generator(DataSplit::Train);
    let mut validation =
        (dataset.validation_len() > 0).then(|| dataset.generator(DataSplit::Validation));

    let network = SampleCnnNetwork::from_config(&config.network);
    let (model, initial_epoch) = Network::<TrainBackend>::load_or_build(
        &network,
        config.input_shape(),
        config.output_shape(),
        &device,
    )
    .context("Failed to build network")?;

    let mut logger =
        RunLogger::<InnerBackend>::new(&config.output_dir, &model.valid(), device.clone())
            .context("Failed to create run directory")?
            .with_input_shape(config.input_shape());

    if let Some(ref dir) = config.test_images {
        let count = logger
            .set_test_images(dir)
            .with_context(|| format!("Failed to load test images from {}", dir.display()))?;
        info!("Using {} test images for snapshots", count);
    }

    let mut hooks = logger.hooks::<SampleCnn<InnerBackend>>(&config.hooks)?;
    if config.hooks.checkpoint {
        let model_dir = Network::<TrainBackend>::model_dir(&network);
        hooks.push(
            CheckpointHook::new(model_dir, config.hooks.checkpoint_period)?
                .with_prefix(Network::<TrainBackend>::name(&network)),
        );
    }
    hooks.push(ProgressHook::new(initial_epoch, config.training.epochs)?);

    let trainer = Trainer::<TrainBackend>::new(device, config.training.learning_rate)
        .with_channels(config.network.input_channels, config.network.output_channels);

    let (_, history) = trainer
        .fit(
            model,
            &mut train,
            validation.as_mut(),
            config.training.epochs,
            initial_epoch,
            &mut hooks,
        )
        .context("Training failed")?;

    info!("");
    info!("Training Summary:");
    if let Some(last) = history.last() {
        info!("  Final epoch: {}", last.epoch);
        info!("  Final training loss: {:.6}", last.loss);
        if let Some(val_loss) = last.val_loss {
            info!("  Final validation loss: {:.6}", val_loss);
        }
    }
    if let Some(best) = history
        .iter()
        .filter_map(|m| m.val_loss.map(|v| (m.epoch, v)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        info!("  Best validation loss: {:.6} (epoch {})", best.1, best.0);
    }
    info!("  Run directory: {}", logger.run_dir().display());

    Ok(())
}

/// Epoch progress bar
struct ProgressHook {
    bar: ProgressBar,
    initial_epoch: usize,
}

impl ProgressHook {
    fn new(initial_epoch: usize, epochs: usize) -> Result<Self> {
        let bar = ProgressBar::new(epochs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar, initial_epoch })
    }
}

impl<M: PixelModel<InnerBackend>> EpochHook<InnerBackend, M> for ProgressHook {
    fn name(&self) -> &str {
        "progress"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _model: &M) -> pixpair_core::Result<()> {
        self.bar
            .set_position((metrics.epoch - self.initial_epoch) as u64);
        self.bar.set_message(format!("loss {:.4}", metrics.loss));
        if self.bar.position() >= self.bar.length().unwrap_or(0) {
            self.bar.finish();
        }
        Ok(())
    }
}
