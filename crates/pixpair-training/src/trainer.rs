//! Training loop for image-to-image models.
//!
//! Pulls `steps_per_epoch` batches from the train generator per epoch,
//! minimizes the mean squared error with Adam, evaluates the validation
//! generator on the inner backend and hands the epoch metrics to the hooks.

use crate::hooks::{EpochMetrics, HookSet};
use crate::model::PixelModel;
use crate::tensor::PairBatcher;
use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use pixpair_core::{Error, Result};
use pixpair_dataset::BatchGenerator;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives training of one model
pub struct Trainer<B: AutodiffBackend> {
    device: B::Device,
    learning_rate: f64,
    input_channels: u32,
    output_channels: u32,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Creates a trainer for RGB inputs and single-channel targets
    pub fn new(device: B::Device, learning_rate: f64) -> Self {
        Self {
            device,
            learning_rate,
            input_channels: 3,
            output_channels: 1,
        }
    }

    pub fn with_channels(mut self, input_channels: u32, output_channels: u32) -> Self {
        self.input_channels = input_channels;
        self.output_channels = output_channels;
        self
    }

    /// Trains for `epochs` epochs, numbered from `initial_epoch + 1`.
    ///
    /// Returns the trained model and the metrics of every epoch.
    pub fn fit<M>(
        &self,
        mut model: M,
        train: &mut BatchGenerator,
        mut validation: Option<&mut BatchGenerator>,
        epochs: usize,
        initial_epoch: usize,
        hooks: &mut HookSet<B::InnerBackend, M::InnerModule>,
    ) -> Result<(M, Vec<EpochMetrics>)>
    where
        M: PixelModel<B> + AutodiffModule<B>,
        M::InnerModule: PixelModel<B::InnerBackend>,
    {
        let steps = train.steps_per_epoch();
        if steps == 0 {
            return Err(Error::Training(format!(
                "Train split has fewer pairs than one batch of {}",
                train.batch_size()
            )));
        }

        let batcher = PairBatcher::<B>::new(self.device.clone(), self.input_channels, self.output_channels);
        let mut optimizer = AdamConfig::new().init();
        let mut history = Vec::with_capacity(epochs);

        info!(
            "Training epochs {}..={} with {} steps per epoch",
            initial_epoch + 1,
            initial_epoch + epochs,
            steps
        );

        for epoch in initial_epoch + 1..=initial_epoch + epochs {
            let start = Instant::now();
            let mut loss_sum = 0.0;

            for step in 0..steps {
                let batch = train
                    .next()
                    .ok_or_else(|| Error::Training("Train generator ended early".to_string()))??;
                let batch = batcher.batch(&batch)?;

                let output = model.forward(batch.inputs);
                check_dims(&output, &batch.targets)?;
                let loss = MseLoss::new().forward(output, batch.targets, Reduction::Mean);

                let loss_value: f64 = loss.clone().into_scalar().elem();
                loss_sum += loss_value;
                debug!("Epoch {} step {}/{}: loss {:.6}", epoch, step + 1, steps, loss_value);

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.learning_rate, model, grads);
            }

            let inner = model.valid();
            let val_loss = match validation.as_deref_mut() {
                Some(generator) => self.evaluate(&inner, generator)?,
                None => None,
            };

            let metrics = EpochMetrics {
                epoch,
                loss: loss_sum / steps as f64,
                val_loss,
            };

            match metrics.val_loss {
                Some(val_loss) => info!(
                    "Epoch {}: loss {:.6}, val_loss {:.6} ({:.1}s)",
                    epoch,
                    metrics.loss,
                    val_loss,
                    start.elapsed().as_secs_f64()
                ),
                None => info!(
                    "Epoch {}: loss {:.6} ({:.1}s)",
                    epoch,
                    metrics.loss,
                    start.elapsed().as_secs_f64()
                ),
            }

            hooks.on_epoch_end(&metrics, &inner)?;
            history.push(metrics);
        }

        Ok((model, history))
    }

    /// Mean loss over one epoch of the generator; `None` when it has no batches
    fn evaluate<M>(&self, model: &M, generator: &mut BatchGenerator) -> Result<Option<f64>>
    where
        M: PixelModel<B::InnerBackend>,
    {
        let steps = generator.steps_per_epoch();
        if steps == 0 {
            warn!("Validation split has fewer pairs than one batch, skipping evaluation");
            return Ok(None);
        }

        let batcher = PairBatcher::<B::InnerBackend>::new(
            self.device.clone(),
            self.input_channels,
            self.output_channels,
        );

        let mut loss_sum = 0.0;
        for _ in 0..steps {
            let batch = generator
                .next()
                .ok_or_else(|| Error::Training("Validation generator ended early".to_string()))??;
            let batch = batcher.batch(&batch)?;
            let output = model.forward(batch.inputs);
            check_dims(&output, &batch.targets)?;
            loss_sum += mse(output, batch.targets);
        }

        Ok(Some(loss_sum / steps as f64))
    }
}

fn check_dims<B: Backend>(output: &Tensor<B, 4>, targets: &Tensor<B, 4>) -> Result<()> {
    let (output, targets) = (output.dims(), targets.dims());
    if output != targets {
        return Err(Error::Training(format!(
            "Model output shape {:?} does not match target shape {:?}",
            output, targets
        )));
    }
    Ok(())
}

/// Mean squared error between a prediction batch and its targets
pub fn mse<B: Backend>(prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> f64 {
    MseLoss::new()
        .forward(prediction, target, Reduction::Mean)
        .into_scalar()
        .elem()
}
