//! Paired image dataset and its batch generator.
//!
//! [`ImageDataset`] owns the train and validation splits. Each call to
//! [`ImageDataset::generator`] snapshots one split into a
//! [`BatchGenerator`], an endless iterator that reshuffles its snapshot at
//! every epoch boundary and yields `floor(len / batch_size)` batches per
//! epoch. Tail samples that do not fill a batch are skipped for that epoch.

use crate::augmentation::{Augment, Identity};
use crate::lists::{holdout_split, pair_samples, read_path_list, HOLDOUT_FRACTION, HOLDOUT_SEED};
use crate::loader::SampleReader;
use crate::preprocess::SampleTransform;
use image::DynamicImage;
use pixpair_core::{DataSplit, Error, Result, Sample};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Decoded images of one batch; `labels[i]` is the target of `inputs[i]`
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub inputs: Vec<DynamicImage>,
    pub labels: Vec<DynamicImage>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Train and validation lists of image pairs plus the batch pipeline
pub struct ImageDataset {
    batch_size: usize,
    train: Vec<Sample>,
    validation: Vec<Sample>,
    reader: SampleReader,
    transform: SampleTransform,
    augmenter: Arc<dyn Augment>,
    rng: ChaCha8Rng,
}

impl ImageDataset {
    /// Creates an empty dataset with an entropy-seeded random source.
    ///
    /// Fails when `batch_size` is zero.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument(
                "Batch size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            batch_size,
            train: Vec::new(),
            validation: Vec::new(),
            reader: SampleReader::new(),
            transform: SampleTransform::identity(),
            augmenter: Arc::new(Identity),
            rng: ChaCha8Rng::from_entropy(),
        })
    }

    /// Fixes the random source so shuffles and augmentation repeat across runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_reader(mut self, reader: SampleReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_transform(mut self, transform: SampleTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_augmenter(mut self, augmenter: impl Augment + 'static) -> Self {
        self.augmenter = Arc::new(augmenter);
        self
    }

    /// Appends pairs read from parallel path-list files.
    ///
    /// With `validation` the given lists go to the validation split. Without
    /// it and with `split_train`, a fixed-seed 20% of the loaded pairs is
    /// held out for validation instead.
    pub fn add_from_txt(
        &mut self,
        train_inputs: &Path,
        train_labels: &Path,
        validation: Option<(&Path, &Path)>,
        split_train: bool,
    ) -> Result<()> {
        let train = pair_samples(read_path_list(train_inputs)?, read_path_list(train_labels)?)?;

        let validation = match validation {
            Some((inputs, labels)) => Some(pair_samples(
                read_path_list(inputs)?,
                read_path_list(labels)?,
            )?),
            None => None,
        };

        self.append(train, validation, split_train);
        Ok(())
    }

    /// Appends pairs given as in-memory path strings.
    ///
    /// The validation lists are used only when both are non-empty.
    pub fn add_data<S: AsRef<str>>(
        &mut self,
        train_inputs: &[S],
        train_labels: &[S],
        val_inputs: &[S],
        val_labels: &[S],
        split_train: bool,
    ) -> Result<()> {
        let to_paths = |items: &[S]| items.iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>();

        let train = pair_samples(to_paths(train_inputs), to_paths(train_labels))?;

        let validation = if !val_inputs.is_empty() && !val_labels.is_empty() {
            Some(pair_samples(to_paths(val_inputs), to_paths(val_labels))?)
        } else {
            None
        };

        self.append(train, validation, split_train);
        Ok(())
    }

    fn append(&mut self, train: Vec<Sample>, validation: Option<Vec<Sample>>, split_train: bool) {
        let (train, validation) = match validation {
            Some(validation) => (train, validation),
            None if split_train => holdout_split(train, HOLDOUT_FRACTION, HOLDOUT_SEED),
            None => (train, Vec::new()),
        };

        info!(
            "Added {} train and {} validation pairs",
            train.len(),
            validation.len()
        );

        self.train.extend(train);
        self.validation.extend(validation);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn validation_len(&self) -> usize {
        self.validation.len()
    }

    /// Pairs currently held for a split, in load order
    pub fn samples(&self, split: DataSplit) -> &[Sample] {
        match split {
            DataSplit::Train => &self.train,
            DataSplit::Validation => &self.validation,
        }
    }

    /// Number of full batches one epoch over the split yields
    pub fn steps_per_epoch(&self, split: DataSplit) -> usize {
        self.samples(split).len() / self.batch_size
    }

    /// Creates an endless batch iterator over a snapshot of the split.
    ///
    /// Pairs added afterwards are not seen by this generator. Its random
    /// source is drawn from the dataset's, so seeded datasets produce
    /// reproducible generators.
    pub fn generator(&mut self, split: DataSplit) -> BatchGenerator {
        let seed: u64 = self.rng.gen();
        let samples = self.samples(split).to_vec();

        debug!(
            "Created {} generator over {} pairs ({} steps per epoch)",
            split,
            samples.len(),
            samples.len() / self.batch_size
        );

        BatchGenerator {
            split,
            samples,
            batch_size: self.batch_size,
            step: 0,
            epoch: 0,
            reader: self.reader.clone(),
            transform: self.transform.clone(),
            augmenter: Arc::clone(&self.augmenter),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl std::fmt::Debug for ImageDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDataset")
            .field("batch_size", &self.batch_size)
            .field("train", &self.train.len())
            .field("validation", &self.validation.len())
            .finish_non_exhaustive()
    }
}

/// Endless iterator of decoded, augmented batches over one split.
///
/// Yields nothing when the split holds fewer pairs than one batch.
pub struct BatchGenerator {
    split: DataSplit,
    samples: Vec<Sample>,
    batch_size: usize,
    step: usize,
    epoch: usize,
    reader: SampleReader,
    transform: SampleTransform,
    augmenter: Arc<dyn Augment>,
    rng: ChaCha8Rng,
}

impl BatchGenerator {
    pub fn split(&self) -> DataSplit {
        self.split
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.samples.len() / self.batch_size
    }

    /// Number of epochs started so far
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn load_batch(&self, chunk: &[Sample]) -> Result<ImageBatch> {
        let reader = &self.reader;
        let transform = &self.transform;

        let pairs = chunk
            .par_iter()
            .map(|sample| reader.read_sample(sample).map(|pair| transform.apply(pair)))
            .collect::<Result<Vec<_>>>()?;

        let (inputs, labels) = pairs.into_iter().map(|pair| (pair.input, pair.label)).unzip();
        Ok(ImageBatch { inputs, labels })
    }
}

impl Iterator for BatchGenerator {
    type Item = Result<ImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let steps = self.steps_per_epoch();
        if steps == 0 {
            return None;
        }

        if self.step == 0 {
            self.samples.shuffle(&mut self.rng);
            self.epoch += 1;
            debug!("{} generator starting epoch {}", self.split, self.epoch);
        }

        let start = self.step * self.batch_size;
        let end = start + self.batch_size;
        self.step = (self.step + 1) % steps;

        let batch = match self.load_batch(&self.samples[start..end]) {
            Ok(batch) => batch,
            Err(e) => return Some(Err(e)),
        };

        Some(self.augmenter.augment(batch, &mut self.rng))
    }
}

impl std::fmt::Debug for BatchGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchGenerator")
            .field("split", &self.split)
            .field("samples", &self.samples.len())
            .field("batch_size", &self.batch_size)
            .field("step", &self.step)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
