//! Network definitions and checkpoint discovery.
//!
//! A [`Network`] only has to build a fresh model. Resuming from the most
//! recent checkpoint in `<save_root>/<name>/` comes for free; any failure
//! along the way falls back to the fresh model at epoch 0.

use crate::model::{check_sample_cnn_shapes, PixelModel, SampleCnn, SampleCnnConfig};
use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use pixpair_core::{Error, ImageShape, NetworkConfig, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extension of checkpoint files written by [`CompactRecorder`]
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Default root of the per-network checkpoint folders
pub const DEFAULT_SAVE_ROOT: &str = "saveData";

pub trait Network<B: Backend> {
    type Model: PixelModel<B>;

    /// Name of the network, used for its checkpoint folder and file prefix
    fn name(&self) -> &str;

    fn save_root(&self) -> PathBuf {
        PathBuf::from(DEFAULT_SAVE_ROOT)
    }

    /// Builds an untrained model for the given shapes
    fn build_model(
        &self,
        input_shape: ImageShape,
        output_shape: ImageShape,
        device: &B::Device,
    ) -> Result<Self::Model>;

    fn model_dir(&self) -> PathBuf {
        self.save_root().join(self.name())
    }

    /// Most recent checkpoint in [`Network::model_dir`] and its epoch
    fn latest_checkpoint(&self) -> Result<Option<(PathBuf, usize)>> {
        let Some(path) = latest_checkpoint(&self.model_dir())? else {
            return Ok(None);
        };

        let epoch = parse_checkpoint_epoch(&path).ok_or_else(|| {
            Error::Model(format!(
                "Cannot parse an epoch from checkpoint name {}",
                path.display()
            ))
        })?;

        Ok(Some((path, epoch)))
    }

    /// Loads the latest checkpoint, or builds a fresh model at epoch 0.
    ///
    /// Only a failure to build the fresh model is an error.
    fn load_or_build(
        &self,
        input_shape: ImageShape,
        output_shape: ImageShape,
        device: &B::Device,
    ) -> Result<(Self::Model, usize)> {
        let model = self.build_model(input_shape, output_shape, device)?;

        let loaded = self.latest_checkpoint().and_then(|latest| match latest {
            Some((path, epoch)) => load_checkpoint(model.clone(), &path, device)
                .map(|loaded| Some((loaded, epoch, path))),
            None => Ok(None),
        });

        match loaded {
            Ok(Some((model, epoch, path))) => {
                info!("Loaded {} from {} (epoch {})", self.name(), path.display(), epoch);
                Ok((model, epoch))
            }
            Ok(None) => {
                info!(
                    "No checkpoint found in {}, building a new {}",
                    self.model_dir().display(),
                    self.name()
                );
                Ok((model, 0))
            }
            Err(e) => {
                warn!("Model could not be loaded, starting from scratch: {}", e);
                Ok((model, 0))
            }
        }
    }
}

/// Lexicographically last checkpoint file in `dir`.
///
/// Epochs are zero-padded in file names, so this is also the latest epoch.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!(
            "Checkpoint directory not found: {}",
            dir.display()
        )));
    }

    let mut checkpoints = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_checkpoint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == CHECKPOINT_EXTENSION)
            .unwrap_or(false);
        if path.is_file() && is_checkpoint {
            checkpoints.push(path);
        }
    }

    checkpoints.sort();
    Ok(checkpoints.pop())
}

/// Epoch encoded in a checkpoint name: the last `_`-separated part of the
/// name before its first `.` (`SampleCnn_0010.mpk` and `0010.mpk` give 10)
pub fn parse_checkpoint_epoch(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    stem.rsplit('_').next()?.parse().ok()
}

/// Loads a checkpoint file into `model`
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| Error::Model(format!("Failed to load {}: {:?}", path.display(), e)))
}

/// Saves `model` as `<path>.mpk`
pub fn save_checkpoint<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| Error::Model(format!("Failed to save {}: {:?}", path.display(), e)))?;

    Ok(path.with_extension(CHECKPOINT_EXTENSION))
}

/// [`SampleCnn`] as a [`Network`]
#[derive(Debug, Clone)]
pub struct SampleCnnNetwork {
    name: String,
    save_root: PathBuf,
    base_filters: usize,
    dropout: f64,
}

impl SampleCnnNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            save_root: PathBuf::from(DEFAULT_SAVE_ROOT),
            base_filters: 32,
            dropout: 0.1,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            name: config.name.clone(),
            save_root: config.save_root.clone(),
            base_filters: config.base_filters,
            dropout: config.dropout,
        }
    }

    pub fn with_save_root(mut self, save_root: impl Into<PathBuf>) -> Self {
        self.save_root = save_root.into();
        self
    }

    pub fn with_base_filters(mut self, base_filters: usize) -> Self {
        self.base_filters = base_filters;
        self
    }
}

impl<B: Backend> Network<B> for SampleCnnNetwork {
    type Model = SampleCnn<B>;

    fn name(&self) -> &str {
        &self.name
    }

    fn save_root(&self) -> PathBuf {
        self.save_root.clone()
    }

    fn build_model(
        &self,
        input_shape: ImageShape,
        output_shape: ImageShape,
        device: &B::Device,
    ) -> Result<SampleCnn<B>> {
        check_sample_cnn_shapes(input_shape, output_shape)?;

        let config = SampleCnnConfig::new()
            .with_in_channels(input_shape.channels as usize)
            .with_out_channels(output_shape.channels as usize)
            .with_base_filters(self.base_filters)
            .with_dropout(self.dropout);

        Ok(SampleCnn::new(&config, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn network(root: &Path) -> SampleCnnNetwork {
        SampleCnnNetwork::new("SampleCnn")
            .with_save_root(root)
            .with_base_filters(2)
    }

    fn shapes() -> (ImageShape, ImageShape) {
        (ImageShape::new(16, 16, 3), ImageShape::new(16, 16, 1))
    }

    #[test]
    fn test_parse_checkpoint_epoch() {
        assert_eq!(parse_checkpoint_epoch(Path::new("SampleCnn_0010.mpk")), Some(10));
        assert_eq!(parse_checkpoint_epoch(Path::new("dir/0005.mpk")), Some(5));
        assert_eq!(parse_checkpoint_epoch(Path::new("my_net_0042.tar.mpk")), Some(42));
        assert_eq!(parse_checkpoint_epoch(Path::new("final.mpk")), None);
    }

    #[test]
    fn test_latest_checkpoint_is_lexicographic_last() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["net_0005.mpk", "net_0010.mpk", "net_0003.mpk", "net_0099.txt"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let latest = latest_checkpoint(temp_dir.path()).unwrap().unwrap();
        assert_eq!(latest.file_name().unwrap(), "net_0010.mpk");
    }

    #[test]
    fn test_latest_checkpoint_of_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(latest_checkpoint(temp_dir.path()).unwrap().is_none());
        assert!(latest_checkpoint(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_model_dir_joins_root_and_name() {
        let net = SampleCnnNetwork::new("Saliency");
        assert_eq!(
            <SampleCnnNetwork as Network<TestBackend>>::model_dir(&net),
            PathBuf::from("saveData/Saliency")
        );
    }

    #[test]
    fn test_missing_dir_builds_fresh_model() {
        let temp_dir = TempDir::new().unwrap();
        let net = network(temp_dir.path());
        let (input, output) = shapes();

        let (_, epoch) =
            Network::<TestBackend>::load_or_build(&net, input, output, &Default::default()).unwrap();
        assert_eq!(epoch, 0);
    }

    #[test]
    fn test_corrupt_checkpoint_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let net = network(temp_dir.path());
        let dir = <SampleCnnNetwork as Network<TestBackend>>::model_dir(&net);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SampleCnn_0007.mpk"), b"garbage").unwrap();

        let (input, output) = shapes();
        let (_, epoch) =
            Network::<TestBackend>::load_or_build(&net, input, output, &Default::default()).unwrap();
        assert_eq!(epoch, 0);
    }

    #[test]
    fn test_resumes_from_latest_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let net = network(temp_dir.path());
        let device = Default::default();
        let (input, output) = shapes();

        let trained = Network::<TestBackend>::build_model(&net, input, output, &device).unwrap();
        let dir = <SampleCnnNetwork as Network<TestBackend>>::model_dir(&net);
        save_checkpoint(&trained, &dir.join("SampleCnn_0003")).unwrap();
        save_checkpoint(&trained, &dir.join("SampleCnn_0012")).unwrap();

        let (loaded, epoch) =
            Network::<TestBackend>::load_or_build(&net, input, output, &device).unwrap();
        assert_eq!(epoch, 12);

        let probe = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let expected = trained.forward(probe.clone());
        let actual = loaded.forward(probe);
        expected
            .into_data()
            .assert_approx_eq(&actual.into_data(), 2);
    }

    #[test]
    fn test_build_rejects_bad_shapes() {
        let net = SampleCnnNetwork::new("SampleCnn");
        let result = Network::<TestBackend>::build_model(
            &net,
            ImageShape::new(20, 16, 3),
            ImageShape::new(20, 16, 1),
            &Default::default(),
        );
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
