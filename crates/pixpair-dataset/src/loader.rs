//! Image loading for sample pairs.

use image::DynamicImage;
use pixpair_core::{Error, Result, Sample};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions recognized as images when scanning a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// A decoded (input, label) image pair
#[derive(Debug, Clone)]
pub struct SamplePair {
    pub input: DynamicImage,
    pub label: DynamicImage,
}

/// Decodes sample images from disk.
///
/// Relative paths are resolved against an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct SampleReader {
    root_dir: Option<PathBuf>,
}

impl SampleReader {
    /// Creates a reader that takes paths as given
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader resolving relative paths against `root_dir`
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: Some(root_dir.into()),
        }
    }

    /// Gets the full path for an image
    pub fn full_path(&self, path: &Path) -> PathBuf {
        match &self.root_dir {
            Some(root) if !path.is_absolute() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Loads an image from a path
    pub fn load_image(&self, path: &Path) -> Result<DynamicImage> {
        let full_path = self.full_path(path);

        if !full_path.exists() {
            return Err(Error::NotFound(format!(
                "Image file not found: {}",
                full_path.display()
            )));
        }

        image::open(&full_path).map_err(|e| {
            Error::Image(format!("Failed to load image {}: {}", full_path.display(), e))
        })
    }

    /// Decodes both images of a sample.
    ///
    /// Any failure is reported as [`Error::SampleRead`] naming both paths.
    pub fn read_sample(&self, sample: &Sample) -> Result<SamplePair> {
        let decoded = self
            .load_image(&sample.input)
            .and_then(|input| Ok((input, self.load_image(&sample.label)?)));

        match decoded {
            Ok((input, label)) => Ok(SamplePair { input, label }),
            Err(source) => Err(Error::SampleRead {
                input: self.full_path(&sample.input).display().to_string(),
                label: self.full_path(&sample.label).display().to_string(),
                source: Box::new(source),
            }),
        }
    }
}

/// Returns true when the path has one of [`IMAGE_EXTENSIONS`]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists up to `limit` image files of a directory, sorted by file name.
///
/// Subdirectories are not descended into.
pub fn list_images(dir: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }

    images.sort();
    images.truncate(limit);
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn write_gray(path: &Path, value: u8) {
        GrayImage::from_pixel(3, 2, Luma([value])).save(path).unwrap();
    }

    #[test]
    fn test_read_sample_decodes_both_images() {
        let temp_dir = TempDir::new().unwrap();
        write_gray(&temp_dir.path().join("in.png"), 10);
        write_gray(&temp_dir.path().join("gt.png"), 200);

        let reader = SampleReader::with_root(temp_dir.path());
        let pair = reader.read_sample(&Sample::new("in.png", "gt.png")).unwrap();

        assert_eq!(pair.input.to_luma8().get_pixel(0, 0)[0], 10);
        assert_eq!(pair.label.to_luma8().get_pixel(2, 1)[0], 200);
    }

    #[test]
    fn test_read_sample_failure_names_both_paths() {
        let temp_dir = TempDir::new().unwrap();
        write_gray(&temp_dir.path().join("in.png"), 10);

        let reader = SampleReader::with_root(temp_dir.path());
        let err = reader
            .read_sample(&Sample::new("in.png", "missing.png"))
            .unwrap_err();

        match &err {
            Error::SampleRead { input, label, .. } => {
                assert!(input.ends_with("in.png"));
                assert!(label.ends_with("missing.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_corrupt_image_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("in.png"), b"not a png").unwrap();
        write_gray(&temp_dir.path().join("gt.png"), 0);

        let reader = SampleReader::with_root(temp_dir.path());
        let result = reader.read_sample(&Sample::new("in.png", "gt.png"));
        assert!(matches!(result, Err(Error::SampleRead { .. })));
    }

    #[test]
    fn test_absolute_paths_ignore_root() {
        let reader = SampleReader::with_root("/data");
        assert_eq!(
            reader.full_path(Path::new("/abs/x.png")),
            PathBuf::from("/abs/x.png")
        );
        assert_eq!(
            reader.full_path(Path::new("rel/x.png")),
            PathBuf::from("/data/rel/x.png")
        );
    }

    #[test]
    fn test_list_images_filters_sorts_and_limits() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["c.png", "a.PNG", "b.jpg"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }
        fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(temp_dir.path().join("nested.png")).unwrap();

        let images = list_images(temp_dir.path(), 2).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        assert!(list_images(Path::new("/nonexistent/dir"), 8).is_err());
    }
}
