//! Path lists and the hold-out split.
//!
//! Inputs and labels are given as two parallel text files, one path per
//! line; line `i` of the label file is the target of line `i` of the
//! input file.

use pixpair_core::{Error, Result, Sample};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fraction of the loaded pairs held out when no validation lists are given
pub const HOLDOUT_FRACTION: f64 = 0.2;

/// Seed of the hold-out shuffle, fixed so repeated runs hold out the same pairs
pub const HOLDOUT_SEED: u64 = 1;

/// Reads a list of paths, one per line.
///
/// Lines are taken verbatim apart from a trailing `\r`; blank lines are skipped.
pub fn read_path_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Dataset(format!("Failed to read path list {}: {}", path.display(), e))
    })?;

    let paths: Vec<PathBuf> = parse_path_lines(&content);
    debug!("Read {} paths from {}", paths.len(), path.display());
    Ok(paths)
}

fn parse_path_lines(content: &str) -> Vec<PathBuf> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Zips parallel input and label lists into samples.
///
/// Fails with [`Error::LengthMismatch`] when the lists differ in length.
pub fn pair_samples<I, L>(inputs: Vec<I>, labels: Vec<L>) -> Result<Vec<Sample>>
where
    I: Into<PathBuf>,
    L: Into<PathBuf>,
{
    if inputs.len() != labels.len() {
        return Err(Error::LengthMismatch {
            inputs: inputs.len(),
            labels: labels.len(),
        });
    }

    Ok(inputs
        .into_iter()
        .zip(labels)
        .map(|(input, label)| Sample::new(input, label))
        .collect())
}

/// Shuffles the pairs with a seeded generator and holds out
/// `ceil(fraction * n)` of them.
///
/// Returns `(train, holdout)`. Pairs are moved jointly, so an input never
/// loses its label.
pub fn holdout_split(
    mut samples: Vec<Sample>,
    fraction: f64,
    seed: u64,
) -> (Vec<Sample>, Vec<Sample>) {
    let n = samples.len();
    let holdout_len = ((fraction.clamp(0.0, 1.0) * n as f64).ceil() as usize).min(n);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let train = samples.split_off(holdout_len);
    (train, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_path_list_strips_cr_and_skips_blanks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("inputs.txt");
        fs::write(&path, "a.png\r\n\r\nsub dir/b.png\n\nc.png").unwrap();

        let paths = read_path_list(&path).unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.png"),
                PathBuf::from("sub dir/b.png"),
                PathBuf::from("c.png")
            ]
        );
    }

    #[test]
    fn test_read_missing_list() {
        let result = read_path_list(Path::new("/nonexistent/list.txt"));
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_pair_samples_keeps_line_alignment() {
        let samples = pair_samples(vec!["x1", "x2"], vec!["y1", "y2"]).unwrap();
        assert_eq!(samples[0], Sample::new("x1", "y1"));
        assert_eq!(samples[1], Sample::new("x2", "y2"));
    }

    #[test]
    fn test_pair_samples_length_mismatch() {
        let result = pair_samples(vec!["x1", "x2", "x3"], vec!["y1", "y2"]);
        assert!(matches!(
            result,
            Err(Error::LengthMismatch {
                inputs: 3,
                labels: 2
            })
        ));
    }

    #[test]
    fn test_holdout_takes_ceil_of_fraction() {
        let samples: Vec<Sample> = (0..11)
            .map(|i| Sample::new(format!("x{i}"), format!("y{i}")))
            .collect();

        let (train, holdout) = holdout_split(samples, HOLDOUT_FRACTION, HOLDOUT_SEED);
        assert_eq!(holdout.len(), 3);
        assert_eq!(train.len(), 8);

        for sample in train.iter().chain(holdout.iter()) {
            let input = sample.input.to_string_lossy();
            let label = sample.label.to_string_lossy();
            assert_eq!(input[1..], label[1..]);
        }
    }

    #[test]
    fn test_holdout_is_reproducible() {
        let samples: Vec<Sample> = (0..20)
            .map(|i| Sample::new(format!("x{i}"), format!("y{i}")))
            .collect();

        let (_, first) = holdout_split(samples.clone(), HOLDOUT_FRACTION, HOLDOUT_SEED);
        let (_, second) = holdout_split(samples, HOLDOUT_FRACTION, HOLDOUT_SEED);
        assert_eq!(first, second);
    }

    #[test]
    fn test_holdout_of_empty_list() {
        let (train, holdout) = holdout_split(Vec::new(), HOLDOUT_FRACTION, HOLDOUT_SEED);
        assert!(train.is_empty());
        assert!(holdout.is_empty());
    }
}
