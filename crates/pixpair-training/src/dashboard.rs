//! Event streams for dashboards.
//!
//! Every snapshot is stored as a PNG inside the run directory and announced
//! with one JSON line in `events.jsonl`. Per-epoch scalars such as the loss
//! go to `scalars.jsonl`. A viewer can follow both while the run trains.

use chrono::Utc;
use image::RgbImage;
use pixpair_core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the event stream inside the run directory
pub const EVENTS_FILE: &str = "events.jsonl";

/// File name of the scalar stream inside the run directory
pub const SCALARS_FILE: &str = "scalars.jsonl";

/// One image written to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEvent {
    pub tag: String,
    pub step: usize,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
    pub width: u32,
    pub height: u32,
    /// Image path relative to the run directory
    pub image: String,
}

/// One scalar value written to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: usize,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
    pub value: f64,
}

fn wall_time() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn append_line<T: Serialize>(path: &Path, event: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(event)?)?;
    Ok(())
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

/// Appends image and scalar events for one run
#[derive(Debug, Clone)]
pub struct DashboardWriter {
    run_dir: PathBuf,
}

impl DashboardWriter {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.run_dir.join(EVENTS_FILE)
    }

    pub fn scalars_path(&self) -> PathBuf {
        self.run_dir.join(SCALARS_FILE)
    }

    /// Saves `image` at `relative_path` under the run directory and records it
    pub fn add_image(
        &self,
        tag: &str,
        step: usize,
        image: &RgbImage,
        relative_path: &Path,
    ) -> Result<ImageEvent> {
        let target = self.run_dir.join(relative_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        image.save(&target)?;

        let event = ImageEvent {
            tag: tag.to_string(),
            step,
            wall_time: wall_time(),
            width: image.width(),
            height: image.height(),
            image: relative_path.to_string_lossy().replace('\\', "/"),
        };
        append_line(&self.events_path(), &event)?;

        debug!("Dashboard event {} step {} -> {}", tag, step, event.image);
        Ok(event)
    }

    /// Records one scalar value
    pub fn add_scalar(&self, tag: &str, step: usize, value: f64) -> Result<ScalarEvent> {
        fs::create_dir_all(&self.run_dir)?;
        let event = ScalarEvent {
            tag: tag.to_string(),
            step,
            wall_time: wall_time(),
            value,
        };
        append_line(&self.scalars_path(), &event)?;
        Ok(event)
    }

    /// Reads back every recorded image event in order
    pub fn read_events(&self) -> Result<Vec<ImageEvent>> {
        read_lines(&self.events_path())
    }

    /// Reads back every recorded scalar in order
    pub fn read_scalars(&self) -> Result<Vec<ScalarEvent>> {
        read_lines(&self.scalars_path())
    }
}
