//! PNG sink for captured images.
//!
//! Files land in `<folder>/<YYYY-MM-DD>/<YYYY-MM-DD_HH-MM-SS>.png`. A second
//! capture within the same second gets `_1`, `_2`, ... appended.

use crate::bitmap::DecodedImage;
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Upper bound on collision suffixes tried for one timestamp.
const MAX_SUFFIX: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct ImageSink {
    folder: PathBuf,
}

impl ImageSink {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Saves the image stamped with the current local time.
    pub fn save(&self, image: &DecodedImage) -> Result<PathBuf, SinkError> {
        self.save_at(image, Local::now())
    }

    pub fn save_at(&self, image: &DecodedImage, at: DateTime<Local>) -> Result<PathBuf, SinkError> {
        let png_bytes = image.to_png_bytes()?;

        let dir = self.folder.join(at.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir)?;

        let stem = at.format("%Y-%m-%d_%H-%M-%S").to_string();
        let path = write_new_file(&dir, &stem, &png_bytes)?;

        log::info!(
            "[SINK] Saved {}x{} image to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }

    /// Callback for the orchestrator: saves each image, logging failures.
    pub fn into_callback(self) -> impl Fn(DecodedImage) + Send + Sync + 'static {
        move |image: DecodedImage| {
            if let Err(e) = self.save(&image) {
                log::error!("[SINK] Failed to save image: {}", e);
            }
        }
    }
}

/// Creates `<stem>.png`, or the first free `<stem>_N.png`, and writes it.
/// `create_new` makes the existence check and the create one step.
fn write_new_file(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf, SinkError> {
    for suffix in 0..=MAX_SUFFIX {
        let name = if suffix == 0 {
            format!("{}.png", stem)
        } else {
            format!("{}_{}.png", stem, suffix)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(bytes)?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(SinkError::NoFreeName(stem.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encode failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("No free file name for {0}")]
    NoFreeName(String),
}
