// SPDX-License-Identifier: MPL-2.0

//! Handoff of finished photos to durable storage
//!
//! The handoff consumes a [`ProcessedImage`] and returns a [`StorageReference`]
//! naming where the bytes now live. [`FileHandoff`] writes into a directory on
//! the local filesystem: the bytes go to a uniquely named temporary file first
//! and are renamed into place, so a failed write never leaves a partial file at
//! the returned location.

use crate::constants::{APP_DIR_NAME, DEFAULT_FILE_STEM, TIMESTAMP_FORMAT, TIMESTAMPED_FILE_PREFIX};
use crate::errors::{CaptureError, CaptureResult};
use crate::pipelines::photo::{EncodingFormat, ProcessedImage};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque reference to a persisted photo
///
/// Wraps the absolute path of the written file. Consumers treat
/// [`StorageReference::as_str`] as the stable string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageReference {
    path: PathBuf,
    reference: String,
}

impl StorageReference {
    pub fn new(path: PathBuf) -> Self {
        let reference = path.to_string_lossy().into_owned();
        Self { path, reference }
    }

    pub fn as_str(&self) -> &str {
        &self.reference
    }

    pub fn path(&self) -> &Path {
        &self.path
    }}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

/// How output files are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileNaming {
    /// Always the same stem; every capture replaces the previous one
    Fixed { file_name: String },
    /// `IMG_<local timestamp>`
    Timestamped,
}

impl Default for FileNaming {
    fn default() -> Self {
        FileNaming::Fixed {
            file_name: DEFAULT_FILE_STEM.to_string(),
        }
    }
}

impl FileNaming {
    /// File name (with extension) for a capture taken at `now`
    pub fn file_name(&self, format: EncodingFormat, now: DateTime<Local>) -> String {
        match self {
            FileNaming::Fixed { file_name } => format!("{}.{}", file_name, format.extension()),
            FileNaming::Timestamped => format!(
                "{}_{}.{}",
                TIMESTAMPED_FILE_PREFIX,
                now.format(TIMESTAMP_FORMAT),
                format.extension()
            ),
        }
    }
}

/// Sink for finished photos
///
/// `persist` takes ownership of the image, so the previous frame's buffers are
/// always gone before the next one can be handed over.
pub trait Handoff: Send + Sync {
    fn persist(&self, image: ProcessedImage) -> CaptureResult<StorageReference>;
}

/// Writes photos into a directory
#[derive(Debug, Clone)]
pub struct FileHandoff {
    output_dir: PathBuf,
    naming: FileNaming,
}

impl FileHandoff {
    pub fn new(output_dir: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            output_dir: output_dir.into(),
            naming,
        }
    }

    fn write_temp(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(data)?;
        file.sync_all()
    }
}

impl Handoff for FileHandoff {
    fn persist(&self, image: ProcessedImage) -> CaptureResult<StorageReference> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            CaptureError::IoFailure(format!(
                "Failed to create '{}': {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let target = self
            .output_dir
            .join(self.naming.file_name(image.format(), Local::now()));
        let temp = self.output_dir.join(format!(".{}.tmp", Uuid::new_v4()));

        debug!(path = %target.display(), size = image.len(), "Persisting photo");

        let written =
            Self::write_temp(&temp, image.data()).and_then(|_| fs::rename(&temp, &target));
        drop(image);

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp) {
                debug!(error = %cleanup, "No temporary file to clean up");
            }
            warn!(path = %target.display(), error = %e, "Failed to persist photo");
            return Err(CaptureError::IoFailure(format!(
                "Failed to save photo '{}': {}",
                target.display(),
                e
            )));
        }

        let absolute = fs::canonicalize(&target).unwrap_or(target);
        info!(path = %absolute.display(), "Photo saved successfully");
        Ok(StorageReference::new(absolute))
    }
}

/// Default handoff directory: the user's pictures folder
pub fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
