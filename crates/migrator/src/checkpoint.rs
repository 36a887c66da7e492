//! Durable per-run progress marker.
//!
//! One small JSON file records the last settled chunk so an interrupted run
//! can resume without the operator reconstructing the index from logs. An
//! explicitly supplied resume index always wins over the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MigrationError;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    run_id: String,
    last_completed_chunk: usize,
}

pub struct CheckpointStore {
    path: PathBuf,
    run_id: String,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default resume index derived from the file: one past the last chunk
    /// this run id settled. A missing file or a different run id yields
    /// `None`; a file that exists but cannot be read or parsed is fatal, so
    /// a corrupt checkpoint never silently restarts the run from zero.
    pub fn resume_index(&self) -> Result<Option<usize>, MigrationError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|err| MigrationError::Checkpoint(format!("{}: {err}", self.path.display())))?;
        let checkpoint: CheckpointFile = serde_json::from_str(&contents)
            .map_err(|err| MigrationError::Checkpoint(format!("{}: {err}", self.path.display())))?;

        if checkpoint.run_id != self.run_id {
            debug!(
                file_run_id = %checkpoint.run_id,
                run_id = %self.run_id,
                "checkpoint belongs to another run, ignoring"
            );
            return Ok(None);
        }
        Ok(Some(checkpoint.last_completed_chunk + 1))
    }

    /// Record a settled chunk. Written through a temporary file and a rename
    /// so a crash mid-write leaves the previous checkpoint intact.
    pub fn record(&self, chunk_index: usize) -> Result<(), MigrationError> {
        let checkpoint = CheckpointFile {
            run_id: self.run_id.clone(),
            last_completed_chunk: chunk_index,
        };
        let contents = serde_json::to_string_pretty(&checkpoint)
            .map_err(|err| MigrationError::Checkpoint(err.to_string()))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, contents)
            .map_err(|err| MigrationError::Checkpoint(format!("{}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| MigrationError::Checkpoint(format!("{}: {err}", self.path.display())))?;
        Ok(())
    }

    /// Temporary file alongside the checkpoint. Appends to the full file
    /// name instead of swapping the extension, so `job.1` and `job.2` in
    /// one directory get distinct temp paths.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Remove the file after a fully verified run.
    pub fn clear(&self) -> Result<(), MigrationError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MigrationError::Checkpoint(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }
}
