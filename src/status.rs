//! Persisted job status.
//!
//! The record lives at `<job>/status.json` and is rewritten whole on every
//! transition. Writes go to a temp file in the same directory and are renamed
//! over the record, so a poller only ever sees a complete record.

use crate::error::{AyavidError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::debug;

/// File name of the status record inside a job directory.
pub const STATUS_FILENAME: &str = "status.json";

/// Pipeline stages, in forward order, plus the terminal `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Started,
    FetchAudio,
    DownloadAudio,
    ComputeAudioDuration,
    GenerateCaptions,
    FetchVideo,
    DownloadVideo,
    CropVideo,
    ComposeVideo,
    Completed,
    Failed,
}

impl Stage {
    /// The forward path. `Failed` is not on it.
    pub const FORWARD: [Stage; 10] = [
        Stage::Started,
        Stage::FetchAudio,
        Stage::DownloadAudio,
        Stage::ComputeAudioDuration,
        Stage::GenerateCaptions,
        Stage::FetchVideo,
        Stage::DownloadVideo,
        Stage::CropVideo,
        Stage::ComposeVideo,
        Stage::Completed,
    ];

    pub fn progress(&self) -> u8 {
        match self {
            Stage::Started => 0,
            Stage::FetchAudio => 10,
            Stage::DownloadAudio => 20,
            Stage::ComputeAudioDuration => 30,
            Stage::GenerateCaptions => 40,
            Stage::FetchVideo => 50,
            Stage::DownloadVideo => 60,
            Stage::CropVideo => 70,
            Stage::ComposeVideo => 80,
            Stage::Completed => 100,
            Stage::Failed => 0,
        }
    }

    /// Label as written to the status record.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Started => "Started",
            Stage::FetchAudio => "FetchAudio",
            Stage::DownloadAudio => "DownloadAudio",
            Stage::ComputeAudioDuration => "ComputeAudioDuration",
            Stage::GenerateCaptions => "GenerateCaptions",
            Stage::FetchVideo => "FetchVideo",
            Stage::DownloadVideo => "DownloadVideo",
            Stage::CropVideo => "CropVideo",
            Stage::ComposeVideo => "ComposeVideo",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }

    /// Human-readable activity for progress displays.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Started => "Starting",
            Stage::FetchAudio => "Fetching audio",
            Stage::DownloadAudio => "Downloading audio",
            Stage::ComputeAudioDuration => "Computing audio duration",
            Stage::GenerateCaptions => "Generating captions",
            Stage::FetchVideo => "Fetching video",
            Stage::DownloadVideo => "Downloading video",
            Stage::CropVideo => "Cropping video",
            Stage::ComposeVideo => "Composing video",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// The stage that must follow this one on the forward path.
    pub fn next(&self) -> Option<Stage> {
        let index = Stage::FORWARD.iter().position(|s| s == self)?;
        Stage::FORWARD.get(index + 1).copied()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The on-disk record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: Stage,
    pub progress: u8,
    pub message: String,
}

impl JobStatus {
    pub fn at(stage: Stage) -> Self {
        Self {
            status: stage,
            progress: stage.progress(),
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Stage::Failed,
            progress: Stage::Failed.progress(),
            message: message.into(),
        }
    }
}

/// Single writer of a job's status record. Clones share the same state.
#[derive(Debug, Clone)]
pub struct StatusStore {
    directory: PathBuf,
    current: Arc<Mutex<Option<Stage>>>,
}

impl StatusStore {
    /// Open the store for a job directory, creating the directory if needed.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            current: Arc::new(Mutex::new(None)),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(STATUS_FILENAME)
    }

    /// Last stage written by this store.
    pub fn current(&self) -> Option<Stage> {
        *self.lock()
    }

    /// Move to `stage`, which must directly follow the current stage.
    pub fn advance(&self, stage: Stage) -> Result<()> {
        let mut current = self.lock();
        let allowed = match *current {
            None => stage == Stage::Started,
            Some(from) => from.next() == Some(stage),
        };
        if !allowed {
            return Err(AyavidError::InvalidTransition(format!(
                "{} -> {}",
                (*current).map_or("<none>", |s| s.label()),
                stage
            )));
        }

        self.write(&JobStatus::at(stage))?;
        *current = Some(stage);
        debug!("Status advanced to {} ({}%)", stage, stage.progress());
        Ok(())
    }

    /// Mark the job failed. No further transitions are accepted afterwards.
    pub fn fail(&self, message: &str) -> Result<()> {
        let mut current = self.lock();
        if let Some(from) = *current {
            if from.is_terminal() {
                return Err(AyavidError::InvalidTransition(format!(
                    "{} -> {}",
                    from,
                    Stage::Failed
                )));
            }
        }

        self.write(&JobStatus::failed(message))?;
        *current = Some(Stage::Failed);
        debug!("Status set to Failed: {}", message);
        Ok(())
    }

    /// [`advance`](Self::advance) on the blocking pool, for async callers.
    pub async fn record(&self, stage: Stage) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.advance(stage))
            .await
            .map_err(|e| AyavidError::TaskFailed(e.to_string()))?
    }

    /// [`fail`](Self::fail) on the blocking pool, for async callers.
    pub async fn record_failure(&self, message: impl Into<String>) -> Result<()> {
        let store = self.clone();
        let message = message.into();
        tokio::task::spawn_blocking(move || store.fail(&message))
            .await
            .map_err(|e| AyavidError::TaskFailed(e.to_string()))?
    }

    // Fsync and rename block; async code goes through `record`.
    fn write(&self, record: &JobStatus) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path()).map_err(|e| AyavidError::Io(e.error))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Stage>> {
        // The record on disk is whole even if a writer panicked.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Read the status record of a job directory.
pub fn read_status(directory: &Path) -> Result<JobStatus> {
    let contents = std::fs::read_to_string(directory.join(STATUS_FILENAME))?;
    Ok(serde_json::from_str(&contents)?)
}
