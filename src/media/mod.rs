pub mod download;
pub mod ffmpeg;
pub mod graph;

pub use download::Downloader;
pub use ffmpeg::{check_ffmpeg, check_ffprobe, FfmpegBackend};
pub use graph::{Composition, CompositionBuilder, CropWindow, Filter, FilterChain, FilterGraph};

use crate::config::Resolution;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Local media operations the pipeline depends on.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Play duration of an audio file, in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Crop a clip in place to `target`, centered. `native` is the clip's
    /// current frame size.
    async fn crop(&self, path: &Path, native: Resolution, target: Resolution) -> Result<()>;

    /// Produce `composition.output`.
    async fn compose(&self, composition: &Composition) -> Result<()>;

    /// Copy the first `duration` seconds of `input` to `output`.
    async fn trim(&self, input: &Path, output: &Path, duration: f64) -> Result<()>;

    fn name(&self) -> &'static str;
}
