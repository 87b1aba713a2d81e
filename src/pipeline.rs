use crate::captions::{
    build_segments, read_caption_file, total_duration, write_caption_file, CaptionRow,
    DEFAULT_WORDS_PER_CHUNK,
};
use crate::config::{Config, Resolution, ResolutionPreset};
use crate::error::{AyavidError, Result};
use crate::media::{CompositionBuilder, Downloader, FfmpegBackend, MediaBackend};
use crate::select::{ClipSelector, SelectionCriteria, VideoCandidate, DEFAULT_MAX_ATTEMPTS};
use crate::source::{AudioSource, PexelsClient, QuranClient, VideoSource};
use crate::status::{read_status, JobStatus, Stage, StatusStore};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Search keyword for background footage.
pub const DEFAULT_KEYWORD: &str = "aerial landscape";

/// Footage tags that disqualify a clip.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "human", "humans", "person", "people", "woman", "women", "man", "men", "girl", "boy",
    "child", "children", "couple", "mother", "father", "daughter", "son", "sister", "brother",
    "family", "dog", "cat", "bird", "horse", "animal", "animals", "cross", "church", "temple",
    "cathedral",
];

/// Final video, relative to the job directory.
pub const OUTPUT_FILENAME: &str = "output.mp4";

/// Scratch area, relative to the job directory.
pub const WORK_DIRNAME: &str = "work";

/// Caption font looked up under the working directory when none is configured.
pub const DEFAULT_FONT_FILE: &str = "resources/font/amiri.ttf";

const CAPTIONS_FILENAME: &str = "captions.txt";
const COMPOSED_FILENAME: &str = "composed.mp4";

/// Configuration for the video generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stock footage search keyword.
    pub keyword: String,
    /// Tags that disqualify a clip.
    pub blacklist: BTreeSet<String>,
    /// Exact output frame size.
    pub resolution: Resolution,
    /// Words shown per caption.
    pub words_per_chunk: usize,
    /// Footage draws before giving up.
    pub max_attempts: usize,
    /// Upper bound on any single stage.
    pub stage_timeout: Duration,
    /// Parallel downloads.
    pub concurrency: usize,
    /// Font for title and captions.
    pub font_file: Option<PathBuf>,
    /// Remove the work area after a successful run.
    pub clean_work_dir: bool,
    /// Silence kept after the last caption, in seconds.
    pub tail_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            resolution: ResolutionPreset::default().resolution(),
            words_per_chunk: DEFAULT_WORDS_PER_CHUNK,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stage_timeout: Duration::from_secs(15 * 60),
            concurrency: 4,
            font_file: None,
            clean_work_dir: false,
            tail_seconds: 1.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resolution: config.resolution.resolution(),
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            concurrency: config.concurrency,
            font_file: resolve_font_file(config.font_file.as_deref(), Path::new(".")),
            ..Self::default()
        }
    }
}

/// The configured font, else [`DEFAULT_FONT_FILE`] under `base` if it exists.
///
/// Without a font, drawtext uses the system default, which usually lacks
/// Arabic glyphs.
pub fn resolve_font_file(configured: Option<&Path>, base: &Path) -> Option<PathBuf> {
    if let Some(font) = configured {
        return Some(font.to_path_buf());
    }
    let bundled = base.join(DEFAULT_FONT_FILE);
    bundled.is_file().then_some(bundled)
}

/// What to render: verses `start_verse..=end_verse` of a chapter in one
/// reciter's voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest {
    pub reciter_id: u32,
    pub chapter_id: u32,
    pub start_verse: u32,
    pub end_verse: u32,
}

impl GenerationRequest {
    /// Directory name for a job rendering this request.
    pub fn job_name(&self) -> String {
        format!(
            "r{}-c{}-v{}-{}",
            self.reciter_id, self.chapter_id, self.start_verse, self.end_verse
        )
    }
}

/// Statistics from the video generation process.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    /// Wall time spent in each stage, in execution order.
    pub stage_times: Vec<(Stage, Duration)>,
    pub verses: usize,
    pub caption_chunks: usize,
    pub clips: usize,
    /// Recitation length in seconds.
    pub audio_duration: f64,
    /// Summed length of the selected footage in seconds.
    pub footage_duration: f64,
}

/// Result of the video generation pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub chapter_name: String,
    pub reciter_name: String,
    pub stats: PipelineStats,
}

/// Job-scoped file locations.
#[derive(Debug, Clone)]
struct JobLayout {
    root: PathBuf,
}

impl JobLayout {
    fn work(&self) -> PathBuf {
        self.root.join(WORK_DIRNAME)
    }

    fn audio_dir(&self) -> PathBuf {
        self.work().join("audio")
    }

    fn video_dir(&self) -> PathBuf {
        self.work().join("video")
    }

    fn text_dir(&self) -> PathBuf {
        self.work().join("text")
    }

    fn captions(&self) -> PathBuf {
        self.work().join(CAPTIONS_FILENAME)
    }

    fn composed(&self) -> PathBuf {
        self.work().join(COMPOSED_FILENAME)
    }

    fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_FILENAME)
    }
}

/// Runs stages in order against the status store, each under the stage
/// timeout and the job's cancel signal.
struct StageRunner<'a> {
    store: &'a StatusStore,
    cancel: watch::Receiver<bool>,
    timeout: Duration,
    times: Vec<(Stage, Duration)>,
}

impl StageRunner<'_> {
    async fn step<T, F>(&mut self, stage: Stage, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if *self.cancel.borrow() {
            return Err(AyavidError::Cancelled);
        }
        self.store.record(stage).await?;
        info!("Stage {}%: {}", stage.progress(), stage.description());

        let started = Instant::now();
        let mut cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(AyavidError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, work) => {
                outcome.unwrap_or_else(|_| {
                    Err(AyavidError::Timeout {
                        stage: stage.label().to_string(),
                        seconds: self.timeout.as_secs(),
                    })
                })
            }
        };

        let elapsed = started.elapsed();
        self.times.push((stage, elapsed));
        debug!("{} finished in {:.2}s", stage, elapsed.as_secs_f64());
        result
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is
/// gone without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// The generation pipeline and its collaborators.
#[derive(Clone)]
pub struct Pipeline {
    audio: Arc<dyn AudioSource>,
    video: Arc<dyn VideoSource>,
    media: Arc<dyn MediaBackend>,
    downloader: Downloader,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        audio: Arc<dyn AudioSource>,
        video: Arc<dyn VideoSource>,
        media: Arc<dyn MediaBackend>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            audio,
            video,
            media,
            downloader: Downloader::new(config.concurrency),
            config,
        }
    }

    /// Production wiring: alquran.cloud, Pexels and ffmpeg.
    pub fn from_config(config: &Config, pipeline_config: PipelineConfig) -> Result<Self> {
        let api_key = config.pexels_api_key.clone().ok_or_else(|| {
            AyavidError::Config(
                "Pexels API key not set. Set PEXELS_API_KEY environment variable.".to_string(),
            )
        })?;

        let client = reqwest::Client::new();
        let audio = QuranClient::with_client(client.clone())
            .with_api_url(config.quran_api_url.clone())
            .with_audio_cdn_url(config.audio_cdn_url.clone());
        let video =
            PexelsClient::with_client(client.clone(), api_key).with_api_url(config.pexels_api_url.clone());

        Ok(Self::new(
            Arc::new(audio),
            Arc::new(video),
            Arc::new(FfmpegBackend::new()),
            pipeline_config,
        )
        .with_downloader(Downloader::with_client(client, config.concurrency)))
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a job in the background. The job owns `job_dir`.
    pub fn spawn(&self, request: GenerationRequest, job_dir: impl Into<PathBuf>) -> JobHandle {
        let directory = job_dir.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pipeline = self.clone();
        let dir = directory.clone();

        let task = tokio::spawn(async move { pipeline.run(request, &dir, cancel_rx).await });

        JobHandle {
            directory,
            cancel: Canceller(Arc::new(cancel_tx)),
            task,
        }
    }

    /// Run a job to completion in the current task.
    ///
    /// Every failure, including cancellation and timeouts, is recorded in the
    /// job's status record before being returned.
    pub async fn run(
        &self,
        request: GenerationRequest,
        job_dir: &Path,
        cancel: watch::Receiver<bool>,
    ) -> Result<PipelineResult> {
        if self.config.font_file.is_none() {
            warn!(
                "No caption font configured and {} not found; Arabic text may not render. Set AYAVID_FONT_FILE",
                DEFAULT_FONT_FILE
            );
        }

        let store = StatusStore::open(job_dir)?;
        store.record(Stage::Started).await?;
        info!(
            "Job {}: reciter {}, chapter {}, verses {}-{}",
            job_dir.display(),
            request.reciter_id,
            request.chapter_id,
            request.start_verse,
            request.end_verse
        );

        let mut runner = StageRunner {
            store: &store,
            cancel,
            timeout: self.config.stage_timeout,
            times: Vec::new(),
        };

        match self.run_stages(request, job_dir, &mut runner).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Job {} failed: {}", job_dir.display(), e);
                if let Err(write_err) = store.record_failure(e.status_message()).await {
                    warn!("Could not record failure: {}", write_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: GenerationRequest,
        job_dir: &Path,
        runner: &mut StageRunner<'_>,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let layout = JobLayout {
            root: job_dir.to_path_buf(),
        };
        let target = self.config.resolution;

        let batch = runner
            .step(
                Stage::FetchAudio,
                self.audio.fetch_verses(
                    request.reciter_id,
                    request.chapter_id,
                    request.start_verse,
                    request.end_verse,
                ),
            )
            .await?;
        info!(
            "{} verses of {} recited by {}",
            batch.verses.len(),
            batch.chapter_name,
            batch.reciter_name
        );

        let audio_links: Vec<String> = batch.verses.iter().map(|v| v.audio_link.clone()).collect();
        let audio_dir = layout.audio_dir();
        let audio_paths = runner
            .step(
                Stage::DownloadAudio,
                self.downloader
                    .download_all(&audio_links, &audio_dir, "recitation", "mp3"),
            )
            .await?;

        let durations = runner
            .step(
                Stage::ComputeAudioDuration,
                try_join_all(audio_paths.iter().map(|p| self.media.probe_duration(p))),
            )
            .await?;

        let captions_path = layout.captions();
        let segments = runner
            .step(Stage::GenerateCaptions, async {
                let segments =
                    build_segments(&batch.verses, &durations, self.config.words_per_chunk)?;
                let rows: Vec<CaptionRow> = segments
                    .iter()
                    .flat_map(|s| s.caption_rows.iter().cloned())
                    .collect();
                write_caption_file(&captions_path, &rows).await?;
                Ok::<_, AyavidError>(segments)
            })
            .await?;
        let audio_duration: f64 = segments.iter().map(|s| s.duration).sum();

        let criteria = SelectionCriteria {
            keyword: self.config.keyword.clone(),
            required_duration: audio_duration,
            blacklist: self.config.blacklist.clone(),
            target,
            max_attempts: self.config.max_attempts,
        };
        let mut selector =
            ClipSelector::new(self.video.as_ref()).with_cancel(runner.cancel.clone());
        let clips: Vec<VideoCandidate> = runner
            .step(Stage::FetchVideo, selector.select(&criteria))
            .await?;
        let footage_duration: f64 = clips.iter().map(|c| c.duration).sum();

        let video_links: Vec<String> = clips.iter().map(|c| c.link.clone()).collect();
        let video_dir = layout.video_dir();
        let video_paths = runner
            .step(
                Stage::DownloadVideo,
                self.downloader
                    .download_all(&video_links, &video_dir, "video", "mp4"),
            )
            .await?;

        runner
            .step(Stage::CropVideo, async {
                for (path, clip) in video_paths.iter().zip(&clips) {
                    self.media.crop(path, clip.resolution(), target).await?;
                }
                Ok::<_, AyavidError>(())
            })
            .await?;

        let output_path = layout.output();
        let caption_chunks = runner
            .step(Stage::ComposeVideo, async {
                let rows = read_caption_file(&captions_path).await?;
                let composition =
                    CompositionBuilder::new(target, layout.composed(), layout.text_dir())
                        .videos(video_paths.iter().cloned())
                        .audios(audio_paths.iter().cloned())
                        .captions(rows.iter().cloned())
                        .title(batch.chapter_name.clone())
                        .subtitle(batch.reciter_name.clone())
                        .font_file(self.config.font_file.clone())
                        .build()?;
                self.media.compose(&composition).await?;

                let length = total_duration(&rows) + self.config.tail_seconds;
                self.media
                    .trim(&composition.output, &output_path, length)
                    .await?;
                Ok::<_, AyavidError>(rows.len())
            })
            .await?;

        runner.store.record(Stage::Completed).await?;

        if self.config.clean_work_dir {
            if let Err(e) = tokio::fs::remove_dir_all(layout.work()).await {
                warn!("Could not remove work area: {}", e);
            }
        }

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            stage_times: std::mem::take(&mut runner.times),
            verses: segments.len(),
            caption_chunks,
            clips: clips.len(),
            audio_duration,
            footage_duration,
        };
        info!(
            "Job {} completed in {:.1}s",
            job_dir.display(),
            stats.total_time.as_secs_f64()
        );

        Ok(PipelineResult {
            output_path,
            chapter_name: batch.chapter_name,
            reciter_name: batch.reciter_name,
            stats,
        })
    }
}

/// Cancels a running job. Cloneable, so it can be moved into signal handlers.
#[derive(Clone, Debug)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Owner of a background job.
#[derive(Debug)]
pub struct JobHandle {
    directory: PathBuf,
    cancel: Canceller,
    task: JoinHandle<Result<PipelineResult>>,
}

impl JobHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Ask the job to stop. It records `Failed` at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> Canceller {
        self.cancel.clone()
    }

    /// Latest persisted status of the job.
    pub fn status(&self) -> Result<JobStatus> {
        read_status(&self.directory)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to finish.
    ///
    /// If the task panicked or was aborted, `Failed` is recorded unless the
    /// record already reached a terminal state.
    pub async fn join(self) -> Result<PipelineResult> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                let err = AyavidError::TaskFailed(e.to_string());
                warn!("Job {} task ended abnormally: {}", self.directory.display(), e);

                let terminal = read_status(&self.directory)
                    .map(|s| s.status.is_terminal())
                    .unwrap_or(false);
                if !terminal {
                    let recorded = match StatusStore::open(&self.directory) {
                        Ok(store) => store.record_failure(err.status_message()).await,
                        Err(open_err) => Err(open_err),
                    };
                    if let Err(write_err) = recorded {
                        warn!("Could not record failure: {}", write_err);
                    }
                }
                Err(err)
            }
        }
    }
}

/// Delete job directories under `root` last modified more than `max_age` ago.
///
/// Returns the removed directories. Entries that are not directories are left
/// alone.
pub fn prune_jobs(root: &Path, max_age: Duration) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut removed = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age {
            std::fs::remove_dir_all(&path)?;
            info!("Removed {}", path.display());
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                   Recitation Video Complete                   ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Chapter:    {}", result.chapter_name);
    println!("  Reciter:    {}", result.reciter_name);
    println!(
        "  Verses:     {} ({} captions)",
        result.stats.verses, result.stats.caption_chunks
    );
    println!(
        "  Duration:   {:.1}s audio, {:.1}s footage from {} clips",
        result.stats.audio_duration, result.stats.footage_duration, result.stats.clips
    );
    println!();
    println!("  Timing:");
    for (stage, elapsed) in &result.stats.stage_times {
        println!("    {:<22} {:.2}s", stage.label(), elapsed.as_secs_f64());
    }
    println!(
        "    {:<22} {:.2}s",
        "Total",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
