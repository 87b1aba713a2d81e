use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Resolution;
use crate::error::{AyavidError, Result};

use super::graph::{Composition, CropWindow};
use super::MediaBackend;

/// Check if FFmpeg is installed and accessible.
pub async fn check_ffmpeg() -> Result<()> {
    check_tool("ffmpeg").await
}

/// Check if FFprobe is installed and accessible.
pub async fn check_ffprobe() -> Result<()> {
    check_tool("ffprobe").await
}

async fn check_tool(program: &str) -> Result<()> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .await
        .map_err(|e| {
            AyavidError::Media(format!(
                "{program} not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(AyavidError::Media(format!("{program} check failed")));
    }

    debug!("{} is available", program);
    Ok(())
}

/// Run ffmpeg to completion, surfacing the tail of stderr on failure.
async fn run_ffmpeg<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(|e| AyavidError::Media(format!("Failed to run FFmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(AyavidError::Media(format!(
            "FFmpeg exited with {}: {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }
    Ok(())
}

/// [`MediaBackend`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        if !path.exists() {
            return Err(AyavidError::Media(format!(
                "File doesn't exist: {}",
                path.display()
            )));
        }

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| AyavidError::Media(format!("Failed to run FFprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AyavidError::Media(format!("FFprobe failed: {stderr}")));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        let duration: f64 = duration_str.trim().parse().map_err(|e| {
            AyavidError::Media(format!(
                "Failed to parse duration '{}': {e}",
                duration_str.trim()
            ))
        })?;

        debug!("{} lasts {:.3}s", path.display(), duration);
        Ok(duration)
    }

    async fn crop(&self, path: &Path, native: Resolution, target: Resolution) -> Result<()> {
        let window = CropWindow::centered(native, target)?;

        let mut backup = path.as_os_str().to_owned();
        backup.push(".bck");
        let backup = PathBuf::from(backup);
        tokio::fs::rename(path, &backup).await?;

        debug!("Cropping {} from {} to {}", path.display(), native, target);
        let result = run_ffmpeg([
            OsStr::new("-y"),
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            backup.as_os_str(),
            OsStr::new("-vf"),
            OsStr::new(&window.filter().render()),
            OsStr::new("-an"),
            path.as_os_str(),
        ])
        .await;

        match result {
            Ok(()) => {
                tokio::fs::remove_file(&backup).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(restore) = tokio::fs::rename(&backup, path).await {
                    warn!("Could not restore {}: {}", path.display(), restore);
                }
                Err(e)
            }
        }
    }

    async fn compose(&self, composition: &Composition) -> Result<()> {
        for file in &composition.text_files {
            if let Some(parent) = file.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file.path, &file.contents).await?;
        }

        info!(
            "Composing {} inputs into {}",
            composition.inputs.len(),
            composition.output.display()
        );
        let args = composition.to_args();
        debug!("ffmpeg {}", args.join(" "));
        run_ffmpeg(&args).await?;

        if !composition.output.exists() {
            return Err(AyavidError::Media(
                "Output file was not created".to_string(),
            ));
        }
        Ok(())
    }

    async fn trim(&self, input: &Path, output: &Path, duration: f64) -> Result<()> {
        let duration = format!("{duration:.3}");
        debug!("Trimming {} to {}s", input.display(), duration);

        run_ffmpeg([
            OsStr::new("-y"),
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-t"),
            OsStr::new(&duration),
            OsStr::new("-c"),
            OsStr::new("copy"),
            output.as_os_str(),
        ])
        .await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_check_ffmpeg() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available or broken");
            return;
        }
        let result = check_ffmpeg().await;
        assert!(result.is_ok(), "FFmpeg check failed: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = FfmpegBackend::new()
            .probe_duration(Path::new("/nonexistent/recitation_0.mp3"))
            .await;
        match result {
            Err(AyavidError::Media(msg)) => assert!(msg.contains("doesn't exist")),
            other => panic!("Expected Media error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_crop_rejects_small_clip_without_touching_it() {
        let dir = tempfile::TempDir::new().unwrap();
        let clip = dir.path().join("video_0.mp4");
        std::fs::write(&clip, b"not really a video").unwrap();

        let result = FfmpegBackend::new()
            .crop(&clip, Resolution::new(1920, 1080), Resolution::new(1080, 1920))
            .await;

        assert!(result.is_err());
        assert!(clip.exists());
    }

    #[tokio::test]
    async fn test_crop_and_probe_generated_clip() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let clip = dir.path().join("video_0.mp4");
        let status = std::process::Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i", "testsrc=size=400x300:duration=1"])
            .arg(&clip)
            .status()
            .unwrap();
        if !status.success() {
            eprintln!("Skipping test: could not generate test clip");
            return;
        }

        let backend = FfmpegBackend::new();
        backend
            .crop(&clip, Resolution::new(400, 300), Resolution::new(200, 200))
            .await
            .unwrap();
        assert!(clip.exists());
        assert!(!dir.path().join("video_0.mp4.bck").exists());

        let duration = backend.probe_duration(&clip).await.unwrap();
        assert!((duration - 1.0).abs() < 0.2);
    }
}
