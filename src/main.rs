use anyhow::{Context, Result};
use ayavid::config::{Config, ResolutionPreset};
use ayavid::interactive::{print_header, run_interactive_wizard, setup_api_key};
use ayavid::media::{check_ffmpeg, check_ffprobe};
use ayavid::pipeline::{
    print_summary, prune_jobs, GenerationRequest, Pipeline, PipelineConfig,
};
use ayavid::source::{AudioSource, QuranClient};
use ayavid::status::{read_status, Stage};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "ayavid")]
#[command(version, about = "Narrated recitation video generation")]
#[command(
    long_about = "Generate short portrait videos of recited verses over stock footage, with timed captions."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render a verse range to a video
    Generate {
        /// Reciter id (see `reciters`)
        #[arg(long)]
        reciter: u32,

        /// Chapter id (see `chapters`)
        #[arg(long)]
        chapter: u32,

        /// First verse
        #[arg(long)]
        start: u32,

        /// Last verse
        #[arg(long)]
        end: u32,

        /// Render at 1080x1920 instead of 720x1280
        #[arg(long)]
        hd: bool,

        /// Job directory (defaults to jobs/<request>)
        #[arg(long)]
        job_dir: Option<PathBuf>,

        /// Remove downloaded and intermediate files after success
        #[arg(long)]
        clean: bool,
    },

    /// List available reciters
    Reciters,

    /// List chapters
    Chapters,

    /// Show the status record of a job
    Status {
        /// Job directory
        dir: PathBuf,
    },

    /// Delete old job directories
    Prune {
        /// Directory holding job directories
        root: PathBuf,

        /// Minimum age of a job to delete, in hours
        #[arg(long, default_value = "24")]
        max_age_hours: u64,
    },

    /// Pick reciter, chapter and verses interactively
    Interactive,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn quran_client(config: &Config) -> QuranClient {
    QuranClient::new()
        .with_api_url(config.quran_api_url.clone())
        .with_audio_cdn_url(config.audio_cdn_url.clone())
}

fn default_job_dir(request: &GenerationRequest) -> PathBuf {
    PathBuf::from("jobs").join(request.job_name())
}

/// Spawn the job, mirror its status record in a progress bar, and wait.
async fn run_job(
    config: &Config,
    pipeline_config: PipelineConfig,
    request: GenerationRequest,
    job_dir: &Path,
) -> Result<()> {
    check_ffmpeg().await?;
    check_ffprobe().await?;

    let pipeline = Pipeline::from_config(config, pipeline_config)?;
    let handle = pipeline.spawn(request, job_dir);

    let canceller = handle.canceller();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        canceller.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    info!("Job directory: {}", job_dir.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    while !handle.is_finished() {
        if let Ok(status) = handle.status() {
            pb.set_position(status.progress as u64);
            pb.set_message(status.status.description());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    match handle.join().await {
        Ok(result) => {
            pb.finish_with_message("done");
            print_summary(&result);
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            let message = read_status(job_dir)
                .ok()
                .map(|s| s.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| e.status_message());
            anyhow::bail!("Generation failed: {message}")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Generate {
            reciter,
            chapter,
            start,
            end,
            hd,
            job_dir,
            clean,
        } => {
            let mut config = Config::load().context("Failed to load configuration")?;
            if hd {
                config.resolution = ResolutionPreset::High;
            }
            config
                .validate()
                .context("Configuration validation failed")?;

            let request = GenerationRequest {
                reciter_id: reciter,
                chapter_id: chapter,
                start_verse: start,
                end_verse: end,
            };
            let job_dir = job_dir.unwrap_or_else(|| default_job_dir(&request));
            let pipeline_config = PipelineConfig {
                clean_work_dir: clean,
                ..PipelineConfig::from_config(&config)
            };

            info!("Resolution: {} ({})", config.resolution, config.resolution.resolution());
            run_job(&config, pipeline_config, request, &job_dir).await
        }

        Command::Reciters => {
            let config = Config::load().context("Failed to load configuration")?;
            for reciter in quran_client(&config).list_reciters().await? {
                println!("{:>4}  {}", reciter.id, reciter.name);
            }
            Ok(())
        }

        Command::Chapters => {
            let config = Config::load().context("Failed to load configuration")?;
            for chapter in quran_client(&config).list_chapters().await? {
                println!(
                    "{:>4}  {:<20} {:>4} verses  {}",
                    chapter.id, chapter.english_name, chapter.verse_count, chapter.name
                );
            }
            Ok(())
        }

        Command::Status { dir } => {
            let status = read_status(&dir)
                .with_context(|| format!("No readable status in {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if status.status == Stage::Completed {
                println!("Output: {}", dir.join(ayavid::pipeline::OUTPUT_FILENAME).display());
            }
            Ok(())
        }

        Command::Prune {
            root,
            max_age_hours,
        } => {
            let removed = prune_jobs(&root, Duration::from_secs(max_age_hours * 3600))
                .with_context(|| format!("Failed to prune {}", root.display()))?;
            if removed.is_empty() {
                info!("Nothing to prune");
            }
            for dir in removed {
                println!("Removed {}", dir.display());
            }
            Ok(())
        }

        Command::Interactive => {
            print_header();
            let config = setup_api_key()?;
            config
                .validate()
                .context("Configuration validation failed")?;

            let client = quran_client(&config);
            let (reciters, chapters) =
                tokio::try_join!(client.list_reciters(), client.list_chapters())?;

            let choice = run_interactive_wizard(&config, &reciters, &chapters)?;
            if choice.job_dir.exists() {
                warn!("Reusing job directory {}", choice.job_dir.display());
            }
            run_job(&config, choice.pipeline_config, choice.request, &choice.job_dir).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_job_dir() {
        let request = GenerationRequest {
            reciter_id: 1,
            chapter_id: 1,
            start_verse: 1,
            end_verse: 7,
        };
        assert_eq!(default_job_dir(&request), PathBuf::from("jobs/r1-c1-v1-7"));
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "ayavid", "generate", "--reciter", "2", "--chapter", "36", "--start", "1", "--end",
            "12", "--hd",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                reciter, chapter, start, end, hd, clean, ..
            } => {
                assert_eq!((reciter, chapter, start, end), (2, 36, 1, 12));
                assert!(hd);
                assert!(!clean);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_cli_parses_prune_default_age() {
        let cli = Cli::try_parse_from(["ayavid", "prune", "jobs"]).unwrap();
        match cli.command {
            Command::Prune { root, max_age_hours } => {
                assert_eq!(root, PathBuf::from("jobs"));
                assert_eq!(max_age_hours, 24);
            }
            _ => panic!("expected prune"),
        }
    }
}
