use crate::error::{AyavidError, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Maximum attempts per file.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Fetches remote files to disk with bounded concurrency.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    concurrency: usize,
    max_retries: u32,
    base_delay: Duration,
}

impl Downloader {
    pub fn new(concurrency: usize) -> Self {
        Self::with_client(reqwest::Client::new(), concurrency)
    }

    pub fn with_client(client: reqwest::Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    /// Override the retry policy.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Download `links` in order to `dir/{prefix}_{i}.{ext}`.
    ///
    /// The returned paths follow the order of `links`, whatever order the
    /// transfers finish in. The first failure aborts the batch.
    pub async fn download_all(
        &self,
        links: &[String],
        dir: &Path,
        prefix: &str,
        ext: &str,
    ) -> Result<Vec<PathBuf>> {
        if links.is_empty() {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(dir).await?;

        let start_time = Instant::now();
        info!(
            "Downloading {} files to {} with {} concurrent requests",
            links.len(),
            dir.display(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for (index, link) in links.iter().enumerate() {
            let sem = semaphore.clone();
            let dest = dir.join(format!("{prefix}_{index}.{ext}"));

            futures.push(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| AyavidError::Media(format!("Download queue closed: {e}")))?;
                self.download_with_retry(link, &dest).await?;
                Ok::<_, AyavidError>((index, dest))
            });
        }

        let mut results = Vec::with_capacity(links.len());
        while let Some(result) = futures.next().await {
            results.push(result?);
        }
        results.sort_by_key(|(index, _)| *index);

        info!(
            "Downloaded {} files in {:.1}s",
            results.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(results.into_iter().map(|(_, path)| path).collect())
    }

    /// Download a single file, retrying transient failures.
    pub async fn download_with_retry(&self, link: &str, dest: &Path) -> Result<()> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!("Retry attempt {} for {} after {:?}", attempt, link, delay);
                tokio::time::sleep(delay).await;
            }

            match self.download(link, dest).await {
                Ok(()) => return Ok(()),
                // Missing resources and client errors won't fix themselves
                Err(e @ AyavidError::NotFound(_)) => return Err(e),
                Err(e @ AyavidError::Download { status: 400..=499, .. }) => return Err(e),
                Err(e) => {
                    warn!("Download attempt {} of {} failed: {}", attempt + 1, link, e);
                    last_error = Some(e);
                }
            }
        }

        Err(AyavidError::Exhausted(format!(
            "Unable to download {} after {} attempts: {}",
            link,
            self.max_retries,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Stream one file to `dest`, going through a `.part` file so a
    /// partial transfer never sits at the final path.
    async fn download(&self, link: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(link).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AyavidError::NotFound(format!(
                "The requested resource doesn't exist: {link}"
            )));
        }
        if !status.is_success() {
            return Err(AyavidError::Download {
                link: link.to_string(),
                status: status.as_u16(),
            });
        }

        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, dest).await?;
        debug!("Saved {} ({} bytes)", dest.display(), written);
        Ok(())
    }
}
