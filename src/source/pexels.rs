use crate::config::DEFAULT_PEXELS_API_URL;
use crate::error::{AyavidError, Result};
use crate::source::{VideoClip, VideoPage, VideoSource, VideoVariant};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Pexels video search client.
pub struct PexelsClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl PexelsClient {
    pub fn new(api_key: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_key)
    }

    pub fn with_client(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            api_url: DEFAULT_PEXELS_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn parse_response(response: SearchResponse) -> VideoPage {
        let clips = response
            .videos
            .into_iter()
            .map(|video| VideoClip {
                id: video.id,
                duration: video.duration,
                url: video.url,
                variants: video
                    .video_files
                    .into_iter()
                    .filter_map(|file| {
                        Some(VideoVariant {
                            width: file.width?,
                            height: file.height?,
                            link: file.link,
                        })
                    })
                    .collect(),
            })
            .collect();

        VideoPage {
            total_results: response.total_results,
            clips,
        }
    }
}

#[async_trait]
impl VideoSource for PexelsClient {
    async fn search(&self, keyword: &str, page: u64, per_page: u32) -> Result<VideoPage> {
        let url = format!("{}/videos/search", self.api_url);
        debug!("Searching Pexels for '{}' (page {}, per_page {})", keyword, page, per_page);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", keyword.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AyavidError::Api(format!(
                "Pexels API error ({}): {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        Ok(Self::parse_response(parsed))
    }

    fn name(&self) -> &'static str {
        "Pexels"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    duration: f64,
    url: String,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    width: Option<u32>,
    height: Option<u32>,
    link: String,
}
