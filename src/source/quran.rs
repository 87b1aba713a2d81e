use crate::config::{DEFAULT_AUDIO_CDN_URL, DEFAULT_QURAN_API_URL};
use crate::error::{AyavidError, Result};
use crate::source::{
    check_verse_range, strip_opening_formula, AudioSource, Chapter, Reciter, Verse, VerseBatch,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Audio bitrate directory on the CDN.
const AUDIO_BITRATE: u32 = 192;

/// Client for the alquran.cloud API and its audio CDN.
pub struct QuranClient {
    client: reqwest::Client,
    api_url: String,
    audio_cdn_url: String,
}

impl Default for QuranClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QuranClient {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: DEFAULT_QURAN_API_URL.to_string(),
            audio_cdn_url: DEFAULT_AUDIO_CDN_URL.to_string(),
        }
    }

    /// Point the text/metadata requests at another host.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point the audio links at another host.
    pub fn with_audio_cdn_url(mut self, url: impl Into<String>) -> Self {
        self.audio_cdn_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn audio_link(&self, reciter: &Reciter, global_verse: u32) -> String {
        format!(
            "{}/quran/audio/{}/{}/{}.mp3",
            self.audio_cdn_url, AUDIO_BITRATE, reciter.code, global_verse
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AyavidError::NotFound(format!(
                "The requested resource doesn't exist: {url}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AyavidError::Api(format!(
                "Quran API error ({}): {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_verse_text(&self, global_verse: u32) -> Result<String> {
        let response: Envelope<AyahData> = self
            .get_json(&format!("/v1/ayah/{global_verse}"))
            .await
            .map_err(|e| match e {
                AyavidError::NotFound(_) => AyavidError::NotFound(format!(
                    "Error in fetching text of aya number {global_verse}"
                )),
                other => other,
            })?;
        Ok(response.data.text)
    }
}

#[async_trait]
impl AudioSource for QuranClient {
    async fn list_reciters(&self) -> Result<Vec<Reciter>> {
        let response: Envelope<Vec<EditionData>> =
            self.get_json("/v1/edition/format/audio").await?;

        Ok(response
            .data
            .into_iter()
            .filter(|edition| edition.language == "ar")
            .zip(1..)
            .map(|(edition, id)| Reciter {
                id,
                name: edition.name,
                code: edition.identifier,
            })
            .collect())
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        let response: Envelope<MetaData> = self.get_json("/v1/meta").await?;

        let mut verse_base = 0;
        let mut chapters = Vec::with_capacity(response.data.surahs.references.len());
        for (reference, id) in response.data.surahs.references.into_iter().zip(1..) {
            chapters.push(Chapter {
                id,
                name: reference.name,
                english_name: reference.english_name,
                verse_count: reference.number_of_ayahs,
                verse_base,
            });
            verse_base += reference.number_of_ayahs;
        }
        Ok(chapters)
    }

    async fn fetch_verses(
        &self,
        reciter_id: u32,
        chapter_id: u32,
        start: u32,
        end: u32,
    ) -> Result<VerseBatch> {
        let (reciters, chapters) = tokio::try_join!(self.list_reciters(), self.list_chapters())?;

        let reciter = reciters
            .into_iter()
            .find(|r| r.id == reciter_id)
            .ok_or_else(|| {
                AyavidError::InvalidRequest(format!("Reciter id {reciter_id} doesn't exist"))
            })?;
        let chapter = chapters
            .into_iter()
            .find(|c| c.id == chapter_id)
            .ok_or_else(|| {
                AyavidError::InvalidRequest(format!("Surah id {chapter_id} doesn't exist"))
            })?;
        check_verse_range(&chapter, start, end)?;

        let texts = try_join_all(
            (start..=end).map(|verse| self.fetch_verse_text(chapter.global_verse(verse))),
        )
        .await?;

        let verses = (start..=end)
            .zip(texts)
            .map(|(verse, text)| Verse {
                number: verse,
                text: strip_opening_formula(chapter_id, verse, &text),
                audio_link: self.audio_link(&reciter, chapter.global_verse(verse)),
            })
            .collect();

        Ok(VerseBatch {
            chapter_name: chapter.name,
            reciter_name: reciter.name,
            verses,
        })
    }

    fn name(&self) -> &'static str {
        "alquran.cloud"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct EditionData {
    identifier: String,
    language: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    surahs: SurahsMeta,
}

#[derive(Debug, Deserialize)]
struct SurahsMeta {
    references: Vec<SurahReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SurahReference {
    name: String,
    english_name: String,
    number_of_ayahs: u32,
}

#[derive(Debug, Deserialize)]
struct AyahData {
    text: String,
}
