//! Caption timing.
//!
//! Phase one lays verses end to end on one timeline using their measured
//! audio durations. Phase two splits each verse window into short runs of
//! words, sharing the window evenly per word.

use crate::error::{AyavidError, Result};
use crate::source::Verse;
use std::path::Path;
use tracing::debug;

/// Default number of words shown at once.
pub const DEFAULT_WORDS_PER_CHUNK: usize = 5;

/// Field separator of the caption file. Only the first two occurrences on a
/// line are significant, so caption text may contain it.
const FIELD_SEPARATOR: char = ':';

/// A time-windowed unit of on-screen text, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionRow {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

impl CaptionRow {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// One recited verse with its measured duration and display chunks.
#[derive(Debug, Clone)]
pub struct RecitationSegment {
    pub text: String,
    pub audio_link: String,
    pub duration: f64,
    pub caption_rows: Vec<CaptionRow>,
}

/// Phase one: absolute windows from a running sum of durations.
pub fn timed_rows<'a, I>(items: I) -> Vec<CaptionRow>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut start = 0.0;
    items
        .into_iter()
        .map(|(text, duration)| {
            let row = CaptionRow {
                start_time: start,
                end_time: start + duration,
                text: text.trim().to_string(),
            };
            start = row.end_time;
            row
        })
        .collect()
}

/// Phase two: split one row into runs of at most `words_per_chunk` words.
///
/// The chunks partition the row's window exactly. A row without words yields
/// no chunks; a zero-length row yields zero-length chunks.
pub fn chunk_row(row: &CaptionRow, words_per_chunk: usize) -> Vec<CaptionRow> {
    let words: Vec<&str> = row.text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let words_per_chunk = words_per_chunk.max(1);
    let per_word = row.duration() / words.len() as f64;
    let chunk_count = words.len().div_ceil(words_per_chunk);

    let mut start = row.start_time;
    let mut chunks = Vec::with_capacity(chunk_count);
    for (i, group) in words.chunks(words_per_chunk).enumerate() {
        let end = if i + 1 == chunk_count {
            row.end_time
        } else {
            start + group.len() as f64 * per_word
        };
        chunks.push(CaptionRow {
            start_time: start,
            end_time: end,
            text: group.join(" "),
        });
        start = end;
    }
    chunks
}

pub fn chunk_rows(rows: &[CaptionRow], words_per_chunk: usize) -> Vec<CaptionRow> {
    rows.iter()
        .flat_map(|row| chunk_row(row, words_per_chunk))
        .collect()
}

/// Pair fetched verses with their probed durations and time their captions.
pub fn build_segments(
    verses: &[Verse],
    durations: &[f64],
    words_per_chunk: usize,
) -> Result<Vec<RecitationSegment>> {
    if verses.len() != durations.len() {
        return Err(AyavidError::Media(format!(
            "{} verses but {} audio durations",
            verses.len(),
            durations.len()
        )));
    }
    if let Some(bad) = durations.iter().find(|d| !d.is_finite() || **d < 0.0) {
        return Err(AyavidError::Media(format!("Invalid audio duration: {bad}")));
    }

    let rows = timed_rows(
        verses
            .iter()
            .zip(durations)
            .map(|(verse, duration)| (verse.text.as_str(), *duration)),
    );

    let segments = verses
        .iter()
        .zip(rows)
        .map(|(verse, row)| RecitationSegment {
            text: verse.text.clone(),
            audio_link: verse.audio_link.clone(),
            duration: row.duration(),
            caption_rows: chunk_row(&row, words_per_chunk),
        })
        .collect::<Vec<_>>();

    debug!(
        "Timed {} segments into {} caption chunks",
        segments.len(),
        segments.iter().map(|s| s.caption_rows.len()).sum::<usize>()
    );
    Ok(segments)
}

/// End of the last caption, or zero.
pub fn total_duration(rows: &[CaptionRow]) -> f64 {
    rows.iter().map(|r| r.end_time).fold(0.0, f64::max)
}

pub fn format_caption_file(rows: &[CaptionRow]) -> String {
    rows.iter()
        .map(|row| {
            format!(
                "{}{sep}{}{sep}{}\n",
                row.start_time,
                row.end_time,
                row.text.replace(['\n', '\r'], " "),
                sep = FIELD_SEPARATOR
            )
        })
        .collect()
}

pub fn parse_caption_file(contents: &str) -> Result<Vec<CaptionRow>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let mut fields = line.splitn(3, FIELD_SEPARATOR);
            let (Some(start), Some(end), Some(text)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(AyavidError::Media(format!(
                    "Malformed caption line {}: {line}",
                    n + 1
                )));
            };
            let parse = |value: &str| {
                value.trim().parse::<f64>().map_err(|e| {
                    AyavidError::Media(format!("Bad timestamp on caption line {}: {e}", n + 1))
                })
            };
            Ok(CaptionRow {
                start_time: parse(start)?,
                end_time: parse(end)?,
                text: text.to_string(),
            })
        })
        .collect()
}

pub async fn write_caption_file(path: &Path, rows: &[CaptionRow]) -> Result<()> {
    tokio::fs::write(path, format_caption_file(rows)).await?;
    Ok(())
}

pub async fn read_caption_file(path: &Path) -> Result<Vec<CaptionRow>> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_caption_file(&contents)
}
