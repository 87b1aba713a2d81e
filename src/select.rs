//! Stock footage selection.
//!
//! Clips are drawn one at a time from random result pages and kept when they
//! are new, come in a rendition that encloses the target frame, and carry no
//! blacklisted tag. Drawing stops as soon as the kept clips cover the
//! required duration, or when the attempt budget runs out.

use crate::config::Resolution;
use crate::error::{AyavidError, Result};
use crate::source::{VideoClip, VideoSource, VideoVariant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashSet};
use tokio::sync::watch;
use tracing::{debug, info};

/// Default number of draws before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 200;

/// A clip accepted for download, pinned to one rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCandidate {
    pub id: u64,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub link: String,
    pub tags: BTreeSet<String>,
}

impl VideoCandidate {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub keyword: String,
    pub required_duration: f64,
    pub blacklist: BTreeSet<String>,
    pub target: Resolution,
    pub max_attempts: usize,
}

/// Why a drawn clip was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoEnclosingVariant,
    Duplicate,
    Blacklisted(Vec<String>),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoEnclosingVariant => write!(f, "no rendition encloses the target"),
            Rejection::Duplicate => write!(f, "already selected"),
            Rejection::Blacklisted(words) => {
                write!(f, "contains blacklisted words ({})", words.join(", "))
            }
        }
    }
}

/// Tags of a clip: the dash-separated tokens of the last path segment of its
/// canonical URL.
pub fn derive_tags(url: &str) -> BTreeSet<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('-')
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Among renditions at least as large as `target`, the narrowest, then the
/// shortest.
pub fn smallest_enclosing_variant(
    variants: &[VideoVariant],
    target: Resolution,
) -> Option<&VideoVariant> {
    variants
        .iter()
        .filter(|v| v.resolution().encloses(target))
        .min_by_key(|v| (v.width, v.height))
}

/// Decide whether `clip` may join the selection.
pub fn evaluate(
    clip: &VideoClip,
    criteria: &SelectionCriteria,
    selected_ids: &HashSet<u64>,
) -> std::result::Result<VideoCandidate, Rejection> {
    let variant = smallest_enclosing_variant(&clip.variants, criteria.target)
        .ok_or(Rejection::NoEnclosingVariant)?;

    if selected_ids.contains(&clip.id) {
        return Err(Rejection::Duplicate);
    }

    let tags = clip.tags();
    let blacklisted: Vec<String> = tags.intersection(&criteria.blacklist).cloned().collect();
    if !blacklisted.is_empty() {
        return Err(Rejection::Blacklisted(blacklisted));
    }

    Ok(VideoCandidate {
        id: clip.id,
        duration: clip.duration,
        width: variant.width,
        height: variant.height,
        link: variant.link.clone(),
        tags,
    })
}

/// Draws clips from a [`VideoSource`] until the criteria are met.
pub struct ClipSelector<'a> {
    source: &'a dyn VideoSource,
    rng: StdRng,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> ClipSelector<'a> {
    pub fn new(source: &'a dyn VideoSource) -> Self {
        Self {
            source,
            rng: StdRng::from_entropy(),
            cancel: None,
        }
    }

    /// Use a fixed seed for page selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stop drawing once `cancel` turns true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub async fn select(&mut self, criteria: &SelectionCriteria) -> Result<Vec<VideoCandidate>> {
        let mut selected = Vec::new();
        let mut selected_ids = HashSet::new();
        let mut total_duration = 0.0;

        if criteria.required_duration <= 0.0 {
            return Ok(selected);
        }

        let total_results = self
            .source
            .search(&criteria.keyword, 1, 1)
            .await?
            .total_results;
        if total_results == 0 {
            return Err(AyavidError::Exhausted(format!(
                "No footage found for keyword '{}'",
                criteria.keyword
            )));
        }

        let mut attempts = 0;
        while total_duration < criteria.required_duration {
            if attempts >= criteria.max_attempts {
                return Err(AyavidError::Exhausted(format!(
                    "No conforming footage found for '{}' after {} attempts ({:.1}s of {:.1}s collected)",
                    criteria.keyword, attempts, total_duration, criteria.required_duration
                )));
            }
            if self.cancelled() {
                return Err(AyavidError::Cancelled);
            }
            attempts += 1;

            let page = self.rng.gen_range(1..=total_results);
            let Some(clip) = self
                .source
                .search(&criteria.keyword, page, 1)
                .await?
                .clips
                .into_iter()
                .next()
            else {
                debug!("Page {} returned no clip", page);
                continue;
            };

            match evaluate(&clip, criteria, &selected_ids) {
                Ok(candidate) => {
                    debug!(
                        "Selected clip {} ({:.1}s, {}x{})",
                        candidate.id, candidate.duration, candidate.width, candidate.height
                    );
                    total_duration += candidate.duration;
                    selected_ids.insert(candidate.id);
                    selected.push(candidate);
                }
                Err(reason) => debug!("Dismissed clip {}: {}", clip.id, reason),
            }
        }

        info!(
            "Selected {} clips totalling {:.1}s in {} draws from {}",
            selected.len(),
            total_duration,
            attempts,
            self.source.name()
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(width: u32, height: u32) -> VideoVariant {
        VideoVariant {
            width,
            height,
            link: format!("https://v/{width}x{height}.mp4"),
        }
    }

    fn criteria() -> SelectionCriteria {
        SelectionCriteria {
            keyword: "aerial landscape".to_string(),
            required_duration: 30.0,
            blacklist: ["people", "man"].iter().map(|s| s.to_string()).collect(),
            target: Resolution::new(360, 640),
            max_attempts: 10,
        }
    }

    fn clip(id: u64, url: &str, variants: Vec<VideoVariant>) -> VideoClip {
        VideoClip {
            id,
            duration: 12.0,
            url: url.to_string(),
            variants,
        }
    }

    #[test]
    fn test_derive_tags() {
        let tags = derive_tags("https://www.pexels.com/video/man-walking-on-beach-1234/");
        let expected: BTreeSet<String> = ["man", "walking", "on", "beach", "1234"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tags, expected);
        assert_eq!(derive_tags("https://x/video/Sea-Waves"), derive_tags("https://x/video/sea-waves/"));
        assert!(derive_tags("").is_empty());
    }

    #[test]
    fn test_no_variant_encloses_portrait_target() {
        let pool = vec![variant(1280, 720), variant(1920, 1080), variant(3840, 2160)];
        assert!(smallest_enclosing_variant(&pool, Resolution::new(1080, 1920)).is_none());
    }

    #[test]
    fn test_smallest_enclosing_variant() {
        let pool = vec![variant(3840, 2160), variant(1280, 720), variant(1920, 1080)];
        let chosen = smallest_enclosing_variant(&pool, Resolution::new(360, 640)).unwrap();
        assert_eq!((chosen.width, chosen.height), (1280, 720));
    }

    #[test]
    fn test_width_ties_broken_by_height() {
        let pool = vec![variant(1080, 2400), variant(1080, 1920), variant(1440, 2560)];
        let chosen = smallest_enclosing_variant(&pool, Resolution::new(1080, 1920)).unwrap();
        assert_eq!((chosen.width, chosen.height), (1080, 1920));
    }

    #[test]
    fn test_evaluate_rejections() {
        let criteria = criteria();
        let mut seen = HashSet::new();

        let small = clip(1, "https://x/video/hills-1/", vec![variant(320, 240)]);
        assert_eq!(evaluate(&small, &criteria, &seen), Err(Rejection::NoEnclosingVariant));

        let crowded = clip(2, "https://x/video/people-on-hills-2/", vec![variant(720, 1280)]);
        assert_eq!(
            evaluate(&crowded, &criteria, &seen),
            Err(Rejection::Blacklisted(vec!["people".to_string()]))
        );

        let good = clip(3, "https://x/video/hills-3/", vec![variant(720, 1280)]);
        let candidate = evaluate(&good, &criteria, &seen).unwrap();
        assert_eq!(candidate.link, "https://v/720x1280.mp4");

        seen.insert(3);
        assert_eq!(evaluate(&good, &criteria, &seen), Err(Rejection::Duplicate));
    }
}
