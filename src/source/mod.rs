pub mod pexels;
pub mod quran;

pub use pexels::PexelsClient;
pub use quran::QuranClient;

use crate::config::Resolution;
use crate::error::{AyavidError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reciter {
    pub id: u32,
    pub name: String,
    /// Edition identifier used in audio links.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: u32,
    pub name: String,
    pub english_name: String,
    pub verse_count: u32,
    /// Number of verses in all preceding chapters.
    pub verse_base: u32,
}

impl Chapter {
    /// Verse number across the whole text for `verse` of this chapter.
    pub fn global_verse(&self, verse: u32) -> u32 {
        self.verse_base + verse
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verse {
    pub number: u32,
    pub text: String,
    pub audio_link: String,
}

/// Result of a verse range lookup.
#[derive(Debug, Clone)]
pub struct VerseBatch {
    pub chapter_name: String,
    pub reciter_name: String,
    pub verses: Vec<Verse>,
}

/// Verse text, metadata and recitation audio.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn list_reciters(&self) -> Result<Vec<Reciter>>;
    async fn list_chapters(&self) -> Result<Vec<Chapter>>;

    /// Verses `start..=end` of a chapter, in order.
    ///
    /// Unknown ids and out-of-range bounds are `InvalidRequest` errors.
    async fn fetch_verses(
        &self,
        reciter_id: u32,
        chapter_id: u32,
        start: u32,
        end: u32,
    ) -> Result<VerseBatch>;

    fn name(&self) -> &'static str;
}

/// One downloadable rendition of a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoVariant {
    pub width: u32,
    pub height: u32,
    pub link: String,
}

impl VideoVariant {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// A logical stock clip and its resolution variants.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoClip {
    pub id: u64,
    pub duration: f64,
    /// Canonical page URL of the clip; tags are derived from it.
    pub url: String,
    pub variants: Vec<VideoVariant>,
}

impl VideoClip {
    pub fn tags(&self) -> BTreeSet<String> {
        crate::select::derive_tags(&self.url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoPage {
    pub total_results: u64,
    pub clips: Vec<VideoClip>,
}

/// Stock footage search.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// One page of results for `keyword`. Pages start at 1.
    async fn search(&self, keyword: &str, page: u64, per_page: u32) -> Result<VideoPage>;

    fn name(&self) -> &'static str;
}

/// Check `1 <= start <= end <= verse_count` for a chapter.
pub fn check_verse_range(chapter: &Chapter, start: u32, end: u32) -> Result<()> {
    if start < 1 {
        return Err(AyavidError::InvalidRequest(
            "Start verse can't be less than 1".to_string(),
        ));
    }
    if end < start {
        return Err(AyavidError::InvalidRequest(format!(
            "End verse {end} can't be less than start verse {start}"
        )));
    }
    if end > chapter.verse_count {
        return Err(AyavidError::InvalidRequest(format!(
            "Surah {} only contains {} ayat. Aya number {} was required",
            chapter.name, chapter.verse_count, end
        )));
    }
    Ok(())
}

const OPENING_FORMULA: [&str; 4] = ["بسم", "الله", "الرحمن", "الرحيم"];

/// Drop the opening formula that the text source prefixes to verse 1 of
/// every chapter except the first and the ninth.
pub fn strip_opening_formula(chapter_id: u32, verse: u32, text: &str) -> String {
    let text = text.trim().trim_start_matches('\u{FEFF}').trim_start();
    if verse != 1 || chapter_id == 1 || chapter_id == 9 {
        return text.to_string();
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let starts_with_formula = words.len() > OPENING_FORMULA.len()
        && words
            .iter()
            .zip(OPENING_FORMULA)
            .all(|(word, expected)| normalize_arabic(word) == expected);

    if starts_with_formula {
        words[OPENING_FORMULA.len()..].join(" ")
    } else {
        text.to_string()
    }
}

/// Strip diacritics and tatweel, and fold letter variants (alef wasla,
/// Farsi yeh, alef maksura, keheh) so spellings compare equal.
fn normalize_arabic(word: &str) -> String {
    word.chars()
        .filter(|c| {
            !matches!(*c as u32,
                0x0610..=0x061A | 0x0640 | 0x064B..=0x065F | 0x0670 | 0x06D6..=0x06ED | 0xFEFF)
        })
        .map(|c| match c {
            '\u{0671}' => '\u{0627}',
            '\u{06CC}' | '\u{0649}' => '\u{064A}',
            '\u{06A9}' => '\u{0643}',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(verse_count: u32) -> Chapter {
        Chapter {
            id: 2,
            name: "سُورَةُ البَقَرَةِ".to_string(),
            english_name: "Al-Baqara".to_string(),
            verse_count,
            verse_base: 7,
        }
    }

    #[test]
    fn test_global_verse() {
        assert_eq!(chapter(286).global_verse(1), 8);
    }

    #[test]
    fn test_check_verse_range() {
        let c = chapter(286);
        assert!(check_verse_range(&c, 1, 286).is_ok());
        assert!(check_verse_range(&c, 5, 5).is_ok());
        assert!(matches!(
            check_verse_range(&c, 0, 3),
            Err(AyavidError::InvalidRequest(_))
        ));
        assert!(matches!(
            check_verse_range(&c, 4, 3),
            Err(AyavidError::InvalidRequest(_))
        ));
        assert!(matches!(
            check_verse_range(&c, 1, 287),
            Err(AyavidError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_strip_opening_formula() {
        let text = "بِسْمِ ٱللَّهِ ٱلرَّحْمَٰنِ ٱلرَّحِيمِ الٓمٓ\n";
        assert_eq!(strip_opening_formula(2, 1, text), "الٓمٓ");
    }

    #[test]
    fn test_strip_opening_formula_uthmani_spelling() {
        // Tatweel in the third word, Farsi yeh in the fourth
        let text = "بِسۡمِ ٱللَّهِ ٱلرَّحۡمَـٰنِ ٱلرَّحِیمِ الٓمٓ";
        assert_eq!(strip_opening_formula(2, 1, text), "الٓمٓ");

        let with_bom = "\u{FEFF}بِسۡمِ ٱللَّهِ ٱلرَّحۡمَـٰنِ ٱلرَّحِیمِ الٓمٓ";
        assert_eq!(strip_opening_formula(2, 1, with_bom), "الٓمٓ");
    }

    #[test]
    fn test_normalize_arabic_folds_variants() {
        assert_eq!(normalize_arabic("ٱلرَّحۡمَـٰنِ"), "الرحمن");
        assert_eq!(normalize_arabic("ٱلرَّحِیمِ"), "الرحيم");
        assert_eq!(normalize_arabic("ی"), normalize_arabic("ى"));
    }

    #[test]
    fn test_opening_formula_kept_where_it_is_the_verse() {
        let text = "بِسْمِ ٱللَّهِ ٱلرَّحْمَٰنِ ٱلرَّحِيمِ";
        assert_eq!(strip_opening_formula(1, 1, text), text);
        assert_eq!(strip_opening_formula(2, 1, text), text);
        assert_eq!(strip_opening_formula(2, 2, "ذَٰلِكَ ٱلْكِتَٰبُ"), "ذَٰلِكَ ٱلْكِتَٰبُ");
    }

    #[test]
    fn test_opening_formula_absent_in_ninth_chapter() {
        let text = "بَرَآءَةٌ مِّنَ ٱللَّهِ وَرَسُولِهِۦٓ";
        assert_eq!(strip_opening_formula(9, 1, text), text);
    }

    #[test]
    fn test_clip_tags() {
        let clip = VideoClip {
            id: 1,
            duration: 10.0,
            url: "https://www.pexels.com/video/aerial-view-of-a-forest-856193/".to_string(),
            variants: vec![],
        };
        let tags = clip.tags();
        assert!(tags.contains("aerial"));
        assert!(tags.contains("forest"));
        assert!(tags.contains("856193"));
    }
}
