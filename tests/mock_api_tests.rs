//! Mock API tests for the upstream providers
//!
//! Local wiremock servers stand in for the Quran text API, the audio CDN and
//! Pexels, so these tests run without network access or API keys.

use ayavid::config::Resolution;
use ayavid::error::AyavidError;
use ayavid::media::Downloader;
use ayavid::select::{ClipSelector, SelectionCriteria};
use ayavid::source::{AudioSource, PexelsClient, QuranClient, VideoSource};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Quran API Mock Tests
// ============================================================================

mod quran_tests {
    use super::*;

    const FATIHA: [&str; 7] = [
        "بِسْمِ ٱللَّهِ ٱلرَّحْمَٰنِ ٱلرَّحِيمِ",
        "ٱلْحَمْدُ لِلَّهِ رَبِّ ٱلْعَٰلَمِينَ",
        "ٱلرَّحْمَٰنِ ٱلرَّحِيمِ",
        "مَٰلِكِ يَوْمِ ٱلدِّينِ",
        "إِيَّاكَ نَعْبُدُ وَإِيَّاكَ نَسْتَعِينُ",
        "ٱهْدِنَا ٱلصِّرَٰطَ ٱلْمُسْتَقِيمَ",
        "صِرَٰطَ ٱلَّذِينَ أَنْعَمْتَ عَلَيْهِمْ غَيْرِ ٱلْمَغْضُوبِ عَلَيْهِمْ وَلَا ٱلضَّآلِّينَ",
    ];

    fn editions() -> Value {
        json!({
            "code": 200,
            "status": "OK",
            "data": [
                {"identifier": "ar.alafasy", "language": "ar", "name": "مشاري العفاسي", "englishName": "Alafasy", "format": "audio", "type": "versebyverse"},
                {"identifier": "en.walk", "language": "en", "name": "Ibrahim Walk", "englishName": "Ibrahim Walk", "format": "audio", "type": "translation"},
                {"identifier": "ar.husary", "language": "ar", "name": "محمود خليل الحصري", "englishName": "Husary", "format": "audio", "type": "versebyverse"}
            ]
        })
    }

    fn meta() -> Value {
        json!({
            "code": 200,
            "status": "OK",
            "data": {
                "ayahs": {"count": 6236},
                "surahs": {
                    "count": 2,
                    "references": [
                        {"number": 1, "name": "سُورَةُ ٱلْفَاتِحَةِ", "englishName": "Al-Faatiha", "numberOfAyahs": 7, "revelationType": "Meccan"},
                        {"number": 2, "name": "سُورَةُ البَقَرَةِ", "englishName": "Al-Baqara", "numberOfAyahs": 286, "revelationType": "Medinan"}
                    ]
                }
            }
        })
    }

    fn ayah(number: u32, text: &str) -> Value {
        json!({"code": 200, "status": "OK", "data": {"number": number, "text": text}})
    }

    async fn quran_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/edition/format/audio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(editions()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/meta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta()))
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer) -> QuranClient {
        QuranClient::new()
            .with_api_url(server.uri())
            .with_audio_cdn_url("http://cdn.test")
    }

    #[tokio::test]
    async fn test_list_reciters_keeps_arabic_editions() {
        let server = quran_server().await;
        let reciters = client(&server).list_reciters().await.unwrap();

        assert_eq!(reciters.len(), 2);
        assert_eq!(reciters[0].id, 1);
        assert_eq!(reciters[0].code, "ar.alafasy");
        assert_eq!(reciters[1].id, 2);
        assert_eq!(reciters[1].code, "ar.husary");
    }

    #[tokio::test]
    async fn test_list_chapters_accumulates_verse_base() {
        let server = quran_server().await;
        let chapters = client(&server).list_chapters().await.unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].verse_base, 0);
        assert_eq!(chapters[1].verse_base, 7);
        assert_eq!(chapters[1].english_name, "Al-Baqara");
    }

    #[tokio::test]
    async fn test_fetch_full_opening_chapter() {
        let server = quran_server().await;
        for (i, text) in FATIHA.iter().enumerate() {
            let number = i as u32 + 1;
            Mock::given(method("GET"))
                .and(path(format!("/v1/ayah/{number}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(ayah(number, text)))
                .mount(&server)
                .await;
        }

        let batch = client(&server).fetch_verses(1, 1, 1, 7).await.unwrap();

        assert_eq!(batch.chapter_name, "سُورَةُ ٱلْفَاتِحَةِ");
        assert_eq!(batch.reciter_name, "مشاري العفاسي");
        assert_eq!(batch.verses.len(), 7);
        for (i, verse) in batch.verses.iter().enumerate() {
            assert_eq!(verse.number, i as u32 + 1);
            assert_eq!(verse.text, FATIHA[i]);
            assert_eq!(
                verse.audio_link,
                format!("http://cdn.test/quran/audio/192/ar.alafasy/{}.mp3", i + 1)
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_strips_formula_outside_opening_chapter() {
        let server = quran_server().await;
        Mock::given(method("GET"))
            .and(path("/v1/ayah/8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ayah(8, "بِسۡمِ ٱللَّهِ ٱلرَّحۡمَـٰنِ ٱلرَّحِیمِ الٓمٓ")),
            )
            .mount(&server)
            .await;

        let batch = client(&server).fetch_verses(2, 2, 1, 1).await.unwrap();

        assert_eq!(batch.verses[0].text, "الٓمٓ");
        assert_eq!(
            batch.verses[0].audio_link,
            "http://cdn.test/quran/audio/192/ar.husary/8.mp3"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_start_is_named() {
        let server = quran_server().await;
        let err = client(&server).fetch_verses(1, 1, 8, 8).await.unwrap_err();

        assert!(err.is_named(), "expected a named error, got {err:?}");
        assert!(err.status_message().contains("only contains 7 ayat"));
    }

    #[tokio::test]
    async fn test_unknown_reciter_is_named() {
        let server = quran_server().await;
        let err = client(&server).fetch_verses(3, 1, 1, 7).await.unwrap_err();

        assert!(err.is_named());
        assert_eq!(err.status_message(), "Reciter id 3 doesn't exist");
    }

    #[tokio::test]
    async fn test_unknown_chapter_is_named() {
        let server = quran_server().await;
        let err = client(&server).fetch_verses(1, 115, 1, 1).await.unwrap_err();

        assert!(err.is_named());
        assert_eq!(err.status_message(), "Surah id 115 doesn't exist");
    }

    #[tokio::test]
    async fn test_missing_verse_text_is_not_found() {
        let server = quran_server().await;
        Mock::given(method("GET"))
            .and(path("/v1/ayah/3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).fetch_verses(1, 1, 3, 3).await.unwrap_err();

        match err {
            AyavidError::NotFound(msg) => {
                assert_eq!(msg, "Error in fetching text of aya number 3")
            }
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unnamed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/meta"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server).list_chapters().await.unwrap_err();
        assert!(matches!(err, AyavidError::Api(_)));
        assert!(!err.is_named());
    }
}

// ============================================================================
// Pexels API Mock Tests
// ============================================================================

mod pexels_tests {
    use super::*;

    fn search_page(total: u64, id: u64, slug: &str) -> Value {
        json!({
            "page": 1,
            "per_page": 1,
            "total_results": total,
            "videos": [{
                "id": id,
                "width": 1920,
                "height": 1080,
                "duration": 12,
                "url": format!("https://www.pexels.com/video/{slug}-{id}/"),
                "video_files": [
                    {"id": 10, "quality": "sd", "file_type": "video/mp4", "width": 640, "height": 360, "link": format!("https://v.test/{id}/sd.mp4")},
                    {"id": 11, "quality": "hd", "file_type": "video/mp4", "width": 1920, "height": 1080, "link": format!("https://v.test/{id}/hd.mp4")}
                ]
            }]
        })
    }

    #[tokio::test]
    async fn test_search_sends_key_and_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .and(header("Authorization", "test-key"))
            .and(query_param("query", "aerial landscape"))
            .and(query_param("page", "3"))
            .and(query_param("per_page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(search_page(40, 77, "aerial-view-of-hills")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = PexelsClient::new("test-key".to_string()).with_api_url(server.uri());
        let page = client.search("aerial landscape", 3, 1).await.unwrap();

        assert_eq!(page.total_results, 40);
        assert_eq!(page.clips.len(), 1);
        assert_eq!(page.clips[0].id, 77);
        assert!(page.clips[0].tags().contains("hills"));
        assert_eq!(page.clips[0].variants.len(), 2);
    }

    #[tokio::test]
    async fn test_search_rejected_key_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = PexelsClient::new("wrong".to_string()).with_api_url(server.uri());
        let err = client.search("sea", 1, 1).await.unwrap_err();

        assert!(matches!(err, AyavidError::Api(_)));
        assert!(!err.is_named());
    }

    #[tokio::test]
    async fn test_selector_over_pexels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(search_page(1, 5, "misty-mountain-valley")),
            )
            .mount(&server)
            .await;

        let client = PexelsClient::new("test-key".to_string()).with_api_url(server.uri());
        let criteria = SelectionCriteria {
            keyword: "aerial landscape".to_string(),
            required_duration: 10.0,
            blacklist: ["people".to_string()].into_iter().collect(),
            target: Resolution::new(720, 1280),
            max_attempts: 5,
        };

        let mut selector = ClipSelector::new(&client).with_seed(7);
        let clips = selector.select(&criteria).await.unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].link, "https://v.test/5/hd.mp4");

        // One distinct clip can never cover 20 seconds
        let criteria = SelectionCriteria {
            required_duration: 20.0,
            ..criteria
        };
        let err = selector.select(&criteria).await.unwrap_err();
        assert!(matches!(err, AyavidError::Exhausted(_)));
        assert!(err.is_named());
    }
}

// ============================================================================
// Download Mock Tests
// ============================================================================

mod download_tests {
    use super::*;

    #[tokio::test]
    async fn test_download_all_keeps_order() {
        let server = MockServer::start().await;
        for i in 1..=3 {
            Mock::given(method("GET"))
                .and(path(format!("/audio/{i}.mp3")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(format!("verse {i}").into_bytes())
                        .set_delay(Duration::from_millis(40 * (4 - i))),
                )
                .mount(&server)
                .await;
        }

        let dir = TempDir::new().unwrap();
        let links: Vec<String> = (1..=3)
            .map(|i| format!("{}/audio/{i}.mp3", server.uri()))
            .collect();
        let paths = Downloader::new(3)
            .download_all(&links, dir.path(), "recitation", "mp3")
            .await
            .unwrap();

        assert_eq!(paths.len(), 3);
        for (i, p) in paths.iter().enumerate() {
            assert_eq!(p, &dir.path().join(format!("recitation_{i}.mp3")));
            assert_eq!(std::fs::read_to_string(p).unwrap(), format!("verse {}", i + 1));
        }
        assert!(!dir.path().join("recitation_0.mp3.part").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = Downloader::new(1)
            .with_retries(3, Duration::from_millis(1))
            .download_with_retry(&format!("{}/gone.mp4", server.uri()), &dir.path().join("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, AyavidError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.mp4"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = Downloader::new(1)
            .with_retries(3, Duration::from_millis(1))
            .download_with_retry(&format!("{}/flaky.mp4", server.uri()), &dir.path().join("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, AyavidError::Exhausted(_)));
        assert!(err.is_named());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private.mp4"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = Downloader::new(1)
            .with_retries(3, Duration::from_millis(1))
            .download_with_retry(&format!("{}/private.mp4", server.uri()), &dir.path().join("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, AyavidError::Download { status: 403, .. }));
        assert!(!err.is_named());
    }

    #[tokio::test]
    async fn test_retry_decision_ignores_link_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clips/7.mp4"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let link = format!("{}/clips/7.mp4?label=status 4", server.uri());
        let err = Downloader::new(1)
            .with_retries(3, Duration::from_millis(1))
            .download_with_retry(&link, &dir.path().join("v.mp4"))
            .await
            .unwrap_err();

        match err {
            AyavidError::Exhausted(msg) => assert!(msg.contains("after 3 attempts")),
            other => panic!("Expected Exhausted, got: {other:?}"),
        }
    }
}
