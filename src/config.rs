use crate::error::{AyavidError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_QURAN_API_URL: &str = "https://api.alquran.cloud";
pub const DEFAULT_AUDIO_CDN_URL: &str = "https://cdn.islamic.network";
pub const DEFAULT_PEXELS_API_URL: &str = "https://api.pexels.com";

/// A fixed target frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when `self` is at least as large as `target` in both dimensions.
    pub fn encloses(&self, target: Resolution) -> bool {
        self.width >= target.width && self.height >= target.height
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Named output presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    High,
    #[default]
    Standard,
}

impl ResolutionPreset {
    pub fn resolution(&self) -> Resolution {
        match self {
            ResolutionPreset::High => Resolution::new(1080, 1920),
            ResolutionPreset::Standard => Resolution::new(720, 1280),
        }
    }
}

impl std::fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionPreset::High => write!(f, "high"),
            ResolutionPreset::Standard => write!(f, "standard"),
        }
    }
}

impl std::str::FromStr for ResolutionPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "hd" => Ok(ResolutionPreset::High),
            "standard" | "sd" => Ok(ResolutionPreset::Standard),
            _ => Err(format!(
                "Unknown resolution: {}. Use 'high' or 'standard'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pexels_api_key: Option<String>,
    pub resolution: ResolutionPreset,
    pub concurrency: usize,
    pub font_file: Option<PathBuf>,
    pub stage_timeout_secs: u64,
    pub quran_api_url: String,
    pub audio_cdn_url: String,
    pub pexels_api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pexels_api_key: None,
            resolution: ResolutionPreset::default(),
            concurrency: 4,
            font_file: None,
            stage_timeout_secs: 15 * 60,
            quran_api_url: DEFAULT_QURAN_API_URL.to_string(),
            audio_cdn_url: DEFAULT_AUDIO_CDN_URL.to_string(),
            pexels_api_url: DEFAULT_PEXELS_API_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    AyavidError::Config(format!("{}: {e}", config_path.display()))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Override fields from `PEXELS_API_KEY` and the `AYAVID_*` variables.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("PEXELS_API_KEY") {
            self.pexels_api_key = Some(key);
        }
        if let Ok(resolution) = std::env::var("AYAVID_RESOLUTION") {
            if let Ok(r) = resolution.parse() {
                self.resolution = r;
            }
        }
        if let Ok(concurrency) = std::env::var("AYAVID_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(font) = std::env::var("AYAVID_FONT_FILE") {
            self.font_file = Some(PathBuf::from(font));
        }
        if let Ok(timeout) = std::env::var("AYAVID_STAGE_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.stage_timeout_secs = t;
            }
        }
        if let Ok(url) = std::env::var("AYAVID_QURAN_API_URL") {
            self.quran_api_url = url;
        }
        if let Ok(url) = std::env::var("AYAVID_AUDIO_CDN_URL") {
            self.audio_cdn_url = url;
        }
        if let Ok(url) = std::env::var("AYAVID_PEXELS_API_URL") {
            self.pexels_api_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pexels_api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AyavidError::Config(
                "PEXELS_API_KEY not set. Get one at https://www.pexels.com/api/".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(AyavidError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.stage_timeout_secs == 0 {
            return Err(AyavidError::Config(
                "Stage timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ayavid").join("config.toml"))
    }
}
