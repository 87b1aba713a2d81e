//! Declarative ffmpeg job descriptions.
//!
//! A [`Composition`] lists inputs, a filter graph and output settings, and
//! only becomes an argument vector in [`Composition::to_args`]. Nothing here
//! touches the filesystem or spawns a process.

use crate::captions::CaptionRow;
use crate::config::Resolution;
use crate::error::{AyavidError, Result};
use std::path::{Path, PathBuf};

const FRAME_RATE: u32 = 30;
const AUDIO_SAMPLE_RATE: u32 = 44100;
const OVERLAY_OPACITY: f64 = 0.4;

/// One filter, e.g. `crop=720:1280:0:0` or `drawbox=x=0:y=0:...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((Some(key.into()), value.to_string()));
        self
    }

    /// Add an argument wrapped in filtergraph quotes.
    pub fn quoted_arg(self, key: impl Into<String>, value: &str) -> Self {
        self.arg(key, quote(value))
    }

    pub fn positional(mut self, value: impl ToString) -> Self {
        self.args.push((None, value.to_string()));
        self
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(key, value)| match key {
                Some(key) => format!("{key}={value}"),
                None => value.clone(),
            })
            .collect();
        format!("{}={}", self.name, args.join(":"))
    }
}

/// Labeled inputs, a linear run of filters, labeled outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn render(&self) -> String {
        let labels = |names: &[String]| names.iter().map(|n| format!("[{n}]")).collect::<String>();
        let filters: Vec<String> = self.filters.iter().map(Filter::render).collect();
        format!(
            "{}{}{}",
            labels(&self.inputs[..]),
            filters.join(","),
            labels(&self.outputs[..])
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(FilterChain::render)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// A text file the backend must write before running the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    pub path: PathBuf,
    pub contents: String,
}

/// A complete ffmpeg invocation, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub inputs: Vec<PathBuf>,
    pub graph: FilterGraph,
    pub maps: Vec<String>,
    pub output_args: Vec<String>,
    pub output: PathBuf,
    pub text_files: Vec<TextFile>,
}

impl Composition {
    /// Arguments for the ffmpeg binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_string());
        args.push(self.graph.render());

        for map in &self.maps {
            args.push("-map".to_string());
            args.push(format!("[{map}]"));
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Builds the final composite: concatenated footage under a translucent
/// overlay with timed captions, a fixed title and subtitle, muxed with the
/// concatenated recitation audio.
#[derive(Debug, Clone)]
pub struct CompositionBuilder {
    videos: Vec<PathBuf>,
    audios: Vec<PathBuf>,
    captions: Vec<CaptionRow>,
    title: String,
    subtitle: String,
    resolution: Resolution,
    output: PathBuf,
    text_dir: PathBuf,
    font_file: Option<PathBuf>,
}

impl CompositionBuilder {
    pub fn new(resolution: Resolution, output: impl Into<PathBuf>, text_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos: Vec::new(),
            audios: Vec::new(),
            captions: Vec::new(),
            title: String::new(),
            subtitle: String::new(),
            resolution,
            output: output.into(),
            text_dir: text_dir.into(),
            font_file: None,
        }
    }

    pub fn videos(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.videos.extend(paths);
        self
    }

    pub fn audios(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.audios.extend(paths);
        self
    }

    pub fn captions(mut self, rows: impl IntoIterator<Item = CaptionRow>) -> Self {
        self.captions.extend(rows);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn font_file(mut self, font_file: Option<PathBuf>) -> Self {
        self.font_file = font_file;
        self
    }

    pub fn build(self) -> Result<Composition> {
        if self.videos.is_empty() {
            return Err(AyavidError::Media("No video clips to compose".to_string()));
        }
        if self.audios.is_empty() {
            return Err(AyavidError::Media("No audio clips to compose".to_string()));
        }

        let mut graph = FilterGraph::default();
        let mut text_files = Vec::new();

        // Normalize every clip so concat sees identical stream parameters.
        for i in 0..self.videos.len() {
            graph.push(
                FilterChain::new([format!("{i}:v")])
                    .filter(Filter::new("setsar").positional(1))
                    .filter(Filter::new("fps").positional(FRAME_RATE))
                    .filter(Filter::new("format").positional("yuv420p"))
                    .output(format!("v{i}")),
            );
        }
        graph.push(
            FilterChain::new((0..self.videos.len()).map(|i| format!("v{i}")))
                .filter(
                    Filter::new("concat")
                        .arg("n", self.videos.len())
                        .arg("v", 1)
                        .arg("a", 0),
                )
                .output("vcat"),
        );

        let audio_offset = self.videos.len();
        for j in 0..self.audios.len() {
            graph.push(
                FilterChain::new([format!("{}:a", audio_offset + j)])
                    .filter(Filter::new("aresample").positional(AUDIO_SAMPLE_RATE))
                    .output(format!("a{j}")),
            );
        }
        graph.push(
            FilterChain::new((0..self.audios.len()).map(|j| format!("a{j}")))
                .filter(
                    Filter::new("concat")
                        .arg("n", self.audios.len())
                        .arg("v", 0)
                        .arg("a", 1),
                )
                .output("aout"),
        );

        let width = self.resolution.width;
        let mut overlay = FilterChain::new(["vcat"]).filter(
            Filter::new("drawbox")
                .arg("x", 0)
                .arg("y", 0)
                .arg("w", "iw")
                .arg("h", "ih")
                .arg("color", format!("black@{OVERLAY_OPACITY}"))
                .arg("t", "fill"),
        );

        let title_size = width / 16;
        let subtitle_size = width / 24;
        let header = [
            ("title", &self.title, title_size, "h*0.08".to_string()),
            (
                "subtitle",
                &self.subtitle,
                subtitle_size,
                format!("h*0.08+{}", title_size * 3 / 2),
            ),
        ];
        for (name, text, size, y) in header {
            if text.trim().is_empty() {
                continue;
            }
            let path = self.text_dir.join(format!("{name}.txt"));
            overlay = overlay.filter(self.drawtext(&path, size, &y, None));
            text_files.push(TextFile {
                path,
                contents: text.trim().to_string(),
            });
        }

        let caption_size = width / 12;
        for (i, row) in self.captions.iter().enumerate() {
            let path = self.text_dir.join(format!("caption_{i}.txt"));
            overlay = overlay.filter(self.drawtext(
                &path,
                caption_size,
                "(h-text_h)/2+50",
                Some((row.start_time, row.end_time)),
            ));
            text_files.push(TextFile {
                path,
                contents: row.text.clone(),
            });
        }
        graph.push(overlay.output("vout"));

        Ok(Composition {
            inputs: self.videos.iter().chain(&self.audios).cloned().collect(),
            graph,
            maps: vec!["vout".to_string(), "aout".to_string()],
            output_args: [
                "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p", "-c:a", "aac",
                "-b:a", "192k",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            output: self.output,
            text_files,
        })
    }

    fn drawtext(&self, text_file: &Path, size: u32, y: &str, window: Option<(f64, f64)>) -> Filter {
        let mut filter = Filter::new("drawtext")
            .quoted_arg("textfile", &text_file.to_string_lossy())
            .arg("expansion", "none");
        if let Some(font) = &self.font_file {
            filter = filter.quoted_arg("fontfile", &font.to_string_lossy());
        }
        filter = filter
            .arg("fontsize", size)
            .arg("fontcolor", "white")
            .arg("x", "(w-text_w)/2")
            .arg("y", y);
        if let Some((start, end)) = window {
            filter = filter.quoted_arg("enable", &enable_window(start, end));
        }
        filter
    }
}

/// Expression true for `start <= t < end`.
pub fn enable_window(start: f64, end: f64) -> String {
    format!("gte(t,{start:.3})*lt(t,{end:.3})")
}

/// Wrap a value in filtergraph single quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Centered crop of `native` down to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    pub fn centered(native: Resolution, target: Resolution) -> Result<Self> {
        if !native.encloses(target) {
            return Err(AyavidError::Media(format!(
                "Video resolution should be at least {target}, got {native}"
            )));
        }
        Ok(Self {
            x: (native.width - target.width) / 2,
            y: (native.height - target.height) / 2,
            width: target.width,
            height: target.height,
        })
    }

    pub fn filter(&self) -> Filter {
        Filter::new("crop")
            .positional(self.width)
            .positional(self.height)
            .positional(self.x)
            .positional(self.y)
    }
}
