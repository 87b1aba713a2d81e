use crate::config::{Config, ResolutionPreset};
use crate::pipeline::{GenerationRequest, PipelineConfig};
use crate::source::{Chapter, Reciter};
use console::style;
use dialoguer::{Confirm, FuzzySelect, Input, Select};
use std::fs;
use std::path::PathBuf;

pub struct InteractiveResult {
    pub request: GenerationRequest,
    pub job_dir: PathBuf,
    pub pipeline_config: PipelineConfig,
}

pub fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║         ayavid - Recitation Video Generator       ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

/// Load the configuration, prompting for the Pexels key when it is missing.
pub fn setup_api_key() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();

    if config.pexels_api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        println!("{} Pexels API key configured", style("✓").green());
        return Ok(config);
    }

    println!("{} Pexels API key not found", style("!").yellow());
    println!("  Get one at: https://www.pexels.com/api/\n");

    let api_key: String = Input::new()
        .with_prompt("Enter your Pexels API key")
        .interact_text()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key is required");
    }

    config.pexels_api_key = Some(api_key.trim().to_string());

    if Confirm::new()
        .with_prompt("Save API key to config file?")
        .default(true)
        .interact()?
    {
        save_config(&config)?;
        println!("{} API key saved to config\n", style("✓").green());
    }

    Ok(config)
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_path) = Config::config_file_path() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

/// Walk the user through reciter, chapter, verse range and quality.
pub fn run_interactive_wizard(
    config: &Config,
    reciters: &[Reciter],
    chapters: &[Chapter],
) -> anyhow::Result<InteractiveResult> {
    if reciters.is_empty() || chapters.is_empty() {
        anyhow::bail!("No reciters or chapters available");
    }

    let reciter = select_reciter(reciters)?;
    let chapter = select_chapter(chapters)?;
    let (start_verse, end_verse) = select_verse_range(chapter)?;
    let resolution = select_resolution(config.resolution)?;

    let request = GenerationRequest {
        reciter_id: reciter.id,
        chapter_id: chapter.id,
        start_verse,
        end_verse,
    };
    let job_dir = PathBuf::from("jobs").join(request.job_name());

    print_summary(reciter, chapter, &request, resolution, &job_dir);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let pipeline_config = PipelineConfig {
        resolution: resolution.resolution(),
        ..PipelineConfig::from_config(config)
    };

    Ok(InteractiveResult {
        request,
        job_dir,
        pipeline_config,
    })
}

fn select_reciter(reciters: &[Reciter]) -> anyhow::Result<&Reciter> {
    println!("\n{}", style("Select reciter:").bold());
    let items: Vec<String> = reciters.iter().map(format_reciter).collect();

    let selection = FuzzySelect::new()
        .with_prompt("Type to search")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(&reciters[selection])
}

fn select_chapter(chapters: &[Chapter]) -> anyhow::Result<&Chapter> {
    println!("\n{}", style("Select chapter:").bold());
    let items: Vec<String> = chapters.iter().map(format_chapter).collect();

    let selection = FuzzySelect::new()
        .with_prompt("Type to search")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(&chapters[selection])
}

fn select_verse_range(chapter: &Chapter) -> anyhow::Result<(u32, u32)> {
    let count = chapter.verse_count;

    let start: u32 = Input::new()
        .with_prompt(format!("First verse (1-{count})"))
        .default(1)
        .validate_with(|v: &u32| check_bound(*v, 1, count))
        .interact_text()?;

    let end: u32 = Input::new()
        .with_prompt(format!("Last verse ({start}-{count})"))
        .default(start)
        .validate_with(|v: &u32| check_bound(*v, start, count))
        .interact_text()?;

    Ok((start, end))
}

fn check_bound(value: u32, low: u32, high: u32) -> Result<(), String> {
    if (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(format!("Enter a number between {low} and {high}"))
    }
}

fn select_resolution(current: ResolutionPreset) -> anyhow::Result<ResolutionPreset> {
    let presets = [
        ("Standard", "720x1280, faster", ResolutionPreset::Standard),
        ("High", "1080x1920, full HD", ResolutionPreset::High),
    ];

    let items: Vec<String> = presets
        .iter()
        .map(|(name, desc, _)| format!("{} - {}", name, desc))
        .collect();
    let default = presets.iter().position(|(_, _, p)| *p == current).unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select quality")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(presets[selection].2)
}

fn format_reciter(reciter: &Reciter) -> String {
    format!("{:>3}. {}", reciter.id, reciter.name)
}

fn format_chapter(chapter: &Chapter) -> String {
    format!(
        "{:>3}. {} ({}) - {} verses",
        chapter.id, chapter.english_name, chapter.name, chapter.verse_count
    )
}

fn print_summary(
    reciter: &Reciter,
    chapter: &Chapter,
    request: &GenerationRequest,
    resolution: ResolutionPreset,
    job_dir: &PathBuf,
) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Reciter:   {}", style(&reciter.name).cyan());
    println!("  Chapter:   {}", style(&chapter.english_name).cyan());
    println!(
        "  Verses:    {}-{}",
        request.start_verse, request.end_verse
    );
    println!("  Quality:   {} ({})", resolution, resolution.resolution());
    println!("  Job:       {}", style(job_dir.display()).cyan());
    println!();
}
