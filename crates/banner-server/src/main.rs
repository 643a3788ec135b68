//! Banner generation runner
//!
//! Drives the banner-core service end to end from the command line: submit
//! a job, poll it, auto-approve once review is reached, and write the
//! finished artifacts to an output directory. Also runs the background
//! retention sweeper while the job is in flight.

use anyhow::{anyhow, bail, Context};
use banner_core::{
    ArtifactKey, ArtifactStore, BannerConfig, BannerRequest, BannerService, GeminiProvider,
    JobStatus, LetterSpec, OpenAIProvider, PaletteCatalog, ProviderRegistry,
};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("banner-server")
        .version("1.0.0")
        .about("AI letter banner generator")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path (JSON)"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("NAME")
                .help("Name to spell out on the banner"),
        )
        .arg(
            Arg::new("letters")
                .long("letters")
                .value_name("SPEC")
                .help("Per-letter themes as GLYPH:THEME pairs, comma separated (e.g. 'L:lighthouse,O:octopus')"),
        )
        .arg(
            Arg::new("theme")
                .long("theme")
                .value_name("THEME")
                .help("Overarching theme; per-letter variations are suggested by the provider when --letters is omitted"),
        )
        .arg(
            Arg::new("palette")
                .long("palette")
                .value_name("PALETTE")
                .default_value("bright_blue")
                .help("Color palette key"),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .value_name("PROVIDER")
                .default_value("gemini")
                .help("Image provider (openai or gemini)"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .value_name("DIR")
                .default_value("output")
                .help("Directory for the finished banner and document"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .default_value("data/artifacts")
                .help("Artifact storage directory"),
        )
        .arg(
            Arg::new("poll-ms")
                .long("poll-ms")
                .value_name("MS")
                .default_value("1000")
                .help("Status poll interval in milliseconds"),
        )
        .arg(
            Arg::new("list-palettes")
                .long("list-palettes")
                .help("Print the available color palettes and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let palettes = PaletteCatalog::builtin();
    if matches.get_flag("list-palettes") {
        for name in palettes.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = load_config(matches.get_one::<String>("config").map(String::as_str))?;

    let mut registry = ProviderRegistry::new();
    if !config.openai.api_key.is_empty() {
        registry.register(Arc::new(OpenAIProvider::new(config.openai.clone())));
    }
    if !config.gemini.api_key.is_empty() {
        registry.register(Arc::new(GeminiProvider::new(config.gemini.clone())));
    }

    let data_dir = matches.get_one::<String>("data-dir").unwrap();
    let artifacts = ArtifactStore::new(data_dir)?;
    log::info!("Using artifact directory: {}", data_dir);

    let service = BannerService::new(&config, registry, palettes, artifacts);

    // Background retention sweeper
    let sweeper = service.clone();
    let sweep_interval = Duration::from_secs(config.jobs.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweeper.sweep(chrono::Utc::now()).await;
        }
    });

    let name = matches
        .get_one::<String>("name")
        .ok_or_else(|| anyhow!("--name is required"))?;
    let provider = matches.get_one::<String>("provider").unwrap();
    let palette = matches.get_one::<String>("palette").unwrap();

    let letters = match matches.get_one::<String>("letters") {
        Some(spec) => parse_letters(spec)?,
        None => {
            let theme = matches.get_one::<String>("theme").ok_or_else(|| {
                anyhow!("Either --letters or --theme is required")
            })?;
            log::info!("Requesting theme suggestions for '{}' from {}", name, provider);
            let letters = service.suggest_themes(provider, name, theme).await?;
            for letter in &letters {
                log::info!("  {} -> {}", letter.glyph, letter.theme);
            }
            letters
        }
    };

    let job_id = service
        .submit(BannerRequest {
            name: name.clone(),
            letters,
            color_palette: palette.clone(),
            provider: provider.clone(),
        })
        .await?;
    log::info!("Submitted job {}", job_id);

    let poll_ms: u64 = matches
        .get_one::<String>("poll-ms")
        .unwrap()
        .parse()
        .context("--poll-ms must be a number")?;

    // Poll until the letters are done, then approve and poll to completion
    let mut last_step = String::new();
    loop {
        let report = service.status(job_id).await?;
        if report.current_step != last_step {
            log::info!("[{:>3}%] {}", report.progress, report.current_step);
            last_step = report.current_step.clone();
        }
        match report.status {
            JobStatus::ReadyForReview => {
                log::info!("All letters generated, approving");
                service.approve(job_id).await?;
            }
            JobStatus::Completed => break,
            JobStatus::Failed => {
                bail!(
                    "Job failed: {}",
                    report.error_message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobStatus::Cancelled => bail!("Job was cancelled"),
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }

    let report = service.status(job_id).await?;
    log::info!(
        "Job complete: {} generation calls, {} edits, ${:.2} total",
        report.cost_info.generation_calls,
        report.cost_info.edit_calls,
        report.cost_info.total_usd
    );

    let output_dir = matches.get_one::<String>("output-dir").unwrap();
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir))?;

    save_artifact(&service, job_id, &ArtifactKey::Banner, output_dir, "banner.png").await?;
    save_artifact(&service, job_id, &ArtifactKey::Document, output_dir, "letters.pdf").await?;
    for index in 0..report.total_letters {
        let filename = format!("letter_{}.png", index + 1);
        save_artifact(&service, job_id, &ArtifactKey::Letter(index), output_dir, &filename)
            .await?;
    }

    log::info!("Artifacts written to {}", output_dir);
    Ok(())
}

/// Load config from the given file, falling back to defaults, with API keys
/// taken from OPENAI_API_KEY / GEMINI_API_KEY when the file leaves them unset
fn load_config(path: Option<&str>) -> anyhow::Result<BannerConfig> {
    let mut config: BannerConfig = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path))?
        }
        None => serde_json::from_str("{}").expect("empty config parses"),
    };

    if config.openai.api_key.is_empty() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai.api_key = key;
        }
    }
    if config.gemini.api_key.is_empty() {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini.api_key = key;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Parse "L:lighthouse,O:octopus" into letter specs
fn parse_letters(spec: &str) -> anyhow::Result<Vec<LetterSpec>> {
    spec.split(',')
        .map(|pair| {
            let (glyph, theme) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("Invalid letter spec '{}', expected GLYPH:THEME", pair))?;
            let glyph = glyph.trim();
            if glyph.chars().count() != 1 {
                bail!("Invalid glyph '{}', expected a single letter", glyph);
            }
            let glyph = glyph.chars().next().unwrap();
            Ok(LetterSpec::new(glyph, theme.trim()))
        })
        .collect()
}

async fn save_artifact(
    service: &BannerService,
    job_id: banner_core::JobId,
    key: &ArtifactKey,
    output_dir: &str,
    filename: &str,
) -> anyhow::Result<()> {
    let (bytes, _) = service.download(job_id, key).await?;
    let path = Path::new(output_dir).join(filename);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
