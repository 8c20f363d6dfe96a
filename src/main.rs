use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use rapidapi_spec::batch::{self, BatchOptions, ItemStatus, PipelineProcessor, SpecWriter};
use rapidapi_spec::config::{EnrichmentMode, Settings};
use rapidapi_spec::parser::process_document;
use rapidapi_spec::{spec, ApiLocator, Pipeline, RawDocument};

#[derive(Parser)]
#[command(name = "rapidapi_spec", about = "Recover OpenAPI specs from RapidAPI listing pages")]
struct Cli {
    /// Settings file (default: ./rapidapi_spec.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the spec for one listing
    Extract {
        /// Listing URL, e.g. https://rapidapi.com/<provider>/api/<name>
        url: String,
        /// Read a saved page instead of fetching the listing
        #[arg(long)]
        html: Option<PathBuf>,
        /// Write the spec here (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        mode: Option<EnrichmentMode>,
    },
    /// Show what a saved page yields, without enrichment
    Inspect {
        html: PathBuf,
        /// Listing URL the page came from; also prints the assembled operation keys
        #[arg(long)]
        url: Option<String>,
    },
    /// Process a list of listings one at a time
    Batch {
        /// URL list: JSON array, JSON Lines, or one URL per line
        urls: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        mode: Option<EnrichmentMode>,
        /// Seconds between items and between retries
        #[arg(short, long)]
        delay: Option<u64>,
        /// Attempts per item
        #[arg(short, long)]
        retries: Option<u32>,
        /// Skip this many items from the start of the list
        #[arg(long, default_value = "0")]
        start_from: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let log_file = match &cli.command {
        Commands::Batch { output_dir, .. } => {
            let dir = output_dir.clone().unwrap_or_else(|| settings.output_dir.clone());
            Some(batch_log_file(&dir)?)
        }
        _ => None,
    };
    init_tracing(log_file);

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Extract {
            url,
            html,
            output,
            mode,
        } => {
            if let Some(mode) = mode {
                settings.enrichment = mode;
            }
            let mut pipeline = Pipeline::from_settings(&settings)?;
            let spec = match html {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    pipeline.extract(&RawDocument::new(url.as_str(), text)).await?
                }
                None => pipeline.fetch_and_extract(&url).await?,
            };
            let json = spec.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!(
                        "Wrote {} ({} operations on {} routes)",
                        path.display(),
                        spec.operation_count(),
                        spec.paths.len()
                    );
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Inspect { html, url } => inspect(&html, url.as_deref()),
        Commands::Batch {
            urls,
            output_dir,
            mode,
            delay,
            retries,
            start_from,
        } => {
            if let Some(mode) = mode {
                settings.enrichment = mode;
            }
            if let Some(dir) = output_dir {
                settings.output_dir = dir;
            }
            if let Some(secs) = delay {
                settings.batch_delay_secs = secs;
            }
            if let Some(n) = retries {
                settings.max_attempts = n;
            }

            let items = batch::read_items(&urls)?;
            if items.is_empty() {
                println!("No URLs found in {}.", urls.display());
                return Ok(());
            }
            println!(
                "Processing {} listings (mode {:?}, {}s delay, {} attempts)...",
                items.len().saturating_sub(start_from),
                settings.enrichment,
                settings.batch_delay_secs,
                settings.max_attempts
            );

            let pipeline = Pipeline::from_settings(&settings)?;
            let mut processor =
                PipelineProcessor::new(pipeline, SpecWriter::new(&settings.output_dir));
            let opts = BatchOptions {
                start_from,
                ..BatchOptions::from_settings(&settings)
            };
            let outcome = batch::run_batch(&mut processor, &items, &opts).await?;
            let p = &outcome.progress;

            println!(
                "Done: {} attempted ({} ok, {} failed, {} skipped).",
                p.attempted, p.succeeded, p.failed, p.skipped
            );
            let failed: Vec<_> = p
                .items
                .iter()
                .filter(|r| r.status == ItemStatus::Failed)
                .collect();
            if !failed.is_empty() {
                println!("\n--- Failed ---");
                for r in &failed {
                    println!(
                        "  {}: {}",
                        truncate(&r.url, 60),
                        r.error.as_deref().unwrap_or("-")
                    );
                }
            }
            println!("Report: {}", outcome.report_path.display());

            if p.failed > 0 {
                bail!("{} of {} listings failed", p.failed, p.attempted);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn init_tracing(log_file: Option<File>) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match log_file {
        Some(file) => tracing_subscriber::registry()
            .with(filter())
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init(),
        None => tracing_subscriber::fmt().with_env_filter(filter()).init(),
    }
}

fn batch_log_file(dir: &Path) -> anyhow::Result<File> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!(
        "batch_rapidapi_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    File::create(&path).with_context(|| format!("failed to create {}", path.display()))
}

fn inspect(html: &Path, url: Option<&str>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(html)
        .with_context(|| format!("failed to read {}", html.display()))?;
    let doc = RawDocument::new(url.unwrap_or_default(), text);
    let (blocks, extraction) = process_document(&doc);

    println!("Decoded blocks: {}", blocks.len());
    if extraction.is_empty() {
        println!("No endpoint records found; the fallback spec would be emitted.");
    } else {
        println!(
            "\n{:>3} | {:<22} | {:<7} | {:<32} | {:<28}",
            "#", "Id", "Method", "Route", "Name"
        );
        println!("{}", "-".repeat(104));
        for (i, e) in extraction.endpoints.iter().enumerate() {
            println!(
                "{:>3} | {:<22} | {:<7} | {:<32} | {:<28}",
                i + 1,
                truncate(&e.id, 22),
                e.method,
                truncate(&e.route, 32),
                truncate(&e.name, 28)
            );
        }
    }

    let m = &extraction.metadata;
    println!("\n--- Metadata ---");
    println!("Name:        {}", m.name.as_deref().unwrap_or("-"));
    println!("Description: {}", truncate(m.description.as_deref().unwrap_or("-"), 80));
    println!("Base URL:    {}", m.base_url.as_deref().unwrap_or("-"));
    println!("Version:     {}", m.version.as_deref().unwrap_or("-"));

    if let Some(url) = url {
        let locator = ApiLocator::parse(url)?;
        let spec = if extraction.is_empty() {
            spec::fallback(&locator)
        } else {
            spec::assemble(&locator, m, &extraction.endpoints)
        };
        println!("\n--- Operations ---");
        for (route, key, op) in spec.operations() {
            println!("  {:<16} {:<32} {}", key, truncate(route, 32), op.operation_id);
        }
        println!("\n{} operations | server: {}", spec.operation_count(), spec.server_url().unwrap_or("-"));
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
