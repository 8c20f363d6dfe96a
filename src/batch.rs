use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::enrich::{AnyEnricher, Enricher};
use crate::locator::ApiLocator;
use crate::pipeline::Pipeline;
use crate::spec::CanonicalApiSpec;

/// One listing to process, optionally with the file name to write it under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BatchItem {
    pub fn new(url: impl Into<String>) -> Self {
        BatchItem {
            url: url.into(),
            name: None,
        }
    }
}

pub fn read_items(path: &Path) -> Result<Vec<BatchItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    parse_items(&text).with_context(|| format!("bad URL list {}", path.display()))
}

/// A JSON array of `{url, name?}`, JSON Lines of the same, or one URL per line.
pub fn parse_items(text: &str) -> Result<Vec<BatchItem>> {
    let text = text.trim();
    if text.starts_with('[') {
        return serde_json::from_str(text).context("invalid JSON array");
    }
    if text.starts_with('{') {
        return text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, l)| {
                serde_json::from_str(l).with_context(|| format!("invalid JSON on line {}", i + 1))
            })
            .collect();
    }
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && l.starts_with("http"))
        .map(BatchItem::new)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub url: String,
    pub name: Option<String>,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub attempts: u32,
    pub output: Option<PathBuf>,
    pub operations: usize,
}

impl ItemResult {
    fn skipped(item: &BatchItem) -> Self {
        ItemResult {
            url: item.url.clone(),
            name: item.name.clone(),
            status: ItemStatus::Skipped,
            error: None,
            attempts: 0,
            output: None,
            operations: 0,
        }
    }
}

/// Running tally of a batch run. A report can be taken at any point.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub started_at: DateTime<Local>,
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ItemResult>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        BatchProgress {
            started_at: Local::now(),
            total,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            items: Vec::with_capacity(total),
        }
    }

    pub fn record(&mut self, result: ItemResult) {
        match result.status {
            ItemStatus::Success => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            ItemStatus::Failed => {
                self.attempted += 1;
                self.failed += 1;
            }
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.items.push(result);
    }

    pub fn report(&self) -> BatchReport {
        let finished_at = Local::now();
        BatchReport {
            started_at: self.started_at,
            finished_at,
            elapsed_secs: (finished_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            total: self.total,
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            results: self.items.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<ItemResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutput {
    pub output: PathBuf,
    pub operations: usize,
}

/// Turns one item into an artifact on disk.
#[allow(async_fn_in_trait)]
pub trait ItemProcessor {
    async fn process(&mut self, item: &BatchItem) -> Result<ItemOutput>;
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub delay: Duration,
    /// Attempts per item, first one included.
    pub max_attempts: u32,
    /// Items to skip from the front of the list.
    pub start_from: usize,
}

impl BatchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        BatchOptions {
            output_dir: settings.output_dir.clone(),
            delay: settings.batch_delay(),
            max_attempts: settings.max_attempts,
            start_from: 0,
        }
    }
}

pub struct BatchOutcome {
    pub progress: BatchProgress,
    pub report_path: PathBuf,
}

/// Process items one at a time, retrying failures, then persist the report.
///
/// A failing item never stops the run.
pub async fn run_batch<P: ItemProcessor>(
    processor: &mut P,
    items: &[BatchItem],
    opts: &BatchOptions,
) -> Result<BatchOutcome> {
    let mut progress = BatchProgress::new(items.len());
    let start = opts.start_from.min(items.len());
    for item in &items[..start] {
        progress.record(ItemResult::skipped(item));
    }
    if start > 0 {
        info!(skipped = start, "skipping items already processed");
    }

    let pending = &items[start..];
    info!(
        total = items.len(),
        pending = pending.len(),
        delay_secs = opts.delay.as_secs_f64(),
        max_attempts = opts.max_attempts,
        "batch started"
    );

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    for (i, item) in pending.iter().enumerate() {
        if i > 0 {
            pause(opts.delay).await;
        }
        let result = process_with_retry(processor, item, opts).await;
        progress.record(result);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let report_path = write_report(&progress.report(), &opts.output_dir)?;
    info!(
        succeeded = progress.succeeded,
        failed = progress.failed,
        skipped = progress.skipped,
        report = %report_path.display(),
        "batch finished"
    );
    Ok(BatchOutcome {
        progress,
        report_path,
    })
}

async fn process_with_retry<P: ItemProcessor>(
    processor: &mut P,
    item: &BatchItem,
    opts: &BatchOptions,
) -> ItemResult {
    let max_attempts = opts.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match processor.process(item).await {
            Ok(out) => {
                info!(url = %item.url, attempt, operations = out.operations, "item done");
                return ItemResult {
                    url: item.url.clone(),
                    name: item.name.clone(),
                    status: ItemStatus::Success,
                    error: None,
                    attempts: attempt,
                    output: Some(out.output),
                    operations: out.operations,
                };
            }
            Err(e) => {
                warn!(url = %item.url, attempt, max_attempts, "item failed: {:#}", e);
                last_error = Some(format!("{:#}", e));
                if attempt < max_attempts {
                    pause(opts.delay).await;
                }
            }
        }
    }

    ItemResult {
        url: item.url.clone(),
        name: item.name.clone(),
        status: ItemStatus::Failed,
        error: last_error,
        attempts: max_attempts,
        output: None,
        operations: 0,
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Write `batch_report_<timestamp>.json` into `dir`.
pub fn write_report(report: &BatchReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!(
        "batch_report_{}.json",
        report.finished_at.format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Writes specs as pretty JSON under one directory.
#[derive(Debug, Clone)]
pub struct SpecWriter {
    dir: PathBuf,
}

impl SpecWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SpecWriter { dir: dir.into() }
    }

    pub fn write(&self, spec: &CanonicalApiSpec, stem: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.json", file_stem(stem)));
        std::fs::write(&path, spec.to_json_pretty()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "api".to_string()
    } else {
        stem
    }
}

/// Fetch, extract and write each item through a [`Pipeline`].
pub struct PipelineProcessor<E = AnyEnricher> {
    pipeline: Pipeline<E>,
    writer: SpecWriter,
}

impl<E: Enricher> PipelineProcessor<E> {
    pub fn new(pipeline: Pipeline<E>, writer: SpecWriter) -> Self {
        PipelineProcessor { pipeline, writer }
    }
}

impl<E: Enricher> ItemProcessor for PipelineProcessor<E> {
    async fn process(&mut self, item: &BatchItem) -> Result<ItemOutput> {
        let locator = ApiLocator::parse(&item.url)?;
        let spec = self.pipeline.fetch_and_extract(&item.url).await?;
        if spec.operation_count() == 0 {
            bail!("no operations assembled for {}", item.url);
        }
        let stem = item.name.clone().unwrap_or_else(|| locator.slug());
        let output = self.writer.write(&spec, &stem)?;
        Ok(ItemOutput {
            output,
            operations: spec.operation_count(),
        })
    }
}
