use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Which detail-view probe to run for each candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// No probing; candidates go to the assembler as extracted.
    None,
    /// Fetch the detail view and read its serialized state and curl sample.
    #[default]
    Light,
    /// Drive a browser through the detail view's tabs.
    Deep,
    /// Deep first, light to fill gaps.
    Ranked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enrichment: EnrichmentMode,
    pub request_timeout_secs: u64,
    pub enrichment_delay_ms: u64,
    pub batch_delay_secs: u64,
    pub max_attempts: u32,
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub page_settle_ms: u64,
    pub tab_settle_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enrichment: EnrichmentMode::Light,
            request_timeout_secs: 10,
            enrichment_delay_ms: 500,
            batch_delay_secs: 5,
            max_attempts: 3,
            output_dir: PathBuf::from("generated_specs"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            page_settle_ms: 3000,
            tab_settle_ms: 1500,
        }
    }
}

impl Settings {
    /// Defaults, then `rapidapi_spec.toml` (or `path`), then `RAPIDSPEC_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("rapidapi_spec").required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("RAPIDSPEC").try_parsing(true))
            .build()
            .context("failed to load settings")?
            .try_deserialize()
            .context("invalid settings")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn tab_settle(&self) -> Duration {
        Duration::from_millis(self.tab_settle_ms)
    }
}
