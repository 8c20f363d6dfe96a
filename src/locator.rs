use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static LISTING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rapidapi\.com/([^/]+)/api/([^/?#]+)").unwrap());

/// A marketplace listing URL split into its provider and API name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLocator {
    pub provider: String,
    pub api_name: String,
    /// The URL as supplied by the caller.
    pub url: String,
    /// Listing root without any `/playground` suffix, query or trailing slash.
    pub base: String,
}

impl ApiLocator {
    pub fn parse(url: &str) -> Result<Self, Error> {
        let url = url.trim();
        let caps = LISTING_RE
            .captures(url)
            .ok_or_else(|| Error::UnrecognizedLocator { url: url.to_string() })?;

        let provider = caps[1].to_string();
        let api_name = caps[2].trim_end_matches('/').to_string();
        if provider.is_empty() || api_name.is_empty() {
            return Err(Error::UnrecognizedLocator { url: url.to_string() });
        }

        let end = caps.get(2).map_or(url.len(), |m| m.end());
        let base = if url.starts_with("http://") || url.starts_with("https://") {
            url[..end].to_string()
        } else {
            format!("https://{}", &url[..end])
        };

        Ok(ApiLocator {
            provider,
            api_name,
            url: url.to_string(),
            base,
        })
    }

    /// Per-endpoint detail view, where parameters are rendered.
    pub fn detail_url(&self, endpoint_id: &str) -> String {
        format!("{}/playground/{}", self.base, endpoint_id)
    }

    pub fn host(&self) -> String {
        format!("{}.p.rapidapi.com", self.api_name)
    }

    pub fn default_server(&self) -> String {
        format!("https://{}", self.host())
    }

    /// `job-search_api` -> `Job Search Api`
    pub fn display_title(&self) -> String {
        self.api_name
            .split(['-', '_'])
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// File-system friendly name for generated artifacts.
    pub fn slug(&self) -> String {
        self.api_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }
}
