use anyhow::Result;
use reqwest::Client;
use tracing::debug;

use super::{Enricher, Enrichment};
use crate::config::Settings;
use crate::fetch;
use crate::model::ExtractedEndpoint;
use crate::parser::blocks::decode;
use crate::parser::params::{declared_parameters, response_hint, sample_invocation, sample_parameters};

/// Fetches each detail view once and reads it like the listing page.
pub struct LightEnricher {
    client: Client,
}

impl LightEnricher {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self::with_client(fetch::client(settings)?))
    }

    pub fn with_client(client: Client) -> Self {
        LightEnricher { client }
    }
}

impl Enricher for LightEnricher {
    fn name(&self) -> &'static str {
        "light"
    }

    async fn enrich(&mut self, endpoint: &ExtractedEndpoint, detail_url: &str) -> Result<Enrichment> {
        let html = fetch::fetch_text(&self.client, detail_url).await?;
        let found = read_detail_page(&html);
        debug!(
            endpoint_id = %endpoint.id,
            bytes = html.len(),
            params = found.parameters.len(),
            "detail view parsed"
        );
        Ok(found)
    }
}

/// Declared records first; the curl sample only adds parameters nobody
/// declared and fills in examples the declarations lack.
pub fn read_detail_page(html: &str) -> Enrichment {
    let blocks = decode(html);
    let mut parameters = declared_parameters(&blocks);

    if let Some(url) = sample_invocation(&blocks, html) {
        for sample in sample_parameters(&url) {
            let declared_at = parameters
                .iter()
                .find(|p| p.name == sample.name)
                .map(|p| p.location);
            match declared_at.and_then(|loc| parameters.find_mut(&sample.name, loc)) {
                Some(declared) => {
                    if declared.example.is_none() {
                        declared.example = sample.example;
                    }
                }
                None => {
                    parameters.push(sample);
                }
            }
        }
    }

    Enrichment {
        parameters,
        responses: response_hint(&blocks),
    }
}
