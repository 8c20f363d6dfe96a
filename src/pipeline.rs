use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::config::Settings;
use crate::enrich::{enrich_all, AnyEnricher, Enricher};
use crate::error::Error;
use crate::fetch;
use crate::locator::ApiLocator;
use crate::model::RawDocument;
use crate::parser::{self, Extraction};
use crate::spec::{self, CanonicalApiSpec};

/// Document in, canonical spec out.
///
/// Decode, extract, enrich (when a strategy is set) and assemble, falling
/// back to a placeholder spec when nothing was recovered. The only failure
/// is a locator that does not name a listing.
pub struct Pipeline<E = AnyEnricher> {
    enricher: Option<E>,
    enrichment_delay: Duration,
    client: Client,
}

impl Pipeline<AnyEnricher> {
    /// Strategy chosen by `settings.enrichment`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Pipeline {
            enricher: AnyEnricher::for_mode(settings.enrichment, settings)?,
            enrichment_delay: settings.enrichment_delay(),
            client: fetch::client(settings)?,
        })
    }

    pub fn without_enrichment(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Pipeline {
            enricher: None,
            enrichment_delay: settings.enrichment_delay(),
            client: fetch::client(settings)?,
        })
    }
}

impl<E: Enricher> Pipeline<E> {
    pub fn with_enricher(enricher: E, settings: &Settings) -> anyhow::Result<Self> {
        Ok(Pipeline {
            enricher: Some(enricher),
            enrichment_delay: settings.enrichment_delay(),
            client: fetch::client(settings)?,
        })
    }

    pub fn enricher(&self) -> Option<&E> {
        self.enricher.as_ref()
    }

    pub async fn extract(&mut self, doc: &RawDocument) -> Result<CanonicalApiSpec, Error> {
        let locator = ApiLocator::parse(&doc.locator)?;

        let (blocks, extraction) = parser::process_document(doc);
        let Extraction {
            mut endpoints,
            metadata,
        } = extraction;
        info!(
            url = %doc.locator,
            blocks = blocks.len(),
            candidates = endpoints.len(),
            "document scanned"
        );

        if endpoints.is_empty() {
            return Ok(spec::fallback(&locator));
        }

        if let Some(enricher) = self.enricher.as_mut() {
            enrich_all(enricher, &locator, &mut endpoints, self.enrichment_delay).await;
        }

        Ok(spec::assemble(&locator, &metadata, &endpoints))
    }

    /// Fetch the listing, then [`extract`](Self::extract) it. The URL is
    /// checked before any request goes out.
    pub async fn fetch_and_extract(&mut self, url: &str) -> anyhow::Result<CanonicalApiSpec> {
        ApiLocator::parse(url)?;
        let doc = fetch::fetch_document(&self.client, url).await?;
        Ok(self.extract(&doc).await?)
    }
}
