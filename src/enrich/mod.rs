pub mod interactive;
pub mod light;
pub mod webdriver;

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::config::{EnrichmentMode, Settings};
use crate::locator::ApiLocator;
use crate::model::{ExtractedEndpoint, ParameterSet, ResponseHint};

pub use interactive::{DetailDriver, InteractiveEnricher};
pub use light::LightEnricher;
pub use webdriver::WebDriver;

/// What one probe of a detail view recovered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub parameters: ParameterSet,
    pub responses: Option<ResponseHint>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.responses.is_none()
    }
}

/// A way of recovering parameters and a response hint for one candidate.
///
/// Strategies are interchangeable; the pipeline only sees this trait.
#[allow(async_fn_in_trait)]
pub trait Enricher {
    fn name(&self) -> &'static str;

    async fn enrich(&mut self, endpoint: &ExtractedEndpoint, detail_url: &str) -> Result<Enrichment>;

    /// Release whatever the strategy holds open. Called once per document.
    async fn finish(&mut self) {}
}

/// Enrich candidates one at a time, sleeping `delay` between round-trips.
///
/// A failed probe leaves its candidate as it was. Returns how many
/// candidates gained something.
pub async fn enrich_all<E: Enricher>(
    enricher: &mut E,
    locator: &ApiLocator,
    endpoints: &mut [ExtractedEndpoint],
    delay: Duration,
) -> usize {
    let mut enriched = 0;
    let mut probes = 0;

    for endpoint in endpoints.iter_mut() {
        if !endpoint.needs_enrichment() {
            continue;
        }
        if probes > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        probes += 1;

        let url = locator.detail_url(&endpoint.id);
        match enricher.enrich(endpoint, &url).await {
            Ok(found) if found.is_empty() => {
                debug!(endpoint_id = %endpoint.id, strategy = enricher.name(), "nothing recovered");
            }
            Ok(found) => {
                debug!(
                    endpoint_id = %endpoint.id,
                    strategy = enricher.name(),
                    params = found.parameters.len(),
                    "enriched"
                );
                endpoint.enrich_with(Some(found.parameters), found.responses);
                enriched += 1;
            }
            Err(e) => {
                warn!(endpoint_id = %endpoint.id, url = %url, strategy = enricher.name(), "enrichment failed: {:#}", e);
            }
        }
    }

    enricher.finish().await;
    info!(
        candidates = endpoints.len(),
        probes,
        enriched,
        strategy = enricher.name(),
        "enrichment done"
    );
    enriched
}

/// Runs both strategies; `primary` is authoritative where they overlap.
///
/// The two calls are separate round-trips to the provider, so `delay` is
/// slept between them as well.
pub struct Ranked<P, S> {
    pub primary: P,
    pub secondary: S,
    pub delay: Duration,
}

impl<P: Enricher, S: Enricher> Enricher for Ranked<P, S> {
    fn name(&self) -> &'static str {
        "ranked"
    }

    async fn enrich(&mut self, endpoint: &ExtractedEndpoint, detail_url: &str) -> Result<Enrichment> {
        let primary = match self.primary.enrich(endpoint, detail_url).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(endpoint_id = %endpoint.id, strategy = self.primary.name(), "primary strategy failed: {:#}", e);
                None
            }
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let secondary = match self.secondary.enrich(endpoint, detail_url).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(endpoint_id = %endpoint.id, strategy = self.secondary.name(), "secondary strategy failed: {:#}", e);
                None
            }
        };

        match (primary, secondary) {
            (None, None) => bail!("every strategy failed for {}", endpoint.id),
            (primary, secondary) => Ok(merge_ranked(
                primary.unwrap_or_default(),
                secondary.unwrap_or_default(),
            )),
        }
    }

    async fn finish(&mut self) {
        self.primary.finish().await;
        self.secondary.finish().await;
    }
}

/// Merge by (name, location). The primary's records win outright; the
/// secondary adds parameters the primary never saw and fills missing examples.
pub fn merge_ranked(primary: Enrichment, secondary: Enrichment) -> Enrichment {
    let mut parameters = primary.parameters;
    let extra = secondary.parameters;

    for param in extra.iter().cloned() {
        match parameters.find_mut(&param.name, param.location) {
            Some(existing) => {
                if existing.example.is_none() {
                    existing.example = param.example;
                }
            }
            None => {
                parameters.push(param);
            }
        }
    }
    if parameters.body.is_none() {
        parameters.body = extra.body;
    }
    for (k, v) in extra.app {
        parameters.app.entry(k).or_insert(v);
    }

    Enrichment {
        parameters,
        responses: primary.responses.or(secondary.responses),
    }
}

/// The strategy picked at run time from settings.
pub enum AnyEnricher {
    Light(LightEnricher),
    Deep(InteractiveEnricher<WebDriver>),
    Ranked(Ranked<InteractiveEnricher<WebDriver>, LightEnricher>),
}

impl AnyEnricher {
    /// `None` when enrichment is switched off.
    pub fn for_mode(mode: EnrichmentMode, settings: &Settings) -> Result<Option<Self>> {
        let enricher = match mode {
            EnrichmentMode::None => return Ok(None),
            EnrichmentMode::Light => AnyEnricher::Light(LightEnricher::new(settings)?),
            EnrichmentMode::Deep => {
                AnyEnricher::Deep(InteractiveEnricher::new(WebDriver::new(settings)?))
            }
            EnrichmentMode::Ranked => AnyEnricher::Ranked(Ranked {
                primary: InteractiveEnricher::new(WebDriver::new(settings)?),
                secondary: LightEnricher::new(settings)?,
                delay: settings.enrichment_delay(),
            }),
        };
        Ok(Some(enricher))
    }
}

impl Enricher for AnyEnricher {
    fn name(&self) -> &'static str {
        match self {
            AnyEnricher::Light(e) => e.name(),
            AnyEnricher::Deep(e) => e.name(),
            AnyEnricher::Ranked(e) => e.name(),
        }
    }

    async fn enrich(&mut self, endpoint: &ExtractedEndpoint, detail_url: &str) -> Result<Enrichment> {
        match self {
            AnyEnricher::Light(e) => e.enrich(endpoint, detail_url).await,
            AnyEnricher::Deep(e) => e.enrich(endpoint, detail_url).await,
            AnyEnricher::Ranked(e) => e.enrich(endpoint, detail_url).await,
        }
    }

    async fn finish(&mut self) {
        match self {
            AnyEnricher::Light(e) => e.finish().await,
            AnyEnricher::Deep(e) => e.finish().await,
            AnyEnricher::Ranked(e) => e.finish().await,
        }
    }
}
