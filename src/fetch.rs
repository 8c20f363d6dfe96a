use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::config::Settings;
use crate::model::RawDocument;

/// HTTP client with the configured per-request timeout and browser user agent.
pub fn client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .user_agent(settings.user_agent.as_str())
        .build()
        .context("failed to build HTTP client")
}

/// GET `url` as text. Non-2xx statuses are errors.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("bad status from {}", url))?;
    response
        .text()
        .await
        .with_context(|| format!("failed to read body of {}", url))
}

pub async fn fetch_document(client: &Client, url: &str) -> Result<RawDocument> {
    let start = Instant::now();
    let text = fetch_text(client, url).await?;
    info!(
        url,
        bytes = text.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "fetched document"
    );
    Ok(RawDocument::new(url, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_with_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/api/jobs"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let client = client(&Settings::default()).unwrap();
        let url = format!("{}/acme/api/jobs", server.uri());
        let doc = fetch_document(&client, &url).await.unwrap();
        assert_eq!(doc.text, "<html>ok</html>");
        assert_eq!(doc.locator, url);
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client(&Settings::default()).unwrap();
        let err = fetch_text(&client, &format!("{}/x", server.uri())).await.unwrap_err();
        assert!(format!("{:#}", err).contains("429"));
    }
}
