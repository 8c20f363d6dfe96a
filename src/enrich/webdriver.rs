use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::interactive::DetailDriver;
use crate::config::Settings;

/// W3C key under which element references travel.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Minimal W3C WebDriver client (chromedriver and friends) over HTTP.
///
/// The browser session is created on the first `open` and deleted by `close`.
pub struct WebDriver {
    client: Client,
    endpoint: String,
    headless: bool,
    user_agent: String,
    page_settle: Duration,
    tab_settle: Duration,
    session: Option<String>,
}

impl WebDriver {
    pub fn new(settings: &Settings) -> Result<Self> {
        // Session creation starts a browser, which can take longer than a page fetch.
        let client = Client::builder()
            .timeout(settings.request_timeout() * 6)
            .build()
            .context("failed to build WebDriver HTTP client")?;
        Ok(WebDriver {
            client,
            endpoint: settings.webdriver_url.trim_end_matches('/').to_string(),
            headless: settings.headless,
            user_agent: settings.user_agent.clone(),
            page_settle: settings.page_settle(),
            tab_settle: settings.tab_settle(),
            session: None,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--user-agent={}", self.user_agent),
        ];
        if self.headless {
            args.insert(0, "--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }

    async fn ensure_session(&mut self) -> Result<String> {
        if let Some(id) = &self.session {
            return Ok(id.clone());
        }
        let value = self
            .command(Method::POST, "/session", Some(self.capabilities()))
            .await
            .context("failed to start browser session")?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("WebDriver returned no sessionId"))?
            .to_string();
        info!(session = %id, endpoint = %self.endpoint, "browser session started");
        self.session = Some(id.clone());
        Ok(id)
    }

    fn active_session(&self) -> Result<&str> {
        self.session
            .as_deref()
            .ok_or_else(|| anyhow!("no browser session open"))
    }

    /// Send one command and unwrap the `value` member of the reply.
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("WebDriver request to {} failed", url))?;
        let status = response.status();
        let mut reply: Value = response
            .json()
            .await
            .with_context(|| format!("unreadable WebDriver reply from {}", url))?;
        let value = reply.get_mut("value").map(Value::take).unwrap_or(Value::Null);

        if !status.is_success() {
            let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            let message = value.get("message").and_then(Value::as_str).unwrap_or("");
            bail!("WebDriver {} ({}): {}", error, status, message);
        }
        Ok(value)
    }
}

impl DetailDriver for WebDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        let session = self.ensure_session().await?;
        self.command(
            Method::POST,
            &format!("/session/{}/url", session),
            Some(json!({ "url": url })),
        )
        .await?;
        tokio::time::sleep(self.page_settle).await;
        Ok(())
    }

    async fn select_tab(&mut self, label: &str) -> Result<bool> {
        let session = self.active_session()?.to_string();
        let xpath = format!("//*[contains(text(), '{}') and @role='tab']", label);
        let found = self
            .command(
                Method::POST,
                &format!("/session/{}/elements", session),
                Some(json!({ "using": "xpath", "value": xpath })),
            )
            .await?;

        let ids: Vec<String> = found
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        for id in ids {
            let displayed = self
                .command(
                    Method::GET,
                    &format!("/session/{}/element/{}/displayed", session, id),
                    None,
                )
                .await?;
            if displayed.as_bool() != Some(true) {
                continue;
            }
            self.command(
                Method::POST,
                &format!("/session/{}/execute/sync", session),
                Some(json!({
                    "script": "arguments[0].click();",
                    "args": [{ ELEMENT_KEY: id }]
                })),
            )
            .await?;
            debug!(tab = label, "tab clicked");
            tokio::time::sleep(self.tab_settle).await;
            return Ok(true);
        }
        Ok(false)
    }

    async fn page_source(&mut self) -> Result<String> {
        let session = self.active_session()?.to_string();
        let value = self
            .command(Method::GET, &format!("/session/{}/source", session), None)
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("page source was not a string"))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.command(Method::DELETE, &format!("/session/{}", session), None)
            .await?;
        info!(session = %session, "browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn driver_for(server: &MockServer) -> WebDriver {
        let settings = Settings {
            webdriver_url: server.uri(),
            page_settle_ms: 0,
            tab_settle_ms: 0,
            ..Settings::default()
        };
        WebDriver::new(&settings).unwrap()
    }

    async fn mount(server: &MockServer, verb: &str, route: &str, value: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn session_lifecycle_and_tab_click() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({"capabilities": {"alwaysMatch": {"browserName": "chrome"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {"sessionId": "s1", "capabilities": {}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount(&server, "POST", "/session/s1/url", Value::Null).await;
        mount(
            &server,
            "POST",
            "/session/s1/elements",
            json!([{ ELEMENT_KEY: "hidden" }, { ELEMENT_KEY: "e1" }]),
        )
        .await;
        mount(&server, "GET", "/session/s1/element/hidden/displayed", json!(false)).await;
        mount(&server, "GET", "/session/s1/element/e1/displayed", json!(true)).await;
        Mock::given(method("POST"))
            .and(path("/session/s1/execute/sync"))
            .and(body_partial_json(json!({"args": [{ ELEMENT_KEY: "e1" }]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;
        mount(&server, "GET", "/session/s1/source", json!("<html>rendered</html>")).await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;

        let mut driver = driver_for(&server);
        driver.open("https://rapidapi.com/a/api/b/playground/endpoint_1").await.unwrap();
        driver.open("https://rapidapi.com/a/api/b/playground/endpoint_2").await.unwrap();
        assert_eq!(driver.session_id(), Some("s1"));
        assert!(driver.select_tab("Params").await.unwrap());
        assert_eq!(driver.page_source().await.unwrap(), "<html>rendered</html>");
        driver.close().await.unwrap();
        assert_eq!(driver.session_id(), None);
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn no_matching_tab() {
        let server = MockServer::start().await;
        mount(&server, "POST", "/session", json!({"sessionId": "s2"})).await;
        mount(&server, "POST", "/session/s2/url", Value::Null).await;
        mount(&server, "POST", "/session/s2/elements", json!([])).await;

        let mut driver = driver_for(&server);
        driver.open("https://rapidapi.com/a/api/b/playground/endpoint_1").await.unwrap();
        assert!(!driver.select_tab("Body").await.unwrap());
    }

    #[tokio::test]
    async fn driver_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {"error": "session not created", "message": "Chrome failed to start"}
            })))
            .mount(&server)
            .await;

        let mut driver = driver_for(&server);
        let err = driver.open("https://rapidapi.com/a/api/b").await.unwrap_err();
        assert!(format!("{:#}", err).contains("session not created"));
        assert!(driver.select_tab("Params").await.is_err());
    }
}
