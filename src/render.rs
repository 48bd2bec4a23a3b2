//! Screenshot server client for visual judging.
//!
//! Rendering is optional evidence: every failure here degrades to `None`
//! and judging carries on without the image.

use crate::config::RenderConfig;
use crate::error::{Result, SkillEvalError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

static HTML_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:html|HTML)?\s*\n?(.*?)```").expect("valid regex"));
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!DOCTYPE\s+html.*").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<html.*").expect("valid regex"));

/// Turns HTML into a base64 PNG, or nothing.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, html: &str) -> Option<String>;
}

/// Renderer used when no visual evidence is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

#[async_trait]
impl Renderer for NoRenderer {
    async fn render(&self, _html: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Serialize)]
struct ScreenshotRequest<'a> {
    html: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct ScreenshotResponse {
    screenshot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: Option<String>,
    #[serde(default)]
    browser: Option<String>,
    #[serde(default, rename = "browserRunning")]
    browser_running: Option<bool>,
}

/// Result of probing the screenshot server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub status: Option<String>,
    pub browser_running: bool,
    pub error: Option<String>,
}

impl HealthStatus {
    fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            status: None,
            browser_running: false,
            error: Some(error.into()),
        }
    }
}

/// HTTP client for the screenshot server.
#[derive(Clone)]
pub struct ScreenshotClient {
    client: Client,
    config: RenderConfig,
}

impl ScreenshotClient {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), route)
    }

    /// Capture one screenshot, surfacing the failure reason.
    pub async fn capture(&self, content: &str) -> Result<String> {
        let html = extract_html(content);
        let response = self
            .client
            .post(self.url("screenshot"))
            .json(&ScreenshotRequest {
                html,
                width: self.config.width,
                height: self.config.height,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SkillEvalError::Render(format!(
                "screenshot server returned {}",
                status
            )));
        }

        let body: ScreenshotResponse = response.json().await?;
        body.screenshot
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SkillEvalError::Render("response had no screenshot".to_string()))
    }

    /// Probe `/health`; anything but a timely 2xx counts as unavailable.
    pub async fn health(&self) -> HealthStatus {
        let timeout = Duration::from_secs(self.config.health_timeout_secs);
        let probe = self.client.get(self.url("health")).timeout(timeout).send();

        let response = match probe.await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return HealthStatus::unavailable("Connection timeout"),
            Err(e) => return HealthStatus::unavailable(e.to_string()),
        };

        if !response.status().is_success() {
            return HealthStatus::unavailable(format!("Server returned {}", response.status()));
        }

        match response.json::<HealthResponse>().await {
            Ok(body) => HealthStatus {
                available: true,
                browser_running: body
                    .browser_running
                    .unwrap_or_else(|| body.browser.as_deref() == Some("running")),
                status: body.status,
                error: None,
            },
            Err(e) => HealthStatus::unavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl Renderer for ScreenshotClient {
    async fn render(&self, html: &str) -> Option<String> {
        match self.capture(html).await {
            Ok(png) => Some(png),
            Err(e) => {
                warn!(error = %e, "screenshot capture failed");
                None
            }
        }
    }
}

/// Pull the HTML document out of a model reply.
///
/// Tries a fenced block, then `<!DOCTYPE html`, then `<html`, and finally
/// falls back to the raw content.
pub fn extract_html(content: &str) -> &str {
    if let Some(block) = HTML_BLOCK.captures(content).and_then(|c| c.get(1)) {
        let extracted = block.as_str().trim();
        if extracted.contains('<') && extracted.contains('>') {
            return extracted;
        }
    }

    if let Some(m) = DOCTYPE.find(content) {
        return m.as_str().trim();
    }

    if let Some(m) = HTML_TAG.find(content) {
        return m.as_str().trim();
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ScreenshotClient {
        ScreenshotClient::new(RenderConfig {
            url: server.uri(),
            ..Default::default()
        })
    }

    #[test]
    fn test_extract_html_variants() {
        assert_eq!(
            extract_html("Here you go:\n```html\n<div>hi</div>\n```\nEnjoy"),
            "<div>hi</div>"
        );
        assert_eq!(
            extract_html("Sure! <!DOCTYPE html><html><body></body></html>"),
            "<!DOCTYPE html><html><body></body></html>"
        );
        assert_eq!(extract_html("text <html><p>x</p></html>"), "<html><p>x</p></html>");
        assert_eq!(extract_html("<p>raw</p>"), "<p>raw</p>");
        assert_eq!(extract_html("no markup"), "no markup");
    }

    #[test]
    fn test_fenced_block_without_markup_is_skipped() {
        let content = "```\nplain words\n```\n<html><b>x</b></html>";
        assert_eq!(extract_html(content), "<html><b>x</b></html>");
    }

    #[tokio::test]
    async fn test_render_posts_extracted_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screenshot"))
            .and(body_partial_json(serde_json::json!({
                "html": "<div>hi</div>",
                "width": 1200,
                "height": 800
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"screenshot": "iVBOR"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let png = client.render("```html\n<div>hi</div>\n```").await;
        assert_eq!(png.as_deref(), Some("iVBOR"));
    }

    #[tokio::test]
    async fn test_render_failure_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screenshot"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.render("<p>x</p>").await.is_none());
        assert!(matches!(
            client.capture("<p>x</p>").await,
            Err(SkillEvalError::Render(_))
        ));
    }

    #[tokio::test]
    async fn test_health_reads_browser_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok", "browser": "running"})),
            )
            .mount(&server)
            .await;

        let health = client_for(&server).health().await;
        assert!(health.available);
        assert!(health.browser_running);
        assert_eq!(health.status.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let client = ScreenshotClient::new(RenderConfig {
            url: "http://127.0.0.1:9".to_string(),
            health_timeout_secs: 1,
            ..Default::default()
        });
        let health = client.health().await;
        assert!(!health.available);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_no_renderer() {
        assert!(NoRenderer.render("<p>x</p>").await.is_none());
    }
}
