use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ScrapeOutcome, ScrapeTool, ToolError, looks_like_pdf};
use crate::utils::text::{clean_text, html_to_text, truncate_intelligently};

const BRIGHT_DATA_ENDPOINT: &str = "https://api.brightdata.com/request";

/// 网页抓取
///
/// 配置了Bright Data时优先走Web Unlocker，失败后回退为直接请求。
pub struct WebScraper {
    client: reqwest::Client,
    /// (api_key, zone)
    bright_data: Option<(String, String)>,
    max_content_chars: usize,
}

impl WebScraper {
    pub fn new(
        client: reqwest::Client,
        bright_data: Option<(String, String)>,
        max_content_chars: usize,
    ) -> Self {
        Self {
            client,
            bright_data,
            max_content_chars,
        }
    }

    async fn fetch_via_unlocker(
        &self,
        url: &str,
        api_key: &str,
        zone: &str,
    ) -> Result<ScrapeOutcome, ToolError> {
        let response = self
            .client
            .post(BRIGHT_DATA_ENDPOINT)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "zone": zone, "url": url, "format": "raw" }))
            .send()
            .await
            .map_err(|e| ToolError::Request {
                tool: "bright_data",
                message: e.to_string(),
            })?;
        self.read_response(response, url, "bright_data").await
    }

    async fn fetch_direct(&self, url: &str) -> Result<ScrapeOutcome, ToolError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Request {
                tool: "web_scraper",
                message: e.to_string(),
            })?;
        self.read_response(response, url, "web_scraper").await
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
        url: &str,
        tool: &'static str,
    ) -> Result<ScrapeOutcome, ToolError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                tool,
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if content_type.contains("application/pdf") || looks_like_pdf(url) {
            let bytes = response.bytes().await.map_err(|e| ToolError::Request {
                tool,
                message: e.to_string(),
            })?;
            return Ok(ScrapeOutcome::Pdf(bytes.to_vec()));
        }

        let body = response.text().await.map_err(|e| ToolError::Request {
            tool,
            message: e.to_string(),
        })?;
        let text = self.extract(&body, &content_type);
        if text.trim().is_empty() {
            return Err(ToolError::EmptyContent {
                tool,
                url: url.to_string(),
            });
        }
        Ok(ScrapeOutcome::Text(text))
    }

    fn extract(&self, body: &str, content_type: &str) -> String {
        let raw = if content_type.is_empty()
            || content_type.contains("html")
            || body.trim_start().starts_with('<')
        {
            html_to_text(body)
        } else {
            body.to_string()
        };
        truncate_intelligently(&clean_text(&raw), self.max_content_chars)
    }
}

#[async_trait]
impl ScrapeTool for WebScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutcome, ToolError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidResponse {
                tool: "web_scraper",
                message: format!("unsupported url: {}", url),
            });
        }

        if let Some((api_key, zone)) = &self.bright_data {
            match self.fetch_via_unlocker(url, api_key, zone).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => warn!("⚠️ Web Unlocker抓取失败，改为直接请求 {}: {}", url, e),
            }
        }

        debug!(url, "direct fetch");
        self.fetch_direct(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_html_cleans_and_truncates() {
        let scraper = WebScraper::new(reqwest::Client::new(), None, 100);
        let body = "<html><body><nav>Home | About | Contact us today</nav>\
                    <p>Remote work has reshaped the modern office in measurable ways.</p>\
                    <p>Short</p><p>Later studies confirmed the productivity effects across sectors.</p></body></html>";
        let text = scraper.extract(body, "text/html; charset=utf-8");
        assert!(text.starts_with("Remote work has reshaped the modern office in measurable ways."));
        assert!(!text.contains("Contact us"));
        assert!(text.contains("[Content truncated"));
    }

    #[test]
    fn test_extract_plain_text_passthrough() {
        let scraper = WebScraper::new(reqwest::Client::new(), None, 1000);
        let text = scraper.extract("A plain text body that is long enough.", "text/plain");
        assert_eq!(text, "A plain text body that is long enough.");
    }

    #[tokio::test]
    async fn test_scrape_rejects_non_http_urls() {
        let scraper = WebScraper::new(reqwest::Client::new(), None, 1000);
        let result = scraper.scrape("ftp://example.org/file").await;
        assert!(matches!(result, Err(ToolError::InvalidResponse { .. })));
    }
}
