use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{SearchHit, SearchTool, ToolError};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Serper (Google) 搜索
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerperSearch {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            endpoint: SERPER_ENDPOINT.to_string(),
        }
    }

    fn parse_hits(body: SerperResponse, limit: usize) -> Vec<SearchHit> {
        body.organic
            .into_iter()
            .filter(|o| !o.link.is_empty())
            .take(limit)
            .map(|o| SearchHit {
                title: o.title,
                url: o.link,
                snippet: o.snippet,
            })
            .collect()
    }
}

#[async_trait]
impl SearchTool for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        debug!(query, "serper search");
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": limit }))
            .send()
            .await
            .map_err(|e| ToolError::Request {
                tool: "serper",
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                tool: "serper",
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body: SerperResponse = response.json().await.map_err(|e| ToolError::InvalidResponse {
            tool: "serper",
            message: e.to_string(),
        })?;
        Ok(Self::parse_hits(body, limit))
    }
}
