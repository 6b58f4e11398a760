use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{SearchHit, SearchTool, ToolError};

const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// DuckDuckGo instant answer API，无需密钥
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn parse_hits(body: &Value, limit: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        if let (Some(text), Some(url)) = (
            body.get("AbstractText").and_then(Value::as_str),
            body.get("AbstractURL").and_then(Value::as_str),
        ) && !text.is_empty()
            && !url.is_empty()
        {
            let title = body
                .get("Heading")
                .and_then(Value::as_str)
                .unwrap_or(text)
                .to_string();
            hits.push(SearchHit {
                title,
                url: url.to_string(),
                snippet: text.to_string(),
            });
        }

        for key in ["Results", "RelatedTopics"] {
            if let Some(items) = body.get(key).and_then(Value::as_array) {
                collect_topics(items, &mut hits);
            }
        }

        hits.truncate(limit);
        hits
    }
}

/// RelatedTopics中可能嵌套分组，分组内的Topics同样展开
fn collect_topics(items: &[Value], hits: &mut Vec<SearchHit>) {
    for item in items {
        if let Some(nested) = item.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, hits);
            continue;
        }
        let (Some(text), Some(url)) = (
            item.get("Text").and_then(Value::as_str),
            item.get("FirstURL").and_then(Value::as_str),
        ) else {
            continue;
        };
        if url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text).to_string();
        hits.push(SearchHit {
            title,
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

#[async_trait]
impl SearchTool for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        debug!(query, "duckduckgo search");
        let response = self
            .client
            .get(DUCKDUCKGO_ENDPOINT)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Request {
                tool: "duckduckgo",
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                tool: "duckduckgo",
                status: status.as_u16(),
                url: DUCKDUCKGO_ENDPOINT.to_string(),
            });
        }

        let body: Value = response.json().await.map_err(|e| ToolError::InvalidResponse {
            tool: "duckduckgo",
            message: e.to_string(),
        })?;
        Ok(Self::parse_hits(&body, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_abstract_and_nested_topics() {
        let body = serde_json::json!({
            "Heading": "Remote work",
            "AbstractText": "Remote work is a working arrangement...",
            "AbstractURL": "https://en.wikipedia.org/wiki/Remote_work",
            "RelatedTopics": [
                {"Text": "Telecommuting - working from home", "FirstURL": "https://duckduckgo.com/Telecommuting"},
                {"Name": "Group", "Topics": [
                    {"Text": "Hybrid work - mixed model", "FirstURL": "https://duckduckgo.com/Hybrid_work"}
                ]},
                {"Text": "Missing url"}
            ]
        });
        let hits = DuckDuckGoSearch::parse_hits(&body, 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Remote work");
        assert_eq!(hits[1].title, "Telecommuting");
        assert_eq!(hits[2].url, "https://duckduckgo.com/Hybrid_work");
    }

    #[test]
    fn test_parse_respects_limit() {
        let topics: Vec<Value> = (0..5)
            .map(|i| serde_json::json!({"Text": format!("T{}", i), "FirstURL": format!("https://x.org/{}", i)}))
            .collect();
        let body = serde_json::json!({ "RelatedTopics": topics });
        assert_eq!(DuckDuckGoSearch::parse_hits(&body, 2).len(), 2);
    }
}
