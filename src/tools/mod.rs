//! 外部检索、抓取与PDF提取工具

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ResearchConfig, ToolsConfig};

pub mod duckduckgo;
pub mod pdf_reader;
pub mod serper;
pub mod web_scraper;

pub use duckduckgo::DuckDuckGoSearch;
pub use pdf_reader::PdfReader;
pub use serper::SerperSearch;
pub use web_scraper::WebScraper;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; thesis-rs/0.3; +research)";

/// 工具调用错误，只影响单个候选，不会直接终止调研
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} request failed: {message}")]
    Request { tool: &'static str, message: String },

    #[error("{tool} returned HTTP {status} for {url}")]
    Http {
        tool: &'static str,
        status: u16,
        url: String,
    },

    #[error("{tool} returned an invalid response: {message}")]
    InvalidResponse { tool: &'static str, message: String },

    #[error("{tool} extracted no content from {url}")]
    EmptyContent { tool: &'static str, url: String },
}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 抓取结果：网页正文或待提取的PDF字节
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Text(String),
    Pdf(Vec<u8>),
}

/// PDF提取的输入
#[derive(Debug, Clone, PartialEq)]
pub enum PdfInput {
    Url(String),
    Bytes(Vec<u8>),
}

#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError>;
}

#[async_trait]
pub trait ScrapeTool: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutcome, ToolError>;
}

#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract_pdf(&self, input: PdfInput) -> Result<String, ToolError>;
}

/// URL是否指向PDF
pub fn looks_like_pdf(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_lowercase().ends_with(".pdf")
}

/// 调研阶段使用的工具集合
#[derive(Clone)]
pub struct ResearchTools {
    /// 按优先级排列的检索工具，后续轮次会轮换使用
    pub search: Vec<Arc<dyn SearchTool>>,
    pub scraper: Arc<dyn ScrapeTool>,
    pub pdf: Arc<dyn PdfExtractor>,
}

impl ResearchTools {
    pub fn new(
        search: Vec<Arc<dyn SearchTool>>,
        scraper: Arc<dyn ScrapeTool>,
        pdf: Arc<dyn PdfExtractor>,
    ) -> Self {
        Self {
            search,
            scraper,
            pdf,
        }
    }

    /// 按配置组装真实的网络工具
    pub fn from_config(tools: &ToolsConfig, research: &ResearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(tools.request_timeout_seconds))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let mut search: Vec<Arc<dyn SearchTool>> = Vec::new();
        if let Some(key) = tools.serper_api_key.as_deref().filter(|k| !k.is_empty()) {
            search.push(Arc::new(SerperSearch::new(client.clone(), key)));
        }
        search.push(Arc::new(DuckDuckGoSearch::new(client.clone())));

        let bright_data = tools
            .bright_data_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| (key.to_string(), tools.bright_data_zone.clone()));

        let names: Vec<&str> = search.iter().map(|t| t.name()).collect();
        info!(
            "🧰 检索工具: {:?}，Web Unlocker: {}",
            names,
            if bright_data.is_some() { "启用" } else { "未启用" }
        );

        Ok(Self {
            search,
            scraper: Arc::new(WebScraper::new(
                client.clone(),
                bright_data,
                research.max_content_chars,
            )),
            pdf: Arc::new(PdfReader::new(client, research.max_content_chars)),
        })
    }
}
