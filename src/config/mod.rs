use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 输出路径
    pub output_path: PathBuf,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 调研阶段配置
    pub research: ResearchConfig,

    /// 大纲阶段配置
    pub outline: OutlineConfig,

    /// 写作阶段配置
    pub writing: WritingConfig,

    /// 项目存储配置
    pub sink: SinkConfig,

    /// 外部检索与抓取工具配置
    pub tools: ToolsConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，优先用于来源分析、大纲等常规推理任务
    pub model_efficient: String,

    /// 高质量模型，用于长篇写作，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
}

/// 调研阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResearchConfig {
    /// 接受调研结果所需的最少来源数
    pub min_sources: usize,

    /// 检索轮次上限（含首轮）
    pub max_attempts: u32,

    /// 每条检索语句请求的结果数
    pub results_per_query: usize,

    /// 单轮内并发抓取与分析的候选数
    pub max_parallel_fetches: usize,

    /// 低于该相关度的候选被丢弃
    pub min_relevance_score: f64,

    /// 单个来源正文保留的最大字符数
    pub max_content_chars: usize,
}

/// 大纲阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutlineConfig {
    /// 生成次数上限（含首次）
    pub max_attempts: u32,

    /// 全文目标字数
    pub target_document_words: u32,

    /// 总字数偏离目标的容忍比例，超出则按比例重新分配
    pub balance_tolerance: f64,
}

/// 写作阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WritingConfig {
    /// 单个节点的生成次数上限（含首次）
    pub max_attempts: u32,

    /// 字数上限相对目标的比例，仅作为提示
    pub ceiling_ratio: f64,

    /// 提示词中附带的来源条数
    pub max_sources_in_prompt: usize,

    /// 前文摘要中每个章节保留的字符数
    pub digest_chars: usize,
}

/// 项目存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SinkConfig {
    /// 本地项目存储目录
    pub data_dir: PathBuf,

    /// 写入失败的重试次数（含首次）
    pub retry_attempts: u32,

    /// 首次重试前的等待（毫秒），之后指数增长
    pub retry_delay_ms: u64,
}

/// 外部检索与抓取工具配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    /// Serper搜索API KEY，为空时只使用DuckDuckGo
    pub serper_api_key: Option<String>,

    /// Bright Data Web Unlocker API KEY，为空时直接抓取
    pub bright_data_api_key: Option<String>,

    /// Bright Data zone
    pub bright_data_zone: String,

    /// 单次HTTP请求超时（秒）
    pub request_timeout_seconds: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let mut config: Config =
            toml::from_str(&content).context("Failed to parse config file")?;
        config.tools.apply_env_fallbacks();
        Ok(config)
    }
}

impl ToolsConfig {
    /// 未在配置文件中给出的密钥从环境变量补齐
    pub fn apply_env_fallbacks(&mut self) {
        if self.serper_api_key.as_deref().is_none_or(str::is_empty) {
            self.serper_api_key = non_empty_env("SERPER_API_KEY");
        }
        if self.bright_data_api_key.as_deref().is_none_or(str::is_empty) {
            self.bright_data_api_key = non_empty_env("BRIGHT_DATA_API_KEY");
        }
        if let Some(zone) = non_empty_env("BRIGHT_DATA_ZONE") {
            self.bright_data_zone = zone;
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("./thesis.docs"),
            llm: LLMConfig::default(),
            research: ResearchConfig::default(),
            outline: OutlineConfig::default(),
            writing: WritingConfig::default(),
            sink: SinkConfig::default(),
            tools: ToolsConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("THESIS_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api-inference.modelscope.cn/v1"),
            model_efficient: String::from("Qwen/Qwen3-Next-80B-A3B-Instruct"),
            model_powerful: String::from("Qwen/Qwen3-235B-A22B-Instruct-2507"),
            max_tokens: 131072,
            temperature: 0.3,
            retry_attempts: 5,
            retry_delay_ms: 5000,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            min_sources: 10,
            max_attempts: 3,
            results_per_query: 10,
            max_parallel_fetches: 4,
            min_relevance_score: 0.3,
            max_content_chars: 15000,
        }
    }
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            target_document_words: 10000,
            balance_tolerance: 0.25,
        }
    }
}

impl Default for WritingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            ceiling_ratio: 1.5,
            max_sources_in_prompt: 15,
            digest_chars: 600,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".thesis/projects"),
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            serper_api_key: None,
            bright_data_api_key: None,
            bright_data_zone: String::from("web_unlocker1"),
            request_timeout_seconds: 30,
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
