use crate::config::{Config, LLMProvider};
use crate::generator::workflow::LaunchRequest;
use crate::types::citation::CitationStyle;
use crate::types::project::{ProjectId, ProjectInfo};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// thesis-rs - 由Rust与AI驱动的学术论文生成流水线
#[derive(Parser, Debug)]
#[command(name = "thesis-rs")]
#[command(
    about = "AI-based pipeline that researches a topic, outlines a thesis and writes it section by section under source-count and word-count guardrails."
)]
#[command(version)]
pub struct Args {
    /// 论文主题，与--project-id同时给出时用于登记新项目
    #[arg(short, long)]
    pub topic: Option<String>,

    /// 引用格式 (apa, mla, chicago, harvard, ieee, vancouver)
    #[arg(short = 's', long, default_value = "apa")]
    pub citation_style: String,

    /// 项目编号；只给出编号时运行已登记的项目
    #[arg(short = 'i', long)]
    pub project_id: Option<ProjectId>,

    /// 配置文件路径
    #[arg(short, long, default_value = "thesis.toml")]
    pub config: PathBuf,

    /// 输出路径
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 项目存储目录
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// 最少来源数
    #[arg(long)]
    pub min_sources: Option<usize>,

    /// 检索轮次上限
    #[arg(long)]
    pub max_research_attempts: Option<u32>,

    /// 全文目标字数
    #[arg(long)]
    pub target_words: Option<u32>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 高能效模型，用于来源分析与大纲等常规推理任务
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于章节写作，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// Serper搜索API KEY
    #[arg(long)]
    pub serper_api_key: Option<String>,
}

impl Args {
    /// 将CLI参数转换为配置与启动请求
    pub fn into_launch(self) -> Result<(Config, LaunchRequest)> {
        let mut config = if self.config.exists() {
            Config::from_file(&self.config)?
        } else {
            let mut config = Config::default();
            config.tools.apply_env_fallbacks();
            config
        };

        // 覆盖配置文件中的设置
        if let Some(output_path) = self.output_path {
            config.output_path = output_path;
        }
        if let Some(data_dir) = self.data_dir {
            config.sink.data_dir = data_dir;
        }
        if let Some(min_sources) = self.min_sources {
            config.research.min_sources = min_sources;
        }
        if let Some(max_attempts) = self.max_research_attempts {
            config.research.max_attempts = max_attempts;
        }
        if let Some(target_words) = self.target_words {
            config.outline.target_document_words = target_words;
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => warn!("⚠️ 未知的provider: {}，使用默认provider", provider_str),
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(serper_api_key) = self.serper_api_key {
            config.tools.serper_api_key = Some(serper_api_key);
        }
        config.verbose = config.verbose || self.verbose;

        let request = match (self.topic, self.project_id) {
            (Some(topic), project_id) => {
                let citation_style = self
                    .citation_style
                    .parse::<CitationStyle>()
                    .map_err(anyhow::Error::msg)?;
                let info = ProjectInfo::new(topic, citation_style)
                    .context("Invalid project definition")?;
                LaunchRequest::New { project_id, info }
            }
            (None, Some(project_id)) => LaunchRequest::Existing(project_id),
            (None, None) => bail!("either --topic or --project-id is required"),
        };

        Ok((config, request))
    }
}
