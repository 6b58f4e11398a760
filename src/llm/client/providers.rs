//! LLM Provider支持模块

use anyhow::Result;
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Prompt,
    providers::gemini::completion::gemini_api_types::{AdditionalParameters, GenerationConfig},
};

use crate::config::{LLMConfig, LLMProvider};

/// 统一的Provider客户端枚举
#[derive(Clone)]
pub enum ProviderClient {
    OpenAI(rig::providers::openai::Client),
    Moonshot(rig::providers::moonshot::Client),
    DeepSeek(rig::providers::deepseek::Client),
    Mistral(rig::providers::mistral::Client),
    OpenRouter(rig::providers::openrouter::Client),
    Anthropic(rig::providers::anthropic::Client),
    Gemini(rig::providers::gemini::Client),
    Ollama(rig::providers::ollama::Client),
}

impl ProviderClient {
    /// 根据配置创建相应的provider客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        match config.provider {
            LLMProvider::OpenAI => {
                let client = rig::providers::openai::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::OpenAI(client))
            }
            LLMProvider::Moonshot => {
                let client = rig::providers::moonshot::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::Moonshot(client))
            }
            LLMProvider::DeepSeek => {
                let client = rig::providers::deepseek::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::DeepSeek(client))
            }
            LLMProvider::Mistral => {
                let client = rig::providers::mistral::Client::builder(&config.api_key).build();
                Ok(ProviderClient::Mistral(client))
            }
            LLMProvider::OpenRouter => {
                // reference： https://docs.rig.rs/docs/integrations/model_providers/anthropic#basic-usage
                let client = rig::providers::openrouter::Client::builder(&config.api_key).build();
                Ok(ProviderClient::OpenRouter(client))
            }
            LLMProvider::Anthropic => {
                let client =
                    rig::providers::anthropic::ClientBuilder::new(&config.api_key).build()?;
                Ok(ProviderClient::Anthropic(client))
            }
            LLMProvider::Gemini => {
                let client = rig::providers::gemini::Client::builder(&config.api_key).build()?;
                Ok(ProviderClient::Gemini(client))
            }
            LLMProvider::Ollama => {
                let client = rig::providers::ollama::Client::builder().build();
                Ok(ProviderClient::Ollama(client))
            }
        }
    }

    /// 按生成参数创建Agent
    pub fn create_agent(&self, profile: &AgentProfile<'_>) -> ProviderAgent {
        let AgentProfile {
            model,
            preamble,
            temperature,
            max_tokens,
        } = *profile;

        match self {
            ProviderClient::OpenAI(client) => ProviderAgent::OpenAI(
                client
                    .completion_model(model)
                    .completions_api()
                    .into_agent_builder()
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::Moonshot(client) => ProviderAgent::Moonshot(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::DeepSeek(client) => ProviderAgent::DeepSeek(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::Mistral(client) => ProviderAgent::Mistral(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::OpenRouter(client) => ProviderAgent::OpenRouter(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::Anthropic(client) => ProviderAgent::Anthropic(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
            ProviderClient::Gemini(client) => {
                let params = AdditionalParameters::default().with_config(GenerationConfig::default());
                ProviderAgent::Gemini(
                    client
                        .agent(model)
                        .preamble(preamble)
                        .max_tokens(max_tokens)
                        .temperature(temperature)
                        .additional_params(serde_json::to_value(params).unwrap_or_default())
                        .build(),
                )
            }
            ProviderClient::Ollama(client) => ProviderAgent::Ollama(
                client
                    .agent(model)
                    .preamble(preamble)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build(),
            ),
        }
    }
}

/// 单次生成使用的Agent参数
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile<'a> {
    pub model: &'a str,
    pub preamble: &'a str,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl<'a> AgentProfile<'a> {
    pub fn new(config: &LLMConfig, model: &'a str, preamble: &'a str) -> Self {
        Self {
            model,
            preamble,
            temperature: config.temperature,
            max_tokens: config.max_tokens.into(),
        }
    }
}

/// 统一的Agent枚举
pub enum ProviderAgent {
    OpenAI(Agent<rig::providers::openai::CompletionModel>),
    Mistral(Agent<rig::providers::mistral::CompletionModel>),
    OpenRouter(Agent<rig::providers::openrouter::CompletionModel>),
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    Gemini(Agent<rig::providers::gemini::completion::CompletionModel>),
    Moonshot(Agent<rig::providers::moonshot::CompletionModel>),
    DeepSeek(Agent<rig::providers::deepseek::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel<reqwest::Client>>),
}

impl ProviderAgent {
    /// 执行prompt
    pub async fn prompt(&self, prompt: &str) -> Result<String> {
        match self {
            ProviderAgent::OpenAI(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Moonshot(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::DeepSeek(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Mistral(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::OpenRouter(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Anthropic(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Gemini(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Ollama(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
        }
    }
}
