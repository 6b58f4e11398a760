//! LLM客户端 - 基于rig的统一模型调用

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::config::LLMConfig;
use crate::llm::LanguageModel;

mod providers;
pub mod utils;

use providers::{AgentProfile, ProviderClient};
use utils::evaluate_befitting_model;

/// LLM客户端
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self
            .prompt_once(&self.config.model_efficient, "You are a helpful assistant.", "Hello")
            .await
        {
            Ok(_) => {
                info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                warn!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, model: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        "❌ 调用模型服务{}出错 (第 {} / {}次尝试): {}",
                        model, retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(
                        retry_delay_ms * retries as u64,
                    ))
                    .await;
                }
            }
        }
    }

    async fn prompt_once(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let profile = AgentProfile::new(&self.config, model, system_prompt);
        let agent = self.client.create_agent(&profile);
        agent.prompt(user_prompt).await
    }

    async fn prompt_with_fallover(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<String> {
        debug!(model = %befitting_model, "调用模型");
        let primary = self
            .retry_with_backoff(&befitting_model, || {
                self.prompt_once(&befitting_model, system_prompt, user_prompt)
            })
            .await;

        match (primary, fallover_model) {
            (Ok(text), _) => Ok(text),
            (Err(e), Some(model)) => {
                warn!(
                    "❌ 模型{}尝试 {} 次均失败，改用备选模型{}...{}",
                    befitting_model, self.config.retry_attempts, model, e
                );
                self.retry_with_backoff(&model, || {
                    self.prompt_once(&model, system_prompt, user_prompt)
                })
                .await
            }
            (Err(e), None) => Err(e),
        }
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);
        self.prompt_with_fallover(system_prompt, user_prompt, befitting_model, fallover_model)
            .await
    }
}
